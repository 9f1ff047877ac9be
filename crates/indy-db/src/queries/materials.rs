//! Database query functions for the `material_plans` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;

use crate::models::{MaterialPlan, MaterialSource};

/// Parameters for upserting a material requirement, keyed by
/// (project, task, type).
#[derive(Debug, Clone)]
pub struct MaterialUpsert {
    pub project_id: i64,
    pub task_id: Option<i64>,
    pub type_id: i64,
    pub required_qty: i64,
    pub available_qty: i64,
    pub buy_qty: i64,
    pub build_qty: i64,
    pub unit_cost_isk: f64,
    pub source: MaterialSource,
}

/// Insert a material row, or overwrite the quantities of the existing row
/// with the same (project, task, type).
pub async fn upsert_material<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    row: &MaterialUpsert,
) -> Result<MaterialPlan> {
    let plan = sqlx::query_as::<_, MaterialPlan>(
        "INSERT INTO material_plans \
         (user_id, project_id, task_id, type_id, required_qty, available_qty, \
          buy_qty, build_qty, unit_cost_isk, source) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT ON CONSTRAINT uq_material_plans DO UPDATE \
         SET required_qty = EXCLUDED.required_qty, \
             available_qty = EXCLUDED.available_qty, \
             buy_qty = EXCLUDED.buy_qty, \
             build_qty = EXCLUDED.build_qty, \
             unit_cost_isk = EXCLUDED.unit_cost_isk, \
             source = EXCLUDED.source, \
             updated_at = now() \
         RETURNING *",
    )
    .bind(user_id)
    .bind(row.project_id)
    .bind(row.task_id)
    .bind(row.type_id)
    .bind(row.required_qty)
    .bind(row.available_qty)
    .bind(row.buy_qty)
    .bind(row.build_qty)
    .bind(row.unit_cost_isk)
    .bind(row.source)
    .fetch_one(exec)
    .await
    .with_context(|| {
        format!(
            "failed to upsert material type {} for task {:?}",
            row.type_id, row.task_id
        )
    })?;

    Ok(plan)
}

/// List a project's material rows ordered by (task, type, id), project-level
/// rows first.
pub async fn list_materials_for_project<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    project_id: i64,
) -> Result<Vec<MaterialPlan>> {
    let rows = sqlx::query_as::<_, MaterialPlan>(
        "SELECT * FROM material_plans \
         WHERE project_id = $1 AND user_id = $2 \
         ORDER BY task_id ASC NULLS FIRST, type_id ASC, id ASC",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_all(exec)
    .await
    .with_context(|| format!("failed to list materials for project {project_id}"))?;

    Ok(rows)
}

/// Overwrite the stock/buy/build split of one material row.
pub async fn update_material_allocation<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    id: i64,
    available_qty: i64,
    buy_qty: i64,
    build_qty: i64,
    source: MaterialSource,
) -> Result<Option<MaterialPlan>> {
    let row = sqlx::query_as::<_, MaterialPlan>(
        "UPDATE material_plans \
         SET available_qty = $1, buy_qty = $2, build_qty = $3, source = $4, updated_at = now() \
         WHERE id = $5 AND user_id = $6 \
         RETURNING *",
    )
    .bind(available_qty)
    .bind(buy_qty)
    .bind(build_qty)
    .bind(source)
    .bind(id)
    .bind(user_id)
    .fetch_optional(exec)
    .await
    .with_context(|| format!("failed to update allocation of material row {id}"))?;

    Ok(row)
}

/// Delete every material row of a project. Returns the number of rows removed.
pub async fn delete_materials_for_project<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    project_id: i64,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM material_plans WHERE project_id = $1 AND user_id = $2")
        .bind(project_id)
        .bind(user_id)
        .execute(exec)
        .await
        .with_context(|| format!("failed to delete materials for project {project_id}"))?;

    Ok(result.rows_affected())
}
