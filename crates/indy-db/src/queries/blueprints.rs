//! Database query functions for the `blueprint_pools` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;

use crate::models::BlueprintPool;

/// Parameters for upserting a blueprint pool row, keyed by
/// (project, blueprint type, location, is_bpo).
#[derive(Debug, Clone)]
pub struct BlueprintUpsert {
    pub project_id: i64,
    pub blueprint_type_id: i64,
    pub location_id: Option<i64>,
    pub is_bpo: bool,
    pub available_runs: i64,
    pub material_efficiency: i32,
    pub time_efficiency: i32,
    pub notes: String,
}

impl BlueprintUpsert {
    /// Runs as stored: always zero for originals, never negative for copies.
    pub fn stored_runs(&self) -> i64 {
        if self.is_bpo {
            0
        } else {
            self.available_runs.max(0)
        }
    }
}

/// Insert a pool row, or overwrite the existing row with the same key.
pub async fn upsert_blueprint<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    row: &BlueprintUpsert,
) -> Result<BlueprintPool> {
    let pool_row = sqlx::query_as::<_, BlueprintPool>(
        "INSERT INTO blueprint_pools \
         (user_id, project_id, blueprint_type_id, location_id, is_bpo, available_runs, \
          material_efficiency, time_efficiency, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT ON CONSTRAINT uq_blueprint_pools DO UPDATE \
         SET available_runs = EXCLUDED.available_runs, \
             material_efficiency = EXCLUDED.material_efficiency, \
             time_efficiency = EXCLUDED.time_efficiency, \
             notes = EXCLUDED.notes, \
             updated_at = now() \
         RETURNING *",
    )
    .bind(user_id)
    .bind(row.project_id)
    .bind(row.blueprint_type_id)
    .bind(row.location_id)
    .bind(row.is_bpo)
    .bind(row.stored_runs())
    .bind(row.material_efficiency)
    .bind(row.time_efficiency)
    .bind(&row.notes)
    .fetch_one(exec)
    .await
    .with_context(|| {
        format!(
            "failed to upsert blueprint {} at {:?}",
            row.blueprint_type_id, row.location_id
        )
    })?;

    Ok(pool_row)
}

/// List a project's blueprint pool.
pub async fn list_blueprints_for_project<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    project_id: i64,
) -> Result<Vec<BlueprintPool>> {
    let rows = sqlx::query_as::<_, BlueprintPool>(
        "SELECT * FROM blueprint_pools \
         WHERE project_id = $1 AND user_id = $2 \
         ORDER BY blueprint_type_id ASC, location_id ASC NULLS FIRST, is_bpo DESC, id ASC",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_all(exec)
    .await
    .with_context(|| format!("failed to list blueprint pool for project {project_id}"))?;

    Ok(rows)
}

/// Delete a project's whole blueprint pool. Returns the number of rows removed.
pub async fn delete_blueprints_for_project<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    project_id: i64,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM blueprint_pools WHERE project_id = $1 AND user_id = $2")
        .bind(project_id)
        .bind(user_id)
        .execute(exec)
        .await
        .with_context(|| format!("failed to delete blueprint pool for project {project_id}"))?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert(is_bpo: bool, runs: i64) -> BlueprintUpsert {
        BlueprintUpsert {
            project_id: 1,
            blueprint_type_id: 1000,
            location_id: None,
            is_bpo,
            available_runs: runs,
            material_efficiency: 10,
            time_efficiency: 20,
            notes: String::new(),
        }
    }

    #[test]
    fn originals_store_zero_runs() {
        assert_eq!(upsert(true, 500).stored_runs(), 0);
        assert_eq!(upsert(true, -3).stored_runs(), 0);
    }

    #[test]
    fn copies_never_store_negative_runs() {
        assert_eq!(upsert(false, 12).stored_runs(), 12);
        assert_eq!(upsert(false, -1).stored_runs(), 0);
    }
}
