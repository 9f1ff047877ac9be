//! Full read of one project plus the per-type material diff.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::PgPool;

use indy_db::models::{BlueprintPool, Job, MaterialPlan, Project, Task};
use indy_db::queries::{
    blueprints as blueprint_db, jobs as job_db, materials as material_db, tasks as task_db,
};

use crate::error::EngineResult;
use crate::project::get_project;

/// Material totals for one item type across all of a project's rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterialDiff {
    pub type_id: i64,
    pub required_qty: i64,
    pub available_qty: i64,
    pub buy_qty: i64,
    pub build_qty: i64,
    pub missing_qty: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectSnapshot {
    pub project: Project,
    pub tasks: Vec<Task>,
    pub jobs: Vec<Job>,
    pub materials: Vec<MaterialPlan>,
    pub blueprints: Vec<BlueprintPool>,
    pub material_diff: Vec<MaterialDiff>,
}

/// Sum rows per type; most missing first, then by type id.
pub fn material_diff(rows: &[MaterialPlan]) -> Vec<MaterialDiff> {
    let mut by_type: BTreeMap<i64, MaterialDiff> = BTreeMap::new();
    for row in rows {
        let entry = by_type.entry(row.type_id).or_insert(MaterialDiff {
            type_id: row.type_id,
            required_qty: 0,
            available_qty: 0,
            buy_qty: 0,
            build_qty: 0,
            missing_qty: 0,
        });
        entry.required_qty += row.required_qty;
        entry.available_qty += row.available_qty;
        entry.buy_qty += row.buy_qty;
        entry.build_qty += row.build_qty;
    }

    let mut diff: Vec<MaterialDiff> = by_type
        .into_values()
        .map(|mut d| {
            d.missing_qty = (d.required_qty - (d.available_qty + d.buy_qty + d.build_qty)).max(0);
            d
        })
        .collect();
    diff.sort_by(|a, b| b.missing_qty.cmp(&a.missing_qty).then(a.type_id.cmp(&b.type_id)));
    diff
}

pub async fn get_project_snapshot(
    pool: &PgPool,
    user_id: &str,
    project_id: i64,
) -> EngineResult<ProjectSnapshot> {
    let project = get_project(pool, user_id, project_id).await?;
    let tasks = task_db::list_tasks_for_project(pool, user_id, project_id).await?;
    let jobs = job_db::list_jobs_for_project(pool, user_id, project_id).await?;
    let materials = material_db::list_materials_for_project(pool, user_id, project_id).await?;
    let blueprints = blueprint_db::list_blueprints_for_project(pool, user_id, project_id).await?;
    let material_diff = material_diff(&materials);

    Ok(ProjectSnapshot {
        project,
        tasks,
        jobs,
        materials,
        blueprints,
        material_diff,
    })
}
