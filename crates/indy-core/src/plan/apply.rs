//! Applying a plan patch inside one transaction.

use std::collections::HashSet;

use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, info};

use indy_db::models::Task;
use indy_db::queries::materials::MaterialUpsert;
use indy_db::queries::tasks::NewTask;
use indy_db::queries::{
    blueprints as blueprint_db, jobs as job_db, materials as material_db,
    projects as project_db, tasks as task_db,
};

use crate::error::{EngineError, EngineResult, require_positive_id};
use crate::gate::PoolEntry;
use crate::scheduler::SchedulerConfig;

use super::engine::{PlanSummary, TaskIndex, build_jobs, next_project_status, resolve_references};
use super::patch::{MaterialInput, PlanPatch, TaskInput};

pub(super) fn new_task(project_id: i64, task: &TaskInput) -> NewTask {
    NewTask {
        project_id,
        name: task.name.trim().to_owned(),
        activity: task.activity().to_owned(),
        product_type_id: task.product_type_id,
        target_runs: task.target_runs,
        planned_start: task.planned_start,
        planned_end: task.planned_end,
        priority: task.priority,
        status: task.status,
        constraints: task.constraints_document(),
    }
}

fn material_upsert(project_id: i64, task_id: Option<i64>, m: &MaterialInput) -> MaterialUpsert {
    MaterialUpsert {
        project_id,
        task_id,
        type_id: m.type_id,
        required_qty: m.required_qty,
        available_qty: m.available_qty,
        buy_qty: m.buy_qty,
        build_qty: m.build_qty,
        unit_cost_isk: m.unit_cost_isk,
        source: m.source,
    }
}

/// Apply `patch` to a project.
///
/// Runs in a single transaction with the project row locked, so concurrent
/// applies on one project queue up. Order of work:
///
/// 1. wipe tasks, jobs and materials (`replace`) and the pool
///    (`replace_blueprints`)
/// 2. insert tasks, then resolve and write their parents
/// 3. upsert blueprints and read the merged pool back
/// 4. resolve job references, derive, gate and schedule jobs, insert them
/// 5. upsert materials and move the project status
///
/// Any error rolls the whole transaction back.
pub async fn apply_plan(
    pool: &PgPool,
    user_id: &str,
    project_id: i64,
    patch: &PlanPatch,
) -> EngineResult<PlanSummary> {
    require_positive_id("project", project_id)?;
    patch.validate()?;

    let mut tx = pool.begin().await?;

    let project = project_db::lock_project(&mut *tx, user_id, project_id)
        .await?
        .ok_or_else(|| EngineError::not_found("project", project_id))?;

    let scheduler = if patch.scheduler.enabled {
        Some(SchedulerConfig::resolve(project.strategy, &patch.scheduler, Utc::now())?)
    } else {
        None
    };

    // 1. Wipe.
    if patch.replace {
        let jobs = job_db::delete_jobs_for_project(&mut *tx, user_id, project_id).await?;
        let materials =
            material_db::delete_materials_for_project(&mut *tx, user_id, project_id).await?;
        let tasks = task_db::delete_tasks_for_project(&mut *tx, user_id, project_id).await?;
        debug!(project_id, jobs, materials, tasks, "replaced project plan");
    }
    if patch.replace_blueprints {
        let rows =
            blueprint_db::delete_blueprints_for_project(&mut *tx, user_id, project_id).await?;
        debug!(project_id, rows, "replaced blueprint pool");
    }

    let existing: Vec<Task> = task_db::list_tasks_for_project(&mut *tx, user_id, project_id).await?;
    let existing_ids: HashSet<i64> = existing.iter().map(|t| t.id).collect();

    // 2. Tasks, parents second.
    let mut assigned = Vec::with_capacity(patch.tasks.len());
    for task in &patch.tasks {
        let row = task_db::insert_task(&mut *tx, user_id, &new_task(project_id, task)).await?;
        assigned.push(row.id);
    }

    let refs = resolve_references(patch, &assigned, &existing_ids)?;
    for (&task_id, &parent) in assigned.iter().zip(&refs.parents) {
        if parent.is_some() {
            task_db::set_task_parent(&mut *tx, user_id, task_id, parent).await?;
        }
    }

    // 3. Blueprints, then the merged pool as the gate will see it.
    for bp in &patch.blueprints {
        blueprint_db::upsert_blueprint(&mut *tx, user_id, &bp.to_upsert(project_id)).await?;
    }
    let pool_rows = blueprint_db::list_blueprints_for_project(&mut *tx, user_id, project_id).await?;
    let merged: Vec<PoolEntry> = pool_rows.iter().map(PoolEntry::from).collect();

    // 4. Jobs.
    let mut index = TaskIndex::default();
    for task in &existing {
        index.add_persisted(task);
    }
    index.add_patch_tasks(patch, &assigned, &refs.parents);

    let built = build_jobs(patch, &assigned, &refs.job_tasks, index, &merged, scheduler.as_ref());
    for draft in &built.jobs {
        job_db::insert_job(&mut *tx, user_id, &draft.clone().into_new_job(project_id)).await?;
    }

    // 5. Materials and project status.
    for (m, &task_id) in patch.materials.iter().zip(&refs.material_tasks) {
        material_db::upsert_material(&mut *tx, user_id, &material_upsert(project_id, task_id, m))
            .await?;
    }

    let status = next_project_status(project.status, patch.project_status);
    if status != project.status {
        project_db::update_project_status(&mut *tx, user_id, project_id, status).await?;
    } else {
        project_db::touch_project(&mut *tx, user_id, project_id).await?;
    }

    tx.commit().await?;

    let mut warnings = built.warnings;
    warnings.extend(refs.ambiguity.warning());

    let summary = PlanSummary {
        tasks_inserted: assigned.len(),
        jobs_inserted: built.jobs.len(),
        materials_upserted: patch.materials.len(),
        blueprints_upserted: patch.blueprints.len(),
        scheduler_applied: built.scheduler_applied,
        total_runs: built.total_runs,
        scheduled_runs: built.scheduled_runs,
        deferred_runs: built.deferred_runs,
        deferred_jobs: built.deferred_jobs,
        project_status: Some(status),
        warnings,
    };

    info!(
        user = user_id,
        project_id,
        tasks = summary.tasks_inserted,
        jobs = summary.jobs_inserted,
        materials = summary.materials_upserted,
        blueprints = summary.blueprints_upserted,
        warnings = summary.warnings.len(),
        "applied plan"
    );
    Ok(summary)
}
