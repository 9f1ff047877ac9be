//! Dry-run of a plan patch.
//!
//! Runs the same resolution, derivation, gating and scheduling as
//! [`super::apply::apply_plan`] against synthetic task ids (`-1` for the
//! first patch task, `-2` for the second, ...). Only reads.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;

use indy_db::models::{Task, TaskStatus};
use indy_db::queries::{blueprints as blueprint_db, projects as project_db, tasks as task_db};

use crate::draft::JobDraft;
use crate::error::{EngineError, EngineResult, require_positive_id};
use crate::gate::{PoolEntry, merge_pool};
use crate::scheduler::SchedulerConfig;

use super::apply::new_task;
use super::engine::{PlanSummary, TaskIndex, build_jobs, next_project_status, resolve_references};
use super::patch::PlanPatch;

/// A task as it would be inserted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDraft {
    /// Synthetic, negative.
    pub id: i64,
    pub parent_task_id: Option<i64>,
    pub name: String,
    pub activity: String,
    pub product_type_id: Option<i64>,
    pub target_runs: i64,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    pub priority: i32,
    pub status: TaskStatus,
    pub constraints: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanPreview {
    pub summary: PlanSummary,
    pub tasks: Vec<TaskDraft>,
    pub jobs: Vec<JobDraft>,
}

/// Synthetic ids for a patch with `count` tasks.
pub fn synthetic_ids(count: usize) -> Vec<i64> {
    (1..=count as i64).map(|n| -n).collect()
}

pub async fn preview_plan(
    pool: &PgPool,
    user_id: &str,
    project_id: i64,
    patch: &PlanPatch,
) -> EngineResult<PlanPreview> {
    require_positive_id("project", project_id)?;
    patch.validate()?;

    let project = project_db::get_project(pool, user_id, project_id)
        .await?
        .ok_or_else(|| EngineError::not_found("project", project_id))?;

    let scheduler = if patch.scheduler.enabled {
        Some(SchedulerConfig::resolve(project.strategy, &patch.scheduler, Utc::now())?)
    } else {
        None
    };

    let existing: Vec<Task> = if patch.replace {
        Vec::new()
    } else {
        task_db::list_tasks_for_project(pool, user_id, project_id).await?
    };
    let existing_ids: HashSet<i64> = existing.iter().map(|t| t.id).collect();

    let persisted_pool: Vec<PoolEntry> = if patch.replace_blueprints {
        Vec::new()
    } else {
        blueprint_db::list_blueprints_for_project(pool, user_id, project_id)
            .await?
            .iter()
            .map(PoolEntry::from)
            .collect()
    };
    let patch_pool: Vec<PoolEntry> = patch
        .blueprints
        .iter()
        .map(|bp| PoolEntry::from(&bp.to_upsert(project_id)))
        .collect();
    let merged = merge_pool(&persisted_pool, &patch_pool);

    let assigned = synthetic_ids(patch.tasks.len());
    let refs = resolve_references(patch, &assigned, &existing_ids)?;

    let mut index = TaskIndex::default();
    for task in &existing {
        index.add_persisted(task);
    }
    index.add_patch_tasks(patch, &assigned, &refs.parents);

    let built = build_jobs(patch, &assigned, &refs.job_tasks, index, &merged, scheduler.as_ref());

    let tasks: Vec<TaskDraft> = patch
        .tasks
        .iter()
        .zip(&assigned)
        .zip(&refs.parents)
        .map(|((task, &id), &parent)| {
            let row = new_task(project_id, task);
            TaskDraft {
                id,
                parent_task_id: parent,
                name: row.name,
                activity: row.activity,
                product_type_id: row.product_type_id,
                target_runs: row.target_runs,
                planned_start: row.planned_start,
                planned_end: row.planned_end,
                priority: row.priority,
                status: row.status,
                constraints: row.constraints,
            }
        })
        .collect();

    let mut warnings = built.warnings;
    warnings.extend(refs.ambiguity.warning());

    let summary = PlanSummary {
        tasks_inserted: tasks.len(),
        jobs_inserted: built.jobs.len(),
        materials_upserted: patch.materials.len(),
        blueprints_upserted: patch.blueprints.len(),
        scheduler_applied: built.scheduler_applied,
        total_runs: built.total_runs,
        scheduled_runs: built.scheduled_runs,
        deferred_runs: built.deferred_runs,
        deferred_jobs: built.deferred_jobs,
        project_status: Some(next_project_status(project.status, patch.project_status)),
        warnings,
    };
    debug!(user = user_id, project_id, jobs = summary.jobs_inserted, "previewed plan");

    Ok(PlanPreview {
        summary,
        tasks,
        jobs: built.jobs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_ids_count_down_from_minus_one() {
        assert_eq!(synthetic_ids(3), vec![-1, -2, -3]);
        assert!(synthetic_ids(0).is_empty());
    }
}
