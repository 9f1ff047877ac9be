//! Storage-free steps shared by apply and preview.
//!
//! Both paths feed the same inputs through [`resolve_references`] and
//! [`build_jobs`]; only where task ids and the blueprint pool come from
//! differs. That keeps their counts and capacity decisions identical.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use indy_db::models::{ProjectStatus, Task};

use crate::constraints::TaskConstraints;
use crate::draft::JobDraft;
use crate::error::{EngineError, EngineResult};
use crate::forest::{TaskForest, TaskNode};
use crate::gate::{PoolEntry, apply_gate};
use crate::resolve::{AmbiguityCounts, RefResolver, Resolution};
use crate::scheduler::{SchedulerConfig, schedule_jobs};

use super::patch::{JobInput, PlanPatch};

/// What applying a patch did (or, for a preview, would do).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanSummary {
    pub tasks_inserted: usize,
    pub jobs_inserted: usize,
    pub materials_upserted: usize,
    pub blueprints_upserted: usize,
    pub scheduler_applied: bool,
    pub total_runs: i64,
    pub scheduled_runs: i64,
    pub deferred_runs: i64,
    pub deferred_jobs: i64,
    pub project_status: Option<ProjectStatus>,
    pub warnings: Vec<String>,
}

/// Every task reference of a patch, resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRefs {
    pub parents: Vec<Option<i64>>,
    pub job_tasks: Vec<Option<i64>>,
    pub material_tasks: Vec<Option<i64>>,
    pub ambiguity: AmbiguityCounts,
}

/// Resolve parents, job tasks and material tasks.
///
/// `assigned[i]` is the id of patch task `i`; `existing` holds the ids of
/// persisted project tasks still visible to the patch. A reference that
/// does not end up on one of those tasks is rejected.
pub fn resolve_references(
    patch: &PlanPatch,
    assigned: &[i64],
    existing: &HashSet<i64>,
) -> EngineResult<ResolvedRefs> {
    let declared: Vec<Option<i64>> = patch.tasks.iter().map(|t| t.id).collect();
    let resolver = RefResolver::new(
        assigned.to_vec(),
        &declared,
        existing.iter().copied(),
        patch.replace,
    );
    let known: HashSet<i64> = assigned.iter().chain(existing.iter()).copied().collect();

    let mut out = ResolvedRefs::default();
    for (index, task) in patch.tasks.iter().enumerate() {
        out.parents.push(resolve_one(
            &resolver,
            &known,
            task.parent_task_id,
            "tasks",
            index,
            "parent_task_id",
            &mut out.ambiguity.task_parents,
        )?);
    }
    for (index, job) in patch.jobs.iter().enumerate() {
        out.job_tasks.push(resolve_one(
            &resolver,
            &known,
            job.task_id,
            "jobs",
            index,
            "task_id",
            &mut out.ambiguity.job_tasks,
        )?);
    }
    for (index, m) in patch.materials.iter().enumerate() {
        out.material_tasks.push(resolve_one(
            &resolver,
            &known,
            m.task_id,
            "materials",
            index,
            "task_id",
            &mut out.ambiguity.material_tasks,
        )?);
    }
    Ok(out)
}

fn resolve_one(
    resolver: &RefResolver,
    known: &HashSet<i64>,
    raw: Option<i64>,
    section: &str,
    index: usize,
    field: &str,
    ambiguous: &mut usize,
) -> EngineResult<Option<i64>> {
    let Some(resolution) = resolver.resolve_opt(raw) else {
        return Ok(None);
    };
    if resolution.is_ambiguous() {
        *ambiguous += 1;
    }
    match resolution {
        Resolution::Resolved { task_id, .. } if known.contains(&task_id) => Ok(Some(task_id)),
        _ => Err(EngineError::validation(format!(
            "{section}[{index}].{field}: {} does not refer to a task of this project",
            resolution.task_id()
        ))),
    }
}

/// Task data the job pipeline needs, for persisted and patch tasks alike.
#[derive(Debug, Default)]
pub struct TaskIndex {
    pub constraints: HashMap<i64, TaskConstraints>,
    pub nodes: Vec<TaskNode>,
}

impl TaskIndex {
    pub fn add(
        &mut self,
        id: i64,
        parent_id: Option<i64>,
        planned_end: Option<DateTime<Utc>>,
        constraints: TaskConstraints,
    ) {
        self.constraints.insert(id, constraints);
        self.nodes.push(TaskNode {
            id,
            parent_id,
            planned_end,
        });
    }

    pub fn add_persisted(&mut self, task: &Task) {
        self.add(
            task.id,
            task.parent_task_id,
            task.planned_end,
            TaskConstraints::from_json(&task.constraints),
        );
    }

    /// Add the patch's own tasks under their assigned ids.
    pub fn add_patch_tasks(
        &mut self,
        patch: &PlanPatch,
        assigned: &[i64],
        parents: &[Option<i64>],
    ) {
        for ((task, &id), &parent) in patch.tasks.iter().zip(assigned).zip(parents) {
            self.add(
                id,
                parent,
                task.planned_end,
                TaskConstraints::from_json(&task.constraints_document()),
            );
        }
    }
}

/// Jobs ready to write plus run accounting and warnings.
#[derive(Debug, Default)]
pub struct JobBuild {
    pub jobs: Vec<JobDraft>,
    pub scheduler_applied: bool,
    pub total_runs: i64,
    pub scheduled_runs: i64,
    pub deferred_runs: i64,
    pub deferred_jobs: i64,
    pub warnings: Vec<String>,
}

/// Author or derive jobs, gate them against the pool, then schedule them
/// when `scheduler` is set.
pub fn build_jobs(
    patch: &PlanPatch,
    assigned: &[i64],
    job_tasks: &[Option<i64>],
    index: TaskIndex,
    pool: &[PoolEntry],
    scheduler: Option<&SchedulerConfig>,
) -> JobBuild {
    let drafts: Vec<JobDraft> = if !patch.jobs.is_empty() {
        patch
            .jobs
            .iter()
            .zip(job_tasks)
            .map(|(job, &task_id)| authored_job(job, task_id, &index.constraints))
            .collect()
    } else if scheduler.is_some() {
        derive_jobs(patch, assigned, &index.constraints)
    } else {
        Vec::new()
    };

    let gated = apply_gate(drafts, &index.constraints, pool, !patch.strict_bp_bypass);
    let mut warnings = gated.warnings;

    let Some(config) = scheduler else {
        let total_runs = gated.jobs.iter().map(|j| j.runs).sum();
        return JobBuild {
            jobs: gated.jobs,
            total_runs,
            warnings,
            ..Default::default()
        };
    };

    let mut forest = TaskForest::new(index.nodes);
    let scheduled = schedule_jobs(gated.jobs, &mut forest, config);
    warnings.extend(scheduled.warnings);

    JobBuild {
        jobs: scheduled.jobs,
        scheduler_applied: true,
        total_runs: scheduled.total_runs,
        scheduled_runs: scheduled.scheduled_runs,
        deferred_runs: scheduled.deferred_runs,
        deferred_jobs: scheduled.deferred_jobs,
        warnings,
    }
}

fn authored_job(
    job: &JobInput,
    task_id: Option<i64>,
    constraints: &HashMap<i64, TaskConstraints>,
) -> JobDraft {
    let hints = task_id.and_then(|id| constraints.get(&id));
    let activity = job
        .activity
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(super::patch::DEFAULT_ACTIVITY);

    let mut draft = JobDraft::new(task_id, activity, job.runs);
    draft.duration_seconds = job
        .duration_seconds
        .unwrap_or_else(|| hinted_duration(hints, job.runs));
    draft.cost_isk = job.cost_isk.unwrap_or_else(|| hinted_cost(hints, job.runs));
    draft.status = job.status;
    draft.started_at = job.started_at;
    draft.finished_at = job.finished_at;
    draft.notes = job.notes.clone();
    draft
}

/// One job per patch task with positive target runs.
fn derive_jobs(
    patch: &PlanPatch,
    assigned: &[i64],
    constraints: &HashMap<i64, TaskConstraints>,
) -> Vec<JobDraft> {
    patch
        .tasks
        .iter()
        .zip(assigned)
        .filter(|(task, _)| task.target_runs > 0)
        .map(|(task, &id)| {
            let hints = constraints.get(&id);
            let mut draft = JobDraft::new(Some(id), task.activity(), task.target_runs);
            draft.duration_seconds = hinted_duration(hints, task.target_runs);
            draft.cost_isk = hinted_cost(hints, task.target_runs);
            draft.notes = task.name.trim().to_owned();
            draft
        })
        .collect()
}

fn hinted_duration(hints: Option<&TaskConstraints>, runs: i64) -> i64 {
    hints
        .and_then(|c| c.per_run_duration(runs))
        .map_or(0, |per_run| (per_run * runs as f64).round() as i64)
}

fn hinted_cost(hints: Option<&TaskConstraints>, runs: i64) -> f64 {
    hints
        .and_then(|c| c.per_run_cost(runs))
        .map_or(0.0, |per_run| per_run * runs as f64)
}

/// Status the project ends up in after a patch.
pub fn next_project_status(
    current: ProjectStatus,
    requested: Option<ProjectStatus>,
) -> ProjectStatus {
    match requested {
        Some(status) => status,
        None if current == ProjectStatus::Draft => ProjectStatus::Planned,
        None => current,
    }
}
