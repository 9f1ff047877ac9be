//! Plan patch format and validation.
//!
//! A patch is authored as JSON or TOML:
//!
//! ```toml
//! replace = true
//!
//! [scheduler]
//! enabled = true
//! window_days = 14
//!
//! [[tasks]]
//! name = "Rifter hulls"
//! target_runs = 20
//! constraints = { bp_type_id = 691, duration_per_run_seconds = 3000 }
//!
//! [[tasks]]
//! name = "Components"
//! parent_task_id = -1
//! ```
//!
//! Task references inside a patch (`parent_task_id`, job and material
//! `task_id`) are raw integers; see [`crate::resolve`] for how they are read.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use indy_db::models::{JobStatus, MaterialSource, ProjectStatus, TaskStatus};
use indy_db::queries::blueprints::BlueprintUpsert;

use crate::error::EngineError;
use crate::scheduler::SchedulerOptions;

/// Errors raised while parsing or validating a patch. Nothing is written
/// when one occurs.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("tasks[{index}]: name is required")]
    MissingTaskName { index: usize },

    #[error("tasks[{index}]: duplicate task id {id}")]
    DuplicateTaskId { index: usize, id: i64 },

    #[error("{section}[{index}]: {field} must be positive, got {value}")]
    NotPositive {
        section: &'static str,
        index: usize,
        field: &'static str,
        value: i64,
    },

    #[error("{section}[{index}]: {field} must be at most {max}, got {value}")]
    TooLarge {
        section: &'static str,
        index: usize,
        field: &'static str,
        value: i64,
        max: i64,
    },

    #[error("{section}[{index}]: {field} must not be negative, got {value}")]
    Negative {
        section: &'static str,
        index: usize,
        field: &'static str,
        value: f64,
    },

    #[error("{section}[{index}]: {message}")]
    Invalid {
        section: &'static str,
        index: usize,
        message: String,
    },
}

impl From<PatchError> for EngineError {
    fn from(err: PatchError) -> Self {
        EngineError::Validation(err.to_string())
    }
}

/// Upper bound for run counts (`target_runs`, job `runs`, BPC
/// `available_runs`). Keeps run totals far from `i64` overflow.
pub const MAX_RUNS: i64 = i32::MAX as i64;

/// Upper bound for material quantities.
pub const MAX_QUANTITY: i64 = 1_000_000_000_000;

/// The unit of input for applying or previewing a plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlanPatch {
    pub tasks: Vec<TaskInput>,
    pub jobs: Vec<JobInput>,
    pub materials: Vec<MaterialInput>,
    pub blueprints: Vec<BlueprintInput>,
    /// Wipe the project's tasks, jobs and materials first.
    pub replace: bool,
    /// Wipe the project's blueprint pool first.
    pub replace_blueprints: bool,
    /// Let jobs through when their blueprint is missing from the pool.
    pub strict_bp_bypass: bool,
    /// New project status. Without one a draft project becomes planned.
    pub project_status: Option<ProjectStatus>,
    pub scheduler: SchedulerOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskInput {
    /// Legacy id other entries of the same patch may refer to.
    pub id: Option<i64>,
    pub parent_task_id: Option<i64>,
    pub name: String,
    pub activity: Option<String>,
    pub product_type_id: Option<i64>,
    pub target_runs: i64,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    pub priority: i32,
    pub status: TaskStatus,
    pub constraints: Value,
}

impl TaskInput {
    pub fn activity(&self) -> &str {
        self.activity
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(DEFAULT_ACTIVITY)
    }

    /// Constraints as stored: anything but an object becomes `{}`.
    pub fn constraints_document(&self) -> Value {
        match &self.constraints {
            Value::Object(_) => self.constraints.clone(),
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(v @ Value::Object(_)) => v,
                _ => Value::Object(Default::default()),
            },
            _ => Value::Object(Default::default()),
        }
    }
}

pub const DEFAULT_ACTIVITY: &str = "manufacturing";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobInput {
    pub task_id: Option<i64>,
    pub activity: Option<String>,
    pub runs: i64,
    /// Total duration. Taken from the task's hints when absent.
    pub duration_seconds: Option<i64>,
    /// Total cost. Taken from the task's hints when absent.
    pub cost_isk: Option<f64>,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaterialInput {
    pub task_id: Option<i64>,
    pub type_id: i64,
    pub required_qty: i64,
    pub available_qty: i64,
    pub buy_qty: i64,
    pub build_qty: i64,
    pub unit_cost_isk: f64,
    pub source: MaterialSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlueprintInput {
    pub blueprint_type_id: i64,
    pub location_id: Option<i64>,
    pub is_bpo: bool,
    /// Ignored for BPOs, which are stored with zero runs.
    pub available_runs: i64,
    pub material_efficiency: i32,
    pub time_efficiency: i32,
    pub notes: String,
}

impl BlueprintInput {
    pub fn to_upsert(&self, project_id: i64) -> BlueprintUpsert {
        BlueprintUpsert {
            project_id,
            blueprint_type_id: self.blueprint_type_id,
            location_id: self.location_id,
            is_bpo: self.is_bpo,
            available_runs: self.available_runs,
            material_efficiency: self.material_efficiency,
            time_efficiency: self.time_efficiency,
            notes: self.notes.clone(),
        }
    }
}

impl PlanPatch {
    pub fn from_json(content: &str) -> Result<Self, PatchError> {
        let patch: Self = serde_json::from_str(content)?;
        patch.validate()?;
        Ok(patch)
    }

    pub fn from_toml(content: &str) -> Result<Self, PatchError> {
        let patch: Self = toml::from_str(content)?;
        patch.validate()?;
        Ok(patch)
    }

    /// Structural checks that need no database access.
    pub fn validate(&self) -> Result<(), PatchError> {
        let mut declared = HashSet::new();
        for (index, task) in self.tasks.iter().enumerate() {
            if task.name.trim().is_empty() {
                return Err(PatchError::MissingTaskName { index });
            }
            if let Some(id) = task.id {
                positive("tasks", index, "id", id)?;
                if !declared.insert(id) {
                    return Err(PatchError::DuplicateTaskId { index, id });
                }
            }
            not_negative("tasks", index, "target_runs", task.target_runs as f64)?;
            at_most("tasks", index, "target_runs", task.target_runs, MAX_RUNS)?;
            if let Some(pid) = task.product_type_id {
                positive("tasks", index, "product_type_id", pid)?;
            }
            if let (Some(start), Some(end)) = (task.planned_start, task.planned_end) {
                if end < start {
                    return Err(invalid("tasks", index, "planned_end is before planned_start"));
                }
            }
        }

        for (index, job) in self.jobs.iter().enumerate() {
            positive("jobs", index, "runs", job.runs)?;
            at_most("jobs", index, "runs", job.runs, MAX_RUNS)?;
            if let Some(d) = job.duration_seconds {
                not_negative("jobs", index, "duration_seconds", d as f64)?;
            }
            if let Some(c) = job.cost_isk {
                if !c.is_finite() {
                    return Err(invalid("jobs", index, "cost_isk must be a finite number"));
                }
                not_negative("jobs", index, "cost_isk", c)?;
            }
            if job.finished_at.is_some() && !job.status.is_terminal() {
                return Err(invalid(
                    "jobs",
                    index,
                    format!(
                        "finished_at is only allowed for terminal statuses, not {}",
                        job.status
                    ),
                ));
            }
        }

        for (index, m) in self.materials.iter().enumerate() {
            positive("materials", index, "type_id", m.type_id)?;
            not_negative("materials", index, "required_qty", m.required_qty as f64)?;
            not_negative("materials", index, "available_qty", m.available_qty as f64)?;
            not_negative("materials", index, "buy_qty", m.buy_qty as f64)?;
            not_negative("materials", index, "build_qty", m.build_qty as f64)?;
            for (field, qty) in [
                ("required_qty", m.required_qty),
                ("available_qty", m.available_qty),
                ("buy_qty", m.buy_qty),
                ("build_qty", m.build_qty),
            ] {
                at_most("materials", index, field, qty, MAX_QUANTITY)?;
            }
            if !m.unit_cost_isk.is_finite() {
                return Err(invalid("materials", index, "unit_cost_isk must be a finite number"));
            }
            not_negative("materials", index, "unit_cost_isk", m.unit_cost_isk)?;
        }

        for (index, bp) in self.blueprints.iter().enumerate() {
            positive("blueprints", index, "blueprint_type_id", bp.blueprint_type_id)?;
            if let Some(loc) = bp.location_id {
                positive("blueprints", index, "location_id", loc)?;
            }
            if !bp.is_bpo {
                not_negative("blueprints", index, "available_runs", bp.available_runs as f64)?;
                at_most("blueprints", index, "available_runs", bp.available_runs, MAX_RUNS)?;
            }
        }

        Ok(())
    }
}

fn positive(
    section: &'static str,
    index: usize,
    field: &'static str,
    value: i64,
) -> Result<(), PatchError> {
    if value <= 0 {
        return Err(PatchError::NotPositive {
            section,
            index,
            field,
            value,
        });
    }
    Ok(())
}

fn at_most(
    section: &'static str,
    index: usize,
    field: &'static str,
    value: i64,
    max: i64,
) -> Result<(), PatchError> {
    if value > max {
        return Err(PatchError::TooLarge {
            section,
            index,
            field,
            value,
            max,
        });
    }
    Ok(())
}

fn not_negative(
    section: &'static str,
    index: usize,
    field: &'static str,
    value: f64,
) -> Result<(), PatchError> {
    if value < 0.0 {
        return Err(PatchError::Negative {
            section,
            index,
            field,
            value,
        });
    }
    Ok(())
}

fn invalid(section: &'static str, index: usize, message: impl Into<String>) -> PatchError {
    PatchError::Invalid {
        section,
        index,
        message: message.into(),
    }
}
