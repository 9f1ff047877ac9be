use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Error returned when a stored or user-supplied enum string is not a known
/// variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value:?}")]
pub struct InvalidEnumValue {
    pub kind: &'static str,
    pub value: String,
}

impl InvalidEnumValue {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Planned,
    Active,
    Completed,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Planned => "planned",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "planned" => Ok(Self::Planned),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            other => Err(InvalidEnumValue::new("project status", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Planning strategy of a project. Seeds the scheduler defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Balanced => "balanced",
            Self::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conservative" => Ok(Self::Conservative),
            "balanced" => Ok(Self::Balanced),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(InvalidEnumValue::new("strategy", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Planned,
    Ready,
    Active,
    Paused,
    Completed,
    Blocked,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Ready => "ready",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "ready" => Ok(Self::Ready),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "blocked" => Ok(Self::Blocked),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(InvalidEnumValue::new("task status", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Lifecycle status of a job.
///
/// ```text
/// planned | queued | paused  -- non-terminal, never carry finished_at
/// active                     -- non-terminal, stamps started_at on entry
/// completed | failed | cancelled -- terminal, stamp finished_at on entry
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Planned,
    Queued,
    Active,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        Self::Planned,
        Self::Queued,
        Self::Active,
        Self::Paused,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Queued => "queued",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Completed, failed and cancelled jobs carry a finish time.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Statuses the scheduler keeps as declared instead of forcing the
    /// queue status: work that is already running or already over.
    pub fn is_committed(self) -> bool {
        self == Self::Active || self.is_terminal()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "queued" => Ok(Self::Queued),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(InvalidEnumValue::new("job status", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Where the unmet part of a material requirement is expected to come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MaterialSource {
    #[default]
    Market,
    Stock,
    Build,
    Reprocess,
    Contract,
}

impl MaterialSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Stock => "stock",
            Self::Build => "build",
            Self::Reprocess => "reprocess",
            Self::Contract => "contract",
        }
    }

    /// Sources that mean "produce it ourselves".
    pub fn is_build_like(self) -> bool {
        matches!(self, Self::Build | Self::Reprocess)
    }
}

impl fmt::Display for MaterialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaterialSource {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "market" => Ok(Self::Market),
            "stock" => Ok(Self::Stock),
            "build" => Ok(Self::Build),
            "reprocess" => Ok(Self::Reprocess),
            "contract" => Ok(Self::Contract),
            other => Err(InvalidEnumValue::new("material source", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A project -- the top-level planning unit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub status: ProjectStatus,
    pub strategy: Strategy,
    pub notes: String,
    pub params: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task -- a node in a project's task forest.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: i64,
    pub user_id: String,
    pub project_id: i64,
    pub parent_task_id: Option<i64>,
    pub name: String,
    pub activity: String,
    pub product_type_id: Option<i64>,
    pub target_runs: i64,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    pub priority: i32,
    pub status: TaskStatus,
    pub constraints: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A job -- a bounded unit of production work.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    pub id: i64,
    pub user_id: String,
    pub project_id: i64,
    pub task_id: Option<i64>,
    pub activity: String,
    pub runs: i64,
    pub duration_seconds: i64,
    pub cost_isk: f64,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A material requirement row for one item type within a task.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MaterialPlan {
    pub id: i64,
    pub user_id: String,
    pub project_id: i64,
    pub task_id: Option<i64>,
    pub type_id: i64,
    pub required_qty: i64,
    pub available_qty: i64,
    pub buy_qty: i64,
    pub build_qty: i64,
    pub unit_cost_isk: f64,
    pub source: MaterialSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A blueprint pool row. BPO rows are unlimited and keep `available_runs`
/// at zero.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BlueprintPool {
    pub id: i64,
    pub user_id: String,
    pub project_id: i64,
    pub blueprint_type_id: i64,
    pub location_id: Option<i64>,
    pub is_bpo: bool,
    pub available_runs: i64,
    pub material_efficiency: i32,
    pub time_efficiency: i32,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_parses_every_variant() {
        for status in JobStatus::ALL {
            let parsed: JobStatus = status.to_string().parse().expect("should parse");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn job_status_terminal_set() {
        let terminal: Vec<_> = JobStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled]
        );
        assert!(JobStatus::Active.is_committed());
        assert!(!JobStatus::Paused.is_committed());
        assert!(!JobStatus::Queued.is_committed());
    }

    #[test]
    fn invalid_values_name_their_kind() {
        let err = "running".parse::<JobStatus>().unwrap_err();
        assert_eq!(err.to_string(), "invalid job status: \"running\"");

        let err = "reckless".parse::<Strategy>().unwrap_err();
        assert_eq!(err.kind, "strategy");

        assert!("archived".parse::<ProjectStatus>().is_ok());
        assert!("blocked".parse::<TaskStatus>().is_ok());
        assert!("lp_store".parse::<MaterialSource>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&MaterialSource::Reprocess).unwrap();
        assert_eq!(json, "\"reprocess\"");
        let strategy: Strategy = serde_json::from_str("\"aggressive\"").unwrap();
        assert_eq!(strategy, Strategy::Aggressive);
        assert_eq!(Strategy::default(), Strategy::Balanced);
    }

    #[test]
    fn build_like_sources() {
        assert!(MaterialSource::Build.is_build_like());
        assert!(MaterialSource::Reprocess.is_build_like());
        assert!(!MaterialSource::Contract.is_build_like());
    }
}
