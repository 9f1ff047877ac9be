//! Scheduler configuration: strategy profiles plus per-patch overrides.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use indy_db::models::{JobStatus, Strategy};

use crate::error::{EngineError, EngineResult};

const SECONDS_PER_DAY: i64 = 86_400;

/// Longest accepted scheduling window, ten years.
pub const MAX_WINDOW_DAYS: i64 = 3650;

/// Most production slots one scheduling call will lay out.
pub const MAX_SLOTS: i64 = 1024;

/// Scheduler options as written in a plan patch. Every field except
/// `enabled` overrides the project's strategy profile when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerOptions {
    pub enabled: bool,
    pub slot_count: Option<i64>,
    pub max_job_runs: Option<i64>,
    pub max_job_duration_seconds: Option<i64>,
    pub window_days: Option<i64>,
    pub queue_status: Option<JobStatus>,
    pub start_at: Option<DateTime<Utc>>,
}

/// Defaults seeded by a project's strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyProfile {
    pub slot_count: usize,
    pub max_job_runs: i64,
    pub max_job_duration_seconds: i64,
    pub window_days: i64,
    pub queue_status: JobStatus,
}

impl StrategyProfile {
    pub fn for_strategy(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Conservative => Self {
                slot_count: 1,
                max_job_runs: 50,
                max_job_duration_seconds: 12 * 3600,
                window_days: 30,
                queue_status: JobStatus::Planned,
            },
            Strategy::Balanced => Self {
                slot_count: 2,
                max_job_runs: 200,
                max_job_duration_seconds: 24 * 3600,
                window_days: 30,
                queue_status: JobStatus::Queued,
            },
            Strategy::Aggressive => Self {
                slot_count: 4,
                max_job_runs: 400,
                max_job_duration_seconds: 72 * 3600,
                window_days: 30,
                queue_status: JobStatus::Queued,
            },
        }
    }
}

/// Effective settings for one scheduling call.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub slot_count: usize,
    pub max_job_runs: i64,
    /// Already clamped to the window length.
    pub max_job_duration_seconds: i64,
    pub window_days: i64,
    pub queue_status: JobStatus,
    pub start_at: DateTime<Utc>,
    /// `start_at` plus the window. Nothing is placed at or after it.
    pub horizon_end: DateTime<Utc>,
}

impl SchedulerConfig {
    /// Merge `options` over the profile for `strategy`. `now` is used when
    /// the options carry no start time.
    pub fn resolve(
        strategy: Strategy,
        options: &SchedulerOptions,
        now: DateTime<Utc>,
    ) -> EngineResult<Self> {
        let profile = StrategyProfile::for_strategy(strategy);

        let slot_count = match positive("slot_count", options.slot_count)? {
            Some(n) => usize::try_from(at_most("slot_count", n, MAX_SLOTS)?)
                .map_err(|_| EngineError::validation("scheduler.slot_count is too large"))?,
            None => profile.slot_count,
        };
        let max_job_runs =
            positive("max_job_runs", options.max_job_runs)?.unwrap_or(profile.max_job_runs);
        let window_days = match positive("window_days", options.window_days)? {
            Some(days) => at_most("window_days", days, MAX_WINDOW_DAYS)?,
            None => profile.window_days,
        };
        let window_seconds = window_days * SECONDS_PER_DAY;
        let max_job_duration_seconds =
            positive("max_job_duration_seconds", options.max_job_duration_seconds)?
                .unwrap_or(profile.max_job_duration_seconds)
                .min(window_seconds);

        let queue_status = options.queue_status.unwrap_or(profile.queue_status);
        if queue_status.is_committed() {
            return Err(EngineError::validation(format!(
                "scheduler.queue_status must be planned, queued or paused, got {queue_status}"
            )));
        }

        let start_at = options.start_at.unwrap_or(now);
        let horizon_end = start_at
            .checked_add_signed(Duration::days(window_days))
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "scheduler.start_at {} plus a {window_days}-day window is out of range",
                    start_at.to_rfc3339()
                ))
            })?;

        Ok(Self {
            slot_count,
            max_job_runs,
            max_job_duration_seconds,
            window_days,
            queue_status,
            start_at,
            horizon_end,
        })
    }
}

fn positive(field: &str, value: Option<i64>) -> EngineResult<Option<i64>> {
    match value {
        Some(v) if v <= 0 => Err(EngineError::validation(format!(
            "scheduler.{field} must be positive, got {v}"
        ))),
        other => Ok(other),
    }
}

fn at_most(field: &str, value: i64, max: i64) -> EngineResult<i64> {
    if value > max {
        return Err(EngineError::validation(format!(
            "scheduler.{field} must be at most {max}, got {value}"
        )));
    }
    Ok(value)
}
