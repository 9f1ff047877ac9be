//! Job status updates.
//!
//! ```text
//! planned | queued | paused  -- no finish time
//! active                     -- stamps started_at when absent, no finish time
//! completed | failed | cancelled
//!                            -- terminal, stamps finished_at on entry
//! ```
//!
//! Any status may be set from any other; terminal jobs can be reopened
//! by an explicit update.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;

use indy_db::models::{Job, JobStatus};
use indy_db::queries::jobs as job_db;

use crate::error::{EngineError, EngineResult, require_positive_id};

/// A requested status change, as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusUpdate {
    pub status: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    /// Replaces the job's notes when present.
    #[serde(default)]
    pub notes: Option<String>,
}

/// [`JobStatusUpdate`] after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUpdate {
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl JobStatusUpdate {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status: status.as_str().to_owned(),
            ..Default::default()
        }
    }

    pub fn parse(&self) -> EngineResult<ParsedUpdate> {
        let status: JobStatus = self.status.trim().parse()?;
        let started_at = parse_timestamp("started_at", self.started_at.as_deref())?;
        let finished_at = parse_timestamp("finished_at", self.finished_at.as_deref())?;

        if finished_at.is_some() && !status.is_terminal() {
            return Err(EngineError::validation(format!(
                "finished_at is only allowed for terminal statuses, not {status}"
            )));
        }
        if let (Some(s), Some(f)) = (started_at, finished_at) {
            if f < s {
                return Err(EngineError::validation("finished_at is before started_at"));
            }
        }

        Ok(ParsedUpdate {
            status,
            started_at,
            finished_at,
            notes: self.notes.clone(),
        })
    }
}

fn parse_timestamp(field: &str, value: Option<&str>) -> EngineResult<Option<DateTime<Utc>>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(text)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| EngineError::validation(format!("{field} must be RFC3339, got {text:?}"))),
    }
}

/// New `(started_at, finished_at)` for a job moving to `update.status`.
///
/// Non-terminal statuses drop the finish time. A job entering a terminal
/// status from a non-terminal one gets a fresh finish time, since any
/// finish it carried was only the scheduler's estimate.
pub fn transition_timestamps(
    job: &Job,
    update: &ParsedUpdate,
    now: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let mut started = update.started_at.or(job.started_at);
    if update.status == JobStatus::Active && started.is_none() {
        started = Some(now);
    }

    let finished = if !update.status.is_terminal() {
        None
    } else if let Some(at) = update.finished_at {
        Some(at)
    } else if job.status.is_terminal() {
        job.finished_at.or(Some(now))
    } else {
        Some(now)
    };

    (started, finished)
}

pub async fn update_job_status(
    pool: &PgPool,
    user_id: &str,
    job_id: i64,
    update: &JobStatusUpdate,
) -> EngineResult<Job> {
    let mut jobs = update_job_statuses(pool, user_id, &[job_id], update).await?;
    jobs.pop().ok_or_else(|| EngineError::not_found("job", job_id))
}

/// Apply one update to several jobs. Every id must exist for `user_id`;
/// otherwise nothing changes and the first missing id is reported.
pub async fn update_job_statuses(
    pool: &PgPool,
    user_id: &str,
    job_ids: &[i64],
    update: &JobStatusUpdate,
) -> EngineResult<Vec<Job>> {
    if job_ids.is_empty() {
        return Err(EngineError::validation("at least one job id is required"));
    }
    for &id in job_ids {
        require_positive_id("job", id)?;
    }
    let parsed = update.parse()?;
    let ids: Vec<i64> = job_ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();

    let mut tx = pool.begin().await?;
    let locked = job_db::lock_jobs(&mut *tx, user_id, &ids).await?;
    if let Some(missing) = ids.iter().find(|id| !locked.iter().any(|j| j.id == **id)) {
        return Err(EngineError::not_found("job", *missing));
    }

    let now = Utc::now();
    let mut updated = Vec::with_capacity(locked.len());
    for job in &locked {
        let (started, finished) = transition_timestamps(job, &parsed, now);
        let row = job_db::update_job_status(
            &mut *tx,
            user_id,
            job.id,
            parsed.status,
            started,
            finished,
            parsed.notes.as_deref(),
        )
        .await?
        .ok_or_else(|| EngineError::not_found("job", job.id))?;
        updated.push(row);
    }

    tx.commit().await?;

    info!(user = user_id, jobs = updated.len(), status = %parsed.status, "updated job status");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn job(status: JobStatus) -> Job {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Job {
            id: 1,
            user_id: "u".into(),
            project_id: 1,
            task_id: None,
            activity: "manufacturing".into(),
            runs: 1,
            duration_seconds: 60,
            cost_isk: 0.0,
            status,
            started_at: None,
            finished_at: None,
            notes: String::new(),
            created_at: at,
            updated_at: at,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn rejects_bad_timestamps_and_statuses() {
        let mut u = JobStatusUpdate::new(JobStatus::Active);
        u.started_at = Some("yesterday".into());
        let err = u.parse().unwrap_err();
        assert!(err.to_string().contains("started_at must be RFC3339"));

        let u = JobStatusUpdate {
            status: "done".into(),
            ..Default::default()
        };
        assert!(u.parse().unwrap_err().is_validation());

        let mut u = JobStatusUpdate::new(JobStatus::Queued);
        u.finished_at = Some("2026-01-01T00:00:00Z".into());
        assert!(u.parse().unwrap_err().is_validation());
    }

    #[test]
    fn entering_active_stamps_start() {
        let parsed = JobStatusUpdate::new(JobStatus::Active).parse().unwrap();
        let (s, f) = transition_timestamps(&job(JobStatus::Queued), &parsed, now());
        assert_eq!(s, Some(now()));
        assert_eq!(f, None);
    }

    #[test]
    fn entering_terminal_stamps_finish() {
        let mut j = job(JobStatus::Queued);
        j.started_at = Some(now() - Duration::hours(2));
        j.finished_at = Some(now() + Duration::hours(9));
        let parsed = JobStatusUpdate::new(JobStatus::Completed).parse().unwrap();
        let (s, f) = transition_timestamps(&j, &parsed, now());
        assert_eq!(s, j.started_at);
        assert_eq!(f, Some(now()));
    }

    #[test]
    fn explicit_timestamps_win() {
        let mut u = JobStatusUpdate::new(JobStatus::Failed);
        u.started_at = Some("2026-01-05T10:00:00+02:00".into());
        u.finished_at = Some("2026-01-05T12:00:00Z".into());
        let parsed = u.parse().unwrap();
        let (s, f) = transition_timestamps(&job(JobStatus::Active), &parsed, now());
        assert_eq!(s, Some(Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap()));
        assert_eq!(f, Some(Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap()));
    }

    #[test]
    fn reopening_a_terminal_job_clears_finish() {
        let mut j = job(JobStatus::Completed);
        j.finished_at = Some(now());
        let parsed = JobStatusUpdate::new(JobStatus::Queued).parse().unwrap();
        let (_, f) = transition_timestamps(&j, &parsed, now());
        assert_eq!(f, None);
    }

    #[test]
    fn terminal_to_terminal_keeps_finish() {
        let mut j = job(JobStatus::Completed);
        let earlier = now() - Duration::days(1);
        j.finished_at = Some(earlier);
        let parsed = JobStatusUpdate::new(JobStatus::Failed).parse().unwrap();
        let (_, f) = transition_timestamps(&j, &parsed, now());
        assert_eq!(f, Some(earlier));
    }
}
