//! In-memory job rows flowing through the gate and the scheduler.

use chrono::{DateTime, Utc};
use serde::Serialize;

use indy_db::models::JobStatus;
use indy_db::queries::jobs::NewJob;

/// A job that has not been written yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobDraft {
    /// Resolved task id. Negative in previews.
    pub task_id: Option<i64>,
    pub activity: String,
    pub runs: i64,
    pub duration_seconds: i64,
    pub cost_isk: f64,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub notes: String,
    /// Production slot the scheduler placed this chunk on.
    pub slot: Option<usize>,
    /// Set when the scheduler could not fit these runs in the horizon.
    pub deferred: bool,
}

impl JobDraft {
    pub fn new(task_id: Option<i64>, activity: impl Into<String>, runs: i64) -> Self {
        Self {
            task_id,
            activity: activity.into(),
            runs,
            duration_seconds: 0,
            cost_isk: 0.0,
            status: JobStatus::Planned,
            started_at: None,
            finished_at: None,
            notes: String::new(),
            slot: None,
            deferred: false,
        }
    }

    /// Seconds per run, 0 for an empty job.
    pub fn per_run_seconds(&self) -> f64 {
        if self.runs > 0 {
            self.duration_seconds as f64 / self.runs as f64
        } else {
            0.0
        }
    }

    pub fn per_run_cost(&self) -> f64 {
        if self.runs > 0 {
            self.cost_isk / self.runs as f64
        } else {
            0.0
        }
    }

    /// Copy of this job holding `runs` runs, with duration and cost scaled
    /// by the same ratio.
    pub fn scaled(&self, runs: i64) -> Self {
        let mut out = self.clone();
        if self.runs > 0 {
            let ratio = runs as f64 / self.runs as f64;
            out.duration_seconds = (self.duration_seconds as f64 * ratio).round() as i64;
            out.cost_isk = self.cost_isk * ratio;
        }
        out.runs = runs;
        out
    }

    pub fn append_note(&mut self, note: &str) {
        if self.notes.is_empty() {
            self.notes = note.to_owned();
        } else {
            self.notes.push_str("; ");
            self.notes.push_str(note);
        }
    }

    pub fn into_new_job(self, project_id: i64) -> NewJob {
        NewJob {
            project_id,
            task_id: self.task_id,
            activity: self.activity,
            runs: self.runs,
            duration_seconds: self.duration_seconds,
            cost_isk: self.cost_isk,
            status: self.status,
            started_at: self.started_at,
            finished_at: self.finished_at,
            notes: self.notes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_keeps_ratio() {
        let mut job = JobDraft::new(Some(1), "manufacturing", 10);
        job.duration_seconds = 1000;
        job.cost_isk = 500.0;
        let half = job.scaled(4);
        assert_eq!(half.runs, 4);
        assert_eq!(half.duration_seconds, 400);
        assert!((half.cost_isk - 200.0).abs() < 1e-9);
    }

    #[test]
    fn notes_are_joined() {
        let mut job = JobDraft::new(None, "copying", 1);
        job.append_note("first");
        job.append_note("second");
        assert_eq!(job.notes, "first; second");
    }
}
