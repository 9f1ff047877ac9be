//! Database query functions for the `jobs` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::models::{Job, JobStatus};

/// Parameters for inserting a new job row.
#[derive(Debug, Clone)]
pub struct NewJob {
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
}

/// Insert a new job row.
pub async fn insert_job<'e>(exec: impl PgExecutor<'e>, user_id: &str, new: &NewJob) -> Result<Job> {
    let job = sqlx::query_as::<_, Job>(
        "INSERT INTO jobs \
         (user_id, project_id, task_id, activity, runs, duration_seconds, cost_isk, \
          status, started_at, finished_at, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         RETURNING *",
    )
    .bind(user_id)
    .bind(new.project_id)
    .bind(new.task_id)
    .bind(&new.activity)
    .bind(new.runs)
    .bind(new.duration_seconds)
    .bind(new.cost_isk)
    .bind(new.status)
    .bind(new.started_at)
    .bind(new.finished_at)
    .bind(&new.notes)
    .fetch_one(exec)
    .await
    .with_context(|| {
        format!(
            "failed to insert job ({} runs) for project {}",
            new.runs, new.project_id
        )
    })?;

    Ok(job)
}

/// List all jobs of a project in id order.
pub async fn list_jobs_for_project<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    project_id: i64,
) -> Result<Vec<Job>> {
    let jobs = sqlx::query_as::<_, Job>(
        "SELECT * FROM jobs WHERE project_id = $1 AND user_id = $2 ORDER BY id ASC",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_all(exec)
    .await
    .with_context(|| format!("failed to list jobs for project {project_id}"))?;

    Ok(jobs)
}

/// Fetch the given jobs and lock them for the rest of the transaction.
///
/// Ids the user does not own are simply absent from the result.
pub async fn lock_jobs<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    ids: &[i64],
) -> Result<Vec<Job>> {
    let jobs = sqlx::query_as::<_, Job>(
        "SELECT * FROM jobs WHERE id = ANY($1) AND user_id = $2 ORDER BY id ASC FOR UPDATE",
    )
    .bind(ids)
    .bind(user_id)
    .fetch_all(exec)
    .await
    .context("failed to lock jobs")?;

    Ok(jobs)
}

/// Write a job's status, timestamps and (optionally) notes.
///
/// Timestamps are written as given: the caller owns the state-machine
/// rules. `notes = None` leaves the existing notes untouched.
pub async fn update_job_status<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    id: i64,
    status: JobStatus,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    notes: Option<&str>,
) -> Result<Option<Job>> {
    let job = sqlx::query_as::<_, Job>(
        "UPDATE jobs \
         SET status = $1, \
             started_at = $2, \
             finished_at = $3, \
             notes = COALESCE($4, notes), \
             updated_at = now() \
         WHERE id = $5 AND user_id = $6 \
         RETURNING *",
    )
    .bind(status)
    .bind(started_at)
    .bind(finished_at)
    .bind(notes)
    .bind(id)
    .bind(user_id)
    .fetch_optional(exec)
    .await
    .with_context(|| format!("failed to update status of job {id}"))?;

    Ok(job)
}

/// Delete every job of a project. Returns the number of rows removed.
pub async fn delete_jobs_for_project<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    project_id: i64,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM jobs WHERE project_id = $1 AND user_id = $2")
        .bind(project_id)
        .bind(user_id)
        .execute(exec)
        .await
        .with_context(|| format!("failed to delete jobs for project {project_id}"))?;

    Ok(result.rows_affected())
}
