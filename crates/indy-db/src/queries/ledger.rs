//! Read-side job ledger queries across a user's projects.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};

use crate::models::JobStatus;

/// A job row joined with its project and task names.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerRow {
    pub id: i64,
    pub project_id: i64,
    pub project_name: String,
    pub task_id: Option<i64>,
    pub task_name: Option<String>,
    pub activity: String,
    pub runs: i64,
    pub duration_seconds: i64,
    pub cost_isk: f64,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub notes: String,
    pub updated_at: DateTime<Utc>,
}

/// Per-status count and cost over a filtered job set.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StatusTotal {
    pub status: JobStatus,
    pub jobs: i64,
    pub cost_isk: f64,
}

/// Most recently updated jobs first, optionally filtered by project and
/// status.
pub async fn list_ledger<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    project_id: Option<i64>,
    status: Option<JobStatus>,
    limit: i64,
) -> Result<Vec<LedgerRow>> {
    let rows = sqlx::query_as::<_, LedgerRow>(
        "SELECT j.id, j.project_id, p.name AS project_name, j.task_id, t.name AS task_name, \
                j.activity, j.runs, j.duration_seconds, j.cost_isk, j.status, \
                j.started_at, j.finished_at, j.notes, j.updated_at \
         FROM jobs j \
         JOIN projects p ON p.id = j.project_id AND p.user_id = j.user_id \
         LEFT JOIN tasks t ON t.id = j.task_id \
         WHERE j.user_id = $1 \
           AND ($2::BIGINT IS NULL OR j.project_id = $2) \
           AND ($3::TEXT IS NULL OR j.status = $3) \
         ORDER BY j.updated_at DESC, j.id DESC \
         LIMIT $4",
    )
    .bind(user_id)
    .bind(project_id)
    .bind(status)
    .bind(limit)
    .fetch_all(exec)
    .await
    .context("failed to list job ledger")?;

    Ok(rows)
}

/// Count and cost per status over the same filter as [`list_ledger`],
/// ignoring the page limit.
pub async fn ledger_totals<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    project_id: Option<i64>,
    status: Option<JobStatus>,
) -> Result<Vec<StatusTotal>> {
    let rows = sqlx::query_as::<_, StatusTotal>(
        "SELECT j.status, COUNT(*) AS jobs, COALESCE(SUM(j.cost_isk), 0)::FLOAT8 AS cost_isk \
         FROM jobs j \
         WHERE j.user_id = $1 \
           AND ($2::BIGINT IS NULL OR j.project_id = $2) \
           AND ($3::TEXT IS NULL OR j.status = $3) \
         GROUP BY j.status \
         ORDER BY j.status",
    )
    .bind(user_id)
    .bind(project_id)
    .bind(status)
    .fetch_all(exec)
    .await
    .context("failed to total job ledger")?;

    Ok(rows)
}
