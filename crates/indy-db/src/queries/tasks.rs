//! Database query functions for the `tasks` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::models::{Task, TaskStatus};

/// Parameters for inserting a new task row.
///
/// Parent links are written separately with [`set_task_parent`] once every
/// task of a patch has an id.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub project_id: i64,
    pub name: String,
    pub activity: String,
    pub product_type_id: Option<i64>,
    pub target_runs: i64,
    pub planned_start: Option<DateTime<Utc>>,
    pub planned_end: Option<DateTime<Utc>>,
    pub priority: i32,
    pub status: TaskStatus,
    pub constraints: serde_json::Value,
}

/// Insert a new task row with no parent.
pub async fn insert_task<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    new: &NewTask,
) -> Result<Task> {
    let task = sqlx::query_as::<_, Task>(
        "INSERT INTO tasks \
         (user_id, project_id, name, activity, product_type_id, target_runs, \
          planned_start, planned_end, priority, status, constraints) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
         RETURNING *",
    )
    .bind(user_id)
    .bind(new.project_id)
    .bind(&new.name)
    .bind(&new.activity)
    .bind(new.product_type_id)
    .bind(new.target_runs)
    .bind(new.planned_start)
    .bind(new.planned_end)
    .bind(new.priority)
    .bind(new.status)
    .bind(&new.constraints)
    .fetch_one(exec)
    .await
    .with_context(|| format!("failed to insert task {:?}", new.name))?;

    Ok(task)
}

/// Point a task at its parent (or detach it with `None`).
///
/// Returns the number of rows affected (0 when the task is not the user's).
pub async fn set_task_parent<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    task_id: i64,
    parent_task_id: Option<i64>,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tasks SET parent_task_id = $1, updated_at = now() \
         WHERE id = $2 AND user_id = $3",
    )
    .bind(parent_task_id)
    .bind(task_id)
    .bind(user_id)
    .execute(exec)
    .await
    .with_context(|| format!("failed to set parent of task {task_id}"))?;

    Ok(result.rows_affected())
}

/// Fetch a single task owned by `user_id`.
pub async fn get_task<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    id: i64,
) -> Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(exec)
        .await
        .with_context(|| format!("failed to fetch task {id}"))?;

    Ok(task)
}

/// List all tasks of a project in id order.
pub async fn list_tasks_for_project<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    project_id: i64,
) -> Result<Vec<Task>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE project_id = $1 AND user_id = $2 ORDER BY id ASC",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_all(exec)
    .await
    .with_context(|| format!("failed to list tasks for project {project_id}"))?;

    Ok(tasks)
}

/// Delete every task of a project. Returns the number of rows removed.
pub async fn delete_tasks_for_project<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    project_id: i64,
) -> Result<u64> {
    let result = sqlx::query("DELETE FROM tasks WHERE project_id = $1 AND user_id = $2")
        .bind(project_id)
        .bind(user_id)
        .execute(exec)
        .await
        .with_context(|| format!("failed to delete tasks for project {project_id}"))?;

    Ok(result.rows_affected())
}
