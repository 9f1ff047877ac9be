//! Database query functions for the `projects` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;

use crate::models::{Project, ProjectStatus, Strategy};

/// Parameters for inserting a new project row.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub status: ProjectStatus,
    pub strategy: Strategy,
    pub notes: String,
    pub params: serde_json::Value,
}

/// Insert a new project row. Returns the inserted project with
/// server-generated defaults (id, timestamps).
pub async fn insert_project<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    new: &NewProject,
) -> Result<Project> {
    let project = sqlx::query_as::<_, Project>(
        "INSERT INTO projects (user_id, name, status, strategy, notes, params) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING *",
    )
    .bind(user_id)
    .bind(&new.name)
    .bind(new.status)
    .bind(new.strategy)
    .bind(&new.notes)
    .bind(&new.params)
    .fetch_one(exec)
    .await
    .with_context(|| format!("failed to insert project {:?}", new.name))?;

    Ok(project)
}

/// Fetch a project owned by `user_id`.
pub async fn get_project<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    id: i64,
) -> Result<Option<Project>> {
    let project =
        sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(exec)
            .await
            .with_context(|| format!("failed to fetch project {id}"))?;

    Ok(project)
}

/// Fetch a project and lock its row until the surrounding transaction ends.
///
/// Concurrent plan applications on the same project queue up here.
pub async fn lock_project<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    id: i64,
) -> Result<Option<Project>> {
    let project = sqlx::query_as::<_, Project>(
        "SELECT * FROM projects WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(exec)
    .await
    .with_context(|| format!("failed to lock project {id}"))?;

    Ok(project)
}

/// List a user's projects, newest first.
pub async fn list_projects<'e>(exec: impl PgExecutor<'e>, user_id: &str) -> Result<Vec<Project>> {
    let projects = sqlx::query_as::<_, Project>(
        "SELECT * FROM projects WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(exec)
    .await
    .context("failed to list projects")?;

    Ok(projects)
}

/// Set a project's status. Returns `None` when the project does not exist
/// for this user.
pub async fn update_project_status<'e>(
    exec: impl PgExecutor<'e>,
    user_id: &str,
    id: i64,
    status: ProjectStatus,
) -> Result<Option<Project>> {
    let project = sqlx::query_as::<_, Project>(
        "UPDATE projects \
         SET status = $1, updated_at = now() \
         WHERE id = $2 AND user_id = $3 \
         RETURNING *",
    )
    .bind(status)
    .bind(id)
    .bind(user_id)
    .fetch_optional(exec)
    .await
    .with_context(|| format!("failed to update status of project {id}"))?;

    Ok(project)
}

/// Bump `updated_at` without changing anything else.
pub async fn touch_project<'e>(exec: impl PgExecutor<'e>, user_id: &str, id: i64) -> Result<()> {
    sqlx::query("UPDATE projects SET updated_at = now() WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(exec)
        .await
        .with_context(|| format!("failed to touch project {id}"))?;

    Ok(())
}
