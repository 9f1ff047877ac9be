//! Project service.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tracing::info;

use indy_db::models::{Project, ProjectStatus, Strategy};
use indy_db::queries::projects::{self as project_db, NewProject};

use crate::error::{EngineError, EngineResult, require_positive_id};

/// Input for [`create_project`]. Everything but the name is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateProject {
    pub name: String,
    pub status: Option<ProjectStatus>,
    pub strategy: Option<Strategy>,
    pub notes: Option<String>,
    pub params: Option<Value>,
}

impl CreateProject {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    fn validate(&self) -> EngineResult<NewProject> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(EngineError::validation("project name is required"));
        }
        let params = match &self.params {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(v @ Value::Object(_)) => v.clone(),
            Some(_) => return Err(EngineError::validation("project params must be a JSON object")),
        };
        Ok(NewProject {
            name: name.to_owned(),
            status: self.status.unwrap_or(ProjectStatus::Draft),
            strategy: self.strategy.unwrap_or_default(),
            notes: self.notes.clone().unwrap_or_default(),
            params,
        })
    }
}

pub async fn create_project(
    pool: &PgPool,
    user_id: &str,
    input: &CreateProject,
) -> EngineResult<Project> {
    let new = input.validate()?;
    let project = project_db::insert_project(pool, user_id, &new).await?;
    info!(user = user_id, project_id = project.id, name = %project.name, "created project");
    Ok(project)
}

pub async fn get_project(pool: &PgPool, user_id: &str, project_id: i64) -> EngineResult<Project> {
    require_positive_id("project", project_id)?;
    project_db::get_project(pool, user_id, project_id)
        .await?
        .ok_or_else(|| EngineError::not_found("project", project_id))
}

pub async fn list_projects(pool: &PgPool, user_id: &str) -> EngineResult<Vec<Project>> {
    Ok(project_db::list_projects(pool, user_id).await?)
}

pub async fn update_project_status(
    pool: &PgPool,
    user_id: &str,
    project_id: i64,
    status: ProjectStatus,
) -> EngineResult<Project> {
    require_positive_id("project", project_id)?;
    let project = project_db::update_project_status(pool, user_id, project_id, status)
        .await?
        .ok_or_else(|| EngineError::not_found("project", project_id))?;
    info!(user = user_id, project_id, %status, "updated project status");
    Ok(project)
}
