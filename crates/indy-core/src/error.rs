//! Error taxonomy for engine entry points.
//!
//! Ambiguous references and infeasible work are not errors: they surface as
//! warning strings on the plan summary and the rest of the plan still
//! applies.

use thiserror::Error;

use indy_db::models::InvalidEnumValue;

/// Errors returned by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input. Nothing was written.
    #[error("validation error: {0}")]
    Validation(String),

    /// The entity does not exist, or belongs to another user.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A storage failure. Inside `apply_plan` this means the whole
    /// transaction was rolled back.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<InvalidEnumValue> for EngineError {
    fn from(err: InvalidEnumValue) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(anyhow::Error::new(err))
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Reject non-positive ids up front.
pub(crate) fn require_positive_id(entity: &'static str, id: i64) -> EngineResult<()> {
    if id <= 0 {
        return Err(EngineError::validation(format!(
            "{entity} id must be positive, got {id}"
        )));
    }
    Ok(())
}
