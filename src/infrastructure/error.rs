use crate::domain::error::ScheduleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Credential error: {0}")]
    Credential(String),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

impl InfraError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, InfraError::NotFound(_))
    }

    /// Failures that callers absorb by falling back to local state.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            InfraError::Store(_) | InfraError::Sqlite(_) | InfraError::Io(_) | InfraError::Json(_)
        )
    }
}
