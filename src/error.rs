//! Run-level error taxonomy
//!
//! Section-level failures never show up here; the orchestrator records them
//! as failed sections. What remains is what the caller has to handle.

use thiserror::Error;

use crate::config::ConfigError;
use crate::db::StoreError;
use crate::models::RunStatus;

#[derive(Debug, Error)]
pub enum AuditError {
    /// Bad invocation parameters; no run row was written
    #[error("invalid audit configuration: {0}")]
    Configuration(String),

    /// No requested service is usable. The failed run row is kept when one was created
    #[error("service validation failed: {detail}")]
    Validation { run_id: Option<i64>, detail: String },

    #[error("findings store failure: {0}")]
    Storage(#[source] StoreError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Comparison needs both runs finalized
    #[error("run {run_id} is {status}; only finalized runs can be compared")]
    NotComparable { run_id: i64, status: RunStatus },
}

impl From<StoreError> for AuditError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => AuditError::NotFound { entity, id },
            other => AuditError::Storage(other),
        }
    }
}

impl From<ConfigError> for AuditError {
    fn from(err: ConfigError) -> Self {
        AuditError::Configuration(err.to_string())
    }
}

impl AuditError {
    /// Run this error belongs to, when one was persisted
    pub fn run_id(&self) -> Option<i64> {
        match self {
            AuditError::Validation { run_id, .. } => *run_id,
            AuditError::NotComparable { run_id, .. } => Some(*run_id),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
