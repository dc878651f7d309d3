//! Findings store error types

use thiserror::Error;

/// Errors from findings store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced run or section does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The row is not in a state that allows the requested change
    #[error("{entity} {id} is already {status}")]
    InvalidTransition {
        entity: &'static str,
        id: i64,
        status: String,
    },

    /// A section with this name was already started for the run
    #[error("section '{name}' already exists for run {run_id}")]
    DuplicateSection { run_id: i64, name: String },

    /// Caller supplied a value the store refuses to persist
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A SQL statement failed
    #[error("{context}: {source}")]
    Query {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to serialize column: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the error means the storage layer itself is broken, as opposed
    /// to a caller asking for something the contract does not allow
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            StoreError::Query { .. } | StoreError::Serialization(_) | StoreError::Io(_)
        )
    }

    /// Extended SQLite result code of the underlying failure, if any
    pub(crate) fn sqlite_extended_code(&self) -> Option<i32> {
        match self {
            StoreError::Query {
                source: rusqlite::Error::SqliteFailure(err, _),
                ..
            } => Some(err.extended_code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Attaches a static description to a rusqlite failure
pub(crate) trait QueryContext<T> {
    fn context(self, context: &'static str) -> Result<T>;
}

impl<T> QueryContext<T> for std::result::Result<T, rusqlite::Error> {
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|source| StoreError::Query { context, source })
    }
}
