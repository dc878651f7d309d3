// gaudit - Google Workspace security audit core
// Module re-exports

pub mod api;
pub mod audit;
pub mod checks;
pub mod comparator;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod rate_limiter;
pub mod synthetic;
pub mod utils;

// Re-export commonly used types
pub use models::{
    Finding, Run, RunReport, RunStatus, Section, SectionReport, SectionStatus, Severity, Stat,
};

pub use api::{ApiError, CredentialProvider, ServiceStatus, ServiceValidator, WorkspaceApi};
pub use audit::{CancelFlag, ChannelProgress, Orchestrator, ProgressChannel, RunOutcome, RunRequest};
pub use checks::{Check, CheckContext, CheckError, CheckOutput, CheckRegistry, FnCheck};
pub use comparator::{ComparisonResult, RunComparator, StatDelta};
pub use config::AuditConfig;
pub use db::{get_db_path, init_db, FindingsStore, StoreError};
pub use error::AuditError;
