use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "completed_with_errors" => Some(RunStatus::CompletedWithErrors),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses are exactly the ones that carry a completion timestamp
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters an audit was invoked with, persisted as JSON on the run row
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InvocationParams {
    #[serde(default)]
    pub requested_services: Vec<String>,
    #[serde(default)]
    pub intensive: bool,
    #[serde(default)]
    pub section_timeout_secs: Option<u64>,
}

/// One audit execution against a domain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub id: i64,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub domain: Option<String>,
    pub invocation_params: Option<InvocationParams>,
    pub skipped_services: Vec<String>,
    pub status: RunStatus,
}

impl Run {
    pub fn is_finalized(&self) -> bool {
        self.completed_at.is_some()
    }
}
