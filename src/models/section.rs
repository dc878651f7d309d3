use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SectionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl SectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionStatus::Pending => "pending",
            SectionStatus::Running => "running",
            SectionStatus::Succeeded => "succeeded",
            SectionStatus::Failed => "failed",
            SectionStatus::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SectionStatus::Pending),
            "running" => Some(SectionStatus::Running),
            "succeeded" => Some(SectionStatus::Succeeded),
            "failed" => Some(SectionStatus::Failed),
            "skipped" => Some(SectionStatus::Skipped),
            _ => None,
        }
    }

    /// A section is finished once it has been closed with an outcome
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            SectionStatus::Succeeded | SectionStatus::Failed | SectionStatus::Skipped
        )
    }
}

impl std::fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution record of one check within a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub id: i64,
    pub run_id: i64,
    pub name: String,
    pub status: SectionStatus,
    pub duration_s: Option<f64>,
}
