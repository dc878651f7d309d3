use serde::{Deserialize, Serialize};

use super::{Finding, Run, Section, Stat};

/// A section with everything it recorded, in insertion order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionReport {
    pub section: Section,
    pub findings: Vec<Finding>,
    pub stats: Vec<Stat>,
}

/// A run with its sections, used by report generation and analytics views
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub run: Run,
    pub sections: Vec<SectionReport>,
}

impl RunReport {
    pub fn finding_count(&self) -> usize {
        self.sections.iter().map(|s| s.findings.len()).sum()
    }

    pub fn section(&self, name: &str) -> Option<&SectionReport> {
        self.sections.iter().find(|s| s.section.name == name)
    }
}
