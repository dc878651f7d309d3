//! Run comparator
//!
//! Read-only diff of two finalized runs. Findings match on
//! `(section name, severity, message)` exactly; stats are compared per key for
//! sections both runs finished.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::db::FindingsStore;
use crate::error::{AuditError, Result};
use crate::models::{stats_as_map, RunReport, Severity};

/// Finding identity within one section
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComparedFinding {
    pub severity: Severity,
    pub message: String,
}

/// Change of one stat between the baseline and the current run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatDelta {
    /// Both values parsed as numbers; `delta = new - old`
    Numeric { old: f64, new: f64, delta: f64 },
    /// At least one value is not numeric and the strings differ
    Changed { old: String, new: String },
}

impl StatDelta {
    fn between(old: &str, new: &str) -> Option<Self> {
        match (parse_number(old), parse_number(new)) {
            (Some(o), Some(n)) => Some(StatDelta::Numeric {
                old: o,
                new: n,
                delta: n - o,
            }),
            _ if old != new => Some(StatDelta::Changed {
                old: old.to_string(),
                new: new.to_string(),
            }),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, StatDelta::Numeric { delta, .. } if *delta == 0.0)
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub type FindingsBySection = BTreeMap<String, Vec<ComparedFinding>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub baseline_run_id: i64,
    pub current_run_id: i64,
    pub new_findings: FindingsBySection,
    pub resolved_findings: FindingsBySection,
    pub persisting_findings: FindingsBySection,
    /// section name -> stat key -> delta
    pub stat_deltas: BTreeMap<String, BTreeMap<String, StatDelta>>,
    pub sections_added: Vec<String>,
    pub sections_removed: Vec<String>,
}

impl ComparisonResult {
    pub fn new_count(&self) -> usize {
        self.new_findings.values().map(Vec::len).sum()
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved_findings.values().map(Vec::len).sum()
    }

    pub fn persisting_count(&self) -> usize {
        self.persisting_findings.values().map(Vec::len).sum()
    }
}

/// Findings and stats of the finished sections of one run, keyed by section name
struct RunView {
    findings: BTreeMap<String, BTreeSet<ComparedFinding>>,
    stats: BTreeMap<String, BTreeMap<String, String>>,
}

impl RunView {
    fn from_report(report: &RunReport) -> Self {
        let mut findings = BTreeMap::new();
        let mut stats = BTreeMap::new();

        for section in report.sections.iter().filter(|s| s.section.status.is_finished()) {
            let name = section.section.name.clone();
            let set: BTreeSet<ComparedFinding> = section
                .findings
                .iter()
                .map(|f| ComparedFinding {
                    severity: f.severity,
                    message: f.message.clone(),
                })
                .collect();
            findings.insert(name.clone(), set);
            stats.insert(name, stats_as_map(&section.stats));
        }

        Self { findings, stats }
    }

    fn section_names(&self) -> BTreeSet<&String> {
        self.findings.keys().collect()
    }
}

/// Diff two run reports; `baseline` is treated as the earlier run
pub fn compare_reports(baseline: &RunReport, current: &RunReport) -> ComparisonResult {
    let old = RunView::from_report(baseline);
    let new = RunView::from_report(current);
    let empty = BTreeSet::new();

    let mut new_findings = BTreeMap::new();
    let mut resolved_findings = BTreeMap::new();
    let mut persisting_findings = BTreeMap::new();

    let all_sections: BTreeSet<&String> = old.section_names().union(&new.section_names()).copied().collect();
    for section in &all_sections {
        let before = old.findings.get(*section).unwrap_or(&empty);
        let after = new.findings.get(*section).unwrap_or(&empty);

        insert_group(&mut new_findings, section, after.difference(before));
        insert_group(&mut resolved_findings, section, before.difference(after));
        insert_group(&mut persisting_findings, section, before.intersection(after));
    }

    let mut stat_deltas = BTreeMap::new();
    for (section, old_stats) in &old.stats {
        let Some(new_stats) = new.stats.get(section) else {
            continue;
        };
        let deltas: BTreeMap<String, StatDelta> = old_stats
            .iter()
            .filter_map(|(key, old_value)| {
                let new_value = new_stats.get(key)?;
                StatDelta::between(old_value, new_value).map(|d| (key.clone(), d))
            })
            .collect();
        if !deltas.is_empty() {
            stat_deltas.insert(section.clone(), deltas);
        }
    }

    let sections_added = new
        .section_names()
        .difference(&old.section_names())
        .map(|s| s.to_string())
        .collect();
    let sections_removed = old
        .section_names()
        .difference(&new.section_names())
        .map(|s| s.to_string())
        .collect();

    ComparisonResult {
        baseline_run_id: baseline.run.id,
        current_run_id: current.run.id,
        new_findings,
        resolved_findings,
        persisting_findings,
        stat_deltas,
        sections_added,
        sections_removed,
    }
}

fn insert_group<'a>(
    groups: &mut FindingsBySection,
    section: &str,
    findings: impl Iterator<Item = &'a ComparedFinding>,
) {
    let findings: Vec<ComparedFinding> = findings.cloned().collect();
    if !findings.is_empty() {
        groups.insert(section.to_string(), findings);
    }
}

/// Comparator over its own findings store connection
pub struct RunComparator {
    store: FindingsStore,
}

impl RunComparator {
    pub fn new(store: FindingsStore) -> Self {
        Self { store }
    }

    /// Open an independent connection to the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(FindingsStore::open(path)?))
    }

    pub fn compare(&self, baseline_run_id: i64, current_run_id: i64) -> Result<ComparisonResult> {
        let baseline = self.finalized_report(baseline_run_id)?;
        let current = self.finalized_report(current_run_id)?;

        let result = compare_reports(&baseline, &current);
        tracing::debug!(
            baseline_run_id,
            current_run_id,
            new = result.new_count(),
            resolved = result.resolved_count(),
            "compared runs"
        );
        Ok(result)
    }

    fn finalized_report(&self, run_id: i64) -> Result<RunReport> {
        let report = self
            .store
            .run_report(run_id)?
            .ok_or(AuditError::NotFound { entity: "run", id: run_id })?;

        if !report.run.status.is_terminal() {
            return Err(AuditError::NotComparable {
                run_id,
                status: report.run.status,
            });
        }
        Ok(report)
    }
}
