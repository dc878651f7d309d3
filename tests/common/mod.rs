//! Common test helpers for integration tests
//!
//! Isolated on-disk findings databases, scripted checks, a scripted service
//! validator and a progress channel that records what it was told.

#![allow(dead_code)]

use anyhow::Result;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

use gaudit::api::{ApiError, CredentialProvider, ServiceStatus, ServiceValidator, StaticCredentials, WorkspaceApi};
use gaudit::audit::{CancelFlag, Orchestrator, ProgressChannel, ProgressEvent, RunRequest};
use gaudit::checks::{Check, CheckContext, CheckError, CheckOutput, CheckRegistry, FnCheck};
use gaudit::models::{RunStatus, SectionStatus, Severity};
use gaudit::FindingsStore;

/// Findings database in its own temporary directory
///
/// The directory and database are removed when the value is dropped.
pub struct TestStore {
    /// Temporary directory (kept alive until drop)
    temp_dir: TempDir,
    db_path: PathBuf,
    store: FindingsStore,
}

impl TestStore {
    pub fn new(test_name: &str) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join(format!("{}.db", test_name));
        let store = FindingsStore::open(&db_path)?;

        Ok(Self {
            temp_dir,
            db_path,
            store,
        })
    }

    pub fn store(&self) -> &FindingsStore {
        &self.store
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Independent connection to the same database file
    pub fn open(&self) -> Result<FindingsStore> {
        Ok(FindingsStore::open(&self.db_path)?)
    }

    pub fn connection(&self) -> &Connection {
        self.store.connection()
    }

    pub fn count_rows(&self, table: &str) -> Result<i64> {
        let count = self
            .connection()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let mut stmt = self
            .connection()
            .prepare(&format!("PRAGMA table_info({})", table))?;
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<_, _>>()?;
        Ok(columns.iter().any(|c| c == column))
    }

    /// Orchestrator with its own connection to this database
    pub fn orchestrator(
        &self,
        registry: CheckRegistry,
        validator: impl ServiceValidator + 'static,
    ) -> Result<Orchestrator> {
        Ok(Orchestrator::new(
            self.open()?,
            Arc::new(registry),
            Arc::new(validator),
            credentials(),
        ))
    }
}

/// Workspace client that answers every call with an empty object
pub struct NullApi;

impl WorkspaceApi for NullApi {
    fn call(&self, _service: &str, _operation: &str, _params: &serde_json::Value) -> Result<serde_json::Value, ApiError> {
        Ok(serde_json::json!({}))
    }
}

pub fn credentials() -> Arc<dyn CredentialProvider> {
    Arc::new(StaticCredentials::new(Arc::new(NullApi)))
}

/// Validator that accepts everything except the services given failures for
#[derive(Default)]
pub struct ScriptedValidator {
    failures: BTreeMap<String, String>,
}

impl ScriptedValidator {
    pub fn accept_all() -> Self {
        Self::default()
    }

    pub fn failing(mut self, service: &str, detail: &str) -> Self {
        self.failures.insert(service.to_string(), detail.to_string());
        self
    }
}

impl ServiceValidator for ScriptedValidator {
    fn validate_services(&self, requested: &[String]) -> BTreeMap<String, ServiceStatus> {
        requested
            .iter()
            .map(|s| {
                let status = match self.failures.get(s) {
                    Some(detail) => ServiceStatus::Error(detail.clone()),
                    None => ServiceStatus::Ok,
                };
                (s.clone(), status)
            })
            .collect()
    }
}

/// Progress channel that records events and can cancel itself
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
    cancel: CancelFlag,
    cancel_after: Option<usize>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            cancel: CancelFlag::new(),
            cancel_after: None,
        }
    }

    /// Raise the cancel flag once `sections` progress reports were received
    pub fn cancelling_after(sections: usize) -> Self {
        Self {
            cancel_after: Some(sections),
            ..Self::new()
        }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressChannel for RecordingProgress {
    fn report_progress(&self, section_name: &str, index: usize, total: usize) {
        let mut events = self.events.lock().unwrap();
        events.push(ProgressEvent {
            section_name: section_name.to_string(),
            index,
            total,
        });
        if self.cancel_after == Some(events.len()) {
            self.cancel.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Check that always returns the given findings and stats
pub fn scripted_check(
    name: &str,
    services: &[&str],
    findings: &[(Severity, &str)],
    stats: &[(&str, &str)],
) -> impl Check + 'static {
    let findings: Vec<(Severity, String)> = findings.iter().map(|(s, m)| (*s, m.to_string())).collect();
    let stats: Vec<(String, String)> = stats.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();

    FnCheck::new(name, services, move |_ctx: &CheckContext| {
        let mut output = CheckOutput::new();
        for (severity, message) in &findings {
            output.push_finding(*severity, message.clone());
        }
        for (key, value) in &stats {
            output.push_stat(key.clone(), value);
        }
        Ok(output)
    })
}

/// Check that always fails with an API error
pub fn failing_check(name: &str, services: &[&str], code: u16, message: &str) -> impl Check + 'static {
    let message = message.to_string();
    FnCheck::new(name, services, move |_ctx: &CheckContext| {
        Err(CheckError::from(ApiError::new(code, message.clone())))
    })
}

/// Check that works for `duration` unless cancelled first
pub fn slow_check(name: &str, services: &[&str], duration: Duration) -> impl Check + 'static {
    FnCheck::new(name, services, move |ctx: &CheckContext| {
        let started = Instant::now();
        while started.elapsed() < duration {
            if ctx.cancel.is_cancelled() {
                return Err(CheckError::Cancelled);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(CheckOutput::new().stat("elapsed_ms", started.elapsed().as_millis()))
    })
}

pub fn request(services: &[&str]) -> RunRequest {
    RunRequest {
        domain: "example.com".to_string(),
        requested_services: services.iter().map(|s| s.to_string()).collect(),
        skipped_services: vec![],
        intensive: false,
    }
}

/// One section of a run written by [`write_run`]
pub struct SectionSpec<'a> {
    pub name: &'a str,
    pub findings: Vec<(Severity, &'a str)>,
    pub stats: Vec<(&'a str, &'a str)>,
}

pub fn section<'a>(
    name: &'a str,
    findings: Vec<(Severity, &'a str)>,
    stats: Vec<(&'a str, &'a str)>,
) -> SectionSpec<'a> {
    SectionSpec {
        name,
        findings,
        stats,
    }
}

/// Write a finalized run directly through the store
pub fn write_run(store: &FindingsStore, status: RunStatus, sections: &[SectionSpec<'_>]) -> Result<i64> {
    let run_id = store.create_run(Some("example.com"), None, &[])?;
    for spec in sections {
        let section_id = store.start_section(run_id, spec.name)?;
        for (severity, message) in &spec.findings {
            store.insert_finding(section_id, *severity, message)?;
        }
        for (key, value) in &spec.stats {
            store.insert_stat(section_id, key, value)?;
        }
        store.complete_section(section_id, SectionStatus::Succeeded, 1.0)?;
    }
    store.finalize_run(run_id, status)?;
    Ok(run_id)
}
