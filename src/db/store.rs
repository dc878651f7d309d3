//! Findings store
//!
//! Durable storage for runs, sections, findings, stats and raw objects. Every
//! write is its own transaction; a section only counts as finished once
//! [`FindingsStore::complete_section`] has committed.

use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::Path;

use super::error::{QueryContext, Result, StoreError};
use super::queries;
use crate::models::*;

const SQLITE_CONSTRAINT_UNIQUE: i32 = rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE;

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn require_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StoreError::InvalidArgument(format!(
            "{} must be a non-empty string",
            name
        )));
    }
    Ok(())
}

/// Owner of one SQLite connection to the findings database
pub struct FindingsStore {
    conn: Connection,
}

impl FindingsStore {
    /// Open (creating if needed) the database at `path` and migrate it
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).context("Failed to open findings database")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .context("Failed to set busy timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .context("Failed to enable WAL mode")?;
        Self::from_connection(conn)
    }

    /// In-memory store, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])
            .context("Failed to enable foreign keys")?;
        super::migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Direct access to the underlying connection for ad-hoc reporting queries
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ===== WRITE PATH =====

    pub fn create_run(
        &self,
        domain: Option<&str>,
        invocation_params: Option<&InvocationParams>,
        skipped_services: &[String],
    ) -> Result<i64> {
        let params_json = invocation_params.map(serde_json::to_string).transpose()?;
        let skipped_json = serde_json::to_string(skipped_services)?;

        let run_id = queries::insert_run(
            &self.conn,
            &now(),
            domain,
            params_json.as_deref(),
            &skipped_json,
        )?;
        tracing::debug!(run_id, ?domain, "created run");
        Ok(run_id)
    }

    pub fn finalize_run(&self, run_id: i64, status: RunStatus) -> Result<()> {
        if !status.is_terminal() {
            return Err(StoreError::InvalidArgument(format!(
                "cannot finalize run {} with non-terminal status {}",
                run_id, status
            )));
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin finalize transaction")?;

        if queries::update_run_finalized(&tx, run_id, status, &now())? == 0 {
            return match queries::select_run(&tx, run_id)? {
                None => Err(StoreError::NotFound { entity: "run", id: run_id }),
                Some(run) => Err(StoreError::InvalidTransition {
                    entity: "run",
                    id: run_id,
                    status: run.status.to_string(),
                }),
            };
        }

        tx.commit().context("Failed to commit finalize transaction")?;
        tracing::debug!(run_id, %status, "finalized run");
        Ok(())
    }

    pub fn start_section(&self, run_id: i64, name: &str) -> Result<i64> {
        self.insert_section_row(run_id, name, SectionStatus::Running, None)
    }

    /// Record a section that was never executed: status `skipped`, zero duration
    pub fn record_skipped_section(&self, run_id: i64, name: &str) -> Result<i64> {
        self.insert_section_row(run_id, name, SectionStatus::Skipped, Some(0.0))
    }

    fn insert_section_row(
        &self,
        run_id: i64,
        name: &str,
        status: SectionStatus,
        duration_s: Option<f64>,
    ) -> Result<i64> {
        require_non_empty(name, "section name")?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin section transaction")?;

        let run = queries::select_run(&tx, run_id)?
            .ok_or(StoreError::NotFound { entity: "run", id: run_id })?;
        if run.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                entity: "run",
                id: run_id,
                status: run.status.to_string(),
            });
        }

        let section_id = match queries::insert_section(&tx, run_id, name, status, duration_s) {
            Err(e) if e.sqlite_extended_code() == Some(SQLITE_CONSTRAINT_UNIQUE) => {
                return Err(StoreError::DuplicateSection {
                    run_id,
                    name: name.to_string(),
                });
            }
            other => other?,
        };

        tx.commit().context("Failed to commit section transaction")?;
        Ok(section_id)
    }

    pub fn complete_section(
        &self,
        section_id: i64,
        status: SectionStatus,
        duration_s: f64,
    ) -> Result<()> {
        if !status.is_finished() {
            return Err(StoreError::InvalidArgument(format!(
                "section status must be succeeded, failed or skipped, got {}",
                status
            )));
        }
        if !duration_s.is_finite() || duration_s < 0.0 {
            return Err(StoreError::InvalidArgument(format!(
                "duration must be >= 0, got {}",
                duration_s
            )));
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin section transaction")?;

        if queries::update_section_closed(&tx, section_id, status, duration_s)? == 0 {
            return Err(self.section_not_open(&tx, section_id)?);
        }

        tx.commit().context("Failed to commit section transaction")?;
        Ok(())
    }

    pub fn insert_finding(&self, section_id: i64, severity: Severity, message: &str) -> Result<i64> {
        require_non_empty(message, "message")?;
        self.with_open_section(section_id, |conn| {
            queries::insert_finding(conn, section_id, severity, message)
        })
    }

    pub fn insert_stat(&self, section_id: i64, key: &str, value: &str) -> Result<()> {
        require_non_empty(key, "key")?;
        self.with_open_section(section_id, |conn| {
            queries::insert_stat(conn, section_id, key, value)
        })
    }

    pub fn insert_raw(&self, section_id: i64, payload: &[u8]) -> Result<i64> {
        self.with_open_section(section_id, |conn| {
            queries::insert_raw_object(conn, section_id, payload, &now())
        })
    }

    /// Runs `write` inside a transaction only if the section is still running
    fn with_open_section<T>(
        &self,
        section_id: i64,
        write: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin insert transaction")?;

        match queries::select_section(&tx, section_id)? {
            Some(section) if section.status == SectionStatus::Running => {}
            _ => return Err(self.section_not_open(&tx, section_id)?),
        }

        let value = write(&tx)?;
        tx.commit().context("Failed to commit insert transaction")?;
        Ok(value)
    }

    fn section_not_open(&self, conn: &Connection, section_id: i64) -> Result<StoreError> {
        Ok(match queries::select_section(conn, section_id)? {
            None => StoreError::NotFound {
                entity: "section",
                id: section_id,
            },
            Some(section) => StoreError::InvalidTransition {
                entity: "section",
                id: section_id,
                status: section.status.to_string(),
            },
        })
    }

    /// Delete a run and, by cascade, everything it owns; returns whether a row existed
    pub fn delete_run(&self, run_id: i64) -> Result<bool> {
        let deleted = queries::delete_run(&self.conn, run_id)? > 0;
        if deleted {
            tracing::info!(run_id, "deleted run");
        }
        Ok(deleted)
    }

    // ===== READ PATH =====

    pub fn list_runs(&self) -> Result<Vec<Run>> {
        queries::select_runs(&self.conn)
    }

    pub fn get_run(&self, run_id: i64) -> Result<Option<Run>> {
        queries::select_run(&self.conn, run_id)
    }

    pub fn latest_run(&self) -> Result<Option<Run>> {
        queries::select_latest_run(&self.conn)
    }

    pub fn get_section(&self, section_id: i64) -> Result<Option<Section>> {
        queries::select_section(&self.conn, section_id)
    }

    pub fn get_sections(&self, run_id: i64) -> Result<Vec<Section>> {
        queries::select_sections(&self.conn, run_id)
    }

    pub fn get_findings(&self, section_id: i64) -> Result<Vec<Finding>> {
        queries::select_findings(&self.conn, section_id)
    }

    pub fn get_stats(&self, section_id: i64) -> Result<Vec<Stat>> {
        queries::select_stats(&self.conn, section_id)
    }

    pub fn get_raw_objects(&self, section_id: i64) -> Result<Vec<RawObject>> {
        queries::select_raw_objects(&self.conn, section_id)
    }

    pub fn severity_counts(&self, run_id: i64) -> Result<BTreeMap<Severity, usize>> {
        queries::get_severity_counts(&self.conn, run_id)
    }

    /// Run with every section and what it recorded, or `None` for an unknown id
    pub fn run_report(&self, run_id: i64) -> Result<Option<RunReport>> {
        let Some(run) = self.get_run(run_id)? else {
            return Ok(None);
        };

        let sections = self
            .get_sections(run_id)?
            .into_iter()
            .map(|section| {
                Ok(SectionReport {
                    findings: self.get_findings(section.id)?,
                    stats: self.get_stats(section.id)?,
                    section,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(RunReport { run, sections }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FindingsStore {
        FindingsStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_create_run_defaults() {
        let store = store();
        let run_id = store.create_run(Some("example.com"), None, &[]).unwrap();

        let run = store.get_run(run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.completed_at.is_none());
        assert!(run.invocation_params.is_none());
        assert!(run.skipped_services.is_empty());
    }

    #[test]
    fn test_finalize_sets_completion_timestamp() {
        let store = store();
        let run_id = store.create_run(None, None, &[]).unwrap();
        store.finalize_run(run_id, RunStatus::Completed).unwrap();

        let run = store.get_run(run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.completed_at.is_some());
    }

    #[test]
    fn test_finalize_twice_is_invalid_transition() {
        let store = store();
        let run_id = store.create_run(None, None, &[]).unwrap();
        store.finalize_run(run_id, RunStatus::Failed).unwrap();

        let err = store.finalize_run(run_id, RunStatus::Completed).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { entity: "run", .. }));
    }

    #[test]
    fn test_finalize_unknown_run_is_not_found() {
        let err = store().finalize_run(404, RunStatus::Completed).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "run", id: 404 }));
    }

    #[test]
    fn test_finalize_rejects_running_status() {
        let store = store();
        let run_id = store.create_run(None, None, &[]).unwrap();
        let err = store.finalize_run(run_id, RunStatus::Running).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_duplicate_section_name() {
        let store = store();
        let run_id = store.create_run(None, None, &[]).unwrap();
        store.start_section(run_id, "Groups").unwrap();

        let err = store.start_section(run_id, "Groups").unwrap_err();
        assert!(matches!(err, StoreError::DuplicateSection { .. }));

        // Same name under another run is fine
        let other = store.create_run(None, None, &[]).unwrap();
        assert!(store.start_section(other, "Groups").is_ok());
    }

    #[test]
    fn test_start_section_unknown_or_finalized_run() {
        let store = store();
        assert!(matches!(
            store.start_section(9, "Groups").unwrap_err(),
            StoreError::NotFound { entity: "run", .. }
        ));

        let run_id = store.create_run(None, None, &[]).unwrap();
        store.finalize_run(run_id, RunStatus::Cancelled).unwrap();
        assert!(matches!(
            store.start_section(run_id, "Groups").unwrap_err(),
            StoreError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn test_complete_section_validates_arguments() {
        let store = store();
        let run_id = store.create_run(None, None, &[]).unwrap();
        let section_id = store.start_section(run_id, "Groups").unwrap();

        assert!(matches!(
            store.complete_section(section_id, SectionStatus::Running, 1.0),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.complete_section(section_id, SectionStatus::Succeeded, -0.5),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.complete_section(section_id, SectionStatus::Succeeded, f64::NAN),
            Err(StoreError::InvalidArgument(_))
        ));

        store.complete_section(section_id, SectionStatus::Succeeded, 1.25).unwrap();
        let section = store.get_section(section_id).unwrap().unwrap();
        assert_eq!(section.status, SectionStatus::Succeeded);
        assert_eq!(section.duration_s, Some(1.25));
    }

    #[test]
    fn test_closed_section_refuses_more_writes() {
        let store = store();
        let run_id = store.create_run(None, None, &[]).unwrap();
        let section_id = store.start_section(run_id, "Groups").unwrap();
        store.complete_section(section_id, SectionStatus::Failed, 0.0).unwrap();

        assert!(matches!(
            store.insert_finding(section_id, Severity::Low, "late"),
            Err(StoreError::InvalidTransition { entity: "section", .. })
        ));
        assert!(matches!(
            store.complete_section(section_id, SectionStatus::Succeeded, 0.0),
            Err(StoreError::InvalidTransition { .. })
        ));
        assert!(matches!(
            store.insert_stat(404, "k", "v"),
            Err(StoreError::NotFound { entity: "section", .. })
        ));
    }

    #[test]
    fn test_empty_message_and_key_rejected() {
        let store = store();
        let run_id = store.create_run(None, None, &[]).unwrap();
        let section_id = store.start_section(run_id, "Groups").unwrap();

        assert!(matches!(
            store.insert_finding(section_id, Severity::Low, "   "),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.insert_stat(section_id, "", "v"),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.start_section(run_id, ""),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_raw_objects_round_trip() {
        let store = store();
        let run_id = store.create_run(None, None, &[]).unwrap();
        let section_id = store.start_section(run_id, "Drive Data Security").unwrap();
        store.insert_raw(section_id, br#"{"sharing":"public"}"#).unwrap();

        let raws = store.get_raw_objects(section_id).unwrap();
        assert_eq!(raws.len(), 1);
        assert!(raws[0].captured_at.is_some());
        assert_eq!(raws[0].payload_as_json().unwrap()["sharing"], "public");
    }

    #[test]
    fn test_record_skipped_section() {
        let store = store();
        let run_id = store.create_run(None, None, &[]).unwrap();
        let section_id = store.record_skipped_section(run_id, "MDM Basics").unwrap();

        let section = store.get_section(section_id).unwrap().unwrap();
        assert_eq!(section.status, SectionStatus::Skipped);
        assert_eq!(section.duration_s, Some(0.0));
        assert!(store.get_findings(section_id).unwrap().is_empty());
    }

    #[test]
    fn test_run_report_unknown_run() {
        assert!(store().run_report(1).unwrap().is_none());
    }

    #[test]
    fn test_open_store_persists_across_reopen() {
        let guard = crate::db::test_helpers::TestDbGuard::new();
        let run_id = {
            let store = guard.open().unwrap();
            let run_id = store.create_run(Some("example.com"), None, &[]).unwrap();
            store.finalize_run(run_id, RunStatus::Completed).unwrap();
            run_id
        };

        let reopened = guard.open().unwrap();
        let run = reopened.get_run(run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.domain.as_deref(), Some("example.com"));
    }
}
