//! Test isolation and database setup helpers
//!
//! Each guard owns a temporary directory holding its own database file

use super::{FindingsStore, StoreError};
use std::path::PathBuf;

/// Test database guard that manages an isolated on-disk findings store
pub struct TestDbGuard {
    pub temp_dir: tempfile::TempDir,
}

impl TestDbGuard {
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().unwrap();
        TestDbGuard { temp_dir }
    }

    pub fn db_path(&self) -> PathBuf {
        self.temp_dir.path().join("gaudit.db")
    }

    /// Open a connection to the guarded database; call repeatedly for independent connections
    pub fn open(&self) -> Result<FindingsStore, StoreError> {
        FindingsStore::open(self.db_path())
    }
}

impl Default for TestDbGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunStatus;

    #[test]
    fn test_database_isolation() {
        {
            let guard1 = TestDbGuard::new();
            let store = guard1.open().unwrap();
            store.create_run(Some("one.example.com"), None, &[]).unwrap();
            assert_eq!(store.list_runs().unwrap().len(), 1);
        }

        let guard2 = TestDbGuard::new();
        let store = guard2.open().unwrap();
        assert!(store.list_runs().unwrap().is_empty());
    }

    #[test]
    fn test_second_connection_sees_committed_rows() {
        let guard = TestDbGuard::new();
        let writer = guard.open().unwrap();
        let reader = guard.open().unwrap();

        let run_id = writer.create_run(None, None, &[]).unwrap();
        writer.finalize_run(run_id, RunStatus::Completed).unwrap();

        let run = reader.get_run(run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
    }
}
