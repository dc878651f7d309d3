use std::path::PathBuf;

pub mod error;
pub mod migrations;
pub mod queries;
pub mod store;

#[cfg(test)]
pub mod test_helpers;

pub use error::StoreError;
pub use migrations::{run_migrations, get_schema_version, SCHEMA_VERSION};
pub use store::FindingsStore;

/// Environment variable that overrides the database location
pub const DB_PATH_ENV: &str = "GAUDIT_DB_PATH";

/// Get the database file path: `GAUDIT_DB_PATH`, else `gaudit.db` in the working directory
pub fn get_db_path() -> PathBuf {
    match std::env::var(DB_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => PathBuf::from("gaudit.db"),
    }
}

/// Open the findings store at the configured path and run migrations
/// Returns a new connection each time; each store owns its connection
pub fn init_db() -> error::Result<FindingsStore> {
    FindingsStore::open(get_db_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_get_db_path_from_env() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("audit.db");
        std::env::set_var(DB_PATH_ENV, &path);

        assert_eq!(get_db_path(), path);
        std::env::remove_var(DB_PATH_ENV);
    }

    #[test]
    #[serial]
    fn test_get_db_path_default() {
        std::env::remove_var(DB_PATH_ENV);
        assert_eq!(get_db_path(), PathBuf::from("gaudit.db"));
    }

    #[test]
    #[serial]
    fn test_init_db_creates_parent_dirs_and_tables() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data").join("gaudit.db");
        std::env::set_var(DB_PATH_ENV, &path);

        let store = init_db().unwrap();
        assert!(path.exists());

        let tables: Vec<String> = store
            .connection()
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in ["run", "section", "finding", "stat", "raw_object"] {
            assert!(tables.contains(&table.to_string()));
        }
        std::env::remove_var(DB_PATH_ENV);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let store = FindingsStore::open_in_memory().unwrap();
        let foreign_keys_enabled: bool = store
            .connection()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert!(foreign_keys_enabled);
    }
}
