use rusqlite::Connection;

use super::error::{QueryContext, Result};

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Latest schema version understood by this build
pub const SCHEMA_VERSION: i64 = 2;

/// Index creation statements, safe to run repeatedly because they use IF NOT EXISTS
const INDEX_SQL: &str = "
CREATE INDEX IF NOT EXISTS idx_section_run_id ON section(run_id);
CREATE INDEX IF NOT EXISTS idx_finding_section_id ON finding(section_id);
CREATE INDEX IF NOT EXISTS idx_stat_section_id ON stat(section_id);
CREATE INDEX IF NOT EXISTS idx_raw_object_section_id ON raw_object(section_id);
CREATE INDEX IF NOT EXISTS idx_run_started_at ON run(started_at);
";

/// Get current database schema version
pub fn get_schema_version(conn: &Connection) -> Result<i64> {
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .context("Failed to get schema version")?;
    Ok(version)
}

/// Set database schema version
fn set_schema_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute_batch(&format!("PRAGMA user_version = {}", version))
        .context("Failed to set schema version")?;
    Ok(())
}

/// Migrate from v0 (empty) to v1 (run, section, finding, stat, raw_object)
fn migrate_to_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)
        .context("Failed to execute v1 schema migration")?;
    Ok(())
}

/// Migrate from v1 to v2
/// - lookup indexes on every child table
/// - raw_object.captured_at so drill-down views can order captures
fn migrate_to_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(INDEX_SQL)
        .context("Failed to create v2 indexes")?;

    conn.execute("ALTER TABLE raw_object ADD COLUMN captured_at TEXT", [])
        .context("Failed to add raw_object.captured_at column")?;

    Ok(())
}

/// Bring the schema up to [`SCHEMA_VERSION`]; each step runs in its own transaction
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        let tx = conn.unchecked_transaction().context("Failed to begin v1 migration")?;
        migrate_to_v1(&tx)?;
        set_schema_version(&tx, 1)?;
        tx.commit().context("Failed to commit v1 migration")?;
        tracing::info!(version = 1, "applied findings store migration");
    }

    if current_version < 2 {
        let tx = conn.unchecked_transaction().context("Failed to begin v2 migration")?;
        migrate_to_v2(&tx)?;
        set_schema_version(&tx, 2)?;
        tx.commit().context("Failed to commit v2 migration")?;
        tracing::info!(version = 2, "applied findings store migration");
    }

    if current_version > SCHEMA_VERSION {
        tracing::warn!(
            found = current_version,
            supported = SCHEMA_VERSION,
            "database schema is newer than this build; unknown columns are ignored"
        );
    }

    Ok(())
}
