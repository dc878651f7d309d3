use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

use super::error::{QueryContext, Result};
use crate::models::*;

const RUN_COLUMNS: &str =
    "id, started_at, completed_at, domain, cli_args_json, skipped_services_json, overall_status";

const SECTION_COLUMNS: &str = "id, run_id, name, status, duration_s";

/// Maps a stored label onto its enum, failing the row on unknown values
fn parse_label<T>(idx: usize, raw: String, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unrecognized value '{}'", raw).into(),
        )
    })
}

fn row_to_run(row: &Row) -> rusqlite::Result<Run> {
    let params_json: Option<String> = row.get(4)?;
    let skipped_json: Option<String> = row.get(5)?;

    Ok(Run {
        id: row.get(0)?,
        started_at: row.get(1)?,
        completed_at: row.get(2)?,
        domain: row.get(3)?,
        // Older rows may hold arbitrary JSON here; unreadable params read as absent
        invocation_params: params_json.and_then(|s| serde_json::from_str(&s).ok()),
        skipped_services: skipped_json
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        status: parse_label(6, row.get(6)?, RunStatus::from_str)?,
    })
}

fn row_to_section(row: &Row) -> rusqlite::Result<Section> {
    Ok(Section {
        id: row.get(0)?,
        run_id: row.get(1)?,
        name: row.get(2)?,
        status: parse_label(3, row.get(3)?, SectionStatus::from_str)?,
        duration_s: row.get(4)?,
    })
}

// ===== RUN CRUD =====

pub fn insert_run(
    conn: &Connection,
    started_at: &str,
    domain: Option<&str>,
    cli_args_json: Option<&str>,
    skipped_services_json: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO run (started_at, domain, cli_args_json, skipped_services_json, overall_status) VALUES (?, ?, ?, ?, ?)",
        params![
            started_at,
            domain,
            cli_args_json,
            skipped_services_json,
            RunStatus::Running.as_str()
        ],
    )
    .context("Failed to insert run")?;

    Ok(conn.last_insert_rowid())
}

pub fn select_runs(conn: &Connection) -> Result<Vec<Run>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {} FROM run ORDER BY id DESC", RUN_COLUMNS))
        .context("Failed to prepare select runs query")?;

    let runs = stmt
        .query_map([], row_to_run)
        .context("Failed to map runs from query")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect runs")?;

    Ok(runs)
}

pub fn select_run(conn: &Connection, id: i64) -> Result<Option<Run>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {} FROM run WHERE id = ?", RUN_COLUMNS))
        .context("Failed to prepare select run query")?;

    let run = stmt
        .query_row(params![id], row_to_run)
        .optional()
        .context("Failed to query run")?;

    Ok(run)
}

pub fn select_latest_run(conn: &Connection) -> Result<Option<Run>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {} FROM run ORDER BY id DESC LIMIT 1", RUN_COLUMNS))
        .context("Failed to prepare select latest run query")?;

    let run = stmt
        .query_row([], row_to_run)
        .optional()
        .context("Failed to query latest run")?;

    Ok(run)
}

/// Sets the terminal status of a run that is still open; returns rows changed
pub fn update_run_finalized(
    conn: &Connection,
    id: i64,
    status: RunStatus,
    completed_at: &str,
) -> Result<usize> {
    let changed = conn
        .execute(
            "UPDATE run SET overall_status = ?, completed_at = ? WHERE id = ? AND completed_at IS NULL",
            params![status.as_str(), completed_at, id],
        )
        .context("Failed to finalize run")?;

    Ok(changed)
}

pub fn delete_run(conn: &Connection, id: i64) -> Result<usize> {
    let deleted = conn
        .execute("DELETE FROM run WHERE id = ?", params![id])
        .context("Failed to delete run")?;

    Ok(deleted)
}

// ===== SECTION CRUD =====

pub fn insert_section(
    conn: &Connection,
    run_id: i64,
    name: &str,
    status: SectionStatus,
    duration_s: Option<f64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO section (run_id, name, status, duration_s) VALUES (?, ?, ?, ?)",
        params![run_id, name, status.as_str(), duration_s],
    )
    .context("Failed to insert section")?;

    Ok(conn.last_insert_rowid())
}

pub fn select_section(conn: &Connection, id: i64) -> Result<Option<Section>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {} FROM section WHERE id = ?", SECTION_COLUMNS))
        .context("Failed to prepare select section query")?;

    let section = stmt
        .query_row(params![id], row_to_section)
        .optional()
        .context("Failed to query section")?;

    Ok(section)
}

pub fn select_sections(conn: &Connection, run_id: i64) -> Result<Vec<Section>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM section WHERE run_id = ? ORDER BY id",
            SECTION_COLUMNS
        ))
        .context("Failed to prepare select sections query")?;

    let sections = stmt
        .query_map(params![run_id], row_to_section)
        .context("Failed to map sections from query")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect sections")?;

    Ok(sections)
}

/// Closes a section that is still running; returns rows changed
pub fn update_section_closed(
    conn: &Connection,
    id: i64,
    status: SectionStatus,
    duration_s: f64,
) -> Result<usize> {
    let changed = conn
        .execute(
            "UPDATE section SET status = ?, duration_s = ? WHERE id = ? AND status = 'running'",
            params![status.as_str(), duration_s, id],
        )
        .context("Failed to complete section")?;

    Ok(changed)
}

// ===== FINDING / STAT / RAW OBJECT =====

pub fn insert_finding(
    conn: &Connection,
    section_id: i64,
    severity: Severity,
    message: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO finding (section_id, severity, message) VALUES (?, ?, ?)",
        params![section_id, severity.as_str(), message],
    )
    .context("Failed to insert finding")?;

    Ok(conn.last_insert_rowid())
}

pub fn select_findings(conn: &Connection, section_id: i64) -> Result<Vec<Finding>> {
    let mut stmt = conn
        .prepare("SELECT id, section_id, severity, message FROM finding WHERE section_id = ? ORDER BY id")
        .context("Failed to prepare select findings query")?;

    let findings = stmt
        .query_map(params![section_id], |row| {
            Ok(Finding {
                id: row.get(0)?,
                section_id: row.get(1)?,
                severity: parse_label(2, row.get(2)?, Severity::from_str)?,
                message: row.get(3)?,
            })
        })
        .context("Failed to map findings from query")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect findings")?;

    Ok(findings)
}

pub fn insert_stat(conn: &Connection, section_id: i64, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO stat (section_id, key, value) VALUES (?, ?, ?)",
        params![section_id, key, value],
    )
    .context("Failed to insert stat")?;

    Ok(())
}

pub fn select_stats(conn: &Connection, section_id: i64) -> Result<Vec<Stat>> {
    let mut stmt = conn
        .prepare("SELECT section_id, key, value FROM stat WHERE section_id = ? ORDER BY rowid")
        .context("Failed to prepare select stats query")?;

    let stats = stmt
        .query_map(params![section_id], |row| {
            Ok(Stat {
                section_id: row.get(0)?,
                key: row.get(1)?,
                value: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            })
        })
        .context("Failed to map stats from query")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect stats")?;

    Ok(stats)
}

pub fn insert_raw_object(
    conn: &Connection,
    section_id: i64,
    data: &[u8],
    captured_at: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO raw_object (section_id, data, captured_at) VALUES (?, ?, ?)",
        params![section_id, data, captured_at],
    )
    .context("Failed to insert raw object")?;

    Ok(conn.last_insert_rowid())
}

pub fn select_raw_objects(conn: &Connection, section_id: i64) -> Result<Vec<RawObject>> {
    let mut stmt = conn
        .prepare("SELECT id, section_id, data, captured_at FROM raw_object WHERE section_id = ? ORDER BY id")
        .context("Failed to prepare select raw objects query")?;

    let objects = stmt
        .query_map(params![section_id], |row| {
            Ok(RawObject {
                id: row.get(0)?,
                section_id: row.get(1)?,
                payload: row.get(2)?,
                captured_at: row.get(3)?,
            })
        })
        .context("Failed to map raw objects from query")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect raw objects")?;

    Ok(objects)
}

// ===== SUMMARIES =====

/// Finding counts per severity across every section of a run
pub fn get_severity_counts(conn: &Connection, run_id: i64) -> Result<BTreeMap<Severity, usize>> {
    let mut stmt = conn
        .prepare(
            "SELECT f.severity, COUNT(*) FROM finding f
             JOIN section s ON s.id = f.section_id
             WHERE s.run_id = ?
             GROUP BY f.severity",
        )
        .context("Failed to prepare severity counts query")?;

    let rows = stmt
        .query_map(params![run_id], |row| {
            let severity = parse_label(0, row.get(0)?, Severity::from_str)?;
            let count: i64 = row.get(1)?;
            Ok((severity, count as usize))
        })
        .context("Failed to map severity counts")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect severity counts")?;

    Ok(rows.into_iter().collect())
}
