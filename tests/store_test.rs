//! Findings store integration tests
//!
//! Exercises the store contract against an on-disk database: lifecycle
//! transitions, cascade deletion, read paths and cross-connection visibility.

mod common;

use common::{section, write_run, TestStore};
use gaudit::models::{RunStatus, SectionStatus, Severity};
use gaudit::StoreError;

#[test]
fn test_delete_run_cascades_to_everything() {
    let db = TestStore::new("cascade").unwrap();
    let store = db.store();
    let run_id = write_run(
        store,
        RunStatus::Completed,
        &[
            section("Users and OUs", vec![(Severity::Low, "Stale accounts")], vec![("users", "10")]),
            section("Groups", vec![(Severity::High, "Public group")], vec![]),
        ],
    )
    .unwrap();
    let section_ids: Vec<i64> = store.get_sections(run_id).unwrap().iter().map(|s| s.id).collect();

    assert!(store.delete_run(run_id).unwrap());

    assert!(store.get_run(run_id).unwrap().is_none());
    assert!(store.get_sections(run_id).unwrap().is_empty());
    for id in section_ids {
        assert!(store.get_findings(id).unwrap().is_empty());
        assert!(store.get_stats(id).unwrap().is_empty());
        assert!(store.get_raw_objects(id).unwrap().is_empty());
    }
    for table in ["run", "section", "finding", "stat", "raw_object"] {
        assert_eq!(db.count_rows(table).unwrap(), 0, "{} not emptied", table);
    }

    assert!(!store.delete_run(run_id).unwrap());
}

#[test]
fn test_run_lifecycle_and_completed_at() {
    let db = TestStore::new("lifecycle").unwrap();
    let store = db.store();

    let run_id = store.create_run(Some("example.com"), None, &["gmail_api".to_string()]).unwrap();
    let run = store.get_run(run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert!(run.completed_at.is_none());
    assert_eq!(run.skipped_services, vec!["gmail_api".to_string()]);

    store.finalize_run(run_id, RunStatus::CompletedWithErrors).unwrap();
    let run = store.get_run(run_id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::CompletedWithErrors);
    assert!(run.completed_at.is_some());

    assert!(matches!(
        store.finalize_run(run_id, RunStatus::Completed),
        Err(StoreError::InvalidTransition { .. })
    ));
    assert!(matches!(
        store.finalize_run(9999, RunStatus::Completed),
        Err(StoreError::NotFound { entity: "run", .. })
    ));
    assert!(matches!(
        store.start_section(run_id, "Late section"),
        Err(StoreError::InvalidTransition { .. })
    ));
}

#[test]
fn test_section_names_unique_per_run() {
    let db = TestStore::new("unique_sections").unwrap();
    let store = db.store();
    let first = store.create_run(None, None, &[]).unwrap();
    let second = store.create_run(None, None, &[]).unwrap();

    store.start_section(first, "Groups").unwrap();
    assert!(matches!(
        store.start_section(first, "Groups"),
        Err(StoreError::DuplicateSection { .. })
    ));
    assert!(matches!(
        store.record_skipped_section(first, "Groups"),
        Err(StoreError::DuplicateSection { .. })
    ));
    // Same name in another run is fine
    store.start_section(second, "Groups").unwrap();
}

#[test]
fn test_completed_section_is_closed_to_writes() {
    let db = TestStore::new("closed_section").unwrap();
    let store = db.store();
    let run_id = store.create_run(None, None, &[]).unwrap();
    let section_id = store.start_section(run_id, "Email Security").unwrap();

    store.insert_finding(section_id, Severity::Medium, "DKIM not configured").unwrap();
    store.insert_stat(section_id, "domains_checked", "2").unwrap();
    store.complete_section(section_id, SectionStatus::Succeeded, 0.8).unwrap();

    assert!(matches!(
        store.insert_finding(section_id, Severity::Low, "late"),
        Err(StoreError::InvalidTransition { .. })
    ));
    assert!(matches!(
        store.complete_section(section_id, SectionStatus::Failed, 1.0),
        Err(StoreError::InvalidTransition { .. })
    ));
    assert!(matches!(
        store.insert_stat(4242, "key", "value"),
        Err(StoreError::NotFound { entity: "section", .. })
    ));
}

#[test]
fn test_report_reads_through_second_connection() {
    let db = TestStore::new("second_connection").unwrap();
    let run_id = write_run(
        db.store(),
        RunStatus::Completed,
        &[
            section("Authentication", vec![(Severity::High, "2SV not enforced"), (Severity::Low, "Legacy app passwords")], vec![("users_checked", "25")]),
            section("MDM Basics", vec![], vec![("devices", "4")]),
        ],
    )
    .unwrap();

    let reader = db.open().unwrap();
    let report = reader.run_report(run_id).unwrap().unwrap();
    assert_eq!(report.sections.len(), 2);
    assert_eq!(report.finding_count(), 2);

    let auth = report.section("Authentication").unwrap();
    assert_eq!(auth.findings[0].message, "2SV not enforced");
    assert_eq!(auth.stats[0].value, "25");

    let counts = reader.severity_counts(run_id).unwrap();
    assert_eq!(counts.get(&Severity::High), Some(&1));
    assert_eq!(counts.get(&Severity::Low), Some(&1));
    assert_eq!(counts.get(&Severity::Critical), None);

    assert_eq!(reader.latest_run().unwrap().unwrap().id, run_id);
    assert!(reader.run_report(run_id + 1).unwrap().is_none());
}

#[test]
fn test_schema_is_current() {
    let db = TestStore::new("schema").unwrap();
    assert_eq!(
        gaudit::db::get_schema_version(db.connection()).unwrap(),
        gaudit::db::SCHEMA_VERSION
    );
    for table in ["run", "section", "finding", "stat", "raw_object"] {
        assert!(db.table_exists(table).unwrap(), "{} missing", table);
    }
    assert!(db.column_exists("raw_object", "captured_at").unwrap());
}
