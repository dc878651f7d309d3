//! Synthetic audit data
//!
//! Writes a complete, deterministic run over the standard Workspace sections.
//! Used to exercise reports and comparisons without touching a real tenant.

use crate::checks::CheckRegistry;
use crate::db::{FindingsStore, StoreError};
use crate::models::{InvocationParams, RunStatus, SectionStatus, Severity};

/// A section of the standard Workspace audit and the services its check needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardSection {
    pub name: &'static str,
    pub required_services: &'static [&'static str],
}

const fn section(name: &'static str, required_services: &'static [&'static str]) -> StandardSection {
    StandardSection {
        name,
        required_services,
    }
}

pub const STANDARD_SECTIONS: [StandardSection; 10] = [
    section("Users and OUs", &["admin_sdk"]),
    section("Authentication", &["admin_sdk"]),
    section("Admin Privileges", &["admin_sdk"]),
    section("Groups", &["admin_sdk", "groups_settings_api"]),
    section("Drive Data Security", &["drive_api"]),
    section("Email Security", &["gmail_api"]),
    section("Application Security", &["admin_sdk"]),
    section("Logging and Alerts", &["admin_sdk"]),
    section("MDM Basics", &["admin_sdk"]),
    section("ChromeOS Devices", &["admin_sdk"]),
];

const SAMPLE_SEVERITIES: [Severity; 3] = [Severity::Low, Severity::Medium, Severity::High];

/// Standard sections with no registered check of the same name
pub fn missing_standard_sections(registry: &CheckRegistry) -> Vec<&'static str> {
    STANDARD_SECTIONS
        .iter()
        .filter(|s| registry.get_check(s.name).is_none())
        .map(|s| s.name)
        .collect()
}

/// Write a completed synthetic run for `domain` and return its id
pub fn create_fake_run(store: &FindingsStore, domain: &str) -> Result<i64, StoreError> {
    let params = InvocationParams {
        requested_services: vec![
            "admin_sdk".to_string(),
            "drive_api".to_string(),
            "gmail_api".to_string(),
            "groups_settings_api".to_string(),
        ],
        intensive: false,
        section_timeout_secs: None,
    };
    let run_id = store.create_run(Some(domain), Some(&params), &[])?;

    for (i, standard) in STANDARD_SECTIONS.iter().enumerate() {
        let section_id = store.start_section(run_id, standard.name)?;

        for n in 0..(1 + i % 3) {
            let severity = SAMPLE_SEVERITIES[(i + n) % SAMPLE_SEVERITIES.len()];
            store.insert_finding(section_id, severity, &format!("Sample finding {}", n + 1))?;
        }

        let items_checked = 20 + (i * 37) % 181;
        let items_flagged = (i * 3) % 11;
        store.insert_stat(section_id, "items_checked", &items_checked.to_string())?;
        store.insert_stat(section_id, "items_flagged", &items_flagged.to_string())?;

        let payload = serde_json::json!({ "synthetic": true, "section": standard.name });
        store.insert_raw(section_id, payload.to_string().as_bytes())?;

        let duration = 0.5 + (i % 6) as f64 * 0.5;
        store.complete_section(section_id, SectionStatus::Succeeded, duration)?;
    }

    store.finalize_run(run_id, RunStatus::Completed)?;
    tracing::info!(run_id, domain, "created synthetic run");
    Ok(run_id)
}
