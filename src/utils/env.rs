//! Environment variable management
//!
//! Loads `.env` and reads the handful of variables the audit tooling honors.

use anyhow::{Context, Result};
use std::env;

/// Path of the optional JSON settings file
pub const CONFIG_PATH_ENV: &str = "GAUDIT_CONFIG";

/// Per-section timeout override, in seconds
pub const SECTION_TIMEOUT_ENV: &str = "GAUDIT_SECTION_TIMEOUT_SECS";

/// Filter directive for the log subscriber
pub const LOG_ENV: &str = "GAUDIT_LOG";

/// Load environment variables from .env file
///
/// Does not fail if .env file doesn't exist (optional configuration).
pub fn load_env() -> Result<()> {
    dotenv::dotenv().ok();
    Ok(())
}

/// Read a variable, treating unset and blank values as absent
pub fn get_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse a numeric variable
///
/// # Errors
/// Returns error if the variable is set but is not a positive integer
pub fn get_optional_secs(name: &str) -> Result<Option<u64>> {
    let Some(raw) = get_optional(name) else {
        return Ok(None);
    };
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{} must be a whole number of seconds, got '{}'", name, raw))?;
    if secs == 0 {
        anyhow::bail!("{} must be greater than zero", name);
    }
    Ok(Some(secs))
}
