//! Input validation for audit invocations

use regex::Regex;
use thiserror::Error;

const MAX_DOMAIN_LEN: usize = 253;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("domain must not be empty")]
    EmptyDomain,

    #[error("'{0}' is not a valid domain name")]
    InvalidDomain(String),

    #[error("'{0}' is not a valid service name")]
    InvalidServiceName(String),

    #[error("failed to compile validation pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Validate a Workspace primary domain such as `example.com`
///
/// Returns the trimmed, lowercased domain.
pub fn validate_domain(domain: &str) -> Result<String, ValidationError> {
    let domain = domain.trim();
    if domain.is_empty() {
        return Err(ValidationError::EmptyDomain);
    }
    let pattern = Regex::new(r"^(?i)([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$")?;
    if domain.len() > MAX_DOMAIN_LEN || !pattern.is_match(domain) {
        return Err(ValidationError::InvalidDomain(domain.to_string()));
    }
    Ok(domain.to_ascii_lowercase())
}

/// Validate an API service identifier like `admin_sdk` or `groups_settings_api`
pub fn validate_service_name(service: &str) -> Result<(), ValidationError> {
    let pattern = Regex::new(r"^[a-z][a-z0-9_]{1,63}$")?;
    if pattern.is_match(service) {
        Ok(())
    } else {
        Err(ValidationError::InvalidServiceName(service.to_string()))
    }
}
