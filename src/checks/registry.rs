//! Static, ordered catalog of audit checks
//!
//! Populated once at startup; registration order is the default section
//! execution order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::Check;

/// Name and declared service requirements of a registered check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInfo {
    pub name: String,
    pub required_services: Vec<String>,
}

impl CheckInfo {
    /// Services this check needs that are not in `available`
    pub fn missing_services(&self, available: &BTreeSet<String>) -> Vec<String> {
        self.required_services
            .iter()
            .filter(|s| !available.contains(*s))
            .cloned()
            .collect()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("check '{0}' is already registered")]
    DuplicateCheck(String),

    #[error("check name must not be empty")]
    EmptyName,
}

#[derive(Default)]
pub struct CheckRegistry {
    checks: Vec<Arc<dyn Check>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, check: impl Check + 'static) -> Result<(), RegistryError> {
        let name = check.name().trim();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.checks.iter().any(|c| c.name() == name) {
            return Err(RegistryError::DuplicateCheck(name.to_string()));
        }

        self.checks.push(Arc::new(check));
        Ok(())
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, check: impl Check + 'static) -> Result<Self, RegistryError> {
        self.register(check)?;
        Ok(self)
    }

    pub fn list_checks(&self) -> Vec<CheckInfo> {
        self.checks
            .iter()
            .map(|c| CheckInfo {
                name: c.name().to_string(),
                required_services: c.required_services().to_vec(),
            })
            .collect()
    }

    pub fn get_check(&self, name: &str) -> Option<Arc<dyn Check>> {
        self.checks.iter().find(|c| c.name() == name).cloned()
    }

    /// Checks in execution order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Check>> {
        self.checks.iter()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Union of every service some registered check requires
    pub fn required_services(&self) -> BTreeSet<String> {
        self.checks
            .iter()
            .flat_map(|c| c.required_services().iter().cloned())
            .collect()
    }
}
