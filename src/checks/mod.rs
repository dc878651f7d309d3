//! Audit checks
//!
//! A check is a named unit of audit logic: given the run's read-only
//! [`CheckContext`] it returns ordered findings and stats, or a typed
//! [`CheckError`]. Checks never write to storage; the orchestrator persists
//! whatever they return once they have finished.

use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::api::{ApiError, WorkspaceApi};
use crate::audit::progress::CancelFlag;
use crate::models::Severity;

pub mod registry;

pub use registry::{CheckInfo, CheckRegistry, RegistryError};

/// Read-only inputs handed to every check of a run
#[derive(Clone)]
pub struct CheckContext {
    pub run_id: i64,
    pub domain: String,
    /// Services that passed validation and were not skipped
    pub enabled_services: BTreeSet<String>,
    /// Deeper, slower variants of checks were requested
    pub intensive: bool,
    pub api: Arc<dyn WorkspaceApi>,
    pub cancel: CancelFlag,
}

impl CheckContext {
    pub fn service_enabled(&self, service: &str) -> bool {
        self.enabled_services.contains(service)
    }

    /// Call the Workspace API, refusing services outside this run's enabled set
    pub fn call(&self, service: &str, operation: &str, params: &Value) -> Result<Value, CheckError> {
        if self.cancel.is_cancelled() {
            return Err(CheckError::Cancelled);
        }
        if !self.service_enabled(service) {
            return Err(CheckError::ServiceUnavailable(service.to_string()));
        }
        Ok(self.api.call(service, operation, params)?)
    }
}

/// What a successful check produced, in emission order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckOutput {
    pub findings: Vec<(Severity, String)>,
    pub stats: Vec<(String, String)>,
    pub raw_objects: Vec<Vec<u8>>,
}

impl CheckOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finding(mut self, severity: Severity, message: impl Into<String>) -> Self {
        self.findings.push((severity, message.into()));
        self
    }

    pub fn stat(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.stats.push((key.into(), value.to_string()));
        self
    }

    pub fn raw(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.raw_objects.push(payload.into());
        self
    }

    /// Capture a JSON snapshot as a raw object
    pub fn raw_json(self, value: &Value) -> Self {
        let payload = value.to_string().into_bytes();
        self.raw(payload)
    }

    pub fn push_finding(&mut self, severity: Severity, message: impl Into<String>) {
        self.findings.push((severity, message.into()));
    }

    pub fn push_stat(&mut self, key: impl Into<String>, value: impl ToString) {
        self.stats.push((key.into(), value.to_string()));
    }

    /// Reject output the store would refuse, before any of it is written
    pub fn validate(&self) -> Result<(), String> {
        if let Some(i) = self.findings.iter().position(|(_, m)| m.trim().is_empty()) {
            return Err(format!("finding {} has an empty message", i + 1));
        }
        if let Some(i) = self.stats.iter().position(|(k, _)| k.trim().is_empty()) {
            return Err(format!("stat {} has an empty key", i + 1));
        }
        Ok(())
    }
}

/// Typed failure of a single check; contained to its section
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CheckError {
    #[error("workspace API call failed: {0}")]
    Api(ApiError),

    #[error("workspace API quota exhausted: {0}")]
    RateLimited(ApiError),

    #[error("service '{0}' is not available for this run")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Execution(String),

    #[error("check cancelled")]
    Cancelled,
}

impl CheckError {
    pub fn execution(message: impl Into<String>) -> Self {
        CheckError::Execution(message.into())
    }

    /// Quota errors clear up on their own and are worth retrying on the next run
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckError::RateLimited(_))
    }
}

impl From<ApiError> for CheckError {
    fn from(err: ApiError) -> Self {
        if err.is_rate_limit() {
            CheckError::RateLimited(err)
        } else {
            CheckError::Api(err)
        }
    }
}

/// A named audit check with its service requirements declared up front
pub trait Check: Send + Sync {
    fn name(&self) -> &str;

    fn required_services(&self) -> &[String];

    fn run(&self, ctx: &CheckContext) -> Result<CheckOutput, CheckError>;
}

/// Adapter that turns a closure into a [`Check`]
pub struct FnCheck<F> {
    name: String,
    required_services: Vec<String>,
    run: F,
}

impl<F> FnCheck<F>
where
    F: Fn(&CheckContext) -> Result<CheckOutput, CheckError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, required_services: &[&str], run: F) -> Self {
        Self {
            name: name.into(),
            required_services: required_services.iter().map(|s| s.to_string()).collect(),
            run,
        }
    }
}

impl<F> Check for FnCheck<F>
where
    F: Fn(&CheckContext) -> Result<CheckOutput, CheckError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn required_services(&self) -> &[String] {
        &self.required_services
    }

    fn run(&self, ctx: &CheckContext) -> Result<CheckOutput, CheckError> {
        (self.run)(ctx)
    }
}
