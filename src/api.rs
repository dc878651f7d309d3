//! Workspace API collaborator interfaces
//!
//! The concrete Google Workspace calls live outside this crate. Checks reach the
//! API only through [`WorkspaceApi`]; the orchestrator asks a
//! [`CredentialProvider`] for an authorized handle and a [`ServiceValidator`]
//! for which services are usable before a run starts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Failure reported by the Workspace API client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("API error {code}: {message}")]
pub struct ApiError {
    pub code: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Quota errors: HTTP 429, or the 403 variants Google uses for rate limits
    pub fn is_rate_limit(&self) -> bool {
        if self.code == 429 {
            return true;
        }
        let message = self.message.to_ascii_lowercase();
        self.code == 403 && (message.contains("ratelimitexceeded") || message.contains("quota"))
    }

    pub fn is_auth(&self) -> bool {
        self.code == 401 || (self.code == 403 && !self.is_rate_limit())
    }
}

/// Authenticated, rate-limited client used by checks
#[cfg_attr(test, mockall::automock)]
pub trait WorkspaceApi: Send + Sync {
    fn call(&self, service: &str, operation: &str, params: &Value) -> Result<Value, ApiError>;
}

/// Result of probing one service before a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Ok,
    Error(String),
}

impl ServiceStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ServiceStatus::Ok)
    }
}

/// Checks requested services for API access and scopes
#[cfg_attr(test, mockall::automock)]
pub trait ServiceValidator: Send + Sync {
    fn validate_services(&self, requested: &[String]) -> BTreeMap<String, ServiceStatus>;
}

/// Supplies an authorized client; credentials never pass through the core
pub trait CredentialProvider: Send + Sync {
    fn authorized_client(&self) -> Result<Arc<dyn WorkspaceApi>, ApiError>;
}

/// Credential provider that hands out one pre-built client
pub struct StaticCredentials {
    client: Arc<dyn WorkspaceApi>,
}

impl StaticCredentials {
    pub fn new(client: Arc<dyn WorkspaceApi>) -> Self {
        Self { client }
    }
}

impl CredentialProvider for StaticCredentials {
    fn authorized_client(&self) -> Result<Arc<dyn WorkspaceApi>, ApiError> {
        Ok(Arc::clone(&self.client))
    }
}

/// Validator that accepts every requested service, for offline runs against fixtures
pub struct AcceptAllServices;

impl ServiceValidator for AcceptAllServices {
    fn validate_services(&self, requested: &[String]) -> BTreeMap<String, ServiceStatus> {
        requested
            .iter()
            .map(|s| (s.clone(), ServiceStatus::Ok))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(429, "Too Many Requests", true, false)]
    #[case(403, "rateLimitExceeded", true, false)]
    #[case(403, "Quota exceeded for quota metric", true, false)]
    #[case(403, "insufficientPermissions", false, true)]
    #[case(401, "invalid_grant", false, true)]
    #[case(500, "backendError", false, false)]
    fn test_api_error_classification(
        #[case] code: u16,
        #[case] message: &str,
        #[case] rate_limit: bool,
        #[case] auth: bool,
    ) {
        let err = ApiError::new(code, message);
        assert_eq!(err.is_rate_limit(), rate_limit);
        assert_eq!(err.is_auth(), auth);
    }

    #[test]
    fn test_static_credentials_share_client() {
        let mut mock = MockWorkspaceApi::new();
        mock.expect_call()
            .returning(|_, _, _| Ok(serde_json::json!({"users": []})));

        let provider = StaticCredentials::new(Arc::new(mock));
        let client = provider.authorized_client().unwrap();
        let result = client
            .call("admin_sdk", "users.list", &serde_json::json!({}))
            .unwrap();
        assert_eq!(result["users"], serde_json::json!([]));
    }

    #[test]
    fn test_accept_all_services() {
        let requested = vec!["drive_api".to_string(), "gmail_api".to_string()];
        let statuses = AcceptAllServices.validate_services(&requested);
        assert_eq!(statuses.len(), 2);
        assert!(statuses.values().all(ServiceStatus::is_ok));
    }
}
