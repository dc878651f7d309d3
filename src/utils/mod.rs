//! Utility functions for the audit tooling
//!
//! Environment handling and input validation.

pub mod env;
pub mod validation;

pub use env::load_env;
pub use validation::{validate_domain, validate_service_name, ValidationError};
