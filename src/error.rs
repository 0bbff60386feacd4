//! Error types for postwarden
//!
//! Authentication failures (`Unauthenticated`) and authorization denials
//! (`Authorization`) are kept apart so callers can tell "who are you" from
//! "you can't do that". Policy load failures live in their own enum because
//! they are fatal at startup and never produced per request.

use std::path::PathBuf;
use thiserror::Error;

/// Result type used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Request-level and startup errors
#[derive(Error, Debug)]
pub enum Error {
    /// Missing, malformed, unknown or expired credential
    #[error("Unauthenticated: {reason}")]
    Unauthenticated { reason: String },

    /// The decision engine denied the request
    #[error("Forbidden: role '{role}' may not {action} resource type '{resource_type}'")]
    Authorization {
        action: String,
        resource_type: String,
        role: String,
    },

    /// The policy source could not be turned into a policy store
    #[error("Policy load failed: {0}")]
    PolicyLoad(#[from] PolicyLoadError),

    /// Repository miss
    #[error("{resource_type} not found: {id}")]
    NotFound { resource_type: String, id: String },

    /// The resource changed between the pre-check fetch and the write
    #[error("{resource_type} {id} was modified concurrently")]
    Conflict { resource_type: String, id: String },

    /// Storage failure after an ALLOW decision (never retried)
    #[error("Repository error: {0}")]
    Repository(String),

    /// Request payload failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid service configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build an authorization error from the denied tuple
    pub fn forbidden(
        action: impl ToString,
        resource_type: impl Into<String>,
        role: impl ToString,
    ) -> Self {
        Error::Authorization {
            action: action.to_string(),
            resource_type: resource_type.into(),
            role: role.to_string(),
        }
    }

    /// Build a not-found error
    pub fn not_found(resource_type: impl Into<String>, id: impl ToString) -> Self {
        Error::NotFound {
            resource_type: resource_type.into(),
            id: id.to_string(),
        }
    }

    /// HTTP status class an outer transport should surface for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Unauthenticated { .. } => 401,
            Error::Authorization { .. } => 403,
            Error::NotFound { .. } => 404,
            Error::Conflict { .. } => 409,
            Error::InvalidInput(_) => 422,
            Error::PolicyLoad(_) | Error::Repository(_) | Error::Config(_) => 500,
        }
    }

    /// True when the caller, not the service, is at fault
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

/// Failures turning a declarative policy source into a [`PolicyStore`]
///
/// [`PolicyStore`]: crate::core::iam::PolicyStore
#[derive(Error, Debug)]
pub enum PolicyLoadError {
    #[error("Failed to read policy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported policy file format: {0} (expected .toml or .json)")]
    UnknownFormat(PathBuf),

    #[error("Malformed policy document: {0}")]
    Parse(String),

    #[error("{resource_type} rule {index}: unknown action '{token}'")]
    UnknownAction {
        resource_type: String,
        index: usize,
        token: String,
    },

    #[error("{resource_type} rule {index}: unknown role '{token}'")]
    UnknownRole {
        resource_type: String,
        index: usize,
        token: String,
    },

    #[error("{resource_type} rule {index}: unknown effect '{token}'")]
    UnknownEffect {
        resource_type: String,
        index: usize,
        token: String,
    },

    #[error("{resource_type} rule {index}: unknown condition operator '{token}'")]
    UnknownOperator {
        resource_type: String,
        index: usize,
        token: String,
    },

    #[error("{resource_type} rule {index}: cannot resolve condition operand '{operand}'")]
    UnresolvableOperand {
        resource_type: String,
        index: usize,
        operand: String,
    },

    #[error("{resource_type} rule {index}: {reason}")]
    EmptyRule {
        resource_type: String,
        index: usize,
        reason: String,
    },

    #[error("{resource_type} rule {index}: a condition cannot apply to 'create', the resource does not exist yet")]
    ConditionOnCreate { resource_type: String, index: usize },
}

impl From<serde_json::Error> for PolicyLoadError {
    fn from(e: serde_json::Error) -> Self {
        PolicyLoadError::Parse(e.to_string())
    }
}

impl From<toml::de::Error> for PolicyLoadError {
    fn from(e: toml::de::Error) -> Self {
        PolicyLoadError::Parse(e.to_string())
    }
}
