//! Service configuration
//!
//! Read from a TOML file and overlaid with `POSTWARDEN_*` environment
//! variables. Every field has a default so an empty file is valid.

use crate::core::audit::DEFAULT_AUDIT_CAPACITY;
use crate::core::principal::DEFAULT_TOKEN_TTL_MINUTES;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

pub const ENV_CONFIG: &str = "POSTWARDEN_CONFIG";
pub const ENV_POLICY: &str = "POSTWARDEN_POLICY";
pub const ENV_AUDIT_CAPACITY: &str = "POSTWARDEN_AUDIT_CAPACITY";
pub const ENV_TOKEN_TTL: &str = "POSTWARDEN_TOKEN_TTL_MINUTES";
pub const ENV_LOG: &str = "POSTWARDEN_LOG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Policy source (`.toml` or `.json`)
    pub policy_path: PathBuf,

    /// Decisions kept in the in-memory audit trail
    #[validate(range(min = 1))]
    pub audit_capacity: usize,

    /// Lifetime of issued access tokens
    #[validate(range(min = 1))]
    pub token_ttl_minutes: i64,

    /// `tracing_subscriber::EnvFilter` directive
    pub log_filter: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            policy_path: PathBuf::from("policies/blog.toml"),
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            token_ttl_minutes: DEFAULT_TOKEN_TTL_MINUTES,
            log_filter: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Parse a TOML configuration file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: ServiceConfig =
            toml::from_str(source).map_err(|e| Error::Config(e.to_string()))?;
        config.validate_settings()?;
        Ok(config)
    }

    /// Defaults (or the file named by `POSTWARDEN_CONFIG`) plus env overrides
    pub fn from_env() -> Result<Self> {
        let base = match std::env::var(ENV_CONFIG) {
            Ok(path) => Self::from_path(path)?,
            Err(_) => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup (the environment, in production)
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_POLICY) {
            self.policy_path = PathBuf::from(path);
        }
        if let Some(capacity) = lookup(ENV_AUDIT_CAPACITY) {
            self.audit_capacity = parse_number(ENV_AUDIT_CAPACITY, &capacity)?;
        }
        if let Some(ttl) = lookup(ENV_TOKEN_TTL) {
            self.token_ttl_minutes = parse_number(ENV_TOKEN_TTL, &ttl)?;
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.log_filter = filter;
        }

        self.validate_settings()?;
        Ok(self)
    }

    pub fn validate_settings(&self) -> Result<()> {
        self.validate().map_err(|e| Error::Config(e.to_string()))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", key, value)))
}
