//! Principals and principal resolution
//!
//! A [`Principal`] is the authenticated identity behind one request. It is
//! produced by a [`PrincipalResolver`] from an opaque [`Credential`] and is
//! never persisted by this crate.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Access token lifetime used when none is configured
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 30;

const TOKEN_LENGTH: usize = 40;

/// Closed set of roles a principal can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Author,
    Reader,
}

impl Role {
    /// Every role, in declaration order
    pub const ALL: [Role; 3] = [Role::Admin, Role::Author, Role::Reader];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Author => "author",
            Role::Reader => "reader",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "author" => Ok(Role::Author),
            "reader" => Ok(Role::Reader),
            other => Err(other.to_string()),
        }
    }
}

/// Authenticated identity making a request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Principal {
            id: id.into(),
            role,
        }
    }

    /// Read a principal field by name, as referenced from a policy condition
    pub fn field(&self, field: PrincipalField) -> &str {
        match field {
            PrincipalField::Id => &self.id,
            PrincipalField::Role => self.role.as_str(),
        }
    }
}

/// Principal fields a condition may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrincipalField {
    Id,
    Role,
}

impl PrincipalField {
    /// Resolve a field path such as `principal.id` (or bare `id`)
    pub fn from_path(path: &str) -> Option<Self> {
        let name = path.trim();
        let name = name.strip_prefix("request.").unwrap_or(name);
        let name = name.strip_prefix("principal.").unwrap_or(name);
        match name {
            "id" => Some(PrincipalField::Id),
            "role" => Some(PrincipalField::Role),
            _ => None,
        }
    }
}

impl fmt::Display for PrincipalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrincipalField::Id => f.write_str("principal.id"),
            PrincipalField::Role => f.write_str("principal.role"),
        }
    }
}

/// Opaque bearer credential presented with a request
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Credential(token.into())
    }

    /// Parse the value of an `Authorization` header (`Bearer <token>`)
    pub fn from_authorization_header(header: Option<&str>) -> Result<Self> {
        let header = header.ok_or_else(|| Error::Unauthenticated {
            reason: "missing authorization header".to_string(),
        })?;

        let mut parts = header.trim().splitn(2, ' ');
        let scheme = parts.next().unwrap_or_default();
        let token = parts.next().map(str::trim).unwrap_or_default();

        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(Error::Unauthenticated {
                reason: format!("unsupported authorization scheme '{}'", scheme),
            });
        }
        if token.is_empty() {
            return Err(Error::Unauthenticated {
                reason: "empty bearer token".to_string(),
            });
        }

        Ok(Credential(token.to_string()))
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

// Tokens must not leak into logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}

/// Turns a credential into a typed identity or fails with `Unauthenticated`
pub trait PrincipalResolver: Send + Sync {
    fn resolve(&self, credential: &Credential) -> Result<Principal>;
}

#[derive(Debug, Clone)]
struct IssuedToken {
    principal: Principal,
    expires_at: DateTime<Utc>,
}

/// In-process resolver that issues opaque tokens bound to a principal
///
/// Signing and verification of real tokens is the job of an upstream
/// identity provider; this registry only models the contract.
pub struct TokenRegistry {
    tokens: RwLock<HashMap<String, IssuedToken>>,
    ttl: Duration,
}

impl TokenRegistry {
    /// Create a registry whose tokens live for `ttl_minutes`
    pub fn new(ttl_minutes: i64) -> Self {
        TokenRegistry {
            tokens: RwLock::new(HashMap::new()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Issue a fresh token for `principal`
    pub fn issue(&self, principal: Principal) -> Credential {
        let expires_at = Utc::now() + self.ttl;
        self.issue_until(principal, expires_at)
    }

    /// Issue a token with an explicit expiry
    pub fn issue_until(&self, principal: Principal, expires_at: DateTime<Utc>) -> Credential {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();

        debug!(principal_id = %principal.id, role = %principal.role, %expires_at, "Issued token");
        self.tokens.write().insert(
            token.clone(),
            IssuedToken {
                principal,
                expires_at,
            },
        );
        Credential(token)
    }

    /// Revoke a token; returns false if it was not known
    pub fn revoke(&self, credential: &Credential) -> bool {
        self.tokens.write().remove(credential.token()).is_some()
    }

    /// Drop every expired token
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut tokens = self.tokens.write();
        let before = tokens.len();
        tokens.retain(|_, issued| issued.expires_at > now);
        before - tokens.len()
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_TTL_MINUTES)
    }
}

impl PrincipalResolver for TokenRegistry {
    fn resolve(&self, credential: &Credential) -> Result<Principal> {
        let unknown = || Error::Unauthenticated {
            reason: "invalid credentials".to_string(),
        };

        let now = Utc::now();
        {
            let tokens = self.tokens.read();
            let issued = tokens.get(credential.token()).ok_or_else(unknown)?;
            if issued.expires_at > now {
                return Ok(issued.principal.clone());
            }
        }

        // Expired tokens are dropped on first use
        let mut tokens = self.tokens.write();
        let expired = tokens
            .get(credential.token())
            .map(|issued| issued.expires_at <= now);
        match expired {
            Some(true) => {
                tokens.remove(credential.token());
                debug!("Dropped expired token");
                Err(Error::Unauthenticated {
                    reason: "token expired".to_string(),
                })
            }
            Some(false) => tokens
                .get(credential.token())
                .map(|issued| issued.principal.clone())
                .ok_or_else(unknown),
            None => Err(unknown()),
        }
    }
}
