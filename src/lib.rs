//! # Postwarden - Policy-Gated Content API Core
//!
//! `postwarden` decides whether an authenticated principal may read, create,
//! update or delete a blog post, and makes sure no repository operation runs
//! without that decision:
//!
//! - **Declarative policies** in TOML or JSON, one ordered rule list per resource type
//! - **Role and ownership rules**: `author` may update a post only if `author_id` is theirs
//! - **Deny precedence** and **default deny** when no rule matches
//! - **Single enforcement point**: resolve principal, fetch, decide, then act
//! - **Optimistic concurrency**: writes carry the version the decision was made on
//!
//! ## Quick Start
//!
//! ```rust
//! use postwarden::{NewPost, PolicyHandle, PolicyStore, PostService, Principal, RequestMediator, Role};
//! use postwarden::{InMemoryRepository, TokenRegistry};
//! use std::sync::Arc;
//!
//! # fn main() -> postwarden::Result<()> {
//! let policy = PolicyStore::from_toml_str(r#"
//!     [[resources.post.rules]]
//!     actions = ["read"]
//!     effect = "ALLOW"
//!     roles = ["*"]
//!
//!     [[resources.post.rules]]
//!     actions = ["create"]
//!     effect = "ALLOW"
//!     roles = ["admin", "author"]
//! "#)?;
//!
//! let service = PostService::new(RequestMediator::new(
//!     InMemoryRepository::new(),
//!     TokenRegistry::default(),
//!     Arc::new(PolicyHandle::new(policy)),
//! ));
//!
//! let author = service.mediator().resolver().issue(Principal::new("u1", Role::Author));
//! let reader = service.mediator().resolver().issue(Principal::new("u2", Role::Reader));
//!
//! let post = service.create(&author, NewPost::new("Hello", "First post"))?;
//! assert_eq!(post.author_id, "u1");
//!
//! assert!(service.create(&reader, NewPost::new("Nope", "Denied")).is_err());
//! assert_eq!(service.list(&reader)?.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;

pub use crate::config::ServiceConfig;
pub use crate::core::{
    audit::{AuditRecord, AuditTrail},
    iam::{
        Action, Condition, ConditionOperator, Decision, DecisionEngine, Effect, PolicyDocument,
        PolicyHandle, PolicyStore, Rule, RuleRef,
    },
    mediator::RequestMediator,
    posts::{NewPost, Post, PostService, PostUpdate, POST},
    principal::{Credential, Principal, PrincipalField, PrincipalResolver, Role, TokenRegistry},
    repository::{InMemoryRepository, ResourceRepository},
    resource::{AttrValue, Attributes, Resource, ResourceId, Snapshot},
};
pub use crate::error::{Error, PolicyLoadError, Result};
