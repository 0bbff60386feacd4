//! Policy store: ordered rules per resource type, immutable after load
//!
//! A store is built once from a declarative source and shared by `Arc`.
//! Reloading never edits a store in place; [`PolicyHandle`] swaps the whole
//! value so each request sees exactly one policy version.

use super::policy::{PolicyDocument, Rule};
use crate::error::PolicyLoadError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Immutable set of compiled rules keyed by resource type
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    version: Option<String>,
    rules: HashMap<String, Vec<Rule>>,
}

impl PolicyStore {
    /// A store with no rules (denies everything)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile a parsed document
    ///
    /// Fails on the first unknown token, empty rule or unresolvable condition.
    pub fn load(document: PolicyDocument) -> Result<Self, PolicyLoadError> {
        let mut rules = HashMap::with_capacity(document.resources.len());

        for (resource_type, policy) in &document.resources {
            let compiled = policy
                .rules
                .iter()
                .enumerate()
                .map(|(index, rule)| rule.compile(resource_type, index))
                .collect::<Result<Vec<_>, _>>()?;
            rules.insert(resource_type.clone(), compiled);
        }

        let store = PolicyStore {
            version: document.version,
            rules,
        };
        info!(
            version = store.version.as_deref().unwrap_or("unversioned"),
            resource_types = store.rules.len(),
            rules = store.rule_count(),
            "Policy store loaded"
        );
        Ok(store)
    }

    /// Build a store directly from compiled rules
    pub fn from_rules(rules: impl IntoIterator<Item = (String, Vec<Rule>)>) -> Self {
        PolicyStore {
            version: None,
            rules: rules.into_iter().collect(),
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self, PolicyLoadError> {
        Self::load(PolicyDocument::from_toml(source)?)
    }

    pub fn from_json_str(source: &str) -> Result<Self, PolicyLoadError> {
        Self::load(PolicyDocument::from_json(source)?)
    }

    /// Load from a `.toml` or `.json` file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PolicyLoadError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| PolicyLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&source),
            Some("json") => Self::from_json_str(&source),
            _ => Err(PolicyLoadError::UnknownFormat(path.to_path_buf())),
        }
    }

    /// Ordered rules for a resource type; empty for unknown types
    pub fn rules_for(&self, resource_type: &str) -> &[Rule] {
        self.rules
            .get(resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }
}

/// Shared, swappable reference to the current policy store
#[derive(Debug)]
pub struct PolicyHandle {
    current: RwLock<Arc<PolicyStore>>,
}

impl PolicyHandle {
    pub fn new(store: PolicyStore) -> Self {
        PolicyHandle {
            current: RwLock::new(Arc::new(store)),
        }
    }

    /// Snapshot of the store to use for one whole request
    pub fn current(&self) -> Arc<PolicyStore> {
        self.current.read().clone()
    }

    /// Atomically replace the store, returning the previous one
    pub fn replace(&self, store: PolicyStore) -> Arc<PolicyStore> {
        let mut current = self.current.write();
        std::mem::replace(&mut *current, Arc::new(store))
    }

    /// Load a new store from disk and swap it in; the old store stays on failure
    pub fn reload_from_path(&self, path: impl AsRef<Path>) -> Result<(), PolicyLoadError> {
        let store = PolicyStore::from_path(path)?;
        self.replace(store);
        Ok(())
    }
}

impl From<PolicyStore> for PolicyHandle {
    fn from(store: PolicyStore) -> Self {
        PolicyHandle::new(store)
    }
}
