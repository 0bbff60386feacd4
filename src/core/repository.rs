//! Resource repository
//!
//! Persistence is an external collaborator; the mediator only depends on the
//! [`ResourceRepository`] trait. Every stored resource carries a version so
//! an update or delete can prove the resource is still in the state the
//! authorization decision was made against.

use crate::core::resource::{Attributes, Resource, ResourceId, Snapshot};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Fetch and mutate persisted resources
pub trait ResourceRepository: Send + Sync {
    /// Read one resource, failing with `NotFound` on a miss
    fn fetch(&self, kind: &str, id: &ResourceId) -> Result<Snapshot>;

    /// Read every resource of a kind
    fn list(&self, kind: &str) -> Result<Vec<Snapshot>>;

    /// Persist a new resource and return its id
    fn create(&self, kind: &str, attributes: Attributes) -> Result<ResourceId>;

    /// Replace a resource's attributes if it is still at `expected_version`
    fn update(
        &self,
        kind: &str,
        id: &ResourceId,
        attributes: Attributes,
        expected_version: u64,
    ) -> Result<Snapshot>;

    /// Remove a resource if it is still at `expected_version`
    fn delete(&self, kind: &str, id: &ResourceId, expected_version: u64) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredResource {
    attributes: Attributes,
    version: u64,
    /// Insertion sequence, for stable listing order
    seq: u64,
}

/// Thread-safe in-memory repository with optimistic version checks
///
/// The version check and the write happen under the same write lock, so a
/// concurrent writer between a caller's fetch and its write is detected
/// as `Conflict` rather than silently overwritten.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    resources: RwLock<HashMap<String, BTreeMap<ResourceId, StoredResource>>>,
    next_id: AtomicU64,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored resources of a kind
    pub fn count(&self, kind: &str) -> usize {
        self.resources
            .read()
            .get(kind)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    fn snapshot(kind: &str, id: &ResourceId, stored: &StoredResource) -> Snapshot {
        Snapshot {
            resource: Resource {
                id: id.clone(),
                kind: kind.to_string(),
                attributes: stored.attributes.clone(),
            },
            version: stored.version,
        }
    }

    fn check_version(
        kind: &str,
        id: &ResourceId,
        stored: &StoredResource,
        expected_version: u64,
    ) -> Result<()> {
        if stored.version != expected_version {
            debug!(
                kind,
                id = %id,
                expected_version,
                actual_version = stored.version,
                "Version check failed"
            );
            return Err(Error::Conflict {
                resource_type: kind.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

impl ResourceRepository for InMemoryRepository {
    fn fetch(&self, kind: &str, id: &ResourceId) -> Result<Snapshot> {
        self.resources
            .read()
            .get(kind)
            .and_then(|table| table.get(id))
            .map(|stored| Self::snapshot(kind, id, stored))
            .ok_or_else(|| Error::not_found(kind, id))
    }

    fn list(&self, kind: &str) -> Result<Vec<Snapshot>> {
        let resources = self.resources.read();
        let Some(table) = resources.get(kind) else {
            return Ok(Vec::new());
        };

        let mut entries: Vec<_> = table.iter().collect();
        entries.sort_by_key(|(_, stored)| stored.seq);
        Ok(entries
            .into_iter()
            .map(|(id, stored)| Self::snapshot(kind, id, stored))
            .collect())
    }

    fn create(&self, kind: &str, attributes: Attributes) -> Result<ResourceId> {
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = ResourceId::from(seq);

        self.resources.write().entry(kind.to_string()).or_default().insert(
            id.clone(),
            StoredResource {
                attributes,
                version: 1,
                seq,
            },
        );
        Ok(id)
    }

    fn update(
        &self,
        kind: &str,
        id: &ResourceId,
        attributes: Attributes,
        expected_version: u64,
    ) -> Result<Snapshot> {
        let mut resources = self.resources.write();
        let stored = resources
            .get_mut(kind)
            .and_then(|table| table.get_mut(id))
            .ok_or_else(|| Error::not_found(kind, id))?;

        Self::check_version(kind, id, stored, expected_version)?;
        stored.attributes = attributes;
        stored.version += 1;
        Ok(Self::snapshot(kind, id, stored))
    }

    fn delete(&self, kind: &str, id: &ResourceId, expected_version: u64) -> Result<()> {
        let mut resources = self.resources.write();
        let table = resources
            .get_mut(kind)
            .ok_or_else(|| Error::not_found(kind, id))?;
        let stored = table.get(id).ok_or_else(|| Error::not_found(kind, id))?;

        Self::check_version(kind, id, stored, expected_version)?;
        table.remove(id);
        Ok(())
    }
}
