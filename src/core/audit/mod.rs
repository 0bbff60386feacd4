//! Audit trail of authorization decisions
//!
//! Every decision the mediator makes is appended to a bounded buffer:
//! - Oldest entries are dropped once capacity is reached
//! - Total recorded count survives eviction
//! - Safe to share between request-handling threads

use crate::core::iam::{Action, Decision, RuleRef};
use crate::core::principal::{Principal, Role};
use crate::core::resource::ResourceId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of records kept in memory
pub const DEFAULT_AUDIT_CAPACITY: usize = 1024;

/// One authorization decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub principal_id: String,
    pub role: Role,
    pub action: Action,
    pub resource_type: String,
    /// `None` for create and collection reads
    pub resource_id: Option<ResourceId>,
    pub allowed: bool,
    pub rule: Option<RuleRef>,
}

impl AuditRecord {
    pub fn new(
        principal: &Principal,
        action: Action,
        resource_type: &str,
        resource_id: Option<&ResourceId>,
        decision: &Decision,
    ) -> Self {
        AuditRecord {
            timestamp: Utc::now(),
            principal_id: principal.id.clone(),
            role: principal.role,
            action,
            resource_type: resource_type.to_string(),
            resource_id: resource_id.cloned(),
            allowed: decision.allowed,
            rule: decision.matched.clone(),
        }
    }
}

/// Bounded in-memory decision log
#[derive(Debug)]
pub struct AuditTrail {
    entries: Mutex<VecDeque<AuditRecord>>,
    capacity: usize,
    total: AtomicU64,
}

impl AuditTrail {
    /// Create a trail keeping at most `capacity` records (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        AuditTrail {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            total: AtomicU64::new(0),
        }
    }

    pub fn record(&self, record: AuditRecord) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(record);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Up to `n` most recent records, oldest first
    pub fn recent(&self, n: usize) -> Vec<AuditRecord> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Retained denials, oldest first
    pub fn denials(&self) -> Vec<AuditRecord> {
        self.entries
            .lock()
            .iter()
            .filter(|r| !r.allowed)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Records ever written, including evicted ones
    pub fn total_recorded(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn record(principal_id: &str, allowed: bool) -> AuditRecord {
        let decision = Decision {
            allowed,
            matched: None,
        };
        AuditRecord::new(
            &Principal::new(principal_id, Role::Author),
            Action::Update,
            "post",
            Some(&ResourceId::from(1)),
            &decision,
        )
    }

    #[test]
    fn test_record_fields() {
        let r = record("u1", true);
        assert_eq!(r.principal_id, "u1");
        assert_eq!(r.role, Role::Author);
        assert_eq!(r.action, Action::Update);
        assert_eq!(r.resource_id, Some(ResourceId::from(1)));
        assert!(r.allowed);
    }

    #[test]
    fn test_eviction_keeps_newest() {
        let trail = AuditTrail::new(3);
        for i in 0..5 {
            trail.record(record(&format!("u{}", i), i % 2 == 0));
        }

        assert_eq!(trail.len(), 3);
        assert_eq!(trail.total_recorded(), 5);

        let ids: Vec<_> = trail.recent(10).into_iter().map(|r| r.principal_id).collect();
        assert_eq!(ids, vec!["u2", "u3", "u4"]);

        let ids: Vec<_> = trail.recent(1).into_iter().map(|r| r.principal_id).collect();
        assert_eq!(ids, vec!["u4"]);

        assert_eq!(trail.denials().len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let trail = AuditTrail::new(0);
        trail.record(record("u1", true));
        assert_eq!(trail.capacity(), 1);
        assert_eq!(trail.len(), 1);
    }

    #[test]
    fn test_concurrent_recording() {
        let trail = Arc::new(AuditTrail::new(10_000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let trail = Arc::clone(&trail);
                thread::spawn(move || {
                    for i in 0..100 {
                        trail.record(record(&format!("t{}-{}", t, i), true));
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(trail.total_recorded(), 800);
        assert_eq!(trail.len(), 800);
    }
}
