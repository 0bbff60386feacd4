//! Request mediator: the single enforcement point
//!
//! Every operation runs the same state machine:
//!
//! ```text
//! RESOLVE_PRINCIPAL -> (FETCH_RESOURCE)? -> DECIDE -> (EXECUTE | REJECT)
//! ```
//!
//! The repository is read at most once before the decision and written at
//! most once after it. Nothing is written or disclosed on REJECT, and a
//! repository failure after ALLOW is surfaced as-is, never retried.

use crate::core::audit::{AuditRecord, AuditTrail};
use crate::core::iam::{Action, Decision, DecisionEngine, PolicyHandle};
use crate::core::principal::{Credential, Principal, PrincipalResolver};
use crate::core::repository::ResourceRepository;
use crate::core::resource::{Attributes, Resource, ResourceId};
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Orchestrates principal resolution, authorization and repository access
pub struct RequestMediator<R, P> {
    repository: R,
    resolver: P,
    policy: Arc<PolicyHandle>,
    audit: Arc<AuditTrail>,
}

impl<R, P> RequestMediator<R, P>
where
    R: ResourceRepository,
    P: PrincipalResolver,
{
    pub fn new(repository: R, resolver: P, policy: Arc<PolicyHandle>) -> Self {
        Self::with_audit(repository, resolver, policy, Arc::new(AuditTrail::default()))
    }

    pub fn with_audit(
        repository: R,
        resolver: P,
        policy: Arc<PolicyHandle>,
        audit: Arc<AuditTrail>,
    ) -> Self {
        RequestMediator {
            repository,
            resolver,
            policy,
            audit,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn resolver(&self) -> &P {
        &self.resolver
    }

    pub fn policy(&self) -> &Arc<PolicyHandle> {
        &self.policy
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Create a resource
    ///
    /// The decision is made without attributes. `build` runs only after an
    /// ALLOW and receives the resolved principal so it can stamp ownership.
    pub fn create<F>(&self, credential: &Credential, kind: &str, build: F) -> Result<Resource>
    where
        F: FnOnce(&Principal) -> Result<Attributes>,
    {
        let principal = self.resolve(credential)?;
        let engine = self.engine();

        self.enforce(&engine, &principal, Action::Create, kind, None, None)?;

        let attributes = build(&principal)?;
        let id = self
            .repository
            .create(kind, attributes.clone())
            .map_err(|e| execution_failed(Action::Create, kind, None, e))?;

        debug!(kind, id = %id, principal_id = %principal.id, "Resource created");
        Ok(Resource {
            id,
            kind: kind.to_string(),
            attributes,
        })
    }

    /// Read a single resource; the resource is fetched before the check
    pub fn read(&self, credential: &Credential, kind: &str, id: &ResourceId) -> Result<Resource> {
        let principal = self.resolve(credential)?;
        let engine = self.engine();

        let snapshot = self.repository.fetch(kind, id)?;
        self.enforce(
            &engine,
            &principal,
            Action::Read,
            kind,
            Some(id),
            Some(snapshot.attributes()),
        )?;

        Ok(snapshot.resource)
    }

    /// Read a collection, dropping the items the principal may not read
    ///
    /// Denied items are filtered out; the request itself never fails on a
    /// per-item denial.
    pub fn list(&self, credential: &Credential, kind: &str) -> Result<Vec<Resource>> {
        let principal = self.resolve(credential)?;
        let engine = self.engine();

        let snapshots = self.repository.list(kind)?;
        let total = snapshots.len();

        let visible: Vec<Resource> = snapshots
            .into_iter()
            .filter(|snapshot| {
                self.authorize(
                    &engine,
                    &principal,
                    Action::Read,
                    kind,
                    Some(snapshot.id()),
                    Some(snapshot.attributes()),
                )
                .allowed
            })
            .map(|snapshot| snapshot.resource)
            .collect();

        debug!(
            kind,
            principal_id = %principal.id,
            total,
            visible = visible.len(),
            "Collection read filtered"
        );
        Ok(visible)
    }

    /// Update a resource, checked against its current (pre-mutation) state
    ///
    /// `apply` receives the current attributes and returns the new ones. It
    /// runs only after an ALLOW, and the write carries the fetched version
    /// so a concurrent change surfaces as `Conflict`.
    pub fn update<F>(
        &self,
        credential: &Credential,
        kind: &str,
        id: &ResourceId,
        apply: F,
    ) -> Result<Resource>
    where
        F: FnOnce(&Attributes) -> Result<Attributes>,
    {
        let principal = self.resolve(credential)?;
        let engine = self.engine();

        let snapshot = self.repository.fetch(kind, id)?;
        self.enforce(
            &engine,
            &principal,
            Action::Update,
            kind,
            Some(id),
            Some(snapshot.attributes()),
        )?;

        let attributes = apply(snapshot.attributes())?;
        let updated = self
            .repository
            .update(kind, id, attributes, snapshot.version)
            .map_err(|e| execution_failed(Action::Update, kind, Some(id), e))?;

        debug!(kind, id = %id, version = updated.version, "Resource updated");
        Ok(updated.resource)
    }

    /// Delete a resource, checked against its current state
    pub fn delete(&self, credential: &Credential, kind: &str, id: &ResourceId) -> Result<()> {
        let principal = self.resolve(credential)?;
        let engine = self.engine();

        let snapshot = self.repository.fetch(kind, id)?;
        self.enforce(
            &engine,
            &principal,
            Action::Delete,
            kind,
            Some(id),
            Some(snapshot.attributes()),
        )?;

        self.repository
            .delete(kind, id, snapshot.version)
            .map_err(|e| execution_failed(Action::Delete, kind, Some(id), e))?;

        debug!(kind, id = %id, "Resource deleted");
        Ok(())
    }

    fn resolve(&self, credential: &Credential) -> Result<Principal> {
        self.resolver.resolve(credential).map_err(|e| {
            debug!(error = %e, "Principal resolution failed");
            e
        })
    }

    /// One policy snapshot per request, even if a reload lands mid-request
    fn engine(&self) -> DecisionEngine {
        DecisionEngine::new(self.policy.current())
    }

    fn authorize(
        &self,
        engine: &DecisionEngine,
        principal: &Principal,
        action: Action,
        kind: &str,
        id: Option<&ResourceId>,
        attributes: Option<&Attributes>,
    ) -> Decision {
        let decision = engine.decide(principal, action, kind, attributes);

        debug!(
            principal_id = %principal.id,
            role = %principal.role,
            %action,
            kind,
            id = id.map(ResourceId::as_str).unwrap_or("-"),
            decision = %decision,
            "Authorization decision"
        );
        self.audit
            .record(AuditRecord::new(principal, action, kind, id, &decision));
        decision
    }

    fn enforce(
        &self,
        engine: &DecisionEngine,
        principal: &Principal,
        action: Action,
        kind: &str,
        id: Option<&ResourceId>,
        attributes: Option<&Attributes>,
    ) -> Result<()> {
        let decision = self.authorize(engine, principal, action, kind, id, attributes);
        if decision.allowed {
            return Ok(());
        }

        info!(
            principal_id = %principal.id,
            role = %principal.role,
            %action,
            kind,
            id = id.map(ResourceId::as_str).unwrap_or("-"),
            "Request rejected"
        );
        Err(Error::forbidden(action, kind, principal.role))
    }
}

fn execution_failed(action: Action, kind: &str, id: Option<&ResourceId>, error: Error) -> Error {
    warn!(
        %action,
        kind,
        id = id.map(ResourceId::as_str).unwrap_or("-"),
        error = %error,
        "Repository operation failed after authorization"
    );
    error
}
