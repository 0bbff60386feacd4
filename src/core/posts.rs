//! Blog posts on top of the request mediator
//!
//! A post is stored as a `post` resource with `title`, `content` and
//! `author_id` attributes. `author_id` is always stamped from the resolved
//! principal on create and is never taken from a request body.

use crate::config::ServiceConfig;
use crate::core::audit::AuditTrail;
use crate::core::iam::{PolicyHandle, PolicyStore, OWNER_ATTRIBUTE};
use crate::core::mediator::RequestMediator;
use crate::core::principal::{Credential, PrincipalResolver, TokenRegistry};
use crate::core::repository::{InMemoryRepository, ResourceRepository};
use crate::core::resource::{AttrValue, Attributes, Resource, ResourceId};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Resource type tag for posts
pub const POST: &str = "post";

const TITLE: &str = "title";
const CONTENT: &str = "content";

/// Payload for creating a post
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewPost {
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    #[validate(length(min = 1))]
    pub content: String,
}

impl NewPost {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        NewPost {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Partial update; only the fields that are set are changed
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PostUpdate {
    #[validate(length(min = 1, max = 100))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[validate(length(min = 1))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl PostUpdate {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    fn into_changes(self) -> Attributes {
        let mut changes = Attributes::new();
        if let Some(title) = self.title {
            changes.insert(TITLE, title);
        }
        if let Some(content) = self.content {
            changes.insert(CONTENT, content);
        }
        changes
    }
}

/// Typed view of a stored post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: ResourceId,
    pub title: String,
    pub content: String,
    pub author_id: String,
}

impl TryFrom<Resource> for Post {
    type Error = Error;

    fn try_from(resource: Resource) -> Result<Self> {
        let text = |name: &str| -> Result<String> {
            resource
                .attributes
                .get(name)
                .map(|v| v.canonical().into_owned())
                .ok_or_else(|| {
                    Error::Repository(format!(
                        "post {} is missing attribute '{}'",
                        resource.id, name
                    ))
                })
        };

        Ok(Post {
            title: text(TITLE)?,
            content: text(CONTENT)?,
            author_id: text(OWNER_ATTRIBUTE)?,
            id: resource.id.clone(),
        })
    }
}

fn validated<T: Validate>(payload: &T) -> Result<()> {
    payload
        .validate()
        .map_err(|e| Error::InvalidInput(e.to_string()))
}

/// Post CRUD, every call gated by the mediator
pub struct PostService<R, P> {
    mediator: RequestMediator<R, P>,
}

impl PostService<InMemoryRepository, TokenRegistry> {
    /// Build an in-memory service from configuration
    ///
    /// Fails with `PolicyLoad` if the configured policy is missing or
    /// malformed; the service must not start without a policy.
    pub fn in_memory(config: &ServiceConfig) -> Result<Self> {
        config.validate_settings()?;
        let store = PolicyStore::from_path(&config.policy_path)?;

        Ok(PostService::new(RequestMediator::with_audit(
            InMemoryRepository::new(),
            TokenRegistry::new(config.token_ttl_minutes),
            Arc::new(PolicyHandle::new(store)),
            Arc::new(AuditTrail::new(config.audit_capacity)),
        )))
    }
}

impl<R, P> PostService<R, P>
where
    R: ResourceRepository,
    P: PrincipalResolver,
{
    pub fn new(mediator: RequestMediator<R, P>) -> Self {
        PostService { mediator }
    }

    pub fn mediator(&self) -> &RequestMediator<R, P> {
        &self.mediator
    }

    pub fn create(&self, credential: &Credential, post: NewPost) -> Result<Post> {
        let resource = self.mediator.create(credential, POST, |principal| {
            validated(&post)?;
            Ok(Attributes::new()
                .with(TITLE, post.title)
                .with(CONTENT, post.content)
                .with(OWNER_ATTRIBUTE, AttrValue::from(principal.id.as_str())))
        })?;
        Post::try_from(resource)
    }

    pub fn get(&self, credential: &Credential, id: &ResourceId) -> Result<Post> {
        Post::try_from(self.mediator.read(credential, POST, id)?)
    }

    /// Every post the caller may read
    pub fn list(&self, credential: &Credential) -> Result<Vec<Post>> {
        self.mediator
            .list(credential, POST)?
            .into_iter()
            .map(Post::try_from)
            .collect()
    }

    pub fn update(&self, credential: &Credential, id: &ResourceId, update: PostUpdate) -> Result<Post> {
        let resource = self.mediator.update(credential, POST, id, |current| {
            validated(&update)?;
            let mut next = current.clone();
            next.merge(update.into_changes());
            Ok(next)
        })?;
        Post::try_from(resource)
    }

    pub fn delete(&self, credential: &Credential, id: &ResourceId) -> Result<()> {
        self.mediator.delete(credential, POST, id)
    }
}
