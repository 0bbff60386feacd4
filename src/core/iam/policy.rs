//! Policy rule structure
//!
//! Two layers live here:
//! - the declarative source document ([`PolicyDocument`]) exactly as it is
//!   written in TOML or JSON, with open string tokens
//! - the compiled [`Rule`] the engine evaluates, with every token mapped to
//!   a closed enum so an unknown action or role is a load-time failure

use super::condition::{Condition, ConditionConfig};
use crate::core::principal::Role;
use crate::error::PolicyLoadError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Token that expands to every action or every role
pub const WILDCARD: &str = "*";

/// Effect of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// Allow the action
    Allow,
    /// Deny the action (takes precedence over Allow)
    Deny,
}

impl FromStr for Effect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALLOW" | "EFFECT_ALLOW" => Ok(Effect::Allow),
            "DENY" | "EFFECT_DENY" => Ok(Effect::Deny),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => f.write_str("ALLOW"),
            Effect::Deny => f.write_str("DENY"),
        }
    }
}

/// Verbs a principal can attempt on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Read a single resource or a collection
    Read,
    /// Create a new resource
    Create,
    /// Modify an existing resource
    Update,
    /// Remove an existing resource
    Delete,
}

impl Action {
    /// Every action, in declaration order
    pub const ALL: [Action; 4] = [Action::Read, Action::Create, Action::Update, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Action::Read),
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(other.to_string()),
        }
    }
}

/// A compiled rule: (actions, effect, roles, optional condition)
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Optional rule name, reported in decisions
    pub id: Option<String>,

    /// Actions this rule applies to
    pub actions: BTreeSet<Action>,

    /// Effect when the rule matches
    pub effect: Effect,

    /// Roles this rule applies to
    pub roles: BTreeSet<Role>,

    /// Predicate that must hold against the resource snapshot
    pub condition: Option<Condition>,
}

impl Rule {
    /// Create an unconditioned rule
    pub fn new(
        effect: Effect,
        actions: impl IntoIterator<Item = Action>,
        roles: impl IntoIterator<Item = Role>,
    ) -> Self {
        Rule {
            id: None,
            actions: actions.into_iter().collect(),
            effect,
            roles: roles.into_iter().collect(),
            condition: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Check if this rule covers the given action and role
    ///
    /// Conditions are not consulted here; they need a resource snapshot.
    pub fn applies_to(&self, action: Action, role: Role) -> bool {
        self.actions.contains(&action) && self.roles.contains(&role)
    }
}

/// Reference to the rule that produced a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleRef {
    pub resource_type: String,
    /// Position of the rule in its resource type's ordered list
    pub index: usize,
    pub id: Option<String>,
    pub effect: Effect,
}

impl fmt::Display for RuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.resource_type, self.index)?;
        if let Some(id) = &self.id {
            write!(f, " '{}'", id)?;
        }
        write!(f, " {}", self.effect)
    }
}

/// Declarative policy source, one ordered rule list per resource type
///
/// ```toml
/// [[resources.post.rules]]
/// actions = ["update"]
/// effect = "ALLOW"
/// roles = ["admin", "author"]
/// condition = { left = "resource.attr.author_id", op = "equals", right = "principal.id" }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
    /// Free-form policy version label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub resources: BTreeMap<String, ResourcePolicyConfig>,
}

impl PolicyDocument {
    pub fn from_toml(source: &str) -> Result<Self, PolicyLoadError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_json(source: &str) -> Result<Self, PolicyLoadError> {
        Ok(serde_json::from_str(source)?)
    }
}

/// Ordered rules for one resource type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourcePolicyConfig {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// A rule as written in the source document
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[validate(length(min = 1, message = "rule must name at least one action"))]
    pub actions: Vec<String>,

    pub effect: String,

    #[validate(length(min = 1, message = "rule must name at least one role"))]
    pub roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionConfig>,
}

impl RuleConfig {
    /// Map every open token to its closed type
    pub fn compile(&self, resource_type: &str, index: usize) -> Result<Rule, PolicyLoadError> {
        self.validate().map_err(|e| PolicyLoadError::EmptyRule {
            resource_type: resource_type.to_string(),
            index,
            reason: e.to_string(),
        })?;

        let effect = self
            .effect
            .parse::<Effect>()
            .map_err(|token| PolicyLoadError::UnknownEffect {
                resource_type: resource_type.to_string(),
                index,
                token,
            })?;

        let actions = expand_tokens(&self.actions, &Action::ALL, |token| {
            PolicyLoadError::UnknownAction {
                resource_type: resource_type.to_string(),
                index,
                token,
            }
        })?;

        let roles = expand_tokens(&self.roles, &Role::ALL, |token| PolicyLoadError::UnknownRole {
            resource_type: resource_type.to_string(),
            index,
            token,
        })?;

        let condition = match &self.condition {
            Some(condition) => {
                if actions.contains(&Action::Create) {
                    return Err(PolicyLoadError::ConditionOnCreate {
                        resource_type: resource_type.to_string(),
                        index,
                    });
                }
                Some(condition.compile(resource_type, index)?)
            }
            None => None,
        };

        Ok(Rule {
            id: self.id.clone(),
            actions,
            effect,
            roles,
            condition,
        })
    }
}

/// Parse tokens into a closed set, expanding the wildcard
fn expand_tokens<T, F>(
    tokens: &[String],
    all: &[T],
    unknown: F,
) -> Result<BTreeSet<T>, PolicyLoadError>
where
    T: FromStr<Err = String> + Ord + Copy,
    F: Fn(String) -> PolicyLoadError,
{
    let mut set = BTreeSet::new();
    for token in tokens {
        if token.trim() == WILDCARD {
            set.extend(all.iter().copied());
            continue;
        }
        set.insert(token.parse::<T>().map_err(|_| unknown(token.clone()))?);
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_config(actions: &[&str], effect: &str, roles: &[&str]) -> RuleConfig {
        RuleConfig {
            id: None,
            actions: actions.iter().map(|s| s.to_string()).collect(),
            effect: effect.to_string(),
            roles: roles.iter().map(|s| s.to_string()).collect(),
            condition: None,
        }
    }

    #[test]
    fn test_effect_tokens() {
        assert_eq!("ALLOW".parse::<Effect>(), Ok(Effect::Allow));
        assert_eq!("deny".parse::<Effect>(), Ok(Effect::Deny));
        assert_eq!("EFFECT_DENY".parse::<Effect>(), Ok(Effect::Deny));
        assert!("PERMIT".parse::<Effect>().is_err());
    }

    #[test]
    fn test_compile_simple_rule() {
        let rule = rule_config(&["read", "create"], "ALLOW", &["admin", "author"])
            .compile("post", 0)
            .unwrap();

        assert_eq!(rule.effect, Effect::Allow);
        assert!(rule.applies_to(Action::Read, Role::Author));
        assert!(rule.applies_to(Action::Create, Role::Admin));
        assert!(!rule.applies_to(Action::Delete, Role::Admin));
        assert!(!rule.applies_to(Action::Read, Role::Reader));
    }

    #[test]
    fn test_compile_expands_wildcards() {
        let rule = rule_config(&["*"], "ALLOW", &["*"]).compile("post", 0).unwrap();
        assert_eq!(rule.actions.len(), Action::ALL.len());
        assert_eq!(rule.roles.len(), Role::ALL.len());
    }

    #[test]
    fn test_compile_rejects_unknown_tokens() {
        let err = rule_config(&["publish"], "ALLOW", &["admin"])
            .compile("post", 2)
            .unwrap_err();
        assert!(matches!(
            err,
            PolicyLoadError::UnknownAction { ref token, index: 2, .. } if token == "publish"
        ));

        let err = rule_config(&["read"], "ALLOW", &["editor"]).compile("post", 0).unwrap_err();
        assert!(matches!(err, PolicyLoadError::UnknownRole { .. }));

        let err = rule_config(&["read"], "MAYBE", &["admin"]).compile("post", 0).unwrap_err();
        assert!(matches!(err, PolicyLoadError::UnknownEffect { .. }));
    }

    #[test]
    fn test_compile_rejects_empty_sets() {
        let err = rule_config(&[], "ALLOW", &["admin"]).compile("post", 0).unwrap_err();
        assert!(matches!(err, PolicyLoadError::EmptyRule { .. }));

        let err = rule_config(&["read"], "ALLOW", &[]).compile("post", 0).unwrap_err();
        assert!(matches!(err, PolicyLoadError::EmptyRule { .. }));
    }

    #[test]
    fn test_rule_ref_display() {
        let r = RuleRef {
            resource_type: "post".into(),
            index: 3,
            id: Some("owner-update".into()),
            effect: Effect::Allow,
        };
        assert_eq!(r.to_string(), "post[3] 'owner-update' ALLOW");
    }
}
