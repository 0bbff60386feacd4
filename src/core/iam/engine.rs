//! Decision engine with deny precedence
//!
//! Pure evaluation of (principal, action, resource type, attributes) against
//! the rules of a [`PolicyStore`]:
//! - rules are filtered by action, then by role
//! - a conditioned rule stays a candidate only if its condition holds on the
//!   supplied snapshot; without a snapshot it is excluded
//! - any surviving DENY wins, otherwise any surviving ALLOW allows
//! - no surviving rule means DENY

use super::{Action, Effect, PolicyStore, RuleRef};
use crate::core::principal::Principal;
use crate::core::resource::Attributes;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    /// Rule that produced the outcome; `None` for default deny
    pub matched: Option<RuleRef>,
}

impl Decision {
    /// No rule matched
    pub fn default_deny() -> Self {
        Decision {
            allowed: false,
            matched: None,
        }
    }

    pub fn is_default_deny(&self) -> bool {
        !self.allowed && self.matched.is_none()
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = if self.allowed { "ALLOW" } else { "DENY" };
        match &self.matched {
            Some(rule) => write!(f, "{} by {}", outcome, rule),
            None => write!(f, "{} (no matching rule)", outcome),
        }
    }
}

/// Evaluates requests against a shared policy store
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    store: Arc<PolicyStore>,
}

impl DecisionEngine {
    pub fn new(store: Arc<PolicyStore>) -> Self {
        DecisionEngine { store }
    }

    /// Decide whether `principal` may perform `action` on a resource
    ///
    /// `attributes` is `None` when the resource does not exist yet (create).
    ///
    /// # Examples
    ///
    /// ```
    /// use postwarden::{Action, Condition, DecisionEngine, Effect, PolicyStore, Principal, Role, Rule};
    /// use postwarden::Attributes;
    /// use std::sync::Arc;
    ///
    /// let store = PolicyStore::from_rules([(
    ///     "post".to_string(),
    ///     vec![Rule::new(Effect::Allow, [Action::Update], [Role::Author])
    ///         .with_condition(Condition::owner())],
    /// )]);
    /// let engine = DecisionEngine::new(Arc::new(store));
    /// let author = Principal::new("u1", Role::Author);
    ///
    /// let own = Attributes::new().with("author_id", "u1");
    /// assert!(engine.decide(&author, Action::Update, "post", Some(&own)).allowed);
    ///
    /// let other = Attributes::new().with("author_id", "u2");
    /// assert!(!engine.decide(&author, Action::Update, "post", Some(&other)).allowed);
    /// ```
    pub fn decide(
        &self,
        principal: &Principal,
        action: Action,
        resource_type: &str,
        attributes: Option<&Attributes>,
    ) -> Decision {
        evaluate(&self.store, principal, action, resource_type, attributes)
    }

    /// Same as [`decide`](Self::decide) for an action token that may be unknown
    ///
    /// An unrecognised action is not an error; it is denied by default.
    pub fn decide_token(
        &self,
        principal: &Principal,
        action: &str,
        resource_type: &str,
        attributes: Option<&Attributes>,
    ) -> Decision {
        match action.parse::<Action>() {
            Ok(action) => self.decide(principal, action, resource_type, attributes),
            Err(_) => Decision::default_deny(),
        }
    }
}

/// Evaluate without an engine wrapper
pub fn evaluate(
    store: &PolicyStore,
    principal: &Principal,
    action: Action,
    resource_type: &str,
    attributes: Option<&Attributes>,
) -> Decision {
    let mut first_allow = None;

    for (index, rule) in store.rules_for(resource_type).iter().enumerate() {
        if !rule.applies_to(action, principal.role) {
            continue;
        }

        if let Some(condition) = &rule.condition {
            match attributes {
                Some(attrs) if condition.evaluate(principal, attrs) => {}
                // Condition failed, or there is no state to prove it against
                _ => continue,
            }
        }

        let rule_ref = || RuleRef {
            resource_type: resource_type.to_string(),
            index,
            id: rule.id.clone(),
            effect: rule.effect,
        };

        match rule.effect {
            Effect::Deny => {
                return Decision {
                    allowed: false,
                    matched: Some(rule_ref()),
                };
            }
            Effect::Allow => {
                if first_allow.is_none() {
                    first_allow = Some(rule_ref());
                }
            }
        }
    }

    match first_allow {
        Some(rule) => Decision {
            allowed: true,
            matched: Some(rule),
        },
        None => Decision::default_deny(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::iam::{Condition, Rule};
    use crate::core::principal::Role;

    fn engine(rules: Vec<Rule>) -> DecisionEngine {
        DecisionEngine::new(Arc::new(PolicyStore::from_rules([(
            "post".to_string(),
            rules,
        )])))
    }

    #[test]
    fn test_simple_allow() {
        let engine = engine(vec![Rule::new(Effect::Allow, [Action::Read], [Role::Reader])]);
        let reader = Principal::new("r1", Role::Reader);

        let decision = engine.decide(&reader, Action::Read, "post", None);
        assert!(decision.allowed);
        assert_eq!(decision.matched.as_ref().map(|r| r.index), Some(0));

        assert!(!engine.decide(&reader, Action::Update, "post", None).allowed);
    }

    #[test]
    fn test_role_not_listed_is_denied() {
        let engine = engine(vec![Rule::new(Effect::Allow, [Action::Create], [Role::Admin])]);
        let author = Principal::new("a1", Role::Author);

        let decision = engine.decide(&author, Action::Create, "post", None);
        assert!(decision.is_default_deny());
    }

    #[test]
    fn test_deny_precedence() {
        let engine = engine(vec![
            Rule::new(Effect::Allow, [Action::Read], Role::ALL),
            Rule::new(Effect::Allow, [Action::Read], [Role::Author]),
            Rule::new(Effect::Deny, [Action::Read], [Role::Author]).with_id("authors-blind"),
        ]);
        let author = Principal::new("a1", Role::Author);

        let decision = engine.decide(&author, Action::Read, "post", None);
        assert!(!decision.allowed);
        let matched = decision.matched.unwrap();
        assert_eq!(matched.index, 2);
        assert_eq!(matched.effect, Effect::Deny);
        assert_eq!(matched.id.as_deref(), Some("authors-blind"));

        // Other roles still allowed by the first rule
        let reader = Principal::new("r1", Role::Reader);
        assert!(engine.decide(&reader, Action::Read, "post", None).allowed);
    }

    #[test]
    fn test_deny_before_allow_in_order_still_wins() {
        let engine = engine(vec![
            Rule::new(Effect::Deny, [Action::Delete], [Role::Admin]),
            Rule::new(Effect::Allow, [Action::Delete], [Role::Admin]),
        ]);
        let admin = Principal::new("root", Role::Admin);
        assert!(!engine.decide(&admin, Action::Delete, "post", None).allowed);
    }

    #[test]
    fn test_condition_without_snapshot_is_excluded() {
        let engine = engine(vec![Rule::new(Effect::Allow, [Action::Update], [Role::Author])
            .with_condition(Condition::owner())]);
        let author = Principal::new("u1", Role::Author);

        assert!(engine.decide(&author, Action::Update, "post", None).is_default_deny());
    }

    #[test]
    fn test_conditioned_deny_only_applies_when_true() {
        let engine = engine(vec![
            Rule::new(Effect::Allow, [Action::Read], [Role::Author]),
            Rule::new(Effect::Deny, [Action::Read], [Role::Author]).with_condition(
                Condition::AttributeMatchesLiteral {
                    attribute: "status".into(),
                    operator: crate::core::iam::ConditionOperator::Equals,
                    value: "hidden".into(),
                },
            ),
        ]);
        let author = Principal::new("u1", Role::Author);

        let visible = Attributes::new().with("status", "published");
        let hidden = Attributes::new().with("status", "hidden");
        assert!(engine.decide(&author, Action::Read, "post", Some(&visible)).allowed);
        assert!(!engine.decide(&author, Action::Read, "post", Some(&hidden)).allowed);
    }

    #[test]
    fn test_unknown_resource_type_and_action() {
        let engine = engine(vec![Rule::new(Effect::Allow, Action::ALL, Role::ALL)]);
        let admin = Principal::new("root", Role::Admin);

        assert!(engine.decide(&admin, Action::Read, "comment", None).is_default_deny());
        assert!(engine.decide_token(&admin, "publish", "post", None).is_default_deny());
        assert!(engine.decide_token(&admin, "read", "post", None).allowed);
    }

    #[test]
    fn test_decision_display() {
        assert_eq!(
            Decision::default_deny().to_string(),
            "DENY (no matching rule)"
        );
    }
}
