//! Policy subsystem: rules, conditions, the policy store and the decision engine
//!
//! Provides role and attribute based access control with:
//! - TOML/JSON policy documents, one ordered rule list per resource type
//! - Allow/Deny rules with explicit deny precedence and default deny
//! - Ownership and literal conditions evaluated against a resource snapshot
//! - Load-time mapping of every action/role/effect token to a closed type

mod condition;
mod engine;
mod policy;
mod store;

pub use condition::{Condition, ConditionOperator, ConditionConfig, OWNER_ATTRIBUTE};
pub use engine::{evaluate, Decision, DecisionEngine};
pub use policy::{
    Action, Effect, PolicyDocument, ResourcePolicyConfig, Rule, RuleRef, RuleConfig, WILDCARD,
};
pub use store::{PolicyHandle, PolicyStore};
