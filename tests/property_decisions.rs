//! Property-based tests for decision engine invariants
//!
//! Uses proptest to verify the authorization contract holds across random
//! principals, resources and rule sets

use postwarden::{
    Action, Attributes, Condition, DecisionEngine, Effect, PolicyStore, Principal, Role, Rule,
};
use proptest::prelude::*;
use std::sync::Arc;

const BLOG_TOML: &str = include_str!("../policies/blog.toml");

fn blog_engine() -> DecisionEngine {
    DecisionEngine::new(Arc::new(PolicyStore::from_toml_str(BLOG_TOML).unwrap()))
}

fn role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::Admin), Just(Role::Author), Just(Role::Reader)]
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::Read),
        Just(Action::Create),
        Just(Action::Update),
        Just(Action::Delete)
    ]
}

fn user_id() -> impl Strategy<Value = String> {
    "u[0-9]{1,2}"
}

fn rule() -> impl Strategy<Value = Rule> {
    (
        prop::sample::subsequence(Action::ALL.to_vec(), 1..=4),
        prop::sample::subsequence(Role::ALL.to_vec(), 1..=3),
        prop::bool::ANY,
        prop::bool::ANY,
    )
        .prop_map(|(actions, roles, deny, owned)| {
            let effect = if deny { Effect::Deny } else { Effect::Allow };
            let rule = Rule::new(effect, actions.iter().copied(), roles);
            if owned && !actions.contains(&Action::Create) {
                rule.with_condition(Condition::owner())
            } else {
                rule
            }
        })
}

fn post_by(owner: &str) -> Attributes {
    Attributes::new().with("author_id", owner)
}

proptest! {
    #[test]
    fn prop_role_without_rule_is_denied(
        rules in prop::collection::vec(rule(), 0..8),
        role in role(),
        action in action(),
        owner in user_id(),
    ) {
        let rules: Vec<Rule> = rules.into_iter().filter(|r| !r.roles.contains(&role)).collect();
        let engine = DecisionEngine::new(Arc::new(PolicyStore::from_rules([(
            "post".to_string(),
            rules,
        )])));

        let principal = Principal::new(owner.clone(), role);
        let decision = engine.decide(&principal, action, "post", Some(&post_by(&owner)));
        prop_assert!(decision.is_default_deny());
    }

    #[test]
    fn prop_matching_unconditional_deny_wins(
        rules in prop::collection::vec(rule(), 0..8),
        role in role(),
        action in action(),
        id in user_id(),
        position in 0usize..8,
    ) {
        let mut rules = rules;
        let position = position.min(rules.len());
        rules.insert(position, Rule::new(Effect::Deny, [action], [role]));
        let engine = DecisionEngine::new(Arc::new(PolicyStore::from_rules([(
            "post".to_string(),
            rules,
        )])));

        let principal = Principal::new(id.clone(), role);
        let decision = engine.decide(&principal, action, "post", Some(&post_by(&id)));
        prop_assert!(!decision.allowed);
        prop_assert_eq!(decision.matched.map(|r| r.effect), Some(Effect::Deny));
    }

    #[test]
    fn prop_reader_never_updates_or_deletes(
        id in user_id(),
        owner in user_id(),
        delete in prop::bool::ANY,
    ) {
        let engine = blog_engine();
        let action = if delete { Action::Delete } else { Action::Update };
        let reader = Principal::new(id, Role::Reader);

        prop_assert!(!engine.decide(&reader, action, "post", Some(&post_by(&owner))).allowed);
    }

    #[test]
    fn prop_author_updates_exactly_own_posts(id in user_id(), owner in user_id()) {
        let engine = blog_engine();
        let author = Principal::new(id.clone(), Role::Author);

        let decision = engine.decide(&author, Action::Update, "post", Some(&post_by(&owner)));
        prop_assert_eq!(decision.allowed, id == owner);
    }

    #[test]
    fn prop_delete_is_admin_only(role in role(), id in user_id(), owner in user_id()) {
        let engine = blog_engine();
        let principal = Principal::new(id, role);

        let decision = engine.decide(&principal, Action::Delete, "post", Some(&post_by(&owner)));
        prop_assert_eq!(decision.allowed, role == Role::Admin);
    }

    #[test]
    fn prop_create_ignores_attributes(role in role(), id in user_id(), owner in user_id()) {
        let engine = blog_engine();
        let principal = Principal::new(id, role);

        let without = engine.decide(&principal, Action::Create, "post", None);
        let with = engine.decide(&principal, Action::Create, "post", Some(&post_by(&owner)));
        prop_assert_eq!(&without, &with);
        prop_assert_eq!(without.allowed, role != Role::Reader);
    }

    #[test]
    fn prop_read_allowed_for_every_role(role in role(), id in user_id(), owner in user_id()) {
        let engine = blog_engine();
        let principal = Principal::new(id, role);
        prop_assert!(engine.decide(&principal, Action::Read, "post", Some(&post_by(&owner))).allowed);
    }

    #[test]
    fn prop_decisions_are_idempotent(
        rules in prop::collection::vec(rule(), 0..8),
        role in role(),
        action in action(),
        id in user_id(),
        owner in user_id(),
    ) {
        let engine = DecisionEngine::new(Arc::new(PolicyStore::from_rules([(
            "post".to_string(),
            rules,
        )])));
        let principal = Principal::new(id, role);
        let attrs = post_by(&owner);

        let first = engine.decide(&principal, action, "post", Some(&attrs));
        for _ in 0..5 {
            prop_assert_eq!(&engine.decide(&principal, action, "post", Some(&attrs)), &first);
        }
    }

    #[test]
    fn prop_unknown_resource_type_is_denied(
        rules in prop::collection::vec(rule(), 0..8),
        role in role(),
        action in action(),
        kind in "[a-z]{3,8}",
    ) {
        prop_assume!(kind != "post");
        let engine = DecisionEngine::new(Arc::new(PolicyStore::from_rules([(
            "post".to_string(),
            rules,
        )])));
        let principal = Principal::new("u1", role);
        prop_assert!(engine.decide(&principal, action, &kind, None).is_default_deny());
    }
}
