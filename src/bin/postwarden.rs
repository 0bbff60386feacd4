//! Postwarden CLI
//!
//! Inspect policies and evaluate authorization decisions offline

use anyhow::Context;
use clap::{Parser, Subcommand};
use postwarden::{
    AttrValue, Attributes, DecisionEngine, NewPost, PolicyHandle, PolicyStore, PostService,
    PostUpdate, Principal, RequestMediator, Role, ServiceConfig,
};
use postwarden::{InMemoryRepository, TokenRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "postwarden")]
#[command(about = "Evaluate blog content access policies")]
struct Args {
    /// Service configuration file (TOML); defaults to POSTWARDEN_* env vars
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Policy file, overriding the configured one
    #[arg(short = 'p', long, global = true)]
    policy: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a policy and print a summary of its rules
    Validate,

    /// Evaluate a single decision
    Check {
        /// Principal id
        #[arg(long)]
        principal: String,

        /// Principal role (admin, author, reader)
        #[arg(long)]
        role: Role,

        /// Action (read, create, update, delete)
        #[arg(long)]
        action: String,

        /// Resource type
        #[arg(long, default_value = "post")]
        kind: String,

        /// Resource attribute as key=value; omit all for a not-yet-existing resource
        #[arg(long = "attr", value_parser = parse_attr)]
        attrs: Vec<(String, AttrValue)>,
    },

    /// Run the reference scenario end-to-end through the mediator
    Demo,
}

/// Parse `key=value`, typing the value as integer, bool or string
fn parse_attr(s: &str) -> Result<(String, AttrValue), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;

    let value = if let Ok(n) = value.parse::<i64>() {
        AttrValue::Integer(n)
    } else if let Ok(b) = value.parse::<bool>() {
        AttrValue::Bool(b)
    } else {
        AttrValue::String(value.to_string())
    };
    Ok((key.trim().to_string(), value))
}

fn load_config(args: &Args) -> anyhow::Result<ServiceConfig> {
    let mut config = match &args.config {
        Some(path) => ServiceConfig::from_path(path)?,
        None => ServiceConfig::from_env()?,
    };
    if let Some(policy) = &args.policy {
        config.policy_path = policy.clone();
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    info!("Policy path: {:?}", config.policy_path);

    match args.command {
        Command::Validate => validate(&config),
        Command::Check {
            principal,
            role,
            action,
            kind,
            attrs,
        } => check(&config, Principal::new(principal, role), &action, &kind, attrs),
        Command::Demo => demo(&config),
    }
}

fn load_store(config: &ServiceConfig) -> anyhow::Result<PolicyStore> {
    PolicyStore::from_path(&config.policy_path)
        .with_context(|| format!("loading policy {}", config.policy_path.display()))
}

fn validate(config: &ServiceConfig) -> anyhow::Result<()> {
    let store = load_store(config)?;

    println!(
        "policy {} ({}): {} rule(s)",
        config.policy_path.display(),
        store.version().unwrap_or("unversioned"),
        store.rule_count()
    );

    let mut types: Vec<_> = store.resource_types().collect();
    types.sort_unstable();
    for kind in types {
        println!("  {}", kind);
        for (index, rule) in store.rules_for(kind).iter().enumerate() {
            let actions: Vec<_> = rule.actions.iter().map(|a| a.as_str()).collect();
            let roles: Vec<_> = rule.roles.iter().map(|r| r.as_str()).collect();
            print!(
                "    [{}] {} {} for {}",
                index,
                rule.effect,
                actions.join(","),
                roles.join(",")
            );
            if let Some(id) = &rule.id {
                print!(" '{}'", id);
            }
            if let Some(condition) = &rule.condition {
                print!(" when {}", condition);
            }
            println!();
        }
    }
    Ok(())
}

fn check(
    config: &ServiceConfig,
    principal: Principal,
    action: &str,
    kind: &str,
    attrs: Vec<(String, AttrValue)>,
) -> anyhow::Result<()> {
    let engine = DecisionEngine::new(Arc::new(load_store(config)?));

    let attributes: Option<Attributes> = if attrs.is_empty() {
        None
    } else {
        Some(attrs.into_iter().collect())
    };

    let decision = engine.decide_token(&principal, action, kind, attributes.as_ref());
    println!("{}", decision);

    if !decision.allowed {
        std::process::exit(1);
    }
    Ok(())
}

fn demo(config: &ServiceConfig) -> anyhow::Result<()> {
    let service = PostService::new(RequestMediator::new(
        InMemoryRepository::new(),
        TokenRegistry::new(config.token_ttl_minutes),
        Arc::new(PolicyHandle::new(load_store(config)?)),
    ));
    let tokens = service.mediator().resolver();

    let admin = tokens.issue(Principal::new("u0", Role::Admin));
    let u1 = tokens.issue(Principal::new("u1", Role::Author));
    let u2 = tokens.issue(Principal::new("u2", Role::Author));
    let reader = tokens.issue(Principal::new("u3", Role::Reader));

    let p1 = service.create(&u1, NewPost::new("p1", "written by u1"))?;
    let p2 = service.create(&u2, NewPost::new("p2", "written by u2"))?;
    println!("created posts {} (u1) and {} (u2)", p1.id, p2.id);

    let outcome = |result: postwarden::Result<()>| match result {
        Ok(()) => "ALLOW".to_string(),
        Err(e) => format!("DENY ({})", e),
    };

    let edit = PostUpdate::default().content("edited");
    println!(
        "u1 update p1: {}",
        outcome(service.update(&u1, &p1.id, edit.clone()).map(|_| ()))
    );
    println!(
        "u1 update p2: {}",
        outcome(service.update(&u1, &p2.id, edit).map(|_| ()))
    );
    println!(
        "reader create: {}",
        outcome(service.create(&reader, NewPost::new("x", "y")).map(|_| ()))
    );
    println!("reader list: {} post(s)", service.list(&reader)?.len());
    println!("u1 delete p2: {}", outcome(service.delete(&u1, &p2.id)));
    println!("admin delete p2: {}", outcome(service.delete(&admin, &p2.id)));

    let audit = service.mediator().audit();
    println!(
        "{} decision(s) audited, {} denial(s)",
        audit.total_recorded(),
        audit.denials().len()
    );
    Ok(())
}
