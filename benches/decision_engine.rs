use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use postwarden::{
    Action, Attributes, Condition, DecisionEngine, Effect, InMemoryRepository, NewPost,
    PolicyHandle, PolicyStore, PostService, Principal, RequestMediator, Role, Rule,
    TokenRegistry,
};
use std::sync::Arc;

const BLOG_TOML: &str = include_str!("../policies/blog.toml");

fn blog_engine() -> DecisionEngine {
    DecisionEngine::new(Arc::new(PolicyStore::from_toml_str(BLOG_TOML).unwrap()))
}

/// Store with `count` non-matching rules ahead of the one that matches
fn padded_engine(count: usize) -> DecisionEngine {
    let mut rules: Vec<Rule> = (0..count)
        .map(|i| {
            Rule::new(Effect::Allow, [Action::Update], [Role::Author])
                .with_id(format!("filler-{}", i))
                .with_condition(Condition::owner())
        })
        .collect();
    rules.push(Rule::new(Effect::Allow, Action::ALL, [Role::Admin]));
    DecisionEngine::new(Arc::new(PolicyStore::from_rules([(
        "post".to_string(),
        rules,
    )])))
}

/// Single decisions against the blog policy
fn bench_decide(c: &mut Criterion) {
    let mut group = c.benchmark_group("decide");
    let engine = blog_engine();
    let author = Principal::new("u1", Role::Author);
    let own = Attributes::new().with("author_id", "u1");
    let other = Attributes::new().with("author_id", "u2");

    group.bench_function("read_unconditional", |b| {
        b.iter(|| black_box(engine.decide(&author, Action::Read, "post", Some(&own))))
    });

    group.bench_function("update_own", |b| {
        b.iter(|| black_box(engine.decide(&author, Action::Update, "post", Some(&own))))
    });

    group.bench_function("update_other_default_deny", |b| {
        b.iter(|| black_box(engine.decide(&author, Action::Update, "post", Some(&other))))
    });

    group.bench_function("unknown_resource_type", |b| {
        b.iter(|| black_box(engine.decide(&author, Action::Read, "comment", None)))
    });

    group.finish();
}

/// Linear scan cost as rule lists grow
fn bench_rule_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_count");
    let admin = Principal::new("root", Role::Admin);
    let attrs = Attributes::new().with("author_id", "u9");

    for count in [1, 10, 100, 1_000] {
        let engine = padded_engine(count);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(engine.decide(&admin, Action::Delete, "post", Some(&attrs))))
        });
    }

    group.finish();
}

/// Collection reads filter every item through the engine
fn bench_filtered_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("filtered_list");

    for posts in [10, 100, 1_000] {
        let service = PostService::new(RequestMediator::new(
            InMemoryRepository::new(),
            TokenRegistry::default(),
            Arc::new(PolicyHandle::new(
                PolicyStore::from_toml_str(BLOG_TOML).unwrap(),
            )),
        ));
        let tokens = service.mediator().resolver();
        let authors: Vec<_> = (0..8)
            .map(|i| tokens.issue(Principal::new(format!("u{}", i), Role::Author)))
            .collect();
        for i in 0..posts {
            let author = &authors[rand::random::<usize>() % authors.len()];
            service
                .create(author, NewPost::new(format!("post {}", i), "body"))
                .unwrap();
        }
        let reader = tokens.issue(Principal::new("r1", Role::Reader));

        group.throughput(Throughput::Elements(posts as u64));
        group.bench_with_input(BenchmarkId::from_parameter(posts), &posts, |b, _| {
            b.iter(|| black_box(service.list(&reader).unwrap()))
        });
    }

    group.finish();
}

/// Policy parsing and compilation
fn bench_policy_load(c: &mut Criterion) {
    c.bench_function("load_blog_toml", |b| {
        b.iter(|| black_box(PolicyStore::from_toml_str(black_box(BLOG_TOML)).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_decide,
    bench_rule_count,
    bench_filtered_list,
    bench_policy_load
);
criterion_main!(benches);
