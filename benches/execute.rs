use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rulechain::{
    this, FieldDef, Rule, RuleAction, RuleSet, RuleSetBuilder, Type, TypeCatalog, TypeId,
};

/// A class with fields `f0..f{n}` plus `Count`.
fn catalog(n: usize) -> (Arc<TypeCatalog>, TypeId) {
    let mut catalog = TypeCatalog::with_module("Bench");
    let mut builder = catalog.class("Bench.Subject").field(FieldDef::new("Count", Type::INT32));
    for i in 0..n {
        builder = builder.field(FieldDef::new(&format!("f{i}"), Type::INT32));
    }
    let id = builder.id();
    (Arc::new(catalog), id)
}

/// `n` independent rules, each copying `Count` into its own field.
fn flat_ruleset(n: usize) -> RuleSet {
    let mut builder = RuleSetBuilder::new("Flat");
    for i in 0..n {
        builder = builder.rule(
            Rule::new(&format!("r{i}"))
                .when(this().field("Count").gte(0_i32))
                .then(RuleAction::assign(this().field(&format!("f{i}")), this().field("Count"))),
        );
    }
    builder.build()
}

/// A chain where rule `i` writes the field rule `i + 1` reads, ordered so every
/// write rewinds to an earlier rule.
fn chained_ruleset(n: usize) -> RuleSet {
    let mut builder = RuleSetBuilder::new("Chain");
    for i in 0..n {
        let read = if i == 0 { "Count".to_owned() } else { format!("f{}", i - 1) };
        builder = builder.rule(
            Rule::new(&format!("r{i}"))
                .priority(i32::try_from(i).unwrap_or(i32::MAX))
                .when(this().field(&read).gt(0_i32))
                .then(RuleAction::assign(this().field(&format!("f{i}")), this().field(&read))),
        );
    }
    builder.build()
}

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute");

    for &n in &[5, 20, 50] {
        let (catalog, id) = catalog(n);

        let flat = flat_ruleset(n);
        let engine = flat.engine_for(&catalog, id).unwrap();
        group.bench_function(&format!("{n}_flat_rules"), |b| {
            b.iter(|| {
                let subject = catalog.instantiate(id);
                subject.set("Count", 3_i32);
                engine.execute(black_box(subject)).unwrap()
            });
        });

        let chain = chained_ruleset(n);
        let engine = chain.engine_for(&catalog, id).unwrap();
        group.bench_function(&format!("{n}_chained_rules"), |b| {
            b.iter(|| {
                let subject = catalog.instantiate(id);
                subject.set("Count", 3_i32);
                engine.execute(black_box(subject)).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_cached_lookup(c: &mut Criterion) {
    let (catalog, id) = catalog(20);
    let set = flat_ruleset(20);
    set.engine_for(&catalog, id).unwrap();

    c.bench_function("engine_cache_hit", |b| {
        b.iter(|| set.engine_for(black_box(&catalog), black_box(id)).unwrap());
    });
}

criterion_group!(benches, bench_execute, bench_cached_lookup);
criterion_main!(benches);
