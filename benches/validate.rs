use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rulechain::{
    this, FieldDef, MethodDef, ParameterDef, Rule, RuleAction, RuleEngine, RuleSetBuilder,
    RuleValidation, Type, TypeCatalog, TypeId, Value,
};

fn catalog() -> (Arc<TypeCatalog>, TypeId) {
    let mut catalog = TypeCatalog::with_module("Bench");
    let id = catalog
        .class("Bench.Order")
        .field(FieldDef::new("Count", Type::INT32))
        .field(FieldDef::new("Total", Type::DECIMAL))
        .field(FieldDef::new("Ratio", Type::DOUBLE))
        .method(
            MethodDef::new("F", Type::INT32, |_, _| Ok(Value::Int32(0)))
                .param(ParameterDef::new("x", Type::INT32)),
        )
        .method(
            MethodDef::new("F", Type::INT64, |_, _| Ok(Value::Int64(0)))
                .param(ParameterDef::new("x", Type::INT64)),
        )
        .id();
    (Arc::new(catalog), id)
}

fn bench_validate(c: &mut Criterion) {
    let (catalog, id) = catalog();
    let mut group = c.benchmark_group("validate");

    // Mixed numeric promotion: int * double compared against decimal.
    let cond = this()
        .field("Count")
        .mul(this().field("Ratio"))
        .gt(this().field("Total").cast("double"))
        .and(this().call("F", vec![this().field("Count")]).eq(0_i32));
    group.bench_function("condition", |b| {
        b.iter(|| {
            let mut validation = RuleValidation::new(catalog.clone(), id);
            validation.validate_condition(black_box(&cond))
        });
    });

    for &n in &[5, 20, 50] {
        let mut builder = RuleSetBuilder::new("Bench");
        for i in 0..n {
            builder = builder.rule(
                Rule::new(&format!("r{i}"))
                    .when(this().field("Count").gt(i32::try_from(i).unwrap_or(0)))
                    .then(RuleAction::assign(
                        this().field("Total"),
                        this().field("Total").add(this().field("Count")),
                    )),
            );
        }
        let set = builder.build();
        group.bench_function(&format!("{n}_rule_engine_build"), |b| {
            b.iter(|| RuleEngine::new(black_box(&set), RuleValidation::new(catalog.clone(), id)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_validate);
criterion_main!(benches);
