mod strategies;

use rulechain::{
    this, Branch, ChainingBehavior, EngineOptions, ReevaluationBehavior, Rule, RuleAction,
    RuleEngine, RuleError, RuleSetBuilder, RuleValidation, Value,
};
use strategies::{decrement, order_catalog};

#[test]
fn decrement_until_zero_then_halt() {
    let (catalog, order) = order_catalog();
    let subject = catalog.instantiate(order);
    subject.set("Count", 2_i32);

    let set = RuleSetBuilder::new("Countdown")
        .rule(decrement("R1", 10))
        .rule(
            Rule::new("R2")
                .priority(5)
                .when(this().field("Count").eq(0_i32))
                .then(RuleAction::halt())
                .then(RuleAction::assign(this().field("Name"), "unreachable")),
        )
        .build();

    let report = set.execute(&catalog, &subject, None).unwrap();
    assert_eq!(report.condition_results("R1"), [true, true, false]);
    assert_eq!(report.condition_results("R2"), [true]);
    assert_eq!(report.execution_count("R1"), Some(2));
    assert_eq!(report.execution_count("R2"), Some(1));
    assert!(report.halted());
    assert_eq!(subject.get("Count"), Some(Value::Int32(0)));
    assert_eq!(subject.get("Name"), Some(Value::Null));
}

#[test]
fn halt_leaves_pending_rules_unevaluated() {
    let (catalog, order) = order_catalog();
    let subject = catalog.instantiate(order);
    subject.set("Count", 1_i32);

    let set = RuleSetBuilder::new("Stopper")
        .rule(decrement("Tick", 30))
        .rule(
            // rewrites Count, which Tick reads, then halts before Tick can rerun
            Rule::new("Stop")
                .priority(20)
                .when(this().field("Count").eq(0_i32))
                .then(RuleAction::assign(this().field("Count"), 5_i32))
                .then(RuleAction::halt()),
        )
        .rule(
            Rule::new("Later")
                .priority(10)
                .when(this().field("Flag"))
                .then(RuleAction::assign(this().field("Name"), "later")),
        )
        .rule(
            Rule::new("Audit")
                .priority(5)
                .when(this().field("Count").lt(100_i32))
                .then(RuleAction::assign(this().field("Name"), "audit")),
        )
        .build();

    let engine = set.engine_for(&catalog, order).unwrap();
    assert_eq!(
        engine.triggered_by("Stop", Branch::Then).unwrap(),
        ["Tick", "Stop", "Audit"]
    );

    let report = engine.execute(subject.clone()).unwrap();
    assert!(report.halted());
    assert_eq!(report.evaluation_order(), ["Tick", "Tick", "Stop"]);
    assert!(report.condition_results("Later").is_empty());
    assert!(report.condition_results("Audit").is_empty());
    assert_eq!(report.execution_count("Later"), Some(0));
    assert_eq!(subject.get("Count"), Some(Value::Int32(5)));
    assert_eq!(subject.get("Name"), Some(Value::Null));
}

#[test]
fn method_write_effects_trigger_readers() {
    let (catalog, order) = order_catalog();
    let subject = catalog.instantiate(order);

    let set = RuleSetBuilder::new("Stock")
        .rule(
            Rule::new("Label")
                .priority(10)
                .when(this().field("Count").gt(0_i32))
                .then(RuleAction::assign(this().field("Name"), "stocked")),
        )
        .rule(
            Rule::new("Restock")
                .priority(1)
                .when(this().field("Count").eq(0_i32))
                .then(RuleAction::invoke(this().call("Restock", vec![]))),
        )
        .build();

    let engine = set.engine_for(&catalog, order).unwrap();
    assert_eq!(
        engine.triggered_by("Restock", Branch::Then),
        Some(vec!["Label", "Restock"])
    );

    let report = engine.execute(subject.clone()).unwrap();
    assert_eq!(report.evaluation_order(), ["Label", "Restock", "Label", "Restock"]);
    assert_eq!(report.condition_results("Label"), [false, true]);
    assert_eq!(subject.get("Count"), Some(Value::Int32(5)));
    assert_eq!(subject.get("Name"), Some(Value::String("stocked".into())));
}

#[test]
fn explicit_update_triggers_under_update_only() {
    let (catalog, order) = order_catalog();
    let subject = catalog.instantiate(order);
    subject.set("Flag", true);

    let set = RuleSetBuilder::new("Updates")
        .chaining(ChainingBehavior::UpdateOnly)
        .rule(
            Rule::new("Reader")
                .priority(10)
                .when(this().field("Name").eq("set"))
                .then(RuleAction::assign(this().field("Count"), 7_i32)),
        )
        .rule(
            Rule::new("Writer")
                .priority(1)
                .when(this().field("Flag"))
                .then(RuleAction::assign(this().field("Name"), "set"))
                .then(RuleAction::update("this.Name")),
        )
        .build();

    let report = set.execute(&catalog, &subject, None).unwrap();
    assert_eq!(report.evaluation_order(), ["Reader", "Writer", "Reader"]);
    assert_eq!(subject.get("Count"), Some(Value::Int32(7)));
}

#[test]
fn statement_writes_ignored_without_update_under_update_only() {
    let (catalog, order) = order_catalog();
    let subject = catalog.instantiate(order);
    subject.set("Flag", true);

    let set = RuleSetBuilder::new("Updates")
        .chaining(ChainingBehavior::UpdateOnly)
        .rule(
            Rule::new("Reader")
                .priority(10)
                .when(this().field("Name").eq("set"))
                .then(RuleAction::assign(this().field("Count"), 7_i32)),
        )
        .rule(
            Rule::new("Writer")
                .priority(1)
                .when(this().field("Flag"))
                .then(RuleAction::assign(this().field("Name"), "set")),
        )
        .build();

    let report = set.execute(&catalog, &subject, None).unwrap();
    assert_eq!(report.evaluation_order(), ["Reader", "Writer"]);
    assert_eq!(subject.get("Count"), Some(Value::Int32(0)));
}

#[test]
fn never_rules_fire_once() {
    let (catalog, order) = order_catalog();
    let subject = catalog.instantiate(order);
    subject.set("Count", 10_i32);

    let set = RuleSetBuilder::new("Once")
        .rule(decrement("R1", 0).reevaluation(ReevaluationBehavior::Never))
        .build();
    let report = set.execute(&catalog, &subject, None).unwrap();
    assert_eq!(report.execution_count("R1"), Some(1));
    assert_eq!(subject.get("Count"), Some(Value::Int32(9)));
}

#[test]
fn else_branch_actions_run_and_chain() {
    let (catalog, order) = order_catalog();
    let subject = catalog.instantiate(order);

    let set = RuleSetBuilder::new("Else")
        .rule(
            Rule::new("Check")
                .priority(10)
                .when(this().field("Flag"))
                .then(RuleAction::assign(this().field("Name"), "on"))
                .otherwise(RuleAction::assign(this().field("Name"), "off")),
        )
        .rule(
            Rule::new("Follow")
                .priority(1)
                .when(this().field("Name").eq("off"))
                .then(RuleAction::assign(this().field("Count"), 1_i32)),
        )
        .build();

    let report = set.execute(&catalog, &subject, None).unwrap();
    assert_eq!(report.condition_results("Check"), [false]);
    assert_eq!(report.execution_count("Check"), Some(1));
    assert_eq!(subject.get("Name"), Some(Value::String("off".into())));
    assert_eq!(subject.get("Count"), Some(Value::Int32(1)));
}

#[test]
fn runaway_chaining_hits_the_ceiling() {
    let (catalog, order) = order_catalog();
    let subject = catalog.instantiate(order);

    let set = RuleSetBuilder::new("Runaway")
        .options(EngineOptions::new().max_reevaluations(25))
        .rule(
            Rule::new("Grow")
                .when(this().field("Count").lt(1_000_i32))
                .then(RuleAction::assign(
                    this().field("Count"),
                    this().field("Count").add(1_i32),
                )),
        )
        .build();

    match set.execute(&catalog, &subject, None) {
        Err(RuleError::ReevaluationLimit { rule_set, limit }) => {
            assert_eq!(rule_set, "Runaway");
            assert_eq!(limit, 25);
        }
        other => panic!("expected ReevaluationLimit, got {other:?}"),
    }
    assert_eq!(subject.get("Count"), Some(Value::Int32(26)));
}

#[test]
fn evaluation_failure_is_reported() {
    let (catalog, order) = order_catalog();
    let subject = catalog.instantiate(order);

    let set = RuleSetBuilder::new("Divide")
        .rule(
            Rule::new("Ratio")
                .when(this().field("Flag").eq(false))
                .then(RuleAction::assign(
                    this().field("Count"),
                    this().field("Count").div(this().field("Count")),
                )),
        )
        .build();

    assert!(matches!(
        set.execute(&catalog, &subject, None),
        Err(RuleError::Evaluation(_))
    ));
}

#[test]
fn engine_from_explicit_validation() {
    let (catalog, order) = order_catalog();
    let set = RuleSetBuilder::new("Direct")
        .rule(decrement("R1", 0))
        .build();
    let engine = RuleEngine::new(&set, RuleValidation::new(catalog.clone(), order)).unwrap();
    assert_eq!(engine.rule_order(), ["R1"]);
    assert_eq!(engine.state("R1").map(|s| s.dependencies().to_vec()), Some(vec!["this/Count/".to_owned()]));

    let subject = catalog.instantiate(order);
    subject.set("Count", 3_i32);
    let report = engine.execute(subject.clone()).unwrap();
    assert_eq!(report.execution_count("R1"), Some(3));
    assert!(!report.halted());
}

#[test]
fn null_subject_is_rejected() {
    let (catalog, order) = order_catalog();
    let set = RuleSetBuilder::new("Null").rule(decrement("R1", 0)).build();
    let engine = set.engine_for(&catalog, order).unwrap();
    assert!(matches!(
        engine.execute(Value::Null),
        Err(RuleError::InvalidArgument(_))
    ));
}
