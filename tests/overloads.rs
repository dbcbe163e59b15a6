mod strategies;

use bigdecimal::BigDecimal;
use rulechain::{
    lit, this, Binding, ErrorCode, RuleExecution, RuleValidation, Statement, Type, Value,
};
use strategies::order_catalog;

fn resolved_parameter(validation: &RuleValidation, call: &rulechain::Expr) -> Option<Type> {
    match validation.expression_info(call)?.binding() {
        Binding::Method { method, .. } => method.params().first().map(|p| p.ty.clone()),
        _ => None,
    }
}

#[test]
fn int_argument_binds_int_overload() {
    let (catalog, order) = order_catalog();
    let mut validation = RuleValidation::new(catalog.clone(), order);
    let call = this().call("F", vec![lit(1_i32)]);
    assert!(validation.validate_expression(&call, false).is_some());
    assert_eq!(resolved_parameter(&validation, &call), Some(Type::INT32));

    let execution = RuleExecution::new(&validation, catalog.instantiate(order));
    assert_eq!(execution.evaluate(&call).unwrap(), Value::String("int".into()));
}

#[test]
fn long_argument_binds_long_overload() {
    let (catalog, order) = order_catalog();
    let mut validation = RuleValidation::new(catalog.clone(), order);
    let call = this().call("F", vec![lit(1_i64)]);
    assert!(validation.validate_expression(&call, false).is_some());
    assert_eq!(resolved_parameter(&validation, &call), Some(Type::INT64));

    let execution = RuleExecution::new(&validation, catalog.instantiate(order));
    assert_eq!(execution.evaluate(&call).unwrap(), Value::String("long".into()));
}

#[test]
fn short_argument_prefers_the_closer_widening() {
    let (catalog, order) = order_catalog();
    let mut validation = RuleValidation::new(catalog, order);
    let call = this().call("F", vec![lit(1_i16)]);
    assert!(validation.validate_expression(&call, false).is_some());
    assert_eq!(resolved_parameter(&validation, &call), Some(Type::INT32));
}

#[test]
fn no_applicable_overload() {
    let (catalog, order) = order_catalog();
    let mut validation = RuleValidation::new(catalog, order);
    let call = this().call("F", vec![lit("text")]);
    assert!(validation.validate_expression(&call, false).is_none());
    assert_eq!(
        validation.errors().as_slice()[0].code(),
        ErrorCode::MethodOverloadNotFound
    );
}

#[test]
fn missing_method() {
    let (catalog, order) = order_catalog();
    let mut validation = RuleValidation::new(catalog, order);
    let call = this().call("Missing", vec![]);
    assert!(validation.validate_expression(&call, false).is_none());
    assert_eq!(validation.errors().as_slice()[0].code(), ErrorCode::MethodNotExists);
}

#[test]
fn implicit_widening_on_assignment() {
    let (catalog, order) = order_catalog();
    let mut validation = RuleValidation::new(catalog.clone(), order);
    let widen = Statement::assign(this().field("Total"), this().field("Count"));
    assert!(validation.validate_statement(&widen));

    let subject = catalog.instantiate(order);
    subject.set("Count", 12_i32);
    let mut execution = RuleExecution::new(&validation, subject.clone());
    execution.execute_statement(&widen).unwrap();
    assert_eq!(subject.get("Total"), Some(Value::Decimal(BigDecimal::from(12))));
}

#[test]
fn narrowing_assignment_is_rejected() {
    let (catalog, order) = order_catalog();
    let mut validation = RuleValidation::new(catalog, order);
    let narrow = Statement::assign(this().field("Count"), this().field("Total"));
    assert!(!validation.validate_statement(&narrow));
    assert!(validation.errors().has_errors());

    let cast = Statement::assign(this().field("Count"), this().field("Total").cast("int"));
    assert!(validation.validate_statement(&cast));
}
