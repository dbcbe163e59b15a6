#![allow(dead_code)]

use std::sync::Arc;

use proptest::prelude::*;
use rulechain::{
    lit, this, Expr, FieldDef, MethodDef, ParameterDef, Primitive, PropertyDef, Rule, RuleAction,
    RuleSet, RuleSetBuilder, Type, TypeCatalog, TypeId, Value,
};

// --- Fixed subject schema ---
// Shop.Order.Count    : int
// Shop.Order.Total    : decimal
// Shop.Order.Flag     : bool
// Shop.Order.Name     : string
// Shop.Order.Status   : string (auto property)
// Shop.Order.Restock(): writes Count
// Shop.Order.F(int) / F(long) : returns "int" / "long"

/// The shared `Shop.Order` catalog.
pub fn order_catalog() -> (Arc<TypeCatalog>, TypeId) {
    let mut catalog = TypeCatalog::with_module("Shop");
    let order = catalog
        .class("Shop.Order")
        .field(FieldDef::new("Count", Type::INT32))
        .field(FieldDef::new("Total", Type::DECIMAL))
        .field(FieldDef::new("Flag", Type::BOOL))
        .field(FieldDef::new("Name", Type::STRING))
        .property(PropertyDef::auto("Status", Type::STRING))
        .method(
            MethodDef::new("Restock", Type::VOID, |target, _| {
                if let Some(order) = target.as_object() {
                    order.set("Count", 5_i32);
                }
                Ok(Value::Null)
            })
            .writes("Count"),
        )
        .method(
            MethodDef::new("F", Type::STRING, |_, _| Ok(Value::String("int".into())))
                .param(ParameterDef::new("x", Type::INT32)),
        )
        .method(
            MethodDef::new("F", Type::STRING, |_, _| Ok(Value::String("long".into())))
                .param(ParameterDef::new("x", Type::INT64)),
        )
        .id();
    (Arc::new(catalog), order)
}

/// `this.Count > 0 ? this.Count = this.Count - 1`, the usual chaining workhorse.
pub fn decrement(name: &str, priority: i32) -> Rule {
    Rule::new(name)
        .priority(priority)
        .when(this().field("Count").gt(0_i32))
        .then(RuleAction::assign(
            this().field("Count"),
            this().field("Count").sub(1_i32),
        ))
}

/// A starting count for the order.
pub fn arb_count() -> impl Strategy<Value = i32> {
    0_i32..40
}

/// A rule set of one decrementing rule plus `extra` unrelated rules that read
/// `Flag` and write `Name`.
pub fn arb_chained_ruleset() -> impl Strategy<Value = RuleSet> {
    (0_usize..4, any::<bool>()).prop_map(|(extra, flag_rule_first)| {
        let mut builder = RuleSetBuilder::new("Generated").rule(decrement("Decrement", 0));
        for i in 0..extra {
            let priority = if flag_rule_first { 10 } else { -10 };
            builder = builder.rule(
                Rule::new(&format!("Mark{i}"))
                    .priority(priority)
                    .when(this().field("Flag"))
                    .then(RuleAction::assign(this().field("Name"), format!("mark{i}").as_str())),
            );
        }
        builder.build()
    })
}

/// An integral primitive together with a value of that type.
pub fn arb_integral_value() -> impl Strategy<Value = (Primitive, Value, i64)> {
    prop_oneof![
        any::<i8>().prop_map(|v| (Primitive::SByte, Value::SByte(v), i64::from(v))),
        any::<u8>().prop_map(|v| (Primitive::Byte, Value::Byte(v), i64::from(v))),
        any::<i16>().prop_map(|v| (Primitive::Int16, Value::Int16(v), i64::from(v))),
        any::<u16>().prop_map(|v| (Primitive::UInt16, Value::UInt16(v), i64::from(v))),
        any::<i32>().prop_map(|v| (Primitive::Int32, Value::Int32(v), i64::from(v))),
        any::<u32>().prop_map(|v| (Primitive::UInt32, Value::UInt32(v), i64::from(v))),
    ]
}

/// Any primitive from the numeric conversion tables.
pub fn arb_numeric_primitive() -> impl Strategy<Value = Primitive> {
    prop::sample::select(&Primitive::NUMERIC[..])
}

/// Arithmetic over small `int` literals using `+`, `-` and `*`, up to three
/// levels deep so every intermediate result fits in an `int`.
pub fn arb_arithmetic() -> impl Strategy<Value = Expr> {
    let leaf = (0_i32..10).prop_map(lit);
    leaf.prop_recursive(3, 16, 2, |inner| {
        (inner.clone(), prop::sample::select(&[0_u8, 1, 2][..]), inner).prop_map(|(l, op, r)| {
            match op {
                0 => l.add(r),
                1 => l.sub(r),
                _ => l.mul(r),
            }
        })
    })
}
