mod strategies;

use bigdecimal::BigDecimal;
use proptest::prelude::*;
use rulechain::{
    adjust_type, decompile, implicit_conversion, this, Expr, RuleExecution, RuleValidation, Type,
    TypeCatalog, Value,
};
use strategies::{
    arb_arithmetic, arb_chained_ruleset, arb_count, arb_integral_value, arb_numeric_primitive,
    order_catalog,
};

/// Evaluate the decompiler's rendering of integer arithmetic.
struct Calc<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl Calc<'_> {
    fn eval(text: &str) -> i64 {
        let mut calc = Calc {
            chars: text.chars().peekable(),
        };
        let v = calc.sum();
        calc.skip_spaces();
        assert!(calc.chars.next().is_none(), "trailing input in {text:?}");
        v
    }

    fn skip_spaces(&mut self) {
        while self.chars.peek() == Some(&' ') {
            self.chars.next();
        }
    }

    fn sum(&mut self) -> i64 {
        let mut acc = self.product();
        loop {
            self.skip_spaces();
            match self.chars.peek() {
                Some('+') => {
                    self.chars.next();
                    acc += self.product();
                }
                Some('-') => {
                    self.chars.next();
                    acc -= self.product();
                }
                _ => return acc,
            }
        }
    }

    fn product(&mut self) -> i64 {
        let mut acc = self.unary();
        loop {
            self.skip_spaces();
            if self.chars.peek() == Some(&'*') {
                self.chars.next();
                acc *= self.unary();
            } else {
                return acc;
            }
        }
    }

    fn unary(&mut self) -> i64 {
        self.skip_spaces();
        match self.chars.peek() {
            Some('-') => {
                self.chars.next();
                -self.unary()
            }
            Some('(') => {
                self.chars.next();
                let v = self.sum();
                self.skip_spaces();
                assert_eq!(self.chars.next(), Some(')'));
                v
            }
            _ => {
                let mut n = 0_i64;
                while let Some(d) = self.chars.peek().and_then(|c| c.to_digit(10)) {
                    n = n * 10 + i64::from(d);
                    self.chars.next();
                }
                n
            }
        }
    }
}

fn evaluate(expr: &Expr) -> Value {
    let (catalog, order) = order_catalog();
    let mut validation = RuleValidation::new(catalog.clone(), order);
    assert!(validation.validate_expression(expr, false).is_some());
    RuleExecution::new(&validation, catalog.instantiate(order))
        .evaluate(expr)
        .unwrap()
}

fn arb_condition() -> impl Strategy<Value = Expr> {
    prop_oneof![
        (0_i32..20).prop_map(|n| this().field("Count").gt(n)),
        Just(this().field("Flag")),
        Just(this().field("Name").eq("x")),
        Just(this().field("Missing").eq(1_i32)),
        Just(this().field("Count").add(1_i32)),
        Just(this().prop("Status").neq(this().field("Name"))),
    ]
    .prop_recursive(2, 8, 2, |inner| {
        (inner.clone(), inner, any::<bool>()).prop_map(|(l, r, and)| if and { l.and(r) } else { l.or(r) })
    })
}

proptest! {
    /// The decompiled text, read back with ordinary precedence rules, has the
    /// value the tree evaluates to.
    #[test]
    fn decompiled_arithmetic_keeps_its_value(expr in arb_arithmetic()) {
        let text = decompile(&expr);
        let Value::Int32(expected) = evaluate(&expr) else {
            panic!("arithmetic over ints must produce an int");
        };
        prop_assert_eq!(Calc::eval(&text), i64::from(expected), "{}", text);
    }

    /// Integral widening keeps the numeric value.
    #[test]
    fn widening_preserves_value((primitive, value, n) in arb_integral_value()) {
        let catalog = TypeCatalog::new();
        let from = Type::Primitive(primitive);
        prop_assert_eq!(
            adjust_type(&catalog, &from, value.clone(), &Type::INT64).unwrap(),
            Value::Int64(n)
        );
        prop_assert_eq!(
            adjust_type(&catalog, &from, value.clone(), &Type::DECIMAL).unwrap(),
            Value::Decimal(BigDecimal::from(n))
        );
        #[allow(clippy::cast_precision_loss)]
        let as_double = n as f64;
        prop_assert_eq!(
            adjust_type(&catalog, &from, value, &Type::DOUBLE).unwrap(),
            Value::Double(as_double)
        );
    }

    /// No two distinct numeric types convert implicitly into each other.
    #[test]
    fn implicit_numeric_conversion_is_antisymmetric(
        a in arb_numeric_primitive(),
        b in arb_numeric_primitive(),
    ) {
        let catalog = TypeCatalog::new();
        let (ta, tb) = (Type::Primitive(a), Type::Primitive(b));
        prop_assert!(implicit_conversion(&catalog, &ta, &ta));
        if a != b {
            prop_assert!(!(implicit_conversion(&catalog, &ta, &tb) && implicit_conversion(&catalog, &tb, &ta)));
        }
    }

    /// Separate sessions agree on a condition, and a valid condition stays
    /// valid when checked again in the same session.
    #[test]
    fn revalidation_is_stable(cond in arb_condition()) {
        let (catalog, order) = order_catalog();
        let mut first = RuleValidation::new(catalog.clone(), order);
        let mut second = RuleValidation::new(catalog, order);
        let valid = first.validate_condition(&cond);
        prop_assert_eq!(valid, second.validate_condition(&cond));
        prop_assert_eq!(first.errors().len(), second.errors().len());

        if valid {
            let ty = first.expression_type(&cond).cloned();
            prop_assert!(first.validate_condition(&cond));
            prop_assert!(!first.errors().has_errors());
            prop_assert_eq!(ty, first.expression_type(&cond).cloned());
        }
    }

    /// Whatever other rules are present, the countdown always reaches zero and
    /// fires once per unit.
    #[test]
    fn countdown_always_terminates(
        set in arb_chained_ruleset(),
        start in arb_count(),
        flag in any::<bool>(),
    ) {
        let (catalog, order) = order_catalog();
        let subject = catalog.instantiate(order);
        subject.set("Count", start);
        subject.set("Flag", flag);

        let report = set.execute(&catalog, &subject, None).unwrap();
        prop_assert_eq!(subject.get("Count"), Some(Value::Int32(0)));
        prop_assert_eq!(report.execution_count("Decrement"), Some(u64::try_from(start).unwrap()));
        for rule in set.rules().iter().filter(|r| r.name().starts_with("Mark")) {
            prop_assert_eq!(report.execution_count(rule.name()), Some(u64::from(flag)));
        }
        prop_assert!(!report.halted());
    }
}
