//! Runtime semantics of binary operators.

use std::cmp::Ordering;

use bigdecimal::{BigDecimal, Zero};

use super::adjust::adjust_type;
use super::RuleExecution;
use crate::types::value::integer_value;
use crate::types::{BinaryOp, EvaluationError, Expr, MethodDef, Primitive, Type, TypeCatalog, Value};
use crate::validation::{Binding, OperatorBinding};

fn overflow(expr: &Expr) -> EvaluationError {
    EvaluationError::Overflow {
        operation: expr.to_string(),
    }
}

fn incompatible(op: BinaryOp, left: &Value, right: &Value) -> EvaluationError {
    let describe = |v: &Value| match v {
        Value::Null => "null".to_owned(),
        other => format!("{:?}", other.runtime_type()),
    };
    EvaluationError::IncompatibleOperands {
        op: op.symbol().to_owned(),
        left: describe(left),
        right: describe(right),
    }
}

/// Ordering of two non-null primitive values in the widest shared domain:
/// decimal, then floating point, then integral (including `char` and enums),
/// then ordinal string order.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    let is_decimal = |v: &Value| matches!(v, Value::Decimal(_));
    let is_float = |v: &Value| matches!(v, Value::Single(_) | Value::Double(_));

    if is_decimal(left) || is_decimal(right) {
        if is_float(left) || is_float(right) {
            return left.as_f64()?.partial_cmp(&right.as_f64()?);
        }
        return left.as_decimal()?.partial_cmp(&right.as_decimal()?);
    }
    if is_float(left) || is_float(right) {
        return left.as_f64()?.partial_cmp(&right.as_f64()?);
    }
    if let (Some(l), Some(r)) = (left.as_integer(), right.as_integer()) {
        return Some(l.cmp(&r));
    }
    match (left, right) {
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

/// `==` as used by rules: both null, same object, or equal primitive values.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Object(l), Value::Object(r)) => l.ptr_eq(r),
        (Value::Array(l), Value::Array(r)) => l.ptr_eq(r),
        _ => compare(left, right).map_or_else(|| left == right, Ordering::is_eq),
    }
}

fn relational(op: BinaryOp, ordering: Option<Ordering>) -> bool {
    match (op, ordering) {
        (BinaryOp::LessThan, Some(o)) => o.is_lt(),
        (BinaryOp::LessThanOrEqual, Some(o)) => o.is_le(),
        (BinaryOp::GreaterThan, Some(o)) => o.is_gt(),
        (BinaryOp::GreaterThanOrEqual, Some(o)) => o.is_ge(),
        _ => false,
    }
}

fn comparison(op: BinaryOp, left: &Value, right: &Value) -> Value {
    Value::Bool(match op {
        BinaryOp::ValueEquality | BinaryOp::IdentityEquality => values_equal(left, right),
        BinaryOp::IdentityInequality => !values_equal(left, right),
        _ if left.is_null() || right.is_null() => false,
        _ => relational(op, compare(left, right)),
    })
}

/// Text of a value as it appears in string concatenation.
fn concat_text(catalog: &TypeCatalog, value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_owned(),
        Value::Bool(false) => "False".to_owned(),
        Value::Char(c) => c.to_string(),
        Value::String(s) => s.clone(),
        Value::Object(o) => catalog.type_name(&Type::Named(o.type_id())),
        Value::Array(_) => catalog.type_name(&value.runtime_type()),
        other => other.to_string(),
    }
}

/// Three-valued `&` and `|` over `bool?`.
fn boolean_logic(op: BinaryOp, left: Option<bool>, right: Option<bool>) -> Value {
    let result = match op {
        BinaryOp::BitwiseAnd => match (left, right) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        _ => match (left, right) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
    };
    result.map_or(Value::Null, Value::Bool)
}

fn integral_arithmetic(op: BinaryOp, l: i128, r: i128, expr: &Expr) -> Result<i128, EvaluationError> {
    match op {
        BinaryOp::Add => l.checked_add(r),
        BinaryOp::Subtract => l.checked_sub(r),
        BinaryOp::Multiply => l.checked_mul(r),
        BinaryOp::Divide | BinaryOp::Modulus if r == 0 => return Err(EvaluationError::DivideByZero),
        BinaryOp::Divide => l.checked_div(r),
        BinaryOp::Modulus => l.checked_rem(r),
        BinaryOp::BitwiseAnd => Some(l & r),
        BinaryOp::BitwiseOr => Some(l | r),
        _ => None,
    }
    .ok_or_else(|| overflow(expr))
}

fn float_arithmetic(op: BinaryOp, l: f64, r: f64) -> Option<f64> {
    Some(match op {
        BinaryOp::Add => l + r,
        BinaryOp::Subtract => l - r,
        BinaryOp::Multiply => l * r,
        BinaryOp::Divide => l / r,
        BinaryOp::Modulus => l % r,
        _ => return None,
    })
}

fn decimal_arithmetic(op: BinaryOp, l: BigDecimal, r: BigDecimal) -> Result<BigDecimal, EvaluationError> {
    Ok(match op {
        BinaryOp::Add => l + r,
        BinaryOp::Subtract => l - r,
        BinaryOp::Multiply => l * r,
        BinaryOp::Divide | BinaryOp::Modulus if r.is_zero() => return Err(EvaluationError::DivideByZero),
        BinaryOp::Divide => l / r,
        BinaryOp::Modulus => l % r,
        _ => {
            return Err(EvaluationError::IncompatibleOperands {
                op: op.symbol().to_owned(),
                left: "decimal".to_owned(),
                right: "decimal".to_owned(),
            })
        }
    })
}

/// A predefined operator producing `result` (possibly nullable).
pub(crate) fn builtin(
    catalog: &TypeCatalog,
    expr: &Expr,
    op: BinaryOp,
    left: &Value,
    right: &Value,
    result: &Type,
) -> Result<Value, EvaluationError> {
    if !op.is_arithmetic() && !matches!(op, BinaryOp::BitwiseAnd | BinaryOp::BitwiseOr) {
        return Ok(comparison(op, left, right));
    }

    let Some(primitive) = result.underlying().primitive() else {
        return Err(incompatible(op, left, right));
    };
    match primitive {
        Primitive::String => Ok(Value::String(format!(
            "{}{}",
            concat_text(catalog, left),
            concat_text(catalog, right)
        ))),
        Primitive::Bool => Ok(boolean_logic(op, left.as_bool(), right.as_bool())),
        _ if left.is_null() || right.is_null() => Ok(Value::Null),
        p if p.is_integral() => {
            let (Some(l), Some(r)) = (left.as_integer(), right.as_integer()) else {
                return Err(incompatible(op, left, right));
            };
            let n = integral_arithmetic(op, l, r, expr)?;
            integer_value(n, p).ok_or_else(|| overflow(expr))
        }
        Primitive::Single | Primitive::Double => {
            let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) else {
                return Err(incompatible(op, left, right));
            };
            let x = float_arithmetic(op, l, r).ok_or_else(|| incompatible(op, left, right))?;
            #[allow(clippy::cast_possible_truncation)]
            let value = if primitive == Primitive::Single {
                Value::Single(x as f32)
            } else {
                Value::Double(x)
            };
            Ok(value)
        }
        Primitive::Decimal => {
            let (Some(l), Some(r)) = (left.as_decimal(), right.as_decimal()) else {
                return Err(incompatible(op, left, right));
            };
            decimal_arithmetic(op, l, r).map(Value::Decimal)
        }
        _ => Err(incompatible(op, left, right)),
    }
}

/// Enum arithmetic and comparison over the underlying integral values.
fn enum_operator(
    catalog: &TypeCatalog,
    expr: &Expr,
    op: BinaryOp,
    left: &Value,
    right: &Value,
    result: &Type,
) -> Result<Value, EvaluationError> {
    if !op.is_arithmetic() && !matches!(op, BinaryOp::BitwiseAnd | BinaryOp::BitwiseOr) {
        return Ok(comparison(op, left, right));
    }
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    let (Some(l), Some(r)) = (left.as_integer(), right.as_integer()) else {
        return Err(incompatible(op, left, right));
    };
    let n = integral_arithmetic(op, l, r, expr)?;
    let target = result.underlying();
    if let Some(underlying) = catalog.enum_underlying(target) {
        integer_value(n, underlying).ok_or_else(|| overflow(expr))?;
        let value = i64::try_from(n).map_err(|_| overflow(expr))?;
        let ty = target.named().ok_or_else(|| incompatible(op, left, right))?;
        return Ok(Value::Enum { ty, value });
    }
    let primitive = target.primitive().ok_or_else(|| incompatible(op, left, right))?;
    integer_value(n, primitive).ok_or_else(|| overflow(expr))
}

impl RuleExecution<'_> {
    /// Evaluate a binary node using the operator binding recorded at validation.
    pub(super) fn evaluate_binary(
        &self,
        expr: &Expr,
        left: &Expr,
        op: BinaryOp,
        right: &Expr,
    ) -> Result<Value, EvaluationError> {
        match op {
            BinaryOp::BooleanAnd => {
                if !self.evaluate_bool(left)? {
                    return Ok(Value::Bool(false));
                }
                return self.evaluate_bool(right).map(Value::Bool);
            }
            BinaryOp::BooleanOr => {
                if self.evaluate_bool(left)? {
                    return Ok(Value::Bool(true));
                }
                return self.evaluate_bool(right).map(Value::Bool);
            }
            _ => {}
        }

        let info = self.info(expr)?;
        let catalog = self.validation.catalog();
        let lhs = self.evaluate(left)?;
        let rhs = self.evaluate(right)?;
        let Binding::Operator(binding) = info.binding() else {
            return builtin(catalog, expr, op, &lhs, &rhs, info.ty());
        };

        match binding {
            OperatorBinding::Builtin => builtin(catalog, expr, op, &lhs, &rhs, info.ty()),
            OperatorBinding::Converted { left: lt, right: rt } => {
                let lhs = adjust_type(catalog, self.info(left)?.ty(), lhs, lt)?;
                let rhs = adjust_type(catalog, self.info(right)?.ty(), rhs, rt)?;
                builtin(catalog, expr, op, &lhs, &rhs, info.ty())
            }
            OperatorBinding::Enum => enum_operator(catalog, expr, op, &lhs, &rhs, info.ty()),
            OperatorBinding::User { method, lifted } => {
                self.user_operator(expr, op, method, *lifted, (left, lhs), (right, rhs), info.ty())
            }
            OperatorBinding::ObjectEquality => Ok(comparison(op, &lhs, &rhs)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn user_operator(
        &self,
        expr: &Expr,
        op: BinaryOp,
        method: &MethodDef,
        lifted: bool,
        (left, lhs): (&Expr, Value),
        (right, rhs): (&Expr, Value),
        result: &Type,
    ) -> Result<Value, EvaluationError> {
        let catalog = self.validation.catalog();
        if lifted && (lhs.is_null() || rhs.is_null()) {
            return Ok(if op.is_equality() {
                Value::Bool(lhs.is_null() && rhs.is_null())
            } else if op.is_relational() {
                Value::Bool(false)
            } else {
                Value::Null
            });
        }

        let [p1, p2] = method.params() else {
            return Err(incompatible(op, &lhs, &rhs));
        };
        let mut args = [
            adjust_type(catalog, self.info(left)?.ty(), lhs, &p1.ty)?,
            adjust_type(catalog, self.info(right)?.ty(), rhs, &p2.ty)?,
        ];
        let value = method
            .invoke(&Value::Null, &mut args)
            .map_err(|source| EvaluationError::Host {
                member: format!("{}.{}", method.declaring_name(), method.name()),
                source,
            })?;
        adjust_type(catalog, method.return_type(), value, result).map_err(|e| e.with_context(expr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::expr::lit;

    fn run(op: BinaryOp, l: Value, r: Value, result: Type) -> Result<Value, EvaluationError> {
        let catalog = TypeCatalog::new();
        let expr = lit(0_i32);
        builtin(&catalog, &expr, op, &l, &r, &result)
    }

    #[test]
    fn integral_arithmetic_is_checked() {
        assert_eq!(
            run(BinaryOp::Add, Value::Int32(2), Value::Int32(3), Type::INT32),
            Ok(Value::Int32(5))
        );
        match run(BinaryOp::Add, Value::Int32(i32::MAX), Value::Int32(1), Type::INT32) {
            Err(EvaluationError::Overflow { .. }) => {}
            other => panic!("expected Overflow, got {other:?}"),
        }
        assert_eq!(
            run(BinaryOp::Divide, Value::Int32(1), Value::Int32(0), Type::INT32),
            Err(EvaluationError::DivideByZero)
        );
        assert_eq!(
            run(BinaryOp::Modulus, Value::Int32(-7), Value::Int32(3), Type::INT32),
            Ok(Value::Int32(-1))
        );
    }

    #[test]
    fn mixed_integral_widens_to_result() {
        assert_eq!(
            run(BinaryOp::Multiply, Value::Int32(-2), Value::UInt32(3), Type::INT64),
            Ok(Value::Int64(-6))
        );
    }

    #[test]
    fn nullable_arithmetic_propagates_null() {
        assert_eq!(
            run(BinaryOp::Add, Value::Null, Value::Int32(1), Type::nullable(Type::INT32)),
            Ok(Value::Null)
        );
    }

    #[test]
    fn string_concatenation_renders_operands() {
        assert_eq!(
            run(BinaryOp::Add, Value::from("n="), Value::Int32(4), Type::STRING),
            Ok(Value::from("n=4"))
        );
        assert_eq!(
            run(BinaryOp::Add, Value::Null, Value::Bool(true), Type::STRING),
            Ok(Value::from("True"))
        );
    }

    #[test]
    fn three_valued_boolean_logic() {
        let nb = Type::nullable(Type::BOOL);
        assert_eq!(
            run(BinaryOp::BitwiseAnd, Value::Null, Value::Bool(false), nb.clone()),
            Ok(Value::Bool(false))
        );
        assert_eq!(
            run(BinaryOp::BitwiseOr, Value::Null, Value::Bool(true), nb.clone()),
            Ok(Value::Bool(true))
        );
        assert_eq!(run(BinaryOp::BitwiseOr, Value::Null, Value::Bool(false), nb), Ok(Value::Null));
    }

    #[test]
    fn decimal_arithmetic() {
        let d = |s: &str| Value::Decimal(s.parse().unwrap());
        assert_eq!(run(BinaryOp::Add, d("1.10"), d("2.2"), Type::DECIMAL), Ok(d("3.3")));
        assert_eq!(
            run(BinaryOp::Divide, d("1"), d("0"), Type::DECIMAL),
            Err(EvaluationError::DivideByZero)
        );
    }

    #[test]
    fn comparisons_across_domains() {
        assert_eq!(
            run(BinaryOp::LessThan, Value::Int32(2), Value::Double(2.5), Type::BOOL),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            run(BinaryOp::ValueEquality, Value::UInt64(7), Value::Int32(7), Type::BOOL),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            run(BinaryOp::GreaterThan, Value::Null, Value::Int32(0), Type::BOOL),
            Ok(Value::Bool(false))
        );
        assert_eq!(
            run(BinaryOp::ValueEquality, Value::Null, Value::Null, Type::BOOL),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            run(BinaryOp::LessThan, Value::from("apple"), Value::from("banana"), Type::BOOL),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn float_division_by_zero_is_infinite() {
        assert_eq!(
            run(BinaryOp::Divide, Value::Double(1.0), Value::Double(0.0), Type::DOUBLE),
            Ok(Value::Double(f64::INFINITY))
        );
    }
}
