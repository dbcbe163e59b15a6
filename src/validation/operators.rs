//! Static typing of binary operators.
//!
//! Operands of the built-in numeric, string and boolean types are typed directly
//! from their arithmetic or comparison class. Anything else goes through operator
//! mapping: enum arithmetic, user operator methods (lifted when a side is
//! nullable), the predefined operator table and finally object equality.

use std::sync::Arc;

use super::info::{Binding, ExpressionInfo, OperatorBinding};
use super::RuleValidation;
use crate::conversion::{implicit_conversion, types_are_assignable};
use crate::overload::{evaluate_candidate, find_best_candidate, Argument, Overloadable};
use crate::types::catalog::operator_method_name;
use crate::types::{
    BinaryOp, ErrorCode, Expr, ExprKind, MethodDef, MethodKind, ParameterDef, Primitive, Type,
    TypeCatalog, TypeId, ValidationError,
};

const U16: u16 = 1;
const I32: u16 = 1 << 1;
const U32: u16 = 1 << 2;
const I64: u16 = 1 << 3;
const U64: u16 = 1 << 4;
const SINGLE: u16 = 1 << 5;
const DOUBLE: u16 = 1 << 6;
const DECIMAL: u16 = 1 << 7;
const BOOL: u16 = 1 << 8;
const STRING: u16 = 1 << 9;
const NULLABLE: u16 = 1 << 10;

const INTEGRAL: u16 = U16 | I32 | U32 | I64 | U64;
const SIGNED_INTEGRAL: u16 = I32 | I64;

/// Arithmetic class of a natively supported operand type.
fn arithmetic_flags(ty: &Type) -> Option<u16> {
    let (base, nullable) = match ty {
        Type::Nullable(inner) => (inner.as_ref(), NULLABLE),
        other => (other, 0),
    };
    let flag = match base.primitive()? {
        Primitive::Byte | Primitive::Char | Primitive::UInt16 => U16,
        Primitive::SByte | Primitive::Int16 | Primitive::Int32 => I32,
        Primitive::UInt32 => U32,
        Primitive::Int64 => I64,
        Primitive::UInt64 => U64,
        Primitive::Single => SINGLE,
        Primitive::Double => DOUBLE,
        Primitive::Decimal => DECIMAL,
        Primitive::Bool => BOOL,
        Primitive::String if nullable == 0 => STRING,
        _ => return None,
    };
    Some(flag | nullable)
}

fn integral_result(flags: u16) -> Option<Primitive> {
    if flags & U64 != 0 {
        return (flags & SIGNED_INTEGRAL == 0).then_some(Primitive::UInt64);
    }
    if flags & I64 != 0 || (flags & I32 != 0 && flags & U32 != 0) {
        return Some(Primitive::Int64);
    }
    if flags & U32 != 0 {
        return Some(Primitive::UInt32);
    }
    Some(Primitive::Int32)
}

/// Result of `+ - * / % & |` on natively supported operands, `None` when the
/// combination has no predefined operator.
fn arithmetic_result(op: BinaryOp, left: u16, right: u16) -> Option<Type> {
    let flags = (left | right) & !NULLABLE;
    let nullable = (left | right) & NULLABLE != 0;
    let bitwise = matches!(op, BinaryOp::BitwiseAnd | BinaryOp::BitwiseOr);

    if flags & STRING != 0 {
        return (op == BinaryOp::Add).then_some(Type::STRING);
    }
    let result = if flags & BOOL != 0 {
        (flags == BOOL && bitwise).then_some(Primitive::Bool)?
    } else if flags & !INTEGRAL == 0 {
        integral_result(flags)?
    } else if bitwise {
        return None;
    } else if flags & DECIMAL != 0 {
        (flags & (SINGLE | DOUBLE) == 0).then_some(Primitive::Decimal)?
    } else if flags & DOUBLE != 0 {
        Primitive::Double
    } else {
        Primitive::Single
    };
    let ty = Type::Primitive(result);
    Some(if nullable { Type::nullable(ty) } else { ty })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComparisonClass {
    Signed,
    Unsigned,
    ULong,
    Float,
    Decimal,
    String,
    Bool,
}

fn comparison_class(ty: &Type) -> Option<ComparisonClass> {
    use ComparisonClass as C;
    let nullable = ty.is_nullable();
    Some(match ty.underlying().primitive()? {
        Primitive::SByte | Primitive::Int16 | Primitive::Int32 | Primitive::Int64 => C::Signed,
        Primitive::Byte | Primitive::UInt16 | Primitive::UInt32 | Primitive::Char => C::Unsigned,
        Primitive::UInt64 => C::ULong,
        Primitive::Single | Primitive::Double => C::Float,
        Primitive::Decimal => C::Decimal,
        Primitive::String if !nullable => C::String,
        Primitive::Bool => C::Bool,
        _ => return None,
    })
}

fn comparable(op: BinaryOp, a: ComparisonClass, b: ComparisonClass) -> bool {
    use ComparisonClass as C;
    if a == b {
        return a != C::Bool || op == BinaryOp::ValueEquality;
    }
    let mixed = |x, y| {
        matches!(
            (x, y),
            (C::Decimal, C::Signed | C::Unsigned | C::ULong)
                | (C::Float, C::Signed | C::Unsigned | C::ULong)
                | (C::ULong, C::Unsigned)
                | (C::Signed, C::Unsigned)
        )
    };
    mixed(a, b) || mixed(b, a)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Arithmetic,
    Equality,
    Relational,
}

fn group(op: BinaryOp) -> Group {
    if op.is_equality() {
        Group::Equality
    } else if op.is_relational() {
        Group::Relational
    } else {
        Group::Arithmetic
    }
}

fn integer_literal(expr: &Expr) -> Option<(Primitive, i128)> {
    match expr.kind() {
        ExprKind::Literal(l) => {
            let value = l.to_value();
            let primitive = value.primitive().filter(|p| p.is_integral())?;
            Some((primitive, value.as_integer()?))
        }
        _ => None,
    }
}

fn is_zero_literal(expr: &Expr) -> bool {
    matches!(integer_literal(expr), Some((_, 0)))
}

/// Predefined operator signatures `(left, right, result)`.
fn predefined(op: BinaryOp) -> Vec<(Primitive, Primitive, Primitive)> {
    use Primitive::{Bool, Decimal, Double, Int32, Int64, Object, Single, UInt32, UInt64};
    const NUMERIC: [Primitive; 7] = [Int32, UInt32, Int64, UInt64, Single, Double, Decimal];
    let same = |ps: &[Primitive]| ps.iter().map(|&p| (p, p, p)).collect::<Vec<_>>();
    let compare = |ps: &[Primitive]| ps.iter().map(|&p| (p, p, Bool)).collect::<Vec<_>>();
    match op {
        BinaryOp::Add => {
            let mut table = same(&NUMERIC);
            table.extend([
                (Primitive::String, Primitive::String, Primitive::String),
                (Primitive::String, Object, Primitive::String),
                (Object, Primitive::String, Primitive::String),
            ]);
            table
        }
        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulus => {
            same(&NUMERIC)
        }
        BinaryOp::BitwiseAnd | BinaryOp::BitwiseOr => same(&[Int32, UInt32, Int64, UInt64, Bool]),
        BinaryOp::ValueEquality => {
            let mut table = compare(&NUMERIC);
            table.extend([(Bool, Bool, Bool), (Primitive::String, Primitive::String, Bool)]);
            table
        }
        BinaryOp::LessThan
        | BinaryOp::LessThanOrEqual
        | BinaryOp::GreaterThan
        | BinaryOp::GreaterThanOrEqual => compare(&NUMERIC),
        _ => Vec::new(),
    }
}

/// An operator implementation taking part in resolution.
#[derive(Debug, Clone)]
struct OperatorCandidate {
    /// `None` for a predefined operator.
    method: Option<Arc<MethodDef>>,
    lifted: bool,
    params: Vec<ParameterDef>,
    result: Type,
    declaring: Option<TypeId>,
}

impl Overloadable for OperatorCandidate {
    fn member_name(&self) -> &str {
        self.method.as_ref().map_or("operator", |m| m.name())
    }

    fn parameters(&self) -> &[ParameterDef] {
        &self.params
    }

    fn declaring_type(&self) -> Option<TypeId> {
        self.declaring
    }
}

impl OperatorCandidate {
    fn predefined(left: Type, right: Type, result: Type) -> Self {
        OperatorCandidate {
            method: None,
            lifted: false,
            params: vec![ParameterDef::new("left", left), ParameterDef::new("right", right)],
            result,
            declaring: None,
        }
    }

    fn into_info(self) -> ExpressionInfo {
        let binding = match self.method {
            Some(method) => OperatorBinding::User {
                method,
                lifted: self.lifted,
            },
            None => {
                let mut params = self.params.into_iter().map(|p| p.ty);
                let left = params.next().unwrap_or(Type::OBJECT);
                let right = params.next().unwrap_or(Type::OBJECT);
                OperatorBinding::Converted { left, right }
            }
        };
        ExpressionInfo::bound(self.result, Binding::Operator(binding))
    }
}

/// Operator methods for `op` declared on `ty`, or on its direct base class when
/// `ty` declares none.
fn declared_operators(catalog: &TypeCatalog, op: BinaryOp, ty: &Type) -> Vec<Arc<MethodDef>> {
    let Some(id) = ty.underlying().named() else {
        return Vec::new();
    };
    let name = operator_method_name(op);
    let on = |id: TypeId| -> Vec<Arc<MethodDef>> {
        catalog
            .get(id)
            .map(|def| {
                def.methods()
                    .iter()
                    .filter(|m| matches!(m.kind(), MethodKind::Operator(o) if operator_method_name(o) == name))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    };
    let found = on(id);
    if found.is_empty() {
        if let Some(base) = catalog.base_type(id) {
            return on(base);
        }
    }
    found
}

fn with_nullability(ty: Type, nullable: bool) -> Type {
    if nullable && !ty.is_nullable() {
        Type::nullable(ty)
    } else {
        ty
    }
}

impl RuleValidation {
    pub(super) fn validate_binary(
        &mut self,
        expr: &Expr,
        left: &Expr,
        op: BinaryOp,
        right: &Expr,
    ) -> Option<ExpressionInfo> {
        if matches!(left.kind(), ExprKind::TypeRef(_)) || matches!(right.kind(), ExprKind::TypeRef(_)) {
            self.add_error(
                ValidationError::new(
                    format!("a type cannot be an operand of '{}'", op.symbol()),
                    ErrorCode::CodeExpressionNotHandled,
                )
                .with_expression(expr),
            );
            return None;
        }
        let lhs = self.validate_expression(left, false);
        let rhs = self.validate_expression(right, false);
        let (lhs, rhs) = (lhs?, rhs?);
        if lhs == Type::VOID || rhs == Type::VOID {
            self.add_error(
                ValidationError::new(
                    format!("operator '{}' cannot be applied to a void result", op.symbol()),
                    ErrorCode::VoidResult,
                )
                .with_expression(expr),
            );
            return None;
        }

        match op {
            BinaryOp::BooleanAnd | BinaryOp::BooleanOr => {
                let mut ok = true;
                if lhs != Type::BOOL {
                    ok = false;
                    let message = format!(
                        "left operand of '{}' must be bool, found '{}'",
                        op.symbol(),
                        self.type_name(&lhs)
                    );
                    self.add_error(
                        ValidationError::new(message, ErrorCode::LeftOperandInvalidType)
                            .with_expression(expr),
                    );
                }
                if rhs != Type::BOOL {
                    ok = false;
                    let message = format!(
                        "right operand of '{}' must be bool, found '{}'",
                        op.symbol(),
                        self.type_name(&rhs)
                    );
                    self.add_error(
                        ValidationError::new(message, ErrorCode::RightOperandInvalidType)
                            .with_expression(expr),
                    );
                }
                ok.then(|| ExpressionInfo::bound(Type::BOOL, Binding::Operator(OperatorBinding::Builtin)))
            }
            BinaryOp::IdentityEquality | BinaryOp::IdentityInequality => Some(ExpressionInfo::bound(
                Type::BOOL,
                Binding::Operator(OperatorBinding::Builtin),
            )),
            _ => match self.type_operator(op, &lhs, left, &rhs, right) {
                Ok(info) => Some(info),
                Err(e) => {
                    self.add_error(e.with_expression(expr));
                    None
                }
            },
        }
    }

    fn incompatible_operands(&self, op: BinaryOp, lhs: &Type, rhs: &Type) -> ValidationError {
        ValidationError::new(
            format!(
                "operator '{}' cannot be applied to operands of type '{}' and '{}'",
                op.symbol(),
                self.type_name(lhs),
                self.type_name(rhs)
            ),
            ErrorCode::OperandTypesIncompatible,
        )
    }

    fn type_operator(
        &self,
        op: BinaryOp,
        lhs: &Type,
        left: &Expr,
        rhs: &Type,
        right: &Expr,
    ) -> Result<ExpressionInfo, ValidationError> {
        let builtin = |ty: Type| ExpressionInfo::bound(ty, Binding::Operator(OperatorBinding::Builtin));

        let native = if group(op) == Group::Arithmetic {
            match (arithmetic_flags(lhs), arithmetic_flags(rhs)) {
                (Some(l), Some(r)) => Some(arithmetic_result(op, l, r)),
                _ => None,
            }
        } else {
            match (comparison_class(lhs), comparison_class(rhs)) {
                (Some(l), Some(r)) => Some(comparable(op, l, r).then_some(Type::BOOL)),
                _ => None,
            }
        };

        let result = match native {
            Some(Some(ty)) => return Ok(builtin(ty)),
            Some(None) => Err(self.incompatible_operands(op, lhs, rhs)),
            None => self.map_operator(op, lhs, left, rhs, right),
        };
        result.or_else(|e| {
            if self.unsigned_long_with_literal(lhs, left, rhs, right) {
                let ty = if group(op) == Group::Arithmetic {
                    Type::UINT64
                } else {
                    Type::BOOL
                };
                Ok(builtin(ty))
            } else {
                Err(e)
            }
        })
    }

    /// `ulong` paired with a non-negative `int` or `long` literal.
    fn unsigned_long_with_literal(&self, lhs: &Type, left: &Expr, rhs: &Type, right: &Expr) -> bool {
        let fits = |e: &Expr| {
            matches!(
                integer_literal(e),
                Some((Primitive::Int32 | Primitive::Int64, n)) if n >= 0
            )
        };
        (*lhs == Type::UINT64 && fits(right)) || (*rhs == Type::UINT64 && fits(left))
    }

    fn assignable_with(&self, from: &Type, from_expr: &Expr, to: Primitive) -> bool {
        matches!(
            types_are_assignable(&self.catalog, from, &Type::Primitive(to), Some(from_expr)),
            Ok(true)
        )
    }

    /// Operators with an enum operand.
    fn enum_operator(
        &self,
        op: BinaryOp,
        lhs: &Type,
        left: &Expr,
        rhs: &Type,
        right: &Expr,
    ) -> Option<Type> {
        let catalog = &self.catalog;
        let lhs0 = lhs.underlying();
        let rhs0 = rhs.underlying();
        let nullable = lhs.is_nullable() || rhs.is_nullable();

        if let Some(underlying) = catalog.enum_underlying(lhs0) {
            let result = match group(op) {
                Group::Arithmetic => match op {
                    BinaryOp::Add if self.assignable_with(rhs0, right, underlying) => lhs0.clone(),
                    BinaryOp::Subtract if rhs0 == lhs0 => Type::Primitive(underlying),
                    BinaryOp::Subtract if is_zero_literal(right) => {
                        match integer_literal(right) {
                            Some((p, _)) if p != underlying => Type::Primitive(underlying),
                            _ => lhs0.clone(),
                        }
                    }
                    BinaryOp::Subtract if self.assignable_with(rhs0, right, underlying) => lhs0.clone(),
                    BinaryOp::BitwiseAnd | BinaryOp::BitwiseOr if rhs0 == lhs0 => lhs0.clone(),
                    _ => return None,
                },
                Group::Equality | Group::Relational => {
                    let ok = rhs0 == lhs0
                        || (lhs.is_nullable() && *rhs == Type::Null)
                        || is_zero_literal(right);
                    return ok.then_some(Type::BOOL);
                }
            };
            return Some(with_nullability(result, nullable));
        }

        let underlying = catalog.enum_underlying(rhs0)?;
        match group(op) {
            Group::Arithmetic => {
                let result = match op {
                    BinaryOp::Add if self.assignable_with(lhs0, left, underlying) => rhs0.clone(),
                    BinaryOp::Subtract if is_zero_literal(left) => Type::Primitive(underlying),
                    BinaryOp::Subtract if self.assignable_with(lhs0, left, underlying) => rhs0.clone(),
                    _ => return None,
                };
                Some(with_nullability(result, nullable))
            }
            Group::Equality | Group::Relational => {
                let ok = (rhs.is_nullable() && *lhs == Type::Null) || is_zero_literal(left);
                ok.then_some(Type::BOOL)
            }
        }
    }

    fn map_operator(
        &self,
        op: BinaryOp,
        lhs: &Type,
        left: &Expr,
        rhs: &Type,
        right: &Expr,
    ) -> Result<ExpressionInfo, ValidationError> {
        let catalog = &self.catalog;

        if let Some(ty) = self.enum_operator(op, lhs, left, rhs, right) {
            return Ok(ExpressionInfo::bound(ty, Binding::Operator(OperatorBinding::Enum)));
        }

        let mut methods = declared_operators(catalog, op, lhs);
        for m in declared_operators(catalog, op, rhs) {
            if !methods.iter().any(|x| Arc::ptr_eq(x, &m)) {
                methods.push(m);
            }
        }

        let nullable_involved =
            lhs.is_nullable() || rhs.is_nullable() || *lhs == Type::Null || *rhs == Type::Null;

        let mut candidates = Vec::new();
        for method in &methods {
            let [p1, p2] = method.params() else {
                continue;
            };
            if implicit_conversion(catalog, lhs, &p1.ty) && implicit_conversion(catalog, rhs, &p2.ty) {
                candidates.push(OperatorCandidate {
                    method: Some(Arc::clone(method)),
                    lifted: false,
                    params: vec![p1.clone(), p2.clone()],
                    result: method.return_type().clone(),
                    declaring: method.declaring(),
                });
            }
        }

        if candidates.is_empty() && nullable_involved {
            for method in &methods {
                let [p1, p2] = method.params() else {
                    continue;
                };
                if !catalog.is_non_nullable_value_type(&p1.ty)
                    || !catalog.is_non_nullable_value_type(&p2.ty)
                {
                    continue;
                }
                let ret = method.return_type();
                let result = match group(op) {
                    Group::Equality | Group::Relational if *ret == Type::BOOL => Type::BOOL,
                    Group::Arithmetic if catalog.is_non_nullable_value_type(ret) => {
                        Type::nullable(ret.clone())
                    }
                    _ => continue,
                };
                let l = Type::nullable(p1.ty.clone());
                let r = Type::nullable(p2.ty.clone());
                if implicit_conversion(catalog, lhs, &l) && implicit_conversion(catalog, rhs, &r) {
                    candidates.push(OperatorCandidate {
                        method: Some(Arc::clone(method)),
                        lifted: true,
                        params: vec![ParameterDef::new("left", l), ParameterDef::new("right", r)],
                        result,
                        declaring: method.declaring(),
                    });
                }
            }
        }

        let table = predefined(op);
        if candidates.is_empty() {
            for &(l, r, ret) in &table {
                let (l, r) = (Type::Primitive(l), Type::Primitive(r));
                if implicit_conversion(catalog, lhs, &l) && implicit_conversion(catalog, rhs, &r) {
                    candidates.push(OperatorCandidate::predefined(l, r, Type::Primitive(ret)));
                }
            }
        }

        if candidates.is_empty() && group(op) == Group::Equality {
            let reference_like = !catalog.is_value_type(lhs) && !catalog.is_value_type(rhs);
            let related = *lhs == Type::Null
                || *rhs == Type::Null
                || catalog.is_assignable(lhs, rhs)
                || catalog.is_assignable(rhs, lhs);
            if reference_like && related {
                return Ok(ExpressionInfo::bound(
                    Type::BOOL,
                    Binding::Operator(OperatorBinding::ObjectEquality),
                ));
            }
        }

        if candidates.is_empty() && nullable_involved {
            for &(l, r, ret) in &table {
                if l == Primitive::String || l == Primitive::Object || r == Primitive::Object {
                    continue;
                }
                let l = Type::nullable(Type::Primitive(l));
                let r = Type::nullable(Type::Primitive(r));
                let result = match group(op) {
                    Group::Arithmetic => Type::nullable(Type::Primitive(ret)),
                    Group::Equality | Group::Relational => Type::BOOL,
                };
                if implicit_conversion(catalog, lhs, &l) && implicit_conversion(catalog, rhs, &r) {
                    candidates.push(OperatorCandidate::predefined(l, r, result));
                }
            }
        }

        match candidates.len() {
            0 => Err(self.incompatible_operands(op, lhs, rhs)),
            1 => Ok(candidates.remove(0).into_info()),
            _ => {
                let arguments = [Argument::new(left, lhs.clone()), Argument::new(right, rhs.clone())];
                let applicable: Vec<_> = candidates
                    .iter()
                    .filter_map(|c| evaluate_candidate(catalog, c, &arguments).ok())
                    .collect();
                let subject = self.this_name();
                find_best_candidate(catalog, &subject, lhs, applicable, &arguments)
                    .map(|c| c.member.into_info())
                    .ok_or_else(|| {
                        ValidationError::new(
                            format!(
                                "operator '{}' is ambiguous on operands of type '{}' and '{}'",
                                op.symbol(),
                                self.type_name(lhs),
                                self.type_name(rhs)
                            ),
                            ErrorCode::OperandTypesIncompatible,
                        )
                    })
            }
        }
    }
}
