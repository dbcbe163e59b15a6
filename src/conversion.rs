//! Implicit and explicit conversion rules between static types.
//!
//! All checks return `Result<bool, ValidationError>`: `Ok(true)` when the conversion
//! exists, `Ok(false)` when it does not, and `Err` when it does not and there is a
//! specific reason worth reporting (a constant out of range, `null` into a value type,
//! an ambiguous user-defined conversion).

use std::sync::Arc;

use crate::types::{
    ErrorCode, Expr, ExprKind, MethodDef, MethodKind, Primitive, Type, TypeCatalog, TypeKind, ValidationError,
};

/// A user-defined conversion operator chosen for a pair of types.
///
/// A lifted conversion wraps an operator over non-nullable value types so that it
/// accepts and produces their nullable forms, passing `null` through.
#[derive(Debug, Clone)]
pub struct ConversionMethod {
    method: Arc<MethodDef>,
    lifted: bool,
    source: Type,
    target: Type,
}

impl ConversionMethod {
    fn direct(method: &Arc<MethodDef>) -> Option<Self> {
        let source = method.params().first()?.ty.clone();
        Some(ConversionMethod {
            method: Arc::clone(method),
            lifted: false,
            source,
            target: method.return_type().clone(),
        })
    }

    fn lift(self, catalog: &TypeCatalog) -> Self {
        let wrap = |t: Type| {
            if catalog.is_non_nullable_value_type(&t) {
                Type::nullable(t)
            } else {
                t
            }
        };
        ConversionMethod {
            lifted: true,
            source: wrap(self.source),
            target: wrap(self.target),
            method: self.method,
        }
    }

    #[must_use]
    pub fn method(&self) -> &Arc<MethodDef> {
        &self.method
    }

    #[must_use]
    pub fn is_lifted(&self) -> bool {
        self.lifted
    }

    /// Parameter type, nullable when lifted.
    #[must_use]
    pub fn source_type(&self) -> &Type {
        &self.source
    }

    /// Return type, nullable when lifted.
    #[must_use]
    pub fn target_type(&self) -> &Type {
        &self.target
    }
}

fn incompatible(message: String) -> ValidationError {
    ValidationError::new(message, ErrorCode::OperandTypesIncompatible)
}

/// Standard implicit conversion from `from` to `to`.
///
/// `from_expr` is the expression producing the value; when it is a literal the
/// narrowing integral conversions succeed if the constant fits the target.
///
/// # Errors
///
/// Returns an error (meaning "no conversion") when `null` is converted to a
/// non-nullable value type or a constant does not fit.
pub fn standard_implicit_conversion(
    catalog: &TypeCatalog,
    from: &Type,
    to: &Type,
    from_expr: Option<&Expr>,
) -> Result<bool, ValidationError> {
    if from == to {
        return Ok(true);
    }

    if *from == Type::Null {
        if catalog.is_non_nullable_value_type(to) {
            return Err(incompatible(format!(
                "cannot assign null to a value of type '{}'",
                catalog.type_name(to)
            )));
        }
        return Ok(true);
    }

    let to_nullable = to.is_nullable();
    if from.is_nullable() && !to_nullable {
        return Ok(*to == Type::OBJECT);
    }
    let from = from.underlying();
    let to = to.underlying();
    if from == to {
        return Ok(true);
    }

    if catalog.is_assignable(to, from) {
        return Ok(true);
    }

    if catalog.enum_underlying(to).is_some() {
        return Ok(is_zero_integral_literal(from_expr));
    }
    if catalog.enum_underlying(from).is_some() {
        return Ok(false);
    }

    let (Some(to_p), Some(from_p)) = (to.primitive(), from.primitive()) else {
        return Ok(false);
    };
    match numeric_widening(from_p, to_p) {
        Widening::Always => Ok(true),
        Widening::Never => Ok(false),
        Widening::IfConstantFits => check_value_range(from_expr, to_p),
    }
}

fn is_zero_integral_literal(expr: Option<&Expr>) -> bool {
    match expr.map(Expr::kind) {
        Some(ExprKind::Literal(lit)) => {
            let value = lit.to_value();
            let integral = value
                .primitive()
                .is_some_and(|p| p.is_integral() || p == Primitive::Char);
            integral && value.as_integer() == Some(0)
        }
        _ => false,
    }
}

fn check_value_range(expr: Option<&Expr>, to: Primitive) -> Result<bool, ValidationError> {
    match expr.map(Expr::kind) {
        Some(ExprKind::Literal(lit)) => {
            let value = lit.to_value();
            if value.is_null() {
                return Ok(false);
            }
            match value.convert_to(to) {
                Some(_) => Ok(true),
                None => Err(incompatible(format!(
                    "constant value {value} cannot be converted to '{to}'"
                ))),
            }
        }
        _ => Ok(false),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Widening {
    Always,
    IfConstantFits,
    Never,
}

/// Implicit numeric conversion table, `char` included.
fn numeric_widening(from: Primitive, to: Primitive) -> Widening {
    use Primitive::{
        Byte, Char, Decimal, Double, Int16, Int32, Int64, SByte, Single, UInt16, UInt32, UInt64,
    };
    use Widening::{Always, IfConstantFits, Never};

    let integral_or_char = from.is_integral() || from == Char;
    match to {
        Decimal => {
            if integral_or_char {
                Always
            } else {
                Never
            }
        }
        Double => {
            if integral_or_char || from == Single {
                Always
            } else {
                Never
            }
        }
        Single => {
            if integral_or_char {
                Always
            } else {
                Never
            }
        }
        Char | SByte | Byte => {
            if integral_or_char {
                IfConstantFits
            } else {
                Never
            }
        }
        Int16 => match from {
            SByte | Byte => Always,
            UInt16 | Int32 | UInt32 | Int64 | UInt64 | Char => IfConstantFits,
            _ => Never,
        },
        Int32 => match from {
            SByte | Byte | Int16 | UInt16 | Char => Always,
            UInt32 | Int64 | UInt64 => IfConstantFits,
            _ => Never,
        },
        Int64 => match from {
            SByte | Byte | Int16 | UInt16 | Int32 | UInt32 | Char => Always,
            UInt64 => IfConstantFits,
            _ => Never,
        },
        UInt16 => match from {
            Byte | Char => Always,
            SByte | Int16 | Int32 | UInt32 | Int64 | UInt64 => IfConstantFits,
            _ => Never,
        },
        UInt32 => match from {
            Byte | UInt16 | Char => Always,
            SByte | Int16 | Int32 | Int64 | UInt64 => IfConstantFits,
            _ => Never,
        },
        UInt64 => match from {
            Byte | UInt16 | UInt32 | Char => Always,
            SByte | Int16 | Int32 | Int64 => IfConstantFits,
            _ => Never,
        },
        _ => Never,
    }
}

fn holds(result: Result<bool, ValidationError>) -> bool {
    matches!(result, Ok(true))
}

fn std_conv(catalog: &TypeCatalog, from: &Type, to: &Type) -> bool {
    holds(standard_implicit_conversion(catalog, from, to, None))
}

/// Whether a value of `from` may be used where `to` is expected, including
/// user-defined implicit conversions.
///
/// # Errors
///
/// Returns the reason the conversion is not possible, when one is known.
pub fn types_are_assignable(
    catalog: &TypeCatalog,
    from: &Type,
    to: &Type,
    from_expr: Option<&Expr>,
) -> Result<bool, ValidationError> {
    if standard_implicit_conversion(catalog, from, to, from_expr)? {
        return Ok(true);
    }
    find_implicit_conversion(catalog, from, to).map(|_| true)
}

/// [`types_are_assignable`] without the reason.
#[must_use]
pub fn implicit_conversion(catalog: &TypeCatalog, from: &Type, to: &Type) -> bool {
    std_conv(catalog, from, to) || find_implicit_conversion(catalog, from, to).is_ok()
}

/// Whether a cast from `from` to `to` is legal.
///
/// # Errors
///
/// Returns the reason the cast is not possible, when one is known.
pub fn explicit_conversion_specified(
    catalog: &TypeCatalog,
    from: &Type,
    to: &Type,
) -> Result<bool, ValidationError> {
    if standard_implicit_conversion(catalog, from, to, None)? {
        return Ok(true);
    }
    if catalog.is_value_type(from) && catalog.is_value_type(to) && is_explicit_numeric(catalog, from, to) {
        return Ok(true);
    }
    if std_conv(catalog, to, from) {
        return Ok(true);
    }
    if catalog.is_interface(to) {
        if is_class_like(catalog, from) && !catalog.is_sealed(from) {
            return Ok(true);
        }
        if catalog.is_interface(from) {
            return Ok(true);
        }
    }
    if catalog.is_interface(from) && is_class_like(catalog, to) {
        let implements = to
            .named()
            .is_some_and(|id| from.named().is_some_and(|f| catalog.all_interfaces(id).contains(&f)));
        if !catalog.is_sealed(to) || implements {
            return Ok(true);
        }
    }
    find_explicit_conversion(catalog, from, to).map(|_| true)
}

fn is_class_like(catalog: &TypeCatalog, ty: &Type) -> bool {
    match ty {
        Type::Primitive(p) => matches!(p, Primitive::String | Primitive::Object),
        Type::Array { .. } => true,
        Type::Named(_) => catalog.is_class(ty),
        Type::Null | Type::Nullable(_) => false,
    }
}

/// Any numeric or `char` type to any other, enums through their underlying type.
fn is_explicit_numeric(catalog: &TypeCatalog, from: &Type, to: &Type) -> bool {
    let numeric = |t: &Type| {
        let t = t.underlying();
        t.primitive()
            .or_else(|| catalog.enum_underlying(t))
            .is_some_and(|p| Primitive::NUMERIC.contains(&p))
    };
    numeric(from) && numeric(to)
}

/// Types whose conversion operators are considered: the class chain (or the struct
/// itself) of `ty`.
fn conversion_hosts(catalog: &TypeCatalog, ty: &Type, walk_bases: bool) -> Vec<crate::types::TypeId> {
    let Some(id) = ty.named() else {
        return Vec::new();
    };
    match catalog.def(id).kind() {
        TypeKind::Class { .. } if walk_bases => catalog.class_chain(id),
        TypeKind::Class { .. } | TypeKind::Struct => vec![id],
        TypeKind::Interface | TypeKind::Enum { .. } => Vec::new(),
    }
}

fn conversion_operators(
    catalog: &TypeCatalog,
    hosts: &[crate::types::TypeId],
    explicit: bool,
) -> Vec<Arc<MethodDef>> {
    let mut out: Vec<Arc<MethodDef>> = Vec::new();
    for host in hosts {
        let mut methods = catalog.declared_methods_of_kind(*host, MethodKind::ImplicitConversion);
        if explicit {
            methods.extend(catalog.declared_methods_of_kind(*host, MethodKind::ExplicitConversion));
        }
        for m in methods {
            if m.params().len() == 1 && !out.iter().any(|o| Arc::ptr_eq(o, &m)) {
                out.push(m);
            }
        }
    }
    out
}

fn implicit_candidates(
    catalog: &TypeCatalog,
    from0: &Type,
    to0: &Type,
    source: &Type,
    target: &Type,
) -> Vec<ConversionMethod> {
    let mut hosts = conversion_hosts(catalog, from0, true);
    hosts.extend(conversion_hosts(catalog, to0, false));
    conversion_operators(catalog, &hosts, false)
        .iter()
        .filter_map(ConversionMethod::direct)
        .filter(|c| std_conv(catalog, source, &c.source) && std_conv(catalog, &c.target, target))
        .collect()
}

fn explicit_candidates(
    catalog: &TypeCatalog,
    from0: &Type,
    to0: &Type,
    source: &Type,
    target: &Type,
) -> Vec<ConversionMethod> {
    let mut hosts = conversion_hosts(catalog, from0, true);
    hosts.extend(conversion_hosts(catalog, to0, true));
    let either = |a: &Type, b: &Type| std_conv(catalog, a, b) || std_conv(catalog, b, a);
    conversion_operators(catalog, &hosts, true)
        .iter()
        .filter_map(ConversionMethod::direct)
        .filter(|c| either(source, &c.source) && either(target, &c.target))
        .collect()
}

fn no_conversion(catalog: &TypeCatalog, from: &Type, to: &Type) -> ValidationError {
    incompatible(format!(
        "no conversion exists from '{}' to '{}'",
        catalog.type_name(from),
        catalog.type_name(to)
    ))
}

fn ambiguous_conversion(catalog: &TypeCatalog, from: &Type, to: &Type) -> ValidationError {
    incompatible(format!(
        "conversion from '{}' to '{}' is ambiguous",
        catalog.type_name(from),
        catalog.type_name(to)
    ))
}

/// Pick the unique candidate converting exactly `sx -> tx`, preferring unlifted ones.
fn select(
    catalog: &TypeCatalog,
    candidates: &[ConversionMethod],
    sx: &Type,
    tx: &Type,
    from: &Type,
    to: &Type,
    retry: impl FnOnce() -> Result<ConversionMethod, ValidationError>,
) -> Result<ConversionMethod, ValidationError> {
    let matching = |lifted: bool| -> Vec<&ConversionMethod> {
        candidates
            .iter()
            .filter(|c| c.lifted == lifted && c.target == *tx && c.source == *sx)
            .collect()
    };
    let direct = matching(false);
    if direct.len() == 1 {
        return Ok(direct[0].clone());
    }
    if to.is_nullable() && direct.is_empty() {
        if from.is_nullable() {
            let lifted = matching(true);
            if lifted.len() == 1 {
                return Ok(lifted[0].clone());
            }
        } else if let Ok(inner) = retry() {
            return Ok(inner.lift(catalog));
        }
    }
    Err(ambiguous_conversion(catalog, from, to))
}

/// Locate the user-defined implicit conversion from `from` to `to`.
///
/// # Errors
///
/// Returns an error when there is no candidate or no unique best candidate.
pub fn find_implicit_conversion(
    catalog: &TypeCatalog,
    from: &Type,
    to: &Type,
) -> Result<ConversionMethod, ValidationError> {
    let from0 = from.underlying();
    let to0 = to.underlying();
    let mut candidates = implicit_candidates(catalog, from0, to0, from, to);

    if from.is_nullable() && to.is_nullable() {
        for c in implicit_candidates(catalog, from0, to0, from0, to0) {
            if catalog.is_non_nullable_value_type(&c.source)
                && catalog.is_non_nullable_value_type(&c.target)
            {
                candidates.push(c.lift(catalog));
            }
        }
    }

    if candidates.is_empty() {
        return Err(no_conversion(catalog, from, to));
    }

    let mut sx = candidates[0].source.clone();
    if sx != *from {
        for c in &candidates[1..] {
            if c.source == *from {
                sx = from.clone();
                break;
            }
            if std_conv(catalog, &c.source, &sx) {
                sx = c.source.clone();
            }
        }
    }

    let mut tx = candidates[0].target.clone();
    if tx != *to {
        for c in &candidates[1..] {
            if c.target == *to {
                tx = to.clone();
                break;
            }
            if std_conv(catalog, &tx, &c.target) {
                tx = c.target.clone();
            }
        }
    }

    select(catalog, &candidates, &sx, &tx, from, to, || {
        find_implicit_conversion(catalog, from, to0)
    })
}

/// Most specific type among candidate endpoints for an explicit conversion.
fn most_specific<'a>(
    catalog: &TypeCatalog,
    endpoints: impl Iterator<Item = &'a Type> + Clone,
    anchor: &Type,
    anchor_is_source: bool,
) -> Option<Type> {
    if endpoints.clone().any(|t| t == anchor) {
        return Some(anchor.clone());
    }
    // Most encompassed among types that encompass the anchor (source side), or
    // are encompassed by it (target side).
    let mut best: Option<Type> = None;
    for t in endpoints.clone() {
        let related = if anchor_is_source {
            std_conv(catalog, anchor, t)
        } else {
            std_conv(catalog, t, anchor)
        };
        if related {
            best = match best {
                None => Some(t.clone()),
                Some(b) if anchor_is_source && std_conv(catalog, t, &b) => Some(t.clone()),
                Some(b) if !anchor_is_source && std_conv(catalog, &b, t) => Some(t.clone()),
                keep => keep,
            };
        }
    }
    if best.is_some() {
        return best;
    }
    for t in endpoints {
        let related = if anchor_is_source {
            std_conv(catalog, t, anchor)
        } else {
            std_conv(catalog, anchor, t)
        };
        if related {
            best = match best {
                None => Some(t.clone()),
                Some(b) if anchor_is_source && std_conv(catalog, &b, t) => Some(t.clone()),
                Some(b) if !anchor_is_source && std_conv(catalog, t, &b) => Some(t.clone()),
                keep => keep,
            };
        }
    }
    best
}

/// Locate the user-defined conversion used by a cast from `from` to `to`.
///
/// # Errors
///
/// Returns an error when there is no candidate or no unique best candidate.
pub fn find_explicit_conversion(
    catalog: &TypeCatalog,
    from: &Type,
    to: &Type,
) -> Result<ConversionMethod, ValidationError> {
    let from0 = from.underlying();
    let to0 = to.underlying();
    let mut candidates = explicit_candidates(catalog, from0, to0, from, to);

    if from.is_nullable() && to.is_nullable() {
        for c in explicit_candidates(catalog, from0, to0, from0, to0) {
            candidates.push(c.lift(catalog));
        }
    }

    if candidates.is_empty() {
        return Err(no_conversion(catalog, from, to));
    }

    let sx = most_specific(catalog, candidates.iter().map(|c| &c.source), from, true);
    let tx = most_specific(catalog, candidates.iter().map(|c| &c.target), to, false);
    let (Some(sx), Some(tx)) = (sx, tx) else {
        return Err(ambiguous_conversion(catalog, from, to));
    };

    select(catalog, &candidates, &sx, &tx, from, to, || {
        find_explicit_conversion(catalog, from, to0)
    })
}
