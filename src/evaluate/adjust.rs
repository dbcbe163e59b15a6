//! Runtime conversion of a value from its static type to a target type.

use crate::conversion::{find_explicit_conversion, find_implicit_conversion, ConversionMethod};
use crate::types::value::integer_value;
use crate::types::{EvaluationError, Type, TypeCatalog, Value};

fn no_conversion(catalog: &TypeCatalog, from: &Type, to: &Type) -> EvaluationError {
    EvaluationError::NoConversion {
        from: catalog.type_name(from),
        to: catalog.type_name(to),
    }
}

/// Convert `value`, statically typed `from`, for use where `to` is expected.
///
/// Handles identity, null into nullable and reference targets, reference
/// assignability, enum and numeric conversions, and user-defined implicit
/// conversion operators.
///
/// # Errors
///
/// Returns [`EvaluationError::NoConversion`] when no conversion applies or the value
/// does not fit the target.
pub fn adjust_type(catalog: &TypeCatalog, from: &Type, value: Value, to: &Type) -> Result<Value, EvaluationError> {
    adjust(catalog, from, value, to, false)
}

/// [`adjust_type`] for casts: user-defined explicit conversions also apply.
///
/// # Errors
///
/// Returns [`EvaluationError::NoConversion`] when the cast fails.
pub fn adjust_type_with_cast(
    catalog: &TypeCatalog,
    from: &Type,
    value: Value,
    to: &Type,
) -> Result<Value, EvaluationError> {
    adjust(catalog, from, value, to, true)
}

fn adjust(catalog: &TypeCatalog, from: &Type, value: Value, to: &Type, explicit: bool) -> Result<Value, EvaluationError> {
    if from == to {
        return Ok(value);
    }
    if value.is_null() {
        return if to.is_nullable() || !catalog.is_value_type(to) {
            Ok(Value::Null)
        } else {
            Err(no_conversion(catalog, from, to))
        };
    }

    let target = to.underlying();
    if catalog.is_assignable(target, &value.runtime_type()) {
        return Ok(value);
    }

    if let Some(converted) = convert_builtin(catalog, &value, target) {
        return Ok(converted);
    }
    if value.primitive().is_some_and(|p| p.is_numeric() || p == crate::types::Primitive::Char)
        && target.primitive().is_some_and(|p| p.is_numeric())
    {
        // both numeric: the value did not fit
        return Err(no_conversion(catalog, &value.runtime_type(), to));
    }

    let method = if explicit {
        find_explicit_conversion(catalog, from, to)
    } else {
        find_implicit_conversion(catalog, from, to)
    }
    .map_err(|_| no_conversion(catalog, from, to))?;
    invoke_conversion(catalog, from, value, to, &method, explicit)
}

/// Enum, numeric and `char` conversions.
fn convert_builtin(catalog: &TypeCatalog, value: &Value, target: &Type) -> Option<Value> {
    if let Some(underlying) = catalog.enum_underlying(target) {
        let n = value.as_integer()?;
        let ty = target.named()?;
        integer_value(n, underlying)?;
        return Some(Value::Enum {
            ty,
            value: i64::try_from(n).ok()?,
        });
    }
    let primitive = target.primitive()?;
    match value {
        Value::Enum { value, .. } => Value::Int64(*value).convert_to(primitive),
        other if other.primitive().is_some_and(|p| p.is_numeric() || p == crate::types::Primitive::Char) => {
            other.convert_to(primitive)
        }
        _ => None,
    }
}

/// Run a user-defined conversion, adjusting `S -> Sx` before the call and
/// `Tx -> T` after it.
fn invoke_conversion(
    catalog: &TypeCatalog,
    from: &Type,
    value: Value,
    to: &Type,
    conversion: &ConversionMethod,
    explicit: bool,
) -> Result<Value, EvaluationError> {
    let method = conversion.method();
    let Some(param) = method.params().first() else {
        return Err(no_conversion(catalog, from, to));
    };

    let source = adjust(catalog, from, value, conversion.source_type(), explicit)?;
    if conversion.is_lifted() && source.is_null() {
        return Ok(Value::Null);
    }
    let argument = adjust(catalog, conversion.source_type(), source, &param.ty, explicit)?;
    let result = method
        .invoke(&Value::Null, &mut [argument])
        .map_err(|source| EvaluationError::Host {
            member: format!("{}.{}", method.declaring_name(), method.name()),
            source,
        })?;
    let result = adjust(catalog, method.return_type(), result, conversion.target_type(), explicit)?;
    adjust(catalog, conversion.target_type(), result, to, explicit)
}
