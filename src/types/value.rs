use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};
use parking_lot::RwLock;

use super::ty::{Primitive, Type, TypeId};

/// A runtime value flowing through rule evaluation.
///
/// Objects and arrays are shared handles: cloning a `Value::Object` aliases the same
/// instance, and writes through one handle are visible through every other.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Single(f32),
    Double(f64),
    Decimal(BigDecimal),
    String(String),
    /// An enum constant, stored as its underlying integral value.
    Enum { ty: TypeId, value: i64 },
    Object(ObjectRef),
    Array(ArrayRef),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The primitive type of a primitive value, `None` for null, enums, objects and arrays.
    #[must_use]
    pub fn primitive(&self) -> Option<Primitive> {
        Some(match self {
            Value::Bool(_) => Primitive::Bool,
            Value::Char(_) => Primitive::Char,
            Value::SByte(_) => Primitive::SByte,
            Value::Byte(_) => Primitive::Byte,
            Value::Int16(_) => Primitive::Int16,
            Value::UInt16(_) => Primitive::UInt16,
            Value::Int32(_) => Primitive::Int32,
            Value::UInt32(_) => Primitive::UInt32,
            Value::Int64(_) => Primitive::Int64,
            Value::UInt64(_) => Primitive::UInt64,
            Value::Single(_) => Primitive::Single,
            Value::Double(_) => Primitive::Double,
            Value::Decimal(_) => Primitive::Decimal,
            Value::String(_) => Primitive::String,
            Value::Null | Value::Enum { .. } | Value::Object(_) | Value::Array(_) => return None,
        })
    }

    /// The dynamic type of this value.
    #[must_use]
    pub fn runtime_type(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Enum { ty, .. } => Type::Named(*ty),
            Value::Object(o) => Type::Named(o.type_id()),
            Value::Array(a) => Type::array_of_rank(a.element_type().clone(), a.rank()),
            other => other.primitive().map_or(Type::OBJECT, Type::Primitive),
        }
    }

    /// Zero value of a primitive type; `string` and `object` default to null.
    #[must_use]
    pub fn default_for(primitive: Primitive) -> Value {
        match primitive {
            Primitive::Bool => Value::Bool(false),
            Primitive::Char => Value::Char('\0'),
            Primitive::SByte => Value::SByte(0),
            Primitive::Byte => Value::Byte(0),
            Primitive::Int16 => Value::Int16(0),
            Primitive::UInt16 => Value::UInt16(0),
            Primitive::Int32 => Value::Int32(0),
            Primitive::UInt32 => Value::UInt32(0),
            Primitive::Int64 => Value::Int64(0),
            Primitive::UInt64 => Value::UInt64(0),
            Primitive::Single => Value::Single(0.0),
            Primitive::Double => Value::Double(0.0),
            Primitive::Decimal => Value::Decimal(BigDecimal::from(0)),
            Primitive::String | Primitive::Object | Primitive::Void => Value::Null,
        }
    }

    /// Integral view of integral, `char` and enum values.
    #[must_use]
    pub(crate) fn as_integer(&self) -> Option<i128> {
        Some(match self {
            Value::Char(c) => i128::from(u32::from(*c)),
            Value::SByte(v) => i128::from(*v),
            Value::Byte(v) => i128::from(*v),
            Value::Int16(v) => i128::from(*v),
            Value::UInt16(v) => i128::from(*v),
            Value::Int32(v) => i128::from(*v),
            Value::UInt32(v) => i128::from(*v),
            Value::Int64(v) => i128::from(*v),
            Value::UInt64(v) => i128::from(*v),
            Value::Enum { value, .. } => i128::from(*value),
            _ => return None,
        })
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Single(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::Decimal(d) => d.to_f64(),
            other => other.as_integer().map(|n| n as f64),
        }
    }

    #[must_use]
    pub(crate) fn as_decimal(&self) -> Option<BigDecimal> {
        match self {
            Value::Decimal(d) => Some(d.clone()),
            Value::Single(v) => float_to_decimal(f64::from(*v)),
            Value::Double(v) => float_to_decimal(*v),
            other => other.as_integer().and_then(integer_to_decimal),
        }
    }

    /// Checked numeric conversion between `char` and the numeric primitives.
    ///
    /// Floating point and decimal sources round half to even when the target is
    /// integral. Returns `None` when the value does not fit the target or the
    /// conversion is not defined (e.g. `double` to `char`).
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn convert_to(&self, to: Primitive) -> Option<Value> {
        if self.primitive() == Some(to) {
            return Some(self.clone());
        }
        match self {
            Value::Single(_) | Value::Double(_) => {
                let x = self.as_f64()?;
                match to {
                    Primitive::Single => Some(Value::Single(x as f32)),
                    Primitive::Double => Some(Value::Double(x)),
                    Primitive::Decimal => float_to_decimal(x).map(Value::Decimal),
                    p if p.is_integral() => {
                        if !x.is_finite() {
                            return None;
                        }
                        let rounded = x.round_ties_even();
                        if rounded < i128::MIN as f64 || rounded > i128::MAX as f64 {
                            return None;
                        }
                        integer_value(rounded as i128, p)
                    }
                    _ => None,
                }
            }
            Value::Decimal(d) => match to {
                Primitive::Single => d.to_f32().map(Value::Single),
                Primitive::Double => d.to_f64().map(Value::Double),
                p if p.is_integral() => {
                    let rounded = d.with_scale_round(0, RoundingMode::HalfEven);
                    integer_value(rounded.to_i128()?, p)
                }
                _ => None,
            },
            Value::Enum { .. } => None,
            other => {
                let n = other.as_integer()?;
                match to {
                    #[allow(clippy::cast_precision_loss)]
                    Primitive::Single => Some(Value::Single(n as f32)),
                    #[allow(clippy::cast_precision_loss)]
                    Primitive::Double => Some(Value::Double(n as f64)),
                    Primitive::Decimal => integer_to_decimal(n).map(Value::Decimal),
                    p => integer_value(n, p),
                }
            }
        }
    }
}

fn float_to_decimal(x: f64) -> Option<BigDecimal> {
    if x.is_finite() {
        BigDecimal::from_str(&x.to_string()).ok()
    } else {
        None
    }
}

fn integer_to_decimal(n: i128) -> Option<BigDecimal> {
    if let Ok(v) = i64::try_from(n) {
        Some(BigDecimal::from(v))
    } else {
        u64::try_from(n).ok().map(BigDecimal::from)
    }
}

/// Build an integral (or `char`) value of the given primitive if `n` is in range.
pub(crate) fn integer_value(n: i128, to: Primitive) -> Option<Value> {
    Some(match to {
        Primitive::SByte => Value::SByte(i8::try_from(n).ok()?),
        Primitive::Byte => Value::Byte(u8::try_from(n).ok()?),
        Primitive::Int16 => Value::Int16(i16::try_from(n).ok()?),
        Primitive::UInt16 => Value::UInt16(u16::try_from(n).ok()?),
        Primitive::Int32 => Value::Int32(i32::try_from(n).ok()?),
        Primitive::UInt32 => Value::UInt32(u32::try_from(n).ok()?),
        Primitive::Int64 => Value::Int64(i64::try_from(n).ok()?),
        Primitive::UInt64 => Value::UInt64(u64::try_from(n).ok()?),
        Primitive::Char => {
            let code = u16::try_from(n).ok()?;
            Value::Char(char::from_u32(u32::from(code))?)
        }
        _ => return None,
    })
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::SByte(a), Value::SByte(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Int16(a), Value::Int16(b)) => a == b,
            (Value::UInt16(a), Value::UInt16(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::UInt32(a), Value::UInt32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::UInt64(a), Value::UInt64(b)) => a == b,
            (Value::Single(a), Value::Single(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Enum { ty: ta, value: a }, Value::Enum { ty: tb, value: b }) => {
                ta == tb && a == b
            }
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    char => Char,
    i8 => SByte,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Single,
    f64 => Double,
    BigDecimal => Decimal,
    String => String,
    ObjectRef => Object,
    ArrayRef => Array,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "'{v}'"),
            Value::SByte(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Single(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "\"{v}\""),
            Value::Enum { value, .. } => write!(f, "{value}"),
            Value::Object(o) => write!(f, "{o:?}"),
            Value::Array(a) => write!(f, "{a:?}"),
        }
    }
}

struct ObjectData {
    ty: TypeId,
    fields: RwLock<HashMap<String, Value>>,
}

/// Shared handle to an object instance of a catalog type.
#[derive(Clone)]
pub struct ObjectRef(Arc<ObjectData>);

impl ObjectRef {
    /// An instance with no field values set. Prefer
    /// [`TypeCatalog::instantiate`](super::TypeCatalog::instantiate), which fills in
    /// field defaults.
    #[must_use]
    pub fn new(ty: TypeId) -> Self {
        ObjectRef(Arc::new(ObjectData {
            ty,
            fields: RwLock::new(HashMap::new()),
        }))
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.0.ty
    }

    /// Current value of an instance field, `None` if it was never set.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.fields.read().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) {
        self.0.fields.write().insert(name.to_owned(), value.into());
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object(#{}@{:p})", self.0.ty.0, Arc::as_ptr(&self.0))
    }
}

struct ArrayData {
    element: Type,
    lengths: Vec<usize>,
    items: RwLock<Vec<Value>>,
}

/// Shared handle to a (possibly multi-dimensional) array stored in row-major order.
#[derive(Clone)]
pub struct ArrayRef(Arc<ArrayData>);

impl ArrayRef {
    /// An array of the given dimensions with every element set to `fill`.
    #[must_use]
    pub fn filled(element: Type, lengths: Vec<usize>, fill: &Value) -> Self {
        let total = lengths.iter().product();
        ArrayRef(Arc::new(ArrayData {
            element,
            lengths,
            items: RwLock::new(vec![fill.clone(); total]),
        }))
    }

    /// A one-dimensional array holding `values`.
    #[must_use]
    pub fn from_values(element: Type, values: Vec<Value>) -> Self {
        ArrayRef(Arc::new(ArrayData {
            element,
            lengths: vec![values.len()],
            items: RwLock::new(values),
        }))
    }

    #[must_use]
    pub fn element_type(&self) -> &Type {
        &self.0.element
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.0.lengths.len()
    }

    #[must_use]
    pub fn lengths(&self) -> &[usize] {
        &self.0.lengths
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.items.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn flat_index(&self, indices: &[i64]) -> Option<usize> {
        if indices.len() != self.0.lengths.len() {
            return None;
        }
        let mut flat = 0_usize;
        for (&index, &length) in indices.iter().zip(&self.0.lengths) {
            let index = usize::try_from(index).ok()?;
            if index >= length {
                return None;
            }
            flat = flat * length + index;
        }
        Some(flat)
    }

    /// Element at the given indices, `None` when out of range.
    #[must_use]
    pub fn get(&self, indices: &[i64]) -> Option<Value> {
        let flat = self.flat_index(indices)?;
        self.0.items.read().get(flat).cloned()
    }

    /// Store an element; returns `false` when the indices are out of range.
    pub fn set(&self, indices: &[i64], value: Value) -> bool {
        match self.flat_index(indices) {
            Some(flat) => {
                self.0.items.write()[flat] = value;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.read().clone()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array({:?}, {:?})", self.0.element, self.0.lengths)
    }
}
