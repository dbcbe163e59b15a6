use std::fmt;

/// Built-in primitive types understood by the conversion and operator tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Primitive {
    Bool,
    Char,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    Decimal,
    String,
    Object,
    Void,
}

impl Primitive {
    pub const ALL: [Primitive; 16] = [
        Primitive::Bool,
        Primitive::Char,
        Primitive::SByte,
        Primitive::Byte,
        Primitive::Int16,
        Primitive::UInt16,
        Primitive::Int32,
        Primitive::UInt32,
        Primitive::Int64,
        Primitive::UInt64,
        Primitive::Single,
        Primitive::Double,
        Primitive::Decimal,
        Primitive::String,
        Primitive::Object,
        Primitive::Void,
    ];

    /// The numeric primitives plus `char`, the domain of the numeric conversion tables.
    pub const NUMERIC: [Primitive; 12] = [
        Primitive::Char,
        Primitive::SByte,
        Primitive::Byte,
        Primitive::Int16,
        Primitive::UInt16,
        Primitive::Int32,
        Primitive::UInt32,
        Primitive::Int64,
        Primitive::UInt64,
        Primitive::Single,
        Primitive::Double,
        Primitive::Decimal,
    ];

    /// Source-language keyword, e.g. `int`.
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::SByte => "sbyte",
            Primitive::Byte => "byte",
            Primitive::Int16 => "short",
            Primitive::UInt16 => "ushort",
            Primitive::Int32 => "int",
            Primitive::UInt32 => "uint",
            Primitive::Int64 => "long",
            Primitive::UInt64 => "ulong",
            Primitive::Single => "float",
            Primitive::Double => "double",
            Primitive::Decimal => "decimal",
            Primitive::String => "string",
            Primitive::Object => "object",
            Primitive::Void => "void",
        }
    }

    /// Fully-qualified system name, e.g. `System.Int32`.
    #[must_use]
    pub fn system_name(self) -> &'static str {
        match self {
            Primitive::Bool => "System.Boolean",
            Primitive::Char => "System.Char",
            Primitive::SByte => "System.SByte",
            Primitive::Byte => "System.Byte",
            Primitive::Int16 => "System.Int16",
            Primitive::UInt16 => "System.UInt16",
            Primitive::Int32 => "System.Int32",
            Primitive::UInt32 => "System.UInt32",
            Primitive::Int64 => "System.Int64",
            Primitive::UInt64 => "System.UInt64",
            Primitive::Single => "System.Single",
            Primitive::Double => "System.Double",
            Primitive::Decimal => "System.Decimal",
            Primitive::String => "System.String",
            Primitive::Object => "System.Object",
            Primitive::Void => "System.Void",
        }
    }

    /// Resolve a keyword, a `System.*` name or its short form.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let short = name.strip_prefix("System.").unwrap_or(name);
        Primitive::ALL
            .into_iter()
            .find(|p| p.keyword() == name || &p.system_name()[7..] == short)
    }

    #[must_use]
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Primitive::SByte
                | Primitive::Byte
                | Primitive::Int16
                | Primitive::UInt16
                | Primitive::Int32
                | Primitive::UInt32
                | Primitive::Int64
                | Primitive::UInt64
        )
    }

    /// Integral, floating point or decimal. `char` is not numeric here.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        self.is_integral() || matches!(self, Primitive::Single | Primitive::Double | Primitive::Decimal)
    }

    #[must_use]
    pub fn is_value_type(self) -> bool {
        !matches!(self, Primitive::String | Primitive::Object | Primitive::Void)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Opaque handle to a type registered in a [`TypeCatalog`](super::TypeCatalog).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TypeId(pub(crate) usize);

impl TypeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A resolved static type.
///
/// `Null` is the type of the `null` literal: it converts to any reference type or
/// nullable value type and to nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(Primitive),
    Null,
    Nullable(Box<Type>),
    Array { element: Box<Type>, rank: usize },
    Named(TypeId),
}

impl Type {
    pub const BOOL: Type = Type::Primitive(Primitive::Bool);
    pub const CHAR: Type = Type::Primitive(Primitive::Char);
    pub const SBYTE: Type = Type::Primitive(Primitive::SByte);
    pub const BYTE: Type = Type::Primitive(Primitive::Byte);
    pub const INT16: Type = Type::Primitive(Primitive::Int16);
    pub const UINT16: Type = Type::Primitive(Primitive::UInt16);
    pub const INT32: Type = Type::Primitive(Primitive::Int32);
    pub const UINT32: Type = Type::Primitive(Primitive::UInt32);
    pub const INT64: Type = Type::Primitive(Primitive::Int64);
    pub const UINT64: Type = Type::Primitive(Primitive::UInt64);
    pub const SINGLE: Type = Type::Primitive(Primitive::Single);
    pub const DOUBLE: Type = Type::Primitive(Primitive::Double);
    pub const DECIMAL: Type = Type::Primitive(Primitive::Decimal);
    pub const STRING: Type = Type::Primitive(Primitive::String);
    pub const OBJECT: Type = Type::Primitive(Primitive::Object);
    pub const VOID: Type = Type::Primitive(Primitive::Void);

    #[must_use]
    pub fn nullable(inner: Type) -> Type {
        Type::Nullable(Box::new(inner))
    }

    #[must_use]
    pub fn array(element: Type) -> Type {
        Type::array_of_rank(element, 1)
    }

    #[must_use]
    pub fn array_of_rank(element: Type, rank: usize) -> Type {
        Type::Array {
            element: Box::new(element),
            rank,
        }
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Nullable(_))
    }

    /// The wrapped type of a nullable, otherwise `self`.
    #[must_use]
    pub fn underlying(&self) -> &Type {
        match self {
            Type::Nullable(inner) => inner,
            other => other,
        }
    }

    #[must_use]
    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    #[must_use]
    pub fn is(&self, primitive: Primitive) -> bool {
        self.primitive() == Some(primitive)
    }

    #[must_use]
    pub fn named(&self) -> Option<TypeId> {
        match self {
            Type::Named(id) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub fn element(&self) -> Option<(&Type, usize)> {
        match self {
            Type::Array { element, rank } => Some((element, *rank)),
            _ => None,
        }
    }
}

impl From<Primitive> for Type {
    fn from(p: Primitive) -> Self {
        Type::Primitive(p)
    }
}

impl From<TypeId> for Type {
    fn from(id: TypeId) -> Self {
        Type::Named(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_from_keyword_and_system_name() {
        assert_eq!(Primitive::from_name("int"), Some(Primitive::Int32));
        assert_eq!(Primitive::from_name("System.Int32"), Some(Primitive::Int32));
        assert_eq!(Primitive::from_name("Int32"), Some(Primitive::Int32));
        assert_eq!(Primitive::from_name("ushort"), Some(Primitive::UInt16));
        assert_eq!(Primitive::from_name("Widget"), None);
    }

    #[test]
    fn char_is_not_numeric() {
        assert!(!Primitive::Char.is_numeric());
        assert!(Primitive::Decimal.is_numeric());
        assert!(!Primitive::Decimal.is_integral());
    }

    #[test]
    fn underlying_strips_one_nullable() {
        let t = Type::nullable(Type::INT32);
        assert!(t.is_nullable());
        assert_eq!(t.underlying(), &Type::INT32);
        assert_eq!(Type::INT32.underlying(), &Type::INT32);
    }

    #[test]
    fn array_element_and_rank() {
        let t = Type::array_of_rank(Type::STRING, 2);
        assert_eq!(t.element(), Some((&Type::STRING, 2)));
        assert_eq!(Type::STRING.element(), None);
    }
}
