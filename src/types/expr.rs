use std::fmt;
use std::ops::Not;
use std::sync::atomic::{AtomicU64, Ordering};

use bigdecimal::BigDecimal;

use super::ty::{Primitive, Type};
use super::value::Value;

/// Binary operators of the expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
    /// Reference equality for reference types, value equality otherwise.
    IdentityEquality,
    IdentityInequality,
    ValueEquality,
    BitwiseOr,
    BitwiseAnd,
    BooleanOr,
    BooleanAnd,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl BinaryOp {
    /// Operator text as printed by the decompiler, without surrounding spaces.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulus => "%",
            BinaryOp::IdentityEquality | BinaryOp::ValueEquality => "==",
            BinaryOp::IdentityInequality => "!=",
            BinaryOp::BitwiseOr => "|",
            BinaryOp::BitwiseAnd => "&",
            BinaryOp::BooleanOr => "||",
            BinaryOp::BooleanAnd => "&&",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
        }
    }

    /// Binding strength; higher binds tighter.
    #[must_use]
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::BooleanOr => 1,
            BinaryOp::BooleanAnd => 2,
            BinaryOp::BitwiseOr => 3,
            BinaryOp::BitwiseAnd => 4,
            BinaryOp::IdentityEquality | BinaryOp::IdentityInequality | BinaryOp::ValueEquality => 5,
            BinaryOp::LessThan
            | BinaryOp::LessThanOrEqual
            | BinaryOp::GreaterThan
            | BinaryOp::GreaterThanOrEqual => 6,
            BinaryOp::Add | BinaryOp::Subtract => 7,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulus => 8,
        }
    }

    #[must_use]
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Subtract
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulus
        )
    }

    #[must_use]
    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::ValueEquality | BinaryOp::IdentityEquality | BinaryOp::IdentityInequality)
    }

    #[must_use]
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Argument passing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    #[default]
    In,
    Out,
    Ref,
}

/// A type as written in an expression, resolved against the type provider during
/// validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeName {
    Named { name: String, type_args: Vec<TypeName> },
    Array { element: Box<TypeName>, rank: usize },
}

impl TypeName {
    #[must_use]
    pub fn new(name: &str) -> Self {
        TypeName::Named {
            name: name.to_owned(),
            type_args: Vec::new(),
        }
    }

    #[must_use]
    pub fn generic(name: &str, type_args: Vec<TypeName>) -> Self {
        TypeName::Named {
            name: name.to_owned(),
            type_args,
        }
    }

    /// `System.Nullable<inner>`.
    #[must_use]
    pub fn nullable(inner: TypeName) -> Self {
        TypeName::generic("System.Nullable", vec![inner])
    }

    #[must_use]
    pub fn array(self) -> Self {
        self.array_of_rank(1)
    }

    #[must_use]
    pub fn array_of_rank(self, rank: usize) -> Self {
        TypeName::Array {
            element: Box::new(self),
            rank,
        }
    }
}

impl From<&str> for TypeName {
    fn from(name: &str) -> Self {
        TypeName::new(name)
    }
}

impl From<Primitive> for TypeName {
    fn from(p: Primitive) -> Self {
        TypeName::new(p.keyword())
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeName::Named { name, type_args } => {
                if type_args.len() == 1 && matches!(name.as_str(), "System.Nullable" | "Nullable") {
                    return write!(f, "{}?", type_args[0]);
                }
                f.write_str(name)?;
                if !type_args.is_empty() {
                    f.write_str("<")?;
                    for (i, arg) in type_args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            TypeName::Array { element, rank } => {
                write!(f, "{element}[{}]", ",".repeat(rank.saturating_sub(1)))
            }
        }
    }
}

/// A constant embedded in an expression tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Literal {
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
}

impl Literal {
    /// Static type of the literal; `null` has the null type.
    #[must_use]
    pub fn ty(&self) -> Type {
        match self.to_value().primitive() {
            Some(p) => Type::Primitive(p),
            None => Type::Null,
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Bool(v) => Value::Bool(*v),
            Literal::Char(v) => Value::Char(*v),
            Literal::SByte(v) => Value::SByte(*v),
            Literal::Byte(v) => Value::Byte(*v),
            Literal::Int16(v) => Value::Int16(*v),
            Literal::UInt16(v) => Value::UInt16(*v),
            Literal::Int32(v) => Value::Int32(*v),
            Literal::UInt32(v) => Value::UInt32(*v),
            Literal::Int64(v) => Value::Int64(*v),
            Literal::UInt64(v) => Value::UInt64(*v),
            Literal::Single(v) => Value::Single(*v),
            Literal::Double(v) => Value::Double(*v),
            Literal::Decimal(v) => Value::Decimal(v.clone()),
            Literal::String(v) => Value::String(v.clone()),
        }
    }
}

macro_rules! literal_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Literal {
                fn from(v: $t) -> Self {
                    Literal::$variant(v)
                }
            }

            impl From<$t> for Expr {
                fn from(v: $t) -> Self {
                    Expr::new(ExprKind::Literal(Literal::$variant(v)))
                }
            }
        )*
    };
}

literal_from! {
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
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::String(v.to_owned())
    }
}

impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        Expr::new(ExprKind::Literal(Literal::String(v.to_owned())))
    }
}

impl From<Literal> for Expr {
    fn from(v: Literal) -> Self {
        Expr::new(ExprKind::Literal(v))
    }
}

/// Identity of one expression node. Validation results are recorded per node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u64);

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

impl NodeId {
    fn fresh() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// An expression tree node.
///
/// Nodes are immutable once built. Each node gets an id that is never reused, and
/// a clone keeps the ids of the tree it was cloned from.
///
/// Trees are built with the free functions [`this()`], [`lit()`], [`null()`] and
/// [`type_ref()`] plus the chaining methods on `Expr`:
///
/// ```
/// use rulechain::{this, Expr};
///
/// let cond: Expr = this().field("Count").gt(0_i32);
/// assert_eq!(cond.to_string(), "this.Count > 0");
/// ```
#[derive(Clone)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "ExprKind", into = "ExprKind")
)]
pub struct Expr {
    id: NodeId,
    kind: ExprKind,
}

impl Expr {
    #[must_use]
    pub fn new(kind: ExprKind) -> Self {
        Expr {
            id: NodeId::fresh(),
            kind,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    #[must_use]
    pub fn into_kind(self) -> ExprKind {
        self.kind
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }
}

impl From<ExprKind> for Expr {
    fn from(kind: ExprKind) -> Self {
        Expr::new(kind)
    }
}

impl From<Expr> for ExprKind {
    fn from(expr: Expr) -> Self {
        expr.kind
    }
}

/// Ids are ignored; trees compare by structure.
impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.kind, f)
    }
}

/// The shape of an [`Expr`] node.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExprKind {
    Literal(Literal),
    /// The subject object.
    This,
    Field {
        target: Box<Expr>,
        name: String,
    },
    Property {
        target: Box<Expr>,
        name: String,
    },
    /// Indexed property access, `target[args]`.
    Indexer {
        target: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Array element access, `target[indices]`.
    ArrayIndex {
        target: Box<Expr>,
        indices: Vec<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Invoke {
        target: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Cast {
        ty: TypeName,
        expr: Box<Expr>,
    },
    New {
        ty: TypeName,
        args: Vec<Expr>,
    },
    NewArray {
        element: TypeName,
        size: Option<Box<Expr>>,
        initializers: Vec<Expr>,
    },
    /// A type used as the target of static member access.
    TypeRef(TypeName),
    /// An argument passed `out` or `ref`.
    Direction {
        direction: Direction,
        expr: Box<Expr>,
    },
}

/// The subject object, `this`.
#[must_use]
pub fn this() -> Expr {
    Expr::new(ExprKind::This)
}

#[must_use]
pub fn lit(value: impl Into<Literal>) -> Expr {
    Expr::new(ExprKind::Literal(value.into()))
}

#[must_use]
pub fn null() -> Expr {
    Expr::new(ExprKind::Literal(Literal::Null))
}

#[must_use]
pub fn type_ref(name: impl Into<TypeName>) -> Expr {
    Expr::new(ExprKind::TypeRef(name.into()))
}

#[must_use]
pub fn binary(left: impl Into<Expr>, op: BinaryOp, right: impl Into<Expr>) -> Expr {
    Expr::new(ExprKind::Binary {
        left: Box::new(left.into()),
        op,
        right: Box::new(right.into()),
    })
}

/// `new T(args)`.
#[must_use]
pub fn new_object(ty: impl Into<TypeName>, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::New {
        ty: ty.into(),
        args,
    })
}

/// `new T[size]`.
#[must_use]
pub fn new_array(element: impl Into<TypeName>, size: impl Into<Expr>) -> Expr {
    Expr::new(ExprKind::NewArray {
        element: element.into(),
        size: Some(Box::new(size.into())),
        initializers: Vec::new(),
    })
}

/// `new T[] { items }`.
#[must_use]
pub fn array_of(element: impl Into<TypeName>, initializers: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::NewArray {
        element: element.into(),
        size: None,
        initializers,
    })
}

#[allow(clippy::should_implement_trait)]
impl Expr {
    #[must_use]
    pub fn field(self, name: &str) -> Expr {
        Expr::new(ExprKind::Field {
            target: Box::new(self),
            name: name.to_owned(),
        })
    }

    #[must_use]
    pub fn prop(self, name: &str) -> Expr {
        Expr::new(ExprKind::Property {
            target: Box::new(self),
            name: name.to_owned(),
        })
    }

    #[must_use]
    pub fn call(self, method: &str, args: Vec<Expr>) -> Expr {
        Expr::new(ExprKind::Invoke {
            target: Box::new(self),
            method: method.to_owned(),
            args,
        })
    }

    #[must_use]
    pub fn index(self, args: Vec<Expr>) -> Expr {
        Expr::new(ExprKind::Indexer {
            target: Box::new(self),
            args,
        })
    }

    #[must_use]
    pub fn at(self, indices: Vec<Expr>) -> Expr {
        Expr::new(ExprKind::ArrayIndex {
            target: Box::new(self),
            indices,
        })
    }

    #[must_use]
    pub fn cast(self, ty: impl Into<TypeName>) -> Expr {
        Expr::new(ExprKind::Cast {
            ty: ty.into(),
            expr: Box::new(self),
        })
    }

    #[must_use]
    pub fn out(self) -> Expr {
        Expr::new(ExprKind::Direction {
            direction: Direction::Out,
            expr: Box::new(self),
        })
    }

    #[must_use]
    pub fn by_ref(self) -> Expr {
        Expr::new(ExprKind::Direction {
            direction: Direction::Ref,
            expr: Box::new(self),
        })
    }

    #[must_use]
    pub fn add(self, rhs: impl Into<Expr>) -> Expr {
        binary(self, BinaryOp::Add, rhs)
    }

    #[must_use]
    pub fn sub(self, rhs: impl Into<Expr>) -> Expr {
        binary(self, BinaryOp::Subtract, rhs)
    }

    #[must_use]
    pub fn mul(self, rhs: impl Into<Expr>) -> Expr {
        binary(self, BinaryOp::Multiply, rhs)
    }

    #[must_use]
    pub fn div(self, rhs: impl Into<Expr>) -> Expr {
        binary(self, BinaryOp::Divide, rhs)
    }

    #[must_use]
    pub fn rem(self, rhs: impl Into<Expr>) -> Expr {
        binary(self, BinaryOp::Modulus, rhs)
    }

    #[must_use]
    pub fn eq(self, rhs: impl Into<Expr>) -> Expr {
        binary(self, BinaryOp::ValueEquality, rhs)
    }

    /// `a != b`, encoded as `(a == b) == false`.
    #[must_use]
    pub fn neq(self, rhs: impl Into<Expr>) -> Expr {
        binary(self.eq(rhs), BinaryOp::ValueEquality, false)
    }

    #[must_use]
    pub fn same_as(self, rhs: impl Into<Expr>) -> Expr {
        binary(self, BinaryOp::IdentityEquality, rhs)
    }

    #[must_use]
    pub fn not_same_as(self, rhs: impl Into<Expr>) -> Expr {
        binary(self, BinaryOp::IdentityInequality, rhs)
    }

    #[must_use]
    pub fn gt(self, rhs: impl Into<Expr>) -> Expr {
        binary(self, BinaryOp::GreaterThan, rhs)
    }

    #[must_use]
    pub fn gte(self, rhs: impl Into<Expr>) -> Expr {
        binary(self, BinaryOp::GreaterThanOrEqual, rhs)
    }

    #[must_use]
    pub fn lt(self, rhs: impl Into<Expr>) -> Expr {
        binary(self, BinaryOp::LessThan, rhs)
    }

    #[must_use]
    pub fn lte(self, rhs: impl Into<Expr>) -> Expr {
        binary(self, BinaryOp::LessThanOrEqual, rhs)
    }

    #[must_use]
    pub fn and(self, rhs: impl Into<Expr>) -> Expr {
        binary(self, BinaryOp::BooleanAnd, rhs)
    }

    #[must_use]
    pub fn or(self, rhs: impl Into<Expr>) -> Expr {
        binary(self, BinaryOp::BooleanOr, rhs)
    }

    #[must_use]
    pub fn bit_and(self, rhs: impl Into<Expr>) -> Expr {
        binary(self, BinaryOp::BitwiseAnd, rhs)
    }

    #[must_use]
    pub fn bit_or(self, rhs: impl Into<Expr>) -> Expr {
        binary(self, BinaryOp::BitwiseOr, rhs)
    }
}

/// `!x`, encoded as `x == false`.
impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        binary(self, BinaryOp::ValueEquality, false)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::decompile::decompile(self))
    }
}
