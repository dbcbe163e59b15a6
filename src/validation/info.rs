use std::sync::Arc;

use crate::types::{ConstructorDef, FieldDef, MethodDef, PropertyDef, Type};

/// How a binary operator node is carried out at runtime.
#[derive(Debug, Clone)]
pub enum OperatorBinding {
    /// A built-in numeric, string or boolean operator producing the node's type.
    Builtin,
    /// Arithmetic or comparison involving an enum operand.
    Enum,
    /// A user operator method; `lifted` forms pass null through.
    User { method: Arc<MethodDef>, lifted: bool },
    /// A predefined operator applied after converting the operands to these types.
    Converted { left: Type, right: Type },
    /// Reference or value equality between non-value types.
    ObjectEquality,
}

/// Member or operator a validated node resolved to.
#[derive(Debug, Clone, Default)]
pub enum Binding {
    #[default]
    None,
    Field(Arc<FieldDef>),
    Property(Arc<PropertyDef>),
    /// `Length` of a string or an array.
    Length,
    Indexer {
        property: Arc<PropertyDef>,
        expanded: bool,
    },
    Method {
        method: Arc<MethodDef>,
        expanded: bool,
    },
    /// `None` constructor means the implicit default constructor.
    Constructor {
        constructor: Option<Arc<ConstructorDef>>,
        expanded: bool,
    },
    Operator(OperatorBinding),
}

/// What validation learned about one expression node.
#[derive(Debug, Clone)]
pub struct ExpressionInfo {
    ty: Type,
    binding: Binding,
}

impl ExpressionInfo {
    #[must_use]
    pub fn new(ty: Type) -> Self {
        ExpressionInfo {
            ty,
            binding: Binding::None,
        }
    }

    #[must_use]
    pub fn bound(ty: Type, binding: Binding) -> Self {
        ExpressionInfo { ty, binding }
    }

    /// Static type of the node.
    #[must_use]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    #[must_use]
    pub fn binding(&self) -> &Binding {
        &self.binding
    }
}
