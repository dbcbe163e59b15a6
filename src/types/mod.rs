mod action;
pub(crate) mod catalog;
mod definitions;
mod error;
mod execution_report;
pub(crate) mod expr;
mod rule;
mod ruleset;
mod ty;
pub(crate) mod value;

pub use action::{RuleAction, Statement};
pub use catalog::{
    ConstructorDef, ConstructorFn, FieldDef, GetterFn, HostError, MemberEffect, MethodDef, MethodFn,
    MethodKind, ParameterDef, PropertyDef, SetterFn, TypeBuilder, TypeCatalog, TypeDef, TypeKind,
    TypeProvider, Visibility,
};
pub use definitions::{
    DefinitionChange, DefinitionItem, Named, NamedCollection, RuleConditionCollection, RuleDefinitions,
    RuleSetCollection, Sealed,
};
pub use error::{
    DefinitionError, ErrorCode, ErrorObject, EvaluationError, RuleSetValidationError, ValidationError,
    ValidationErrors, ERROR_OBJECT_KEY,
};
pub use execution_report::{ExecutionReport, TraceEvent};
pub use expr::{
    array_of, binary, lit, new_array, new_object, null, this, type_ref, BinaryOp, Direction, Expr,
    ExprKind, Literal, TypeName,
};
pub(crate) use expr::NodeId;
pub use rule::{ReevaluationBehavior, Rule, RuleCondition};
pub(crate) use ruleset::validate_rules;
pub use ruleset::{ChainingBehavior, RuleSet, RuleSetBuilder};
pub use ty::{Primitive, Type, TypeId};
pub use value::{ArrayRef, ObjectRef, Value};
