mod analysis;
mod cache;
mod conversion;
mod decompile;
mod engine;
mod error;
mod evaluate;
mod overload;
mod trace;
mod types;
mod validation;

pub use analysis::{
    expression_dependencies, intersects, normalize_update_path, paths_match, statement_side_effects,
};
pub use cache::Cache;
pub use conversion::{
    explicit_conversion_specified, find_explicit_conversion, find_implicit_conversion,
    implicit_conversion, standard_implicit_conversion, types_are_assignable, ConversionMethod,
};
pub use decompile::decompile;
pub use engine::{EngineOptions, RuleEngine, RuleState};
pub use error::RuleError;
pub use evaluate::{adjust_type, adjust_type_with_cast, RuleExecution, Slot};
pub use trace::{Branch, NullTracer, Tracer, TracingTracer, TrackingContext};
pub use types::{
    array_of, binary, lit, new_array, new_object, null, this, type_ref, ArrayRef, BinaryOp,
    ChainingBehavior, ConstructorDef, ConstructorFn, DefinitionChange, DefinitionError,
    DefinitionItem, Direction, ErrorCode, ErrorObject, EvaluationError, ExecutionReport, Expr,
    ExprKind, FieldDef, GetterFn, HostError, Literal, MemberEffect, MethodDef, MethodFn, MethodKind,
    Named, NamedCollection, ObjectRef, ParameterDef, Primitive, PropertyDef, ReevaluationBehavior,
    Rule, RuleAction, RuleCondition, RuleConditionCollection, RuleDefinitions, RuleSet,
    RuleSetBuilder, RuleSetCollection, RuleSetValidationError, Sealed, SetterFn, Statement,
    TraceEvent, Type, TypeBuilder, TypeCatalog, TypeDef, TypeId, TypeKind, TypeName, TypeProvider,
    ValidationError, ValidationErrors, Value, Visibility, ERROR_OBJECT_KEY,
};
pub use validation::{
    AuthorizationPolicy, Binding, ExpressionInfo, OperatorBinding, RuleValidation, DEFAULT_MAX_DEPTH,
};
