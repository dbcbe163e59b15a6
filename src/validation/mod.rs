//! Static checking of expressions and statements against a [`TypeCatalog`].
//!
//! A [`RuleValidation`] is one validation session for one subject type. It records an
//! [`ExpressionInfo`] for every node it accepts, keyed by the node's id. Ids are never
//! reused, so a session can outlive the trees it validated.

mod expr;
mod info;
mod members;
mod operators;
mod policy;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub use info::{Binding, ExpressionInfo, OperatorBinding};
pub use policy::AuthorizationPolicy;

use crate::conversion::{implicit_conversion, types_are_assignable};
use crate::types::{
    ErrorCode, ErrorObject, Expr, ExprKind, NodeId, Primitive, Statement, Type, TypeCatalog,
    TypeId, TypeName, TypeProvider, ValidationError, ValidationErrors, Visibility,
};

/// Nesting limit applied when none is configured.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Per-session validation state.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use rulechain::{this, FieldDef, RuleValidation, Type, TypeCatalog};
///
/// let mut catalog = TypeCatalog::new();
/// let order = catalog.class("Shop.Order").field(FieldDef::new("Total", Type::DECIMAL)).id();
/// let mut validation = RuleValidation::new(Arc::new(catalog), order);
///
/// let cond = this().field("Total").gt(100_i32);
/// assert!(validation.validate_condition(&cond));
/// assert_eq!(validation.expression_type(&cond), Some(&Type::BOOL));
/// ```
pub struct RuleValidation {
    catalog: Arc<TypeCatalog>,
    provider: Arc<dyn TypeProvider>,
    this_type: Type,
    errors: ValidationErrors,
    infos: HashMap<NodeId, ExpressionInfo>,
    type_refs: HashMap<TypeName, Type>,
    policy: Option<AuthorizationPolicy>,
    authorized: HashSet<String>,
    depth: usize,
    max_depth: usize,
    too_deep: bool,
}

impl RuleValidation {
    /// A session for subjects of `this_type`, resolving type names through the catalog.
    #[must_use]
    pub fn new(catalog: Arc<TypeCatalog>, this_type: impl Into<Type>) -> Self {
        let provider: Arc<dyn TypeProvider> = catalog.clone();
        RuleValidation {
            catalog,
            provider,
            this_type: this_type.into(),
            errors: ValidationErrors::new(),
            infos: HashMap::new(),
            type_refs: HashMap::new(),
            policy: None,
            authorized: HashSet::new(),
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            too_deep: false,
        }
    }

    /// Resolve type names through `provider` instead of the catalog.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn TypeProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Reject references to types the policy does not authorize.
    #[must_use]
    pub fn with_policy(mut self, policy: AuthorizationPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn this_type(&self) -> &Type {
        &self.this_type
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn TypeProvider> {
        &self.provider
    }

    #[must_use]
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Recorded information for a validated node.
    #[must_use]
    pub fn expression_info(&self, expr: &Expr) -> Option<&ExpressionInfo> {
        self.infos.get(&expr.id())
    }

    #[must_use]
    pub fn expression_type(&self, expr: &Expr) -> Option<&Type> {
        self.expression_info(expr).map(ExpressionInfo::ty)
    }

    pub(crate) fn this_name(&self) -> String {
        self.catalog.type_name(&self.this_type)
    }

    pub(crate) fn type_name(&self, ty: &Type) -> String {
        self.catalog.type_name(ty)
    }

    pub(crate) fn error_count(&self) -> usize {
        self.errors.error_count()
    }

    /// Validate `expr` and return its static type, or `None` after recording why it
    /// is invalid.
    ///
    /// Results are memoized per node; validating for a write always recomputes.
    pub fn validate_expression(&mut self, expr: &Expr, is_written: bool) -> Option<Type> {
        let key = expr.id();
        if !is_written {
            if let Some(info) = self.infos.get(&key) {
                return Some(info.ty().clone());
            }
        }
        if self.depth == 0 {
            self.too_deep = false;
        }
        if self.depth >= self.max_depth {
            // one report per top-level pass; siblings at the limit fail quietly
            if !self.too_deep {
                self.too_deep = true;
                let max_depth = self.max_depth;
                self.add_error(
                    ValidationError::new(
                        format!("expression is nested more than {max_depth} levels deep"),
                        ErrorCode::ExpressionTooDeep,
                    )
                    .with_expression(expr),
                );
            }
            return None;
        }

        self.depth += 1;
        let info = self.validate_node(expr, is_written);
        self.depth -= 1;

        let info = info?;
        let ty = info.ty().clone();
        self.infos.insert(key, info);
        Some(ty)
    }

    /// Validate a rule condition: the expression must be boolean, nullable boolean
    /// or implicitly convertible to boolean.
    ///
    /// A non-boolean condition is only reported when the session has no errors yet.
    /// It still fails either way.
    pub fn validate_condition(&mut self, expr: &Expr) -> bool {
        let before = self.error_count();
        let Some(ty) = self.validate_expression(expr, false) else {
            return false;
        };
        let boolean = self.is_boolean_result(&ty);
        if !boolean && !self.errors.has_errors() {
            self.add_error(
                ValidationError::new("condition must evaluate to bool", ErrorCode::ConditionMustBeBoolean)
                    .with_expression(expr),
            );
        }
        boolean && self.error_count() == before
    }

    pub(crate) fn is_boolean_result(&self, ty: &Type) -> bool {
        *ty == Type::BOOL
            || *ty == Type::nullable(Type::BOOL)
            || implicit_conversion(&self.catalog, ty, &Type::BOOL)
    }

    /// Validate an action statement. Returns `false` if it added errors.
    pub fn validate_statement(&mut self, statement: &Statement) -> bool {
        let before = self.error_count();
        match statement {
            Statement::Expression(e) => {
                self.validate_expression(e, false);
            }
            Statement::Assign { left, right } => {
                if matches!(left.kind(), ExprKind::Literal(_)) {
                    self.add_error(
                        ValidationError::new(
                            format!("cannot assign to the literal '{left}'"),
                            ErrorCode::InvalidAssignTarget,
                        )
                        .with_object(ErrorObject::Statement(statement.clone())),
                    );
                    return false;
                }
                let left_ty = self.validate_expression(left, true);
                let right_ty = self.validate_expression(right, false);
                if let (Some(left_ty), Some(right_ty)) = (left_ty, right_ty) {
                    match types_are_assignable(&self.catalog, &right_ty, &left_ty, Some(right)) {
                        Ok(true) => {}
                        Ok(false) => {
                            let message = format!(
                                "cannot assign a value of type '{}' to '{}'",
                                self.type_name(&right_ty),
                                self.type_name(&left_ty)
                            );
                            self.add_error(
                                ValidationError::new(message, ErrorCode::OperandTypesIncompatible)
                                    .with_object(ErrorObject::Statement(statement.clone())),
                            );
                        }
                        Err(e) => {
                            self.add_error(e.with_object(ErrorObject::Statement(statement.clone())));
                        }
                    }
                }
            }
        }
        self.error_count() == before
    }

    /// Resolve a written type name, checking authorization the first time it is seen.
    pub(crate) fn resolve_type_name(&mut self, name: &TypeName, expr: &Expr) -> Option<Type> {
        if let Some(ty) = self.type_refs.get(name) {
            return Some(ty.clone());
        }
        let Some(ty) = self.lookup_type_name(name) else {
            self.add_error(
                ValidationError::new(
                    format!("type '{name}' could not be resolved"),
                    ErrorCode::UnableToResolveType,
                )
                .with_expression(expr),
            );
            return None;
        };
        self.authorize(&ty, expr);
        self.type_refs.insert(name.clone(), ty.clone());
        Some(ty)
    }

    fn lookup_type_name(&self, name: &TypeName) -> Option<Type> {
        match name {
            TypeName::Named { name, type_args } if type_args.is_empty() => Primitive::from_name(name)
                .map(Type::Primitive)
                .or_else(|| self.provider.get_type(name)),
            TypeName::Named { name, type_args }
                if type_args.len() == 1
                    && matches!(name.as_str(), "System.Nullable" | "Nullable") =>
            {
                let inner = self.lookup_type_name(&type_args[0])?;
                self.catalog
                    .is_non_nullable_value_type(&inner)
                    .then(|| Type::nullable(inner))
            }
            TypeName::Named { .. } => None,
            TypeName::Array { element, rank } if *rank > 0 => self
                .lookup_type_name(element)
                .map(|e| Type::array_of_rank(e, *rank)),
            TypeName::Array { .. } => None,
        }
    }

    /// Check `ty` against the authorization policy, recording an error per
    /// unauthorized type name.
    pub(crate) fn authorize(&mut self, ty: &Type, expr: &Expr) -> bool {
        if self.policy.is_none() {
            return true;
        }
        match ty {
            Type::Null | Type::Primitive(Primitive::Void) => true,
            Type::Array { element, .. } => self.authorize(element, expr),
            Type::Nullable(inner) => {
                let outer = self.authorize_name("System.Nullable", expr);
                self.authorize(inner, expr) && outer
            }
            Type::Primitive(p) => self.authorize_name(p.system_name(), expr),
            Type::Named(_) => {
                let name = self.type_name(ty);
                self.authorize_name(&name, expr)
            }
        }
    }

    fn authorize_name(&mut self, name: &str, expr: &Expr) -> bool {
        if self.authorized.contains(name) {
            return true;
        }
        let allowed = self.policy.as_ref().map_or(true, |p| p.is_authorized(name));
        if allowed {
            self.authorized.insert(name.to_owned());
        } else {
            self.add_error(
                ValidationError::new(
                    format!("type '{name}' is not authorized"),
                    ErrorCode::TypeNotAuthorized,
                )
                .with_expression(expr),
            );
        }
        allowed
    }

    fn same_module(&self, declaring: TypeId) -> bool {
        self.catalog.module_of(&Type::Named(declaring)) == self.catalog.module_of(&self.this_type)
    }

    /// Whether member lookup should see a member at all. Non-public members of
    /// other modules are invisible.
    pub(crate) fn member_visible(&self, declaring: TypeId, visibility: Visibility) -> bool {
        visibility == Visibility::Public || self.same_module(declaring)
    }

    /// Enforce access to a visible member, recording `CannotAccessMember` on failure.
    pub(crate) fn check_access(
        &mut self,
        declaring: TypeId,
        visibility: Visibility,
        member: &str,
        expr: &Expr,
    ) -> bool {
        let ok = match visibility {
            Visibility::Public => true,
            Visibility::Internal => self.same_module(declaring),
            Visibility::Private => self.this_type == Type::Named(declaring),
        };
        if !ok {
            self.add_error(
                ValidationError::new(
                    format!("'{member}' is inaccessible due to its protection level"),
                    ErrorCode::CannotAccessMember,
                )
                .with_expression(expr),
            );
        }
        ok
    }
}

impl std::fmt::Debug for RuleValidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleValidation")
            .field("this_type", &self.this_type)
            .field("errors", &self.errors)
            .field("validated_nodes", &self.infos.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{lit, null, this, type_ref, FieldDef, MethodDef, ParameterDef, PropertyDef, Value};

    pub(crate) fn order_catalog() -> (Arc<TypeCatalog>, TypeId) {
        let mut catalog = TypeCatalog::with_module("Shop");
        let order = catalog
            .class("Shop.Order")
            .field(FieldDef::new("Count", Type::INT32))
            .field(FieldDef::new("Total", Type::DECIMAL))
            .field(FieldDef::new("Discount", Type::nullable(Type::INT32)))
            .field(FieldDef::new("Name", Type::STRING))
            .field(FieldDef::new("Flag", Type::BOOL))
            .field(FieldDef::new("Limit", Type::INT32).read_only())
            .field(FieldDef::new("MaxItems", Type::INT32).constant(10_i32))
            .property(PropertyDef::auto("Label", Type::STRING))
            .property(
                PropertyDef::new("Computed", Type::INT32).getter(|_, _| Ok(Value::Int32(1))),
            )
            .method(
                MethodDef::new("Scale", Type::INT32, |_, args| Ok(args[0].clone()))
                    .param(ParameterDef::new("factor", Type::INT32)),
            )
            .id();
        (Arc::new(catalog), order)
    }

    fn session() -> RuleValidation {
        let (catalog, order) = order_catalog();
        RuleValidation::new(catalog, order)
    }

    #[test]
    fn condition_types_are_recorded() {
        let mut v = session();
        let cond = this().field("Count").gt(0_i32);
        assert!(v.validate_condition(&cond));
        assert_eq!(v.expression_type(&cond), Some(&Type::BOOL));
        if let ExprKind::Binary { left, .. } = cond.kind() {
            assert_eq!(v.expression_type(left), Some(&Type::INT32));
        }
    }

    #[test]
    fn non_boolean_condition_is_rejected() {
        let mut v = session();
        let cond = this().field("Count").add(1_i32);
        assert!(!v.validate_condition(&cond));
        assert_eq!(v.errors().as_slice()[0].code(), ErrorCode::ConditionMustBeBoolean);
    }

    #[test]
    fn nullable_bool_condition_is_accepted() {
        let mut v = session();
        let cond = this().field("Discount").eq(null());
        assert!(v.validate_condition(&cond));
    }

    #[test]
    fn unknown_member_does_not_also_report_boolean_error() {
        let mut v = session();
        assert!(!v.validate_condition(&this().field("Missing")));
        assert_eq!(v.errors().len(), 1);
        assert_eq!(v.errors().as_slice()[0].code(), ErrorCode::UnknownFieldOrProperty);
    }

    #[test]
    fn assignment_checks_compatibility() {
        let mut v = session();
        assert!(v.validate_statement(&Statement::assign(this().field("Total"), this().field("Count"))));
        assert!(!v.validate_statement(&Statement::assign(this().field("Count"), this().field("Name"))));
        let err = &v.errors().as_slice()[0];
        assert_eq!(err.code(), ErrorCode::OperandTypesIncompatible);
        assert_eq!(err.message(), "no conversion exists from 'string' to 'int'");
    }

    #[test]
    fn assignment_accepts_fitting_constants() {
        let mut v = session();
        let stmt = Statement::assign(this().field("Discount"), 5_i32);
        assert!(v.validate_statement(&stmt));
        let stmt = Statement::assign(this().field("Discount"), null());
        assert!(v.validate_statement(&stmt));
    }

    #[test]
    fn literal_is_not_an_assignment_target() {
        let mut v = session();
        assert!(!v.validate_statement(&Statement::assign(lit(1_i32), 2_i32)));
        assert_eq!(v.errors().as_slice()[0].code(), ErrorCode::InvalidAssignTarget);
    }

    #[test]
    fn read_only_and_constant_fields_cannot_be_written() {
        let mut v = session();
        assert!(!v.validate_statement(&Statement::assign(this().field("Limit"), 1_i32)));
        assert_eq!(v.errors().as_slice()[0].code(), ErrorCode::CannotWriteMember);
        assert!(v.validate_condition(&type_ref("Shop.Order").field("MaxItems").gt(1_i32)));
    }

    #[test]
    fn getter_only_property_cannot_be_written() {
        let mut v = session();
        assert!(!v.validate_statement(&Statement::assign(this().prop("Computed"), 2_i32)));
        assert_eq!(v.errors().as_slice()[0].code(), ErrorCode::CannotWriteMember);
    }

    #[test]
    fn revalidation_reuses_recorded_information() {
        let mut v = session();
        let cond = this().field("Count").gt(0_i32).and(this().prop("Label").eq("x"));
        assert!(v.validate_condition(&cond));
        let recorded = v.infos.len();
        assert!(v.validate_condition(&cond));
        assert_eq!(v.infos.len(), recorded);
        assert!(v.errors().is_empty());
    }

    #[test]
    fn depth_limit_is_reported_once() {
        let (catalog, order) = order_catalog();
        let mut v = RuleValidation::new(catalog, order).with_max_depth(4);
        let mut e = this().field("Count");
        for _ in 0..6 {
            e = e.add(1_i32);
        }
        assert!(v.validate_expression(&e, false).is_none());
        assert_eq!(v.errors().len(), 1);
        assert_eq!(v.errors().as_slice()[0].code(), ErrorCode::ExpressionTooDeep);
    }

    #[test]
    fn depth_limit_is_reported_again_on_the_next_pass() {
        let (catalog, order) = order_catalog();
        let mut v = RuleValidation::new(catalog, order).with_max_depth(2);
        let deep = || this().field("Count").add(1_i32).add(2_i32);
        assert!(v.validate_expression(&deep(), false).is_none());
        assert!(v.validate_expression(&deep(), false).is_none());
        assert_eq!(v.errors().len(), 2);
    }

    #[test]
    fn results_do_not_carry_over_to_later_trees() {
        let mut v = session();
        let mut seen = Vec::new();
        for i in 0..2 {
            let cond = if i == 0 {
                this().field("Count").gt(0_i32)
            } else {
                this().field("Count").add(1_i32)
            };
            seen.push((v.validate_condition(&cond), v.expression_type(&cond).cloned()));
        }
        assert_eq!(seen, [(true, Some(Type::BOOL)), (false, Some(Type::INT32))]);
        assert_eq!(v.errors().as_slice()[0].code(), ErrorCode::ConditionMustBeBoolean);
    }

    #[test]
    fn session_outlives_dropped_conditions() {
        let (catalog, order) = order_catalog();
        let mut v = RuleValidation::new(catalog.clone(), order);
        {
            let first = this().field("Count").gt(0_i32);
            assert!(v.validate_condition(&first));
        }
        let second = this().field("Name").eq("x");
        assert!(v.validate_condition(&second));
        if let ExprKind::Binary { left, .. } = second.kind() {
            assert_eq!(v.expression_type(left), Some(&Type::STRING));
        }

        let subject = catalog.instantiate(order);
        subject.set("Name", "x");
        let execution = crate::evaluate::RuleExecution::new(&v, subject);
        assert!(execution.evaluate_condition(&second).unwrap());
    }

    #[test]
    fn non_boolean_condition_is_not_reported_after_other_errors() {
        let mut v = session();
        assert!(!v.validate_condition(&this().field("Missing")));
        assert!(!v.validate_condition(&this().field("Count").add(1_i32)));
        let codes: Vec<_> = v.errors().iter().map(ValidationError::code).collect();
        assert_eq!(codes, [ErrorCode::UnknownFieldOrProperty]);
    }

    #[test]
    fn unresolvable_type_name() {
        let mut v = session();
        assert!(v.validate_expression(&type_ref("Shop.Missing"), false).is_none());
        assert_eq!(v.errors().as_slice()[0].code(), ErrorCode::UnableToResolveType);
        assert_eq!(v.errors().as_slice()[0].message(), "type 'Shop.Missing' could not be resolved");
    }

    #[test]
    fn nullable_and_array_type_names_resolve() {
        let mut v = session();
        let nullable = type_ref(TypeName::nullable("int".into()));
        assert_eq!(v.validate_expression(&nullable, false), Some(Type::nullable(Type::INT32)));
        let array = type_ref(TypeName::new("System.String").array_of_rank(2));
        assert_eq!(
            v.validate_expression(&array, false),
            Some(Type::array_of_rank(Type::STRING, 2))
        );
        let bad = type_ref(TypeName::nullable("string".into()));
        assert!(v.validate_expression(&bad, false).is_none());
    }

    #[test]
    fn policy_rejects_unlisted_types() {
        let (catalog, order) = order_catalog();
        let policy = AuthorizationPolicy::new()
            .allow(r"^System\.")
            .unwrap()
            .deny(r"^System\.Decimal$")
            .unwrap();
        let mut v = RuleValidation::new(catalog, order).with_policy(policy);
        assert!(v.validate_expression(&type_ref("int"), false).is_some());
        assert!(v.errors().is_empty());
        v.validate_expression(&lit(1_i32).cast("decimal"), false);
        v.validate_expression(&type_ref("Shop.Order"), false);
        let codes: Vec<_> = v.errors().iter().map(ValidationError::code).collect();
        assert_eq!(codes, vec![ErrorCode::TypeNotAuthorized, ErrorCode::TypeNotAuthorized]);
        assert_eq!(v.errors().as_slice()[1].message(), "type 'Shop.Order' is not authorized");
    }
}
