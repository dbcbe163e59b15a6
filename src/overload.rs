//! Overload resolution for methods, constructors, indexers and operators.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::conversion::types_are_assignable;
use crate::types::{
    ConstructorDef, Direction, ErrorCode, Expr, ExprKind, MethodDef, ParameterDef, Primitive, PropertyDef,
    Type, TypeCatalog, TypeId, ValidationError,
};

/// One actual argument at a call site.
#[derive(Debug, Clone)]
pub(crate) struct Argument<'e> {
    pub(crate) expr: Option<&'e Expr>,
    pub(crate) direction: Direction,
    pub(crate) ty: Type,
}

impl<'e> Argument<'e> {
    pub(crate) fn new(expr: &'e Expr, ty: Type) -> Self {
        let direction = match expr.kind() {
            ExprKind::Direction { direction, .. } => *direction,
            _ => Direction::In,
        };
        Argument {
            expr: Some(expr),
            direction,
            ty,
        }
    }

    pub(crate) fn of_type(ty: Type) -> Self {
        Argument {
            expr: None,
            direction: Direction::In,
            ty,
        }
    }
}

/// A member that takes part in overload resolution.
pub(crate) trait Overloadable: Clone {
    fn member_name(&self) -> &str;

    fn parameters(&self) -> &[ParameterDef];

    /// `None` for extension methods, which have no declaring host type.
    fn declaring_type(&self) -> Option<TypeId>;

    /// Declaring class name and receiver type of an extension method.
    fn extension_of(&self) -> Option<(&str, &Type)> {
        None
    }
}

impl Overloadable for Arc<MethodDef> {
    fn member_name(&self) -> &str {
        self.name()
    }

    fn parameters(&self) -> &[ParameterDef] {
        self.params()
    }

    fn declaring_type(&self) -> Option<TypeId> {
        self.declaring()
    }

    fn extension_of(&self) -> Option<(&str, &Type)> {
        self.receiver().map(|r| (self.declaring_name(), r))
    }
}

impl Overloadable for Arc<ConstructorDef> {
    fn member_name(&self) -> &str {
        ".ctor"
    }

    fn parameters(&self) -> &[ParameterDef] {
        self.params()
    }

    fn declaring_type(&self) -> Option<TypeId> {
        Some(self.declaring())
    }
}

impl Overloadable for Arc<PropertyDef> {
    fn member_name(&self) -> &str {
        self.name()
    }

    fn parameters(&self) -> &[ParameterDef] {
        self.index_params()
    }

    fn declaring_type(&self) -> Option<TypeId> {
        Some(self.declaring())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CandidateParameter {
    ty: Type,
    direction: Direction,
}

fn direction_keyword(direction: Direction) -> &'static str {
    match direction {
        Direction::In => "in",
        Direction::Out => "out",
        Direction::Ref => "ref",
    }
}

impl CandidateParameter {
    fn new(ty: Type) -> Self {
        CandidateParameter {
            ty,
            direction: Direction::In,
        }
    }

    fn from_def(def: &ParameterDef) -> Self {
        CandidateParameter {
            ty: def.ty.clone(),
            direction: def.direction,
        }
    }

    fn matches(
        &self,
        catalog: &TypeCatalog,
        argument: &Argument<'_>,
        member: &str,
        position: usize,
    ) -> Result<(), ValidationError> {
        if self.direction != argument.direction {
            return Err(ValidationError::new(
                format!(
                    "argument {position} of '{member}' must be passed with the '{}' keyword",
                    direction_keyword(self.direction)
                ),
                ErrorCode::MethodDirectionMismatch,
            ));
        }

        let mismatch = || {
            ValidationError::new(
                format!(
                    "argument {position} of '{member}' has type '{}', which cannot be passed as '{}'",
                    catalog.type_name(&argument.ty),
                    catalog.type_name(&self.ty)
                ),
                ErrorCode::MethodArgumentTypeMismatch,
            )
        };

        // out and ref need identical types
        if self.direction != Direction::In && self.ty != argument.ty {
            return Err(mismatch());
        }

        match types_are_assignable(catalog, &argument.ty, &self.ty, argument.expr) {
            Ok(true) => Ok(()),
            Ok(false) => Err(mismatch()),
            Err(e) => Err(e),
        }
    }

    /// Which of two parameters receives `argument` with the better conversion.
    fn compare_conversion(
        &self,
        catalog: &TypeCatalog,
        other: &CandidateParameter,
        argument: &Argument<'_>,
    ) -> Ordering {
        if self.ty == other.ty {
            return Ordering::Equal;
        }
        if argument.ty == self.ty {
            return Ordering::Greater;
        }
        if argument.ty == other.ty {
            return Ordering::Less;
        }

        let this_to_other = matches!(types_are_assignable(catalog, &self.ty, &other.ty, None), Ok(true));
        let other_to_this = matches!(types_are_assignable(catalog, &other.ty, &self.ty, None), Ok(true));
        if this_to_other && !other_to_this {
            return Ordering::Greater;
        }
        if other_to_this && !this_to_other {
            return Ordering::Less;
        }

        if better_signed_conversion(&self.ty, &other.ty) {
            return Ordering::Greater;
        }
        if better_signed_conversion(&other.ty, &self.ty) {
            return Ordering::Less;
        }
        Ordering::Equal
    }
}

/// A conversion to a signed type beats one to an unsigned type of the same or
/// greater width.
fn better_signed_conversion(t1: &Type, t2: &Type) -> bool {
    use Primitive::{Int16, Int32, Int64, SByte, UInt16, UInt32, UInt64};

    if let Type::Nullable(inner) = t1 {
        return better_signed_conversion(inner, t2.underlying());
    }
    let (Some(p1), Some(p2)) = (t1.primitive(), t2.primitive()) else {
        return false;
    };
    match p1 {
        SByte => matches!(p2, Primitive::Byte | UInt16 | UInt32 | UInt64),
        Int16 => matches!(p2, UInt16 | UInt32 | UInt64),
        Int32 => matches!(p2, UInt32 | UInt64),
        Int64 => p2 == UInt64,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Form {
    Normal,
    /// Matched only after expanding a trailing `params` array.
    Expanded,
}

/// A member applicable to a given argument list.
#[derive(Debug, Clone)]
pub(crate) struct Candidate<M> {
    pub(crate) member: M,
    signature: Vec<CandidateParameter>,
    form: Form,
}

impl<M> Candidate<M> {
    pub(crate) fn is_expanded(&self) -> bool {
        self.form == Form::Expanded
    }
}

fn arg_count_mismatch(member: &str, count: usize) -> ValidationError {
    ValidationError::new(
        format!("no overload of '{member}' takes {count} argument(s)"),
        ErrorCode::MethodArgCountMismatch,
    )
}

/// Check whether `member` accepts `arguments`, in normal or expanded form.
///
/// # Errors
///
/// Returns why the member is not applicable.
pub(crate) fn evaluate_candidate<M: Overloadable>(
    catalog: &TypeCatalog,
    member: &M,
    arguments: &[Argument<'_>],
) -> Result<Candidate<M>, ValidationError> {
    let name = member.member_name();
    let parameters = member.parameters();
    let arg_count = arguments.len();

    let Some(last) = parameters.last() else {
        if arg_count == 0 {
            return Ok(Candidate {
                member: member.clone(),
                signature: Vec::new(),
                form: Form::Normal,
            });
        }
        return Err(arg_count_mismatch(name, arg_count));
    };

    let param_count = parameters.len();
    let has_params_array = last.is_params && last.ty.element().is_some();
    let fixed_count = if has_params_array { param_count - 1 } else { param_count };

    if arg_count < fixed_count || (!has_params_array && arg_count != param_count) {
        return Err(arg_count_mismatch(name, arg_count));
    }

    let mut signature = Vec::with_capacity(arg_count);
    for (p, (param, arg)) in parameters.iter().zip(arguments).take(fixed_count).enumerate() {
        let candidate = CandidateParameter::from_def(param);
        candidate.matches(catalog, arg, name, p + 1)?;
        signature.push(candidate);
    }

    if !has_params_array {
        return Ok(Candidate {
            member: member.clone(),
            signature,
            form: Form::Normal,
        });
    }

    if arg_count == fixed_count {
        return Ok(Candidate {
            member: member.clone(),
            signature,
            form: Form::Expanded,
        });
    }

    if arg_count == param_count {
        // a single argument may be the params array itself
        let whole = CandidateParameter::from_def(last);
        if whole
            .matches(catalog, &arguments[fixed_count], name, param_count)
            .is_ok()
        {
            signature.push(whole);
            return Ok(Candidate {
                member: member.clone(),
                signature,
                form: Form::Normal,
            });
        }
    }

    let element = last.ty.element().map_or(Type::OBJECT, |(e, _)| e.clone());
    let element_param = CandidateParameter::new(element);
    for (p, arg) in arguments.iter().enumerate().skip(fixed_count) {
        element_param.matches(catalog, arg, name, p + 1)?;
        signature.push(element_param.clone());
    }
    Ok(Candidate {
        member: member.clone(),
        signature,
        form: Form::Expanded,
    })
}

/// Every applicable member.
///
/// # Errors
///
/// When nothing applies: the single member's own mismatch, or `overload_not_found`
/// when several members were rejected.
pub(crate) fn applicable_candidates<M: Overloadable>(
    catalog: &TypeCatalog,
    members: &[M],
    arguments: &[Argument<'_>],
    overload_not_found: impl FnOnce() -> ValidationError,
) -> Result<Vec<Candidate<M>>, ValidationError> {
    let mut candidates = Vec::new();
    let mut last_error = None;
    let mut error_count = 0;
    for member in members {
        match evaluate_candidate(catalog, member, arguments) {
            Ok(c) => candidates.push(c),
            Err(e) => {
                error_count += 1;
                last_error = Some(e);
            }
        }
    }

    if !candidates.is_empty() {
        return Ok(candidates);
    }
    match last_error {
        Some(e) if error_count == 1 => Err(e),
        _ => Err(overload_not_found()),
    }
}

fn namespace_match(test: &str, reference: &str) -> usize {
    test.split('.')
        .zip(reference.split('.'))
        .take_while(|(a, b)| a == b)
        .count()
}

fn tally(ordering: Ordering, better: &mut bool, worse: &mut bool) {
    match ordering {
        Ordering::Greater => *better = true,
        Ordering::Less => *worse = true,
        Ordering::Equal => {}
    }
}

/// Compare two applicable candidates. `Greater` means `this` is better.
///
/// Ordinary members stop at the first argument whose conversion is worse, even
/// when an earlier argument was better, so the outcome for mixed argument lists
/// depends on the order candidates are visited.
fn compare_member<M: Overloadable>(
    catalog: &TypeCatalog,
    subject_name: &str,
    target: &Type,
    this: &Candidate<M>,
    other: &Candidate<M>,
    arguments: &[Argument<'_>],
) -> Ordering {
    if let (Some(this_decl), Some(other_decl)) =
        (this.member.declaring_type(), other.member.declaring_type())
    {
        if this_decl != other_decl {
            let this_ty = Type::Named(this_decl);
            let other_ty = Type::Named(other_decl);
            if catalog.is_assignable(&other_ty, &this_ty) {
                return Ordering::Greater;
            }
            if catalog.is_assignable(&this_ty, &other_ty) {
                return Ordering::Less;
            }
        }
    }

    let mut better = false;
    let mut worse = false;
    let mut identical = true;

    match (this.member.extension_of(), other.member.extension_of()) {
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some((this_class, this_recv)), Some((other_class, other_recv))) => {
            let this_match = namespace_match(this_class, subject_name);
            let other_match = namespace_match(other_class, subject_name);
            match this_match.cmp(&other_match) {
                Ordering::Equal => {}
                decided => return decided,
            }

            let this_param = CandidateParameter::new(this_recv.clone());
            let other_param = CandidateParameter::new(other_recv.clone());
            if this_param != other_param {
                identical = false;
                let receiver = Argument::of_type(target.clone());
                tally(
                    this_param.compare_conversion(catalog, &other_param, &receiver),
                    &mut better,
                    &mut worse,
                );
            }
            for (p, arg) in arguments.iter().enumerate() {
                let (tp, op) = (&this.signature[p], &other.signature[p]);
                if tp != op {
                    identical = false;
                }
                tally(tp.compare_conversion(catalog, op, arg), &mut better, &mut worse);
            }
            if better && !worse {
                return Ordering::Greater;
            }
            if worse && !better {
                return Ordering::Less;
            }
        }
        (None, None) => {
            for (p, arg) in arguments.iter().enumerate() {
                let (tp, op) = (&this.signature[p], &other.signature[p]);
                if tp != op {
                    identical = false;
                }
                match tp.compare_conversion(catalog, op, arg) {
                    Ordering::Less => return Ordering::Less,
                    Ordering::Greater => better = true,
                    Ordering::Equal => {}
                }
            }
            if better {
                return Ordering::Greater;
            }
        }
    }

    if identical {
        match (this.form, other.form) {
            (Form::Normal, Form::Expanded) => return Ordering::Greater,
            (Form::Expanded, Form::Normal) => return Ordering::Less,
            (Form::Expanded, Form::Expanded) => {
                return this
                    .member
                    .parameters()
                    .len()
                    .cmp(&other.member.parameters().len());
            }
            (Form::Normal, Form::Normal) => {}
        }
    }
    Ordering::Equal
}

/// The unique best candidate, or `None` when the best ones tie.
///
/// `subject_name` is the full name of the subject type, used for extension method
/// namespace proximity; `target` is the static type the member is accessed on.
pub(crate) fn find_best_candidate<M: Overloadable>(
    catalog: &TypeCatalog,
    subject_name: &str,
    target: &Type,
    mut candidates: Vec<Candidate<M>>,
    arguments: &[Argument<'_>],
) -> Option<Candidate<M>> {
    if candidates.is_empty() {
        return None;
    }
    let mut best = vec![0usize];
    for i in 1..candidates.len() {
        match compare_member(
            catalog,
            subject_name,
            target,
            &candidates[i],
            &candidates[best[0]],
            arguments,
        ) {
            Ordering::Greater => {
                best.clear();
                best.push(i);
            }
            Ordering::Equal => best.push(i),
            Ordering::Less => {}
        }
    }
    if best.len() == 1 {
        Some(candidates.swap_remove(best[0]))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{lit, Value};

    fn find_best_method(
        catalog: &TypeCatalog,
        subject_name: &str,
        target: &Type,
        methods: &[Arc<MethodDef>],
        types: &[Type],
    ) -> Option<Arc<MethodDef>> {
        let arguments: Vec<Argument<'_>> = types.iter().cloned().map(Argument::of_type).collect();
        let candidates: Vec<_> = methods
            .iter()
            .filter_map(|m| evaluate_candidate(catalog, m, &arguments).ok())
            .collect();
        find_best_candidate(catalog, subject_name, target, candidates, &arguments).map(|c| c.member)
    }

    fn noop(name: &str) -> MethodDef {
        MethodDef::new(name, Type::STRING, |_, _| Ok(Value::Null))
    }

    fn resolve(catalog: &TypeCatalog, methods: &[Arc<MethodDef>], types: &[Type]) -> Option<Arc<MethodDef>> {
        find_best_method(catalog, "Demo.Subject", &Type::OBJECT, methods, types)
    }

    fn int_and_long() -> Vec<Arc<MethodDef>> {
        vec![
            Arc::new(noop("f").param(ParameterDef::new("x", Type::INT32))),
            Arc::new(noop("f").param(ParameterDef::new("x", Type::INT64))),
        ]
    }

    #[test]
    fn exact_match_beats_widening() {
        let c = TypeCatalog::new();
        let methods = int_and_long();
        let best = resolve(&c, &methods, &[Type::INT32]).expect("f(int)");
        assert_eq!(best.params()[0].ty, Type::INT32);
        let best = resolve(&c, &methods, &[Type::INT64]).expect("f(long)");
        assert_eq!(best.params()[0].ty, Type::INT64);
    }

    #[test]
    fn narrower_argument_prefers_closer_widening() {
        let c = TypeCatalog::new();
        let best = resolve(&c, &int_and_long(), &[Type::INT16]).expect("f(int)");
        assert_eq!(best.params()[0].ty, Type::INT32);
    }

    #[test]
    fn signed_target_beats_unsigned() {
        let c = TypeCatalog::new();
        let methods = vec![
            Arc::new(noop("g").param(ParameterDef::new("x", Type::UINT32))),
            Arc::new(noop("g").param(ParameterDef::new("x", Type::INT32))),
        ];
        let best = resolve(&c, &methods, &[Type::UINT16]).expect("g(int)");
        assert_eq!(best.params()[0].ty, Type::INT32);
    }

    #[test]
    fn mixed_conversions_keep_first_visited_overload() {
        let c = TypeCatalog::new();
        let a = Arc::new(
            noop("h")
                .param(ParameterDef::new("x", Type::INT32))
                .param(ParameterDef::new("y", Type::INT64)),
        );
        let b = Arc::new(
            noop("h")
                .param(ParameterDef::new("x", Type::INT64))
                .param(ParameterDef::new("y", Type::INT32)),
        );
        let args = [Type::INT32, Type::INT32];
        // A worse argument disqualifies the challenger outright, so neither order
        // reports an ambiguity and the first candidate wins.
        let first = resolve(&c, &[a.clone(), b.clone()], &args).expect("resolved");
        assert!(Arc::ptr_eq(&first, &a));
        let first = resolve(&c, &[b.clone(), a], &args).expect("resolved");
        assert!(Arc::ptr_eq(&first, &b));
    }

    #[test]
    fn params_array_expansion() {
        let c = TypeCatalog::new();
        let sum = Arc::new(noop("Sum").param(ParameterDef::params("values", Type::INT32)));
        let args = [Argument::of_type(Type::INT32), Argument::of_type(Type::INT16)];
        let cand = evaluate_candidate(&c, &sum, &args).expect("expanded");
        assert!(cand.is_expanded());

        let none = evaluate_candidate(&c, &sum, &[]).expect("zero params");
        assert!(none.is_expanded());

        let whole = [Argument::of_type(Type::array(Type::INT32))];
        let cand = evaluate_candidate(&c, &sum, &whole).expect("normal form");
        assert!(!cand.is_expanded());

        let bad = [Argument::of_type(Type::STRING)];
        assert!(evaluate_candidate(&c, &sum, &bad).is_err());
    }

    #[test]
    fn normal_form_beats_expanded_form() {
        let c = TypeCatalog::new();
        let fixed = Arc::new(noop("k").param(ParameterDef::new("x", Type::INT32)));
        let variadic = Arc::new(noop("k").param(ParameterDef::params("xs", Type::INT32)));
        let best = resolve(&c, &[variadic, fixed.clone()], &[Type::INT32]).expect("fixed");
        assert!(Arc::ptr_eq(&best, &fixed));
    }

    #[test]
    fn direction_must_match() {
        let c = TypeCatalog::new();
        let m = Arc::new(noop("TryGet").param(ParameterDef::out("value", Type::INT32)));
        let plain = lit(1_i32);
        let err = evaluate_candidate(&c, &m, &[Argument::new(&plain, Type::INT32)])
            .expect_err("missing out");
        assert_eq!(err.code(), ErrorCode::MethodDirectionMismatch);

        let target = crate::types::this().field("N").out();
        assert!(evaluate_candidate(&c, &m, &[Argument::new(&target, Type::INT32)]).is_ok());
        let err = evaluate_candidate(&c, &m, &[Argument::new(&target, Type::INT16)])
            .expect_err("out needs exact type");
        assert_eq!(err.code(), ErrorCode::MethodArgumentTypeMismatch);
    }

    #[test]
    fn argument_count_errors() {
        let c = TypeCatalog::new();
        let methods = int_and_long();
        let err = applicable_candidates(&c, &methods, &[], || {
            ValidationError::new("no overload", ErrorCode::MethodOverloadNotFound)
        })
        .expect_err("none apply");
        assert_eq!(err.code(), ErrorCode::MethodOverloadNotFound);

        let err = applicable_candidates(&c, &methods[..1], &[], || {
            ValidationError::new("no overload", ErrorCode::MethodOverloadNotFound)
        })
        .expect_err("single member reports its own error");
        assert_eq!(err.code(), ErrorCode::MethodArgCountMismatch);
    }

    #[test]
    fn derived_declaration_wins() {
        let mut c = TypeCatalog::new();
        let base = c
            .class("Demo.Base")
            .method(noop("m").param(ParameterDef::new("x", Type::INT32)))
            .id();
        let derived = c
            .class("Demo.Derived")
            .base(base)
            .method(noop("m").param(ParameterDef::new("x", Type::INT64)))
            .id();
        let methods = c.methods_named(derived, "m");
        let best = find_best_method(&c, "Demo.Derived", &Type::Named(derived), &methods, &[Type::INT32])
            .expect("derived");
        assert_eq!(best.declaring(), Some(derived));
    }

    #[test]
    fn member_methods_beat_extensions_and_closer_namespaces_win() {
        let c = TypeCatalog::new();
        let member = Arc::new(noop("Describe"));
        let near = Arc::new(MethodDef::extension(
            "Demo.Orders.Ext",
            "Describe",
            Type::OBJECT,
            Type::STRING,
            |_, _| Ok(Value::Null),
        ));
        let far = Arc::new(MethodDef::extension(
            "Other.Ext",
            "Describe",
            Type::OBJECT,
            Type::STRING,
            |_, _| Ok(Value::Null),
        ));
        let subject = "Demo.Orders.Order";
        let best = find_best_method(&c, subject, &Type::OBJECT, &[near.clone(), member.clone()], &[])
            .expect("member");
        assert!(Arc::ptr_eq(&best, &member));
        let best =
            find_best_method(&c, subject, &Type::OBJECT, &[far, near.clone()], &[]).expect("near");
        assert!(Arc::ptr_eq(&best, &near));
    }

    #[test]
    fn identical_signatures_are_ambiguous() {
        let c = TypeCatalog::new();
        let methods = vec![
            Arc::new(noop("d").param(ParameterDef::new("x", Type::INT32))),
            Arc::new(noop("d").param(ParameterDef::new("x", Type::INT32))),
        ];
        assert!(resolve(&c, &methods, &[Type::INT32]).is_none());
    }
}
