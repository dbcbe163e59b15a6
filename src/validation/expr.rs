use std::sync::Arc;

use super::info::{Binding, ExpressionInfo};
use super::RuleValidation;
use crate::conversion::{explicit_conversion_specified, types_are_assignable};
use crate::overload::{applicable_candidates, find_best_candidate, Argument};
use crate::types::{
    Direction, ErrorCode, Expr, ExprKind, Primitive, Type, TypeName, ValidationError,
};

impl RuleValidation {
    pub(super) fn reject_write(&mut self, expr: &Expr) {
        self.add_error(
            ValidationError::new(
                format!("'{expr}' cannot be assigned to"),
                ErrorCode::InvalidAssignTarget,
            )
            .with_expression(expr),
        );
    }

    pub(super) fn validate_node(&mut self, expr: &Expr, is_written: bool) -> Option<ExpressionInfo> {
        match expr.kind() {
            ExprKind::Literal(literal) => {
                if is_written {
                    self.reject_write(expr);
                    return None;
                }
                Some(ExpressionInfo::new(literal.ty()))
            }
            ExprKind::This => {
                if is_written {
                    self.reject_write(expr);
                    return None;
                }
                Some(ExpressionInfo::new(self.this_type.clone()))
            }
            ExprKind::Field { target, name } => self.validate_field(expr, target, name, is_written),
            ExprKind::Property { target, name } => self.validate_property(expr, target, name, is_written),
            ExprKind::Indexer { target, args } => self.validate_indexer(expr, target, args, is_written),
            ExprKind::ArrayIndex { target, indices } => self.validate_array_index(expr, target, indices),
            ExprKind::Binary { left, op, right } => {
                if is_written {
                    self.reject_write(expr);
                }
                self.validate_binary(expr, left, *op, right)
            }
            ExprKind::Invoke {
                target,
                method,
                args,
            } => {
                if is_written {
                    self.reject_write(expr);
                    return None;
                }
                self.validate_invoke(expr, target, method, args)
            }
            ExprKind::Cast { ty, expr: inner } => {
                if is_written {
                    self.reject_write(expr);
                    return None;
                }
                self.validate_cast(expr, ty, inner)
            }
            ExprKind::New { ty, args } => {
                if is_written {
                    self.reject_write(expr);
                    return None;
                }
                self.validate_new(expr, ty, args)
            }
            ExprKind::NewArray {
                element,
                size,
                initializers,
            } => {
                if is_written {
                    self.reject_write(expr);
                    return None;
                }
                self.validate_new_array(expr, element, size.as_deref(), initializers)
            }
            ExprKind::TypeRef(name) => {
                if is_written {
                    self.reject_write(expr);
                    return None;
                }
                self.resolve_type_name(name, expr).map(ExpressionInfo::new)
            }
            ExprKind::Direction {
                direction,
                expr: inner,
            } => self
                .validate_expression(inner, *direction != Direction::In)
                .map(ExpressionInfo::new),
        }
    }

    fn validate_cast(&mut self, expr: &Expr, ty: &TypeName, inner: &Expr) -> Option<ExpressionInfo> {
        let target = self.resolve_type_name(ty, expr);
        let source = self.validate_expression(inner, false);
        let (target, source) = (target?, source?);
        let message = match explicit_conversion_specified(&self.catalog, &source, &target) {
            Ok(true) => return Some(ExpressionInfo::new(target)),
            Ok(false) => format!(
                "cannot cast '{}' to '{}'",
                self.type_name(&source),
                self.type_name(&target)
            ),
            Err(e) => e.message().to_owned(),
        };
        self.add_error(ValidationError::new(message, ErrorCode::NoConversion).with_expression(expr));
        None
    }

    /// Validate call arguments, returning their static types when all are valid.
    pub(super) fn validate_arguments(&mut self, args: &[Expr]) -> Option<Vec<Type>> {
        let mut types = Vec::with_capacity(args.len());
        let mut ok = true;
        for arg in args {
            match self.validate_expression(arg, false) {
                Some(ty) => types.push(ty),
                None => ok = false,
            }
        }
        ok.then_some(types)
    }

    fn validate_new(&mut self, expr: &Expr, ty: &TypeName, args: &[Expr]) -> Option<ExpressionInfo> {
        let created = self.resolve_type_name(ty, expr);
        let arg_types = self.validate_arguments(args);
        let (created, arg_types) = (created?, arg_types?);
        let catalog = Arc::clone(&self.catalog);

        let default_ctor = ExpressionInfo::bound(
            created.clone(),
            Binding::Constructor {
                constructor: None,
                expanded: false,
            },
        );

        let id = match &created {
            Type::Primitive(p) if args.is_empty() && *p != Primitive::Void && *p != Primitive::String => {
                return Some(default_ctor);
            }
            Type::Named(id) if catalog.is_class(&created) || catalog.is_struct(&created) => *id,
            _ => {
                let message = format!("cannot create an instance of '{}'", self.type_name(&created));
                self.add_error(ValidationError::new(message, ErrorCode::CannotCreateType).with_expression(expr));
                return None;
            }
        };

        let all = catalog.constructors(id);
        if args.is_empty() && (catalog.is_struct(&created) || all.is_empty()) {
            return Some(default_ctor);
        }
        let ctors: Vec<_> = all
            .into_iter()
            .filter(|c| self.member_visible(c.declaring(), c.visibility))
            .collect();
        let type_name = self.type_name(&created);
        if ctors.is_empty() {
            self.add_error(
                ValidationError::new(
                    format!("'{type_name}' has no accessible constructor"),
                    ErrorCode::CannotCreateType,
                )
                .with_expression(expr),
            );
            return None;
        }

        let arguments: Vec<Argument<'_>> = args
            .iter()
            .zip(arg_types)
            .map(|(a, t)| Argument::new(a, t))
            .collect();
        let candidates = match applicable_candidates(&catalog, &ctors, &arguments, || {
            ValidationError::new(
                format!("no constructor of '{type_name}' accepts the given arguments"),
                ErrorCode::MethodOverloadNotFound,
            )
        }) {
            Ok(c) => c,
            Err(e) => {
                self.add_error(e.with_expression(expr));
                return None;
            }
        };
        let subject = self.this_name();
        let Some(best) = find_best_candidate(&catalog, &subject, &created, candidates, &arguments) else {
            self.add_error(
                ValidationError::new(
                    format!("constructor call for '{type_name}' is ambiguous"),
                    ErrorCode::CannotResolveMember,
                )
                .with_expression(expr),
            );
            return None;
        };
        if !self.check_access(best.member.declaring(), best.member.visibility, ".ctor", expr) {
            return None;
        }
        let expanded = best.is_expanded();
        Some(ExpressionInfo::bound(
            created,
            Binding::Constructor {
                constructor: Some(best.member),
                expanded,
            },
        ))
    }

    fn validate_new_array(
        &mut self,
        expr: &Expr,
        element: &TypeName,
        size: Option<&Expr>,
        initializers: &[Expr],
    ) -> Option<ExpressionInfo> {
        let element = self.resolve_type_name(element, expr)?;
        let mut ok = true;

        if let Some(size) = size {
            match self.validate_expression(size, false) {
                Some(ty) if ty.primitive().is_some_and(Primitive::is_integral) => {
                    if let ExprKind::Literal(l) = size.kind() {
                        let negative = l.to_value().as_integer().is_some_and(|n| n < 0);
                        let mismatched = !initializers.is_empty()
                            && l.to_value().as_integer() != i128::try_from(initializers.len()).ok();
                        if negative || mismatched {
                            ok = false;
                            self.add_error(
                                ValidationError::new(
                                    format!(
                                        "array size {size} does not match {} initializer(s)",
                                        initializers.len()
                                    ),
                                    ErrorCode::ArraySizeInvalid,
                                )
                                .with_expression(expr),
                            );
                        }
                    }
                }
                Some(ty) => {
                    ok = false;
                    let message = format!("array size must be integral, found '{}'", self.type_name(&ty));
                    self.add_error(ValidationError::new(message, ErrorCode::ArraySizeInvalid).with_expression(expr));
                }
                None => ok = false,
            }
        }

        for init in initializers {
            let Some(ty) = self.validate_expression(init, false) else {
                ok = false;
                continue;
            };
            match types_are_assignable(&self.catalog, &ty, &element, Some(init)) {
                Ok(true) => {}
                Ok(false) => {
                    ok = false;
                    let message = format!(
                        "array initializer of type '{}' cannot be stored in '{}'",
                        self.type_name(&ty),
                        self.type_name(&element)
                    );
                    self.add_error(
                        ValidationError::new(message, ErrorCode::OperandTypesIncompatible).with_expression(init),
                    );
                }
                Err(e) => {
                    ok = false;
                    self.add_error(e.with_expression(init));
                }
            }
        }

        ok.then(|| ExpressionInfo::new(Type::array(element)))
    }
}
