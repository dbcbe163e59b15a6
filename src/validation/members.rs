use std::sync::Arc;

use super::info::{Binding, ExpressionInfo};
use super::RuleValidation;
use crate::conversion::implicit_conversion;
use crate::overload::{applicable_candidates, find_best_candidate, Argument};
use crate::types::{Direction, ErrorCode, Expr, ExprKind, MethodDef, Type, TypeId, ValidationError};

fn static_mismatch(name: &str, member_is_static: bool) -> ValidationError {
    if member_is_static {
        ValidationError::new(
            format!("'{name}' is static and must be accessed through its type"),
            ErrorCode::StaticMember,
        )
    } else {
        ValidationError::new(
            format!("'{name}' is an instance member and requires an object reference"),
            ErrorCode::NonStaticMember,
        )
    }
}

impl RuleValidation {
    /// Validate a member access target: its type and whether it names a type.
    fn member_target(&mut self, expr: &Expr, target: &Expr) -> Option<(Type, bool)> {
        let ty = self.validate_expression(target, false)?;
        if ty == Type::Null {
            self.add_error(
                ValidationError::new("cannot access a member of null", ErrorCode::NullTarget)
                    .with_expression(expr),
            );
            return None;
        }
        Some((ty, matches!(target.kind(), ExprKind::TypeRef(_))))
    }

    fn unknown_member(&mut self, expr: &Expr, ty: &Type, kind: &str, name: &str) {
        let message = format!("type '{}' has no {kind} named '{name}'", self.type_name(ty));
        self.add_error(ValidationError::new(message, ErrorCode::UnknownFieldOrProperty).with_expression(expr));
    }

    pub(super) fn validate_field(
        &mut self,
        expr: &Expr,
        target: &Expr,
        name: &str,
        is_written: bool,
    ) -> Option<ExpressionInfo> {
        let (ty, through_type) = self.member_target(expr, target)?;
        let field = ty
            .named()
            .and_then(|id| self.catalog.find_field(id, name))
            .filter(|f| self.member_visible(f.declaring(), f.get_visibility()));
        let Some(field) = field else {
            self.unknown_member(expr, &ty, "field", name);
            return None;
        };
        if through_type != field.is_static() {
            self.add_error(static_mismatch(name, field.is_static()).with_expression(expr));
            return None;
        }
        if !self.check_access(field.declaring(), field.get_visibility(), name, expr) {
            return None;
        }
        if is_written && field.is_read_only() {
            self.add_error(
                ValidationError::new(format!("field '{name}' is read-only"), ErrorCode::CannotWriteMember)
                    .with_expression(expr),
            );
            return None;
        }
        Some(ExpressionInfo::bound(field.ty().clone(), Binding::Field(field)))
    }

    pub(super) fn validate_property(
        &mut self,
        expr: &Expr,
        target: &Expr,
        name: &str,
        is_written: bool,
    ) -> Option<ExpressionInfo> {
        let (ty, through_type) = self.member_target(expr, target)?;

        let has_length = ty == Type::STRING || matches!(ty, Type::Array { .. });
        if name == "Length" && has_length && !through_type {
            if is_written {
                self.add_error(
                    ValidationError::new("'Length' cannot be assigned to", ErrorCode::CannotWriteMember)
                        .with_expression(expr),
                );
                return None;
            }
            return Some(ExpressionInfo::bound(Type::INT32, Binding::Length));
        }

        let property = ty
            .named()
            .and_then(|id| self.catalog.find_property(id, name))
            .filter(|p| self.member_visible(p.declaring(), p.get_visibility));
        let Some(property) = property else {
            self.unknown_member(expr, &ty, "property", name);
            return None;
        };
        if through_type != property.is_static() {
            self.add_error(static_mismatch(name, property.is_static()).with_expression(expr));
            return None;
        }
        if !self.check_access(property.declaring(), property.get_visibility, name, expr) {
            return None;
        }
        if !self.check_accessors(expr, property.name(), property.can_read(), property.can_write(), is_written) {
            return None;
        }
        if is_written && !self.check_access(property.declaring(), property.set_visibility, name, expr) {
            return None;
        }
        self.authorize(property.ty(), expr);
        Some(ExpressionInfo::bound(property.ty().clone(), Binding::Property(property)))
    }

    fn check_accessors(&mut self, expr: &Expr, name: &str, can_read: bool, can_write: bool, is_written: bool) -> bool {
        if is_written && !can_write {
            self.add_error(
                ValidationError::new(format!("property '{name}' has no setter"), ErrorCode::CannotWriteMember)
                    .with_expression(expr),
            );
            return false;
        }
        if !is_written && !can_read {
            self.add_error(
                ValidationError::new(format!("property '{name}' has no getter"), ErrorCode::CannotReadMember)
                    .with_expression(expr),
            );
            return false;
        }
        true
    }

    pub(super) fn validate_indexer(
        &mut self,
        expr: &Expr,
        target: &Expr,
        args: &[Expr],
        is_written: bool,
    ) -> Option<ExpressionInfo> {
        let target_info = self.member_target(expr, target);
        let arg_types = self.validate_arguments(args);
        let ((ty, through_type), arg_types) = (target_info?, arg_types?);

        if args.iter().any(|a| matches!(a.kind(), ExprKind::Direction { direction, .. } if *direction != Direction::In)) {
            self.add_error(
                ValidationError::new(
                    "indexer arguments cannot be passed by ref or out",
                    ErrorCode::IndexerArgCannotBeRefOrOut,
                )
                .with_expression(expr),
            );
            return None;
        }

        let catalog = Arc::clone(&self.catalog);
        let type_name = self.type_name(&ty);
        let indexers: Vec<_> = ty
            .named()
            .map(|id| catalog.indexers(id))
            .unwrap_or_default()
            .into_iter()
            .filter(|p| p.is_static() == through_type && self.member_visible(p.declaring(), p.get_visibility))
            .collect();
        if indexers.is_empty() {
            self.add_error(
                ValidationError::new(format!("type '{type_name}' has no indexer"), ErrorCode::IndexerNotFound)
                    .with_expression(expr),
            );
            return None;
        }

        let arguments: Vec<Argument<'_>> = args
            .iter()
            .zip(arg_types)
            .map(|(a, t)| Argument::new(a, t))
            .collect();
        let candidates = match applicable_candidates(&catalog, &indexers, &arguments, || {
            ValidationError::new(
                format!("no indexer of '{type_name}' accepts the given arguments"),
                ErrorCode::IndexerNotFound,
            )
        }) {
            Ok(c) => c,
            Err(e) => {
                self.add_error(e.with_expression(expr));
                return None;
            }
        };
        let subject = self.this_name();
        let Some(best) = find_best_candidate(&catalog, &subject, &ty, candidates, &arguments) else {
            self.add_error(
                ValidationError::new(
                    format!("indexer access on '{type_name}' is ambiguous"),
                    ErrorCode::CannotResolveMember,
                )
                .with_expression(expr),
            );
            return None;
        };
        let expanded = best.is_expanded();
        let property = best.member;
        if !self.check_access(property.declaring(), property.get_visibility, "this[]", expr)
            || !self.check_accessors(expr, "this[]", property.can_read(), property.can_write(), is_written)
        {
            return None;
        }
        if is_written && !self.check_access(property.declaring(), property.set_visibility, "this[]", expr) {
            return None;
        }
        self.authorize(property.ty(), expr);
        Some(ExpressionInfo::bound(
            property.ty().clone(),
            Binding::Indexer { property, expanded },
        ))
    }

    pub(super) fn validate_array_index(
        &mut self,
        expr: &Expr,
        target: &Expr,
        indices: &[Expr],
    ) -> Option<ExpressionInfo> {
        let target_ty = self.validate_expression(target, false);
        let index_types = self.validate_arguments(indices);
        let (target_ty, index_types) = (target_ty?, index_types?);

        let Type::Array { element, rank } = &target_ty else {
            let message = format!("cannot index into a value of type '{}'", self.type_name(&target_ty));
            self.add_error(ValidationError::new(message, ErrorCode::IndexerNotFound).with_expression(expr));
            return None;
        };
        if indices.len() != *rank {
            self.add_error(
                ValidationError::new(
                    format!("array of rank {rank} indexed with {} index(es)", indices.len()),
                    ErrorCode::ArrayIndexBadRank,
                )
                .with_expression(expr),
            );
            return None;
        }

        let mut ok = true;
        for (index, ty) in indices.iter().zip(&index_types) {
            if matches!(index.kind(), ExprKind::Direction { .. }) {
                ok = false;
                self.add_error(
                    ValidationError::new(
                        "array indices cannot be passed by ref or out",
                        ErrorCode::IndexerArgCannotBeRefOrOut,
                    )
                    .with_expression(index),
                );
                continue;
            }
            let integral = implicit_conversion(&self.catalog, ty, &Type::INT32)
                || implicit_conversion(&self.catalog, ty, &Type::INT64);
            if !integral {
                ok = false;
                let message = format!("array index must be an integer, found '{}'", self.type_name(ty));
                self.add_error(ValidationError::new(message, ErrorCode::ArrayIndexBadType).with_expression(index));
            }
        }
        ok.then(|| ExpressionInfo::new(element.as_ref().clone()))
    }

    fn methods_for(&self, id: TypeId, name: &str) -> Vec<Arc<MethodDef>> {
        let mut methods = self.catalog.methods_named(id, name);
        if self.catalog.is_interface(&Type::Named(id)) {
            for base in self.catalog.all_interfaces(id) {
                methods.extend(self.catalog.methods_named(base, name));
            }
        }
        methods
    }

    pub(super) fn validate_invoke(
        &mut self,
        expr: &Expr,
        target: &Expr,
        name: &str,
        args: &[Expr],
    ) -> Option<ExpressionInfo> {
        let target_info = self.member_target(expr, target);
        let arg_types = self.validate_arguments(args);
        let ((ty, through_type), arg_types) = (target_info?, arg_types?);
        let catalog = Arc::clone(&self.catalog);

        let visible: Vec<_> = ty
            .named()
            .map(|id| self.methods_for(id, name))
            .unwrap_or_default()
            .into_iter()
            .filter(|m| m.declaring().map_or(true, |d| self.member_visible(d, m.get_visibility())))
            .collect();
        let (mut members, other): (Vec<_>, Vec<_>) =
            visible.into_iter().partition(|m| m.is_static() == through_type);

        if !through_type {
            for ext in catalog.extensions_named(name) {
                let applies = ext
                    .receiver()
                    .is_some_and(|receiver| implicit_conversion(&catalog, &ty, receiver));
                if applies && !members.iter().any(|m| Arc::ptr_eq(m, &ext)) {
                    members.push(ext);
                }
            }
        }

        let type_name = self.type_name(&ty);
        if members.is_empty() {
            let error = match other.first() {
                Some(m) => static_mismatch(name, m.is_static()),
                None => ValidationError::new(
                    format!("type '{type_name}' has no method named '{name}'"),
                    ErrorCode::MethodNotExists,
                ),
            };
            self.add_error(error.with_expression(expr));
            return None;
        }

        let arguments: Vec<Argument<'_>> = args
            .iter()
            .zip(arg_types)
            .map(|(a, t)| Argument::new(a, t))
            .collect();
        let candidates = match applicable_candidates(&catalog, &members, &arguments, || {
            ValidationError::new(
                format!("no overload of '{type_name}.{name}' matches the argument list"),
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
        let Some(best) = find_best_candidate(&catalog, &subject, &ty, candidates, &arguments) else {
            self.add_error(
                ValidationError::new(
                    format!("call to '{type_name}.{name}' is ambiguous"),
                    ErrorCode::CannotResolveMember,
                )
                .with_expression(expr),
            );
            return None;
        };
        let expanded = best.is_expanded();
        let method = best.member;
        if let Some(declaring) = method.declaring() {
            if !self.check_access(declaring, method.get_visibility(), name, expr) {
                return None;
            }
        }
        self.authorize(method.return_type(), expr);
        Some(ExpressionInfo::bound(
            method.return_type().clone(),
            Binding::Method { method, expanded },
        ))
    }
}
