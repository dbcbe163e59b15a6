//! Symbolic read/write analysis of validated expressions.
//!
//! Paths are `/`-separated and rooted at `this`. Every member segment is followed
//! by `/`, and a trailing `*` stands for the location and everything below it:
//! `this.Order.Total` reads `this/Order/Total/`, while passing `ref this.Order`
//! to a method reads `this/Order/*`.

use std::collections::HashSet;

use indexmap::IndexSet;

use crate::types::{Direction, Expr, ExprKind, MemberEffect, MethodDef, Statement, TypeId};
use crate::validation::{Binding, RuleValidation};

const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Reads,
    Writes,
}

struct Analysis<'a> {
    validation: &'a RuleValidation,
    mode: Mode,
    symbols: IndexSet<String>,
}

impl<'a> Analysis<'a> {
    fn new(validation: &'a RuleValidation, mode: Mode) -> Self {
        Analysis {
            validation,
            mode,
            symbols: IndexSet::new(),
        }
    }

    fn into_symbols(self) -> Vec<String> {
        self.symbols.into_iter().collect()
    }

    fn wanted(&self, read: bool, written: bool) -> bool {
        match self.mode {
            Mode::Reads => read,
            Mode::Writes => written,
        }
    }

    fn add_this(&mut self, qualifier: &[String]) {
        let mut path = String::from("this/");
        for segment in qualifier {
            path.push_str(segment);
            if segment == WILDCARD {
                // nothing below a wildcard is more specific
                break;
            }
            path.push('/');
        }
        self.symbols.insert(path);
    }

    fn walk(&mut self, expr: &Expr, read: bool, written: bool, qualifier: &[String]) {
        match expr.kind() {
            ExprKind::This => {
                if self.wanted(read, written) {
                    self.add_this(qualifier);
                }
            }
            ExprKind::Literal(_) | ExprKind::TypeRef(_) => {}
            ExprKind::Field { target, name } => {
                self.walk(target, read, written, &qualify(name, qualifier));
            }
            ExprKind::Property { target, name } => {
                let property = match self.validation.expression_info(expr).map(|i| i.binding()) {
                    Some(Binding::Property(p)) => Some(p.clone()),
                    _ => None,
                };
                match property {
                    Some(p) if !p.effects().is_empty() => {
                        self.apply_effects(target, p.effects(), p.declaring(), qualifier, &mut HashSet::new());
                    }
                    _ => self.walk(target, read, written, &qualify(name, qualifier)),
                }
            }
            ExprKind::Indexer { target, args } => {
                let property = match self.validation.expression_info(expr).map(|i| i.binding()) {
                    Some(Binding::Indexer { property, .. }) => Some(property.clone()),
                    _ => None,
                };
                match property {
                    Some(p) if !p.effects().is_empty() => {
                        self.apply_effects(target, p.effects(), p.declaring(), qualifier, &mut HashSet::new());
                    }
                    _ => self.walk(target, read, written, qualifier),
                }
                self.read_all(args);
            }
            ExprKind::ArrayIndex { target, indices } => {
                self.walk(target, read, written, qualifier);
                self.read_all(indices);
            }
            ExprKind::Binary { left, right, .. } => {
                self.walk(left, true, false, &[]);
                self.walk(right, true, false, &[]);
            }
            ExprKind::Invoke { target, args, .. } => {
                let method = match self.validation.expression_info(expr).map(|i| i.binding()) {
                    Some(Binding::Method { method, .. }) => Some(method.clone()),
                    _ => None,
                };
                match method {
                    Some(m) if !m.effects().is_empty() => {
                        let declaring = m.declaring();
                        let mut visited = HashSet::from([m.name().to_owned()]);
                        match declaring {
                            Some(id) => self.apply_effects(target, m.effects(), id, &[], &mut visited),
                            None => self.walk(target, true, false, &[]),
                        }
                    }
                    // the call uses the target's value, nothing beneath it
                    _ => self.walk(target, true, false, &[]),
                }
                self.read_all(args);
            }
            ExprKind::Direction { direction, expr } => {
                let wildcard = [WILDCARD.to_owned()];
                let (read, written, qualifier): (bool, bool, &[String]) = match direction {
                    Direction::Out => (false, true, &[]),
                    Direction::Ref if self.mode == Mode::Writes => (true, true, &[]),
                    Direction::Ref => (true, true, &wildcard),
                    Direction::In => (true, false, &wildcard),
                };
                self.walk(expr, read, written, qualifier);
            }
            ExprKind::Cast { expr, .. } => self.walk(expr, true, false, &[]),
            ExprKind::New { args, .. } => self.read_all(args),
            ExprKind::NewArray {
                size, initializers, ..
            } => {
                if let Some(size) = size {
                    self.walk(size, true, false, &[]);
                }
                self.read_all(initializers);
            }
        }
    }

    fn read_all(&mut self, exprs: &[Expr]) {
        for e in exprs {
            self.walk(e, true, false, &[]);
        }
    }

    /// Replace the default analysis of a member with its declared effects.
    ///
    /// Effect paths are relative to `target`. A path not ending in `*` is
    /// further qualified by whatever the member access itself was qualified with.
    fn apply_effects(
        &mut self,
        target: &Expr,
        effects: &[MemberEffect],
        declaring: TypeId,
        qualifier: &[String],
        visited: &mut HashSet<String>,
    ) {
        for effect in effects {
            match effect {
                MemberEffect::Reads(path) if self.mode == Mode::Reads => {
                    let q = effect_qualifier(path, qualifier);
                    self.walk(target, true, false, &q);
                }
                MemberEffect::Writes(path) if self.mode == Mode::Writes => {
                    let q = effect_qualifier(path, qualifier);
                    self.walk(target, false, true, &q);
                }
                MemberEffect::Invokes(name) => {
                    if !visited.insert(name.clone()) {
                        continue;
                    }
                    let methods: Vec<_> = self.validation.catalog().methods_named(declaring, name);
                    for method in methods {
                        self.apply_method(target, &method, declaring, visited);
                    }
                }
                MemberEffect::Reads(_) | MemberEffect::Writes(_) => {}
            }
        }
    }

    fn apply_method(&mut self, target: &Expr, method: &MethodDef, declaring: TypeId, visited: &mut HashSet<String>) {
        if method.effects().is_empty() {
            self.walk(target, true, false, &[]);
        } else {
            let declaring = method.declaring().unwrap_or(declaring);
            self.apply_effects(target, method.effects(), declaring, &[], visited);
        }
    }
}

fn qualify(name: &str, qualifier: &[String]) -> Vec<String> {
    std::iter::once(name.to_owned())
        .chain(qualifier.iter().cloned())
        .collect()
}

fn effect_qualifier(path: &str, outer: &[String]) -> Vec<String> {
    let mut segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    if segments.last().map(String::as_str) != Some(WILDCARD) {
        segments.extend(outer.iter().cloned());
    }
    segments
}

/// Paths read by a condition expression.
#[must_use]
pub fn expression_dependencies(validation: &RuleValidation, expr: &Expr) -> Vec<String> {
    let mut analysis = Analysis::new(validation, Mode::Reads);
    analysis.walk(expr, true, false, &[]);
    analysis.into_symbols()
}

/// Paths written by a statement: assignment targets, `out`/`ref` arguments and
/// declared member writes.
#[must_use]
pub fn statement_side_effects(validation: &RuleValidation, statement: &Statement) -> Vec<String> {
    let mut analysis = Analysis::new(validation, Mode::Writes);
    match statement {
        Statement::Expression(e) => analysis.walk(e, false, false, &[]),
        Statement::Assign { left, right } => {
            analysis.walk(left, false, true, &[]);
            analysis.walk(right, true, false, &[]);
        }
    }
    analysis.into_symbols()
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Normalize an update path to the analyzer's form.
///
/// Accepts `/` or `.` separators and an optional leading `this`, so `Total`,
/// `this/Total` and `this.Total` all become `this/Total/`. A final `*` is kept
/// without a trailing separator. Returns `None` for anything else.
#[must_use]
pub fn normalize_update_path(path: &str) -> Option<String> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    let segments: Vec<&str> = path.split(['/', '.']).collect();
    let rest = match segments.split_first() {
        Some((&"this", rest)) => rest,
        _ => &segments[..],
    };
    // tolerate a single trailing separator, as in `this/Total/`
    let rest = match rest.split_last() {
        Some((&"", init)) if !init.is_empty() => init,
        _ => rest,
    };

    let mut normalized = String::from("this/");
    for (i, segment) in rest.iter().enumerate() {
        if *segment == WILDCARD && i + 1 == rest.len() {
            normalized.push_str(WILDCARD);
        } else if is_identifier(segment) {
            normalized.push_str(segment);
            normalized.push('/');
        } else {
            return None;
        }
    }
    Some(normalized)
}

/// Whether writing `side_effect` may change what reading `dependency` observes.
///
/// With a wildcard on either side the paths match when one is a prefix of the
/// other. Otherwise the write must be a prefix of, or equal to, the read.
#[must_use]
pub fn paths_match(side_effect: &str, dependency: &str) -> bool {
    let (effect, effect_wild) = strip_wildcard(side_effect);
    let (dep, dep_wild) = strip_wildcard(dependency);
    if effect_wild || dep_wild {
        effect.starts_with(dep) || dep.starts_with(effect)
    } else {
        dep.starts_with(effect)
    }
}

fn strip_wildcard(path: &str) -> (&str, bool) {
    match path.strip_suffix(WILDCARD) {
        Some(stripped) => (stripped, true),
        None => (path, false),
    }
}

/// Whether any path in `side_effects` matches any path in `dependencies`.
#[must_use]
pub fn intersects(side_effects: &[String], dependencies: &[String]) -> bool {
    side_effects
        .iter()
        .any(|s| dependencies.iter().any(|d| paths_match(s, d)))
}
