//! Source-like rendering of expression trees.

use std::fmt::Write;

use bigdecimal::Zero;

use crate::types::{BinaryOp, Direction, Expr, ExprKind, Literal};

/// Position of a node relative to its parent, used for parenthesization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
    None,
    Binary { op: BinaryOp, right: bool },
    /// Operand of a cast or a prefix operator.
    Unary,
    /// Target of member access, invocation or indexing.
    Primary,
}

const UNARY: u8 = 20;
const PRIMARY: u8 = 30;

impl Parent {
    fn precedence(self) -> Option<u8> {
        match self {
            Parent::None => None,
            Parent::Binary { op, .. } => Some(op.precedence()),
            Parent::Unary => Some(UNARY),
            Parent::Primary => Some(PRIMARY),
        }
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr.kind() {
        ExprKind::Binary { op, .. } => op.precedence(),
        ExprKind::Cast { .. } | ExprKind::New { .. } | ExprKind::NewArray { .. } => UNARY,
        _ => PRIMARY,
    }
}

fn must_parenthesize(child: u8, parent: Parent) -> bool {
    match parent.precedence() {
        None => false,
        Some(p) if child < p => true,
        Some(p) if child == p => matches!(parent, Parent::Binary { right: true, .. }),
        Some(_) => false,
    }
}

/// Render an expression as source text.
///
/// Parentheses are added only where operator precedence requires them; a child of
/// equal precedence is parenthesized only when it is the right operand.
///
/// ```
/// use rulechain::{decompile, lit};
///
/// let e = lit(2_i32).sub(lit(3_i32).sub(4_i32));
/// assert_eq!(decompile(&e), "2 - (3 - 4)");
/// ```
#[must_use]
pub fn decompile(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, Parent::None);
    out
}

fn write_expr(out: &mut String, expr: &Expr, parent: Parent) {
    match expr.kind() {
        ExprKind::Literal(lit) => write_literal(out, lit),
        ExprKind::This => out.push_str("this"),
        ExprKind::Field { target, name } | ExprKind::Property { target, name } => {
            write_expr(out, target, Parent::Primary);
            out.push('.');
            out.push_str(name);
        }
        ExprKind::Indexer { target, args } => {
            write_expr(out, target, Parent::Primary);
            out.push('[');
            write_list(out, args);
            out.push(']');
        }
        ExprKind::ArrayIndex { target, indices } => {
            write_expr(out, target, Parent::Primary);
            out.push('[');
            write_list(out, indices);
            out.push(']');
        }
        ExprKind::Invoke {
            target,
            method,
            args,
        } => {
            write_expr(out, target, Parent::Primary);
            out.push('.');
            out.push_str(method);
            out.push('(');
            write_list(out, args);
            out.push(')');
        }
        ExprKind::Binary { left, op, right } => write_binary(out, expr, left, *op, right, parent),
        ExprKind::Cast { ty, expr: inner } => {
            let paren = must_parenthesize(UNARY, parent);
            open(out, paren);
            let _ = write!(out, "({ty})");
            write_expr(out, inner, Parent::Unary);
            close(out, paren);
        }
        ExprKind::New { ty, args } => {
            let paren = must_parenthesize(UNARY, parent);
            open(out, paren);
            let _ = write!(out, "new {ty}(");
            write_list(out, args);
            out.push(')');
            close(out, paren);
        }
        ExprKind::NewArray {
            element,
            size,
            initializers,
        } => {
            let paren = must_parenthesize(UNARY, parent);
            open(out, paren);
            let _ = write!(out, "new {element}[");
            if let Some(size) = size {
                write_expr(out, size, Parent::None);
            }
            out.push(']');
            if !initializers.is_empty() || size.is_none() {
                out.push_str(" { ");
                write_list(out, initializers);
                out.push_str(" }");
            }
            close(out, paren);
        }
        ExprKind::TypeRef(ty) => {
            let _ = write!(out, "{ty}");
        }
        ExprKind::Direction { direction, expr } => {
            match direction {
                Direction::Out => out.push_str("out "),
                Direction::Ref => out.push_str("ref "),
                Direction::In => {}
            }
            write_expr(out, expr, Parent::None);
        }
    }
}

fn write_binary(out: &mut String, node: &Expr, left: &Expr, op: BinaryOp, right: &Expr, parent: Parent) {
    let mut op_text = op.symbol();
    let (mut left, mut right) = (left, right);

    if op == BinaryOp::ValueEquality && matches!(right.kind(), ExprKind::Literal(Literal::Bool(false))) {
        match left.kind() {
            ExprKind::Binary {
                left: inner_left,
                op: BinaryOp::ValueEquality,
                right: inner_right,
            } => {
                op_text = "!=";
                left = &**inner_left;
                right = &**inner_right;
            }
            _ => {
                let paren = must_parenthesize(precedence(left), parent);
                open(out, paren);
                out.push('!');
                write_expr(out, left, Parent::Unary);
                close(out, paren);
                return;
            }
        }
    } else if op == BinaryOp::Subtract && is_zero_literal(left) {
        let paren = must_parenthesize(precedence(right), parent);
        open(out, paren);
        out.push('-');
        write_expr(out, right, Parent::Unary);
        close(out, paren);
        return;
    }

    let paren = must_parenthesize(precedence(node), parent);
    open(out, paren);
    write_expr(out, left, Parent::Binary { op, right: false });
    let _ = write!(out, " {op_text} ");
    write_expr(out, right, Parent::Binary { op, right: true });
    close(out, paren);
}

fn is_zero_literal(expr: &Expr) -> bool {
    match expr.kind() {
        ExprKind::Literal(Literal::Int32(v)) => *v == 0,
        ExprKind::Literal(Literal::Int64(v)) => *v == 0,
        ExprKind::Literal(Literal::Single(v)) => *v == 0.0,
        ExprKind::Literal(Literal::Double(v)) => *v == 0.0,
        ExprKind::Literal(Literal::Decimal(v)) => v.is_zero(),
        _ => false,
    }
}

fn open(out: &mut String, paren: bool) {
    if paren {
        out.push('(');
    }
}

fn close(out: &mut String, paren: bool) {
    if paren {
        out.push(')');
    }
}

fn write_list(out: &mut String, items: &[Expr]) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, item, Parent::None);
    }
}

fn write_literal(out: &mut String, lit: &Literal) {
    let _ = match lit {
        Literal::Null => write!(out, "null"),
        Literal::Bool(v) => write!(out, "{v}"),
        Literal::Char(c) => {
            out.push('\'');
            escape_char(out, *c, '\'');
            out.push('\'');
            Ok(())
        }
        Literal::String(s) => {
            out.push('"');
            for c in s.chars() {
                escape_char(out, c, '"');
            }
            out.push('"');
            Ok(())
        }
        Literal::SByte(v) => write!(out, "(sbyte){v}"),
        Literal::Byte(v) => write!(out, "(byte){v}"),
        Literal::Int16(v) => write!(out, "(short){v}"),
        Literal::UInt16(v) => write!(out, "(ushort){v}"),
        Literal::Int32(v) => write!(out, "{v}"),
        Literal::UInt32(v) => write!(out, "{v}U"),
        Literal::Int64(v) => write!(out, "{v}L"),
        Literal::UInt64(v) => write!(out, "{v}UL"),
        Literal::Single(v) => write!(out, "{v}f"),
        Literal::Double(v) => {
            let text = v.to_string();
            if v.is_finite() && !text.contains(['.', 'e', 'E']) {
                write!(out, "{text}.0")
            } else {
                write!(out, "{text}")
            }
        }
        Literal::Decimal(v) => write!(out, "{v}m"),
    };
}

fn escape_char(out: &mut String, c: char, quote: char) {
    match c {
        '\\' => out.push_str("\\\\"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '\0' => out.push_str("\\0"),
        c if c == quote => {
            out.push('\\');
            out.push(c);
        }
        c if c.is_control() => {
            let _ = write!(out, "\\u{:04x}", u32::from(c));
        }
        c => out.push(c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{lit, null, this, type_ref, TypeName};

    #[test]
    fn right_nested_subtraction_is_parenthesized() {
        let e = lit(2_i32).sub(lit(3_i32).sub(4_i32));
        assert_eq!(decompile(&e), "2 - (3 - 4)");
    }

    #[test]
    fn left_nested_subtraction_is_not_parenthesized() {
        let e = lit(2_i32).sub(3_i32).sub(4_i32);
        assert_eq!(decompile(&e), "2 - 3 - 4");
    }

    #[test]
    fn lower_precedence_child_is_parenthesized() {
        let e = lit(1_i32).add(2_i32).mul(3_i32);
        assert_eq!(decompile(&e), "(1 + 2) * 3");
        let e = lit(1_i32).add(lit(2_i32).mul(3_i32));
        assert_eq!(decompile(&e), "1 + 2 * 3");
    }

    #[test]
    fn boolean_operators_nest() {
        let a = this().field("A");
        let b = this().field("B");
        let c = this().field("C");
        let e = a.clone().or(b.clone()).and(c.clone());
        assert_eq!(decompile(&e), "(this.A || this.B) && this.C");
        let e = a.and(b).or(c);
        assert_eq!(decompile(&e), "this.A && this.B || this.C");
    }

    #[test]
    fn equality_with_false_prints_as_not() {
        let e = !this().field("Done");
        assert_eq!(decompile(&e), "!this.Done");
        let e = !this().field("A").and(this().field("B"));
        assert_eq!(decompile(&e), "!(this.A && this.B)");
    }

    #[test]
    fn negated_equality_prints_as_not_equal() {
        let e = this().field("Count").neq(0_i32);
        assert_eq!(decompile(&e), "this.Count != 0");
    }

    #[test]
    fn zero_minus_prints_as_negation() {
        let e = lit(0_i32).sub(this().field("X"));
        assert_eq!(decompile(&e), "-this.X");
        let e = lit(0_i32).sub(this().field("X").add(1_i32));
        assert_eq!(decompile(&e), "-(this.X + 1)");
    }

    #[test]
    fn literals_carry_suffixes() {
        assert_eq!(decompile(&lit(5_i64)), "5L");
        assert_eq!(decompile(&lit(5_u32)), "5U");
        assert_eq!(decompile(&lit(5_u64)), "5UL");
        assert_eq!(decompile(&lit(2.0_f64)), "2.0");
        assert_eq!(decompile(&lit(1.5_f32)), "1.5f");
        assert_eq!(decompile(&lit("a\"b")), "\"a\\\"b\"");
        assert_eq!(decompile(&lit('x')), "'x'");
        assert_eq!(decompile(&null()), "null");
    }

    #[test]
    fn cast_and_member_access() {
        let e = this().field("Ratio").cast("int");
        assert_eq!(decompile(&e), "(int)this.Ratio");
        let e = this().field("A").add(1_i32).cast("long");
        assert_eq!(decompile(&e), "(long)(this.A + 1)");
        let e = this().field("Obj").cast("Demo.Item").prop("Name");
        assert_eq!(decompile(&e), "((Demo.Item)this.Obj).Name");
    }

    #[test]
    fn invocation_indexing_and_creation() {
        let e = type_ref("System.Math").call("Max", vec![lit(1_i32), this().field("X")]);
        assert_eq!(decompile(&e), "System.Math.Max(1, this.X)");
        let e = this().field("Grid").at(vec![lit(1_i32), lit(2_i32)]);
        assert_eq!(decompile(&e), "this.Grid[1, 2]");
        let e = crate::types::new_object("Demo.Point", vec![lit(1_i32), lit(2_i32)]);
        assert_eq!(decompile(&e), "new Demo.Point(1, 2)");
        let e = crate::types::array_of(TypeName::new("int"), vec![lit(1_i32), lit(2_i32)]);
        assert_eq!(decompile(&e), "new int[] { 1, 2 }");
        let e = this().call("TryGet", vec![this().field("Out").out()]);
        assert_eq!(decompile(&e), "this.TryGet(out this.Out)");
    }
}
