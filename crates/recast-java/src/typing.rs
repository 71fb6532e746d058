// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Static types of expressions.
//!
//! Returned type references are views for inspection and keep the node ids
//! of the declarations they come from; renumber them before inserting them
//! into the tree.

use crate::ast::{BinaryOp, Expr, ExprKind, Literal, NodeId, TypeRef, UnaryOp};
use crate::model::{DeclId, Program};

fn primitive(name: &str) -> TypeRef {
    TypeRef {
        id: NodeId(0),
        name: name.to_string(),
        decl: None,
        args: Vec::new(),
        bound: None,
        dims: 0,
    }
}

const NUMERIC_WIDTH: &[&str] = &["byte", "short", "char", "int", "long", "float", "double"];

fn wider(a: TypeRef, b: TypeRef) -> TypeRef {
    let rank = |t: &TypeRef| NUMERIC_WIDTH.iter().position(|n| *n == t.name);
    match (rank(&a), rank(&b)) {
        (Some(x), Some(y)) if y > x => b,
        (Some(_), _) => a,
        (None, Some(_)) => b,
        (None, None) => a,
    }
}

/// Static type of `expr` evaluated inside `context` (the enclosing type).
/// `None` for `void` calls, `null`, and expressions the model cannot type.
pub fn expr_type(program: &Program, context: Option<DeclId>, expr: &Expr) -> Option<TypeRef> {
    match &expr.kind {
        ExprKind::Literal(lit) => match lit {
            Literal::Int(_) => Some(primitive("int")),
            Literal::Bool(_) => Some(primitive("boolean")),
            Literal::Str(_) => Some(primitive("String")),
            Literal::Char(_) => Some(primitive("char")),
            Literal::Null => None,
        },
        ExprKind::Name { decl, .. } | ExprKind::FieldAccess { decl, .. } => {
            decl.and_then(|d| program.decl(d)).and_then(|d| d.ty.clone())
        }
        ExprKind::Call { method, .. } => method
            .and_then(|m| program.decl(m))
            .and_then(|m| m.ty.clone()),
        ExprKind::New { ty, .. } | ExprKind::Cast { ty, .. } => Some(ty.clone()),
        ExprKind::This => context.map(|ty| TypeRef {
            decl: Some(ty),
            ..primitive(program.name_of(ty))
        }),
        ExprKind::Super => context
            .and_then(|ty| program.decl(ty))
            .and_then(|d| d.extends.clone()),
        ExprKind::TypeName(_) => None,
        ExprKind::Index { array, .. } => {
            let mut ty = expr_type(program, context, array)?;
            ty.dims = ty.dims.saturating_sub(1);
            Some(ty)
        }
        ExprKind::Assign { target, .. } => expr_type(program, context, target),
        ExprKind::Unary { op, operand } => match op {
            UnaryOp::Not => Some(primitive("boolean")),
            _ => expr_type(program, context, operand),
        },
        ExprKind::Binary { op, lhs, rhs } => {
            if op.is_comparison() || op.is_logical() {
                return Some(primitive("boolean"));
            }
            let left = expr_type(program, context, lhs);
            let right = expr_type(program, context, rhs);
            let is_string = |t: &Option<TypeRef>| t.as_ref().is_some_and(|t| t.name == "String");
            if *op == BinaryOp::Add && (is_string(&left) || is_string(&right)) {
                return Some(primitive("String"));
            }
            match (left, right) {
                (Some(l), Some(r)) => Some(wider(l, r)),
                (l, r) => l.or(r),
            }
        }
        ExprKind::Conditional {
            then, otherwise, ..
        } => expr_type(program, context, then).or_else(|| expr_type(program, context, otherwise)),
        ExprKind::Paren(inner) => expr_type(program, context, inner),
    }
}

/// Whether the expression is statically boolean.
pub fn is_boolean(program: &Program, context: Option<DeclId>, expr: &Expr) -> bool {
    expr_type(program, context, expr).is_some_and(|t| t.is_boolean())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;

    #[test]
    fn arithmetic_widens_and_strings_concatenate() {
        let mut b = ProgramBuilder::new();
        let file = b.file("A.java", "");
        let a = b.class(file, "A");
        let x = b.field(a, "x", "long");
        let y = b.field(a, "y", "int");
        let s = b.field(a, "s", "String");
        let (nx, ny) = (b.name(x), b.name(y));
        let sum = b.binary(BinaryOp::Add, ny, nx);
        let (ns, one) = (b.name(s), b.int(1));
        let concat = b.binary(BinaryOp::Add, ns, one);
        let (ny2, zero) = (b.name(y), b.int(0));
        let cmp = b.binary(BinaryOp::Gt, ny2, zero);
        let program = b.finish();

        assert_eq!(expr_type(&program, Some(a), &sum).unwrap().name, "long");
        assert_eq!(expr_type(&program, Some(a), &concat).unwrap().name, "String");
        assert!(is_boolean(&program, Some(a), &cmp));
    }

    #[test]
    fn this_has_enclosing_type() {
        let mut b = ProgramBuilder::new();
        let file = b.file("A.java", "");
        let a = b.class(file, "A");
        let this = b.this();
        let program = b.finish();
        let ty = expr_type(&program, Some(a), &this).unwrap();
        assert_eq!(ty.decl, Some(a));
        assert_eq!(ty.name, "A");
    }
}
