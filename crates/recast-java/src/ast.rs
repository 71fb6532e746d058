// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Statement, expression, and type-reference trees.
//!
//! Every expression, statement, type reference and import carries a
//! [`NodeId`] that is unique within a program. Edit plans address nodes by
//! id, never by text offset. Resolved references carry the [`DeclId`] of
//! the declaration they bind to; printers render the declaration's current
//! name, so renaming a declaration renames every bound reference.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::DeclId;

/// Stable identity of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// Allocator for fresh node and declaration ids.
pub trait IdSource {
    fn node_id(&mut self) -> NodeId;
    fn decl_id(&mut self) -> DeclId;
}

// ============================================================================
// Type References
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundKind {
    Extends,
    Super,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WildcardBound {
    pub kind: BoundKind,
    pub ty: Box<TypeRef>,
}

/// A use of a type: `int`, `List<String>`, `? super T`, `p.q.Foo[]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRef {
    pub id: NodeId,
    /// Name as written; `?` for wildcards. A name containing `.` was
    /// written fully qualified.
    pub name: String,
    /// Declaration the name binds to, for program types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decl: Option<DeclId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<TypeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound: Option<WildcardBound>,
    #[serde(default)]
    pub dims: u8,
}

const PRIMITIVES: &[&str] = &[
    "boolean", "byte", "char", "short", "int", "long", "float", "double",
];

impl TypeRef {
    pub fn named(ids: &mut impl IdSource, name: impl Into<String>) -> Self {
        TypeRef {
            id: ids.node_id(),
            name: name.into(),
            decl: None,
            args: Vec::new(),
            bound: None,
            dims: 0,
        }
    }

    pub fn to_decl(ids: &mut impl IdSource, name: impl Into<String>, decl: DeclId) -> Self {
        let mut ty = Self::named(ids, name);
        ty.decl = Some(decl);
        ty
    }

    pub fn wildcard(ids: &mut impl IdSource, bound: Option<(BoundKind, TypeRef)>) -> Self {
        let mut ty = Self::named(ids, "?");
        ty.bound = bound.map(|(kind, ty)| WildcardBound {
            kind,
            ty: Box::new(ty),
        });
        ty
    }

    pub fn with_args(mut self, args: Vec<TypeRef>) -> Self {
        self.args = args;
        self
    }

    pub fn array(mut self, dims: u8) -> Self {
        self.dims = dims;
        self
    }

    pub fn is_primitive(&self) -> bool {
        self.dims == 0 && PRIMITIVES.contains(&self.name.as_str())
    }

    pub fn is_boolean(&self) -> bool {
        self.dims == 0 && (self.name == "boolean" || self.name == "Boolean")
    }

    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn is_qualified(&self) -> bool {
        self.name.contains('.')
    }

    /// Structural equality ignoring node ids.
    pub fn same_as(&self, other: &TypeRef) -> bool {
        let bounds_match = match (&self.bound, &other.bound) {
            (None, None) => true,
            (Some(a), Some(b)) => a.kind == b.kind && a.ty.same_as(&b.ty),
            _ => false,
        };
        let names_match = match (self.decl, other.decl) {
            (Some(a), Some(b)) => a == b,
            _ => self.simple_name() == other.simple_name(),
        };
        names_match
            && self.dims == other.dims
            && bounds_match
            && self.args.len() == other.args.len()
            && self.args.iter().zip(&other.args).all(|(a, b)| a.same_as(b))
    }

    /// Every type reference nested in this one, including itself.
    pub fn for_each<'a>(&'a self, f: &mut impl FnMut(&'a TypeRef)) {
        f(self);
        for arg in &self.args {
            arg.for_each(f);
        }
        if let Some(bound) = &self.bound {
            bound.ty.for_each(f);
        }
    }

    pub fn for_each_mut(&mut self, f: &mut impl FnMut(&mut TypeRef)) {
        f(self);
        for arg in &mut self.args {
            arg.for_each_mut(f);
        }
        if let Some(bound) = &mut self.bound {
            bound.ty.for_each_mut(f);
        }
    }
}

/// A declared type parameter: `T extends Comparable<? super T>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeParam {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounds: Vec<TypeRef>,
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Int(i64),
    Bool(bool),
    Str(String),
    Char(char),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
            AssignOp::Rem => "%=",
            AssignOp::And => "&=",
            AssignOp::Or => "|=",
            AssignOp::Xor => "^=",
        }
    }

    pub fn is_compound(self) -> bool {
        self != AssignOp::Assign
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl UnaryOp {
    pub fn is_increment(self) -> bool {
        matches!(
            self,
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::BitOr => 3,
            BinaryOp::BitXor => 4,
            BinaryOp::BitAnd => 5,
            BinaryOp::Eq | BinaryOp::Ne => 6,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 7,
            BinaryOp::Add | BinaryOp::Sub => 8,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 9,
        }
    }

    /// The comparison testing the opposite condition, if this is one.
    pub fn negated(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::Ne),
            BinaryOp::Ne => Some(BinaryOp::Eq),
            BinaryOp::Lt => Some(BinaryOp::Ge),
            BinaryOp::Ge => Some(BinaryOp::Lt),
            BinaryOp::Gt => Some(BinaryOp::Le),
            BinaryOp::Le => Some(BinaryOp::Gt),
            _ => None,
        }
    }

    pub fn is_comparison(self) -> bool {
        self.negated().is_some()
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    Literal(Literal),
    /// A simple identifier.
    Name {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        decl: Option<DeclId>,
    },
    /// `target.name`.
    FieldAccess {
        target: Box<Expr>,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        decl: Option<DeclId>,
    },
    /// A type used as a qualifier: `Math` in `Math.max(a, b)`.
    TypeName(TypeRef),
    This,
    Super,
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<Box<Expr>>,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<DeclId>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        type_args: Vec<TypeRef>,
        args: Vec<Expr>,
    },
    New {
        ty: TypeRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ctor: Option<DeclId>,
        args: Vec<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Paren(Box<Expr>),
    Cast {
        ty: TypeRef,
        expr: Box<Expr>,
    },
}

impl Expr {
    pub fn new(ids: &mut impl IdSource, kind: ExprKind) -> Self {
        Expr {
            id: ids.node_id(),
            kind,
        }
    }

    pub fn int(ids: &mut impl IdSource, value: i64) -> Self {
        Self::new(ids, ExprKind::Literal(Literal::Int(value)))
    }

    pub fn bool(ids: &mut impl IdSource, value: bool) -> Self {
        Self::new(ids, ExprKind::Literal(Literal::Bool(value)))
    }

    pub fn str(ids: &mut impl IdSource, value: impl Into<String>) -> Self {
        Self::new(ids, ExprKind::Literal(Literal::Str(value.into())))
    }

    pub fn null(ids: &mut impl IdSource) -> Self {
        Self::new(ids, ExprKind::Literal(Literal::Null))
    }

    pub fn name(ids: &mut impl IdSource, name: impl Into<String>, decl: Option<DeclId>) -> Self {
        Self::new(
            ids,
            ExprKind::Name {
                name: name.into(),
                decl,
            },
        )
    }

    pub fn this(ids: &mut impl IdSource) -> Self {
        Self::new(ids, ExprKind::This)
    }

    pub fn field(
        ids: &mut impl IdSource,
        target: Expr,
        name: impl Into<String>,
        decl: Option<DeclId>,
    ) -> Self {
        Self::new(
            ids,
            ExprKind::FieldAccess {
                target: Box::new(target),
                name: name.into(),
                decl,
            },
        )
    }

    pub fn type_name(ids: &mut impl IdSource, ty: TypeRef) -> Self {
        Self::new(ids, ExprKind::TypeName(ty))
    }

    pub fn call(
        ids: &mut impl IdSource,
        target: Option<Expr>,
        name: impl Into<String>,
        method: Option<DeclId>,
        args: Vec<Expr>,
    ) -> Self {
        Self::new(
            ids,
            ExprKind::Call {
                target: target.map(Box::new),
                name: name.into(),
                method,
                type_args: Vec::new(),
                args,
            },
        )
    }

    pub fn new_object(
        ids: &mut impl IdSource,
        ty: TypeRef,
        ctor: Option<DeclId>,
        args: Vec<Expr>,
    ) -> Self {
        Self::new(ids, ExprKind::New { ty, ctor, args })
    }

    pub fn assign(ids: &mut impl IdSource, op: AssignOp, target: Expr, value: Expr) -> Self {
        Self::new(
            ids,
            ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
        )
    }

    pub fn unary(ids: &mut impl IdSource, op: UnaryOp, operand: Expr) -> Self {
        Self::new(
            ids,
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
        )
    }

    pub fn binary(ids: &mut impl IdSource, op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::new(
            ids,
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )
    }

    pub fn index(ids: &mut impl IdSource, array: Expr, index: Expr) -> Self {
        Self::new(
            ids,
            ExprKind::Index {
                array: Box::new(array),
                index: Box::new(index),
            },
        )
    }

    pub fn paren(ids: &mut impl IdSource, inner: Expr) -> Self {
        Self::new(ids, ExprKind::Paren(Box::new(inner)))
    }

    /// The declaration this expression names directly, if any.
    pub fn referenced_decl(&self) -> Option<DeclId> {
        match &self.kind {
            ExprKind::Name { decl, .. } | ExprKind::FieldAccess { decl, .. } => *decl,
            ExprKind::Call { method, .. } => *method,
            ExprKind::New { ctor, .. } => *ctor,
            _ => None,
        }
    }

    /// Whether the expression prints as a single primary (no operator
    /// needs parenthesizing around it).
    pub fn is_primary(&self) -> bool {
        !matches!(
            self.kind,
            ExprKind::Assign { .. }
                | ExprKind::Binary { .. }
                | ExprKind::Conditional { .. }
                | ExprKind::Cast { .. }
                | ExprKind::Unary { .. }
        )
    }

    /// Direct children in evaluation (and printing) order.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Literal(_)
            | ExprKind::Name { .. }
            | ExprKind::TypeName(_)
            | ExprKind::This
            | ExprKind::Super => Vec::new(),
            ExprKind::FieldAccess { target, .. } => vec![target],
            ExprKind::Index { array, index } => vec![array, index],
            ExprKind::Call { target, args, .. } => {
                let mut out: Vec<&Expr> = target.iter().map(|t| &**t).collect();
                out.extend(args.iter());
                out
            }
            ExprKind::New { args, .. } => args.iter().collect(),
            ExprKind::Assign { target, value, .. } => vec![target, value],
            ExprKind::Unary { operand, .. } => vec![operand],
            ExprKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => vec![cond, then, otherwise],
            ExprKind::Paren(inner) => vec![inner],
            ExprKind::Cast { expr, .. } => vec![expr],
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            ExprKind::Literal(_)
            | ExprKind::Name { .. }
            | ExprKind::TypeName(_)
            | ExprKind::This
            | ExprKind::Super => Vec::new(),
            ExprKind::FieldAccess { target, .. } => vec![target],
            ExprKind::Index { array, index } => vec![array, index],
            ExprKind::Call { target, args, .. } => {
                let mut out: Vec<&mut Expr> = target.iter_mut().map(|t| &mut **t).collect();
                out.extend(args.iter_mut());
                out
            }
            ExprKind::New { args, .. } => args.iter_mut().collect(),
            ExprKind::Assign { target, value, .. } => vec![target, value],
            ExprKind::Unary { operand, .. } => vec![operand],
            ExprKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => vec![cond, then, otherwise],
            ExprKind::Paren(inner) => vec![inner],
            ExprKind::Cast { expr, .. } => vec![expr],
        }
    }

    /// Type references appearing directly in this node.
    pub fn own_types(&self) -> Vec<&TypeRef> {
        match &self.kind {
            ExprKind::TypeName(ty) | ExprKind::Cast { ty, .. } => vec![ty],
            ExprKind::New { ty, .. } => vec![ty],
            ExprKind::Call { type_args, .. } => type_args.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Pre-order traversal.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// Pre-order mutable traversal.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Expr)) {
        f(self);
        for child in self.children_mut() {
            child.walk_mut(f);
        }
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        let mut found = false;
        self.walk(&mut |e| found |= e.id == id);
        found
    }

    /// Structural equality ignoring node ids.
    pub fn same_as(&self, other: &Expr) -> bool {
        self.same_as_with(other, &|a, b| a == b)
    }

    /// Structural equality where declaration bindings are compared with
    /// `same_decl`, so trees from different copies of a member can match.
    pub fn same_as_with(&self, other: &Expr, same_decl: &dyn Fn(DeclId, DeclId) -> bool) -> bool {
        use ExprKind as K;
        let bound = |a: &Option<DeclId>, b: &Option<DeclId>| match (a, b) {
            (Some(x), Some(y)) => same_decl(*x, *y),
            (None, None) => true,
            _ => false,
        };
        let children_match = || {
            let (a, b) = (self.children(), other.children());
            a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| x.same_as_with(y, same_decl))
        };
        match (&self.kind, &other.kind) {
            (K::Literal(a), K::Literal(b)) => a == b,
            (K::Name { name: a, decl: da }, K::Name { name: b, decl: db }) => match (da, db) {
                (Some(x), Some(y)) => same_decl(*x, *y),
                _ => a == b,
            },
            (
                K::FieldAccess {
                    name: a, decl: da, ..
                },
                K::FieldAccess {
                    name: b, decl: db, ..
                },
            ) => bound(da, db) && a == b && children_match(),
            (K::TypeName(a), K::TypeName(b)) => a.same_as(b),
            (K::This, K::This) | (K::Super, K::Super) => true,
            (K::Index { .. }, K::Index { .. }) | (K::Paren(_), K::Paren(_)) => children_match(),
            (
                K::Call {
                    name: a, method: ma, ..
                },
                K::Call {
                    name: b, method: mb, ..
                },
            ) => a == b && bound(ma, mb) && children_match(),
            (K::New { ty: a, ctor: ca, .. }, K::New { ty: b, ctor: cb, .. }) => {
                a.same_as(b) && bound(ca, cb) && children_match()
            }
            (K::Assign { op: a, .. }, K::Assign { op: b, .. }) => a == b && children_match(),
            (K::Unary { op: a, .. }, K::Unary { op: b, .. }) => a == b && children_match(),
            (K::Binary { op: a, .. }, K::Binary { op: b, .. }) => a == b && children_match(),
            (K::Conditional { .. }, K::Conditional { .. }) => children_match(),
            (K::Cast { ty: a, .. }, K::Cast { ty: b, .. }) => a.same_as(b) && children_match(),
            _ => false,
        }
    }
}

// ============================================================================
// Statements
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Block { stmts }
    }

    /// Every expression in the block, statements in order, each
    /// expression tree pre-order.
    pub fn walk_exprs<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        for stmt in &self.stmts {
            stmt.walk_exprs(f);
        }
    }

    pub fn walk_exprs_mut(&mut self, f: &mut impl FnMut(&mut Expr)) {
        for stmt in &mut self.stmts {
            stmt.walk_exprs_mut(f);
        }
    }

    /// Statement-level expressions only; `f` decides whether to descend.
    pub fn roots_mut(&mut self, f: &mut impl FnMut(&mut Expr)) {
        for stmt in &mut self.stmts {
            match &mut stmt.kind {
                StmtKind::Expr(e) | StmtKind::Throw(e) => f(e),
                StmtKind::Return(e) | StmtKind::Local { init: e, .. } => {
                    if let Some(e) = e {
                        f(e);
                    }
                }
                StmtKind::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    f(cond);
                    then.roots_mut(f);
                    if let Some(b) = otherwise {
                        b.roots_mut(f);
                    }
                }
                StmtKind::While { cond, body } => {
                    f(cond);
                    body.roots_mut(f);
                }
                StmtKind::Block(b) => b.roots_mut(f),
                StmtKind::Comment(_) => {}
            }
        }
    }

    pub fn same_as_with(&self, other: &Block, same_decl: &dyn Fn(DeclId, DeclId) -> bool) -> bool {
        self.stmts.len() == other.stmts.len()
            && self
                .stmts
                .iter()
                .zip(&other.stmts)
                .all(|(a, b)| a.same_as_with(b, same_decl))
    }

    /// Local variable declarations introduced anywhere in the block.
    pub fn locals(&self) -> Vec<DeclId> {
        let mut out = Vec::new();
        for stmt in &self.stmts {
            stmt.collect_locals(&mut out);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub id: NodeId,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StmtKind {
    Expr(Expr),
    Return(Option<Expr>),
    /// Local variable; name, type and modifiers live on the declaration.
    Local {
        decl: DeclId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        init: Option<Expr>,
    },
    If {
        cond: Expr,
        then: Block,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
    },
    Throw(Expr),
    Block(Block),
    /// A `//` line comment.
    Comment(String),
}

impl Stmt {
    pub fn new(ids: &mut impl IdSource, kind: StmtKind) -> Self {
        Stmt {
            id: ids.node_id(),
            kind,
        }
    }

    pub fn expr(ids: &mut impl IdSource, expr: Expr) -> Self {
        Self::new(ids, StmtKind::Expr(expr))
    }

    pub fn ret(ids: &mut impl IdSource, expr: Option<Expr>) -> Self {
        Self::new(ids, StmtKind::Return(expr))
    }

    /// Top-level expressions owned directly by this statement.
    pub fn exprs(&self) -> Vec<&Expr> {
        match &self.kind {
            StmtKind::Expr(e) | StmtKind::Throw(e) => vec![e],
            StmtKind::Return(e) => e.iter().collect(),
            StmtKind::Local { init, .. } => init.iter().collect(),
            StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => vec![cond],
            StmtKind::Block(_) | StmtKind::Comment(_) => Vec::new(),
        }
    }

    /// Nested blocks in order.
    pub fn blocks(&self) -> Vec<&Block> {
        match &self.kind {
            StmtKind::If {
                then, otherwise, ..
            } => {
                let mut out = vec![then];
                out.extend(otherwise.iter());
                out
            }
            StmtKind::While { body, .. } => vec![body],
            StmtKind::Block(b) => vec![b],
            _ => Vec::new(),
        }
    }

    pub fn walk_exprs<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        for expr in self.exprs() {
            expr.walk(f);
        }
        for block in self.blocks() {
            block.walk_exprs(f);
        }
    }

    pub fn walk_exprs_mut(&mut self, f: &mut impl FnMut(&mut Expr)) {
        match &mut self.kind {
            StmtKind::Expr(e) | StmtKind::Throw(e) => e.walk_mut(f),
            StmtKind::Return(e) | StmtKind::Local { init: e, .. } => {
                if let Some(e) = e {
                    e.walk_mut(f);
                }
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                cond.walk_mut(f);
                then.walk_exprs_mut(f);
                if let Some(b) = otherwise {
                    b.walk_exprs_mut(f);
                }
            }
            StmtKind::While { cond, body } => {
                cond.walk_mut(f);
                body.walk_exprs_mut(f);
            }
            StmtKind::Block(b) => b.walk_exprs_mut(f),
            StmtKind::Comment(_) => {}
        }
    }

    pub fn same_as_with(&self, other: &Stmt, same_decl: &dyn Fn(DeclId, DeclId) -> bool) -> bool {
        let exprs_match = || {
            let (a, b) = (self.exprs(), other.exprs());
            a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| x.same_as_with(y, same_decl))
        };
        let blocks_match = || {
            let (a, b) = (self.blocks(), other.blocks());
            a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| x.same_as_with(y, same_decl))
        };
        match (&self.kind, &other.kind) {
            (StmtKind::Local { decl: a, .. }, StmtKind::Local { decl: b, .. }) => {
                same_decl(*a, *b) && exprs_match()
            }
            (StmtKind::Comment(a), StmtKind::Comment(b)) => a == b,
            (a, b) if std::mem::discriminant(a) == std::mem::discriminant(b) => {
                exprs_match() && blocks_match()
            }
            _ => false,
        }
    }

    fn collect_locals(&self, out: &mut Vec<DeclId>) {
        if let StmtKind::Local { decl, .. } = &self.kind {
            out.push(*decl);
        }
        for block in self.blocks() {
            for stmt in &block.stmts {
                stmt.collect_locals(out);
            }
        }
    }
}

// ============================================================================
// Renumbering
// ============================================================================

/// Deep-copies trees with fresh node ids, remapping declaration references
/// through `remap` (declarations absent from the map keep their binding).
pub struct Renumber<'a, I: IdSource> {
    pub ids: &'a mut I,
    pub remap: &'a HashMap<DeclId, DeclId>,
}

impl<I: IdSource> Renumber<'_, I> {
    fn decl(&self, decl: Option<DeclId>) -> Option<DeclId> {
        decl.map(|d| self.remap.get(&d).copied().unwrap_or(d))
    }

    pub fn ty(&mut self, ty: &TypeRef) -> TypeRef {
        TypeRef {
            id: self.ids.node_id(),
            name: ty.name.clone(),
            decl: self.decl(ty.decl),
            args: ty.args.iter().map(|a| self.ty(a)).collect(),
            bound: ty.bound.as_ref().map(|b| WildcardBound {
                kind: b.kind,
                ty: Box::new(self.ty(&b.ty)),
            }),
            dims: ty.dims,
        }
    }

    pub fn expr(&mut self, expr: &Expr) -> Expr {
        let kind = match &expr.kind {
            ExprKind::Literal(l) => ExprKind::Literal(l.clone()),
            ExprKind::Name { name, decl } => ExprKind::Name {
                name: name.clone(),
                decl: self.decl(*decl),
            },
            ExprKind::FieldAccess { target, name, decl } => ExprKind::FieldAccess {
                target: Box::new(self.expr(target)),
                name: name.clone(),
                decl: self.decl(*decl),
            },
            ExprKind::TypeName(ty) => ExprKind::TypeName(self.ty(ty)),
            ExprKind::This => ExprKind::This,
            ExprKind::Super => ExprKind::Super,
            ExprKind::Index { array, index } => ExprKind::Index {
                array: Box::new(self.expr(array)),
                index: Box::new(self.expr(index)),
            },
            ExprKind::Call {
                target,
                name,
                method,
                type_args,
                args,
            } => ExprKind::Call {
                target: target.as_ref().map(|t| Box::new(self.expr(t))),
                name: name.clone(),
                method: self.decl(*method),
                type_args: type_args.iter().map(|t| self.ty(t)).collect(),
                args: args.iter().map(|a| self.expr(a)).collect(),
            },
            ExprKind::New { ty, ctor, args } => ExprKind::New {
                ty: self.ty(ty),
                ctor: self.decl(*ctor),
                args: args.iter().map(|a| self.expr(a)).collect(),
            },
            ExprKind::Assign { op, target, value } => ExprKind::Assign {
                op: *op,
                target: Box::new(self.expr(target)),
                value: Box::new(self.expr(value)),
            },
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op: *op,
                operand: Box::new(self.expr(operand)),
            },
            ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
                op: *op,
                lhs: Box::new(self.expr(lhs)),
                rhs: Box::new(self.expr(rhs)),
            },
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => ExprKind::Conditional {
                cond: Box::new(self.expr(cond)),
                then: Box::new(self.expr(then)),
                otherwise: Box::new(self.expr(otherwise)),
            },
            ExprKind::Paren(inner) => ExprKind::Paren(Box::new(self.expr(inner))),
            ExprKind::Cast { ty, expr } => ExprKind::Cast {
                ty: self.ty(ty),
                expr: Box::new(self.expr(expr)),
            },
        };
        Expr {
            id: self.ids.node_id(),
            kind,
        }
    }

    pub fn block(&mut self, block: &Block) -> Block {
        Block {
            stmts: block.stmts.iter().map(|s| self.stmt(s)).collect(),
        }
    }

    pub fn stmt(&mut self, stmt: &Stmt) -> Stmt {
        let kind = match &stmt.kind {
            StmtKind::Expr(e) => StmtKind::Expr(self.expr(e)),
            StmtKind::Return(e) => StmtKind::Return(e.as_ref().map(|e| self.expr(e))),
            StmtKind::Local { decl, init } => StmtKind::Local {
                decl: self.remap.get(decl).copied().unwrap_or(*decl),
                init: init.as_ref().map(|e| self.expr(e)),
            },
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => StmtKind::If {
                cond: self.expr(cond),
                then: self.block(then),
                otherwise: otherwise.as_ref().map(|b| self.block(b)),
            },
            StmtKind::While { cond, body } => StmtKind::While {
                cond: self.expr(cond),
                body: self.block(body),
            },
            StmtKind::Throw(e) => StmtKind::Throw(self.expr(e)),
            StmtKind::Block(b) => StmtKind::Block(self.block(b)),
            StmtKind::Comment(text) => StmtKind::Comment(text.clone()),
        };
        Stmt {
            id: self.ids.node_id(),
            kind,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
