// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Reference walker.
//!
//! Visits every resolved reference in a compilation unit in source order and
//! reports it as a [`RefSite`] with its access mode. The usage classifier,
//! the conflict rules and the planners are all built on this walk.

use recast_core::config::{CollectionSemantics, MethodEffect};
use recast_core::patch::FileId;
use recast_core::util::CancellationFlag;
use serde::{Deserialize, Serialize};

use crate::ast::{Block, Expr, ExprKind, NodeId, Stmt, StmtKind, TypeRef};
use crate::model::{DeclId, Declaration, Program};
use crate::typing::expr_type;

/// How a usage accesses the declaration it resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
    Unclassified,
}

/// What a member reference was accessed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// Unqualified name or call.
    Implicit,
    This,
    Super,
    /// Static access through a type name.
    Type(Option<DeclId>),
    /// Access through a value of the given static type.
    Value(Option<DeclId>),
}

/// One resolved reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefSite {
    pub file: FileId,
    /// Member (or type, for header references) containing the reference;
    /// `None` for imports.
    pub owner: Option<DeclId>,
    pub node: NodeId,
    pub decl: DeclId,
    pub mode: AccessMode,
    pub receiver: Receiver,
    pub in_import: bool,
    pub statement: Option<NodeId>,
}

#[derive(Debug, Clone, Copy)]
enum Ctx {
    Read,
    Write,
    ReadWrite,
    Qualifier,
    Collection(Option<MethodEffect>),
}

impl Ctx {
    fn mode(self) -> AccessMode {
        match self {
            Ctx::Read => AccessMode::Read,
            Ctx::Write => AccessMode::Write,
            Ctx::ReadWrite => AccessMode::ReadWrite,
            Ctx::Qualifier | Ctx::Collection(None) => AccessMode::Unclassified,
            Ctx::Collection(Some(MethodEffect::Read)) => AccessMode::Read,
            Ctx::Collection(Some(MethodEffect::Write)) => AccessMode::Write,
            Ctx::Collection(Some(MethodEffect::ReadWrite)) => AccessMode::ReadWrite,
        }
    }
}

/// Walks one compilation unit, feeding each reference to `sink`.
pub struct RefWalker<'a, F: FnMut(RefSite)> {
    program: &'a Program,
    collections: &'a CollectionSemantics,
    cancel: Option<&'a CancellationFlag>,
    file: FileId,
    owner: Option<DeclId>,
    context_type: Option<DeclId>,
    statement: Option<NodeId>,
    cancelled: bool,
    sink: F,
}

impl<'a, F: FnMut(RefSite)> RefWalker<'a, F> {
    pub fn new(
        program: &'a Program,
        collections: &'a CollectionSemantics,
        file: FileId,
        sink: F,
    ) -> Self {
        RefWalker {
            program,
            collections,
            cancel: None,
            file,
            owner: None,
            context_type: None,
            statement: None,
            cancelled: false,
            sink,
        }
    }

    pub fn with_cancel(mut self, cancel: Option<&'a CancellationFlag>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Walk the whole unit. Returns `false` if cancelled part way.
    pub fn walk_unit(mut self) -> bool {
        let Some(unit) = self.program.file(self.file) else {
            return true;
        };
        for import in &unit.imports {
            if let Some(decl) = import.decl {
                (self.sink)(RefSite {
                    file: self.file,
                    owner: None,
                    node: import.id,
                    decl,
                    mode: AccessMode::Unclassified,
                    receiver: Receiver::Implicit,
                    in_import: true,
                    statement: None,
                });
            }
        }
        for ty in &unit.types {
            if let Some(decl) = self.program.decl(*ty) {
                self.declaration(decl);
            }
            if self.cancelled {
                return false;
            }
        }
        true
    }

    /// Walk a single declaration (header, initializer, body, members).
    pub fn walk_decl(mut self, decl: DeclId) -> bool {
        if let Some(d) = self.program.decl(decl) {
            self.declaration(d);
        }
        !self.cancelled
    }

    fn emit(&mut self, node: NodeId, decl: DeclId, mode: AccessMode, receiver: Receiver) {
        (self.sink)(RefSite {
            file: self.file,
            owner: self.owner,
            node,
            decl,
            mode,
            receiver,
            in_import: false,
            statement: self.statement,
        });
    }

    fn type_ref(&mut self, ty: &TypeRef) {
        let mut found = Vec::new();
        ty.for_each(&mut |t| {
            if let Some(decl) = t.decl {
                found.push((t.id, decl));
            }
        });
        for (node, decl) in found {
            self.emit(node, decl, AccessMode::Unclassified, Receiver::Implicit);
        }
    }

    fn declaration(&mut self, decl: &Declaration) {
        let saved = (self.owner, self.context_type);
        self.owner = Some(decl.id);
        if decl.is_type() {
            self.context_type = Some(decl.id);
        }
        self.statement = None;
        for ty in decl.header_types() {
            self.type_ref(ty);
        }
        for param in &decl.params {
            if let Some(p) = self.program.decl(*param) {
                for ty in p.header_types() {
                    self.type_ref(ty);
                }
            }
        }
        if let Some(init) = &decl.init {
            self.expr(init, Ctx::Read);
        }
        if let Some(body) = &decl.body {
            self.block(body);
        }
        for member in &decl.members {
            if self.cancelled {
                break;
            }
            if let Some(m) = self.program.decl(*member) {
                self.declaration(m);
            }
        }
        self.owner = saved.0;
        self.context_type = saved.1;
        self.statement = None;
    }

    fn block(&mut self, block: &Block) {
        for stmt in &block.stmts {
            if self.cancel.is_some_and(|c| c.is_cancelled()) {
                self.cancelled = true;
            }
            if self.cancelled {
                return;
            }
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        let outer = self.statement;
        self.statement = Some(stmt.id);
        match &stmt.kind {
            StmtKind::Expr(e) | StmtKind::Throw(e) => self.expr(e, Ctx::Read),
            StmtKind::Return(e) => {
                if let Some(e) = e {
                    self.expr(e, Ctx::Read);
                }
            }
            StmtKind::Local { decl, init } => {
                if let Some(ty) = self.program.decl(*decl).and_then(|d| d.ty.as_ref()) {
                    self.type_ref(ty);
                }
                if let Some(init) = init {
                    self.expr(init, Ctx::Read);
                }
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond, Ctx::Read);
                self.block(then);
                if let Some(b) = otherwise {
                    self.block(b);
                }
            }
            StmtKind::While { cond, body } => {
                self.expr(cond, Ctx::Read);
                self.block(body);
            }
            StmtKind::Block(b) => self.block(b),
            StmtKind::Comment(_) => {}
        }
        self.statement = outer;
    }

    fn receiver_of(&self, target: &Expr) -> Receiver {
        match &target.kind {
            ExprKind::This => Receiver::This,
            ExprKind::Super => Receiver::Super,
            ExprKind::TypeName(ty) => Receiver::Type(ty.decl),
            _ => Receiver::Value(
                expr_type(self.program, self.context_type, target).and_then(|t| t.decl),
            ),
        }
    }

    /// Context for a call receiver: table-driven when the receiver names a
    /// collection-typed declaration.
    fn receiver_ctx(&self, target: &Expr, method: &str) -> Ctx {
        let named = match &target.kind {
            ExprKind::Name { decl, .. } | ExprKind::FieldAccess { decl, .. } => *decl,
            _ => None,
        };
        let is_collection = named
            .and_then(|d| self.program.decl(d))
            .and_then(|d| d.ty.as_ref())
            .is_some_and(|t| t.dims == 0 && self.collections.is_collection_type(&t.name));
        if is_collection {
            Ctx::Collection(self.collections.classify(method))
        } else {
            Ctx::Qualifier
        }
    }

    fn expr(&mut self, expr: &Expr, ctx: Ctx) {
        match &expr.kind {
            ExprKind::Literal(_) | ExprKind::This | ExprKind::Super => {}
            ExprKind::Name { decl, .. } => {
                if let Some(decl) = decl {
                    self.emit(expr.id, *decl, ctx.mode(), Receiver::Implicit);
                }
            }
            ExprKind::FieldAccess { target, decl, .. } => {
                if let Some(decl) = decl {
                    let receiver = self.receiver_of(target);
                    self.emit(expr.id, *decl, ctx.mode(), receiver);
                }
                self.expr(target, Ctx::Qualifier);
            }
            ExprKind::TypeName(ty) => self.type_ref(ty),
            ExprKind::Index { array, index } => {
                let array_ctx = match ctx {
                    Ctx::Write => Ctx::Write,
                    Ctx::ReadWrite => Ctx::ReadWrite,
                    _ => Ctx::Read,
                };
                self.expr(array, array_ctx);
                self.expr(index, Ctx::Read);
            }
            ExprKind::Call {
                target,
                name,
                method,
                type_args,
                args,
            } => {
                if let Some(target) = target {
                    let receiver_ctx = self.receiver_ctx(target, name);
                    if let Some(method) = method {
                        let receiver = self.receiver_of(target);
                        self.emit(expr.id, *method, AccessMode::Unclassified, receiver);
                    }
                    self.expr(target, receiver_ctx);
                } else if let Some(method) = method {
                    self.emit(expr.id, *method, AccessMode::Unclassified, Receiver::Implicit);
                }
                for ty in type_args {
                    self.type_ref(ty);
                }
                for arg in args {
                    self.expr(arg, Ctx::Read);
                }
            }
            ExprKind::New { ty, ctor, args } => {
                self.type_ref(ty);
                if let Some(ctor) = ctor {
                    self.emit(expr.id, *ctor, AccessMode::Unclassified, Receiver::Implicit);
                }
                for arg in args {
                    self.expr(arg, Ctx::Read);
                }
            }
            ExprKind::Assign { op, target, value } => {
                let target_ctx = if op.is_compound() {
                    Ctx::ReadWrite
                } else {
                    Ctx::Write
                };
                self.expr(target, target_ctx);
                self.expr(value, Ctx::Read);
            }
            ExprKind::Unary { op, operand } => {
                let operand_ctx = if op.is_increment() {
                    Ctx::ReadWrite
                } else {
                    Ctx::Read
                };
                self.expr(operand, operand_ctx);
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs, Ctx::Read);
                self.expr(rhs, Ctx::Read);
            }
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond, Ctx::Read);
                self.expr(then, Ctx::Read);
                self.expr(otherwise, Ctx::Read);
            }
            ExprKind::Paren(inner) => self.expr(inner, ctx),
            ExprKind::Cast { ty, expr } => {
                self.type_ref(ty);
                self.expr(expr, Ctx::Read);
            }
        }
    }
}

// ============================================================================
// Convenience Queries
// ============================================================================

/// Every reference in the program, files in path order.
pub fn all_references(program: &Program, collections: &CollectionSemantics) -> Vec<RefSite> {
    let mut sites = Vec::new();
    for unit in program.files() {
        RefWalker::new(program, collections, unit.id, |site| sites.push(site)).walk_unit();
    }
    sites
}

/// References to any of `targets` across the program.
pub fn references_to(program: &Program, targets: &[DeclId]) -> Vec<RefSite> {
    let collections = CollectionSemantics::default();
    all_references(program, &collections)
        .into_iter()
        .filter(|site| targets.contains(&site.decl))
        .collect()
}

/// References made from inside `decl` (its header, initializer, body and
/// nested members).
pub fn references_within(program: &Program, decl: DeclId) -> Vec<RefSite> {
    let collections = CollectionSemantics::default();
    let Some(file) = program.decl(decl).map(|d| d.file) else {
        return Vec::new();
    };
    let mut sites = Vec::new();
    RefWalker::new(program, &collections, file, |site| sites.push(site)).walk_decl(decl);
    sites
}
