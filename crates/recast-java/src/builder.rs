// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Program construction.
//!
//! [`ProgramBuilder`] assembles a resolved [`Program`] declaration by
//! declaration. It stands in for a source front-end: tests and callers
//! build the tree they need, then [`ProgramBuilder::finish`] binds type
//! names to the declared types they denote.

use recast_core::patch::FileId;

use crate::ast::{
    AssignOp, BinaryOp, Block, BoundKind, Expr, ExprKind, IdSource, NodeId, Stmt, StmtKind,
    TypeParam, TypeRef, UnaryOp,
};
use crate::model::{CompilationUnit, DeclId, DeclKind, Declaration, Import, Modifiers, Program};

pub struct ProgramBuilder {
    program: Program,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for ProgramBuilder {
    fn node_id(&mut self) -> NodeId {
        self.program.node_id()
    }

    fn decl_id(&mut self) -> DeclId {
        self.program.decl_id()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        ProgramBuilder {
            program: Program::new(),
        }
    }

    /// Continue building on an existing program.
    pub fn from_program(program: Program) -> Self {
        ProgramBuilder { program }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    pub fn file(&mut self, path: &str, package: &str) -> FileId {
        let id = self.program.file_id();
        self.program
            .insert_file(CompilationUnit::new(id, path, package));
        id
    }

    fn add_decl(&mut self, kind: DeclKind, name: &str, file: FileId, parent: Option<DeclId>) -> DeclId {
        let id = self.program.decl_id();
        let decl = Declaration::new(id, kind, name, file, parent);
        self.program.insert_decl(decl);
        id
    }

    fn top_level(&mut self, file: FileId, name: &str, kind: DeclKind) -> DeclId {
        let id = self.add_decl(kind, name, file, None);
        self.modify(id, |m| *m = Modifiers::public());
        if let Some(unit) = self.program.file_mut(file) {
            unit.types.push(id);
        }
        id
    }

    /// A public top-level class.
    pub fn class(&mut self, file: FileId, name: &str) -> DeclId {
        self.top_level(file, name, DeclKind::Class)
    }

    /// A public top-level interface.
    pub fn interface(&mut self, file: FileId, name: &str) -> DeclId {
        self.top_level(file, name, DeclKind::Interface)
    }

    pub fn nested_class(&mut self, owner: DeclId, name: &str) -> DeclId {
        self.member(owner, DeclKind::Class, name)
    }

    fn member(&mut self, owner: DeclId, kind: DeclKind, name: &str) -> DeclId {
        let file = self.file_of(owner);
        let id = self.add_decl(kind, name, file, Some(owner));
        if let Some(decl) = self.program.decl_mut(owner) {
            decl.members.push(id);
        }
        if self.program.decl(owner).is_some_and(|d| d.is_interface()) {
            self.modify(id, |m| {
                m.visibility = crate::model::Visibility::Public;
            });
        }
        id
    }

    fn file_of(&self, decl: DeclId) -> FileId {
        self.program
            .decl(decl)
            .map(|d| d.file)
            .unwrap_or(FileId(0))
    }

    /// A method returning `ret` (`None` for `void`). Interface methods
    /// start out public and abstract.
    pub fn method(&mut self, owner: DeclId, name: &str, ret: Option<&str>) -> DeclId {
        let id = self.member(owner, DeclKind::Method, name);
        let ty = ret.map(|r| self.ty(r));
        let in_interface = self.program.decl(owner).is_some_and(|d| d.is_interface());
        if let Some(decl) = self.program.decl_mut(id) {
            decl.ty = ty;
            decl.modifiers.is_abstract = in_interface;
        }
        id
    }

    pub fn constructor(&mut self, owner: DeclId) -> DeclId {
        let name = self.program.name_of(owner).to_string();
        let id = self.member(owner, DeclKind::Constructor, &name);
        self.modify(id, |m| m.visibility = crate::model::Visibility::Public);
        self.set_body(id, Vec::new());
        id
    }

    pub fn field(&mut self, owner: DeclId, name: &str, ty: &str) -> DeclId {
        let id = self.member(owner, DeclKind::Field, name);
        let ty = self.ty(ty);
        if let Some(decl) = self.program.decl_mut(id) {
            decl.ty = Some(ty);
        }
        id
    }

    pub fn param(&mut self, method: DeclId, name: &str, ty: &str) -> DeclId {
        let file = self.file_of(method);
        let id = self.add_decl(DeclKind::Parameter, name, file, Some(method));
        let ty = self.ty(ty);
        if let Some(decl) = self.program.decl_mut(id) {
            decl.ty = Some(ty);
        }
        if let Some(decl) = self.program.decl_mut(method) {
            decl.params.push(id);
        }
        id
    }

    /// A local variable declaration; attach it with [`Self::local_stmt`].
    pub fn local(&mut self, method: DeclId, name: &str, ty: &str) -> DeclId {
        let file = self.file_of(method);
        let id = self.add_decl(DeclKind::Local, name, file, Some(method));
        let ty = self.ty(ty);
        if let Some(decl) = self.program.decl_mut(id) {
            decl.ty = Some(ty);
        }
        id
    }

    pub fn type_param(&mut self, decl: DeclId, name: &str, bounds: &[&str]) {
        let bounds: Vec<TypeRef> = bounds.iter().map(|b| self.ty(b)).collect();
        if let Some(d) = self.program.decl_mut(decl) {
            d.type_params.push(TypeParam {
                name: name.to_string(),
                bounds,
            });
        }
    }

    pub fn throws(&mut self, method: DeclId, ty: &str) {
        let ty = self.ty(ty);
        if let Some(d) = self.program.decl_mut(method) {
            d.throws.push(ty);
        }
    }

    pub fn modify(&mut self, decl: DeclId, f: impl FnOnce(&mut Modifiers)) {
        if let Some(d) = self.program.decl_mut(decl) {
            f(&mut d.modifiers);
        }
    }

    pub fn doc(&mut self, decl: DeclId, text: &str) {
        if let Some(d) = self.program.decl_mut(decl) {
            d.doc = Some(text.to_string());
        }
    }

    pub fn set_body(&mut self, method: DeclId, stmts: Vec<Stmt>) {
        let in_interface = self.is_interface_member(method);
        if let Some(d) = self.program.decl_mut(method) {
            d.body = Some(Block::new(stmts));
            if d.kind == DeclKind::Method {
                d.modifiers.is_abstract = false;
                d.modifiers.is_default = in_interface && !d.modifiers.is_static;
            }
        }
    }

    fn is_interface_member(&self, decl: DeclId) -> bool {
        self.program
            .decl(decl)
            .and_then(|d| d.parent)
            .and_then(|p| self.program.decl(p))
            .is_some_and(|p| p.is_interface())
    }

    pub fn set_init(&mut self, field: DeclId, init: Expr) {
        if let Some(d) = self.program.decl_mut(field) {
            d.init = Some(init);
        }
    }

    /// `ty extends sup` (for interfaces, adds to the extends list).
    pub fn extends(&mut self, ty: DeclId, sup: DeclId) {
        let sup_ref = self.type_ref(sup);
        let is_interface = self.program.decl(ty).is_some_and(|d| d.is_interface());
        if let Some(d) = self.program.decl_mut(ty) {
            if is_interface {
                d.implements.push(sup_ref);
            } else {
                d.extends = Some(sup_ref);
            }
        }
    }

    pub fn extends_type(&mut self, ty: DeclId, sup: TypeRef) {
        if let Some(d) = self.program.decl_mut(ty) {
            d.extends = Some(sup);
        }
    }

    pub fn implements(&mut self, ty: DeclId, iface: DeclId) {
        let iface_ref = self.type_ref(iface);
        if let Some(d) = self.program.decl_mut(ty) {
            d.implements.push(iface_ref);
        }
    }

    pub fn import(&mut self, file: FileId, path: &str) {
        let id = self.program.node_id();
        if let Some(unit) = self.program.file_mut(file) {
            unit.imports.push(Import {
                id,
                path: path.to_string(),
                decl: None,
                is_static: false,
            });
        }
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// A reference to a declared type by its simple name.
    pub fn type_ref(&mut self, ty: DeclId) -> TypeRef {
        let name = self.program.name_of(ty).to_string();
        TypeRef::to_decl(&mut self.program, name, ty)
    }

    /// Parse a type as written: `int`, `String[]`, `Map<K, List<V>>`,
    /// `? super T`. Names are bound to declared types by `finish`.
    pub fn ty(&mut self, text: &str) -> TypeRef {
        let mut parser = TypeParser {
            text: text.as_bytes(),
            pos: 0,
        };
        parser.parse(&mut self.program)
    }

    // ------------------------------------------------------------------
    // Expressions and statements
    // ------------------------------------------------------------------

    pub fn int(&mut self, value: i64) -> Expr {
        Expr::int(&mut self.program, value)
    }

    pub fn bool(&mut self, value: bool) -> Expr {
        Expr::bool(&mut self.program, value)
    }

    pub fn str(&mut self, value: &str) -> Expr {
        Expr::str(&mut self.program, value)
    }

    /// A simple name bound to `decl`.
    pub fn name(&mut self, decl: DeclId) -> Expr {
        let name = self.program.name_of(decl).to_string();
        Expr::name(&mut self.program, name, Some(decl))
    }

    pub fn this(&mut self) -> Expr {
        Expr::this(&mut self.program)
    }

    pub fn super_(&mut self) -> Expr {
        Expr::new(&mut self.program, ExprKind::Super)
    }

    pub fn field_of(&mut self, target: Expr, field: DeclId) -> Expr {
        let name = self.program.name_of(field).to_string();
        Expr::field(&mut self.program, target, name, Some(field))
    }

    /// A type used as a qualifier expression.
    pub fn type_name(&mut self, ty: DeclId) -> Expr {
        let ty = self.type_ref(ty);
        Expr::type_name(&mut self.program, ty)
    }

    pub fn call(&mut self, target: Option<Expr>, method: DeclId, args: Vec<Expr>) -> Expr {
        let name = self.program.name_of(method).to_string();
        Expr::call(&mut self.program, target, name, Some(method), args)
    }

    /// A call to a method outside the program (library code).
    pub fn call_unresolved(&mut self, target: Option<Expr>, name: &str, args: Vec<Expr>) -> Expr {
        Expr::call(&mut self.program, target, name, None, args)
    }

    pub fn new_object(&mut self, ty: DeclId, ctor: Option<DeclId>, args: Vec<Expr>) -> Expr {
        let ty = self.type_ref(ty);
        Expr::new_object(&mut self.program, ty, ctor, args)
    }

    pub fn new_of(&mut self, ty: TypeRef, ctor: Option<DeclId>, args: Vec<Expr>) -> Expr {
        Expr::new_object(&mut self.program, ty, ctor, args)
    }

    pub fn assign(&mut self, target: Expr, value: Expr) -> Expr {
        Expr::assign(&mut self.program, AssignOp::Assign, target, value)
    }

    pub fn compound(&mut self, op: AssignOp, target: Expr, value: Expr) -> Expr {
        Expr::assign(&mut self.program, op, target, value)
    }

    pub fn unary(&mut self, op: UnaryOp, operand: Expr) -> Expr {
        Expr::unary(&mut self.program, op, operand)
    }

    pub fn not(&mut self, operand: Expr) -> Expr {
        self.unary(UnaryOp::Not, operand)
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::binary(&mut self.program, op, lhs, rhs)
    }

    pub fn index(&mut self, array: Expr, index: Expr) -> Expr {
        Expr::index(&mut self.program, array, index)
    }

    pub fn ret(&mut self, expr: Option<Expr>) -> Stmt {
        Stmt::ret(&mut self.program, expr)
    }

    pub fn expr_stmt(&mut self, expr: Expr) -> Stmt {
        Stmt::expr(&mut self.program, expr)
    }

    pub fn local_stmt(&mut self, local: DeclId, init: Option<Expr>) -> Stmt {
        Stmt::new(&mut self.program, StmtKind::Local { decl: local, init })
    }

    pub fn if_stmt(&mut self, cond: Expr, then: Vec<Stmt>, otherwise: Option<Vec<Stmt>>) -> Stmt {
        Stmt::new(
            &mut self.program,
            StmtKind::If {
                cond,
                then: Block::new(then),
                otherwise: otherwise.map(Block::new),
            },
        )
    }

    pub fn comment(&mut self, text: &str) -> Stmt {
        Stmt::new(&mut self.program, StmtKind::Comment(text.to_string()))
    }

    // ------------------------------------------------------------------
    // Linking
    // ------------------------------------------------------------------

    /// Bind unresolved type names and imports to declared types, then
    /// return the program.
    pub fn finish(mut self) -> Program {
        let types: Vec<(String, String, DeclId)> = self
            .program
            .decls()
            .filter(|d| d.is_type())
            .map(|d| (d.name.clone(), self.program.qualified_name(d.id), d.id))
            .collect();
        let lookup = |name: &str| -> Option<DeclId> {
            if name.contains('.') {
                return types.iter().find(|(_, q, _)| q == name).map(|(_, _, id)| *id);
            }
            let mut matches = types.iter().filter(|(n, _, _)| n == name);
            match (matches.next(), matches.next()) {
                (Some((_, _, id)), None) => Some(*id),
                _ => None,
            }
        };

        let ids: Vec<DeclId> = self.program.decls().map(|d| d.id).collect();
        for id in ids {
            let type_vars: Vec<String> = self.type_vars_in_scope(id);
            let Some(decl) = self.program.decl_mut(id) else {
                continue;
            };
            let mut bind = |ty: &mut TypeRef| {
                if ty.decl.is_none() && ty.name != "?" && !type_vars.contains(&ty.name) {
                    ty.decl = lookup(&ty.name);
                }
            };
            for ty in decl.header_types_mut() {
                ty.for_each_mut(&mut bind);
            }
            let mut bind_expr = |e: &mut Expr| match &mut e.kind {
                ExprKind::TypeName(ty) | ExprKind::Cast { ty, .. } | ExprKind::New { ty, .. } => {
                    ty.for_each_mut(&mut bind)
                }
                ExprKind::Call { type_args, .. } => {
                    for ty in type_args {
                        ty.for_each_mut(&mut bind);
                    }
                }
                _ => {}
            };
            if let Some(init) = &mut decl.init {
                init.walk_mut(&mut bind_expr);
            }
            if let Some(body) = &mut decl.body {
                body.walk_exprs_mut(&mut bind_expr);
            }
        }

        for file in self.program.file_ids() {
            if let Some(unit) = self.program.file_mut(file) {
                for import in &mut unit.imports {
                    if import.decl.is_none() {
                        import.decl = lookup(&import.path);
                    }
                }
            }
        }
        self.program
    }

    fn type_vars_in_scope(&self, id: DeclId) -> Vec<String> {
        let mut vars = Vec::new();
        let mut current = self.program.decl(id);
        while let Some(decl) = current {
            vars.extend(decl.type_params.iter().map(|tp| tp.name.clone()));
            current = decl.parent.and_then(|p| self.program.decl(p));
        }
        vars
    }
}

// ============================================================================
// Type Parser
// ============================================================================

struct TypeParser<'a> {
    text: &'a [u8],
    pos: usize,
}

impl TypeParser<'_> {
    fn skip_ws(&mut self) {
        while self.pos < self.text.len() && self.text[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.text[self.pos..].starts_with(token.as_bytes()) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> String {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.text.len() {
            let c = self.text[self.pos];
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'$' || c == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.text[start..self.pos]).into_owned()
    }

    fn parse(&mut self, ids: &mut impl IdSource) -> TypeRef {
        if self.eat("?") {
            let bound = if self.eat("extends") {
                Some((BoundKind::Extends, self.parse(ids)))
            } else if self.eat("super") {
                Some((BoundKind::Super, self.parse(ids)))
            } else {
                None
            };
            return TypeRef::wildcard(ids, bound);
        }
        let name = self.ident();
        let mut ty = TypeRef::named(ids, name);
        if self.eat("<") {
            loop {
                ty.args.push(self.parse(ids));
                if !self.eat(",") {
                    break;
                }
            }
            self.eat(">");
        }
        while self.eat("[]") {
            ty.dims += 1;
        }
        ty
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_generic_types() {
        let mut b = ProgramBuilder::new();
        let ty = b.ty("Map<K, List<? super T>>[]");
        assert_eq!(ty.name, "Map");
        assert_eq!(ty.dims, 1);
        assert_eq!(ty.args.len(), 2);
        let inner = &ty.args[1].args[0];
        assert_eq!(inner.name, "?");
        let bound = inner.bound.as_ref().unwrap();
        assert_eq!(bound.kind, BoundKind::Super);
        assert_eq!(bound.ty.name, "T");
    }

    #[test]
    fn finish_binds_type_names_but_not_type_variables() {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/A.java", "p");
        let a = b.class(file, "A");
        b.type_param(a, "T", &[]);
        let other = b.class(file, "T2");
        let f = b.field(a, "peer", "T2");
        let g = b.field(a, "value", "T");
        let program = b.finish();
        assert_eq!(program.decl(f).unwrap().ty.as_ref().unwrap().decl, Some(other));
        assert_eq!(program.decl(g).unwrap().ty.as_ref().unwrap().decl, None);
    }

    #[test]
    fn interface_members_are_public_abstract() {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/I.java", "p");
        let i = b.interface(file, "I");
        let m = b.method(i, "m", Some("int"));
        let program = b.finish();
        let decl = program.decl(m).unwrap();
        assert!(decl.is_abstract());
        assert_eq!(decl.visibility(), crate::model::Visibility::Public);
    }
}
