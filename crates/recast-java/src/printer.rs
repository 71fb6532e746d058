// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Source printer.
//!
//! Renders compilation units to text. References that resolve to a
//! declaration print that declaration's *current* name (qualified when the
//! reference was written qualified), so tree edits to declarations flow to
//! every use without touching the use sites. The printer records the span
//! of every printed identifier, keyed by node id, for usage locations.

use std::collections::HashMap;

use recast_core::patch::{FileId, Span};

use crate::ast::{Block, Expr, ExprKind, Literal, Stmt, StmtKind, TypeRef, UnaryOp};
use crate::model::{CompilationUnit, DeclId, DeclKind, Declaration, Program};

/// A comment region in rendered text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentSpan {
    pub span: Span,
    /// Declaration whose documentation (or body) holds the comment.
    pub owner: DeclId,
    /// Statement id for line comments inside bodies.
    pub stmt: Option<crate::ast::NodeId>,
}

/// Rendered file text with identifier positions.
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    pub text: String,
    /// Identifier span of every printed reference node.
    pub spans: HashMap<crate::ast::NodeId, Span>,
    /// Name span of every printed declaration.
    pub decl_spans: HashMap<DeclId, Span>,
    pub comments: Vec<CommentSpan>,
}

/// Render one compilation unit, `None` if the file is not in the program.
pub fn render_file(program: &Program, file: FileId) -> Option<Rendered> {
    let unit = program.file(file)?;
    let mut printer = Printer::new(program);
    printer.unit(unit);
    Some(printer.finish())
}

/// Render an expression on its own.
pub fn render_expr(program: &Program, expr: &Expr) -> String {
    let mut printer = Printer::new(program);
    printer.expr(expr, 0);
    printer.out
}

/// Render a type reference on its own.
pub fn render_type(program: &Program, ty: &TypeRef) -> String {
    let mut printer = Printer::new(program);
    printer.type_ref(ty);
    printer.out
}

// ============================================================================
// Printer
// ============================================================================

const INDENT: &str = "    ";

/// Precedence of an expression as printed; higher binds tighter.
fn precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Assign { .. } => 0,
        ExprKind::Conditional { .. } => 1,
        ExprKind::Binary { op, .. } => op.precedence() + 1,
        ExprKind::Unary { op, .. } => match op {
            UnaryOp::PostInc | UnaryOp::PostDec => 13,
            _ => 12,
        },
        ExprKind::Cast { .. } => 12,
        _ => 14,
    }
}

struct Printer<'p> {
    program: &'p Program,
    out: String,
    depth: usize,
    rendered: Rendered,
}

impl<'p> Printer<'p> {
    fn new(program: &'p Program) -> Self {
        Printer {
            program,
            out: String::new(),
            depth: 0,
            rendered: Rendered::default(),
        }
    }

    fn finish(mut self) -> Rendered {
        self.rendered.text = self.out;
        self.rendered
    }

    fn pos(&self) -> u64 {
        self.out.len() as u64
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }

    fn line(&mut self, text: &str) {
        self.indent();
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Push an identifier, recording its span under `node`.
    fn ident(&mut self, node: crate::ast::NodeId, name: &str) {
        let start = self.pos();
        self.out.push_str(name);
        self.rendered.spans.insert(node, Span::new(start, self.pos()));
    }

    fn decl_name(&mut self, decl: &Declaration) {
        let start = self.pos();
        self.out.push_str(&decl.name);
        self.rendered
            .decl_spans
            .insert(decl.id, Span::new(start, self.pos()));
    }

    fn current_name<'a>(&'a self, decl: Option<DeclId>, written: &'a str) -> &'a str {
        decl.and_then(|d| self.program.decl(d))
            .map(|d| d.name.as_str())
            .unwrap_or(written)
    }

    // ------------------------------------------------------------------
    // Compilation units and declarations
    // ------------------------------------------------------------------

    fn unit(&mut self, unit: &CompilationUnit) {
        if !unit.package.is_empty() {
            self.out.push_str(&format!("package {};\n\n", unit.package));
        }
        if !unit.imports.is_empty() {
            for import in &unit.imports {
                self.out.push_str("import ");
                if import.is_static {
                    self.out.push_str("static ");
                }
                let path = match import.decl.filter(|d| self.program.contains(*d)) {
                    Some(decl) => self.program.qualified_name(decl),
                    None => import.path.clone(),
                };
                self.ident(import.id, &path);
                self.out.push_str(";\n");
            }
            self.out.push('\n');
        }
        for (i, ty) in unit.types.iter().enumerate() {
            if i > 0 {
                self.out.push('\n');
            }
            if let Some(decl) = self.program.decl(*ty) {
                self.declaration(decl, false);
            }
        }
    }

    fn doc(&mut self, decl: &Declaration) {
        let Some(doc) = &decl.doc else {
            return;
        };
        let start = self.pos();
        self.line("/**");
        for line in doc.lines() {
            if line.is_empty() {
                self.line(" *");
            } else {
                self.line(&format!(" * {line}"));
            }
        }
        self.line(" */");
        self.rendered.comments.push(CommentSpan {
            span: Span::new(start, self.pos()),
            owner: decl.id,
            stmt: None,
        });
    }

    fn modifiers(&mut self, decl: &Declaration, in_interface: bool) {
        let m = &decl.modifiers;
        if !in_interface {
            if let Some(keyword) = m.visibility.keyword() {
                self.out.push_str(keyword);
                self.out.push(' ');
            }
            if m.is_abstract && decl.kind != DeclKind::Interface {
                self.out.push_str("abstract ");
            }
        }
        if m.is_default && in_interface {
            self.out.push_str("default ");
        }
        let implicit_static = in_interface && decl.kind == DeclKind::Field;
        if m.is_static && !implicit_static && !(in_interface && decl.is_type()) {
            self.out.push_str("static ");
        }
        if m.is_final && !implicit_static {
            self.out.push_str("final ");
        }
    }

    fn declaration(&mut self, decl: &Declaration, in_interface: bool) {
        self.doc(decl);
        match decl.kind {
            DeclKind::Class | DeclKind::Interface => self.type_decl(decl, in_interface),
            DeclKind::Method | DeclKind::Constructor => self.executable(decl, in_interface),
            DeclKind::Field => self.field(decl, in_interface),
            DeclKind::Parameter | DeclKind::Local => {}
        }
    }

    fn type_params(&mut self, decl: &Declaration) {
        if decl.type_params.is_empty() {
            return;
        }
        self.out.push('<');
        for (i, tp) in decl.type_params.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.out.push_str(&tp.name);
            for (j, bound) in tp.bounds.iter().enumerate() {
                self.out.push_str(if j == 0 { " extends " } else { " & " });
                self.type_ref(bound);
            }
        }
        self.out.push('>');
    }

    fn type_list(&mut self, types: &[TypeRef]) {
        for (i, ty) in types.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.type_ref(ty);
        }
    }

    fn type_decl(&mut self, decl: &Declaration, in_interface: bool) {
        self.indent();
        self.modifiers(decl, in_interface);
        self.out.push_str(if decl.is_interface() {
            "interface "
        } else {
            "class "
        });
        self.decl_name(decl);
        self.type_params(decl);
        if let Some(sup) = &decl.extends {
            self.out.push_str(" extends ");
            self.type_ref(sup);
        }
        if !decl.implements.is_empty() {
            self.out.push_str(if decl.is_interface() {
                " extends "
            } else {
                " implements "
            });
            self.type_list(&decl.implements);
        }
        self.out.push_str(" {\n");
        self.depth += 1;
        let mut previous: Option<DeclKind> = None;
        for member in &decl.members {
            let Some(m) = self.program.decl(*member) else {
                continue;
            };
            let grouped = previous == Some(DeclKind::Field) && m.kind == DeclKind::Field;
            if previous.is_some() && !grouped {
                self.out.push('\n');
            }
            self.declaration(m, decl.is_interface());
            previous = Some(m.kind);
        }
        self.depth -= 1;
        self.line("}");
    }

    fn executable(&mut self, decl: &Declaration, in_interface: bool) {
        if decl.modifiers.is_override {
            self.line("@Override");
        }
        self.indent();
        self.modifiers(decl, in_interface);
        if !decl.type_params.is_empty() {
            self.type_params(decl);
            self.out.push(' ');
        }
        if decl.kind == DeclKind::Method {
            match &decl.ty {
                Some(ty) => self.type_ref(ty),
                None => self.out.push_str("void"),
            }
            self.out.push(' ');
        }
        self.decl_name(decl);
        self.out.push('(');
        for (i, param) in decl.params.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            if let Some(p) = self.program.decl(*param) {
                if p.modifiers.is_final {
                    self.out.push_str("final ");
                }
                if let Some(ty) = &p.ty {
                    self.type_ref(ty);
                }
                self.out.push(' ');
                self.decl_name(p);
            }
        }
        self.out.push(')');
        if !decl.throws.is_empty() {
            self.out.push_str(" throws ");
            self.type_list(&decl.throws);
        }
        match &decl.body {
            Some(body) => {
                self.out.push_str(" {\n");
                self.depth += 1;
                self.block_stmts(body, decl.id);
                self.depth -= 1;
                self.line("}");
            }
            None => self.out.push_str(";\n"),
        }
    }

    fn field(&mut self, decl: &Declaration, in_interface: bool) {
        self.indent();
        self.modifiers(decl, in_interface);
        if let Some(ty) = &decl.ty {
            self.type_ref(ty);
        }
        self.out.push(' ');
        self.decl_name(decl);
        if let Some(init) = &decl.init {
            self.out.push_str(" = ");
            self.expr(init, 0);
        }
        self.out.push_str(";\n");
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn block_stmts(&mut self, block: &Block, owner: DeclId) {
        for stmt in &block.stmts {
            self.stmt(stmt, owner);
        }
    }

    fn nested_block(&mut self, block: &Block, owner: DeclId) {
        self.out.push_str("{\n");
        self.depth += 1;
        self.block_stmts(block, owner);
        self.depth -= 1;
        self.indent();
        self.out.push('}');
    }

    fn stmt(&mut self, stmt: &Stmt, owner: DeclId) {
        self.indent();
        match &stmt.kind {
            StmtKind::Expr(e) => {
                self.expr(e, 0);
                self.out.push(';');
            }
            StmtKind::Return(e) => {
                self.out.push_str("return");
                if let Some(e) = e {
                    self.out.push(' ');
                    self.expr(e, 0);
                }
                self.out.push(';');
            }
            StmtKind::Local { decl, init } => {
                if let Some(local) = self.program.decl(*decl) {
                    if local.modifiers.is_final {
                        self.out.push_str("final ");
                    }
                    if let Some(ty) = &local.ty {
                        self.type_ref(ty);
                    }
                    self.out.push(' ');
                    self.decl_name(local);
                }
                if let Some(init) = init {
                    self.out.push_str(" = ");
                    self.expr(init, 0);
                }
                self.out.push(';');
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                self.out.push_str("if (");
                self.expr(cond, 0);
                self.out.push_str(") ");
                self.nested_block(then, owner);
                if let Some(otherwise) = otherwise {
                    self.out.push_str(" else ");
                    self.nested_block(otherwise, owner);
                }
            }
            StmtKind::While { cond, body } => {
                self.out.push_str("while (");
                self.expr(cond, 0);
                self.out.push_str(") ");
                self.nested_block(body, owner);
            }
            StmtKind::Throw(e) => {
                self.out.push_str("throw ");
                self.expr(e, 0);
                self.out.push(';');
            }
            StmtKind::Block(b) => self.nested_block(b, owner),
            StmtKind::Comment(text) => {
                let start = self.pos();
                self.out.push_str("// ");
                self.out.push_str(text);
                self.rendered.comments.push(CommentSpan {
                    span: Span::new(start, self.pos()),
                    owner,
                    stmt: Some(stmt.id),
                });
            }
        }
        self.out.push('\n');
    }

    // ------------------------------------------------------------------
    // Expressions and types
    // ------------------------------------------------------------------

    fn type_ref(&mut self, ty: &TypeRef) {
        let name = match ty.decl.filter(|d| self.program.contains(*d)) {
            Some(decl) if ty.is_qualified() => self.program.qualified_name(decl),
            Some(decl) => self.program.name_of(decl).to_string(),
            None => ty.name.clone(),
        };
        self.ident(ty.id, &name);
        if let Some(bound) = &ty.bound {
            self.out.push_str(match bound.kind {
                crate::ast::BoundKind::Extends => " extends ",
                crate::ast::BoundKind::Super => " super ",
            });
            self.type_ref(&bound.ty);
        }
        if !ty.args.is_empty() {
            self.out.push('<');
            self.type_list(&ty.args);
            self.out.push('>');
        }
        for _ in 0..ty.dims {
            self.out.push_str("[]");
        }
    }

    fn args(&mut self, args: &[Expr]) {
        self.out.push('(');
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.expr(arg, 0);
        }
        self.out.push(')');
    }

    /// Print `expr`, parenthesized when it binds looser than `min`.
    fn expr(&mut self, expr: &Expr, min: u8) {
        let prec = precedence(expr);
        let wrap = prec < min;
        if wrap {
            self.out.push('(');
        }
        match &expr.kind {
            ExprKind::Literal(lit) => self.literal(lit),
            ExprKind::Name { name, decl } => {
                let name = self.current_name(*decl, name).to_string();
                self.ident(expr.id, &name);
            }
            ExprKind::FieldAccess { target, name, decl } => {
                self.expr(target, 14);
                self.out.push('.');
                let name = self.current_name(*decl, name).to_string();
                self.ident(expr.id, &name);
            }
            ExprKind::TypeName(ty) => self.type_ref(ty),
            ExprKind::This => self.out.push_str("this"),
            ExprKind::Super => self.out.push_str("super"),
            ExprKind::Index { array, index } => {
                self.expr(array, 14);
                self.out.push('[');
                self.expr(index, 0);
                self.out.push(']');
            }
            ExprKind::Call {
                target,
                name,
                method,
                type_args,
                args,
            } => {
                if let Some(target) = target {
                    self.expr(target, 14);
                    self.out.push('.');
                    if !type_args.is_empty() {
                        self.out.push('<');
                        self.type_list(type_args);
                        self.out.push('>');
                    }
                }
                let name = self.current_name(*method, name).to_string();
                self.ident(expr.id, &name);
                self.args(args);
            }
            ExprKind::New { ty, args, .. } => {
                self.out.push_str("new ");
                let start = self.pos();
                self.type_ref(ty);
                if let Some(span) = self.rendered.spans.get(&ty.id).copied() {
                    self.rendered
                        .spans
                        .insert(expr.id, Span::new(start.max(span.start), span.end));
                }
                self.args(args);
            }
            ExprKind::Assign { op, target, value } => {
                self.expr(target, 1);
                self.out.push(' ');
                self.out.push_str(op.symbol());
                self.out.push(' ');
                self.expr(value, 0);
            }
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Not => {
                    self.out.push('!');
                    self.expr(operand, 12);
                }
                UnaryOp::Neg => {
                    self.out.push('-');
                    self.expr(operand, 12);
                }
                UnaryOp::PreInc => {
                    self.out.push_str("++");
                    self.expr(operand, 12);
                }
                UnaryOp::PreDec => {
                    self.out.push_str("--");
                    self.expr(operand, 12);
                }
                UnaryOp::PostInc => {
                    self.expr(operand, 13);
                    self.out.push_str("++");
                }
                UnaryOp::PostDec => {
                    self.expr(operand, 13);
                    self.out.push_str("--");
                }
            },
            ExprKind::Binary { op, lhs, rhs } => {
                let own = op.precedence() + 1;
                self.expr(lhs, own);
                self.out.push(' ');
                self.out.push_str(op.symbol());
                self.out.push(' ');
                self.expr(rhs, own + 1);
            }
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond, 2);
                self.out.push_str(" ? ");
                self.expr(then, 1);
                self.out.push_str(" : ");
                self.expr(otherwise, 1);
            }
            ExprKind::Paren(inner) => {
                self.out.push('(');
                self.expr(inner, 0);
                self.out.push(')');
            }
            ExprKind::Cast { ty, expr: inner } => {
                self.out.push('(');
                self.type_ref(ty);
                self.out.push_str(") ");
                self.expr(inner, 12);
            }
        }
        if wrap {
            self.out.push(')');
        }
    }

    fn literal(&mut self, lit: &Literal) {
        match lit {
            Literal::Int(v) => self.out.push_str(&v.to_string()),
            Literal::Bool(v) => self.out.push_str(if *v { "true" } else { "false" }),
            Literal::Str(s) => {
                self.out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => self.out.push_str("\\\""),
                        '\\' => self.out.push_str("\\\\"),
                        '\n' => self.out.push_str("\\n"),
                        c => self.out.push(c),
                    }
                }
                self.out.push('"');
            }
            Literal::Char(c) => {
                self.out.push('\'');
                match c {
                    '\'' => self.out.push_str("\\'"),
                    '\\' => self.out.push_str("\\\\"),
                    c => self.out.push(*c),
                }
                self.out.push('\'');
            }
            Literal::Null => self.out.push_str("null"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AssignOp, BinaryOp};
    use crate::builder::ProgramBuilder;

    mod layout_tests {
        use super::*;

        #[test]
        fn renders_class_with_members() {
            let mut b = ProgramBuilder::new();
            let file = b.file("p/B.java", "p");
            b.import(file, "java.util.List");
            let class = b.class(file, "B");
            let f = b.field(class, "count", "int");
            b.modify(f, |m| m.visibility = crate::model::Visibility::Private);
            let one = b.int(1);
            b.set_init(f, one);
            let m = b.method(class, "a", Some("int"));
            let one = b.int(1);
            let ret = b.ret(Some(one));
            b.set_body(m, vec![ret]);
            let program = b.finish();

            let rendered = render_file(&program, file).unwrap();
            assert_eq!(
                rendered.text,
                "package p;\n\nimport java.util.List;\n\npublic class B {\n    private int count = 1;\n\n    int a() {\n        return 1;\n    }\n}\n"
            );
            let span = rendered.decl_spans[&m];
            assert_eq!(&rendered.text[span.start as usize..span.end as usize], "a");
        }

        #[test]
        fn interface_members_omit_implicit_modifiers() {
            let mut b = ProgramBuilder::new();
            let file = b.file("p/I.java", "p");
            let i = b.interface(file, "I");
            b.method(i, "size", Some("int"));
            let d = b.method(i, "empty", Some("boolean"));
            let t = b.bool(true);
            let ret = b.ret(Some(t));
            b.set_body(d, vec![ret]);
            let program = b.finish();

            let text = render_file(&program, file).unwrap().text;
            assert!(text.contains("    int size();\n"));
            assert!(text.contains("    default boolean empty() {\n"));
            assert!(!text.contains("public int size"));
        }

        #[test]
        fn doc_comments_are_recorded() {
            let mut b = ProgramBuilder::new();
            let file = b.file("A.java", "");
            let a = b.class(file, "A");
            b.doc(a, "Holds state.\nSee {@link A}.");
            let program = b.finish();

            let rendered = render_file(&program, file).unwrap();
            assert!(rendered.text.starts_with("/**\n * Holds state.\n * See {@link A}.\n */\npublic class A {\n}\n"));
            assert_eq!(rendered.comments.len(), 1);
            assert_eq!(rendered.comments[0].owner, a);
        }
    }

    mod expression_tests {
        use super::*;

        #[test]
        fn parenthesizes_by_precedence() {
            let mut b = ProgramBuilder::new();
            let file = b.file("A.java", "");
            let a = b.class(file, "A");
            let x = b.field(a, "x", "int");
            let (one, two, three) = (b.int(1), b.int(2), b.int(3));
            let sum = b.binary(BinaryOp::Add, one, two);
            let product = b.binary(BinaryOp::Mul, sum, three);
            let target = b.name(x);
            let assign = b.compound(AssignOp::Add, target, product);
            let program = b.finish();
            assert_eq!(render_expr(&program, &assign), "x += (1 + 2) * 3");
        }

        #[test]
        fn not_wraps_comparison() {
            let mut b = ProgramBuilder::new();
            let file = b.file("A.java", "");
            let a = b.class(file, "A");
            let x = b.field(a, "x", "int");
            let name = b.name(x);
            let zero = b.int(0);
            let cmp = b.binary(BinaryOp::Lt, name, zero);
            let not = b.not(cmp);
            let program = b.finish();
            assert_eq!(render_expr(&program, &not), "!(x < 0)");
        }

        #[test]
        fn references_follow_declaration_names() {
            let mut b = ProgramBuilder::new();
            let file = b.file("A.java", "");
            let a = b.class(file, "A");
            let x = b.field(a, "x", "int");
            let read = b.name(x);
            let mut program = b.finish();
            program.decl_mut(x).unwrap().name = "y".to_string();
            assert_eq!(render_expr(&program, &read), "y");
        }
    }
}
