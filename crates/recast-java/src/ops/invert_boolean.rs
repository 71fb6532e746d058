// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Invert a boolean method or field.
//!
//! Stored and returned values are negated, and so is every read, so the
//! program computes the same thing through the inverted declaration.

use std::collections::{BTreeMap, HashSet};

use recast_core::config::EngineConfig;
use recast_core::problem::{Problem, ProblemKind, ProblemList};
use serde::{Deserialize, Serialize};

use super::{check_identifier, invalid_input, resolve, resolve_kind, Planner};
use crate::ast::{AssignOp, Block, Expr, ExprKind, IdSource, Literal, NodeId, StmtKind, UnaryOp};
use crate::frontend::SymbolRef;
use crate::model::{DeclId, DeclKind, Program};
use crate::plan::{EditPlan, PlannedChange, TreeEdit};
use crate::visit::{references_to, AccessMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvertBoolean {
    pub symbol: SymbolRef,
    /// New name for the inverted declaration, e.g. `isEmpty` to `hasItems`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The logical negation of `expr`, simplified where the result stays
/// obviously equivalent.
pub fn negate(ids: &mut impl IdSource, expr: Expr) -> Expr {
    match expr.kind {
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => strip_parens(*operand),
        ExprKind::Literal(Literal::Bool(value)) => Expr {
            id: expr.id,
            kind: ExprKind::Literal(Literal::Bool(!value)),
        },
        ExprKind::Binary { op, lhs, rhs } if op.is_comparison() => Expr {
            id: expr.id,
            kind: ExprKind::Binary {
                op: op.negated().unwrap_or(op),
                lhs,
                rhs,
            },
        },
        ExprKind::Paren(inner) => {
            if matches!(
                inner.kind,
                ExprKind::Unary { op: UnaryOp::Not, .. } | ExprKind::Literal(Literal::Bool(_))
            ) {
                negate(ids, *inner)
            } else {
                let paren = Expr {
                    id: expr.id,
                    kind: ExprKind::Paren(inner),
                };
                Expr::unary(ids, UnaryOp::Not, paren)
            }
        }
        kind => Expr::unary(ids, UnaryOp::Not, Expr { id: expr.id, kind }),
    }
}

fn strip_parens(expr: Expr) -> Expr {
    match expr.kind {
        ExprKind::Paren(inner) => strip_parens(*inner),
        kind => Expr { id: expr.id, kind },
    }
}

/// Negate the value of every `return` in `block`.
fn negate_returns(ids: &mut impl IdSource, block: &mut Block) {
    for stmt in &mut block.stmts {
        match &mut stmt.kind {
            StmtKind::Return(Some(value)) => {
                let placeholder = Expr::bool(ids, false);
                let old = std::mem::replace(value, placeholder);
                *value = negate(ids, old);
            }
            StmtKind::If { then, otherwise, .. } => {
                negate_returns(ids, then);
                if let Some(otherwise) = otherwise {
                    negate_returns(ids, otherwise);
                }
            }
            StmtKind::While { body, .. } | StmtKind::Block(body) => negate_returns(ids, body),
            _ => {}
        }
    }
}

/// An assignment to the inverted field, rewritten to store the negation.
fn invert_assignment(ids: &mut impl IdSource, assign: &Expr) -> Option<Expr> {
    let ExprKind::Assign { op, target, value } = &assign.kind else {
        return None;
    };
    let (op, value) = match op {
        AssignOp::Assign => (AssignOp::Assign, negate(ids, (**value).clone())),
        AssignOp::And => (AssignOp::Or, negate(ids, (**value).clone())),
        AssignOp::Or => (AssignOp::And, negate(ids, (**value).clone())),
        other => (*other, (**value).clone()),
    };
    Some(Expr {
        id: assign.id,
        kind: ExprKind::Assign {
            op,
            target: target.clone(),
            value: Box::new(value),
        },
    })
}

impl InvertBoolean {
    fn targets(&self, program: &Program, decl: DeclId) -> Vec<DeclId> {
        if program.kind_of(decl) == Some(DeclKind::Method) {
            program.override_family(decl)
        } else {
            vec![decl]
        }
    }
}

impl Planner for InvertBoolean {
    fn label(&self) -> String {
        format!("Invert boolean {}", self.symbol.qualified_name)
    }

    fn pre_check(&self, program: &Program, _config: &EngineConfig) -> ProblemList {
        let mut problems = ProblemList::new();
        if let Some(name) = &self.name {
            check_identifier(name, &mut problems);
        }
        let kinds = [DeclKind::Method, DeclKind::Field];
        let Some(decl) = resolve_kind(program, &self.symbol, &kinds, &mut problems) else {
            return problems;
        };
        let is_boolean = program
            .decl(decl)
            .and_then(|d| d.ty.as_ref())
            .is_some_and(|t| t.is_boolean());
        if !is_boolean {
            problems.push(invalid_input(format!(
                "`{}` is not boolean",
                self.symbol.qualified_name
            )));
            return problems;
        }
        for member in self.targets(program, decl) {
            let Some(d) = program.decl(member) else {
                continue;
            };
            if d.kind == DeclKind::Method && d.body.is_none() {
                problems.push(
                    Problem::fatal(
                        ProblemKind::InvalidInput,
                        format!(
                            "`{}` has no body to invert",
                            program.display_name(member)
                        ),
                    )
                    .for_symbol(program.qualified_name(member)),
                );
            }
        }
        problems
    }

    fn prepare(&self, program: &Program, _config: &EngineConfig, problems: &mut ProblemList) -> EditPlan {
        let mut plan = EditPlan::new(program, self.label());
        let Some(decl) = resolve(program, &self.symbol, problems) else {
            return plan;
        };
        let targets = self.targets(program, decl);

        // Every member touching the declaration is rewritten in one pass so
        // nested reads and writes flip together.
        let mut owners: BTreeMap<DeclId, Sites> = BTreeMap::new();
        for target in &targets {
            if program.decl(*target).is_some_and(|d| d.body.is_some()) {
                owners.entry(*target).or_default();
            }
        }
        for site in references_to(program, &targets) {
            let Some(owner) = site.owner.filter(|_| !site.in_import) else {
                continue;
            };
            let entry = owners.entry(owner).or_default();
            match site.mode {
                AccessMode::Read | AccessMode::Unclassified => entry.reads.insert(site.node),
                AccessMode::Write | AccessMode::ReadWrite => entry.writes.insert(site.node),
            };
        }

        for (owner, mut sites) in owners {
            let Some(d) = program.decl(owner) else {
                continue;
            };
            let is_target = targets.contains(&owner);
            if let Some(body) = &d.body {
                let mut body = body.clone();
                body.walk_exprs_mut(&mut |e| sites.flip(&mut plan, e));
                if is_target {
                    negate_returns(&mut plan, &mut body);
                }
                plan.edit_decl(
                    program,
                    owner,
                    TreeEdit::SetBody {
                        decl: owner,
                        body: Some(body),
                    },
                );
            }
            if let (Some(init), false) = (&d.init, is_target) {
                let mut init = init.clone();
                init.walk_mut(&mut |e| sites.flip(&mut plan, e));
                plan.edit_decl(
                    program,
                    owner,
                    TreeEdit::SetInit {
                        decl: owner,
                        init: Some(init),
                    },
                );
            }
        }

        for target in &targets {
            let Some(d) = program.decl(*target) else {
                continue;
            };
            if d.kind == DeclKind::Field {
                let init = match &d.init {
                    Some(init) => negate(&mut plan, init.clone()),
                    None => Expr::bool(&mut plan, true),
                };
                plan.edit_decl(
                    program,
                    *target,
                    TreeEdit::SetInit {
                        decl: *target,
                        init: Some(init),
                    },
                );
            }
            if let Some(name) = &self.name {
                plan.edit_decl(
                    program,
                    *target,
                    TreeEdit::Rename {
                        decl: *target,
                        name: name.clone(),
                    },
                );
                plan.change(PlannedChange::Place { decl: *target });
            }
        }
        plan
    }
}

/// References to the inverted declaration inside one member.
#[derive(Default)]
struct Sites {
    reads: HashSet<NodeId>,
    /// Targets of assignments.
    writes: HashSet<NodeId>,
}

impl Sites {
    fn flip(&mut self, ids: &mut impl IdSource, e: &mut Expr) {
        if let ExprKind::Assign { target, .. } = &e.kind {
            if self.writes.contains(&target.id) {
                if let Some(inverted) = invert_assignment(ids, e) {
                    *e = inverted;
                }
                return;
            }
        }
        if let ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } = &e.kind
        {
            let inner = strip_parens((**operand).clone());
            if self.reads.remove(&inner.id) {
                *e = inner;
                return;
            }
        }
        if self.reads.remove(&e.id) {
            let read = std::mem::replace(e, Expr::bool(ids, false));
            *e = negate(ids, read);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;
    use crate::builder::ProgramBuilder;
    use crate::ops::test_support::{run_clean, sym};
    use crate::ops::Refactoring;

    mod negate_tests {
        use super::*;

        fn printed(program: &Program, expr: &Expr) -> String {
            crate::printer::render_expr(program, expr)
        }

        #[test]
        fn double_negation_and_literals_simplify() {
            let mut b = ProgramBuilder::new();
            let file = b.file("p/A.java", "p");
            let a = b.class(file, "A");
            let flag = b.field(a, "flag", "boolean");
            let read = b.name(flag);
            let not = b.not(read);
            let t = b.bool(true);
            let program = b.program().clone();

            let mut ids = ProgramBuilder::from_program(program.clone());
            assert_eq!(printed(&program, &negate(&mut ids, not)), "flag");
            assert_eq!(printed(&program, &negate(&mut ids, t)), "false");
        }

        #[test]
        fn comparisons_flip_their_operator() {
            let mut b = ProgramBuilder::new();
            let file = b.file("p/A.java", "p");
            let a = b.class(file, "A");
            let count = b.field(a, "count", "int");
            let read = b.name(count);
            let zero = b.int(0);
            let cmp = b.binary(BinaryOp::Gt, read, zero);
            let ready = b.field(a, "ready", "boolean");
            let r1 = b.name(ready);
            let r2 = b.name(ready);
            let both = b.binary(BinaryOp::And, r1, r2);
            let program = b.program().clone();

            let mut ids = ProgramBuilder::from_program(program.clone());
            assert_eq!(printed(&program, &negate(&mut ids, cmp)), "count <= 0");
            assert_eq!(printed(&program, &negate(&mut ids, both)), "!(ready && ready)");
        }
    }

    #[test]
    fn method_returns_and_call_sites_are_negated() {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/Queue.java", "p");
        let queue = b.class(file, "Queue");
        let size = b.field(queue, "size", "int");
        let is_empty = b.method(queue, "isEmpty", Some("boolean"));
        let read = b.name(size);
        let zero = b.int(0);
        let cmp = b.binary(BinaryOp::Eq, read, zero);
        let ret = b.ret(Some(cmp));
        b.set_body(is_empty, vec![ret]);
        let user_file = b.file("p/User.java", "p");
        let user = b.class(user_file, "User");
        let check = b.method(user, "check", Some("boolean"));
        let q = b.param(check, "q", "Queue");
        let receiver = b.name(q);
        let call = b.call(Some(receiver), is_empty, vec![]);
        let not = b.not(call);
        let ret = b.ret(Some(not));
        b.set_body(check, vec![ret]);
        let program = b.finish();

        let request = InvertBoolean {
            symbol: sym(&program, is_empty),
            name: Some("hasItems".into()),
        };
        let (_, texts) = run_clean(&program, Refactoring::InvertBoolean(request));
        let queue = &texts["p/Queue.java"];
        assert!(queue.contains("boolean hasItems() {"), "{queue}");
        assert!(queue.contains("return size != 0;"));
        assert!(texts["p/User.java"].contains("return q.hasItems();"));
    }

    #[test]
    fn field_writes_store_the_negation() {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/Door.java", "p");
        let door = b.class(file, "Door");
        let closed = b.field(door, "closed", "boolean");
        let close = b.method(door, "close", None);
        let target = b.name(closed);
        let t = b.bool(true);
        let assign = b.assign(target, t);
        let stmt = b.expr_stmt(assign);
        b.set_body(close, vec![stmt]);
        let open = b.method(door, "isOpen", Some("boolean"));
        let read = b.name(closed);
        let not = b.not(read);
        let ret = b.ret(Some(not));
        b.set_body(open, vec![ret]);
        let program = b.finish();

        let request = InvertBoolean {
            symbol: sym(&program, closed),
            name: Some("open".into()),
        };
        let (_, texts) = run_clean(&program, Refactoring::InvertBoolean(request));
        let door = &texts["p/Door.java"];
        assert!(door.contains("boolean open = true;"), "{door}");
        assert!(door.contains("open = false;"));
        assert!(door.contains("return open;"));
    }

    #[test]
    fn abstract_method_fails_pre_check() {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/Check.java", "p");
        let check = b.interface(file, "Check");
        let ok = b.method(check, "ok", Some("boolean"));
        let program = b.finish();

        let request = InvertBoolean {
            symbol: sym(&program, ok),
            name: None,
        };
        let problems = Refactoring::InvertBoolean(request).pre_check(&program, &EngineConfig::default());
        assert!(problems.has_fatal());
    }
}
