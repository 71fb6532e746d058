// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Inline a static factory method back into direct construction.

use std::collections::HashMap;

use recast_core::config::EngineConfig;
use recast_core::problem::{Problem, ProblemKind, ProblemList};
use serde::{Deserialize, Serialize};

use super::{invalid_input, resolve_kind, Instantiate, Planner};
use crate::ast::{Expr, ExprKind, StmtKind, TypeRef};
use crate::frontend::SymbolRef;
use crate::model::{DeclId, DeclKind, Declaration, Program};
use crate::plan::{EditPlan, PlannedChange, TreeEdit};
use crate::visit::references_to;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineFactory {
    pub factory: SymbolRef,
    /// Keep the factory method after its call sites are inlined.
    #[serde(default)]
    pub keep_factory: bool,
}

/// The `new` expression a conforming factory returns.
fn created(decl: &Declaration) -> Option<&Expr> {
    let body = decl.body.as_ref()?;
    let [stmt] = body.stmts.as_slice() else {
        return None;
    };
    match &stmt.kind {
        StmtKind::Return(Some(e)) if matches!(e.kind, ExprKind::New { .. }) => Some(e),
        _ => None,
    }
}

impl Planner for InlineFactory {
    fn label(&self) -> String {
        format!("Inline factory {}", self.factory.qualified_name)
    }

    fn pre_check(&self, program: &Program, _config: &EngineConfig) -> ProblemList {
        let mut problems = ProblemList::new();
        let Some(factory) = resolve_kind(program, &self.factory, &[DeclKind::Method], &mut problems) else {
            return problems;
        };
        let Some(decl) = program.decl(factory) else {
            return problems;
        };
        if !decl.is_static() {
            problems.push(invalid_input(format!("`{}` is not static", decl.name)));
        }
        if created(decl).is_none() {
            problems.push(invalid_input(format!(
                "`{}` is not a factory: its body must be a single `return new ...;`",
                decl.name
            )));
        }
        problems
    }

    fn prepare(&self, program: &Program, _config: &EngineConfig, problems: &mut ProblemList) -> EditPlan {
        let mut plan = EditPlan::new(program, self.label());
        let Some(factory) = resolve_kind(program, &self.factory, &[DeclKind::Method], problems) else {
            return plan;
        };
        let Some(decl) = program.decl(factory) else {
            return plan;
        };
        let Some(ExprKind::New { ty, ctor, args: made }) = created(decl).map(|e| &e.kind) else {
            return plan;
        };
        let params = program.params(factory);

        for site in references_to(program, &[factory]) {
            if site.in_import || site.owner.is_some_and(|o| program.is_within(o, factory)) {
                continue;
            }
            let Some((_, call)) = program.find_expr(site.node) else {
                continue;
            };
            let ExprKind::Call { type_args, args, .. } = &call.kind else {
                continue;
            };
            if let (Some(ctor), Some(user)) = (ctor, site.owner) {
                let reachable = program.decl(*ctor).is_some_and(|c| {
                    let owner = c.parent.unwrap_or(c.id);
                    program.is_accessible_from(owner, c.visibility(), user)
                });
                if !reachable {
                    problems.push(
                        Problem::fatal(
                            ProblemKind::VisibilityViolation,
                            format!(
                                "`{}` cannot call constructor `{}` directly",
                                program.display_name(user),
                                program.display_name(*ctor)
                            ),
                        )
                        .for_symbol(program.qualified_name(*ctor)),
                    );
                    continue;
                }
            }

            let bound: HashMap<DeclId, Expr> = params.iter().copied().zip(args.iter().cloned()).collect();
            let new_args = made
                .iter()
                .map(|arg| match &arg.kind {
                    // A parameter passed straight through keeps the caller's node.
                    ExprKind::Name { decl: Some(d), .. } if bound.contains_key(d) => bound[d].clone(),
                    _ => Instantiate {
                        program,
                        args: &bound,
                        receiver: None,
                    }
                    .expr(&mut plan, arg),
                })
                .collect();
            let new_ty = match ty.decl {
                Some(class) if !type_args.is_empty() => {
                    TypeRef::to_decl(&mut plan, ty.name.clone(), class).with_args(type_args.clone())
                }
                // Factory type parameters mean nothing at the call site.
                Some(class) if !decl.type_params.is_empty() => {
                    TypeRef::to_decl(&mut plan, ty.name.clone(), class)
                }
                _ => plan.copy_type(ty),
            };
            let with = Expr {
                id: call.id,
                kind: ExprKind::New {
                    ty: new_ty,
                    ctor: *ctor,
                    args: new_args,
                },
            };
            plan.replace_expr(program, site.node, with);
        }

        if !self.keep_factory {
            plan.edit_decl(program, factory, TreeEdit::RemoveMember { member: factory });
            plan.change(PlannedChange::Delete {
                decls: vec![factory],
                search_comments: false,
            });
        }
        plan
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;
    use crate::ops::test_support::{run_clean, sym};
    use crate::ops::Refactoring;

    fn origin() -> (Program, DeclId, DeclId) {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/Point.java", "p");
        let point = b.class(file, "Point");
        let ctor = b.constructor(point);
        b.param(ctor, "x", "int");
        b.param(ctor, "y", "int");
        let on_axis = b.method(point, "onAxis", Some("Point"));
        b.modify(on_axis, |m| m.is_static = true);
        let x = b.param(on_axis, "x", "int");
        let rx = b.name(x);
        let zero = b.int(0);
        let new = b.new_object(point, Some(ctor), vec![rx, zero]);
        let ret = b.ret(Some(new));
        b.set_body(on_axis, vec![ret]);

        let main_file = b.file("p/Main.java", "p");
        let main = b.class(main_file, "Main");
        let run = b.method(main, "run", Some("Point"));
        let qualifier = b.type_name(point);
        let five = b.int(5);
        let call = b.call(Some(qualifier), on_axis, vec![five]);
        let ret = b.ret(Some(call));
        b.set_body(run, vec![ret]);
        (b.finish(), point, on_axis)
    }

    #[test]
    fn call_sites_construct_directly() {
        let (program, _, on_axis) = origin();
        let op = Refactoring::InlineFactory(InlineFactory {
            factory: sym(&program, on_axis),
            keep_factory: false,
        });
        let (_, texts) = run_clean(&program, op);
        assert!(texts["p/Main.java"].contains("return new Point(5, 0);"));
        assert!(!texts["p/Point.java"].contains("onAxis"));
    }

    #[test]
    fn kept_factory_survives() {
        let (program, _, on_axis) = origin();
        let op = Refactoring::InlineFactory(InlineFactory {
            factory: sym(&program, on_axis),
            keep_factory: true,
        });
        let (_, texts) = run_clean(&program, op);
        assert!(texts["p/Point.java"].contains("static Point onAxis(int x) {"));
    }

    #[test]
    fn body_doing_more_than_construct_is_rejected() {
        let (program, point, _) = origin();
        let mut b = ProgramBuilder::from_program(program);
        let other = b.method(point, "make", Some("Point"));
        b.modify(other, |m| m.is_static = true);
        let note = b.comment("cached");
        let null = Expr::null(&mut b);
        let ret = b.ret(Some(null));
        b.set_body(other, vec![note, ret]);
        let program = b.finish();

        let op = Refactoring::InlineFactory(InlineFactory {
            factory: sym(&program, other),
            keep_factory: false,
        });
        assert!(op.pre_check(&program, &EngineConfig::default()).has_fatal());
    }
}
