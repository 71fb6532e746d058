// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Introduce a parameter from an expression.
//!
//! The expression (and, with `replace_all`, every structural match of it)
//! is replaced by a new trailing parameter. Each call site passes its own
//! instantiation of the expression. With `keep_overload` the old signature
//! survives as a delegator to the new one.

use std::collections::HashMap;

use recast_core::config::EngineConfig;
use recast_core::patch::FileId;
use recast_core::problem::{Problem, ProblemKind, ProblemList};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_identifier, invalid_input, resolve_kind, Instantiate, Planner};
use crate::ast::{Block, Expr, ExprKind, IdSource, NodeId, Renumber, Stmt, TypeRef};
use crate::frontend::SymbolRef;
use crate::model::{DeclId, DeclKind, Declaration, Program};
use crate::plan::{EditPlan, PlannedChange, TreeEdit};
use crate::typing::expr_type;
use crate::visit::references_to;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntroduceParameter {
    pub method: SymbolRef,
    /// Node id of the selected expression inside the method body.
    pub expression: NodeId,
    pub name: String,
    #[serde(default)]
    pub replace_all: bool,
    /// Keep the old signature as a delegating overload.
    #[serde(default)]
    pub keep_overload: bool,
}

/// What the selection resolved to.
struct Selection<'p> {
    method: DeclId,
    expr: &'p Expr,
}

impl IntroduceParameter {
    fn select<'p>(&self, program: &'p Program, problems: &mut ProblemList) -> Option<Selection<'p>> {
        let method = resolve_kind(program, &self.method, &[DeclKind::Method], problems)?;
        let expr = match program.find_expr(self.expression) {
            Some((owner, expr)) if owner == method => expr,
            _ => {
                problems.push(
                    Problem::fatal(
                        ProblemKind::UnresolvableSymbol,
                        format!(
                            "expression {} is not inside `{}`",
                            self.expression, self.method.qualified_name
                        ),
                    )
                    .for_symbol(self.method.qualified_name.clone()),
                );
                return None;
            }
        };
        Some(Selection { method, expr })
    }

    fn is_match(&self, selected: &Expr, candidate: &Expr) -> bool {
        candidate.id == selected.id || (self.replace_all && candidate.same_as(selected))
    }

    /// Arguments of `call` keyed by `method`'s parameters, plus the call's
    /// receiver when it is an ordinary value.
    fn bindings(program: &Program, method: DeclId, call: &Expr) -> (HashMap<DeclId, Expr>, Option<Expr>) {
        let (target, args) = match &call.kind {
            ExprKind::Call { target, args, .. } => (target.as_deref(), args),
            _ => return (HashMap::new(), None),
        };
        let params = program.params(method);
        let bound = params.iter().copied().zip(args.iter().cloned()).collect();
        let receiver = target
            .filter(|t| !matches!(t.kind, ExprKind::This | ExprKind::Super | ExprKind::TypeName(_)))
            .cloned();
        (bound, receiver)
    }

    /// The argument a call site passes for the new parameter.
    fn instantiate(&self, plan: &mut EditPlan, program: &Program, selection: &Selection<'_>, call: &Expr) -> Expr {
        let (args, receiver) = Self::bindings(program, selection.method, call);
        Instantiate {
            program,
            args: &args,
            receiver: receiver.as_ref(),
        }
        .expr(plan, selection.expr)
    }

    /// `body` with the selection replaced by `param`.
    fn substitute(&self, plan: &mut EditPlan, body: &Block, selected: &Expr, param: DeclId) -> Block {
        let mut body = body.clone();
        body.walk_exprs_mut(&mut |e| {
            if self.is_match(selected, e) {
                *e = Expr::name(plan, self.name.clone(), Some(param));
            }
        });
        body
    }

    fn new_param(&self, plan: &mut EditPlan, method: DeclId, file: FileId, ty: &TypeRef) -> DeclId {
        let id = plan.decl_id();
        let mut param = Declaration::new(id, DeclKind::Parameter, &self.name, file, Some(method));
        param.ty = Some(plan.copy_type(ty));
        plan.add_decl(param);
        id
    }
}

impl Planner for IntroduceParameter {
    fn label(&self) -> String {
        format!("Introduce parameter {} in {}", self.name, self.method.qualified_name)
    }

    fn pre_check(&self, program: &Program, _config: &EngineConfig) -> ProblemList {
        let mut problems = ProblemList::new();
        check_identifier(&self.name, &mut problems);
        let Some(selection) = self.select(program, &mut problems) else {
            return problems;
        };
        let Some(method) = program.decl(selection.method) else {
            return problems;
        };
        if method.body.is_none() {
            problems.push(invalid_input(format!(
                "`{}` has no body to take the expression from",
                self.method.qualified_name
            )));
        }
        let locals = method.body.as_ref().map(|b| b.locals()).unwrap_or_default();
        let in_scope = method.params.iter().chain(&locals);
        if in_scope.map(|d| program.name_of(*d)).any(|n| n == self.name) {
            problems.push(
                Problem::fatal(
                    ProblemKind::NameClash,
                    format!("`{}` is already declared in `{}`", self.name, method.name),
                )
                .for_symbol(self.method.qualified_name.clone()),
            );
        }
        let mut uses_local = None;
        selection.expr.walk(&mut |e| {
            if let Some(d) = e.referenced_decl().filter(|d| locals.contains(d)) {
                uses_local.get_or_insert(d);
            }
        });
        if let Some(local) = uses_local {
            problems.push(invalid_input(format!(
                "the expression uses local variable `{}`, which call sites cannot see",
                program.name_of(local)
            )));
        }
        if expr_type(program, Some(selection.method), selection.expr).is_none() {
            problems.push(invalid_input("cannot determine the type of the selected expression"));
        }
        if matches!(selection.expr.kind, ExprKind::Assign { .. }) {
            problems.push(invalid_input("an assignment cannot become a parameter"));
        }
        if self.keep_overload && program.override_family(selection.method).len() > 1 {
            problems.push(
                Problem::fatal(
                    ProblemKind::OverrideIntegrityViolation,
                    format!(
                        "`{}` takes part in an override; an overload would change dispatch",
                        self.method.qualified_name
                    ),
                )
                .for_symbol(self.method.qualified_name.clone()),
            );
        }
        problems
    }

    fn prepare(&self, program: &Program, _config: &EngineConfig, problems: &mut ProblemList) -> EditPlan {
        let mut plan = EditPlan::new(program, self.label());
        let Some(selection) = self.select(program, problems) else {
            return plan;
        };
        let method = selection.method;
        let (Some(decl), Some(ty)) = (
            program.decl(method),
            expr_type(program, Some(method), selection.expr),
        ) else {
            return plan;
        };
        let Some(body) = &decl.body else {
            return plan;
        };

        if self.keep_overload {
            self.plan_overload(&mut plan, program, &selection, decl, body, &ty);
        } else {
            self.plan_in_place(&mut plan, program, &selection, body, &ty);
        }
        plan
    }
}

impl IntroduceParameter {
    /// Add the parameter to the method and its whole override family.
    fn plan_in_place(
        &self,
        plan: &mut EditPlan,
        program: &Program,
        selection: &Selection<'_>,
        body: &Block,
        ty: &TypeRef,
    ) {
        let method = selection.method;
        let family = program.override_family(method);
        debug!(family = family.len(), "introducing parameter across override family");
        let mut added = None;
        for member in &family {
            let Some(file) = program.decl(*member).map(|d| d.file) else {
                continue;
            };
            let param = self.new_param(plan, *member, file, ty);
            let index = program.params(*member).len();
            plan.edit_decl(
                program,
                *member,
                TreeEdit::InsertParam {
                    method: *member,
                    param,
                    index,
                },
            );
            if *member == method {
                added = Some(param);
            }
        }
        let Some(added) = added else {
            return;
        };

        let mut body = self.substitute(plan, body, selection.expr, added);
        body.walk_exprs_mut(&mut |e| {
            if let ExprKind::Call { method: Some(m), .. } = &e.kind {
                if family.contains(m) {
                    let arg = self.instantiate(plan, program, selection, e);
                    if let ExprKind::Call { args, .. } = &mut e.kind {
                        args.push(arg);
                    }
                }
            }
        });
        plan.edit_decl(
            program,
            method,
            TreeEdit::SetBody {
                decl: method,
                body: Some(body),
            },
        );

        for site in references_to(program, &family) {
            let inside = site.owner.is_some_and(|o| program.is_within(o, method));
            if site.in_import || inside {
                continue;
            }
            let Some((_, call)) = program.find_expr(site.node) else {
                continue;
            };
            let ExprKind::Call { args, .. } = &call.kind else {
                continue;
            };
            let arg = self.instantiate(plan, program, selection, call);
            let mut rewritten = call.clone();
            if let ExprKind::Call { args: new_args, .. } = &mut rewritten.kind {
                *new_args = args.iter().cloned().chain([arg]).collect();
            }
            plan.replace_expr(program, site.node, rewritten);
        }
    }

    /// Copy the method with the extra parameter and turn the original into
    /// a delegator.
    fn plan_overload(
        &self,
        plan: &mut EditPlan,
        program: &Program,
        selection: &Selection<'_>,
        decl: &Declaration,
        body: &Block,
        ty: &TypeRef,
    ) {
        let method = selection.method;
        let Some(owner) = decl.parent else {
            return;
        };
        let (overload, remap) = plan.copy_member(program, method, owner, decl.file);
        let param = self.new_param(plan, overload, decl.file, ty);
        let replaced = self.substitute(plan, body, selection.expr, param);
        let new_body = Renumber {
            ids: &mut *plan,
            remap: &remap,
        }
        .block(&replaced);
        if let Some(copy) = plan.new_decl_mut(overload) {
            copy.params.push(param);
            copy.body = Some(new_body);
            copy.modifiers.is_override = false;
        }
        let index = program
            .members(owner)
            .iter()
            .position(|m| *m == method)
            .map(|i| i + 1);
        plan.edit_decl(
            program,
            owner,
            TreeEdit::AddMember {
                owner,
                member: overload,
                index,
            },
        );
        plan.change(PlannedChange::Place { decl: overload });

        let mut args: Vec<Expr> = decl
            .params
            .iter()
            .map(|p| Expr::name(plan, program.name_of(*p), Some(*p)))
            .collect();
        args.push(plan.copy_expr(selection.expr));
        let call = Expr::call(plan, None, decl.name.clone(), Some(overload), args);
        let stmt = if decl.ty.is_some() {
            Stmt::ret(plan, Some(call))
        } else {
            Stmt::expr(plan, call)
        };
        plan.edit_decl(
            program,
            method,
            TreeEdit::SetBody {
                decl: method,
                body: Some(Block::new(vec![stmt])),
            },
        );

        for site in references_to(program, &[method]) {
            let inside = site.owner.is_some_and(|o| program.is_within(o, method));
            if site.in_import || inside {
                continue;
            }
            let Some((_, call)) = program.find_expr(site.node) else {
                continue;
            };
            let arg = self.instantiate(plan, program, selection, call);
            let mut rewritten = call.clone();
            if let ExprKind::Call { method, args, .. } = &mut rewritten.kind {
                *method = Some(overload);
                args.push(arg);
            } else {
                continue;
            }
            plan.replace_expr(program, site.node, rewritten);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
