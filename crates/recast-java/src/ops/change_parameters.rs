// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Change the parameter list of a method or constructor.
//!
//! The request spells out the new list. Existing parameters are named by
//! their current index, so listing them in another order reorders them and
//! leaving one out removes it. New parameters carry a default value that
//! every call site passes. Methods change together with their whole
//! override family.

use std::collections::{BTreeSet, HashSet};

use recast_core::config::EngineConfig;
use recast_core::problem::{Problem, ProblemKind, ProblemList};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_identifier, invalid_input, resolve_kind, Planner};
use crate::ast::{Expr, ExprKind, IdSource, TypeRef};
use crate::frontend::SymbolRef;
use crate::model::{type_key, DeclId, DeclKind, Declaration, Program};
use crate::plan::{EditPlan, TreeEdit};
use crate::visit::references_to;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeParameters {
    pub method: SymbolRef,
    /// The parameter list after the change, in order.
    pub params: Vec<ParameterSpec>,
}

/// One entry of the new parameter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterSpec {
    /// The parameter currently at `index`.
    Existing { index: usize },
    /// A new parameter. Call sites pass a copy of `default_value`.
    Added {
        name: String,
        ty: TypeRef,
        default_value: Expr,
    },
}

impl ChangeParameters {
    fn family(program: &Program, decl: DeclId) -> Vec<DeclId> {
        if program.kind_of(decl) == Some(DeclKind::Method) {
            program.override_family(decl)
        } else {
            vec![decl]
        }
    }

    /// Parameter type keys of `member` after the change.
    fn new_signature(&self, program: &Program, member: DeclId) -> Vec<String> {
        let old = program.signature(member);
        self.params
            .iter()
            .map(|spec| match spec {
                ParameterSpec::Existing { index } => old.get(*index).cloned().unwrap_or_default(),
                ParameterSpec::Added { ty, .. } => type_key(ty),
            })
            .collect()
    }

    fn kept(&self) -> BTreeSet<usize> {
        self.params
            .iter()
            .filter_map(|spec| match spec {
                ParameterSpec::Existing { index } => Some(*index),
                ParameterSpec::Added { .. } => None,
            })
            .collect()
    }

    fn check_list(&self, program: &Program, decl: DeclId, problems: &mut ProblemList) {
        let count = program.params(decl).len();
        let mut seen = HashSet::new();
        for spec in &self.params {
            match spec {
                ParameterSpec::Existing { index } if *index >= count => {
                    problems.push(invalid_input(format!(
                        "`{}` has no parameter at index {index}",
                        self.method.qualified_name
                    )));
                }
                ParameterSpec::Existing { index } if !seen.insert(*index) => {
                    problems.push(invalid_input(format!("parameter {index} is listed twice")));
                }
                ParameterSpec::Existing { .. } => {}
                ParameterSpec::Added { name, .. } => check_identifier(name, problems),
            }
        }
        let unchanged = self.params.len() == count
            && self
                .params
                .iter()
                .enumerate()
                .all(|(i, spec)| *spec == ParameterSpec::Existing { index: i });
        if unchanged {
            problems.push(invalid_input("the parameter list is unchanged"));
        }
    }

    /// New names must not collide with kept parameters or body locals.
    fn check_names(&self, program: &Program, member: DeclId, problems: &mut ProblemList) {
        let Some(decl) = program.decl(member) else {
            return;
        };
        let kept = self.kept();
        let mut taken: HashSet<String> = decl
            .params
            .iter()
            .enumerate()
            .filter(|(i, _)| kept.contains(i))
            .map(|(_, p)| program.name_of(*p).to_string())
            .collect();
        let locals = decl.body.as_ref().map(|b| b.locals()).unwrap_or_default();
        taken.extend(locals.iter().map(|l| program.name_of(*l).to_string()));
        for spec in &self.params {
            let ParameterSpec::Added { name, .. } = spec else {
                continue;
            };
            if !taken.insert(name.clone()) {
                problems.push(
                    Problem::fatal(
                        ProblemKind::NameClash,
                        format!("`{name}` is already declared in `{}`", program.display_name(member)),
                    )
                    .for_symbol(program.qualified_name(member)),
                );
            }
        }
    }

    /// Removed parameters must be unused.
    fn check_removed(&self, program: &Program, member: DeclId, problems: &mut ProblemList) {
        let kept = self.kept();
        let removed: Vec<DeclId> = program
            .params(member)
            .iter()
            .enumerate()
            .filter(|(i, _)| !kept.contains(i))
            .map(|(_, p)| *p)
            .collect();
        let mut reported = HashSet::new();
        for site in references_to(program, &removed) {
            if site.in_import || !reported.insert(site.decl) {
                continue;
            }
            problems.push(
                Problem::fatal(
                    ProblemKind::UnreferencedPreconditionViolation,
                    format!(
                        "parameter `{}` of `{}` is still used",
                        program.name_of(site.decl),
                        program.display_name(member)
                    ),
                )
                .for_symbol(program.qualified_name(member)),
            );
        }
    }

    /// No other method or constructor of the owner may already have the
    /// new signature.
    fn check_signature(&self, program: &Program, member: DeclId, problems: &mut ProblemList) {
        let Some(decl) = program.decl(member) else {
            return;
        };
        let Some(owner) = decl.parent else {
            return;
        };
        let signature = self.new_signature(program, member);
        let siblings: Vec<DeclId> = if decl.kind == DeclKind::Constructor {
            program.constructors(owner)
        } else {
            program
                .members(owner)
                .iter()
                .copied()
                .filter(|m| program.kind_of(*m) == Some(DeclKind::Method) && program.name_of(*m) == decl.name)
                .collect()
        };
        let clash = siblings
            .into_iter()
            .find(|s| *s != member && program.signature(*s) == signature);
        if let Some(clash) = clash {
            problems.push(
                Problem::fatal(
                    ProblemKind::NameClash,
                    format!(
                        "`{}` already declares `{}`",
                        program.name_of(owner),
                        program.display_name(clash)
                    ),
                )
                .for_symbol(program.qualified_name(clash)),
            );
        }
    }

    /// The argument list a call site passes after the change, or `None`
    /// when the call does not supply every current argument.
    fn rewrite_args(&self, plan: &mut EditPlan, args: &[Expr]) -> Option<Vec<Expr>> {
        let mut out = Vec::with_capacity(self.params.len());
        for spec in &self.params {
            match spec {
                ParameterSpec::Existing { index } => out.push(args.get(*index)?.clone()),
                ParameterSpec::Added { default_value, .. } => out.push(plan.copy_expr(default_value)),
            }
        }
        Some(out)
    }
}

impl Planner for ChangeParameters {
    fn label(&self) -> String {
        format!("Change parameters of {}", self.method.qualified_name)
    }

    fn pre_check(&self, program: &Program, _config: &EngineConfig) -> ProblemList {
        let mut problems = ProblemList::new();
        let Some(decl) = resolve_kind(
            program,
            &self.method,
            &[DeclKind::Method, DeclKind::Constructor],
            &mut problems,
        ) else {
            return problems;
        };
        self.check_list(program, decl, &mut problems);
        if !problems.is_empty() {
            return problems;
        }
        for member in Self::family(program, decl) {
            self.check_names(program, member, &mut problems);
            self.check_removed(program, member, &mut problems);
            self.check_signature(program, member, &mut problems);
        }
        problems
    }

    fn prepare(&self, program: &Program, _config: &EngineConfig, problems: &mut ProblemList) -> EditPlan {
        let mut plan = EditPlan::new(program, self.label());
        let Some(decl) = resolve_kind(
            program,
            &self.method,
            &[DeclKind::Method, DeclKind::Constructor],
            problems,
        ) else {
            return plan;
        };
        let family = Self::family(program, decl);
        debug!(family = family.len(), "changing parameters across override family");
        if family.len() > 1 {
            problems.push(
                Problem::warning(
                    ProblemKind::OverrideIntegrityViolation,
                    format!(
                        "`{}` is part of an override hierarchy; {} other methods change with it",
                        program.display_name(decl),
                        family.len() - 1
                    ),
                )
                .for_symbol(self.method.qualified_name.clone()),
            );
        }

        for member in &family {
            let Some(file) = program.decl(*member).map(|d| d.file) else {
                continue;
            };
            let params = program.params(*member).to_vec();
            let mut order = Vec::with_capacity(self.params.len());
            for spec in &self.params {
                match spec {
                    ParameterSpec::Existing { index } => {
                        if let Some(p) = params.get(*index) {
                            order.push(*p);
                        }
                    }
                    ParameterSpec::Added { name, ty, .. } => {
                        let id = plan.decl_id();
                        let mut param = Declaration::new(id, DeclKind::Parameter, name, file, Some(*member));
                        param.ty = Some(plan.copy_type(ty));
                        plan.add_decl(param);
                        plan.edit_decl(
                            program,
                            *member,
                            TreeEdit::InsertParam {
                                method: *member,
                                param: id,
                                index: params.len(),
                            },
                        );
                        order.push(id);
                    }
                }
            }
            for param in params.iter().filter(|p| !order.contains(p)) {
                plan.edit_decl(
                    program,
                    *member,
                    TreeEdit::RemoveParam {
                        method: *member,
                        param: *param,
                    },
                );
            }
            plan.edit_decl(
                program,
                *member,
                TreeEdit::ReorderParams {
                    method: *member,
                    order,
                },
            );
        }

        for site in references_to(program, &family) {
            if site.in_import {
                continue;
            }
            let Some((_, expr)) = program.find_expr(site.node) else {
                continue;
            };
            let args = match &expr.kind {
                ExprKind::Call { args, .. } | ExprKind::New { args, .. } => args,
                _ => continue,
            };
            let Some(new_args) = self.rewrite_args(&mut plan, args) else {
                continue;
            };
            let mut rewritten = expr.clone();
            if let ExprKind::Call { args, .. } | ExprKind::New { args, .. } = &mut rewritten.kind {
                *args = new_args;
            }
            plan.replace_expr(program, site.node, rewritten);
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
    use crate::ast::BinaryOp;
    use crate::builder::ProgramBuilder;
    use crate::ops::test_support::{run_clean, sym};
    use crate::ops::Refactoring;

    struct Calc {
        program: Program,
        diff: DeclId,
        pick: DeclId,
        int_ty: TypeRef,
        one: Expr,
    }

    /// `p.Calc` with `int diff(int a, int b)` and `int pick(int a, int b)`
    /// (which ignores `b`), `p.Fast` overriding `diff`, and `p.Main`
    /// calling both.
    fn calc() -> Calc {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/Calc.java", "p");
        let calc = b.class(file, "Calc");
        let diff = b.method(calc, "diff", Some("int"));
        let a = b.param(diff, "a", "int");
        let bb = b.param(diff, "b", "int");
        let (ra, rb) = (b.name(a), b.name(bb));
        let body = b.binary(BinaryOp::Sub, ra, rb);
        let ret = b.ret(Some(body));
        b.set_body(diff, vec![ret]);

        let pick = b.method(calc, "pick", Some("int"));
        let a = b.param(pick, "a", "int");
        b.param(pick, "b", "int");
        let ra = b.name(a);
        let ret = b.ret(Some(ra));
        b.set_body(pick, vec![ret]);

        let fast = b.class(file, "Fast");
        b.extends(fast, calc);
        let over = b.method(fast, "diff", Some("int"));
        b.modify(over, |m| m.is_override = true);
        b.param(over, "x", "int");
        b.param(over, "y", "int");
        let zero = b.int(0);
        let ret = b.ret(Some(zero));
        b.set_body(over, vec![ret]);

        let main_file = b.file("p/Main.java", "p");
        let main = b.class(main_file, "Main");
        let run = b.method(main, "run", Some("int"));
        let c = b.param(run, "calc", "Calc");
        let receiver = b.name(c);
        let (five, three) = (b.int(5), b.int(3));
        let call = b.call(Some(receiver), diff, vec![five, three]);
        let ret = b.ret(Some(call));
        b.set_body(run, vec![ret]);
        let first = b.method(main, "first", Some("int"));
        let c = b.param(first, "calc", "Calc");
        let receiver = b.name(c);
        let (seven, eight) = (b.int(7), b.int(8));
        let call = b.call(Some(receiver), pick, vec![seven, eight]);
        let ret = b.ret(Some(call));
        b.set_body(first, vec![ret]);

        let int_ty = b.ty("int");
        let one = b.int(1);
        Calc {
            program: b.finish(),
            diff,
            pick,
            int_ty,
            one,
        }
    }

    fn change(program: &Program, method: DeclId, params: Vec<ParameterSpec>) -> Refactoring {
        Refactoring::ChangeParameters(ChangeParameters {
            method: sym(program, method),
            params,
        })
    }

    fn existing(index: usize) -> ParameterSpec {
        ParameterSpec::Existing { index }
    }

    #[test]
    fn reorder_swaps_declarations_and_arguments() {
        let c = calc();
        let op = change(&c.program, c.diff, vec![existing(1), existing(0)]);
        let (_, texts) = run_clean(&c.program, op);
        let calc = &texts["p/Calc.java"];
        assert!(calc.contains("int diff(int b, int a) {\n        return a - b;"), "{calc}");
        assert!(calc.contains("int diff(int y, int x) {"), "{calc}");
        assert!(texts["p/Main.java"].contains("return calc.diff(3, 5);"));
    }

    #[test]
    fn added_parameter_passes_default_at_call_sites() {
        let c = calc();
        let added = ParameterSpec::Added {
            name: "scale".into(),
            ty: c.int_ty.clone(),
            default_value: c.one.clone(),
        };
        let op = change(&c.program, c.diff, vec![existing(0), existing(1), added]);
        let (prepared, texts) = run_clean(&c.program, op);
        let calc = &texts["p/Calc.java"];
        assert!(calc.contains("int diff(int a, int b, int scale) {"), "{calc}");
        assert!(calc.contains("int diff(int x, int y, int scale) {"), "{calc}");
        assert!(texts["p/Main.java"].contains("return calc.diff(5, 3, 1);"));
        assert!(prepared
            .problems
            .kinds()
            .contains(&ProblemKind::OverrideIntegrityViolation));
    }

    #[test]
    fn removed_parameter_drops_call_site_argument() {
        let c = calc();
        let op = change(&c.program, c.pick, vec![existing(0)]);
        let (prepared, texts) = run_clean(&c.program, op);
        let calc = &texts["p/Calc.java"];
        assert!(calc.contains("int pick(int a) {"), "{calc}");
        assert!(texts["p/Main.java"].contains("return calc.pick(7);"));
        assert!(!prepared
            .problems
            .kinds()
            .contains(&ProblemKind::OverrideIntegrityViolation));
    }

    #[test]
    fn remove_and_add_in_one_request() {
        let c = calc();
        let flag = ParameterSpec::Added {
            name: "first".into(),
            ty: c.int_ty.clone(),
            default_value: c.one.clone(),
        };
        let op = change(&c.program, c.pick, vec![flag, existing(0)]);
        let (_, texts) = run_clean(&c.program, op);
        assert!(texts["p/Calc.java"].contains("int pick(int first, int a) {"));
        assert!(texts["p/Main.java"].contains("return calc.pick(1, 7);"));
    }

    #[test]
    fn removing_a_used_parameter_is_fatal() {
        let c = calc();
        let op = change(&c.program, c.diff, vec![existing(0)]);
        let problems = op.pre_check(&c.program, &EngineConfig::default());
        assert!(problems
            .kinds()
            .contains(&ProblemKind::UnreferencedPreconditionViolation));
    }

    #[test]
    fn new_name_clashing_with_kept_parameter_is_fatal() {
        let c = calc();
        let added = ParameterSpec::Added {
            name: "a".into(),
            ty: c.int_ty.clone(),
            default_value: c.one.clone(),
        };
        let op = change(&c.program, c.pick, vec![existing(0), added]);
        let problems = op.pre_check(&c.program, &EngineConfig::default());
        assert!(problems.kinds().contains(&ProblemKind::NameClash));
    }

    #[test]
    fn signature_matching_a_sibling_is_fatal() {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/A.java", "p");
        let a = b.class(file, "A");
        let single = b.method(a, "m", None);
        b.param(single, "x", "int");
        let pair = b.method(a, "m", None);
        b.param(pair, "x", "int");
        b.param(pair, "y", "String");
        let program = b.finish();

        let op = change(&program, pair, vec![existing(0)]);
        let problems = op.pre_check(&program, &EngineConfig::default());
        assert!(problems.kinds().contains(&ProblemKind::NameClash));
        assert!(program.decl(single).is_some());
    }

    #[test]
    fn unchanged_or_invalid_lists_are_rejected() {
        let c = calc();
        for params in [
            vec![existing(0), existing(1)],
            vec![existing(0), existing(0)],
            vec![existing(2)],
        ] {
            let op = change(&c.program, c.pick, params);
            let problems = op.pre_check(&c.program, &EngineConfig::default());
            assert!(problems.kinds().contains(&ProblemKind::InvalidInput), "{problems:?}");
        }
    }

    #[test]
    fn constructor_calls_are_rewritten() {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/Point.java", "p");
        let point = b.class(file, "Point");
        let ctor = b.constructor(point);
        b.param(ctor, "x", "int");
        b.param(ctor, "y", "int");
        let main = b.class(file, "Main");
        let make = b.method(main, "make", Some("Point"));
        let (one, two) = (b.int(1), b.int(2));
        let created = b.new_object(point, Some(ctor), vec![one, two]);
        let ret = b.ret(Some(created));
        b.set_body(make, vec![ret]);
        let program = b.finish();

        let op = change(&program, ctor, vec![existing(1), existing(0)]);
        let (_, texts) = run_clean(&program, op);
        let text = &texts["p/Point.java"];
        assert!(text.contains("Point(int y, int x) {"), "{text}");
        assert!(text.contains("return new Point(2, 1);"), "{text}");
    }
}
