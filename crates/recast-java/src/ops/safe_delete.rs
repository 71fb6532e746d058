// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Safe delete.
//!
//! Removes declarations after checking for usages outside the deletion set.
//! Remaining usages are reported by the reference-before-delete rule, so a
//! confirmed commit can still proceed over warnings. Parameter deletion also
//! drops the matching argument at every call site.

use std::collections::{BTreeMap, BTreeSet};

use recast_core::config::EngineConfig;
use recast_core::problem::ProblemList;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{invalid_input, resolve, Planner};
use crate::ast::{Block, ExprKind, StmtKind};
use crate::frontend::SymbolRef;
use crate::model::{DeclId, DeclKind, Program, Visibility};
use crate::plan::{EditPlan, PlannedChange, TreeEdit};
use crate::visit::references_to;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafeDelete {
    pub symbols: Vec<SymbolRef>,
    /// Also delete private members used only by what is being deleted.
    #[serde(default)]
    pub cascade: bool,
    /// Report mentions in comments; the engine configuration decides when
    /// absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_comments: Option<bool>,
}

/// Drop the declaration statements of `locals`, at any depth.
fn remove_locals(block: &mut Block, locals: &BTreeSet<DeclId>) {
    block
        .stmts
        .retain(|s| !matches!(&s.kind, StmtKind::Local { decl, .. } if locals.contains(decl)));
    for stmt in &mut block.stmts {
        match &mut stmt.kind {
            StmtKind::If { then, otherwise, .. } => {
                remove_locals(then, locals);
                if let Some(otherwise) = otherwise {
                    remove_locals(otherwise, locals);
                }
            }
            StmtKind::While { body, .. } | StmtKind::Block(body) => remove_locals(body, locals),
            _ => {}
        }
    }
}

impl SafeDelete {
    fn resolve_all(&self, program: &Program, problems: &mut ProblemList) -> Vec<DeclId> {
        self.symbols
            .iter()
            .filter_map(|s| resolve(program, s, problems))
            .collect()
    }

    /// Private members used only from inside the deletion set.
    fn cascade(program: &Program, set: &mut Vec<DeclId>) {
        let deleted = |set: &[DeclId], d: DeclId| set.iter().any(|root| program.is_within(d, *root));
        loop {
            let types: BTreeSet<DeclId> = set
                .iter()
                .filter_map(|d| program.top_level_type(*d))
                .collect();
            let candidates: Vec<DeclId> = program
                .decls()
                .filter(|d| {
                    d.kind.is_member()
                        && d.visibility() == Visibility::Private
                        && program.top_level_type(d.id).is_some_and(|t| types.contains(&t))
                        && !deleted(set, d.id)
                })
                .map(|d| d.id)
                .collect();
            let mut grew = false;
            for candidate in candidates {
                let sites = references_to(program, &[candidate]);
                let used_only_by_set = !sites.is_empty()
                    && sites
                        .iter()
                        .all(|s| s.owner.is_some_and(|o| deleted(set, o)));
                if used_only_by_set {
                    debug!(member = %program.display_name(candidate), "cascading delete");
                    set.push(candidate);
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }
    }

    fn remove_param(&self, plan: &mut EditPlan, program: &Program, param: DeclId, set: &[DeclId]) {
        let Some(method) = program.decl(param).and_then(|p| p.parent) else {
            return;
        };
        let Some(index) = program.params(method).iter().position(|p| *p == param) else {
            return;
        };
        let family = if program.kind_of(method) == Some(DeclKind::Method) {
            program.override_family(method)
        } else {
            vec![method]
        };
        for member in &family {
            if let Some(p) = program.params(*member).get(index).copied() {
                plan.edit_decl(program, *member, TreeEdit::RemoveParam { method: *member, param: p });
            }
        }
        for site in references_to(program, &family) {
            let gone = site
                .owner
                .is_some_and(|o| set.iter().any(|d| program.is_within(o, *d)));
            if site.in_import || gone {
                continue;
            }
            let Some((_, expr)) = program.find_expr(site.node) else {
                continue;
            };
            let mut rewritten = expr.clone();
            let args = match &mut rewritten.kind {
                ExprKind::Call { args, .. } | ExprKind::New { args, .. } => args,
                _ => continue,
            };
            if index < args.len() {
                args.remove(index);
                plan.replace_expr(program, site.node, rewritten);
            }
        }
    }
}

impl Planner for SafeDelete {
    fn label(&self) -> String {
        let names: Vec<&str> = self.symbols.iter().map(|s| s.qualified_name.as_str()).collect();
        format!("Safe delete {}", names.join(", "))
    }

    fn pre_check(&self, program: &Program, _config: &EngineConfig) -> ProblemList {
        let mut problems = ProblemList::new();
        if self.symbols.is_empty() {
            problems.push(invalid_input("nothing to delete"));
        }
        self.resolve_all(program, &mut problems);
        problems
    }

    fn prepare(&self, program: &Program, config: &EngineConfig, problems: &mut ProblemList) -> EditPlan {
        let mut plan = EditPlan::new(program, self.label());
        let mut set = self.resolve_all(program, problems);
        set.sort();
        set.dedup();
        if self.cascade {
            Self::cascade(program, &mut set);
        }
        // Members of a deleted type go with it.
        let roots: Vec<DeclId> = set
            .iter()
            .copied()
            .filter(|d| !set.iter().any(|o| o != d && program.is_within(*d, *o)))
            .collect();

        let mut locals: BTreeMap<DeclId, BTreeSet<DeclId>> = BTreeMap::new();
        for decl in &roots {
            let Some(d) = program.decl(*decl) else {
                continue;
            };
            match d.kind {
                DeclKind::Parameter => self.remove_param(&mut plan, program, *decl, &roots),
                DeclKind::Local => {
                    if let Some(method) = d.parent {
                        locals.entry(method).or_default().insert(*decl);
                    }
                }
                _ if d.is_type() && d.parent.is_none() => {
                    let alone = program.file(d.file).is_some_and(|f| f.types.len() == 1);
                    if alone {
                        plan.push(d.file, TreeEdit::RemoveFile { file: d.file });
                    } else {
                        plan.push(d.file, TreeEdit::RemoveType { ty: *decl });
                    }
                }
                _ => {
                    plan.edit_decl(program, *decl, TreeEdit::RemoveMember { member: *decl });
                    for overrider in program.overridden_by(*decl) {
                        let still_overrides = program
                            .overrides(overrider)
                            .iter()
                            .any(|m| !roots.contains(m));
                        if roots.contains(&overrider) || still_overrides {
                            continue;
                        }
                        if let Some(mut modifiers) = plan.planned_modifiers(program, overrider) {
                            modifiers.is_override = false;
                            plan.set_modifiers(program, overrider, modifiers);
                        }
                    }
                }
            }
        }
        for (method, locals) in locals {
            let Some(mut body) = program.decl(method).and_then(|m| m.body.clone()) else {
                continue;
            };
            remove_locals(&mut body, &locals);
            plan.edit_decl(
                program,
                method,
                TreeEdit::SetBody {
                    decl: method,
                    body: Some(body),
                },
            );
        }

        plan.change(PlannedChange::Delete {
            decls: roots,
            search_comments: self.search_comments.unwrap_or(config.search_comments.value),
        });
        plan
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::ChangeKind;
    use crate::builder::ProgramBuilder;
    use crate::ops::test_support::{run_clean, sym};
    use crate::ops::Refactoring;
    use recast_core::problem::{ProblemKind, Severity};

    struct Counter {
        program: Program,
        count: DeclId,
        bump: DeclId,
        helper: DeclId,
    }

    /// `Counter` with a field used by `bump`, which calls a private helper.
    fn counter() -> Counter {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/Counter.java", "p");
        let counter = b.class(file, "Counter");
        let count = b.field(counter, "count", "int");
        let helper = b.method(counter, "step", Some("int"));
        b.modify(helper, |m| m.visibility = Visibility::Private);
        let one = b.int(1);
        let ret = b.ret(Some(one));
        b.set_body(helper, vec![ret]);
        let bump = b.method(counter, "bump", None);
        let target = b.name(count);
        let step = b.call(None, helper, vec![]);
        let assign = b.assign(target, step);
        let stmt = b.expr_stmt(assign);
        b.set_body(bump, vec![stmt]);
        Counter {
            program: b.finish(),
            count,
            bump,
            helper,
        }
    }

    fn delete(program: &Program, decls: &[DeclId]) -> SafeDelete {
        SafeDelete {
            symbols: decls.iter().map(|d| sym(program, *d)).collect(),
            cascade: false,
            search_comments: None,
        }
    }

    #[test]
    fn field_used_only_by_co_deleted_code_has_no_problem() {
        let c = counter();
        let op = Refactoring::SafeDelete(delete(&c.program, &[c.count, c.bump]));
        let (prepared, texts) = run_clean(&c.program, op);
        assert!(prepared.problems.is_empty(), "{:?}", prepared.problems);
        let counter = &texts["p/Counter.java"];
        assert!(!counter.contains("count"));
        assert!(!counter.contains("bump"));
        assert!(counter.contains("step"));
    }

    #[test]
    fn field_used_from_another_class_warns_once() {
        let c = counter();
        let mut b = ProgramBuilder::from_program(c.program);
        let file = b.file("p/Reader.java", "p");
        let reader = b.class(file, "Reader");
        let read = b.method(reader, "read", Some("int"));
        let counter = b.param(read, "c", "Counter");
        let receiver = b.name(counter);
        let access = b.field_of(receiver, c.count);
        let ret = b.ret(Some(access));
        b.set_body(read, vec![ret]);
        let program = b.finish();

        let op = Refactoring::SafeDelete(delete(&program, &[c.count, c.bump]));
        let prepared = op.prepare(&program, &EngineConfig::default()).unwrap();
        let problems = prepared.problems.into_vec();
        assert_eq!(problems.len(), 1, "{problems:?}");
        assert_eq!(problems[0].severity, Severity::Warning);
        assert_eq!(problems[0].kind, ProblemKind::UnreferencedPreconditionViolation);
        assert!(problems[0].message.contains("p.Reader"));
    }

    #[test]
    fn cascade_takes_exclusively_used_private_members() {
        let c = counter();
        let mut request = delete(&c.program, &[c.count, c.bump]);
        request.cascade = true;
        let (prepared, texts) = run_clean(&c.program, Refactoring::SafeDelete(request));
        assert!(!texts["p/Counter.java"].contains("step"));
        let removed = prepared.plan.changes.iter().any(|change| {
            matches!(change, PlannedChange::Delete { decls, .. } if decls.contains(&c.helper))
        });
        assert!(removed);
    }

    #[test]
    fn comment_mentions_warn_separately() {
        let c = counter();
        let mut b = ProgramBuilder::from_program(c.program);
        let file = b.file("p/Notes.java", "p");
        let notes = b.class(file, "Notes");
        let m = b.method(notes, "m", None);
        let note = b.comment("see count in Counter");
        b.set_body(m, vec![note]);
        let program = b.finish();

        let mut request = delete(&program, &[c.count, c.bump]);
        request.search_comments = Some(true);
        let prepared = Refactoring::SafeDelete(request)
            .prepare(&program, &EngineConfig::default())
            .unwrap();
        let problems = prepared.problems.into_vec();
        assert_eq!(problems.len(), 1, "{problems:?}");
        assert!(problems[0].message.contains("comments"));
        assert!(!problems[0].is_fatal());
    }

    #[test]
    fn deleting_a_parameter_drops_call_site_arguments() {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/Math.java", "p");
        let math = b.class(file, "Math");
        let scale = b.method(math, "scale", Some("int"));
        let x = b.param(scale, "x", "int");
        let unused = b.param(scale, "unused", "int");
        let rx = b.name(x);
        let ret = b.ret(Some(rx));
        b.set_body(scale, vec![ret]);
        let user = b.method(math, "use", Some("int"));
        let three = b.int(3);
        let four = b.int(4);
        let call = b.call(None, scale, vec![three, four]);
        let ret = b.ret(Some(call));
        b.set_body(user, vec![ret]);
        let program = b.finish();

        let (_, texts) = run_clean(&program, Refactoring::SafeDelete(delete(&program, &[unused])));
        let math = &texts["p/Math.java"];
        assert!(math.contains("int scale(int x) {"), "{math}");
        assert!(math.contains("return scale(3);"));
    }

    #[test]
    fn type_alone_in_its_file_removes_the_file() {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/Unused.java", "p");
        let unused = b.class(file, "Unused");
        let program = b.finish();

        let op = Refactoring::SafeDelete(delete(&program, &[unused]));
        let prepared = op.prepare(&program, &EngineConfig::default()).unwrap();
        let output = prepared.output.unwrap();
        let change = output.changes.iter().find(|c| c.path == "p/Unused.java").unwrap();
        assert_eq!(change.kind, ChangeKind::Delete);
    }
}
