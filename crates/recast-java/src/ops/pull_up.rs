// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Pull members of a type up into one of its supertypes.
//!
//! Members move into the target (classes) or become `default` methods
//! (interfaces); with `make_abstract` only an abstract declaration goes up
//! and the implementation stays. Identical copies of a pulled method in
//! sibling subtypes are removed and their call sites rebound.

use std::collections::{BTreeSet, HashMap};

use recast_core::config::EngineConfig;
use recast_core::patch::FileId;
use recast_core::problem::{Problem, ProblemKind, ProblemList};
use serde::{Deserialize, Serialize};

use super::{
    apply_policy, invalid_input, rebind_site, required_visibility, resolve, resolve_members,
    resolve_type, MemberSpec, Planner,
};
use crate::frontend::SymbolRef;
use crate::model::{DeclId, DeclKind, Program, Visibility};
use crate::plan::{EditPlan, MemberGroup, MemberInfo, PlannedChange, TreeEdit};
use crate::visit::{references_to, references_within};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullUp {
    pub source: SymbolRef,
    /// Supertype receiving the members; the direct superclass when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<SymbolRef>,
    pub members: Vec<MemberSpec>,
    /// Remove identical copies of pulled methods from sibling subtypes.
    #[serde(default = "default_true")]
    pub dedupe_siblings: bool,
}

impl PullUp {
    pub fn new(source: SymbolRef, members: Vec<MemberSpec>) -> Self {
        PullUp {
            source,
            target: None,
            members,
            dedupe_siblings: true,
        }
    }

    fn target(&self, program: &Program, source: DeclId, problems: &mut ProblemList) -> Option<DeclId> {
        let target = match &self.target {
            Some(symbol) => resolve_type(program, symbol, problems)?,
            None => match program.superclass(source) {
                Some(sup) => sup,
                None => {
                    problems.push(invalid_input(format!(
                        "`{}` has no superclass in the program",
                        self.source.qualified_name
                    )));
                    return None;
                }
            },
        };
        if !program.is_subtype_of(source, target) || source == target {
            problems.push(invalid_input(format!(
                "`{}` is not a supertype of `{}`",
                program.qualified_name(target),
                self.source.qualified_name
            )));
            return None;
        }
        Some(target)
    }

    /// Whether `a` and `b` have the same body once their parameters and
    /// locals are matched up positionally.
    fn same_implementation(program: &Program, a: DeclId, b: DeclId) -> bool {
        let (Some(da), Some(db)) = (program.decl(a), program.decl(b)) else {
            return false;
        };
        let (Some(body_a), Some(body_b)) = (&da.body, &db.body) else {
            return false;
        };
        let mut map: HashMap<DeclId, DeclId> = HashMap::from([(a, b)]);
        map.extend(da.params.iter().copied().zip(db.params.iter().copied()));
        map.extend(body_a.locals().into_iter().zip(body_b.locals()));
        body_a.same_as_with(body_b, &|x, y| x == y || map.get(&x) == Some(&y))
    }

    /// Dependencies of the moving members that stay behind in `source`.
    pub(super) fn check_dependencies(
        program: &Program,
        source: DeclId,
        target_name: &str,
        moved: &[DeclId],
        problems: &mut ProblemList,
    ) {
        for member in moved {
            for site in references_within(program, *member) {
                let Some(decl) = program.decl(site.decl) else {
                    continue;
                };
                let stays = decl.parent == Some(source)
                    && matches!(decl.kind, DeclKind::Field | DeclKind::Method)
                    && !moved.contains(&site.decl);
                if stays {
                    problems.push(
                        Problem::fatal(
                            ProblemKind::VisibilityViolation,
                            format!(
                                "`{}` uses `{}`, which stays in `{}` and is not visible from `{}`",
                                program.display_name(*member),
                                program.display_name(site.decl),
                                program.name_of(source),
                                target_name
                            ),
                        )
                        .for_symbol(program.qualified_name(site.decl)),
                    );
                }
            }
        }
    }

    fn pull_abstract(
        plan: &mut EditPlan,
        program: &Program,
        info: &MemberInfo,
        target: DeclId,
        target_file: FileId,
    ) {
        let copy = plan.copy_signature(program, info.member, target, target_file);
        let in_interface = program.decl(target).is_some_and(|t| t.is_interface());
        if let Some(decl) = plan.new_decl_mut(copy) {
            if in_interface || decl.modifiers.visibility == Visibility::Private {
                decl.modifiers.visibility = if in_interface {
                    Visibility::Public
                } else {
                    Visibility::Protected
                };
            }
        }
        let copy_visibility = plan
            .new_decls
            .get(&copy)
            .map(|d| d.modifiers.visibility)
            .unwrap_or(Visibility::Public);
        plan.edit_decl(
            program,
            target,
            TreeEdit::AddMember {
                owner: target,
                member: copy,
                index: None,
            },
        );
        plan.change(PlannedChange::Place { decl: copy });
        if let Some(mut modifiers) = plan.planned_modifiers(program, info.member) {
            modifiers.is_override = true;
            modifiers.visibility = modifiers.visibility.max(copy_visibility);
            plan.set_modifiers(program, info.member, modifiers);
        }
    }

    fn pull_member(plan: &mut EditPlan, program: &Program, info: &MemberInfo, source: DeclId, target: DeclId) {
        let member = info.member;
        plan.edit_decl(program, member, TreeEdit::MoveMember { member, to: target });
        let in_interface = program.decl(target).is_some_and(|t| t.is_interface());
        if in_interface {
            let is_field = program.kind_of(member) == Some(DeclKind::Field);
            if let Some(mut modifiers) = plan.planned_modifiers(program, member) {
                modifiers.visibility = Visibility::Public;
                if is_field {
                    modifiers.is_static = true;
                    modifiers.is_final = true;
                } else if !modifiers.is_static {
                    modifiers.is_default = true;
                }
                modifiers.is_override = program
                    .overrides(member)
                    .iter()
                    .filter_map(|o| program.decl(*o).and_then(|d| d.parent))
                    .any(|p| p != target && program.is_subtype_of(target, p));
                plan.set_modifiers(program, member, modifiers);
            }
            if is_field {
                plan.change(PlannedChange::ExtractToInterface { member });
            } else {
                plan.change(PlannedChange::HostBody { member, target });
            }
        }
        plan.change(PlannedChange::Relocate {
            member,
            from: source,
            to: target,
            policy: info.visibility,
            receiver: None,
        });

        // Code left behind in the subtypes still has to reach the member.
        let users: BTreeSet<DeclId> = references_to(program, &[member])
            .into_iter()
            .filter_map(|site| site.owner)
            .filter(|owner| !program.is_within(*owner, member))
            .collect();
        let required = required_visibility(program, target, users);
        let current = plan
            .planned_modifiers(program, member)
            .map(|m| m.visibility)
            .unwrap_or(Visibility::Public);
        if current < required {
            apply_policy(plan, program, member, info.visibility, required);
        }
    }
}

impl Planner for PullUp {
    fn label(&self) -> String {
        format!("Pull up members of {}", self.source.qualified_name)
    }

    fn pre_check(&self, program: &Program, _config: &EngineConfig) -> ProblemList {
        let mut problems = ProblemList::new();
        let Some(source) = resolve_type(program, &self.source, &mut problems) else {
            return problems;
        };
        if self.members.is_empty() {
            problems.push(invalid_input("no members selected"));
        }
        self.target(program, source, &mut problems);
        resolve_members(program, source, &self.members, &mut problems);
        problems
    }

    fn prepare(&self, program: &Program, _config: &EngineConfig, problems: &mut ProblemList) -> EditPlan {
        let mut plan = EditPlan::new(program, self.label());
        let Some(source) = resolve(program, &self.source, problems) else {
            return plan;
        };
        let Some(target) = self.target(program, source, problems) else {
            return plan;
        };
        let Some(target_file) = program.decl(target).map(|d| d.file) else {
            return plan;
        };
        let infos = resolve_members(program, source, &self.members, problems);
        plan.member_infos = infos.clone();
        let members: Vec<MemberInfo> = infos
            .iter()
            .filter(|i| i.group == MemberGroup::Member)
            .copied()
            .collect();

        for info in &members {
            if let Some(existing) = program.find_matching_member(target, info.member) {
                problems.push(
                    Problem::fatal(
                        ProblemKind::NameClash,
                        format!(
                            "`{}` already exists in {}",
                            program.display_name(existing),
                            program.qualified_name(target)
                        ),
                    )
                    .for_symbol(program.qualified_name(info.member)),
                );
            }
        }
        let moved: Vec<DeclId> = members
            .iter()
            .filter(|i| !i.make_abstract)
            .map(|i| i.member)
            .collect();
        Self::check_dependencies(program, source, program.name_of(target), &moved, problems);
        if problems.has_fatal() {
            return plan;
        }

        for info in &members {
            if info.make_abstract {
                Self::pull_abstract(&mut plan, program, info, target, target_file);
            } else {
                Self::pull_member(&mut plan, program, info, source, target);
            }
        }
        let needs_abstract_target = members.iter().any(|i| i.make_abstract)
            && program.decl(target).is_some_and(|d| !d.is_interface() && !d.is_abstract());
        if needs_abstract_target {
            if let Some(mut modifiers) = plan.planned_modifiers(program, target) {
                modifiers.is_abstract = true;
                plan.set_modifiers(program, target, modifiers);
            }
        }

        let siblings: Vec<DeclId> = program
            .direct_subtypes(target)
            .into_iter()
            .filter(|s| *s != source)
            .collect();
        for member in &moved {
            if program.kind_of(*member) != Some(DeclKind::Method) {
                continue;
            }
            for sibling in &siblings {
                let Some(duplicate) = program.find_matching_member(*sibling, *member) else {
                    continue;
                };
                if self.dedupe_siblings && Self::same_implementation(program, *member, duplicate) {
                    for site in references_to(program, &[duplicate]) {
                        let inside = site.owner.is_some_and(|o| program.is_within(o, duplicate));
                        if !inside && !site.in_import {
                            rebind_site(&mut plan, program, site.node, *member, false);
                        }
                    }
                    plan.edit_decl(program, duplicate, TreeEdit::RemoveMember { member: duplicate });
                } else if let Some(mut modifiers) = plan.planned_modifiers(program, duplicate) {
                    modifiers.is_override = true;
                    plan.set_modifiers(program, duplicate, modifiers);
                }
            }
        }

        for info in infos.iter().filter(|i| i.group == MemberGroup::Implements) {
            let iface = info.member;
            let clause = program
                .decl(source)
                .and_then(|d| d.implements.iter().find(|t| t.decl == Some(iface)))
                .cloned();
            let Some(clause) = clause else {
                continue;
            };
            plan.edit_decl(program, source, TreeEdit::RemoveImplements { ty: source, iface });
            let iface_ref = plan.copy_type(&clause);
            plan.edit_decl(program, target, TreeEdit::AddImplements { ty: target, iface: iface_ref });
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
    use crate::frontend::SearchScope;
    use crate::ops::test_support::{run_clean, sym};
    use crate::ops::{PushDown, Refactoring};
    use crate::usage::{find_usages, UsageOptions};

    fn pull(program: &Program, source: DeclId, members: Vec<MemberSpec>) -> Refactoring {
        Refactoring::PullUp(PullUp::new(sym(program, source), members))
    }

    /// `B` with subclasses `A` and `C` that both declare `int a() { return 1; }`.
    fn siblings() -> (Program, DeclId, DeclId, DeclId, DeclId) {
        let mut b = ProgramBuilder::new();
        let fb = b.file("p/B.java", "p");
        let base = b.class(fb, "B");
        let fa = b.file("p/A.java", "p");
        let a = b.class(fa, "A");
        b.extends(a, base);
        let fc = b.file("p/C.java", "p");
        let c = b.class(fc, "C");
        b.extends(c, base);
        let mut method = None;
        for owner in [a, c] {
            let m = b.method(owner, "a", Some("int"));
            let one = b.int(1);
            let ret = b.ret(Some(one));
            b.set_body(m, vec![ret]);
            method.get_or_insert(m);
        }
        let a_method = method.unwrap();
        (b.finish(), base, a, c, a_method)
    }

    mod class_target_tests {
        use super::*;

        #[test]
        fn method_moves_and_sibling_copy_is_removed() {
            let (program, base, a, c, a_method) = siblings();
            let op = pull(&program, a, vec![MemberSpec::new(sym(&program, a_method))]);
            let (prepared, texts) = run_clean(&program, op);
            let after = &prepared.output.as_ref().unwrap().program;
            assert_eq!(after.members(base), &[a_method]);
            assert!(after.members(a).is_empty());
            assert!(after.members(c).is_empty());
            assert!(texts["p/B.java"].contains("int a() {"));
        }

        #[test]
        fn different_sibling_gets_override_marker() {
            let (program, base, a, c, a_method) = siblings();
            let mut b = ProgramBuilder::from_program(program);
            let c_method = b.program().members(c)[0];
            let two = b.int(2);
            let ret = b.ret(Some(two));
            b.set_body(c_method, vec![ret]);
            let program = b.finish();

            let op = pull(&program, a, vec![MemberSpec::new(sym(&program, a_method))]);
            let (prepared, texts) = run_clean(&program, op);
            let after = &prepared.output.as_ref().unwrap().program;
            assert_eq!(after.members(base).len(), 1);
            assert!(texts["p/C.java"].contains("@Override"));
        }

        #[test]
        fn abstract_pull_leaves_implementation() {
            let (program, base, a, _, a_method) = siblings();
            let op = pull(&program, a, vec![MemberSpec::new(sym(&program, a_method)).abstract_()]);
            let (prepared, texts) = run_clean(&program, op);
            let after = &prepared.output.as_ref().unwrap().program;
            assert_eq!(after.members(base).len(), 1);
            assert!(texts["p/B.java"].contains("public abstract class B"));
            assert!(texts["p/B.java"].contains("abstract int a();"));
            assert!(texts["p/A.java"].contains("@Override"));
        }

        #[test]
        fn existing_member_in_target_is_fatal() {
            let (program, base, a, _, a_method) = siblings();
            let mut b = ProgramBuilder::from_program(program);
            b.method(base, "a", Some("int"));
            let program = b.finish();
            let op = pull(&program, a, vec![MemberSpec::new(sym(&program, a_method))]);
            let prepared = op.prepare(&program, &EngineConfig::default()).unwrap();
            assert!(prepared.output.is_none());
            assert!(prepared.problems.kinds().contains(&ProblemKind::NameClash));
        }

        #[test]
        fn dependency_left_in_subclass_is_fatal() {
            let (program, _, a, _, a_method) = siblings();
            let mut b = ProgramBuilder::from_program(program);
            let seed = b.field(a, "seed", "int");
            let read = b.name(seed);
            let ret = b.ret(Some(read));
            b.set_body(a_method, vec![ret]);
            let program = b.finish();
            let op = pull(&program, a, vec![MemberSpec::new(sym(&program, a_method))]);
            let prepared = op.prepare(&program, &EngineConfig::default()).unwrap();
            assert!(prepared.problems.has_fatal());
        }
    }

    mod interface_target_tests {
        use super::*;

        #[test]
        fn method_becomes_default() {
            let mut b = ProgramBuilder::new();
            let fi = b.file("p/Shape.java", "p");
            let iface = b.interface(fi, "Shape");
            let fs = b.file("p/Square.java", "p");
            let square = b.class(fs, "Square");
            b.implements(square, iface);
            let sides = b.method(square, "sides", Some("int"));
            b.modify(sides, |m| m.visibility = Visibility::Public);
            let four = b.int(4);
            let ret = b.ret(Some(four));
            b.set_body(sides, vec![ret]);
            let program = b.finish();

            let op = Refactoring::PullUp(PullUp {
                target: Some(sym(&program, iface)),
                ..PullUp::new(sym(&program, square), vec![MemberSpec::new(sym(&program, sides))])
            });
            let (_, texts) = run_clean(&program, op);
            assert!(texts["p/Shape.java"].contains("default int sides() {"), "{}", texts["p/Shape.java"]);
        }
    }

    mod round_trip_tests {
        use super::*;

        #[test]
        fn push_down_then_pull_up_restores_usages() {
            let mut b = ProgramBuilder::new();
            let fb = b.file("p/B.java", "p");
            let base = b.class(fb, "B");
            let a_method = b.method(base, "a", Some("int"));
            let one = b.int(1);
            let ret = b.ret(Some(one));
            b.set_body(a_method, vec![ret]);
            let fa = b.file("p/A.java", "p");
            let a = b.class(fa, "A");
            b.extends(a, base);
            let twice = b.method(a, "twice", Some("int"));
            let (first, second) = (b.call(None, a_method, vec![]), b.call(None, a_method, vec![]));
            let sum = b.binary(crate::ast::BinaryOp::Add, first, second);
            let ret = b.ret(Some(sum));
            b.set_body(twice, vec![ret]);
            let fc = b.file("p/C.java", "p");
            let c = b.class(fc, "C");
            b.extends(c, base);
            let program = b.finish();

            let options = UsageOptions::default();
            let before = find_usages(&program, a_method, &SearchScope::Project, &options);

            let push = Refactoring::PushDown(PushDown {
                source: sym(&program, base),
                members: vec![MemberSpec::new(sym(&program, a_method))],
            });
            let (pushed, _) = run_clean(&program, push);
            let middle = pushed.output.unwrap().program;
            let copy = middle.find_member(a, "a", DeclKind::Method).unwrap();

            let pull = pull(&middle, a, vec![MemberSpec::new(sym(&middle, copy))]);
            let (pulled, _) = run_clean(&middle, pull);
            let last = pulled.output.unwrap().program;
            assert_eq!(last.members(base), &[copy]);
            assert!(last.members(c).is_empty());

            let after = find_usages(&last, copy, &SearchScope::Project, &options);
            let shape = |set: &crate::usage::UsageSet| {
                set.usages
                    .iter()
                    .map(|u| (u.path.clone(), u.line, u.col, u.mode))
                    .collect::<Vec<_>>()
            };
            assert_eq!(shape(&before), shape(&after));
        }
    }
}
