// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Push members of a type down into its direct subtypes.
//!
//! Each selected member is copied into every direct subtype that does not
//! already declare it, then removed from the base (or left behind as an
//! abstract stub when `make_abstract` is set). References from subtype code
//! are rebound to the subtype's copy; `super.x` becomes a plain `x`.
//! Selected `implements` clauses move from the base onto every subtype.

use std::collections::{BTreeSet, HashMap};

use recast_core::config::EngineConfig;
use recast_core::problem::{Problem, ProblemKind, ProblemList};
use serde::{Deserialize, Serialize};

use super::{
    apply_policy, invalid_input, rebind_new_decl, rebind_site, required_visibility,
    resolve_members, resolve_type, MemberSpec, Planner,
};
use crate::frontend::SymbolRef;
use crate::model::{DeclId, Program, Visibility};
use crate::plan::{EditPlan, MemberGroup, MemberInfo, PlannedChange, TreeEdit};
use crate::visit::{references_to, references_within, Receiver};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushDown {
    pub source: SymbolRef,
    pub members: Vec<MemberSpec>,
}

impl PushDown {
    /// A fatal problem for every removed member still referenced by a base
    /// member that stays behind.
    fn check_base_references(
        program: &Program,
        base: DeclId,
        moving: &[DeclId],
        removed: &[DeclId],
        problems: &mut ProblemList,
    ) {
        let retained = program
            .members(base)
            .iter()
            .copied()
            .filter(|m| !moving.contains(m));
        for member in retained {
            for site in references_within(program, member) {
                if !removed.contains(&site.decl) {
                    continue;
                }
                problems.push(
                    Problem::fatal(
                        ProblemKind::UnreferencedPreconditionViolation,
                        format!(
                            "`{}` is referenced by base member `{}`",
                            program.display_name(site.decl),
                            program.display_name(member)
                        ),
                    )
                    .for_symbol(program.qualified_name(site.decl)),
                );
            }
        }
    }

    /// Raise base members the copies use to the visibility the subtypes
    /// need.
    fn escalate_dependencies(
        plan: &mut EditPlan,
        program: &Program,
        base: DeclId,
        members: &[MemberInfo],
        subclasses: &[DeclId],
    ) {
        let moving: Vec<DeclId> = members.iter().map(|i| i.member).collect();
        for info in members {
            let used: BTreeSet<DeclId> = references_within(program, info.member)
                .into_iter()
                .map(|site| site.decl)
                .filter(|d| !moving.contains(d))
                .filter(|d| program.decl(*d).and_then(|decl| decl.parent) == Some(base))
                .collect();
            for decl in used {
                let required = required_visibility(program, base, subclasses.iter().copied());
                let current = program
                    .decl(decl)
                    .map(|d| d.visibility())
                    .unwrap_or(Visibility::Public);
                if current < required {
                    apply_policy(plan, program, decl, info.visibility, required);
                }
            }
        }
    }
}

impl Planner for PushDown {
    fn label(&self) -> String {
        format!("Push down members of {}", self.source.qualified_name)
    }

    fn pre_check(&self, program: &Program, _config: &EngineConfig) -> ProblemList {
        let mut problems = ProblemList::new();
        let Some(base) = resolve_type(program, &self.source, &mut problems) else {
            return problems;
        };
        if self.members.is_empty() {
            problems.push(invalid_input("no members selected"));
        }
        resolve_members(program, base, &self.members, &mut problems);
        if program.direct_subtypes(base).is_empty() {
            problems.push(
                invalid_input(format!(
                    "`{}` has no subtypes to push members into",
                    self.source.qualified_name
                ))
                .for_symbol(self.source.qualified_name.clone()),
            );
        }
        problems
    }

    fn prepare(&self, program: &Program, _config: &EngineConfig, problems: &mut ProblemList) -> EditPlan {
        let mut plan = EditPlan::new(program, self.label());
        let Some(base) = resolve_type(program, &self.source, problems) else {
            return plan;
        };
        let infos = resolve_members(program, base, &self.members, problems);
        plan.member_infos = infos.clone();
        let subclasses = program.direct_subtypes(base);
        let members: Vec<MemberInfo> = infos
            .iter()
            .filter(|i| i.group == MemberGroup::Member)
            .copied()
            .collect();
        let moving: Vec<DeclId> = members.iter().map(|i| i.member).collect();
        let removed: Vec<DeclId> = members
            .iter()
            .filter(|i| !i.make_abstract)
            .map(|i| i.member)
            .collect();

        Self::check_base_references(program, base, &moving, &removed, problems);

        // Where each member lives in each subtype after the push.
        let mut targets: HashMap<DeclId, HashMap<DeclId, DeclId>> = HashMap::new();
        let mut existing: BTreeSet<DeclId> = BTreeSet::new();
        let mut copies: Vec<(DeclId, DeclId)> = Vec::new();
        for &sub in &subclasses {
            let Some(file) = program.decl(sub).map(|d| d.file) else {
                continue;
            };
            let mut map = HashMap::new();
            for info in &members {
                if let Some(found) = program.find_matching_member(sub, info.member) {
                    map.insert(info.member, found);
                    existing.insert(found);
                    continue;
                }
                let (copy, _) = plan.copy_member(program, info.member, sub, file);
                if let Some(decl) = plan.new_decl_mut(copy) {
                    decl.modifiers.is_override |= info.make_abstract;
                }
                plan.edit_decl(
                    program,
                    sub,
                    TreeEdit::AddMember {
                        owner: sub,
                        member: copy,
                        index: None,
                    },
                );
                plan.change(PlannedChange::Relocate {
                    member: copy,
                    from: base,
                    to: sub,
                    policy: info.visibility,
                    receiver: None,
                });
                map.insert(info.member, copy);
                copies.push((sub, copy));
            }
            targets.insert(sub, map);
        }
        for (sub, copy) in &copies {
            if let Some(map) = targets.get(sub) {
                rebind_new_decl(&mut plan, *copy, map);
            }
        }
        Self::escalate_dependencies(&mut plan, program, base, &members, &subclasses);

        for site in references_to(program, &moving) {
            let Some(owner) = site.owner else {
                continue;
            };
            if moving.iter().any(|m| program.is_within(owner, *m)) {
                continue;
            }
            let context = match site.receiver {
                Receiver::Implicit | Receiver::This | Receiver::Super => program.enclosing_type(owner),
                Receiver::Type(t) | Receiver::Value(t) => t,
            };
            let covering = context.and_then(|t| {
                subclasses
                    .iter()
                    .copied()
                    .find(|s| *s == t || program.is_subtype_of(t, *s))
            });
            let target = covering.and_then(|s| targets.get(&s)?.get(&site.decl).copied());
            match target {
                Some(to) if site.receiver == Receiver::Super && existing.contains(&to) => {
                    problems.push(
                        Problem::fatal(
                            ProblemKind::OverrideIntegrityViolation,
                            format!(
                                "`{}` calls `super.{}` whose implementation is pushed down",
                                program.display_name(owner),
                                program.display_name(site.decl)
                            ),
                        )
                        .for_symbol(program.qualified_name(owner)),
                    );
                }
                Some(to) => {
                    rebind_site(&mut plan, program, site.node, to, site.receiver == Receiver::Super);
                }
                None if removed.contains(&site.decl) && !program.is_within(owner, base) => {
                    let user = program
                        .top_level_type(owner)
                        .map(|t| program.qualified_name(t))
                        .unwrap_or_default();
                    problems.push(
                        Problem::warning(
                            ProblemKind::UnreferencedPreconditionViolation,
                            format!(
                                "`{}` is used through `{}` by {user} and will no longer resolve",
                                program.display_name(site.decl),
                                program.name_of(base)
                            ),
                        )
                        .for_symbol(program.qualified_name(site.decl)),
                    );
                }
                None => {}
            }
        }

        for info in &members {
            if info.make_abstract {
                plan.edit_decl(
                    program,
                    info.member,
                    TreeEdit::SetBody {
                        decl: info.member,
                        body: None,
                    },
                );
                if let Some(mut modifiers) = plan.planned_modifiers(program, info.member) {
                    modifiers.is_abstract = true;
                    modifiers.is_default = false;
                    plan.set_modifiers(program, info.member, modifiers);
                }
            } else {
                plan.edit_decl(program, info.member, TreeEdit::RemoveMember { member: info.member });
            }
        }
        let needs_abstract_base = members.iter().any(|i| i.make_abstract)
            && program.decl(base).is_some_and(|d| !d.is_interface() && !d.is_abstract());
        if needs_abstract_base {
            if let Some(mut modifiers) = plan.planned_modifiers(program, base) {
                modifiers.is_abstract = true;
                plan.set_modifiers(program, base, modifiers);
            }
        }

        for info in infos.iter().filter(|i| i.group == MemberGroup::Implements) {
            let iface = info.member;
            let clause = program
                .decl(base)
                .and_then(|d| d.implements.iter().find(|t| t.decl == Some(iface)))
                .cloned();
            let Some(clause) = clause else {
                continue;
            };
            plan.edit_decl(program, base, TreeEdit::RemoveImplements { ty: base, iface });
            for &sub in &subclasses {
                let iface_ref = plan.copy_type(&clause);
                plan.edit_decl(program, sub, TreeEdit::AddImplements { ty: sub, iface: iface_ref });
            }
            plan.change(PlannedChange::PropagateImplements {
                iface,
                subclasses: subclasses.clone(),
            });
        }
        plan
    }
}

// ============================================================================
// Tests
// ============================================================================
