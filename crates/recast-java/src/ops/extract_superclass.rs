// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Extract a superclass from a class.
//!
//! The new class is inserted between the source and its old superclass.
//! Selected members move into it; members marked abstract leave only an
//! abstract declaration behind in the new class.

use std::collections::BTreeSet;

use recast_core::config::EngineConfig;
use recast_core::problem::ProblemList;
use serde::{Deserialize, Serialize};

use super::pull_up::PullUp;
use super::{
    apply_policy, check_identifier, invalid_input, required_visibility, resolve_members,
    resolve_type, type_exists, used_type_params, MemberSpec, Planner,
};
use crate::ast::{IdSource, TypeParam, TypeRef};
use crate::frontend::SymbolRef;
use crate::model::{
    source_path, CompilationUnit, DeclId, DeclKind, Declaration, Modifiers, Program, Visibility,
};
use crate::plan::{EditPlan, MemberGroup, PlannedChange, TreeEdit};
use crate::visit::references_to;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractSuperclass {
    pub source: SymbolRef,
    pub name: String,
    pub members: Vec<MemberSpec>,
}

impl Planner for ExtractSuperclass {
    fn label(&self) -> String {
        format!("Extract superclass {} from {}", self.name, self.source.qualified_name)
    }

    fn pre_check(&self, program: &Program, _config: &EngineConfig) -> ProblemList {
        let mut problems = ProblemList::new();
        check_identifier(&self.name, &mut problems);
        let Some(source) = resolve_type(program, &self.source, &mut problems) else {
            return problems;
        };
        if program.decl(source).is_some_and(|d| d.is_interface()) {
            problems.push(invalid_input(format!(
                "`{}` is an interface; extract an interface instead",
                self.source.qualified_name
            )));
        }
        let infos = resolve_members(program, source, &self.members, &mut problems);
        if infos.iter().any(|i| i.group == MemberGroup::Implements) {
            problems.push(invalid_input("implements clauses cannot move to a new superclass"));
        }
        problems
    }

    fn prepare(&self, program: &Program, _config: &EngineConfig, problems: &mut ProblemList) -> EditPlan {
        let mut plan = EditPlan::new(program, self.label());
        let Some(source) = resolve_type(program, &self.source, problems) else {
            return plan;
        };
        let Some(source_decl) = program.decl(source) else {
            return plan;
        };
        let infos = resolve_members(program, source, &self.members, problems);
        plan.member_infos = infos.clone();
        let package = program.package_of(source).to_string();
        if type_exists(program, &package, &self.name, problems) {
            return plan;
        }
        let moved: Vec<DeclId> = infos
            .iter()
            .filter(|i| !i.make_abstract)
            .map(|i| i.member)
            .collect();
        PullUp::check_dependencies(program, source, &self.name, &moved, problems);
        if problems.has_fatal() {
            return plan;
        }
        let Some(unit) = program
            .top_level_type(source)
            .and_then(|t| program.decl(t))
            .and_then(|t| program.file(t.file))
        else {
            return plan;
        };

        let file = plan.file_id();
        plan.add_file(CompilationUnit::new(
            file,
            source_path(unit, &package, &self.name),
            package,
        ));
        let selected: Vec<DeclId> = infos.iter().map(|i| i.member).collect();
        let old_extends: Vec<&TypeRef> = source_decl.extends.iter().collect();
        let type_params = used_type_params(program, source, &selected, &old_extends);

        let class_id = plan.decl_id();
        let mut class = Declaration::new(class_id, DeclKind::Class, &self.name, file, None);
        class.modifiers = Modifiers {
            is_abstract: infos.iter().any(|i| i.make_abstract),
            ..Modifiers::public()
        };
        class.extends = source_decl.extends.as_ref().map(|t| plan.copy_type(t));
        class.type_params = type_params
            .iter()
            .map(|tp| TypeParam {
                name: tp.name.clone(),
                bounds: tp.bounds.iter().map(|b| plan.copy_type(b)).collect(),
            })
            .collect();
        plan.add_decl(class);
        plan.push(file, TreeEdit::AddType { file, ty: class_id });
        plan.change(PlannedChange::Place { decl: class_id });

        for info in &infos {
            let member = info.member;
            if info.make_abstract {
                let copy = plan.copy_signature(program, member, class_id, file);
                if let Some(decl) = plan.new_decl_mut(copy) {
                    if decl.modifiers.visibility == Visibility::Private {
                        decl.modifiers.visibility = Visibility::Protected;
                    }
                }
                plan.push(
                    file,
                    TreeEdit::AddMember {
                        owner: class_id,
                        member: copy,
                        index: None,
                    },
                );
                if let Some(mut modifiers) = plan.planned_modifiers(program, member) {
                    modifiers.is_override = true;
                    modifiers.visibility = modifiers.visibility.max(Visibility::Protected);
                    plan.set_modifiers(program, member, modifiers);
                }
                continue;
            }
            plan.edit_decl(program, member, TreeEdit::MoveMember { member, to: class_id });
            plan.change(PlannedChange::Relocate {
                member,
                from: source,
                to: class_id,
                policy: info.visibility,
                receiver: None,
            });
            // Code staying in the source sees the member as inherited.
            let users: BTreeSet<DeclId> = references_to(program, &[member])
                .into_iter()
                .filter_map(|site| site.owner)
                .filter(|owner| !moved.iter().any(|m| program.is_within(*owner, *m)))
                .collect();
            let mut required = required_visibility(program, source, users.iter().copied());
            if required == Visibility::Private && !users.is_empty() {
                required = Visibility::Protected;
            }
            apply_policy(&mut plan, program, member, info.visibility, required);
        }

        let args = type_params
            .iter()
            .map(|tp| TypeRef::named(&mut plan, tp.name.clone()))
            .collect();
        let extends = TypeRef::to_decl(&mut plan, self.name.clone(), class_id).with_args(args);
        plan.edit_decl(
            program,
            source,
            TreeEdit::SetExtends {
                ty: source,
                extends: Some(extends),
            },
        );
        plan
    }
}

// ============================================================================
// Tests
// ============================================================================
