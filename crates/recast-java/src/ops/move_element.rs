// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Move a top-level type to another package, or a member to another type.
//!
//! Type moves relocate (or split out) the type's file and rely on import
//! repair for the references. Member moves re-qualify every reference to
//! the new owner. An instance method moving to an unrelated type becomes
//! static; with a receiver parameter the old `this` is passed explicitly.

use std::collections::{BTreeSet, HashMap};

use recast_core::config::EngineConfig;
use recast_core::problem::{Problem, ProblemKind, ProblemList};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    apply_policy, assignment_to, check_identifier, check_package, invalid_input,
    required_visibility, resolve, resolve_type, self_type, type_exists, Instantiate, Planner,
};
use crate::ast::{AssignOp, Block, Expr, ExprKind, IdSource, Stmt, TypeRef};
use crate::frontend::SymbolRef;
use crate::model::{
    source_path, CompilationUnit, DeclId, DeclKind, Declaration, Modifiers, Program, Visibility,
};
use crate::plan::{EditPlan, PlannedChange, TreeEdit, VisibilityPolicy};
use crate::visit::{references_to, references_within, AccessMode, Receiver, RefSite};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MoveTarget {
    Package { package: String },
    Type { target: SymbolRef },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveElement {
    pub symbol: SymbolRef,
    pub target: MoveTarget,
    #[serde(default)]
    pub policy: VisibilityPolicy,
    /// Parameter that receives the old `this` when an instance method
    /// moves to an unrelated type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_parameter: Option<String>,
    /// Route outside access to a moved static field through generated
    /// `get`/`set` methods.
    #[serde(default)]
    pub use_accessors: bool,
}

impl MoveElement {
    pub fn to_package(symbol: SymbolRef, package: impl Into<String>) -> Self {
        MoveElement {
            symbol,
            target: MoveTarget::Package {
                package: package.into(),
            },
            policy: VisibilityPolicy::default(),
            receiver_parameter: None,
            use_accessors: false,
        }
    }

    pub fn to_type(symbol: SymbolRef, target: SymbolRef) -> Self {
        MoveElement {
            symbol,
            target: MoveTarget::Type { target },
            policy: VisibilityPolicy::default(),
            receiver_parameter: None,
            use_accessors: false,
        }
    }

    pub fn with_receiver(mut self, name: impl Into<String>) -> Self {
        self.receiver_parameter = Some(name.into());
        self
    }
}

fn related(program: &Program, a: DeclId, b: DeclId) -> bool {
    program.is_subtype_of(a, b) || program.is_subtype_of(b, a)
}

fn type_name_expr(plan: &mut EditPlan, program: &Program, ty: DeclId) -> Expr {
    let ty = TypeRef::to_decl(plan, program.name_of(ty), ty);
    Expr::type_name(plan, ty)
}

fn accessor_name(prefix: &str, field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => format!("{prefix}{}{}", first.to_uppercase(), chars.as_str()),
        None => prefix.to_string(),
    }
}

// ============================================================================
// Body Rewriting
// ============================================================================

/// Rewrites a moved member's own code for its new home.
struct Rewriter<'a> {
    program: &'a Program,
    member: DeclId,
    owner: DeclId,
    /// Qualify implicit references to the old owner's static members.
    qualify_statics: bool,
    receiver: Option<(DeclId, String)>,
}

impl Rewriter<'_> {
    fn is_owner_static(&self, decl: DeclId) -> bool {
        decl != self.member
            && self.program.decl(decl).is_some_and(|d| {
                matches!(d.kind, DeclKind::Field | DeclKind::Method)
                    && d.is_static()
                    && d.parent
                        .is_some_and(|p| p == self.owner || self.program.is_subtype_of(self.owner, p))
            })
    }

    /// Rewrite one statement-level expression; returns whether it changed.
    fn rewrite(&self, plan: &mut EditPlan, root: &mut Expr) -> bool {
        let mut changed = false;
        if let Some((param, name)) = &self.receiver {
            let receiver = Expr::name(plan, name.clone(), Some(*param));
            let args = HashMap::new();
            *root = Instantiate {
                program: self.program,
                args: &args,
                receiver: Some(&receiver),
            }
            .expr(plan, root);
            changed = true;
        }
        root.walk_mut(&mut |e| match &mut e.kind {
            ExprKind::Name {
                name,
                decl: Some(d),
            } if self.qualify_statics && self.is_owner_static(*d) => {
                let (name, decl) = (name.clone(), *d);
                let qualifier = type_name_expr(plan, self.program, self.owner);
                e.kind = ExprKind::FieldAccess {
                    target: Box::new(qualifier),
                    name,
                    decl: Some(decl),
                };
                changed = true;
            }
            ExprKind::Call {
                target,
                method: Some(m),
                args,
                ..
            } => {
                if *m == self.member {
                    if let Some((param, name)) = &self.receiver {
                        let receiver = match target.take() {
                            Some(t) if !matches!(t.kind, ExprKind::This | ExprKind::Super) => *t,
                            _ => Expr::name(plan, name.clone(), Some(*param)),
                        };
                        args.insert(0, receiver);
                        changed = true;
                    }
                } else if target.is_none() && self.qualify_statics && self.is_owner_static(*m) {
                    *target = Some(Box::new(type_name_expr(plan, self.program, self.owner)));
                    changed = true;
                }
            }
            _ => {}
        });
        changed
    }
}

// ============================================================================
// Planning
// ============================================================================

impl MoveElement {
    fn move_type(
        &self,
        plan: &mut EditPlan,
        program: &Program,
        ty: DeclId,
        package: &str,
        problems: &mut ProblemList,
    ) {
        let name = program.name_of(ty).to_string();
        if type_exists(program, package, &name, problems) {
            return;
        }
        let Some(unit) = program.decl(ty).and_then(|d| program.file(d.file)) else {
            return;
        };
        let old_package = unit.package.clone();
        let path = source_path(unit, package, &name);
        if unit.types.len() == 1 {
            plan.push(
                unit.id,
                TreeEdit::SetPackage {
                    file: unit.id,
                    package: package.to_string(),
                },
            );
            plan.push(unit.id, TreeEdit::MoveFile { file: unit.id, path });
        } else {
            let file = plan.file_id();
            plan.add_file(CompilationUnit::new(file, path, package));
            plan.push(file, TreeEdit::AddType { file, ty });
        }
        plan.change(PlannedChange::RelocateTypes {
            types: vec![ty],
            policy: self.policy,
        });

        // Visibility each cross-package reference needs after the move.
        let needed = |decl: DeclId, from: DeclId| -> Visibility {
            let Some(d) = program.decl(decl) else {
                return Visibility::Public;
            };
            let subclass = d.parent.is_some_and(|p| {
                program
                    .enclosing_type(from)
                    .is_some_and(|t| program.is_subtype_of(t, p))
            });
            if subclass && !d.is_type() {
                Visibility::Protected
            } else {
                Visibility::Public
            }
        };
        let mut raise: Vec<(DeclId, Visibility)> = Vec::new();

        let inside: Vec<DeclId> = program
            .decls()
            .filter(|d| program.is_within(d.id, ty) && (d.kind.is_member() || d.id == ty))
            .map(|d| d.id)
            .collect();
        for site in references_to(program, &inside) {
            let Some(from) = site.owner.filter(|_| !site.in_import) else {
                continue;
            };
            if program.is_within(from, ty) || program.package_of(from) == package {
                continue;
            }
            raise.push((site.decl, needed(site.decl, from)));
        }
        for site in references_within(program, ty) {
            let Some(from) = site.owner else {
                continue;
            };
            let reaches_old_package = program.package_of(site.decl) == old_package
                && !program.is_within(site.decl, ty)
                && program.kind_of(site.decl).is_some_and(|k| k.is_member());
            if reaches_old_package {
                raise.push((site.decl, needed(site.decl, from)));
            }
        }
        for (decl, visibility) in raise {
            let current = plan
                .planned_modifiers(program, decl)
                .map(|m| m.visibility)
                .unwrap_or(Visibility::Public);
            if current < visibility {
                apply_policy(plan, program, decl, self.policy, visibility);
            }
        }
    }

    fn move_member(
        &self,
        plan: &mut EditPlan,
        program: &Program,
        member: DeclId,
        target: DeclId,
        problems: &mut ProblemList,
    ) {
        let Some(decl) = program.decl(member) else {
            return;
        };
        let Some(owner) = decl.parent else {
            return;
        };
        let is_field = decl.kind == DeclKind::Field;
        let converting = !is_field && !decl.is_static() && !related(program, owner, target);
        if converting
            && (!program.overrides(member).is_empty() || !program.overridden_by(member).is_empty())
        {
            problems.push(
                Problem::fatal(
                    ProblemKind::OverrideIntegrityViolation,
                    format!(
                        "`{}` takes part in an override and cannot become static in `{}`",
                        program.display_name(member),
                        program.name_of(target)
                    ),
                )
                .for_symbol(program.qualified_name(member)),
            );
            return;
        }
        let receiver_name = self.receiver_parameter.clone().filter(|_| converting);
        debug!(member = %program.display_name(member), converting, "moving member");

        plan.edit_decl(program, member, TreeEdit::MoveMember { member, to: target });
        plan.change(PlannedChange::Relocate {
            member,
            from: owner,
            to: target,
            policy: self.policy,
            receiver: receiver_name.clone(),
        });
        if converting {
            let mut modifiers = decl.modifiers.clone();
            modifiers.is_static = true;
            modifiers.is_override = false;
            plan.set_modifiers(program, member, modifiers);
        }

        let receiver = receiver_name.map(|name| {
            let id = plan.decl_id();
            let mut param = Declaration::new(id, DeclKind::Parameter, &name, decl.file, Some(member));
            param.ty = Some(self_type(plan, program, owner));
            plan.add_decl(param);
            plan.edit_decl(
                program,
                member,
                TreeEdit::InsertParam {
                    method: member,
                    param: id,
                    index: 0,
                },
            );
            (id, name)
        });

        self.escalate_dependencies(plan, program, member, target);

        let rewriter = Rewriter {
            program,
            member,
            owner,
            qualify_statics: !program.is_subtype_of(target, owner),
            receiver: receiver.clone(),
        };
        if let Some(body) = &decl.body {
            let mut body = body.clone();
            let mut changed = false;
            body.roots_mut(&mut |e| changed |= rewriter.rewrite(plan, e));
            if changed {
                plan.edit_decl(
                    program,
                    member,
                    TreeEdit::SetBody {
                        decl: member,
                        body: Some(body),
                    },
                );
            }
        }
        if let Some(init) = &decl.init {
            let mut init = init.clone();
            if rewriter.rewrite(plan, &mut init) {
                plan.edit_decl(
                    program,
                    member,
                    TreeEdit::SetInit {
                        decl: member,
                        init: Some(init),
                    },
                );
            }
        }

        let sites: Vec<RefSite> = references_to(program, &[member])
            .into_iter()
            .filter(|s| !s.in_import && s.owner.is_some_and(|o| !program.is_within(o, member)))
            .collect();
        let in_target = |site: &RefSite| {
            site.owner
                .and_then(|o| program.enclosing_type(o))
                .is_some_and(|t| t == target || program.is_subtype_of(t, target))
        };

        let mut direct_users: BTreeSet<DeclId> = BTreeSet::new();
        let accessors = if self.use_accessors && is_field {
            Some(self.add_accessors(plan, program, member, target))
        } else {
            None
        };
        for site in &sites {
            let Some((_, expr)) = program.find_expr(site.node) else {
                continue;
            };
            let owner_of_site = site.owner.unwrap_or(member);
            let implicit = matches!(site.receiver, Receiver::Implicit | Receiver::This);
            if let (Some((getter, setter)), false) = (accessors, in_target(site)) {
                if self.access_through(plan, program, site, target, getter, setter) {
                    continue;
                }
            }
            direct_users.insert(owner_of_site);
            if !decl.is_static() && !converting {
                continue;
            }
            let qualifier = if implicit && in_target(site) {
                None
            } else {
                Some(Box::new(type_name_expr(plan, program, target)))
            };
            let kind = match &expr.kind {
                ExprKind::Call {
                    target: old_target,
                    name,
                    method,
                    type_args,
                    args,
                } => {
                    let mut args = args.clone();
                    if receiver.is_some() {
                        let passed = match old_target.as_deref() {
                            Some(t)
                                if !matches!(
                                    t.kind,
                                    ExprKind::This | ExprKind::Super | ExprKind::TypeName(_)
                                ) =>
                            {
                                t.clone()
                            }
                            _ => Expr::this(plan),
                        };
                        args.insert(0, passed);
                    }
                    ExprKind::Call {
                        target: qualifier,
                        name: name.clone(),
                        method: *method,
                        type_args: type_args.clone(),
                        args,
                    }
                }
                ExprKind::Name { name, decl } | ExprKind::FieldAccess { name, decl, .. } => {
                    match qualifier {
                        Some(target) => ExprKind::FieldAccess {
                            target,
                            name: name.clone(),
                            decl: *decl,
                        },
                        None => ExprKind::Name {
                            name: name.clone(),
                            decl: *decl,
                        },
                    }
                }
                _ => continue,
            };
            plan.replace_expr(
                program,
                site.node,
                Expr {
                    id: expr.id,
                    kind,
                },
            );
        }

        let users = if accessors.is_some() {
            direct_users
        } else {
            sites.iter().filter_map(|s| s.owner).collect()
        };
        let required = required_visibility(program, target, users);
        if accessors.is_some() && self.policy != VisibilityPolicy::AsIs {
            if let Some(mut modifiers) = plan.planned_modifiers(program, member) {
                modifiers.visibility = required;
                plan.set_modifiers(program, member, modifiers);
            }
        } else {
            let current = plan
                .planned_modifiers(program, member)
                .map(|m| m.visibility)
                .unwrap_or(Visibility::Public);
            if current < required {
                apply_policy(plan, program, member, self.policy, required);
            }
        }
    }

    /// Raise what the moved member uses so it stays reachable from `target`.
    fn escalate_dependencies(&self, plan: &mut EditPlan, program: &Program, member: DeclId, target: DeclId) {
        for site in references_within(program, member) {
            if site.in_import || program.is_within(site.decl, member) {
                continue;
            }
            let Some(dep) = program.decl(site.decl) else {
                continue;
            };
            if !dep.kind.is_member() {
                continue;
            }
            let dep_owner = dep.parent.unwrap_or(dep.id);
            let mut needed = [Visibility::Private, Visibility::Package, Visibility::Protected]
                .into_iter()
                .find(|v| program.is_accessible_from(dep_owner, *v, target))
                .unwrap_or(Visibility::Public);
            if dep.is_type() && dep.parent.is_none() && needed > Visibility::Package {
                needed = Visibility::Public;
            }
            let current = plan
                .planned_modifiers(program, dep.id)
                .map(|m| m.visibility)
                .unwrap_or(Visibility::Public);
            if current < needed {
                apply_policy(plan, program, dep.id, self.policy, needed);
            }
        }
    }

    /// Generate static accessors for `field` in `target`. Returns the getter
    /// and, for non-final fields, the setter.
    fn add_accessors(
        &self,
        plan: &mut EditPlan,
        program: &Program,
        field: DeclId,
        target: DeclId,
    ) -> (DeclId, Option<DeclId>) {
        let (Some(decl), Some(target_decl)) = (program.decl(field), program.decl(target)) else {
            return (field, None);
        };
        let file = target_decl.file;
        let accessor_modifiers = Modifiers {
            is_static: true,
            ..Modifiers::public()
        };

        let getter = plan.decl_id();
        let mut get = Declaration::new(
            getter,
            DeclKind::Method,
            accessor_name("get", &decl.name),
            file,
            Some(target),
        );
        get.modifiers = accessor_modifiers.clone();
        get.ty = decl.ty.as_ref().map(|t| plan.copy_type(t));
        let read = Expr::name(plan, decl.name.clone(), Some(field));
        get.body = Some(Block::new(vec![Stmt::ret(plan, Some(read))]));
        plan.add_decl(get);
        plan.edit_decl(
            program,
            target,
            TreeEdit::AddMember {
                owner: target,
                member: getter,
                index: None,
            },
        );
        plan.change(PlannedChange::Place { decl: getter });

        if decl.modifiers.is_final {
            return (getter, None);
        }
        let setter = plan.decl_id();
        let param = plan.decl_id();
        let param_name = if decl.name == "value" { "newValue" } else { "value" };
        let mut value = Declaration::new(param, DeclKind::Parameter, param_name, file, Some(setter));
        value.ty = decl.ty.as_ref().map(|t| plan.copy_type(t));
        let mut set = Declaration::new(
            setter,
            DeclKind::Method,
            accessor_name("set", &decl.name),
            file,
            Some(target),
        );
        set.modifiers = accessor_modifiers;
        set.params = vec![param];
        let lhs = Expr::name(plan, decl.name.clone(), Some(field));
        let rhs = Expr::name(plan, param_name, Some(param));
        let assign = Expr::assign(plan, AssignOp::Assign, lhs, rhs);
        set.body = Some(Block::new(vec![Stmt::expr(plan, assign)]));
        plan.add_decl(value);
        plan.add_decl(set);
        plan.edit_decl(
            program,
            target,
            TreeEdit::AddMember {
                owner: target,
                member: setter,
                index: None,
            },
        );
        plan.change(PlannedChange::Place { decl: setter });
        (getter, Some(setter))
    }

    /// Rewrite a field access outside the target as an accessor call.
    /// Returns `false` when the access has to stay direct.
    fn access_through(
        &self,
        plan: &mut EditPlan,
        program: &Program,
        site: &RefSite,
        target: DeclId,
        getter: DeclId,
        setter: Option<DeclId>,
    ) -> bool {
        let name_of = |plan: &EditPlan, id: DeclId| {
            plan.new_decls
                .get(&id)
                .map(|d| d.name.clone())
                .unwrap_or_default()
        };
        match site.mode {
            AccessMode::Read => {
                let qualifier = type_name_expr(plan, program, target);
                let name = name_of(plan, getter);
                let call = Expr::call(plan, Some(qualifier), name, Some(getter), Vec::new());
                plan.replace_expr(program, site.node, call);
                true
            }
            AccessMode::Write => {
                let (Some(setter), Some(owner)) = (setter, site.owner) else {
                    return false;
                };
                let Some(assign) = assignment_to(program, owner, site.node) else {
                    return false;
                };
                let ExprKind::Assign { value, .. } = &assign.kind else {
                    return false;
                };
                let qualifier = type_name_expr(plan, program, target);
                let name = name_of(plan, setter);
                let call = Expr::call(plan, Some(qualifier), name, Some(setter), vec![(**value).clone()]);
                plan.replace_expr(program, assign.id, call);
                true
            }
            AccessMode::ReadWrite | AccessMode::Unclassified => false,
        }
    }
}

impl Planner for MoveElement {
    fn label(&self) -> String {
        let to = match &self.target {
            MoveTarget::Package { package } => format!("package {package}"),
            MoveTarget::Type { target } => target.qualified_name.clone(),
        };
        format!("Move {} to {to}", self.symbol.qualified_name)
    }

    fn pre_check(&self, program: &Program, _config: &EngineConfig) -> ProblemList {
        let mut problems = ProblemList::new();
        if let Some(name) = &self.receiver_parameter {
            check_identifier(name, &mut problems);
        }
        let Some(decl) = resolve(program, &self.symbol, &mut problems) else {
            return problems;
        };
        let Some(d) = program.decl(decl) else {
            return problems;
        };
        match &self.target {
            MoveTarget::Package { package } => {
                check_package(package, &mut problems);
                if !d.is_type() || d.parent.is_some() {
                    problems.push(invalid_input(format!(
                        "only top-level types can move to a package, `{}` is a {}",
                        self.symbol.qualified_name, d.kind
                    )));
                } else if program.package_of(decl) == package {
                    problems.push(invalid_input(format!(
                        "`{}` is already in package `{package}`",
                        self.symbol.qualified_name
                    )));
                }
            }
            MoveTarget::Type { target } => {
                if !matches!(d.kind, DeclKind::Method | DeclKind::Field) || d.parent.is_none() {
                    problems.push(invalid_input(format!(
                        "only methods and fields can move to a type, `{}` is a {}",
                        self.symbol.qualified_name, d.kind
                    )));
                    return problems;
                }
                let Some(target) = resolve_type(program, target, &mut problems) else {
                    return problems;
                };
                let owner = d.parent.unwrap_or(target);
                if owner == target {
                    problems.push(invalid_input(format!(
                        "`{}` is already declared in `{}`",
                        self.symbol.qualified_name,
                        program.name_of(target)
                    )));
                }
                if program.decl(target).is_some_and(|t| t.is_interface()) {
                    problems.push(invalid_input(format!(
                        "members cannot move into interface `{}`; pull up or extract an interface instead",
                        program.name_of(target)
                    )));
                }
                if d.kind == DeclKind::Field && !d.is_static() && !related(program, owner, target) {
                    problems.push(invalid_input(format!(
                        "instance field `{}` can only move within its type hierarchy",
                        d.name
                    )));
                }
                if self.use_accessors && !(d.kind == DeclKind::Field && d.is_static()) {
                    problems.push(invalid_input("accessors can only be generated for static fields"));
                }
            }
        }
        problems
    }

    fn prepare(&self, program: &Program, _config: &EngineConfig, problems: &mut ProblemList) -> EditPlan {
        let mut plan = EditPlan::new(program, self.label());
        let Some(decl) = resolve(program, &self.symbol, problems) else {
            return plan;
        };
        match &self.target {
            MoveTarget::Package { package } => {
                self.move_type(&mut plan, program, decl, package, problems);
            }
            MoveTarget::Type { target } => {
                if let Some(target) = resolve_type(program, target, problems) {
                    self.move_member(&mut plan, program, decl, target, problems);
                }
            }
        }
        plan
    }
}

// ============================================================================
// Tests
// ============================================================================
