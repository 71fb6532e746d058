// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Rewrite applier.
//!
//! Applies an [`EditPlan`] to a copy of the program, repairs imports, and
//! renders every file before and after to find what changed. Structural
//! edits run in a fixed phase order, so a plan's edits may be listed in any
//! order:
//!
//! 1. attribute edits (names, modifiers, docs, types, supertypes, packages)
//! 2. containment edits (add/move members and types, insert parameters)
//! 3. body and initializer replacement
//! 4. expression replacement, one pre-order pass that continues into the
//!    replacement trees
//! 5. removals

use std::collections::{BTreeMap, BTreeSet, HashMap};

use recast_core::config::EngineConfig;
use recast_core::patch::FileId;
use serde::Serialize;
use tracing::{debug, trace};

use crate::ast::{Expr, IdSource, NodeId, TypeRef};
use crate::error::ApplyError;
use crate::model::{DeclId, Import, Program};
use crate::plan::{EditPlan, TreeEdit};
use crate::printer::render_file;

// ============================================================================
// Output
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Modify,
    Create,
    Delete,
    Move,
}

/// A rendered file that the plan changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    #[serde(skip)]
    pub file: FileId,
    pub kind: ChangeKind,
    /// Path after the change (the deleted path for deletions).
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApplyOutput {
    pub program: Program,
    /// Changed files, in path order.
    pub changes: Vec<FileChange>,
}

/// Render every file of the program, keyed by id.
pub fn render_all(program: &Program) -> BTreeMap<FileId, (String, String)> {
    program
        .files()
        .into_iter()
        .filter_map(|unit| {
            render_file(program, unit.id).map(|r| (unit.id, (unit.path.clone(), r.text)))
        })
        .collect()
}

// ============================================================================
// Applier
// ============================================================================

/// Apply `plan` to a copy of `program`.
pub fn apply_plan(
    program: &Program,
    plan: &EditPlan,
    config: &EngineConfig,
) -> Result<ApplyOutput, ApplyError> {
    let before = render_all(program);
    let mut staged = program.clone();
    let (file, decl, node) = plan.watermarks();
    staged.raise_watermarks(file, decl, node);
    for unit in &plan.new_files {
        staged.insert_file(unit.clone());
    }
    for decl in plan.new_decls.values() {
        staged.insert_decl(decl.clone());
    }

    let edits: Vec<&TreeEdit> = plan.edits.values().flatten().collect();
    debug!(plan = %plan.label, edits = edits.len(), "applying edit plan");

    for edit in edits.iter().filter(|e| phase(e) == 1) {
        apply_attribute(&mut staged, edit)?;
    }
    let mut containment: Vec<&&TreeEdit> = edits.iter().filter(|e| phase(e) == 2).collect();
    containment.sort_by_key(|e| match e {
        TreeEdit::InsertParam { index, .. } => *index,
        TreeEdit::ReorderParams { .. } => usize::MAX,
        _ => 0,
    });
    for edit in containment {
        apply_containment(&mut staged, edit)?;
    }
    for edit in edits.iter().filter(|e| phase(e) == 3) {
        apply_body(&mut staged, edit)?;
    }
    let replacements: HashMap<NodeId, Expr> = edits
        .iter()
        .filter_map(|e| match e {
            TreeEdit::ReplaceExpr { node, with } => Some((*node, with.clone())),
            _ => None,
        })
        .collect();
    replace_exprs(&mut staged, replacements)?;
    for edit in edits.iter().filter(|e| phase(e) == 5) {
        apply_removal(&mut staged, edit)?;
    }

    sync_files(&mut staged);
    for file in staged.file_ids() {
        fix_imports(&mut staged, file, config);
    }

    let after = render_all(&staged);
    let changes = diff_renders(&before, &after)?;
    staged.bump_generation();
    debug!(changed = changes.len(), "edit plan applied");
    Ok(ApplyOutput {
        program: staged,
        changes,
    })
}

fn phase(edit: &TreeEdit) -> u8 {
    match edit {
        TreeEdit::Rename { .. }
        | TreeEdit::SetModifiers { .. }
        | TreeEdit::SetDoc { .. }
        | TreeEdit::SetType { .. }
        | TreeEdit::SetTypeParams { .. }
        | TreeEdit::SetExtends { .. }
        | TreeEdit::AddImplements { .. }
        | TreeEdit::RemoveImplements { .. }
        | TreeEdit::SetPackage { .. }
        | TreeEdit::MoveFile { .. } => 1,
        TreeEdit::AddMember { .. }
        | TreeEdit::MoveMember { .. }
        | TreeEdit::AddType { .. }
        | TreeEdit::InsertParam { .. }
        | TreeEdit::ReorderParams { .. } => 2,
        TreeEdit::SetBody { .. } | TreeEdit::SetInit { .. } => 3,
        TreeEdit::ReplaceExpr { .. } => 4,
        TreeEdit::RemoveMember { .. }
        | TreeEdit::RemoveType { .. }
        | TreeEdit::RemoveFile { .. }
        | TreeEdit::RemoveParam { .. } => 5,
    }
}

fn decl_mut(program: &mut Program, decl: DeclId) -> Result<&mut crate::model::Declaration, ApplyError> {
    program
        .decl_mut(decl)
        .ok_or(ApplyError::UnknownDecl { decl })
}

fn apply_attribute(program: &mut Program, edit: &TreeEdit) -> Result<(), ApplyError> {
    trace!(edit = edit.name(), "attribute edit");
    match edit {
        TreeEdit::Rename { decl, name } => decl_mut(program, *decl)?.name = name.clone(),
        TreeEdit::SetModifiers { decl, modifiers } => {
            decl_mut(program, *decl)?.modifiers = modifiers.clone()
        }
        TreeEdit::SetDoc { decl, doc } => decl_mut(program, *decl)?.doc = doc.clone(),
        TreeEdit::SetType { decl, ty } => decl_mut(program, *decl)?.ty = ty.clone(),
        TreeEdit::SetTypeParams { decl, params } => {
            decl_mut(program, *decl)?.type_params = params.clone()
        }
        TreeEdit::SetExtends { ty, extends } => decl_mut(program, *ty)?.extends = extends.clone(),
        TreeEdit::AddImplements { ty, iface } => {
            let decl = decl_mut(program, *ty)?;
            let present = iface
                .decl
                .is_some_and(|i| decl.implements.iter().any(|t| t.decl == Some(i)));
            if !present {
                decl.implements.push(iface.clone());
            }
        }
        TreeEdit::RemoveImplements { ty, iface } => {
            decl_mut(program, *ty)?
                .implements
                .retain(|t| t.decl != Some(*iface));
        }
        TreeEdit::SetPackage { file, package } => {
            program
                .file_mut(*file)
                .ok_or(ApplyError::UnknownFile { file: *file })?
                .package = package.clone();
        }
        TreeEdit::MoveFile { file, path } => {
            program
                .file_mut(*file)
                .ok_or(ApplyError::UnknownFile { file: *file })?
                .path = path.clone();
        }
        _ => {}
    }
    Ok(())
}

fn detach(program: &mut Program, member: DeclId) -> Result<(), ApplyError> {
    let (parent, file) = {
        let decl = program
            .decl(member)
            .ok_or(ApplyError::UnknownDecl { decl: member })?;
        (decl.parent, decl.file)
    };
    match parent {
        Some(parent) => {
            if let Some(p) = program.decl_mut(parent) {
                p.members.retain(|m| *m != member);
            }
        }
        None => {
            if let Some(unit) = program.file_mut(file) {
                unit.types.retain(|t| *t != member);
            }
        }
    }
    Ok(())
}

fn apply_containment(program: &mut Program, edit: &TreeEdit) -> Result<(), ApplyError> {
    trace!(edit = edit.name(), "containment edit");
    match edit {
        TreeEdit::AddMember {
            owner,
            member,
            index,
        } => {
            let file = decl_mut(program, *owner)?.file;
            let m = decl_mut(program, *member)?;
            m.parent = Some(*owner);
            m.file = file;
            let owner_decl = decl_mut(program, *owner)?;
            if !owner_decl.members.contains(member) {
                let at = index.unwrap_or(owner_decl.members.len()).min(owner_decl.members.len());
                owner_decl.members.insert(at, *member);
            }
        }
        TreeEdit::MoveMember { member, to } => {
            detach(program, *member)?;
            let file = decl_mut(program, *to)?.file;
            let m = decl_mut(program, *member)?;
            m.parent = Some(*to);
            m.file = file;
            decl_mut(program, *to)?.members.push(*member);
        }
        TreeEdit::AddType { file, ty } => {
            detach(program, *ty)?;
            decl_mut(program, *ty)?.file = *file;
            let unit = program
                .file_mut(*file)
                .ok_or(ApplyError::UnknownFile { file: *file })?;
            if !unit.types.contains(ty) {
                unit.types.push(*ty);
            }
        }
        TreeEdit::InsertParam {
            method,
            param,
            index,
        } => {
            let file = decl_mut(program, *method)?.file;
            let p = decl_mut(program, *param)?;
            p.parent = Some(*method);
            p.file = file;
            let m = decl_mut(program, *method)?;
            let at = (*index).min(m.params.len());
            m.params.insert(at, *param);
        }
        TreeEdit::ReorderParams { method, order } => {
            let m = decl_mut(program, *method)?;
            if let Some(missing) = order.iter().find(|p| !m.params.contains(p)) {
                return Err(ApplyError::UnknownDecl { decl: *missing });
            }
            m.params = order.clone();
        }
        _ => {}
    }
    Ok(())
}

fn apply_body(program: &mut Program, edit: &TreeEdit) -> Result<(), ApplyError> {
    match edit {
        TreeEdit::SetBody { decl, body } => decl_mut(program, *decl)?.body = body.clone(),
        TreeEdit::SetInit { decl, init } => decl_mut(program, *decl)?.init = init.clone(),
        _ => {}
    }
    Ok(())
}

fn replace_exprs(
    program: &mut Program,
    mut replacements: HashMap<NodeId, Expr>,
) -> Result<(), ApplyError> {
    if replacements.is_empty() {
        return Ok(());
    }
    let ids: Vec<DeclId> = program.decls().map(|d| d.id).collect();
    for id in ids {
        let Some(decl) = program.decl_mut(id) else {
            continue;
        };
        let mut replace = |e: &mut Expr| {
            if let Some(with) = replacements.remove(&e.id) {
                *e = with;
            }
        };
        if let Some(init) = &mut decl.init {
            init.walk_mut(&mut replace);
        }
        if let Some(body) = &mut decl.body {
            body.walk_exprs_mut(&mut replace);
        }
        if replacements.is_empty() {
            return Ok(());
        }
    }
    match replacements.keys().min() {
        Some(node) => Err(ApplyError::StaleNode { node: *node }),
        None => Ok(()),
    }
}

fn apply_removal(program: &mut Program, edit: &TreeEdit) -> Result<(), ApplyError> {
    trace!(edit = edit.name(), "removal edit");
    match edit {
        TreeEdit::RemoveMember { member } | TreeEdit::RemoveType { ty: member } => {
            if program.contains(*member) {
                detach(program, *member)?;
                program.remove_decl_tree(*member);
            }
        }
        TreeEdit::RemoveParam { method, param } => {
            decl_mut(program, *method)?.params.retain(|p| p != param);
            program.remove_decl_tree(*param);
        }
        TreeEdit::RemoveFile { file } => {
            if let Some(unit) = program.remove_file(*file) {
                for ty in unit.types {
                    program.remove_decl_tree(ty);
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Point every declaration at the file that now contains it.
fn sync_files(program: &mut Program) {
    let mut assignments = Vec::new();
    for unit in program.files() {
        let mut stack: Vec<DeclId> = unit.types.clone();
        while let Some(next) = stack.pop() {
            assignments.push((next, unit.id));
            if let Some(decl) = program.decl(next) {
                stack.extend(decl.members.iter().copied());
                stack.extend(decl.params.iter().copied());
                if let Some(body) = &decl.body {
                    stack.extend(body.locals());
                }
            }
        }
    }
    for (decl, file) in assignments {
        if let Some(d) = program.decl_mut(decl) {
            d.file = file;
        }
    }
}

// ============================================================================
// Imports
// ============================================================================

fn collect_types<'a>(program: &'a Program, root: DeclId, out: &mut Vec<&'a TypeRef>) {
    let Some(decl) = program.decl(root) else {
        return;
    };
    out.extend(decl.header_types());
    let mut from_expr = |e: &'a Expr| out.extend(e.own_types());
    if let Some(init) = &decl.init {
        init.walk(&mut from_expr);
    }
    if let Some(body) = &decl.body {
        body.walk_exprs(&mut from_expr);
    }
    let mut inner: Vec<DeclId> = decl.params.clone();
    if let Some(body) = &decl.body {
        inner.extend(body.locals());
    }
    inner.extend(decl.members.iter().copied());
    for child in inner {
        collect_types(program, child, out);
    }
}

/// Repair a file's imports: drop imports of deleted, same-package or
/// no longer referenced program types, drop duplicates, and add imports
/// for referenced types from other packages.
pub fn fix_imports(program: &mut Program, file: FileId, config: &EngineConfig) {
    let Some(unit) = program.file(file) else {
        return;
    };
    let package = unit.package.clone();
    let local_types: BTreeSet<DeclId> = unit.types.iter().copied().collect();

    let mut referenced: BTreeSet<DeclId> = BTreeSet::new();
    let mut types = Vec::new();
    for ty in &unit.types {
        collect_types(program, *ty, &mut types);
    }
    for ty in types {
        ty.for_each(&mut |t| {
            if let Some(d) = t.decl.filter(|_| !t.is_qualified()) {
                referenced.insert(d);
            }
        });
    }
    let needs_import = |program: &Program, d: DeclId| -> bool {
        program.is_live(d)
            && program.decl(d).is_some_and(|decl| decl.is_type())
            && program.package_of(d) != package
            && !config.is_implicit_package(program.package_of(d))
            && program
                .top_level_type(d)
                .is_some_and(|top| !local_types.contains(&top))
    };

    let mut kept: Vec<Import> = Vec::new();
    let mut seen_paths = BTreeSet::new();
    for import in &unit.imports {
        let keep = match import.decl {
            Some(d) if import.is_static => program.is_live(d),
            Some(d) => needs_import(program, d) && referenced.contains(&d),
            None => true,
        };
        let path = match import.decl.filter(|d| program.contains(*d)) {
            Some(d) => program.qualified_name(d),
            None => import.path.clone(),
        };
        if keep && seen_paths.insert(path) {
            kept.push(import.clone());
        }
    }

    let imported: BTreeSet<DeclId> = kept.iter().filter_map(|i| i.decl).collect();
    let missing: Vec<(String, DeclId)> = referenced
        .iter()
        .copied()
        .filter(|d| !imported.contains(d) && needs_import(program, *d))
        .map(|d| (program.qualified_name(d), d))
        .filter(|(path, _)| !seen_paths.contains(path))
        .collect();

    for (path, decl) in missing {
        let id = program.node_id();
        let at = kept
            .iter()
            .position(|i| !i.is_static && i.path.as_str() > path.as_str())
            .unwrap_or(kept.len());
        kept.insert(
            at,
            Import {
                id,
                path,
                decl: Some(decl),
                is_static: false,
            },
        );
    }

    if let Some(unit) = program.file_mut(file) {
        if unit.imports != kept {
            trace!(file = %unit.path, imports = kept.len(), "imports updated");
            unit.imports = kept;
        }
    }
}

// ============================================================================
// Change Detection
// ============================================================================

fn diff_renders(
    before: &BTreeMap<FileId, (String, String)>,
    after: &BTreeMap<FileId, (String, String)>,
) -> Result<Vec<FileChange>, ApplyError> {
    let mut paths = BTreeSet::new();
    for (path, _) in after.values() {
        if !paths.insert(path.clone()) {
            return Err(ApplyError::PathCollision { path: path.clone() });
        }
    }

    let mut changes = Vec::new();
    let ids: BTreeSet<FileId> = before.keys().chain(after.keys()).copied().collect();
    for file in ids {
        let change = match (before.get(&file), after.get(&file)) {
            (Some((path, text)), None) => Some(FileChange {
                file,
                kind: ChangeKind::Delete,
                path: path.clone(),
                old_path: None,
                before: Some(text.clone()),
                after: None,
            }),
            (None, Some((path, text))) => Some(FileChange {
                file,
                kind: ChangeKind::Create,
                path: path.clone(),
                old_path: None,
                before: None,
                after: Some(text.clone()),
            }),
            (Some((old_path, old)), Some((path, new))) if old_path != path => Some(FileChange {
                file,
                kind: ChangeKind::Move,
                path: path.clone(),
                old_path: Some(old_path.clone()),
                before: Some(old.clone()),
                after: Some(new.clone()),
            }),
            (Some((_, old)), Some((path, new))) if old != new => Some(FileChange {
                file,
                kind: ChangeKind::Modify,
                path: path.clone(),
                old_path: None,
                before: Some(old.clone()),
                after: Some(new.clone()),
            }),
            _ => None,
        };
        changes.extend(change);
    }
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(changes)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;
    use crate::model::{CompilationUnit, DeclKind, Declaration};

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    mod edit_tests {
        use super::*;

        #[test]
        fn rename_flows_to_references_in_other_files() {
            let mut b = ProgramBuilder::new();
            let f1 = b.file("p/A.java", "p");
            let a = b.class(f1, "A");
            let f2 = b.file("q/B.java", "q");
            b.import(f2, "p.A");
            let bb = b.class(f2, "B");
            b.field(bb, "a", "A");
            let program = b.finish();

            let mut plan = EditPlan::new(&program, "rename");
            plan.edit_decl(
                &program,
                a,
                TreeEdit::Rename {
                    decl: a,
                    name: "Alpha".to_string(),
                },
            );
            let out = apply_plan(&program, &plan, &config()).unwrap();
            let paths: Vec<&str> = out.changes.iter().map(|c| c.path.as_str()).collect();
            assert_eq!(paths, vec!["p/A.java", "q/B.java"]);
            let b_after = out.changes[1].after.as_deref().unwrap();
            assert!(b_after.contains("import p.Alpha;"));
            assert!(b_after.contains("    Alpha a;"));
            assert_eq!(out.program.generation(), program.generation() + 1);
        }

        #[test]
        fn stale_replacement_is_an_error() {
            let mut b = ProgramBuilder::new();
            let file = b.file("A.java", "");
            b.class(file, "A");
            let program = b.finish();

            let mut plan = EditPlan::new(&program, "stale");
            let with = Expr::int(&mut plan, 1);
            plan.push(
                file,
                TreeEdit::ReplaceExpr {
                    node: NodeId(9_999),
                    with,
                },
            );
            let err = apply_plan(&program, &plan, &config()).unwrap_err();
            assert_eq!(err, ApplyError::StaleNode { node: NodeId(9_999) });
        }

        #[test]
        fn nested_replacements_apply_inside_replacement_trees() {
            let mut b = ProgramBuilder::new();
            let file = b.file("A.java", "");
            let a = b.class(file, "A");
            let x = b.field(a, "x", "int");
            let m = b.method(a, "m", Some("int"));
            let (one, two) = (b.int(1), b.int(2));
            let sum = b.binary(crate::ast::BinaryOp::Add, one, two);
            let ret = b.ret(Some(sum.clone()));
            b.set_body(m, vec![ret]);
            let program = b.finish();

            let crate::ast::ExprKind::Binary { lhs, .. } = &sum.kind else {
                unreachable!()
            };
            let mut plan = EditPlan::new(&program, "nested");
            let wrapped = Expr::paren(&mut plan, sum.clone());
            plan.replace_expr(&program, sum.id, wrapped);
            let name = Expr::name(&mut plan, "x", Some(x));
            plan.replace_expr(&program, lhs.id, name);

            let out = apply_plan(&program, &plan, &config()).unwrap();
            let text = out.changes[0].after.as_deref().unwrap();
            assert!(text.contains("return (x + 2);"), "{text}");
        }

        #[test]
        fn reorder_runs_after_inserted_params() {
            let mut b = ProgramBuilder::new();
            let file = b.file("A.java", "");
            let a = b.class(file, "A");
            let m = b.method(a, "m", None);
            let x = b.param(m, "x", "int");
            let y = b.param(m, "y", "int");
            let program = b.finish();

            let mut plan = EditPlan::new(&program, "reorder");
            let id = plan.decl_id();
            let mut z = Declaration::new(id, DeclKind::Parameter, "z", file, Some(m));
            z.ty = Some(crate::ast::TypeRef::named(&mut plan, "int"));
            plan.add_decl(z);
            plan.edit_decl(&program, m, TreeEdit::ReorderParams { method: m, order: vec![id, y] });
            plan.edit_decl(&program, m, TreeEdit::RemoveParam { method: m, param: x });
            plan.edit_decl(&program, m, TreeEdit::InsertParam { method: m, param: id, index: 2 });

            let out = apply_plan(&program, &plan, &config()).unwrap();
            assert_eq!(out.program.params(m), &[id, y]);
            assert!(out.program.decl(x).is_none());
            let text = out.changes[0].after.as_deref().unwrap();
            assert!(text.contains("void m(int z, int y)"), "{text}");
        }

        #[test]
        fn reorder_naming_a_foreign_param_is_an_error() {
            let mut b = ProgramBuilder::new();
            let file = b.file("A.java", "");
            let a = b.class(file, "A");
            let m = b.method(a, "m", None);
            let n = b.method(a, "n", None);
            let x = b.param(m, "x", "int");
            let other = b.param(n, "other", "int");
            let program = b.finish();

            let mut plan = EditPlan::new(&program, "reorder");
            plan.edit_decl(&program, m, TreeEdit::ReorderParams { method: m, order: vec![other, x] });
            let err = apply_plan(&program, &plan, &config()).unwrap_err();
            assert_eq!(err, ApplyError::UnknownDecl { decl: other });
        }
    }

    mod file_tests {
        use super::*;

        #[test]
        fn created_moved_and_deleted_files_are_reported() {
            let mut b = ProgramBuilder::new();
            let f1 = b.file("p/A.java", "p");
            b.class(f1, "A");
            let f2 = b.file("p/Gone.java", "p");
            b.class(f2, "Gone");
            let program = b.finish();

            let mut plan = EditPlan::new(&program, "files");
            let new_file = plan.file_id();
            plan.add_file(CompilationUnit::new(new_file, "p/I.java", "p"));
            let iface = plan.decl_id();
            let mut decl = Declaration::new(iface, DeclKind::Interface, "I", new_file, None);
            decl.modifiers = crate::model::Modifiers::public();
            plan.add_decl(decl);
            plan.push(new_file, TreeEdit::AddType { file: new_file, ty: iface });
            plan.push(f1, TreeEdit::SetPackage { file: f1, package: "r".to_string() });
            plan.push(f1, TreeEdit::MoveFile { file: f1, path: "r/A.java".to_string() });
            plan.push(f2, TreeEdit::RemoveFile { file: f2 });

            let out = apply_plan(&program, &plan, &config()).unwrap();
            let kinds: Vec<(ChangeKind, &str)> =
                out.changes.iter().map(|c| (c.kind, c.path.as_str())).collect();
            assert_eq!(
                kinds,
                vec![
                    (ChangeKind::Delete, "p/Gone.java"),
                    (ChangeKind::Create, "p/I.java"),
                    (ChangeKind::Move, "r/A.java"),
                ]
            );
            assert_eq!(out.changes[2].old_path.as_deref(), Some("p/A.java"));
            assert!(out.changes[2].after.as_deref().unwrap().starts_with("package r;"));
        }

        #[test]
        fn imports_are_dropped_for_same_package_and_added_across_packages() {
            let mut b = ProgramBuilder::new();
            let f1 = b.file("p/A.java", "p");
            b.class(f1, "A");
            let f2 = b.file("p/B.java", "p");
            let bb = b.class(f2, "B");
            b.field(bb, "a", "A");
            let program = b.finish();

            let mut plan = EditPlan::new(&program, "move");
            plan.push(f1, TreeEdit::SetPackage { file: f1, package: "q".to_string() });
            plan.push(f1, TreeEdit::MoveFile { file: f1, path: "q/A.java".to_string() });
            let out = apply_plan(&program, &plan, &config()).unwrap();
            let b_after = out
                .changes
                .iter()
                .find(|c| c.path == "p/B.java")
                .and_then(|c| c.after.as_deref())
                .unwrap();
            assert!(b_after.contains("import q.A;\n"));
        }
    }
}
