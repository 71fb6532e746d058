// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Edit plans.
//!
//! An [`EditPlan`] is what a planner produces: tree edits grouped by file,
//! addressing declarations and nodes by id, plus the declarations and files
//! the plan synthesizes. Plans never mention text offsets. The plan also
//! records [`PlannedChange`] intents that the conflict rules inspect.

use std::collections::{BTreeMap, HashMap};

use recast_core::patch::FileId;
use serde::{Deserialize, Serialize};

use crate::ast::{Block, Expr, IdSource, NodeId, Renumber, TypeParam, TypeRef};
use crate::model::{CompilationUnit, DeclId, Declaration, Modifiers, Program, Visibility};

// ============================================================================
// Member Info
// ============================================================================

/// How a transformed member's visibility is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisibilityPolicy {
    /// Raise just enough to keep every usage compiling.
    #[default]
    Escalate,
    Public,
    AsIs,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberGroup {
    #[default]
    Member,
    /// An `implements` clause rather than a member.
    Implements,
}

/// A declaration annotated for a pending transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberInfo {
    pub member: DeclId,
    pub make_abstract: bool,
    pub visibility: VisibilityPolicy,
    pub group: MemberGroup,
}

impl MemberInfo {
    pub fn new(member: DeclId) -> Self {
        MemberInfo {
            member,
            make_abstract: false,
            visibility: VisibilityPolicy::default(),
            group: MemberGroup::Member,
        }
    }

    pub fn abstract_(mut self) -> Self {
        self.make_abstract = true;
        self
    }

    pub fn with_policy(mut self, policy: VisibilityPolicy) -> Self {
        self.visibility = policy;
        self
    }
}

// ============================================================================
// Tree Edits
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum TreeEdit {
    /// Attach a declaration as a member of `owner`; `index` `None` appends.
    AddMember {
        owner: DeclId,
        member: DeclId,
        index: Option<usize>,
    },
    /// Detach a member and delete it with everything it contains.
    RemoveMember { member: DeclId },
    /// Re-parent an existing member into another type.
    MoveMember { member: DeclId, to: DeclId },
    AddType { file: FileId, ty: DeclId },
    RemoveType { ty: DeclId },
    RemoveFile { file: FileId },
    Rename { decl: DeclId, name: String },
    SetModifiers { decl: DeclId, modifiers: Modifiers },
    SetDoc { decl: DeclId, doc: Option<String> },
    SetType { decl: DeclId, ty: Option<TypeRef> },
    SetTypeParams { decl: DeclId, params: Vec<TypeParam> },
    SetBody { decl: DeclId, body: Option<Block> },
    SetInit { decl: DeclId, init: Option<Expr> },
    SetExtends { ty: DeclId, extends: Option<TypeRef> },
    AddImplements { ty: DeclId, iface: TypeRef },
    RemoveImplements { ty: DeclId, iface: DeclId },
    InsertParam {
        method: DeclId,
        param: DeclId,
        index: usize,
    },
    RemoveParam { method: DeclId, param: DeclId },
    /// Put `method`'s parameters in `order`, which names every parameter
    /// that stays, including ones this plan inserts.
    ReorderParams { method: DeclId, order: Vec<DeclId> },
    /// Replace the expression with id `node`. Replacements may reuse the
    /// ids of the subtrees they keep, so nested replacements still apply.
    ReplaceExpr { node: NodeId, with: Expr },
    SetPackage { file: FileId, package: String },
    MoveFile { file: FileId, path: String },
}

impl TreeEdit {
    pub fn name(&self) -> &'static str {
        match self {
            TreeEdit::AddMember { .. } => "add_member",
            TreeEdit::RemoveMember { .. } => "remove_member",
            TreeEdit::MoveMember { .. } => "move_member",
            TreeEdit::AddType { .. } => "add_type",
            TreeEdit::RemoveType { .. } => "remove_type",
            TreeEdit::RemoveFile { .. } => "remove_file",
            TreeEdit::Rename { .. } => "rename",
            TreeEdit::SetModifiers { .. } => "set_modifiers",
            TreeEdit::SetDoc { .. } => "set_doc",
            TreeEdit::SetType { .. } => "set_type",
            TreeEdit::SetTypeParams { .. } => "set_type_params",
            TreeEdit::SetBody { .. } => "set_body",
            TreeEdit::SetInit { .. } => "set_init",
            TreeEdit::SetExtends { .. } => "set_extends",
            TreeEdit::AddImplements { .. } => "add_implements",
            TreeEdit::RemoveImplements { .. } => "remove_implements",
            TreeEdit::InsertParam { .. } => "insert_param",
            TreeEdit::RemoveParam { .. } => "remove_param",
            TreeEdit::ReorderParams { .. } => "reorder_params",
            TreeEdit::ReplaceExpr { .. } => "replace_expr",
            TreeEdit::SetPackage { .. } => "set_package",
            TreeEdit::MoveFile { .. } => "move_file",
        }
    }
}

// ============================================================================
// Planned Changes
// ============================================================================

/// Semantic intent recorded for the conflict rules.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedChange {
    /// A declaration appears in (or is renamed within) its scope.
    Place { decl: DeclId },
    /// An existing member leaves `from` and is now hosted by `to`.
    Relocate {
        member: DeclId,
        from: DeclId,
        to: DeclId,
        policy: VisibilityPolicy,
        /// Name of the parameter that receives the old `this`, if any.
        receiver: Option<String>,
    },
    /// A method body lands in `target`.
    HostBody { member: DeclId, target: DeclId },
    /// A member is extracted into a new interface.
    ExtractToInterface { member: DeclId },
    /// Top-level types leave their package.
    RelocateTypes {
        types: Vec<DeclId>,
        policy: VisibilityPolicy,
    },
    Delete {
        decls: Vec<DeclId>,
        search_comments: bool,
    },
    /// The base's `implements iface` is copied onto each subclass.
    PropagateImplements {
        iface: DeclId,
        subclasses: Vec<DeclId>,
    },
}

// ============================================================================
// Edit Plan
// ============================================================================

#[derive(Debug, Clone)]
pub struct EditPlan {
    pub label: String,
    next_file: u32,
    next_decl: u32,
    next_node: u32,
    pub new_files: Vec<CompilationUnit>,
    pub new_decls: BTreeMap<DeclId, Declaration>,
    pub edits: BTreeMap<FileId, Vec<TreeEdit>>,
    pub member_infos: Vec<MemberInfo>,
    pub changes: Vec<PlannedChange>,
}

impl IdSource for EditPlan {
    fn node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    fn decl_id(&mut self) -> DeclId {
        let id = DeclId(self.next_decl);
        self.next_decl += 1;
        id
    }
}

impl EditPlan {
    /// An empty plan allocating ids above the program's watermarks.
    pub fn new(program: &Program, label: impl Into<String>) -> Self {
        let (next_file, next_decl, next_node) = program.id_watermarks();
        EditPlan {
            label: label.into(),
            next_file,
            next_decl,
            next_node,
            new_files: Vec::new(),
            new_decls: BTreeMap::new(),
            edits: BTreeMap::new(),
            member_infos: Vec::new(),
            changes: Vec::new(),
        }
    }

    pub fn watermarks(&self) -> (u32, u32, u32) {
        (self.next_file, self.next_decl, self.next_node)
    }

    pub fn file_id(&mut self) -> FileId {
        let id = FileId(self.next_file);
        self.next_file += 1;
        id
    }

    pub fn push(&mut self, file: FileId, edit: TreeEdit) {
        self.edits.entry(file).or_default().push(edit);
    }

    /// Push an edit, keyed by the file of the declaration it targets.
    pub fn edit_decl(&mut self, program: &Program, decl: DeclId, edit: TreeEdit) {
        let file = self
            .new_decls
            .get(&decl)
            .map(|d| d.file)
            .or_else(|| program.decl(decl).map(|d| d.file))
            .unwrap_or(FileId(0));
        self.push(file, edit);
    }

    /// Replace an expression, keyed by the file that contains it.
    pub fn replace_expr(&mut self, program: &Program, node: NodeId, with: Expr) {
        let file = program
            .find_expr(node)
            .and_then(|(owner, _)| program.decl(owner))
            .map(|d| d.file)
            .unwrap_or(FileId(0));
        self.push(file, TreeEdit::ReplaceExpr { node, with });
    }

    pub fn add_decl(&mut self, decl: Declaration) -> DeclId {
        let id = decl.id;
        self.new_decls.insert(id, decl);
        id
    }

    pub fn add_file(&mut self, unit: CompilationUnit) -> FileId {
        let id = unit.id;
        self.new_files.push(unit);
        id
    }

    pub fn new_decl_mut(&mut self, id: DeclId) -> Option<&mut Declaration> {
        self.new_decls.get_mut(&id)
    }

    pub fn change(&mut self, change: PlannedChange) {
        self.changes.push(change);
    }

    pub fn edit_count(&self) -> usize {
        self.edits.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edit_count() == 0 && self.new_files.is_empty()
    }

    /// Whether any edit replaces `node`.
    pub fn replaces(&self, node: NodeId) -> bool {
        self.edits
            .values()
            .flatten()
            .any(|e| matches!(e, TreeEdit::ReplaceExpr { node: n, .. } if *n == node))
    }

    /// Modifiers a declaration will end up with, including planned
    /// `SetModifiers` edits.
    pub fn planned_modifiers(&self, program: &Program, decl: DeclId) -> Option<Modifiers> {
        let planned = self.edits.values().flatten().rev().find_map(|e| match e {
            TreeEdit::SetModifiers { decl: d, modifiers } if *d == decl => Some(modifiers.clone()),
            _ => None,
        });
        planned.or_else(|| {
            self.new_decls
                .get(&decl)
                .or_else(|| program.decl(decl))
                .map(|d| d.modifiers.clone())
        })
    }

    /// Raise a declaration's visibility to at least `to`, merging with any
    /// modifier edit already planned.
    pub fn escalate(&mut self, program: &Program, decl: DeclId, to: Visibility) {
        let Some(mut modifiers) = self.planned_modifiers(program, decl) else {
            return;
        };
        if modifiers.visibility >= to {
            return;
        }
        modifiers.visibility = to;
        self.set_modifiers(program, decl, modifiers);
    }

    /// Plan a modifier change, replacing an earlier one for the same
    /// declaration.
    pub fn set_modifiers(&mut self, program: &Program, decl: DeclId, modifiers: Modifiers) {
        if let Some(new_decl) = self.new_decls.get_mut(&decl) {
            new_decl.modifiers = modifiers;
            return;
        }
        for edits in self.edits.values_mut() {
            edits.retain(|e| !matches!(e, TreeEdit::SetModifiers { decl: d, .. } if *d == decl));
        }
        self.edit_decl(program, decl, TreeEdit::SetModifiers { decl, modifiers });
    }

    // ------------------------------------------------------------------
    // Copying
    // ------------------------------------------------------------------

    /// Deep-copy a member (with its parameters, locals and nested members)
    /// as a new declaration under `parent` in `file`. Returns the copy's id
    /// and the mapping from original to copied declaration ids.
    pub fn copy_member(
        &mut self,
        program: &Program,
        member: DeclId,
        parent: DeclId,
        file: FileId,
    ) -> (DeclId, HashMap<DeclId, DeclId>) {
        let mut remap = HashMap::new();
        self.allocate_copies(program, member, &mut remap);
        let copy = remap.get(&member).copied().unwrap_or(member);
        let originals: Vec<DeclId> = remap.keys().copied().collect();
        for original in originals {
            let Some(source) = program.decl(original) else {
                continue;
            };
            let new_id = remap[&original];
            let new_parent = if original == member {
                Some(parent)
            } else {
                source.parent.map(|p| remap.get(&p).copied().unwrap_or(p))
            };
            let decl = self.copy_decl(source, new_id, new_parent, file, &remap);
            self.new_decls.insert(new_id, decl);
        }
        (copy, remap)
    }

    /// Copy a method's header without its body, as an abstract declaration.
    pub fn copy_signature(
        &mut self,
        program: &Program,
        member: DeclId,
        parent: DeclId,
        file: FileId,
    ) -> DeclId {
        let (copy, remap) = self.copy_member(program, member, parent, file);
        let locals = program
            .decl(member)
            .and_then(|d| d.body.as_ref())
            .map(|b| b.locals())
            .unwrap_or_default();
        for local in locals {
            if let Some(id) = remap.get(&local) {
                self.new_decls.remove(id);
            }
        }
        if let Some(decl) = self.new_decls.get_mut(&copy) {
            decl.body = None;
            decl.modifiers.is_abstract = true;
            decl.modifiers.is_default = false;
            decl.modifiers.is_override = false;
        }
        copy
    }

    fn allocate_copies(
        &mut self,
        program: &Program,
        decl: DeclId,
        remap: &mut HashMap<DeclId, DeclId>,
    ) {
        let Some(source) = program.decl(decl) else {
            return;
        };
        let id = self.decl_id();
        remap.insert(decl, id);
        let mut inner: Vec<DeclId> = source.params.clone();
        if let Some(body) = &source.body {
            inner.extend(body.locals());
        }
        inner.extend(source.members.iter().copied());
        for child in inner {
            self.allocate_copies(program, child, remap);
        }
    }

    fn copy_decl(
        &mut self,
        source: &Declaration,
        id: DeclId,
        parent: Option<DeclId>,
        file: FileId,
        remap: &HashMap<DeclId, DeclId>,
    ) -> Declaration {
        let mut r = Renumber { ids: self, remap };
        Declaration {
            id,
            kind: source.kind,
            name: source.name.clone(),
            file,
            parent,
            modifiers: source.modifiers.clone(),
            ty: source.ty.as_ref().map(|t| r.ty(t)),
            type_params: source
                .type_params
                .iter()
                .map(|tp| TypeParam {
                    name: tp.name.clone(),
                    bounds: tp.bounds.iter().map(|b| r.ty(b)).collect(),
                })
                .collect(),
            params: source
                .params
                .iter()
                .map(|p| remap.get(p).copied().unwrap_or(*p))
                .collect(),
            throws: source.throws.iter().map(|t| r.ty(t)).collect(),
            extends: source.extends.as_ref().map(|t| r.ty(t)),
            implements: source.implements.iter().map(|t| r.ty(t)).collect(),
            members: source
                .members
                .iter()
                .map(|m| remap.get(m).copied().unwrap_or(*m))
                .collect(),
            body: source.body.as_ref().map(|b| r.block(b)),
            init: source.init.as_ref().map(|e| r.expr(e)),
            doc: source.doc.clone(),
        }
    }

    /// Copy an expression with fresh ids, keeping declaration bindings.
    pub fn copy_expr(&mut self, expr: &Expr) -> Expr {
        let remap = HashMap::new();
        Renumber {
            ids: self,
            remap: &remap,
        }
        .expr(expr)
    }

    pub fn copy_type(&mut self, ty: &TypeRef) -> TypeRef {
        let remap = HashMap::new();
        Renumber {
            ids: self,
            remap: &remap,
        }
        .ty(ty)
    }

    /// Declaration lookup that sees the plan's new declarations first.
    pub fn lookup<'a>(&'a self, program: &'a Program, decl: DeclId) -> Option<&'a Declaration> {
        self.new_decls.get(&decl).or_else(|| program.decl(decl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, StmtKind};
    use crate::builder::ProgramBuilder;

    #[test]
    fn copy_member_remaps_params_and_locals() {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/A.java", "p");
        let a = b.class(file, "A");
        let c = b.class(file, "C");
        let m = b.method(a, "twice", Some("int"));
        let x = b.param(m, "x", "int");
        let tmp = b.local(m, "tmp", "int");
        let (nx, nx2) = (b.name(x), b.name(x));
        let sum = b.binary(crate::ast::BinaryOp::Add, nx, nx2);
        let decl_stmt = b.local_stmt(tmp, Some(sum));
        let read = b.name(tmp);
        let ret = b.ret(Some(read));
        b.set_body(m, vec![decl_stmt, ret]);
        let program = b.finish();

        let mut plan = EditPlan::new(&program, "copy");
        let (copy, remap) = plan.copy_member(&program, m, c, file);
        let copied = &plan.new_decls[&copy];
        assert_eq!(copied.parent, Some(c));
        assert_eq!(copied.params, vec![remap[&x]]);
        assert_eq!(plan.new_decls[&remap[&x]].parent, Some(copy));

        let body = copied.body.as_ref().unwrap();
        let StmtKind::Local { decl, .. } = &body.stmts[0].kind else {
            panic!("expected local");
        };
        assert_eq!(*decl, remap[&tmp]);
        let StmtKind::Return(Some(ret)) = &body.stmts[1].kind else {
            panic!("expected return");
        };
        assert!(matches!(ret.kind, ExprKind::Name { decl: Some(d), .. } if d == remap[&tmp]));
        assert!(program.find_expr(ret.id).is_none());
    }

    #[test]
    fn escalate_merges_modifier_edits() {
        let mut b = ProgramBuilder::new();
        let file = b.file("p/A.java", "p");
        let a = b.class(file, "A");
        let f = b.field(a, "f", "int");
        b.modify(f, |m| {
            m.visibility = Visibility::Private;
            m.is_final = true;
        });
        let program = b.finish();

        let mut plan = EditPlan::new(&program, "escalate");
        plan.escalate(&program, f, Visibility::Protected);
        plan.escalate(&program, f, Visibility::Package);
        let planned = plan.planned_modifiers(&program, f).unwrap();
        assert_eq!(planned.visibility, Visibility::Protected);
        assert!(planned.is_final);
        assert_eq!(plan.edit_count(), 1);
    }
}
