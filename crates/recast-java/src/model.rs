// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Resolved program model.
//!
//! Declarations live in an arena indexed by [`DeclId`]; compilation units
//! list their top-level types and types list their members by id. Subtype,
//! override and accessibility relations are computed per query from the
//! arena and never cached, so a model edited by the applier is immediately
//! consistent.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use recast_core::patch::FileId;
use serde::{Deserialize, Serialize};

use crate::ast::{Block, Expr, IdSource, NodeId, TypeParam, TypeRef};

// ============================================================================
// Identifiers and Modifiers
// ============================================================================

/// Stable identity of a declaration across edits of the same program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeclId(pub u32);

impl fmt::Display for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decl_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    Class,
    Interface,
    Method,
    Constructor,
    Field,
    Parameter,
    Local,
}

impl DeclKind {
    pub fn is_type(self) -> bool {
        matches!(self, DeclKind::Class | DeclKind::Interface)
    }

    pub fn is_member(self) -> bool {
        matches!(
            self,
            DeclKind::Method | DeclKind::Constructor | DeclKind::Field
        ) || self.is_type()
    }

    pub fn is_variable(self) -> bool {
        matches!(self, DeclKind::Field | DeclKind::Parameter | DeclKind::Local)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeclKind::Class => "class",
            DeclKind::Interface => "interface",
            DeclKind::Method => "method",
            DeclKind::Constructor => "constructor",
            DeclKind::Field => "field",
            DeclKind::Parameter => "parameter",
            DeclKind::Local => "local",
        }
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access level, ordered from most to least restrictive.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    #[default]
    Package,
    Protected,
    Public,
}

impl Visibility {
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            Visibility::Private => Some("private"),
            Visibility::Package => None,
            Visibility::Protected => Some("protected"),
            Visibility::Public => Some("public"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub is_abstract: bool,
    /// `default` interface method.
    pub is_default: bool,
    /// Carries the `@Override` marker.
    pub is_override: bool,
}

impl Modifiers {
    pub fn public() -> Self {
        Modifiers {
            visibility: Visibility::Public,
            ..Default::default()
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

// ============================================================================
// Declarations and Compilation Units
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub id: DeclId,
    pub kind: DeclKind,
    pub name: String,
    pub file: FileId,
    /// Enclosing declaration; `None` for top-level types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<DeclId>,
    #[serde(default)]
    pub modifiers: Modifiers,
    /// Variable type, or method return type (`None` means `void`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_params: Vec<TypeParam>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<DeclId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub throws: Vec<TypeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<TypeRef>,
    /// Implemented interfaces; for an interface, its `extends` list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implements: Vec<TypeRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<DeclId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Block>,
    /// Field initializer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<Expr>,
    /// Documentation comment text, without delimiters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl Declaration {
    pub fn new(
        id: DeclId,
        kind: DeclKind,
        name: impl Into<String>,
        file: FileId,
        parent: Option<DeclId>,
    ) -> Self {
        Declaration {
            id,
            kind,
            name: name.into(),
            file,
            parent,
            modifiers: Modifiers::default(),
            ty: None,
            type_params: Vec::new(),
            params: Vec::new(),
            throws: Vec::new(),
            extends: None,
            implements: Vec::new(),
            members: Vec::new(),
            body: None,
            init: None,
            doc: None,
        }
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.is_static
    }

    pub fn is_abstract(&self) -> bool {
        self.modifiers.is_abstract
    }

    pub fn visibility(&self) -> Visibility {
        self.modifiers.visibility
    }

    pub fn is_type(&self) -> bool {
        self.kind.is_type()
    }

    pub fn is_interface(&self) -> bool {
        self.kind == DeclKind::Interface
    }

    /// Every type reference in the declaration header.
    pub fn header_types(&self) -> Vec<&TypeRef> {
        let mut out: Vec<&TypeRef> = Vec::new();
        out.extend(self.ty.iter());
        for tp in &self.type_params {
            out.extend(tp.bounds.iter());
        }
        out.extend(self.throws.iter());
        out.extend(self.extends.iter());
        out.extend(self.implements.iter());
        out
    }

    pub fn header_types_mut(&mut self) -> Vec<&mut TypeRef> {
        let mut out: Vec<&mut TypeRef> = Vec::new();
        out.extend(self.ty.iter_mut());
        for tp in &mut self.type_params {
            out.extend(tp.bounds.iter_mut());
        }
        out.extend(self.throws.iter_mut());
        out.extend(self.extends.iter_mut());
        out.extend(self.implements.iter_mut());
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub id: NodeId,
    /// Imported qualified name as written.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decl: Option<DeclId>,
    #[serde(default)]
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationUnit {
    pub id: FileId,
    /// Workspace-relative path with `/` separators.
    pub path: String,
    /// Package name; empty for the default package.
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub imports: Vec<Import>,
    #[serde(default)]
    pub types: Vec<DeclId>,
}

impl CompilationUnit {
    pub fn new(id: FileId, path: impl Into<String>, package: impl Into<String>) -> Self {
        CompilationUnit {
            id,
            path: path.into(),
            package: package.into(),
            imports: Vec::new(),
            types: Vec::new(),
        }
    }

    /// Directory part of the path, without trailing slash.
    pub fn folder(&self) -> &str {
        self.path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit_once('/').map(|(_, f)| f).unwrap_or(&self.path)
    }
}

/// Path of the source file for a top-level type in a package, keeping the
/// source root of `like` (the folder above its package directories).
pub fn source_path(like: &CompilationUnit, package: &str, type_name: &str) -> String {
    let package_dir = like.package.replace('.', "/");
    let folder = like.folder();
    let root = if package_dir.is_empty() {
        folder
    } else {
        folder.strip_suffix(&package_dir).unwrap_or(folder)
    };
    let root = root.trim_end_matches('/');
    let mut path = String::new();
    if !root.is_empty() {
        path.push_str(root);
        path.push('/');
    }
    if !package.is_empty() {
        path.push_str(&package.replace('.', "/"));
        path.push('/');
    }
    path.push_str(type_name);
    path.push_str(".java");
    path
}

// ============================================================================
// Program
// ============================================================================

/// A fully resolved program: the in-memory front-end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ProgramSnapshot", into = "ProgramSnapshot")]
pub struct Program {
    files: BTreeMap<FileId, CompilationUnit>,
    decls: BTreeMap<DeclId, Declaration>,
    next_file: u32,
    next_decl: u32,
    next_node: u32,
    generation: u64,
}

/// Serialized form of a [`Program`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ProgramSnapshot {
    #[serde(default)]
    generation: u64,
    files: Vec<CompilationUnit>,
    decls: Vec<Declaration>,
}

impl From<ProgramSnapshot> for Program {
    fn from(snapshot: ProgramSnapshot) -> Self {
        let mut program = Program {
            generation: snapshot.generation,
            ..Default::default()
        };
        for unit in snapshot.files {
            program.insert_file(unit);
        }
        for decl in snapshot.decls {
            program.insert_decl(decl);
        }
        program.next_node = program.max_node_id() + 1;
        program
    }
}

impl From<Program> for ProgramSnapshot {
    fn from(program: Program) -> Self {
        ProgramSnapshot {
            generation: program.generation,
            files: program.files.into_values().collect(),
            decls: program.decls.into_values().collect(),
        }
    }
}

impl IdSource for Program {
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

impl Program {
    pub fn new() -> Self {
        Program {
            next_node: 1,
            next_decl: 1,
            next_file: 1,
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------
    // Generation and id counters
    // ------------------------------------------------------------------

    /// Incremented by every applied edit plan.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn bump_generation(&mut self) {
        self.generation += 1;
    }

    /// Continue the generation sequence after `previous`, so a restored
    /// program never reuses a stamp handed out since it was saved.
    pub fn set_generation_after(&mut self, previous: u64) {
        self.generation = previous + 1;
    }

    pub fn file_id(&mut self) -> FileId {
        let id = FileId(self.next_file);
        self.next_file += 1;
        id
    }

    /// Next unallocated ids, as `(file, decl, node)`.
    pub fn id_watermarks(&self) -> (u32, u32, u32) {
        (self.next_file, self.next_decl, self.next_node)
    }

    /// Raise the id counters to at least the given watermarks.
    pub fn raise_watermarks(&mut self, file: u32, decl: u32, node: u32) {
        self.next_file = self.next_file.max(file);
        self.next_decl = self.next_decl.max(decl);
        self.next_node = self.next_node.max(node);
    }

    fn max_node_id(&self) -> u32 {
        let mut max = 0;
        for unit in self.files.values() {
            for import in &unit.imports {
                max = max.max(import.id.0);
            }
        }
        for decl in self.decls.values() {
            for ty in decl.header_types() {
                ty.for_each(&mut |t| max = max.max(t.id.0));
            }
            if let Some(init) = &decl.init {
                init.walk(&mut |e| max = max.max(max_in_expr(e)));
            }
            if let Some(body) = &decl.body {
                max = max.max(max_in_block(body));
            }
        }
        max
    }

    // ------------------------------------------------------------------
    // Arena access
    // ------------------------------------------------------------------

    pub fn insert_file(&mut self, unit: CompilationUnit) {
        self.next_file = self.next_file.max(unit.id.0 + 1);
        self.files.insert(unit.id, unit);
    }

    pub fn remove_file(&mut self, id: FileId) -> Option<CompilationUnit> {
        self.files.remove(&id)
    }

    pub fn insert_decl(&mut self, decl: Declaration) {
        self.next_decl = self.next_decl.max(decl.id.0 + 1);
        self.decls.insert(decl.id, decl);
    }

    /// Remove a declaration with its parameters, locals and members.
    pub fn remove_decl_tree(&mut self, id: DeclId) -> Vec<DeclId> {
        let mut removed = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(next) = queue.pop_front() {
            if let Some(decl) = self.decls.remove(&next) {
                queue.extend(decl.params.iter().copied());
                queue.extend(decl.members.iter().copied());
                if let Some(body) = &decl.body {
                    queue.extend(body.locals());
                }
                removed.push(next);
            }
        }
        removed
    }

    pub fn file(&self, id: FileId) -> Option<&CompilationUnit> {
        self.files.get(&id)
    }

    pub fn file_mut(&mut self, id: FileId) -> Option<&mut CompilationUnit> {
        self.files.get_mut(&id)
    }

    /// Compilation units in path order.
    pub fn files(&self) -> Vec<&CompilationUnit> {
        let mut files: Vec<&CompilationUnit> = self.files.values().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    pub fn file_ids(&self) -> Vec<FileId> {
        self.files.keys().copied().collect()
    }

    pub fn file_by_path(&self, path: &str) -> Option<&CompilationUnit> {
        self.files.values().find(|f| f.path == path)
    }

    pub fn decl(&self, id: DeclId) -> Option<&Declaration> {
        self.decls.get(&id)
    }

    pub fn decl_mut(&mut self, id: DeclId) -> Option<&mut Declaration> {
        self.decls.get_mut(&id)
    }

    pub fn contains(&self, id: DeclId) -> bool {
        self.decls.contains_key(&id)
    }

    pub fn decls(&self) -> impl Iterator<Item = &Declaration> {
        self.decls.values()
    }

    pub fn name_of(&self, id: DeclId) -> &str {
        self.decl(id).map(|d| d.name.as_str()).unwrap_or("")
    }

    pub fn kind_of(&self, id: DeclId) -> Option<DeclKind> {
        self.decl(id).map(|d| d.kind)
    }

    // ------------------------------------------------------------------
    // Names and enclosing structure
    // ------------------------------------------------------------------

    pub fn package_of(&self, id: DeclId) -> &str {
        self.decl(id)
            .and_then(|d| self.file(d.file))
            .map(|f| f.package.as_str())
            .unwrap_or("")
    }

    /// Fully qualified name: package, enclosing chain, then the name.
    pub fn qualified_name(&self, id: DeclId) -> String {
        let mut parts = Vec::new();
        let mut current = self.decl(id);
        while let Some(decl) = current {
            parts.push(decl.name.as_str());
            current = decl.parent.and_then(|p| self.decl(p));
        }
        parts.reverse();
        let package = self.package_of(id);
        if package.is_empty() {
            parts.join(".")
        } else {
            format!("{package}.{}", parts.join("."))
        }
    }

    /// Parameter type keys of a method or constructor.
    pub fn signature(&self, id: DeclId) -> Vec<String> {
        self.decl(id)
            .map(|d| {
                d.params
                    .iter()
                    .filter_map(|p| self.decl(*p))
                    .map(|p| p.ty.as_ref().map(type_key).unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Human-readable `name(T1, T2)` form for methods, the name otherwise.
    pub fn display_name(&self, id: DeclId) -> String {
        match self.kind_of(id) {
            Some(DeclKind::Method | DeclKind::Constructor) => {
                format!("{}({})", self.name_of(id), self.signature(id).join(", "))
            }
            _ => self.name_of(id).to_string(),
        }
    }

    /// Nearest enclosing type, or the declaration itself if it is a type.
    pub fn enclosing_type(&self, id: DeclId) -> Option<DeclId> {
        let mut current = self.decl(id);
        while let Some(decl) = current {
            if decl.is_type() {
                return Some(decl.id);
            }
            current = decl.parent.and_then(|p| self.decl(p));
        }
        None
    }

    /// Nearest enclosing method or constructor.
    pub fn enclosing_executable(&self, id: DeclId) -> Option<DeclId> {
        let mut current = self.decl(id);
        while let Some(decl) = current {
            if matches!(decl.kind, DeclKind::Method | DeclKind::Constructor) {
                return Some(decl.id);
            }
            current = decl.parent.and_then(|p| self.decl(p));
        }
        None
    }

    pub fn top_level_type(&self, id: DeclId) -> Option<DeclId> {
        let mut result = None;
        let mut current = self.decl(id);
        while let Some(decl) = current {
            if decl.is_type() {
                result = Some(decl.id);
            }
            current = decl.parent.and_then(|p| self.decl(p));
        }
        result
    }

    /// Whether `id` is `ancestor` or nested (at any depth) inside it.
    pub fn is_within(&self, id: DeclId, ancestor: DeclId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.decl(c).and_then(|d| d.parent);
        }
        false
    }

    /// Whether the declaration is attached to a compilation unit.
    pub fn is_live(&self, id: DeclId) -> bool {
        let Some(decl) = self.decl(id) else {
            return false;
        };
        match decl.parent {
            Some(parent) => {
                let parent_decl = self.decl(parent);
                let attached = parent_decl.is_some_and(|p| {
                    p.members.contains(&id)
                        || p.params.contains(&id)
                        || p.body.as_ref().is_some_and(|b| b.locals().contains(&id))
                });
                attached && self.is_live(parent)
            }
            None => self.file(decl.file).is_some_and(|f| f.types.contains(&id)),
        }
    }

    pub fn type_by_qualified_name(&self, name: &str) -> Option<DeclId> {
        self.decls
            .values()
            .filter(|d| d.is_type())
            .find(|d| self.qualified_name(d.id) == name)
            .map(|d| d.id)
    }

    /// Resolve a declaration by qualified name and optional signature.
    pub fn find_by_qualified_name(&self, name: &str, signature: Option<&[String]>) -> Option<DeclId> {
        self.decls
            .values()
            .filter(|d| self.is_live(d.id))
            .find(|d| {
                self.qualified_name(d.id) == name
                    && signature.is_none_or(|sig| {
                        !matches!(d.kind, DeclKind::Method | DeclKind::Constructor)
                            || self.signature(d.id) == sig
                    })
            })
            .map(|d| d.id)
    }

    /// Top-level types declared in a package, in file order.
    pub fn types_in_package(&self, package: &str) -> Vec<DeclId> {
        self.files()
            .into_iter()
            .filter(|f| f.package == package)
            .flat_map(|f| f.types.iter().copied())
            .collect()
    }

    pub fn packages(&self) -> BTreeSet<String> {
        self.files.values().map(|f| f.package.clone()).collect()
    }

    // ------------------------------------------------------------------
    // Type hierarchy
    // ------------------------------------------------------------------

    /// Declared supertypes that resolve to program types.
    pub fn direct_supertypes(&self, ty: DeclId) -> Vec<DeclId> {
        let Some(decl) = self.decl(ty) else {
            return Vec::new();
        };
        decl.extends
            .iter()
            .chain(decl.implements.iter())
            .filter_map(|t| t.decl)
            .collect()
    }

    pub fn superclass(&self, ty: DeclId) -> Option<DeclId> {
        self.decl(ty)
            .and_then(|d| d.extends.as_ref())
            .and_then(|t| t.decl)
    }

    /// Transitive supertypes, nearest first.
    pub fn all_supertypes(&self, ty: DeclId) -> Vec<DeclId> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<DeclId> = self.direct_supertypes(ty).into();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                out.push(next);
                queue.extend(self.direct_supertypes(next));
            }
        }
        out
    }

    /// Types that directly extend or implement `ty`, in declaration order.
    pub fn direct_subtypes(&self, ty: DeclId) -> Vec<DeclId> {
        self.decls
            .values()
            .filter(|d| d.is_type() && self.is_live(d.id))
            .filter(|d| self.direct_supertypes(d.id).contains(&ty))
            .map(|d| d.id)
            .collect()
    }

    pub fn all_subtypes(&self, ty: DeclId) -> Vec<DeclId> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<DeclId> = self.direct_subtypes(ty).into();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                out.push(next);
                queue.extend(self.direct_subtypes(next));
            }
        }
        out
    }

    pub fn is_subtype_of(&self, sub: DeclId, sup: DeclId) -> bool {
        sub == sup || self.all_supertypes(sub).contains(&sup)
    }

    // ------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------

    pub fn members(&self, ty: DeclId) -> &[DeclId] {
        self.decl(ty).map(|d| d.members.as_slice()).unwrap_or(&[])
    }

    pub fn params(&self, method: DeclId) -> &[DeclId] {
        self.decl(method).map(|d| d.params.as_slice()).unwrap_or(&[])
    }

    pub fn constructors(&self, ty: DeclId) -> Vec<DeclId> {
        self.members(ty)
            .iter()
            .copied()
            .filter(|m| self.kind_of(*m) == Some(DeclKind::Constructor))
            .collect()
    }

    /// A member of `ty` with the same kind, name and (for methods)
    /// signature as `like`.
    pub fn find_matching_member(&self, ty: DeclId, like: DeclId) -> Option<DeclId> {
        let like_decl = self.decl(like)?;
        let signature = self.signature(like);
        self.members(ty).iter().copied().find(|m| {
            *m != like
                && self.decl(*m).is_some_and(|d| {
                    d.name == like_decl.name
                        && same_member_kind(d.kind, like_decl.kind)
                        && (d.kind != DeclKind::Method || self.signature(*m) == signature)
                })
        })
    }

    /// A member named `name` of the given kind family in `ty`.
    pub fn find_member(&self, ty: DeclId, name: &str, kind: DeclKind) -> Option<DeclId> {
        self.members(ty).iter().copied().find(|m| {
            self.decl(*m)
                .is_some_and(|d| d.name == name && same_member_kind(d.kind, kind))
        })
    }

    /// Look a member up in `ty` and its supertypes.
    pub fn lookup_member(&self, ty: DeclId, name: &str, kind: DeclKind) -> Option<DeclId> {
        std::iter::once(ty)
            .chain(self.all_supertypes(ty))
            .find_map(|t| self.find_member(t, name, kind))
    }

    fn can_override(&self, decl: &Declaration) -> bool {
        decl.kind == DeclKind::Method
            && !decl.modifiers.is_static
            && decl.modifiers.visibility != Visibility::Private
    }

    /// Supertype methods that `method` overrides.
    pub fn overrides(&self, method: DeclId) -> Vec<DeclId> {
        let Some(decl) = self.decl(method).filter(|d| self.can_override(d)) else {
            return Vec::new();
        };
        let Some(owner) = decl.parent else {
            return Vec::new();
        };
        self.all_supertypes(owner)
            .into_iter()
            .filter_map(|sup| self.find_matching_member(sup, method))
            .filter(|m| self.decl(*m).is_some_and(|d| self.can_override(d)))
            .collect()
    }

    /// Subtype methods that override `method`.
    pub fn overridden_by(&self, method: DeclId) -> Vec<DeclId> {
        let Some(decl) = self.decl(method).filter(|d| self.can_override(d)) else {
            return Vec::new();
        };
        let Some(owner) = decl.parent else {
            return Vec::new();
        };
        self.all_subtypes(owner)
            .into_iter()
            .filter_map(|sub| self.find_matching_member(sub, method))
            .filter(|m| self.decl(*m).is_some_and(|d| self.can_override(d)))
            .collect()
    }

    /// The method with every method it overrides or is overridden by,
    /// transitively.
    pub fn override_family(&self, method: DeclId) -> Vec<DeclId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([method]);
        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                queue.extend(self.overrides(next));
                queue.extend(self.overridden_by(next));
            }
        }
        seen.into_iter().collect()
    }

    // ------------------------------------------------------------------
    // Accessibility
    // ------------------------------------------------------------------

    /// Whether `member` (as currently declared in `owner`) is accessible
    /// from code inside `from`.
    pub fn is_accessible_from(
        &self,
        owner: DeclId,
        visibility: Visibility,
        from: DeclId,
    ) -> bool {
        match visibility {
            Visibility::Public => true,
            Visibility::Private => self.top_level_type(owner) == self.top_level_type(from),
            Visibility::Package => self.package_of(owner) == self.package_of(from),
            Visibility::Protected => {
                self.package_of(owner) == self.package_of(from)
                    || self
                        .enclosing_type(from)
                        .is_some_and(|t| self.is_subtype_of(t, owner))
            }
        }
    }

    // ------------------------------------------------------------------
    // Node lookup
    // ------------------------------------------------------------------

    /// Find an expression by node id, with the declaration owning it.
    pub fn find_expr(&self, node: NodeId) -> Option<(DeclId, &Expr)> {
        self.decls
            .values()
            .find_map(|decl| find_in_decl(decl, node).map(|e| (decl.id, e)))
    }
}

fn find_in_decl<'a>(decl: &'a Declaration, node: NodeId) -> Option<&'a Expr> {
    let mut found: Option<&'a Expr> = None;
    let mut visit = |e: &'a Expr| {
        if found.is_none() && e.id == node {
            found = Some(e);
        }
    };
    if let Some(init) = &decl.init {
        init.walk(&mut visit);
    }
    if let Some(body) = &decl.body {
        body.walk_exprs(&mut visit);
    }
    found
}

fn max_in_expr(expr: &Expr) -> u32 {
    let mut max = expr.id.0;
    for ty in expr.own_types() {
        ty.for_each(&mut |t| max = max.max(t.id.0));
    }
    max
}

fn max_in_block(block: &Block) -> u32 {
    let mut max = 0;
    for stmt in &block.stmts {
        max = max.max(stmt.id.0);
        for inner in stmt.blocks() {
            max = max.max(max_in_block(inner));
        }
    }
    block.walk_exprs(&mut |e| max = max.max(max_in_expr(e)));
    max
}

fn same_member_kind(a: DeclKind, b: DeclKind) -> bool {
    a == b || (a.is_type() && b.is_type())
}

/// Erased key of a type for signature comparison: simple name plus array
/// brackets.
pub fn type_key(ty: &TypeRef) -> String {
    let mut key = ty.simple_name().to_string();
    for _ in 0..ty.dims {
        key.push_str("[]");
    }
    key
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;

    fn hierarchy() -> (Program, DeclId, DeclId, DeclId, DeclId) {
        let mut b = ProgramBuilder::new();
        let file = b.file("src/p/Shapes.java", "p");
        let base = b.class(file, "Base");
        let run = b.method(base, "run", None);
        let left = b.class(file, "Left");
        b.extends(left, base);
        let left_run = b.method(left, "run", None);
        let right = b.class(file, "Right");
        b.extends(right, base);
        let _ = run;
        (b.finish(), base, left, right, left_run)
    }

    mod naming_tests {
        use super::*;

        #[test]
        fn qualified_names_follow_package_and_owner() {
            let (program, base, ..) = hierarchy();
            let run = program.members(base)[0];
            assert_eq!(program.qualified_name(base), "p.Base");
            assert_eq!(program.qualified_name(run), "p.Base.run");
            assert_eq!(program.display_name(run), "run()");
        }

        #[test]
        fn source_path_keeps_root() {
            let unit = CompilationUnit::new(FileId(1), "src/main/java/p/q/A.java", "p.q");
            assert_eq!(source_path(&unit, "r", "B"), "src/main/java/r/B.java");
            assert_eq!(source_path(&unit, "", "B"), "src/main/java/B.java");
            let flat = CompilationUnit::new(FileId(2), "A.java", "");
            assert_eq!(source_path(&flat, "x.y", "A"), "x/y/A.java");
        }
    }

    mod hierarchy_tests {
        use super::*;

        #[test]
        fn subtypes_and_supertypes() {
            let (program, base, left, right, _) = hierarchy();
            assert_eq!(program.direct_subtypes(base), vec![left, right]);
            assert_eq!(program.all_supertypes(left), vec![base]);
            assert!(program.is_subtype_of(right, base));
            assert!(!program.is_subtype_of(base, right));
        }

        #[test]
        fn override_relations() {
            let (program, base, _, _, left_run) = hierarchy();
            let run = program.members(base)[0];
            assert_eq!(program.overridden_by(run), vec![left_run]);
            assert_eq!(program.overrides(left_run), vec![run]);
            assert_eq!(program.override_family(left_run), vec![run, left_run]);
        }

        #[test]
        fn removed_declarations_are_not_live() {
            let (mut program, base, left, ..) = hierarchy();
            assert!(program.is_live(left));
            let run = program.members(base)[0];
            if let Some(decl) = program.decl_mut(base) {
                decl.members.clear();
            }
            assert!(!program.is_live(run));
            assert!(program.remove_decl_tree(run).contains(&run));
            assert!(!program.contains(run));
        }
    }

    mod lookup_tests {
        use super::*;

        #[test]
        fn find_expr_reaches_nested_body_and_initializer_nodes() {
            let mut b = ProgramBuilder::new();
            let file = b.file("p/A.java", "p");
            let a = b.class(file, "A");
            let limit = b.field(a, "limit", "int");
            let ten = b.int(10);
            let ten_id = ten.id;
            b.set_init(limit, ten);
            let m = b.method(a, "m", Some("int"));
            let x = b.param(m, "x", "int");
            let rx = b.name(x);
            let rx_id = rx.id;
            let one = b.int(1);
            let sum = b.binary(crate::ast::BinaryOp::Add, rx, one);
            let ret = b.ret(Some(sum));
            b.set_body(m, vec![ret]);
            let program = b.finish();

            let (owner, found) = program.find_expr(rx_id).unwrap();
            assert_eq!(owner, m);
            assert_eq!(found.referenced_decl(), Some(x));
            assert_eq!(program.find_expr(ten_id).map(|(o, _)| o), Some(limit));
            assert!(program.find_expr(NodeId(u32::MAX)).is_none());
        }
    }

    mod access_tests {
        use super::*;

        #[test]
        fn protected_is_visible_to_subclasses_in_other_packages() {
            let mut b = ProgramBuilder::new();
            let f1 = b.file("p/A.java", "p");
            let a = b.class(f1, "A");
            let f2 = b.file("q/B.java", "q");
            let bb = b.class(f2, "B");
            b.extends(bb, a);
            let f3 = b.file("q/C.java", "q");
            let c = b.class(f3, "C");
            let program = b.finish();

            assert!(program.is_accessible_from(a, Visibility::Protected, bb));
            assert!(!program.is_accessible_from(a, Visibility::Protected, c));
            assert!(!program.is_accessible_from(a, Visibility::Package, bb));
            assert!(!program.is_accessible_from(a, Visibility::Private, bb));
        }
    }

    mod serde_tests {
        use super::*;

        #[test]
        fn snapshot_restores_counters() {
            let (program, ..) = hierarchy();
            let json = serde_json::to_string(&program).unwrap();
            let mut restored: Program = serde_json::from_str(&json).unwrap();
            assert_eq!(restored.qualified_name(DeclId(1)), "p.Base");
            let (file, decl, _) = program.id_watermarks();
            let fresh = restored.decl_id();
            assert!(fresh.0 >= decl);
            assert!(restored.file_id().0 >= file);
        }
    }
}
