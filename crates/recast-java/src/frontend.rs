// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Front-end contract, symbol references and search scopes.
//!
//! A [`SymbolRef`] is an immutable handle to a declaration. It remembers the
//! program generation it was taken at; once the program moves on it must be
//! revalidated, first by its declaration id and then by qualified name.

use std::collections::BTreeSet;

use recast_core::patch::FileId;
use serde::{Deserialize, Serialize};

use crate::error::ResolveError;
use crate::model::{CompilationUnit, DeclId, DeclKind, Program};

// ============================================================================
// Symbol References
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRef {
    /// Declaration id the reference was taken from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<DeclId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<DeclKind>,
    pub qualified_name: String,
    /// Parameter type keys, for methods and constructors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub generation: u64,
}

impl SymbolRef {
    /// Take a reference to a declaration at the program's current
    /// generation.
    pub fn of(program: &Program, decl: DeclId) -> Option<Self> {
        let d = program.decl(decl)?;
        let signature = matches!(d.kind, DeclKind::Method | DeclKind::Constructor)
            .then(|| program.signature(decl));
        Some(SymbolRef {
            anchor: Some(decl),
            kind: Some(d.kind),
            qualified_name: program.qualified_name(decl),
            signature,
            path: program.file(d.file).map(|f| f.path.clone()),
            generation: program.generation(),
        })
    }

    /// A by-name reference, as supplied by a client that has no ids.
    pub fn named(qualified_name: impl Into<String>) -> Self {
        SymbolRef {
            anchor: None,
            kind: None,
            qualified_name: qualified_name.into(),
            signature: None,
            path: None,
            generation: 0,
        }
    }

    pub fn with_signature(mut self, signature: Vec<String>) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn with_kind(mut self, kind: DeclKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn is_stale(&self, program: &Program) -> bool {
        self.anchor.is_none() || self.generation != program.generation()
    }

    /// Bind the reference: by anchor id if it still denotes a live
    /// declaration of the same kind, otherwise by qualified name.
    pub fn resolve(&self, program: &Program) -> Result<DeclId, ResolveError> {
        if let Some(anchor) = self.anchor {
            let kind_matches = program
                .decl(anchor)
                .is_some_and(|d| self.kind.is_none_or(|k| k == d.kind));
            if kind_matches && program.is_live(anchor) {
                return Ok(anchor);
            }
        }
        let found = program
            .find_by_qualified_name(&self.qualified_name, self.signature.as_deref())
            .ok_or_else(|| ResolveError::SymbolNotFound {
                qualified_name: self.qualified_name.clone(),
            })?;
        if let (Some(expected), Some(actual)) = (self.kind, program.kind_of(found)) {
            if expected != actual {
                return Err(ResolveError::WrongKind {
                    qualified_name: self.qualified_name.clone(),
                    expected: expected.to_string(),
                    found: actual.to_string(),
                });
            }
        }
        Ok(found)
    }

    /// A fresh reference at the current generation.
    pub fn revalidate(&self, program: &Program) -> Result<SymbolRef, ResolveError> {
        let decl = self.resolve(program)?;
        SymbolRef::of(program, decl).ok_or_else(|| ResolveError::SymbolNotFound {
            qualified_name: self.qualified_name.clone(),
        })
    }
}

// ============================================================================
// Search Scopes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchScope {
    Project,
    File { path: String },
    /// Files directly inside the folder; subfolders are excluded.
    Folder { path: String },
    /// Files and folder trees, in the order given.
    Set { roots: Vec<String> },
}

impl SearchScope {
    pub fn file(path: impl Into<String>) -> Self {
        SearchScope::File { path: path.into() }
    }

    pub fn folder(path: impl Into<String>) -> Self {
        SearchScope::Folder { path: path.into() }
    }
}

fn under_root(unit: &CompilationUnit, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    root.is_empty()
        || unit.path == root
        || unit
            .path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

// ============================================================================
// Front-end Contract
// ============================================================================

/// What the engine needs from a language front-end.
pub trait FrontEnd {
    fn resolve(&self, symbol: &SymbolRef) -> Result<DeclId, ResolveError>;

    fn typed_tree(&self, file: FileId) -> Option<&CompilationUnit>;

    /// Members of a type, in declaration order.
    fn elements_of(&self, ty: DeclId) -> Vec<DeclId>;

    /// Subtype methods overriding `method`.
    fn overridden_by(&self, method: DeclId) -> Vec<DeclId>;

    /// Files in the scope, in enumeration order.
    fn files_in(&self, scope: &SearchScope) -> Vec<FileId>;
}

impl FrontEnd for Program {
    fn resolve(&self, symbol: &SymbolRef) -> Result<DeclId, ResolveError> {
        symbol.resolve(self)
    }

    fn typed_tree(&self, file: FileId) -> Option<&CompilationUnit> {
        self.file(file)
    }

    fn elements_of(&self, ty: DeclId) -> Vec<DeclId> {
        self.members(ty).to_vec()
    }

    fn overridden_by(&self, method: DeclId) -> Vec<DeclId> {
        Program::overridden_by(self, method)
    }

    fn files_in(&self, scope: &SearchScope) -> Vec<FileId> {
        let files = self.files();
        match scope {
            SearchScope::Project => files.iter().map(|f| f.id).collect(),
            SearchScope::File { path } => files
                .iter()
                .filter(|f| &f.path == path)
                .map(|f| f.id)
                .collect(),
            SearchScope::Folder { path } => {
                let folder = path.trim_end_matches('/');
                files
                    .iter()
                    .filter(|f| f.folder() == folder)
                    .map(|f| f.id)
                    .collect()
            }
            SearchScope::Set { roots } => {
                let mut seen = BTreeSet::new();
                let mut out = Vec::new();
                for root in roots {
                    for unit in files.iter().filter(|f| under_root(f, root)) {
                        if seen.insert(unit.id) {
                            out.push(unit.id);
                        }
                    }
                }
                out
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
