// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Java program model and refactoring engine for recast.
//!
//! This crate provides:
//! - The resolved program model (declarations, trees, printer, builder)
//! - Usage search with access-mode classification
//! - Conflict rules over before and after programs
//! - Edit plans and the rewrite applier
//! - Refactoring operations (extract, pull up, push down, move, etc.)
//! - Refactoring sessions with atomic commit, undo and redo

pub mod apply;
pub mod ast;
pub mod builder;
pub mod conflict;
pub mod error;
pub mod frontend;
pub mod model;
pub mod ops;
pub mod plan;
pub mod printer;
pub mod session;
pub mod typing;
pub mod usage;
pub mod validation;
pub mod visit;

pub use frontend::{FrontEnd, SearchScope, SymbolRef};
pub use model::{DeclId, DeclKind, Program};
pub use ops::Refactoring;
pub use session::{ChangeDescriptor, RefactoringSession, SessionState, Workspace};
