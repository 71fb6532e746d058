// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Engine error types and their bridges into [`RecastError`].

use recast_core::error::RecastError;
use recast_core::patch::FileId;
use recast_core::problem::Problem;
use recast_core::workspace::StoreError;
use thiserror::Error;

use crate::ast::NodeId;
use crate::model::DeclId;

/// Failure to bind a symbol reference, node or path to the program.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("symbol not found: {qualified_name}")]
    SymbolNotFound { qualified_name: String },

    #[error("expected {expected}, found {found} for {qualified_name}")]
    WrongKind {
        qualified_name: String,
        expected: String,
        found: String,
    },

    #[error("node not found: {node}")]
    NodeNotFound { node: NodeId },

    #[error("file not found: {path}")]
    FileNotFound { path: String },
}

/// Failure applying an edit plan to the staging program.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("edit targets node {node}, which is not in the program")]
    StaleNode { node: NodeId },

    #[error("edit targets unknown declaration {decl}")]
    UnknownDecl { decl: DeclId },

    #[error("edit targets unknown file {file}")]
    UnknownFile { file: FileId },

    #[error("two files would be written to {path}")]
    PathCollision { path: String },
}

/// Failure driving a refactoring session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot {action} in state {state}")]
    InvalidState { action: String, state: String },

    #[error("refactoring blocked by {} problem(s)", problems.len())]
    Blocked { problems: Vec<Problem> },

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,

    #[error("program changed since the refactoring was prepared")]
    ConcurrentModification,

    #[error("file content changed under the session: {path}")]
    ContentChanged { path: String },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type SessionResult<T> = Result<T, SessionError>;

// ============================================================================
// Bridges
// ============================================================================

impl From<ResolveError> for RecastError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::SymbolNotFound { qualified_name } => RecastError::SymbolNotFound {
                symbol: qualified_name,
            },
            ResolveError::FileNotFound { path } => RecastError::FileNotFound { path },
            other => RecastError::InvalidArguments {
                message: other.to_string(),
            },
        }
    }
}

impl From<ApplyError> for RecastError {
    fn from(err: ApplyError) -> Self {
        RecastError::internal(err.to_string())
    }
}

impl From<SessionError> for RecastError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Blocked { problems } => RecastError::Blocked { problems },
            SessionError::Resolve(e) => e.into(),
            SessionError::Apply(e) => e.into(),
            SessionError::Store(e) => e.into(),
            SessionError::ContentChanged { path } => RecastError::ApplyError {
                message: format!("file content changed: {path}"),
                file: Some(path),
            },
            SessionError::ConcurrentModification => {
                RecastError::apply("program changed since the refactoring was prepared", None)
            }
            other @ (SessionError::InvalidState { .. }
            | SessionError::NothingToUndo
            | SessionError::NothingToRedo) => RecastError::invalid_args(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recast_core::error::OutputErrorCode;

    #[test]
    fn resolve_errors_map_to_resolution_code() {
        let err: RecastError = ResolveError::SymbolNotFound {
            qualified_name: "p.A.m".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), OutputErrorCode::ResolutionError);
    }

    #[test]
    fn session_errors_map_by_class() {
        let blocked: RecastError = SessionError::Blocked {
            problems: Vec::new(),
        }
        .into();
        assert_eq!(blocked.error_code(), OutputErrorCode::Blocked);

        let stale: RecastError = SessionError::Apply(ApplyError::StaleNode { node: NodeId(4) }).into();
        assert_eq!(stale.error_code(), OutputErrorCode::InternalError);

        let undo: RecastError = SessionError::NothingToUndo.into();
        assert_eq!(undo.error_code(), OutputErrorCode::InvalidArguments);
    }
}
