//! Error types and error code constants for recast.
//!
//! `RecastError` is the single error type rendered by the CLI. Subsystem
//! errors bridge into it through `From` impls; `OutputErrorCode` gives each
//! variant a stable exit code:
//! - `2`: Invalid arguments (bad input from caller)
//! - `3`: Resolution errors (symbol or file not found)
//! - `4`: Apply errors (failed to write changes)
//! - `6`: Refactoring blocked by problems
//! - `10`: Internal errors (bugs, unexpected state)

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::problem::Problem;
use crate::workspace::StoreError;

pub use crate::types::Location;

// ============================================================================
// Output Error Codes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    InvalidArguments = 2,
    ResolutionError = 3,
    ApplyError = 4,
    Blocked = 6,
    InternalError = 10,
}

impl OutputErrorCode {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum RecastError {
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },

    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error("apply error: {message}")]
    ApplyError {
        message: String,
        file: Option<String>,
    },

    /// The refactoring reported problems that prevent a commit.
    #[error("refactoring blocked by {} problem(s)", problems.len())]
    Blocked { problems: Vec<Problem> },

    #[error("configuration error: {message}")]
    ConfigError { message: String },

    #[error("internal error: {message}")]
    InternalError { message: String },
}

impl From<&RecastError> for OutputErrorCode {
    fn from(err: &RecastError) -> Self {
        match err {
            RecastError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            RecastError::InvalidIdentifier { .. } => OutputErrorCode::InvalidArguments,
            RecastError::ConfigError { .. } => OutputErrorCode::InvalidArguments,
            RecastError::SymbolNotFound { .. } => OutputErrorCode::ResolutionError,
            RecastError::FileNotFound { .. } => OutputErrorCode::ResolutionError,
            RecastError::ApplyError { .. } => OutputErrorCode::ApplyError,
            RecastError::Blocked { .. } => OutputErrorCode::Blocked,
            RecastError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<RecastError> for OutputErrorCode {
    fn from(err: RecastError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl RecastError {
    pub fn invalid_args(message: impl Into<String>) -> Self {
        RecastError::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        RecastError::InternalError {
            message: message.into(),
        }
    }

    pub fn apply(message: impl Into<String>, file: Option<String>) -> Self {
        RecastError::ApplyError {
            message: message.into(),
            file,
        }
    }

    pub fn symbol_not_found(symbol: impl Into<String>) -> Self {
        RecastError::SymbolNotFound {
            symbol: symbol.into(),
        }
    }

    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Bridges
// ============================================================================

impl From<StoreError> for RecastError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { path } => RecastError::FileNotFound { path },
            StoreError::ReadOnly { path } => RecastError::ApplyError {
                message: format!("{path} is read-only"),
                file: Some(path),
            },
            StoreError::AlreadyExists { path } => RecastError::ApplyError {
                message: format!("{path} already exists"),
                file: Some(path),
            },
            StoreError::Io { path, source } => RecastError::ApplyError {
                message: format!("IO error on {path}: {source}"),
                file: Some(path),
            },
            StoreError::LockTimeout { paths } => RecastError::ApplyError {
                message: format!("timed out waiting for file locks: {}", paths.join(", ")),
                file: paths.into_iter().next(),
            },
        }
    }
}

impl From<ConfigError> for RecastError {
    fn from(err: ConfigError) -> Self {
        RecastError::ConfigError {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for RecastError {
    fn from(err: std::io::Error) -> Self {
        RecastError::InternalError {
            message: format!("IO error: {err}"),
        }
    }
}

impl From<serde_json::Error> for RecastError {
    fn from(err: serde_json::Error) -> Self {
        RecastError::InvalidArguments {
            message: format!("JSON error: {err}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::ProblemKind;

    #[test]
    fn codes_follow_table() {
        assert_eq!(RecastError::invalid_args("x").error_code().code(), 2);
        assert_eq!(RecastError::symbol_not_found("p.A").error_code().code(), 3);
        assert_eq!(RecastError::apply("x", None).error_code().code(), 4);
        assert_eq!(
            RecastError::Blocked {
                problems: vec![Problem::fatal(ProblemKind::NameClash, "x")]
            }
            .error_code()
            .code(),
            6
        );
        assert_eq!(RecastError::internal("x").error_code().code(), 10);
    }

    #[test]
    fn store_errors_bridge_to_apply_errors() {
        let err: RecastError = StoreError::ReadOnly {
            path: "p/A.java".to_string(),
        }
        .into();
        assert!(matches!(err, RecastError::ApplyError { file: Some(ref f), .. } if f == "p/A.java"));

        let err: RecastError = StoreError::NotFound {
            path: "p/B.java".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), OutputErrorCode::ResolutionError);
    }

    #[test]
    fn blocked_message_counts_problems() {
        let err = RecastError::Blocked {
            problems: vec![
                Problem::warning(ProblemKind::NameClash, "a"),
                Problem::warning(ProblemKind::NameClash, "b"),
            ],
        };
        assert_eq!(err.to_string(), "refactoring blocked by 2 problem(s)");
    }
}
