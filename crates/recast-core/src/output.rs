//! JSON output envelope shared by every CLI response.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::{OutputErrorCode, RecastError};
use crate::problem::Problem;
use crate::types::Location;

/// Schema version for compatibility.
pub const SCHEMA_VERSION: &str = "1";

/// Error information in an error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Exit code of the error class.
    pub code: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl ErrorInfo {
    pub fn from_error(err: &RecastError) -> Self {
        let code = OutputErrorCode::from(err).code();
        let details = match err {
            RecastError::Blocked { problems } => serde_json::to_value(problems).ok(),
            RecastError::ApplyError {
                file: Some(file), ..
            } => Some(serde_json::json!({ "file": file })),
            _ => None,
        };
        ErrorInfo {
            code,
            message: err.to_string(),
            details,
            location: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always "error".
    pub status: String,
    pub schema_version: String,
    pub error: ErrorInfo,
}

impl ErrorResponse {
    pub fn from_error(err: &RecastError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

/// Problems reported by a refactoring that did not commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemsResponse {
    pub status: String,
    pub schema_version: String,
    pub problems: Vec<Problem>,
}

impl ProblemsResponse {
    pub fn new(problems: Vec<Problem>) -> Self {
        let status = if problems.iter().any(Problem::is_fatal) {
            "blocked"
        } else {
            "needs_confirmation"
        };
        ProblemsResponse {
            status: status.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            problems,
        }
    }
}

/// Write a response as pretty-printed JSON followed by a newline.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{json}")
}

/// Write a response as single-line JSON.
pub fn emit_response_compact<T: Serialize>(
    response: &T,
    writer: &mut impl Write,
) -> io::Result<()> {
    let json =
        serde_json::to_string(response).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{json}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::ProblemKind;

    #[test]
    fn error_response_carries_code_and_problems() {
        let err = RecastError::Blocked {
            problems: vec![Problem::fatal(ProblemKind::NameClash, "exists")],
        };
        let response = ErrorResponse::from_error(&err);
        assert_eq!(response.error.code, 6);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["details"][0]["kind"], "name_clash");
        assert_eq!(json["error"]["details"][0]["severity"], "fatal");
    }

    #[test]
    fn problems_response_status() {
        let warn = ProblemsResponse::new(vec![Problem::warning(ProblemKind::NameClash, "w")]);
        assert_eq!(warn.status, "needs_confirmation");
        let fatal = ProblemsResponse::new(vec![Problem::fatal(ProblemKind::NameClash, "f")]);
        assert_eq!(fatal.status, "blocked");
    }

    #[test]
    fn emit_compact_is_single_line() {
        let mut out = Vec::new();
        emit_response_compact(&ProblemsResponse::new(Vec::new()), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
