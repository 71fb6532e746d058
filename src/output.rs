//! JSON responses of the `recast` CLI.
//!
//! Every response starts with `status` and `schema_version`. Errors use
//! [`ErrorResponse`] from the core crate; the types here cover successful
//! commands.

use serde::Serialize;

use recast_core::problem::Problem;
use recast_java::session::ChangeDescriptor;
use recast_java::usage::Usage;

pub use recast_core::output::{
    emit_response, emit_response_compact, ErrorInfo, ErrorResponse, ProblemsResponse, SCHEMA_VERSION,
};

/// Usages of one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct UsagesResponse {
    pub status: String,
    pub schema_version: String,
    pub symbol: String,
    /// `false` when the scan was cancelled before covering the scope.
    pub complete: bool,
    pub usages: Vec<Usage>,
}

impl UsagesResponse {
    pub fn new(symbol: impl Into<String>, usages: Vec<Usage>, complete: bool) -> Self {
        UsagesResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            symbol: symbol.into(),
            complete,
            usages,
        }
    }
}

/// Outcome of a refactoring request.
#[derive(Debug, Clone, Serialize)]
pub struct RefactorResponse {
    /// `applied`, `preview` or `needs_confirmation`.
    pub status: String,
    pub schema_version: String,
    pub operation: String,
    pub problems: Vec<Problem>,
    pub changes: Vec<ChangeDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undo_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed_at: Option<String>,
}

impl RefactorResponse {
    /// Concatenated unified diffs of every change.
    pub fn unified_diff(&self) -> String {
        self.changes.iter().map(|c| c.diff.as_str()).collect()
    }
}

/// Files rendered from a program snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RenderResponse {
    pub status: String,
    pub schema_version: String,
    pub files: Vec<RenderedFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedFile {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usages_response_leads_with_status() {
        let response = UsagesResponse::new("p.A.m", Vec::new(), true);
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.starts_with(r#"{"status":"ok","schema_version":"1""#));
    }

    #[test]
    fn refactor_diff_joins_changes() {
        let response = RefactorResponse {
            status: "preview".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            operation: "Rename".to_string(),
            problems: Vec::new(),
            changes: Vec::new(),
            undo_token: None,
            committed_at: None,
        };
        assert_eq!(response.unified_diff(), "");
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("undo_token").is_none());
    }
}
