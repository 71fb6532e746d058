//! Command implementations behind the `recast` binary.
//!
//! Each function takes already-parsed inputs and returns a response type
//! from [`crate::output`]; `main.rs` handles argument parsing, logging and
//! printing. Programs and requests are read as JSON:
//!
//! - a program snapshot is the serialized [`Program`]
//! - a request is a tagged [`Refactoring`], e.g.
//!   `{"operation": "safe_delete", "symbols": [{"qualified_name": "p.A.f"}]}`

use std::fs;
use std::path::Path;
use std::sync::Arc;

use recast_core::config::EngineConfig;
use recast_core::error::RecastError;
use recast_core::workspace::{DiskFileStore, FileStore, MemoryFileStore};
use recast_java::apply::render_all;
use recast_java::frontend::{SearchScope, SymbolRef};
use recast_java::session::{SessionState, Workspace};
use recast_java::usage::{find_usages, UsageOptions};
use recast_java::{Program, Refactoring};
use tracing::info;

use crate::output::{RefactorResponse, RenderResponse, RenderedFile, UsagesResponse, SCHEMA_VERSION};

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, RecastError> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RecastError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => RecastError::from(e),
    })?;
    Ok(serde_json::from_str(&text)?)
}

/// Load a program snapshot.
pub fn load_program(path: &Path) -> Result<Program, RecastError> {
    read_json(path)
}

/// Load a refactoring request.
pub fn load_request(path: &Path) -> Result<Refactoring, RecastError> {
    read_json(path)
}

/// List the usages of `symbol` in `scope`.
pub fn run_usages(
    program: &Program,
    symbol: &str,
    scope: &SearchScope,
    config: &EngineConfig,
) -> Result<UsagesResponse, RecastError> {
    let decl = SymbolRef::named(symbol).resolve(program)?;
    let options = UsageOptions {
        include_comments: config.search_comments(),
        collections: Some(config.collections()),
        cancel: None,
    };
    let set = find_usages(program, decl, scope, &options);
    Ok(UsagesResponse::new(
        program.qualified_name(decl),
        set.usages,
        set.complete,
    ))
}

/// How `run_refactor` treats the workspace.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefactorOptions<'a> {
    /// Commit to the rendered files under this root; preview when absent.
    pub apply_to: Option<&'a Path>,
    /// Proceed past warnings.
    pub confirm: bool,
}

/// Run a refactoring request.
///
/// Fatal problems become [`RecastError::Blocked`]. Without `apply_to` the
/// plan is prepared against an in-memory rendering and nothing is written.
pub fn run_refactor(
    program: Program,
    request: Refactoring,
    config: EngineConfig,
    options: RefactorOptions<'_>,
) -> Result<RefactorResponse, RecastError> {
    let operation = request.label();
    let workspace = match options.apply_to {
        Some(root) => {
            let store: Arc<dyn FileStore> = Arc::new(DiskFileStore::open(root)?);
            Workspace::new(program, store, config)
        }
        None => Workspace::materialize(program, Arc::new(MemoryFileStore::new()), config)?,
    };
    let mut session = workspace.session(request);

    let problems = if options.apply_to.is_some() {
        session.do_refactoring(options.confirm)?
    } else {
        session.pre_check()?;
        if session.state() == SessionState::PreChecked {
            session.prepare()?;
        }
        session.problems()
    };

    let status = match session.state() {
        SessionState::Aborted | SessionState::Requested | SessionState::PreChecked => {
            return Err(RecastError::Blocked { problems });
        }
        SessionState::Committed => "applied",
        SessionState::Planned if options.apply_to.is_some() => "needs_confirmation",
        SessionState::Planned | SessionState::RolledBack => "preview",
    };
    info!(%operation, status, problems = problems.len(), "refactor finished");
    Ok(RefactorResponse {
        status: status.to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        operation,
        problems,
        changes: session.refactoring_elements(),
        undo_token: session.undo_token().map(str::to_string),
        committed_at: session.committed_at().map(str::to_string),
    })
}

/// Render every file of `program`; write them under `out` when given.
pub fn run_render(program: &Program, out: Option<&Path>) -> Result<RenderResponse, RecastError> {
    let store = match out {
        Some(root) => {
            fs::create_dir_all(root)?;
            Some(DiskFileStore::open(root)?)
        }
        None => None,
    };
    let mut files = Vec::new();
    for (path, text) in render_all(program).into_values() {
        match &store {
            Some(store) => {
                store.write(&path, &text)?;
                files.push(RenderedFile { path, text: None });
            }
            None => files.push(RenderedFile {
                path,
                text: Some(text),
            }),
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(RenderResponse {
        status: "ok".to_string(),
        schema_version: SCHEMA_VERSION.to_string(),
        files,
    })
}
