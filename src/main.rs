//! Binary entry point for the recast CLI.
//!
//! ## Usage
//!
//! ```bash
//! # List usages of a field with their access modes
//! recast usages --program program.json p.Counter.count
//!
//! # Preview a refactoring as a unified diff
//! recast refactor --program program.json --request push_down.json
//!
//! # Commit it to the rendered sources, accepting warnings
//! recast --workspace src refactor --program program.json --request push_down.json --apply --confirm
//!
//! # Write the rendered sources of a program snapshot
//! recast render --program program.json --out src
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use recast::cli::{load_program, load_request, run_refactor, run_render, run_usages, RefactorOptions};
use recast::output::{emit_response, ErrorResponse};
use recast_core::config::{CliOverrides, EngineConfig};
use recast_core::error::{OutputErrorCode, RecastError};
use recast_java::frontend::SearchScope;

// ============================================================================
// CLI Structure
// ============================================================================

/// Semantic refactoring for Java-like programs.
///
/// All output is JSON, except refactoring previews in diff format.
#[derive(Parser, Debug)]
#[command(name = "recast", version, about = "Semantic, transactional refactoring")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Workspace root holding the rendered sources and `recast.json`
    /// (default: current directory).
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Log level for tracing output (`RUST_LOG` takes precedence).
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Emit log events as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Report mentions in comments.
    #[arg(long, global = true)]
    search_comments: Option<bool>,

    /// How long a commit waits for file locks, in milliseconds.
    #[arg(long, global = true)]
    lock_timeout_ms: Option<u64>,

    /// Treat paths differing only in case as the same file.
    #[arg(long, global = true)]
    case_insensitive: Option<bool>,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Output format for `refactor`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum RefactorFormat {
    /// Unified diff of every changed file (default).
    #[default]
    Diff,
    /// Full JSON response.
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find and classify every usage of a symbol.
    Usages {
        /// Program snapshot (JSON).
        #[arg(long)]
        program: PathBuf,
        /// Qualified name of the symbol, e.g. `p.Counter.count`.
        symbol: String,
        /// Restrict the search to one file.
        #[arg(long, conflicts_with = "folder")]
        file: Option<String>,
        /// Restrict the search to one folder (not recursive).
        #[arg(long)]
        folder: Option<String>,
    },
    /// Run a refactoring request.
    ///
    /// Previews by default; `--apply` commits to the workspace sources.
    Refactor {
        /// Program snapshot (JSON).
        #[arg(long)]
        program: PathBuf,
        /// Refactoring request (JSON).
        #[arg(long)]
        request: PathBuf,
        /// Commit the changes to the workspace.
        #[arg(long)]
        apply: bool,
        /// Proceed past warnings.
        #[arg(long)]
        confirm: bool,
        /// Output format.
        #[arg(long, value_enum, default_value = "diff")]
        format: RefactorFormat,
    },
    /// Render a program snapshot's source files.
    Render {
        /// Program snapshot (JSON).
        #[arg(long)]
        program: PathBuf,
        /// Write the files under this directory instead of printing them.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.log_level, cli.global.log_json);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            let response = ErrorResponse::from_error(&err);
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();
            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize the tracing subscriber on stderr.
fn init_tracing(level: LogLevel, json: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn resolve_config(global: &GlobalArgs) -> Result<EngineConfig, RecastError> {
    let overrides = CliOverrides {
        search_comments: global.search_comments,
        lock_timeout_ms: global.lock_timeout_ms,
        case_insensitive: global.case_insensitive,
    };
    let root = global.workspace.clone().unwrap_or_else(|| PathBuf::from("."));
    Ok(EngineConfig::resolve(Some(root.as_path()), &overrides)?)
}

fn execute(cli: Cli) -> Result<(), RecastError> {
    let config = resolve_config(&cli.global)?;
    let mut stdout = io::stdout();
    match cli.command {
        Command::Usages {
            program,
            symbol,
            file,
            folder,
        } => {
            let program = load_program(&program)?;
            let scope = match (file, folder) {
                (Some(path), _) => SearchScope::file(path),
                (None, Some(path)) => SearchScope::folder(path),
                (None, None) => SearchScope::Project,
            };
            let response = run_usages(&program, &symbol, &scope, &config)?;
            emit_response(&response, &mut stdout)?;
        }
        Command::Refactor {
            program,
            request,
            apply,
            confirm,
            format,
        } => {
            let program = load_program(&program)?;
            let request = load_request(&request)?;
            let root = cli.global.workspace.clone().unwrap_or_else(|| PathBuf::from("."));
            let options = RefactorOptions {
                apply_to: apply.then_some(root.as_path()),
                confirm,
            };
            let response = run_refactor(program, request, config, options)?;
            match format {
                RefactorFormat::Diff if response.status != "needs_confirmation" => {
                    write!(stdout, "{}", response.unified_diff())?;
                }
                _ => emit_response(&response, &mut stdout)?,
            }
        }
        Command::Render { program, out } => {
            let program = load_program(&program)?;
            let response = run_render(&program, out.as_deref())?;
            emit_response(&response, &mut stdout)?;
        }
    }
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    mod cli_parsing {
        use super::*;

        #[test]
        fn refactor_previews_as_diff_by_default() {
            let args = [
                "recast",
                "refactor",
                "--program",
                "program.json",
                "--request",
                "request.json",
            ];
            let cli = Cli::try_parse_from(args).unwrap();
            match cli.command {
                Command::Refactor {
                    apply,
                    confirm,
                    format,
                    ..
                } => {
                    assert!(!apply);
                    assert!(!confirm);
                    assert_eq!(format, RefactorFormat::Diff);
                }
                _ => panic!("expected Refactor"),
            }
        }

        #[test]
        fn global_overrides_parse_anywhere() {
            let args = [
                "recast",
                "usages",
                "--program",
                "program.json",
                "p.A.f",
                "--search-comments",
                "true",
                "--lock-timeout-ms",
                "250",
            ];
            let cli = Cli::try_parse_from(args).unwrap();
            assert_eq!(cli.global.search_comments, Some(true));
            assert_eq!(cli.global.lock_timeout_ms, Some(250));
            match cli.command {
                Command::Usages { symbol, file, .. } => {
                    assert_eq!(symbol, "p.A.f");
                    assert_eq!(file, None);
                }
                _ => panic!("expected Usages"),
            }
        }

        #[test]
        fn file_and_folder_scopes_conflict() {
            let args = [
                "recast",
                "usages",
                "--program",
                "program.json",
                "p.A.f",
                "--file",
                "p/A.java",
                "--folder",
                "p",
            ];
            assert!(Cli::try_parse_from(args).is_err());
        }
    }
}
