//! recast: semantic, transactional refactoring for Java-like programs.
//!
//! The engine works on a fully resolved in-memory program model: it finds
//! and classifies usages, plans tree-level edits, checks them against a set
//! of conflict rules, and commits the rendered files atomically with undo.

// Core infrastructure - re-exported from recast-core
pub use recast_core::config;
pub use recast_core::diff;
pub use recast_core::error;
pub use recast_core::patch;
pub use recast_core::problem;
pub use recast_core::text;
pub use recast_core::types;
pub use recast_core::util;
pub use recast_core::workspace;

// Program model and refactoring engine
pub use recast_java as java;

// Front door
pub mod cli;
pub mod output;
