//! Core infrastructure for recast.
//!
//! This crate provides language-agnostic infrastructure:
//! - Patch IR (anchored edits, atomic apply, materialization)
//! - Problems (severity-ranked refactoring diagnostics)
//! - File stores and the exclusive file lock table
//! - Engine configuration with source precedence
//! - Error types and JSON output
//! - Text and diff utilities

pub mod config;
pub mod diff;
pub mod error;
pub mod output;
pub mod patch;
pub mod problem;
pub mod text;
pub mod types;
pub mod util;
pub mod workspace;
