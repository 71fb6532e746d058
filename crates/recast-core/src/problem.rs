//! Refactoring problems: severity-ranked diagnostics.
//!
//! Every phase of a refactoring (pre-check, prepare, commit) reports
//! problems rather than failing outright. A fatal problem halts the
//! pipeline before the next phase; warnings block a commit until the
//! caller confirms.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::types::Location;

/// How serious a problem is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// The rule or failure that produced a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    /// A symbol reference no longer resolves.
    UnresolvableSymbol,
    /// A synthesized or moved declaration collides with an existing one.
    NameClash,
    /// A usage would lose access to the declaration it refers to.
    VisibilityViolation,
    /// Instance state referenced from a static or unrelated context.
    StaticContextViolation,
    /// An override relationship would break.
    OverrideIntegrityViolation,
    /// A declaration slated for removal is still referenced.
    UnreferencedPreconditionViolation,
    /// Malformed request parameters.
    InvalidInput,
    /// Files or the program changed between planning and commit.
    ConcurrentModification,
    /// Reading or writing a file failed.
    IoFailure,
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProblemKind::UnresolvableSymbol => "unresolvable_symbol",
            ProblemKind::NameClash => "name_clash",
            ProblemKind::VisibilityViolation => "visibility_violation",
            ProblemKind::StaticContextViolation => "static_context_violation",
            ProblemKind::OverrideIntegrityViolation => "override_integrity_violation",
            ProblemKind::UnreferencedPreconditionViolation => "unreferenced_precondition_violation",
            ProblemKind::InvalidInput => "invalid_input",
            ProblemKind::ConcurrentModification => "concurrent_modification",
            ProblemKind::IoFailure => "io_failure",
        };
        write!(f, "{name}")
    }
}

/// A single diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub severity: Severity,
    pub kind: ProblemKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Qualified name of the declaration the problem concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl Problem {
    pub fn fatal(kind: ProblemKind, message: impl Into<String>) -> Self {
        Problem {
            severity: Severity::Fatal,
            kind,
            message: message.into(),
            location: None,
            symbol: None,
        }
    }

    pub fn warning(kind: ProblemKind, message: impl Into<String>) -> Self {
        Problem {
            severity: Severity::Warning,
            kind,
            message: message.into(),
            location: None,
            symbol: None,
        }
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn for_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    fn key(&self) -> (ProblemKind, Option<String>, Option<Location>) {
        (self.kind, self.symbol.clone(), self.location.clone())
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.kind, self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " (at {loc})")?;
        }
        Ok(())
    }
}

// ============================================================================
// ProblemList
// ============================================================================

/// Accumulated problems for one refactoring pipeline.
///
/// Problems are collapsed on (kind, symbol, location): when the same rule
/// fires twice for the same site only the first report is kept, unless the
/// later one is fatal, in which case it replaces the warning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProblemList {
    problems: Vec<Problem>,
}

impl ProblemList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, problem: Problem) {
        let key = problem.key();
        if let Some(existing) = self.problems.iter_mut().find(|p| p.key() == key) {
            if problem.severity > existing.severity {
                *existing = problem;
            }
            return;
        }
        self.problems.push(problem);
    }

    pub fn has_fatal(&self) -> bool {
        self.problems.iter().any(Problem::is_fatal)
    }

    pub fn has_warnings(&self) -> bool {
        self.problems.iter().any(|p| !p.is_fatal())
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Problem> {
        self.problems.iter()
    }

    /// Problems with fatal ones first, otherwise in report order.
    pub fn ranked(&self) -> Vec<Problem> {
        let mut ranked = self.problems.clone();
        ranked.sort_by(|a, b| b.severity.cmp(&a.severity));
        ranked
    }

    pub fn kinds(&self) -> HashSet<ProblemKind> {
        self.problems.iter().map(|p| p.kind).collect()
    }

    pub fn into_vec(self) -> Vec<Problem> {
        self.problems
    }
}

impl Extend<Problem> for ProblemList {
    fn extend<I: IntoIterator<Item = Problem>>(&mut self, iter: I) {
        for problem in iter {
            self.push(problem);
        }
    }
}

impl FromIterator<Problem> for ProblemList {
    fn from_iter<I: IntoIterator<Item = Problem>>(iter: I) -> Self {
        let mut list = ProblemList::new();
        list.extend(iter);
        list
    }
}

impl IntoIterator for ProblemList {
    type Item = Problem;
    type IntoIter = std::vec::IntoIter<Problem>;

    fn into_iter(self) -> Self::IntoIter {
        self.problems.into_iter()
    }
}

// ============================================================================
// Tests
// ============================================================================
