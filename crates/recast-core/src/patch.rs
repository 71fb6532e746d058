//! Patch IR: Edit, Anchor, PatchSet for atomic multi-file commits.
//!
//! Refactorings plan at the tree level; by the time changes reach the
//! file store they have been rendered to text. This module carries that
//! text across the commit boundary:
//! - Minimal anchored edits computed from before/after renderings
//! - Preconditions pinning each file to the content the plan was built on
//! - Atomic apply semantics (all-or-nothing)

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;


/// Hash type for content verification (SHA-256, stored as hex string for JSON compatibility).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute SHA-256 hash of the given bytes, returning hex-encoded string.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hex::encode(hasher.finalize()))
    }

    /// Hash a text rendering.
    pub fn of_str(text: &str) -> Self {
        Self::compute(text.as_bytes())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Core Types
// ============================================================================

/// Identifies the program snapshot a patch was rendered from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub String);

impl SnapshotId {
    pub fn new(id: impl Into<String>) -> Self {
        SnapshotId(id.into())
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable file identifier within a program.
///
/// Survives moves and renames: a file relocated by a refactoring keeps
/// its id and only its path changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct FileId(pub u32);

impl FileId {
    pub fn new(id: u32) -> Self {
        FileId(id)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file_{}", self.0)
    }
}

/// Byte offsets into rendered file content.
///
/// Spans are half-open intervals: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: u64,
    /// End byte offset (exclusive).
    pub end: u64,
}

impl Span {
    /// Create a new span.
    ///
    /// # Panics
    /// Panics if `start > end`.
    pub fn new(start: u64, end: u64) -> Self {
        assert!(start <= end, "Span start ({start}) must be <= end ({end})");
        Span { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Adjacent spans (one ends where another starts) do NOT overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Shift both ends by `delta` bytes.
    pub fn offset(&self, delta: u64) -> Span {
        Span::new(self.start + delta, self.end + delta)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ============================================================================
// Anchor Model
// ============================================================================

/// Exact span with hash verification.
///
/// The edit applies only if the bytes at `span` hash to
/// `expected_before_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub span: Span,
    pub expected_before_hash: ContentHash,
}

/// Result of resolving an anchor against file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorResolution {
    Resolved(Span),
    HashMismatch {
        span: Span,
        expected: ContentHash,
        actual: ContentHash,
    },
    OutOfBounds {
        span: Span,
        file_len: u64,
    },
}

impl Anchor {
    /// Anchor `span` of `content`, recording the hash of the covered bytes.
    pub fn span_exact(span: Span, content: &str) -> Self {
        let covered = &content.as_bytes()[span.start as usize..span.end as usize];
        Anchor {
            span,
            expected_before_hash: ContentHash::compute(covered),
        }
    }

    pub fn resolve(&self, content: &str) -> AnchorResolution {
        let len = content.len() as u64;
        let (start, end) = (self.span.start as usize, self.span.end as usize);
        if self.span.end > len || !content.is_char_boundary(start) || !content.is_char_boundary(end)
        {
            return AnchorResolution::OutOfBounds {
                span: self.span,
                file_len: len,
            };
        }
        let actual = ContentHash::compute(&content.as_bytes()[start..end]);
        if actual != self.expected_before_hash {
            return AnchorResolution::HashMismatch {
                span: self.span,
                expected: self.expected_before_hash.clone(),
                actual,
            };
        }
        AnchorResolution::Resolved(self.span)
    }
}

// ============================================================================
// Preconditions
// ============================================================================

/// Checks that must pass before any edit can apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precondition {
    /// Snapshot ID must match the context's snapshot.
    SnapshotIsCurrent(SnapshotId),

    /// File content hash must match.
    FileHashMatches {
        file_id: FileId,
        content_hash: ContentHash,
    },

    /// Edits in a file must not overlap.
    NoOverlaps,
}

// ============================================================================
// Conflict Detection
// ============================================================================

/// A detected overlap or invalidation that prevents apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conflict {
    OverlappingSpans {
        file_id: FileId,
        edit1_span: Span,
        edit2_span: Span,
    },
    AnchorHashMismatch {
        file_id: FileId,
        span: Span,
        expected: ContentHash,
        actual: ContentHash,
    },
    PreconditionFailed {
        precondition: Precondition,
        reason: String,
    },
    SpanOutOfBounds {
        file_id: FileId,
        span: Span,
        file_len: u64,
    },
    FileMissing {
        file_id: FileId,
    },
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conflict::OverlappingSpans {
                file_id,
                edit1_span,
                edit2_span,
            } => write!(f, "overlapping edits in {file_id}: {edit1_span} and {edit2_span}"),
            Conflict::AnchorHashMismatch { file_id, span, .. } => {
                write!(f, "content at {span} in {file_id} changed since planning")
            }
            Conflict::PreconditionFailed { reason, .. } => write!(f, "{reason}"),
            Conflict::SpanOutOfBounds {
                file_id,
                span,
                file_len,
            } => write!(f, "span {span} out of bounds for {file_id} ({file_len} bytes)"),
            Conflict::FileMissing { file_id } => write!(f, "{file_id} is missing"),
        }
    }
}

// ============================================================================
// Edit Operations
// ============================================================================

/// A single text replacement anchored in one file.
///
/// Insertion uses an empty span; deletion uses empty text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    /// Stable identifier for ordering.
    pub id: u32,
    pub file_id: FileId,
    pub anchor: Anchor,
    pub text: String,
    /// Human-readable reason for the edit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edit {
    pub fn replace(id: u32, file_id: FileId, anchor: Anchor, text: impl Into<String>) -> Self {
        Edit {
            id,
            file_id,
            anchor,
            text: text.into(),
            label: None,
        }
    }

    /// Compute the single smallest replacement turning `before` into `after`.
    ///
    /// Returns `None` when the texts are identical.
    pub fn between(id: u32, file_id: FileId, before: &str, after: &str) -> Option<Self> {
        if before == after {
            return None;
        }
        let prefix = common_prefix_len(before, after);
        let suffix = common_suffix_len(&before[prefix..], &after[prefix..]);
        let span = Span::new(prefix as u64, (before.len() - suffix) as u64);
        let text = &after[prefix..after.len() - suffix];
        Some(Edit::replace(
            id,
            file_id,
            Anchor::span_exact(span, before),
            text,
        ))
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn span(&self) -> Span {
        self.anchor.span
    }
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    let mut len = 0;
    for ((ia, ca), (_, cb)) in a.char_indices().zip(b.char_indices()) {
        if ca != cb {
            return ia;
        }
        len = ia + ca.len_utf8();
    }
    len
}

fn common_suffix_len(a: &str, b: &str) -> usize {
    let mut len = 0;
    for (ca, cb) in a.chars().rev().zip(b.chars().rev()) {
        if ca != cb {
            break;
        }
        len += ca.len_utf8();
    }
    len
}

// ============================================================================
// PatchSet
// ============================================================================

/// An ordered set of edits with metadata, applied atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchSet {
    pub snapshot_id: SnapshotId,
    pub preconditions: Vec<Precondition>,
    pub edits: Vec<Edit>,
    /// Mapping from FileId to file path, for conflict reports.
    pub file_paths: BTreeMap<FileId, String>,
}

impl PatchSet {
    pub fn new(snapshot_id: SnapshotId) -> Self {
        PatchSet {
            snapshot_id,
            preconditions: vec![Precondition::NoOverlaps],
            edits: Vec::new(),
            file_paths: BTreeMap::new(),
        }
    }

    pub fn with_precondition(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    pub fn with_edit(mut self, edit: Edit) -> Self {
        self.edits.push(edit);
        self
    }

    pub fn with_file_path(mut self, file_id: FileId, path: impl Into<String>) -> Self {
        self.file_paths.insert(file_id, path.into());
        self
    }

    /// Record a whole-file rewrite: pins the file to `before` and adds the
    /// minimal edit producing `after`.
    pub fn push_rewrite(&mut self, file_id: FileId, path: &str, before: &str, after: &str) {
        self.file_paths.insert(file_id, path.to_string());
        self.preconditions.push(Precondition::FileHashMatches {
            file_id,
            content_hash: ContentHash::of_str(before),
        });
        let id = self.edits.len() as u32;
        if let Some(edit) = Edit::between(id, file_id, before, after) {
            self.edits.push(edit.with_label(format!("rewrite {path}")));
        }
    }

    #[must_use]
    pub fn detect_conflicts(&self) -> Vec<Conflict> {
        let mut by_file: BTreeMap<FileId, Vec<&Edit>> = BTreeMap::new();
        for edit in &self.edits {
            by_file.entry(edit.file_id).or_default().push(edit);
        }
        let mut conflicts = Vec::new();
        for (file_id, edits) in by_file {
            for (i, first) in edits.iter().enumerate() {
                for second in &edits[i + 1..] {
                    if first.span().overlaps(&second.span()) {
                        conflicts.push(Conflict::OverlappingSpans {
                            file_id,
                            edit1_span: first.span(),
                            edit2_span: second.span(),
                        });
                    }
                }
            }
        }
        conflicts
    }
}

// ============================================================================
// Atomic Apply
// ============================================================================

/// Result of attempting to apply a PatchSet.
#[derive(Debug, Clone)]
pub enum ApplyResult {
    /// All edits applied; new content for each edited file.
    Success {
        modified_files: HashMap<FileId, String>,
    },
    /// Nothing applied.
    Failed { conflicts: Vec<Conflict> },
}

/// Current file contents the patch is checked and applied against.
pub struct ApplyContext {
    pub snapshot_id: SnapshotId,
    pub file_contents: HashMap<FileId, String>,
}

impl PatchSet {
    /// Apply this PatchSet atomically.
    ///
    /// Every precondition and anchor is checked before any file content is
    /// touched. Edits apply in reverse offset order within each file.
    #[must_use]
    pub fn apply(&self, ctx: &ApplyContext) -> ApplyResult {
        let mut conflicts = Vec::new();

        for precondition in &self.preconditions {
            match precondition {
                Precondition::SnapshotIsCurrent(expected) => {
                    if expected != &ctx.snapshot_id {
                        conflicts.push(Conflict::PreconditionFailed {
                            precondition: precondition.clone(),
                            reason: format!(
                                "snapshot mismatch: expected {}, got {}",
                                expected, ctx.snapshot_id
                            ),
                        });
                    }
                }
                Precondition::FileHashMatches {
                    file_id,
                    content_hash,
                } => match ctx.file_contents.get(file_id) {
                    Some(content) => {
                        let actual = ContentHash::of_str(content);
                        if &actual != content_hash {
                            let path = self
                                .file_paths
                                .get(file_id)
                                .map(String::as_str)
                                .unwrap_or("<unknown>");
                            conflicts.push(Conflict::PreconditionFailed {
                                precondition: precondition.clone(),
                                reason: format!("{path} was modified outside this session"),
                            });
                        }
                    }
                    None => conflicts.push(Conflict::FileMissing { file_id: *file_id }),
                },
                Precondition::NoOverlaps => conflicts.extend(self.detect_conflicts()),
            }
        }

        let mut by_file: HashMap<FileId, Vec<(Span, &Edit)>> = HashMap::new();
        for edit in &self.edits {
            let Some(content) = ctx.file_contents.get(&edit.file_id) else {
                conflicts.push(Conflict::FileMissing {
                    file_id: edit.file_id,
                });
                continue;
            };
            match edit.anchor.resolve(content) {
                AnchorResolution::Resolved(span) => {
                    by_file.entry(edit.file_id).or_default().push((span, edit));
                }
                AnchorResolution::HashMismatch {
                    span,
                    expected,
                    actual,
                } => conflicts.push(Conflict::AnchorHashMismatch {
                    file_id: edit.file_id,
                    span,
                    expected,
                    actual,
                }),
                AnchorResolution::OutOfBounds { span, file_len } => {
                    conflicts.push(Conflict::SpanOutOfBounds {
                        file_id: edit.file_id,
                        span,
                        file_len,
                    })
                }
            }
        }

        if !conflicts.is_empty() {
            conflicts.dedup();
            return ApplyResult::Failed { conflicts };
        }

        let mut modified_files = HashMap::new();
        for (file_id, mut edits) in by_file {
            let Some(original) = ctx.file_contents.get(&file_id) else {
                continue;
            };
            let mut content = original.clone();
            edits.sort_by(|a, b| b.0.start.cmp(&a.0.start));
            for (span, edit) in edits {
                content.replace_range(span.start as usize..span.end as usize, &edit.text);
            }
            modified_files.insert(file_id, content);
        }

        ApplyResult::Success { modified_files }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const BEFORE: &str = "class A {\n    int a() {\n        return 1;\n    }\n}\n";

    fn context(file_id: FileId, content: &str) -> ApplyContext {
        let mut file_contents = HashMap::new();
        file_contents.insert(file_id, content.to_string());
        ApplyContext {
            snapshot_id: SnapshotId::new("snap_test"),
            file_contents,
        }
    }

    mod span_tests {
        use super::*;

        #[test]
        fn adjacent_spans_do_not_overlap() {
            let a = Span::new(10, 20);
            assert!(!a.overlaps(&Span::new(20, 30)));
            assert!(a.overlaps(&Span::new(15, 25)));
            assert!(a.overlaps(&Span::new(5, 15)));
        }

        #[test]
        fn contains_and_offset() {
            let outer = Span::new(10, 30);
            assert!(outer.contains(&Span::new(15, 25)));
            assert!(!outer.contains(&Span::new(20, 40)));
            assert_eq!(Span::new(1, 3).offset(10), Span::new(11, 13));
        }
    }

    mod edit_tests {
        use super::*;

        #[test]
        fn between_identical_texts_is_none() {
            assert!(Edit::between(0, FileId(0), BEFORE, BEFORE).is_none());
        }

        #[test]
        fn between_finds_minimal_region() {
            let after = BEFORE.replace("return 1;", "return 2;");
            let edit = Edit::between(0, FileId(0), BEFORE, &after).unwrap();
            assert_eq!(edit.text, "2");
            assert_eq!(edit.span().len(), 1);
        }

        #[test]
        fn between_handles_pure_insertion() {
            let after = format!("{BEFORE}// end\n");
            let edit = Edit::between(0, FileId(0), BEFORE, &after).unwrap();
            assert!(edit.span().is_empty());
            assert_eq!(edit.text, "// end\n");
        }

        #[test]
        fn between_respects_char_boundaries() {
            let edit = Edit::between(0, FileId(0), "naïve", "naive").unwrap();
            assert_eq!(edit.text, "i");
            assert_eq!(edit.span(), Span::new(2, 4));
        }
    }

    mod apply_tests {
        use super::*;

        #[test]
        fn rewrite_applies_when_content_matches() {
            let after = BEFORE.replace("int a()", "int b()");
            let mut patch = PatchSet::new(SnapshotId::new("snap_test"));
            patch.push_rewrite(FileId(1), "p/A.java", BEFORE, &after);

            match patch.apply(&context(FileId(1), BEFORE)) {
                ApplyResult::Success { modified_files } => {
                    assert_eq!(modified_files[&FileId(1)], after);
                }
                ApplyResult::Failed { conflicts } => panic!("unexpected conflicts: {conflicts:?}"),
            }
        }

        #[test]
        fn rewrite_fails_when_file_changed_externally() {
            let after = BEFORE.replace("int a()", "int b()");
            let mut patch = PatchSet::new(SnapshotId::new("snap_test"));
            patch.push_rewrite(FileId(1), "p/A.java", BEFORE, &after);

            let drifted = BEFORE.replace("return 1", "return 7");
            match patch.apply(&context(FileId(1), &drifted)) {
                ApplyResult::Failed { conflicts } => {
                    assert!(conflicts
                        .iter()
                        .any(|c| matches!(c, Conflict::PreconditionFailed { .. })));
                }
                ApplyResult::Success { .. } => panic!("expected failure"),
            }
        }

        #[test]
        fn overlapping_edits_are_rejected() {
            let anchor1 = Anchor::span_exact(Span::new(0, 5), BEFORE);
            let anchor2 = Anchor::span_exact(Span::new(3, 8), BEFORE);
            let patch = PatchSet::new(SnapshotId::new("snap_test"))
                .with_edit(Edit::replace(0, FileId(1), anchor1, "x"))
                .with_edit(Edit::replace(1, FileId(1), anchor2, "y"));

            assert_eq!(patch.detect_conflicts().len(), 1);
            assert!(matches!(
                patch.apply(&context(FileId(1), BEFORE)),
                ApplyResult::Failed { .. }
            ));
        }

        #[test]
        fn snapshot_mismatch_is_reported() {
            let patch = PatchSet::new(SnapshotId::new("snap_test"))
                .with_precondition(Precondition::SnapshotIsCurrent(SnapshotId::new("snap_old")));
            assert!(matches!(
                patch.apply(&context(FileId(1), BEFORE)),
                ApplyResult::Failed { .. }
            ));
        }

        #[test]
        fn missing_file_is_a_conflict() {
            let mut patch = PatchSet::new(SnapshotId::new("snap_test"));
            patch.push_rewrite(FileId(9), "p/Z.java", "a", "b");
            match patch.apply(&context(FileId(1), BEFORE)) {
                ApplyResult::Failed { conflicts } => {
                    assert!(conflicts.contains(&Conflict::FileMissing { file_id: FileId(9) }));
                }
                ApplyResult::Success { .. } => panic!("expected failure"),
            }
        }
    }
}
