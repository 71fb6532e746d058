// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Workspaces and refactoring sessions.
//!
//! A [`Workspace`] couples the resolved program with the file store it was
//! rendered into. Any number of [`RefactoringSession`]s read it at once;
//! each drives one refactoring through
//!
//! ```text
//! Requested -> PreChecked -> Planned -> Committed <-> RolledBack
//!          \-> Aborted    \-> Aborted
//! ```
//!
//! A commit locks every path it touches, checks that the program has not
//! moved on since the plan was prepared, verifies each file's content hash
//! against the state the plan was rendered from, and then writes. A failed
//! write restores every file already written, so the store is never left
//! half-committed. The committed transaction is kept for undo and redo.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use recast_core::config::EngineConfig;
use recast_core::diff::unified_diff;
use recast_core::patch::{
    ApplyContext, ApplyResult, Conflict, ContentHash, FileId, PatchSet, Precondition, SnapshotId,
};
use recast_core::problem::{Problem, ProblemList};
use recast_core::util::{
    format_timestamp_now, generate_session_id, generate_snapshot_id, generate_undo_token, token,
};
use recast_core::workspace::{FileLockTable, FileStore, StoreResult};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn};

use crate::apply::{render_all, ChangeKind, FileChange};
use crate::error::{SessionError, SessionResult};
use crate::model::Program;
use crate::ops::{Prepared, Refactoring};

// ============================================================================
// Workspace
// ============================================================================

/// The shared program and the store holding its rendered files.
pub struct Workspace {
    program: RwLock<Program>,
    store: Arc<dyn FileStore>,
    locks: Arc<FileLockTable>,
    config: EngineConfig,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("generation", &self.read().generation())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// Wrap a program whose rendered files are already in `store`.
    pub fn new(program: Program, store: Arc<dyn FileStore>, config: EngineConfig) -> Arc<Self> {
        Arc::new(Workspace {
            program: RwLock::new(program),
            store,
            locks: FileLockTable::new(),
            config,
        })
    }

    /// Render every file of `program` into `store`, then wrap both.
    pub fn materialize(
        program: Program,
        store: Arc<dyn FileStore>,
        config: EngineConfig,
    ) -> SessionResult<Arc<Self>> {
        for (path, text) in render_all(&program).into_values() {
            store.write(&path, &text)?;
        }
        Ok(Self::new(program, store, config))
    }

    fn read(&self) -> RwLockReadGuard<'_, Program> {
        self.program.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Program> {
        self.program.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of the current program.
    pub fn snapshot(&self) -> Program {
        self.read().clone()
    }

    pub fn generation(&self) -> u64 {
        self.read().generation()
    }

    pub fn store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a session for `refactoring`.
    pub fn session(self: &Arc<Self>, refactoring: Refactoring) -> RefactoringSession {
        RefactoringSession::new(Arc::clone(self), refactoring)
    }

    fn case_insensitive(&self) -> bool {
        self.config.case_insensitive_or(self.store.is_case_insensitive())
    }
}

// ============================================================================
// Store Operations
// ============================================================================

/// One reversible store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StoreOp {
    Write {
        path: String,
        contents: String,
        previous: Option<String>,
    },
    Remove {
        path: String,
        previous: String,
    },
    Rename {
        from: String,
        to: String,
    },
}

impl StoreOp {
    fn inverse(&self) -> StoreOp {
        match self {
            StoreOp::Write {
                path,
                contents,
                previous: Some(previous),
            } => StoreOp::Write {
                path: path.clone(),
                contents: previous.clone(),
                previous: Some(contents.clone()),
            },
            StoreOp::Write {
                path,
                contents,
                previous: None,
            } => StoreOp::Remove {
                path: path.clone(),
                previous: contents.clone(),
            },
            StoreOp::Remove { path, previous } => StoreOp::Write {
                path: path.clone(),
                contents: previous.clone(),
                previous: None,
            },
            StoreOp::Rename { from, to } => StoreOp::Rename {
                from: to.clone(),
                to: from.clone(),
            },
        }
    }

    fn apply(&self, store: &dyn FileStore, case_insensitive: bool) -> StoreResult<()> {
        match self {
            StoreOp::Write { path, contents, .. } => store.write(path, contents),
            StoreOp::Remove { path, .. } => store.remove(path),
            StoreOp::Rename { from, to } if case_insensitive && same_file(from, to) => {
                // The store sees both spellings as one file.
                let step = format!("{to}.{}", token("recast"));
                debug!(%from, %to, %step, "case-only rename in two moves");
                store.rename(from, &step)?;
                store.rename(&step, to)
            }
            StoreOp::Rename { from, to } => store.rename(from, to),
        }
    }
}

fn same_file(a: &str, b: &str) -> bool {
    a != b && a.to_lowercase() == b.to_lowercase()
}

/// Apply `ops` in order; on failure undo the ones already applied.
fn execute(store: &dyn FileStore, ops: &[StoreOp], case_insensitive: bool) -> StoreResult<()> {
    for (i, op) in ops.iter().enumerate() {
        if let Err(err) = op.apply(store, case_insensitive) {
            warn!(error = %err, applied = i, "store write failed, rolling back");
            for done in ops[..i].iter().rev() {
                if let Err(undo_err) = done.inverse().apply(store, case_insensitive) {
                    error!(error = %undo_err, op = ?done, "rollback step failed");
                }
            }
            return Err(err);
        }
    }
    Ok(())
}

/// A path and the content it should hold (`None`: absent).
type Expected = (String, Option<String>);

/// Check that every path holds its expected content.
fn verify(store: &dyn FileStore, expected: &[Expected]) -> SessionResult<()> {
    let mut patch = PatchSet::new(SnapshotId::new(generate_snapshot_id()));
    let mut contents = HashMap::new();
    for (i, (path, want)) in expected.iter().enumerate() {
        let current = store.read(path)?;
        let Some(want) = want else {
            if current.is_some() {
                return Err(SessionError::ContentChanged { path: path.clone() });
            }
            continue;
        };
        let file_id = FileId::new(i as u32);
        patch = patch
            .with_file_path(file_id, path.clone())
            .with_precondition(Precondition::FileHashMatches {
                file_id,
                content_hash: ContentHash::of_str(want),
            });
        if let Some(current) = current {
            contents.insert(file_id, current);
        }
    }
    let ctx = ApplyContext {
        snapshot_id: patch.snapshot_id.clone(),
        file_contents: contents,
    };
    match patch.apply(&ctx) {
        ApplyResult::Success { .. } => Ok(()),
        ApplyResult::Failed { conflicts } => {
            let path = conflicts
                .iter()
                .find_map(|c| match c {
                    Conflict::PreconditionFailed {
                        precondition: Precondition::FileHashMatches { file_id, .. },
                        ..
                    }
                    | Conflict::FileMissing { file_id } => patch.file_paths.get(file_id).cloned(),
                    _ => None,
                })
                .unwrap_or_default();
            Err(SessionError::ContentChanged { path })
        }
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// A committed multi-file change, replayable in both directions.
#[derive(Debug, Clone)]
struct Transaction {
    undo_token: String,
    committed_at: String,
    forward: Vec<StoreOp>,
    /// Store state the forward ops expect, and the state they leave.
    before: Vec<Expected>,
    after: Vec<Expected>,
    program_before: Program,
    program_after: Program,
    /// Program generation right after the last replay.
    generation: u64,
}

impl Transaction {
    /// Store ops for `changes`, with the states they expect and leave.
    fn from_changes(
        changes: &[FileChange],
        case_insensitive: bool,
    ) -> (Vec<StoreOp>, Vec<Expected>, Vec<Expected>) {
        let mut ops = Vec::new();
        let mut before = Vec::new();
        let mut after = Vec::new();
        for change in changes {
            let old = change.before.clone();
            let new = change.after.clone();
            match change.kind {
                ChangeKind::Modify => {
                    ops.push(StoreOp::Write {
                        path: change.path.clone(),
                        contents: new.clone().unwrap_or_default(),
                        previous: old.clone(),
                    });
                    before.push((change.path.clone(), old));
                    after.push((change.path.clone(), new));
                }
                ChangeKind::Create => {
                    ops.push(StoreOp::Write {
                        path: change.path.clone(),
                        contents: new.clone().unwrap_or_default(),
                        previous: None,
                    });
                    before.push((change.path.clone(), None));
                    after.push((change.path.clone(), new));
                }
                ChangeKind::Delete => {
                    ops.push(StoreOp::Remove {
                        path: change.path.clone(),
                        previous: old.clone().unwrap_or_default(),
                    });
                    before.push((change.path.clone(), old));
                    after.push((change.path.clone(), None));
                }
                ChangeKind::Move => {
                    let from = change.old_path.clone().unwrap_or_else(|| change.path.clone());
                    ops.push(StoreOp::Rename {
                        from: from.clone(),
                        to: change.path.clone(),
                    });
                    if old != new {
                        ops.push(StoreOp::Write {
                            path: change.path.clone(),
                            contents: new.clone().unwrap_or_default(),
                            previous: old.clone(),
                        });
                    }
                    let one_file = case_insensitive && same_file(&from, &change.path);
                    before.push((from.clone(), old));
                    if !one_file {
                        before.push((change.path.clone(), None));
                        after.push((from, None));
                    }
                    after.push((change.path.clone(), new));
                }
            }
        }
        (ops, before, after)
    }

    fn paths(&self) -> Vec<String> {
        let paths: BTreeSet<String> = self
            .before
            .iter()
            .chain(self.after.iter())
            .map(|(p, _)| p.clone())
            .collect();
        paths.into_iter().collect()
    }

    fn backward(&self) -> Vec<StoreOp> {
        self.forward.iter().rev().map(StoreOp::inverse).collect()
    }
}

// ============================================================================
// Refactoring Session
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Requested,
    PreChecked,
    Planned,
    Aborted,
    Committed,
    RolledBack,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Requested => "requested",
            SessionState::PreChecked => "pre_checked",
            SessionState::Planned => "planned",
            SessionState::Aborted => "aborted",
            SessionState::Committed => "committed",
            SessionState::RolledBack => "rolled_back",
        };
        f.write_str(name)
    }
}

/// One file the prepared refactoring changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeDescriptor {
    pub kind: ChangeKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    /// Unified diff from the old rendering to the new one.
    pub diff: String,
}

impl From<&FileChange> for ChangeDescriptor {
    fn from(change: &FileChange) -> Self {
        let old_path = change.old_path.as_deref().unwrap_or(&change.path);
        let (from, to) = match change.kind {
            ChangeKind::Create => ("/dev/null", change.path.as_str()),
            ChangeKind::Delete => (change.path.as_str(), "/dev/null"),
            ChangeKind::Modify | ChangeKind::Move => (old_path, change.path.as_str()),
        };
        let diff = unified_diff(
            from,
            to,
            change.before.as_deref().unwrap_or(""),
            change.after.as_deref().unwrap_or(""),
        );
        ChangeDescriptor {
            kind: change.kind,
            path: change.path.clone(),
            old_path: change.old_path.clone(),
            diff,
        }
    }
}

/// Drives one refactoring against a shared [`Workspace`].
#[derive(Debug)]
pub struct RefactoringSession {
    id: String,
    created_at: String,
    workspace: Arc<Workspace>,
    refactoring: Refactoring,
    state: SessionState,
    problems: ProblemList,
    prepared: Option<Prepared>,
    base_generation: u64,
    transaction: Option<Transaction>,
}

impl RefactoringSession {
    fn new(workspace: Arc<Workspace>, refactoring: Refactoring) -> Self {
        let base_generation = workspace.generation();
        RefactoringSession {
            id: generate_session_id(),
            created_at: format_timestamp_now(),
            workspace,
            refactoring,
            state: SessionState::Requested,
            problems: ProblemList::new(),
            prepared: None,
            base_generation,
            transaction: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn refactoring(&self) -> &Refactoring {
        &self.refactoring
    }

    /// Problems reported so far, most severe first.
    pub fn problems(&self) -> Vec<Problem> {
        self.problems.ranked()
    }

    /// Token of the committed transaction, if any.
    pub fn undo_token(&self) -> Option<&str> {
        self.transaction.as_ref().map(|t| t.undo_token.as_str())
    }

    pub fn committed_at(&self) -> Option<&str> {
        self.transaction.as_ref().map(|t| t.committed_at.as_str())
    }

    fn expect(&self, action: &str, states: &[SessionState]) -> SessionResult<()> {
        if states.contains(&self.state) {
            return Ok(());
        }
        Err(SessionError::InvalidState {
            action: action.to_string(),
            state: self.state.to_string(),
        })
    }

    /// Resolve and validate the request. Any problem aborts the session.
    pub fn pre_check(&mut self) -> SessionResult<Vec<Problem>> {
        self.expect("pre-check", &[SessionState::Requested])?;
        let program = self.workspace.read();
        let problems = self.refactoring.pre_check(&program, &self.workspace.config);
        self.base_generation = program.generation();
        drop(program);
        self.state = if problems.is_empty() {
            SessionState::PreChecked
        } else {
            SessionState::Aborted
        };
        self.problems.extend(problems);
        Ok(self.problems())
    }

    /// Build and apply the plan to a working copy, collecting the
    /// planner's and the conflict rules' problems.
    pub fn prepare(&mut self) -> SessionResult<Vec<Problem>> {
        self.expect("prepare", &[SessionState::PreChecked])?;
        let program = self.workspace.read();
        let prepared = self.refactoring.prepare(&program, &self.workspace.config);
        let generation = program.generation();
        drop(program);
        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                self.state = SessionState::Aborted;
                return Err(err.into());
            }
        };
        if generation != self.base_generation {
            self.state = SessionState::Aborted;
            return Err(SessionError::ConcurrentModification);
        }
        self.problems.extend(prepared.problems.clone());
        self.state = if prepared.problems.has_fatal() || prepared.output.is_none() {
            SessionState::Aborted
        } else {
            SessionState::Planned
        };
        self.prepared = Some(prepared);
        Ok(self.problems())
    }

    /// Per-file change descriptors of the prepared plan.
    pub fn refactoring_elements(&self) -> Vec<ChangeDescriptor> {
        self.prepared
            .as_ref()
            .and_then(|p| p.output.as_ref())
            .map(|output| output.changes.iter().map(ChangeDescriptor::from).collect())
            .unwrap_or_default()
    }

    /// Run any phase not yet run and commit.
    ///
    /// Returns the session's problems. Fatal problems abort; warnings hold
    /// the session in `Planned` unless `confirm` is set. Store failures
    /// restore every file already written and are returned as errors.
    pub fn do_refactoring(&mut self, confirm: bool) -> SessionResult<Vec<Problem>> {
        let span = info_span!("do_refactoring", session = %self.id, operation = %self.refactoring.label());
        let _guard = span.enter();

        if self.state == SessionState::Requested {
            self.pre_check()?;
        }
        if self.state == SessionState::PreChecked {
            self.prepare()?;
        }
        if self.state == SessionState::Aborted {
            info!(problems = self.problems.len(), "refactoring aborted");
            return Ok(self.problems());
        }
        self.expect("commit", &[SessionState::Planned])?;
        if self.problems.has_warnings() && !confirm {
            info!(warnings = self.problems.len(), "waiting for confirmation");
            return Ok(self.problems());
        }
        self.commit()?;
        Ok(self.problems())
    }

    fn commit(&mut self) -> SessionResult<()> {
        let Some(output) = self.prepared.as_ref().and_then(|p| p.output.as_ref()) else {
            return Err(SessionError::InvalidState {
                action: "commit".to_string(),
                state: self.state.to_string(),
            });
        };
        let workspace = Arc::clone(&self.workspace);
        let case_insensitive = workspace.case_insensitive();
        let (forward, before, after) = Transaction::from_changes(&output.changes, case_insensitive);
        let mut transaction = Transaction {
            undo_token: generate_undo_token(),
            committed_at: String::new(),
            forward,
            before,
            after,
            program_before: Program::new(),
            program_after: output.program.clone(),
            generation: 0,
        };

        let paths = transaction.paths();
        let _locks = workspace
            .locks
            .acquire(&self.id, &paths, workspace.config.lock_timeout())?;
        let mut program = workspace.write();
        if program.generation() != self.base_generation {
            warn!(
                expected = self.base_generation,
                actual = program.generation(),
                "program changed since prepare"
            );
            return Err(SessionError::ConcurrentModification);
        }
        verify(workspace.store.as_ref(), &transaction.before)?;
        execute(workspace.store.as_ref(), &transaction.forward, case_insensitive)?;

        transaction.program_before = program.clone();
        let generation = program.generation();
        *program = transaction.program_after.clone();
        program.set_generation_after(generation);
        transaction.generation = program.generation();
        transaction.committed_at = format_timestamp_now();
        info!(
            files = paths.len(),
            undo_token = %transaction.undo_token,
            "refactoring committed"
        );
        self.transaction = Some(transaction);
        self.state = SessionState::Committed;
        Ok(())
    }

    /// Replay the transaction in one direction.
    fn replay(&mut self, undo: bool) -> SessionResult<()> {
        let workspace = Arc::clone(&self.workspace);
        let case_insensitive = workspace.case_insensitive();
        let Some(transaction) = self.transaction.as_mut() else {
            return Err(if undo {
                SessionError::NothingToUndo
            } else {
                SessionError::NothingToRedo
            });
        };
        let (expected, ops, restored) = if undo {
            (&transaction.after, transaction.backward(), &transaction.program_before)
        } else {
            (&transaction.before, transaction.forward.clone(), &transaction.program_after)
        };

        let paths = transaction.paths();
        let _locks = workspace
            .locks
            .acquire(&self.id, &paths, workspace.config.lock_timeout())?;
        let mut program = workspace.write();
        if program.generation() != transaction.generation {
            return Err(SessionError::ConcurrentModification);
        }
        verify(workspace.store.as_ref(), expected)?;
        execute(workspace.store.as_ref(), &ops, case_insensitive)?;

        let generation = program.generation();
        *program = restored.clone();
        program.set_generation_after(generation);
        transaction.generation = program.generation();
        Ok(())
    }

    /// Restore every file and the program to their pre-commit state.
    pub fn undo(&mut self) -> SessionResult<()> {
        if self.state != SessionState::Committed {
            return Err(SessionError::NothingToUndo);
        }
        self.replay(true)?;
        info!(session = %self.id, "refactoring rolled back");
        self.state = SessionState::RolledBack;
        Ok(())
    }

    /// Re-apply a rolled-back commit.
    pub fn redo(&mut self) -> SessionResult<()> {
        if self.state != SessionState::RolledBack {
            return Err(SessionError::NothingToRedo);
        }
        self.replay(false)?;
        info!(session = %self.id, "refactoring redone");
        self.state = SessionState::Committed;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ProgramBuilder;
    use crate::frontend::SymbolRef;
    use crate::model::DeclId;
    use crate::ops::{MemberSpec, PushDown, RenamePackage, SafeDelete};
    use recast_core::workspace::{MemoryFileStore, StoreError};

    struct Fixture {
        program: Program,
        b: DeclId,
        a: DeclId,
    }

    /// `B` with `int a()`, subclasses `A` and `C`, and `Main` calling `a`.
    fn fixture() -> Fixture {
        let mut pb = ProgramBuilder::new();
        let fb = pb.file("p/B.java", "p");
        let b = pb.class(fb, "B");
        let a = pb.method(b, "a", Some("int"));
        let one = pb.int(1);
        let ret = pb.ret(Some(one));
        pb.set_body(a, vec![ret]);
        for name in ["A", "C"] {
            let file = pb.file(&format!("p/{name}.java"), "p");
            let sub = pb.class(file, name);
            pb.extends(sub, b);
        }
        Fixture {
            program: pb.finish(),
            b,
            a,
        }
    }

    fn workspace(program: Program) -> (Arc<Workspace>, Arc<MemoryFileStore>) {
        let store = Arc::new(MemoryFileStore::new());
        let ws = Workspace::materialize(program, store.clone(), EngineConfig::default()).unwrap();
        (ws, store)
    }

    fn push_down(f: &Fixture) -> Refactoring {
        Refactoring::PushDown(PushDown {
            source: SymbolRef::of(&f.program, f.b).unwrap(),
            members: vec![MemberSpec::new(SymbolRef::of(&f.program, f.a).unwrap())],
        })
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn commit_writes_every_file() {
            let f = fixture();
            let (ws, store) = workspace(f.program.clone());
            let mut session = ws.session(push_down(&f));
            let problems = session.do_refactoring(false).unwrap();
            assert!(problems.is_empty(), "{problems:?}");
            assert_eq!(session.state(), SessionState::Committed);
            let b = store.read("p/B.java").unwrap().unwrap();
            assert!(!b.contains("int a()"));
            assert!(store.read("p/A.java").unwrap().unwrap().contains("int a() {"));
            assert!(store.read("p/C.java").unwrap().unwrap().contains("int a() {"));
            assert!(session.undo_token().unwrap().starts_with("undo_"));
        }

        #[test]
        fn elements_describe_each_file() {
            let f = fixture();
            let (ws, _) = workspace(f.program.clone());
            let mut session = ws.session(push_down(&f));
            session.pre_check().unwrap();
            session.prepare().unwrap();
            let elements = session.refactoring_elements();
            let paths: Vec<&str> = elements.iter().map(|e| e.path.as_str()).collect();
            assert_eq!(paths, vec!["p/A.java", "p/B.java", "p/C.java"]);
            assert!(elements[1].diff.contains("-    int a() {"));
        }

        #[test]
        fn undo_and_redo_replay_the_commit() {
            let f = fixture();
            let (ws, store) = workspace(f.program.clone());
            let original = store.snapshot();
            let mut session = ws.session(push_down(&f));
            session.do_refactoring(false).unwrap();
            let committed = store.snapshot();

            session.undo().unwrap();
            assert_eq!(session.state(), SessionState::RolledBack);
            assert_eq!(store.snapshot(), original);
            assert!(matches!(session.undo(), Err(SessionError::NothingToUndo)));

            session.redo().unwrap();
            assert_eq!(store.snapshot(), committed);
            assert_eq!(session.state(), SessionState::Committed);
        }

        #[test]
        fn phases_run_in_order() {
            let f = fixture();
            let (ws, _) = workspace(f.program.clone());
            let mut session = ws.session(push_down(&f));
            assert!(matches!(
                session.prepare(),
                Err(SessionError::InvalidState { .. })
            ));
            session.pre_check().unwrap();
            assert_eq!(session.state(), SessionState::PreChecked);
        }

        #[test]
        fn warnings_wait_for_confirmation() {
            let f = fixture();
            let mut pb = ProgramBuilder::from_program(f.program);
            let file = pb.file("p/Main.java", "p");
            let main = pb.class(file, "Main");
            let run = pb.method(main, "run", Some("int"));
            let target = pb.param(run, "c", "C");
            let receiver = pb.name(target);
            let call = pb.call(Some(receiver), f.a, vec![]);
            let ret = pb.ret(Some(call));
            pb.set_body(run, vec![ret]);
            let program = pb.finish();
            let (ws, store) = workspace(program.clone());

            let delete = SafeDelete {
                symbols: vec![SymbolRef::of(&program, f.a).unwrap()],
                cascade: false,
                search_comments: None,
            };
            let mut session = ws.session(Refactoring::SafeDelete(delete));
            let problems = session.do_refactoring(false).unwrap();
            assert_eq!(problems.len(), 1);
            assert_eq!(session.state(), SessionState::Planned);
            assert!(store.read("p/B.java").unwrap().unwrap().contains("int a()"));

            session.do_refactoring(true).unwrap();
            assert_eq!(session.state(), SessionState::Committed);
            assert!(!store.read("p/B.java").unwrap().unwrap().contains("int a()"));
        }
    }

    mod failure_tests {
        use super::*;

        #[test]
        fn read_only_file_rolls_back_everything() {
            let f = fixture();
            let (ws, store) = workspace(f.program.clone());
            let original = store.snapshot();
            store.set_read_only("p/C.java", true);
            let mut session = ws.session(push_down(&f));
            let err = session.do_refactoring(false).unwrap_err();
            assert!(matches!(err, SessionError::Store(StoreError::ReadOnly { .. })));
            assert_eq!(store.snapshot(), original);
            assert_eq!(ws.generation(), f.program.generation());
        }

        #[test]
        fn edited_file_is_detected() {
            let f = fixture();
            let (ws, store) = workspace(f.program.clone());
            let mut session = ws.session(push_down(&f));
            session.pre_check().unwrap();
            session.prepare().unwrap();
            store.write("p/A.java", "// edited by hand\n").unwrap();
            let err = session.do_refactoring(false).unwrap_err();
            assert!(matches!(err, SessionError::ContentChanged { path } if path == "p/A.java"));
        }

        #[test]
        fn second_session_on_stale_program_is_rejected() {
            let f = fixture();
            let (ws, _) = workspace(f.program.clone());
            let mut first = ws.session(push_down(&f));
            let mut second = ws.session(push_down(&f));
            second.pre_check().unwrap();
            second.prepare().unwrap();
            first.do_refactoring(false).unwrap();
            assert!(matches!(
                second.do_refactoring(false),
                Err(SessionError::ConcurrentModification)
            ));
        }

        #[test]
        fn case_only_move_goes_through_a_second_name() {
            let mut pb = ProgramBuilder::new();
            let file = pb.file("a/t/X.java", "a.t");
            pb.class(file, "X");
            let program = pb.finish();
            let store = Arc::new(MemoryFileStore::case_insensitive());
            let ws = Workspace::materialize(program, store.clone(), EngineConfig::default()).unwrap();
            let rename = RenamePackage::new("a.t", "a.T");
            let mut session = ws.session(Refactoring::RenamePackage(rename));
            session.do_refactoring(false).unwrap();
            assert_eq!(store.list().unwrap(), vec!["a/T/X.java".to_string()]);
            assert!(store.read("a/T/X.java").unwrap().unwrap().starts_with("package a.T;"));
        }
    }
}
