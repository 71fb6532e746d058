//! File stores and the exclusive file lock table.
//!
//! Refactorings never touch the filesystem directly. Commits go through a
//! [`FileStore`], which is either an in-memory map (tests, dry runs) or a
//! directory on disk. Overlapping commits from concurrent sessions are
//! serialized by the [`FileLockTable`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found: {path}")]
    NotFound { path: String },

    #[error("file is read-only: {path}")]
    ReadOnly { path: String },

    #[error("file already exists: {path}")]
    AlreadyExists { path: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out waiting for file locks on {}", paths.join(", "))]
    LockTimeout { paths: Vec<String> },
}

impl StoreError {
    fn io(path: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::PermissionDenied => StoreError::ReadOnly {
                path: path.to_string(),
            },
            io::ErrorKind::NotFound => StoreError::NotFound {
                path: path.to_string(),
            },
            _ => StoreError::Io {
                path: path.to_string(),
                source,
            },
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// FileStore
// ============================================================================

/// Backing storage for source files, addressed by workspace-relative
/// paths with `/` separators.
pub trait FileStore: Send + Sync {
    /// Read a file; `Ok(None)` if it does not exist.
    fn read(&self, path: &str) -> StoreResult<Option<String>>;

    /// Create or overwrite a file.
    fn write(&self, path: &str, contents: &str) -> StoreResult<()>;

    fn remove(&self, path: &str) -> StoreResult<()>;

    /// Move a file. Fails if `to` already names a different file.
    fn rename(&self, from: &str, to: &str) -> StoreResult<()>;

    /// All file paths, sorted.
    fn list(&self) -> StoreResult<Vec<String>>;

    /// Whether paths differing only in letter case name the same file.
    fn is_case_insensitive(&self) -> bool;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// MemoryFileStore
// ============================================================================

/// In-memory file store.
///
/// Paths can be marked read-only to exercise failure handling. A
/// case-insensitive store refuses a direct rename between two spellings of
/// the same path, the way many case-preserving filesystems do.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    /// Keyed by normalized path; value is (path as written, contents).
    files: Mutex<BTreeMap<String, (String, String)>>,
    read_only: Mutex<HashSet<String>>,
    case_insensitive: bool,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case_insensitive() -> Self {
        MemoryFileStore {
            case_insensitive: true,
            ..Self::default()
        }
    }

    /// Build a store holding the given files.
    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let store = Self::new();
        {
            let mut map = lock(&store.files);
            for (path, contents) in files {
                let path = path.into();
                map.insert(store.key(&path), (path, contents.into()));
            }
        }
        store
    }

    pub fn set_read_only(&self, path: &str, read_only: bool) {
        let key = self.key(path);
        let mut set = lock(&self.read_only);
        if read_only {
            set.insert(key);
        } else {
            set.remove(&key);
        }
    }

    /// Snapshot of every file as (path, contents).
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        lock(&self.files).values().cloned().collect()
    }

    fn key(&self, path: &str) -> String {
        if self.case_insensitive {
            path.to_lowercase()
        } else {
            path.to_string()
        }
    }

    fn check_writable(&self, path: &str) -> StoreResult<()> {
        if lock(&self.read_only).contains(&self.key(path)) {
            return Err(StoreError::ReadOnly {
                path: path.to_string(),
            });
        }
        Ok(())
    }
}

impl FileStore for MemoryFileStore {
    fn read(&self, path: &str) -> StoreResult<Option<String>> {
        Ok(lock(&self.files)
            .get(&self.key(path))
            .map(|(_, contents)| contents.clone()))
    }

    fn write(&self, path: &str, contents: &str) -> StoreResult<()> {
        self.check_writable(path)?;
        lock(&self.files).insert(self.key(path), (path.to_string(), contents.to_string()));
        Ok(())
    }

    fn remove(&self, path: &str) -> StoreResult<()> {
        self.check_writable(path)?;
        match lock(&self.files).remove(&self.key(path)) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        self.check_writable(from)?;
        self.check_writable(to)?;
        let mut files = lock(&self.files);
        let (from_key, to_key) = (self.key(from), self.key(to));
        if files.contains_key(&to_key) {
            return Err(StoreError::AlreadyExists {
                path: to.to_string(),
            });
        }
        let Some((_, contents)) = files.remove(&from_key) else {
            return Err(StoreError::NotFound {
                path: from.to_string(),
            });
        };
        files.insert(to_key, (to.to_string(), contents));
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<String>> {
        let mut paths: Vec<String> = lock(&self.files)
            .values()
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }
}

// ============================================================================
// DiskFileStore
// ============================================================================

/// File store rooted at a directory.
///
/// Writes go to a temporary file in the destination directory and are
/// persisted over the target, so a failed write never leaves a truncated
/// file behind.
#[derive(Debug, Clone)]
pub struct DiskFileStore {
    root: PathBuf,
    case_insensitive: bool,
}

impl DiskFileStore {
    /// Open a store at `root`, probing the filesystem's case sensitivity.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StoreError::NotFound {
                path: root.display().to_string(),
            });
        }
        let case_insensitive = probe_case_insensitive(&root)?;
        debug!(root = %root.display(), case_insensitive, "opened disk file store");
        Ok(DiskFileStore {
            root,
            case_insensitive,
        })
    }

    /// Override the probed case sensitivity.
    pub fn with_case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }

    fn ensure_parent(&self, full: &Path, path: &str) -> StoreResult<()> {
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(path, e))?;
        }
        Ok(())
    }
}

fn probe_case_insensitive(root: &Path) -> StoreResult<bool> {
    let probe = tempfile::Builder::new()
        .prefix("recast-case-probe-")
        .tempfile_in(root)
        .map_err(|e| StoreError::io(&root.display().to_string(), e))?;
    let name = probe
        .path()
        .file_name()
        .map(|n| n.to_string_lossy().to_uppercase())
        .unwrap_or_default();
    Ok(root.join(name).exists())
}

impl FileStore for DiskFileStore {
    fn read(&self, path: &str) -> StoreResult<Option<String>> {
        match fs::read_to_string(self.resolve(path)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    fn write(&self, path: &str, contents: &str) -> StoreResult<()> {
        let full = self.resolve(path);
        if let Ok(meta) = fs::metadata(&full) {
            if meta.permissions().readonly() {
                return Err(StoreError::ReadOnly {
                    path: path.to_string(),
                });
            }
        }
        self.ensure_parent(&full, path)?;
        let dir = full.parent().unwrap_or(&self.root);
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(path, e))?;
        tmp.write_all(contents.as_bytes())
            .map_err(|e| StoreError::io(path, e))?;
        tmp.persist(&full)
            .map_err(|e| StoreError::io(path, e.error))?;
        Ok(())
    }

    fn remove(&self, path: &str) -> StoreResult<()> {
        fs::remove_file(self.resolve(path)).map_err(|e| StoreError::io(path, e))
    }

    fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        let (src, dst) = (self.resolve(from), self.resolve(to));
        let same_file = self.case_insensitive && from.to_lowercase() == to.to_lowercase();
        if dst.exists() && !same_file {
            return Err(StoreError::AlreadyExists {
                path: to.to_string(),
            });
        }
        self.ensure_parent(&dst, to)?;
        fs::rename(&src, &dst).map_err(|e| StoreError::io(from, e))?;
        if let Some(parent) = src.parent() {
            // Ignore failure: the directory may still hold other files.
            let _ = fs::remove_dir(parent);
        }
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<String>> {
        let mut paths = Vec::new();
        let walker = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = entry.map_err(|e| StoreError::Io {
                path: self.root.display().to_string(),
                source: io::Error::other(e.to_string()),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                let rel: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                paths.push(rel.join("/"));
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }
}

// ============================================================================
// File Lock Table
// ============================================================================

/// Exclusive per-file locks shared by every session of a workspace.
///
/// A commit acquires all of its paths at once; a second commit whose path
/// set overlaps waits until the first releases or the timeout expires.
#[derive(Debug, Default)]
pub struct FileLockTable {
    held: Mutex<HashMap<String, String>>,
    released: Condvar,
}

impl FileLockTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Lock every path in `paths` for `owner`.
    ///
    /// Paths the owner already holds are not re-acquired and are not
    /// released by the returned guard.
    pub fn acquire(
        self: &Arc<Self>,
        owner: &str,
        paths: &[String],
        timeout: Duration,
    ) -> StoreResult<FileLockGuard> {
        let deadline = Instant::now() + timeout;
        let mut held = lock(&self.held);
        loop {
            let blocked: Vec<String> = paths
                .iter()
                .filter(|p| held.get(*p).is_some_and(|o| o != owner))
                .cloned()
                .collect();
            if blocked.is_empty() {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(owner, ?blocked, "file lock wait timed out");
                return Err(StoreError::LockTimeout { paths: blocked });
            }
            debug!(owner, ?blocked, "waiting for file locks");
            held = self
                .released
                .wait_timeout(held, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        let mut acquired = Vec::new();
        for path in paths {
            if !held.contains_key(path) {
                held.insert(path.clone(), owner.to_string());
                acquired.push(path.clone());
            }
        }
        Ok(FileLockGuard {
            table: Arc::clone(self),
            paths: acquired,
        })
    }

    /// The owner currently holding `path`, if any.
    pub fn holder(&self, path: &str) -> Option<String> {
        lock(&self.held).get(path).cloned()
    }

    fn release(&self, paths: &[String]) {
        let mut held = lock(&self.held);
        for path in paths {
            held.remove(path);
        }
        drop(held);
        self.released.notify_all();
    }
}

/// Releases its paths on drop.
#[derive(Debug)]
pub struct FileLockGuard {
    table: Arc<FileLockTable>,
    paths: Vec<String>,
}

impl FileLockGuard {
    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        self.table.release(&self.paths);
    }
}

// ============================================================================
// Tests
// ============================================================================
