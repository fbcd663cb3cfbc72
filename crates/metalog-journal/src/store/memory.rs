//! In-memory segment store.
//!
//! Useful for tests and dry runs. Clones share the same underlying files, so
//! a test can hand one clone to the journal and inspect or corrupt files
//! through another. Failures can be injected per operation and path.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::{Cursor, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use metalog_core::WalSyncMode;
use parking_lot::Mutex;

use super::{SegmentSink, SegmentStore};

/// Store operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    /// Fail `create`.
    Create,
    /// Fail `delete`.
    Delete,
    /// Fail `rename` when `path` is the source.
    Rename,
    /// Fail `sync` on sinks created for `path`.
    Sync,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
    faults: HashSet<(FaultOp, PathBuf)>,
    size_limits: HashMap<PathBuf, usize>,
    closed: bool,
}

impl MemoryState {
    fn check_fault(&self, op: FaultOp, path: &Path) -> std::io::Result<()> {
        if self.faults.contains(&(op, path.to_path_buf())) {
            return Err(std::io::Error::other(format!(
                "injected {op:?} failure for {}",
                path.display()
            )));
        }
        Ok(())
    }

    fn add_dir_with_parents(&mut self, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }
}

/// Segment store that keeps every file in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySegmentStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySegmentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` fail for `path` until cleared.
    pub fn inject_fault(&self, op: FaultOp, path: impl Into<PathBuf>) {
        self.state.lock().faults.insert((op, path.into()));
    }

    /// Cap the file at `path` at `bytes`. A write past the cap stores what
    /// fits and fails on the rest, like a full disk.
    pub fn limit_file_size(&self, path: impl Into<PathBuf>, bytes: usize) {
        self.state.lock().size_limits.insert(path.into(), bytes);
    }

    /// Remove all injected faults and size limits.
    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.faults.clear();
        state.size_limits.clear();
    }

    /// Returns a copy of the file contents at `path`.
    #[must_use]
    pub fn read_file(&self, path: &Path) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }

    /// Replace the contents of the file at `path`, creating parents.
    pub fn write_file(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        let path = path.into();
        let mut state = self.state.lock();
        if let Some(parent) = path.parent() {
            state.add_dir_with_parents(parent);
        }
        state.files.insert(path, contents.into());
    }

    /// Returns true once `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl SegmentStore for MemorySegmentStore {
    fn exists(&self, path: &Path) -> std::io::Result<bool> {
        let state = self.state.lock();
        Ok(state.files.contains_key(path) || state.dirs.contains(path))
    }

    fn open(&self, path: &Path) -> std::io::Result<Box<dyn Read + Send>> {
        let state = self.state.lock();
        match state.files.get(path) {
            Some(contents) => Ok(Box::new(Cursor::new(contents.clone()))),
            None => Err(std::io::Error::new(
                ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )),
        }
    }

    fn create(&self, path: &Path) -> std::io::Result<Box<dyn SegmentSink>> {
        let mut state = self.state.lock();
        state.check_fault(FaultOp::Create, path)?;
        if state.dirs.contains(path) {
            return Err(std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("{} is a directory", path.display()),
            ));
        }
        if let Some(parent) = path.parent() {
            state.add_dir_with_parents(parent);
        }
        state.files.insert(path.to_path_buf(), Vec::new());
        Ok(Box::new(MemorySink { state: Arc::clone(&self.state), path: path.to_path_buf() }))
    }

    fn delete(&self, path: &Path, recursive: bool) -> std::io::Result<bool> {
        let mut state = self.state.lock();
        state.check_fault(FaultOp::Delete, path)?;

        if state.files.remove(path).is_some() {
            return Ok(true);
        }
        if !state.dirs.contains(path) {
            return Ok(false);
        }

        let has_children = state.files.keys().any(|p| p.starts_with(path) && p != path)
            || state.dirs.iter().any(|p| p.starts_with(path) && p != path);
        if has_children && !recursive {
            return Err(std::io::Error::other(format!(
                "{} is not empty",
                path.display()
            )));
        }
        state.files.retain(|p, _| !p.starts_with(path));
        state.dirs.retain(|p| !p.starts_with(path));
        Ok(true)
    }

    fn rename(&self, src: &Path, dst: &Path) -> std::io::Result<bool> {
        let mut state = self.state.lock();
        state.check_fault(FaultOp::Rename, src)?;

        let Some(contents) = state.files.remove(src) else {
            return Ok(false);
        };
        if let Some(parent) = dst.parent() {
            state.add_dir_with_parents(parent);
        }
        state.files.insert(dst.to_path_buf(), contents);
        Ok(true)
    }

    fn mkdirs(&self, path: &Path, create_parents: bool) -> std::io::Result<bool> {
        let mut state = self.state.lock();
        if state.files.contains_key(path) {
            return Err(std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("{} is a file", path.display()),
            ));
        }
        if create_parents {
            state.add_dir_with_parents(path);
        } else {
            let parent_exists = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => state.dirs.contains(parent),
                _ => true,
            };
            if !parent_exists {
                return Err(std::io::Error::new(
                    ErrorKind::NotFound,
                    format!("parent of {} does not exist", path.display()),
                ));
            }
            state.dirs.insert(path.to_path_buf());
        }
        Ok(true)
    }

    fn list(&self, dir: &Path) -> std::io::Result<Vec<String>> {
        let state = self.state.lock();
        let children = state.files.keys().chain(state.dirs.iter()).filter_map(|p| {
            if p.parent() == Some(dir) {
                p.file_name().and_then(|n| n.to_str()).map(str::to_string)
            } else {
                None
            }
        });
        let names: BTreeSet<String> = children.collect();
        Ok(names.into_iter().collect())
    }

    fn close(&self) -> std::io::Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// Append handle writing straight into the shared file map.
struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
    path: PathBuf,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.state.lock();
        let limit = state.size_limits.get(&self.path).copied();
        let Some(contents) = state.files.get_mut(&self.path) else {
            return Err(std::io::Error::new(
                ErrorKind::NotFound,
                format!("{} was removed while open", self.path.display()),
            ));
        };

        let accepted = match limit {
            Some(limit) => buf.len().min(limit.saturating_sub(contents.len())),
            None => buf.len(),
        };
        if accepted == 0 && !buf.is_empty() {
            return Err(std::io::Error::other(format!(
                "no space left for {}",
                self.path.display()
            )));
        }
        contents.extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SegmentSink for MemorySink {
    fn sync(&mut self, _mode: WalSyncMode) -> std::io::Result<()> {
        self.state.lock().check_fault(FaultOp::Sync, &self.path)
    }
}
