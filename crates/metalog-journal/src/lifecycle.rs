//! Segment lifecycle: rotation, backup merge and pruning.
//!
//! The active segment lives at a configured path `P`. Completed segments
//! live in the sibling directory `parent(P)/completed` and are named
//! `<sequence>.segment`, numbered from 0 without gaps.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{JournalError, Result, StoreOp};
use crate::store::SegmentStore;
use crate::SegmentSequence;

/// Name of the directory holding completed segments.
pub const COMPLETED_DIR_NAME: &str = "completed";

/// Extension of completed segment files.
pub const SEGMENT_EXTENSION: &str = "segment";

/// Returns the completed-segment directory for an active segment path.
#[must_use]
pub fn completed_dir(active_path: &Path) -> PathBuf {
    active_path.parent().unwrap_or_else(|| Path::new("")).join(COMPLETED_DIR_NAME)
}

/// Returns the file name of completed segment `sequence`.
#[must_use]
pub fn segment_file_name(sequence: SegmentSequence) -> String {
    format!("{sequence}.{SEGMENT_EXTENSION}")
}

/// Parses a completed segment file name back into its sequence.
#[must_use]
pub fn parse_segment_name(name: &str) -> Option<SegmentSequence> {
    let stem = name.strip_suffix(SEGMENT_EXTENSION)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Outcome of a tolerant prune.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Sequences that were deleted.
    pub deleted: Vec<SegmentSequence>,
    /// Sequences whose deletion failed.
    pub failed: Vec<SegmentSequence>,
}

impl PruneReport {
    /// Returns true if no deletion failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Manages the completed segments belonging to one active segment path.
#[derive(Debug, Clone)]
pub struct SegmentLifecycle {
    store: Arc<dyn SegmentStore>,
    active_path: PathBuf,
    completed_dir: PathBuf,
}

impl SegmentLifecycle {
    /// Create a lifecycle manager for the active segment at `active_path`.
    pub fn new(store: Arc<dyn SegmentStore>, active_path: impl Into<PathBuf>) -> Self {
        let active_path = active_path.into();
        let completed_dir = completed_dir(&active_path);
        Self { store, active_path, completed_dir }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SegmentStore> {
        &self.store
    }

    /// Path of the active segment.
    #[must_use]
    pub fn active_path(&self) -> &Path {
        &self.active_path
    }

    /// Directory of completed segments.
    #[must_use]
    pub fn completed_dir(&self) -> &Path {
        &self.completed_dir
    }

    /// Path of completed segment `sequence`.
    #[must_use]
    pub fn segment_path(&self, sequence: SegmentSequence) -> PathBuf {
        self.completed_dir.join(segment_file_name(sequence))
    }

    /// Sorted sequences of every completed segment on disk.
    ///
    /// # Errors
    ///
    /// Returns a store error if the completed directory cannot be listed.
    pub fn completed_sequences(&self) -> Result<Vec<SegmentSequence>> {
        let names = self
            .store
            .list(&self.completed_dir)
            .map_err(JournalError::store(StoreOp::List, &self.completed_dir))?;
        let mut sequences: Vec<_> =
            names.iter().filter_map(|name| parse_segment_name(name)).collect();
        sequences.sort_unstable();
        Ok(sequences)
    }

    /// One past the highest completed sequence, or 0 if there are none.
    ///
    /// # Errors
    ///
    /// Returns a store error if the completed directory cannot be listed.
    pub fn next_sequence(&self) -> Result<SegmentSequence> {
        Ok(self.completed_sequences()?.last().map_or(0, |last| last + 1))
    }

    /// Create the completed directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a store error if the directory cannot be created.
    pub fn ensure_completed_dir(&self) -> Result<()> {
        let dir = &self.completed_dir;
        if !self.exists(dir)? {
            self.store.mkdirs(dir, true).map_err(JournalError::store(StoreOp::Mkdirs, dir))?;
            info!(path = %dir.display(), "Created completed segment directory");
        }
        Ok(())
    }

    /// Delete a leftover active segment before a new one is created.
    ///
    /// # Errors
    ///
    /// Returns a store error if the segment exists and cannot be deleted.
    pub fn remove_stale_active(&self) -> Result<bool> {
        let path = &self.active_path;
        let deleted =
            self.store.delete(path, false).map_err(JournalError::store(StoreOp::Delete, path))?;
        if deleted {
            info!(path = %path.display(), "Deleted stale active segment");
        }
        Ok(deleted)
    }

    /// Move the closed active segment to completed segment `sequence`.
    ///
    /// Returns the path of the new completed segment.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::SegmentExists`] if the target is already
    /// present, or a store error if the rename fails.
    pub fn rotate(&self, sequence: SegmentSequence) -> Result<PathBuf> {
        self.ensure_completed_dir()?;
        let target = self.segment_path(sequence);
        self.rename_segment(&self.active_path, &target)?;
        info!(
            from = %self.active_path.display(),
            to = %target.display(),
            sequence,
            "Rotated active segment"
        );
        Ok(target)
    }

    /// Fold the segments written since a backup image into the front of the
    /// completed sequence.
    ///
    /// Segments `0..backup_start` are deleted, `backup_start..` are renamed
    /// to `0..` for as long as they exist, and the active segment (if any)
    /// becomes the next number. Returns the sequence a new rotation should
    /// use.
    ///
    /// # Errors
    ///
    /// Every deletion or rename failure is returned.
    pub fn merge_backup(&self, backup_start: SegmentSequence) -> Result<SegmentSequence> {
        info!(backup_start, dir = %self.completed_dir.display(), "Merging backup segments");

        for sequence in 0..backup_start {
            self.delete_segment(sequence)?;
        }
        self.ensure_completed_dir()?;

        let mut next = 0;
        loop {
            let source = self.segment_path(backup_start + next);
            if !self.exists(&source)? {
                break;
            }
            if backup_start != 0 {
                self.rename_segment(&source, &self.segment_path(next))?;
            }
            next += 1;
        }

        if self.exists(&self.active_path)? {
            self.rename_segment(&self.active_path, &self.segment_path(next))?;
            next += 1;
        }

        info!(next_sequence = next, "Backup merge complete");
        Ok(next)
    }

    /// Discard the segments recorded after `backup_start` once a newer image
    /// has been confirmed.
    ///
    /// Deletes completed segments from `backup_start` upward while they
    /// exist. Returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Every deletion failure is returned.
    pub fn mark_up_to_date(&self, backup_start: SegmentSequence) -> Result<usize> {
        let mut deleted = 0;
        let mut sequence = backup_start;
        while self.delete_segment(sequence)? {
            deleted += 1;
            sequence += 1;
        }
        info!(backup_start, deleted, "Marked journal up to date");
        Ok(deleted)
    }

    /// Delete completed segments with a sequence below `upper`.
    ///
    /// Missing segments are skipped. Deletion failures are logged and
    /// counted, never returned.
    ///
    /// # Errors
    ///
    /// Returns a store error only if the completed directory cannot be
    /// listed.
    pub fn prune(&self, upper: SegmentSequence) -> Result<PruneReport> {
        let mut report = PruneReport::default();
        for sequence in self.completed_sequences()?.into_iter().take_while(|s| *s < upper) {
            let path = self.segment_path(sequence);
            match self.store.delete(&path, false) {
                Ok(true) => report.deleted.push(sequence),
                Ok(false) => debug!(path = %path.display(), "Segment already gone"),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete completed segment");
                    report.failed.push(sequence);
                }
            }
        }
        if !report.deleted.is_empty() || !report.failed.is_empty() {
            info!(
                upper,
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                "Pruned completed segments"
            );
        }
        Ok(report)
    }

    fn exists(&self, path: &Path) -> Result<bool> {
        self.store.exists(path).map_err(JournalError::store(StoreOp::Exists, path))
    }

    fn delete_segment(&self, sequence: SegmentSequence) -> Result<bool> {
        let path = self.segment_path(sequence);
        let deleted =
            self.store.delete(&path, false).map_err(JournalError::store(StoreOp::Delete, &path))?;
        if deleted {
            info!(path = %path.display(), "Deleted completed segment");
        }
        Ok(deleted)
    }

    fn rename_segment(&self, source: &Path, target: &Path) -> Result<()> {
        if self.exists(target)? {
            return Err(JournalError::SegmentExists { path: target.to_path_buf() });
        }
        let renamed = self
            .store
            .rename(source, target)
            .map_err(JournalError::store(StoreOp::Rename, source))?;
        if !renamed {
            return Err(JournalError::Store {
                op: StoreOp::Rename,
                path: source.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} does not exist", source.display()),
                ),
            });
        }
        debug!(from = %source.display(), to = %target.display(), "Renamed segment");
        Ok(())
    }
}
