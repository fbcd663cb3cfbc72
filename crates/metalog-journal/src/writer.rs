//! Append-only journal writer.
//!
//! The writer appends operation records to the active segment through a
//! buffered stream. Appends are not durable until [`Journal::flush`], which
//! also rotates the active segment into the completed directory once it has
//! grown past the configured threshold.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use metalog_core::{JournalConfig, WalSyncMode};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::codec;
use crate::error::{JournalError, Result, StoreOp};
use crate::lifecycle::{PruneReport, SegmentLifecycle};
use crate::reader::ReplayReport;
use crate::record::{DependencyRecord, Operation, OperationRecord};
use crate::store::{LocalSegmentStore, SegmentSink, SegmentStore};
use crate::{SegmentSequence, TransactionId};

/// Options for opening a journal after replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Last transaction id already in the journal. The next append gets
    /// `resume_transaction_id + 1`.
    pub resume_transaction_id: TransactionId,
    /// First completed segment written after the last image, if replay
    /// found one. Segments before it are dropped and the rest renumbered
    /// from 0 before the new active segment is created.
    pub backup_start: Option<SegmentSequence>,
}

impl OpenOptions {
    /// Resume after `transaction_id` with no backup merge.
    #[must_use]
    pub fn resume_from(transaction_id: TransactionId) -> Self {
        Self { resume_transaction_id: transaction_id, backup_start: None }
    }

    /// Merge backup segments starting at `sequence` on open.
    #[must_use]
    pub fn with_backup_start(mut self, sequence: SegmentSequence) -> Self {
        self.backup_start = Some(sequence);
        self
    }
}

impl From<&ReplayReport> for OpenOptions {
    fn from(report: &ReplayReport) -> Self {
        Self {
            resume_transaction_id: report.last_transaction_id,
            backup_start: report.backup_start,
        }
    }
}

/// Snapshot of the writer's transaction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionIds {
    /// Id of the last appended record.
    pub current: TransactionId,
    /// Id of the last record known to be durable.
    pub flushed: TransactionId,
}

/// Buffered stream over the active segment.
struct SegmentOutput {
    path: PathBuf,
    writer: BufWriter<Box<dyn SegmentSink>>,
    bytes_written: u64,
}

impl SegmentOutput {
    fn create(store: &dyn SegmentStore, path: &Path, buffer_size: usize) -> Result<Self> {
        let sink = store.create(path).map_err(JournalError::store(StoreOp::Create, path))?;
        info!(path = %path.display(), "Created active segment");
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::with_capacity(buffer_size, sink),
            bytes_written: 0,
        })
    }

    fn write_line(&mut self, line: &[u8]) -> Result<()> {
        self.writer.write_all(line).map_err(JournalError::store(StoreOp::Write, &self.path))?;
        self.bytes_written += line.len() as u64;
        Ok(())
    }

    fn sync(&mut self, mode: WalSyncMode) -> Result<()> {
        self.writer.flush().map_err(JournalError::store(StoreOp::Flush, &self.path))?;
        self.writer.get_mut().sync(mode).map_err(JournalError::store(StoreOp::Sync, &self.path))
    }

    /// Drop the stream without writing out what is still buffered.
    fn abandon(self) {
        let (_sink, unwritten) = self.writer.into_parts();
        if let Ok(bytes) = unwritten {
            if !bytes.is_empty() {
                let path = self.path.display();
                debug!(%path, bytes = bytes.len(), "Discarded buffered bytes");
            }
        }
    }
}

struct WriterState {
    output: Option<SegmentOutput>,
    current_transaction_id: TransactionId,
    flushed_transaction_id: TransactionId,
    next_sequence: SegmentSequence,
    max_segment_size_bytes: u64,
    closed: bool,
    /// Set once a write to the active segment fails. The segment may end in
    /// a partial record, so nothing more is appended to it.
    failed: bool,
}

impl WriterState {
    fn output(&mut self) -> Result<&mut SegmentOutput> {
        if self.failed {
            return Err(JournalError::Failed);
        }
        self.output.as_mut().ok_or(JournalError::Closed)
    }

    /// Stop writing after `err` and hand it back.
    fn fail(&mut self, err: JournalError) -> JournalError {
        error!(error = %err, "Journal write failed, rejecting further writes");
        if let Some(output) = self.output.take() {
            output.abandon();
        }
        self.failed = true;
        err
    }
}

/// The journal writer.
///
/// Thread-safe: one mutex serializes appends, flushes, rotation and close,
/// so transaction ids are assigned without gaps or duplicates.
pub struct Journal {
    config: JournalConfig,
    /// `None` for an inactive journal.
    lifecycle: Option<SegmentLifecycle>,
    state: Mutex<WriterState>,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.path())
            .field("transaction_ids", &self.transaction_ids())
            .finish_non_exhaustive()
    }
}

impl Journal {
    /// Open the journal at `config.path`.
    ///
    /// Any leftover active segment is deleted (after being folded into the
    /// completed segments when `options.backup_start` is set) and a new
    /// empty one is created.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup merge fails or the new active segment
    /// cannot be created.
    pub fn open(
        config: JournalConfig,
        store: Arc<dyn SegmentStore>,
        options: OpenOptions,
    ) -> Result<Self> {
        let lifecycle = SegmentLifecycle::new(store, config.path.clone());
        info!(
            path = %config.path.display(),
            resume_transaction_id = options.resume_transaction_id,
            backup_start = ?options.backup_start,
            "Opening journal"
        );

        if let Some(backup_start) = options.backup_start {
            lifecycle.merge_backup(backup_start)?;
        }
        lifecycle.remove_stale_active()?;
        lifecycle.ensure_completed_dir()?;
        let next_sequence = lifecycle.next_sequence()?;

        let output = SegmentOutput::create(
            lifecycle.store().as_ref(),
            lifecycle.active_path(),
            config.buffer_size,
        )?;

        let state = WriterState {
            output: Some(output),
            current_transaction_id: options.resume_transaction_id,
            flushed_transaction_id: options.resume_transaction_id,
            next_sequence,
            max_segment_size_bytes: config.max_segment_size_bytes,
            closed: false,
            failed: false,
        };
        Ok(Self { config, lifecycle: Some(lifecycle), state: Mutex::new(state) })
    }

    /// Open the journal on the local filesystem.
    ///
    /// # Errors
    ///
    /// See [`Journal::open`].
    pub fn open_local(config: JournalConfig, options: OpenOptions) -> Result<Self> {
        Self::open(config, Arc::new(LocalSegmentStore::new()), options)
    }

    /// A journal that accepts every call and writes nothing.
    #[must_use]
    pub fn inactive() -> Self {
        let config = JournalConfig::default();
        let state = WriterState {
            output: None,
            current_transaction_id: 0,
            flushed_transaction_id: 0,
            next_sequence: 0,
            max_segment_size_bytes: config.max_segment_size_bytes,
            closed: false,
            failed: false,
        };
        Self { config, lifecycle: None, state: Mutex::new(state) }
    }

    /// Returns true if this journal performs no I/O.
    #[must_use]
    pub fn is_inactive(&self) -> bool {
        self.lifecycle.is_none()
    }

    /// Path of the active segment, if active.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.lifecycle.as_ref().map(SegmentLifecycle::active_path)
    }

    /// The segment lifecycle manager, if active.
    #[must_use]
    pub fn lifecycle(&self) -> Option<&SegmentLifecycle> {
        self.lifecycle.as_ref()
    }

    /// Append an operation to the buffered active segment.
    ///
    /// Returns the assigned transaction id, or `None` if the journal is
    /// inactive. The record is not durable until [`Journal::flush`].
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] after close, or an encode or store
    /// error. A failed append does not consume a transaction id. After a
    /// store error every later append fails with [`JournalError::Failed`].
    pub fn append(&self, operation: Operation) -> Result<Option<TransactionId>> {
        if self.is_inactive() {
            return Ok(None);
        }

        let mut state = self.state.lock();
        if state.closed {
            return Err(JournalError::Closed);
        }

        let transaction_id = state.current_transaction_id + 1;
        let op_type = operation.op_type();
        let line = codec::encode(&OperationRecord::new(transaction_id, operation))?;
        let written = state.output()?.write_line(&line);
        if let Err(err) = written {
            return Err(state.fail(err));
        }
        state.current_transaction_id = transaction_id;

        debug!(transaction_id, %op_type, bytes = line.len(), "Appended record");
        Ok(Some(transaction_id))
    }

    /// Flush buffered records, sync them, and rotate if the active segment
    /// exceeds the size threshold.
    ///
    /// # Errors
    ///
    /// Returns a store error if flushing, syncing or rotating fails. Nothing
    /// is retried and the journal rejects further writes.
    pub fn flush(&self) -> Result<()> {
        if self.is_inactive() {
            return Ok(());
        }

        let mut state = self.state.lock();
        if state.closed {
            return Err(JournalError::Closed);
        }

        let synced = state.output()?.sync(self.config.sync_mode);
        if let Err(err) = synced {
            return Err(state.fail(err));
        }
        state.flushed_transaction_id = state.current_transaction_id;

        let size = state.output()?.bytes_written;
        if size > state.max_segment_size_bytes {
            info!(
                size,
                max_segment_size_bytes = state.max_segment_size_bytes,
                "Active segment reached size threshold"
            );
            if let Err(err) = self.rotate_locked(&mut state) {
                return Err(state.fail(err));
            }
        }
        Ok(())
    }

    /// Flush and move the active segment into the completed directory
    /// regardless of its size.
    ///
    /// Returns the completed segment's path, or `None` if inactive.
    ///
    /// # Errors
    ///
    /// Returns a store error if flushing or rotating fails.
    pub fn rotate(&self) -> Result<Option<PathBuf>> {
        if self.is_inactive() {
            return Ok(None);
        }

        let mut state = self.state.lock();
        if state.closed {
            return Err(JournalError::Closed);
        }
        let synced = state.output()?.sync(self.config.sync_mode);
        if let Err(err) = synced {
            return Err(state.fail(err));
        }
        state.flushed_transaction_id = state.current_transaction_id;
        self.rotate_locked(&mut state).map_err(|err| state.fail(err))
    }

    fn rotate_locked(&self, state: &mut WriterState) -> Result<Option<PathBuf>> {
        let Some(lifecycle) = &self.lifecycle else {
            return Ok(None);
        };

        // The stream is closed before the rename.
        let mut output = state.output.take().ok_or(JournalError::Closed)?;
        let synced = output.sync(self.config.sync_mode);
        output.abandon();
        synced?;

        let completed = lifecycle.rotate(state.next_sequence)?;
        state.next_sequence += 1;
        state.output = Some(SegmentOutput::create(
            lifecycle.store().as_ref(),
            lifecycle.active_path(),
            self.config.buffer_size,
        )?);
        Ok(Some(completed))
    }

    /// Flush, close the active stream and release the store.
    ///
    /// Idempotent. Appends after close fail with [`JournalError::Closed`].
    /// The store is released even when the final flush fails.
    ///
    /// # Errors
    ///
    /// Returns a store error if the final flush or store close fails.
    pub fn close(&self) -> Result<()> {
        let Some(lifecycle) = &self.lifecycle else {
            return Ok(());
        };

        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }
        state.closed = true;

        let mut synced = Ok(());
        if let Some(mut output) = state.output.take() {
            synced = output.sync(self.config.sync_mode);
            output.abandon();
            if synced.is_ok() {
                state.flushed_transaction_id = state.current_transaction_id;
            }
        }
        let released = lifecycle
            .store()
            .close()
            .map_err(JournalError::store(StoreOp::Close, lifecycle.active_path()));
        synced?;
        released?;

        info!(
            path = %lifecycle.active_path().display(),
            transaction_id = state.current_transaction_id,
            "Closed journal"
        );
        Ok(())
    }

    /// Snapshot of the current and flushed transaction ids.
    #[must_use]
    pub fn transaction_ids(&self) -> TransactionIds {
        let state = self.state.lock();
        TransactionIds {
            current: state.current_transaction_id,
            flushed: state.flushed_transaction_id,
        }
    }

    /// Override the rotation threshold.
    pub fn set_max_segment_size(&self, bytes: u64) {
        self.state.lock().max_segment_size_bytes = bytes;
    }

    /// Delete completed segments below `upper`, tolerating failures.
    ///
    /// # Errors
    ///
    /// Returns a store error only if the completed directory cannot be
    /// listed.
    pub fn delete_completed(&self, upper: SegmentSequence) -> Result<PruneReport> {
        let Some(lifecycle) = &self.lifecycle else {
            return Ok(PruneReport::default());
        };
        let _state = self.state.lock();
        lifecycle.prune(upper)
    }

    /// Append [`Operation::AddBlock`].
    ///
    /// # Errors
    ///
    /// See [`Journal::append`].
    pub fn add_block(
        &self,
        file_id: i32,
        block_index: i32,
        block_length: i64,
        op_time_ms: i64,
    ) -> Result<Option<TransactionId>> {
        self.append(Operation::AddBlock { file_id, block_index, block_length, op_time_ms })
    }

    /// Append [`Operation::AddCheckpoint`].
    ///
    /// # Errors
    ///
    /// See [`Journal::append`].
    pub fn add_checkpoint(
        &self,
        file_id: i32,
        length: i64,
        checkpoint_path: &str,
        op_time_ms: i64,
    ) -> Result<Option<TransactionId>> {
        self.append(Operation::AddCheckpoint {
            file_id,
            length,
            path: checkpoint_path.to_string(),
            op_time_ms,
        })
    }

    /// Append [`Operation::CreateFile`].
    ///
    /// # Errors
    ///
    /// See [`Journal::append`].
    pub fn create_file(
        &self,
        recursive: bool,
        path: &str,
        directory: bool,
        block_size_byte: i64,
        creation_time_ms: i64,
    ) -> Result<Option<TransactionId>> {
        self.append(Operation::CreateFile {
            recursive,
            path: path.to_string(),
            directory,
            block_size_byte,
            creation_time_ms,
        })
    }

    /// Append [`Operation::CompleteFile`].
    ///
    /// # Errors
    ///
    /// See [`Journal::append`].
    pub fn complete_file(&self, file_id: i32, op_time_ms: i64) -> Result<Option<TransactionId>> {
        self.append(Operation::CompleteFile { file_id, op_time_ms })
    }

    /// Append [`Operation::SetPinned`].
    ///
    /// # Errors
    ///
    /// See [`Journal::append`].
    pub fn set_pinned(
        &self,
        file_id: i32,
        pinned: bool,
        op_time_ms: i64,
    ) -> Result<Option<TransactionId>> {
        self.append(Operation::SetPinned { file_id, pinned, op_time_ms })
    }

    /// Append [`Operation::Rename`].
    ///
    /// # Errors
    ///
    /// See [`Journal::append`].
    pub fn rename(
        &self,
        file_id: i32,
        dst_path: &str,
        op_time_ms: i64,
    ) -> Result<Option<TransactionId>> {
        self.append(Operation::Rename { file_id, dst_path: dst_path.to_string(), op_time_ms })
    }

    /// Append [`Operation::Delete`].
    ///
    /// # Errors
    ///
    /// See [`Journal::append`].
    pub fn delete(
        &self,
        file_id: i32,
        recursive: bool,
        op_time_ms: i64,
    ) -> Result<Option<TransactionId>> {
        self.append(Operation::Delete { file_id, recursive, op_time_ms })
    }

    /// Append [`Operation::CreateRawTable`].
    ///
    /// # Errors
    ///
    /// See [`Journal::append`].
    pub fn create_raw_table(
        &self,
        table_id: i32,
        columns: i32,
        metadata: &[u8],
    ) -> Result<Option<TransactionId>> {
        self.append(Operation::CreateRawTable { table_id, columns, metadata: metadata.to_vec() })
    }

    /// Append [`Operation::UpdateRawTableMetadata`].
    ///
    /// # Errors
    ///
    /// See [`Journal::append`].
    pub fn update_raw_table_metadata(
        &self,
        table_id: i32,
        metadata: &[u8],
    ) -> Result<Option<TransactionId>> {
        self.append(Operation::UpdateRawTableMetadata { table_id, metadata: metadata.to_vec() })
    }

    /// Append [`Operation::CreateDependency`].
    ///
    /// # Errors
    ///
    /// See [`Journal::append`].
    pub fn create_dependency(&self, dependency: DependencyRecord) -> Result<Option<TransactionId>> {
        self.append(Operation::CreateDependency(dependency))
    }
}
