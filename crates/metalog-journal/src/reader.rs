//! Journal replay for recovery.
//!
//! Replay reads the completed segments from a starting sequence, then the
//! active segment, and hands every record to an [`Applier`] in order. It
//! never modifies segments.

use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::applier::{apply, Applier};
use crate::codec::{DecodeOutcome, RecordDecoder};
use crate::error::{JournalError, Result, StoreOp};
use crate::lifecycle::{completed_dir, segment_file_name, SegmentLifecycle};
use crate::record::OperationRecord;
use crate::store::SegmentStore;
use crate::writer::OpenOptions;
use crate::{SegmentSequence, TransactionId};

/// Summary of a replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Highest transaction id applied, or 0 if none.
    pub last_transaction_id: TransactionId,
    /// Number of records handed to the applier.
    pub operations_applied: u64,
    /// Number of segments read, including the active one.
    pub segments_replayed: usize,
    /// Number of segments that ended in an unterminated record.
    pub truncated_tails: usize,
    /// Sequence replay started from. `None` if there was nothing to replay.
    pub backup_start: Option<SegmentSequence>,
}

impl ReplayReport {
    /// Options that reopen the journal after this replay.
    #[must_use]
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions::from(self)
    }
}

/// Records decoded from one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentContents {
    /// Complete records in file order.
    pub records: Vec<OperationRecord>,
    /// Length of the unterminated tail, if the segment has one.
    pub truncated_tail: Option<usize>,
}

/// Replay the journal whose active segment is `active_path`.
///
/// Completed segments `start_sequence, start_sequence + 1, ...` are read
/// until the first missing number, followed by the active segment.
///
/// # Errors
///
/// Returns a store error if a segment cannot be read,
/// [`JournalError::MalformedRecord`] for a corrupt record,
/// [`JournalError::Sequencing`] if transaction ids are not consecutive, and
/// [`JournalError::Apply`] if the applier rejects an operation.
pub fn replay<A: Applier + ?Sized>(
    store: &dyn SegmentStore,
    active_path: &Path,
    start_sequence: SegmentSequence,
    applier: &mut A,
) -> Result<ReplayReport> {
    if !exists(store, active_path)? {
        info!(path = %active_path.display(), "No journal to replay");
        return Ok(ReplayReport::default());
    }

    let mut replayer = Replayer { store, applier, report: ReplayReport::default() };
    replayer.report.backup_start = Some(start_sequence);

    let completed = completed_dir(active_path);
    if exists(store, &completed)? {
        let mut sequence = start_sequence;
        loop {
            let path = completed.join(segment_file_name(sequence));
            if !exists(store, &path)? {
                break;
            }
            replayer.replay_segment(&path)?;
            sequence += 1;
        }
    }
    replayer.replay_segment(active_path)?;

    let report = replayer.report;
    info!(
        last_transaction_id = report.last_transaction_id,
        operations = report.operations_applied,
        segments = report.segments_replayed,
        truncated_tails = report.truncated_tails,
        "Journal replay complete"
    );
    Ok(report)
}

/// Replay the journal managed by `lifecycle`.
///
/// # Errors
///
/// See [`replay`].
pub fn replay_lifecycle<A: Applier + ?Sized>(
    lifecycle: &SegmentLifecycle,
    start_sequence: SegmentSequence,
    applier: &mut A,
) -> Result<ReplayReport> {
    replay(lifecycle.store().as_ref(), lifecycle.active_path(), start_sequence, applier)
}

/// Decode every complete record of one segment without applying it.
///
/// # Errors
///
/// Returns a store error if the segment cannot be read or
/// [`JournalError::MalformedRecord`] for a corrupt record.
pub fn read_segment(store: &dyn SegmentStore, path: &Path) -> Result<SegmentContents> {
    let mut decoder = open_decoder(store, path)?;
    let mut contents = SegmentContents::default();
    loop {
        match decoder.next_record()? {
            DecodeOutcome::Record(record) => contents.records.push(record),
            DecodeOutcome::End => break,
            DecodeOutcome::TruncatedTail { bytes } => {
                contents.truncated_tail = Some(bytes);
                break;
            }
        }
    }
    Ok(contents)
}

struct Replayer<'a, A: ?Sized> {
    store: &'a dyn SegmentStore,
    applier: &'a mut A,
    report: ReplayReport,
}

impl<A: Applier + ?Sized> Replayer<'_, A> {
    fn replay_segment(&mut self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "Replaying segment");
        let mut decoder = open_decoder(self.store, path)?;
        let mut applied = 0u64;

        loop {
            match decoder.next_record()? {
                DecodeOutcome::Record(record) => {
                    self.check_sequence(path, record.transaction_id)?;
                    apply(&mut *self.applier, &record)?;
                    self.report.last_transaction_id = record.transaction_id;
                    self.report.operations_applied += 1;
                    applied += 1;
                }
                DecodeOutcome::End => break,
                DecodeOutcome::TruncatedTail { bytes } => {
                    warn!(
                        path = %path.display(),
                        line = decoder.line(),
                        bytes,
                        "Truncated record at end of segment, ignoring"
                    );
                    self.report.truncated_tails += 1;
                    break;
                }
            }
        }

        self.report.segments_replayed += 1;
        debug!(path = %path.display(), applied, "Segment replayed");
        Ok(())
    }

    /// The first id only has to be positive; every later id must follow its
    /// predecessor by exactly one.
    fn check_sequence(&self, path: &Path, found: TransactionId) -> Result<()> {
        let previous = self.report.last_transaction_id;
        let in_order = if self.report.operations_applied == 0 {
            found > 0
        } else {
            previous.checked_add(1) == Some(found)
        };
        if in_order {
            Ok(())
        } else {
            Err(JournalError::Sequencing { path: path.to_path_buf(), previous, found })
        }
    }
}

fn exists(store: &dyn SegmentStore, path: &Path) -> Result<bool> {
    store.exists(path).map_err(JournalError::store(StoreOp::Exists, path))
}

fn open_decoder(
    store: &dyn SegmentStore,
    path: &Path,
) -> Result<RecordDecoder<BufReader<Box<dyn std::io::Read + Send>>>> {
    let reader = store.open(path).map_err(JournalError::store(StoreOp::Open, path))?;
    Ok(RecordDecoder::new(BufReader::new(reader), PathBuf::from(path)))
}
