//! Journal commands, independent of argument parsing and output.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use metalog_journal::{
    read_segment, replay_lifecycle, Applier, DependencyRecord, OperationType, PruneReport,
    SegmentLifecycle, SegmentStore,
};
use serde::Serialize;
use tracing::info;

type Counted = std::result::Result<(), Infallible>;

/// Applier that only counts operations by kind.
#[derive(Debug, Default)]
pub struct CountingApplier {
    counts: BTreeMap<OperationType, u64>,
}

impl CountingApplier {
    fn bump(&mut self, op_type: OperationType) -> Counted {
        *self.counts.entry(op_type).or_default() += 1;
        Ok(())
    }

    /// Counts keyed by operation name.
    #[must_use]
    pub fn counts(&self) -> BTreeMap<&'static str, u64> {
        self.counts.iter().map(|(op_type, count)| (op_type.as_str(), *count)).collect()
    }
}

impl Applier for CountingApplier {
    type Error = Infallible;

    fn add_block(&mut self, _: i32, _: i32, _: i64, _: i64) -> Counted {
        self.bump(OperationType::AddBlock)
    }

    fn add_checkpoint(&mut self, _: i32, _: i64, _: &str, _: i64) -> Counted {
        self.bump(OperationType::AddCheckpoint)
    }

    fn create_file(&mut self, _: bool, _: &str, _: bool, _: i64, _: i64) -> Counted {
        self.bump(OperationType::CreateFile)
    }

    fn complete_file(&mut self, _: i32, _: i64) -> Counted {
        self.bump(OperationType::CompleteFile)
    }

    fn set_pinned(&mut self, _: i32, _: bool, _: i64) -> Counted {
        self.bump(OperationType::SetPinned)
    }

    fn rename(&mut self, _: i32, _: &str, _: i64) -> Counted {
        self.bump(OperationType::Rename)
    }

    fn delete(&mut self, _: i32, _: bool, _: i64) -> Counted {
        self.bump(OperationType::Delete)
    }

    fn create_raw_table(&mut self, _: i32, _: i32, _: &[u8]) -> Counted {
        self.bump(OperationType::CreateRawTable)
    }

    fn update_raw_table_metadata(&mut self, _: i32, _: &[u8]) -> Counted {
        self.bump(OperationType::UpdateRawTableMetadata)
    }

    fn create_dependency(&mut self, _: &DependencyRecord) -> Counted {
        self.bump(OperationType::CreateDependency)
    }
}

/// Result of `metalog inspect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectSummary {
    /// Operations per kind.
    pub operations: BTreeMap<&'static str, u64>,
    /// Highest transaction id.
    pub last_transaction_id: u64,
    /// Segments read, including the active one.
    pub segments_replayed: usize,
    /// Segments ending in an unterminated record.
    pub truncated_tails: usize,
}

/// Replay the journal into a [`CountingApplier`].
pub fn inspect(
    store: Arc<dyn SegmentStore>,
    active: &Path,
    start: u64,
) -> Result<InspectSummary> {
    let lifecycle = SegmentLifecycle::new(store, active);
    let mut applier = CountingApplier::default();
    let report = replay_lifecycle(&lifecycle, start, &mut applier)
        .with_context(|| format!("Failed to replay journal at {}", active.display()))?;
    Ok(InspectSummary {
        operations: applier.counts(),
        last_transaction_id: report.last_transaction_id,
        segments_replayed: report.segments_replayed,
        truncated_tails: report.truncated_tails,
    })
}

/// Write every record from completed segment `start` onward, then the
/// active segment, as JSON lines. Returns the number of records written.
pub fn dump(
    store: Arc<dyn SegmentStore>,
    active: &Path,
    start: u64,
    out: &mut impl Write,
) -> Result<u64> {
    let lifecycle = SegmentLifecycle::new(store, active);
    let mut segments = Vec::new();
    let mut sequence = start;
    loop {
        let path = lifecycle.segment_path(sequence);
        if !lifecycle.store().exists(&path).context("Failed to check segment")? {
            break;
        }
        segments.push(path);
        sequence += 1;
    }
    if lifecycle.store().exists(active).context("Failed to check active segment")? {
        segments.push(active.to_path_buf());
    }

    let mut written = 0;
    for path in &segments {
        let contents = read_segment(lifecycle.store().as_ref(), path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        for record in &contents.records {
            serde_json::to_writer(&mut *out, record)?;
            writeln!(out)?;
            written += 1;
        }
        if let Some(bytes) = contents.truncated_tail {
            info!(path = %path.display(), bytes, "Skipped truncated tail");
        }
    }
    Ok(written)
}

/// Delete completed segments below `upto`.
pub fn prune(store: Arc<dyn SegmentStore>, active: &Path, upto: u64) -> Result<PruneReport> {
    SegmentLifecycle::new(store, active)
        .prune(upto)
        .with_context(|| format!("Failed to prune segments below {upto}"))
}
