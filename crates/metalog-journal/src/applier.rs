//! The metadata state machine that replayed operations are applied to.

use crate::error::{JournalError, Result};
use crate::record::{DependencyRecord, Operation, OperationRecord};

/// Receives decoded operations in transaction order.
///
/// Implementations own the namespace, block map and lineage state. An error
/// from any method aborts replay.
pub trait Applier {
    /// Error reported when an operation cannot be applied.
    type Error: std::error::Error + Send + Sync + 'static;

    /// A block was added to a file.
    fn add_block(
        &mut self,
        file_id: i32,
        block_index: i32,
        block_length: i64,
        op_time_ms: i64,
    ) -> std::result::Result<(), Self::Error>;

    /// A file was checkpointed to `checkpoint_path`.
    fn add_checkpoint(
        &mut self,
        file_id: i32,
        length: i64,
        checkpoint_path: &str,
        op_time_ms: i64,
    ) -> std::result::Result<(), Self::Error>;

    /// A file or directory was created.
    fn create_file(
        &mut self,
        recursive: bool,
        path: &str,
        directory: bool,
        block_size_byte: i64,
        creation_time_ms: i64,
    ) -> std::result::Result<(), Self::Error>;

    /// A file was completed.
    fn complete_file(&mut self, file_id: i32, op_time_ms: i64)
        -> std::result::Result<(), Self::Error>;

    /// A file's pinned flag changed.
    fn set_pinned(
        &mut self,
        file_id: i32,
        pinned: bool,
        op_time_ms: i64,
    ) -> std::result::Result<(), Self::Error>;

    /// A file was renamed to `dst_path`.
    fn rename(
        &mut self,
        file_id: i32,
        dst_path: &str,
        op_time_ms: i64,
    ) -> std::result::Result<(), Self::Error>;

    /// A file was deleted.
    fn delete(
        &mut self,
        file_id: i32,
        recursive: bool,
        op_time_ms: i64,
    ) -> std::result::Result<(), Self::Error>;

    /// A raw table was created.
    fn create_raw_table(
        &mut self,
        table_id: i32,
        columns: i32,
        metadata: &[u8],
    ) -> std::result::Result<(), Self::Error>;

    /// A raw table's metadata was replaced.
    fn update_raw_table_metadata(
        &mut self,
        table_id: i32,
        metadata: &[u8],
    ) -> std::result::Result<(), Self::Error>;

    /// A lineage dependency was registered.
    fn create_dependency(
        &mut self,
        dependency: &DependencyRecord,
    ) -> std::result::Result<(), Self::Error>;
}

/// Dispatch one record to the matching [`Applier`] method.
///
/// # Errors
///
/// Wraps an applier failure into [`JournalError::Apply`] with the record's
/// transaction id and operation kind.
pub fn apply<A: Applier + ?Sized>(applier: &mut A, record: &OperationRecord) -> Result<()> {
    let outcome = match &record.operation {
        Operation::AddBlock { file_id, block_index, block_length, op_time_ms } => {
            applier.add_block(*file_id, *block_index, *block_length, *op_time_ms)
        }
        Operation::AddCheckpoint { file_id, length, path, op_time_ms } => {
            applier.add_checkpoint(*file_id, *length, path, *op_time_ms)
        }
        Operation::CreateFile { recursive, path, directory, block_size_byte, creation_time_ms } => {
            applier.create_file(*recursive, path, *directory, *block_size_byte, *creation_time_ms)
        }
        Operation::CompleteFile { file_id, op_time_ms } => {
            applier.complete_file(*file_id, *op_time_ms)
        }
        Operation::SetPinned { file_id, pinned, op_time_ms } => {
            applier.set_pinned(*file_id, *pinned, *op_time_ms)
        }
        Operation::Rename { file_id, dst_path, op_time_ms } => {
            applier.rename(*file_id, dst_path, *op_time_ms)
        }
        Operation::Delete { file_id, recursive, op_time_ms } => {
            applier.delete(*file_id, *recursive, *op_time_ms)
        }
        Operation::CreateRawTable { table_id, columns, metadata } => {
            applier.create_raw_table(*table_id, *columns, metadata)
        }
        Operation::UpdateRawTableMetadata { table_id, metadata } => {
            applier.update_raw_table_metadata(*table_id, metadata)
        }
        Operation::CreateDependency(dependency) => applier.create_dependency(dependency),
    };

    outcome.map_err(|source| JournalError::Apply {
        transaction_id: record.transaction_id,
        op_type: record.op_type(),
        source: Box::new(source),
    })
}
