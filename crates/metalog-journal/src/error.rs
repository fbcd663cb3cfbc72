//! Error types for journal operations.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::record::OperationType;
use crate::TransactionId;

/// Result type for journal operations.
pub type Result<T> = std::result::Result<T, JournalError>;

/// Segment store operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    /// Checking whether a path exists.
    Exists,
    /// Opening a segment for reading.
    Open,
    /// Reading bytes from an open segment.
    Read,
    /// Creating a segment.
    Create,
    /// Writing bytes to the active segment.
    Write,
    /// Flushing buffered bytes to the store.
    Flush,
    /// Syncing flushed bytes to durable storage.
    Sync,
    /// Deleting a segment.
    Delete,
    /// Renaming a segment.
    Rename,
    /// Creating a directory.
    Mkdirs,
    /// Listing a directory.
    List,
    /// Releasing the store handle.
    Close,
}

impl StoreOp {
    /// Returns the operation name used in error messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::Open => "open",
            Self::Read => "read",
            Self::Create => "create",
            Self::Write => "write",
            Self::Flush => "flush",
            Self::Sync => "sync",
            Self::Delete => "delete",
            Self::Rename => "rename",
            Self::Mkdirs => "mkdirs",
            Self::List => "list",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while writing or replaying the journal.
#[derive(Error, Debug)]
pub enum JournalError {
    /// The segment store failed.
    #[error("segment store {op} failed for {}: {source}", path.display())]
    Store {
        /// The store operation that failed.
        op: StoreOp,
        /// The path the operation targeted.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A complete line in a segment could not be decoded.
    #[error("malformed record at {}:{line}: {source}", path.display())]
    MalformedRecord {
        /// The segment containing the record.
        path: PathBuf,
        /// One-based line number of the record.
        line: u64,
        /// The decode error.
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be encoded.
    #[error("failed to encode transaction {transaction_id}: {source}")]
    Encode {
        /// The transaction id the record would have been assigned.
        transaction_id: TransactionId,
        /// The encode error.
        #[source]
        source: serde_json::Error,
    },

    /// The applier rejected a replayed operation.
    #[error("applier rejected {op_type} at transaction {transaction_id}: {source}")]
    Apply {
        /// Transaction id of the rejected record.
        transaction_id: TransactionId,
        /// Kind of the rejected operation.
        op_type: OperationType,
        /// The applier's error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Transaction ids were repeated, decreased, or skipped.
    #[error("transaction id {found} follows {previous} in {}", path.display())]
    Sequencing {
        /// The segment containing the offending record.
        path: PathBuf,
        /// The previous transaction id, or 0 at the start of replay.
        previous: TransactionId,
        /// The offending transaction id.
        found: TransactionId,
    },

    /// A rotation or merge target already exists.
    #[error("segment {} already exists", path.display())]
    SegmentExists {
        /// The existing segment.
        path: PathBuf,
    },

    /// The journal has been closed.
    #[error("journal is closed")]
    Closed,

    /// An earlier write to the active segment failed. The journal must be
    /// reopened, which replays up to the last complete record.
    #[error("journal stopped after a failed write")]
    Failed,
}

impl JournalError {
    /// Returns a closure mapping an I/O error into [`JournalError::Store`].
    pub(crate) fn store(op: StoreOp, path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Store { op, path: path.to_path_buf(), source }
    }

    /// Returns true if this error reports corrupt segment contents.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::MalformedRecord { .. } | Self::Sequencing { .. })
    }
}
