// Copyright 2024 The Metalog Authors
// SPDX-License-Identifier: Apache-2.0

//! Metadata journal for the storage master.
//!
//! Every namespace mutation is appended to a write-ahead journal before it is
//! acknowledged. On restart the journal is replayed into an [`Applier`] to
//! rebuild the in-memory metadata.
//!
//! # Layout
//!
//! - The active segment lives at the configured path, e.g. `journal/log.data`.
//! - Full segments are rotated into `journal/completed/<n>.segment`, numbered
//!   from 0.
//!
//! Each segment holds newline-terminated JSON records with strictly
//! consecutive transaction ids. An unterminated final line is the tail of an
//! interrupted write and is ignored on replay.
//!
//! # Example
//!
//! ```ignore
//! use metalog_journal::{replay, Journal, OpenOptions};
//!
//! // On startup: rebuild state, then reopen for writing
//! let report = replay(store.as_ref(), &config.path, image_sequence, &mut namespace)?;
//! let journal = Journal::open(config, store, report.open_options())?;
//!
//! // Log a mutation and make it durable
//! journal.create_file(false, "/data/a", false, 64 << 20, now_ms)?;
//! journal.flush()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod applier;
pub mod codec;
pub mod error;
pub mod lifecycle;
pub mod reader;
pub mod record;
pub mod store;
pub mod writer;

pub use applier::{apply, Applier};
pub use codec::{DecodeOutcome, RecordDecoder};
pub use error::{JournalError, Result, StoreOp};
pub use lifecycle::{PruneReport, SegmentLifecycle};
pub use reader::{read_segment, replay, replay_lifecycle, ReplayReport, SegmentContents};
pub use record::{DependencyRecord, DependencyType, Operation, OperationRecord, OperationType};
pub use store::{FaultOp, LocalSegmentStore, MemorySegmentStore, SegmentSink, SegmentStore};
pub use writer::{Journal, OpenOptions, TransactionIds};

/// Transaction id of a journaled operation. Ids start at 1.
pub type TransactionId = u64;

/// Sequence number of a completed segment.
pub type SegmentSequence = u64;
