//! Line codec for operation records.
//!
//! A segment is a sequence of newline-terminated JSON records. A final line
//! without its newline is the torn tail of an interrupted write and ends the
//! segment's valid prefix; a terminated line that fails to decode is
//! corruption.

use std::io::BufRead;
use std::path::PathBuf;

use crate::error::{JournalError, Result, StoreOp};
use crate::record::OperationRecord;

/// Encode a record as one newline-terminated line.
///
/// # Errors
///
/// Returns [`JournalError::Encode`] if serialization fails.
pub fn encode(record: &OperationRecord) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(record).map_err(|source| JournalError::Encode {
        transaction_id: record.transaction_id,
        source,
    })?;
    line.push(b'\n');
    Ok(line)
}

/// Result of decoding the next record from a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A complete record.
    Record(OperationRecord),
    /// Clean end of segment at a record boundary.
    End,
    /// End of segment after an unterminated line of `bytes` bytes.
    TruncatedTail {
        /// Length of the discarded tail.
        bytes: usize,
    },
}

/// Streaming decoder over one segment.
pub struct RecordDecoder<R> {
    reader: R,
    path: PathBuf,
    line: u64,
    buf: Vec<u8>,
}

impl<R: BufRead> RecordDecoder<R> {
    /// Create a decoder. `path` is only used in errors.
    pub fn new(reader: R, path: impl Into<PathBuf>) -> Self {
        Self { reader, path: path.into(), line: 0, buf: Vec::new() }
    }

    /// Number of lines consumed so far.
    #[must_use]
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Decode the next record.
    ///
    /// After `End` or `TruncatedTail` further calls return `End`.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Store`] on read failure and
    /// [`JournalError::MalformedRecord`] if a terminated line does not decode.
    pub fn next_record(&mut self) -> Result<DecodeOutcome> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .map_err(JournalError::store(StoreOp::Read, &self.path))?;
            if read == 0 {
                return Ok(DecodeOutcome::End);
            }
            self.line += 1;

            let Some((&b'\n', body)) = self.buf.split_last() else {
                return Ok(DecodeOutcome::TruncatedTail { bytes: read });
            };
            if body.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let record = serde_json::from_slice(body).map_err(|source| {
                JournalError::MalformedRecord { path: self.path.clone(), line: self.line, source }
            })?;
            tracing::debug!(path = %self.path.display(), line = self.line, "Decoded record");
            return Ok(DecodeOutcome::Record(record));
        }
    }
}
