// Copyright 2024 The Metalog Authors
// SPDX-License-Identifier: Apache-2.0

//! Segment store trait definition.
//!
//! The journal never touches the filesystem directly. Every byte it reads or
//! writes goes through a [`SegmentStore`], which exposes the small set of
//! blob operations a segmented log needs: create, open, exists, delete,
//! rename, mkdirs and list.

mod local;
mod memory;

use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

use metalog_core::WalSyncMode;

pub use local::LocalSegmentStore;
pub use memory::{FaultOp, MemorySegmentStore};

/// Writable handle to a newly created segment.
pub trait SegmentSink: Write + Send {
    /// Force written bytes to durable storage according to `mode`.
    ///
    /// Callers flush any user-space buffering before calling this.
    fn sync(&mut self, mode: WalSyncMode) -> std::io::Result<()>;
}

/// Byte-level storage of named segment blobs.
///
/// All failures are reported as [`std::io::Error`]; the journal decides which
/// of them are fatal.
pub trait SegmentStore: Send + Sync + fmt::Debug {
    /// Returns true if a file or directory exists at `path`.
    fn exists(&self, path: &Path) -> std::io::Result<bool>;

    /// Open an existing file for reading.
    fn open(&self, path: &Path) -> std::io::Result<Box<dyn Read + Send>>;

    /// Create (or truncate) a file for appending.
    fn create(&self, path: &Path) -> std::io::Result<Box<dyn SegmentSink>>;

    /// Delete a file or directory.
    ///
    /// Returns `Ok(false)` if nothing existed at `path`.
    fn delete(&self, path: &Path, recursive: bool) -> std::io::Result<bool>;

    /// Rename `src` to `dst`.
    ///
    /// Returns `Ok(false)` if `src` does not exist.
    fn rename(&self, src: &Path, dst: &Path) -> std::io::Result<bool>;

    /// Create a directory.
    ///
    /// Returns `Ok(true)` if the directory exists after the call.
    fn mkdirs(&self, path: &Path, create_parents: bool) -> std::io::Result<bool>;

    /// List the entry names directly under `dir`.
    ///
    /// A missing directory lists as empty.
    fn list(&self, dir: &Path) -> std::io::Result<Vec<String>>;

    /// Release any resources held by the store.
    fn close(&self) -> std::io::Result<()> {
        Ok(())
    }
}
