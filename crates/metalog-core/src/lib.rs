// Copyright 2024 The Metalog Authors
// SPDX-License-Identifier: Apache-2.0

//! Core types and utilities for the metalog metadata journal.
//!
//! This crate provides the building blocks shared by the journal and the
//! operator tooling:
//! - Configuration management (journal placement, rotation, sync, logging)
//! - Error types for configuration and process setup

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;

pub use config::{Config, JournalConfig, LogFormat, LoggingConfig, WalSyncMode};
pub use error::{Error, Result};
