// Copyright 2024 The Metalog Authors
// SPDX-License-Identifier: Apache-2.0

//! Error types shared across the metalog workspace.

use thiserror::Error;

/// A specialized `Result` type for metalog configuration and setup.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading configuration or preparing the process.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns true if this error came from invalid configuration.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
