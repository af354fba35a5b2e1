// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by retry-runner.

use std::error::Error;
use thiserror::Error;

/// An error that occurred while forwarding results to a listener.
///
/// Listener errors are never swallowed by the forwarding layer: they propagate
/// to the invocation driver, which owns the abort-vs-continue policy.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportError {
    /// An I/O error occurred while writing results.
    #[error("error writing test results")]
    Io(#[from] std::io::Error),

    /// A listener-specific error occurred.
    #[error("error reported by listener")]
    Listener(#[source] Box<dyn Error + Send + Sync>),
}

impl ReportError {
    /// Wraps an arbitrary listener error.
    pub fn listener(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Listener(err.into())
    }
}

/// An error that occurred while recovering device state between retry
/// attempts.
#[derive(Debug, Error)]
#[error("failed to recover device state before retry: {message}")]
pub struct RecoveryError {
    message: String,
    #[source]
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl RecoveryError {
    /// Creates a new recovery error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new recovery error with the given message and source.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}
