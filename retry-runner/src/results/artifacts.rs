// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;

/// A reference to a saved log artifact (logcat capture, screenshot, trace,
/// ...). The artifact itself is owned by the harness's log-saving layer; the
/// retry core only carries the reference along with results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFile {
    /// Path to the saved artifact.
    pub path: Utf8PathBuf,

    /// URL the artifact was uploaded to, if any.
    pub url: Option<String>,
}

impl LogFile {
    /// Creates a new log file reference from a local path.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            url: None,
        }
    }

    /// Sets the upload URL for this artifact.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}
