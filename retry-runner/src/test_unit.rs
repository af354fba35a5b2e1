// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits for the external collaborators the retry core drives.
//!
//! The executor owns the actual test processes and devices; the retry core
//! only sees them through these narrow seams, so the whole crate is testable
//! with in-memory fakes.

use crate::{
    errors::{RecoveryError, ReportError},
    reporter::ResultListener,
    results::TestCaseId,
};

/// A unit of tests the executor can run, and the retry engine can decide to
/// run again.
pub trait RetriableTestUnit {
    /// A stable name for this unit, used for diagnostics and to detect when
    /// the engine is handed a different unit.
    fn name(&self) -> &str;

    /// Executes the unit once, reporting results to the listener.
    fn run(&mut self, listener: &mut dyn ResultListener) -> Result<(), ReportError>;

    /// Returns the filtering capability of this unit, if it has one. Units
    /// that cannot scope a rerun to a subset of cases return `None` and are
    /// never auto-retried under
    /// [`RetryAnyFailure`](crate::config::RetryStrategy::RetryAnyFailure).
    fn as_filterable(&mut self) -> Option<&mut dyn FilterableTestUnit> {
        None
    }
}

/// A test unit that can scope a rerun to an explicit set of cases.
pub trait FilterableTestUnit: RetriableTestUnit {
    /// Clears all include filters.
    fn clear_include_filters(&mut self);

    /// Restricts the next run to also include the given case.
    fn add_include_filter(&mut self, case: &TestCaseId);
}

/// Device-state recovery actions taken between retry attempts.
///
/// The retry engine invokes this before the final allowed attempt when
/// configured to; everything about how a reboot actually happens belongs to
/// the device layer.
pub trait DeviceRecovery {
    /// Reboots the device(s) backing the current test unit.
    fn reboot(&mut self) -> Result<(), RecoveryError>;
}

/// A recovery implementation that does nothing. Used in tests and in
/// embeddings with no device to recover.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRecovery;

impl DeviceRecovery for NoopRecovery {
    fn reboot(&mut self) -> Result<(), RecoveryError> {
        Ok(())
    }
}
