// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::ReportError,
    results::{LogFile, TestCaseId},
};
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::time::Duration;

/// A consumer of test result events.
///
/// Events arrive in execution order: `run_started`, then per-case
/// started/failed/ended sequences, then `run_ended`. Module and session
/// boundaries group runs; logging events may arrive at any point within a run.
///
/// Errors returned from a listener propagate to the invocation driver
/// unchanged; the forwarding layer performs no recovery.
pub trait ResultListener {
    /// Returns true if this listener wants every attempt reported separately
    /// ("detailed"). Listeners returning false ("aggregated") receive exactly
    /// one merged result per run name and never see superseded data.
    fn supports_granular_results(&self) -> bool {
        false
    }

    /// The overall test session started.
    fn session_started(&mut self) -> Result<(), ReportError> {
        Ok(())
    }

    /// The overall test session ended.
    fn session_ended(&mut self, _elapsed: Duration) -> Result<(), ReportError> {
        Ok(())
    }

    /// A module (a group of runs retried as one unit) started.
    fn module_started(&mut self, _module_name: &str) -> Result<(), ReportError> {
        Ok(())
    }

    /// The current module ended.
    fn module_ended(&mut self) -> Result<(), ReportError> {
        Ok(())
    }

    /// A test run started. `attempt` is 0 for the first execution of a run
    /// name and increments per retry.
    fn run_started(
        &mut self,
        run_name: &str,
        expected_count: usize,
        attempt: usize,
        start_time: DateTime<FixedOffset>,
    ) -> Result<(), ReportError>;

    /// The whole run failed (e.g. the test process crashed).
    fn run_failed(&mut self, message: &str) -> Result<(), ReportError>;

    /// The current run ended.
    fn run_ended(
        &mut self,
        elapsed: Duration,
        metrics: &IndexMap<SmolStr, String>,
    ) -> Result<(), ReportError>;

    /// A test case started.
    fn case_started(
        &mut self,
        case: &TestCaseId,
        start_time: DateTime<FixedOffset>,
    ) -> Result<(), ReportError>;

    /// A test case failed.
    fn case_failed(&mut self, case: &TestCaseId, trace: &str) -> Result<(), ReportError>;

    /// A test case's assumption did not hold.
    fn case_assumption_failure(
        &mut self,
        case: &TestCaseId,
        trace: &str,
    ) -> Result<(), ReportError>;

    /// A test case was ignored.
    fn case_ignored(&mut self, case: &TestCaseId) -> Result<(), ReportError>;

    /// A test case ended.
    fn case_ended(
        &mut self,
        case: &TestCaseId,
        end_time: DateTime<FixedOffset>,
        metrics: &IndexMap<SmolStr, String>,
    ) -> Result<(), ReportError>;

    /// A log artifact was associated with the in-progress case or run.
    fn log_association(&mut self, _name: &str, _log: &LogFile) -> Result<(), ReportError> {
        Ok(())
    }

    /// A log artifact was saved by the harness's log-saving layer.
    fn log_saved(&mut self, _name: &str, _log: &LogFile) -> Result<(), ReportError> {
        Ok(())
    }
}
