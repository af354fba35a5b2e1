// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::ReportError,
    reporter::ResultListener,
    results::{LogFile, RunResult, TestCaseId},
};
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::time::Duration;

/// A listener that collects the event stream into [`RunResult`]s, one per
/// run-started/run-ended pair, in arrival order.
///
/// Executors use this to build the attempt history the
/// [`RetryEngine`](crate::retry::RetryEngine) decides on.
#[derive(Debug, Default)]
pub struct CollectingListener {
    results: Vec<RunResult>,
    current: Option<RunResult>,
}

impl CollectingListener {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the completed results collected so far.
    pub fn results(&self) -> &[RunResult] {
        &self.results
    }

    /// Consumes the collector, returning the completed results.
    pub fn into_results(self) -> Vec<RunResult> {
        self.results
    }
}

impl ResultListener for CollectingListener {
    fn supports_granular_results(&self) -> bool {
        true
    }

    fn run_started(
        &mut self,
        run_name: &str,
        expected_count: usize,
        attempt: usize,
        start_time: DateTime<FixedOffset>,
    ) -> Result<(), ReportError> {
        self.current = Some(RunResult::new(run_name, attempt, expected_count, start_time));
        Ok(())
    }

    fn run_failed(&mut self, message: &str) -> Result<(), ReportError> {
        if let Some(run) = &mut self.current {
            run.run_failed(message);
        }
        Ok(())
    }

    fn run_ended(
        &mut self,
        elapsed: Duration,
        metrics: &IndexMap<SmolStr, String>,
    ) -> Result<(), ReportError> {
        if let Some(mut run) = self.current.take() {
            run.run_ended(elapsed, metrics);
            self.results.push(run);
        }
        Ok(())
    }

    fn case_started(
        &mut self,
        case: &TestCaseId,
        start_time: DateTime<FixedOffset>,
    ) -> Result<(), ReportError> {
        if let Some(run) = &mut self.current {
            run.case_started(case, start_time);
        }
        Ok(())
    }

    fn case_failed(&mut self, case: &TestCaseId, trace: &str) -> Result<(), ReportError> {
        if let Some(run) = &mut self.current {
            run.case_failed(case, trace);
        }
        Ok(())
    }

    fn case_assumption_failure(
        &mut self,
        case: &TestCaseId,
        trace: &str,
    ) -> Result<(), ReportError> {
        if let Some(run) = &mut self.current {
            run.case_assumption_failure(case, trace);
        }
        Ok(())
    }

    fn case_ignored(&mut self, case: &TestCaseId) -> Result<(), ReportError> {
        if let Some(run) = &mut self.current {
            run.case_ignored(case);
        }
        Ok(())
    }

    fn case_ended(
        &mut self,
        case: &TestCaseId,
        end_time: DateTime<FixedOffset>,
        metrics: &IndexMap<SmolStr, String>,
    ) -> Result<(), ReportError> {
        if let Some(run) = &mut self.current {
            run.case_ended(case, end_time, metrics);
        }
        Ok(())
    }

    fn log_association(&mut self, name: &str, log: &LogFile) -> Result<(), ReportError> {
        if let Some(run) = &mut self.current {
            run.attach_log(name, log.clone());
        }
        Ok(())
    }
}
