// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::results::{CaseResult, CaseStatus, LogFile, TestCaseId};
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::time::Duration;

/// One attempt's outcome for a named test run.
///
/// A `RunResult` is recorded incrementally as the run executes (case started,
/// case ended, ..., run ended) and becomes immutable by convention once
/// [`run_ended`](Self::run_ended) has been recorded. Case results are kept in
/// execution order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunResult {
    run_name: SmolStr,
    attempt: usize,
    expected_count: usize,
    start_time: DateTime<FixedOffset>,
    elapsed: Duration,
    cases: IndexMap<TestCaseId, CaseResult>,
    run_failure: Option<String>,
    run_metrics: IndexMap<SmolStr, String>,
    run_attachments: IndexMap<SmolStr, LogFile>,
    in_progress_case: Option<TestCaseId>,
    completed: bool,
}

impl RunResult {
    /// Starts recording a new attempt for the given run name.
    pub fn new(
        run_name: impl Into<SmolStr>,
        attempt: usize,
        expected_count: usize,
        start_time: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            run_name: run_name.into(),
            attempt,
            expected_count,
            start_time,
            elapsed: Duration::ZERO,
            cases: IndexMap::new(),
            run_failure: None,
            run_metrics: IndexMap::new(),
            run_attachments: IndexMap::new(),
            in_progress_case: None,
            completed: false,
        }
    }

    /// Records a case starting. The case stays [`CaseStatus::Incomplete`]
    /// until it ends.
    pub fn case_started(&mut self, case: &TestCaseId, start_time: DateTime<FixedOffset>) {
        self.cases
            .insert(case.clone(), CaseResult::started_at(start_time));
        self.in_progress_case = Some(case.clone());
    }

    /// Records a case failure. The status switches to failed immediately, even
    /// before the case ends.
    pub fn case_failed(&mut self, case: &TestCaseId, trace: impl Into<String>) {
        let result = self.case_entry(case);
        result.status = CaseStatus::Failed;
        result.failure_trace = Some(trace.into());
    }

    /// Records an assumption failure for a case.
    pub fn case_assumption_failure(&mut self, case: &TestCaseId, trace: impl Into<String>) {
        let result = self.case_entry(case);
        result.status = CaseStatus::AssumptionFailure;
        result.failure_trace = Some(trace.into());
    }

    /// Records a case being ignored.
    pub fn case_ignored(&mut self, case: &TestCaseId) {
        self.case_entry(case).status = CaseStatus::Ignored;
    }

    /// Records a case ending. A case that is still incomplete at this point
    /// passed.
    pub fn case_ended(
        &mut self,
        case: &TestCaseId,
        end_time: DateTime<FixedOffset>,
        metrics: &IndexMap<SmolStr, String>,
    ) {
        let result = self.case_entry(case);
        result.end_time = Some(end_time);
        result.metrics = metrics.clone();
        if result.status == CaseStatus::Incomplete {
            result.status = CaseStatus::Passed;
        }
        if self.in_progress_case.as_ref() == Some(case) {
            self.in_progress_case = None;
        }
    }

    /// Records a run-level failure (the whole attempt failed, e.g. the test
    /// process crashed). Per-case data recorded so far is kept: a crashed
    /// attempt may still carry partial case results.
    pub fn run_failed(&mut self, message: impl Into<String>) {
        match &mut self.run_failure {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(&message.into());
            }
            None => self.run_failure = Some(message.into()),
        }
    }

    /// Records the run ending. The result is considered final afterwards.
    pub fn run_ended(&mut self, elapsed: Duration, metrics: &IndexMap<SmolStr, String>) {
        self.elapsed = elapsed;
        self.run_metrics = metrics.clone();
        self.completed = true;
        self.in_progress_case = None;
    }

    /// Associates a log artifact with the in-progress case if one is open,
    /// otherwise with the run itself.
    pub fn attach_log(&mut self, name: impl Into<SmolStr>, log: LogFile) {
        if let Some(case) = self.in_progress_case.clone() {
            self.case_entry(&case).attachments.insert(name.into(), log);
        } else {
            self.run_attachments.insert(name.into(), log);
        }
    }

    fn case_entry(&mut self, case: &TestCaseId) -> &mut CaseResult {
        // A failure or end event without a start still gets recorded; fall
        // back to the run start time.
        let start_time = self.start_time;
        self.cases
            .entry(case.clone())
            .or_insert_with(|| CaseResult::started_at(start_time))
    }

    /// Returns the run name.
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Returns the attempt number, starting at 0.
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Returns the number of cases the run was expected to execute.
    pub fn expected_count(&self) -> usize {
        self.expected_count
    }

    /// Returns the time at which the run started.
    pub fn start_time(&self) -> DateTime<FixedOffset> {
        self.start_time
    }

    /// Returns the elapsed time of the run. Zero until the run has ended.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Returns the recorded case results in execution order.
    pub fn cases(&self) -> &IndexMap<TestCaseId, CaseResult> {
        &self.cases
    }

    /// Returns the run-level failure message, if the whole attempt failed.
    pub fn run_failure(&self) -> Option<&str> {
        self.run_failure.as_deref()
    }

    /// Returns true if the whole attempt failed.
    pub fn is_run_failure(&self) -> bool {
        self.run_failure.is_some()
    }

    /// Returns true if any case failed.
    pub fn has_failed_cases(&self) -> bool {
        self.cases.values().any(|case| case.status.is_failure())
    }

    /// Returns the identities of cases a retry should target, in execution
    /// order.
    pub fn retry_target_cases(&self) -> impl Iterator<Item = &TestCaseId> + '_ {
        self.cases
            .iter()
            .filter(|(_, case)| case.status.is_retry_target())
            .map(|(id, _)| id)
    }

    /// Returns the number of cases with the given status.
    pub fn count_with_status(&self, status: CaseStatus) -> usize {
        self.cases
            .values()
            .filter(|case| case.status == status)
            .count()
    }

    /// Returns the run-level metrics.
    pub fn run_metrics(&self) -> &IndexMap<SmolStr, String> {
        &self.run_metrics
    }

    /// Returns the run-level log attachments.
    pub fn run_attachments(&self) -> &IndexMap<SmolStr, LogFile> {
        &self.run_attachments
    }

    /// Returns true once the run-ended event has been recorded.
    pub fn is_complete(&self) -> bool {
        self.completed
    }
}

/// The ordered attempts recorded for one run name.
///
/// Grows by one [`RunResult`] per retry; existing entries are never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptHistory {
    run_name: SmolStr,
    attempts: Vec<RunResult>,
}

impl AttemptHistory {
    /// Creates an empty history for the given run name.
    pub fn new(run_name: impl Into<SmolStr>) -> Self {
        Self {
            run_name: run_name.into(),
            attempts: Vec::new(),
        }
    }

    /// Appends an attempt. Attempts must arrive in increasing attempt order
    /// and must share this history's run name. The first attempt need not be
    /// numbered 0: a driver that re-runs a whole module keeps its own attempt
    /// numbering, so a fresh history may start mid-sequence.
    pub fn push(&mut self, result: RunResult) {
        debug_assert_eq!(
            result.run_name(),
            self.run_name,
            "attempt recorded against the wrong run name"
        );
        debug_assert!(
            self.attempts
                .last()
                .is_none_or(|prev| result.attempt() > prev.attempt()),
            "attempts must be recorded in increasing order"
        );
        self.attempts.push(result);
    }

    /// Returns the run name.
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Returns the last attempt, if any.
    pub fn last(&self) -> Option<&RunResult> {
        self.attempts.last()
    }

    /// Iterates over attempts in order.
    pub fn iter(&self) -> impl Iterator<Item = &RunResult> + DoubleEndedIterator + '_ {
        self.attempts.iter()
    }

    /// Returns the number of attempts recorded.
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    /// Returns true if no attempts have been recorded.
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}
