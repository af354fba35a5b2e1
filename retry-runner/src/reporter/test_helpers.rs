// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared helpers for reporter tests.

use crate::{
    errors::ReportError,
    reporter::ResultListener,
    results::{LogFile, TestCaseId},
};
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::{cell::RefCell, rc::Rc, time::Duration};

/// An event observed by a [`RecordingListener`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RecordedEvent {
    SessionStarted,
    SessionEnded,
    ModuleStarted(String),
    ModuleEnded,
    RunStarted {
        run_name: String,
        expected_count: usize,
        attempt: usize,
    },
    RunFailed(String),
    RunEnded,
    CaseStarted(String),
    CaseFailed(String, String),
    CaseAssumptionFailure(String),
    CaseIgnored(String),
    CaseEnded(String),
    LogAssociation(String),
    LogSaved(String),
}

/// A listener that records every event it observes, for assertions.
pub(crate) struct RecordingListener {
    granular: bool,
    events: Rc<RefCell<Vec<RecordedEvent>>>,
}

impl RecordingListener {
    pub(crate) fn new(granular: bool) -> Self {
        Self {
            granular,
            events: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Returns a shared handle to the recorded events.
    pub(crate) fn handle(&self) -> Rc<RefCell<Vec<RecordedEvent>>> {
        Rc::clone(&self.events)
    }

    fn record(&self, event: RecordedEvent) -> Result<(), ReportError> {
        self.events.borrow_mut().push(event);
        Ok(())
    }
}

impl ResultListener for RecordingListener {
    fn supports_granular_results(&self) -> bool {
        self.granular
    }

    fn session_started(&mut self) -> Result<(), ReportError> {
        self.record(RecordedEvent::SessionStarted)
    }

    fn session_ended(&mut self, _elapsed: Duration) -> Result<(), ReportError> {
        self.record(RecordedEvent::SessionEnded)
    }

    fn module_started(&mut self, module_name: &str) -> Result<(), ReportError> {
        self.record(RecordedEvent::ModuleStarted(module_name.to_owned()))
    }

    fn module_ended(&mut self) -> Result<(), ReportError> {
        self.record(RecordedEvent::ModuleEnded)
    }

    fn run_started(
        &mut self,
        run_name: &str,
        expected_count: usize,
        attempt: usize,
        _start_time: DateTime<FixedOffset>,
    ) -> Result<(), ReportError> {
        self.record(RecordedEvent::RunStarted {
            run_name: run_name.to_owned(),
            expected_count,
            attempt,
        })
    }

    fn run_failed(&mut self, message: &str) -> Result<(), ReportError> {
        self.record(RecordedEvent::RunFailed(message.to_owned()))
    }

    fn run_ended(
        &mut self,
        _elapsed: Duration,
        _metrics: &IndexMap<SmolStr, String>,
    ) -> Result<(), ReportError> {
        self.record(RecordedEvent::RunEnded)
    }

    fn case_started(
        &mut self,
        case: &TestCaseId,
        _start_time: DateTime<FixedOffset>,
    ) -> Result<(), ReportError> {
        self.record(RecordedEvent::CaseStarted(case.to_string()))
    }

    fn case_failed(&mut self, case: &TestCaseId, trace: &str) -> Result<(), ReportError> {
        self.record(RecordedEvent::CaseFailed(case.to_string(), trace.to_owned()))
    }

    fn case_assumption_failure(
        &mut self,
        case: &TestCaseId,
        _trace: &str,
    ) -> Result<(), ReportError> {
        self.record(RecordedEvent::CaseAssumptionFailure(case.to_string()))
    }

    fn case_ignored(&mut self, case: &TestCaseId) -> Result<(), ReportError> {
        self.record(RecordedEvent::CaseIgnored(case.to_string()))
    }

    fn case_ended(
        &mut self,
        case: &TestCaseId,
        _end_time: DateTime<FixedOffset>,
        _metrics: &IndexMap<SmolStr, String>,
    ) -> Result<(), ReportError> {
        self.record(RecordedEvent::CaseEnded(case.to_string()))
    }

    fn log_association(&mut self, name: &str, _log: &LogFile) -> Result<(), ReportError> {
        self.record(RecordedEvent::LogAssociation(name.to_owned()))
    }

    fn log_saved(&mut self, name: &str, _log: &LogFile) -> Result<(), ReportError> {
        self.record(RecordedEvent::LogSaved(name.to_owned()))
    }
}
