// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::results::LogFile;
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::fmt;

/// Identifies one test case as a (class name, method name) pair.
///
/// Identity is stable across attempts: the same case retried on a later
/// attempt compares equal to its earlier executions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestCaseId {
    class_name: SmolStr,
    method_name: SmolStr,
}

impl TestCaseId {
    /// Creates a new test case identity.
    pub fn new(class_name: impl Into<SmolStr>, method_name: impl Into<SmolStr>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }

    /// Returns the class (or fixture) name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns the method name.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }
}

impl fmt::Display for TestCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class_name, self.method_name)
    }
}

/// The outcome of one test case for one attempt.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CaseStatus {
    /// The case passed.
    Passed,

    /// The case failed an assertion or threw.
    Failed,

    /// A test assumption did not hold; the case is reported but does not count
    /// as a failure.
    AssumptionFailure,

    /// The case was ignored (disabled or filtered at runtime).
    Ignored,

    /// The case started but never ended, usually because the surrounding run
    /// crashed.
    Incomplete,
}

impl CaseStatus {
    /// Returns true if this status is a failure in the strict sense.
    pub fn is_failure(self) -> bool {
        matches!(self, CaseStatus::Failed)
    }

    /// Returns true if a retry should target a case with this status. Covers
    /// both strict failures and cases cut short by a run-level crash.
    pub fn is_retry_target(self) -> bool {
        matches!(self, CaseStatus::Failed | CaseStatus::Incomplete)
    }
}

/// One test case's recorded outcome for one attempt.
///
/// Created when the case starts and finalized when it ends; owned by the
/// [`RunResult`](crate::results::RunResult) that contains it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaseResult {
    /// The case status.
    pub status: CaseStatus,

    /// The failure trace, if the case failed or an assumption failed.
    pub failure_trace: Option<String>,

    /// The time at which the case started.
    pub start_time: DateTime<FixedOffset>,

    /// The time at which the case ended. `None` while the case is in progress
    /// or if the run crashed before the case ended.
    pub end_time: Option<DateTime<FixedOffset>>,

    /// Metrics reported by the case, in reporting order.
    pub metrics: IndexMap<SmolStr, String>,

    /// Log artifacts associated with the case, in association order.
    pub attachments: IndexMap<SmolStr, LogFile>,
}

impl CaseResult {
    pub(crate) fn started_at(start_time: DateTime<FixedOffset>) -> Self {
        Self {
            status: CaseStatus::Incomplete,
            failure_trace: None,
            start_time,
            end_time: None,
            metrics: IndexMap::new(),
            attachments: IndexMap::new(),
        }
    }
}
