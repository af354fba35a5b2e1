// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::results::{CaseStatus, RunResult, TestCaseId};
use indexmap::IndexMap;
use std::{collections::HashSet, time::Duration};

/// Aggregate retry counts for one test unit, derived from the attempts the
/// engine has seen. Diagnostic only, never fatal.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RetryStatistics {
    /// The number of attempts that were executed.
    pub attempt_count: usize,

    /// Cases that failed at least once but passed on a later attempt.
    pub passed_after_retry: usize,

    /// Cases that still failed on the last attempt that executed them.
    pub failed_all_attempts: usize,

    /// Total time spent in attempts past the first one.
    pub retry_time: Duration,
}

/// Accumulates per-attempt results and recomputes [`RetryStatistics`] on
/// demand. Fed one batch of results per attempt.
#[derive(Clone, Debug, Default)]
pub(crate) struct RetryStatsAccumulator {
    attempts: Vec<AttemptSnapshot>,
}

#[derive(Clone, Debug)]
struct AttemptSnapshot {
    elapsed: Duration,
    statuses: IndexMap<TestCaseId, CaseStatus>,
}

impl RetryStatsAccumulator {
    pub(crate) fn add_attempt<'a>(&mut self, results: impl IntoIterator<Item = &'a RunResult>) {
        let mut snapshot = AttemptSnapshot {
            elapsed: Duration::ZERO,
            statuses: IndexMap::new(),
        };
        for run in results {
            snapshot.elapsed += run.elapsed();
            for (id, case) in run.cases() {
                snapshot.statuses.insert(id.clone(), case.status);
            }
        }
        self.attempts.push(snapshot);
    }

    pub(crate) fn calculate(&self) -> RetryStatistics {
        let mut ever_failed: HashSet<&TestCaseId> = HashSet::new();
        let mut last_status: IndexMap<&TestCaseId, CaseStatus> = IndexMap::new();
        for snapshot in &self.attempts {
            for (id, status) in &snapshot.statuses {
                if status.is_retry_target() {
                    ever_failed.insert(id);
                }
                last_status.insert(id, *status);
            }
        }

        RetryStatistics {
            attempt_count: self.attempts.len(),
            passed_after_retry: last_status
                .iter()
                .filter(|(id, status)| !status.is_retry_target() && ever_failed.contains(*id))
                .count(),
            failed_all_attempts: last_status
                .values()
                .filter(|status| status.is_retry_target())
                .count(),
            retry_time: self
                .attempts
                .iter()
                .skip(1)
                .map(|snapshot| snapshot.elapsed)
                .sum(),
        }
    }
}
