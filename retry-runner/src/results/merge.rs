// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    config::RetryStrategy,
    results::{AttemptHistory, CaseResult, LogFile, TestCaseId},
};
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use itertools::Itertools;
use smol_str::SmolStr;
use std::time::Duration;

/// How multiple attempts' results for the same run name collapse into one
/// logical result.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MergeMode {
    /// Only one attempt ever exists; merging returns it unchanged.
    SingleAttempt,

    /// Keep every attempt's case results distinctly. Consumers that aggregate
    /// iteration statistics need every data point.
    KeepAllAttempts,

    /// For each case identity, the last attempt in which the case executed
    /// wins. A flaky-then-passing case is reported as a pass.
    LastAttemptWins,
}

impl MergeMode {
    /// Returns the merge mode matching a retry strategy.
    pub fn for_strategy(strategy: RetryStrategy) -> Self {
        match strategy {
            RetryStrategy::NoRetry => MergeMode::SingleAttempt,
            RetryStrategy::Iterations | RetryStrategy::RerunUntilFailure => {
                MergeMode::KeepAllAttempts
            }
            RetryStrategy::RetryAnyFailure => MergeMode::LastAttemptWins,
        }
    }
}

/// One logical result produced by merging an [`AttemptHistory`].
///
/// Under [`MergeMode::KeepAllAttempts`] the case list may contain the same
/// identity several times, once per attempt; under the other modes identities
/// are unique.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedRunResult {
    /// The run name.
    pub run_name: SmolStr,

    /// The number of cases the merged run was expected to execute.
    pub expected_count: usize,

    /// The start time of the first attempt.
    pub start_time: DateTime<FixedOffset>,

    /// Total elapsed time across all attempts.
    pub elapsed: Duration,

    /// The number of attempts that were merged.
    pub attempt_count: usize,

    /// The winning case results, in execution order.
    pub cases: Vec<(TestCaseId, CaseResult)>,

    /// The surviving run-level failure message, if any.
    pub run_failure: Option<String>,

    /// The winning run-level metrics.
    pub run_metrics: IndexMap<SmolStr, String>,

    /// The winning run-level log attachments.
    pub run_attachments: IndexMap<SmolStr, LogFile>,
}

impl MergedRunResult {
    fn empty(run_name: &str) -> Self {
        Self {
            run_name: run_name.into(),
            expected_count: 0,
            start_time: DateTime::<chrono::Utc>::UNIX_EPOCH.fixed_offset(),
            elapsed: Duration::ZERO,
            attempt_count: 0,
            cases: Vec::new(),
            run_failure: None,
            run_metrics: IndexMap::new(),
            run_attachments: IndexMap::new(),
        }
    }
}

impl AttemptHistory {
    /// Merges this history into one logical result.
    ///
    /// Merging is deterministic and does not mutate the history. An empty
    /// history merges to an empty, non-failed result.
    pub fn merge(&self, mode: MergeMode) -> MergedRunResult {
        match mode {
            // A single attempt is its own merge, and last-wins degrades to
            // exactly that, so both share the same path.
            MergeMode::SingleAttempt | MergeMode::LastAttemptWins => self.merge_last_wins(),
            MergeMode::KeepAllAttempts => self.merge_keep_all(),
        }
    }

    fn merge_last_wins(&self) -> MergedRunResult {
        let (Some(first), Some(last)) = (self.iter().next(), self.last()) else {
            return MergedRunResult::empty(self.run_name());
        };

        // Later attempts supersede earlier ones per case identity. A run
        // failure on a late attempt supersedes only the run-level flag; case
        // results its partial data did not cover stay in place.
        let mut cases: IndexMap<TestCaseId, CaseResult> = IndexMap::new();
        for attempt in self.iter() {
            for (id, case) in attempt.cases() {
                cases.insert(id.clone(), case.clone());
            }
        }

        MergedRunResult {
            run_name: self.run_name().into(),
            expected_count: first.expected_count(),
            start_time: first.start_time(),
            elapsed: self.iter().map(|attempt| attempt.elapsed()).sum(),
            attempt_count: self.len(),
            cases: cases.into_iter().collect(),
            run_failure: last.run_failure().map(str::to_owned),
            run_metrics: last.run_metrics().clone(),
            run_attachments: last.run_attachments().clone(),
        }
    }

    fn merge_keep_all(&self) -> MergedRunResult {
        let Some(first) = self.iter().next() else {
            return MergedRunResult::empty(self.run_name());
        };

        let mut cases = Vec::new();
        let mut run_metrics = IndexMap::new();
        let mut run_attachments = IndexMap::new();
        for attempt in self.iter() {
            for (id, case) in attempt.cases() {
                cases.push((id.clone(), case.clone()));
            }
            run_metrics.extend(
                attempt
                    .run_metrics()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
            run_attachments.extend(
                attempt
                    .run_attachments()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }

        let run_failure = self
            .iter()
            .filter_map(|attempt| attempt.run_failure())
            .join("\n");

        MergedRunResult {
            run_name: self.run_name().into(),
            expected_count: self.iter().map(|attempt| attempt.expected_count()).sum(),
            start_time: first.start_time(),
            elapsed: self.iter().map(|attempt| attempt.elapsed()).sum(),
            attempt_count: self.len(),
            cases,
            run_failure: (!run_failure.is_empty()).then_some(run_failure),
            run_metrics,
            run_attachments,
        }
    }
}
