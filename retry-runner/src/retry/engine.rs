// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    config::{MAX_FILTERED_RETRY_CASES, RetryConfig, RetryStrategy},
    errors::RecoveryError,
    results::{CaseStatus, RunResult, TestCaseId},
    retry::{RetryStatistics, statistics::RetryStatsAccumulator},
    test_unit::{DeviceRecovery, NoopRecovery, RetriableTestUnit},
};
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::debug;

/// Decides, after each attempt of a test unit, whether the unit should run
/// again, and narrows the unit's include filters to the failed cases when the
/// strategy calls for it.
///
/// The engine is driven sequentially, one unit and one attempt at a time. When
/// it is handed a unit with a different name than the one it was last
/// considering, the accumulated statistics and filter tracking reset.
pub struct RetryEngine {
    config: RetryConfig,
    recovery: Box<dyn DeviceRecovery>,
    current_unit: Option<String>,
    previously_failing: HashSet<TestCaseId>,
    stats: RetryStatsAccumulator,
}

impl RetryEngine {
    /// Creates an engine with no device recovery action.
    pub fn new(config: RetryConfig) -> Self {
        Self::with_recovery(config, Box::new(NoopRecovery))
    }

    /// Creates an engine with the given device recovery action.
    pub fn with_recovery(config: RetryConfig, recovery: Box<dyn DeviceRecovery>) -> Self {
        Self {
            config,
            recovery,
            current_unit: None,
            previously_failing: HashSet::new(),
            stats: RetryStatsAccumulator::default(),
        }
    }

    /// Returns the engine's configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Decides whether `unit` should be retried after the attempt numbered
    /// `attempt_just_executed`, given the results of all attempts so far.
    ///
    /// Under [`RetryStrategy::RetryAnyFailure`] a positive decision replaces
    /// the unit's include filters with exactly the still-failing cases. The
    /// attempt cap itself is enforced by the caller; this only answers whether
    /// another attempt is worth running.
    pub fn should_retry(
        &mut self,
        unit: &mut dyn RetriableTestUnit,
        attempt_just_executed: usize,
        previous_results: &[RunResult],
    ) -> Result<bool, RecoveryError> {
        if self.current_unit.as_deref() != Some(unit.name()) {
            self.current_unit = Some(unit.name().to_owned());
            self.stats = RetryStatsAccumulator::default();
            self.previously_failing.clear();
        }

        match self.config.strategy {
            RetryStrategy::NoRetry => return Ok(false),
            RetryStrategy::Iterations => return Ok(true),
            RetryStrategy::RerunUntilFailure => return Ok(!has_any_failures(previous_results)),
            RetryStrategy::RetryAnyFailure => {}
        }

        self.stats.add_attempt(
            previous_results
                .iter()
                .filter(|run| run.attempt() == attempt_just_executed),
        );

        let unit_name = unit.name().to_owned();
        let Some(filterable) = unit.as_filterable() else {
            // Retry eligibility is a capability query; a unit that can't be
            // narrowed is simply not retried.
            debug!(
                unit = %unit_name,
                "unit does not support include filters, cannot auto-retry"
            );
            return Ok(false);
        };

        let latest_attempt_run_failed = previous_results
            .iter()
            .filter(|run| run.attempt() == attempt_just_executed)
            .any(RunResult::is_run_failure);

        let decision = if latest_attempt_run_failed {
            // Case-level data from a crashed attempt may be unreliable, so
            // retry the whole unit without narrowing.
            debug!(unit = %unit_name, "run-level failure, retrying the full run");
            true
        } else {
            let mut failing = still_failing_cases(previous_results);
            if !self.previously_failing.is_empty() {
                failing.retain(|id| self.previously_failing.contains(id));
            }
            if failing.len() > MAX_FILTERED_RETRY_CASES {
                debug!(
                    unit = %unit_name,
                    failures = failing.len(),
                    "found too many failures, skipping auto-retry to avoid large overhead"
                );
                false
            } else if failing.is_empty() {
                debug!(unit = %unit_name, "no test run or test case failures, no need to retry");
                false
            } else {
                debug!(
                    unit = %unit_name,
                    failures = failing.len(),
                    "retrying the test case failures"
                );
                filterable.clear_include_filters();
                for id in &failing {
                    filterable.add_include_filter(id);
                }
                self.previously_failing = failing.into_iter().collect();
                true
            }
        };

        if decision {
            self.recover_if_configured(attempt_just_executed)?;
        }
        Ok(decision)
    }

    /// Feeds a final attempt's results into the statistics without a retry
    /// decision. Used when the loop stops because the attempt cap was reached.
    pub fn add_last_attempt(&mut self, results: &[RunResult]) {
        self.stats.add_attempt(results.iter());
    }

    /// Returns the statistics accumulated for the current unit. Zero-valued if
    /// nothing was accumulated.
    pub fn retry_statistics(&self) -> RetryStatistics {
        self.stats.calculate()
    }

    fn recover_if_configured(&mut self, attempt_just_executed: usize) -> Result<(), RecoveryError> {
        if self.config.reboot_at_last_attempt
            && self.config.max_attempts >= 2
            && attempt_just_executed == self.config.max_attempts - 2
        {
            debug!("rebooting device before the final allowed attempt");
            self.recovery.reboot()?;
        }
        Ok(())
    }
}

/// Returns true if any result has a run-level failure or a failed case.
fn has_any_failures(results: &[RunResult]) -> bool {
    results
        .iter()
        .any(|run| run.is_run_failure() || run.has_failed_cases())
}

/// Returns the cases whose most recent execution across `results` failed or
/// was incomplete, in first-seen order.
fn still_failing_cases(results: &[RunResult]) -> Vec<TestCaseId> {
    let mut last_status: IndexMap<&TestCaseId, CaseStatus> = IndexMap::new();
    for run in results {
        for (id, case) in run.cases() {
            last_status.insert(id, case.status);
        }
    }
    last_status
        .into_iter()
        .filter(|(_, status)| status.is_retry_target())
        .map(|(id, _)| id.clone())
        .collect()
}
