// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    config::RetryStrategy,
    errors::ReportError,
    reporter::ResultListener,
    results::{AttemptHistory, CaseStatus, LogFile, MergeMode, MergedRunResult, RunResult,
        TestCaseId},
};
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::time::Duration;

/// A forwarder that sits between the executor and all downstream result
/// listeners, aggregating attempts when needed based on the retry strategy.
///
/// Listeners that declare
/// [`supports_granular_results`](ResultListener::supports_granular_results)
/// receive every event immediately, tagged with the real attempt number.
/// The others receive exactly one merged run-started/run-ended envelope per
/// distinct run name, replayed at the enclosing flush boundary: the end of
/// the module, or for runs outside any module, the start of a different run
/// name or the end of the session.
pub struct ResultAggregator {
    detailed: Vec<Box<dyn ResultListener>>,
    aggregated: Vec<Box<dyn ResultListener>>,
    merge_mode: MergeMode,
    histories: IndexMap<SmolStr, AttemptHistory>,
    current_run: Option<RunResult>,
    module_in_progress: bool,
}

impl ResultAggregator {
    /// Creates an aggregator forwarding to the given listeners, partitioned
    /// by their granular-results capability.
    pub fn new(listeners: Vec<Box<dyn ResultListener>>, strategy: RetryStrategy) -> Self {
        let (detailed, aggregated) = listeners
            .into_iter()
            .partition(|listener| listener.supports_granular_results());
        Self {
            detailed,
            aggregated,
            merge_mode: MergeMode::for_strategy(strategy),
            histories: IndexMap::new(),
            current_run: None,
            module_in_progress: false,
        }
    }

    /// Merges and replays every accumulated run name to the aggregated
    /// listeners, then clears the bookkeeping so results never leak across
    /// flush boundaries.
    fn flush_aggregated(&mut self) -> Result<(), ReportError> {
        let histories = std::mem::take(&mut self.histories);
        for (_, history) in histories {
            let merged = history.merge(self.merge_mode);
            self.replay_merged(&merged)?;
        }
        Ok(())
    }

    /// Replays one merged result as a single run envelope. Only the winning
    /// log associations are re-associated; superseded attempts' artifacts
    /// stay visible to detailed listeners alone.
    fn replay_merged(&mut self, merged: &MergedRunResult) -> Result<(), ReportError> {
        for listener in &mut self.aggregated {
            listener.run_started(
                &merged.run_name,
                merged.expected_count,
                0,
                merged.start_time,
            )?;
            for (id, case) in &merged.cases {
                listener.case_started(id, case.start_time)?;
                match case.status {
                    CaseStatus::Passed => {}
                    CaseStatus::Failed => {
                        listener.case_failed(id, case.failure_trace.as_deref().unwrap_or(""))?;
                    }
                    CaseStatus::AssumptionFailure => {
                        listener.case_assumption_failure(
                            id,
                            case.failure_trace.as_deref().unwrap_or(""),
                        )?;
                    }
                    CaseStatus::Ignored => {
                        listener.case_ignored(id)?;
                    }
                    CaseStatus::Incomplete => {
                        listener.case_failed(id, "test did not complete")?;
                    }
                }
                for (name, log) in &case.attachments {
                    listener.log_association(name, log)?;
                }
                listener.case_ended(id, case.end_time.unwrap_or(case.start_time), &case.metrics)?;
            }
            if let Some(message) = &merged.run_failure {
                listener.run_failed(message)?;
            }
            for (name, log) in &merged.run_attachments {
                listener.log_association(name, log)?;
            }
            listener.run_ended(merged.elapsed, &merged.run_metrics)?;
        }
        Ok(())
    }
}

impl ResultListener for ResultAggregator {
    // The aggregator consumes per-attempt streams from the executor.
    fn supports_granular_results(&self) -> bool {
        true
    }

    fn session_started(&mut self) -> Result<(), ReportError> {
        for listener in self.detailed.iter_mut().chain(&mut self.aggregated) {
            listener.session_started()?;
        }
        Ok(())
    }

    fn session_ended(&mut self, elapsed: Duration) -> Result<(), ReportError> {
        self.flush_aggregated()?;
        for listener in self.detailed.iter_mut().chain(&mut self.aggregated) {
            listener.session_ended(elapsed)?;
        }
        Ok(())
    }

    fn module_started(&mut self, module_name: &str) -> Result<(), ReportError> {
        // Runs recorded outside any module are flushed before the module's
        // own bookkeeping starts.
        self.flush_aggregated()?;
        self.module_in_progress = true;
        for listener in self.detailed.iter_mut().chain(&mut self.aggregated) {
            listener.module_started(module_name)?;
        }
        Ok(())
    }

    fn module_ended(&mut self) -> Result<(), ReportError> {
        self.module_in_progress = false;
        for listener in &mut self.detailed {
            listener.module_ended()?;
        }
        self.flush_aggregated()?;
        for listener in &mut self.aggregated {
            listener.module_ended()?;
        }
        Ok(())
    }

    fn run_started(
        &mut self,
        run_name: &str,
        expected_count: usize,
        attempt: usize,
        start_time: DateTime<FixedOffset>,
    ) -> Result<(), ReportError> {
        // A new run name outside a module means the buffered one is final.
        if !self.module_in_progress
            && !self.histories.is_empty()
            && !self.histories.contains_key(run_name)
        {
            self.flush_aggregated()?;
        }
        self.current_run = Some(RunResult::new(run_name, attempt, expected_count, start_time));
        for listener in &mut self.detailed {
            listener.run_started(run_name, expected_count, attempt, start_time)?;
        }
        Ok(())
    }

    fn run_failed(&mut self, message: &str) -> Result<(), ReportError> {
        if let Some(run) = &mut self.current_run {
            run.run_failed(message);
        }
        for listener in &mut self.detailed {
            listener.run_failed(message)?;
        }
        Ok(())
    }

    fn run_ended(
        &mut self,
        elapsed: Duration,
        metrics: &IndexMap<SmolStr, String>,
    ) -> Result<(), ReportError> {
        if let Some(mut run) = self.current_run.take() {
            run.run_ended(elapsed, metrics);
            self.histories
                .entry(run.run_name().into())
                .or_insert_with(|| AttemptHistory::new(run.run_name()))
                .push(run);
        }
        for listener in &mut self.detailed {
            listener.run_ended(elapsed, metrics)?;
        }
        Ok(())
    }

    fn case_started(
        &mut self,
        case: &TestCaseId,
        start_time: DateTime<FixedOffset>,
    ) -> Result<(), ReportError> {
        if let Some(run) = &mut self.current_run {
            run.case_started(case, start_time);
        }
        for listener in &mut self.detailed {
            listener.case_started(case, start_time)?;
        }
        Ok(())
    }

    fn case_failed(&mut self, case: &TestCaseId, trace: &str) -> Result<(), ReportError> {
        if let Some(run) = &mut self.current_run {
            run.case_failed(case, trace);
        }
        for listener in &mut self.detailed {
            listener.case_failed(case, trace)?;
        }
        Ok(())
    }

    fn case_assumption_failure(
        &mut self,
        case: &TestCaseId,
        trace: &str,
    ) -> Result<(), ReportError> {
        if let Some(run) = &mut self.current_run {
            run.case_assumption_failure(case, trace);
        }
        for listener in &mut self.detailed {
            listener.case_assumption_failure(case, trace)?;
        }
        Ok(())
    }

    fn case_ignored(&mut self, case: &TestCaseId) -> Result<(), ReportError> {
        if let Some(run) = &mut self.current_run {
            run.case_ignored(case);
        }
        for listener in &mut self.detailed {
            listener.case_ignored(case)?;
        }
        Ok(())
    }

    fn case_ended(
        &mut self,
        case: &TestCaseId,
        end_time: DateTime<FixedOffset>,
        metrics: &IndexMap<SmolStr, String>,
    ) -> Result<(), ReportError> {
        if let Some(run) = &mut self.current_run {
            run.case_ended(case, end_time, metrics);
        }
        for listener in &mut self.detailed {
            listener.case_ended(case, end_time, metrics)?;
        }
        Ok(())
    }

    fn log_association(&mut self, name: &str, log: &LogFile) -> Result<(), ReportError> {
        if let Some(run) = &mut self.current_run {
            run.attach_log(name, log.clone());
        }
        for listener in &mut self.detailed {
            listener.log_association(name, log)?;
        }
        Ok(())
    }

    fn log_saved(&mut self, name: &str, log: &LogFile) -> Result<(), ReportError> {
        for listener in &mut self.detailed {
            listener.log_saved(name, log)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::test_helpers::{RecordedEvent, RecordingListener};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::{cell::RefCell, rc::Rc};

    fn t(seconds: u32) -> DateTime<FixedOffset> {
        (chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::TimeDelta::seconds(seconds.into()))
        .fixed_offset()
    }

    fn aggregator_with_recorders(
        strategy: RetryStrategy,
    ) -> (
        ResultAggregator,
        Rc<RefCell<Vec<RecordedEvent>>>,
        Rc<RefCell<Vec<RecordedEvent>>>,
    ) {
        let detailed = RecordingListener::new(true);
        let aggregated = RecordingListener::new(false);
        let detailed_events = detailed.handle();
        let aggregated_events = aggregated.handle();
        let aggregator = ResultAggregator::new(
            vec![Box::new(detailed), Box::new(aggregated)],
            strategy,
        );
        (aggregator, detailed_events, aggregated_events)
    }

    fn run_attempt(
        aggregator: &mut ResultAggregator,
        run_name: &str,
        attempt: usize,
        case: &TestCaseId,
        fail: bool,
    ) {
        aggregator
            .run_started(run_name, 1, attempt, t(attempt as u32 * 100))
            .unwrap();
        aggregator
            .case_started(case, t(attempt as u32 * 100 + 1))
            .unwrap();
        if fail {
            aggregator.case_failed(case, "trace").unwrap();
        }
        aggregator
            .case_ended(case, t(attempt as u32 * 100 + 2), &IndexMap::new())
            .unwrap();
        aggregator
            .run_ended(Duration::from_secs(5), &IndexMap::new())
            .unwrap();
    }

    fn count_run_envelopes(events: &[RecordedEvent], run_name: &str) -> (usize, usize) {
        let started = events
            .iter()
            .filter(|event| {
                matches!(event, RecordedEvent::RunStarted { run_name: name, .. } if name == run_name)
            })
            .count();
        let ended = events
            .iter()
            .filter(|event| matches!(event, RecordedEvent::RunEnded))
            .count();
        (started, ended)
    }

    #[test]
    fn detailed_listeners_see_every_attempt() {
        let (mut aggregator, detailed_events, aggregated_events) =
            aggregator_with_recorders(RetryStrategy::RetryAnyFailure);
        let case = TestCaseId::new("FooTest", "testFlaky");

        aggregator.module_started("module").unwrap();
        run_attempt(&mut aggregator, "run", 0, &case, true);
        run_attempt(&mut aggregator, "run", 1, &case, false);
        aggregator.module_ended().unwrap();

        let detailed = detailed_events.borrow();
        let (started, ended) = count_run_envelopes(&detailed, "run");
        assert_eq!((started, ended), (2, 2));
        // Real attempt numbers are preserved for detailed listeners.
        let attempts: Vec<_> = detailed
            .iter()
            .filter_map(|event| match event {
                RecordedEvent::RunStarted { attempt, .. } => Some(*attempt),
                _ => None,
            })
            .collect();
        assert_eq!(attempts, [0, 1]);

        let aggregated = aggregated_events.borrow();
        let (started, ended) = count_run_envelopes(&aggregated, "run");
        assert_eq!((started, ended), (1, 1));
    }

    #[test]
    fn aggregated_listeners_see_the_merged_outcome() {
        let (mut aggregator, _, aggregated_events) =
            aggregator_with_recorders(RetryStrategy::RetryAnyFailure);
        let case = TestCaseId::new("FooTest", "testFlaky");

        aggregator.module_started("module").unwrap();
        run_attempt(&mut aggregator, "run", 0, &case, true);
        run_attempt(&mut aggregator, "run", 1, &case, false);
        aggregator.module_ended().unwrap();

        let events = aggregated_events.borrow();
        // The flaky case is reported once, as a pass: no CaseFailed event.
        assert!(
            !events
                .iter()
                .any(|event| matches!(event, RecordedEvent::CaseFailed(..))),
            "expected no failure in {events:?}"
        );
        let case_events: Vec<_> = events
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    RecordedEvent::CaseStarted(_) | RecordedEvent::CaseEnded(_)
                )
            })
            .collect();
        assert_eq!(case_events.len(), 2);
        assert_eq!(*events.last().unwrap(), RecordedEvent::ModuleEnded);
    }

    #[test]
    fn iterations_preserve_every_attempt_in_the_merged_stream() {
        let (mut aggregator, _, aggregated_events) =
            aggregator_with_recorders(RetryStrategy::Iterations);
        let case = TestCaseId::new("FooTest", "testIter");

        aggregator.module_started("module").unwrap();
        run_attempt(&mut aggregator, "run", 0, &case, false);
        run_attempt(&mut aggregator, "run", 1, &case, true);
        run_attempt(&mut aggregator, "run", 2, &case, false);
        aggregator.module_ended().unwrap();

        let events = aggregated_events.borrow();
        let (started, _) = count_run_envelopes(&events, "run");
        assert_eq!(started, 1, "one envelope even with keep-all merging");
        let case_started = events
            .iter()
            .filter(|event| matches!(event, RecordedEvent::CaseStarted(_)))
            .count();
        assert_eq!(case_started, 3, "every iteration's data point survives");
    }

    #[test]
    fn each_module_run_name_gets_its_own_envelope() {
        let (mut aggregator, _, aggregated_events) =
            aggregator_with_recorders(RetryStrategy::RetryAnyFailure);
        let case_a = TestCaseId::new("FooTest", "testA");
        let case_b = TestCaseId::new("BarTest", "testB");

        aggregator.module_started("module").unwrap();
        run_attempt(&mut aggregator, "run-a", 0, &case_a, false);
        run_attempt(&mut aggregator, "run-b", 0, &case_b, false);
        aggregator.module_ended().unwrap();

        let events = aggregated_events.borrow();
        let (started_a, _) = count_run_envelopes(&events, "run-a");
        let (started_b, _) = count_run_envelopes(&events, "run-b");
        assert_eq!((started_a, started_b), (1, 1));
    }

    #[test]
    fn modules_do_not_cross_contaminate() {
        let (mut aggregator, _, aggregated_events) =
            aggregator_with_recorders(RetryStrategy::RetryAnyFailure);
        let case = TestCaseId::new("FooTest", "testBar");

        aggregator.module_started("first").unwrap();
        run_attempt(&mut aggregator, "run", 0, &case, true);
        aggregator.module_ended().unwrap();

        // The same run name in a new module starts from scratch.
        aggregator.module_started("second").unwrap();
        run_attempt(&mut aggregator, "run", 0, &case, false);
        aggregator.module_ended().unwrap();

        let events = aggregated_events.borrow();
        let (started, ended) = count_run_envelopes(&events, "run");
        assert_eq!((started, ended), (2, 2));
        let failures = events
            .iter()
            .filter(|event| matches!(event, RecordedEvent::CaseFailed(..)))
            .count();
        assert_eq!(failures, 1, "only the first module's failure is reported");
    }

    #[test]
    fn pure_runs_flush_when_a_different_name_starts() {
        let (mut aggregator, _, aggregated_events) =
            aggregator_with_recorders(RetryStrategy::RetryAnyFailure);
        let case = TestCaseId::new("FooTest", "testBar");

        run_attempt(&mut aggregator, "first", 0, &case, true);
        run_attempt(&mut aggregator, "first", 1, &case, false);
        assert!(aggregated_events.borrow().is_empty());

        run_attempt(&mut aggregator, "second", 0, &case, false);
        {
            let events = aggregated_events.borrow();
            let (started, _) = count_run_envelopes(&events, "first");
            assert_eq!(started, 1, "starting `second` finalized `first`");
            let (started, _) = count_run_envelopes(&events, "second");
            assert_eq!(started, 0, "`second` is still buffered");
        }

        aggregator.session_ended(Duration::from_secs(60)).unwrap();
        let events = aggregated_events.borrow();
        let (started, _) = count_run_envelopes(&events, "second");
        assert_eq!(started, 1);
        assert_eq!(*events.last().unwrap(), RecordedEvent::SessionEnded);
    }

    #[test]
    fn run_failure_on_final_attempt_reaches_aggregated_listeners() {
        let (mut aggregator, _, aggregated_events) =
            aggregator_with_recorders(RetryStrategy::RetryAnyFailure);
        let case = TestCaseId::new("FooTest", "testBar");

        aggregator.module_started("module").unwrap();
        run_attempt(&mut aggregator, "run", 0, &case, true);
        aggregator.run_started("run", 1, 1, t(100)).unwrap();
        aggregator.run_failed("process crashed").unwrap();
        aggregator
            .run_ended(Duration::from_secs(1), &IndexMap::new())
            .unwrap();
        aggregator.module_ended().unwrap();

        let events = aggregated_events.borrow();
        assert!(
            events
                .iter()
                .any(|event| *event == RecordedEvent::RunFailed("process crashed".to_owned())),
            "expected run failure in {events:?}"
        );
    }

    #[test]
    fn winning_log_associations_are_replayed() {
        let (mut aggregator, _, aggregated_events) =
            aggregator_with_recorders(RetryStrategy::RetryAnyFailure);
        let case = TestCaseId::new("FooTest", "testBar");

        aggregator.module_started("module").unwrap();
        // Attempt 0: failure with a screenshot attached to the case.
        aggregator.run_started("run", 1, 0, t(0)).unwrap();
        aggregator.case_started(&case, t(1)).unwrap();
        aggregator.case_failed(&case, "trace").unwrap();
        aggregator
            .log_association("screenshot-attempt0", &LogFile::new("/logs/0.png"))
            .unwrap();
        aggregator.case_ended(&case, t(2), &IndexMap::new()).unwrap();
        aggregator
            .run_ended(Duration::from_secs(1), &IndexMap::new())
            .unwrap();
        // Attempt 1: pass, with its own artifact.
        aggregator.run_started("run", 1, 1, t(100)).unwrap();
        aggregator.case_started(&case, t(101)).unwrap();
        aggregator
            .log_association("screenshot-attempt1", &LogFile::new("/logs/1.png"))
            .unwrap();
        aggregator
            .case_ended(&case, t(102), &IndexMap::new())
            .unwrap();
        aggregator
            .run_ended(Duration::from_secs(1), &IndexMap::new())
            .unwrap();
        aggregator.module_ended().unwrap();

        let events = aggregated_events.borrow();
        assert!(
            events
                .iter()
                .any(|event| *event
                    == RecordedEvent::LogAssociation("screenshot-attempt1".to_owned()))
        );
        // The superseded attempt's artifact is not re-associated.
        assert!(
            !events
                .iter()
                .any(|event| *event
                    == RecordedEvent::LogAssociation("screenshot-attempt0".to_owned()))
        );
    }

    #[test]
    fn log_saved_is_detailed_only() {
        let (mut aggregator, detailed_events, aggregated_events) =
            aggregator_with_recorders(RetryStrategy::RetryAnyFailure);
        aggregator
            .log_saved("host-log", &LogFile::new("/logs/host.txt"))
            .unwrap();
        assert_eq!(
            *detailed_events.borrow(),
            [RecordedEvent::LogSaved("host-log".to_owned())]
        );
        assert!(aggregated_events.borrow().is_empty());
    }
}
