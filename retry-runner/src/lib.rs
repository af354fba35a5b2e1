// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Retry decisions and result aggregation for flaky test harnesses.
//!
//! This crate is the policy core of a test harness that reruns flaky or failed
//! test units: it decides whether an attempt should be retried (optionally
//! narrowing the retried unit to just the failed cases), accumulates every
//! attempt's results, and merges them into a single coherent stream for result
//! consumers that expect exactly one report per run.
//!
//! The crate does not execute tests itself. It is driven by an external,
//! sequential executor through the [`test_unit`] traits and the
//! [`reporter::ResultListener`] event surface.

pub mod config;
pub mod errors;
pub mod reporter;
pub mod results;
pub mod retry;
pub mod test_unit;
