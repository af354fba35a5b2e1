// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Result records produced by test execution.
//!
//! The main types here are [`RunResult`], recorded incrementally as a run
//! executes, and [`AttemptHistory`], the ordered attempts for one run name.

mod artifacts;
mod merge;
mod run_result;
mod test_case;

pub use artifacts::*;
pub use merge::*;
pub use run_result::*;
pub use test_case::*;
