// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The retry decision engine and its statistics.

mod engine;
mod statistics;

pub use engine::*;
pub use statistics::*;
