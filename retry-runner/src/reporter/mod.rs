// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Result reporting: the listener event surface and the aggregating
//! forwarder that sits between the executor and downstream consumers.

mod aggregator;
mod collector;
mod listener;
#[cfg(test)]
pub(crate) mod test_helpers;

pub use aggregator::*;
pub use collector::*;
pub use listener::*;
