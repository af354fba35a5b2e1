// Copyright (c) The retry-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed retry configuration.
//!
//! The retry core is configured explicitly at construction time: there is no
//! discovery or reflection involved. [`RetryConfig`] derives `Deserialize` so
//! harness frontends can embed it in their own profile files, with
//! [`deserialize_retry_config`] accepting the shorthand integer form.

use serde::Deserialize;
use std::{cmp::Ordering, fmt};

/// The retry strategy applied when a test unit finishes an attempt with
/// failures (or, for [`Iterations`](Self::Iterations), regardless of outcome).
#[derive(Debug, Copy, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// Never retry. A test unit executes exactly once.
    #[default]
    NoRetry,

    /// Rerun every attempt unconditionally, regardless of outcome. The retry
    /// engine always says yes; the attempt cap is enforced by the executor.
    Iterations,

    /// Rerun only while every attempt so far was clean. The first run failure
    /// or failed case stops further reruns.
    RerunUntilFailure,

    /// Retry only the failed or incomplete cases, narrowing the test unit's
    /// include filters on each retry. This is the default "smart" retry.
    RetryAnyFailure,
}

/// Upper bound on the number of distinct failed cases a filtered retry will
/// target. Past this point a retry costs more than it is worth, so the engine
/// skips it.
pub const MAX_FILTERED_RETRY_CASES: usize = 75;

/// Retry configuration for a test unit.
#[derive(Debug, Copy, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RetryConfig {
    /// The retry strategy.
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// The total number of attempts a test unit may execute, including the
    /// first one. Always at least 1.
    pub max_attempts: usize,

    /// Reboot the device before the final allowed attempt.
    #[serde(default)]
    pub reboot_at_last_attempt: bool,
}

impl Default for RetryConfig {
    #[inline]
    fn default() -> Self {
        Self::no_retry()
    }
}

impl RetryConfig {
    /// Creates a new configuration with the given strategy and attempt cap.
    pub fn new(strategy: RetryStrategy, max_attempts: usize) -> Self {
        Self {
            strategy,
            max_attempts,
            reboot_at_last_attempt: false,
        }
    }

    /// Creates a configuration that never retries.
    pub fn no_retry() -> Self {
        Self::new(RetryStrategy::NoRetry, 1)
    }

    /// Sets whether the device is rebooted before the final allowed attempt.
    pub fn with_reboot_at_last_attempt(mut self, reboot: bool) -> Self {
        self.reboot_at_last_attempt = reboot;
        self
    }
}

/// Deserializes a [`RetryConfig`], accepting either a table or a bare integer.
///
/// A bare integer is the retry count: `0` means no retries, and `N > 0` means
/// [`RetryStrategy::RetryAnyFailure`] with `N + 1` total attempts.
pub fn deserialize_retry_config<'de, D>(deserializer: D) -> Result<Option<RetryConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct V;

    impl<'de2> serde::de::Visitor<'de2> for V {
        type Value = Option<RetryConfig>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(
                formatter,
                "a table ({{ strategy = \"retry-any-failure\", max-attempts = 3, \
                 reboot-at-last-attempt = true }}) or a retry count (2)"
            )
        }

        // Note that TOML uses i64, not u64.
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            match v.cmp(&0) {
                Ordering::Equal => Ok(Some(RetryConfig::no_retry())),
                Ordering::Greater => {
                    let v = usize::try_from(v).map_err(|_| {
                        serde::de::Error::invalid_value(
                            serde::de::Unexpected::Signed(v),
                            &"a retry count that fits in usize",
                        )
                    })?;
                    Ok(Some(RetryConfig::new(
                        RetryStrategy::RetryAnyFailure,
                        v + 1,
                    )))
                }
                Ordering::Less => Err(serde::de::Error::invalid_value(
                    serde::de::Unexpected::Signed(v),
                    &self,
                )),
            }
        }

        fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::MapAccess<'de2>,
        {
            RetryConfig::deserialize(serde::de::value::MapAccessDeserializer::new(map)).map(Some)
        }
    }

    // Post-deserialize validation of the retry config.
    let retry_config = deserializer.deserialize_any(V)?;
    if let Some(config) = &retry_config {
        if config.max_attempts == 0 {
            return Err(serde::de::Error::custom("`max-attempts` cannot be zero"));
        }
        if config.strategy == RetryStrategy::NoRetry {
            if config.max_attempts > 1 {
                return Err(serde::de::Error::custom(
                    "`max-attempts` must be 1 when strategy is `no-retry`",
                ));
            }
            if config.reboot_at_last_attempt {
                return Err(serde::de::Error::custom(
                    "`reboot-at-last-attempt` has no effect when strategy is `no-retry`",
                ));
            }
        }
    }

    Ok(retry_config)
}
