// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Retry strategies for remote calls
//!
//! A proxy call that hits a stale placement (`PositionChanged`) re-resolves the actor and sends
//! again. The strategy decides how many extra attempts are made and how long to wait before
//! each of them.
//!

use serde::{Deserialize, Serialize};

use std::{fmt::Debug, time::Duration};

use backoff::backoff::Backoff as InnerBackoff;

/// Trait to define a RetryStrategy. You can use this trait to define your
/// custom retry strategy.
pub trait RetryStrategy: Debug + Send + Sync {
    /// Maximum number of retries after the first attempt.
    fn max_retries(&self) -> usize;
    /// Wait duration before the next retry. `None` retries immediately.
    fn next_backoff(&mut self) -> Option<Duration>;
}

/// Backoff applied between proxy attempts, as read from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
    /// Retry immediately.
    #[default]
    None,
    /// Wait the same interval before every retry.
    Fixed,
    /// Exponentially growing wait, starting at the configured interval.
    Exponential,
}

impl RetryBackoff {
    /// Builds a fresh strategy for one call.
    pub fn strategy(
        &self,
        max_retries: usize,
        interval: Duration,
    ) -> Box<dyn RetryStrategy> {
        match self {
            RetryBackoff::None => Box::new(NoIntervalStrategy::new(max_retries)),
            RetryBackoff::Fixed => {
                Box::new(FixedIntervalStrategy::new(max_retries, interval))
            }
            RetryBackoff::Exponential => Box::new(
                ExponentialBackoffStrategy::with_initial_interval(
                    max_retries,
                    interval,
                ),
            ),
        }
    }
}

/// A Retry strategy that immediately retries.
#[derive(Debug, Default)]
pub struct NoIntervalStrategy {
    max_retries: usize,
}

impl NoIntervalStrategy {
    pub fn new(max_retries: usize) -> Self {
        NoIntervalStrategy { max_retries }
    }
}

impl RetryStrategy for NoIntervalStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        None
    }
}

/// A retry strategy that waits a fixed period before retrying.
#[derive(Debug, Default)]
pub struct FixedIntervalStrategy {
    /// Maximum number of retries.
    max_retries: usize,
    /// Wait duration before retrying.
    duration: Duration,
}

impl FixedIntervalStrategy {
    pub fn new(max_retries: usize, duration: Duration) -> Self {
        FixedIntervalStrategy {
            max_retries,
            duration,
        }
    }
}

impl RetryStrategy for FixedIntervalStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        Some(self.duration)
    }
}

/// A retry strategy with an exponential backoff wait period before
/// retrying.
#[derive(Debug)]
pub struct ExponentialBackoffStrategy {
    /// Maximum number of retries.
    max_retries: usize,
    /// Inner exponential backoff strategy.
    inner: backoff::ExponentialBackoff,
}

impl ExponentialBackoffStrategy {
    /// Starts the backoff at `interval` instead of the library default.
    pub fn with_initial_interval(max_retries: usize, interval: Duration) -> Self {
        let inner = backoff::ExponentialBackoff {
            initial_interval: interval,
            current_interval: interval,
            ..backoff::ExponentialBackoff::default()
        };
        ExponentialBackoffStrategy { max_retries, inner }
    }
}

impl RetryStrategy for ExponentialBackoffStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.inner.next_backoff()
    }
}
