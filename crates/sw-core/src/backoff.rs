//! Bounded exponential backoff.
//!
//! Retry policy is a plain value, independent of whatever transport is being
//! retried. Callers pull delays from [`BackoffPolicy::delays`] until it runs
//! dry, at which point the total wait budget is spent.

use std::time::Duration;

/// Exponential backoff with a cap on each delay and on the total wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// First delay. Doubles after every attempt.
    pub initial: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Upper bound for the sum of all delays.
    pub max_elapsed: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_elapsed: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// A policy that never waits; the first failure is final.
    pub const fn none() -> Self {
        Self {
            initial: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_elapsed: Duration::ZERO,
        }
    }

    /// Starts a fresh sequence of delays.
    pub const fn delays(&self) -> BackoffDelays {
        BackoffDelays {
            next: self.initial,
            max_delay: self.max_delay,
            remaining: self.max_elapsed,
        }
    }
}

/// The delays of one retry sequence.
#[derive(Debug, Clone)]
pub struct BackoffDelays {
    next: Duration,
    max_delay: Duration,
    remaining: Duration,
}

impl BackoffDelays {
    /// Next delay, stretched to honour a server-supplied hint (e.g. a
    /// `Retry-After` header) but never beyond the remaining budget.
    ///
    /// Returns `None` once the budget is exhausted.
    pub fn next_with_hint(&mut self, hint: Option<Duration>) -> Option<Duration> {
        if self.remaining.is_zero() {
            return None;
        }
        let computed = self.next.min(self.max_delay);
        let delay = hint.map_or(computed, |hint| hint.max(computed)).min(self.remaining);
        if delay.is_zero() {
            return None;
        }
        self.remaining -= delay;
        self.next = self.next.saturating_mul(2);
        Some(delay)
    }

    /// Wait budget not yet handed out.
    pub const fn remaining(&self) -> Duration {
        self.remaining
    }
}

impl Iterator for BackoffDelays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.next_with_hint(None)
    }
}
