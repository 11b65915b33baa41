// ABOUTME: Bounded retry policy for pushes.
// ABOUTME: Tracks the attempt counter and the last failure of one operation.

use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(5);

/// How many times to try and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn state<E>(&self) -> RetryState<E> {
        RetryState {
            attempt: 0,
            max_attempts: self.max_attempts.max(1),
            last_error: None,
        }
    }
}

/// Progress through a retry loop. `attempt` is 0-based.
#[derive(Debug)]
pub struct RetryState<E> {
    attempt: u32,
    max_attempts: u32,
    last_error: Option<E>,
}

impl<E> RetryState<E> {
    /// Index of the attempt currently running.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Record a failed attempt. Returns true and moves to the next attempt
    /// when one remains.
    pub fn record_failure(&mut self, err: E) -> bool {
        self.last_error = Some(err);
        if self.attempt + 1 < self.max_attempts {
            self.attempt += 1;
            true
        } else {
            false
        }
    }

    pub fn last_error(&self) -> Option<&E> {
        self.last_error.as_ref()
    }

    /// Attempts made so far, counting the current one.
    pub fn attempts_made(&self) -> u32 {
        self.attempt + 1
    }

    pub fn into_last_error(self) -> Option<E> {
        self.last_error
    }
}
