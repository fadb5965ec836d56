//! Reconnection backoff for the engine connection.
//!
//! Pure arithmetic so the schedule can be tested without a socket or a clock.

use std::time::Duration;

pub const INITIAL_RETRY_DELAY_MS: u64 = 1_000;
pub const MAX_RETRY_DELAY_MS: u64 = 30_000;
pub const MAX_RETRY_ATTEMPTS: u32 = 10;
pub const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Exponential backoff: 1s, 2s, 4s ... capped at 30s, for at most 10 attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffState {
    attempts: u32,
    delay_ms: u64,
    max_attempts: u32,
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::with_max_attempts(MAX_RETRY_ATTEMPTS)
    }
}

impl BackoffState {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            delay_ms: INITIAL_RETRY_DELAY_MS,
            max_attempts,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Delay to wait before the next attempt, or `None` once exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        let current = self.delay_ms;
        self.attempts += 1;
        self.delay_ms =
            ((self.delay_ms as f64) * BACKOFF_MULTIPLIER).min(MAX_RETRY_DELAY_MS as f64) as u64;
        Some(Duration::from_millis(current))
    }
}
