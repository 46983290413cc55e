//! Per-session sliding-window rate limiting
//!
//! Every attempt is recorded, including rejected ones, so a member who
//! keeps sending while limited keeps the window full.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding-window message counter
///
/// Owned by a single session; only its input loop calls `check`.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            timestamps: VecDeque::with_capacity(limit * 2),
        }
    }

    /// Record an attempt now
    ///
    /// Returns the time to wait on rejection.
    pub fn check(&mut self) -> Result<(), Duration> {
        self.check_at(Instant::now())
    }

    /// Record an attempt at `now`
    pub fn check_at(&mut self, now: Instant) -> Result<(), Duration> {
        self.timestamps.push_back(now);

        if let Some(cutoff) = now.checked_sub(self.window) {
            while self.timestamps.front().is_some_and(|ts| *ts <= cutoff) {
                self.timestamps.pop_front();
            }
        }

        // Keep the record bounded under sustained spam
        while self.timestamps.len() > self.limit * 2 {
            self.timestamps.pop_front();
        }

        if self.timestamps.len() <= self.limit {
            return Ok(());
        }

        let oldest = self.timestamps.front().copied().unwrap_or(now);
        Err((oldest + self.window).saturating_duration_since(now))
    }

    /// Attempts currently inside the window, for display
    pub fn recent(&self) -> usize {
        self.timestamps.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
