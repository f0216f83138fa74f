//! In-memory fixed-window rate limiting for contact submissions.
//!
//! Counts submissions per client key (the caller's IP) and refuses once the
//! limit for the current window is reached. State is per process; behind a
//! load balancer each instance counts on its own.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default submissions allowed per window.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

/// Returned when a key is over its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    /// Time until the window resets.
    pub retry_after: Duration,
}

/// Fixed-window counter keyed by client.
#[derive(Debug)]
pub struct RateLimiter {
    max_attempts: u32,
    window: Duration,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Count one attempt for `key`.
    pub fn check(&self, key: &str) -> Result<(), RateLimited> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), RateLimited> {
        let mut entries = self.entries.lock();

        // Drop expired windows so the map does not grow without bound.
        let window = self.window;
        entries.retain(|_, entry| now.duration_since(entry.window_start) < window);

        let entry = entries.entry(key.to_string()).or_insert_with(|| RateLimitEntry {
            count: 0,
            window_start: now,
        });

        if entry.count >= self.max_attempts {
            let elapsed = now.duration_since(entry.window_start);
            let retry_after = self.window.saturating_sub(elapsed).max(Duration::from_secs(1));
            tracing::warn!(
                key = %key,
                count = entry.count,
                limit = self.max_attempts,
                "Rate limit exceeded"
            );
            return Err(RateLimited { retry_after });
        }

        entry.count += 1;
        Ok(())
    }
}
