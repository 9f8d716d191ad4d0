//! In-memory per-key request throttling.
//!
//! Each key (typically a client IP) owns a counter and the instant its window
//! opened. The window is half-open: a request at `window_start + window` or
//! later starts a fresh window at the current time. This is a fixed window
//! anchored at the first request, not a token bucket.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use turnstile_core::{SystemClock, config::RateLimitConfig, services::RateLimiter};
//!
//! let limiter = RateLimiter::new(RateLimitConfig::default(), Arc::new(SystemClock));
//! let decision = limiter.check_and_record("203.0.113.7");
//! assert!(decision.allowed);
//! assert_eq!(decision.current, 1);
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::{clock::Clock, config::RateLimitConfig};

/// Counter state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub window_start: DateTime<Utc>,
    pub count: u32,
}

impl RateLimitWindow {
    /// Saturates instead of overflowing, so an enormous window never expires.
    fn expires_at(&self, window: Duration) -> DateTime<Utc> {
        self.window_start
            .checked_add_signed(window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Outcome of one [`RateLimiter::check_and_record`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests counted in the current window, including this one if admitted.
    pub current: u32,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the window resets. Only set on rejection.
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    fn unlimited() -> Self {
        Self {
            allowed: true,
            current: 0,
            limit: u32::MAX,
            remaining: u32::MAX,
            retry_after: None,
        }
    }

    /// `retry_after` in whole seconds, rounded up.
    pub fn retry_after_seconds(&self) -> Option<i64> {
        self.retry_after.map(|d| {
            let millis = d.num_milliseconds().max(0);
            (millis + 999) / 1000
        })
    }
}

/// Concurrent fixed-window rate limiter.
///
/// Updates for one key are atomic: the check and the increment happen under
/// the same map entry lock, so two racing requests can never both take the
/// last slot.
pub struct RateLimiter {
    windows: DashMap<String, RateLimitWindow>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Count a request for `key` and decide whether it is admitted.
    ///
    /// Admitted requests increment the counter. Rejected requests leave it at
    /// the limit, so a client hammering a closed window does not push its
    /// reset further out.
    pub fn check_and_record(&self, key: &str) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision::unlimited();
        }

        let now = self.clock.now();
        let limit = self.config.max_requests;
        let window = self.config.window;

        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(RateLimitWindow {
                window_start: now,
                count: 0,
            });

        if now >= entry.expires_at(window) {
            *entry = RateLimitWindow {
                window_start: now,
                count: 0,
            };
        }

        if entry.count >= limit {
            let retry_after = entry.expires_at(window) - now;
            return RateLimitDecision {
                allowed: false,
                current: entry.count,
                limit,
                remaining: 0,
                retry_after: Some(retry_after),
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            current: entry.count,
            limit,
            remaining: limit - entry.count,
            retry_after: None,
        }
    }

    /// Forget the window for `key`. Returns whether one existed.
    pub fn reset(&self, key: &str) -> bool {
        self.windows.remove(key).is_some()
    }

    /// Remove every window that has fully elapsed.
    ///
    /// # Returns
    ///
    /// The number of windows removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let window = self.config.window;
        let before = self.windows.len();
        self.windows.retain(|_, w| now < w.expires_at(window));
        before.saturating_sub(self.windows.len())
    }

    /// Current window for `key`, if any.
    pub fn window(&self, key: &str) -> Option<RateLimitWindow> {
        self.windows.get(key).map(|w| *w)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
