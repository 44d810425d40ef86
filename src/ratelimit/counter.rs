//! Fixed-window request counter.

use chrono::{DateTime, Duration, Utc};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request is within quota.
    Allow {
        /// Requests still available in the current window
        remaining: u64,
    },
    /// The request exceeded the quota.
    Deny {
        /// Time until the current window ends
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// Request count for one client within one window.
///
/// A window covers `[window_start, window_start + window)`. Calls that land
/// outside it start a fresh window at the call time.
#[derive(Debug, Clone)]
pub struct RateWindow {
    /// When the current window started
    window_start: DateTime<Utc>,
    /// Requests seen in this window, denied ones included
    count: u64,
}

impl RateWindow {
    /// Create an empty window starting at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    /// Count one request and decide whether it is within `limit`.
    ///
    /// A denied request is not rolled back.
    pub fn record(&mut self, now: DateTime<Utc>, limit: u64, window: Duration) -> Decision {
        if !self.contains(now, window) {
            self.window_start = now;
            self.count = 0;
        }

        self.count += 1;

        if self.count > limit {
            Decision::Deny {
                retry_after: self.until_reset(now, window),
            }
        } else {
            Decision::Allow {
                remaining: limit - self.count,
            }
        }
    }

    /// Whether `now` falls inside the current window.
    pub fn contains(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now >= self.window_start && now < self.window_end(window)
    }

    /// Time left until the window ends, zero if it already has.
    pub fn until_reset(&self, now: DateTime<Utc>, window: Duration) -> Duration {
        let end = self.window_end(window);
        if now >= end {
            Duration::zero()
        } else {
            end - now
        }
    }

    // Saturates at the latest representable instant.
    fn window_end(&self, window: Duration) -> DateTime<Utc> {
        self.window_start
            .checked_add_signed(window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }
}
