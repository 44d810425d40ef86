//! Per-client rate limiter.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::counter::{Decision, RateWindow};

/// Default number of requests admitted per window.
pub const DEFAULT_LIMIT: u64 = 10;
/// Default window length.
pub const DEFAULT_WINDOW_SECS: i64 = 60;

/// Quota applied to every client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Maximum requests allowed in the time window
    pub limit: u64,
    /// Length of the time window
    pub window: Duration,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: Duration::seconds(DEFAULT_WINDOW_SECS),
        }
    }
}

/// Fixed-window rate limiter keyed by client identity.
///
/// The read-reset-increment for one client runs under that client's map entry
/// lock, so concurrent requests from the same client never share a stale view
/// of the window. Distinct clients do not serialize on a global lock.
pub struct RateLimiter {
    /// One window per client key
    windows: DashMap<String, RateWindow>,
    config: LimitConfig,
    /// When the last capacity-triggered sweep ran
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl RateLimiter {
    /// Create a rate limiter with the default quota of 10 requests per minute.
    pub fn new() -> Self {
        Self::with_config(LimitConfig::default())
    }

    pub fn with_config(config: LimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
            last_sweep: Mutex::new(None),
        }
    }

    /// Count a request from `client_key` at `now` and decide whether to admit it.
    pub fn admit(&self, client_key: &str, now: DateTime<Utc>) -> Decision {
        let LimitConfig { limit, window } = self.config;

        trace!(client = %client_key, "Checking rate limit");

        let decision = match self.windows.get_mut(client_key) {
            Some(mut entry) => entry.record(now, limit, window),
            None => {
                debug!(client = %client_key, limit, "Creating rate window");
                self.windows
                    .entry(client_key.to_owned())
                    .or_insert_with(|| RateWindow::new(now))
                    .record(now, limit, window)
            }
        };

        if let Decision::Deny { retry_after } = decision {
            debug!(
                client = %client_key,
                retry_after_secs = retry_after.num_seconds(),
                "Rate limit exceeded"
            );
        }

        decision
    }

    /// Drop windows that have ended as of `now`. Returns how many were removed.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let window = self.config.window;
        let before = self.windows.len();
        self.windows.retain(|_, entry| entry.contains(now, window));
        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            debug!(evicted, "Evicted expired rate windows");
        }
        evicted
    }

    /// Evict expired windows if more than `capacity` clients are tracked.
    ///
    /// The cap is soft. Sweeps run at most once per window length, and a table
    /// full of live windows keeps growing until those windows end.
    pub fn evict_if_over(&self, capacity: usize, now: DateTime<Utc>) -> usize {
        if self.windows.len() <= capacity {
            return 0;
        }

        {
            // Another caller is already deciding whether to sweep.
            let Some(mut last) = self.last_sweep.try_lock() else {
                return 0;
            };
            if let Some(at) = *last {
                if now >= at && now - at < self.config.window {
                    return 0;
                }
            }
            *last = Some(now);
        }

        self.evict_expired(now)
    }

    /// Requests counted for `client_key` in its current window, if tracked.
    pub fn count_for(&self, client_key: &str) -> Option<u64> {
        self.windows.get(client_key).map(|entry| entry.count())
    }

    /// Get the number of tracked clients.
    pub fn client_count(&self) -> usize {
        self.windows.len()
    }

    /// Clear all windows.
    pub fn clear(&self) {
        self.windows.clear();
    }

    pub fn config(&self) -> LimitConfig {
        self.config
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
