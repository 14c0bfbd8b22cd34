//! Persisted sliding-window rate limiter.
//!
//! Call timestamps (epoch millis) live in the user-data blob under
//! `rate_limiter_{key}`, so the window survives restarts.

use std::time::Duration;

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::storage::SharedUserData;

pub const DEFAULT_MAX_CALLS: usize = 60;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);

pub struct RateLimiter {
    data: SharedUserData,
    storage_key: String,
    max_calls: usize,
    window_ms: i64,
}

impl RateLimiter {
    /// 60 calls per hour.
    pub fn new(data: SharedUserData, key: &str) -> Self {
        Self::with_limits(data, key, DEFAULT_MAX_CALLS, DEFAULT_WINDOW)
    }

    pub fn with_limits(data: SharedUserData, key: &str, max_calls: usize, window: Duration) -> Self {
        Self {
            data,
            storage_key: format!("rate_limiter_{key}"),
            max_calls,
            window_ms: i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
        }
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Record a call if the window has room. Returns `Err(retry_after_secs)`
    /// if exceeded.
    pub fn check(&self, now: NaiveDateTime) -> Result<(), u64> {
        let now_ms = now.and_utc().timestamp_millis();
        let Ok(mut data) = self.data.lock() else {
            tracing::error!(key = %self.storage_key, "User data lock poisoned, denying call");
            return Err(self.window_secs());
        };

        let mut records = live_records(data.get::<Value>(&self.storage_key), now_ms, self.window_ms);
        if records.len() >= self.max_calls {
            let oldest = records.iter().min().copied().unwrap_or(now_ms);
            let wait_ms = (oldest + self.window_ms - now_ms).max(0);
            let retry_after = u64::try_from(wait_ms).unwrap_or(0).div_ceil(1000);
            tracing::warn!(key = %self.storage_key, retry_after, "Rate limit exceeded");
            return Err(retry_after);
        }

        records.push(now_ms);
        if let Err(e) = data.set(&self.storage_key, &records).and_then(|_| data.save()) {
            tracing::error!(error = %e, key = %self.storage_key, "Failed to record rate-limited call");
        }
        Ok(())
    }

    pub fn remaining_calls(&self, now: NaiveDateTime) -> usize {
        let now_ms = now.and_utc().timestamp_millis();
        let Ok(mut data) = self.data.lock() else {
            return 0;
        };
        let live = live_records(data.get::<Value>(&self.storage_key), now_ms, self.window_ms);
        self.max_calls.saturating_sub(live.len())
    }

    /// Time until the oldest recorded call leaves the window.
    pub fn time_until_reset(&self, now: NaiveDateTime) -> Duration {
        let now_ms = now.and_utc().timestamp_millis();
        let Ok(mut data) = self.data.lock() else {
            return Duration::ZERO;
        };
        let oldest = live_records(data.get::<Value>(&self.storage_key), now_ms, self.window_ms)
            .into_iter()
            .min();
        match oldest {
            Some(oldest) => {
                Duration::from_millis(u64::try_from(oldest + self.window_ms - now_ms).unwrap_or(0))
            }
            None => Duration::ZERO,
        }
    }

    pub fn reset(&self) {
        let Ok(mut data) = self.data.lock() else {
            return;
        };
        if let Err(e) = data.set(&self.storage_key, &Vec::<i64>::new()).and_then(|_| data.save()) {
            tracing::error!(error = %e, key = %self.storage_key, "Failed to reset rate limiter");
        }
    }

    fn window_secs(&self) -> u64 {
        u64::try_from(self.window_ms / 1000).unwrap_or(0)
    }
}

/// Timestamps still inside the window. Accepts the array form and the older
/// JSON-encoded string form.
fn live_records(stored: Option<Value>, now_ms: i64, window_ms: i64) -> Vec<i64> {
    let records: Vec<i64> = match stored {
        Some(Value::String(encoded)) => serde_json::from_str(&encoded).unwrap_or_default(),
        Some(value) => serde_json::from_value(value).unwrap_or_default(),
        None => Vec::new(),
    };
    records
        .into_iter()
        .filter(|ts| now_ms - ts < window_ms)
        .collect()
}
