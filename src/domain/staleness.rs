//! Staleness policy: decides whether a recorded timestamp is too old.

use serde::{Deserialize, Serialize};

/// Default allowed lag between a node refresh and the check: one day.
pub const DEFAULT_MAX_LAG_SECS: u64 = 86_400;

/// Allowed age for any timestamp a node records (identity or zone refresh).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessPolicy {
    pub max_lag_secs: u64,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            max_lag_secs: DEFAULT_MAX_LAG_SECS,
        }
    }
}

impl StalenessPolicy {
    pub fn new(max_lag_secs: u64) -> Self {
        Self { max_lag_secs }
    }

    /// Returns the human-readable age when `updated_at` is at least
    /// `max_lag_secs` older than `now`, `None` when still fresh.
    ///
    /// Both timestamps are unix seconds. A timestamp from the future is fresh.
    pub fn is_stale(&self, updated_at: i64, now: i64) -> Option<String> {
        let age = now.saturating_sub(updated_at);
        if age < 0 {
            return None;
        }
        let age = age as u64;
        (age >= self.max_lag_secs).then(|| format_duration(age))
    }
}

/// Render a number of seconds using the largest unit it fits in
/// (Secs, Mins, Hours) with one decimal place.
pub fn format_duration(seconds: u64) -> String {
    let mut value = seconds as f64;
    for unit in ["Secs", "Mins"] {
        if value < 60.0 {
            return format!("{:3.1} {}", value, unit);
        }
        value /= 60.0;
    }
    format!("{:3.1} Hours", value)
}
