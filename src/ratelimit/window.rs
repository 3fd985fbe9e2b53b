//! Fixed-window state and window arithmetic.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// How a new window's end time is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowAlignment {
    /// The window opens with the first request and lasts one full window.
    #[default]
    FirstRequest,
    /// Windows are fixed slots counted from the Unix epoch; a new entry
    /// expires at the end of the slot containing `now`.
    Epoch,
}

impl WindowAlignment {
    /// End of the window that a request at `now` would open. Saturates at
    /// the latest representable time instead of overflowing.
    pub fn window_end(&self, now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
        match self {
            WindowAlignment::FirstRequest => saturating_add(now, window),
            WindowAlignment::Epoch => {
                let Ok(window_ms) = i64::try_from(window.as_millis().max(1)) else {
                    return saturating_add(now, window);
                };
                now.timestamp_millis()
                    .div_euclid(window_ms)
                    .checked_add(1)
                    .and_then(|slot| slot.checked_mul(window_ms))
                    .and_then(|slot_end| Utc.timestamp_millis_opt(slot_end).single())
                    .unwrap_or_else(|| saturating_add(now, window))
            }
        }
    }
}

/// The stored state of one key's current window.
///
/// `expires_at` is fixed when the window opens; only `count` changes while
/// the window is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowEntry {
    /// Requests counted in this window, including rejected ones.
    pub count: u64,
    /// End of the window.
    pub expires_at: DateTime<Utc>,
}

impl WindowEntry {
    /// A fresh window holding the request that opened it.
    pub fn open(expires_at: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            expires_at,
        }
    }

    /// Whether the window is still running at `now`. A request arriving
    /// exactly at `expires_at` belongs to a new window.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// The same window with one more request counted.
    pub fn incremented(self) -> Self {
        Self {
            count: self.count.saturating_add(1),
            ..self
        }
    }

    /// Whole seconds until the window ends, rounded up. Never less than one
    /// while the window is live.
    pub fn seconds_until_reset(&self, now: DateTime<Utc>) -> u64 {
        let remaining = (self.expires_at - now).to_std().unwrap_or(Duration::ZERO);
        ceil_secs(remaining).max(1)
    }

    /// Time left before a store should drop this entry.
    pub fn time_to_live(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Round a duration up to whole seconds.
pub fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

fn saturating_add(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| now.checked_add_signed(window))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
