//! Core fixed-window rate limiter implementation.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use super::store::{StoreError, WindowStore};
use super::window::{ceil_secs, WindowAlignment, WindowEntry};

/// Default number of requests admitted per window.
pub const DEFAULT_LIMIT: u64 = 100;
/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);
/// Default number of per-key lock stripes.
pub const DEFAULT_LOCK_STRIPES: usize = 64;

/// What the limiter answers when the window store fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Admit every request while the store is unavailable.
    #[default]
    Open,
    /// Reject every request while the store is unavailable.
    Closed,
}

/// Settings fixed at limiter construction.
#[derive(Debug, Clone)]
pub struct LimiterSettings {
    /// Maximum requests admitted per window
    pub limit: u64,
    /// Length of a window
    pub window: Duration,
    /// Behaviour when the store cannot be used
    pub failure_policy: FailurePolicy,
    /// How window end times are chosen
    pub alignment: WindowAlignment,
    /// Number of lock stripes serializing same-key checks
    pub lock_stripes: usize,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
            failure_policy: FailurePolicy::default(),
            alignment: WindowAlignment::default(),
            lock_stripes: DEFAULT_LOCK_STRIPES,
        }
    }
}

/// The outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub admitted: bool,
    /// Seconds until the client's window resets; set only on rejection
    pub retry_after_secs: Option<u64>,
}

impl Decision {
    pub fn admit() -> Self {
        Self {
            admitted: true,
            retry_after_secs: None,
        }
    }

    pub fn reject(retry_after_secs: u64) -> Self {
        Self {
            admitted: false,
            retry_after_secs: Some(retry_after_secs.max(1)),
        }
    }
}

/// A per-key fixed-window rate limiter over an injected [`WindowStore`].
///
/// Checks for the same key are serialized through a fixed set of async lock
/// stripes, so the read-modify-write on a key's entry is atomic with respect
/// to every other check made through this limiter. Keys hashing to
/// different stripes proceed independently.
pub struct FixedWindowLimiter<S: WindowStore> {
    /// Backing store for window entries
    store: Arc<S>,
    /// Construction-time settings
    settings: LimiterSettings,
    /// Per-key serialization; a key always maps to the same stripe
    stripes: Box<[Mutex<()>]>,
}

impl<S: WindowStore> FixedWindowLimiter<S> {
    /// Create a new limiter over `store`.
    pub fn new(store: Arc<S>, settings: LimiterSettings) -> Self {
        let stripes = (0..settings.lock_stripes.max(1))
            .map(|_| Mutex::new(()))
            .collect();

        Self {
            store,
            settings,
            stripes,
        }
    }

    /// Decide whether a request from `key` at `now` is admitted.
    ///
    /// Every call counts against the key's window, rejected calls included.
    /// Store failures are absorbed according to the configured
    /// [`FailurePolicy`].
    pub async fn check(&self, key: &str, now: DateTime<Utc>) -> Decision {
        match self.try_check(key, now).await {
            Ok(decision) => decision,
            Err(err) => self.on_store_failure(key, err),
        }
    }

    /// Like [`check`](Self::check) but surfaces store failures to the caller.
    pub async fn try_check(&self, key: &str, now: DateTime<Utc>) -> Result<Decision, StoreError> {
        let _guard = self.stripe_for(key).lock().await;

        trace!(key = %key, "Checking rate limit");

        match self.store.get(key).await? {
            Some(entry) if entry.is_live(now) => {
                let entry = entry.incremented();
                self.store.update(key, entry).await?;

                if entry.count > self.settings.limit {
                    let retry_after = entry.seconds_until_reset(now);
                    debug!(
                        key = %key,
                        count = entry.count,
                        limit = self.settings.limit,
                        retry_after_secs = retry_after,
                        "Rate limit exceeded"
                    );
                    Ok(Decision::reject(retry_after))
                } else {
                    Ok(Decision::admit())
                }
            }
            _ => {
                let expires_at = self.settings.alignment.window_end(now, self.settings.window);
                let entry = WindowEntry::open(expires_at);
                debug!(
                    key = %key,
                    expires_at = %expires_at,
                    "Opening new rate limit window"
                );
                self.store.set(key, entry, entry.time_to_live(now)).await?;
                Ok(Decision::admit())
            }
        }
    }

    /// Read the stored entry for `key` without counting a request.
    pub async fn peek(&self, key: &str) -> Result<Option<WindowEntry>, StoreError> {
        self.store.get(key).await
    }

    /// Get the configured per-window limit.
    pub fn limit(&self) -> u64 {
        self.settings.limit
    }

    /// Get the configured window length.
    pub fn window(&self) -> Duration {
        self.settings.window
    }

    /// Get the configured failure policy.
    pub fn failure_policy(&self) -> FailurePolicy {
        self.settings.failure_policy
    }

    fn stripe_for(&self, key: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        &self.stripes[index]
    }

    fn on_store_failure(&self, key: &str, err: StoreError) -> Decision {
        match self.settings.failure_policy {
            FailurePolicy::Open => {
                warn!(key = %key, error = %err, "Window store failed, admitting request");
                Decision::admit()
            }
            FailurePolicy::Closed => {
                warn!(key = %key, error = %err, "Window store failed, rejecting request");
                Decision::reject(ceil_secs(self.settings.window))
            }
        }
    }
}
