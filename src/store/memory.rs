//! In-memory expiring window store.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::ratelimit::{StoreError, WindowEntry, WindowStore};

/// A stored entry and the instant the store stops returning it.
#[derive(Debug, Clone, Copy)]
struct Slot {
    entry: WindowEntry,
    deadline: DateTime<Utc>,
}

/// A process-local [`WindowStore`] backed by a concurrent hash map.
///
/// Expired entries are invisible to reads immediately and are physically
/// removed by [`purge_expired`](Self::purge_expired), either on demand or
/// from a background sweeper.
///
/// Expiry is decided by the store's own clock, not by the `now` the limiter
/// is checking against. Build the store with the same [`Clock`] the caller
/// reads `now` from, otherwise windows near their end may reset slightly
/// early or late.
pub struct MemoryStore {
    /// Entries indexed by key
    slots: DashMap<String, Slot>,
    /// Time source for expiry decisions
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("len", &self.slots.len())
            .finish()
    }
}

impl MemoryStore {
    /// Create an empty store that expires entries by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store that expires entries by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: DashMap::new(),
            clock,
        }
    }

    /// Remove every entry whose deadline has passed. Returns how many were
    /// removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.deadline > now);
        before.saturating_sub(self.slots.len())
    }

    /// Run [`purge_expired`](Self::purge_expired) every `interval` on the
    /// current tokio runtime. The task ends on its own once the store has
    /// been dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);

        info!(interval_secs = interval.as_secs(), "Starting window store sweeper");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else {
                    debug!("Window store dropped, stopping sweeper");
                    break;
                };
                let removed = store.purge_expired();
                if removed > 0 {
                    debug!(removed, remaining = store.len(), "Purged expired windows");
                }
            }
        })
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.slots.clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WindowStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<WindowEntry>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .slots
            .get(key)
            .filter(|slot| slot.deadline > now)
            .map(|slot| slot.entry))
    }

    async fn set(&self, key: &str, entry: WindowEntry, ttl: Duration) -> Result<(), StoreError> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let deadline = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.slots.insert(key.to_string(), Slot { entry, deadline });
        Ok(())
    }

    async fn update(&self, key: &str, entry: WindowEntry) -> Result<(), StoreError> {
        self.slots
            .entry(key.to_string())
            .and_modify(|slot| slot.entry = entry)
            .or_insert(Slot {
                entry,
                deadline: entry.expires_at,
            });
        Ok(())
    }
}
