//! Window store trait for abstracting the expiring key-value cache.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::window::WindowEntry;

/// Errors a window store may report.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached or refused the operation.
    #[error("window store unavailable: {0}")]
    Unavailable(String),
}

/// Trait for the expiring key-value store that holds window state.
///
/// The limiter only ever needs three operations: read the live entry, store
/// a fresh entry with a time-to-live, and overwrite an entry's value without
/// touching the expiry it was stored with.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Read the live entry for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<WindowEntry>, StoreError>;

    /// Store `entry` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, entry: WindowEntry, ttl: Duration) -> Result<(), StoreError>;

    /// Replace the value under `key` and keep its current expiry. If the key
    /// is gone, the entry is stored until its own `expires_at`.
    async fn update(&self, key: &str, entry: WindowEntry) -> Result<(), StoreError>;
}
