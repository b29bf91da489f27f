//! Key-value cache store with list, set, counter and TTL operations.
//!
//! The store is the only shared mutable state in the service. Everything above it
//! (timelines, home feeds, the celebrity set, rate-limit windows) is expressed as
//! keys holding lists of JSON strings, sets of ids or counters. Multi-step writes
//! go through [`CacheStore::atomic`] so concurrent writers to the same key never
//! observe a half-applied batch.

mod memory;
mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;

pub use self::memory::MemoryStore;
pub use self::sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Key {0} holds a value of the wrong type")]
    WrongType(String),

    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One step of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Insert a value at the head of a list, creating the list if needed.
    PushFront { key: String, value: String },
    /// Append values at the tail of a list, creating the list if needed.
    PushBack { key: String, values: Vec<String> },
    /// Keep only the first `keep` elements of a list.
    Trim { key: String, keep: usize },
    /// Remove a key of any type.
    Delete { key: String },
    /// Set the time-to-live of an existing key. No-op on a missing key.
    Expire { key: String, ttl: Duration },
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Apply every op in order, or none of them.
    async fn atomic(&self, ops: Vec<Op>) -> StoreResult<()>;

    /// Read up to `limit` list elements starting at `offset`. A missing or expired
    /// key reads as an empty list.
    async fn range(&self, key: &str, offset: usize, limit: usize) -> StoreResult<Vec<String>>;

    /// Add a member; returns true if it was not already present.
    async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// Remove a member; returns true if it was present.
    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool>;

    /// All members, sorted.
    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Increment a counter and return the new value. A counter created by this
    /// call expires after `ttl`; later increments leave the deadline alone.
    async fn incr(&self, key: &str, ttl: Duration) -> StoreResult<u64>;

    /// Drop every expired key; returns how many were removed.
    async fn purge_expired(&self) -> StoreResult<usize>;
}

/// Periodically purge expired keys. Expired keys already read as absent, so this
/// only reclaims space; failures are logged and the next tick tries again.
pub fn spawn_expiry_sweep(store: Arc<dyn CacheStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Purged {} expired cache keys", n),
                Err(e) => tracing::warn!("Cache expiry sweep failed: {}", e),
            }
        }
    })
}
