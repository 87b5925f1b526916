//! ChunkStore - async, caller-owned chunk store.
//!
//! [`ChunkStore`] wraps a [`ChunkTable`] in a `tokio::sync::Mutex` so every
//! operation runs with exclusive access to the table. Operations that cascade
//! (an add absorbing overlaps, a merge or split storing its results, cleanup
//! after an add) complete within one lock acquisition and are observed by
//! other tasks as a single step.
//!
//! Events are published while the lock is held, so listeners see them in
//! mutation order. Listeners are synchronous and must not wait on the store.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_chunkstore::{ChunkStore, NewChunk};
//!
//! let store = ChunkStore::new();
//! let first = store.add(NewChunk::new(vec![0u8; 1 << 20], 0.0, 5.0)).await?;
//! let merged = store.add(NewChunk::new(vec![0u8; 1 << 20], 4.0, 9.0)).await?;
//! assert_eq!(store.count().await, 1);
//!
//! let pieces = store.split(&merged, &[3.0, 6.0]).await?;
//! let restored = store.merge(&pieces).await?;
//! ```

use crate::chunk::{ChunkId, ChunkItem, ChunkTable, ChunkTableStats, NewChunk};
use crate::config::{ChunkStoreConfig, ConfigUpdate};
use crate::error::Result;
use crate::events::{ChunkEvent, EventBus, Subscription};
use crate::lifecycle::eviction::EvictionPolicy;
use bytes::Bytes;
use tokio::sync::Mutex;

/// Async in-memory store of time-indexed media chunks.
#[derive(Default)]
pub struct ChunkStore {
    table: Mutex<ChunkTable>,
    events: EventBus,
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl ChunkStore {
    /// Creates a store with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with `config`.
    ///
    /// # Errors
    ///
    /// Returns `ChunkError::InvalidConfig` if `config` does not validate.
    pub fn with_config(config: ChunkStoreConfig) -> Result<Self> {
        Ok(Self {
            table: Mutex::new(ChunkTable::new(config)?),
            events: EventBus::new(),
        })
    }

    /// Registers an event listener.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChunkEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    /// Applies a partial configuration update. See [`ChunkTable::configure`].
    pub async fn configure(&self, update: ConfigUpdate) -> Result<()> {
        self.table.lock().await.configure(&update, &self.events)
    }

    /// Returns a copy of the current configuration.
    pub async fn config(&self) -> ChunkStoreConfig {
        self.table.lock().await.config().clone()
    }

    /// Installs a custom eviction policy, replacing the configured strategy.
    pub async fn set_eviction_policy<P>(&self, policy: P)
    where
        P: EvictionPolicy + 'static,
    {
        self.table.lock().await.set_eviction_policy(Box::new(policy));
    }

    /// Removes a custom eviction policy.
    pub async fn clear_eviction_policy(&self) {
        self.table.lock().await.clear_eviction_policy();
    }

    /// Adds a chunk. See [`ChunkTable::add`].
    pub async fn add(&self, chunk: NewChunk) -> Result<ChunkId> {
        self.table.lock().await.add(chunk, &self.events)
    }

    /// Returns a chunk's buffer, or `None` if the id is unknown.
    pub async fn get(&self, id: &ChunkId) -> Option<Bytes> {
        self.table.lock().await.get(id)
    }

    /// Removes a chunk. Returns false if the id is unknown.
    pub async fn remove(&self, id: &ChunkId) -> bool {
        self.table.lock().await.remove(id, &self.events)
    }

    /// Merges chunks. See [`ChunkTable::merge`].
    pub async fn merge(&self, ids: &[ChunkId]) -> Result<Option<ChunkId>> {
        self.table.lock().await.merge(ids, &self.events)
    }

    /// Splits a chunk. See [`ChunkTable::split`].
    pub async fn split(&self, id: &ChunkId, times: &[f64]) -> Result<Vec<ChunkId>> {
        self.table.lock().await.split(id, times, &self.events)
    }

    /// Runs a cleanup pass. Returns the number of evicted chunks.
    pub async fn cleanup(&self) -> usize {
        self.table.lock().await.cleanup(&self.events)
    }

    /// Returns a chunk's metadata.
    pub async fn get_item(&self, id: &ChunkId) -> Option<ChunkItem> {
        self.table.lock().await.get_item(id).cloned()
    }

    /// Returns all items ordered by creation sequence.
    pub async fn all_items(&self) -> Vec<ChunkItem> {
        self.table.lock().await.all_items()
    }

    /// Number of stored chunks.
    pub async fn count(&self) -> usize {
        self.table.lock().await.count()
    }

    /// Sum of stored buffer lengths in bytes.
    pub async fn total_size(&self) -> usize {
        self.table.lock().await.total_size()
    }

    /// Sum of chunk durations in seconds, overlaps counted per chunk.
    pub async fn total_duration(&self) -> f64 {
        self.table.lock().await.total_duration()
    }

    /// Items intersecting `[start, end]` sorted by start time, optionally
    /// limited to one partition.
    pub async fn get_in_range(&self, start: f64, end: f64, key: Option<&str>) -> Vec<ChunkItem> {
        self.table.lock().await.in_range(start, end, key)
    }

    /// Items of one partition sorted by start time.
    pub async fn items_in_partition(&self, key: &str) -> Vec<ChunkItem> {
        self.table.lock().await.items_in_partition(key)
    }

    /// Distinct partition keys, sorted.
    pub async fn partition_keys(&self) -> Vec<String> {
        self.table.lock().await.partition_keys()
    }

    /// Summary of the store contents.
    pub async fn stats(&self) -> ChunkTableStats {
        self.table.lock().await.stats()
    }
}
