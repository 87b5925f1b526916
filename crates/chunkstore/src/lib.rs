//! Alopex ChunkStore - in-memory store for time-indexed media chunks.
//!
//! This crate holds binary media chunks keyed by the time range they cover,
//! merging overlapping chunks, splitting chunks at time points and evicting
//! chunks under capacity pressure.
//!
//! # Components
//!
//! - [`ChunkStore`]: async, mutex-guarded store used by applications
//! - [`ChunkTable`]: synchronous single-writer core
//! - [`EvictionPolicy`] / [`EvictionStrategy`]: victim ordering for cleanup
//! - [`EventBus`]: synchronous add/remove/merge/split/cleanup/error events
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_chunkstore::{ChunkStore, ConfigUpdate, EvictionStrategy, NewChunk};
//!
//! let store = ChunkStore::new();
//! store
//!     .configure(ConfigUpdate::default().with_eviction_strategy(EvictionStrategy::Quality))
//!     .await?;
//!
//! let id = store
//!     .add(
//!         NewChunk::new(segment_bytes, 0.0, 5.0)
//!             .with_partition_key("1080p")
//!             .with_bandwidth(5_000_000.0)
//!             .with_metadata_entry("type", "video/mp4"),
//!     )
//!     .await?;
//!
//! for item in store.get_in_range(2.0, 7.0, Some("1080p")).await {
//!     let bytes = store.get(&item.id).await;
//! }
//! ```

#![deny(missing_docs)]

pub mod chunk;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod store;

pub use chunk::{ChunkId, ChunkItem, ChunkTable, ChunkTableStats, Metadata, NewChunk, TimeRange};
pub use config::{ChunkStoreConfig, ConfigUpdate};
pub use error::{ChunkError, Result};
pub use events::{ChunkEvent, ChunkEventKind, ChunkOperation, EventBus, Subscription};
pub use lifecycle::{EvictionPolicy, EvictionStrategy};
pub use store::ChunkStore;
