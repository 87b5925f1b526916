//! Chunk data model and the synchronous chunk table.
//!
//! A chunk is an immutable byte buffer covering a half-open time range
//! `[start_time, end_time)`. Each stored buffer is described by a
//! [`ChunkItem`] carrying its size, range, creation sequence and optional
//! partition key (for example a quality label such as `"1080p"`).
//!
//! # Components
//!
//! - [`ChunkTable`]: single-writer table owning buffers and items
//! - [`overlap`]: range intersection and transitive overlap closure
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_chunkstore::chunk::{ChunkTable, NewChunk};
//!
//! let mut table = ChunkTable::new(ChunkStoreConfig::default())?;
//! let chunk = NewChunk::new(vec![0u8; 1024], 0.0, 5.0)
//!     .with_partition_key("1080p")
//!     .with_bandwidth(5_000_000.0);
//! let id = table.add(chunk, &events)?;
//! ```

pub mod overlap;
pub mod table;

pub use table::{ChunkTable, ChunkTableStats};

use crate::error::{ChunkError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Free-form metadata attached to a chunk.
pub type Metadata = BTreeMap<String, Value>;

/// Media type used when neither the caller nor the metadata names one.
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Metadata key consulted for the media type.
pub const MEDIA_TYPE_KEY: &str = "type";

/// Metadata key holding a piece's position after a split.
pub const SPLIT_INDEX_KEY: &str = "splitIndex";

/// Opaque chunk identifier.
///
/// Ids are random UUIDs and are never reused by a store, even after the chunk
/// they named has been removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(Uuid);

impl ChunkId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ChunkId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Half-open time range `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeRange {
    /// Start time (inclusive).
    pub start: f64,
    /// End time (exclusive).
    pub end: f64,
}

impl TimeRange {
    /// Creates a range, checking that both bounds are finite and `end > start`.
    ///
    /// # Errors
    ///
    /// Returns `ChunkError::InvalidTimeRange` otherwise.
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() || end <= start {
            return Err(ChunkError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Length of the range in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Returns true if the ranges intersect, counting touching boundaries.
    pub fn intersects(&self, other: &TimeRange) -> bool {
        other.start <= self.end && other.end >= self.start
    }

    /// Returns true if `time` lies strictly between start and end.
    pub fn strictly_contains(&self, time: f64) -> bool {
        self.start < time && time < self.end
    }

    /// Smallest range covering both ranges.
    pub fn union(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Metadata record describing one stored chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkItem {
    /// Unique chunk id.
    pub id: ChunkId,
    /// MIME type of the payload.
    pub media_type: String,
    /// Buffer length in bytes.
    pub size: usize,
    /// `end_time - start_time`, in seconds.
    pub duration: f64,
    /// Start of the covered range (inclusive).
    pub start_time: f64,
    /// End of the covered range (exclusive).
    pub end_time: f64,
    /// Creation order within the store.
    pub sequence: u64,
    /// Partition the chunk belongs to, such as a quality label.
    pub partition_key: Option<String>,
    /// Bandwidth of the rendition, in bits per second.
    pub bandwidth: Option<f64>,
    /// Caller supplied metadata.
    pub metadata: Metadata,
}

impl ChunkItem {
    /// Returns the time range covered by this chunk.
    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start_time,
            end: self.end_time,
        }
    }

    /// Returns the partition key as a string slice.
    pub fn partition(&self) -> Option<&str> {
        self.partition_key.as_deref()
    }
}

/// A chunk to be added to a store.
#[derive(Debug, Clone)]
pub struct NewChunk {
    /// Payload bytes.
    pub data: Bytes,
    /// Start of the covered range (inclusive).
    pub start_time: f64,
    /// End of the covered range (exclusive).
    pub end_time: f64,
    /// Optional partition key.
    pub partition_key: Option<String>,
    /// Optional bandwidth in bits per second.
    pub bandwidth: Option<f64>,
    /// Explicit media type; falls back to the `type` metadata entry.
    pub media_type: Option<String>,
    /// Caller supplied metadata.
    pub metadata: Metadata,
}

impl NewChunk {
    /// Creates a chunk covering `[start_time, end_time)`.
    pub fn new(data: impl Into<Bytes>, start_time: f64, end_time: f64) -> Self {
        Self {
            data: data.into(),
            start_time,
            end_time,
            partition_key: None,
            bandwidth: None,
            media_type: None,
            metadata: Metadata::new(),
        }
    }

    /// Sets the partition key.
    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    /// Sets the bandwidth.
    pub fn with_bandwidth(mut self, bandwidth: f64) -> Self {
        self.bandwidth = Some(bandwidth);
        self
    }

    /// Sets the media type.
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Adds a single metadata entry.
    pub fn with_metadata_entry(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Validated time range of this chunk.
    ///
    /// # Errors
    ///
    /// Returns `ChunkError::InvalidTimeRange` for empty, reversed or
    /// non-finite ranges.
    pub fn range(&self) -> Result<TimeRange> {
        TimeRange::new(self.start_time, self.end_time)
    }

    pub(crate) fn resolved_media_type(&self) -> String {
        if let Some(media_type) = &self.media_type {
            return media_type.clone();
        }
        match self.metadata.get(MEDIA_TYPE_KEY) {
            Some(Value::String(media_type)) => media_type.clone(),
            _ => DEFAULT_MEDIA_TYPE.to_string(),
        }
    }
}
