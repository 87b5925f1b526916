//! Store configuration and partial configuration updates.
//!
//! [`ChunkStoreConfig`] holds the effective limits of a store. Callers change
//! it through [`ConfigUpdate`], a partial overlay where every field is
//! optional; unset fields keep their current value.
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_chunkstore::{ConfigUpdate, EvictionStrategy};
//!
//! let update = ConfigUpdate::default()
//!     .with_max_chunks(2000)
//!     .with_eviction_strategy(EvictionStrategy::Timestamp);
//! store.configure(update).await?;
//!
//! // Or from the JSON option object used by playback front ends
//! let update = ConfigUpdate::from_json(r#"{"maxChunks": 2000, "cleanupThreshold": 0.8}"#)?;
//! ```

use crate::error::{ChunkError, Result};
use crate::lifecycle::eviction::EvictionStrategy;
use serde::Deserialize;

/// Default maximum number of stored chunks.
pub const DEFAULT_MAX_CHUNKS: usize = 1000;

/// Default maximum chunk size: 10 MiB.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Default maximum chunk duration: 10 seconds.
pub const DEFAULT_MAX_CHUNK_DURATION: f64 = 10.0;

/// Default cleanup threshold: 90% of `max_chunks`.
pub const DEFAULT_CLEANUP_THRESHOLD: f64 = 0.9;

/// Effective configuration of a chunk store.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkStoreConfig {
    /// Number of chunks the store keeps after a cleanup pass.
    ///
    /// Default: 1000.
    pub max_chunks: usize,

    /// Largest accepted buffer, in bytes. Applies to merged chunks as well.
    ///
    /// Default: 10 MiB.
    pub max_chunk_size: usize,

    /// Longest accepted time range, in seconds. Applies to merged chunks as well.
    ///
    /// Default: 10 seconds.
    pub max_chunk_duration: f64,

    /// Merge a new chunk with every stored chunk it overlaps.
    ///
    /// Default: true.
    pub auto_merge: bool,

    /// Run a cleanup pass after adds and reconfiguration once the chunk count
    /// crosses `max_chunks * cleanup_threshold`.
    ///
    /// Default: true.
    pub auto_cleanup: bool,

    /// Fraction of `max_chunks` above which cleanup evicts chunks.
    ///
    /// Default: 0.9.
    pub cleanup_threshold: f64,

    /// Victim ordering used by cleanup.
    ///
    /// Default: [`EvictionStrategy::Sequential`].
    pub eviction_strategy: EvictionStrategy,
}

impl Default for ChunkStoreConfig {
    fn default() -> Self {
        Self {
            max_chunks: DEFAULT_MAX_CHUNKS,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            max_chunk_duration: DEFAULT_MAX_CHUNK_DURATION,
            auto_merge: true,
            auto_cleanup: true,
            cleanup_threshold: DEFAULT_CLEANUP_THRESHOLD,
            eviction_strategy: EvictionStrategy::default(),
        }
    }
}

impl ChunkStoreConfig {
    /// Sets the maximum number of chunks.
    pub fn with_max_chunks(mut self, max: usize) -> Self {
        self.max_chunks = max;
        self
    }

    /// Sets the maximum chunk size in bytes.
    pub fn with_max_chunk_size(mut self, max: usize) -> Self {
        self.max_chunk_size = max;
        self
    }

    /// Sets the maximum chunk duration in seconds.
    pub fn with_max_chunk_duration(mut self, max: f64) -> Self {
        self.max_chunk_duration = max;
        self
    }

    /// Enables or disables overlap merging on add.
    pub fn with_auto_merge(mut self, enabled: bool) -> Self {
        self.auto_merge = enabled;
        self
    }

    /// Enables or disables automatic cleanup.
    pub fn with_auto_cleanup(mut self, enabled: bool) -> Self {
        self.auto_cleanup = enabled;
        self
    }

    /// Sets the cleanup threshold as a fraction of `max_chunks`.
    pub fn with_cleanup_threshold(mut self, threshold: f64) -> Self {
        self.cleanup_threshold = threshold;
        self
    }

    /// Sets the eviction strategy.
    pub fn with_eviction_strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.eviction_strategy = strategy;
        self
    }

    /// Returns true if `count` chunks is above the cleanup trigger point.
    pub fn exceeds_cleanup_threshold(&self, count: usize) -> bool {
        count as f64 > self.max_chunks as f64 * self.cleanup_threshold
    }

    /// Checks that the limits describe a usable store.
    ///
    /// # Errors
    ///
    /// Returns `ChunkError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunks == 0 {
            return Err(ChunkError::InvalidConfig(
                "max_chunks must be greater than zero".to_string(),
            ));
        }
        if self.max_chunk_size == 0 {
            return Err(ChunkError::InvalidConfig(
                "max_chunk_size must be greater than zero".to_string(),
            ));
        }
        if !self.max_chunk_duration.is_finite() || self.max_chunk_duration <= 0.0 {
            return Err(ChunkError::InvalidConfig(format!(
                "max_chunk_duration must be a positive number of seconds, got {}",
                self.max_chunk_duration
            )));
        }
        if !(self.cleanup_threshold > 0.0 && self.cleanup_threshold <= 1.0) {
            return Err(ChunkError::InvalidConfig(format!(
                "cleanup_threshold must be in (0, 1], got {}",
                self.cleanup_threshold
            )));
        }
        Ok(())
    }

    /// Returns a copy of this configuration with the set fields of `update`
    /// applied on top.
    pub fn merged_with(&self, update: &ConfigUpdate) -> Self {
        Self {
            max_chunks: update.max_chunks.unwrap_or(self.max_chunks),
            max_chunk_size: update.max_chunk_size.unwrap_or(self.max_chunk_size),
            max_chunk_duration: update.max_chunk_duration.unwrap_or(self.max_chunk_duration),
            auto_merge: update.auto_merge.unwrap_or(self.auto_merge),
            auto_cleanup: update.auto_cleanup.unwrap_or(self.auto_cleanup),
            cleanup_threshold: update.cleanup_threshold.unwrap_or(self.cleanup_threshold),
            eviction_strategy: update.eviction_strategy.unwrap_or(self.eviction_strategy),
        }
    }
}

/// Partial configuration: only the fields that are set are changed.
///
/// Deserializes from camelCase JSON keys (`maxChunks`, `maxChunkSize`,
/// `maxChunkDuration`, `autoMerge`, `autoCleanup`, `cleanupThreshold`,
/// `evictionStrategy`). Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    /// New maximum number of chunks.
    pub max_chunks: Option<usize>,
    /// New maximum chunk size in bytes.
    pub max_chunk_size: Option<usize>,
    /// New maximum chunk duration in seconds.
    pub max_chunk_duration: Option<f64>,
    /// New auto-merge flag.
    pub auto_merge: Option<bool>,
    /// New auto-cleanup flag.
    pub auto_cleanup: Option<bool>,
    /// New cleanup threshold.
    pub cleanup_threshold: Option<f64>,
    /// New eviction strategy.
    #[serde(alias = "strategy")]
    pub eviction_strategy: Option<EvictionStrategy>,
}

impl ConfigUpdate {
    /// Parses an update from a JSON object.
    ///
    /// # Errors
    ///
    /// Returns `ChunkError::InvalidConfig` if the JSON is malformed or a field
    /// has the wrong type.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| ChunkError::InvalidConfig(err.to_string()))
    }

    /// Sets the maximum number of chunks.
    pub fn with_max_chunks(mut self, max: usize) -> Self {
        self.max_chunks = Some(max);
        self
    }

    /// Sets the maximum chunk size in bytes.
    pub fn with_max_chunk_size(mut self, max: usize) -> Self {
        self.max_chunk_size = Some(max);
        self
    }

    /// Sets the maximum chunk duration in seconds.
    pub fn with_max_chunk_duration(mut self, max: f64) -> Self {
        self.max_chunk_duration = Some(max);
        self
    }

    /// Sets the auto-merge flag.
    pub fn with_auto_merge(mut self, enabled: bool) -> Self {
        self.auto_merge = Some(enabled);
        self
    }

    /// Sets the auto-cleanup flag.
    pub fn with_auto_cleanup(mut self, enabled: bool) -> Self {
        self.auto_cleanup = Some(enabled);
        self
    }

    /// Sets the cleanup threshold.
    pub fn with_cleanup_threshold(mut self, threshold: f64) -> Self {
        self.cleanup_threshold = Some(threshold);
        self
    }

    /// Sets the eviction strategy.
    pub fn with_eviction_strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.eviction_strategy = Some(strategy);
        self
    }
}
