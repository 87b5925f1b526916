//! Error and Result types for chunk store operations.

use thiserror::Error;

/// A convenience `Result` type for chunk store operations.
pub type Result<T> = std::result::Result<T, ChunkError>;

/// The error type for chunk store operations.
///
/// Lookups of unknown ids are not errors: they surface as `None`, `false` or an
/// empty list so that "already absent" stays distinguishable from a malformed
/// request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChunkError {
    /// Chunk buffer is larger than the configured maximum.
    #[error("Chunk size {size} exceeds maximum size ({max} bytes)")]
    SizeExceeded {
        /// Size of the rejected buffer in bytes.
        size: usize,
        /// Configured maximum chunk size in bytes.
        max: usize,
    },

    /// Chunk time range is longer than the configured maximum.
    #[error("Chunk duration {duration}s exceeds maximum duration ({max} seconds)")]
    DurationExceeded {
        /// Duration of the rejected chunk in seconds.
        duration: f64,
        /// Configured maximum chunk duration in seconds.
        max: f64,
    },

    /// Chunks selected for a merge belong to different partitions.
    #[error("Partition mismatch: cannot merge {expected:?} with {found:?}")]
    PartitionMismatch {
        /// Partition key of the first chunk.
        expected: Option<String>,
        /// First disagreeing partition key.
        found: Option<String>,
    },

    /// A split time does not fall strictly inside the chunk range.
    #[error("Invalid split point {time}: must lie strictly within [{start}, {end})")]
    InvalidSplitPoint {
        /// Rejected split time.
        time: f64,
        /// Start of the chunk being split (inclusive).
        start: f64,
        /// End of the chunk being split (exclusive).
        end: f64,
    },

    /// Split was requested without any split times.
    #[error("Split requires at least one split point")]
    NoSplitPoints,

    /// Time range is empty, reversed or not finite.
    #[error("Invalid time range [{start}, {end})")]
    InvalidTimeRange {
        /// Requested start time.
        start: f64,
        /// Requested end time.
        end: f64,
    },

    /// Configuration update would leave the store in an invalid state.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
