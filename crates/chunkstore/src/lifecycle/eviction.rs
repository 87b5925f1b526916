//! Eviction policies for capacity-driven cleanup.
//!
//! A policy only orders chunks; the table decides how many to remove.

use crate::chunk::{ChunkId, ChunkItem};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Orders chunks for eviction. Chunks ordered first are evicted first.
pub trait EvictionPolicy: Send + Sync {
    /// Compares two chunks by eviction priority.
    fn compare(&self, a: &ChunkItem, b: &ChunkItem) -> Ordering;

    /// Selects up to `count` victims from `items`.
    fn select_victims(&self, items: &[&ChunkItem], count: usize) -> Vec<ChunkId> {
        let mut ordered = items.to_vec();
        ordered.sort_by(|a, b| self.compare(a, b));
        ordered.into_iter().take(count).map(|item| item.id).collect()
    }
}

/// Built-in eviction strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Oldest creation sequence first (FIFO).
    #[default]
    Sequential,
    /// Earliest start time first.
    Timestamp,
    /// Lowest bandwidth first, then earliest start time.
    ///
    /// Chunks without a bandwidth count as zero.
    Quality,
}

impl EvictionPolicy for EvictionStrategy {
    fn compare(&self, a: &ChunkItem, b: &ChunkItem) -> Ordering {
        match self {
            Self::Sequential => a.sequence.cmp(&b.sequence),
            Self::Timestamp => a
                .start_time
                .total_cmp(&b.start_time)
                .then(a.sequence.cmp(&b.sequence)),
            Self::Quality => {
                let bw_a = a.bandwidth.unwrap_or(0.0);
                let bw_b = b.bandwidth.unwrap_or(0.0);
                bw_a.total_cmp(&bw_b)
                    .then(a.start_time.total_cmp(&b.start_time))
                    .then(a.sequence.cmp(&b.sequence))
            }
        }
    }
}
