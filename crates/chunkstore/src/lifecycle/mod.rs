//! Lifecycle modules for chunk merging, splitting and capacity eviction.

pub mod eviction;
pub mod merge;

pub use eviction::{EvictionPolicy, EvictionStrategy};
