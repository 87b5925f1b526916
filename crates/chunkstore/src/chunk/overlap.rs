//! Overlap detection between stored chunks and a candidate range.
//!
//! Two chunks overlap when their ranges intersect, touching boundaries
//! included. A partition key scopes detection to chunks sharing that key;
//! without a key every stored chunk is a candidate.

use crate::chunk::{ChunkId, ChunkItem, TimeRange};
use std::collections::HashSet;

/// Returns true if `item` is in scope for `key`. `None` matches every item.
pub fn same_partition(item: &ChunkItem, key: Option<&str>) -> bool {
    key.map_or(true, |key| item.partition() == Some(key))
}

/// Finds the items in `key`'s partition whose range intersects `range`.
pub fn find_overlapping<'a, I>(items: I, range: &TimeRange, key: Option<&str>) -> Vec<&'a ChunkItem>
where
    I: IntoIterator<Item = &'a ChunkItem>,
{
    items
        .into_iter()
        .filter(|item| same_partition(item, key) && range.intersects(&item.range()))
        .collect()
}

/// Result of resolving every chunk transitively connected to a range.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapClosure {
    /// Chunks to be folded into the new chunk, in discovery order.
    pub members: Vec<ChunkId>,
    /// Union of the starting range and all member ranges.
    pub range: TimeRange,
}

impl OverlapClosure {
    /// Returns true if no stored chunk overlaps.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Grows `range` until no further chunk in the partition overlaps it.
///
/// Each round adds every chunk intersecting the current union and widens the
/// union to cover them, so a chain `a ~ b ~ c` is collected even when the
/// starting range only touches `a`. Ids in `exclude` are never collected.
pub fn overlap_closure<'a, I>(
    items: I,
    range: TimeRange,
    key: Option<&str>,
    exclude: &HashSet<ChunkId>,
) -> OverlapClosure
where
    I: IntoIterator<Item = &'a ChunkItem>,
{
    let mut candidates: Vec<&ChunkItem> = items
        .into_iter()
        .filter(|item| same_partition(item, key) && !exclude.contains(&item.id))
        .collect();
    let mut members = Vec::new();
    let mut union = range;

    loop {
        let (hits, rest): (Vec<&ChunkItem>, Vec<&ChunkItem>) = candidates
            .into_iter()
            .partition(|item| union.intersects(&item.range()));
        candidates = rest;

        if hits.is_empty() {
            break;
        }
        for item in hits {
            union = union.union(&item.range());
            members.push(item.id);
        }
    }

    OverlapClosure {
        members,
        range: union,
    }
}
