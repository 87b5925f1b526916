//! ChunkTable - single-writer in-memory chunk table.
//!
//! The table owns every stored buffer together with its [`ChunkItem`] and
//! implements add, merge, split and cleanup as plain `&mut self` methods.
//! Events are delivered through the [`EventBus`] passed to each mutating call,
//! in the order the mutations happen.
//!
//! # Write Path
//!
//! ```text
//! add → validate limits → overlap closure → validate merged limits
//!     → remove absorbed chunks → insert → cleanup
//! ```
//!
//! Every check runs before the first mutation, so a rejected operation leaves
//! the table untouched. Failures are published as error events before they are
//! returned.

use crate::chunk::overlap::{find_overlapping, overlap_closure, same_partition};
use crate::chunk::{ChunkId, ChunkItem, NewChunk, TimeRange, MEDIA_TYPE_KEY, SPLIT_INDEX_KEY};
use crate::config::{ChunkStoreConfig, ConfigUpdate};
use crate::error::{ChunkError, Result};
use crate::events::{ChunkEventKind, ChunkOperation, EventBus};
use crate::lifecycle::eviction::EvictionPolicy;
use crate::lifecycle::merge::{
    combine_metadata, concat_buffers, mean_bandwidth, split_buffer, split_offsets,
    validate_split_times,
};
use bytes::Bytes;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Point-in-time summary of a table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkTableStats {
    /// Number of stored chunks.
    pub chunk_count: usize,
    /// Sum of buffer lengths in bytes.
    pub total_size: usize,
    /// Sum of chunk durations in seconds, overlaps counted twice.
    pub total_duration: f64,
    /// Earliest start time across all chunks.
    pub earliest_start: Option<f64>,
    /// Latest end time across all chunks.
    pub latest_end: Option<f64>,
}

#[derive(Debug, Clone)]
struct StoredChunk {
    item: ChunkItem,
    data: Bytes,
}

/// A validated add, ready to be applied.
struct PlannedAdd {
    chunk: NewChunk,
    absorbed: Vec<ChunkId>,
}

/// In-memory chunk table.
pub struct ChunkTable {
    config: ChunkStoreConfig,
    chunks: HashMap<ChunkId, StoredChunk>,
    next_sequence: u64,
    eviction_policy: Option<Box<dyn EvictionPolicy>>,
}

impl Default for ChunkTable {
    fn default() -> Self {
        Self {
            config: ChunkStoreConfig::default(),
            chunks: HashMap::new(),
            next_sequence: 1,
            eviction_policy: None,
        }
    }
}

impl ChunkTable {
    /// Creates an empty table.
    ///
    /// # Errors
    ///
    /// Returns `ChunkError::InvalidConfig` if `config` does not validate.
    pub fn new(config: ChunkStoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &ChunkStoreConfig {
        &self.config
    }

    /// Installs a policy that replaces the configured eviction strategy.
    pub fn set_eviction_policy(&mut self, policy: Box<dyn EvictionPolicy>) {
        self.eviction_policy = Some(policy);
    }

    /// Removes a custom policy, restoring the configured strategy.
    pub fn clear_eviction_policy(&mut self) {
        self.eviction_policy = None;
    }

    /// Applies a partial configuration update.
    ///
    /// The update is validated as a whole before anything changes. With auto
    /// cleanup enabled, a cleanup pass runs immediately if the current chunk
    /// count is above the new trigger point.
    ///
    /// # Errors
    ///
    /// Returns `ChunkError::InvalidConfig` if the resulting configuration is
    /// invalid.
    pub fn configure(&mut self, update: &ConfigUpdate, events: &EventBus) -> Result<()> {
        let config = self.config.merged_with(update);
        if let Err(err) = config.validate() {
            return Err(reject(events, ChunkOperation::Configure, err));
        }
        self.config = config;
        debug!("Chunk table reconfigured: {:?}", self.config);

        if self.config.auto_cleanup && self.config.exceeds_cleanup_threshold(self.chunks.len()) {
            self.cleanup(events);
        }
        Ok(())
    }

    /// Adds a chunk, folding in every chunk it transitively overlaps when auto
    /// merge is enabled.
    ///
    /// Merged buffers are concatenated in ascending start time order and cover
    /// the union of all ranges. The new chunk's metadata is applied last, over
    /// the metadata of the chunks it absorbs.
    ///
    /// Returns the id of the stored (possibly merged) chunk.
    ///
    /// # Errors
    ///
    /// - `ChunkError::InvalidTimeRange` for an empty, reversed or non-finite range
    /// - `ChunkError::SizeExceeded` if the buffer, or the merged buffer, is too large
    /// - `ChunkError::DurationExceeded` if the range, or the merged range, is too long
    pub fn add(&mut self, chunk: NewChunk, events: &EventBus) -> Result<ChunkId> {
        let plan = match self.plan_add(chunk, &HashSet::new()) {
            Ok(plan) => plan,
            Err(err) => return Err(reject(events, ChunkOperation::Add, err)),
        };
        let id = self.commit(plan, events);
        self.cleanup_if_needed(events);
        Ok(id)
    }

    /// Returns the buffer of a chunk.
    pub fn get(&self, id: &ChunkId) -> Option<Bytes> {
        self.chunks.get(id).map(|stored| stored.data.clone())
    }

    /// Removes a chunk. Returns false if the id is unknown.
    pub fn remove(&mut self, id: &ChunkId, events: &EventBus) -> bool {
        match self.chunks.remove(id) {
            Some(stored) => {
                events.publish(ChunkEventKind::Remove { item: stored.item });
                true
            }
            None => false,
        }
    }

    /// Merges chunks into one covering the union of their ranges.
    ///
    /// Buffers are concatenated in ascending start time order, metadata is
    /// combined in that order with later chunks winning, and the bandwidth is
    /// the mean of the present bandwidths. The result goes through the add
    /// path, so it may absorb further overlapping chunks.
    ///
    /// Returns `None` without changing anything when fewer than two distinct
    /// ids are given or any id is unknown.
    ///
    /// # Errors
    ///
    /// - `ChunkError::PartitionMismatch` if the chunks belong to different partitions
    /// - `ChunkError::SizeExceeded` / `ChunkError::DurationExceeded` if the
    ///   merged chunk breaks the configured limits
    pub fn merge(&mut self, ids: &[ChunkId], events: &EventBus) -> Result<Option<ChunkId>> {
        let mut seen = HashSet::new();
        let unique: Vec<ChunkId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if unique.len() < 2 {
            return Ok(None);
        }

        let mut sources: Vec<&StoredChunk> = Vec::with_capacity(unique.len());
        for id in &unique {
            match self.chunks.get(id) {
                Some(stored) => sources.push(stored),
                None => return Ok(None),
            }
        }

        let partition = sources[0].item.partition_key.clone();
        if let Some(other) = sources
            .iter()
            .find(|stored| stored.item.partition_key != partition)
        {
            let err = ChunkError::PartitionMismatch {
                expected: partition,
                found: other.item.partition_key.clone(),
            };
            return Err(reject(events, ChunkOperation::Merge, err));
        }

        sources.sort_by(|a, b| a.item.start_time.total_cmp(&b.item.start_time));

        let range = sources
            .iter()
            .map(|stored| stored.item.range())
            .reduce(|acc, range| acc.union(&range))
            .unwrap_or_else(|| sources[0].item.range());
        let metadata = combine_metadata(sources.iter().map(|stored| &stored.item.metadata));
        let media_type = if metadata.contains_key(MEDIA_TYPE_KEY) {
            None
        } else {
            Some(sources[0].item.media_type.clone())
        };
        let merged = NewChunk {
            data: concat_buffers(sources.iter().map(|stored| &stored.data)),
            start_time: range.start,
            end_time: range.end,
            partition_key: partition,
            bandwidth: mean_bandwidth(sources.iter().map(|stored| stored.item.bandwidth)),
            media_type,
            metadata,
        };

        let plan = match self.plan_add(merged, &seen) {
            Ok(plan) => plan,
            Err(err) => return Err(reject(events, ChunkOperation::Merge, err)),
        };

        for id in &unique {
            self.remove(id, events);
        }
        let new_id = self.commit(plan, events);

        if let Some(stored) = self.chunks.get(&new_id) {
            events.publish(ChunkEventKind::Merge {
                merged_ids: unique.clone(),
                item: stored.item.clone(),
            });
        }
        debug!("Merged {} chunks into {}", unique.len(), new_id);

        self.cleanup_if_needed(events);
        Ok(Some(new_id))
    }

    /// Splits a chunk at the given times.
    ///
    /// Byte offsets are interpolated linearly from the split times, see
    /// [`crate::lifecycle::merge`]. The pieces cover the original range
    /// contiguously, keep its partition, bandwidth and media type, and carry
    /// the original metadata plus their `splitIndex`. Pieces are stored as they
    /// are; they are not merged with each other or with neighbouring chunks.
    ///
    /// Returns the piece ids in time order, or an empty list if `id` is unknown.
    ///
    /// # Errors
    ///
    /// - `ChunkError::NoSplitPoints` if `times` is empty
    /// - `ChunkError::InvalidSplitPoint` if a time is not strictly inside the
    ///   chunk range or appears twice
    pub fn split(&mut self, id: &ChunkId, times: &[f64], events: &EventBus) -> Result<Vec<ChunkId>> {
        let Some(stored) = self.chunks.get(id) else {
            return Ok(Vec::new());
        };

        let range = stored.item.range();
        let split_times = match validate_split_times(&range, times) {
            Ok(sorted) => sorted,
            Err(err) => return Err(reject(events, ChunkOperation::Split, err)),
        };
        let offsets = split_offsets(&range, stored.data.len(), &split_times);
        let pieces = split_buffer(&stored.data, &offsets);

        let Some(original) = self.chunks.remove(id) else {
            return Ok(Vec::new());
        };
        let original_item = original.item.clone();
        events.publish(ChunkEventKind::Remove { item: original.item });

        let starts = std::iter::once(range.start).chain(split_times.iter().copied());
        let ends = split_times.iter().copied().chain(std::iter::once(range.end));

        let mut new_ids = Vec::with_capacity(pieces.len());
        for (index, ((piece, start), end)) in pieces.into_iter().zip(starts).zip(ends).enumerate() {
            let mut metadata = original_item.metadata.clone();
            metadata.insert(SPLIT_INDEX_KEY.to_string(), Value::from(index));
            let chunk = NewChunk {
                data: piece,
                start_time: start,
                end_time: end,
                partition_key: original_item.partition_key.clone(),
                bandwidth: original_item.bandwidth,
                media_type: Some(original_item.media_type.clone()),
                metadata,
            };
            new_ids.push(self.insert(chunk, events));
        }

        events.publish(ChunkEventKind::Split {
            original_id: *id,
            new_ids: new_ids.clone(),
            split_times,
        });
        debug!("Split chunk {} into {} pieces", id, new_ids.len());

        self.cleanup_if_needed(events);
        Ok(new_ids)
    }

    /// Evicts chunks once the count is above `max_chunks * cleanup_threshold`.
    ///
    /// Victims are chosen by the custom policy if one is installed, otherwise
    /// by the configured strategy, until `max_chunks` remain. Publishes one
    /// cleanup event per pass that runs.
    ///
    /// Returns the number of chunks removed.
    pub fn cleanup(&mut self, events: &EventBus) -> usize {
        let count = self.chunks.len();
        if !self.config.exceeds_cleanup_threshold(count) {
            return 0;
        }

        let excess = count.saturating_sub(self.config.max_chunks);
        let victims = {
            let items: Vec<&ChunkItem> = self.chunks.values().map(|stored| &stored.item).collect();
            match &self.eviction_policy {
                Some(policy) => policy.select_victims(&items, excess),
                None => self.config.eviction_strategy.select_victims(&items, excess),
            }
        };

        let mut removed = 0;
        for id in &victims {
            if self.remove(id, events) {
                removed += 1;
            }
        }

        events.publish(ChunkEventKind::Cleanup {
            removed_count: removed,
        });
        debug!("Cleanup evicted {} chunks, {} remain", removed, self.chunks.len());
        removed
    }

    /// Returns the metadata of a chunk.
    pub fn get_item(&self, id: &ChunkId) -> Option<&ChunkItem> {
        self.chunks.get(id).map(|stored| &stored.item)
    }

    fn items(&self) -> impl Iterator<Item = &ChunkItem> {
        self.chunks.values().map(|stored| &stored.item)
    }

    /// Returns all items ordered by creation sequence.
    pub fn all_items(&self) -> Vec<ChunkItem> {
        let mut items: Vec<ChunkItem> = self.items().cloned().collect();
        items.sort_by_key(|item| item.sequence);
        items
    }

    /// Number of stored chunks.
    pub fn count(&self) -> usize {
        self.chunks.len()
    }

    /// Sum of buffer lengths in bytes.
    pub fn total_size(&self) -> usize {
        self.chunks.values().map(|stored| stored.data.len()).sum()
    }

    /// Sum of chunk durations. Overlapping ranges are counted once per chunk.
    pub fn total_duration(&self) -> f64 {
        self.items().map(|item| item.duration).sum()
    }

    /// Items intersecting `[start, end]`, touching boundaries included, sorted
    /// by start time. With `key` set only that partition is searched.
    pub fn in_range(&self, start: f64, end: f64, key: Option<&str>) -> Vec<ChunkItem> {
        let range = TimeRange { start, end };
        let mut items: Vec<ChunkItem> = find_overlapping(self.items(), &range, key)
            .into_iter()
            .cloned()
            .collect();
        sort_by_start(&mut items);
        items
    }

    /// Items of one partition sorted by start time.
    pub fn items_in_partition(&self, key: &str) -> Vec<ChunkItem> {
        let mut items: Vec<ChunkItem> = self
            .items()
            .filter(|item| same_partition(item, Some(key)))
            .cloned()
            .collect();
        sort_by_start(&mut items);
        items
    }

    /// Distinct partition keys in use, sorted.
    pub fn partition_keys(&self) -> Vec<String> {
        self.items()
            .filter_map(|item| item.partition_key.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Summary of the table contents.
    pub fn stats(&self) -> ChunkTableStats {
        ChunkTableStats {
            chunk_count: self.count(),
            total_size: self.total_size(),
            total_duration: self.total_duration(),
            earliest_start: self.items().map(|item| item.start_time).reduce(f64::min),
            latest_end: self.items().map(|item| item.end_time).reduce(f64::max),
        }
    }

    fn check_limits(&self, size: usize, range: &TimeRange) -> Result<()> {
        if size > self.config.max_chunk_size {
            return Err(ChunkError::SizeExceeded {
                size,
                max: self.config.max_chunk_size,
            });
        }
        let duration = range.duration();
        if duration > self.config.max_chunk_duration {
            return Err(ChunkError::DurationExceeded {
                duration,
                max: self.config.max_chunk_duration,
            });
        }
        Ok(())
    }

    /// Validates `chunk` and resolves the chunks it absorbs, without mutating.
    fn plan_add(&self, chunk: NewChunk, exclude: &HashSet<ChunkId>) -> Result<PlannedAdd> {
        let range = chunk.range()?;
        self.check_limits(chunk.data.len(), &range)?;

        if !self.config.auto_merge {
            return Ok(PlannedAdd {
                chunk,
                absorbed: Vec::new(),
            });
        }

        let closure = overlap_closure(self.items(), range, chunk.partition_key.as_deref(), exclude);
        if closure.is_empty() {
            return Ok(PlannedAdd {
                chunk,
                absorbed: Vec::new(),
            });
        }

        let mut absorbed: Vec<&StoredChunk> = closure
            .members
            .iter()
            .filter_map(|id| self.chunks.get(id))
            .collect();
        absorbed.sort_by(|a, b| a.item.start_time.total_cmp(&b.item.start_time));

        // The new chunk sorts ahead of absorbed chunks with the same start.
        let mut parts: Vec<(f64, &Bytes)> = Vec::with_capacity(absorbed.len() + 1);
        parts.push((range.start, &chunk.data));
        parts.extend(absorbed.iter().map(|stored| (stored.item.start_time, &stored.data)));
        parts.sort_by(|a, b| a.0.total_cmp(&b.0));

        let merged_size: usize = parts.iter().map(|(_, data)| data.len()).sum();
        self.check_limits(merged_size, &closure.range)?;

        let data = concat_buffers(parts.iter().map(|(_, data)| *data));
        let metadata = combine_metadata(
            absorbed
                .iter()
                .map(|stored| &stored.item.metadata)
                .chain(std::iter::once(&chunk.metadata)),
        );
        let bandwidth = chunk
            .bandwidth
            .or_else(|| mean_bandwidth(absorbed.iter().map(|stored| stored.item.bandwidth)));

        let merged = NewChunk {
            data,
            start_time: closure.range.start,
            end_time: closure.range.end,
            partition_key: chunk.partition_key,
            bandwidth,
            media_type: chunk.media_type,
            metadata,
        };
        Ok(PlannedAdd {
            chunk: merged,
            absorbed: closure.members,
        })
    }

    fn commit(&mut self, plan: PlannedAdd, events: &EventBus) -> ChunkId {
        if !plan.absorbed.is_empty() {
            debug!(
                "Absorbing {} overlapping chunks into [{}, {})",
                plan.absorbed.len(),
                plan.chunk.start_time,
                plan.chunk.end_time
            );
        }
        for id in &plan.absorbed {
            self.remove(id, events);
        }
        self.insert(plan.chunk, events)
    }

    /// Stores an already validated chunk under a fresh id and sequence.
    fn insert(&mut self, chunk: NewChunk, events: &EventBus) -> ChunkId {
        let id = ChunkId::generate();
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let item = ChunkItem {
            id,
            media_type: chunk.resolved_media_type(),
            size: chunk.data.len(),
            duration: chunk.end_time - chunk.start_time,
            start_time: chunk.start_time,
            end_time: chunk.end_time,
            sequence,
            partition_key: chunk.partition_key,
            bandwidth: chunk.bandwidth,
            metadata: chunk.metadata,
        };
        self.chunks.insert(
            id,
            StoredChunk {
                item: item.clone(),
                data: chunk.data,
            },
        );
        events.publish(ChunkEventKind::Add { item });
        id
    }

    fn cleanup_if_needed(&mut self, events: &EventBus) {
        if self.config.auto_cleanup && self.config.exceeds_cleanup_threshold(self.chunks.len()) {
            self.cleanup(events);
        }
    }
}

fn sort_by_start(items: &mut [ChunkItem]) {
    items.sort_by(|a, b| {
        a.start_time
            .total_cmp(&b.start_time)
            .then(a.sequence.cmp(&b.sequence))
    });
}

/// Publishes `err` as an error event for `operation` and hands it back.
fn reject(events: &EventBus, operation: ChunkOperation, err: ChunkError) -> ChunkError {
    warn!("Chunk {:?} rejected: {}", operation, err);
    events.publish(ChunkEventKind::Error {
        operation,
        error: err.clone(),
    });
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChunkEvent;
    use crate::lifecycle::eviction::EvictionStrategy;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    const MB: usize = 1024 * 1024;

    fn recording_bus() -> (EventBus, Arc<Mutex<Vec<ChunkEvent>>>) {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let _subscription = bus.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        (bus, log)
    }

    fn bytes_of(len: usize, fill: u8) -> Vec<u8> {
        vec![fill; len]
    }

    #[test]
    fn test_add_and_get() {
        let (bus, log) = recording_bus();
        let mut table = ChunkTable::default();

        let id = table
            .add(
                NewChunk::new(bytes_of(16, 1), 0.0, 2.0).with_metadata_entry("type", "video/mp4"),
                &bus,
            )
            .unwrap();

        let item = table.get_item(&id).unwrap();
        assert_eq!(item.size, 16);
        assert_eq!(item.duration, 2.0);
        assert_eq!(item.sequence, 1);
        assert_eq!(item.media_type, "video/mp4");
        assert_eq!(table.get(&id).unwrap().len(), 16);

        let events = log.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0].kind, ChunkEventKind::Add { item } if item.id == id));
    }

    #[test]
    fn test_overlapping_add_merges_in_start_order() {
        let (bus, _log) = recording_bus();
        let mut table = ChunkTable::default();

        table
            .add(NewChunk::new(bytes_of(MB, 0xAA), 0.0, 5.0), &bus)
            .unwrap();
        let id = table
            .add(NewChunk::new(bytes_of(MB, 0xBB), 4.0, 9.0), &bus)
            .unwrap();

        assert_eq!(table.count(), 1);
        let item = table.get_item(&id).unwrap();
        assert_eq!((item.start_time, item.end_time), (0.0, 9.0));
        assert_eq!(item.size, 2 * MB);

        let data = table.get(&id).unwrap();
        assert_eq!(data[0], 0xAA);
        assert_eq!(data[MB - 1], 0xAA);
        assert_eq!(data[MB], 0xBB);
    }

    #[test]
    fn test_overlapping_add_combines_metadata_new_wins() {
        let (bus, _log) = recording_bus();
        let mut table = ChunkTable::default();

        table
            .add(
                NewChunk::new(bytes_of(4, 0), 0.0, 5.0)
                    .with_metadata_entry("codec", "h264")
                    .with_metadata_entry("segment", 1),
                &bus,
            )
            .unwrap();
        let id = table
            .add(
                NewChunk::new(bytes_of(4, 0), 4.0, 9.0).with_metadata_entry("segment", 2),
                &bus,
            )
            .unwrap();

        let item = table.get_item(&id).unwrap();
        assert_eq!(item.metadata.get("codec"), Some(&json!("h264")));
        assert_eq!(item.metadata.get("segment"), Some(&json!(2)));
    }

    #[test]
    fn test_add_without_auto_merge_keeps_overlaps() {
        let (bus, _log) = recording_bus();
        let config = ChunkStoreConfig::default().with_auto_merge(false);
        let mut table = ChunkTable::new(config).unwrap();

        table.add(NewChunk::new(bytes_of(4, 0), 0.0, 5.0), &bus).unwrap();
        table.add(NewChunk::new(bytes_of(4, 0), 4.0, 9.0), &bus).unwrap();

        assert_eq!(table.count(), 2);
        assert_eq!(table.total_duration(), 10.0);
    }

    #[test]
    fn test_different_partitions_do_not_merge() {
        let (bus, _log) = recording_bus();
        let mut table = ChunkTable::default();

        table
            .add(NewChunk::new(bytes_of(4, 0), 0.0, 5.0).with_partition_key("1080p"), &bus)
            .unwrap();
        table
            .add(NewChunk::new(bytes_of(4, 0), 4.0, 9.0).with_partition_key("720p"), &bus)
            .unwrap();

        assert_eq!(table.count(), 2);
        assert_eq!(table.partition_keys(), vec!["1080p".to_string(), "720p".to_string()]);
        assert_eq!(table.items_in_partition("720p").len(), 1);
        assert_eq!(table.in_range(0.0, 10.0, None).len(), 2);
        assert_eq!(table.in_range(0.0, 10.0, Some("1080p")).len(), 1);
    }

    #[test]
    fn test_unkeyed_add_absorbs_keyed_overlap() {
        let (bus, _log) = recording_bus();
        let mut table = ChunkTable::default();

        table
            .add(NewChunk::new(bytes_of(4, 1), 0.0, 5.0).with_partition_key("1080p"), &bus)
            .unwrap();
        let id = table.add(NewChunk::new(bytes_of(4, 2), 4.0, 9.0), &bus).unwrap();

        assert_eq!(table.count(), 1);
        let item = table.get_item(&id).unwrap();
        assert_eq!((item.start_time, item.end_time), (0.0, 9.0));
        assert_eq!(&table.get(&id).unwrap()[..], &[1, 1, 1, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn test_touching_chunks_merge() {
        let (bus, _log) = recording_bus();
        let mut table = ChunkTable::default();

        table.add(NewChunk::new(bytes_of(3, 1), 0.0, 5.0), &bus).unwrap();
        let id = table.add(NewChunk::new(bytes_of(2, 2), 5.0, 9.0), &bus).unwrap();

        assert_eq!(table.count(), 1);
        let item = table.get_item(&id).unwrap();
        assert_eq!((item.start_time, item.end_time), (0.0, 9.0));
        assert_eq!(item.size, 5);
    }

    #[test]
    fn test_merged_add_over_limit_is_rejected_without_mutation() {
        let (bus, log) = recording_bus();
        let mut table = ChunkTable::default();

        let first = table.add(NewChunk::new(bytes_of(4, 0), 0.0, 6.0), &bus).unwrap();
        let result = table.add(NewChunk::new(bytes_of(4, 0), 5.0, 11.0), &bus);

        assert!(matches!(result, Err(ChunkError::DurationExceeded { .. })));
        assert_eq!(table.count(), 1);
        assert!(table.get_item(&first).is_some());
        assert!(log.lock().unwrap().last().unwrap().is_error());
    }

    #[test]
    fn test_invalid_range_rejected() {
        let (bus, log) = recording_bus();
        let mut table = ChunkTable::default();

        let result = table.add(NewChunk::new(bytes_of(4, 0), 3.0, 3.0), &bus);
        assert!(matches!(result, Err(ChunkError::InvalidTimeRange { .. })));
        assert_eq!(table.count(), 0);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_remove_unknown_is_silent() {
        let (bus, log) = recording_bus();
        let mut table = ChunkTable::default();

        assert!(!table.remove(&ChunkId::generate(), &bus));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_merge_requires_two_known_ids() {
        let (bus, _log) = recording_bus();
        let mut table = ChunkTable::default();
        let id = table.add(NewChunk::new(bytes_of(4, 0), 0.0, 1.0), &bus).unwrap();

        assert_eq!(table.merge(&[id], &bus).unwrap(), None);
        assert_eq!(table.merge(&[id, id], &bus).unwrap(), None);
        assert_eq!(table.merge(&[id, ChunkId::generate()], &bus).unwrap(), None);
        assert_eq!(table.count(), 1);
        assert!(table.get_item(&id).is_some());
    }

    #[test]
    fn test_merge_averages_bandwidth_and_emits_event() {
        let (bus, log) = recording_bus();
        let mut table = ChunkTable::default();

        let a = table
            .add(
                NewChunk::new(bytes_of(2, 1), 0.0, 2.0)
                    .with_partition_key("1080p")
                    .with_bandwidth(4_000_000.0)
                    .with_metadata_entry("codec", "h264")
                    .with_metadata_entry("level", "4.0"),
                &bus,
            )
            .unwrap();
        let b = table
            .add(
                NewChunk::new(bytes_of(3, 2), 3.0, 5.0)
                    .with_partition_key("1080p")
                    .with_bandwidth(6_000_000.0)
                    .with_metadata_entry("level", "4.2"),
                &bus,
            )
            .unwrap();

        let merged = table.merge(&[b, a], &bus).unwrap().unwrap();
        let item = table.get_item(&merged).unwrap();
        assert_eq!((item.start_time, item.end_time), (0.0, 5.0));
        assert_eq!(item.bandwidth, Some(5_000_000.0));
        assert_eq!(item.partition(), Some("1080p"));
        assert_eq!(&table.get(&merged).unwrap()[..], &[1, 1, 2, 2, 2]);
        // Later start wins on conflicting keys.
        assert_eq!(item.metadata.get("level"), Some(&json!("4.2")));
        assert_eq!(item.metadata.get("codec"), Some(&json!("h264")));

        let events = log.lock().unwrap();
        assert!(matches!(
            &events.last().unwrap().kind,
            ChunkEventKind::Merge { merged_ids, item } if merged_ids == &vec![b, a] && item.id == merged
        ));
    }

    #[test]
    fn test_merge_partition_mismatch() {
        let (bus, log) = recording_bus();
        let mut table = ChunkTable::default();

        let a = table
            .add(NewChunk::new(bytes_of(2, 0), 0.0, 1.0).with_partition_key("1080p"), &bus)
            .unwrap();
        let b = table
            .add(NewChunk::new(bytes_of(2, 0), 2.0, 3.0).with_partition_key("720p"), &bus)
            .unwrap();

        let result = table.merge(&[a, b], &bus);
        assert!(matches!(result, Err(ChunkError::PartitionMismatch { .. })));
        assert_eq!(table.count(), 2);
        assert!(log.lock().unwrap().last().unwrap().is_error());
    }

    #[test]
    fn test_split_pieces_cover_range() {
        let (bus, _log) = recording_bus();
        let mut table = ChunkTable::default();

        let id = table
            .add(
                NewChunk::new(bytes_of(2 * MB, 7), 0.0, 9.0)
                    .with_partition_key("1080p")
                    .with_metadata_entry("codec", "h264"),
                &bus,
            )
            .unwrap();
        let ids = table.split(&id, &[6.0, 3.0], &bus).unwrap();

        assert_eq!(ids.len(), 3);
        assert!(table.get_item(&id).is_none());
        let ranges: Vec<(f64, f64)> = ids
            .iter()
            .map(|id| {
                let item = table.get_item(id).unwrap();
                (item.start_time, item.end_time)
            })
            .collect();
        assert_eq!(ranges, vec![(0.0, 3.0), (3.0, 6.0), (6.0, 9.0)]);
        assert_eq!(table.total_size(), 2 * MB);

        for (index, id) in ids.iter().enumerate() {
            let item = table.get_item(id).unwrap();
            assert_eq!(item.metadata.get(SPLIT_INDEX_KEY), Some(&json!(index)));
            assert_eq!(item.metadata.get("codec"), Some(&json!("h264")));
            assert_eq!(item.partition(), Some("1080p"));
        }
    }

    #[test]
    fn test_split_rejects_boundary_points() {
        let (bus, log) = recording_bus();
        let mut table = ChunkTable::default();
        let id = table.add(NewChunk::new(bytes_of(90, 0), 0.0, 9.0), &bus).unwrap();

        assert!(matches!(
            table.split(&id, &[0.0, 3.0], &bus),
            Err(ChunkError::InvalidSplitPoint { .. })
        ));
        assert!(table.split(&id, &[9.0], &bus).is_err());
        assert_eq!(table.split(&id, &[], &bus), Err(ChunkError::NoSplitPoints));
        assert!(table.get_item(&id).is_some());
        assert_eq!(log.lock().unwrap().iter().filter(|e| e.is_error()).count(), 3);
    }

    #[test]
    fn test_split_unknown_id_returns_empty() {
        let (bus, _log) = recording_bus();
        let mut table = ChunkTable::default();
        assert!(table.split(&ChunkId::generate(), &[1.0], &bus).unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_sequential() {
        let (bus, log) = recording_bus();
        let config = ChunkStoreConfig::default().with_max_chunks(2);
        let mut table = ChunkTable::new(config).unwrap();

        let first = table.add(NewChunk::new(bytes_of(1, 0), 0.0, 1.0), &bus).unwrap();
        let second = table.add(NewChunk::new(bytes_of(1, 0), 2.0, 3.0), &bus).unwrap();
        let third = table.add(NewChunk::new(bytes_of(1, 0), 4.0, 5.0), &bus).unwrap();

        assert_eq!(table.count(), 2);
        assert!(table.get_item(&first).is_none());
        assert!(table.get_item(&second).is_some());
        assert!(table.get_item(&third).is_some());

        let removed: Vec<usize> = log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event.kind {
                ChunkEventKind::Cleanup { removed_count } => Some(removed_count),
                _ => None,
            })
            .collect();
        assert_eq!(removed, vec![0, 1]);
    }

    #[test]
    fn test_cleanup_timestamp_strategy() {
        let (bus, _log) = recording_bus();
        let config = ChunkStoreConfig::default()
            .with_max_chunks(2)
            .with_eviction_strategy(EvictionStrategy::Timestamp);
        let mut table = ChunkTable::new(config).unwrap();

        let late = table.add(NewChunk::new(bytes_of(1, 0), 20.0, 21.0), &bus).unwrap();
        let early = table.add(NewChunk::new(bytes_of(1, 0), 0.0, 1.0), &bus).unwrap();
        let middle = table.add(NewChunk::new(bytes_of(1, 0), 10.0, 11.0), &bus).unwrap();

        assert!(table.get_item(&early).is_none());
        assert!(table.get_item(&late).is_some());
        assert!(table.get_item(&middle).is_some());
    }

    #[test]
    fn test_cleanup_quality_strategy() {
        let (bus, _log) = recording_bus();
        let config = ChunkStoreConfig::default()
            .with_max_chunks(2)
            .with_eviction_strategy(EvictionStrategy::Quality);
        let mut table = ChunkTable::new(config).unwrap();

        let high = table
            .add(NewChunk::new(bytes_of(1, 0), 0.0, 1.0).with_bandwidth(8_000_000.0), &bus)
            .unwrap();
        let low = table
            .add(NewChunk::new(bytes_of(1, 0), 2.0, 3.0).with_bandwidth(1_000_000.0), &bus)
            .unwrap();
        let mid = table
            .add(NewChunk::new(bytes_of(1, 0), 4.0, 5.0).with_bandwidth(4_000_000.0), &bus)
            .unwrap();

        assert!(table.get_item(&low).is_none());
        assert!(table.get_item(&high).is_some());
        assert!(table.get_item(&mid).is_some());
    }

    #[test]
    fn test_cleanup_below_threshold_is_noop() {
        let (bus, log) = recording_bus();
        let mut table = ChunkTable::default();
        table.add(NewChunk::new(bytes_of(1, 0), 0.0, 1.0), &bus).unwrap();

        assert_eq!(table.cleanup(&bus), 0);
        assert!(!log
            .lock()
            .unwrap()
            .iter()
            .any(|event| matches!(event.kind, ChunkEventKind::Cleanup { .. })));
    }

    #[test]
    fn test_configure_triggers_cleanup() {
        let (bus, _log) = recording_bus();
        let mut table = ChunkTable::default();
        for i in 0..5 {
            let start = i as f64 * 2.0;
            table
                .add(NewChunk::new(bytes_of(1, 0), start, start + 1.0), &bus)
                .unwrap();
        }

        table
            .configure(&ConfigUpdate::default().with_max_chunks(3), &bus)
            .unwrap();
        assert_eq!(table.count(), 3);
        assert_eq!(table.config().max_chunks, 3);
    }

    #[test]
    fn test_configure_invalid_keeps_previous() {
        let (bus, log) = recording_bus();
        let mut table = ChunkTable::default();

        let result = table.configure(&ConfigUpdate::default().with_cleanup_threshold(2.0), &bus);
        assert!(matches!(result, Err(ChunkError::InvalidConfig(_))));
        assert_eq!(table.config(), &ChunkStoreConfig::default());
        assert!(matches!(
            log.lock().unwrap()[0].kind,
            ChunkEventKind::Error {
                operation: ChunkOperation::Configure,
                ..
            }
        ));
    }

    #[test]
    fn test_custom_eviction_policy() {
        struct NewestFirst;

        impl EvictionPolicy for NewestFirst {
            fn compare(&self, a: &ChunkItem, b: &ChunkItem) -> std::cmp::Ordering {
                b.sequence.cmp(&a.sequence)
            }
        }

        let (bus, _log) = recording_bus();
        let config = ChunkStoreConfig::default().with_max_chunks(2);
        let mut table = ChunkTable::new(config).unwrap();
        table.set_eviction_policy(Box::new(NewestFirst));

        let first = table.add(NewChunk::new(bytes_of(1, 0), 0.0, 1.0), &bus).unwrap();
        let second = table.add(NewChunk::new(bytes_of(1, 0), 2.0, 3.0), &bus).unwrap();
        let third = table.add(NewChunk::new(bytes_of(1, 0), 4.0, 5.0), &bus).unwrap();

        assert!(table.get_item(&first).is_some());
        assert!(table.get_item(&second).is_some());
        assert!(table.get_item(&third).is_none());
    }

    #[test]
    fn test_stats() {
        let (bus, _log) = recording_bus();
        let mut table = ChunkTable::default();
        assert_eq!(table.stats(), ChunkTableStats::default());

        table.add(NewChunk::new(bytes_of(10, 0), 1.0, 3.0), &bus).unwrap();
        table.add(NewChunk::new(bytes_of(5, 0), 5.0, 6.5), &bus).unwrap();

        let stats = table.stats();
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.total_size, 15);
        assert_eq!(stats.total_duration, 3.5);
        assert_eq!(stats.earliest_start, Some(1.0));
        assert_eq!(stats.latest_end, Some(6.5));
    }
}
