//! Buffer and metadata operations behind chunk merging and splitting.
//!
//! Splitting maps split times to byte offsets by linear interpolation,
//! assuming uniform byte density across the chunk. This holds for raw,
//! already demuxed media; containerized payloads (fragmented MP4 and the like)
//! are not split on frame boundaries and may not decode after a split.

use crate::chunk::{Metadata, TimeRange};
use crate::error::{ChunkError, Result};
use bytes::{Bytes, BytesMut};

/// Concatenates buffers in the given order.
pub fn concat_buffers<'a, I>(buffers: I) -> Bytes
where
    I: IntoIterator<Item = &'a Bytes>,
    I::IntoIter: Clone,
{
    let buffers = buffers.into_iter();
    let total: usize = buffers.clone().map(Bytes::len).sum();
    let mut merged = BytesMut::with_capacity(total);
    for buffer in buffers {
        merged.extend_from_slice(buffer);
    }
    merged.freeze()
}

/// Combines metadata maps left to right; later maps overwrite earlier keys.
pub fn combine_metadata<'a, I>(maps: I) -> Metadata
where
    I: IntoIterator<Item = &'a Metadata>,
{
    let mut combined = Metadata::new();
    for map in maps {
        combined.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    combined
}

/// Arithmetic mean of the bandwidths that are present.
pub fn mean_bandwidth<I>(bandwidths: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = bandwidths
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), bw| (sum + bw, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Sorts split times and checks each lies strictly inside `range`.
///
/// # Errors
///
/// - `ChunkError::NoSplitPoints` if `times` is empty
/// - `ChunkError::InvalidSplitPoint` for a time on or outside the range
///   bounds, a NaN, or a repeated time
pub fn validate_split_times(range: &TimeRange, times: &[f64]) -> Result<Vec<f64>> {
    if times.is_empty() {
        return Err(ChunkError::NoSplitPoints);
    }

    let invalid = |time: f64| ChunkError::InvalidSplitPoint {
        time,
        start: range.start,
        end: range.end,
    };

    let mut sorted = times.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut previous: Option<f64> = None;
    for &time in &sorted {
        if !range.strictly_contains(time) {
            return Err(invalid(time));
        }
        if previous == Some(time) {
            return Err(invalid(time));
        }
        previous = Some(time);
    }
    Ok(sorted)
}

/// Byte offset of each split time: `floor((t - start) * len / (end - start))`.
///
/// `times` must already be validated against `range`.
pub fn split_offsets(range: &TimeRange, len: usize, times: &[f64]) -> Vec<usize> {
    let duration = range.duration();
    times
        .iter()
        .map(|&time| {
            let offset = ((time - range.start) * len as f64 / duration).floor();
            (offset as usize).min(len)
        })
        .collect()
}

/// Slices `data` at the given non-decreasing offsets.
///
/// Returns `offsets.len() + 1` pieces that share `data`'s allocation.
pub fn split_buffer(data: &Bytes, offsets: &[usize]) -> Vec<Bytes> {
    let mut pieces = Vec::with_capacity(offsets.len() + 1);
    let mut start = 0;
    for &offset in offsets.iter().chain(std::iter::once(&data.len())) {
        pieces.push(data.slice(start..offset));
        start = offset;
    }
    pieces
}
