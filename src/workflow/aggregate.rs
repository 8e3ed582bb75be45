//! Per-job fan-in aggregation state.
//!
//! The only shared mutable state in the pipeline: the set of received
//! segment results keyed by (chunk index, resolution), plus the set of
//! resolutions whose variant playlist is complete. Inserts are first-write-
//! wins, so duplicate delivery from at-least-once dispatch is a no-op:
//! a monotone set union, no broader locking needed.

use dashmap::{DashMap, DashSet};
use vodforge_common::{Resolution, SegmentResult};

/// Concurrent segment aggregation for one job.
#[derive(Debug)]
pub struct SegmentAggregator {
    chunk_count: usize,
    segments: DashMap<(u32, Resolution), SegmentResult>,
    complete_variants: DashSet<Resolution>,
}

impl SegmentAggregator {
    pub fn new(chunk_count: usize) -> Self {
        Self {
            chunk_count,
            segments: DashMap::new(),
            complete_variants: DashSet::new(),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Record a segment result. Returns `false` when the (chunk, resolution)
    /// key was already present; the first delivery wins and later duplicates
    /// are ignored.
    pub fn record(&self, segment: SegmentResult) -> bool {
        match self
            .segments
            .entry((segment.chunk_index, segment.resolution))
        {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(segment);
                true
            }
        }
    }

    /// Number of distinct segments received for a resolution.
    pub fn received(&self, resolution: Resolution) -> usize {
        self.segments
            .iter()
            .filter(|entry| entry.key().1 == resolution)
            .count()
    }

    /// Whether every chunk index has arrived for a resolution.
    pub fn is_resolution_complete(&self, resolution: Resolution) -> bool {
        (0..self.chunk_count as u32)
            .all(|index| self.segments.contains_key(&(index, resolution)))
    }

    /// Segments for a resolution in ascending chunk-index order.
    ///
    /// Fails when an index is missing; the caller treats that as a
    /// defensive assembly error since the fan-out only completes once every
    /// pair has succeeded.
    pub fn ordered_segments(&self, resolution: Resolution) -> Result<Vec<SegmentResult>, String> {
        let mut segments = Vec::with_capacity(self.chunk_count);
        for index in 0..self.chunk_count as u32 {
            match self.segments.get(&(index, resolution)) {
                Some(entry) => segments.push(entry.value().clone()),
                None => {
                    return Err(format!(
                        "missing segment for chunk {index} / {resolution}"
                    ));
                }
            }
        }
        Ok(segments)
    }

    /// Mark a resolution's variant playlist as complete.
    pub fn mark_variant_complete(&self, resolution: Resolution) {
        self.complete_variants.insert(resolution);
    }

    /// Whether every resolution in the ladder has a complete variant.
    pub fn all_variants_complete(&self, ladder: &[Resolution]) -> bool {
        ladder
            .iter()
            .all(|resolution| self.complete_variants.contains(resolution))
    }
}
