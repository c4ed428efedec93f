use std::sync::Arc;

use boundaries_spatial::BoundingBox;
use bytes::Bytes;
use common_exception::Result;
use common_utils::ByteRange;
use futures::{StreamExt, TryStreamExt, stream};
use tracing::trace;

use crate::coalesce::coalesce_ranges;
use crate::source::ByteSource;

/// A feature selected by the index, located inside one merged range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    /// Leaf ordinal in Hilbert order.
    pub index: usize,
    pub bounds: BoundingBox,
    /// Absolute byte range of the feature record.
    pub range: ByteRange,
    /// Position of the merged range holding it in [`FetchPlan::chunks`].
    pub chunk: usize,
}

/// Merged ranges to fetch for a query and the candidates they serve
///
/// Chunks are ordered by first need: walking the candidates in index order,
/// a candidate never needs a chunk positioned after one that no earlier
/// candidate needed. Fetching chunks in order and processing candidates in
/// order therefore never waits on a chunk that is fetched later.
#[derive(Debug, Default)]
pub(crate) struct FetchPlan {
    pub chunks: Vec<ByteRange>,
    pub candidates: Vec<Candidate>,
    /// Candidate position after which each chunk is no longer needed.
    pub last_use: Vec<usize>,
}

impl FetchPlan {
    /// Plan the fetches for `hits`, given as `(index, bounds, absolute range)`
    /// in index order. Ranges must be non-empty.
    pub fn new(hits: Vec<(usize, BoundingBox, ByteRange)>, gap: u64) -> Self {
        let ranges: Vec<ByteRange> = hits.iter().map(|(_, _, range)| *range).collect();
        let merged = coalesce_ranges(&ranges, gap);

        let mut schedule: Vec<Option<usize>> = vec![None; merged.len()];
        let mut chunks = Vec::with_capacity(merged.len());
        let mut last_use = Vec::with_capacity(merged.len());
        let mut candidates = Vec::with_capacity(hits.len());

        for (position, (index, bounds, range)) in hits.into_iter().enumerate() {
            let merged_id = merged.partition_point(|chunk| chunk.end() <= range.offset);
            let chunk = match schedule[merged_id] {
                Some(chunk) => chunk,
                None => {
                    let chunk = chunks.len();
                    schedule[merged_id] = Some(chunk);
                    chunks.push(merged[merged_id]);
                    last_use.push(position);
                    chunk
                }
            };
            last_use[chunk] = position;
            candidates.push(Candidate {
                index,
                bounds,
                range,
                chunk,
            });
        }

        Self {
            chunks,
            candidates,
            last_use,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.chunks.iter().map(|chunk| chunk.length).sum()
    }
}

/// Buffers fetched for a set of ranges, looked up by any contained range.
#[derive(Debug, Default)]
pub(crate) struct FetchedRanges {
    /// Sorted by offset, pairwise disjoint.
    chunks: Vec<(ByteRange, Bytes)>,
}

impl FetchedRanges {
    /// Fetch disjoint `ranges` with at most `concurrency` reads in flight.
    pub async fn fetch(
        source: &Arc<dyn ByteSource>, ranges: Vec<ByteRange>, concurrency: usize,
    ) -> Result<Self> {
        let mut chunks: Vec<(ByteRange, Bytes)> = stream::iter(ranges)
            .map(|range| {
                let source = source.clone();
                async move {
                    trace!(source = source.name(), %range, "fetching range");
                    source.read_range(range).await.map(|bytes| (range, bytes))
                }
            })
            .buffered(concurrency)
            .try_collect()
            .await?;
        chunks.sort_unstable_by_key(|(range, _)| range.offset);
        Ok(Self { chunks })
    }

    /// Bytes of `range`, if it lies inside one fetched chunk.
    pub fn get(&self, range: &ByteRange) -> Option<Bytes> {
        let position = self
            .chunks
            .partition_point(|(chunk, _)| chunk.end() <= range.offset);
        let (chunk, bytes) = self.chunks.get(position)?;
        chunk.relative(range).map(|slice| bytes.slice(slice))
    }
}
