use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use boundaries_spatial::{BoundingBox, intersects_box};
use bytes::Bytes;
use common_exception::{BoundariesError, Result};
use common_utils::ByteRange;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt, ready};
use tracing::{debug, trace};

use crate::feature::{Feature, decode_feature};
use crate::fetch::{Candidate, FetchPlan};
use crate::header::Header;
use crate::source::ByteSource;

/// Lazily fetched, decoded and refined features of one query
///
/// Merged ranges are fetched with bounded concurrency in order of first need
/// and features are yielded in index order. The first error ends the stream.
/// Dropping the stream cancels the fetches still in flight.
pub struct FeatureStream {
    header: Arc<Header>,
    query: BoundingBox,
    candidates: Vec<Candidate>,
    /// Candidate position after which each chunk is released
    last_use: Vec<usize>,
    /// Ordered, buffered fetches of the merged ranges
    chunks: BoxStream<'static, Result<(usize, Bytes)>>,
    /// Fetched chunks still needed by a later candidate
    ready: HashMap<usize, Bytes>,
    /// Absolute range of every chunk
    chunk_ranges: Vec<ByteRange>,
    /// Position of the next candidate
    cursor: usize,
    metrics: FeatureStreamMetrics,
    state: FeatureStreamState,
}

/// Counters of a [`FeatureStream`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureStreamMetrics {
    /// Features whose bounds intersect the query
    pub candidates: usize,
    /// Merged ranges fetched so far
    pub chunks_fetched: usize,
    /// Features decoded so far
    pub decoded: usize,
    /// Decoded features discarded by the exact intersection test
    pub refined_out: usize,
    /// Features yielded
    pub yielded: usize,
}

/// States of the feature stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeatureStreamState {
    /// Waiting for the chunk holding the next candidate
    FetchChunk,
    /// The next candidate's chunk is available
    DecodeCandidate,
    /// Every candidate was processed, or an error ended the stream
    Completed,
}

/// Outcome of one step of the state machine.
enum StreamStep {
    Continue,
    Yield(Feature),
}

impl FeatureStream {
    pub(crate) fn new(
        source: Arc<dyn ByteSource>, header: Arc<Header>, query: BoundingBox, plan: FetchPlan,
        concurrency: usize,
    ) -> Self {
        let FetchPlan {
            chunks,
            candidates,
            last_use,
        } = plan;

        let fetches = stream::iter(chunks.clone().into_iter().enumerate())
            .map(move |(id, range)| {
                let source = source.clone();
                async move {
                    trace!(source = source.name(), %range, chunk = id, "fetching features");
                    source.read_range(range).await.map(|bytes| (id, bytes))
                }
            })
            .buffered(concurrency.max(1))
            .boxed();

        let state = if candidates.is_empty() {
            FeatureStreamState::Completed
        } else {
            FeatureStreamState::FetchChunk
        };

        Self {
            header,
            query,
            metrics: FeatureStreamMetrics {
                candidates: candidates.len(),
                ..Default::default()
            },
            candidates,
            last_use,
            chunks: fetches,
            ready: HashMap::new(),
            chunk_ranges: chunks,
            cursor: 0,
            state,
        }
    }

    /// A stream that yields nothing and reads nothing.
    pub(crate) fn empty(header: Arc<Header>, query: BoundingBox) -> Self {
        Self {
            header,
            query,
            candidates: Vec::new(),
            last_use: Vec::new(),
            chunks: stream::empty().boxed(),
            ready: HashMap::new(),
            chunk_ranges: Vec::new(),
            cursor: 0,
            metrics: FeatureStreamMetrics::default(),
            state: FeatureStreamState::Completed,
        }
    }

    pub fn metrics(&self) -> FeatureStreamMetrics {
        self.metrics
    }

    /// Number of candidates not processed yet.
    pub fn remaining_candidates(&self) -> usize {
        self.candidates.len() - self.cursor
    }

    fn poll_next_impl(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Feature>>> {
        loop {
            let step = match self.state {
                FeatureStreamState::FetchChunk => ready!(self.fetch_chunk(cx)),
                FeatureStreamState::DecodeCandidate => self.decode_candidate(),
                FeatureStreamState::Completed => return Poll::Ready(None),
            };
            match step {
                Ok(StreamStep::Continue) => continue,
                Ok(StreamStep::Yield(feature)) => return Poll::Ready(Some(Ok(feature))),
                Err(err) => {
                    self.finish();
                    return Poll::Ready(Some(Err(err)));
                }
            }
        }
    }

    fn fetch_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Result<StreamStep>> {
        let needed = self.candidates[self.cursor].chunk;
        if self.ready.contains_key(&needed) {
            self.state = FeatureStreamState::DecodeCandidate;
            return Poll::Ready(Ok(StreamStep::Continue));
        }

        match ready!(self.chunks.poll_next_unpin(cx)) {
            Some(Ok((id, bytes))) => {
                self.metrics.chunks_fetched += 1;
                self.ready.insert(id, bytes);
                Poll::Ready(Ok(StreamStep::Continue))
            }
            Some(Err(err)) => Poll::Ready(Err(err)),
            None => Poll::Ready(Err(BoundariesError::ByteSourceIo(format!(
                "fetches ended before chunk {needed} arrived"
            )))),
        }
    }

    fn decode_candidate(&mut self) -> Result<StreamStep> {
        let position = self.cursor;
        let candidate = self.candidates[position];
        self.cursor += 1;

        let chunk_range = self.chunk_ranges[candidate.chunk];
        let bytes = self.ready.get(&candidate.chunk).ok_or_else(|| {
            BoundariesError::ByteSourceIo(format!("chunk {} is not available", candidate.chunk))
        })?;
        let slice = chunk_range.relative(&candidate.range).ok_or_else(|| {
            BoundariesError::TruncatedFeature(format!(
                "feature {} range {} lies outside fetched range {chunk_range}",
                candidate.index, candidate.range
            ))
        })?;
        let decoded = decode_feature(&bytes[slice], &self.header);

        if self.last_use[candidate.chunk] == position {
            self.ready.remove(&candidate.chunk);
        }

        let feature = decoded.map_err(|err| match err {
            BoundariesError::TruncatedFeature(msg) => BoundariesError::TruncatedFeature(format!(
                "feature {} at {}: {msg}",
                candidate.index, candidate.range
            )),
            other => other,
        })?;
        self.metrics.decoded += 1;

        let intersects = intersects_box(&feature.geometry, &self.query);
        if intersects {
            self.metrics.yielded += 1;
        } else {
            self.metrics.refined_out += 1;
        }

        if self.cursor == self.candidates.len() {
            self.finish();
        } else {
            self.state = FeatureStreamState::FetchChunk;
        }

        Ok(if intersects {
            StreamStep::Yield(feature)
        } else {
            StreamStep::Continue
        })
    }

    fn finish(&mut self) {
        if self.state == FeatureStreamState::Completed {
            return;
        }
        self.state = FeatureStreamState::Completed;
        self.ready.clear();
        self.chunks = stream::empty().boxed();
        debug!(
            candidates = self.metrics.candidates,
            chunks = self.metrics.chunks_fetched,
            decoded = self.metrics.decoded,
            refined_out = self.metrics.refined_out,
            yielded = self.metrics.yielded,
            "feature stream finished"
        );
    }
}

impl Stream for FeatureStream {
    type Item = Result<Feature>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.poll_next_impl(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining_candidates()))
    }
}

impl std::fmt::Debug for FeatureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureStream")
            .field("query", &self.query)
            .field("metrics", &self.metrics)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
