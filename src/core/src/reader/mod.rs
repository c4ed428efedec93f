use std::path::Path;
use std::sync::Arc;

use boundaries_spatial::{
    BoundingBox, IndexLayout, LevelSearch, NODE_ITEM_SIZE, NodeItem, PackedRTree, SearchHit,
};
use bytes::Bytes;
use common_exception::{BoundariesError, Result};
use common_utils::ByteRange;
use tracing::debug;

use crate::coalesce::coalesce_ranges;
use crate::fetch::{FetchPlan, FetchedRanges};
use crate::header::{HEADER_PREFIX_SIZE, Header};
use crate::option::ReaderOptions;
use crate::source::{ByteSource, HttpSource, LocalSource};

mod stream;

pub use stream::{FeatureStream, FeatureStreamMetrics};

/// Where the packed index lives after opening.
#[derive(Debug)]
enum IndexState {
    /// The whole index was loaded when the dataset was opened
    Loaded(Arc<PackedRTree>),
    /// The index is read level by level for every query
    Remote,
}

/// An open dataset
///
/// The header is parsed once and shared by every query; a reader only exists
/// once that succeeded. Queries take `&self`, so one reader serves any number
/// of concurrent queries, and a failed query leaves it usable.
#[derive(Debug)]
pub struct FeatureReader {
    source: Arc<dyn ByteSource>,
    header: Arc<Header>,
    options: ReaderOptions,
    layout: Arc<IndexLayout>,
    index: IndexState,
    /// Absolute offset of the first index record
    index_offset: u64,
    /// Absolute offset of the feature section
    features_offset: u64,
    /// Total length of the source
    length: u64,
}

impl FeatureReader {
    /// Open a dataset: read and parse its header, then load the index if it is
    /// no larger than [`ReaderOptions::index_prefetch_limit`].
    pub async fn open(source: Arc<dyn ByteSource>, options: ReaderOptions) -> Result<Self> {
        options.validate()?;

        let length = source.length().await?;
        if length < HEADER_PREFIX_SIZE as u64 {
            return Err(BoundariesError::MalformedHeader(format!(
                "{} holds {length} bytes, too few for a dataset header",
                source.name()
            )));
        }

        let prefix_len = options.header_prefetch_bytes.min(length);
        let mut prefix = source.read_range(ByteRange::new(0, prefix_len)).await?;
        let header_size = Header::encoded_size(&prefix)? as u64;
        if header_size > length {
            return Err(BoundariesError::MalformedHeader(format!(
                "header declares {header_size} bytes but {} holds {length}",
                source.name()
            )));
        }
        if header_size > prefix_len {
            let rest = source
                .read_range(ByteRange::new(prefix_len, header_size - prefix_len))
                .await?;
            prefix = [prefix, rest].concat().into();
        }
        let header = Header::parse(&prefix)?;

        let leaves_size = header.features_count.saturating_mul(NODE_ITEM_SIZE as u64);
        if leaves_size > length {
            return Err(BoundariesError::InvalidIndex(format!(
                "{} features cannot be indexed within the {length} bytes of {}",
                header.features_count,
                source.name()
            )));
        }
        let layout = header.index_layout()?;
        let index_offset = header_size;
        let index_size = layout.size_in_bytes();
        let features_offset = index_offset.checked_add(index_size).ok_or_else(|| {
            BoundariesError::InvalidIndex("index size overflows the file offset".to_owned())
        })?;
        if features_offset > length {
            return Err(BoundariesError::InvalidIndex(format!(
                "index of {} nodes ends at byte {features_offset} but {} holds {length}",
                layout.num_nodes(),
                source.name()
            )));
        }

        let index = if index_size <= options.index_prefetch_limit {
            let index_range = ByteRange::new(index_offset, index_size);
            let whole = ByteRange::new(0, prefix.len() as u64);
            let bytes = match whole.relative(&index_range) {
                Some(slice) => prefix.slice(slice),
                None if index_range.is_empty() => Bytes::new(),
                None => source.read_range(index_range).await?,
            };
            IndexState::Loaded(Arc::new(PackedRTree::from_bytes(layout.clone(), &bytes)?))
        } else {
            IndexState::Remote
        };

        debug!(
            source = source.name(),
            layer = %header.name,
            features = header.features_count,
            index_bytes = index_size,
            index_loaded = matches!(index, IndexState::Loaded(_)),
            "opened dataset"
        );

        Ok(Self {
            source,
            header: Arc::new(header),
            options,
            layout: Arc::new(layout),
            index,
            index_offset,
            features_offset,
            length,
        })
    }

    /// Open a dataset on the local filesystem.
    pub async fn open_path(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self> {
        let source = LocalSource::open(path).await?;
        Self::open(Arc::new(source), options).await
    }

    /// Open a dataset served over HTTP.
    pub async fn open_url(url: &str, options: ReaderOptions) -> Result<Self> {
        let source = HttpSource::new(url, &options.http)?;
        Self::open(Arc::new(source), options).await
    }

    /// Number of features declared by the header.
    pub fn count(&self) -> u64 {
        self.header.features_count
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// True if the whole index was loaded at open.
    pub fn is_index_loaded(&self) -> bool {
        matches!(self.index, IndexState::Loaded(_))
    }

    /// Stream the features intersecting `query`
    ///
    /// Index traversal happens here; feature ranges are only fetched as the
    /// returned stream is polled. Features come in index order.
    pub async fn query(&self, query: &BoundingBox) -> Result<FeatureStream> {
        query.validate_query()?;

        if let Some(envelope) = self.header.envelope()
            && !envelope.intersects(query)
        {
            debug!(?query, "query lies outside the dataset envelope");
            return Ok(FeatureStream::empty(self.header.clone(), *query));
        }

        let hits = match &self.index {
            IndexState::Loaded(tree) => tree.search(query)?,
            IndexState::Remote => self.search_remote(query).await?,
        };
        if hits.is_empty() {
            return Ok(FeatureStream::empty(self.header.clone(), *query));
        }

        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits {
            candidates.push((hit.index, hit.bounds, self.feature_range(&hit)?));
        }
        let plan = FetchPlan::new(candidates, self.options.range_gap_tolerance);

        debug!(
            ?query,
            candidates = plan.candidates.len(),
            ranges = plan.chunks.len(),
            bytes = plan.total_bytes(),
            "query planned"
        );

        Ok(FeatureStream::new(
            self.source.clone(),
            self.header.clone(),
            *query,
            plan,
            self.options.fetch_concurrency,
        ))
    }

    /// Absolute byte range of a hit, checked against the end of the source.
    fn feature_range(&self, hit: &SearchHit) -> Result<ByteRange> {
        let offset = self.features_offset.checked_add(hit.range.offset);
        let end = offset.and_then(|offset| offset.checked_add(hit.range.length));
        match (offset, end) {
            (Some(offset), Some(end)) if hit.range.length > 0 && end <= self.length => {
                Ok(ByteRange::new(offset, hit.range.length))
            }
            _ => Err(BoundariesError::TruncatedFeature(format!(
                "feature {} claims range {} of the feature section, which is empty or ends past \
                 the {} bytes of {}",
                hit.index,
                hit.range,
                self.length,
                self.source.name()
            ))),
        }
    }

    /// Traverse a remote index one level at a time, fetching the pending node
    /// runs of each level as coalesced ranges.
    async fn search_remote(&self, query: &BoundingBox) -> Result<Vec<SearchHit>> {
        let mut search = LevelSearch::new(&self.layout, *query)?;
        let mut requests = 0;
        while search.pending().is_some() {
            let ranges: Vec<ByteRange> = search
                .pending_bytes()
                .iter()
                .map(|range| range.shifted(self.index_offset))
                .collect();
            let merged = coalesce_ranges(&ranges, self.options.range_gap_tolerance);
            requests += merged.len();
            let fetched =
                FetchedRanges::fetch(&self.source, merged, self.options.fetch_concurrency).await?;

            let index_offset = self.index_offset;
            search.advance(|pos| {
                let range = ByteRange::new(
                    index_offset + pos as u64 * NODE_ITEM_SIZE as u64,
                    NODE_ITEM_SIZE as u64,
                );
                let bytes = fetched.get(&range).ok_or_else(|| {
                    BoundariesError::InvalidIndex(format!("node {pos} was not fetched"))
                })?;
                NodeItem::decode(&bytes)
            })?;
        }

        debug!(
            visited = search.visited(),
            requests,
            hits = search.hits().len(),
            "remote index searched"
        );
        Ok(search.into_hits())
    }

    /// Release the source and the index.
    pub fn close(self) {
        debug!(source = self.source.name(), "closed dataset");
    }
}
