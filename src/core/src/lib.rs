//! Range-limited spatial retrieval over packed geometry datasets.
//!
//! A dataset is a single file: a self-describing header, a packed Hilbert
//! R-tree and the feature records in Hilbert order. [`FeatureReader`] opens one
//! from any [`ByteSource`] and answers bounding-box queries while fetching only
//! the index nodes and feature ranges the query touches.

mod coalesce;
mod feature;
mod fetch;
mod header;
mod option;
mod reader;
mod source;
mod writer;

pub use boundaries_spatial::BoundingBox;
pub use coalesce::coalesce_ranges;
pub use common_exception::{BoundariesError, Result};
pub use common_utils::ByteRange;
pub use feature::{ColumnValue, Feature, Properties, decode_feature, encode_feature};
pub use header::{
    Column, ColumnType, GeometryType, HEADER_MAX_BUFFER_SIZE, HEADER_PREFIX_SIZE, Header,
    MAGIC_BYTES, VERSION,
};
pub use option::{ConfigEntry, HttpOptions, ReaderOptions};
pub use reader::{FeatureReader, FeatureStream, FeatureStreamMetrics};
pub use source::{ByteSource, HttpSource, LocalSource, MemorySource, MeteredSource, SourceMetrics};
pub use writer::{DatasetSchema, DatasetWriter};
