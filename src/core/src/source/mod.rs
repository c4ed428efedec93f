use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use common_exception::Result;
use common_utils::ByteRange;

mod http;
mod local;
mod memory;
mod metered;

pub use http::HttpSource;
pub use local::LocalSource;
pub use memory::MemorySource;
pub use metered::{MeteredSource, SourceMetrics};

/// Random access to the bytes of a dataset
///
/// Implementations must be safe to call concurrently: the reader issues
/// several range reads at once.
#[async_trait]
pub trait ByteSource: Send + Sync + Debug {
    /// Read exactly the bytes of `range`.
    ///
    /// A read that cannot be satisfied completely fails; it never returns a
    /// short buffer.
    async fn read_range(&self, range: ByteRange) -> Result<Bytes>;

    /// Total length of the resource in bytes.
    async fn length(&self) -> Result<u64>;

    /// Human readable name used in logs and errors.
    fn name(&self) -> &str;
}
