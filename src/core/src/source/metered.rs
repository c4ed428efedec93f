use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common_exception::Result;
use common_utils::ByteRange;
use parking_lot::Mutex;

use crate::source::ByteSource;

/// Requests observed by a [`MeteredSource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMetrics {
    /// Number of `read_range` calls, failed ones included.
    pub requests: u64,
    /// Bytes returned by successful reads.
    pub bytes: u64,
    /// Every requested range, in call order.
    pub ranges: Vec<ByteRange>,
}

/// Wraps a source and records every range it is asked for.
#[derive(Debug)]
pub struct MeteredSource {
    inner: Arc<dyn ByteSource>,
    metrics: Mutex<SourceMetrics>,
}

impl MeteredSource {
    pub fn new(inner: Arc<dyn ByteSource>) -> Self {
        Self {
            inner,
            metrics: Mutex::new(SourceMetrics::default()),
        }
    }

    pub fn metrics(&self) -> SourceMetrics {
        self.metrics.lock().clone()
    }

    /// Return the metrics collected so far and start counting from zero.
    pub fn reset(&self) -> SourceMetrics {
        std::mem::take(&mut *self.metrics.lock())
    }
}

#[async_trait]
impl ByteSource for MeteredSource {
    async fn read_range(&self, range: ByteRange) -> Result<Bytes> {
        {
            let mut metrics = self.metrics.lock();
            metrics.requests += 1;
            metrics.ranges.push(range);
        }
        let bytes = self.inner.read_range(range).await?;
        self.metrics.lock().bytes += bytes.len() as u64;
        Ok(bytes)
    }

    async fn length(&self) -> Result<u64> {
        self.inner.length().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    #[tokio::test]
    async fn test_counts_requests_and_bytes() {
        let source = MeteredSource::new(Arc::new(MemorySource::new("streets", vec![7u8; 100])));
        source.read_range(ByteRange::new(0, 10)).await.unwrap();
        source.read_range(ByteRange::new(50, 25)).await.unwrap();
        assert!(source.read_range(ByteRange::new(90, 25)).await.is_err());

        let metrics = source.reset();
        assert_eq!(metrics.requests, 3);
        assert_eq!(metrics.bytes, 35);
        assert_eq!(metrics.ranges[1], ByteRange::new(50, 25));
        assert_eq!(source.metrics(), SourceMetrics::default());
    }
}
