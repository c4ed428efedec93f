use async_trait::async_trait;
use bytes::Bytes;
use common_exception::{BoundariesError, Result};
use common_utils::ByteRange;

use crate::source::ByteSource;

/// A dataset held entirely in memory; reads are zero-copy slices.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    data: Bytes,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn read_range(&self, range: ByteRange) -> Result<Bytes> {
        let whole = ByteRange::new(0, self.data.len() as u64);
        let slice = whole.relative(&range).ok_or_else(|| {
            BoundariesError::ByteSourceIo(format!(
                "range {range} is past the end of {} ({} bytes)",
                self.name,
                self.data.len()
            ))
        })?;
        Ok(self.data.slice(slice))
    }

    async fn length(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
