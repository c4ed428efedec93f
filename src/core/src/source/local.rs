use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use common_exception::{BoundariesError, Result};
use common_utils::ByteRange;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::trace;

use crate::source::ByteSource;

/// A dataset on the local filesystem
///
/// Every read opens its own handle, so concurrent reads never share a file
/// cursor.
#[derive(Debug)]
pub struct LocalSource {
    path: PathBuf,
    name: String,
    length: u64,
}

impl LocalSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(BoundariesError::ByteSourceIo(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        Ok(Self {
            name: path.display().to_string(),
            path,
            length: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ByteSource for LocalSource {
    async fn read_range(&self, range: ByteRange) -> Result<Bytes> {
        if range.is_empty() {
            return Ok(Bytes::new());
        }
        if range.end() > self.length {
            return Err(BoundariesError::ByteSourceIo(format!(
                "range {range} is past the end of {} ({} bytes)",
                self.name, self.length
            )));
        }
        let length = usize::try_from(range.length)
            .map_err(|_| BoundariesError::ByteSourceIo(format!("range {range} is too large")))?;

        trace!(source = %self.name, %range, "reading local range");
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(range.offset)).await?;
        let mut buf = vec![0u8; length];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn length(&self) -> Result<u64> {
        Ok(self.length)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
