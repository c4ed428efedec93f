use bytes::BufMut;
use common_exception::{BoundariesError, Result};
use common_utils::{ByteCursor, ByteRange};

use crate::geometry::bounding_box::BoundingBox;

/// Size in bytes of one packed index record.
pub const NODE_ITEM_SIZE: usize = 48;

/// One fixed-size record of the packed index
///
/// Leaves carry the byte range of their feature relative to the start of the
/// feature section. Internal nodes only carry the union of their children's
/// bounds: their offset and length are written as zero because child positions
/// are derived from the [`crate::IndexLayout`], never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeItem {
    pub bounds: BoundingBox,
    pub offset: u64,
    pub length: u64,
}

impl NodeItem {
    pub fn leaf(bounds: BoundingBox, range: ByteRange) -> Self {
        Self {
            bounds,
            offset: range.offset,
            length: range.length,
        }
    }

    pub fn internal(bounds: BoundingBox) -> Self {
        Self {
            bounds,
            offset: 0,
            length: 0,
        }
    }

    /// Feature byte range of a leaf record.
    pub fn range(&self) -> ByteRange {
        ByteRange::new(self.offset, self.length)
    }

    pub fn write_to(&self, buf: &mut impl BufMut) {
        buf.put_f64_le(self.bounds.min_x());
        buf.put_f64_le(self.bounds.min_y());
        buf.put_f64_le(self.bounds.max_x());
        buf.put_f64_le(self.bounds.max_y());
        buf.put_u64_le(self.offset);
        buf.put_u64_le(self.length);
    }

    pub fn read_from(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let truncated =
            |err| BoundariesError::InvalidIndex(format!("truncated index record: {err}"));
        let min_x = cursor.read_f64().map_err(truncated)?;
        let min_y = cursor.read_f64().map_err(truncated)?;
        let max_x = cursor.read_f64().map_err(truncated)?;
        let max_y = cursor.read_f64().map_err(truncated)?;
        let offset = cursor.read_u64().map_err(truncated)?;
        let length = cursor.read_u64().map_err(truncated)?;
        Ok(Self {
            bounds: BoundingBox::new(min_x, min_y, max_x, max_y),
            offset,
            length,
        })
    }

    /// Decode a single record from exactly [`NODE_ITEM_SIZE`] bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != NODE_ITEM_SIZE {
            return Err(BoundariesError::InvalidIndex(format!(
                "index record must be {NODE_ITEM_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        Self::read_from(&mut ByteCursor::new(bytes))
    }
}
