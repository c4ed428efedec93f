use std::fmt;

use serde::{Deserialize, Serialize};

/// A contiguous span of bytes inside a larger resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Exclusive end offset, saturating at `u64::MAX`.
    pub const fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// True if `other` lies entirely inside this range.
    pub const fn contains(&self, other: &ByteRange) -> bool {
        other.offset >= self.offset && other.end() <= self.end()
    }

    /// Shift this range by `base` bytes, e.g. from section-relative to absolute.
    pub const fn shifted(&self, base: u64) -> Self {
        Self::new(self.offset.saturating_add(base), self.length)
    }

    /// Position of `other` relative to the start of this range.
    ///
    /// Returns `None` unless `other` is contained in this range.
    pub fn relative(&self, other: &ByteRange) -> Option<std::ops::Range<usize>> {
        if !self.contains(other) {
            return None;
        }
        let start = usize::try_from(other.offset - self.offset).ok()?;
        let len = usize::try_from(other.length).ok()?;
        Some(start..start + len)
    }

    /// Value of an HTTP `Range` header requesting exactly this span.
    pub fn to_http_header(&self) -> String {
        format!("bytes={}-{}", self.offset, self.end().saturating_sub(1))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}
