use common_utils::ByteRange;

/// Merge byte ranges that overlap or lie at most `gap` bytes apart
///
/// The result is sorted by offset and pairwise disjoint, consecutive ranges are
/// separated by more than `gap` bytes, and its union covers every input range
/// plus the bridged gaps. Zero-length ranges are dropped.
pub fn coalesce_ranges(ranges: &[ByteRange], gap: u64) -> Vec<ByteRange> {
    let mut sorted: Vec<ByteRange> = ranges
        .iter()
        .filter(|range| !range.is_empty())
        .copied()
        .collect();
    sorted.sort_unstable();

    let mut merged: Vec<ByteRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.offset <= last.end().saturating_add(gap) => {
                let end = last.end().max(range.end());
                last.length = end - last.offset;
            }
            _ => merged.push(range),
        }
    }
    merged
}
