use std::ops::Range;

use common_exception::{BoundariesError, Result};
use common_utils::ByteRange;

use crate::index::node::NODE_ITEM_SIZE;

/// Default branching factor of the packed index.
pub const DEFAULT_NODE_SIZE: u16 = 16;

/// Arithmetic layout of a packed, pointer-free R-tree
///
/// Levels are numbered from the leaves (level 0) up to the root, but stored
/// root first: the root occupies position 0 and the leaves are the last
/// `num_items` records. Children of the node at position `pos` on level `l`
/// are the `node_size` records starting at
/// `level(l - 1).start + (pos - level(l).start) * node_size`, truncated at the
/// end of level `l - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
    num_items: usize,
    node_size: usize,
    level_bounds: Vec<Range<usize>>,
    size_in_bytes: u64,
}

impl IndexLayout {
    pub fn new(num_items: usize, node_size: u16) -> Result<Self> {
        if node_size < 2 {
            return Err(BoundariesError::InvalidIndex(format!(
                "node size must be at least 2, got {node_size}"
            )));
        }
        let node_size = node_size as usize;

        if num_items == 0 {
            return Ok(Self {
                num_items,
                node_size,
                level_bounds: Vec::new(),
                size_in_bytes: 0,
            });
        }

        let mut sizes = vec![num_items];
        let mut n = num_items;
        while n > 1 {
            n = n.div_ceil(node_size);
            sizes.push(n);
        }

        let mut level_bounds = vec![0..0; sizes.len()];
        let mut start = 0usize;
        for (level, size) in sizes.iter().enumerate().rev() {
            let end = start.checked_add(*size).ok_or_else(|| {
                BoundariesError::InvalidIndex(format!("{num_items} items overflow the index"))
            })?;
            level_bounds[level] = start..end;
            start = end;
        }
        let size_in_bytes = u64::try_from(start)
            .ok()
            .and_then(|nodes| nodes.checked_mul(NODE_ITEM_SIZE as u64))
            .ok_or_else(|| {
                BoundariesError::InvalidIndex(format!(
                    "index of {start} nodes does not fit in a file"
                ))
            })?;

        Ok(Self {
            num_items,
            node_size,
            level_bounds,
            size_in_bytes,
        })
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    pub fn node_size(&self) -> usize {
        self.node_size
    }

    pub fn num_levels(&self) -> usize {
        self.level_bounds.len()
    }

    /// Total number of records, internal nodes included.
    pub fn num_nodes(&self) -> usize {
        self.level_bounds.first().map_or(0, |leaves| leaves.end)
    }

    /// Size of the serialized index in bytes.
    pub fn size_in_bytes(&self) -> u64 {
        self.size_in_bytes
    }

    /// Record positions of a level; level 0 holds the leaves.
    pub fn level(&self, level: usize) -> Range<usize> {
        self.level_bounds[level].clone()
    }

    pub fn root_level(&self) -> Option<usize> {
        self.num_levels().checked_sub(1)
    }

    pub fn leaf_level(&self) -> Range<usize> {
        self.level_bounds.first().cloned().unwrap_or(0..0)
    }

    /// Positions of the children of the internal node at `pos` on `level`.
    pub fn children(&self, level: usize, pos: usize) -> Range<usize> {
        debug_assert!(level > 0 && self.level_bounds[level].contains(&pos));
        let child_level = &self.level_bounds[level - 1];
        let start = child_level.start + (pos - self.level_bounds[level].start) * self.node_size;
        let end = (start + self.node_size).min(child_level.end);
        start..end
    }

    /// Byte range of a run of records, relative to the start of the index.
    pub fn nodes_byte_range(&self, nodes: &Range<usize>) -> ByteRange {
        ByteRange::new(
            nodes.start as u64 * NODE_ITEM_SIZE as u64,
            nodes.len() as u64 * NODE_ITEM_SIZE as u64,
        )
    }
}
