use bytes::{Bytes, BytesMut};
use common_exception::{BoundariesError, Result};
use tracing::trace;

use crate::geometry::bounding_box::BoundingBox;
use crate::index::hilbert::hilbert_sort_order;
use crate::index::layout::IndexLayout;
use crate::index::node::{NODE_ITEM_SIZE, NodeItem};
use crate::index::search::{LevelSearch, SearchHit};

/// Collects leaf records and packs them into a [`PackedRTree`].
#[derive(Debug)]
pub struct PackedRTreeBuilder {
    node_size: u16,
    items: Vec<NodeItem>,
}

impl PackedRTreeBuilder {
    pub fn new(node_size: u16) -> Self {
        Self {
            node_size,
            items: Vec::new(),
        }
    }

    pub fn with_capacity(node_size: u16, capacity: usize) -> Self {
        Self {
            node_size,
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, item: NodeItem) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sort the leaves by Hilbert order and compute every internal level.
    ///
    /// Leaf bounds must be finite and non-inverted. Parents are the union of
    /// their children, so every leaf is contained in all of its ancestors.
    pub fn finish(self) -> Result<PackedRTree> {
        for (i, item) in self.items.iter().enumerate() {
            if item.bounds.validate_query().is_err() {
                return Err(BoundariesError::InvalidIndex(format!(
                    "leaf {i} has invalid bounds {:?}",
                    item.bounds
                )));
            }
        }

        let layout = IndexLayout::new(self.items.len(), self.node_size)?;
        let mut nodes = vec![NodeItem::internal(BoundingBox::empty()); layout.num_nodes()];

        let boxes: Vec<BoundingBox> = self.items.iter().map(|item| item.bounds).collect();
        let leaves = layout.leaf_level();
        for (slot, i) in hilbert_sort_order(&boxes).into_iter().enumerate() {
            nodes[leaves.start + slot] = self.items[i];
        }

        for level in 1..layout.num_levels() {
            for pos in layout.level(level) {
                let mut bounds = BoundingBox::empty();
                for child in layout.children(level, pos) {
                    bounds.update_box(&nodes[child].bounds);
                }
                nodes[pos] = NodeItem::internal(bounds);
            }
        }

        trace!(
            items = layout.num_items(),
            nodes = layout.num_nodes(),
            levels = layout.num_levels(),
            "packed index built"
        );

        Ok(PackedRTree { layout, nodes })
    }
}

/// A packed Hilbert R-tree held in memory
///
/// Records are stored root first, exactly as they are serialized.
#[derive(Debug, Clone)]
pub struct PackedRTree {
    layout: IndexLayout,
    nodes: Vec<NodeItem>,
}

impl PackedRTree {
    pub fn layout(&self) -> &IndexLayout {
        &self.layout
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.layout.num_items()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.num_items() == 0
    }

    /// All records, root first.
    pub fn nodes(&self) -> &[NodeItem] {
        &self.nodes
    }

    /// Leaf records in Hilbert order.
    pub fn leaves(&self) -> &[NodeItem] {
        &self.nodes[self.layout.leaf_level()]
    }

    /// Bounds of the root, i.e. the extent of every leaf.
    pub fn extent(&self) -> BoundingBox {
        self.nodes
            .first()
            .map_or_else(BoundingBox::empty, |root| root.bounds)
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.nodes.len() * NODE_ITEM_SIZE);
        for node in &self.nodes {
            node.write_to(&mut buf);
        }
        buf.freeze()
    }

    /// Decode a serialized index whose shape is given by `layout`.
    pub fn from_bytes(layout: IndexLayout, bytes: &[u8]) -> Result<Self> {
        if bytes.len() as u64 != layout.size_in_bytes() {
            return Err(BoundariesError::InvalidIndex(format!(
                "expected {} index bytes for {} items, got {}",
                layout.size_in_bytes(),
                layout.num_items(),
                bytes.len()
            )));
        }

        let nodes = bytes
            .chunks_exact(NODE_ITEM_SIZE)
            .map(NodeItem::decode)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { layout, nodes })
    }

    /// Find every leaf whose bounds intersect `query`, in Hilbert order.
    pub fn search(&self, query: &BoundingBox) -> Result<Vec<SearchHit>> {
        let mut search = LevelSearch::new(&self.layout, *query)?;
        while search.pending().is_some() {
            search.advance(|pos| {
                self.nodes.get(pos).copied().ok_or_else(|| {
                    BoundariesError::InvalidIndex(format!("node {pos} is out of range"))
                })
            })?;
        }

        trace!(
            visited = search.visited(),
            hits = search.hits().len(),
            "index searched"
        );
        Ok(search.into_hits())
    }
}
