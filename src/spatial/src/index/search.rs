use std::ops::Range;

use common_exception::Result;
use common_utils::ByteRange;

use crate::geometry::bounding_box::BoundingBox;
use crate::index::layout::IndexLayout;
use crate::index::node::NodeItem;

/// A leaf whose bounds intersect the query window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Ordinal of the leaf, i.e. the position of the feature in Hilbert order.
    pub index: usize,
    pub bounds: BoundingBox,
    /// Byte range of the feature relative to the start of the feature section.
    pub range: ByteRange,
}

/// Level-by-level traversal of a packed R-tree that performs no I/O itself
///
/// The caller asks for the node runs of the current level with
/// [`LevelSearch::pending`], makes those records available (from memory or by
/// fetching them) and hands a lookup to [`LevelSearch::advance`], which tests
/// every pending node and computes the next level's frontier from the
/// children of the intersecting ones. Traversal ends once no run is pending.
///
/// ```text
/// level 2 (root):   [0..1]
/// level 1:          [1..3]   [4..5]      ← children of intersecting nodes
/// level 0 (leaves): [5..21] [53..65]     ← hits, in Hilbert order
/// ```
#[derive(Debug)]
pub struct LevelSearch<'a> {
    layout: &'a IndexLayout,
    query: BoundingBox,
    level: usize,
    frontier: Vec<Range<usize>>,
    hits: Vec<SearchHit>,
    visited: usize,
}

impl<'a> LevelSearch<'a> {
    pub fn new(layout: &'a IndexLayout, query: BoundingBox) -> Result<Self> {
        query.validate_query()?;

        let (level, frontier) = match layout.root_level() {
            Some(root) => (root, vec![layout.level(root)]),
            None => (0, Vec::new()),
        };

        Ok(Self {
            layout,
            query,
            level,
            frontier,
            hits: Vec::new(),
            visited: 0,
        })
    }

    /// Node runs that must be evaluated next, or `None` once the traversal is
    /// complete.
    pub fn pending(&self) -> Option<&[Range<usize>]> {
        if self.frontier.is_empty() {
            None
        } else {
            Some(&self.frontier)
        }
    }

    /// Byte ranges, relative to the start of the index, of the pending runs.
    pub fn pending_bytes(&self) -> Vec<ByteRange> {
        self.frontier
            .iter()
            .map(|nodes| self.layout.nodes_byte_range(nodes))
            .collect()
    }

    /// Level of the pending runs; level 0 holds the leaves.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Number of node records evaluated so far.
    pub fn visited(&self) -> usize {
        self.visited
    }

    /// Evaluate every pending node and move one level down.
    ///
    /// `node` must return the record stored at the given position. On error
    /// the frontier is left untouched.
    pub fn advance(&mut self, mut node: impl FnMut(usize) -> Result<NodeItem>) -> Result<()> {
        let mut next: Vec<Range<usize>> = Vec::new();
        let mut hits = Vec::new();
        let mut visited = 0;
        let leaves = self.layout.leaf_level();

        for run in &self.frontier {
            for pos in run.clone() {
                let item = node(pos)?;
                visited += 1;
                if !item.bounds.intersects(&self.query) {
                    continue;
                }

                if self.level == 0 {
                    hits.push(SearchHit {
                        index: pos - leaves.start,
                        bounds: item.bounds,
                        range: item.range(),
                    });
                    continue;
                }

                let children = self.layout.children(self.level, pos);
                match next.last_mut() {
                    Some(last) if last.end == children.start => last.end = children.end,
                    _ => next.push(children),
                }
            }
        }

        self.visited += visited;
        self.hits.extend(hits);
        self.frontier = next;
        self.level = self.level.saturating_sub(1);
        Ok(())
    }

    /// Leaves found so far, in Hilbert order.
    pub fn hits(&self) -> &[SearchHit] {
        &self.hits
    }

    pub fn into_hits(self) -> Vec<SearchHit> {
        self.hits
    }
}
