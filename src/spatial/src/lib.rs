mod geometry;
mod index;
mod refine;

pub use geometry::bounding_box::BoundingBox;
pub use geometry::bounds::geometry_bounds;
pub use geometry::interval::Interval;
pub use index::builder::{PackedRTree, PackedRTreeBuilder};
pub use index::hilbert::{HILBERT_MAX, hilbert_index, hilbert_sort_order};
pub use index::layout::{DEFAULT_NODE_SIZE, IndexLayout};
pub use index::node::{NODE_ITEM_SIZE, NodeItem};
pub use index::search::{LevelSearch, SearchHit};
pub use refine::intersects_box;
