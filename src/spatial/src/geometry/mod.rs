pub(crate) mod bounding_box;
pub(crate) mod bounds;
pub(crate) mod interval;
