use common_exception::{BoundariesError, Result};
use geo_types::{Rect, coord};
use serde::{Deserialize, Serialize};

use crate::geometry::interval::Interval;

/// Axis-aligned bounding box
///
/// Conceptually, this BoundingBox is an [Interval] (x) and an [Interval] (y).
/// Both intervals are closed, so boxes that only touch along an edge or at a
/// corner intersect, and a degenerate (zero-area) box is valid and matches
/// anything touching its point or segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    x: Interval,
    y: Interval,
}

impl BoundingBox {
    /// Create a BoundingBox from an x and a y interval
    pub fn xy(x: impl Into<Interval>, y: impl Into<Interval>) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
        }
    }

    /// Create a BoundingBox from its corner coordinates
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self::xy((min_x, max_x), (min_y, max_y))
    }

    /// A box containing nothing, the identity for [`BoundingBox::update_box`]
    pub fn empty() -> Self {
        Self::xy(Interval::empty(), Interval::empty())
    }

    /// The x interval
    pub fn x(&self) -> &Interval {
        &self.x
    }

    /// The y interval
    pub fn y(&self) -> &Interval {
        &self.y
    }

    pub fn min_x(&self) -> f64 {
        self.x.lo()
    }

    pub fn min_y(&self) -> f64 {
        self.y.lo()
    }

    pub fn max_x(&self) -> f64 {
        self.x.hi()
    }

    pub fn max_y(&self) -> f64 {
        self.y.hi()
    }

    /// True if either dimension is empty
    pub fn is_empty(&self) -> bool {
        self.x.is_empty() || self.y.is_empty()
    }

    /// Closed-interval intersection test
    pub fn intersects(&self, other: &Self) -> bool {
        self.x.intersects_interval(&other.x) && self.y.intersects_interval(&other.y)
    }

    /// True if `other` lies entirely inside this box
    pub fn contains_box(&self, other: &Self) -> bool {
        self.x.lo() <= other.x.lo()
            && other.x.hi() <= self.x.hi()
            && self.y.lo() <= other.y.lo()
            && other.y.hi() <= self.y.hi()
    }

    /// Centre point of the box
    pub fn center(&self) -> (f64, f64) {
        (self.x.mid(), self.y.mid())
    }

    /// Update this BoundingBox to include the bounds of another
    pub fn update_box(&mut self, other: &Self) {
        self.x.update_interval(&other.x);
        self.y.update_interval(&other.y);
    }

    /// Check that this box can be used as a query window
    ///
    /// All four coordinates must be finite and the minimum must not exceed the
    /// maximum in either dimension.
    pub fn validate_query(&self) -> Result<()> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(BoundariesError::InvalidQuery(format!(
                "bounding box coordinates must be finite, got {}",
                self.describe()
            )));
        }
        if self.min_x() > self.max_x() || self.min_y() > self.max_y() {
            return Err(BoundariesError::InvalidQuery(format!(
                "bounding box minimum exceeds maximum: {}",
                self.describe()
            )));
        }
        Ok(())
    }

    /// The box as a `geo` rectangle
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_x(), y: self.min_y() },
            coord! { x: self.max_x(), y: self.max_y() },
        )
    }

    fn describe(&self) -> String {
        format!(
            "[{}, {}, {}, {}]",
            self.min_x(),
            self.min_y(),
            self.max_x(),
            self.max_y()
        )
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}
