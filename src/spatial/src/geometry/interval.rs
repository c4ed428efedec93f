use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

/// 1D closed interval
///
/// Represents a minimum and maximum value. Intervals always contain their
/// endpoints, so two intervals that only share an endpoint intersect. Longitude
/// wraparound is not modelled: datasets are queried in their native CRS and the
/// reader never reprojects.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Lower bound
    ///
    /// This is serialized and deserialized using its string representation to
    /// preserve NaN and Infinity values when using `serde_json`.
    #[serde_as(as = "DisplayFromStr")]
    lo: f64,

    /// Upper bound
    ///
    /// This is serialized and deserialized using its string representation to
    /// preserve NaN and Infinity values when using `serde_json`.
    #[serde_as(as = "DisplayFromStr")]
    hi: f64,
}

impl Interval {
    /// Create an interval from lo and hi values
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// Create an empty interval that intersects nothing
    ///
    /// Accumulating values into the empty interval with
    /// [`Interval::update_value`] yields the tightest interval containing them.
    pub fn empty() -> Self {
        Self {
            lo: f64::INFINITY,
            hi: -f64::INFINITY,
        }
    }

    /// Lower bound
    ///
    /// When empty, this value is Infinity.
    pub fn lo(&self) -> f64 {
        self.lo
    }

    /// Upper bound
    ///
    /// When empty, this value is -Infinity.
    pub fn hi(&self) -> f64 {
        self.hi
    }

    /// Check for intersection with an interval
    ///
    /// Note that intervals always contain their endpoints.
    pub fn intersects_interval(&self, other: &Self) -> bool {
        self.lo <= other.hi && other.lo <= self.hi
    }

    /// The distance between lo and hi
    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    /// The point exactly between lo and hi
    pub fn mid(&self) -> f64 {
        self.lo + self.width() / 2.0
    }

    /// True if this interval is empty (i.e. intersects no values)
    pub fn is_empty(&self) -> bool {
        self.width() == -f64::INFINITY
    }

    /// True if both bounds are finite numbers
    pub fn is_finite(&self) -> bool {
        self.lo.is_finite() && self.hi.is_finite()
    }

    /// Expand this interval to the union of self and other in place
    ///
    /// Note that NaN values are ignored when updating bounds.
    pub fn update_interval(&mut self, other: &Self) {
        self.lo = self.lo.min(other.lo);
        self.hi = self.hi.max(other.hi);
    }

    /// Expand this interval to include a value in place
    ///
    /// Note that NaN values are ignored when updating bounds.
    pub fn update_value(&mut self, other: f64) {
        self.lo = self.lo.min(other);
        self.hi = self.hi.max(other);
    }
}

impl From<(f64, f64)> for Interval {
    fn from(value: (f64, f64)) -> Self {
        Interval::new(value.0, value.1)
    }
}
