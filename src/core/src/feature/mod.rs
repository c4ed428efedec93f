mod codec;
mod value;

pub use codec::{decode_feature, encode_feature};
use geo_types::Geometry;
use serde::Serialize;
pub use value::{ColumnValue, Properties};

/// A decoded feature: geometry plus attribute values in schema order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    #[serde(skip)]
    pub geometry: Geometry<f64>,
    pub properties: Properties,
}

impl Feature {
    pub fn new(geometry: impl Into<Geometry<f64>>, properties: Properties) -> Self {
        Self {
            geometry: geometry.into(),
            properties,
        }
    }
}
