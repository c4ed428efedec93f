use std::path::Path;

use boundaries_spatial::{
    BoundingBox, DEFAULT_NODE_SIZE, NodeItem, PackedRTreeBuilder, geometry_bounds,
    hilbert_sort_order,
};
use bytes::{BufMut, Bytes, BytesMut};
use common_exception::{BoundariesError, Result};
use common_utils::ByteRange;
use geo_types::{Geometry, LineString};
use tracing::debug;

use crate::feature::{Feature, encode_feature};
use crate::header::{Column, GeometryType, Header};

/// Layer definition of a dataset to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSchema {
    pub name: String,
    pub geometry_type: GeometryType,
    pub crs: String,
    pub columns: Vec<Column>,
    pub node_size: u16,
}

impl DatasetSchema {
    pub fn new(name: impl Into<String>, geometry_type: GeometryType) -> Self {
        Self {
            name: name.into(),
            geometry_type,
            crs: String::new(),
            columns: Vec::new(),
            node_size: DEFAULT_NODE_SIZE,
        }
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = crs.into();
        self
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_node_size(mut self, node_size: u16) -> Self {
        self.node_size = node_size;
        self
    }
}

/// Builds a new dataset: header, packed index and Hilbert-ordered features
///
/// Features are validated and encoded as they are added; nothing is written
/// until [`DatasetWriter::finish`].
#[derive(Debug)]
pub struct DatasetWriter {
    header: Header,
    features: Vec<(BoundingBox, Bytes)>,
}

impl DatasetWriter {
    pub fn new(schema: DatasetSchema) -> Result<Self> {
        if schema.node_size < 2 {
            return Err(BoundariesError::InvalidIndex(format!(
                "node size must be at least 2, got {}",
                schema.node_size
            )));
        }
        let header = Header {
            name: schema.name,
            geometry_type: schema.geometry_type,
            features_count: 0,
            index_node_size: schema.node_size,
            crs: schema.crs,
            envelope: None,
            columns: schema.columns,
        };
        header.validate()?;
        Ok(Self {
            header,
            features: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Validate, normalise and encode one feature.
    ///
    /// `Rect` and `Triangle` are stored as polygons and `Line` as a line
    /// string. Empty geometries and geometries with non-finite coordinates are
    /// rejected.
    pub fn add(&mut self, mut feature: Feature) -> Result<()> {
        feature.geometry = normalize(feature.geometry);
        let bounds = geometry_bounds(&feature.geometry)?;
        if bounds.is_empty() {
            return Err(BoundariesError::InvalidFeature(
                "empty geometries cannot be indexed".to_owned(),
            ));
        }
        if !bounds.x().is_finite() || !bounds.y().is_finite() {
            return Err(BoundariesError::InvalidFeature(format!(
                "geometry has non-finite coordinates: {bounds:?}"
            )));
        }

        let bytes = encode_feature(&feature, &self.header)?;
        self.features.push((bounds, bytes));
        Ok(())
    }

    /// Lay out the dataset and return its bytes.
    pub fn finish(self) -> Result<Bytes> {
        let Self {
            mut header,
            features,
        } = self;

        let boxes: Vec<BoundingBox> = features.iter().map(|(bounds, _)| *bounds).collect();
        let order = hilbert_sort_order(&boxes);

        let mut builder = PackedRTreeBuilder::with_capacity(header.index_node_size, features.len());
        let mut offset = 0u64;
        for &i in &order {
            let (bounds, bytes) = &features[i];
            let length = bytes.len() as u64;
            builder.add(NodeItem::leaf(*bounds, ByteRange::new(offset, length)));
            offset += length;
        }
        let tree = builder.finish()?;

        header.features_count = features.len() as u64;
        header.envelope = (!tree.is_empty()).then(|| tree.extent());
        let header_bytes = header.serialize();
        let index_bytes = tree.to_bytes();

        let mut buf =
            BytesMut::with_capacity(header_bytes.len() + index_bytes.len() + offset as usize);
        buf.put(header_bytes);
        buf.put(index_bytes);
        for &i in &order {
            buf.put_slice(&features[i].1);
        }

        debug!(
            layer = %header.name,
            features = header.features_count,
            bytes = buf.len(),
            "dataset written"
        );
        Ok(buf.freeze())
    }

    /// Lay out the dataset and write it to `path`, returning its size.
    pub async fn finish_to_path(self, path: impl AsRef<Path>) -> Result<u64> {
        let bytes = self.finish()?;
        tokio::fs::write(path, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}

fn normalize(geometry: Geometry<f64>) -> Geometry<f64> {
    match geometry {
        Geometry::Rect(rect) => Geometry::Polygon(rect.to_polygon()),
        Geometry::Triangle(triangle) => Geometry::Polygon(triangle.to_polygon()),
        Geometry::Line(line) => Geometry::LineString(LineString::new(vec![line.start, line.end])),
        other => other,
    }
}
