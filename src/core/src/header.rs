use std::collections::HashSet;
use std::fmt;

use boundaries_spatial::{BoundingBox, DEFAULT_NODE_SIZE, IndexLayout};
use bytes::{BufMut, Bytes, BytesMut};
use common_exception::{BoundariesError, Result};
use common_utils::{BufMutExt, ByteCursor, OutOfBounds};
use geo_types::Geometry;

/// Current version of the container layout.
pub const VERSION: u8 = 1;

/// Marker at the start of every dataset.
pub const MAGIC_BYTES: [u8; 8] = [b'b', b'n', b'd', VERSION, b'b', b'n', b'd', 0];

/// Magic marker plus the `u32` header body length.
pub const HEADER_PREFIX_SIZE: usize = MAGIC_BYTES.len() + 4;

/// Largest header body accepted, so a corrupt length cannot trigger a huge
/// fetch or allocation.
pub const HEADER_MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Geometry type declared by a dataset; `Unknown` allows mixed kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GeometryType {
    Unknown = 0,
    Point = 1,
    LineString = 2,
    Polygon = 3,
    MultiPoint = 4,
    MultiLineString = 5,
    MultiPolygon = 6,
}

impl GeometryType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Unknown,
            1 => Self::Point,
            2 => Self::LineString,
            3 => Self::Polygon,
            4 => Self::MultiPoint,
            5 => Self::MultiLineString,
            6 => Self::MultiPolygon,
            _ => return None,
        })
    }

    /// Kind of a geometry that can be stored, `None` for the others.
    pub fn of(geometry: &Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Point(_) => Some(Self::Point),
            Geometry::LineString(_) => Some(Self::LineString),
            Geometry::Polygon(_) => Some(Self::Polygon),
            Geometry::MultiPoint(_) => Some(Self::MultiPoint),
            Geometry::MultiLineString(_) => Some(Self::MultiLineString),
            Geometry::MultiPolygon(_) => Some(Self::MultiPolygon),
            _ => None,
        }
    }

    /// True if a feature of kind `kind` may be stored under this type.
    pub fn admits(self, kind: Self) -> bool {
        self == Self::Unknown || self == kind
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::Point => "Point",
            Self::LineString => "LineString",
            Self::Polygon => "Polygon",
            Self::MultiPoint => "MultiPoint",
            Self::MultiLineString => "MultiLineString",
            Self::MultiPolygon => "MultiPolygon",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    Bool = 0,
    Int32 = 1,
    Int64 = 2,
    Double = 3,
    String = 4,
    Binary = 5,
    /// Milliseconds since the Unix epoch, UTC.
    DateTime = 6,
}

impl ColumnType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Bool,
            1 => Self::Int32,
            2 => Self::Int64,
            3 => Self::Double,
            4 => Self::String,
            5 => Self::Binary,
            6 => Self::DateTime,
            _ => return None,
        })
    }
}

const COLUMN_NULLABLE: u8 = 0b1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl Column {
    /// A non-nullable column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Self-describing dataset header, written once and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// Layer name, e.g. `municipalities`.
    pub name: String,
    pub geometry_type: GeometryType,
    /// Number of features, equal to the number of index leaves.
    pub features_count: u64,
    /// Branching factor of the packed index.
    pub index_node_size: u16,
    /// Opaque coordinate reference system identifier, passed through.
    pub crs: String,
    /// Extent of every feature, absent for empty datasets.
    pub envelope: Option<BoundingBox>,
    pub columns: Vec<Column>,
}

impl Header {
    /// Total size of magic, length and body, read from a prefix of the file.
    pub fn encoded_size(prefix: &[u8]) -> Result<usize> {
        if prefix.len() < HEADER_PREFIX_SIZE {
            return Err(BoundariesError::MalformedHeader(format!(
                "need {HEADER_PREFIX_SIZE} bytes to read the header length, got {}",
                prefix.len()
            )));
        }
        check_magic(&prefix[..MAGIC_BYTES.len()])?;

        let mut cursor = ByteCursor::new(&prefix[MAGIC_BYTES.len()..HEADER_PREFIX_SIZE]);
        let body_len = cursor.read_u32().map_err(malformed)? as usize;
        if body_len > HEADER_MAX_BUFFER_SIZE {
            return Err(BoundariesError::MalformedHeader(format!(
                "header body of {body_len} bytes exceeds the {HEADER_MAX_BUFFER_SIZE} byte limit"
            )));
        }
        Ok(HEADER_PREFIX_SIZE + body_len)
    }

    /// Parse the header at the start of `bytes`; bytes after it are ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let size = Self::encoded_size(bytes)?;
        if size > bytes.len() {
            return Err(BoundariesError::MalformedHeader(format!(
                "header declares {size} bytes but only {} are available",
                bytes.len()
            )));
        }

        let mut cursor = ByteCursor::new(&bytes[HEADER_PREFIX_SIZE..size]);
        let header = Self::read_body(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(BoundariesError::MalformedHeader(format!(
                "{} unparsed bytes at the end of the header",
                cursor.remaining()
            )));
        }
        header.validate()?;
        Ok(header)
    }

    fn read_body(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let tag = cursor.read_u8().map_err(malformed)?;
        let geometry_type = GeometryType::from_u8(tag).ok_or_else(|| {
            BoundariesError::MalformedHeader(format!("unknown geometry type {tag}"))
        })?;
        let features_count = cursor.read_u64().map_err(malformed)?;
        let index_node_size = cursor.read_u16().map_err(malformed)?;
        let name = read_str(cursor)?;
        let crs = read_str(cursor)?;

        let envelope = match cursor.read_u8().map_err(malformed)? {
            0 => None,
            1 => Some(BoundingBox::new(
                cursor.read_f64().map_err(malformed)?,
                cursor.read_f64().map_err(malformed)?,
                cursor.read_f64().map_err(malformed)?,
                cursor.read_f64().map_err(malformed)?,
            )),
            flag => {
                return Err(BoundariesError::MalformedHeader(format!(
                    "invalid envelope flag {flag}"
                )));
            }
        };

        let column_count = cursor.read_u32().map_err(malformed)? as usize;
        // name prefix, type and flags
        cursor.ensure(column_count, 6).map_err(malformed)?;
        let mut columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let name = read_str(cursor)?;
            let tag = cursor.read_u8().map_err(malformed)?;
            let column_type = ColumnType::from_u8(tag).ok_or_else(|| {
                BoundariesError::MalformedHeader(format!(
                    "unknown type {tag} for column \"{name}\""
                ))
            })?;
            let flags = cursor.read_u8().map_err(malformed)?;
            columns.push(Column {
                name,
                column_type,
                nullable: flags & COLUMN_NULLABLE != 0,
            });
        }

        Ok(Self {
            name,
            geometry_type,
            features_count,
            index_node_size,
            crs,
            envelope,
            columns,
        })
    }

    /// Check the invariants a parsed or freshly built header must hold.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::with_capacity(self.columns.len());
        for column in &self.columns {
            if !names.insert(column.name.as_str()) {
                return Err(BoundariesError::MalformedHeader(format!(
                    "duplicate column \"{}\"",
                    column.name
                )));
            }
        }
        if self.features_count > 0 && self.index_node_size < 2 {
            return Err(BoundariesError::MalformedHeader(format!(
                "index node size must be at least 2, got {}",
                self.index_node_size
            )));
        }
        Ok(())
    }

    pub fn serialize(&self) -> Bytes {
        let mut body = BytesMut::new();
        body.put_u8(self.geometry_type as u8);
        body.put_u64_le(self.features_count);
        body.put_u16_le(self.index_node_size);
        body.put_prefixed_str(&self.name);
        body.put_prefixed_str(&self.crs);
        match &self.envelope {
            Some(envelope) => {
                body.put_u8(1);
                body.put_f64_le(envelope.min_x());
                body.put_f64_le(envelope.min_y());
                body.put_f64_le(envelope.max_x());
                body.put_f64_le(envelope.max_y());
            }
            None => body.put_u8(0),
        }
        body.put_u32_le(self.columns.len() as u32);
        for column in &self.columns {
            body.put_prefixed_str(&column.name);
            body.put_u8(column.column_type as u8);
            body.put_u8(if column.nullable { COLUMN_NULLABLE } else { 0 });
        }

        let mut buf = BytesMut::with_capacity(HEADER_PREFIX_SIZE + body.len());
        buf.put_slice(&MAGIC_BYTES);
        buf.put_u32_le(body.len() as u32);
        buf.put(body);
        buf.freeze()
    }

    /// Position and definition of a column.
    pub fn column(&self, name: &str) -> Option<(usize, &Column)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, column)| column.name == name)
    }

    pub fn envelope(&self) -> Option<&BoundingBox> {
        self.envelope.as_ref()
    }

    /// Shape of the packed index that follows the header.
    pub fn index_layout(&self) -> Result<IndexLayout> {
        let num_items = usize::try_from(self.features_count).map_err(|_| {
            BoundariesError::MalformedHeader(format!(
                "{} features cannot be addressed on this platform",
                self.features_count
            ))
        })?;
        if num_items == 0 {
            return IndexLayout::new(0, DEFAULT_NODE_SIZE);
        }
        IndexLayout::new(num_items, self.index_node_size)
    }
}

fn check_magic(magic: &[u8]) -> Result<()> {
    if magic[..3] != MAGIC_BYTES[..3] || magic[4..] != MAGIC_BYTES[4..] {
        return Err(BoundariesError::MalformedHeader(
            "missing dataset magic marker".to_owned(),
        ));
    }
    if magic[3] != VERSION {
        return Err(BoundariesError::MalformedHeader(format!(
            "unsupported dataset version {}, expected {VERSION}",
            magic[3]
        )));
    }
    Ok(())
}

fn read_str(cursor: &mut ByteCursor<'_>) -> Result<String> {
    let bytes = cursor.read_prefixed().map_err(malformed)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|err| BoundariesError::MalformedHeader(format!("invalid UTF-8 string: {err}")))
}

fn malformed(err: OutOfBounds) -> BoundariesError {
    BoundariesError::MalformedHeader(format!("header is truncated: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn municipalities() -> Header {
        Header {
            name: "municipalities".to_owned(),
            geometry_type: GeometryType::MultiPolygon,
            features_count: 60,
            index_node_size: 16,
            crs: "EPSG:4326".to_owned(),
            envelope: Some(BoundingBox::new(20.9, 53.9, 26.9, 56.3)),
            columns: vec![
                Column::new("feature_id", ColumnType::Int64),
                Column::new("code", ColumnType::String),
                Column::new("name", ColumnType::String),
                Column::new("county_code", ColumnType::String).nullable(),
                Column::new("created_at", ColumnType::DateTime).nullable(),
            ],
        }
    }

    #[test]
    fn test_parse_serialized() {
        let header = municipalities();
        let bytes = header.serialize();
        assert_eq!(&bytes[..8], &MAGIC_BYTES);
        assert_eq!(
            Header::encoded_size(&bytes[..HEADER_PREFIX_SIZE]).unwrap(),
            bytes.len()
        );

        let parsed = Header::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(
            parsed.column("county_code").map(|(i, c)| (i, c.nullable)),
            Some((3, true))
        );
        assert!(parsed.column("population").is_none());

        // index and features may follow the header
        let mut file = bytes.to_vec();
        file.extend_from_slice(&[0xff; 64]);
        assert_eq!(Header::parse(&file).unwrap(), header);
    }

    #[test]
    fn test_empty_dataset_header() {
        let header = Header {
            features_count: 0,
            index_node_size: 0,
            envelope: None,
            columns: vec![],
            ..municipalities()
        };
        let parsed = Header::parse(&header.serialize()).unwrap();
        assert_eq!(parsed.envelope(), None);
        assert_eq!(parsed.index_layout().unwrap().num_nodes(), 0);
    }

    #[test]
    fn test_rejects_foreign_and_corrupt_input() {
        let bytes = municipalities().serialize().to_vec();
        let is_malformed =
            |result: Result<Header>| matches!(result, Err(BoundariesError::MalformedHeader(_)));

        assert!(is_malformed(Header::parse(b"fgb\x03fgb\x00\x00\x00\x00\x00")));
        assert!(is_malformed(Header::parse(&bytes[..5])));

        let mut version = bytes.clone();
        version[3] = VERSION + 1;
        assert!(is_malformed(Header::parse(&version)));

        // body length past the end of the buffer
        assert!(is_malformed(Header::parse(&bytes[..bytes.len() - 1])));

        let mut huge = bytes.clone();
        huge[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(is_malformed(Header::parse(&huge)));

        let mut geometry = bytes.clone();
        geometry[HEADER_PREFIX_SIZE] = 42;
        assert!(is_malformed(Header::parse(&geometry)));

        // one stray byte inside the declared body
        let mut trailing = bytes[..HEADER_PREFIX_SIZE].to_vec();
        let body_len = (bytes.len() - HEADER_PREFIX_SIZE + 1) as u32;
        trailing[8..12].copy_from_slice(&body_len.to_le_bytes());
        trailing.extend_from_slice(&bytes[HEADER_PREFIX_SIZE..]);
        trailing.push(0);
        assert!(is_malformed(Header::parse(&trailing)));
    }

    #[test]
    fn test_rejects_oversized_column_count() {
        let header = Header {
            columns: vec![],
            ..municipalities()
        };
        let mut bytes = header.serialize().to_vec();
        let len = bytes.len();
        bytes[len - 4..].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            Header::parse(&bytes),
            Err(BoundariesError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_columns() {
        let mut header = municipalities();
        header.columns.push(Column::new("code", ColumnType::Int32));
        let bytes = header.serialize();
        assert!(matches!(
            Header::parse(&bytes),
            Err(BoundariesError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_geometry_type_admits() {
        assert!(GeometryType::Unknown.admits(GeometryType::Point));
        assert!(GeometryType::Polygon.admits(GeometryType::Polygon));
        assert!(!GeometryType::Polygon.admits(GeometryType::MultiPolygon));
        for tag in 0..=6 {
            assert_eq!(GeometryType::from_u8(tag).map(|t| t as u8), Some(tag));
        }
        assert_eq!(GeometryType::from_u8(7), None);
    }
}
