use bytes::{BufMut, Bytes, BytesMut};
use chrono::DateTime;
use common_exception::{BoundariesError, Result};
use common_utils::{BufMutExt, ByteCursor, OutOfBounds};
use geo_types::{
    Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};

use crate::feature::Feature;
use crate::feature::value::{ColumnValue, Properties};
use crate::header::{Column, ColumnType, GeometryType, Header};

/// Bytes of one encoded coordinate.
const COORD_SIZE: usize = 16;

/// Encode a feature record: length-prefixed geometry block, then the column
/// block in schema order.
pub fn encode_feature(feature: &Feature, header: &Header) -> Result<Bytes> {
    let kind = GeometryType::of(&feature.geometry).ok_or_else(|| {
        BoundariesError::InvalidFeature(format!(
            "geometry {:?} cannot be stored",
            geometry_name(&feature.geometry)
        ))
    })?;
    if !header.geometry_type.admits(kind) {
        return Err(BoundariesError::InvalidFeature(format!(
            "{kind} geometry in a {} dataset",
            header.geometry_type
        )));
    }
    for (name, _) in feature.properties.iter() {
        if header.column(name).is_none() {
            return Err(BoundariesError::InvalidFeature(format!(
                "unknown column \"{name}\""
            )));
        }
    }

    let mut geometry = BytesMut::new();
    write_geometry(&mut geometry, kind, &feature.geometry)?;

    let mut buf = BytesMut::with_capacity(4 + geometry.len());
    buf.put_u32_le(u32::try_from(geometry.len()).map_err(|_| {
        BoundariesError::InvalidFeature(format!(
            "geometry block of {} bytes is too large",
            geometry.len()
        ))
    })?);
    buf.put(geometry);

    for column in &header.columns {
        let value = feature
            .properties
            .get(&column.name)
            .unwrap_or(&ColumnValue::Null);
        write_value(&mut buf, column, value)?;
    }

    Ok(buf.freeze())
}

/// Decode one feature record.
///
/// Running out of bytes is reported as [`BoundariesError::TruncatedFeature`];
/// content that contradicts the header or is otherwise structurally invalid as
/// [`BoundariesError::InvalidFeature`].
pub fn decode_feature(bytes: &[u8], header: &Header) -> Result<Feature> {
    let mut cursor = ByteCursor::new(bytes);
    let geometry_len = cursor.read_u32().map_err(truncated)? as usize;
    let block = cursor.take(geometry_len).map_err(truncated)?;

    let mut geometry_cursor = ByteCursor::new(block);
    let geometry = read_geometry(&mut geometry_cursor, header.geometry_type)?;
    if !geometry_cursor.is_empty() {
        return Err(BoundariesError::InvalidFeature(format!(
            "{} unparsed bytes in the geometry block",
            geometry_cursor.remaining()
        )));
    }

    let mut properties = Properties::with_capacity(header.columns.len());
    for column in &header.columns {
        let value = read_value(&mut cursor, column)?;
        properties.insert(column.name.as_str(), value);
    }

    if !cursor.is_empty() {
        return Err(BoundariesError::InvalidFeature(format!(
            "{} unparsed bytes after the last column",
            cursor.remaining()
        )));
    }

    Ok(Feature {
        geometry,
        properties,
    })
}

fn write_geometry(buf: &mut BytesMut, kind: GeometryType, geometry: &Geometry<f64>) -> Result<()> {
    buf.put_u8(kind as u8);
    match geometry {
        Geometry::Point(point) => put_coord(buf, &point.0),
        Geometry::LineString(line) => {
            put_count(buf, line.0.len())?;
            put_coords(buf, &line.0);
        }
        Geometry::MultiPoint(points) => {
            put_count(buf, points.0.len())?;
            for point in &points.0 {
                put_coord(buf, &point.0);
            }
        }
        Geometry::Polygon(polygon) => put_rings(buf, &polygon_rings(polygon))?,
        Geometry::MultiLineString(lines) => put_rings(buf, &lines.0.iter().collect::<Vec<_>>())?,
        Geometry::MultiPolygon(polygons) => {
            put_count(buf, polygons.0.len())?;
            let rings: Vec<Vec<&LineString<f64>>> = polygons.0.iter().map(polygon_rings).collect();
            for polygon in &rings {
                put_count(buf, polygon.len())?;
            }
            for ring in rings.iter().flatten() {
                put_count(buf, ring.0.len())?;
            }
            for ring in rings.iter().flatten() {
                put_coords(buf, &ring.0);
            }
        }
        other => {
            return Err(BoundariesError::InvalidFeature(format!(
                "geometry {:?} cannot be stored",
                geometry_name(other)
            )));
        }
    }
    Ok(())
}

fn polygon_rings(polygon: &Polygon<f64>) -> Vec<&LineString<f64>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .collect()
}

fn put_rings(buf: &mut BytesMut, rings: &[&LineString<f64>]) -> Result<()> {
    put_count(buf, rings.len())?;
    for ring in rings {
        put_count(buf, ring.0.len())?;
    }
    for ring in rings {
        put_coords(buf, &ring.0);
    }
    Ok(())
}

fn put_count(buf: &mut BytesMut, count: usize) -> Result<()> {
    let count = u32::try_from(count)
        .map_err(|_| BoundariesError::InvalidFeature(format!("{count} parts is too many")))?;
    buf.put_u32_le(count);
    Ok(())
}

fn put_coord(buf: &mut BytesMut, coord: &Coord<f64>) {
    buf.put_f64_le(coord.x);
    buf.put_f64_le(coord.y);
}

fn put_coords(buf: &mut BytesMut, coords: &[Coord<f64>]) {
    for coord in coords {
        put_coord(buf, coord);
    }
}

fn read_geometry(cursor: &mut ByteCursor<'_>, declared: GeometryType) -> Result<Geometry<f64>> {
    let tag = cursor.read_u8().map_err(truncated)?;
    let kind = match GeometryType::from_u8(tag) {
        Some(GeometryType::Unknown) | None => {
            return Err(BoundariesError::InvalidFeature(format!(
                "unknown geometry tag {tag}"
            )));
        }
        Some(kind) => kind,
    };
    if !declared.admits(kind) {
        return Err(BoundariesError::InvalidFeature(format!(
            "{kind} geometry in a {declared} dataset"
        )));
    }

    let geometry = match kind {
        GeometryType::Point => Geometry::Point(Point(read_coord(cursor)?)),
        GeometryType::LineString => {
            let count = read_count(cursor, COORD_SIZE)?;
            Geometry::LineString(LineString(read_coords(cursor, count)?))
        }
        GeometryType::MultiPoint => {
            let count = read_count(cursor, COORD_SIZE)?;
            let coords = read_coords(cursor, count)?;
            Geometry::MultiPoint(MultiPoint(coords.into_iter().map(Point).collect()))
        }
        GeometryType::Polygon => {
            let rings = read_rings(cursor)?;
            Geometry::Polygon(rings_to_polygon(rings))
        }
        GeometryType::MultiLineString => {
            Geometry::MultiLineString(MultiLineString(read_rings(cursor)?))
        }
        GeometryType::MultiPolygon => {
            let polygon_count = read_count(cursor, 4)?;
            let mut ring_counts = Vec::with_capacity(polygon_count);
            for _ in 0..polygon_count {
                ring_counts.push(read_count(cursor, 4)?);
            }
            let total: usize = ring_counts.iter().sum();
            let lengths = read_lengths(cursor, total)?;

            let mut lengths = lengths.into_iter();
            let mut polygons = Vec::with_capacity(polygon_count);
            for ring_count in ring_counts {
                let mut rings = Vec::with_capacity(ring_count);
                for len in lengths.by_ref().take(ring_count) {
                    rings.push(LineString(read_coords(cursor, len)?));
                }
                polygons.push(rings_to_polygon(rings));
            }
            Geometry::MultiPolygon(MultiPolygon(polygons))
        }
        GeometryType::Unknown => unreachable!("rejected above"),
    };
    Ok(geometry)
}

fn rings_to_polygon(rings: Vec<LineString<f64>>) -> Polygon<f64> {
    let mut rings = rings.into_iter();
    let exterior = rings.next().unwrap_or_else(|| LineString(Vec::new()));
    Polygon::new(exterior, rings.collect())
}

fn read_rings(cursor: &mut ByteCursor<'_>) -> Result<Vec<LineString<f64>>> {
    let ring_count = read_count(cursor, 4)?;
    let lengths = read_lengths(cursor, ring_count)?;
    lengths
        .into_iter()
        .map(|len| read_coords(cursor, len).map(LineString))
        .collect()
}

fn read_lengths(cursor: &mut ByteCursor<'_>, count: usize) -> Result<Vec<usize>> {
    cursor.ensure(count, 4).map_err(truncated)?;
    (0..count)
        .map(|_| cursor.read_u32().map(|len| len as usize).map_err(truncated))
        .collect()
}

/// Read a `u32` count and check that `count` items of `width` bytes remain.
fn read_count(cursor: &mut ByteCursor<'_>, width: usize) -> Result<usize> {
    let count = cursor.read_u32().map_err(truncated)? as usize;
    cursor.ensure(count, width).map_err(truncated)?;
    Ok(count)
}

fn read_coord(cursor: &mut ByteCursor<'_>) -> Result<Coord<f64>> {
    let x = cursor.read_f64().map_err(truncated)?;
    let y = cursor.read_f64().map_err(truncated)?;
    Ok(Coord { x, y })
}

fn read_coords(cursor: &mut ByteCursor<'_>, count: usize) -> Result<Vec<Coord<f64>>> {
    cursor.ensure(count, COORD_SIZE).map_err(truncated)?;
    (0..count).map(|_| read_coord(cursor)).collect()
}

fn write_value(buf: &mut BytesMut, column: &Column, value: &ColumnValue) -> Result<()> {
    if value.is_null() {
        if !column.nullable {
            return Err(BoundariesError::InvalidFeature(format!(
                "missing value for non-nullable column \"{}\"",
                column.name
            )));
        }
        buf.put_u8(0);
        return Ok(());
    }
    if column.nullable {
        buf.put_u8(1);
    }

    match (column.column_type, value) {
        (ColumnType::Bool, ColumnValue::Bool(v)) => buf.put_u8(u8::from(*v)),
        (ColumnType::Int32, ColumnValue::Int32(v)) => buf.put_i32_le(*v),
        (ColumnType::Int64, ColumnValue::Int64(v)) => buf.put_i64_le(*v),
        (ColumnType::Double, ColumnValue::Double(v)) => buf.put_f64_le(*v),
        (ColumnType::String, ColumnValue::String(v)) => {
            check_prefixed_len(column, v.len())?;
            buf.put_prefixed_str(v);
        }
        (ColumnType::Binary, ColumnValue::Binary(v)) => {
            check_prefixed_len(column, v.len())?;
            buf.put_prefixed(v);
        }
        (ColumnType::DateTime, ColumnValue::DateTime(v)) => buf.put_i64_le(v.timestamp_millis()),
        (expected, _) => {
            return Err(BoundariesError::InvalidFeature(format!(
                "column \"{}\" expects {expected:?}, got {:?}",
                column.name,
                value.column_type()
            )));
        }
    }
    Ok(())
}

fn check_prefixed_len(column: &Column, len: usize) -> Result<()> {
    if u32::try_from(len).is_err() {
        return Err(BoundariesError::InvalidFeature(format!(
            "value of {len} bytes is too large for column \"{}\"",
            column.name
        )));
    }
    Ok(())
}

fn read_value(cursor: &mut ByteCursor<'_>, column: &Column) -> Result<ColumnValue> {
    if column.nullable {
        match cursor.read_u8().map_err(truncated)? {
            0 => return Ok(ColumnValue::Null),
            1 => {}
            flag => {
                return Err(BoundariesError::InvalidFeature(format!(
                    "invalid presence byte {flag} for column \"{}\"",
                    column.name
                )));
            }
        }
    }

    let value = match column.column_type {
        ColumnType::Bool => match cursor.read_u8().map_err(truncated)? {
            0 => ColumnValue::Bool(false),
            1 => ColumnValue::Bool(true),
            other => {
                return Err(BoundariesError::InvalidFeature(format!(
                    "invalid boolean {other} for column \"{}\"",
                    column.name
                )));
            }
        },
        ColumnType::Int32 => ColumnValue::Int32(cursor.read_i32().map_err(truncated)?),
        ColumnType::Int64 => ColumnValue::Int64(cursor.read_i64().map_err(truncated)?),
        ColumnType::Double => ColumnValue::Double(cursor.read_f64().map_err(truncated)?),
        ColumnType::String => {
            let bytes = cursor.read_prefixed().map_err(truncated)?;
            let value = std::str::from_utf8(bytes).map_err(|err| {
                BoundariesError::InvalidFeature(format!(
                    "column \"{}\" is not valid UTF-8: {err}",
                    column.name
                ))
            })?;
            ColumnValue::String(value.to_owned())
        }
        ColumnType::Binary => {
            ColumnValue::Binary(cursor.read_prefixed().map_err(truncated)?.to_vec())
        }
        ColumnType::DateTime => {
            let millis = cursor.read_i64().map_err(truncated)?;
            let value = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                BoundariesError::InvalidFeature(format!(
                    "timestamp {millis} out of range for column \"{}\"",
                    column.name
                ))
            })?;
            ColumnValue::DateTime(value)
        }
    };
    Ok(value)
}

fn geometry_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

fn truncated(err: OutOfBounds) -> BoundariesError {
    BoundariesError::TruncatedFeature(err.to_string())
}
