use common_exception::{BoundariesError, Result};
use geo_traits::{
    CoordTrait, GeometryCollectionTrait, GeometryTrait, GeometryType, LineStringTrait,
    MultiLineStringTrait, MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait,
};
use geo_types::Geometry;

use crate::geometry::bounding_box::BoundingBox;
use crate::geometry::interval::Interval;

/// Compute the bounding box of a geometry
///
/// Fails for geometry kinds that a dataset cannot store (`Rect`, `Triangle`,
/// `Line`); writers normalise those first. An empty geometry yields an empty
/// box.
pub fn geometry_bounds(geom: &Geometry<f64>) -> Result<BoundingBox> {
    let mut x = Interval::empty();
    let mut y = Interval::empty();
    geo_traits_update_xy_bounds(geom, &mut x, &mut y)?;
    Ok(BoundingBox::xy(x, y))
}

/// Update a pair of intervals for x and y bounds
///
/// Useful for updating bounds in-place when accumulating bounds over many
/// geometries.
pub fn geo_traits_update_xy_bounds(
    geom: &impl GeometryTrait<T = f64>, x: &mut Interval, y: &mut Interval,
) -> Result<()> {
    match geom.as_type() {
        GeometryType::Point(pt) => update_point(pt, x, y),
        GeometryType::LineString(ls) => update_line_string(ls, x, y),
        GeometryType::Polygon(pl) => update_polygon(pl, x, y),
        GeometryType::MultiPoint(multi_pt) => {
            for pt in multi_pt.points() {
                update_point(&pt, x, y);
            }
        }
        GeometryType::MultiLineString(multi_ls) => {
            for ls in multi_ls.line_strings() {
                update_line_string(&ls, x, y);
            }
        }
        GeometryType::MultiPolygon(multi_pl) => {
            for pl in multi_pl.polygons() {
                update_polygon(&pl, x, y);
            }
        }
        GeometryType::GeometryCollection(collection) => {
            for geom in collection.geometries() {
                geo_traits_update_xy_bounds(&geom, x, y)?;
            }
        }
        _ => {
            return Err(BoundariesError::InvalidFeature(
                "GeometryType not supported for XY bounds".to_owned(),
            ));
        }
    }

    Ok(())
}

fn update_point(pt: &impl PointTrait<T = f64>, x: &mut Interval, y: &mut Interval) {
    if let Some(coord) = pt.coord() {
        x.update_value(coord.x());
        y.update_value(coord.y());
    }
}

fn update_line_string(ls: &impl LineStringTrait<T = f64>, x: &mut Interval, y: &mut Interval) {
    for coord in ls.coords() {
        x.update_value(coord.x());
        y.update_value(coord.y());
    }
}

fn update_polygon(pl: &impl PolygonTrait<T = f64>, x: &mut Interval, y: &mut Interval) {
    if let Some(exterior) = pl.exterior() {
        update_line_string(&exterior, x, y);
    }

    for interior in pl.interiors() {
        update_line_string(&interior, x, y);
    }
}
