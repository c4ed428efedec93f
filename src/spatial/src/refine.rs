use geo::Intersects;
use geo_types::{Geometry, Line, Point, coord};

use crate::geometry::bounding_box::BoundingBox;

/// Exact intersection of a geometry with a closed query box
///
/// Boundaries count: a polygon touching the box along an edge or at a corner
/// intersects it. Degenerate boxes are tested as the point or segment they
/// describe.
pub fn intersects_box(geometry: &Geometry<f64>, query: &BoundingBox) -> bool {
    let min = coord! { x: query.min_x(), y: query.min_y() };
    let max = coord! { x: query.max_x(), y: query.max_y() };

    let window = match (query.x().width() == 0.0, query.y().width() == 0.0) {
        (true, true) => Geometry::Point(Point(min)),
        (true, false) | (false, true) => Geometry::Line(Line::new(min, max)),
        (false, false) => Geometry::Rect(query.to_rect()),
    };

    geometry.intersects(&window)
}

#[cfg(test)]
mod tests {
    use geo_types::{LineString, MultiPolygon, polygon};

    use super::*;

    fn square(x: f64, y: f64, size: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
        ])
    }

    #[test]
    fn test_touching_counts() {
        let unit = square(0.0, 0.0, 1.0);
        assert!(intersects_box(&unit, &BoundingBox::new(1.0, 0.2, 2.0, 0.8)));
        assert!(intersects_box(&unit, &BoundingBox::new(1.0, 1.0, 2.0, 2.0)));
        assert!(!intersects_box(&unit, &BoundingBox::new(1.1, 0.0, 2.0, 1.0)));
    }

    #[test]
    fn test_bbox_hit_but_geometry_miss() {
        // An L-shaped line whose box covers the query but whose segments do not.
        let line = Geometry::LineString(LineString::from(vec![
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
        ]));
        assert!(!intersects_box(&line, &BoundingBox::new(2.0, 2.0, 3.0, 3.0)));
        assert!(intersects_box(&line, &BoundingBox::new(9.0, 4.0, 11.0, 5.0)));
    }

    #[test]
    fn test_degenerate_windows() {
        let geom = Geometry::MultiPolygon(MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 4.0, y: 4.0),
            (x: 0.0, y: 4.0),
        ]]));
        assert!(intersects_box(&geom, &BoundingBox::new(2.0, 2.0, 2.0, 2.0)));
        assert!(intersects_box(&geom, &BoundingBox::new(4.0, 4.0, 4.0, 4.0)));
        assert!(!intersects_box(&geom, &BoundingBox::new(5.0, 5.0, 5.0, 5.0)));
        assert!(intersects_box(&geom, &BoundingBox::new(-1.0, 1.0, 5.0, 1.0)));
        assert!(!intersects_box(&geom, &BoundingBox::new(5.0, -1.0, 5.0, 6.0)));
    }
}
