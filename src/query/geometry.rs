//! WKT parsing and DE-9IM predicate evaluation.
//!
//! Geometries are stored as WKT text; the source of truth stays unparsed and
//! rows are interpreted at query time. Predicates are evaluated through the
//! relate matrix so every comparison mode shares one code path.

use geo::coordinate_position::CoordPos;
use geo::dimensions::Dimensions;
use geo::relate::IntersectionMatrix;
use geo::{HasDimensions, Relate};
use geo_types::{Geometry, Rect, coord};

use crate::error::{Error, Result};
use crate::types::ComparisonMode;

/// Parse WKT text to a geo-types Geometry.
pub fn parse_wkt(input: &str) -> Result<Geometry<f64>> {
    use std::str::FromStr;
    let parsed = wkt::Wkt::<f64>::from_str(input)
        .map_err(|e| Error::invalid_argument(format!("invalid WKT: {e:?}")))?;
    Geometry::try_from(parsed).map_err(|e| Error::invalid_argument(format!("invalid WKT: {e:?}")))
}

/// The query rectangle built from four scalar bounds.
#[must_use]
pub fn bbox_geometry(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Geometry<f64> {
    Geometry::Polygon(Rect::new(coord! { x: minx, y: miny }, coord! { x: maxx, y: maxy }).to_polygon())
}

fn dimension_rank(d: Dimensions) -> Option<u8> {
    match d {
        Dimensions::Empty => None,
        Dimensions::ZeroDimensional => Some(0),
        Dimensions::OneDimensional => Some(1),
        Dimensions::TwoDimensional => Some(2),
    }
}

fn interior_interior(im: &IntersectionMatrix) -> Dimensions {
    im.get(CoordPos::Inside, CoordPos::Inside)
}

/// JTS-style crosses: the geometries share interior points, but neither is
/// contained in the other, with the dimension rules of the DE-9IM spec.
fn crosses(im: &IntersectionMatrix, subject: &Geometry<f64>, object: &Geometry<f64>) -> bool {
    let (Some(da), Some(db)) = (
        dimension_rank(subject.dimensions()),
        dimension_rank(object.dimensions()),
    ) else {
        return false;
    };

    if da < db {
        interior_interior(im) != Dimensions::Empty
            && im.get(CoordPos::Inside, CoordPos::Outside) != Dimensions::Empty
    } else if da > db {
        interior_interior(im) != Dimensions::Empty
            && im.get(CoordPos::Outside, CoordPos::Inside) != Dimensions::Empty
    } else if da == 1 {
        interior_interior(im) == Dimensions::ZeroDimensional
    } else {
        false
    }
}

/// JTS-style overlaps: same dimension, interiors intersect, and each geometry
/// has interior points outside the other.
fn overlaps(im: &IntersectionMatrix, subject: &Geometry<f64>, object: &Geometry<f64>) -> bool {
    let (Some(da), Some(db)) = (
        dimension_rank(subject.dimensions()),
        dimension_rank(object.dimensions()),
    ) else {
        return false;
    };
    if da != db {
        return false;
    }

    let ii = interior_interior(im);
    let spills = im.get(CoordPos::Inside, CoordPos::Outside) != Dimensions::Empty
        && im.get(CoordPos::Outside, CoordPos::Inside) != Dimensions::Empty;

    if da == 1 {
        ii == Dimensions::OneDimensional && spills
    } else {
        ii != Dimensions::Empty && spills
    }
}

/// Touches: boundaries meet but interiors never do.
fn touches(im: &IntersectionMatrix) -> bool {
    im.is_intersects() && interior_interior(im) == Dimensions::Empty
}

/// Evaluates `subject <mode> object`, e.g. `Within` asks whether the row
/// geometry lies within the query rectangle.
#[must_use]
pub fn evaluate(mode: ComparisonMode, subject: &Geometry<f64>, object: &Geometry<f64>) -> bool {
    let im = subject.relate(object);
    match mode {
        ComparisonMode::Within => im.is_within(),
        ComparisonMode::Contains => im.is_contains(),
        ComparisonMode::Intersects => im.is_intersects(),
        ComparisonMode::Disjoint => im.is_disjoint(),
        // topological equality: each geometry contains the other
        ComparisonMode::Equals => im.is_contains() && im.is_within(),
        ComparisonMode::Touches => touches(&im),
        ComparisonMode::Crosses => crosses(&im, subject, object),
        ComparisonMode::Overlaps => overlaps(&im, subject, object),
    }
}

/// Uppercase tag for a geometry value, as reported by `geometry_types`.
#[must_use]
pub fn geometry_type_tag(geom: &Geometry<f64>) -> &'static str {
    match geom {
        Geometry::Point(_) => "POINT",
        Geometry::Line(_) | Geometry::LineString(_) => "LINESTRING",
        Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => "POLYGON",
        Geometry::MultiPoint(_) => "MULTIPOINT",
        Geometry::MultiLineString(_) => "MULTILINESTRING",
        Geometry::MultiPolygon(_) => "MULTIPOLYGON",
        Geometry::GeometryCollection(_) => "GEOMETRYCOLLECTION",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> Geometry<f64> {
        bbox_geometry(0.0, 0.0, 10.0, 10.0)
    }

    #[test]
    fn test_parse_wkt_polygon() {
        let geom = parse_wkt("POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))").unwrap();
        assert!(matches!(geom, Geometry::Polygon(_)));
        assert_eq!(geometry_type_tag(&geom), "POLYGON");
    }

    #[test]
    fn test_parse_wkt_rejects_garbage() {
        assert!(matches!(
            parse_wkt("POLYGON((broken"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_within_and_disjoint() {
        let inside = parse_wkt("POLYGON((1 1, 2 1, 2 2, 1 2, 1 1))").unwrap();
        let outside = parse_wkt("POLYGON((20 20, 21 20, 21 21, 20 21, 20 20))").unwrap();

        assert!(evaluate(ComparisonMode::Within, &inside, &rect()));
        assert!(!evaluate(ComparisonMode::Within, &outside, &rect()));
        assert!(evaluate(ComparisonMode::Disjoint, &outside, &rect()));
        assert!(evaluate(ComparisonMode::Intersects, &inside, &rect()));
    }

    #[test]
    fn test_contains_direction() {
        let big = parse_wkt("POLYGON((-5 -5, 15 -5, 15 15, -5 15, -5 -5))").unwrap();
        assert!(evaluate(ComparisonMode::Contains, &big, &rect()));
        assert!(!evaluate(ComparisonMode::Within, &big, &rect()));
    }

    #[test]
    fn test_touches_shared_edge() {
        let neighbor = parse_wkt("POLYGON((10 0, 20 0, 20 10, 10 10, 10 0))").unwrap();
        assert!(evaluate(ComparisonMode::Touches, &neighbor, &rect()));
        assert!(!evaluate(ComparisonMode::Overlaps, &neighbor, &rect()));
    }

    #[test]
    fn test_overlaps_partial() {
        let partial = parse_wkt("POLYGON((5 5, 15 5, 15 15, 5 15, 5 5))").unwrap();
        assert!(evaluate(ComparisonMode::Overlaps, &partial, &rect()));
        assert!(!evaluate(ComparisonMode::Within, &partial, &rect()));
    }

    #[test]
    fn test_crosses_line_through_area() {
        let line = parse_wkt("LINESTRING(-5 5, 15 5)").unwrap();
        assert!(evaluate(ComparisonMode::Crosses, &line, &rect()));
    }

    #[test]
    fn test_equals_same_shape() {
        let same = parse_wkt("POLYGON((0 0, 10 0, 10 10, 0 10, 0 0))").unwrap();
        assert!(evaluate(ComparisonMode::Equals, &same, &rect()));
    }
}
