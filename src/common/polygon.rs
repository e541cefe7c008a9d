use anyhow::{bail, Result};
use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use shapefile as shp;

/// Planar part of a shapefile point; M and Z values are dropped.
trait Xy {
    fn coord(&self) -> Coord<f64>;
}

impl Xy for shp::Point {
    #[inline] fn coord(&self) -> Coord<f64> { Coord { x: self.x, y: self.y } }
}

impl Xy for shp::PointM {
    #[inline] fn coord(&self) -> Coord<f64> { Coord { x: self.x, y: self.y } }
}

impl Xy for shp::PointZ {
    #[inline] fn coord(&self) -> Coord<f64> { Coord { x: self.x, y: self.y } }
}

fn coords<P: Xy>(points: &[P]) -> Vec<Coord<f64>> {
    points.iter().map(Xy::coord).collect()
}

/// Convert shapefile polygon rings to a geo::MultiPolygon<f64>.
/// Shapefiles store each outer ring followed by its holes.
fn rings_to_geo<P: Xy>(rings: &[shp::PolygonRing<P>]) -> MultiPolygon<f64> {
    /// Ensure first and last are the same for geo::LineString coords
    fn closed(mut coords: Vec<Coord<f64>>) -> LineString<f64> {
        if coords.first() != coords.last() {
            coords.push(coords[0]);
        }
        LineString::new(coords)
    }

    let mut polys: Vec<Polygon<f64>> = Vec::new();
    let mut current_exterior: Option<LineString<f64>> = None;
    let mut current_holes: Vec<LineString<f64>> = Vec::new();

    for ring in rings {
        match ring {
            shp::PolygonRing::Outer(points) => {
                // flush previous polygon
                if let Some(ext) = current_exterior.take() {
                    polys.push(Polygon::new(ext, std::mem::take(&mut current_holes)));
                }
                current_exterior = Some(closed(coords(points)));
            }
            shp::PolygonRing::Inner(points) => current_holes.push(closed(coords(points))),
        }
    }
    if let Some(ext) = current_exterior {
        polys.push(Polygon::new(ext, current_holes));
    }

    MultiPolygon::new(polys)
}

fn parts_to_geo<P: Xy>(parts: &[Vec<P>]) -> Geometry<f64> {
    match parts {
        [part] => Geometry::LineString(LineString::new(coords(part))),
        _ => Geometry::MultiLineString(MultiLineString::new(
            parts.iter().map(|part| LineString::new(coords(part))).collect()
        )),
    }
}

fn points_to_geo<P: Xy>(points: &[P]) -> Geometry<f64> {
    Geometry::MultiPoint(MultiPoint::new(coords(points).into_iter().map(Point::from).collect()))
}

/// Convert any shapefile shape to a geo geometry. Null shapes yield `None`.
pub(crate) fn shp_to_geo(shape: &shp::Shape) -> Result<Option<Geometry<f64>>> {
    Ok(Some(match shape {
        shp::Shape::NullShape => return Ok(None),
        shp::Shape::Point(p) => Geometry::Point(Point::from(p.coord())),
        shp::Shape::PointM(p) => Geometry::Point(Point::from(p.coord())),
        shp::Shape::PointZ(p) => Geometry::Point(Point::from(p.coord())),
        shp::Shape::Multipoint(mp) => points_to_geo(mp.points()),
        shp::Shape::MultipointM(mp) => points_to_geo(mp.points()),
        shp::Shape::MultipointZ(mp) => points_to_geo(mp.points()),
        shp::Shape::Polyline(l) => parts_to_geo(l.parts()),
        shp::Shape::PolylineM(l) => parts_to_geo(l.parts()),
        shp::Shape::PolylineZ(l) => parts_to_geo(l.parts()),
        shp::Shape::Polygon(p) => Geometry::MultiPolygon(rings_to_geo(p.rings())),
        shp::Shape::PolygonM(p) => Geometry::MultiPolygon(rings_to_geo(p.rings())),
        shp::Shape::PolygonZ(p) => Geometry::MultiPolygon(rings_to_geo(p.rings())),
        other => bail!("unsupported shape type: {:?}", other.shapetype()),
    }))
}

#[inline] fn shp_point(c: Coord<f64>) -> shp::Point { shp::Point { x: c.x, y: c.y } }

/// Convert geo::MultiPolygon<f64> to shapefile::Polygon
pub(crate) fn geo_to_shp(mp: &MultiPolygon<f64>) -> shp::Polygon {
    /// Close a ring of shapefile::Point
    fn ensure_closed(pts: &mut Vec<shp::Point>) {
        if let (Some(first), Some(last)) = (pts.first(), pts.last()) {
            if first.x != last.x || first.y != last.y {
                pts.push(*first);
            }
        }
    }

    /// Get the signed area of a shapefile::Point list (negative for CW)
    fn signed_area(pts: &[shp::Point]) -> f64 {
        pts.windows(2).map(|w| w[0].x * w[1].y - w[1].x * w[0].y).sum::<f64>() / 2.0
    }

    // Build a flat list of rings in Shapefile ordering:
    // [ext CW, hole CCW, hole CCW, ..., next ext CW, ...]
    let mut rings: Vec<shp::PolygonRing<shp::Point>> = Vec::new();

    for poly in &mp.0 {
        let mut ext_pts = poly.exterior().coords().copied().map(shp_point).collect::<Vec<_>>();
        ensure_closed(&mut ext_pts);
        if signed_area(&ext_pts) > 0.0 {
            ext_pts.reverse(); // make CW
        }
        rings.push(shp::PolygonRing::Outer(ext_pts));

        for hole in poly.interiors() {
            let mut hole_pts = hole.coords().copied().map(shp_point).collect::<Vec<_>>();
            ensure_closed(&mut hole_pts);
            if signed_area(&hole_pts) < 0.0 {
                hole_pts.reverse(); // make CCW
            }
            rings.push(shp::PolygonRing::Inner(hole_pts));
        }
    }

    shp::Polygon::with_rings(rings)
}

/// Convert line geometry to a shapefile::Polyline, one part per line string.
/// Parts with fewer than two vertices are padded by repeating their vertex.
pub(crate) fn lines_to_shp(lines: &[&LineString<f64>]) -> shp::Polyline {
    shp::Polyline::with_parts(
        lines.iter()
            .map(|ls| {
                let mut part = ls.coords().copied().map(shp_point).collect::<Vec<_>>();
                if part.len() == 1 { part.push(part[0]) }
                part
            })
            .collect()
    )
}

pub(crate) fn points_to_shp(points: &[Point<f64>]) -> shp::Multipoint {
    shp::Multipoint::new(points.iter().map(|p| shp_point(p.0)).collect())
}

#[inline]
pub(crate) fn point_to_shp(point: &Point<f64>) -> shp::Point { shp_point(point.0) }

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn polygon_with_hole_survives_shapefile_ring_order() {
        let mp = MultiPolygon::new(vec![polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)],
            interiors: [[(x: 2.0, y: 2.0), (x: 4.0, y: 2.0), (x: 4.0, y: 4.0), (x: 2.0, y: 4.0)]]
        )]);
        let shp_polygon = geo_to_shp(&mp);
        assert_eq!(shp_polygon.rings().len(), 2);
        assert!(matches!(shp_polygon.rings()[0], shp::PolygonRing::Outer(_)));

        let back = match shp_to_geo(&shp::Shape::Polygon(shp_polygon)).unwrap() {
            Some(Geometry::MultiPolygon(mp)) => mp,
            other => panic!("unexpected geometry: {other:?}"),
        };
        assert_eq!(back.0.len(), 1);
        assert_eq!(back.0[0].interiors().len(), 1);
        assert!((geoclip::area(&back) - 96.0).abs() < 1e-9);
    }

    #[test]
    fn single_part_polyline_is_a_line_string() {
        let polyline = shp::Polyline::new(vec![shp::Point::new(0.0, 0.0), shp::Point::new(3.0, 4.0)]);
        let geometry = shp_to_geo(&shp::Shape::Polyline(polyline)).unwrap();
        assert!(matches!(geometry, Some(Geometry::LineString(ls)) if ls.0.len() == 2));
    }

    #[test]
    fn null_shape_is_none() {
        assert!(shp_to_geo(&shp::Shape::NullShape).unwrap().is_none());
    }

    #[test]
    fn point_m_drops_measure() {
        let geometry = shp_to_geo(&shp::Shape::PointM(shp::PointM { x: 1.0, y: 2.0, m: 9.0 })).unwrap();
        assert_eq!(geometry, Some(Geometry::Point(Point::new(1.0, 2.0))));
    }
}
