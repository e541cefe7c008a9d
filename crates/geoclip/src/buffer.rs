//! Buffer engine.
//!
//! A buffer with round joins is the Minkowski sum of a geometry with a disc.
//! For a polyline that is exactly the union of every segment swept by the disc
//! (a "stadium"); for a polygon it is the polygon itself plus the stadiums of
//! its ring edges. All pieces are dissolved with the shared set-op engine.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use geo::{coord, Coord, Geometry, LineString, MultiPolygon, Polygon};
use rayon::prelude::*;

use crate::error::GeometryError;
use crate::model::Shape;
use crate::normalize::DEFAULT_TOLERANCE;
use crate::setops::SetOps;

/// Vertices per quarter circle unless configured otherwise.
pub const DEFAULT_ARC_SEGMENTS: usize = 32;

/// How convex corners are joined. Only round joins are supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JoinStyle {
    #[default]
    Round,
}

/// Whether buffers of separate inputs are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dissolve {
    /// Union every buffer into one set with no overlaps.
    #[default]
    All,
    /// Keep one buffer per input; buffers of different inputs may overlap.
    Each,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferParams {
    /// Offset distance in map units; must be positive.
    pub distance: f64,
    pub join: JoinStyle,
    pub dissolve: Dissolve,
    /// Vertices used per quarter circle of every arc.
    pub arc_segments: usize,
    /// Coincidence tolerance applied to the output.
    pub tolerance: f64,
}

impl BufferParams {
    pub fn new(distance: f64) -> Self {
        Self {
            distance,
            join: JoinStyle::Round,
            dissolve: Dissolve::All,
            arc_segments: DEFAULT_ARC_SEGMENTS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_dissolve(mut self, dissolve: Dissolve) -> Self {
        self.dissolve = dissolve;
        self
    }

    pub fn with_arc_segments(mut self, arc_segments: usize) -> Self {
        self.arc_segments = arc_segments.max(1);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn validate(&self) -> Result<(), GeometryError> {
        if self.distance.is_finite() && self.distance > 0.0 {
            Ok(())
        } else {
            Err(GeometryError::InvalidDistance(self.distance))
        }
    }
}

/// Regular polygon approximating a circle, counter-clockwise,
/// with `4 * arc_segments` vertices.
pub fn circle(center: Coord<f64>, radius: f64, arc_segments: usize) -> Polygon<f64> {
    let n = 4 * arc_segments.max(1);
    let mut coords = (0..n)
        .map(|i| {
            let t = TAU * i as f64 / n as f64;
            coord! { x: center.x + radius * t.cos(), y: center.y + radius * t.sin() }
        })
        .collect::<Vec<_>>();
    coords.push(coords[0]);
    Polygon::new(LineString::new(coords), vec![])
}

/// The segment `a`-`b` swept by a disc of `radius`: a rectangle capped by two
/// semicircles, counter-clockwise. A zero-length segment yields a circle.
pub fn stadium(a: Coord<f64>, b: Coord<f64>, radius: f64, arc_segments: usize) -> Polygon<f64> {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    if dx == 0.0 && dy == 0.0 {
        return circle(a, radius, arc_segments);
    }

    let phi = dy.atan2(dx);
    let steps = 2 * arc_segments.max(1);
    let mut coords = Vec::with_capacity(2 * steps + 3);

    // Cap around `b` from its right side to its left side, then around `a` back again.
    for (center, start) in [(b, phi - FRAC_PI_2), (a, phi + FRAC_PI_2)] {
        for i in 0..=steps {
            let t = start + PI * i as f64 / steps as f64;
            coords.push(coord! { x: center.x + radius * t.cos(), y: center.y + radius * t.sin() });
        }
    }
    coords.push(coords[0]);
    Polygon::new(LineString::new(coords), vec![])
}

/// Append the pieces whose union is the buffer of `geometry`.
fn offset_pieces(geometry: &Geometry<f64>, params: &BufferParams, out: &mut Vec<Polygon<f64>>) {
    let (r, n) = (params.distance, params.arc_segments);

    fn line(coords: &[Coord<f64>], r: f64, n: usize, out: &mut Vec<Polygon<f64>>) {
        match coords {
            [] => {}
            [c] => out.push(circle(*c, r, n)),
            _ => out.extend(coords.windows(2).map(|w| stadium(w[0], w[1], r, n))),
        }
    }

    fn polygon(p: &Polygon<f64>, r: f64, n: usize, out: &mut Vec<Polygon<f64>>) {
        out.push(p.clone());
        line(&p.exterior().0, r, n, out);
        p.interiors().iter().for_each(|ring| line(&ring.0, r, n, out));
    }

    match geometry {
        Geometry::Point(p) => out.push(circle(p.0, r, n)),
        Geometry::MultiPoint(mp) => out.extend(mp.0.iter().map(|p| circle(p.0, r, n))),
        Geometry::Line(l) => out.push(stadium(l.start, l.end, r, n)),
        Geometry::LineString(ls) => line(&ls.0, r, n, out),
        Geometry::MultiLineString(mls) => mls.0.iter().for_each(|ls| line(&ls.0, r, n, out)),
        Geometry::Polygon(p) => polygon(p, r, n, out),
        Geometry::MultiPolygon(mp) => mp.0.iter().for_each(|p| polygon(p, r, n, out)),
        Geometry::Rect(rect) => polygon(&rect.to_polygon(), r, n, out),
        Geometry::Triangle(t) => polygon(&t.to_polygon(), r, n, out),
        Geometry::GeometryCollection(gc) => gc.0.iter().for_each(|g| offset_pieces(g, params, out)),
    }
}

/// Buffer every shape separately (dissolving each shape's own pieces).
/// Shapes are processed in parallel; output order matches input order.
pub fn buffer_each<'a>(
    shapes: impl IntoIterator<Item = &'a Shape>,
    params: &BufferParams,
) -> Result<Vec<MultiPolygon<f64>>, GeometryError> {
    params.validate()?;
    let ops = SetOps::new(params.tolerance);
    let shapes = shapes.into_iter().collect::<Vec<_>>();

    Ok(shapes.par_iter()
        .map(|shape| {
            let mut pieces = Vec::new();
            offset_pieces(shape.geometry(), params, &mut pieces);
            ops.union_all(pieces.into_iter().map(|p| MultiPolygon::new(vec![p])))
        })
        .collect())
}

/// Buffer a collection of shapes by `params.distance` with round joins.
///
/// With [`Dissolve::All`] the result is one set with no overlapping members, so
/// its area never double counts. With [`Dissolve::Each`] the per-shape buffers
/// are returned side by side. An empty input yields an empty set.
pub fn buffer<'a>(
    shapes: impl IntoIterator<Item = &'a Shape>,
    params: &BufferParams,
) -> Result<MultiPolygon<f64>, GeometryError> {
    let each = buffer_each(shapes, params)?;
    tracing::debug!(inputs = each.len(), distance = params.distance, "dissolving buffers");

    Ok(match params.dissolve {
        Dissolve::All => SetOps::new(params.tolerance).union_all(each),
        Dissolve::Each => MultiPolygon::new(each.into_iter().flat_map(|set| set.0).collect()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon};

    use crate::area::{area, polygon_area, ring_signed_area};

    fn rel_err(actual: f64, expected: f64) -> f64 {
        ((actual - expected) / expected).abs()
    }

    #[test]
    fn circle_is_closed_and_counter_clockwise() {
        let c = circle(coord! { x: 10.0, y: -4.0 }, 5.0, 8);
        assert_eq!(c.exterior().0.len(), 33);
        assert!(c.exterior().is_closed());
        assert!(ring_signed_area(c.exterior()) > 0.0);
    }

    #[test]
    fn stadium_area_is_rectangle_plus_disc() {
        let s = stadium(coord! { x: 0.0, y: 0.0 }, coord! { x: 100.0, y: 0.0 }, 10.0, 32);
        assert!(ring_signed_area(s.exterior()) > 0.0);
        let disc = polygon_area(&circle(coord! { x: 0.0, y: 0.0 }, 10.0, 32));
        assert!(rel_err(polygon_area(&s), 2000.0 + disc) < 1e-9);
    }

    #[test]
    fn point_buffer_approximates_disc_area() {
        let shapes = [Shape::new(point! { x: 236_000.0, y: 900_000.0 })];
        let b = buffer(&shapes, &BufferParams::new(2000.0)).unwrap();
        assert_eq!(b.0.len(), 1);
        assert!(rel_err(area(&b), PI * 2000.0 * 2000.0) < 1e-3);
    }

    #[test]
    fn zero_length_line_buffers_into_a_disc() {
        let shapes = [Shape::new(line_string![(x: 5.0, y: 5.0), (x: 5.0, y: 5.0)])];
        let b = buffer(&shapes, &BufferParams::new(50.0)).unwrap();
        assert!(rel_err(area(&b), PI * 2500.0) < 1e-3);
    }

    #[test]
    fn polyline_buffer_has_round_joins() {
        // An L-shaped road: two 200 m legs.
        let shapes = [Shape::new(line_string![(x: 0.0, y: 0.0), (x: 200.0, y: 0.0), (x: 200.0, y: 200.0)])];
        let b = buffer(&shapes, &BufferParams::new(50.0)).unwrap();
        assert_eq!(b.0.len(), 1);
        // Two rectangles, one disc at the ends and three quarters of a disc at the outer corner,
        // minus the inner-corner overlap of the two rectangles (50 x 50).
        let expected = 2.0 * (200.0 * 100.0) + PI * 2500.0 + 0.25 * PI * 2500.0 - 2500.0;
        assert!(rel_err(area(&b), expected) < 2e-3);
    }

    #[test]
    fn polygon_buffer_grows_every_side() {
        let shapes = [Shape::new(polygon![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0), (x: 100.0, y: 100.0), (x: 0.0, y: 100.0)])];
        let b = buffer(&shapes, &BufferParams::new(10.0)).unwrap();
        assert_eq!(b.0.len(), 1);
        assert!(b.0[0].interiors().is_empty());
        assert!(rel_err(area(&b), 10_000.0 + 4_000.0 + PI * 100.0) < 1e-3);
    }

    #[test]
    fn polygon_with_wide_hole_keeps_a_smaller_hole() {
        let p = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 100.0, y: 0.0), (x: 100.0, y: 100.0), (x: 0.0, y: 100.0)],
            interiors: [[(x: 20.0, y: 20.0), (x: 80.0, y: 20.0), (x: 80.0, y: 80.0), (x: 20.0, y: 80.0)]]
        );
        let b = buffer(&[Shape::new(p)], &BufferParams::new(5.0)).unwrap();
        assert_eq!(b.0.len(), 1);
        assert_eq!(b.0[0].interiors().len(), 1);
        // The hole shrinks to 50 x 50 with square corners (the inside of a convex hole is not rounded).
        let hole = ring_signed_area(&b.0[0].interiors()[0]).abs();
        assert!(rel_err(hole, 2500.0) < 1e-6);
    }

    #[test]
    fn disjoint_points_do_not_double_count() {
        let shapes = (0..5)
            .map(|i| Shape::new(point! { x: f64::from(i) * 10_000.0, y: 0.0 }))
            .collect::<Vec<_>>();
        let b = buffer(&shapes, &BufferParams::new(1000.0)).unwrap();
        assert_eq!(b.0.len(), 5);
        assert!(rel_err(area(&b), 5.0 * PI * 1e6) < 1e-3);
    }

    #[test]
    fn overlapping_points_dissolve_below_the_sum() {
        let shapes = [Shape::new(point! { x: 0.0, y: 0.0 }), Shape::new(point! { x: 1000.0, y: 0.0 })];
        let b = buffer(&shapes, &BufferParams::new(1000.0)).unwrap();
        assert_eq!(b.0.len(), 1);
        let separate = buffer(&shapes, &BufferParams::new(1000.0).with_dissolve(Dissolve::Each)).unwrap();
        assert_eq!(separate.0.len(), 2);
        assert!(area(&b) < area(&separate));
    }

    #[test]
    fn non_positive_distance_is_rejected() {
        let shapes = [Shape::new(point! { x: 0.0, y: 0.0 })];
        assert_eq!(buffer(&shapes, &BufferParams::new(0.0)), Err(GeometryError::InvalidDistance(0.0)));
        assert!(buffer(&shapes, &BufferParams::new(f64::NAN)).is_err());
    }

    #[test]
    fn empty_input_buffers_to_empty_set() {
        let b = buffer(std::iter::empty::<&Shape>(), &BufferParams::new(10.0)).unwrap();
        assert!(b.0.is_empty());
    }
}
