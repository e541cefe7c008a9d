use std::sync::OnceLock;

use geo::{BoundingRect, Coord, CoordsIter, Geometry, LineString, Polygon, Rect};

use crate::error::GeometryError;

/// Broad geometry family of a [`Shape`], used for schema checks and buffering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ShapeKind {
    Point,
    Line,
    Polygon,
    Collection,
}

impl ShapeKind {
    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => ShapeKind::Point,
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => ShapeKind::Line,
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => ShapeKind::Polygon,
            Geometry::GeometryCollection(_) => ShapeKind::Collection,
        }
    }

    pub fn to_str(&self) -> &'static str {
        match self {
            ShapeKind::Point => "point",
            ShapeKind::Line => "line",
            ShapeKind::Polygon => "polygon",
            ShapeKind::Collection => "collection",
        }
    }
}

/// An immutable geometry with a lazily cached bounding box.
///
/// Shapes are never mutated in place: every operation that changes geometry
/// builds a new `Shape`, so the cached box can never go stale.
#[derive(Debug, Clone)]
pub struct Shape {
    geometry: Geometry<f64>,
    bbox: OnceLock<Option<Rect<f64>>>,
}

impl Shape {
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self { geometry: geometry.into(), bbox: OnceLock::new() }
    }

    /// Get a reference to the underlying geometry.
    #[inline] pub fn geometry(&self) -> &Geometry<f64> { &self.geometry }

    #[inline] pub fn into_geometry(self) -> Geometry<f64> { self.geometry }

    #[inline] pub fn kind(&self) -> ShapeKind { ShapeKind::of(&self.geometry) }

    /// Axis-aligned bounding box, computed on first access. `None` for empty geometries.
    pub fn bbox(&self) -> Option<Rect<f64>> {
        *self.bbox.get_or_init(|| self.geometry.bounding_rect())
    }

    /// Total number of coordinates, closing vertices included.
    #[inline] pub fn point_count(&self) -> usize { self.geometry.coords_count() }

    #[inline] pub fn is_empty(&self) -> bool { self.point_count() == 0 }

    /// Coordinate count of every ring (exterior first, then holes) of every polygon.
    /// Non-areal geometries have no rings.
    pub fn ring_point_counts(&self) -> Vec<usize> {
        fn rings(geometry: &Geometry<f64>, out: &mut Vec<usize>) {
            match geometry {
                Geometry::Polygon(p) => polygon_rings(p, out),
                Geometry::MultiPolygon(mp) => mp.0.iter().for_each(|p| polygon_rings(p, out)),
                Geometry::Rect(r) => polygon_rings(&r.to_polygon(), out),
                Geometry::Triangle(t) => polygon_rings(&t.to_polygon(), out),
                Geometry::GeometryCollection(gc) => gc.0.iter().for_each(|g| rings(g, out)),
                _ => {}
            }
        }

        fn polygon_rings(polygon: &Polygon<f64>, out: &mut Vec<usize>) {
            out.push(polygon.exterior().0.len());
            out.extend(polygon.interiors().iter().map(|ring| ring.0.len()));
        }

        let mut out = Vec::new();
        rings(&self.geometry, &mut out);
        out
    }
}

impl From<Geometry<f64>> for Shape {
    fn from(geometry: Geometry<f64>) -> Self { Self::new(geometry) }
}

/// Returns true if `a` and `b` are within `tolerance` of each other.
#[inline]
pub(crate) fn within(a: Coord<f64>, b: Coord<f64>, tolerance: f64) -> bool {
    (a.x - b.x).hypot(a.y - b.y) <= tolerance
}

#[inline]
pub(crate) fn is_finite(c: Coord<f64>) -> bool { c.x.is_finite() && c.y.is_finite() }

/// Open a ring and collapse runs of vertices closer than `tolerance`.
/// Returns the open vertex list (no closing vertex) and the number of vertices removed.
pub(crate) fn dedup_ring(coords: &[Coord<f64>], tolerance: f64) -> (Vec<Coord<f64>>, usize) {
    let open = match coords {
        [first, .., last] if first == last => &coords[..coords.len() - 1],
        _ => coords,
    };

    let mut out: Vec<Coord<f64>> = Vec::with_capacity(open.len());
    let mut removed = 0;
    for &c in open {
        match out.last() {
            Some(&last) if within(last, c, tolerance) => removed += 1,
            _ => out.push(c),
        }
    }

    // The ring wraps around: trailing vertices that collapse onto the start go too.
    while out.len() > 1 && within(out[out.len() - 1], out[0], tolerance) {
        out.pop();
        removed += 1;
    }

    (out, removed)
}

/// Distinct vertices of a ring: open, with runs closer than `tolerance` collapsed.
pub fn distinct_points(ring: &LineString<f64>, tolerance: f64) -> Vec<Coord<f64>> {
    dedup_ring(&ring.0, tolerance).0
}

#[inline]
pub(crate) fn contains_rect(outer: &Rect<f64>, inner: &Rect<f64>) -> bool {
    inner.min().x >= outer.min().x && inner.min().y >= outer.min().y
        && inner.max().x <= outer.max().x && inner.max().y <= outer.max().y
}

/// Construct a polygon from an exterior ring and hole rings.
///
/// Rings may be given open or closed. Fails if any ring has fewer than three
/// distinct vertices, if a coordinate is non-finite, or if a hole's bounding box
/// escapes the exterior's (full containment is left to the set-op engine).
pub fn polygon_from_rings(
    exterior: Vec<Coord<f64>>,
    holes: Vec<Vec<Coord<f64>>>,
) -> Result<Polygon<f64>, GeometryError> {
    fn ring(coords: Vec<Coord<f64>>) -> Result<LineString<f64>, GeometryError> {
        if !coords.iter().copied().all(is_finite) {
            return Err(GeometryError::NonFinite);
        }
        let (distinct, _) = dedup_ring(&coords, 0.0);
        if distinct.len() < 3 {
            return Err(GeometryError::TooFewPoints { found: distinct.len() });
        }
        let mut ring = LineString::new(coords);
        ring.close();
        Ok(ring)
    }

    let exterior = ring(exterior)?;
    let exterior_bbox = exterior.bounding_rect()
        .ok_or(GeometryError::TooFewPoints { found: 0 })?;

    let holes = holes.into_iter().enumerate()
        .map(|(index, coords)| {
            let hole = ring(coords)?;
            match hole.bounding_rect() {
                Some(bbox) if contains_rect(&exterior_bbox, &bbox) => Ok(hole),
                _ => Err(GeometryError::HoleOutsideExterior { index }),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Polygon::new(exterior, holes))
}
