//! Geometry repair.
//!
//! A [`Normalizer`] mirrors the classic "repair geometry, delete null" step of
//! GIS toolboxes: it fixes what it can (unclosed rings, duplicate vertices,
//! winding) and drops what it cannot, counting both in a [`RepairReport`].
//! It never fails.

use std::ops::AddAssign;

use geo::{
    BoundingRect, Coord, CoordsIter, Geometry, GeometryCollection, LineString, MultiLineString,
    MultiPolygon, Polygon,
};

use crate::area::signed_area;
use crate::model::{contains_rect, dedup_ring, is_finite, within, Shape};

/// Default coordinate tolerance in map units (0.01 m).
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Counts of repairs applied by a [`Normalizer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RepairReport {
    /// Geometries examined.
    pub inspected: usize,
    /// Geometries kept but modified.
    pub repaired: usize,
    /// Geometries that could not be repaired and were dropped.
    pub dropped: usize,
    /// Vertices removed as near-duplicates.
    pub removed_vertices: usize,
    /// Rings that were not closed on input.
    pub closed_rings: usize,
    /// Rings (exteriors or holes) dropped as degenerate.
    pub dropped_rings: usize,
    /// Rings whose winding was reversed.
    pub reoriented_rings: usize,
}

impl RepairReport {
    /// Returns true if nothing was changed or dropped.
    pub fn is_clean(&self) -> bool {
        self.repaired == 0 && self.dropped == 0
    }

    fn edits(&self) -> usize {
        self.removed_vertices + self.closed_rings + self.dropped_rings + self.reoriented_rings
    }
}

impl AddAssign for RepairReport {
    fn add_assign(&mut self, rhs: Self) {
        self.inspected += rhs.inspected;
        self.repaired += rhs.repaired;
        self.dropped += rhs.dropped;
        self.removed_vertices += rhs.removed_vertices;
        self.closed_rings += rhs.closed_rings;
        self.dropped_rings += rhs.dropped_rings;
        self.reoriented_rings += rhs.reoriented_rings;
    }
}

/// Repairs geometries to the kernel's invariants: closed rings with at least
/// three vertices spaced more than `tolerance` apart, CCW exteriors, CW holes,
/// holes inside their exterior's bounding box, and no zero-width rings.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    tolerance: f64,
}

impl Default for Normalizer {
    fn default() -> Self { Self { tolerance: DEFAULT_TOLERANCE } }
}

impl Normalizer {
    pub fn new(tolerance: f64) -> Self {
        debug_assert!(tolerance >= 0.0, "tolerance must be non-negative");
        Self { tolerance }
    }

    #[inline] pub fn tolerance(&self) -> f64 { self.tolerance }

    /// Normalize one shape, recording the outcome in `report`.
    /// Returns `None` if the shape was dropped.
    pub fn shape(&self, shape: &Shape, report: &mut RepairReport) -> Option<Shape> {
        report.inspected += 1;
        let edits = report.edits();

        if !shape.geometry().coords_iter().all(is_finite) {
            report.dropped += 1;
            tracing::debug!("dropping geometry with non-finite coordinates");
            return None;
        }

        match self.geometry(shape.geometry(), report) {
            Some(geometry) => {
                if report.edits() > edits { report.repaired += 1 }
                Some(Shape::new(geometry))
            }
            None => {
                report.dropped += 1;
                None
            }
        }
    }

    /// Normalize a batch of shapes, returning survivors in input order.
    pub fn shapes<'a>(&self, shapes: impl IntoIterator<Item = &'a Shape>) -> (Vec<Shape>, RepairReport) {
        let mut report = RepairReport::default();
        let kept = shapes.into_iter()
            .filter_map(|shape| self.shape(shape, &mut report))
            .collect();
        (kept, report)
    }

    /// Normalize a geometry. Empty results ("null" geometries) are `None`.
    pub fn geometry(&self, geometry: &Geometry<f64>, report: &mut RepairReport) -> Option<Geometry<f64>> {
        match geometry {
            Geometry::Point(p) => Some(Geometry::Point(*p)),
            Geometry::MultiPoint(mp) => (!mp.0.is_empty()).then(|| Geometry::MultiPoint(mp.clone())),
            Geometry::Line(line) => self.line(&LineString::new(vec![line.start, line.end]), report)
                .map(Geometry::LineString),
            Geometry::LineString(ls) => self.line(ls, report).map(Geometry::LineString),
            Geometry::MultiLineString(mls) => {
                let lines = mls.0.iter()
                    .filter_map(|ls| self.line(ls, report))
                    .collect::<Vec<_>>();
                (!lines.is_empty()).then(|| Geometry::MultiLineString(MultiLineString::new(lines)))
            }
            Geometry::Polygon(p) => self.polygon(p, report).map(Geometry::Polygon),
            Geometry::Rect(r) => self.polygon(&r.to_polygon(), report).map(Geometry::Polygon),
            Geometry::Triangle(t) => self.polygon(&t.to_polygon(), report).map(Geometry::Polygon),
            Geometry::MultiPolygon(mp) => {
                let mp = self.multi_polygon(mp, report);
                (!mp.0.is_empty()).then(|| Geometry::MultiPolygon(mp))
            }
            Geometry::GeometryCollection(gc) => {
                let parts = gc.0.iter()
                    .filter_map(|g| self.geometry(g, report))
                    .collect::<Vec<_>>();
                (!parts.is_empty()).then(|| Geometry::GeometryCollection(GeometryCollection(parts)))
            }
        }
    }

    /// Normalize every polygon of a set, dropping those that degenerate.
    pub fn multi_polygon(&self, polygons: &MultiPolygon<f64>, report: &mut RepairReport) -> MultiPolygon<f64> {
        MultiPolygon::new(
            polygons.0.iter()
                .filter_map(|p| self.polygon(p, report))
                .collect()
        )
    }

    /// Normalize a polygon. A polygon whose exterior degenerates is dropped;
    /// degenerate holes are simply removed.
    pub fn polygon(&self, polygon: &Polygon<f64>, report: &mut RepairReport) -> Option<Polygon<f64>> {
        let Some(exterior) = self.ring(polygon.exterior(), true, report) else {
            report.dropped_rings += 1 + polygon.interiors().len();
            return None;
        };
        let bbox = exterior.bounding_rect()?;

        let mut holes = Vec::with_capacity(polygon.interiors().len());
        for hole in polygon.interiors() {
            match self.ring(hole, false, report) {
                Some(ring) => match ring.bounding_rect() {
                    Some(r) if contains_rect(&bbox, &r) => holes.push(ring),
                    _ => report.dropped_rings += 1,
                },
                None => report.dropped_rings += 1,
            }
        }

        Some(Polygon::new(exterior, holes))
    }

    /// Clean a ring and orient it (CCW for exteriors, CW for holes).
    /// Returns `None` if fewer than three distinct vertices survive or the ring
    /// is thinner than the tolerance (twice its area is at most tolerance x perimeter).
    fn ring(&self, ring: &LineString<f64>, exterior: bool, report: &mut RepairReport) -> Option<LineString<f64>> {
        if ring.0.is_empty() { return None }
        if ring.0.len() > 1 && !ring.is_closed() { report.closed_rings += 1 }

        let (mut coords, removed) = dedup_ring(&ring.0, self.tolerance);
        report.removed_vertices += removed;
        if coords.len() < 3 { return None }

        let area = signed_area(&coords);
        let perimeter: f64 = coords.iter()
            .zip(coords.iter().cycle().skip(1))
            .map(|(a, b)| (b.x - a.x).hypot(b.y - a.y))
            .sum();
        if 2.0 * area.abs() <= self.tolerance * perimeter { return None }

        if (area > 0.0) != exterior {
            coords.reverse();
            report.reoriented_rings += 1;
        }
        coords.push(coords[0]);
        Some(LineString::new(coords))
    }

    /// Clean a line. Lines that collapse onto one location are kept as a single
    /// vertex so they still buffer into a disc; empty lines are dropped.
    fn line(&self, line: &LineString<f64>, report: &mut RepairReport) -> Option<LineString<f64>> {
        let mut coords: Vec<Coord<f64>> = Vec::with_capacity(line.0.len());
        for &c in &line.0 {
            match coords.last() {
                Some(&last) if within(last, c, self.tolerance) => report.removed_vertices += 1,
                _ => coords.push(c),
            }
        }
        (!coords.is_empty()).then(|| LineString::new(coords))
    }
}
