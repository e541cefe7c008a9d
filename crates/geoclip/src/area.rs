use geo::{Coord, LineString, MultiPolygon, Polygon};

/// Signed area of a ring by the shoelace formula (positive for CCW).
/// Works on open or closed rings.
pub fn ring_signed_area(ring: &LineString<f64>) -> f64 {
    signed_area(&ring.0)
}

pub(crate) fn signed_area(coords: &[Coord<f64>]) -> f64 {
    if coords.len() < 3 { return 0.0 }

    // Translate to the first vertex to keep the cross products small.
    let origin = coords[0];
    let mut sum = Neumaier::default();
    for w in coords.windows(2) {
        let (a, b) = (w[0] - origin, w[1] - origin);
        sum.add(a.x * b.y - b.x * a.y);
    }
    let (a, b) = (coords[coords.len() - 1] - origin, coords[0] - origin);
    sum.add(a.x * b.y - b.x * a.y);
    sum.total() / 2.0
}

/// Area of one polygon: |exterior| minus the sum of |holes|, never negative.
/// Ring winding does not matter.
pub fn polygon_area(polygon: &Polygon<f64>) -> f64 {
    let holes: f64 = polygon.interiors().iter().map(|ring| ring_signed_area(ring).abs()).sum();
    (ring_signed_area(polygon.exterior()).abs() - holes).max(0.0)
}

/// Total area of a polygon set. The empty set has area `0.0`.
pub fn area(polygons: &MultiPolygon<f64>) -> f64 {
    let mut acc = AreaAccumulator::new();
    acc.add_multipolygon(polygons);
    acc.total()
}

/// Streaming area sum over many polygons with compensated (Neumaier) summation,
/// so totals over thousands of parts do not drift.
#[derive(Debug, Clone, Copy, Default)]
pub struct AreaAccumulator {
    sum: Neumaier,
    polygons: usize,
}

impl AreaAccumulator {
    pub fn new() -> Self { Self::default() }

    pub fn add_polygon(&mut self, polygon: &Polygon<f64>) {
        self.sum.add(polygon_area(polygon));
        self.polygons += 1;
    }

    pub fn add_multipolygon(&mut self, polygons: &MultiPolygon<f64>) {
        polygons.0.iter().for_each(|polygon| self.add_polygon(polygon));
    }

    /// Number of polygons accumulated so far.
    #[inline] pub fn count(&self) -> usize { self.polygons }

    #[inline] pub fn total(&self) -> f64 { self.sum.total() }
}

#[derive(Debug, Clone, Copy, Default)]
struct Neumaier {
    sum: f64,
    compensation: f64,
}

impl Neumaier {
    #[inline]
    fn add(&mut self, value: f64) {
        let t = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - t) + value;
        } else {
            self.compensation += (value - t) + self.sum;
        }
        self.sum = t;
    }

    #[inline] fn total(&self) -> f64 { self.sum + self.compensation }
}
