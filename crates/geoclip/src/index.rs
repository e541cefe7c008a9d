use geo::{BoundingRect, Geometry, Intersects, MultiPolygon, Point, Rect};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};

use crate::model::Shape;

/// A bounding box in an R-tree, associated with a shape by index.
#[derive(Debug, Clone)]
struct BoundingBox {
    idx: usize, // Index of corresponding Shape in the indexed slice
    bbox: Rect<f64>,
}

impl RTreeObject for BoundingBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

#[inline]
fn envelope(rect: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners(rect.min().into(), rect.max().into())
}

/// R-tree over the bounding boxes of a borrowed slice of shapes.
///
/// Ids returned by queries are positions in that slice. Empty shapes have no
/// bounding box and are never returned.
#[derive(Debug)]
pub struct SpatialIndex<'a> {
    shapes: &'a [Shape],
    rtree: RTree<BoundingBox>,
}

impl<'a> SpatialIndex<'a> {
    /// Bulk-load the index in O(n log n).
    pub fn build(shapes: &'a [Shape]) -> Self {
        Self {
            rtree: RTree::bulk_load(
                shapes.iter().enumerate()
                    .filter_map(|(idx, shape)| shape.bbox().map(|bbox| BoundingBox { idx, bbox }))
                    .collect()
            ),
            shapes,
        }
    }

    /// Number of indexed (non-empty) shapes.
    #[inline] pub fn len(&self) -> usize { self.rtree.size() }

    #[inline] pub fn is_empty(&self) -> bool { self.rtree.size() == 0 }

    #[inline] pub fn shapes(&self) -> &'a [Shape] { self.shapes }

    /// Ids of shapes whose bounding box intersects `rect`, ascending.
    pub fn query(&self, rect: &Rect<f64>) -> Vec<usize> {
        let mut ids = self.rtree
            .locate_in_envelope_intersecting(&envelope(rect))
            .map(|bb| bb.idx)
            .collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }

    /// Ids of shapes that truly intersect `target`, ascending.
    ///
    /// Bounding-box overlap is necessary but not sufficient, so the R-tree
    /// candidates are refined with the exact predicate in parallel.
    pub fn intersecting(&self, target: &MultiPolygon<f64>) -> Vec<usize> {
        let Some(rect) = target.bounding_rect() else { return Vec::new() };
        let candidates = self.query(&rect);
        let hits = candidates.par_iter()
            .copied()
            .filter(|&i| intersects(self.shapes[i].geometry(), target))
            .collect::<Vec<_>>();

        tracing::debug!(candidates = candidates.len(), hits = hits.len(), "refined bbox candidates");
        hits
    }
}

/// Exact intersection test of any geometry against a polygon set
/// (segment crossing or containment, boundaries included).
pub fn intersects(geometry: &Geometry<f64>, target: &MultiPolygon<f64>) -> bool {
    match geometry {
        Geometry::Point(g) => target.intersects(g),
        Geometry::MultiPoint(g) => g.0.iter().any(|p| target.intersects(p)),
        Geometry::Line(g) => target.intersects(g),
        Geometry::LineString(g) => match g.0.as_slice() {
            [] => false,
            // A collapsed line is still a location.
            [c] => target.intersects(&Point::from(*c)),
            _ => target.intersects(g),
        },
        Geometry::MultiLineString(g) => g.0.iter()
            .any(|ls| intersects(&Geometry::LineString(ls.clone()), target)),
        Geometry::Polygon(g) => target.intersects(g),
        Geometry::MultiPolygon(g) => g.0.iter().any(|p| target.intersects(p)),
        Geometry::Rect(g) => target.intersects(&g.to_polygon()),
        Geometry::Triangle(g) => target.intersects(&g.to_polygon()),
        Geometry::GeometryCollection(gc) => gc.0.iter().any(|g| intersects(g, target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon, LineString};

    fn target() -> MultiPolygon<f64> {
        MultiPolygon::new(vec![
            polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)],
        ])
    }

    #[test]
    fn query_returns_bbox_candidates_sorted() {
        let shapes = vec![
            Shape::new(point! { x: 50.0, y: 50.0 }),
            Shape::new(line_string![(x: -5.0, y: 5.0), (x: 5.0, y: 5.0)]),
            Shape::new(point! { x: 1.0, y: 1.0 }),
        ];
        let index = SpatialIndex::build(&shapes);
        assert_eq!(index.len(), 3);
        assert_eq!(index.query(&Rect::new((0.0, 0.0), (10.0, 10.0))), vec![1, 2]);
    }

    #[test]
    fn bbox_overlap_alone_is_not_an_intersection() {
        // Diagonal line whose bbox covers the L-shaped target's notch but misses the polygon.
        let l_shape = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 2.0),
            (x: 2.0, y: 2.0), (x: 2.0, y: 10.0), (x: 0.0, y: 10.0),
        ]]);
        let shapes = vec![
            Shape::new(line_string![(x: 5.0, y: 9.0), (x: 9.0, y: 5.0)]),
            Shape::new(line_string![(x: 1.0, y: 20.0), (x: 1.0, y: -20.0)]),
        ];
        let index = SpatialIndex::build(&shapes);
        assert_eq!(index.query(&Rect::new((0.0, 0.0), (10.0, 10.0))), vec![0, 1]);
        assert_eq!(index.intersecting(&l_shape), vec![1]);
    }

    #[test]
    fn collapsed_line_intersects_as_a_point() {
        let inside = Geometry::LineString(LineString::new(vec![(3.0, 3.0).into()]));
        let outside = Geometry::LineString(LineString::new(vec![(30.0, 3.0).into()]));
        assert!(intersects(&inside, &target()));
        assert!(!intersects(&outside, &target()));
    }

    #[test]
    fn empty_shapes_are_not_indexed() {
        let shapes = vec![Shape::new(MultiPolygon::<f64>::new(vec![])), Shape::new(point! { x: 1.0, y: 1.0 })];
        let index = SpatialIndex::build(&shapes);
        assert_eq!(index.len(), 1);
        assert_eq!(index.intersecting(&target()), vec![1]);
    }

    #[test]
    fn empty_target_has_no_hits() {
        let shapes = vec![Shape::new(point! { x: 1.0, y: 1.0 })];
        let index = SpatialIndex::build(&shapes);
        assert!(index.intersecting(&MultiPolygon::new(vec![])).is_empty());
    }
}
