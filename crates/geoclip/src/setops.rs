//! Boolean set operations over polygon sets.
//!
//! Union, difference and intersection all go through the same overlay engine
//! (`geo::BooleanOps`), and every result is normalized with the same
//! tolerance. Operands are expected to be valid sets (no overlapping members);
//! use [`dissolve`] first on anything that may self-overlap.

use geo::{BooleanOps, BoundingRect, MultiPolygon, Rect};
use rayon::prelude::*;

use crate::normalize::{Normalizer, RepairReport};

/// Set-op engine bound to one coordinate tolerance.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOps {
    normalizer: Normalizer,
}

impl SetOps {
    pub fn new(tolerance: f64) -> Self {
        Self { normalizer: Normalizer::new(tolerance) }
    }

    #[inline] pub fn tolerance(&self) -> f64 { self.normalizer.tolerance() }

    /// Region covered by `a` or `b`.
    pub fn union(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        if b.0.is_empty() { return a.clone() }
        if a.0.is_empty() { return b.clone() }
        self.clean(overlay_union(a, b))
    }

    /// Dissolve many valid sets into maximal connected polygons.
    ///
    /// Inputs are ordered along a Z-order curve so that neighbours merge early,
    /// then reduced pairwise in parallel; each level halves the number of sets.
    pub fn union_all(&self, sets: impl IntoIterator<Item = MultiPolygon<f64>>) -> MultiPolygon<f64> {
        let mut layer = spatially_sorted(sets.into_iter().filter(|set| !set.0.is_empty()).collect());

        while layer.len() > 1 {
            layer = layer.into_par_iter()
                .chunks(2)
                .map(|mut pair| match (pair.pop(), pair.pop()) {
                    (Some(b), Some(a)) => overlay_union(&a, &b),
                    (Some(a), None) => a,
                    _ => MultiPolygon::new(vec![]),
                })
                .collect();
        }

        match layer.pop() {
            Some(set) => self.clean(set),
            None => MultiPolygon::new(vec![]),
        }
    }

    /// Union of the members of one possibly self-overlapping collection.
    pub fn dissolve(&self, polygons: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        self.union_all(polygons.0.iter().map(|p| MultiPolygon::new(vec![p.clone()])))
    }

    /// Region of `a` not covered by `b` ("erase"). An empty `b` leaves `a`
    /// unchanged; a fully covered `a` yields the empty set.
    pub fn difference(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        if a.0.is_empty() { return MultiPolygon::new(vec![]) }
        if b.0.is_empty() || !bboxes_overlap(a, b) { return a.clone() }
        self.clean(a.difference(b))
    }

    /// Region common to `a` and `b` ("clip"). Empty when they do not overlap.
    pub fn intersection(&self, a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        if a.0.is_empty() || b.0.is_empty() || !bboxes_overlap(a, b) {
            return MultiPolygon::new(vec![]);
        }
        self.clean(a.intersection(b))
    }

    fn clean(&self, polygons: MultiPolygon<f64>) -> MultiPolygon<f64> {
        self.normalizer.multi_polygon(&polygons, &mut RepairReport::default())
    }
}

/// Union with the default tolerance. See [`SetOps::union`].
pub fn union(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    SetOps::default().union(a, b)
}

/// Cascaded union with the default tolerance. See [`SetOps::union_all`].
pub fn union_all(sets: impl IntoIterator<Item = MultiPolygon<f64>>) -> MultiPolygon<f64> {
    SetOps::default().union_all(sets)
}

/// Dissolve with the default tolerance. See [`SetOps::dissolve`].
pub fn dissolve(polygons: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    SetOps::default().dissolve(polygons)
}

/// Erase with the default tolerance. See [`SetOps::difference`].
pub fn difference(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    SetOps::default().difference(a, b)
}

/// Clip with the default tolerance. See [`SetOps::intersection`].
pub fn intersection(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    SetOps::default().intersection(a, b)
}

/// Raw union without normalization. Sets with disjoint boxes are concatenated.
fn overlay_union(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    if !bboxes_overlap(a, b) {
        return MultiPolygon::new(a.0.iter().chain(b.0.iter()).cloned().collect());
    }
    a.union(b)
}

fn bboxes_overlap(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> bool {
    match (a.bounding_rect(), b.bounding_rect()) {
        (Some(a), Some(b)) => {
            a.min().x <= b.max().x && b.min().x <= a.max().x
                && a.min().y <= b.max().y && b.min().y <= a.max().y
        }
        _ => false,
    }
}

/// Order sets by the Morton code of their bbox centers within the global extent.
fn spatially_sorted(sets: Vec<MultiPolygon<f64>>) -> Vec<MultiPolygon<f64>> {
    if sets.len() < 3 { return sets }

    let centers = sets.iter()
        .map(|set| set.bounding_rect().map(|r| r.center()))
        .collect::<Vec<_>>();
    let Some(extent) = centers.iter().flatten()
        .map(|c| Rect::new(*c, *c))
        .reduce(|a, b| Rect::new(
            (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
            (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
        ))
    else { return sets };

    let scale = |v: f64, lo: f64, span: f64| -> u32 {
        if span > 0.0 { ((v - lo) / span * f64::from(u16::MAX)) as u32 } else { 0 }
    };

    let mut keyed = sets.into_iter().zip(centers)
        .map(|(set, center)| {
            let key = center.map_or(0, |c| morton(
                scale(c.x, extent.min().x, extent.width()),
                scale(c.y, extent.min().y, extent.height()),
            ));
            (key, set)
        })
        .collect::<Vec<_>>();
    keyed.sort_by_key(|(key, _)| *key);
    keyed.into_iter().map(|(_, set)| set).collect()
}

/// Interleave the low 16 bits of `x` and `y`.
fn morton(x: u32, y: u32) -> u64 {
    fn spread(mut v: u64) -> u64 {
        v &= 0xFFFF;
        v = (v | (v << 8)) & 0x00FF_00FF;
        v = (v | (v << 4)) & 0x0F0F_0F0F;
        v = (v | (v << 2)) & 0x3333_3333;
        v = (v | (v << 1)) & 0x5555_5555;
        v
    }
    spread(u64::from(x)) | (spread(u64::from(y)) << 1)
}
