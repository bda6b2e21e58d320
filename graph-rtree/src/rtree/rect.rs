//! n-dimensional points, rectangles and leaf entries.

use std::fmt::{Display, Formatter};

use crate::errors::{RTreeError, RTreeResult};

/// Opaque payload reference carried by a leaf entry. Only the caller knows
/// what it points at.
pub type DataId = String;

/// A point in n-dimensional space.
#[derive(Debug, Clone, PartialEq)]
pub struct PointNd {
    coords: Vec<f64>,
}

impl PointNd {
    pub fn new(coords: Vec<f64>) -> Self {
        PointNd { coords }
    }

    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    pub fn dimension(&self) -> usize {
        self.coords.len()
    }
}

impl From<Vec<f64>> for PointNd {
    fn from(coords: Vec<f64>) -> Self {
        PointNd::new(coords)
    }
}

/// An axis-aligned rectangle with `min[i] <= max[i]` in every dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct RectNd {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl RectNd {
    /// Creates a rectangle, checking that both corners have the same
    /// dimension and that `min <= max` on every axis.
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> RTreeResult<Self> {
        if min.is_empty() || min.len() != max.len() {
            return Err(RTreeError::InvalidRect(format!(
                "corner dimensions {} and {} differ or are zero",
                min.len(),
                max.len()
            )));
        }
        if let Some(axis) = (0..min.len()).find(|&i| !(min[i] <= max[i])) {
            return Err(RTreeError::InvalidRect(format!(
                "min {} exceeds max {} on axis {}",
                min[axis], max[axis], axis
            )));
        }
        Ok(RectNd { min, max })
    }

    /// Degenerate rectangle covering a single point. Rejects zero
    /// dimensions and NaN coordinates like [`RectNd::new`].
    pub fn from_point(point: &PointNd) -> RTreeResult<Self> {
        RectNd::new(point.coords.clone(), point.coords.clone())
    }

    /// Used when decoding bounds already validated before they were stored.
    pub(crate) fn from_corners(min: Vec<f64>, max: Vec<f64>) -> Self {
        RectNd { min, max }
    }

    pub fn min(&self) -> &[f64] {
        &self.min
    }

    pub fn max(&self) -> &[f64] {
        &self.max
    }

    pub fn dimension(&self) -> usize {
        self.min.len()
    }

    /// Fails with `InvalidRect` unless the rectangle has `expected` axes.
    pub fn require_dimension(&self, expected: usize) -> RTreeResult<()> {
        require_dimension(expected, self.dimension())
    }

    pub fn extent(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }

    pub fn centroid(&self, axis: usize) -> f64 {
        (self.min[axis] + self.max[axis]) / 2.0
    }

    pub fn intersects(&self, other: &RectNd) -> bool {
        self.min
            .iter()
            .zip(&self.max)
            .zip(other.min.iter().zip(&other.max))
            .all(|((a_min, a_max), (b_min, b_max))| a_min <= b_max && b_min <= a_max)
    }

    pub fn contains(&self, other: &RectNd) -> bool {
        self.min
            .iter()
            .zip(&self.max)
            .zip(other.min.iter().zip(&other.max))
            .all(|((a_min, a_max), (b_min, b_max))| a_min <= b_min && b_max <= a_max)
    }

    /// Smallest rectangle covering both.
    pub fn union(&self, other: &RectNd) -> RectNd {
        let mut merged = self.clone();
        merged.expand(other);
        merged
    }

    pub fn expand(&mut self, other: &RectNd) {
        for (a, b) in self.min.iter_mut().zip(&other.min) {
            *a = a.min(*b);
        }
        for (a, b) in self.max.iter_mut().zip(&other.max) {
            *a = a.max(*b);
        }
    }

    /// Union of every rectangle, `None` for an empty iterator.
    pub fn union_all<'a, I>(rects: I) -> Option<RectNd>
    where
        I: IntoIterator<Item = &'a RectNd>,
    {
        let mut iter = rects.into_iter();
        let mut merged = iter.next()?.clone();
        for rect in iter {
            merged.expand(rect);
        }
        Some(merged)
    }

    /// Product of the extents: area in 2D, volume in general. This is the
    /// cost every split and insertion heuristic minimises.
    pub fn volume(&self) -> f64 {
        (0..self.dimension())
            .map(|axis| self.extent(axis))
            .product::<f64>()
            .abs()
    }

    /// Sum of the edge lengths of the hyper-rectangle: `2^(d-1)` edges run
    /// parallel to each axis.
    pub fn perimeter(&self) -> f64 {
        let edges_per_axis = 2f64.powi(self.dimension() as i32 - 1);
        (0..self.dimension())
            .map(|axis| edges_per_axis * self.extent(axis))
            .sum()
    }

    /// Volume that would be added by growing `self` to cover `other`.
    pub fn enlargement(&self, other: &RectNd) -> f64 {
        self.union(other).volume() - self.volume()
    }

    /// Volume of the region covered by both, zero when disjoint.
    pub fn intersection_volume(&self, other: &RectNd) -> f64 {
        let mut volume = 1.0;
        for axis in 0..self.dimension().min(other.dimension()) {
            let lo = self.min[axis].max(other.min[axis]);
            let hi = self.max[axis].min(other.max[axis]);
            if hi < lo {
                return 0.0;
            }
            volume *= hi - lo;
        }
        volume
    }

    /// Shared volume relative to the volume of the union, in `[0, 1]`.
    pub fn overlap_ratio(&self, other: &RectNd) -> f64 {
        let union = self.union(other).volume();
        if union <= 0.0 {
            return if self.intersects(other) { 1.0 } else { 0.0 };
        }
        self.intersection_volume(other) / union
    }

    /// MINDIST: squared distance from `point` to the closest point of the
    /// rectangle, zero when the point lies inside.
    pub fn min_distance_squared(&self, point: &PointNd) -> f64 {
        self.min
            .iter()
            .zip(&self.max)
            .zip(point.coords())
            .map(|((lo, hi), p)| {
                let d = if p < lo {
                    lo - p
                } else if p > hi {
                    p - hi
                } else {
                    0.0
                };
                d * d
            })
            .sum()
    }

    /// Axis with the largest extent; the first one on ties.
    pub fn longest_axis(&self) -> usize {
        let mut best = 0;
        for axis in 1..self.dimension() {
            if self.extent(axis) > self.extent(best) {
                best = axis;
            }
        }
        best
    }
}

impl Display for RectNd {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?} - {:?}]", self.min, self.max)
    }
}

/// A leaf entry: a rectangle plus the payload reference it indexes.
///
/// Two entries are equal when their payload references are equal,
/// regardless of geometry. Removal and update rely on this.
#[derive(Debug, Clone)]
pub struct Entry {
    pub rect: RectNd,
    pub data: DataId,
}

impl Entry {
    pub fn new(rect: RectNd, data: impl Into<DataId>) -> Self {
        Entry {
            rect,
            data: data.into(),
        }
    }

    /// Entry for a point payload.
    pub fn point(coords: Vec<f64>, data: impl Into<DataId>) -> RTreeResult<Self> {
        let point = PointNd::new(coords);
        Ok(Entry::new(RectNd::from_point(&point)?, data))
    }
}

pub(crate) fn require_dimension(expected: usize, actual: usize) -> RTreeResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(RTreeError::InvalidRect(format!(
            "dimension {} does not match the index dimension {}",
            actual, expected
        )))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for Entry {}
