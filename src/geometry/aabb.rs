//! Axis-aligned bounding boxes.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box given by its minimum and maximum corners.
///
/// An empty box has `min > max` on every axis; expanding it by a point
/// yields the degenerate box around that point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Point3<f64>,
    /// Maximum corner.
    pub max: Point3<f64>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// Creates a box from explicit corners.
    #[must_use]
    pub const fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Creates a box centered at `center` extending `half_extent` along each axis.
    #[must_use]
    pub fn from_center_half_extent(center: Point3<f64>, half_extent: Vector3<f64>) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    /// The empty box, neutral for [`Aabb::expand`].
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Smallest box containing every point.
    #[must_use]
    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a Point3<f64>>,
    {
        let mut aabb = Self::empty();
        for p in points {
            aabb.expand(p);
        }
        aabb
    }

    /// Returns `true` if no point has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grows the box to contain `p`.
    pub fn expand(&mut self, p: &Point3<f64>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Smallest box containing both boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Box grown by `margin` on every side.
    #[must_use]
    pub fn padded(&self, margin: f64) -> Self {
        let m = Vector3::repeat(margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    #[must_use]
    pub fn extents(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Half the length of the box diagonal.
    #[must_use]
    pub fn half_diagonal(&self) -> f64 {
        0.5 * self.extents().norm()
    }

    /// Closed containment test.
    #[must_use]
    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// Returns `true` if `other` lies entirely inside `self` (boundaries included).
    #[must_use]
    pub fn contains_aabb(&self, other: &Self) -> bool {
        !other.is_empty() && self.contains_point(&other.min) && self.contains_point(&other.max)
    }

    /// Returns `true` if the boxes overlap (touching counts).
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && other.min[i] <= self.max[i])
    }

    /// Squared distance from `p` to the box; zero inside.
    #[must_use]
    pub fn distance_squared(&self, p: &Point3<f64>) -> f64 {
        let mut d = 0.0;
        for i in 0..3 {
            let v = if p[i] < self.min[i] {
                self.min[i] - p[i]
            } else if p[i] > self.max[i] {
                p[i] - self.max[i]
            } else {
                0.0
            };
            d += v * v;
        }
        d
    }

    /// The eight corners, ordered by the bit pattern `(x, y, z)` of the index.
    #[must_use]
    pub fn corners(&self) -> [Point3<f64>; 8] {
        std::array::from_fn(|i| {
            Point3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        })
    }

    /// Index of the axis with the largest extent.
    #[must_use]
    pub fn longest_axis(&self) -> usize {
        let e = self.extents();
        if e.x >= e.y && e.x >= e.z {
            0
        } else if e.y >= e.z {
            1
        } else {
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_box_expands_to_point() {
        let mut b = Aabb::empty();
        assert!(b.is_empty());
        b.expand(&Point3::new(1.0, 2.0, 3.0));
        assert!(!b.is_empty());
        assert_eq!(b.min, b.max);
    }

    #[test]
    fn test_contains_aabb_partial_overlap() {
        let domain = Aabb::from_center_half_extent(Point3::origin(), Vector3::repeat(10.0));
        let inside = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let straddling = Aabb::new(Point3::new(9.0, 0.0, 0.0), Point3::new(11.0, 1.0, 1.0));
        assert!(domain.contains_aabb(&inside));
        assert!(!domain.contains_aabb(&straddling));
        assert!(domain.intersects(&straddling));
    }

    #[test]
    fn test_corners_cover_extremes() {
        let b = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 2.0, 3.0));
        let corners = b.corners();
        assert_eq!(corners[0], b.min);
        assert_eq!(corners[7], b.max);
        assert_eq!(Aabb::from_points(&corners), b);
    }

    #[test]
    fn test_distance_squared_outside() {
        let b = Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        assert_eq!(b.distance_squared(&Point3::new(0.5, 0.5, 0.5)), 0.0);
        assert!((b.distance_squared(&Point3::new(3.0, 0.5, 0.5)) - 4.0).abs() < 1e-12);
    }
}
