//! Piecewise-linear curves parameterized by arclength.
//!
//! Feature curves extracted from a surface are stored as [`Polyline`]s. Point
//! placement samples them at arclength steps, so the curve keeps a cumulative
//! length table for `O(log n)` evaluation.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::geometry::point::GeometryError;

/// An ordered sequence of points with cumulative arclength.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Point3<f64>>,
    cumulative: Vec<f64>,
}

impl Polyline {
    /// Builds a polyline through `points`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::EmptyPointSet`] when `points` is empty.
    pub fn new(points: Vec<Point3<f64>>) -> Result<Self, GeometryError> {
        if points.is_empty() {
            return Err(GeometryError::EmptyPointSet);
        }
        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for w in points.windows(2) {
            total += (w[1] - w[0]).norm();
            cumulative.push(total);
        }
        Ok(Self { points, cumulative })
    }

    #[must_use]
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// Total arclength.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Number of segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    /// Returns `true` if the first and last points coincide.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.points.len() > 2
            && self
                .points
                .first()
                .zip(self.points.last())
                .is_some_and(|(a, b)| (a - b).norm_squared() <= f64::EPSILON)
    }

    /// Segment index and local parameter in `[0, 1]` for arclength `s`
    /// (clamped to the curve).
    #[must_use]
    pub fn locate(&self, s: f64) -> (usize, f64) {
        let n = self.segment_count();
        if n == 0 {
            return (0, 0.0);
        }
        let s = s.clamp(0.0, self.length());
        let idx = self.cumulative.partition_point(|&c| c <= s).saturating_sub(1).min(n - 1);
        let seg = self.cumulative[idx + 1] - self.cumulative[idx];
        let t = if seg > 0.0 { (s - self.cumulative[idx]) / seg } else { 0.0 };
        (idx, t.clamp(0.0, 1.0))
    }

    /// Position at arclength `s`.
    #[must_use]
    pub fn point_at(&self, s: f64) -> Point3<f64> {
        if self.segment_count() == 0 {
            return self.points[0];
        }
        let (i, t) = self.locate(s);
        self.points[i] + (self.points[i + 1] - self.points[i]) * t
    }

    /// Unit tangent at arclength `s`, or the zero vector on a degenerate segment.
    #[must_use]
    pub fn tangent_at(&self, s: f64) -> Vector3<f64> {
        if self.segment_count() == 0 {
            return Vector3::zeros();
        }
        let (i, _) = self.locate(s);
        (self.points[i + 1] - self.points[i])
            .try_normalize(1e-300)
            .unwrap_or_else(Vector3::zeros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn l_shape() -> Polyline {
        Polyline::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_length_and_evaluation() {
        let p = l_shape();
        assert_relative_eq!(p.length(), 3.0);
        assert_relative_eq!(p.point_at(1.0), Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.point_at(2.5), Point3::new(2.0, 0.5, 0.0));
        assert_relative_eq!(p.point_at(10.0), Point3::new(2.0, 1.0, 0.0));
        assert_relative_eq!(p.tangent_at(0.5), Vector3::x());
        assert_relative_eq!(p.tangent_at(2.5), Vector3::y());
    }

    #[test]
    fn test_closed_detection() {
        assert!(!l_shape().is_closed());
        let loop_ = Polyline::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
        ])
        .unwrap();
        assert!(loop_.is_closed());
    }

    #[test]
    fn test_single_point() {
        let p = Polyline::new(vec![Point3::new(1.0, 2.0, 3.0)]).unwrap();
        assert_eq!(p.length(), 0.0);
        assert_eq!(p.point_at(5.0), Point3::new(1.0, 2.0, 3.0));
        assert!(Polyline::new(Vec::new()).is_err());
    }
}
