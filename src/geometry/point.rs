//! Point and vector helpers over `nalgebra` 3D types.
//!
//! The mesh generator works exclusively in three dimensions with `f64`
//! coordinates, so positions are plain [`Point3<f64>`] and directions are
//! [`Vector3<f64>`]. This module collects the small vector operations that
//! the surface and volume algorithms share.

use nalgebra::{Point3, Vector3};
use num_traits::cast;
use thiserror::Error;

/// Errors raised by basic geometric constructions.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum GeometryError {
    /// A coordinate was NaN or infinite.
    #[error("Non-finite coordinate {value} at axis {axis}")]
    NonFiniteCoordinate {
        /// Axis index (0 = x, 1 = y, 2 = z).
        axis: usize,
        /// The offending value.
        value: f64,
    },
    /// A triangle has (numerically) zero area.
    #[error("Degenerate triangle: area {area:e}")]
    DegenerateTriangle {
        /// Computed area.
        area: f64,
    },
    /// A tetrahedron has (numerically) zero volume.
    #[error("Degenerate tetrahedron: orientation determinant {determinant:e}")]
    DegenerateTetrahedron {
        /// Computed orientation determinant.
        determinant: f64,
    },
    /// An empty point set was supplied where at least one point is required.
    #[error("Empty point set")]
    EmptyPointSet,
}

/// Checks that every coordinate of `p` is finite.
///
/// # Errors
///
/// Returns [`GeometryError::NonFiniteCoordinate`] for the first NaN or infinite axis.
pub fn validate_point(p: &Point3<f64>) -> Result<(), GeometryError> {
    for (axis, &value) in p.coords.iter().enumerate() {
        if !value.is_finite() {
            return Err(GeometryError::NonFiniteCoordinate { axis, value });
        }
    }
    Ok(())
}

/// Converts a count into `f64` for averaging.
///
/// Counts in this crate are bounded by mesh sizes, far below the 2^53 range
/// where the conversion would lose precision.
#[must_use]
pub fn count_to_f64(n: usize) -> f64 {
    cast::<usize, f64>(n).unwrap_or(f64::MAX)
}

/// Unit normal of the triangle `(a, b, c)` following the right-hand rule,
/// or `None` when the triangle is degenerate.
///
/// # Examples
///
/// ```
/// use cfd_mesh::geometry::point::triangle_normal;
/// use nalgebra::Point3;
///
/// let n = triangle_normal(
///     &Point3::new(0.0, 0.0, 0.0),
///     &Point3::new(1.0, 0.0, 0.0),
///     &Point3::new(0.0, 1.0, 0.0),
/// )
/// .unwrap();
/// assert!((n.z - 1.0).abs() < 1e-12);
/// ```
#[must_use]
pub fn triangle_normal(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Option<Vector3<f64>> {
    let n = (b - a).cross(&(c - a));
    let len = n.norm();
    let scale = (b - a).norm_squared().max((c - a).norm_squared());
    if len == 0.0 || len <= 1e-14 * scale {
        return None;
    }
    Some(n / len)
}

/// Area of the triangle `(a, b, c)`.
#[must_use]
pub fn triangle_area(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    0.5 * (b - a).cross(&(c - a)).norm()
}

/// Arithmetic mean of a set of points.
///
/// # Errors
///
/// Returns [`GeometryError::EmptyPointSet`] when `points` is empty.
pub fn centroid<'a, I>(points: I) -> Result<Point3<f64>, GeometryError>
where
    I: IntoIterator<Item = &'a Point3<f64>>,
{
    let mut sum = Vector3::zeros();
    let mut n = 0usize;
    for p in points {
        sum += p.coords;
        n += 1;
    }
    if n == 0 {
        return Err(GeometryError::EmptyPointSet);
    }
    Ok(Point3::from(sum / count_to_f64(n)))
}

/// Removes the component of `v` along the unit vector `normal`.
#[must_use]
pub fn project_onto_plane(v: &Vector3<f64>, normal: &Vector3<f64>) -> Vector3<f64> {
    v - normal * v.dot(normal)
}

/// Returns some unit vector perpendicular to `v`.
///
/// The axis least aligned with `v` is crossed with it, which keeps the result
/// well conditioned for any non-zero input.
#[must_use]
pub fn any_perpendicular(v: &Vector3<f64>) -> Vector3<f64> {
    let axis = if v.x.abs() <= v.y.abs() && v.x.abs() <= v.z.abs() {
        Vector3::x()
    } else if v.y.abs() <= v.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };
    let p = v.cross(&axis);
    let len = p.norm();
    if len == 0.0 { Vector3::x() } else { p / len }
}

/// Normalizes `v`, returning `None` for (near) zero vectors.
#[must_use]
pub fn try_normalize(v: &Vector3<f64>) -> Option<Vector3<f64>> {
    v.try_normalize(1e-300)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_triangle_normal_degenerate_returns_none() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 1.0, 1.0);
        let c = Point3::new(2.0, 2.0, 2.0);
        assert!(triangle_normal(&a, &b, &c).is_none());
    }

    #[test]
    fn test_centroid_of_unit_square() {
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let c = centroid(&pts).unwrap();
        assert_relative_eq!(c, Point3::new(0.5, 0.5, 0.0));
        assert_eq!(centroid(&[]), Err(GeometryError::EmptyPointSet));
    }

    #[test]
    fn test_any_perpendicular_is_orthogonal() {
        for v in [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.3, -2.0, 0.1),
            Vector3::new(0.0, 0.0, -5.0),
        ] {
            let p = any_perpendicular(&v);
            assert_relative_eq!(p.norm(), 1.0, epsilon = 1e-12);
            assert!(p.dot(&v).abs() < 1e-12);
        }
    }

    #[test]
    fn test_validate_point_rejects_nan() {
        let err = validate_point(&Point3::new(0.0, f64::NAN, 0.0)).unwrap_err();
        assert!(matches!(err, GeometryError::NonFiniteCoordinate { axis: 1, .. }));
    }
}
