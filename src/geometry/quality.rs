//! Geometric quality measures for tetrahedral cells.
//!
//! These metrics drive refinement ordering and are used by tests to check
//! that generated cells are valid (non-inverted, not degenerate).
//!
//! # Quality Metrics
//!
//! - **Signed volume**: one sixth of [`orient3d`]. Positive for correctly
//!   oriented cells.
//! - **Radius-edge ratio**: circumradius divided by shortest edge. An
//!   equilateral tetrahedron scores `sqrt(6)/4 ≈ 0.612`; slivers and needles
//!   score much higher.
//! - **Radius ratio**: `3 * inradius / circumradius`, equal to 1 for the
//!   regular tetrahedron and approaching 0 for degenerate shapes.
//!
//! # References
//!
//! - Shewchuk, J.R. "What Is a Good Linear Element? Interpolation, Conditioning,
//!   Anisotropy, and Quality Measures" (2002)

use nalgebra::Point3;
use thiserror::Error;

use crate::geometry::predicates::{circumsphere, orient3d};

/// Errors that can occur during quality metric computation.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum QualityError {
    /// Cell is degenerate (zero or near-zero volume)
    #[error("Degenerate cell: volume {volume:e}")]
    DegenerateCell {
        /// Signed volume of the cell
        volume: f64,
    },
}

/// Signed volume of the tetrahedron `abcd`.
#[must_use]
pub fn signed_volume(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    orient3d(a, b, c, d) / 6.0
}

/// The six edge lengths of a tetrahedron.
#[must_use]
pub fn edge_lengths(points: &[Point3<f64>; 4]) -> [f64; 6] {
    const EDGES: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];
    EDGES.map(|(i, j)| (points[i] - points[j]).norm())
}

/// Length of the shortest edge.
#[must_use]
pub fn shortest_edge(points: &[Point3<f64>; 4]) -> f64 {
    edge_lengths(points).into_iter().fold(f64::INFINITY, f64::min)
}

/// Length of the longest edge.
#[must_use]
pub fn longest_edge(points: &[Point3<f64>; 4]) -> f64 {
    edge_lengths(points).into_iter().fold(0.0, f64::max)
}

/// Circumradius divided by the shortest edge.
///
/// # Errors
///
/// Returns [`QualityError::DegenerateCell`] when the cell has no circumsphere.
pub fn radius_edge_ratio(points: &[Point3<f64>; 4]) -> Result<f64, QualityError> {
    let [a, b, c, d] = points;
    let sphere = circumsphere(a, b, c, d).map_err(|_| QualityError::DegenerateCell {
        volume: signed_volume(a, b, c, d),
    })?;
    Ok(sphere.radius() / shortest_edge(points))
}

/// Normalized radius ratio `3 r_in / r_circ` in `[0, 1]`.
///
/// # Errors
///
/// Returns [`QualityError::DegenerateCell`] when the cell has no circumsphere.
///
/// # Examples
///
/// ```
/// use cfd_mesh::geometry::quality::radius_ratio;
/// use nalgebra::Point3;
///
/// let s = 1.0 / 2.0_f64.sqrt();
/// let regular = [
///     Point3::new(1.0, 1.0, 1.0) * s,
///     Point3::new(1.0, -1.0, -1.0) * s,
///     Point3::new(-1.0, 1.0, -1.0) * s,
///     Point3::new(-1.0, -1.0, 1.0) * s,
/// ];
/// assert!((radius_ratio(&regular).unwrap() - 1.0).abs() < 1e-9);
/// ```
pub fn radius_ratio(points: &[Point3<f64>; 4]) -> Result<f64, QualityError> {
    let [a, b, c, d] = points;
    let volume = signed_volume(a, b, c, d).abs();
    let sphere = circumsphere(a, b, c, d).map_err(|_| QualityError::DegenerateCell {
        volume: signed_volume(a, b, c, d),
    })?;
    let area = |p: &Point3<f64>, q: &Point3<f64>, r: &Point3<f64>| 0.5 * (q - p).cross(&(r - p)).norm();
    let surface = area(a, b, c) + area(a, b, d) + area(a, c, d) + area(b, c, d);
    if surface <= 0.0 {
        return Err(QualityError::DegenerateCell { volume });
    }
    let inradius = 3.0 * volume / surface;
    Ok(3.0 * inradius / sphere.radius())
}
