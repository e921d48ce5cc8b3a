//! Orientation and in-sphere predicates for tetrahedra.
//!
//! # Sign convention
//!
//! [`orient3d`] returns `((b - a) × (c - a)) · (d - a)`: six times the signed
//! volume of the tetrahedron `abcd`. It is positive when `d` lies on the side
//! of the plane `abc` that the right-hand normal of `abc` points to. Every live
//! cell of the volume mesh is stored with positive orientation.
//!
//! [`insphere`] expects a positively oriented `abcd` and reports whether `e`
//! lies inside, on, or outside the circumsphere.
//!
//! # Near-degenerate input
//!
//! Both determinants are evaluated in floating point together with their
//! permanent (the same expression with every product replaced by its absolute
//! value). A result whose magnitude falls below a relative error bound of the
//! permanent is classified as [`Orientation::DEGENERATE`] or
//! [`InSphere::BOUNDARY`]. Callers resolve these ties with fixed, documented
//! rules so that identical input order always produces identical meshes.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::geometry::point::GeometryError;

/// Relative error bound applied to the orientation permanent.
pub const ORIENT3D_TOLERANCE: f64 = 1e-12;

/// Relative error bound applied to the in-sphere permanent.
pub const INSPHERE_TOLERANCE: f64 = 1e-11;

/// Represents the position of a point relative to a circumsphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InSphere {
    /// The point is outside the circumsphere
    OUTSIDE,
    /// The point is on the boundary of the circumsphere (within numerical tolerance)
    BOUNDARY,
    /// The point is inside the circumsphere
    INSIDE,
}

impl std::fmt::Display for InSphere {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OUTSIDE => write!(f, "OUTSIDE"),
            Self::BOUNDARY => write!(f, "BOUNDARY"),
            Self::INSIDE => write!(f, "INSIDE"),
        }
    }
}

/// Represents the orientation of a tetrahedron.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// The tetrahedron has negative orientation (determinant < 0)
    NEGATIVE,
    /// The tetrahedron is degenerate (determinant ≈ 0)
    DEGENERATE,
    /// The tetrahedron has positive orientation (determinant > 0)
    POSITIVE,
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NEGATIVE => write!(f, "NEGATIVE"),
            Self::DEGENERATE => write!(f, "DEGENERATE"),
            Self::POSITIVE => write!(f, "POSITIVE"),
        }
    }
}

/// Raw orientation determinant together with its permanent.
#[must_use]
fn orient3d_with_permanent(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    d: &Point3<f64>,
) -> (f64, f64) {
    let ab = b - a;
    let ac = c - a;
    let ad = d - a;

    let m0 = ac.y * ad.z - ac.z * ad.y;
    let m1 = ac.x * ad.z - ac.z * ad.x;
    let m2 = ac.x * ad.y - ac.y * ad.x;
    let det = ab.x * m0 - ab.y * m1 + ab.z * m2;

    let p0 = (ac.y * ad.z).abs() + (ac.z * ad.y).abs();
    let p1 = (ac.x * ad.z).abs() + (ac.z * ad.x).abs();
    let p2 = (ac.x * ad.y).abs() + (ac.y * ad.x).abs();
    let permanent = ab.x.abs() * p0 + ab.y.abs() * p1 + ab.z.abs() * p2;

    (det, permanent)
}

/// Six times the signed volume of `abcd`.
///
/// # Examples
///
/// ```
/// use cfd_mesh::geometry::predicates::orient3d;
/// use nalgebra::Point3;
///
/// let det = orient3d(
///     &Point3::new(0.0, 0.0, 0.0),
///     &Point3::new(1.0, 0.0, 0.0),
///     &Point3::new(0.0, 1.0, 0.0),
///     &Point3::new(0.0, 0.0, 1.0),
/// );
/// assert!((det - 1.0).abs() < 1e-12);
/// ```
#[must_use]
pub fn orient3d(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    orient3d_with_permanent(a, b, c, d).0
}

/// Filtered orientation of `abcd`.
///
/// # Examples
///
/// ```
/// use cfd_mesh::geometry::predicates::{orientation, Orientation};
/// use nalgebra::Point3;
///
/// let a = Point3::new(0.0, 0.0, 0.0);
/// let b = Point3::new(1.0, 0.0, 0.0);
/// let c = Point3::new(0.0, 1.0, 0.0);
/// assert_eq!(orientation(&a, &b, &c, &Point3::new(0.0, 0.0, 1.0)), Orientation::POSITIVE);
/// assert_eq!(orientation(&a, &c, &b, &Point3::new(0.0, 0.0, 1.0)), Orientation::NEGATIVE);
/// assert_eq!(orientation(&a, &b, &c, &Point3::new(0.3, 0.3, 0.0)), Orientation::DEGENERATE);
/// ```
#[must_use]
pub fn orientation(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    d: &Point3<f64>,
) -> Orientation {
    let (det, permanent) = orient3d_with_permanent(a, b, c, d);
    let bound = ORIENT3D_TOLERANCE * permanent;
    if det > bound {
        Orientation::POSITIVE
    } else if det < -bound {
        Orientation::NEGATIVE
    } else {
        Orientation::DEGENERATE
    }
}

/// Lifted in-sphere determinant and permanent; positive means inside for a
/// positively oriented `abcd`.
#[must_use]
#[expect(clippy::many_single_char_names)]
fn insphere_with_permanent(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    d: &Point3<f64>,
    e: &Point3<f64>,
) -> (f64, f64) {
    let ae = a - e;
    let be = b - e;
    let ce = c - e;
    let de = d - e;

    let ab = ae.x * be.y - be.x * ae.y;
    let bc = be.x * ce.y - ce.x * be.y;
    let cd = ce.x * de.y - de.x * ce.y;
    let da = de.x * ae.y - ae.x * de.y;
    let ac = ae.x * ce.y - ce.x * ae.y;
    let bd = be.x * de.y - de.x * be.y;

    let abc = ae.z * bc - be.z * ac + ce.z * ab;
    let bcd = be.z * cd - ce.z * bd + de.z * bc;
    let cda = ce.z * da + de.z * ac + ae.z * cd;
    let dab = de.z * ab + ae.z * bd + be.z * da;

    let la = ae.norm_squared();
    let lb = be.norm_squared();
    let lc = ce.norm_squared();
    let ld = de.norm_squared();

    let det = (ld * abc - lc * dab) + (lb * cda - la * bcd);

    let pab = (ae.x * be.y).abs() + (be.x * ae.y).abs();
    let pbc = (be.x * ce.y).abs() + (ce.x * be.y).abs();
    let pcd = (ce.x * de.y).abs() + (de.x * ce.y).abs();
    let pda = (de.x * ae.y).abs() + (ae.x * de.y).abs();
    let pac = (ae.x * ce.y).abs() + (ce.x * ae.y).abs();
    let pbd = (be.x * de.y).abs() + (de.x * be.y).abs();

    let pabc = ae.z.abs() * pbc + be.z.abs() * pac + ce.z.abs() * pab;
    let pbcd = be.z.abs() * pcd + ce.z.abs() * pbd + de.z.abs() * pbc;
    let pcda = ce.z.abs() * pda + de.z.abs() * pac + ae.z.abs() * pcd;
    let pdab = de.z.abs() * pab + ae.z.abs() * pbd + be.z.abs() * pda;

    let permanent = ld * pabc + lc * pdab + lb * pcda + la * pbcd;

    // The lifted determinant is negative for inside points when abcd has
    // positive orient3d orientation.
    (-det, permanent)
}

/// Filtered in-sphere test of `e` against the circumsphere of the positively
/// oriented tetrahedron `abcd`.
///
/// # Examples
///
/// ```
/// use cfd_mesh::geometry::predicates::{insphere, InSphere};
/// use nalgebra::Point3;
///
/// let a = Point3::new(0.0, 0.0, 0.0);
/// let b = Point3::new(1.0, 0.0, 0.0);
/// let c = Point3::new(0.0, 1.0, 0.0);
/// let d = Point3::new(0.0, 0.0, 1.0);
/// assert_eq!(insphere(&a, &b, &c, &d, &Point3::new(0.25, 0.25, 0.25)), InSphere::INSIDE);
/// assert_eq!(insphere(&a, &b, &c, &d, &Point3::new(1.0, 1.0, 1.0)), InSphere::BOUNDARY);
/// assert_eq!(insphere(&a, &b, &c, &d, &Point3::new(3.0, 3.0, 3.0)), InSphere::OUTSIDE);
/// ```
#[must_use]
pub fn insphere(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    d: &Point3<f64>,
    e: &Point3<f64>,
) -> InSphere {
    let (det, permanent) = insphere_with_permanent(a, b, c, d, e);
    let bound = INSPHERE_TOLERANCE * permanent;
    if det > bound {
        InSphere::INSIDE
    } else if det < -bound {
        InSphere::OUTSIDE
    } else {
        InSphere::BOUNDARY
    }
}

/// A sphere stored as center and squared radius.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    /// Sphere center.
    pub center: Point3<f64>,
    /// Squared radius.
    pub radius_squared: f64,
}

impl Sphere {
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius_squared.sqrt()
    }

    /// Returns `true` if `p` is strictly inside, ignoring numerical filtering.
    #[must_use]
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (p - self.center).norm_squared() < self.radius_squared
    }
}

/// Circumsphere of the tetrahedron `abcd`.
///
/// # Errors
///
/// Returns [`GeometryError::DegenerateTetrahedron`] when the four points are
/// (numerically) coplanar.
pub fn circumsphere(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    d: &Point3<f64>,
) -> Result<Sphere, GeometryError> {
    let (det, permanent) = orient3d_with_permanent(a, b, c, d);
    if det.abs() <= ORIENT3D_TOLERANCE * permanent || det == 0.0 {
        return Err(GeometryError::DegenerateTetrahedron { determinant: det });
    }
    let ab: Vector3<f64> = b - a;
    let ac: Vector3<f64> = c - a;
    let ad: Vector3<f64> = d - a;
    let offset = (ac.cross(&ad) * ab.norm_squared()
        + ad.cross(&ab) * ac.norm_squared()
        + ab.cross(&ac) * ad.norm_squared())
        / (2.0 * det);
    Ok(Sphere {
        center: a + offset,
        radius_squared: offset.norm_squared(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_tet() -> [Point3<f64>; 4] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ]
    }

    #[test]
    fn test_orientation_flips_with_swap() {
        let [a, b, c, d] = unit_tet();
        assert_eq!(orientation(&a, &b, &c, &d), Orientation::POSITIVE);
        assert_eq!(orientation(&b, &a, &c, &d), Orientation::NEGATIVE);
        assert_relative_eq!(orient3d(&a, &b, &c, &d), -orient3d(&b, &a, &c, &d));
    }

    #[test]
    fn test_circumsphere_of_unit_tet() {
        let [a, b, c, d] = unit_tet();
        let s = circumsphere(&a, &b, &c, &d).unwrap();
        assert_relative_eq!(s.center, Point3::new(0.5, 0.5, 0.5), epsilon = 1e-12);
        assert_relative_eq!(s.radius_squared, 0.75, epsilon = 1e-12);
        for p in [a, b, c, d] {
            assert_relative_eq!((p - s.center).norm_squared(), 0.75, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_circumsphere_degenerate() {
        let [a, b, c, _] = unit_tet();
        let flat = Point3::new(0.5, 0.5, 0.0);
        assert!(matches!(
            circumsphere(&a, &b, &c, &flat),
            Err(GeometryError::DegenerateTetrahedron { .. })
        ));
    }

    #[test]
    fn test_insphere_agrees_with_circumsphere() {
        let [a, b, c, d] = unit_tet();
        let s = circumsphere(&a, &b, &c, &d).unwrap();
        for p in [
            Point3::new(0.1, 0.2, 0.3),
            Point3::new(1.2, 0.9, 0.1),
            Point3::new(-0.5, 0.5, 0.5),
            Point3::new(0.9, 0.9, 0.9),
        ] {
            let expected = if s.contains(&p) {
                InSphere::INSIDE
            } else {
                InSphere::OUTSIDE
            };
            assert_eq!(insphere(&a, &b, &c, &d, &p), expected, "point {p:?}");
        }
    }

    #[test]
    fn test_insphere_cospherical_is_boundary() {
        let [a, b, c, d] = unit_tet();
        // (1, 1, 0) lies on the sphere centered at (0.5, 0.5, 0.5) with r^2 = 0.75.
        assert_eq!(
            insphere(&a, &b, &c, &d, &Point3::new(1.0, 1.0, 0.0)),
            InSphere::BOUNDARY
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Orientation::DEGENERATE.to_string(), "DEGENERATE");
        assert_eq!(InSphere::BOUNDARY.to_string(), "BOUNDARY");
    }
}
