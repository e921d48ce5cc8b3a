//! Point-triangle and ray-triangle queries.

use nalgebra::{Point3, Vector3};

/// Closest point on the triangle `(v0, v1, v2)` to `point`.
///
/// Voronoi-region classification from Ericson, *Real-Time Collision
/// Detection*, section 5.1.5.
#[must_use]
pub fn closest_point_on_triangle(
    point: &Point3<f64>,
    v0: &Point3<f64>,
    v1: &Point3<f64>,
    v2: &Point3<f64>,
) -> Point3<f64> {
    let ab = v1 - v0;
    let ac = v2 - v0;
    let ap = point - v0;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *v0;
    }

    let bp = point - v1;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *v1;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return v0 + ab * (d1 / (d1 - d3));
    }

    let cp = point - v2;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *v2;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return v0 + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return v1 + (v2 - v1) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    v0 + ab * (vb * denom) + ac * (vc * denom)
}

/// Barycentric coordinates of `p` projected onto the plane of `(a, b, c)`.
///
/// Returns `None` for a degenerate triangle.
#[must_use]
pub fn barycentric(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Option<[f64; 3]> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() <= f64::EPSILON * d00 * d11 {
        return None;
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Some([1.0 - v - w, v, w])
}

/// Möller–Trumbore ray-triangle intersection.
///
/// Returns the ray parameter of the hit, or `None` when the ray misses, is
/// parallel to the triangle, or the hit lies behind the origin.
#[must_use]
pub fn ray_triangle_intersect(
    origin: &Point3<f64>,
    dir: &Vector3<f64>,
    v0: &Point3<f64>,
    v1: &Point3<f64>,
    v2: &Point3<f64>,
) -> Option<f64> {
    const EPSILON: f64 = 1e-12;

    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = dir.cross(&edge2);
    let a = edge1.dot(&h);
    if a.abs() < EPSILON {
        return None;
    }

    let f = 1.0 / a;
    let s = origin - v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&edge1);
    let v = f * dir.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(&q);
    (t > EPSILON).then_some(t)
}

/// Slab test of a ray against an axis-aligned box; returns the entry parameter.
#[must_use]
pub fn ray_aabb_intersect(
    origin: &Point3<f64>,
    inv_dir: &Vector3<f64>,
    min: &Point3<f64>,
    max: &Point3<f64>,
) -> Option<f64> {
    let mut t_min = 0.0_f64;
    let mut t_max = f64::INFINITY;
    for i in 0..3 {
        let t1 = (min[i] - origin[i]) * inv_dir[i];
        let t2 = (max[i] - origin[i]) * inv_dir[i];
        let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
        // NaN from 0 * inf leaves the bounds untouched.
        t_min = t_min.max(lo);
        t_max = t_max.min(hi);
    }
    (t_min <= t_max).then_some(t_min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tri() -> [Point3<f64>; 3] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_closest_point_regions() {
        let [a, b, c] = tri();
        assert_relative_eq!(
            closest_point_on_triangle(&Point3::new(0.2, 0.2, 1.0), &a, &b, &c),
            Point3::new(0.2, 0.2, 0.0)
        );
        assert_relative_eq!(
            closest_point_on_triangle(&Point3::new(-1.0, -1.0, 0.0), &a, &b, &c),
            a
        );
        assert_relative_eq!(
            closest_point_on_triangle(&Point3::new(0.5, -1.0, 0.0), &a, &b, &c),
            Point3::new(0.5, 0.0, 0.0)
        );
        assert_relative_eq!(
            closest_point_on_triangle(&Point3::new(1.0, 1.0, 0.0), &a, &b, &c),
            Point3::new(0.5, 0.5, 0.0)
        );
    }

    #[test]
    fn test_barycentric_of_vertices() {
        let [a, b, c] = tri();
        let w = barycentric(&Point3::new(0.25, 0.5, 3.0), &a, &b, &c).unwrap();
        assert_relative_eq!(w[0], 0.25);
        assert_relative_eq!(w[1], 0.25);
        assert_relative_eq!(w[2], 0.5);
    }

    #[test]
    fn test_ray_hits_and_misses() {
        let [a, b, c] = tri();
        let down = Vector3::new(0.0, 0.0, -1.0);
        let hit = ray_triangle_intersect(&Point3::new(0.2, 0.2, 2.0), &down, &a, &b, &c);
        assert_relative_eq!(hit.unwrap(), 2.0);
        assert!(ray_triangle_intersect(&Point3::new(0.9, 0.9, 2.0), &down, &a, &b, &c).is_none());
        assert!(ray_triangle_intersect(&Point3::new(0.2, 0.2, -2.0), &down, &a, &b, &c).is_none());
    }

    #[test]
    fn test_ray_aabb() {
        let dir = Vector3::new(1.0, 0.0, 0.0);
        let inv = dir.map(|v| 1.0 / v);
        let min = Point3::new(1.0, -1.0, -1.0);
        let max = Point3::new(2.0, 1.0, 1.0);
        assert_relative_eq!(ray_aabb_intersect(&Point3::origin(), &inv, &min, &max).unwrap(), 1.0);
        assert!(ray_aabb_intersect(&Point3::new(0.0, 5.0, 0.0), &inv, &min, &max).is_none());
    }
}
