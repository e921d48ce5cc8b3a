//! Best-first triangle walk toward a target position.
//!
//! Starting from a hint triangle, neighbors are expanded in order of their
//! distance to the target until one contains the target's projection within
//! the allowed off-surface displacement. A visited set and a step cap bound
//! the work per query; boundary edges are never crossed.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use nalgebra::Point3;
use ordered_float::OrderedFloat;

use crate::core::collections::{FastHashSet, fast_hash_set_with_capacity};
use crate::geometry::query::{barycentric, closest_point_on_triangle};
use crate::surface::tri_mesh::SurfaceTriMesh;

/// Default expansion cap per query.
pub const DEFAULT_MAX_STEPS: usize = 512;

/// Slack on barycentric coordinates when testing containment.
const BARYCENTRIC_TOLERANCE: f64 = 1e-9;

/// Triangle reached by [`walk_to`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WalkHit {
    pub triangle: usize,
    /// Target projected onto the triangle's plane.
    pub point: Point3<f64>,
    /// Barycentric coordinates of `point` with respect to the triangle corners.
    pub barycentric: [f64; 3],
    /// Distance from the target to `point`.
    pub displacement: f64,
    /// Triangles expanded.
    pub steps: usize,
}

fn try_hit(mesh: &SurfaceTriMesh, t: usize, target: &Point3<f64>, max_displacement: f64) -> Option<(Point3<f64>, [f64; 3], f64)> {
    let [a, b, c] = mesh.triangle_points(t);
    let normal = mesh.triangle_normal(t)?;
    let offset = (target - a).dot(&normal);
    if offset.abs() > max_displacement {
        return None;
    }
    let projected = target - normal * offset;
    let bary = barycentric(&projected, &a, &b, &c)?;
    bary.iter()
        .all(|&x| x >= -BARYCENTRIC_TOLERANCE)
        .then_some((projected, bary, offset.abs()))
}

/// Walks from `start` to the triangle containing `target`.
///
/// Returns `None` when the cap is hit or the reachable region, bounded by
/// mesh boundaries, has no triangle within `max_displacement` of the target.
#[must_use]
pub fn walk_to(
    mesh: &SurfaceTriMesh,
    start: usize,
    target: &Point3<f64>,
    max_displacement: f64,
    max_steps: usize,
) -> Option<WalkHit> {
    if start >= mesh.number_of_triangles() {
        return None;
    }
    let distance = |t: usize| {
        let [a, b, c] = mesh.triangle_points(t);
        (closest_point_on_triangle(target, &a, &b, &c) - target).norm_squared()
    };

    let mut heap: BinaryHeap<Reverse<(OrderedFloat<f64>, usize)>> = BinaryHeap::new();
    let mut visited: FastHashSet<usize> = fast_hash_set_with_capacity(64);
    heap.push(Reverse((OrderedFloat(distance(start)), start)));
    visited.insert(start);

    let mut steps = 0;
    while let Some(Reverse((_, t))) = heap.pop() {
        steps += 1;
        if let Some((point, barycentric, displacement)) = try_hit(mesh, t, target, max_displacement) {
            return Some(WalkHit {
                triangle: t,
                point,
                barycentric,
                displacement,
                steps,
            });
        }
        if steps >= max_steps {
            tracing::trace!(start, steps, "triangle walk hit the step cap");
            return None;
        }
        for j in 0..3 {
            let Some(u) = mesh.neighbor(t, j) else {
                continue;
            };
            if visited.insert(u) {
                heap.push(Reverse((OrderedFloat(distance(u)), u)));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::primitives::icosphere;
    use approx::assert_relative_eq;

    #[test]
    fn test_walk_reaches_every_triangle_of_closed_mesh() {
        let mesh = icosphere(2);
        for t in 0..mesh.number_of_triangles() {
            let target = Point3::from(mesh.triangle_center(t).coords * 1.001);
            let hit = walk_to(&mesh, 0, &target, 0.1, DEFAULT_MAX_STEPS).unwrap();
            assert_eq!(hit.triangle, t);
            assert!(hit.steps <= mesh.number_of_triangles());
            assert!(hit.displacement < 0.01);
        }
    }

    #[test]
    fn test_walk_projects_onto_plane() {
        let mesh = SurfaceTriMesh::from_triangles(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            &[[0, 1, 2], [0, 2, 3]],
        )
        .unwrap();
        let hit = walk_to(&mesh, 0, &Point3::new(0.2, 0.7, 0.05), 0.1, 8).unwrap();
        assert_eq!(hit.triangle, 1);
        assert_relative_eq!(hit.point, Point3::new(0.2, 0.7, 0.0), epsilon = 1e-12);
        assert_relative_eq!(hit.barycentric.iter().sum::<f64>(), 1.0, epsilon = 1e-12);

        // Beyond the boundary.
        assert!(walk_to(&mesh, 0, &Point3::new(1.5, 0.5, 0.0), 0.1, 8).is_none());
        // Too far off the surface.
        assert!(walk_to(&mesh, 0, &Point3::new(0.2, 0.7, 0.5), 0.1, 8).is_none());
    }

    #[test]
    fn test_walk_respects_step_cap() {
        let mesh = icosphere(2);
        let far = Point3::from(-mesh.triangle_center(0).coords);
        assert!(walk_to(&mesh, 0, &far, 0.1, 2).is_none());
    }
}
