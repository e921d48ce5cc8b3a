//! Bounding volume hierarchy over the triangles of a surface mesh.
//!
//! Used by boundary recovery to find the closest surface point to a missing
//! face, and by the driver to classify volume cells as inside or outside the
//! input body.

use nalgebra::{Point3, Vector3};
use smallvec::SmallVec;

use crate::geometry::aabb::Aabb;
use crate::geometry::query::{closest_point_on_triangle, ray_aabb_intersect, ray_triangle_intersect};
use crate::surface::tri_mesh::SurfaceTriMesh;

/// Maximum triangles per leaf.
const MAX_LEAF_SIZE: usize = 8;

/// Ray directions for the inside test; skewed to avoid hitting edges of
/// axis-aligned meshes.
const INSIDE_RAYS: [[f64; 3]; 3] = [
    [0.577_215_66, 0.693_147_18, 0.434_294_48],
    [-0.618_033_99, 0.301_029_99, 0.725_682_72],
    [0.267_949_19, -0.785_398_16, -0.557_280_9],
];

/// BVH node: a leaf with triangle indices or an internal node with two children.
#[derive(Debug, Clone)]
enum BvhNode {
    Leaf {
        bbox: Aabb,
        triangles: SmallVec<[usize; MAX_LEAF_SIZE]>,
    },
    Internal {
        bbox: Aabb,
        left: Box<Self>,
        right: Box<Self>,
    },
}

impl BvhNode {
    const fn bbox(&self) -> &Aabb {
        match self {
            Self::Leaf { bbox, .. } | Self::Internal { bbox, .. } => bbox,
        }
    }
}

/// Closest-point result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoint {
    /// The point on the surface.
    pub point: Point3<f64>,
    /// Triangle containing it.
    pub triangle: usize,
    /// Squared distance from the query.
    pub distance_squared: f64,
}

/// Spatial index over a snapshot of a surface mesh.
#[derive(Debug, Clone)]
pub struct SurfaceBvh {
    root: Option<BvhNode>,
    triangles: Vec<[Point3<f64>; 3]>,
}

impl SurfaceBvh {
    /// Builds the hierarchy by median split along the longest axis.
    #[must_use]
    pub fn new(mesh: &SurfaceTriMesh) -> Self {
        let triangles: Vec<[Point3<f64>; 3]> =
            (0..mesh.number_of_triangles()).map(|t| mesh.triangle_points(t)).collect();
        let boxes: Vec<Aabb> = triangles.iter().map(|tri| Aabb::from_points(tri)).collect();
        let root = (!triangles.is_empty()).then(|| Self::build(&boxes, (0..boxes.len()).collect()));
        Self { root, triangles }
    }

    fn build(boxes: &[Aabb], mut indices: Vec<usize>) -> BvhNode {
        let bbox = indices.iter().fold(Aabb::empty(), |acc, &i| acc.union(&boxes[i]));
        if indices.len() <= MAX_LEAF_SIZE {
            return BvhNode::Leaf {
                bbox,
                triangles: indices.into_iter().collect(),
            };
        }
        let axis = bbox.longest_axis();
        indices.sort_by(|&a, &b| boxes[a].center()[axis].total_cmp(&boxes[b].center()[axis]));
        let right = indices.split_off(indices.len() / 2);
        BvhNode::Internal {
            bbox,
            left: Box::new(Self::build(boxes, indices)),
            right: Box::new(Self::build(boxes, right)),
        }
    }

    #[must_use]
    pub fn number_of_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Bounding box of the whole surface.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        self.root.as_ref().map_or_else(Aabb::empty, |r| *r.bbox())
    }

    /// Closest point on the surface to `query`, or `None` for an empty mesh.
    #[must_use]
    pub fn closest_point(&self, query: &Point3<f64>) -> Option<ClosestPoint> {
        let root = self.root.as_ref()?;
        let mut best: Option<ClosestPoint> = None;
        let mut stack: Vec<&BvhNode> = vec![root];
        while let Some(node) = stack.pop() {
            let bound = best.map_or(f64::INFINITY, |b| b.distance_squared);
            if node.bbox().distance_squared(query) >= bound {
                continue;
            }
            match node {
                BvhNode::Leaf { triangles, .. } => {
                    for &t in triangles {
                        let [a, b, c] = &self.triangles[t];
                        let point = closest_point_on_triangle(query, a, b, c);
                        let distance_squared = (point - query).norm_squared();
                        if best.is_none_or(|b| distance_squared < b.distance_squared) {
                            best = Some(ClosestPoint {
                                point,
                                triangle: t,
                                distance_squared,
                            });
                        }
                    }
                }
                BvhNode::Internal { left, right, .. } => {
                    // Visit the nearer child first.
                    let (near, far) = if left.bbox().distance_squared(query)
                        <= right.bbox().distance_squared(query)
                    {
                        (left, right)
                    } else {
                        (right, left)
                    };
                    stack.push(far);
                    stack.push(near);
                }
            }
        }
        best
    }

    /// Number of triangles crossed by the ray from `origin` along `dir`.
    #[must_use]
    pub fn count_crossings(&self, origin: &Point3<f64>, dir: &Vector3<f64>) -> usize {
        let Some(root) = self.root.as_ref() else {
            return 0;
        };
        let inv_dir = dir.map(|x| 1.0 / x);
        let mut count = 0;
        let mut stack: Vec<&BvhNode> = vec![root];
        while let Some(node) = stack.pop() {
            let bbox = node.bbox();
            if ray_aabb_intersect(origin, &inv_dir, &bbox.min, &bbox.max).is_none() {
                continue;
            }
            match node {
                BvhNode::Leaf { triangles, .. } => {
                    count += triangles
                        .iter()
                        .filter(|&&t| {
                            let [a, b, c] = &self.triangles[t];
                            ray_triangle_intersect(origin, dir, a, b, c).is_some()
                        })
                        .count();
                }
                BvhNode::Internal { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
        count
    }

    /// Returns `true` if `p` is inside the closed surface.
    ///
    /// Majority vote of ray-crossing parity over three skewed directions.
    #[must_use]
    pub fn is_inside(&self, p: &Point3<f64>) -> bool {
        if !self.aabb().contains_point(p) {
            return false;
        }
        let votes = INSIDE_RAYS
            .iter()
            .filter(|d| self.count_crossings(p, &Vector3::new(d[0], d[1], d[2])) % 2 == 1)
            .count();
        votes >= 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::primitives::{cube, icosphere};
    use approx::assert_relative_eq;

    #[test]
    fn test_closest_point_on_sphere() {
        let mesh = icosphere(3);
        let bvh = SurfaceBvh::new(&mesh);
        let hit = bvh.closest_point(&Point3::new(3.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(hit.point.coords.norm(), 1.0, epsilon = 0.02);
        assert!(hit.point.x > 0.95);

        // Brute force agrees.
        let query = Point3::new(0.3, -2.0, 0.7);
        let best = (0..mesh.number_of_triangles())
            .map(|t| {
                let [a, b, c] = mesh.triangle_points(t);
                (closest_point_on_triangle(&query, &a, &b, &c) - query).norm_squared()
            })
            .fold(f64::INFINITY, f64::min);
        assert_relative_eq!(bvh.closest_point(&query).unwrap().distance_squared, best);
    }

    #[test]
    fn test_inside_cube() {
        let bvh = SurfaceBvh::new(&cube(3));
        assert!(bvh.is_inside(&Point3::new(0.1, 0.2, -0.3)));
        assert!(bvh.is_inside(&Point3::origin()));
        assert!(!bvh.is_inside(&Point3::new(0.6, 0.0, 0.0)));
        assert!(!bvh.is_inside(&Point3::new(2.0, 2.0, 2.0)));
    }

    #[test]
    fn test_empty_mesh() {
        let bvh = SurfaceBvh::new(&SurfaceTriMesh::default());
        assert!(bvh.closest_point(&Point3::origin()).is_none());
        assert!(!bvh.is_inside(&Point3::origin()));
    }
}
