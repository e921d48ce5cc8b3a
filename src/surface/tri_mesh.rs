//! Indexed triangle mesh with half-edge twin links.
//!
//! # Edge numbering
//!
//! Triangle `t` owns the three half-edges `3t`, `3t + 1`, `3t + 2`. Half-edge
//! `3t + j` runs from corner `j` to corner `(j + 1) % 3`. Each half-edge stores
//! its twin (the opposite half-edge in the adjacent triangle), or `None` on an
//! open boundary. Twin links are always mutual.
//!
//! The mesh is mutated in place by [`SurfaceTriMesh::split_triangle`] (one
//! triangle becomes three) and [`SurfaceTriMesh::split_edge`] (each incident
//! triangle becomes two). Both keep the twin links consistent.

use nalgebra::{Point3, Vector3};
use smallvec::SmallVec;
use thiserror::Error;

use crate::core::collections::{FastHashMap, SmallBuffer, fast_hash_map_with_capacity};
use crate::geometry::aabb::Aabb;
use crate::geometry::point::{triangle_area, triangle_normal};

/// Errors raised when building or editing a surface mesh.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum SurfaceMeshError {
    /// A directed edge is used by more than one triangle.
    #[error("Edge ({from}, {to}) is used by more than one triangle")]
    NonManifoldEdge {
        /// Tail vertex.
        from: usize,
        /// Tip vertex.
        to: usize,
    },
    /// A vertex, triangle or edge index is out of range.
    #[error("Index {index} out of range (len {len})")]
    InvalidIndex {
        /// The offending index.
        index: usize,
        /// Size of the indexed collection.
        len: usize,
    },
    /// A triangle repeats a vertex.
    #[error("Triangle {triangle} repeats a vertex")]
    DegenerateTriangle {
        /// The triangle.
        triangle: usize,
    },
    /// A twin link is not mutual or joins non-opposite edges.
    #[error("Edge {edge} has an inconsistent twin")]
    TwinMismatch {
        /// The edge.
        edge: usize,
    },
}

/// Result of a split: the new vertex and, for every triangle that was split,
/// the original triangle index paired with the triangle created beside it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitResult {
    /// Index of the inserted vertex.
    pub vertex: usize,
    /// `(parent, new)` triangle pairs.
    pub triangles: SmallBuffer<(usize, usize), 2>,
}

/// Indexed triangle mesh with twin links.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SurfaceTriMesh {
    positions: Vec<Point3<f64>>,
    indices: Vec<usize>,
    twins: Vec<Option<usize>>,
}

/// Triangle that owns half-edge `e`.
#[must_use]
pub const fn edge_triangle(e: usize) -> usize {
    e / 3
}

/// Next half-edge around the same triangle.
#[must_use]
pub const fn next_edge(e: usize) -> usize {
    e - e % 3 + (e + 1) % 3
}

/// Previous half-edge around the same triangle.
#[must_use]
pub const fn prev_edge(e: usize) -> usize {
    e - e % 3 + (e + 2) % 3
}

impl SurfaceTriMesh {
    /// Builds a mesh and links twins by matching opposite directed edges.
    ///
    /// # Errors
    ///
    /// Fails on out-of-range indices, repeated corners, or a directed edge
    /// used twice (non-manifold or inconsistently oriented input).
    pub fn from_triangles(
        positions: Vec<Point3<f64>>,
        triangles: &[[usize; 3]],
    ) -> Result<Self, SurfaceMeshError> {
        let mut indices = Vec::with_capacity(triangles.len() * 3);
        for (t, tri) in triangles.iter().enumerate() {
            for &v in tri {
                if v >= positions.len() {
                    return Err(SurfaceMeshError::InvalidIndex {
                        index: v,
                        len: positions.len(),
                    });
                }
            }
            if tri[0] == tri[1] || tri[1] == tri[2] || tri[2] == tri[0] {
                return Err(SurfaceMeshError::DegenerateTriangle { triangle: t });
            }
            indices.extend_from_slice(tri);
        }

        let mut directed: FastHashMap<(usize, usize), usize> = fast_hash_map_with_capacity(indices.len());
        for e in 0..indices.len() {
            let key = (indices[e], indices[next_edge(e)]);
            if directed.insert(key, e).is_some() {
                return Err(SurfaceMeshError::NonManifoldEdge {
                    from: key.0,
                    to: key.1,
                });
            }
        }
        let twins = (0..indices.len())
            .map(|e| directed.get(&(indices[next_edge(e)], indices[e])).copied())
            .collect();

        Ok(Self {
            positions,
            indices,
            twins,
        })
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    #[must_use]
    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    #[must_use]
    pub fn position(&self, v: usize) -> Point3<f64> {
        self.positions[v]
    }

    #[must_use]
    pub fn number_of_vertices(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn number_of_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    #[must_use]
    pub fn number_of_edges(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Corner vertex indices of triangle `t`.
    #[must_use]
    pub fn triangle(&self, t: usize) -> [usize; 3] {
        [self.indices[3 * t], self.indices[3 * t + 1], self.indices[3 * t + 2]]
    }

    pub fn triangles(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        (0..self.number_of_triangles()).map(|t| self.triangle(t))
    }

    #[must_use]
    pub fn triangle_points(&self, t: usize) -> [Point3<f64>; 3] {
        self.triangle(t).map(|v| self.positions[v])
    }

    /// Unit normal of triangle `t`, `None` if degenerate.
    #[must_use]
    pub fn triangle_normal(&self, t: usize) -> Option<Vector3<f64>> {
        let [a, b, c] = self.triangle_points(t);
        triangle_normal(&a, &b, &c)
    }

    #[must_use]
    pub fn triangle_area(&self, t: usize) -> f64 {
        let [a, b, c] = self.triangle_points(t);
        triangle_area(&a, &b, &c)
    }

    #[must_use]
    pub fn triangle_center(&self, t: usize) -> Point3<f64> {
        let [a, b, c] = self.triangle_points(t);
        Point3::from((a.coords + b.coords + c.coords) / 3.0)
    }

    /// Tail and tip vertex of half-edge `e`.
    #[must_use]
    pub fn edge_vertices(&self, e: usize) -> (usize, usize) {
        (self.indices[e], self.indices[next_edge(e)])
    }

    #[must_use]
    pub fn edge_points(&self, e: usize) -> (Point3<f64>, Point3<f64>) {
        let (a, b) = self.edge_vertices(e);
        (self.positions[a], self.positions[b])
    }

    #[must_use]
    pub fn edge_length(&self, e: usize) -> f64 {
        let (a, b) = self.edge_points(e);
        (b - a).norm()
    }

    #[must_use]
    pub fn twin(&self, e: usize) -> Option<usize> {
        self.twins[e]
    }

    /// Triangle across local edge `j` of triangle `t`.
    #[must_use]
    pub fn neighbor(&self, t: usize, j: usize) -> Option<usize> {
        self.twins[3 * t + j].map(edge_triangle)
    }

    /// Returns `true` if every half-edge has a twin.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.twins.iter().all(Option::is_some)
    }

    #[must_use]
    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(&self.positions)
    }

    /// Sum of signed tetrahedron volumes against the origin.
    ///
    /// Positive for a closed mesh with outward-facing triangles.
    #[must_use]
    pub fn signed_volume(&self) -> f64 {
        self.triangles()
            .map(|[a, b, c]| {
                let (a, b, c) = (self.positions[a].coords, self.positions[b].coords, self.positions[c].coords);
                a.dot(&b.cross(&c)) / 6.0
            })
            .sum()
    }

    /// Checks that twin links are mutual and join opposite directed edges.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceMeshError::TwinMismatch`] for the first bad edge.
    pub fn validate_twins(&self) -> Result<(), SurfaceMeshError> {
        for e in 0..self.indices.len() {
            let Some(f) = self.twins[e] else {
                continue;
            };
            if f >= self.twins.len() || self.twins[f] != Some(e) {
                return Err(SurfaceMeshError::TwinMismatch { edge: e });
            }
            let (a, b) = self.edge_vertices(e);
            if self.edge_vertices(f) != (b, a) {
                return Err(SurfaceMeshError::TwinMismatch { edge: e });
            }
        }
        Ok(())
    }

    // =========================================================================
    // TRANSFORMS
    // =========================================================================

    /// Copy with every position translated by `offset`.
    #[must_use]
    pub fn translated(&self, offset: &Vector3<f64>) -> Self {
        let mut out = self.clone();
        for p in &mut out.positions {
            *p += offset;
        }
        out
    }

    /// Copy with every position scaled about the origin.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        let mut out = self.clone();
        for p in &mut out.positions {
            *p = Point3::from(p.coords * factor);
        }
        out
    }

    // =========================================================================
    // SPLITS
    // =========================================================================

    fn check_triangle(&self, t: usize) -> Result<(), SurfaceMeshError> {
        if t < self.number_of_triangles() {
            Ok(())
        } else {
            Err(SurfaceMeshError::InvalidIndex {
                index: t,
                len: self.number_of_triangles(),
            })
        }
    }

    fn alloc_triangle(&mut self, corners: [usize; 3]) -> usize {
        let t = self.number_of_triangles();
        self.indices.extend_from_slice(&corners);
        self.twins.extend_from_slice(&[None, None, None]);
        t
    }

    fn set_corners(&mut self, t: usize, corners: [usize; 3]) {
        self.indices[3 * t..3 * t + 3].copy_from_slice(&corners);
    }

    fn link(&mut self, e: usize, twin: Option<usize>) {
        self.twins[e] = twin;
        if let Some(f) = twin {
            self.twins[f] = Some(e);
        }
    }

    fn push_vertex(&mut self, p: Point3<f64>) -> usize {
        self.positions.push(p);
        self.positions.len() - 1
    }

    /// Splits triangle `t = [a, b, c]` at `p` into `[a, b, p]` (reusing `t`),
    /// `[b, c, p]` and `[c, a, p]`.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceMeshError::InvalidIndex`] for an unknown triangle.
    pub fn split_triangle(&mut self, t: usize, p: Point3<f64>) -> Result<SplitResult, SurfaceMeshError> {
        self.check_triangle(t)?;
        let [a, b, c] = self.triangle(t);
        let outer_bc = self.twins[3 * t + 1];
        let outer_ca = self.twins[3 * t + 2];

        let v = self.push_vertex(p);
        self.set_corners(t, [a, b, v]);
        let t1 = self.alloc_triangle([b, c, v]);
        let t2 = self.alloc_triangle([c, a, v]);

        self.link(3 * t1, outer_bc);
        self.link(3 * t2, outer_ca);
        self.link(3 * t + 1, Some(3 * t1 + 2));
        self.link(3 * t1 + 1, Some(3 * t2 + 2));
        self.link(3 * t2 + 1, Some(3 * t + 2));

        Ok(SplitResult {
            vertex: v,
            triangles: SmallVec::from_slice(&[(t, t1), (t, t2)]),
        })
    }

    /// Splits half-edge `e = (a, b)` at `p`.
    ///
    /// The owning triangle `[a, b, c]` becomes `[a, p, c]` plus a new
    /// `[p, b, c]`. If the edge has a twin in triangle `[b, a, d]`, that
    /// triangle becomes `[b, p, d]` plus a new `[p, a, d]`.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceMeshError::InvalidIndex`] for an unknown edge.
    pub fn split_edge(&mut self, e: usize, p: Point3<f64>) -> Result<SplitResult, SurfaceMeshError> {
        if e >= self.indices.len() {
            return Err(SurfaceMeshError::InvalidIndex {
                index: e,
                len: self.indices.len(),
            });
        }
        let t = edge_triangle(e);
        let (a, b) = self.edge_vertices(e);
        let c = self.indices[prev_edge(e)];
        let outer_bc = self.twins[next_edge(e)];
        let outer_ca = self.twins[prev_edge(e)];
        let opposite = self.twins[e];

        let v = self.push_vertex(p);
        self.set_corners(t, [a, v, c]);
        let n1 = self.alloc_triangle([v, b, c]);
        self.link(3 * t + 2, outer_ca);
        self.link(3 * n1 + 1, outer_bc);
        self.link(3 * t + 1, Some(3 * n1 + 2));

        let mut triangles: SmallBuffer<(usize, usize), 2> = SmallVec::new();
        triangles.push((t, n1));

        match opposite {
            Some(f) => {
                let u = edge_triangle(f);
                let d = self.indices[prev_edge(f)];
                let outer_ad = self.twins[next_edge(f)];
                let outer_db = self.twins[prev_edge(f)];

                self.set_corners(u, [b, v, d]);
                let n2 = self.alloc_triangle([v, a, d]);
                self.link(3 * u + 2, outer_db);
                self.link(3 * n2 + 1, outer_ad);
                self.link(3 * u + 1, Some(3 * n2 + 2));

                self.link(3 * t, Some(3 * n2));
                self.link(3 * n1, Some(3 * u));
                triangles.push((u, n2));
            }
            None => {
                self.twins[3 * t] = None;
                self.twins[3 * n1] = None;
            }
        }

        Ok(SplitResult { vertex: v, triangles })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::primitives::{cube, icosphere};

    fn two_triangles() -> SurfaceTriMesh {
        SurfaceTriMesh::from_triangles(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
            ],
            &[[0, 1, 2], [1, 3, 2]],
        )
        .unwrap()
    }

    #[test]
    fn test_twins_link_shared_edge() {
        let mesh = two_triangles();
        // Edge 1 -> 2 in triangle 0 is local edge 1; 2 -> 1 is local edge 2 of triangle 1.
        assert_eq!(mesh.twin(1), Some(5));
        assert_eq!(mesh.twin(5), Some(1));
        assert_eq!(mesh.neighbor(0, 1), Some(1));
        assert!(!mesh.is_closed());
        mesh.validate_twins().unwrap();
    }

    #[test]
    fn test_non_manifold_edge_is_rejected() {
        let err = SurfaceTriMesh::from_triangles(
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)],
            &[[0, 1, 2], [0, 1, 2]],
        )
        .unwrap_err();
        assert!(matches!(err, SurfaceMeshError::NonManifoldEdge { .. }));
    }

    #[test]
    fn test_split_triangle_keeps_twins() {
        let mut mesh = icosphere(1);
        let before = mesh.number_of_triangles();
        let center = mesh.triangle_center(3);
        let split = mesh.split_triangle(3, center).unwrap();
        assert_eq!(mesh.number_of_triangles(), before + 2);
        assert_eq!(split.triangles.len(), 2);
        assert!(mesh.is_closed());
        mesh.validate_twins().unwrap();
        for t in [3, split.triangles[0].1, split.triangles[1].1] {
            assert!(mesh.triangle(t).contains(&split.vertex));
        }
    }

    #[test]
    fn test_split_edge_keeps_twins() {
        let mut mesh = cube(2);
        let (a, b) = mesh.edge_points(4);
        let split = mesh.split_edge(4, Point3::from((a.coords + b.coords) / 2.0)).unwrap();
        assert_eq!(split.triangles.len(), 2);
        assert!(mesh.is_closed());
        mesh.validate_twins().unwrap();
        let volume = mesh.signed_volume();
        assert!((volume - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_split_boundary_edge() {
        let mut mesh = two_triangles();
        // Edge 0 -> 1 has no twin.
        let split = mesh.split_edge(0, Point3::new(0.5, 0.0, 0.0)).unwrap();
        assert_eq!(split.triangles.len(), 1);
        assert_eq!(mesh.number_of_triangles(), 3);
        mesh.validate_twins().unwrap();
        assert_eq!(mesh.twin(0), None);
    }
}
