//! Vertex to outgoing half-edge adjacency over a [`SurfaceTriMesh`].

use nalgebra::Vector3;

use crate::core::collections::SmallBuffer;
use crate::geometry::point::try_normalize;
use crate::surface::tri_mesh::{SurfaceTriMesh, edge_triangle, prev_edge};

/// Outgoing half-edges of every vertex.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdgeGraph {
    outgoing: Vec<SmallBuffer<usize, 8>>,
}

impl EdgeGraph {
    #[must_use]
    pub fn new(mesh: &SurfaceTriMesh) -> Self {
        let mut outgoing = vec![SmallBuffer::new(); mesh.number_of_vertices()];
        for e in 0..mesh.number_of_edges() {
            let (from, _) = mesh.edge_vertices(e);
            outgoing[from].push(e);
        }
        Self { outgoing }
    }

    /// Half-edges leaving `v`.
    #[must_use]
    pub fn outgoing(&self, v: usize) -> &[usize] {
        self.outgoing.get(v).map_or(&[], |x| x.as_slice())
    }

    /// Distinct vertices joined to `v` by an edge.
    ///
    /// On an open boundary the vertex across the boundary edge is reached only
    /// through the incoming half-edge, so both directions are scanned.
    #[must_use]
    pub fn neighbors(&self, mesh: &SurfaceTriMesh, v: usize) -> SmallBuffer<usize, 8> {
        let mut out: SmallBuffer<usize, 8> = SmallBuffer::new();
        for &e in self.outgoing(v) {
            let (_, to) = mesh.edge_vertices(e);
            if !out.contains(&to) {
                out.push(to);
            }
            let (before, _) = mesh.edge_vertices(prev_edge(e));
            if !out.contains(&before) {
                out.push(before);
            }
        }
        out
    }

    /// Triangles incident to `v`.
    pub fn triangles(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.outgoing(v).iter().map(|&e| edge_triangle(e))
    }

    /// Area-weighted average of incident triangle normals.
    #[must_use]
    pub fn vertex_normal(&self, mesh: &SurfaceTriMesh, v: usize) -> Option<Vector3<f64>> {
        let sum: Vector3<f64> = self
            .triangles(v)
            .filter_map(|t| mesh.triangle_normal(t).map(|n| n * mesh.triangle_area(t)))
            .sum();
        try_normalize(&sum)
    }

    /// Half-edge from `from` to `to`, if one exists.
    #[must_use]
    pub fn find_edge(&self, mesh: &SurfaceTriMesh, from: usize, to: usize) -> Option<usize> {
        self.outgoing(from)
            .iter()
            .copied()
            .find(|&e| mesh.edge_vertices(e).1 == to)
    }
}
