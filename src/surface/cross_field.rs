//! Per-triangle tangent frames and target spacing.
//!
//! Frames are seeded on the triangles bordering feature curves (tangent along
//! the curve) and flooded breadth-first across the surface. Each step projects
//! the parent tangent onto the child triangle's plane and keeps the sign that
//! agrees with the parent, so the field never turns by 180° across an edge.
//!
//! Spacing shrinks with the curvature density of a triangle's edges. Edges on
//! feature curves do not count: a sharp crease is resolved by sampling the
//! curve, not by refining the flat faces on either side of it.

use std::collections::VecDeque;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::geometry::point::{any_perpendicular, project_onto_plane, try_normalize};
use crate::surface::feature_edges::{FeatureCurve, curvature_density};
use crate::surface::tri_mesh::{SurfaceTriMesh, edge_triangle};

/// Spacing law: `clamp(base / (1 + base * curvature * gain), min, base)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpacingParams {
    /// Spacing on flat regions.
    pub base: f64,
    /// Lower bound on curved regions.
    pub min: f64,
    /// How strongly curvature shrinks the spacing; zero gives uniform spacing.
    pub curvature_gain: f64,
}

impl Default for SpacingParams {
    fn default() -> Self {
        Self {
            base: 0.1,
            min: 0.025,
            curvature_gain: 0.0,
        }
    }
}

impl SpacingParams {
    #[must_use]
    pub const fn uniform(base: f64) -> Self {
        Self {
            base,
            min: base,
            curvature_gain: 0.0,
        }
    }

    #[must_use]
    pub const fn with_min(mut self, min: f64) -> Self {
        self.min = min;
        self
    }

    #[must_use]
    pub const fn with_curvature_gain(mut self, gain: f64) -> Self {
        self.curvature_gain = gain;
        self
    }

    /// Target spacing at the given curvature density.
    #[must_use]
    pub fn spacing(&self, curvature: f64) -> f64 {
        let raw = self.base / (1.0 + self.base * curvature.abs() * self.curvature_gain);
        raw.clamp(self.min.min(self.base), self.base)
    }
}

/// Orthonormal frame plus spacing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cross {
    pub normal: Vector3<f64>,
    pub tangent: Vector3<f64>,
    pub bitangent: Vector3<f64>,
    pub spacing: f64,
}

impl Cross {
    fn new(normal: Vector3<f64>, tangent: Vector3<f64>, spacing: f64) -> Self {
        Self {
            normal,
            tangent,
            bitangent: normal.cross(&tangent),
            spacing,
        }
    }
}

/// Frames for every triangle and half-edge of a surface snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CrossField {
    triangles: Vec<Cross>,
    edges: Vec<Cross>,
    curvature: Vec<f64>,
}

fn triangle_curvature(mesh: &SurfaceTriMesh, t: usize, on_curve: &[bool]) -> f64 {
    (0..3)
        .map(|j| 3 * t + j)
        .filter(|&e| !on_curve[e])
        .filter_map(|e| curvature_density(mesh, e))
        .fold(0.0, f64::max)
}

/// Tangent for `child` continuing `parent_tangent`, or `None` if the
/// projection degenerates.
fn transport(
    parent_tangent: &Vector3<f64>,
    child_normal: &Vector3<f64>,
    shared_edge: &Vector3<f64>,
) -> Option<Vector3<f64>> {
    let projected = try_normalize(&project_onto_plane(parent_tangent, child_normal))
        .or_else(|| try_normalize(shared_edge))?;
    Some(if projected.dot(parent_tangent) < 0.0 { -projected } else { projected })
}

impl CrossField {
    /// Seeds frames from `curves` and propagates them across `mesh`.
    ///
    /// Components without feature curves are seeded on their lowest-index
    /// triangle with the direction of its first edge.
    #[must_use]
    pub fn propagate(mesh: &SurfaceTriMesh, curves: &[FeatureCurve], spacing: &SpacingParams) -> Self {
        let n = mesh.number_of_triangles();
        let normals: Vec<Vector3<f64>> = (0..n)
            .map(|t| mesh.triangle_normal(t).unwrap_or_else(Vector3::z))
            .collect();
        let mut on_curve = vec![false; mesh.number_of_edges()];
        for &e in curves.iter().flat_map(|c| &c.edges) {
            on_curve[e] = true;
            if let Some(twin) = mesh.twin(e) {
                on_curve[twin] = true;
            }
        }
        let curvature: Vec<f64> = (0..n).map(|t| triangle_curvature(mesh, t, &on_curve)).collect();
        let mut tangents: Vec<Option<Vector3<f64>>> = vec![None; n];
        let mut queue: VecDeque<usize> = VecDeque::new();

        // Edge frames on feature curves follow the curve direction on both sides.
        let mut edge_tangents: Vec<Option<Vector3<f64>>> = vec![None; mesh.number_of_edges()];
        for curve in curves {
            for &e in &curve.edges {
                let (a, b) = mesh.edge_points(e);
                let Some(direction) = try_normalize(&(b - a)) else {
                    continue;
                };
                edge_tangents[e] = Some(direction);
                if let Some(twin) = mesh.twin(e) {
                    edge_tangents[twin] = Some(direction);
                }
                for side in std::iter::once(e).chain(mesh.twin(e)) {
                    let t = edge_triangle(side);
                    if tangents[t].is_none() {
                        tangents[t] = Some(direction);
                        queue.push_back(t);
                    }
                }
            }
        }

        let mut seeds = 0usize;
        let mut next_seed = 0;
        loop {
            while let Some(t) = queue.pop_front() {
                let Some(parent) = tangents[t] else {
                    continue;
                };
                for j in 0..3 {
                    let Some(u) = mesh.neighbor(t, j) else {
                        continue;
                    };
                    if tangents[u].is_some() {
                        continue;
                    }
                    let (a, b) = mesh.edge_points(3 * t + j);
                    if let Some(tangent) = transport(&parent, &normals[u], &(b - a)) {
                        tangents[u] = Some(tangent);
                        queue.push_back(u);
                    }
                }
            }
            while next_seed < n && tangents[next_seed].is_some() {
                next_seed += 1;
            }
            if next_seed == n {
                break;
            }
            let (a, b) = mesh.edge_points(3 * next_seed);
            tangents[next_seed] = Some(
                try_normalize(&(b - a))
                    .unwrap_or_else(|| any_perpendicular(&normals[next_seed])),
            );
            queue.push_back(next_seed);
            seeds += 1;
        }

        let triangles: Vec<Cross> = (0..n)
            .map(|t| {
                let tangent = tangents[t].unwrap_or_else(|| any_perpendicular(&normals[t]));
                Cross::new(normals[t], tangent, spacing.spacing(curvature[t]))
            })
            .collect();
        let edges: Vec<Cross> = (0..mesh.number_of_edges())
            .map(|e| {
                let frame = &triangles[edge_triangle(e)];
                edge_tangents[e].map_or(*frame, |tangent| Cross::new(frame.normal, tangent, frame.spacing))
            })
            .collect();

        tracing::debug!(
            triangles = n,
            curves = curves.len(),
            extra_seeds = seeds,
            "cross field propagated"
        );
        Self {
            triangles,
            edges,
            curvature,
        }
    }

    #[must_use]
    pub fn number_of_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Frame of triangle `t`.
    #[must_use]
    pub fn at_tri(&self, t: usize) -> Option<&Cross> {
        self.triangles.get(t)
    }

    /// Frame of half-edge `e`.
    #[must_use]
    pub fn at_edge(&self, e: usize) -> Option<&Cross> {
        self.edges.get(e)
    }

    /// Curvature density of triangle `t`.
    #[must_use]
    pub fn curvature(&self, t: usize) -> f64 {
        self.curvature.get(t).copied().unwrap_or(0.0)
    }
}
