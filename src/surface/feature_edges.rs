//! Ridge and valley curves traced along sharp surface edges.
//!
//! Every interior edge gets a dihedral angle (between the normals of its two
//! triangles) and a curvature-density score (dihedral over the distance
//! between the triangle centers). Edges are visited by descending score; each
//! unvisited edge whose dihedral reaches the feature angle seeds a curve that
//! grows in both directions, always stepping to the neighbor edge with the
//! best combined direction alignment and dihedral similarity.
//!
//! A curve shorter than the minimum length survives only if it is closed or
//! both of its ends meet other sharp edges, as the edges of a coarse cube do
//! at its corners. Short chains that fade out into smooth surface are noise.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::core::collections::{FastHashSet, fast_hash_set_with_capacity};
use crate::geometry::polyline::Polyline;
use crate::surface::edge_graph::EdgeGraph;
use crate::surface::tri_mesh::{SurfaceTriMesh, edge_triangle};

/// Knobs for [`extract_feature_curves`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureEdgeParams {
    /// Minimum dihedral angle, in degrees, for an edge to seed a curve.
    pub feature_angle_deg: f64,
    /// Minimum alignment × dihedral-similarity score to keep growing.
    pub min_quality: f64,
    /// Growth step cap per curve.
    pub max_steps: usize,
    /// Open curves with fewer edges and a free end are discarded.
    pub min_curve_edges: usize,
}

impl Default for FeatureEdgeParams {
    fn default() -> Self {
        Self {
            feature_angle_deg: 45.0,
            min_quality: 0.5,
            max_steps: 10_000,
            min_curve_edges: 3,
        }
    }
}

impl FeatureEdgeParams {
    #[must_use]
    pub const fn with_feature_angle(mut self, degrees: f64) -> Self {
        self.feature_angle_deg = degrees;
        self
    }

    #[must_use]
    pub const fn with_min_quality(mut self, quality: f64) -> Self {
        self.min_quality = quality;
        self
    }

    #[must_use]
    pub const fn with_min_curve_edges(mut self, edges: usize) -> Self {
        self.min_curve_edges = edges;
        self
    }
}

/// A traced feature curve.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureCurve {
    /// Positions along the curve; closed loops repeat the first point.
    pub polyline: Polyline,
    /// Half-edges in curve order, each oriented along the curve.
    pub edges: Vec<usize>,
}

impl FeatureCurve {
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.polyline.is_closed()
    }
}

/// Angle in radians between the normals of the two triangles sharing edge
/// `e`, or `None` on a boundary or degenerate edge.
#[must_use]
pub fn dihedral_angle(mesh: &SurfaceTriMesh, e: usize) -> Option<f64> {
    let twin = mesh.twin(e)?;
    let n0 = mesh.triangle_normal(edge_triangle(e))?;
    let n1 = mesh.triangle_normal(edge_triangle(twin))?;
    Some(n0.dot(&n1).clamp(-1.0, 1.0).acos())
}

/// Dihedral angle divided by the distance between the two triangle centers.
#[must_use]
pub fn curvature_density(mesh: &SurfaceTriMesh, e: usize) -> Option<f64> {
    let dihedral = dihedral_angle(mesh, e)?;
    let twin = mesh.twin(e)?;
    let distance = (mesh.triangle_center(edge_triangle(e)) - mesh.triangle_center(edge_triangle(twin))).norm();
    (distance > 0.0).then(|| dihedral / distance)
}

#[derive(Clone, Copy, Debug)]
struct ScoredEdge {
    edge: usize,
    dihedral: f64,
    score: f64,
}

fn undirected(mesh: &SurfaceTriMesh, e: usize) -> (usize, usize) {
    let (a, b) = mesh.edge_vertices(e);
    if a < b { (a, b) } else { (b, a) }
}

fn growth_score(mesh: &SurfaceTriMesh, current: usize, current_dihedral: f64, candidate: usize) -> Option<f64> {
    let dihedral = dihedral_angle(mesh, candidate)?;
    let (a, b) = mesh.edge_points(current);
    let (c, d) = mesh.edge_points(candidate);
    let alignment = (b - a).try_normalize(0.0)?.dot(&(d - c).try_normalize(0.0)?);
    let largest = current_dihedral.max(dihedral);
    if largest <= 0.0 {
        return None;
    }
    let similarity = 1.0 - (current_dihedral - dihedral).abs() / largest;
    Some(alignment * similarity)
}

/// Number of edges at or above `threshold` around each vertex.
fn sharp_valence(mesh: &SurfaceTriMesh, scored: &[ScoredEdge], threshold: f64) -> Vec<u32> {
    let mut valence = vec![0u32; mesh.number_of_vertices()];
    for edge in scored.iter().filter(|e| e.dihedral >= threshold) {
        let (a, b) = mesh.edge_vertices(edge.edge);
        valence[a] += 1;
        valence[b] += 1;
    }
    valence
}

/// `true` if a curve from `first` to `last` is kept despite being short:
/// it closes on itself or both ends are corners where sharp edges meet.
fn anchored(valence: &[u32], first: usize, last: usize) -> bool {
    first == last || (valence[first] >= 2 && valence[last] >= 2)
}

/// Follows the best continuation from the tip of `start` until no candidate
/// clears the quality threshold, a visited edge is reached, or the step cap
/// is hit. Returns the half-edges walked after `start`.
fn grow(
    mesh: &SurfaceTriMesh,
    graph: &EdgeGraph,
    start: usize,
    params: &FeatureEdgeParams,
    visited: &mut FastHashSet<(usize, usize)>,
) -> Vec<usize> {
    let mut walked = Vec::new();
    let mut current = start;
    let Some(mut current_dihedral) = dihedral_angle(mesh, current) else {
        return walked;
    };

    for _ in 0..params.max_steps {
        let (_, tip) = mesh.edge_vertices(current);
        let best = graph
            .outgoing(tip)
            .iter()
            .copied()
            .filter(|&c| !visited.contains(&undirected(mesh, c)))
            .filter_map(|c| growth_score(mesh, current, current_dihedral, c).map(|s| (c, s)))
            .filter(|&(_, s)| s > params.min_quality)
            .max_by(|x, y| x.1.total_cmp(&y.1).then_with(|| y.0.cmp(&x.0)));
        let Some((next, _)) = best else {
            break;
        };
        visited.insert(undirected(mesh, next));
        walked.push(next);
        current_dihedral = dihedral_angle(mesh, next).unwrap_or(current_dihedral);
        current = next;
    }
    walked
}

/// Traces the feature curves of `mesh`.
#[must_use]
pub fn extract_feature_curves(mesh: &SurfaceTriMesh, params: &FeatureEdgeParams) -> Vec<FeatureCurve> {
    let graph = EdgeGraph::new(mesh);
    let threshold = params.feature_angle_deg.to_radians();

    let mut scored: Vec<ScoredEdge> = (0..mesh.number_of_edges())
        .filter(|&e| mesh.twin(e).is_some_and(|t| e < t))
        .filter_map(|e| {
            Some(ScoredEdge {
                edge: e,
                dihedral: dihedral_angle(mesh, e)?,
                score: curvature_density(mesh, e)?,
            })
        })
        .collect();
    scored.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.edge.cmp(&b.edge),
        other => other,
    });
    let valence = sharp_valence(mesh, &scored, threshold);

    let mut visited = fast_hash_set_with_capacity(scored.len());
    let mut curves = Vec::new();
    let mut discarded = 0usize;

    for seed in scored {
        if seed.dihedral < threshold || visited.contains(&undirected(mesh, seed.edge)) {
            continue;
        }
        visited.insert(undirected(mesh, seed.edge));

        let forward = grow(mesh, &graph, seed.edge, params, &mut visited);
        let closed = forward
            .last()
            .is_some_and(|&e| mesh.edge_vertices(e).1 == mesh.edge_vertices(seed.edge).0);
        let backward = match mesh.twin(seed.edge) {
            Some(reverse) if !closed => grow(mesh, &graph, reverse, params, &mut visited),
            _ => Vec::new(),
        };

        // Backward half-edges run against the curve; flip them onto their twins.
        let mut edges: Vec<usize> = backward
            .iter()
            .rev()
            .filter_map(|&e| mesh.twin(e))
            .collect();
        edges.push(seed.edge);
        edges.extend(forward);

        let first = mesh.edge_vertices(edges[0]).0;
        let last = edges.last().map_or(first, |&e| mesh.edge_vertices(e).1);
        if edges.len() < params.min_curve_edges && !anchored(&valence, first, last) {
            discarded += 1;
            continue;
        }

        let mut points = Vec::with_capacity(edges.len() + 1);
        points.push(mesh.edge_points(edges[0]).0);
        points.extend(edges.iter().map(|&e| mesh.edge_points(e).1));
        let Ok(polyline) = Polyline::new(points) else {
            continue;
        };
        tracing::trace!(edges = edges.len(), closed = polyline.is_closed(), "feature curve traced");
        curves.push(FeatureCurve { polyline, edges });
    }

    tracing::debug!(curves = curves.len(), discarded, "feature extraction finished");
    curves
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::primitives::{cube, icosphere};
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_cube_recovers_twelve_edges() {
        let mesh = cube(4);
        let curves = extract_feature_curves(&mesh, &FeatureEdgeParams::default());
        assert_eq!(curves.len(), 12);
        for curve in &curves {
            assert_eq!(curve.edges.len(), 4);
            assert!(!curve.is_closed());
            assert_relative_eq!(curve.polyline.length(), 1.0, epsilon = 1e-12);
            for &e in &curve.edges {
                assert_relative_eq!(dihedral_angle(&mesh, e).unwrap(), FRAC_PI_2, epsilon = 1e-9);
            }
            for pair in curve.edges.windows(2) {
                assert_eq!(mesh.edge_vertices(pair[0]).1, mesh.edge_vertices(pair[1]).0);
            }
        }
    }

    #[test]
    fn test_smooth_sphere_has_no_features() {
        let curves = extract_feature_curves(&icosphere(3), &FeatureEdgeParams::default());
        assert!(curves.is_empty());
    }

    #[test]
    fn test_coarse_cube_keeps_corner_to_corner_edges() {
        let params = FeatureEdgeParams::default();
        for (n, per_curve) in [(1, 1), (2, 2)] {
            let mesh = cube(n);
            let curves = extract_feature_curves(&mesh, &params);
            assert_eq!(curves.len(), 12, "cube({n})");
            for curve in &curves {
                assert_eq!(curve.edges.len(), per_curve);
                assert_relative_eq!(curve.polyline.length(), 1.0, epsilon = 1e-12);
            }
        }

        let curves = extract_feature_curves(&cube(4), &params.with_min_curve_edges(10));
        assert_eq!(curves.len(), 12);
    }

    #[test]
    fn test_short_chains_with_a_free_end_are_noise() {
        // Vertex 0 and 3 are corners, 1 and 2 sit on a single sharp edge.
        let valence = [3, 1, 1, 2];
        assert!(anchored(&valence, 0, 3));
        assert!(anchored(&valence, 1, 1));
        assert!(!anchored(&valence, 0, 1));
        assert!(!anchored(&valence, 1, 2));
    }

    #[test]
    fn test_flat_edges_have_zero_dihedral() {
        let mesh = cube(1);
        // Each face diagonal joins two coplanar triangles.
        let flat = (0..mesh.number_of_edges())
            .filter(|&e| dihedral_angle(&mesh, e).is_some_and(|d| d < 1e-6))
            .count();
        assert_eq!(flat, 12);
    }
}
