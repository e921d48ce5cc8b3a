//! Greedy pairing of adjacent triangles into quads.

use std::cmp::Ordering;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::geometry::point::try_normalize;
use crate::surface::tri_mesh::{SurfaceTriMesh, edge_triangle, prev_edge};

const PERPENDICULAR_WEIGHT: f64 = 0.8;
const PARALLEL_WEIGHT: f64 = 0.2;

/// A face of a quad-dominant surface, counter-clockwise seen from outside.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polygon {
    Triangle([usize; 3]),
    Quad([usize; 4]),
}

/// Output of [`quad_dominant`]. Vertex indices refer to the input mesh.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuadDominantMesh {
    pub polygons: Vec<Polygon>,
}

impl QuadDominantMesh {
    #[must_use]
    pub fn number_of_quads(&self) -> usize {
        self.polygons.iter().filter(|p| matches!(p, Polygon::Quad(_))).count()
    }

    #[must_use]
    pub fn number_of_triangles(&self) -> usize {
        self.polygons.len() - self.number_of_quads()
    }
}

/// Shape score of the quad `p[0] p[1] p[2] p[3]`: 1 for a rectangle, lower
/// as corners leave 90° and opposite sides lose parallelism.
#[must_use]
pub fn quad_score(p: &[Point3<f64>; 4]) -> f64 {
    let unit = |a: &Point3<f64>, b: &Point3<f64>| try_normalize(&(b - a)).unwrap_or_else(Vector3::zeros);
    let parallel1 = unit(&p[1], &p[2]).dot(&unit(&p[0], &p[3]));
    let parallel2 = unit(&p[1], &p[0]).dot(&unit(&p[2], &p[3]));
    let perpendicular1 = unit(&p[1], &p[2]).dot(&unit(&p[3], &p[2]));
    let perpendicular2 = unit(&p[1], &p[0]).dot(&unit(&p[3], &p[0]));

    let perpendicular = 1.0 - 0.5 * perpendicular1.abs() - 0.5 * perpendicular2.abs();
    let parallel = 0.5 * parallel1.abs() + 0.5 * parallel2.abs();
    PERPENDICULAR_WEIGHT * perpendicular + PARALLEL_WEIGHT * parallel
}

/// Quad formed by the triangle owning `e = (a, b)` and its twin:
/// `[a, d, b, c]` where `c` and `d` are the corners opposite `e`.
fn quad_across(mesh: &SurfaceTriMesh, e: usize) -> Option<[usize; 4]> {
    let twin = mesh.twin(e)?;
    let (a, b) = mesh.edge_vertices(e);
    let c = mesh.edge_vertices(prev_edge(e)).0;
    let d = mesh.edge_vertices(prev_edge(twin)).0;
    Some([a, d, b, c])
}

/// Pairs triangles across their best-scoring shared edges, highest score
/// first, keeping pairs whose score reaches `min_quality`. Unpaired
/// triangles are emitted as triangles.
#[must_use]
pub fn quad_dominant(mesh: &SurfaceTriMesh, min_quality: f64) -> QuadDominantMesh {
    let mut pairs: Vec<(f64, usize, [usize; 4])> = (0..mesh.number_of_edges())
        .filter(|&e| mesh.twin(e).is_some_and(|t| e < t))
        .filter_map(|e| {
            let quad = quad_across(mesh, e)?;
            let score = quad_score(&quad.map(|v| mesh.position(v)));
            (score >= min_quality).then_some((score, e, quad))
        })
        .collect();
    pairs.sort_by(|x, y| match y.0.total_cmp(&x.0) {
        Ordering::Equal => x.1.cmp(&y.1),
        other => other,
    });

    let mut used = vec![false; mesh.number_of_triangles()];
    let mut polygons = Vec::with_capacity(mesh.number_of_triangles());
    for (_, e, quad) in pairs {
        let (t, u) = (edge_triangle(e), mesh.twin(e).map_or(e, edge_triangle));
        if used[t] || used[u] {
            continue;
        }
        used[t] = true;
        used[u] = true;
        polygons.push(Polygon::Quad(quad));
    }
    polygons.extend(
        used.iter()
            .enumerate()
            .filter(|(_, used)| !**used)
            .map(|(t, _)| Polygon::Triangle(mesh.triangle(t))),
    );

    let out = QuadDominantMesh { polygons };
    tracing::debug!(
        quads = out.number_of_quads(),
        triangles = out.number_of_triangles(),
        "quad-dominant remesh finished"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::primitives::{cube, icosphere};
    use approx::assert_relative_eq;

    #[test]
    fn test_square_scores_one() {
        let square = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        assert_relative_eq!(quad_score(&square), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cube_becomes_all_quads() {
        let mesh = cube(3);
        let out = quad_dominant(&mesh, 0.6);
        assert_eq!(out.number_of_quads(), mesh.number_of_triangles() / 2);
        assert_eq!(out.number_of_triangles(), 0);
        for polygon in &out.polygons {
            let Polygon::Quad(q) = polygon else {
                panic!("unexpected triangle");
            };
            assert_relative_eq!(quad_score(&q.map(|v| mesh.position(v))), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_rhombi_below_threshold_stay_triangles() {
        let mesh = icosphere(0);
        let out = quad_dominant(&mesh, 0.7);
        assert_eq!(out.number_of_quads(), 0);
        assert_eq!(out.number_of_triangles(), 20);
    }
}
