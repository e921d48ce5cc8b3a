//! Feature-aware point placement on a surface mesh.
//!
//! Feature curves are sampled first, each sample pushing two candidates that
//! step off the curve into the triangles on either side. Candidates are then
//! drained from a FIFO queue: each one walks across the surface from the
//! triangle it came from, is rejected if an accepted point lies within the
//! local spacing threshold, and is otherwise inserted into the octree and the
//! surface (edge split when it lands on an edge, triangle split otherwise),
//! pushing four new candidates along the local tangent and bitangent.

use std::collections::VecDeque;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::core::collections::SmallBuffer;
use crate::geometry::point::try_normalize;
use crate::surface::cross_field::{CrossField, SpacingParams};
use crate::surface::feature_edges::FeatureCurve;
use crate::surface::octree::PointOctree;
use crate::surface::tri_mesh::{SplitResult, SurfaceMeshError, SurfaceTriMesh, edge_triangle};
use crate::surface::walk::{DEFAULT_MAX_STEPS, walk_to};

/// Knobs for [`place_points`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacementParams {
    pub spacing: SpacingParams,
    /// Rejection radius as a fraction of the mean of the previous and current spacing.
    pub acceptance_factor: f64,
    /// Barycentric coordinate below which a point snaps onto the opposite edge.
    pub snap_tolerance: f64,
    /// Allowed off-surface displacement as a fraction of the candidate's spacing.
    pub max_displacement_factor: f64,
    pub max_walk_steps: usize,
    /// Hard cap on accepted points.
    pub max_points: usize,
}

impl Default for PlacementParams {
    fn default() -> Self {
        Self {
            spacing: SpacingParams::default(),
            acceptance_factor: 0.7,
            snap_tolerance: 0.05,
            max_displacement_factor: 0.5,
            max_walk_steps: DEFAULT_MAX_STEPS,
            max_points: 200_000,
        }
    }
}

impl PlacementParams {
    #[must_use]
    pub const fn with_spacing(mut self, spacing: SpacingParams) -> Self {
        self.spacing = spacing;
        self
    }

    #[must_use]
    pub const fn with_max_points(mut self, max_points: usize) -> Self {
        self.max_points = max_points;
        self
    }
}

/// A point kept by placement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AcceptedPoint {
    pub position: Point3<f64>,
    /// Surface vertex at `position`.
    pub vertex: usize,
    /// Rejection radius in force when the point was accepted.
    pub threshold: f64,
}

/// Counters reported by [`place_points`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlacementStats {
    pub curve_samples: usize,
    pub accepted: usize,
    pub rejected_close: usize,
    pub walk_failures: usize,
    pub triangle_splits: usize,
    pub edge_splits: usize,
    pub reused_vertices: usize,
    pub component_seeds: usize,
    /// Placement stopped at [`PlacementParams::max_points`].
    pub capped: bool,
}

/// Output of [`place_points`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Placement {
    pub points: Vec<AcceptedPoint>,
    pub stats: PlacementStats,
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    triangle: usize,
    position: Point3<f64>,
    /// Accumulated placement distance from the seed.
    distance: f64,
    last_spacing: f64,
}

/// Where a walked candidate lands.
enum Landing {
    Vertex(usize),
    Edge(usize),
    Triangle(usize),
}

struct Placer<'a> {
    mesh: &'a mut SurfaceTriMesh,
    field: &'a CrossField,
    params: PlacementParams,
    octree: PointOctree,
    /// Triangle of the propagated field each current triangle descends from.
    origin: Vec<usize>,
    queue: VecDeque<Candidate>,
    out: Placement,
}

impl Placer<'_> {
    fn spacing_of(&self, t: usize) -> f64 {
        self.origin
            .get(t)
            .and_then(|&o| self.field.at_tri(o))
            .map_or(self.params.spacing.base, |c| c.spacing)
    }

    fn record_split(&mut self, split: &SplitResult) {
        for &(parent, child) in &split.triangles {
            let root = self.origin.get(parent).copied().unwrap_or(parent);
            if self.origin.len() <= child {
                self.origin.resize(child + 1, root);
            }
            self.origin[child] = root;
        }
    }

    fn classify(&self, t: usize, point: &Point3<f64>, bary: [f64; 3]) -> (Landing, Point3<f64>) {
        let snap = self.params.snap_tolerance;
        let small: Vec<usize> = (0..3).filter(|&k| bary[k] < snap).collect();
        let corners = self.mesh.triangle(t);
        match small.as_slice() {
            [] => (Landing::Triangle(t), *point),
            [k] => {
                let e = 3 * t + (k + 1) % 3;
                let (a, b) = self.mesh.edge_points(e);
                let ab = b - a;
                let s = ((point - a).dot(&ab) / ab.norm_squared()).clamp(0.0, 1.0);
                (Landing::Edge(e), a + ab * s)
            }
            _ => {
                let k = (0..3)
                    .max_by(|&i, &j| bary[i].total_cmp(&bary[j]))
                    .unwrap_or(0);
                (Landing::Vertex(corners[k]), self.mesh.position(corners[k]))
            }
        }
    }

    /// Tries to place `candidate`. Returns the triangle it landed in and the
    /// spacing there when accepted.
    fn try_place(&mut self, candidate: &Candidate) -> Result<Option<(usize, f64, Point3<f64>)>, SurfaceMeshError> {
        let reach = self.params.max_displacement_factor * candidate.last_spacing;
        let Some(hit) = walk_to(
            &*self.mesh,
            candidate.triangle,
            &candidate.position,
            reach,
            self.params.max_walk_steps,
        ) else {
            self.out.stats.walk_failures += 1;
            tracing::trace!(position = ?candidate.position, "candidate walk failed");
            return Ok(None);
        };

        let spacing = self.spacing_of(hit.triangle);
        let threshold = self.params.acceptance_factor * f64::midpoint(candidate.last_spacing, spacing);
        let (landing, position) = self.classify(hit.triangle, &hit.point, hit.barycentric);
        if self.octree.find_within(&position, threshold).is_some() {
            self.out.stats.rejected_close += 1;
            return Ok(None);
        }

        let vertex = match landing {
            Landing::Vertex(v) => {
                self.out.stats.reused_vertices += 1;
                v
            }
            Landing::Edge(e) => {
                let split = self.mesh.split_edge(e, position)?;
                self.record_split(&split);
                self.out.stats.edge_splits += 1;
                split.vertex
            }
            Landing::Triangle(t) => {
                let split = self.mesh.split_triangle(t, position)?;
                self.record_split(&split);
                self.out.stats.triangle_splits += 1;
                split.vertex
            }
        };
        self.octree.insert(position);
        self.out.points.push(AcceptedPoint {
            position,
            vertex,
            threshold,
        });
        self.out.stats.accepted += 1;
        Ok(Some((hit.triangle, spacing, position)))
    }

    fn run(&mut self, samples: Vec<CurveSample>, seeds: Vec<Candidate>) -> Result<(), SurfaceMeshError> {
        for sample in samples {
            self.out.stats.curve_samples += 1;
            self.try_place(&sample.point)?;
            self.queue.extend(sample.offsets);
        }
        self.out.stats.component_seeds = seeds.len();
        self.queue.extend(seeds);

        while let Some(candidate) = self.queue.pop_front() {
            if self.out.points.len() >= self.params.max_points {
                self.out.stats.capped = true;
                tracing::warn!(max_points = self.params.max_points, "point placement capped");
                break;
            }
            let Some((triangle, spacing, position)) = self.try_place(&candidate)? else {
                continue;
            };
            let Some(frame) = self.origin.get(triangle).and_then(|&o| self.field.at_tri(o)) else {
                continue;
            };
            for direction in [frame.tangent, -frame.tangent, frame.bitangent, -frame.bitangent] {
                self.queue.push_back(Candidate {
                    triangle,
                    position: position + direction * spacing,
                    distance: candidate.distance + spacing,
                    last_spacing: spacing,
                });
            }
        }
        Ok(())
    }
}

/// A point on a feature curve with the two candidates stepping off it.
struct CurveSample {
    point: Candidate,
    offsets: SmallBuffer<Candidate, 2>,
}

/// Samples every curve at the local spacing, before the mesh is modified.
fn sample_curves(mesh: &SurfaceTriMesh, field: &CrossField, curves: &[FeatureCurve], base: f64) -> Vec<CurveSample> {
    let mut samples = Vec::new();
    for curve in curves {
        let Some(&first) = curve.edges.first() else {
            continue;
        };
        let length = curve.polyline.length();
        let spacing = field.at_edge(first).map_or(base, |c| c.spacing);
        let segments = (length / spacing).round().max(1.0);
        let step = length / segments;
        // Closed loops would sample their start point twice.
        let count = segments as usize + usize::from(!curve.is_closed());

        for i in 0..count {
            let s = step * i as f64;
            let (segment, _) = curve.polyline.locate(s);
            let Some(&edge) = curve.edges.get(segment) else {
                continue;
            };
            let position = curve.polyline.point_at(s);
            let spacing = field.at_edge(edge).map_or(spacing, |c| c.spacing);

            let mut offsets = SmallBuffer::new();
            for side in std::iter::once(edge).chain(mesh.twin(edge)) {
                let Some(frame) = field.at_edge(side) else {
                    continue;
                };
                let (a, b) = mesh.edge_points(side);
                // Points into the triangle owning `side`.
                let Some(inward) = try_normalize(&frame.normal.cross(&(b - a))) else {
                    continue;
                };
                offsets.push(Candidate {
                    triangle: edge_triangle(side),
                    position: position + inward * spacing,
                    distance: spacing,
                    last_spacing: spacing,
                });
            }
            samples.push(CurveSample {
                point: Candidate {
                    triangle: edge_triangle(edge),
                    position,
                    distance: 0.0,
                    last_spacing: spacing,
                },
                offsets,
            });
        }
    }
    samples
}

/// One candidate at the first triangle of every connected component that
/// no feature curve touches.
fn component_seeds(mesh: &SurfaceTriMesh, field: &CrossField, curves: &[FeatureCurve], base: f64) -> Vec<Candidate> {
    let n = mesh.number_of_triangles();
    let mut component = vec![usize::MAX; n];
    let mut first_triangles = Vec::new();
    for start in 0..n {
        if component[start] != usize::MAX {
            continue;
        }
        let id = first_triangles.len();
        first_triangles.push(start);
        component[start] = id;
        let mut stack = vec![start];
        while let Some(t) = stack.pop() {
            for j in 0..3 {
                if let Some(u) = mesh.neighbor(t, j)
                    && component[u] == usize::MAX
                {
                    component[u] = id;
                    stack.push(u);
                }
            }
        }
    }

    let mut featured = vec![false; first_triangles.len()];
    for e in curves.iter().flat_map(|c| c.edges.iter()) {
        if let Some(&id) = component.get(edge_triangle(*e)) {
            featured[id] = true;
        }
    }

    first_triangles
        .iter()
        .zip(featured)
        .filter(|(_, featured)| !featured)
        .map(|(&t, _)| {
            let spacing = field.at_tri(t).map_or(base, |c| c.spacing);
            Candidate {
                triangle: t,
                position: mesh.triangle_center(t),
                distance: 0.0,
                last_spacing: spacing,
            }
        })
        .collect()
}

/// Places points over `mesh`, splitting it in place so every accepted point
/// becomes a surface vertex.
///
/// `field` must have been propagated over `mesh` before this call.
///
/// # Errors
///
/// Returns a [`SurfaceMeshError`] if a split is handed an invalid index,
/// which indicates a field built for a different mesh.
pub fn place_points(
    mesh: &mut SurfaceTriMesh,
    field: &CrossField,
    curves: &[FeatureCurve],
    params: &PlacementParams,
) -> Result<Placement, SurfaceMeshError> {
    let base = params.spacing.base;
    let samples = sample_curves(mesh, field, curves, base);
    let seeds = component_seeds(mesh, field, curves, base);
    let bounds = mesh.aabb().padded(base);

    let mut placer = Placer {
        origin: (0..mesh.number_of_triangles()).collect(),
        mesh,
        field,
        params: *params,
        octree: PointOctree::new(bounds),
        queue: VecDeque::new(),
        out: Placement::default(),
    };
    placer.run(samples, seeds)?;

    let stats = placer.out.stats;
    tracing::debug!(
        accepted = stats.accepted,
        curve_samples = stats.curve_samples,
        rejected = stats.rejected_close,
        walk_failures = stats.walk_failures,
        edge_splits = stats.edge_splits,
        triangle_splits = stats.triangle_splits,
        "point placement finished"
    );
    Ok(placer.out)
}
