//! Advancing-front extrusion of boundary layers.
//!
//! The front starts on the surface vertices already inserted into the volume
//! mesh. Each layer moves every active vertex along its curvature-weighted
//! normal and inserts the result through the Delaunay engine, so the cells
//! between consecutive layers come out of ordinary cavity insertion.
//!
//! Front faces keep the surface connectivity: a face is active while all
//! three of its corners are. A vertex that cannot be extruded leaves the
//! front for good, together with its faces. So does a vertex whose chain
//! has already been extruded the maximum number of times.

use nalgebra::{Point3, Vector3};

use crate::core::algorithms::incremental_insertion::{InsertOutcome, InsertionContext, insert_vertex};
use crate::core::cell::{Cell, CellKey};
use crate::core::collections::SmallBuffer;
use crate::core::vertex::{VertexKey, VertexKind};
use crate::core::volume_mesh::VolumeMesh;
use crate::geometry::aabb::Aabb;
use crate::geometry::point::{count_to_f64, triangle_area, triangle_normal, try_normalize};
use crate::surface::edge_graph::EdgeGraph;
use crate::surface::tri_mesh::SurfaceTriMesh;

/// Layer vertices closer than this fraction of the layer height to an
/// existing vertex are not inserted.
pub const LAYER_SEPARATION_FACTOR: f64 = 0.25;

/// Height multiplier per unit of curvature.
const HEIGHT_CURVATURE_GAIN: f64 = 0.5;
const MIN_HEIGHT_SCALE: f64 = 0.5;
const MAX_HEIGHT_SCALE: f64 = 1.5;

/// A vertex on the current front.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActiveVertex {
    /// Volume vertex at this front position.
    pub vertex: VertexKey,
    pub position: Point3<f64>,
    /// Unit extrusion direction computed for the last layer.
    pub normal: Vector3<f64>,
    /// Signed curvature: positive concave, negative convex.
    pub curvature: f64,
    /// Layers extruded along this vertex's chain so far.
    pub uses: u32,
}

/// Outcome of one extruded layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayerStats {
    /// Level assigned to the new vertices (1 for the contour layer).
    pub level: u32,
    pub extruded: usize,
    /// Candidates outside the domain box.
    pub outside_domain: usize,
    /// Candidates on or behind an incident front face, or with no normal.
    pub behind_front: usize,
    /// Candidates the engine rejected or found too close to another vertex.
    pub rejected: usize,
    /// Vertices retired because their chain reached the use limit.
    pub exhausted: usize,
}

impl LayerStats {
    /// Vertices that left the front during this layer.
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.outside_domain + self.behind_front + self.rejected + self.exhausted
    }
}

/// Front of boundary-layer vertices grown from a surface.
///
/// Slots are indexed by surface vertex index.
#[derive(Clone, Debug)]
pub struct DelaunayFront {
    triangles: Vec<[usize; 3]>,
    vertex_triangles: Vec<SmallBuffer<usize, 8>>,
    neighbors: Vec<SmallBuffer<usize, 8>>,
    base: Vec<Option<ActiveVertex>>,
    active: Vec<Option<ActiveVertex>>,
    level: u32,
    max_uses: u32,
}

impl DelaunayFront {
    /// Front on `surface`, where `vertices[i]` is the volume vertex of surface
    /// vertex `i`. Surface vertices without a volume vertex never join the
    /// front.
    #[must_use]
    pub fn new(surface: &SurfaceTriMesh, vertices: &[Option<VertexKey>]) -> Self {
        let graph = EdgeGraph::new(surface);
        let n = surface.number_of_vertices();
        let base: Vec<Option<ActiveVertex>> = (0..n)
            .map(|i| {
                vertices.get(i).copied().flatten().map(|vertex| ActiveVertex {
                    vertex,
                    position: surface.position(i),
                    normal: Vector3::zeros(),
                    curvature: 0.0,
                    uses: 0,
                })
            })
            .collect();
        Self {
            triangles: surface.triangles().collect(),
            vertex_triangles: (0..n).map(|v| graph.triangles(v).collect()).collect(),
            neighbors: (0..n).map(|v| graph.neighbors(surface, v)).collect(),
            active: base.clone(),
            base,
            level: 0,
            max_uses: u32::MAX,
        }
    }

    /// Caps how many layers a single vertex chain may be extruded, counted
    /// from the last [`reset`](Self::reset). Unlimited by default.
    #[must_use]
    pub const fn with_max_uses(mut self, max_uses: u32) -> Self {
        self.max_uses = max_uses;
        self
    }

    /// Level of the most recent layer; 0 while the front is on the surface.
    #[must_use]
    pub const fn level(&self) -> u32 {
        self.level
    }

    #[must_use]
    pub fn number_of_active(&self) -> usize {
        self.active.iter().flatten().count()
    }

    /// Active vertices with their surface vertex index.
    pub fn active_vertices(&self) -> impl Iterator<Item = (usize, &ActiveVertex)> {
        self.active
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.as_ref().map(|a| (i, a)))
    }

    #[must_use]
    pub fn active(&self, surface_vertex: usize) -> Option<&ActiveVertex> {
        self.active.get(surface_vertex).and_then(Option::as_ref)
    }

    /// Moves the front back onto the surface.
    pub fn reset(&mut self) {
        self.active.clone_from(&self.base);
        self.level = 0;
    }

    /// Contour layer: resets the front to the surface and extrudes it by
    /// `height`.
    pub fn generate_contour(
        &mut self,
        mesh: &mut VolumeMesh,
        bounds: &Aabb,
        height: f64,
        ctx: &mut InsertionContext,
    ) -> LayerStats {
        self.reset();
        self.extrude(mesh, bounds, height, ctx)
    }

    /// Extrudes the current front by `height`.
    pub fn generate_layer(
        &mut self,
        mesh: &mut VolumeMesh,
        bounds: &Aabb,
        height: f64,
        ctx: &mut InsertionContext,
    ) -> LayerStats {
        self.extrude(mesh, bounds, height, ctx)
    }

    /// Contour plus `n - 1` further layers, layer `i` (0-based) being
    /// `initial_height * growth_factor^i` thick.
    pub fn generate_n_layers(
        &mut self,
        mesh: &mut VolumeMesh,
        bounds: &Aabb,
        n: u32,
        initial_height: f64,
        growth_factor: f64,
        ctx: &mut InsertionContext,
    ) -> Vec<LayerStats> {
        let mut out = Vec::with_capacity(n as usize);
        let mut height = initial_height;
        for i in 0..n {
            let stats = if i == 0 {
                self.generate_contour(mesh, bounds, height, ctx)
            } else {
                self.generate_layer(mesh, bounds, height, ctx)
            };
            out.push(stats);
            if self.number_of_active() == 0 {
                tracing::debug!(layer = i + 1, "front is empty, stopping");
                break;
            }
            height *= growth_factor;
        }
        out
    }

    fn face_points(&self, t: usize) -> Option<[Point3<f64>; 3]> {
        let [a, b, c] = self.triangles[t];
        Some([
            self.active[a]?.position,
            self.active[b]?.position,
            self.active[c]?.position,
        ])
    }

    /// Unit normal and area of an active face.
    fn face_frame(&self, t: usize) -> Option<(Vector3<f64>, f64)> {
        let [a, b, c] = self.face_points(t)?;
        Some((triangle_normal(&a, &b, &c)?, triangle_area(&a, &b, &c)))
    }

    fn weighted_normal(&self, v: usize, weight: impl Fn(usize) -> f64) -> Option<Vector3<f64>> {
        let sum: Vector3<f64> = self.vertex_triangles[v]
            .iter()
            .filter_map(|&t| self.face_frame(t).map(|(n, area)| n * area * weight(t)))
            .sum();
        try_normalize(&sum)
    }

    /// Recomputes normal and curvature of every active vertex.
    ///
    /// Curvature is the mean normal deviation towards each active neighbor,
    /// `-(n_u - n_v) . (p_u - p_v) / |p_u - p_v|`. The final normal weights
    /// each face by `1 + |k|`, `k` being the mean curvature of its corners.
    fn update_frame(&mut self) {
        let n = self.active.len();
        let raw: Vec<Option<Vector3<f64>>> = (0..n)
            .map(|v| self.active[v].and_then(|_| self.weighted_normal(v, |_| 1.0)))
            .collect();

        let curvature: Vec<f64> = (0..n)
            .map(|v| {
                let (Some(a), Some(nv)) = (self.active[v], raw[v]) else {
                    return 0.0;
                };
                let mut sum = 0.0;
                let mut count = 0usize;
                for &u in &self.neighbors[v] {
                    let (Some(b), Some(nu)) = (self.active[u], raw[u]) else {
                        continue;
                    };
                    let d = b.position - a.position;
                    let len = d.norm();
                    if len > 0.0 {
                        sum -= (nu - nv).dot(&d) / len;
                        count += 1;
                    }
                }
                if count == 0 { 0.0 } else { sum / count_to_f64(count) }
            })
            .collect();

        let face_weight = |t: usize| {
            let [a, b, c] = self.triangles[t];
            1.0 + ((curvature[a] + curvature[b] + curvature[c]) / 3.0).abs()
        };
        let normals: Vec<Option<Vector3<f64>>> = (0..n)
            .map(|v| raw[v].and_then(|_| self.weighted_normal(v, face_weight)))
            .collect();

        for (v, slot) in self.active.iter_mut().enumerate() {
            if let Some(a) = slot {
                a.normal = normals[v].unwrap_or_else(Vector3::zeros);
                a.curvature = curvature[v];
            }
        }
    }

    /// `true` if `candidate` is on or behind a front face around `v`.
    fn is_behind(&self, v: usize, candidate: &Point3<f64>) -> bool {
        let Some(origin) = self.active[v].map(|a| a.position) else {
            return true;
        };
        let step = candidate - origin;
        self.vertex_triangles[v]
            .iter()
            .any(|&t| self.face_frame(t).is_some_and(|(normal, _)| step.dot(&normal) <= 0.0))
    }

    fn extrude(
        &mut self,
        mesh: &mut VolumeMesh,
        bounds: &Aabb,
        height: f64,
        ctx: &mut InsertionContext,
    ) -> LayerStats {
        self.update_frame();
        let level = self.level + 1;
        let min_separation = LAYER_SEPARATION_FACTOR * height;
        let inner = bounds.padded(-min_separation);
        let mut stats = LayerStats {
            level,
            ..LayerStats::default()
        };

        let mut next: Vec<Option<ActiveVertex>> = vec![None; self.active.len()];
        for (v, slot) in self.active.iter().enumerate() {
            let Some(a) = slot else {
                continue;
            };
            if a.uses >= self.max_uses {
                stats.exhausted += 1;
                continue;
            }
            if a.normal == Vector3::zeros() {
                stats.behind_front += 1;
                continue;
            }
            let scale = HEIGHT_CURVATURE_GAIN
                .mul_add(a.curvature, 1.0)
                .clamp(MIN_HEIGHT_SCALE, MAX_HEIGHT_SCALE);
            let candidate = a.position + a.normal * (height * scale);
            if !inner.contains_point(&candidate) {
                tracing::trace!(surface_vertex = v, level, "layer vertex leaves the domain");
                stats.outside_domain += 1;
                continue;
            }
            if self.is_behind(v, &candidate) {
                tracing::trace!(surface_vertex = v, level, "layer vertex behind the front");
                stats.behind_front += 1;
                continue;
            }
            match insert_vertex(mesh, candidate, VertexKind::Layer(level), min_separation, ctx) {
                Ok(InsertOutcome::Inserted(vertex)) => {
                    next[v] = Some(ActiveVertex {
                        vertex,
                        position: candidate,
                        uses: a.uses + 1,
                        ..*a
                    });
                    stats.extruded += 1;
                }
                Ok(InsertOutcome::Duplicate(existing)) => {
                    tracing::debug!(surface_vertex = v, ?existing, level, "layer vertex too close to an existing vertex");
                    stats.rejected += 1;
                }
                Err(err) => {
                    tracing::debug!(surface_vertex = v, level, %err, "layer vertex insertion failed");
                    stats.rejected += 1;
                }
            }
        }

        self.active = next;
        self.level = level;
        tracing::debug!(
            level,
            height,
            extruded = stats.extruded,
            dropped = stats.dropped(),
            "boundary layer extruded"
        );
        stats
    }
}

fn layer_span(mesh: &VolumeMesh, cell: &Cell) -> Option<(u32, u32)> {
    let mut lo = u32::MAX;
    let mut hi = 0;
    for &v in cell.vertices() {
        let level = mesh.vertex(v)?.kind().layer_level()?;
        lo = lo.min(level);
        hi = hi.max(level);
    }
    Some((lo, hi))
}

/// Cells whose vertices all belong to boundary layers, spanning exactly two
/// adjacent levels. The surface counts as level 0.
#[must_use]
pub fn boundary_layer_cells(mesh: &VolumeMesh) -> Vec<CellKey> {
    mesh.cells()
        .filter(|(_, cell)| layer_span(mesh, cell).is_some_and(|(lo, hi)| hi == lo + 1))
        .map(|(k, _)| k)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validation::validate_topology;
    use crate::geometry::quality::signed_volume;
    use crate::surface::primitives::icosphere;

    /// Volume mesh enclosing `surface`, with every surface vertex inserted.
    fn embed(surface: &SurfaceTriMesh) -> (VolumeMesh, Vec<Option<VertexKey>>, InsertionContext) {
        let mut mesh = VolumeMesh::new();
        let s = |x: f64, y: f64, z: f64| Point3::new(50.0 * x, 50.0 * y, 50.0 * z);
        let a = mesh.push_vertex(s(1.0, 1.0, 1.0), VertexKind::Super);
        let b = mesh.push_vertex(s(1.0, -1.0, -1.0), VertexKind::Super);
        let c = mesh.push_vertex(s(-1.0, 1.0, -1.0), VertexKind::Super);
        let d = mesh.push_vertex(s(-1.0, -1.0, 1.0), VertexKind::Super);
        mesh.insert_isolated_cell([a, c, b, d]).unwrap();

        let mut ctx = InsertionContext::new();
        let keys = surface
            .positions()
            .iter()
            .map(|&p| {
                insert_vertex(&mut mesh, p, VertexKind::Surface, 0.0, &mut ctx)
                    .ok()
                    .map(InsertOutcome::vertex)
            })
            .collect();
        (mesh, keys, ctx)
    }

    fn domain(half: f64) -> Aabb {
        Aabb::from_center_half_extent(Point3::origin(), Vector3::repeat(half))
    }

    #[test]
    fn test_layers_grow_outward_from_sphere() {
        let surface = icosphere(1);
        let (mut mesh, keys, mut ctx) = embed(&surface);
        assert!(keys.iter().all(Option::is_some));

        let mut front = DelaunayFront::new(&surface, &keys);
        let stats = front.generate_n_layers(&mut mesh, &domain(3.0), 2, 0.1, 1.5, &mut ctx);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].level, 1);
        assert_eq!(stats[0].extruded, surface.number_of_vertices());
        assert_eq!(stats[1].extruded, surface.number_of_vertices());
        assert_eq!(front.level(), 2);

        for (_, a) in front.active_vertices() {
            assert_eq!(a.uses, 2);
            assert!(a.curvature < 0.0, "sphere is convex");
            assert!(a.position.coords.norm() > 1.0);
        }
        for (_, v) in mesh.vertices() {
            if v.kind() == VertexKind::Layer(1) {
                let r = v.point().coords.norm();
                assert!(r > 1.0 && r <= 1.0 + 0.1 * MAX_HEIGHT_SCALE + 1e-9);
            }
        }

        let layer_cells = boundary_layer_cells(&mesh);
        assert!(!layer_cells.is_empty());
        for c in layer_cells {
            let [p0, p1, p2, p3] = mesh.cell_points(c).unwrap();
            assert!(signed_volume(&p0, &p1, &p2, &p3) > 0.0);
        }
        validate_topology(&mesh).unwrap();
    }

    #[test]
    fn test_vertices_leaving_domain_are_dropped() {
        let surface = icosphere(1);
        let (mut mesh, keys, mut ctx) = embed(&surface);
        let bounds = Aabb::new(Point3::new(-3.0, -3.0, -3.0), Point3::new(3.0, 3.0, 1.0));
        let mut front = DelaunayFront::new(&surface, &keys);

        let first = front.generate_contour(&mut mesh, &bounds, 0.3, &mut ctx);
        assert!(first.outside_domain > 0);
        assert!(first.extruded > 0);
        assert_eq!(first.extruded + first.dropped(), surface.number_of_vertices());
        assert_eq!(front.number_of_active(), first.extruded);
        for (_, a) in front.active_vertices() {
            assert!(a.position.z < 1.0);
        }

        let second = front.generate_layer(&mut mesh, &bounds, 0.3, &mut ctx);
        assert!(second.extruded <= first.extruded);
        assert_eq!(second.extruded + second.dropped(), first.extruded);
    }

    #[test]
    fn test_use_limit_retires_vertices() {
        let surface = icosphere(1);
        let (mut mesh, keys, mut ctx) = embed(&surface);
        let mut front = DelaunayFront::new(&surface, &keys).with_max_uses(1);

        let first = front.generate_contour(&mut mesh, &domain(3.0), 0.1, &mut ctx);
        assert_eq!(first.extruded, surface.number_of_vertices());
        let vertices = mesh.number_of_vertices();

        let second = front.generate_layer(&mut mesh, &domain(3.0), 0.1, &mut ctx);
        assert_eq!(second.extruded, 0);
        assert_eq!(second.exhausted, first.extruded);
        assert_eq!(second.dropped(), first.extruded);
        assert_eq!(front.number_of_active(), 0);
        assert_eq!(mesh.number_of_vertices(), vertices);

        // A new contour starts fresh chains.
        let again = front.generate_contour(&mut mesh, &domain(3.0), 0.3, &mut ctx);
        assert_eq!(again.exhausted, 0);
        assert!(again.extruded > 0);
    }

    #[test]
    fn test_contour_restarts_from_surface() {
        let surface = icosphere(0);
        let (mut mesh, keys, mut ctx) = embed(&surface);
        let mut front = DelaunayFront::new(&surface, &keys);
        front.generate_contour(&mut mesh, &domain(5.0), 0.2, &mut ctx);
        front.reset();
        assert_eq!(front.level(), 0);
        assert_eq!(front.active(0).map(|a| a.vertex), keys[0]);
    }

    #[test]
    fn test_surface_only_mesh_has_no_layer_cells() {
        let surface = icosphere(0);
        let (mesh, _, _) = embed(&surface);
        assert!(boundary_layer_cells(&mesh).is_empty());
    }
}
