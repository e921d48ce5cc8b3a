//! End-to-end volume mesh generation for one input model inside a domain box.
//!
//! Stages, in order:
//!
//! 1. Check the configuration and that the model fits inside the domain
//! 2. Extract feature curves and propagate the cross field
//! 3. Place surface points, splitting a working copy of the surface
//! 4. Insert the domain corners and every surface vertex into the engine
//! 5. Recover the surface triangles as constrained faces
//! 6. Grow the boundary layers
//! 7. Optionally refine and smooth the volume
//! 8. Remove the sentinel cells and carve the body interior
//! 9. Flip away non-Delaunay faces left by constrained insertions, validate
//!
//! Nothing is built when an input check fails.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::algorithms::advancing_front::{DelaunayFront, LayerStats, boundary_layer_cells};
use crate::core::algorithms::boundary_recovery::{RecoveryError, RecoveryReport};
use crate::core::algorithms::flips::DelaunayRepairStats;
use crate::core::algorithms::refinement::RefinementStats;
use crate::core::algorithms::smoothing::SmoothingStats;
use crate::core::delaunay::{DelaunayError, DelaunayMesh};
use crate::core::vertex::{VertexKey, VertexKind};
use crate::core::volume_mesh::VolumeMesh;
use crate::generation::config::{ConfigError, MeshGenerationConfig};
use crate::generation::debug::{BLUE, DebugRenderer, GREEN, RED};
use crate::geometry::aabb::Aabb;
use crate::geometry::point::{GeometryError, validate_point};
use crate::surface::bvh::SurfaceBvh;
use crate::surface::cross_field::CrossField;
use crate::surface::feature_edges::extract_feature_curves;
use crate::surface::point_placement::{PlacementStats, place_points};
use crate::surface::quad_dominant::{QuadDominantMesh, quad_dominant};
use crate::surface::tri_mesh::{SurfaceMeshError, SurfaceTriMesh};

/// Surface vertices closer than this fraction of the domain half-diagonal
/// are merged on insertion.
const SURFACE_SEPARATION_FACTOR: f64 = 1e-9;

// =============================================================================
// INPUTS
// =============================================================================

/// Axis-aligned box the volume mesh fills.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub center: Point3<f64>,
    pub half_extent: Vector3<f64>,
}

impl Domain {
    #[must_use]
    pub const fn new(center: Point3<f64>, half_extent: Vector3<f64>) -> Self {
        Self { center, half_extent }
    }

    /// `center ± half_extent`.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        Aabb::from_center_half_extent(self.center, self.half_extent)
    }
}

/// Closed surface of the body the flow goes around.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputModel {
    surface: SurfaceTriMesh,
}

impl InputModel {
    #[must_use]
    pub const fn new(surface: SurfaceTriMesh) -> Self {
        Self { surface }
    }

    /// # Errors
    ///
    /// See [`SurfaceTriMesh::from_triangles`].
    pub fn from_triangles(positions: Vec<Point3<f64>>, triangles: &[[usize; 3]]) -> Result<Self, SurfaceMeshError> {
        SurfaceTriMesh::from_triangles(positions, triangles).map(Self::new)
    }

    #[must_use]
    pub const fn surface(&self) -> &SurfaceTriMesh {
        &self.surface
    }
}

// =============================================================================
// OUTPUTS
// =============================================================================

/// Why generation stopped.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum MeshGenerationError {
    /// No model, no domain, or an empty model was supplied.
    #[error("No input mesh or domain")]
    NoMeshOrDomain,
    /// The model's bounding box is not inside the domain.
    #[error("Mesh bounds {mesh:?} are not inside domain {domain:?}")]
    MeshOutsideDomain {
        /// Bounding box of the model.
        mesh: Aabb,
        /// Domain box.
        domain: Aabb,
    },
    /// Boundary recovery left faces missing under the abort policy.
    #[error("Boundary recovery failed for {count} faces")]
    BoundaryRecoveryFailed {
        /// Number of missing faces.
        count: usize,
    },
    /// The configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The model has a non-finite vertex.
    #[error("Invalid input geometry: {0}")]
    Geometry(#[from] GeometryError),
    /// The surface remesher failed.
    #[error("Surface remeshing failed: {0}")]
    Surface(#[from] SurfaceMeshError),
    /// The volume engine failed.
    #[error("Volume meshing failed: {0}")]
    Engine(DelaunayError),
}

impl From<DelaunayError> for MeshGenerationError {
    fn from(err: DelaunayError) -> Self {
        match err {
            DelaunayError::Recovery(RecoveryError::Unrecovered { count, .. }) => {
                Self::BoundaryRecoveryFailed { count }
            }
            other => Self::Engine(other),
        }
    }
}

/// Per-stage counts of a successful run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GenerationReport {
    pub feature_curves: usize,
    pub placement: PlacementStats,
    /// Vertices of the remeshed surface.
    pub surface_vertices: usize,
    /// Vertices the engine rejected, across all batches.
    pub rejected_vertices: usize,
    pub recovery: RecoveryReport,
    pub layers: Vec<LayerStats>,
    pub refinement: Option<RefinementStats>,
    pub smoothing: Option<SmoothingStats>,
    pub super_cells_removed: usize,
    pub carved_cells: usize,
    /// Flips of the closing whole-mesh Delaunay sweep.
    pub final_repair: DelaunayRepairStats,
    pub cells: usize,
    pub boundary_layer_cells: usize,
}

impl GenerationReport {
    /// Vertices created by all boundary layers.
    #[must_use]
    pub fn layer_vertices(&self) -> usize {
        self.layers.iter().map(|l| l.extruded).sum()
    }

    /// `true` when every surface triangle is a face of the volume mesh.
    #[must_use]
    pub fn is_conforming(&self) -> bool {
        self.recovery.is_conforming()
    }
}

/// Result of [`generate_mesh`].
#[derive(Debug)]
pub struct GeneratedMesh {
    pub mesh: VolumeMesh,
    /// Remeshed surface the volume conforms to.
    pub surface: SurfaceTriMesh,
    pub quad_surface: Option<QuadDominantMesh>,
    pub report: GenerationReport,
}

// =============================================================================
// PIPELINE
// =============================================================================

fn check_inputs<'a>(
    model: Option<&'a InputModel>,
    domain: Option<&Domain>,
    config: &MeshGenerationConfig,
) -> Result<(&'a SurfaceTriMesh, Aabb), MeshGenerationError> {
    config.validate()?;
    let (Some(model), Some(domain)) = (model, domain) else {
        return Err(MeshGenerationError::NoMeshOrDomain);
    };
    let surface = model.surface();
    if surface.is_empty() || domain.half_extent.iter().any(|&h| h.is_nan() || h <= 0.0) {
        return Err(MeshGenerationError::NoMeshOrDomain);
    }
    for p in surface.positions() {
        validate_point(p)?;
    }
    let bounds = domain.bounds();
    let mesh_bounds = surface.aabb();
    if !bounds.contains_aabb(&mesh_bounds) {
        return Err(MeshGenerationError::MeshOutsideDomain {
            mesh: mesh_bounds,
            domain: bounds,
        });
    }
    Ok((surface, bounds))
}

/// Surface triangles as volume vertex triples, skipping triangles whose
/// corners were rejected or merged.
fn boundary_faces(surface: &SurfaceTriMesh, vertices: &[Option<VertexKey>]) -> Vec<[VertexKey; 3]> {
    surface
        .triangles()
        .filter_map(|[a, b, c]| {
            let face = [vertices[a]?, vertices[b]?, vertices[c]?];
            (face[0] != face[1] && face[1] != face[2] && face[2] != face[0]).then_some(face)
        })
        .collect()
}

/// Generates a volume mesh of `domain` around `model`.
///
/// # Errors
///
/// Input problems ([`MeshGenerationError::NoMeshOrDomain`],
/// [`MeshGenerationError::MeshOutsideDomain`], an invalid configuration or
/// non-finite vertex) are reported before any work is done. Under
/// [`RecoveryPolicy::Abort`](crate::core::algorithms::boundary_recovery::RecoveryPolicy::Abort),
/// missing boundary faces give [`MeshGenerationError::BoundaryRecoveryFailed`];
/// under `Warn` they are listed in the report instead.
pub fn generate_mesh(
    model: Option<&InputModel>,
    domain: Option<&Domain>,
    config: &MeshGenerationConfig,
    debug: &mut dyn DebugRenderer,
) -> Result<GeneratedMesh, MeshGenerationError> {
    let (input, bounds) = check_inputs(model, domain, config)?;
    let mut report = GenerationReport::default();

    // Surface remeshing.
    let mut surface = input.clone();
    let curves = extract_feature_curves(&surface, &config.feature_params());
    report.feature_curves = curves.len();
    for curve in &curves {
        for w in curve.polyline.points().windows(2) {
            debug.line(&w[0], &w[1], GREEN);
        }
    }
    let field = CrossField::propagate(&surface, &curves, &config.spacing_params());
    let placement = place_points(&mut surface, &field, &curves, &config.placement_params())?;
    for p in &placement.points {
        debug.point(&p.position, BLUE);
    }
    report.placement = placement.stats;
    report.surface_vertices = surface.number_of_vertices();
    let quad_surface = config
        .quad_dominant
        .then(|| quad_dominant(&surface, config.min_quad_quality));

    // Volume.
    let mut dt = DelaunayMesh::new(bounds)?;
    let corners = dt.add_vertices(bounds.corners().into_iter().map(|p| (p, VertexKind::Domain)), 0.0);
    let separation = SURFACE_SEPARATION_FACTOR * bounds.half_diagonal();
    let inserted = dt.add_vertices(
        surface.positions().iter().map(|&p| (p, VertexKind::Surface)),
        separation,
    );
    report.rejected_vertices = corners.rejected.len() + inserted.rejected.len();

    let faces = boundary_faces(&surface, &inserted.vertices);
    let bvh = SurfaceBvh::new(&surface);
    report.recovery = dt.constrain_triangulation(&faces, &bvh, &config.recovery_config())?;
    for face in &report.recovery.failed {
        if let [Ok(a), Ok(b), Ok(c)] = face.map(|v| dt.mesh().point(v)) {
            debug.triangle(&a, &b, &c, RED);
        }
    }
    if !report.recovery.is_conforming() {
        tracing::warn!(
            failed = report.recovery.failed.len(),
            "volume mesh does not conform to the surface"
        );
    }

    let mut front = DelaunayFront::new(&surface, &inserted.vertices).with_max_uses(config.contour_layers);
    report.layers = dt.grow_layers(
        &mut front,
        config.contour_layers,
        config.initial_layer_height,
        config.layer_growth_factor,
    )?;

    if config.refine {
        report.refinement = Some(dt.refine(config.grid_resolution)?);
    }
    if config.smooth {
        report.smoothing = Some(dt.smooth()?);
    }

    report.super_cells_removed = dt.remove_super();
    if config.carve_interior {
        report.carved_cells = dt.carve(|c| bvh.is_inside(c));
    }
    report.final_repair = dt.restore_delaunay()?;
    if report.final_repair.exhausted {
        tracing::warn!(
            flips = report.final_repair.flips_performed(),
            "closing Delaunay sweep ran out of flips"
        );
    }
    dt.complete()?;

    report.cells = dt.number_of_cells();
    report.boundary_layer_cells = boundary_layer_cells(dt.mesh()).len();
    tracing::debug!(
        cells = report.cells,
        surface_vertices = report.surface_vertices,
        layer_vertices = report.layer_vertices(),
        boundary_layer_cells = report.boundary_layer_cells,
        conforming = report.is_conforming(),
        "mesh generation finished"
    );

    Ok(GeneratedMesh {
        mesh: dt.into_mesh(),
        surface,
        quad_surface,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::debug::{NullDebugRenderer, RecordingDebugRenderer};
    use crate::surface::primitives::{cube, icosphere};

    fn domain(half: f64) -> Domain {
        Domain::new(Point3::origin(), Vector3::repeat(half))
    }

    #[test]
    fn test_missing_inputs() {
        let config = MeshGenerationConfig::default();
        let model = InputModel::new(icosphere(1));
        let err = generate_mesh(None, Some(&domain(10.0)), &config, &mut NullDebugRenderer).unwrap_err();
        assert_eq!(err, MeshGenerationError::NoMeshOrDomain);
        let err = generate_mesh(Some(&model), None, &config, &mut NullDebugRenderer).unwrap_err();
        assert_eq!(err, MeshGenerationError::NoMeshOrDomain);
        let empty = InputModel::default();
        let err = generate_mesh(Some(&empty), Some(&domain(10.0)), &config, &mut NullDebugRenderer).unwrap_err();
        assert_eq!(err, MeshGenerationError::NoMeshOrDomain);
    }

    #[test]
    fn test_model_outside_domain() {
        let model = InputModel::new(icosphere(1).translated(&Vector3::new(9.5, 0.0, 0.0)));
        let err = generate_mesh(
            Some(&model),
            Some(&domain(10.0)),
            &MeshGenerationConfig::default(),
            &mut NullDebugRenderer,
        )
        .unwrap_err();
        assert!(matches!(err, MeshGenerationError::MeshOutsideDomain { .. }));
    }

    #[test]
    fn test_invalid_config_is_rejected_first() {
        let config = MeshGenerationConfig {
            grid_resolution: 0.0,
            ..MeshGenerationConfig::default()
        };
        let err = generate_mesh(None, None, &config, &mut NullDebugRenderer).unwrap_err();
        assert!(matches!(err, MeshGenerationError::Config(_)));
    }

    #[test]
    fn test_cube_in_box() {
        let model = InputModel::new(cube(4).translated(&Vector3::repeat(-0.5)));
        let config = MeshGenerationConfig {
            grid_resolution: 0.25,
            contour_layers: 1,
            quad_dominant: true,
            ..MeshGenerationConfig::default()
        };
        let mut debug = RecordingDebugRenderer::new();
        let out = generate_mesh(Some(&model), Some(&domain(3.0)), &config, &mut debug).unwrap();

        assert_eq!(out.report.feature_curves, 12);
        assert!(debug.number_of_lines() > 0);
        assert!(debug.number_of_points() > 0);
        assert!(out.report.cells > 0);
        assert!(out.report.super_cells_removed > 0);
        assert!(out.report.carved_cells > 0);
        assert!(out.quad_surface.is_some());
        assert!(out.mesh.cells().all(|(k, _)| !out.mesh.is_super_cell(k)));
    }
}
