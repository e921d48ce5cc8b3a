//! Incremental Delaunay tetrahedralization of a bounded domain.
//!
//! [`DelaunayMesh`] starts from one sentinel tetrahedron enclosing the domain
//! box and grows by cavity insertion. Every public operation leaves the mesh
//! structurally valid; a failed insertion leaves it unchanged.
//!
//! # Lifecycle
//!
//! 1. [`DelaunayMesh::new`] builds the sentinel tetrahedron
//! 2. Vertices are added with [`add_vertex`](DelaunayMesh::add_vertex) or
//!    [`add_vertices`](DelaunayMesh::add_vertices)
//! 3. Optional stages: [`constrain_triangulation`](DelaunayMesh::constrain_triangulation),
//!    [`grow_layers`](DelaunayMesh::grow_layers), [`refine`](DelaunayMesh::refine),
//!    [`smooth`](DelaunayMesh::smooth)
//! 4. [`remove_super`](DelaunayMesh::remove_super) drops the sentinel cells and
//!    [`complete`](DelaunayMesh::complete) validates the result
//!
//! # Examples
//!
//! ```
//! use cfd_mesh::prelude::*;
//!
//! let bounds = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
//! let mut dt = DelaunayMesh::new(bounds).unwrap();
//! let report = dt.add_vertices(
//!     bounds.corners().into_iter().map(|p| (p, VertexKind::Domain)),
//!     0.0,
//! );
//! assert_eq!(report.inserted.len(), 8);
//! dt.remove_super();
//! dt.complete().unwrap();
//! assert!(dt.number_of_cells() >= 5);
//! ```

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::algorithms::advancing_front::{DelaunayFront, LayerStats};
use crate::core::algorithms::boundary_recovery::{
    RecoveryConfig, RecoveryError, RecoveryReport, constrain_triangulation,
};
use crate::core::algorithms::flips::{
    DelaunayRepairStats, FlipError, RepairParams, repair_delaunay,
};
use crate::core::algorithms::incremental_insertion::{
    InsertOutcome, InsertionContext, InsertionError, insert_vertex,
};
use crate::core::algorithms::refinement::{RefinementStats, refine};
use crate::core::algorithms::smoothing::{SmoothingStats, smooth};
use crate::core::cell::CellKey;
use crate::core::validation::{MeshValidationError, validate_delaunay, validate_topology};
use crate::core::vertex::{VertexKey, VertexKind};
use crate::core::volume_mesh::{TopologyError, VolumeMesh};
use crate::geometry::aabb::Aabb;
use crate::geometry::point::centroid;
use crate::surface::bvh::SurfaceBvh;

// =============================================================================
// ERRORS AND PARAMETERS
// =============================================================================

/// Errors raised by [`DelaunayMesh`] construction and whole-mesh stages.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum DelaunayError {
    /// The domain box is empty or has a non-finite coordinate.
    #[error("Invalid domain bounds {bounds:?}")]
    InvalidBounds {
        /// The rejected box.
        bounds: Aabb,
    },
    /// The sentinel tetrahedron could not be built.
    #[error("Sentinel tetrahedron construction failed: {0}")]
    Topology(#[from] TopologyError),
    /// A flip failed to apply or a smoothing move could not be undone.
    #[error("Flip repair failed: {0}")]
    Flip(#[from] FlipError),
    /// Boundary recovery failed under the abort policy.
    #[error("Boundary recovery failed: {0}")]
    Recovery(#[from] RecoveryError),
    /// The final mesh breaks an invariant.
    #[error("Mesh validation failed: {0}")]
    Validation(#[from] MeshValidationError),
}

/// Engine-level tuning.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineParams {
    /// Sentinel tetrahedron size, in units of the domain half-diagonal.
    pub super_scale: f64,
    /// Iteration cap for [`DelaunayMesh::refine`].
    pub max_refinement_iterations: usize,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            super_scale: 20.0,
            max_refinement_iterations: 100_000,
        }
    }
}

impl EngineParams {
    #[must_use]
    pub const fn with_super_scale(mut self, super_scale: f64) -> Self {
        self.super_scale = super_scale;
        self
    }

    #[must_use]
    pub const fn with_max_refinement_iterations(mut self, max: usize) -> Self {
        self.max_refinement_iterations = max;
        self
    }
}

/// Per-call result of [`DelaunayMesh::add_vertices`].
///
/// Indices refer to positions in the input sequence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InsertionReport {
    /// Vertex representing each input point, `None` for rejected points.
    pub vertices: Vec<Option<VertexKey>>,
    /// Newly created vertices.
    pub inserted: Vec<VertexKey>,
    /// Inputs that fell on, or within the separation radius of, an existing
    /// vertex.
    pub duplicates: Vec<(usize, VertexKey)>,
    /// Inputs the engine could not insert.
    pub rejected: Vec<(usize, InsertionError)>,
}

impl InsertionReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

// =============================================================================
// DELAUNAY MESH
// =============================================================================

/// Delaunay tetrahedral mesh of a box-shaped domain.
#[derive(Debug)]
pub struct DelaunayMesh {
    mesh: VolumeMesh,
    bounds: Aabb,
    super_vertices: [VertexKey; 4],
    ctx: InsertionContext,
    params: EngineParams,
}

impl DelaunayMesh {
    /// Mesh over `bounds` with default [`EngineParams`].
    ///
    /// # Errors
    ///
    /// Returns [`DelaunayError::InvalidBounds`] for an empty or non-finite box.
    pub fn new(bounds: Aabb) -> Result<Self, DelaunayError> {
        Self::with_params(bounds, EngineParams::default())
    }

    /// Mesh over `bounds` with the given parameters.
    ///
    /// The sentinel vertices sit at alternate corners of a cube around the
    /// domain center, `super_scale` half-diagonals out.
    ///
    /// # Errors
    ///
    /// Returns [`DelaunayError::InvalidBounds`] for an empty or non-finite box.
    pub fn with_params(bounds: Aabb, params: EngineParams) -> Result<Self, DelaunayError> {
        let finite = bounds.min.iter().chain(bounds.max.iter()).all(|x| x.is_finite());
        if bounds.is_empty() || !finite {
            return Err(DelaunayError::InvalidBounds { bounds });
        }

        let center = bounds.center();
        let r = params.super_scale * bounds.half_diagonal().max(1.0);
        let at = |x: f64, y: f64, z: f64| center + Vector3::new(x, y, z) * r;

        let mut mesh = VolumeMesh::new();
        let a = mesh.push_vertex(at(1.0, 1.0, 1.0), VertexKind::Super);
        let b = mesh.push_vertex(at(1.0, -1.0, -1.0), VertexKind::Super);
        let c = mesh.push_vertex(at(-1.0, 1.0, -1.0), VertexKind::Super);
        let d = mesh.push_vertex(at(-1.0, -1.0, 1.0), VertexKind::Super);
        let first = mesh.insert_isolated_cell([a, c, b, d])?;

        let mut ctx = InsertionContext::new();
        ctx.hint = Some(first);
        tracing::debug!(?bounds, super_radius = r, "delaunay mesh initialized");
        Ok(Self {
            mesh,
            bounds,
            super_vertices: [a, b, c, d],
            ctx,
            params,
        })
    }

    #[must_use]
    pub const fn mesh(&self) -> &VolumeMesh {
        &self.mesh
    }

    /// Consumes the engine and returns the volume mesh.
    #[must_use]
    pub fn into_mesh(self) -> VolumeMesh {
        self.mesh
    }

    #[must_use]
    pub const fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    #[must_use]
    pub const fn params(&self) -> &EngineParams {
        &self.params
    }

    #[must_use]
    pub const fn super_vertices(&self) -> &[VertexKey; 4] {
        &self.super_vertices
    }

    /// Number of non-sentinel vertices.
    #[must_use]
    pub fn number_of_vertices(&self) -> usize {
        self.mesh.vertices().filter(|(_, v)| !v.is_super()).count()
    }

    #[must_use]
    pub fn number_of_cells(&self) -> usize {
        self.mesh.number_of_cells()
    }

    /// Number of cells touching a sentinel vertex.
    #[must_use]
    pub fn number_of_super_cells(&self) -> usize {
        self.mesh.cell_keys().filter(|&c| self.mesh.is_super_cell(c)).count()
    }

    /// Inserts one point.
    ///
    /// # Errors
    ///
    /// See [`insert_vertex`]. The mesh is unchanged on error.
    pub fn add_vertex(
        &mut self,
        point: Point3<f64>,
        kind: VertexKind,
        min_separation: f64,
    ) -> Result<InsertOutcome, InsertionError> {
        insert_vertex(&mut self.mesh, point, kind, min_separation, &mut self.ctx)
    }

    /// Inserts points in order. A rejected point is recorded and the batch
    /// continues.
    pub fn add_vertices<I>(&mut self, points: I, min_separation: f64) -> InsertionReport
    where
        I: IntoIterator<Item = (Point3<f64>, VertexKind)>,
    {
        let mut report = InsertionReport::default();
        for (i, (point, kind)) in points.into_iter().enumerate() {
            match self.add_vertex(point, kind, min_separation) {
                Ok(InsertOutcome::Inserted(v)) => {
                    report.inserted.push(v);
                    report.vertices.push(Some(v));
                }
                Ok(InsertOutcome::Duplicate(v)) => {
                    report.duplicates.push((i, v));
                    report.vertices.push(Some(v));
                }
                Err(err) => {
                    tracing::debug!(index = i, ?point, %err, "vertex rejected");
                    report.rejected.push((i, err));
                    report.vertices.push(None);
                }
            }
        }
        tracing::debug!(
            inserted = report.inserted.len(),
            duplicates = report.duplicates.len(),
            rejected = report.rejected.len(),
            "vertex batch inserted"
        );
        report
    }

    /// Circumcenter refinement down to `target_size` inside the domain box.
    ///
    /// With constrained faces present, insertion cavities stop at them, so the
    /// pass ends with [`restore_delaunay`](Self::restore_delaunay).
    ///
    /// # Errors
    ///
    /// Returns [`DelaunayError::Flip`] if the closing repair corrupts the mesh.
    pub fn refine(&mut self, target_size: f64) -> Result<RefinementStats, DelaunayError> {
        let stats = refine(
            &mut self.mesh,
            &self.bounds,
            target_size,
            self.params.max_refinement_iterations,
            &mut self.ctx,
        );
        if self.mesh.has_constraints() {
            self.restore_delaunay()?;
        }
        Ok(stats)
    }

    /// One Laplacian smoothing pass over interior vertices.
    ///
    /// # Errors
    ///
    /// Returns [`DelaunayError::Flip`] if a rejected move cannot be undone.
    pub fn smooth(&mut self) -> Result<SmoothingStats, DelaunayError> {
        Ok(smooth(&mut self.mesh, &mut self.ctx.scratch)?)
    }

    /// Forces `boundary_faces` into the mesh as constrained faces.
    ///
    /// # Errors
    ///
    /// Returns [`DelaunayError::Recovery`] when faces stay missing under
    /// [`RecoveryPolicy::Abort`](crate::core::algorithms::boundary_recovery::RecoveryPolicy::Abort)
    /// or a flip corrupts the mesh.
    pub fn constrain_triangulation(
        &mut self,
        boundary_faces: &[[VertexKey; 3]],
        surface: &SurfaceBvh,
        config: &RecoveryConfig,
    ) -> Result<RecoveryReport, DelaunayError> {
        Ok(constrain_triangulation(
            &mut self.mesh,
            boundary_faces,
            surface,
            config,
            &mut self.ctx,
        )?)
    }

    /// Grows `n` boundary layers from `front` inside the domain box, then
    /// runs [`restore_delaunay`](Self::restore_delaunay).
    ///
    /// # Errors
    ///
    /// Returns [`DelaunayError::Flip`] if the closing repair corrupts the mesh.
    pub fn grow_layers(
        &mut self,
        front: &mut DelaunayFront,
        n: u32,
        initial_height: f64,
        growth_factor: f64,
    ) -> Result<Vec<LayerStats>, DelaunayError> {
        let stats = front.generate_n_layers(
            &mut self.mesh,
            &self.bounds,
            n,
            initial_height,
            growth_factor,
            &mut self.ctx,
        );
        self.restore_delaunay()?;
        Ok(stats)
    }

    /// Flips every non-Delaunay face that a flip can remove, sweeping the
    /// whole mesh until a pass changes nothing.
    ///
    /// Insertions next to constrained faces leave such faces behind. Faces
    /// that stay non-Delaunay afterwards are blocked by constraints and are
    /// exempt from [`complete`](Self::complete).
    ///
    /// # Errors
    ///
    /// Returns [`DelaunayError::Flip`] if a validated flip fails to apply.
    pub fn restore_delaunay(&mut self) -> Result<DelaunayRepairStats, DelaunayError> {
        let params = RepairParams::for_mesh(&self.mesh).with_full_sweep(true);
        let seeds: Vec<CellKey> = self.mesh.cell_keys().collect();
        let stats = repair_delaunay(&mut self.mesh, &seeds, params, &mut self.ctx.scratch, None)?;
        self.ctx.hint = None;
        tracing::debug!(
            flips = stats.flips_performed(),
            unflippable = stats.unflippable,
            exhausted = stats.exhausted,
            "Delaunay property restored"
        );
        Ok(stats)
    }

    /// Deletes every cell touching a sentinel vertex and returns how many
    /// were removed.
    pub fn remove_super(&mut self) -> usize {
        let doomed: Vec<CellKey> = self
            .mesh
            .cell_keys()
            .filter(|&c| self.mesh.is_super_cell(c))
            .collect();
        let removed = self.mesh.remove_cells(&doomed);
        self.ctx.hint = None;
        tracing::debug!(removed, remaining = self.mesh.number_of_cells(), "sentinel cells removed");
        removed
    }

    /// Deletes every cell whose centroid satisfies `inside` and returns how
    /// many were removed.
    pub fn carve<F>(&mut self, mut inside: F) -> usize
    where
        F: FnMut(&Point3<f64>) -> bool,
    {
        let doomed: Vec<CellKey> = self
            .mesh
            .cells()
            .filter(|(_, cell)| {
                self.mesh
                    .points_of(cell.vertices())
                    .ok()
                    .and_then(|p| centroid(p.iter()).ok())
                    .is_some_and(|c| inside(&c))
            })
            .map(|(k, _)| k)
            .collect();
        let removed = self.mesh.remove_cells(&doomed);
        self.ctx.hint = None;
        tracing::debug!(removed, remaining = self.mesh.number_of_cells(), "cells carved");
        removed
    }

    /// Checks topology over the whole mesh and the local Delaunay property on
    /// every interior face that is not constrained.
    ///
    /// # Errors
    ///
    /// Returns the first [`MeshValidationError`] found.
    pub fn complete(&self) -> Result<(), DelaunayError> {
        validate_topology(&self.mesh)?;
        validate_delaunay(&self.mesh)?;
        Ok(())
    }
}
