//! Incremental Delaunay insertion using the cavity algorithm.
//!
//! 1. Locate the cell containing the new point (face walk)
//! 2. Flood-fill the conflict region with in-sphere tests
//! 3. Validate that the cavity boundary is closed and manifold
//! 4. Reject the point if it lands on, or too close to, a cavity vertex
//! 5. Replace the cavity by one cell per boundary face joined to the new vertex
//!
//! Step 5 goes through [`VolumeMesh::replace_cells`], which validates the new
//! cells before committing, so a failed insertion leaves the mesh unchanged.

use nalgebra::Point3;

use crate::core::algorithms::locate::{
    Cavity, CavityError, LocateError, LocateResult, close_cavity, find_conflict_region, locate,
};
use crate::core::cell::{CellKey, cell_from_outward_face};
use crate::core::vertex::{VertexKey, VertexKind};
use crate::core::volume_mesh::{ReplaceScratch, TopologyError, VolumeMesh};
use crate::geometry::point::{GeometryError, validate_point};

/// Error during incremental insertion.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum InsertionError {
    /// The point has a non-finite coordinate
    #[error("Invalid point: {0}")]
    InvalidPoint(#[from] GeometryError),

    /// Point location failed
    #[error("Location error: {0}")]
    Location(#[from] LocateError),

    /// The point lies outside every cell
    #[error("Point {point:?} lies outside the triangulation")]
    OutsideHull {
        /// The rejected point
        point: Point3<f64>,
    },

    /// Cavity construction failed
    #[error("Cavity error: {0}")]
    Cavity(#[from] CavityError),

    /// Filling the cavity would produce invalid cells
    #[error("Cavity filling failed: {0}")]
    Topology(#[from] TopologyError),
}

/// Outcome of a single successful insertion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new vertex was created.
    Inserted(VertexKey),
    /// The point coincides with, or lies within the separation radius of, an
    /// existing vertex; nothing changed.
    Duplicate(VertexKey),
}

impl InsertOutcome {
    /// The vertex now representing the point.
    #[must_use]
    pub const fn vertex(self) -> VertexKey {
        match self {
            Self::Inserted(v) | Self::Duplicate(v) => v,
        }
    }

    #[must_use]
    pub const fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Scratch buffers reused across insertions, plus the walk hint.
#[derive(Debug, Default)]
pub struct InsertionContext {
    pub(crate) cavity: Cavity,
    pub(crate) scratch: ReplaceScratch,
    new_cells: Vec<[VertexKey; 4]>,
    /// Last cell touched; the next walk starts here.
    pub(crate) hint: Option<CellKey>,
}

impl InsertionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Inserts `point` into a Delaunay mesh.
///
/// Points within `min_separation` of a vertex of the conflict cavity are
/// reported as [`InsertOutcome::Duplicate`]; with `min_separation == 0.0`
/// only exact coincidence counts. The nearest existing vertex is always a
/// cavity vertex in an unconstrained mesh, so this finds every vertex inside
/// the separation radius.
///
/// # Errors
///
/// Returns an [`InsertionError`] if the point is invalid, outside the mesh, or
/// its cavity cannot be rebuilt. The mesh is unchanged in every error case.
pub fn insert_vertex(
    mesh: &mut VolumeMesh,
    point: Point3<f64>,
    kind: VertexKind,
    min_separation: f64,
    ctx: &mut InsertionContext,
) -> Result<InsertOutcome, InsertionError> {
    validate_point(&point)?;

    let start = match locate(mesh, &point, ctx.hint)? {
        LocateResult::Inside(c) => c,
        LocateResult::Outside => return Err(InsertionError::OutsideHull { point }),
    };
    ctx.hint = Some(start);

    find_conflict_region(mesh, start, &point, &mut ctx.cavity)?;
    close_cavity(mesh, &point, &mut ctx.cavity)?;

    if let Some(existing) = nearby_vertex(mesh, &point, min_separation, &ctx.cavity)? {
        tracing::trace!(vertex = ?existing, "point coincides with existing vertex");
        return Ok(InsertOutcome::Duplicate(existing));
    }

    let v = mesh.push_vertex(point, kind);
    ctx.new_cells.clear();
    ctx.new_cells.extend(
        ctx.cavity
            .boundary
            .iter()
            .map(|face| cell_from_outward_face(face.vertices, v)),
    );

    match mesh.replace_cells(&ctx.cavity.cells, &ctx.new_cells, &mut ctx.scratch) {
        Ok(created) => {
            ctx.hint = created.first().copied();
            Ok(InsertOutcome::Inserted(v))
        }
        Err(err) => {
            mesh.orphan_unreferenced_vertex(v);
            Err(err.into())
        }
    }
}

fn nearby_vertex(
    mesh: &VolumeMesh,
    point: &Point3<f64>,
    min_separation: f64,
    cavity: &Cavity,
) -> Result<Option<VertexKey>, TopologyError> {
    let limit = min_separation.max(0.0).powi(2);
    let mut best: Option<(VertexKey, f64)> = None;
    for v in cavity.vertices(mesh) {
        let Some(vertex) = mesh.vertex(v) else {
            return Err(TopologyError::MissingVertex { vertex: v });
        };
        if vertex.is_super() {
            continue;
        }
        let d2 = (vertex.point() - point).norm_squared();
        if d2 <= limit && best.is_none_or(|(_, b)| d2 < b) {
            best = Some((v, d2));
        }
    }
    Ok(best.map(|(v, _)| v))
}
