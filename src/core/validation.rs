//! Structural and Delaunay validation of a [`VolumeMesh`].
//!
//! [`validate_topology`] checks that face adjacency is mutual and consistent,
//! that no link points at a removed cell, that every cell is positively
//! oriented, and that vertex incidence hints are live.
//!
//! [`validate_delaunay`] checks the empty-circumsphere property locally on
//! every interior face between non-sentinel cells. In a mesh with constrained
//! faces, a locally non-Delaunay face only counts as a violation when a flip
//! could remove it; faces that are locked in place by constraints are
//! accepted.
//!
//! [`find_global_violations`] is the quadratic brute-force check used by tests.

use thiserror::Error;

use crate::core::algorithms::flips::{flip_for_face, is_locally_non_delaunay};
use crate::core::cell::{CellKey, FaceKey};
use crate::core::collections::FastHashMap;
use crate::core::vertex::VertexKey;
use crate::core::volume_mesh::{TopologyError, VolumeMesh};
use crate::geometry::predicates::{InSphere, Orientation, insphere, orientation};

/// Errors reported by mesh validation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum MeshValidationError {
    /// A neighbor link points at a cell that no longer exists.
    #[error("Cell {cell:?} face {face} links to removed cell {neighbor:?}")]
    MissingNeighbor {
        /// Cell holding the stale link.
        cell: CellKey,
        /// Local face index.
        face: usize,
        /// The stale key.
        neighbor: CellKey,
    },
    /// A neighbor does not link back.
    #[error("Cell {neighbor:?} does not link back to {cell:?}")]
    AsymmetricNeighbor {
        /// The linking cell.
        cell: CellKey,
        /// The neighbor lacking the back-link.
        neighbor: CellKey,
    },
    /// Linked cells do not share the linking face.
    #[error("Cells {cell:?} and {neighbor:?} are linked but do not share face {face:?}")]
    FaceMismatch {
        /// The linking cell.
        cell: CellKey,
        /// The linked cell.
        neighbor: CellKey,
        /// The face as seen from `cell`.
        face: FaceKey,
    },
    /// A face is used by more than two cells.
    #[error("Face {face:?} is shared by {count} cells")]
    OverSharedFace {
        /// The face.
        face: FaceKey,
        /// Number of cells using it.
        count: usize,
    },
    /// A face is shared by two cells that are not linked across it.
    #[error("Face {face:?} is shared by two cells but not linked")]
    UnlinkedFace {
        /// The face.
        face: FaceKey,
    },
    /// A cell is flat or inverted.
    #[error("Cell {cell:?} has orientation {orientation}")]
    InvertedCell {
        /// The cell.
        cell: CellKey,
        /// Its orientation.
        orientation: Orientation,
    },
    /// An interior face is not locally Delaunay and could be flipped.
    #[error("Face {face:?} between {cell:?} and {neighbor:?} is not locally Delaunay")]
    NonDelaunayFace {
        /// One side.
        cell: CellKey,
        /// The other side.
        neighbor: CellKey,
        /// The face.
        face: FaceKey,
    },
    /// A vertex names an incident cell that is missing or does not contain it.
    #[error("Vertex {vertex:?} has a stale incident cell")]
    StaleIncidentCell {
        /// The vertex.
        vertex: VertexKey,
    },
    /// A cell references a vertex outside the pool.
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Checks adjacency symmetry, link liveness, face sharing, orientation and
/// vertex incidence.
///
/// # Errors
///
/// Returns the first [`MeshValidationError`] found.
pub fn validate_topology(mesh: &VolumeMesh) -> Result<(), MeshValidationError> {
    let mut face_use: FastHashMap<FaceKey, (usize, bool)> = FastHashMap::default();

    for (c, cell) in mesh.cells() {
        let [a, b, cc, d] = mesh.points_of(cell.vertices())?;
        let o = orientation(&a, &b, &cc, &d);
        if o != Orientation::POSITIVE {
            return Err(MeshValidationError::InvertedCell {
                cell: c,
                orientation: o,
            });
        }

        for i in 0..4 {
            let key = cell.face_key(i);
            let entry = face_use.entry(key).or_insert((0, false));
            entry.0 += 1;
            if entry.0 > 2 {
                return Err(MeshValidationError::OverSharedFace {
                    face: key,
                    count: entry.0,
                });
            }

            let Some(n) = cell.neighbor(i) else {
                continue;
            };
            entry.1 = true;
            let ncell = mesh.cell(n).ok_or(MeshValidationError::MissingNeighbor {
                cell: c,
                face: i,
                neighbor: n,
            })?;
            let j = ncell
                .face_index_of(&key)
                .ok_or(MeshValidationError::FaceMismatch {
                    cell: c,
                    neighbor: n,
                    face: key,
                })?;
            if ncell.neighbor(j) != Some(c) {
                return Err(MeshValidationError::AsymmetricNeighbor { cell: c, neighbor: n });
            }
        }
    }

    if let Some((face, _)) = face_use.iter().find(|&(_, &(count, linked))| count == 2 && !linked) {
        return Err(MeshValidationError::UnlinkedFace { face: *face });
    }

    for (v, vertex) in mesh.vertices() {
        if let Some(c) = vertex.incident_cell()
            && !mesh.cell(c).is_some_and(|cell| cell.contains_vertex(v))
        {
            return Err(MeshValidationError::StaleIncidentCell { vertex: v });
        }
    }
    Ok(())
}

/// Checks the local Delaunay property on interior faces between non-sentinel
/// cells.
///
/// Without constrained faces every such face must be locally Delaunay. With
/// constrained faces, a non-Delaunay face is reported only when a 2-3 or 3-2
/// flip could remove it.
///
/// # Errors
///
/// Returns [`MeshValidationError::NonDelaunayFace`] for the first violation.
pub fn validate_delaunay(mesh: &VolumeMesh) -> Result<(), MeshValidationError> {
    let constrained = mesh.has_constraints();
    for (c, cell) in mesh.cells() {
        if mesh.is_super_cell(c) {
            continue;
        }
        for i in 0..4 {
            let Some(n) = cell.neighbor(i) else {
                continue;
            };
            if n < c || mesh.is_super_cell(n) {
                continue;
            }
            if !is_locally_non_delaunay(mesh, c, i) {
                continue;
            }
            if constrained && flip_for_face(mesh, c, i).is_none() {
                continue;
            }
            return Err(MeshValidationError::NonDelaunayFace {
                cell: c,
                neighbor: n,
                face: cell.face_key(i),
            });
        }
    }
    Ok(())
}

/// Every (cell, vertex) pair where a non-sentinel vertex lies strictly inside
/// the circumsphere of a non-sentinel cell.
///
/// Quadratic; intended for tests and debugging.
#[must_use]
pub fn find_global_violations(mesh: &VolumeMesh) -> Vec<(CellKey, VertexKey)> {
    let mut out = Vec::new();
    for (c, cell) in mesh.cells() {
        if mesh.is_super_cell(c) {
            continue;
        }
        let Ok([a, b, cc, d]) = mesh.points_of(cell.vertices()) else {
            continue;
        };
        for (v, vertex) in mesh.vertices() {
            if vertex.is_super() || cell.contains_vertex(v) || vertex.incident_cell().is_none() {
                continue;
            }
            if insphere(&a, &b, &cc, &d, vertex.point()) == InSphere::INSIDE {
                out.push((c, v));
            }
        }
    }
    out
}
