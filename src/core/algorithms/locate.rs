//! Point location and conflict-region discovery.
//!
//! [`locate`] walks from a hint cell toward the query point, at each step
//! crossing the face whose outward normal points most directly at the point.
//! [`find_conflict_region`] then flood-fills the cells whose circumsphere
//! contains the point, producing the cavity that incremental insertion
//! replaces.

use nalgebra::Point3;

use crate::core::cell::{CellKey, FaceKey, FACE_VERTICES};
use crate::core::collections::{FastHashMap, FastHashSet, SmallBuffer};
use crate::core::vertex::VertexKey;
use crate::core::volume_mesh::{TopologyError, VolumeMesh};
use crate::geometry::predicates::{InSphere, Orientation, insphere, orientation};

/// Upper bound on cells visited by a single walk before falling back to a scan.
pub const MAX_WALK_STEPS: usize = 10_000;

/// Result of point location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateResult {
    /// The point is inside the cell or on its boundary.
    Inside(CellKey),
    /// The point is outside every cell of the mesh.
    Outside,
}

/// Error during point location.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum LocateError {
    /// Mesh has no cells
    #[error("Cannot locate in empty mesh")]
    EmptyMesh,

    /// A cell or vertex reference was stale
    #[error("Topology error during locate: {source}")]
    Topology {
        /// The underlying error
        #[from]
        source: TopologyError,
    },
}

/// Error during conflict region finding.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CavityError {
    /// Starting cell is invalid
    #[error("Invalid starting cell: {cell_key:?}")]
    InvalidStartCell {
        /// The invalid cell key
        cell_key: CellKey,
    },

    /// A boundary face was reached from two cavity cells
    #[error("Duplicate boundary face {face:?}: cavity is not manifold")]
    DuplicateBoundaryFace {
        /// The repeated face
        face: FaceKey,
    },

    /// A boundary edge is not shared by exactly two boundary faces
    #[error("Cavity boundary is open at edge {edge:?} (used {count} times)")]
    OpenBoundary {
        /// The edge, as sorted vertex keys
        edge: [VertexKey; 2],
        /// Number of boundary faces using it
        count: usize,
    },

    /// Both sides of a constrained face fell inside the cavity
    #[error("Constrained face {face:?} would be removed by the cavity")]
    ConstrainedFaceInCavity {
        /// The constrained face
        face: FaceKey,
    },

    /// The point is not visible from a hull face of the cavity
    #[error("Point is coplanar with or beyond hull face {face:?}")]
    NotStarShaped {
        /// The offending face
        face: FaceKey,
    },

    /// Cavity expansion ran past the number of cells in the mesh
    #[error("Cavity expansion did not terminate after {cells} cells")]
    ExpansionLimit {
        /// Cells in the cavity when expansion stopped
        cells: usize,
    },

    /// A cell or vertex reference was stale
    #[error("Topology error during conflict search: {source}")]
    Topology {
        /// The underlying error
        #[from]
        source: TopologyError,
    },
}

/// A face on the boundary of a cavity, stored in outward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CavityFace {
    /// Cavity cell that owns the face.
    pub cell: CellKey,
    /// Local face index in that cell.
    pub face: usize,
    /// Face vertices, outward from the cavity.
    pub vertices: [VertexKey; 3],
    /// Cell on the far side, if any.
    pub neighbor: Option<CellKey>,
}

/// Transient cavity state, reused across insertions.
#[derive(Debug, Default)]
pub struct Cavity {
    /// Cells in conflict with the point.
    pub cells: Vec<CellKey>,
    /// Outward boundary faces of the union of `cells`.
    pub boundary: Vec<CavityFace>,
    pub(crate) members: FastHashSet<CellKey>,
    pub(crate) stack: Vec<CellKey>,
    pub(crate) shared_face: FastHashMap<FaceKey, (CellKey, usize)>,
    pub(crate) edge_use: FastHashMap<[VertexKey; 2], usize>,
}

impl Cavity {
    /// Clears all state while keeping allocations.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.boundary.clear();
        self.members.clear();
        self.stack.clear();
        self.shared_face.clear();
        self.edge_use.clear();
    }

    /// Distinct vertices of the cavity cells.
    #[must_use]
    pub fn vertices(&self, mesh: &VolumeMesh) -> SmallBuffer<VertexKey, 32> {
        let mut out = SmallBuffer::new();
        for &c in &self.cells {
            if let Some(cell) = mesh.cell(c) {
                for &v in cell.vertices() {
                    if !out.contains(&v) {
                        out.push(v);
                    }
                }
            }
        }
        out
    }

    pub(crate) fn add_cell(&mut self, c: CellKey) -> bool {
        if self.members.insert(c) {
            self.cells.push(c);
            self.stack.push(c);
            true
        } else {
            false
        }
    }
}

/// Locates the cell containing `point` by walking from `hint`.
///
/// At each step the walk crosses the face with the largest positive signed
/// distance to the point; points on a face or edge resolve to either
/// adjacent cell. A revisited cell or an exhausted step budget falls back to
/// a linear scan, so the result is exact whenever the point lies in the mesh.
///
/// # Errors
///
/// Returns [`LocateError::EmptyMesh`] for a mesh without cells.
pub fn locate(
    mesh: &VolumeMesh,
    point: &Point3<f64>,
    hint: Option<CellKey>,
) -> Result<LocateResult, LocateError> {
    let mut current = match hint {
        Some(key) if mesh.contains_cell(key) => key,
        _ => mesh.cell_keys().next().ok_or(LocateError::EmptyMesh)?,
    };

    let mut visited: FastHashSet<CellKey> = FastHashSet::default();
    for _ in 0..MAX_WALK_STEPS {
        if !visited.insert(current) {
            break;
        }
        let cell = mesh
            .cell(current)
            .ok_or(TopologyError::MissingCell { cell: current })?;
        let points = mesh.points_of(cell.vertices())?;

        let mut best: Option<(usize, f64)> = None;
        for (i, face) in FACE_VERTICES.iter().enumerate() {
            let [a, b, c] = face.map(|j| points[j]);
            if orientation(&a, &b, &c, point) != Orientation::POSITIVE {
                continue;
            }
            let distance = cell.faces()[i].normal.dot(&(point - a));
            if best.is_none_or(|(_, d)| distance > d) {
                best = Some((i, distance));
            }
        }

        match best {
            None => return Ok(LocateResult::Inside(current)),
            Some((i, _)) => match cell.neighbor(i) {
                Some(next) => current = next,
                None => return Ok(LocateResult::Outside),
            },
        }
    }

    tracing::trace!(?point, "walk did not converge, scanning all cells");
    locate_by_scan(mesh, point)
}

/// Exhaustive point location.
///
/// # Errors
///
/// Returns an error only if the mesh holds a stale vertex reference.
pub fn locate_by_scan(mesh: &VolumeMesh, point: &Point3<f64>) -> Result<LocateResult, LocateError> {
    for (key, cell) in mesh.cells() {
        let points = mesh.points_of(cell.vertices())?;
        let outside = FACE_VERTICES.iter().any(|face| {
            let [a, b, c] = face.map(|j| points[j]);
            orientation(&a, &b, &c, point) == Orientation::POSITIVE
        });
        if !outside {
            return Ok(LocateResult::Inside(key));
        }
    }
    Ok(LocateResult::Outside)
}

/// In-sphere classification of `point` against cell `c`.
///
/// # Errors
///
/// Returns an error for a stale cell key.
pub fn cell_insphere(
    mesh: &VolumeMesh,
    c: CellKey,
    point: &Point3<f64>,
) -> Result<InSphere, TopologyError> {
    let [a, b, cc, d] = mesh.cell_points(c)?;
    Ok(insphere(&a, &b, &cc, &d, point))
}

/// Collects the cells whose circumsphere strictly contains `point`.
///
/// The flood fill starts at `start` (which always joins the cavity) and never
/// crosses constrained faces. A cell whose circumsphere passes through the
/// point ([`InSphere::BOUNDARY`]) is not in conflict; this tie rule keeps the
/// result deterministic for identical input order.
///
/// After the fill, [`close_cavity`] computes and validates the boundary.
///
/// # Errors
///
/// Returns [`CavityError::InvalidStartCell`] if `start` is stale.
pub fn find_conflict_region(
    mesh: &VolumeMesh,
    start: CellKey,
    point: &Point3<f64>,
    cavity: &mut Cavity,
) -> Result<(), CavityError> {
    cavity.clear();
    if !mesh.contains_cell(start) {
        return Err(CavityError::InvalidStartCell { cell_key: start });
    }
    cavity.add_cell(start);

    while let Some(c) = cavity.stack.pop() {
        let cell = mesh.cell(c).ok_or(TopologyError::MissingCell { cell: c })?;
        for i in 0..4 {
            let Some(n) = cell.neighbor(i) else {
                continue;
            };
            if cavity.members.contains(&n) || mesh.is_constrained(&cell.face_key(i)) {
                continue;
            }
            if cell_insphere(mesh, n, point)? == InSphere::INSIDE {
                cavity.add_cell(n);
            }
        }
    }
    Ok(())
}

/// Computes the outward boundary of the cavity and checks it is a closed
/// 2-manifold that `point` sees from inside.
///
/// Boundary faces are registered in the face-identity map; a face reached
/// twice means the cavity is not manifold. Every boundary edge must be used
/// by exactly two boundary faces. When the point is coplanar with (or beyond)
/// an interior boundary face, the cell across it is pulled into the cavity and
/// the boundary is recomputed.
///
/// # Errors
///
/// Returns a [`CavityError`] describing the first defect found.
pub fn close_cavity(
    mesh: &VolumeMesh,
    point: &Point3<f64>,
    cavity: &mut Cavity,
) -> Result<(), CavityError> {
    // Each expansion adds a cell, so the loop is bounded by the mesh size.
    for _ in 0..=mesh.number_of_cells() {
        collect_boundary(mesh, cavity)?;
        match first_invisible_face(mesh, point, cavity)? {
            None => return check_closed(cavity),
            Some(face) => {
                let key = FaceKey::new(face.vertices);
                match face.neighbor {
                    Some(n) if !mesh.is_constrained(&key) => {
                        cavity.add_cell(n);
                        cavity.stack.clear();
                    }
                    _ => return Err(CavityError::NotStarShaped { face: key }),
                }
            }
        }
    }
    Err(CavityError::ExpansionLimit {
        cells: cavity.cells.len(),
    })
}

fn collect_boundary(mesh: &VolumeMesh, cavity: &mut Cavity) -> Result<(), CavityError> {
    cavity.boundary.clear();
    cavity.shared_face.clear();
    for &c in &cavity.cells {
        let cell = mesh.cell(c).ok_or(TopologyError::MissingCell { cell: c })?;
        for i in 0..4 {
            let neighbor = cell.neighbor(i);
            let key = cell.face_key(i);
            if let Some(n) = neighbor
                && cavity.members.contains(&n)
            {
                if mesh.is_constrained(&key) {
                    return Err(CavityError::ConstrainedFaceInCavity { face: key });
                }
                continue;
            }
            if cavity.shared_face.insert(key, (c, i)).is_some() {
                return Err(CavityError::DuplicateBoundaryFace { face: key });
            }
            cavity.boundary.push(CavityFace {
                cell: c,
                face: i,
                vertices: cell.face_vertices(i),
                neighbor,
            });
        }
    }
    Ok(())
}

fn first_invisible_face(
    mesh: &VolumeMesh,
    point: &Point3<f64>,
    cavity: &Cavity,
) -> Result<Option<CavityFace>, CavityError> {
    for face in &cavity.boundary {
        let [a, b, c] = face.vertices;
        let (pa, pb, pc) = (mesh.point(a)?, mesh.point(b)?, mesh.point(c)?);
        // The new cell [a, c, b, p] must be positively oriented.
        if orientation(&pa, &pc, &pb, point) != Orientation::POSITIVE {
            return Ok(Some(*face));
        }
    }
    Ok(None)
}

fn check_closed(cavity: &mut Cavity) -> Result<(), CavityError> {
    cavity.edge_use.clear();
    for face in &cavity.boundary {
        let v = face.vertices;
        for k in 0..3 {
            let (a, b) = (v[k], v[(k + 1) % 3]);
            let edge = if a < b { [a, b] } else { [b, a] };
            *cavity.edge_use.entry(edge).or_insert(0) += 1;
        }
    }
    if let Some((edge, count)) = cavity.edge_use.iter().find(|&(_, &n)| n != 2) {
        return Err(CavityError::OpenBoundary {
            edge: *edge,
            count: *count,
        });
    }
    Ok(())
}
