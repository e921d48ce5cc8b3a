//! Bistellar flips and flip-based Delaunay repair.
//!
//! Two moves are implemented:
//!
//! - **2-3**: two cells sharing a face `uvw` become three cells around the new
//!   edge joining their apexes. Valid when the union of the two cells is
//!   convex across every edge of `uvw`.
//! - **3-2**: three cells around an edge of degree three become two cells
//!   sharing the triangle formed by the edge's ring. Valid when the edge
//!   crosses that triangle.
//!
//! A flip is planned first ([`FlipPlan`]) and applied through
//! [`VolumeMesh::replace_cells`], so an invalid flip is rejected without
//! touching the mesh. Constrained faces are never removed by a flip.
//!
//! [`repair_delaunay`] drives flips from a queue of suspect faces until every
//! queued face is locally Delaunay or cannot be flipped.
//!
//! # References
//! - Edelsbrunner & Shah (1996) - "Incremental Topological Flipping Works for Regular Triangulations"

use std::collections::VecDeque;
use std::fmt;

use thiserror::Error;

use crate::core::cell::{CellKey, FaceKey, cell_from_outward_face};
use crate::core::collections::{FastHashSet, SmallBuffer};
use crate::core::vertex::VertexKey;
use crate::core::volume_mesh::{ReplaceScratch, TopologyError, VolumeMesh};
use crate::geometry::predicates::{InSphere, Orientation, insphere, orientation};

/// Errors that can occur while planning or applying a flip.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum FlipError {
    /// The face is on the hull (no adjacent cell).
    #[error("Face {face:?} is on the hull")]
    HullFace {
        /// The face in question.
        face: FaceKey,
    },
    /// The face is constrained and may not be removed.
    #[error("Face {face:?} is constrained")]
    ConstrainedFace {
        /// The constrained face.
        face: FaceKey,
    },
    /// A 3-2 flip was requested on an edge of the wrong degree.
    #[error("Edge {edge:?} has degree {degree}, a 3-2 flip needs 3")]
    EdgeDegree {
        /// The edge.
        edge: [VertexKey; 2],
        /// Number of cells around it.
        degree: usize,
    },
    /// The cells around an edge do not close into a ring.
    #[error("Edge {edge:?} lies on the hull")]
    HullEdge {
        /// The edge.
        edge: [VertexKey; 2],
    },
    /// The configuration is not convex; a new cell would be flat or inverted.
    #[error("Flip would create a cell with orientation {orientation}")]
    NotConvex {
        /// Orientation of the first bad cell.
        orientation: Orientation,
    },
    /// The referenced cell was not found.
    #[error("Cell not found: {cell_key:?}")]
    MissingCell {
        /// Missing cell key.
        cell_key: CellKey,
    },
    /// A cell recorded in the undo log no longer exists.
    #[error("Logged cell {vertices:?} is no longer in the mesh")]
    UndoMismatch {
        /// Vertices of the missing cell.
        vertices: [VertexKey; 4],
    },
    /// Replacement failed.
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Kind of bistellar move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipKind {
    /// Two cells to three.
    TwoToThree,
    /// Three cells to two.
    ThreeToTwo,
}

impl fmt::Display for FlipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TwoToThree => write!(f, "2-3"),
            Self::ThreeToTwo => write!(f, "3-2"),
        }
    }
}

/// A planned flip: the cells to remove and the vertex arrays replacing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlipPlan {
    /// Move kind.
    pub kind: FlipKind,
    /// Cells that the flip removes.
    pub removed: SmallBuffer<CellKey, 3>,
    /// Positively oriented cells (if the plan is valid) that replace them.
    pub created: SmallBuffer<[VertexKey; 4], 3>,
}

impl FlipPlan {
    /// Checks the geometric validity of the plan without touching the mesh.
    ///
    /// # Errors
    ///
    /// Returns [`FlipError::NotConvex`] if a new cell is not positively
    /// oriented.
    pub fn check(&self, mesh: &VolumeMesh) -> Result<(), FlipError> {
        for cell in &self.created {
            let [a, b, c, d] = mesh.points_of(cell)?;
            let o = orientation(&a, &b, &c, &d);
            if o != Orientation::POSITIVE {
                return Err(FlipError::NotConvex { orientation: o });
            }
        }
        Ok(())
    }
}

/// Plans the 2-3 flip of face `face` of cell `c`.
///
/// The three new cells join each of `c`'s other faces to the apex of the
/// neighbor across `face`.
///
/// # Errors
///
/// Returns a [`FlipError`] if the face is on the hull or constrained, or if
/// the cells are missing. Geometric validity is checked separately with
/// [`FlipPlan::check`].
pub fn plan_flip_23(mesh: &VolumeMesh, c: CellKey, face: usize) -> Result<FlipPlan, FlipError> {
    let cell = mesh.cell(c).ok_or(FlipError::MissingCell { cell_key: c })?;
    let key = cell.face_key(face);
    if mesh.is_constrained(&key) {
        return Err(FlipError::ConstrainedFace { face: key });
    }
    let n = cell.neighbor(face).ok_or(FlipError::HullFace { face: key })?;
    let ncell = mesh.cell(n).ok_or(FlipError::MissingCell { cell_key: n })?;
    let far = ncell
        .face_index_of(&key)
        .map(|j| ncell.vertices()[j])
        .ok_or(FlipError::MissingCell { cell_key: n })?;

    let created = (0..4)
        .filter(|&j| j != face)
        .map(|j| cell_from_outward_face(cell.face_vertices(j), far))
        .collect();
    Ok(FlipPlan {
        kind: FlipKind::TwoToThree,
        removed: SmallBuffer::from_slice(&[c, n]),
        created,
    })
}

/// Plans the 3-2 flip removing edge `(a, b)`.
///
/// # Errors
///
/// Returns a [`FlipError`] if the edge does not have exactly three cells
/// around it, lies on the hull, or one of the faces around it is constrained.
pub fn plan_flip_32(mesh: &VolumeMesh, a: VertexKey, b: VertexKey) -> Result<FlipPlan, FlipError> {
    let edge = [a, b];
    let around = mesh.cells_around_edge(a, b);
    if around.len() != 3 {
        return Err(FlipError::EdgeDegree {
            edge,
            degree: around.len(),
        });
    }

    let mut ring: SmallBuffer<VertexKey, 3> = SmallBuffer::new();
    for &c in &around {
        let cell = mesh.cell(c).ok_or(FlipError::MissingCell { cell_key: c })?;
        for i in 0..4 {
            let v = cell.vertices()[i];
            if v == a || v == b {
                continue;
            }
            if !ring.contains(&v) {
                ring.push(v);
            }
            // Face opposite `v` contains the edge; it must lead to another cell of the ring.
            let key = cell.face_key(i);
            if mesh.is_constrained(&key) {
                return Err(FlipError::ConstrainedFace { face: key });
            }
            if !cell.neighbor(i).is_some_and(|n| around.contains(&n)) {
                return Err(FlipError::HullEdge { edge });
            }
        }
    }
    if ring.len() != 3 {
        return Err(FlipError::EdgeDegree {
            edge,
            degree: ring.len(),
        });
    }

    let (p, mut q, mut r) = (ring[0], ring[1], ring[2]);
    let [pp, pq, pr, pa] = mesh.points_of(&[p, q, r, a])?;
    if orientation(&pp, &pq, &pr, &pa) == Orientation::NEGATIVE {
        std::mem::swap(&mut q, &mut r);
    }
    Ok(FlipPlan {
        kind: FlipKind::ThreeToTwo,
        removed: around.iter().copied().collect(),
        created: SmallBuffer::from_slice(&[[p, q, r, a], [p, r, q, b]]),
    })
}

/// Applies a planned flip and returns the keys of the new cells.
///
/// # Errors
///
/// Returns a [`FlipError`] if the replacement is rejected; the mesh is then
/// unchanged.
pub fn apply_flip(
    mesh: &mut VolumeMesh,
    plan: &FlipPlan,
    scratch: &mut ReplaceScratch,
) -> Result<SmallBuffer<CellKey, 3>, FlipError> {
    let created = mesh.replace_cells(&plan.removed, &plan.created, scratch)?;
    Ok(created.into_iter().collect())
}

/// Finds a valid flip that removes the face `face` of cell `c`.
///
/// Tries the 2-3 flip of the face first, then a 3-2 flip on each of its
/// edges whose ring includes both cells.
#[must_use]
pub fn flip_for_face(mesh: &VolumeMesh, c: CellKey, face: usize) -> Option<FlipPlan> {
    let plan = plan_flip_23(mesh, c, face).ok()?;
    if plan.check(mesh).is_ok() {
        return Some(plan);
    }
    let neighbor = plan.removed[1];
    let cell = mesh.cell(c)?;
    let [u, v, w] = cell.face_vertices(face);
    [(u, v), (v, w), (w, u)].into_iter().find_map(|(a, b)| {
        let plan = plan_flip_32(mesh, a, b).ok()?;
        (plan.removed.contains(&c) && plan.removed.contains(&neighbor) && plan.check(mesh).is_ok())
            .then_some(plan)
    })
}

/// Returns `true` if face `face` of `c` is interior, unconstrained, and the
/// apex across it lies strictly inside `c`'s circumsphere.
#[must_use]
pub fn is_locally_non_delaunay(mesh: &VolumeMesh, c: CellKey, face: usize) -> bool {
    let Some(cell) = mesh.cell(c) else {
        return false;
    };
    let key = cell.face_key(face);
    if mesh.is_constrained(&key) {
        return false;
    }
    let Some(ncell) = cell.neighbor(face).and_then(|n| mesh.cell(n)) else {
        return false;
    };
    let Some(far) = ncell.face_index_of(&key).map(|j| ncell.vertices()[j]) else {
        return false;
    };
    let (Ok([a, b, cc, d]), Ok(e)) = (mesh.points_of(cell.vertices()), mesh.point(far)) else {
        return false;
    };
    insphere(&a, &b, &cc, &d, &e) == InSphere::INSIDE
}

// =============================================================================
// UNDO LOG
// =============================================================================

/// Cells are identified by vertex set, since a later flip may have replaced
/// (and re-keyed) cells created by an earlier one.
#[derive(Debug, Clone)]
struct FlipRecord {
    created: SmallBuffer<[VertexKey; 4], 3>,
    previous: SmallBuffer<[VertexKey; 4], 3>,
}

/// Record of applied flips that can be undone in reverse order.
#[derive(Debug, Clone, Default)]
pub struct FlipLog {
    records: Vec<FlipRecord>,
}

impl FlipLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Reverts every logged flip, newest first, and clears the log.
    ///
    /// # Errors
    ///
    /// Returns an error if a logged cell was modified by something other
    /// than the logged flips.
    pub fn undo(&mut self, mesh: &mut VolumeMesh, scratch: &mut ReplaceScratch) -> Result<(), FlipError> {
        while let Some(record) = self.records.pop() {
            let mut current: SmallBuffer<CellKey, 3> = SmallBuffer::new();
            for vertices in &record.created {
                let c = mesh
                    .find_cell(vertices)
                    .ok_or(FlipError::UndoMismatch { vertices: *vertices })?;
                current.push(c);
            }
            mesh.replace_cells(&current, &record.previous, scratch)?;
        }
        Ok(())
    }
}

/// Applies `plan`, logging it for undo.
///
/// # Errors
///
/// See [`apply_flip`].
pub fn apply_logged(
    mesh: &mut VolumeMesh,
    plan: &FlipPlan,
    scratch: &mut ReplaceScratch,
    log: &mut FlipLog,
) -> Result<SmallBuffer<CellKey, 3>, FlipError> {
    let previous = plan
        .removed
        .iter()
        .filter_map(|&c| mesh.cell(c).map(|cell| *cell.vertices()))
        .collect();
    let created = apply_flip(mesh, plan, scratch)?;
    log.records.push(FlipRecord {
        created: plan.created.clone(),
        previous,
    });
    Ok(created)
}

// =============================================================================
// DELAUNAY REPAIR
// =============================================================================

/// Counters reported by [`repair_delaunay`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DelaunayRepairStats {
    /// Number of queued faces checked.
    pub faces_checked: usize,
    /// Number of 2-3 flips performed.
    pub flips_23: usize,
    /// Number of 3-2 flips performed.
    pub flips_32: usize,
    /// Non-Delaunay faces that no flip could remove.
    pub unflippable: usize,
    /// Whether the flip budget ran out.
    pub exhausted: bool,
}

impl DelaunayRepairStats {
    #[must_use]
    pub const fn flips_performed(&self) -> usize {
        self.flips_23 + self.flips_32
    }
}

/// Parameters for [`repair_delaunay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairParams {
    /// Maximum number of flips before giving up.
    pub max_flips: usize,
    /// Re-scan every cell after the queue drains, until a scan finds nothing.
    pub full_sweep: bool,
}

impl RepairParams {
    /// Budget proportional to the mesh size.
    #[must_use]
    pub fn for_mesh(mesh: &VolumeMesh) -> Self {
        Self {
            max_flips: 64 * mesh.number_of_cells().max(16),
            full_sweep: false,
        }
    }

    #[must_use]
    pub const fn with_full_sweep(mut self, full_sweep: bool) -> Self {
        self.full_sweep = full_sweep;
        self
    }
}

/// Restores local Delaunayness around `seeds` by flipping.
///
/// Every face of every seed cell is queued; each flip queues the faces of the
/// cells it creates. Constrained faces are never flipped. When `log` is given,
/// applied flips are recorded so the caller can undo them.
///
/// # Errors
///
/// Returns an error only if a validated flip fails to apply, which indicates
/// corrupted topology.
pub fn repair_delaunay(
    mesh: &mut VolumeMesh,
    seeds: &[CellKey],
    params: RepairParams,
    scratch: &mut ReplaceScratch,
    mut log: Option<&mut FlipLog>,
) -> Result<DelaunayRepairStats, FlipError> {
    let mut stats = DelaunayRepairStats::default();
    let mut queue: VecDeque<(CellKey, usize)> = VecDeque::new();
    let mut queued: FastHashSet<(CellKey, usize)> = FastHashSet::default();
    for &c in seeds {
        push_cell(&mut queue, &mut queued, c);
    }

    loop {
        let flips_before_pass = stats.flips_performed();
        while let Some((c, face)) = queue.pop_front() {
            queued.remove(&(c, face));
            if !mesh.contains_cell(c) {
                continue;
            }
            stats.faces_checked += 1;
            if !is_locally_non_delaunay(mesh, c, face) {
                continue;
            }
            let Some(plan) = flip_for_face(mesh, c, face) else {
                stats.unflippable += 1;
                continue;
            };
            if stats.flips_performed() >= params.max_flips {
                stats.exhausted = true;
                tracing::warn!(max_flips = params.max_flips, "Delaunay repair hit its flip budget");
                return Ok(stats);
            }
            let created = match log.as_deref_mut() {
                Some(log) => apply_logged(mesh, &plan, scratch, log)?,
                None => apply_flip(mesh, &plan, scratch)?,
            };
            match plan.kind {
                FlipKind::TwoToThree => stats.flips_23 += 1,
                FlipKind::ThreeToTwo => stats.flips_32 += 1,
            }
            for k in created {
                push_cell(&mut queue, &mut queued, k);
            }
        }
        if !params.full_sweep || stats.flips_performed() == flips_before_pass {
            break;
        }
        stats.unflippable = 0;
        let all: Vec<CellKey> = mesh.cell_keys().collect();
        for c in all {
            push_cell(&mut queue, &mut queued, c);
        }
    }

    tracing::debug!(
        checked = stats.faces_checked,
        flips_23 = stats.flips_23,
        flips_32 = stats.flips_32,
        unflippable = stats.unflippable,
        "Delaunay repair finished"
    );
    Ok(stats)
}

fn push_cell(
    queue: &mut VecDeque<(CellKey, usize)>,
    queued: &mut FastHashSet<(CellKey, usize)>,
    c: CellKey,
) {
    for i in 0..4 {
        if queued.insert((c, i)) {
            queue.push_back((c, i));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vertex::VertexKind;
    use nalgebra::Point3;

    /// Two cells sharing the face `v0 v1 v2`, with apexes above and below.
    fn bipyramid(top: Point3<f64>, bottom: Point3<f64>) -> (VolumeMesh, [VertexKey; 5], CellKey) {
        let mut mesh = VolumeMesh::new();
        let v = [
            mesh.push_vertex(Point3::new(0.0, 0.0, 0.0), VertexKind::Domain),
            mesh.push_vertex(Point3::new(1.0, 0.0, 0.0), VertexKind::Domain),
            mesh.push_vertex(Point3::new(0.0, 1.0, 0.0), VertexKind::Domain),
            mesh.push_vertex(top, VertexKind::Domain),
            mesh.push_vertex(bottom, VertexKind::Domain),
        ];
        let upper = mesh.insert_isolated_cell([v[0], v[1], v[2], v[3]]).unwrap();
        let lower = mesh
            .insert_isolated_cell(cell_from_outward_face([v[0], v[1], v[2]], v[4]))
            .unwrap();
        mesh.link_cells_for_tests(upper, lower, &FaceKey::new([v[0], v[1], v[2]]));
        (mesh, v, upper)
    }

    #[test]
    fn test_flip_23_then_32_round_trip() {
        let (mut mesh, v, upper) = bipyramid(Point3::new(0.3, 0.3, 1.0), Point3::new(0.3, 0.3, -1.0));
        let face = mesh
            .cell(upper)
            .unwrap()
            .face_index_of(&FaceKey::new([v[0], v[1], v[2]]))
            .unwrap();
        let mut scratch = ReplaceScratch::default();

        let plan = plan_flip_23(&mesh, upper, face).unwrap();
        plan.check(&mesh).unwrap();
        let created = apply_flip(&mut mesh, &plan, &mut scratch).unwrap();
        assert_eq!(created.len(), 3);
        assert_eq!(mesh.cells_around_edge(v[3], v[4]).len(), 3);

        let back = plan_flip_32(&mesh, v[3], v[4]).unwrap();
        back.check(&mesh).unwrap();
        apply_flip(&mut mesh, &back, &mut scratch).unwrap();
        assert_eq!(mesh.number_of_cells(), 2);
        assert!(mesh.find_face(&FaceKey::new([v[0], v[1], v[2]])).is_some());
    }

    #[test]
    fn test_flip_23_rejects_non_convex_pair() {
        // The segment between the apexes misses the shared face.
        let (mesh, v, upper) = bipyramid(Point3::new(0.2, 0.2, 1.0), Point3::new(3.0, 3.0, -0.2));
        let face = mesh
            .cell(upper)
            .unwrap()
            .face_index_of(&FaceKey::new([v[0], v[1], v[2]]))
            .unwrap();
        let plan = plan_flip_23(&mesh, upper, face).unwrap();
        assert!(matches!(plan.check(&mesh), Err(FlipError::NotConvex { .. })));
    }

    #[test]
    fn test_constrained_face_is_not_flipped() {
        let (mut mesh, v, upper) = bipyramid(Point3::new(0.3, 0.3, 1.0), Point3::new(0.3, 0.3, -1.0));
        let key = FaceKey::new([v[0], v[1], v[2]]);
        mesh.mark_constrained(key);
        let face = mesh.cell(upper).unwrap().face_index_of(&key).unwrap();
        assert_eq!(
            plan_flip_23(&mesh, upper, face),
            Err(FlipError::ConstrainedFace { face: key })
        );
        assert!(!is_locally_non_delaunay(&mesh, upper, face));
    }

    #[test]
    fn test_undo_restores_cells() {
        let (mut mesh, v, upper) = bipyramid(Point3::new(0.3, 0.3, 1.0), Point3::new(0.3, 0.3, -1.0));
        let key = FaceKey::new([v[0], v[1], v[2]]);
        let face = mesh.cell(upper).unwrap().face_index_of(&key).unwrap();
        let mut scratch = ReplaceScratch::default();
        let mut log = FlipLog::new();
        let plan = plan_flip_23(&mesh, upper, face).unwrap();
        apply_logged(&mut mesh, &plan, &mut scratch, &mut log).unwrap();
        assert_eq!(mesh.number_of_cells(), 3);
        assert_eq!(log.len(), 1);
        log.undo(&mut mesh, &mut scratch).unwrap();
        assert!(log.is_empty());
        assert_eq!(mesh.number_of_cells(), 2);
        assert!(mesh.find_face(&key).is_some());
    }

    #[test]
    fn test_repair_flips_non_delaunay_face() {
        // Flat lower apex lies inside the upper cell's circumsphere.
        let (mut mesh, v, upper) = bipyramid(Point3::new(0.3, 0.3, 1.0), Point3::new(0.3, 0.3, -0.05));
        let key = FaceKey::new([v[0], v[1], v[2]]);
        let face = mesh.cell(upper).unwrap().face_index_of(&key).unwrap();
        assert!(is_locally_non_delaunay(&mesh, upper, face));
        let mut scratch = ReplaceScratch::default();
        let params = RepairParams::for_mesh(&mesh);
        let stats = repair_delaunay(
            &mut mesh,
            &[upper],
            params,
            &mut scratch,
            None,
        )
        .unwrap();
        assert_eq!(stats.flips_23, 1);
        assert_eq!(mesh.number_of_cells(), 3);
        for (c, _) in mesh.cells() {
            for i in 0..4 {
                assert!(!is_locally_non_delaunay(&mesh, c, i));
            }
        }
    }
}
