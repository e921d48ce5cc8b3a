//! Recovery of input surface triangles as faces of the volume mesh.
//!
//! A Delaunay tetrahedralization of the surface points does not in general
//! contain every surface triangle. Each missing triangle is recovered, in
//! order of preference, by:
//!
//! 1. finding it already present;
//! 2. a 3-2 flip around an edge whose ring is the triangle;
//! 3. a 2-3 flip across a face whose apexes are two of its corners.
//!
//! Passes repeat while they make progress, since one flip can set up
//! another. When [`RecoveryConfig::split_unrecovered`] is set, triangles that
//! remain missing are split at the point of the input surface closest to
//! their centroid and the three halves are recovered in turn. Recovered
//! triangles are marked constrained, and a final full flip sweep restores
//! the Delaunay property everywhere else.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::algorithms::flips::{
    DelaunayRepairStats, FlipError, FlipPlan, RepairParams, apply_flip, plan_flip_23, plan_flip_32,
    repair_delaunay,
};
use crate::core::algorithms::incremental_insertion::{InsertOutcome, InsertionContext, insert_vertex};
use crate::core::cell::FaceKey;
use crate::core::vertex::{VertexKey, VertexKind};
use crate::core::volume_mesh::{TopologyError, VolumeMesh};
use crate::surface::bvh::SurfaceBvh;

/// What to do when faces stay unrecovered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryPolicy {
    /// Log a warning and report the failed faces.
    #[default]
    Warn,
    /// Fail with [`RecoveryError::Unrecovered`].
    Abort,
}

/// Boundary recovery settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    pub policy: RecoveryPolicy,
    /// Split faces that flips cannot recover.
    pub split_unrecovered: bool,
    /// Flip passes per round.
    pub max_passes: usize,
    /// How many times a face and its halves may be split.
    pub max_split_depth: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            policy: RecoveryPolicy::Warn,
            split_unrecovered: true,
            max_passes: 8,
            max_split_depth: 2,
        }
    }
}

impl RecoveryConfig {
    #[must_use]
    pub const fn with_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn with_split_unrecovered(mut self, split: bool) -> Self {
        self.split_unrecovered = split;
        self
    }
}

/// Errors raised by [`constrain_triangulation`].
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum RecoveryError {
    /// Faces stayed missing under [`RecoveryPolicy::Abort`].
    #[error("Boundary recovery failed for {count} faces")]
    Unrecovered {
        /// Number of missing faces.
        count: usize,
        /// The missing faces.
        faces: Vec<[VertexKey; 3]>,
    },
    /// A validated flip failed to apply.
    #[error("Flip failed during recovery: {0}")]
    Flip(#[from] FlipError),
    /// Mesh bookkeeping is inconsistent.
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Summary of a recovery run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Faces present before any flip.
    pub already_present: usize,
    /// Faces produced by flips.
    pub recovered: usize,
    /// Steiner points inserted by splitting.
    pub split: usize,
    /// Faces still missing.
    pub failed: Vec<[VertexKey; 3]>,
    /// Final flip sweep.
    pub repair: DelaunayRepairStats,
}

impl RecoveryReport {
    #[must_use]
    pub fn is_conforming(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone, Copy, Debug)]
struct PendingFace {
    vertices: [VertexKey; 3],
    depth: u32,
}

fn creates_face(plan: &FlipPlan, key: &FaceKey) -> bool {
    plan.created.iter().any(|cell| {
        let [a, b, c] = *key.vertices();
        cell.contains(&a) && cell.contains(&b) && cell.contains(&c)
    })
}

/// A 3-2 flip around an edge whose ring is `[a, b, c]`.
fn ring_flip(mesh: &VolumeMesh, [a, b, c]: [VertexKey; 3], key: &FaceKey) -> Option<FlipPlan> {
    for cell in mesh.cells_around_edge(a, b) {
        let Some(cell) = mesh.cell(cell) else {
            continue;
        };
        let others: Vec<VertexKey> = cell
            .vertices()
            .iter()
            .copied()
            .filter(|&v| v != a && v != b)
            .collect();
        let [p, q] = others.as_slice() else {
            continue;
        };
        if *p == c || *q == c {
            continue;
        }
        if let Ok(plan) = plan_flip_32(mesh, *p, *q)
            && creates_face(&plan, key)
            && plan.check(mesh).is_ok()
        {
            return Some(plan);
        }
    }
    None
}

/// A 2-3 flip across a face opposite one corner whose far apex is another.
fn apex_flip(mesh: &VolumeMesh, corners: [VertexKey; 3], key: &FaceKey) -> Option<FlipPlan> {
    for x in corners {
        for c in mesh.cells_around_vertex(x) {
            let Some(cell) = mesh.cell(c) else {
                continue;
            };
            let Some(face) = cell.index_of(x) else {
                continue;
            };
            if let Ok(plan) = plan_flip_23(mesh, c, face)
                && creates_face(&plan, key)
                && plan.check(mesh).is_ok()
            {
                return Some(plan);
            }
        }
    }
    None
}

/// One flip pass over `pending`. Returns the faces still missing.
fn flip_pass(
    mesh: &mut VolumeMesh,
    pending: Vec<PendingFace>,
    ctx: &mut InsertionContext,
    report: &mut RecoveryReport,
) -> Result<(Vec<PendingFace>, bool), RecoveryError> {
    let mut missing = Vec::new();
    let mut progress = false;
    for face in pending {
        let key = FaceKey::new(face.vertices);
        if mesh.find_face(&key).is_some() {
            mesh.mark_constrained(key);
            report.recovered += 1;
            progress = true;
            continue;
        }
        let plan = ring_flip(mesh, face.vertices, &key).or_else(|| apex_flip(mesh, face.vertices, &key));
        match plan {
            Some(plan) => {
                apply_flip(mesh, &plan, &mut ctx.scratch)?;
                ctx.hint = None;
                if mesh.find_face(&key).is_some() {
                    mesh.mark_constrained(key);
                    report.recovered += 1;
                    progress = true;
                    tracing::trace!(face = ?face.vertices, kind = %plan.kind, "boundary face recovered by flip");
                } else {
                    missing.push(face);
                }
            }
            None => missing.push(face),
        }
    }
    Ok((missing, progress))
}

/// Splits `face` at the surface point closest to its centroid.
fn split_face(
    mesh: &mut VolumeMesh,
    face: PendingFace,
    surface: &SurfaceBvh,
    ctx: &mut InsertionContext,
) -> Result<Option<[PendingFace; 3]>, RecoveryError> {
    let [a, b, c] = face.vertices;
    let (pa, pb, pc) = (mesh.point(a)?, mesh.point(b)?, mesh.point(c)?);
    let centroid = Point3::from((pa.coords + pb.coords + pc.coords) / 3.0);
    let target = surface.closest_point(&centroid).map_or(centroid, |hit| hit.point);
    let shortest = (pb - pa).norm().min((pc - pb).norm()).min((pa - pc).norm());

    match insert_vertex(mesh, target, VertexKind::Steiner, 0.1 * shortest, ctx) {
        Ok(InsertOutcome::Inserted(v)) => {
            let depth = face.depth + 1;
            Ok(Some([
                PendingFace { vertices: [a, b, v], depth },
                PendingFace { vertices: [b, c, v], depth },
                PendingFace { vertices: [c, a, v], depth },
            ]))
        }
        Ok(InsertOutcome::Duplicate(_)) => Ok(None),
        Err(err) => {
            tracing::debug!(face = ?face.vertices, error = %err, "Steiner insertion rejected");
            Ok(None)
        }
    }
}

/// Forces every triangle of `boundary_faces` to be a face of `mesh`.
///
/// Recovered faces are marked constrained, so later insertions and flips
/// keep them. `surface` is the input surface used to place Steiner points.
///
/// # Errors
///
/// Returns [`RecoveryError::Unrecovered`] under [`RecoveryPolicy::Abort`]
/// when faces stay missing, or another [`RecoveryError`] if the mesh
/// bookkeeping turns out inconsistent.
pub fn constrain_triangulation(
    mesh: &mut VolumeMesh,
    boundary_faces: &[[VertexKey; 3]],
    surface: &SurfaceBvh,
    config: &RecoveryConfig,
    ctx: &mut InsertionContext,
) -> Result<RecoveryReport, RecoveryError> {
    let mut report = RecoveryReport::default();
    let mut pending = Vec::new();
    for &vertices in boundary_faces {
        let key = FaceKey::new(vertices);
        if mesh.find_face(&key).is_some() {
            mesh.mark_constrained(key);
            report.already_present += 1;
        } else {
            pending.push(PendingFace { vertices, depth: 0 });
        }
    }
    tracing::debug!(
        faces = boundary_faces.len(),
        missing = pending.len(),
        "boundary recovery started"
    );

    let mut failed = Vec::new();
    while !pending.is_empty() {
        for _ in 0..config.max_passes {
            let (missing, progress) = flip_pass(mesh, pending, ctx, &mut report)?;
            pending = missing;
            if !progress || pending.is_empty() {
                break;
            }
        }
        if !config.split_unrecovered {
            failed.append(&mut pending);
            break;
        }

        let mut halves = Vec::new();
        for face in std::mem::take(&mut pending) {
            if face.depth >= config.max_split_depth {
                failed.push(face);
                continue;
            }
            match split_face(mesh, face, surface, ctx)? {
                Some(parts) => {
                    report.split += 1;
                    halves.extend(parts);
                }
                None => failed.push(face),
            }
        }
        pending = halves;
    }

    // Splits can destroy faces recovered earlier in the same round.
    report.failed = failed
        .into_iter()
        .map(|f| f.vertices)
        .filter(|v| mesh.find_face(&FaceKey::new(*v)).is_none())
        .collect();

    let params = RepairParams::for_mesh(mesh).with_full_sweep(true);
    let seeds: Vec<_> = mesh.cell_keys().collect();
    report.repair = repair_delaunay(mesh, &seeds, params, &mut ctx.scratch, None)?;
    ctx.hint = None;

    tracing::debug!(
        already_present = report.already_present,
        recovered = report.recovered,
        split = report.split,
        failed = report.failed.len(),
        "boundary recovery finished"
    );

    if report.failed.is_empty() {
        return Ok(report);
    }
    match config.policy {
        RecoveryPolicy::Warn => {
            tracing::warn!(failed = report.failed.len(), "boundary faces could not be recovered");
            Ok(report)
        }
        RecoveryPolicy::Abort => Err(RecoveryError::Unrecovered {
            count: report.failed.len(),
            faces: report.failed,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::algorithms::flips::{flip_for_face, plan_flip_23};
    use crate::core::cell::cell_from_outward_face;
    use crate::core::validation::validate_topology;
    use crate::surface::primitives::cube;

    fn bipyramid() -> (VolumeMesh, [VertexKey; 5]) {
        let mut mesh = VolumeMesh::new();
        let v = [
            mesh.push_vertex(Point3::new(0.0, 0.0, 0.0), VertexKind::Surface),
            mesh.push_vertex(Point3::new(1.0, 0.0, 0.0), VertexKind::Surface),
            mesh.push_vertex(Point3::new(0.0, 1.0, 0.0), VertexKind::Surface),
            mesh.push_vertex(Point3::new(0.3, 0.3, 1.0), VertexKind::Surface),
            mesh.push_vertex(Point3::new(0.3, 0.3, -1.0), VertexKind::Surface),
        ];
        let upper = mesh.insert_isolated_cell([v[0], v[1], v[2], v[3]]).unwrap();
        let lower = mesh
            .insert_isolated_cell(cell_from_outward_face([v[0], v[1], v[2]], v[4]))
            .unwrap();
        mesh.link_cells_for_tests(upper, lower, &FaceKey::new([v[0], v[1], v[2]]));
        (mesh, v)
    }

    #[test]
    fn test_present_face_is_constrained() {
        let (mut mesh, v) = bipyramid();
        let bvh = SurfaceBvh::new(&cube(1));
        let report = constrain_triangulation(
            &mut mesh,
            &[[v[0], v[1], v[2]]],
            &bvh,
            &RecoveryConfig::default(),
            &mut InsertionContext::new(),
        )
        .unwrap();
        assert_eq!(report.already_present, 1);
        assert!(report.is_conforming());
        assert!(mesh.is_constrained(&FaceKey::new([v[0], v[2], v[1]])));
        // The constrained face blocks the flip that would remove it.
        let (c, face) = mesh.find_face(&FaceKey::new([v[0], v[1], v[2]])).unwrap();
        assert!(flip_for_face(&mesh, c, face).is_none());
    }

    #[test]
    fn test_face_recovered_by_flip() {
        let (mut mesh, v) = bipyramid();
        // Flip 2-3 so that v0 v1 v2 disappears, then ask for it back.
        let (c, face) = mesh.find_face(&FaceKey::new([v[0], v[1], v[2]])).unwrap();
        let plan = plan_flip_23(&mesh, c, face).unwrap();
        apply_flip(&mut mesh, &plan, &mut Default::default()).unwrap();
        assert!(mesh.find_face(&FaceKey::new([v[0], v[1], v[2]])).is_none());

        let bvh = SurfaceBvh::new(&cube(1));
        let report = constrain_triangulation(
            &mut mesh,
            &[[v[0], v[1], v[2]]],
            &bvh,
            &RecoveryConfig::default().with_policy(RecoveryPolicy::Abort),
            &mut InsertionContext::new(),
        )
        .unwrap();
        assert_eq!(report.recovered, 1);
        assert_eq!(report.split, 0);
        assert!(mesh.find_face(&FaceKey::new([v[0], v[1], v[2]])).is_some());
        validate_topology(&mesh).unwrap();
    }

    #[test]
    fn test_abort_policy_reports_missing_faces() {
        let (mut mesh, v) = bipyramid();
        // v3 v4 v1 is not a face and no single flip produces it.
        let bvh = SurfaceBvh::new(&cube(1));
        let config = RecoveryConfig::default()
            .with_policy(RecoveryPolicy::Abort)
            .with_split_unrecovered(false);
        let err = constrain_triangulation(
            &mut mesh,
            &[[v[3], v[4], v[1]], [v[0], v[1], v[2]]],
            &bvh,
            &config,
            &mut InsertionContext::new(),
        );
        assert!(matches!(err, Err(RecoveryError::Unrecovered { count: 1, .. })));
    }
}
