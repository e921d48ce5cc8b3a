//! Laplacian smoothing of interior vertices with flip-based repair.

use nalgebra::Point3;

use crate::core::algorithms::flips::{FlipError, FlipLog, RepairParams, repair_delaunay};
use crate::core::vertex::{VertexKey, VertexKind};
use crate::core::volume_mesh::{ReplaceScratch, VolumeMesh};
use crate::geometry::point::centroid;

/// Counters reported by [`smooth`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SmoothingStats {
    /// Vertices moved and kept.
    pub moved: usize,
    /// Moves undone because the star inverted or Delaunay could not be restored.
    pub reverted: usize,
    /// Vertices left alone because they touch a sentinel vertex.
    pub skipped: usize,
    /// Flips performed by accepted moves.
    pub flips: usize,
}

/// One Laplacian pass over [`VertexKind::Interior`] vertices.
///
/// Each vertex moves to the average of its neighbors. The move is kept if the
/// cells around the vertex stay positively oriented and flips restore the
/// local Delaunay property; otherwise the flips are undone and the vertex
/// returns to its old position.
///
/// # Errors
///
/// Returns a [`FlipError`] only if undoing a move fails, which indicates
/// corrupted topology.
pub fn smooth(mesh: &mut VolumeMesh, scratch: &mut ReplaceScratch) -> Result<SmoothingStats, FlipError> {
    let mut stats = SmoothingStats::default();
    let interior: Vec<VertexKey> = mesh
        .vertices()
        .filter(|(_, v)| v.kind() == VertexKind::Interior && v.incident_cell().is_some())
        .map(|(k, _)| k)
        .collect();

    for v in interior {
        let touches_super = mesh
            .cells_around_vertex(v)
            .iter()
            .any(|&c| mesh.is_super_cell(c));
        if touches_super {
            stats.skipped += 1;
            continue;
        }
        let neighbors = mesh.vertex_neighbors(v);
        let points: Vec<Point3<f64>> = neighbors.iter().filter_map(|&w| mesh.point(w).ok()).collect();
        let Ok(target) = centroid(&points) else {
            stats.skipped += 1;
            continue;
        };
        let old = mesh.point(v)?;

        mesh.set_vertex_point(v, target);
        let star = mesh.cells_around_vertex(v);
        if mesh.refresh_cells(&star).is_err() {
            mesh.set_vertex_point(v, old);
            mesh.refresh_cells(&star)?;
            stats.reverted += 1;
            continue;
        }

        let mut log = FlipLog::new();
        let params = RepairParams::for_mesh(mesh);
        let repair = repair_delaunay(mesh, &star, params, scratch, Some(&mut log))?;
        if repair.unflippable == 0 && !repair.exhausted {
            stats.moved += 1;
            stats.flips += repair.flips_performed();
            continue;
        }

        // The logged cells were built around the trial position.
        log.undo(mesh, scratch)?;
        mesh.set_vertex_point(v, old);
        let star = mesh.cells_around_vertex(v);
        mesh.refresh_cells(&star)?;
        stats.reverted += 1;
    }

    tracing::debug!(
        moved = stats.moved,
        reverted = stats.reverted,
        skipped = stats.skipped,
        "smoothing pass finished"
    );
    Ok(stats)
}
