//! Worst-first circumcenter refinement.
//!
//! Cells are processed in decreasing circumradius order from a max-heap.
//! Heap entries are invalidated lazily: a popped key whose cell has been
//! replaced is skipped.

use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use crate::core::algorithms::incremental_insertion::{InsertOutcome, InsertionContext, insert_vertex};
use crate::core::cell::CellKey;
use crate::core::vertex::VertexKind;
use crate::core::volume_mesh::VolumeMesh;
use crate::geometry::aabb::Aabb;

/// Fraction of the target size used as the duplicate radius for new vertices.
pub const REFINEMENT_SEPARATION_FACTOR: f64 = 0.25;

/// Counters reported by [`refine`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefinementStats {
    /// Heap entries examined against live cells.
    pub iterations: usize,
    /// Circumcenters inserted.
    pub inserted: usize,
    /// Circumcenters that fell on an existing vertex or could not be inserted.
    pub skipped: usize,
    /// Whether the heap drained before the iteration cap.
    pub converged: bool,
}

fn candidate(mesh: &VolumeMesh, bounds: &Aabb, c: CellKey, target_size: f64) -> Option<(OrderedFloat<f64>, CellKey)> {
    if mesh.is_super_cell(c) {
        return None;
    }
    let sphere = mesh.cell(c)?.circumsphere();
    let radius = sphere.radius();
    (radius > target_size && bounds.contains_point(&sphere.center)).then_some((OrderedFloat(radius), c))
}

/// Inserts circumcenters of the largest cells until every eligible cell has
/// circumradius at most `target_size`, or `max_iterations` live cells have
/// been processed.
///
/// Cells touching a sentinel vertex and cells whose circumcenter lies outside
/// `bounds` are ignored. Circumcenters within a quarter of `target_size` of an
/// existing vertex are skipped, so a converged mesh is left unchanged by a
/// second call.
pub fn refine(
    mesh: &mut VolumeMesh,
    bounds: &Aabb,
    target_size: f64,
    max_iterations: usize,
    ctx: &mut InsertionContext,
) -> RefinementStats {
    let mut stats = RefinementStats::default();
    if target_size.is_nan() || target_size <= 0.0 {
        stats.converged = true;
        return stats;
    }

    let mut heap: BinaryHeap<(OrderedFloat<f64>, CellKey)> = mesh
        .cell_keys()
        .filter_map(|c| candidate(mesh, bounds, c, target_size))
        .collect();
    let min_separation = REFINEMENT_SEPARATION_FACTOR * target_size;

    while let Some((_, c)) = heap.pop() {
        let Some(cell) = mesh.cell(c) else {
            continue;
        };
        if stats.iterations >= max_iterations {
            tracing::debug!(max_iterations, "refinement stopped at the iteration cap");
            return stats;
        }
        stats.iterations += 1;
        let center = cell.circumsphere().center;
        ctx.hint = Some(c);

        match insert_vertex(mesh, center, VertexKind::Interior, min_separation, ctx) {
            Ok(InsertOutcome::Inserted(v)) => {
                stats.inserted += 1;
                for n in mesh.cells_around_vertex(v) {
                    if let Some(entry) = candidate(mesh, bounds, n, target_size) {
                        heap.push(entry);
                    }
                }
            }
            Ok(InsertOutcome::Duplicate(_)) => stats.skipped += 1,
            Err(err) => {
                tracing::trace!(error = %err, "circumcenter rejected");
                stats.skipped += 1;
            }
        }
    }

    stats.converged = true;
    tracing::debug!(
        inserted = stats.inserted,
        skipped = stats.skipped,
        iterations = stats.iterations,
        "refinement converged"
    );
    stats
}
