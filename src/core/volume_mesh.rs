//! Vertex and cell pools of a tetrahedral volume mesh.
//!
//! [`VolumeMesh`] owns two generation-checked arenas: an append-only vertex
//! pool and a cell pool whose freed slots are recycled. A vertex whose
//! insertion is rolled back stays in the pool, marked orphaned, and is
//! skipped by iteration and counts. Cells reference each
//! other by [`CellKey`]; a stale key fails lookup rather than aliasing a
//! recycled slot.
//!
//! All connectivity changes go through [`VolumeMesh::replace_cells`], which
//! validates the replacement completely before touching the mesh. Cavity
//! filling and bistellar flips are both expressed as replacements.

use nalgebra::Point3;
use smallvec::SmallVec;
use thiserror::Error;

use crate::core::cell::{Cell, CellKey, FaceKey, same_orientation};
use crate::core::collections::{
    CellKeyBuffer, FastHashMap, FastHashSet, SmallBuffer, StorageMap, VertexKeyBuffer,
};
use crate::core::vertex::{Vertex, VertexKey, VertexKind};
use crate::geometry::predicates::{Orientation, orientation};

/// Errors raised when a connectivity change would break mesh topology.
///
/// A replacement that returns one of these leaves the mesh untouched.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TopologyError {
    /// A cell key does not refer to a live cell.
    #[error("Cell {cell:?} is not in the mesh")]
    MissingCell {
        /// The stale or foreign key.
        cell: CellKey,
    },
    /// A vertex key does not refer to a vertex of this mesh.
    #[error("Vertex {vertex:?} is not in the mesh")]
    MissingVertex {
        /// The foreign key.
        vertex: VertexKey,
    },
    /// A new cell is flat or inverted.
    #[error("New cell {vertices:?} has orientation {orientation}")]
    InvalidOrientation {
        /// The offending cell.
        vertices: [VertexKey; 4],
        /// Its filtered orientation.
        orientation: Orientation,
    },
    /// A face of the replaced region appears twice on its boundary.
    #[error("Face {face:?} appears more than once on the region boundary")]
    NonManifoldBoundary {
        /// The duplicated face.
        face: FaceKey,
    },
    /// The new cells do not close up with the region boundary.
    #[error("Face {face:?} is covered by {count} new cells (expected {expected})")]
    UnmatchedFace {
        /// The face in question.
        face: FaceKey,
        /// Number of new cells using it.
        count: usize,
        /// Required count.
        expected: usize,
    },
    /// A shared face is oriented inconsistently between its two sides.
    #[error("Face {face:?} has inconsistent orientation across the replacement")]
    OrientationMismatch {
        /// The face in question.
        face: FaceKey,
    },
}

/// Outward face of the region being replaced, as seen from inside it.
#[derive(Clone, Copy, Debug)]
struct ExternalFace {
    outward: [VertexKey; 3],
    neighbor: Option<CellKey>,
}

#[derive(Clone, Debug, Default)]
struct FaceSlot {
    external: Option<ExternalFace>,
    sides: SmallBuffer<(usize, usize), 2>,
}

/// Scratch storage for [`VolumeMesh::replace_cells`], kept across calls to
/// avoid per-insertion allocation.
#[derive(Debug, Default)]
pub struct ReplaceScratch {
    slots: FastHashMap<FaceKey, FaceSlot>,
    removed: FastHashSet<CellKey>,
    new_cells: Vec<Cell>,
}

/// A tetrahedral volume mesh.
#[derive(Clone, Debug, Default)]
pub struct VolumeMesh {
    vertices: StorageMap<VertexKey, Vertex>,
    cells: StorageMap<CellKey, Cell>,
    constrained: FastHashSet<FaceKey>,
}

impl VolumeMesh {
    /// Creates an empty mesh.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // VERTICES
    // =========================================================================

    /// Appends a vertex to the pool.
    pub fn push_vertex(&mut self, point: Point3<f64>, kind: VertexKind) -> VertexKey {
        self.vertices.insert(Vertex::new(point, kind))
    }

    /// Marks a vertex that no cell references as orphaned.
    ///
    /// Used to roll back a vertex whose insertion failed. Referenced vertices
    /// are left alone.
    pub(crate) fn orphan_unreferenced_vertex(&mut self, v: VertexKey) {
        if let Some(x) = self.vertices.get_mut(v)
            && x.incident_cell.is_none()
        {
            x.orphaned = true;
        }
    }

    #[must_use]
    pub fn vertex(&self, v: VertexKey) -> Option<&Vertex> {
        self.vertices.get(v)
    }

    /// Position of `v`.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::MissingVertex`] for a foreign key.
    pub fn point(&self, v: VertexKey) -> Result<Point3<f64>, TopologyError> {
        self.vertices
            .get(v)
            .map(|x| *x.point())
            .ok_or(TopologyError::MissingVertex { vertex: v })
    }

    /// Positions of the four vertices of a cell.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::MissingVertex`] for a foreign key.
    pub fn points_of(&self, vertices: &[VertexKey; 4]) -> Result<[Point3<f64>; 4], TopologyError> {
        Ok([
            self.point(vertices[0])?,
            self.point(vertices[1])?,
            self.point(vertices[2])?,
            self.point(vertices[3])?,
        ])
    }

    pub(crate) fn set_vertex_point(&mut self, v: VertexKey, point: Point3<f64>) {
        if let Some(x) = self.vertices.get_mut(v) {
            x.set_point(point);
        }
    }

    /// Vertices that belong to the mesh, skipping orphaned ones.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexKey, &Vertex)> {
        self.vertices.iter().filter(|(_, x)| !x.is_orphaned())
    }

    #[must_use]
    pub fn number_of_vertices(&self) -> usize {
        self.vertices().count()
    }

    // =========================================================================
    // CELLS
    // =========================================================================

    #[must_use]
    pub fn cell(&self, c: CellKey) -> Option<&Cell> {
        self.cells.get(c)
    }

    #[must_use]
    pub fn contains_cell(&self, c: CellKey) -> bool {
        self.cells.contains_key(c)
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellKey, &Cell)> {
        self.cells.iter()
    }

    pub fn cell_keys(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.cells.keys()
    }

    #[must_use]
    pub fn number_of_cells(&self) -> usize {
        self.cells.len()
    }

    /// Positions of a cell's vertices.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::MissingCell`] for a stale key.
    pub fn cell_points(&self, c: CellKey) -> Result<[Point3<f64>; 4], TopologyError> {
        let cell = self.cells.get(c).ok_or(TopologyError::MissingCell { cell: c })?;
        self.points_of(cell.vertices())
    }

    /// Returns `true` if any vertex of the cell is a sentinel vertex.
    #[must_use]
    pub fn is_super_cell(&self, c: CellKey) -> bool {
        self.cells.get(c).is_some_and(|cell| {
            cell.vertices()
                .iter()
                .any(|&v| self.vertices.get(v).is_some_and(Vertex::is_super))
        })
    }

    /// Inserts an isolated cell with no neighbors.
    ///
    /// # Errors
    ///
    /// Fails if the cell is not positively oriented.
    pub fn insert_isolated_cell(&mut self, vertices: [VertexKey; 4]) -> Result<CellKey, TopologyError> {
        let points = self.points_of(&vertices)?;
        let cell = self.build_cell(vertices, &points)?;
        let key = self.cells.insert(cell);
        for v in vertices {
            if let Some(x) = self.vertices.get_mut(v) {
                x.incident_cell = Some(key);
            }
        }
        Ok(key)
    }

    fn build_cell(
        &self,
        vertices: [VertexKey; 4],
        points: &[Point3<f64>; 4],
    ) -> Result<Cell, TopologyError> {
        let o = orientation(&points[0], &points[1], &points[2], &points[3]);
        if o != Orientation::POSITIVE {
            return Err(TopologyError::InvalidOrientation {
                vertices,
                orientation: o,
            });
        }
        Cell::new(vertices, points).map_err(|_| TopologyError::InvalidOrientation {
            vertices,
            orientation: Orientation::DEGENERATE,
        })
    }

    /// Recomputes normals and circumspheres of the given cells after a vertex
    /// moved.
    ///
    /// # Errors
    ///
    /// Fails if any cell became flat or inverted; cells processed before the
    /// failure keep their refreshed geometry.
    pub(crate) fn refresh_cells(&mut self, cells: &[CellKey]) -> Result<(), TopologyError> {
        for &c in cells {
            let cell = self.cells.get(c).ok_or(TopologyError::MissingCell { cell: c })?;
            let vertices = *cell.vertices();
            let points = self.points_of(&vertices)?;
            let o = orientation(&points[0], &points[1], &points[2], &points[3]);
            if o != Orientation::POSITIVE {
                return Err(TopologyError::InvalidOrientation {
                    vertices,
                    orientation: o,
                });
            }
            if let Some(cell) = self.cells.get_mut(c) {
                cell.refresh_geometry(&points)
                    .map_err(|_| TopologyError::InvalidOrientation {
                        vertices,
                        orientation: Orientation::DEGENERATE,
                    })?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // CONSTRAINED FACES
    // =========================================================================

    /// Marks a face as constrained; flips and cavities never remove it.
    pub fn mark_constrained(&mut self, face: FaceKey) {
        self.constrained.insert(face);
    }

    #[must_use]
    pub fn is_constrained(&self, face: &FaceKey) -> bool {
        self.constrained.contains(face)
    }

    #[must_use]
    pub fn has_constraints(&self) -> bool {
        !self.constrained.is_empty()
    }

    pub fn constrained_faces(&self) -> impl Iterator<Item = &FaceKey> {
        self.constrained.iter()
    }

    // =========================================================================
    // ADJACENCY QUERIES
    // =========================================================================

    /// All cells containing `v`, found by walking across faces that contain it.
    #[must_use]
    pub fn cells_around_vertex(&self, v: VertexKey) -> CellKeyBuffer {
        let mut out = CellKeyBuffer::new();
        let Some(start) = self.vertices.get(v).and_then(Vertex::incident_cell) else {
            return out;
        };
        if !self.cells.get(start).is_some_and(|c| c.contains_vertex(v)) {
            return out;
        }
        let mut stack: SmallBuffer<CellKey, 16> = SmallVec::new();
        stack.push(start);
        out.push(start);
        while let Some(c) = stack.pop() {
            let Some(cell) = self.cells.get(c) else {
                continue;
            };
            for i in 0..4 {
                if cell.vertices()[i] == v {
                    continue;
                }
                if let Some(n) = cell.neighbor(i)
                    && !out.contains(&n)
                {
                    out.push(n);
                    stack.push(n);
                }
            }
        }
        out
    }

    /// Distinct non-sentinel vertices sharing a cell with `v`.
    #[must_use]
    pub fn vertex_neighbors(&self, v: VertexKey) -> VertexKeyBuffer {
        let mut out = VertexKeyBuffer::new();
        for c in self.cells_around_vertex(v) {
            if let Some(cell) = self.cells.get(c) {
                for &w in cell.vertices() {
                    let sentinel = self.vertices.get(w).is_none_or(Vertex::is_super);
                    if w != v && !sentinel && !out.contains(&w) {
                        out.push(w);
                    }
                }
            }
        }
        out
    }

    /// Cells containing the edge `(a, b)`.
    #[must_use]
    pub fn cells_around_edge(&self, a: VertexKey, b: VertexKey) -> CellKeyBuffer {
        self.cells_around_vertex(a)
            .into_iter()
            .filter(|&c| self.cells.get(c).is_some_and(|cell| cell.contains_vertex(b)))
            .collect()
    }

    /// Returns `true` if some cell contains both `a` and `b`.
    #[must_use]
    pub fn has_edge(&self, a: VertexKey, b: VertexKey) -> bool {
        !self.cells_around_edge(a, b).is_empty()
    }

    /// A cell containing face `face` and the face's local index in it.
    #[must_use]
    pub fn find_face(&self, face: &FaceKey) -> Option<(CellKey, usize)> {
        let [a, _, _] = *face.vertices();
        self.cells_around_vertex(a).into_iter().find_map(|c| {
            let cell = self.cells.get(c)?;
            cell.face_index_of(face).map(|i| (c, i))
        })
    }

    /// The cell whose vertex set equals `vertices`, in any order.
    #[must_use]
    pub fn find_cell(&self, vertices: &[VertexKey; 4]) -> Option<CellKey> {
        self.cells_around_vertex(vertices[0]).into_iter().find(|&c| {
            self.cells
                .get(c)
                .is_some_and(|cell| vertices.iter().all(|&v| cell.contains_vertex(v)))
        })
    }

    // =========================================================================
    // MUTATION
    // =========================================================================

    /// Replaces the region formed by `removed` with new cells.
    ///
    /// The replacement is validated in full before anything changes:
    ///
    /// - every new cell is positively oriented;
    /// - every outer face of the removed region is covered by exactly one new
    ///   cell, with the same outward orientation;
    /// - every other face of the new cells is shared by exactly two of them,
    ///   with opposite orientations.
    ///
    /// On success the old cells are freed, the new ones are stitched to each
    /// other and to the surrounding cells, and their keys are returned in the
    /// order of `new_cells`.
    ///
    /// # Errors
    ///
    /// Returns a [`TopologyError`] and leaves the mesh unchanged if any check
    /// fails.
    pub fn replace_cells(
        &mut self,
        removed: &[CellKey],
        new_cells: &[[VertexKey; 4]],
        scratch: &mut ReplaceScratch,
    ) -> Result<SmallBuffer<CellKey, 32>, TopologyError> {
        self.validate_replacement(removed, new_cells, scratch)?;
        Ok(self.commit_replacement(removed, scratch))
    }

    fn validate_replacement(
        &self,
        removed: &[CellKey],
        new_cells: &[[VertexKey; 4]],
        scratch: &mut ReplaceScratch,
    ) -> Result<(), TopologyError> {
        scratch.slots.clear();
        scratch.removed.clear();
        scratch.new_cells.clear();

        for &c in removed {
            if !self.cells.contains_key(c) {
                return Err(TopologyError::MissingCell { cell: c });
            }
            scratch.removed.insert(c);
        }

        for &c in removed {
            let cell = &self.cells[c];
            for i in 0..4 {
                let neighbor = cell.neighbor(i);
                if neighbor.is_some_and(|n| scratch.removed.contains(&n)) {
                    continue;
                }
                let key = cell.face_key(i);
                let slot = scratch.slots.entry(key).or_default();
                if slot.external.is_some() {
                    return Err(TopologyError::NonManifoldBoundary { face: key });
                }
                slot.external = Some(ExternalFace {
                    outward: cell.face_vertices(i),
                    neighbor,
                });
            }
        }

        for (idx, &vertices) in new_cells.iter().enumerate() {
            let points = self.points_of(&vertices)?;
            let cell = self.build_cell(vertices, &points)?;
            for i in 0..4 {
                let slot = scratch.slots.entry(cell.face_key(i)).or_default();
                slot.sides.push((idx, i));
            }
            scratch.new_cells.push(cell);
        }

        for (key, slot) in &scratch.slots {
            let faces: SmallBuffer<[VertexKey; 3], 2> = slot
                .sides
                .iter()
                .map(|&(idx, i)| scratch.new_cells[idx].face_vertices(i))
                .collect();
            match slot.external {
                Some(external) => {
                    if faces.len() != 1 {
                        return Err(TopologyError::UnmatchedFace {
                            face: *key,
                            count: faces.len(),
                            expected: 1,
                        });
                    }
                    if !same_orientation(&faces[0], &external.outward) {
                        return Err(TopologyError::OrientationMismatch { face: *key });
                    }
                }
                None => {
                    if faces.len() != 2 {
                        return Err(TopologyError::UnmatchedFace {
                            face: *key,
                            count: faces.len(),
                            expected: 2,
                        });
                    }
                    if same_orientation(&faces[0], &faces[1]) {
                        return Err(TopologyError::OrientationMismatch { face: *key });
                    }
                }
            }
        }
        Ok(())
    }

    fn commit_replacement(
        &mut self,
        removed: &[CellKey],
        scratch: &mut ReplaceScratch,
    ) -> SmallBuffer<CellKey, 32> {
        let mut orphaned: SmallBuffer<VertexKey, 16> = SmallVec::new();
        for &c in removed {
            if let Some(cell) = self.cells.remove(c) {
                orphaned.extend(cell.vertices().iter().copied());
            }
        }

        let keys: SmallBuffer<CellKey, 32> = scratch
            .new_cells
            .drain(..)
            .map(|cell| self.cells.insert(cell))
            .collect();

        for (key, slot) in &scratch.slots {
            match (slot.external, slot.sides.as_slice()) {
                (Some(external), &[(idx, i)]) => {
                    let new_key = keys[idx];
                    if let Some(cell) = self.cells.get_mut(new_key) {
                        cell.set_neighbor(i, external.neighbor);
                    }
                    if let Some(n) = external.neighbor
                        && let Some(ncell) = self.cells.get_mut(n)
                        && let Some(j) = ncell.face_index_of(key)
                    {
                        ncell.set_neighbor(j, Some(new_key));
                    }
                }
                (None, &[(i0, f0), (i1, f1)]) => {
                    let (k0, k1) = (keys[i0], keys[i1]);
                    if let Some(cell) = self.cells.get_mut(k0) {
                        cell.set_neighbor(f0, Some(k1));
                    }
                    if let Some(cell) = self.cells.get_mut(k1) {
                        cell.set_neighbor(f1, Some(k0));
                    }
                }
                _ => debug_assert!(false, "replacement validated but face {key:?} unmatched"),
            }
        }

        for &k in &keys {
            if let Some(cell) = self.cells.get(k) {
                for v in *cell.vertices() {
                    if let Some(x) = self.vertices.get_mut(v) {
                        x.incident_cell = Some(k);
                    }
                }
            }
        }
        for v in orphaned {
            let stale = self
                .vertices
                .get(v)
                .and_then(Vertex::incident_cell)
                .is_some_and(|c| !self.cells.contains_key(c));
            if stale && let Some(x) = self.vertices.get_mut(v) {
                x.incident_cell = None;
            }
        }
        keys
    }

    /// Removes cells and clears the neighbor links that pointed at them.
    ///
    /// Vertices left without any incident cell keep their position but report
    /// no incident cell.
    pub fn remove_cells(&mut self, cells: &[CellKey]) -> usize {
        let doomed: FastHashSet<CellKey> = cells.iter().copied().collect();
        let mut touched: FastHashSet<VertexKey> = FastHashSet::default();
        let mut removed = 0;
        for &c in cells {
            let Some(cell) = self.cells.remove(c) else {
                continue;
            };
            removed += 1;
            touched.extend(cell.vertices().iter().copied());
            for face in cell.faces() {
                if let Some(n) = face.neighbor
                    && !doomed.contains(&n)
                    && let Some(ncell) = self.cells.get_mut(n)
                    && let Some(j) = ncell.face_towards(c)
                {
                    ncell.set_neighbor(j, None);
                }
            }
        }
        for v in touched {
            let needs_update = self
                .vertices
                .get(v)
                .and_then(Vertex::incident_cell)
                .is_none_or(|c| !self.cells.contains_key(c));
            if needs_update {
                let replacement = self
                    .cells
                    .iter()
                    .find(|(_, cell)| cell.contains_vertex(v))
                    .map(|(k, _)| k);
                if let Some(x) = self.vertices.get_mut(v) {
                    x.incident_cell = replacement;
                }
            }
        }
        removed
    }

    /// Links two isolated cells across their shared face.
    #[cfg(test)]
    pub(crate) fn link_cells_for_tests(&mut self, a: CellKey, b: CellKey, face: &FaceKey) {
        let i = self.cells[a].face_index_of(face).unwrap();
        let j = self.cells[b].face_index_of(face).unwrap();
        self.cells[a].set_neighbor(i, Some(b));
        self.cells[b].set_neighbor(j, Some(a));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::cell_from_outward_face;

    fn two_tets() -> (VolumeMesh, [VertexKey; 5], [CellKey; 2]) {
        let mut mesh = VolumeMesh::new();
        let v = [
            mesh.push_vertex(Point3::new(0.0, 0.0, 0.0), VertexKind::Domain),
            mesh.push_vertex(Point3::new(1.0, 0.0, 0.0), VertexKind::Domain),
            mesh.push_vertex(Point3::new(0.0, 1.0, 0.0), VertexKind::Domain),
            mesh.push_vertex(Point3::new(0.3, 0.3, 1.0), VertexKind::Domain),
            mesh.push_vertex(Point3::new(0.3, 0.3, -1.0), VertexKind::Domain),
        ];
        let top = mesh.insert_isolated_cell([v[0], v[1], v[2], v[3]]).unwrap();
        let bottom = mesh.insert_isolated_cell([v[0], v[2], v[1], v[4]]).unwrap();
        mesh.link_cells_for_tests(top, bottom, &FaceKey::new([v[0], v[1], v[2]]));
        (mesh, v, [top, bottom])
    }

    #[test]
    fn test_failed_replacement_leaves_mesh_unchanged() {
        let (mut mesh, v, [top, bottom]) = two_tets();
        let before = mesh.number_of_cells();
        let mut scratch = ReplaceScratch::default();
        // Inverted cell.
        let err = mesh
            .replace_cells(&[top], &[[v[1], v[0], v[2], v[3]]], &mut scratch)
            .unwrap_err();
        assert!(matches!(err, TopologyError::InvalidOrientation { .. }));
        assert_eq!(mesh.number_of_cells(), before);
        assert!(mesh.contains_cell(top));
        assert!(mesh.cell(bottom).unwrap().face_towards(top).is_some());
    }

    #[test]
    fn test_flip_two_to_three_by_replacement() {
        let (mut mesh, v, [top, bottom]) = two_tets();
        let mut scratch = ReplaceScratch::default();
        let new_cells = [
            cell_from_outward_face([v[0], v[1], v[3]], v[4]),
            cell_from_outward_face([v[1], v[2], v[3]], v[4]),
            cell_from_outward_face([v[2], v[0], v[3]], v[4]),
        ];
        let keys = mesh.replace_cells(&[top, bottom], &new_cells, &mut scratch).unwrap();
        assert_eq!(keys.len(), 3);
        assert_eq!(mesh.number_of_cells(), 3);
        assert!(!mesh.contains_cell(top));
        // Each new cell is adjacent to the other two.
        for &k in &keys {
            let cell = mesh.cell(k).unwrap();
            let internal = cell.faces().iter().filter(|f| f.neighbor.is_some()).count();
            assert_eq!(internal, 2);
        }
        assert_eq!(mesh.cells_around_edge(v[3], v[4]).len(), 3);
        assert!(mesh.find_face(&FaceKey::new([v[0], v[1], v[2]])).is_none());
    }

    #[test]
    fn test_remove_cells_clears_links() {
        let (mut mesh, v, [top, bottom]) = two_tets();
        assert_eq!(mesh.remove_cells(&[top]), 1);
        assert!(mesh.cell(bottom).unwrap().faces().iter().all(|f| f.neighbor.is_none()));
        assert!(mesh.vertex(v[3]).unwrap().incident_cell().is_none());
        assert_eq!(mesh.vertex(v[0]).unwrap().incident_cell(), Some(bottom));
    }

    #[test]
    fn test_cells_around_vertex_and_neighbors() {
        let (mesh, v, _) = two_tets();
        assert_eq!(mesh.cells_around_vertex(v[0]).len(), 2);
        assert_eq!(mesh.cells_around_vertex(v[3]).len(), 1);
        assert_eq!(mesh.vertex_neighbors(v[0]).len(), 4);
        assert!(mesh.has_edge(v[3], v[1]));
        assert!(!mesh.has_edge(v[3], v[4]));
    }

    #[test]
    fn test_neighbors_skip_sentinel_vertices() {
        let mut mesh = VolumeMesh::new();
        let v = [
            mesh.push_vertex(Point3::new(0.0, 0.0, 0.0), VertexKind::Domain),
            mesh.push_vertex(Point3::new(1.0, 0.0, 0.0), VertexKind::Domain),
            mesh.push_vertex(Point3::new(0.0, 1.0, 0.0), VertexKind::Domain),
            mesh.push_vertex(Point3::new(0.0, 0.0, 1.0), VertexKind::Super),
        ];
        mesh.insert_isolated_cell(v).unwrap();
        let neighbors = mesh.vertex_neighbors(v[0]);
        assert_eq!(neighbors.len(), 2);
        assert!(!neighbors.contains(&v[3]));
    }

    #[test]
    fn test_orphaned_vertex_keeps_its_key() {
        let (mut mesh, v, _) = two_tets();
        let lost = mesh.push_vertex(Point3::new(5.0, 5.0, 5.0), VertexKind::Interior);
        assert_eq!(mesh.number_of_vertices(), 6);

        mesh.orphan_unreferenced_vertex(lost);
        mesh.orphan_unreferenced_vertex(v[0]);
        assert_eq!(mesh.number_of_vertices(), 5);
        assert!(mesh.vertices().all(|(k, _)| k != lost));
        assert!(mesh.vertex(lost).unwrap().is_orphaned());
        assert!(!mesh.vertex(v[0]).unwrap().is_orphaned());
        assert_eq!(mesh.point(lost).unwrap(), Point3::new(5.0, 5.0, 5.0));
    }
}
