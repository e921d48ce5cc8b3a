//! Tetrahedral cells and their faces.
//!
//! # Face numbering
//!
//! Face `i` of a cell is the face opposite vertex `i`. [`FACE_VERTICES`]
//! lists each face's vertices in outward order: the right-hand normal of the
//! listed triangle points away from the cell. For a positively oriented cell
//! `[v0, v1, v2, v3]` this means `orient3d(face..., v_i) < 0`.
//!
//! Given an outward face `(a, b, c)` of some region and a point `p` inside
//! that region, the cell `[a, c, b, p]` is positively oriented; see
//! [`cell_from_outward_face`].

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::core::vertex::VertexKey;
use crate::geometry::point::triangle_normal;
use crate::geometry::predicates::{Sphere, circumsphere};
use crate::geometry::point::GeometryError;

new_key_type! {
    /// Key type for accessing cells in the cell pool.
    pub struct CellKey;
}

/// Outward vertex order of each face, indexed by the opposite vertex.
pub const FACE_VERTICES: [[usize; 3]; 4] = [[1, 2, 3], [0, 3, 2], [0, 1, 3], [0, 2, 1]];

/// Orientation-free identity of a triangular face: its three vertex keys, sorted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceKey([VertexKey; 3]);

impl FaceKey {
    #[must_use]
    pub fn new(mut vertices: [VertexKey; 3]) -> Self {
        vertices.sort_unstable();
        Self(vertices)
    }

    #[must_use]
    pub const fn vertices(&self) -> &[VertexKey; 3] {
        &self.0
    }

    #[must_use]
    pub fn contains(&self, v: VertexKey) -> bool {
        self.0.contains(&v)
    }
}

/// Returns `true` if `a` and `b` list the same three vertices with the same
/// cyclic orientation.
#[must_use]
pub fn same_orientation(a: &[VertexKey; 3], b: &[VertexKey; 3]) -> bool {
    (0..3).any(|r| a[0] == b[r] && a[1] == b[(r + 1) % 3] && a[2] == b[(r + 2) % 3])
}

/// The positively oriented cell joining outward face `(a, b, c)` to an apex
/// on its inner side.
#[must_use]
pub const fn cell_from_outward_face(face: [VertexKey; 3], apex: VertexKey) -> [VertexKey; 4] {
    [face[0], face[2], face[1], apex]
}

/// Per-face record: the adjacent cell and the outward unit normal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellFace {
    /// Cell on the other side of this face; `None` on the hull.
    pub neighbor: Option<CellKey>,
    /// Outward unit normal.
    pub normal: Vector3<f64>,
}

/// A positively oriented tetrahedron.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    vertices: [VertexKey; 4],
    faces: [CellFace; 4],
    circumsphere: Sphere,
}

impl Cell {
    /// Builds a cell from its vertex keys and positions.
    ///
    /// Neighbor links start empty; the mesh wires them.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::DegenerateTetrahedron`] for a flat cell.
    pub fn new(vertices: [VertexKey; 4], points: &[Point3<f64>; 4]) -> Result<Self, GeometryError> {
        let circumsphere = circumsphere(&points[0], &points[1], &points[2], &points[3])?;
        let faces = std::array::from_fn(|i| {
            let [a, b, c] = FACE_VERTICES[i];
            CellFace {
                neighbor: None,
                normal: triangle_normal(&points[a], &points[b], &points[c])
                    .unwrap_or_else(Vector3::zeros),
            }
        });
        Ok(Self {
            vertices,
            faces,
            circumsphere,
        })
    }

    #[must_use]
    pub const fn vertices(&self) -> &[VertexKey; 4] {
        &self.vertices
    }

    #[must_use]
    pub const fn faces(&self) -> &[CellFace; 4] {
        &self.faces
    }

    #[must_use]
    pub const fn circumsphere(&self) -> &Sphere {
        &self.circumsphere
    }

    #[must_use]
    pub const fn neighbor(&self, face: usize) -> Option<CellKey> {
        self.faces[face].neighbor
    }

    pub(crate) const fn set_neighbor(&mut self, face: usize, neighbor: Option<CellKey>) {
        self.faces[face].neighbor = neighbor;
    }

    /// Outward vertex order of face `face`.
    #[must_use]
    pub const fn face_vertices(&self, face: usize) -> [VertexKey; 3] {
        let [a, b, c] = FACE_VERTICES[face];
        [self.vertices[a], self.vertices[b], self.vertices[c]]
    }

    #[must_use]
    pub fn face_key(&self, face: usize) -> FaceKey {
        FaceKey::new(self.face_vertices(face))
    }

    /// Local index of `v`, if this cell contains it.
    #[must_use]
    pub fn index_of(&self, v: VertexKey) -> Option<usize> {
        self.vertices.iter().position(|&x| x == v)
    }

    #[must_use]
    pub fn contains_vertex(&self, v: VertexKey) -> bool {
        self.vertices.contains(&v)
    }

    /// Local index of the face with identity `key`.
    #[must_use]
    pub fn face_index_of(&self, key: &FaceKey) -> Option<usize> {
        (0..4).find(|&i| !key.contains(self.vertices[i]))
            .filter(|&i| self.face_key(i) == *key)
    }

    /// Local index of the face shared with `neighbor`.
    #[must_use]
    pub fn face_towards(&self, neighbor: CellKey) -> Option<usize> {
        self.faces.iter().position(|f| f.neighbor == Some(neighbor))
    }

    /// Recomputes normals and circumsphere after a vertex moved.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::DegenerateTetrahedron`] for a flat cell.
    pub(crate) fn refresh_geometry(&mut self, points: &[Point3<f64>; 4]) -> Result<(), GeometryError> {
        let fresh = Self::new(self.vertices, points)?;
        self.circumsphere = fresh.circumsphere;
        for (face, new) in self.faces.iter_mut().zip(fresh.faces) {
            face.normal = new.normal;
        }
        Ok(())
    }
}
