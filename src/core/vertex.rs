//! Vertices of the volume mesh.
//!
//! Vertices live in an append-only pool owned by
//! [`VolumeMesh`](crate::core::volume_mesh::VolumeMesh); a [`VertexKey`] is
//! therefore valid for the lifetime of the mesh. Each vertex carries a
//! [`VertexKind`] describing where it came from, which the pipeline uses to
//! tell sentinel vertices from real ones and to identify boundary-layer cells.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::core::cell::CellKey;

new_key_type! {
    /// Key type for accessing vertices in the vertex pool.
    pub struct VertexKey;
}

/// Origin of a vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexKind {
    /// One of the four sentinel vertices of the enclosing tetrahedron.
    Super,
    /// A corner of the domain box.
    Domain,
    /// A point on the input surface.
    Surface,
    /// A vertex of the `n`-th extruded boundary layer (1-based).
    Layer(u32),
    /// A vertex created in the volume by refinement.
    Interior,
    /// A vertex inserted to split a boundary face that flips could not recover.
    Steiner,
}

impl VertexKind {
    /// Boundary-layer level: 0 for surface vertices, `n` for layer `n`.
    #[must_use]
    pub const fn layer_level(self) -> Option<u32> {
        match self {
            Self::Surface | Self::Steiner => Some(0),
            Self::Layer(n) => Some(n),
            _ => None,
        }
    }
}

/// A vertex of the volume mesh.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    point: Point3<f64>,
    kind: VertexKind,
    /// Some cell containing this vertex, maintained by the mesh.
    pub(crate) incident_cell: Option<CellKey>,
    /// Set when an insertion that created this vertex was rolled back.
    pub(crate) orphaned: bool,
}

impl Vertex {
    #[must_use]
    pub const fn new(point: Point3<f64>, kind: VertexKind) -> Self {
        Self {
            point,
            kind,
            incident_cell: None,
            orphaned: false,
        }
    }

    #[must_use]
    pub const fn point(&self) -> &Point3<f64> {
        &self.point
    }

    #[must_use]
    pub const fn kind(&self) -> VertexKind {
        self.kind
    }

    #[must_use]
    pub const fn is_super(&self) -> bool {
        matches!(self.kind, VertexKind::Super)
    }

    /// A cell containing this vertex, if the vertex is still referenced.
    #[must_use]
    pub const fn incident_cell(&self) -> Option<CellKey> {
        self.incident_cell
    }

    /// True for a vertex left behind by a rolled-back insertion. It keeps its
    /// key but is never part of the mesh.
    #[must_use]
    pub const fn is_orphaned(&self) -> bool {
        self.orphaned
    }

    pub(crate) const fn set_point(&mut self, point: Point3<f64>) {
        self.point = point;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_levels() {
        assert_eq!(VertexKind::Surface.layer_level(), Some(0));
        assert_eq!(VertexKind::Layer(3).layer_level(), Some(3));
        assert_eq!(VertexKind::Super.layer_level(), None);
        assert_eq!(VertexKind::Interior.layer_level(), None);
    }

    #[test]
    fn test_new_vertex_has_no_incident_cell() {
        let v = Vertex::new(Point3::new(1.0, 2.0, 3.0), VertexKind::Domain);
        assert!(v.incident_cell().is_none());
        assert!(!v.is_super());
        assert_eq!(v.kind(), VertexKind::Domain);
        assert!(!v.is_orphaned());
    }
}
