//! # cfd-mesh
//!
//! Volume mesh generation for external-flow CFD: a tetrahedral mesh of a box
//! domain around a closed body, with boundary layers grown off the body
//! surface.
//!
//! # Features
//!
//! - Incremental 3D Delaunay tetrahedralization with cavity insertion, 2-3 and
//!   3-2 flips, circumcenter refinement and Laplacian smoothing
//! - Boundary recovery that forces the body surface into the volume mesh as
//!   constrained faces
//! - Advancing-front boundary-layer extrusion with curvature-adapted heights
//! - Surface remeshing: feature curves, cross-field propagation, spacing-driven
//!   point placement and quad-dominant pairing
//! - Serialization of configurations and parameters with [serde](https://serde.rs)
//!
//! # Basic Usage
//!
//! ```rust
//! use cfd_mesh::prelude::*;
//!
//! let model = InputModel::new(icosphere(1));
//! let domain = Domain::new(Point3::origin(), Vector3::new(4.0, 4.0, 4.0));
//! let config = MeshGenerationConfigBuilder::default()
//!     .contour_layers(2)
//!     .grid_resolution(0.6)
//!     .build()
//!     .unwrap();
//!
//! let out = generate_mesh(Some(&model), Some(&domain), &config, &mut NullDebugRenderer).unwrap();
//! assert!(out.report.cells > 0);
//! assert!(out.report.layer_vertices() > 0);
//! ```
//!
//! # Lower-level engine
//!
//! The pipeline stages are usable on their own. [`DelaunayMesh`](core::delaunay::DelaunayMesh)
//! owns the volume mesh and exposes insertion, refinement, recovery and layer
//! growth; the [`surface`] module works on [`SurfaceTriMesh`](surface::tri_mesh::SurfaceTriMesh)
//! values directly.
//!
//! # Invariants
//!
//! After every public engine operation:
//!
//! - every interior face is shared by exactly two mutually linked cells
//! - no non-sentinel cell has a non-sentinel vertex strictly inside its
//!   circumsphere, faces marked constrained excepted
//! - no neighbor link points at a removed cell
//!
//! [`DelaunayMesh::complete`](core::delaunay::DelaunayMesh::complete) checks
//! these and reports violations as typed errors.

#![forbid(unsafe_code)]

#[macro_use]
extern crate derive_builder;

/// Volume mesh data structures and the Delaunay engine.
pub mod core {
    /// Insertion, flips, recovery and layer growth on a [`VolumeMesh`](volume_mesh::VolumeMesh).
    pub mod algorithms {
        pub mod advancing_front;
        pub mod boundary_recovery;
        /// Bistellar 2-3 / 3-2 flips and Delaunay repair
        pub mod flips;
        /// Incremental cavity-based insertion
        pub mod incremental_insertion;
        /// Point location (face walking) and conflict regions
        pub mod locate;
        pub mod refinement;
        pub mod smoothing;
    }
    pub mod cell;
    /// Collection aliases used throughout the crate
    pub mod collections;
    pub mod delaunay;
    pub mod validation;
    pub mod vertex;
    pub mod volume_mesh;
}

/// Geometric primitives, predicates and queries on `nalgebra` points.
pub mod geometry {
    pub mod aabb;
    pub mod point;
    pub mod polyline;
    pub mod predicates;
    /// Tetrahedron quality measures
    pub mod quality;
    pub mod query;
}

/// Triangle surface meshes and the surface remeshing pipeline.
pub mod surface {
    pub mod bvh;
    pub mod cross_field;
    pub mod edge_graph;
    pub mod feature_edges;
    pub mod octree;
    pub mod point_placement;
    pub mod primitives;
    pub mod quad_dominant;
    pub mod tri_mesh;
    pub mod walk;
}

/// Configuration and the end-to-end generation driver.
pub mod generation {
    pub mod config;
    pub mod debug;
    pub mod driver;
}

/// A prelude module that re-exports commonly used types.
pub mod prelude {
    pub use nalgebra::{Point3, Vector3};

    pub use crate::core::algorithms::advancing_front::{DelaunayFront, LayerStats, boundary_layer_cells};
    pub use crate::core::algorithms::boundary_recovery::{
        RecoveryConfig, RecoveryError, RecoveryPolicy, RecoveryReport,
    };
    pub use crate::core::algorithms::flips::FlipError;
    pub use crate::core::algorithms::incremental_insertion::{InsertOutcome, InsertionError};
    pub use crate::core::cell::{Cell, CellKey, FaceKey};
    pub use crate::core::collections::{
        FastHashMap, FastHashSet, SmallBuffer, fast_hash_map_with_capacity, fast_hash_set_with_capacity,
    };
    pub use crate::core::delaunay::{DelaunayError, DelaunayMesh, EngineParams, InsertionReport};
    pub use crate::core::validation::MeshValidationError;
    pub use crate::core::vertex::{Vertex, VertexKey, VertexKind};
    pub use crate::core::volume_mesh::{TopologyError, VolumeMesh};

    pub use crate::geometry::aabb::Aabb;
    pub use crate::geometry::point::GeometryError;
    pub use crate::geometry::predicates::{InSphere, Orientation};

    pub use crate::surface::bvh::SurfaceBvh;
    pub use crate::surface::cross_field::{CrossField, SpacingParams};
    pub use crate::surface::feature_edges::{FeatureCurve, FeatureEdgeParams, extract_feature_curves};
    pub use crate::surface::point_placement::{PlacementParams, place_points};
    pub use crate::surface::primitives::{cube, icosphere};
    pub use crate::surface::quad_dominant::{Polygon, QuadDominantMesh, quad_dominant};
    pub use crate::surface::tri_mesh::{SurfaceMeshError, SurfaceTriMesh};

    pub use crate::generation::config::{ConfigError, MeshGenerationConfig, MeshGenerationConfigBuilder};
    pub use crate::generation::debug::{DebugRenderer, NullDebugRenderer, RecordingDebugRenderer};
    pub use crate::generation::driver::{
        Domain, GeneratedMesh, GenerationReport, InputModel, MeshGenerationError, generate_mesh,
    };
}

/// The function `is_normal` checks that structs implement `auto` traits.
/// Traits are checked at compile time, so this function is only used for
/// testing.
#[must_use]
pub const fn is_normal<T: Sized + Send + Sync + Unpin>() -> bool {
    true
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::is_normal;
    use crate::prelude::*;

    #[test]
    fn normal_types() {
        assert!(is_normal::<VolumeMesh>());
        assert!(is_normal::<DelaunayMesh>());
        assert!(is_normal::<SurfaceTriMesh>());
        assert!(is_normal::<CrossField>());
        assert!(is_normal::<DelaunayFront>());
        assert!(is_normal::<MeshGenerationConfig>());
        assert!(is_normal::<GeneratedMesh>());
    }

    #[test]
    fn test_prelude_collections_exports() {
        let mut map: FastHashMap<u64, usize> = fast_hash_map_with_capacity(4);
        map.insert(123, 456);
        assert_eq!(map.get(&123), Some(&456));

        let mut set: FastHashSet<u64> = fast_hash_set_with_capacity(4);
        set.insert(789);
        assert!(set.contains(&789));

        let buffer: SmallBuffer<i32, 4> = SmallBuffer::from_slice(&[1, 2, 3]);
        assert_eq!(buffer.len(), 3);
    }
}
