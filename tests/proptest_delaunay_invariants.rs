//! Property-based tests for the Delaunay engine.
//!
//! - Topology and empty-circumsphere invariants after random insertions
//! - `remove_super` only removes cells touching a sentinel vertex
//! - Refinement leaves a converged mesh unchanged
//! - Refinement followed by smoothing keeps the mesh positive and Delaunay

use cfd_mesh::core::validation::{find_global_violations, validate_topology};
use cfd_mesh::geometry::quality::signed_volume;
use cfd_mesh::prelude::*;
use proptest::prelude::*;

// =============================================================================
// TEST CONFIGURATION
// =============================================================================

fn unit_box() -> Aabb {
    Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0))
}

fn box_point() -> impl Strategy<Value = Point3<f64>> {
    (0.0..1.0, 0.0..1.0, 0.0..1.0).prop_map(|(x, y, z)| Point3::new(x, y, z))
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// =============================================================================
// INVARIANTS
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: after any sequence of insertions the mesh is structurally
    /// valid and no vertex lies strictly inside a circumsphere.
    #[test]
    fn prop_random_insertions_keep_invariants(
        points in prop::collection::vec(box_point(), 4..80)
    ) {
        init_tracing();
        let mut dt = DelaunayMesh::new(unit_box()).unwrap();
        let report = dt.add_vertices(points.iter().map(|&p| (p, VertexKind::Interior)), 1e-9);
        prop_assert_eq!(report.vertices.len(), points.len());
        prop_assert!(report.is_complete());
        prop_assert!(dt.complete().is_ok());
        prop_assert!(find_global_violations(dt.mesh()).is_empty());
    }

    /// Property: `remove_super` keeps exactly the cells without sentinel
    /// vertices, and those keep their keys.
    #[test]
    fn prop_remove_super_keeps_real_cells(
        points in prop::collection::vec(box_point(), 4..60)
    ) {
        let mut dt = DelaunayMesh::new(unit_box()).unwrap();
        dt.add_vertices(points.iter().map(|&p| (p, VertexKind::Interior)), 1e-9);
        let real: Vec<CellKey> = dt
            .mesh()
            .cell_keys()
            .filter(|&c| !dt.mesh().is_super_cell(c))
            .collect();

        dt.remove_super();
        prop_assert_eq!(dt.number_of_cells(), real.len());
        for c in real {
            prop_assert!(dt.mesh().contains_cell(c));
        }
        prop_assert!(validate_topology(dt.mesh()).is_ok());
    }

    /// Property: a second refinement at the same size inserts nothing.
    #[test]
    fn prop_refine_is_idempotent(
        points in prop::collection::vec(box_point(), 4..20)
    ) {
        let mut dt = DelaunayMesh::new(unit_box()).unwrap();
        dt.add_vertices(unit_box().corners().into_iter().map(|p| (p, VertexKind::Domain)), 0.0);
        dt.add_vertices(points.iter().map(|&p| (p, VertexKind::Interior)), 1e-6);

        let first = dt.refine(0.3).unwrap();
        prop_assert!(first.converged);
        let cells = dt.number_of_cells();
        let second = dt.refine(0.3).unwrap();
        prop_assert_eq!(second.inserted, 0);
        prop_assert_eq!(dt.number_of_cells(), cells);
        prop_assert!(dt.complete().is_ok());
    }

    /// Property: smoothing a refined mesh keeps every cell positive and the
    /// mesh globally Delaunay.
    #[test]
    fn prop_smoothing_keeps_mesh_valid(
        points in prop::collection::vec(box_point(), 0..40)
    ) {
        init_tracing();
        let mut dt = DelaunayMesh::new(unit_box()).unwrap();
        dt.add_vertices(unit_box().corners().into_iter().map(|p| (p, VertexKind::Domain)), 0.0);
        dt.add_vertices(points.iter().map(|&p| (p, VertexKind::Interior)), 1e-6);
        dt.refine(0.3).unwrap();

        let stats = dt.smooth().unwrap();
        prop_assert!(stats.moved + stats.reverted + stats.skipped > 0);
        dt.complete().unwrap();
        prop_assert!(find_global_violations(dt.mesh()).is_empty());
        for c in dt.mesh().cell_keys() {
            let [a, b, cc, d] = dt.mesh().cell_points(c).unwrap();
            prop_assert!(signed_volume(&a, &b, &cc, &d) > 0.0);
        }
    }
}

#[test]
fn duplicate_points_are_idempotent() {
    let mut dt = DelaunayMesh::new(unit_box()).unwrap();
    let p = Point3::new(0.25, 0.5, 0.75);
    let first = dt.add_vertex(p, VertexKind::Interior, 0.0).unwrap();
    let cells = dt.number_of_cells();
    let second = dt.add_vertex(Point3::new(0.25, 0.5, 0.75 + 1e-4), VertexKind::Interior, 1e-3).unwrap();
    assert_eq!(second, InsertOutcome::Duplicate(first.vertex()));
    assert_eq!(dt.number_of_cells(), cells);
}

#[test]
fn points_outside_sentinel_are_rejected_without_change() {
    let mut dt = DelaunayMesh::new(unit_box()).unwrap();
    dt.add_vertex(Point3::new(0.5, 0.5, 0.5), VertexKind::Interior, 0.0).unwrap();
    let cells = dt.number_of_cells();
    let err = dt
        .add_vertex(Point3::new(1e6, 0.0, 0.0), VertexKind::Interior, 0.0)
        .unwrap_err();
    assert!(matches!(err, InsertionError::OutsideHull { .. }));
    assert_eq!(dt.number_of_cells(), cells);
    dt.complete().unwrap();
}
