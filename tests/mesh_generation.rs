//! End-to-end generation tests.

use cfd_mesh::core::validation::{validate_delaunay, validate_topology};
use cfd_mesh::geometry::quality::signed_volume;
use cfd_mesh::prelude::*;

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

fn domain(half: f64) -> Domain {
    Domain::new(Point3::origin(), Vector3::repeat(half))
}

#[test]
fn unit_sphere_in_large_domain() {
    init_tracing();
    let model = InputModel::new(icosphere(2));
    let config = MeshGenerationConfig::default();
    assert_eq!(config.initial_layer_height, 0.05);
    assert_eq!(config.layer_growth_factor, 1.2);
    assert_eq!(config.contour_layers, 3);

    let out = generate_mesh(Some(&model), Some(&domain(10.0)), &config, &mut NullDebugRenderer).unwrap();
    let report = &out.report;
    assert!(report.cells > 0);
    assert_eq!(report.cells, out.mesh.number_of_cells());
    assert_eq!(report.layers.len(), 3);
    assert!(report.layer_vertices() > 0);
    assert!(report.boundary_layer_cells > 0);
    assert!(report.carved_cells > 0);

    for c in boundary_layer_cells(&out.mesh) {
        let [a, b, cc, d] = out.mesh.cell_points(c).unwrap();
        assert!(signed_volume(&a, &b, &cc, &d) > 0.0);
    }
    validate_topology(&out.mesh).unwrap();
    validate_delaunay(&out.mesh).unwrap();
    assert!(!report.final_repair.exhausted);

    // The domain corners survive and nothing references a sentinel vertex.
    let domain_vertices = out
        .mesh
        .vertices()
        .filter(|(_, v)| v.kind() == VertexKind::Domain)
        .count();
    assert_eq!(domain_vertices, 8);
    assert!(out.mesh.cell_keys().all(|c| !out.mesh.is_super_cell(c)));
}

#[test]
fn layer_vertices_stay_outside_the_body() {
    let model = InputModel::new(icosphere(2));
    let config = MeshGenerationConfigBuilder::default()
        .contour_layers(2)
        .build()
        .unwrap();
    let out = generate_mesh(Some(&model), Some(&domain(5.0)), &config, &mut NullDebugRenderer).unwrap();
    let body = SurfaceBvh::new(&out.surface);
    let mut count = 0;
    for (_, v) in out.mesh.vertices() {
        if let VertexKind::Layer(level) = v.kind() {
            assert!((1..=2).contains(&level));
            assert!(!body.is_inside(v.point()));
            count += 1;
        }
    }
    assert_eq!(count, out.report.layer_vertices());
}

#[test]
fn partially_outside_model_is_rejected() {
    let model = InputModel::new(icosphere(1).translated(&Vector3::new(0.0, 9.5, 0.0)));
    let err = generate_mesh(
        Some(&model),
        Some(&domain(10.0)),
        &MeshGenerationConfig::default(),
        &mut NullDebugRenderer,
    )
    .unwrap_err();
    let MeshGenerationError::MeshOutsideDomain { mesh, domain } = err else {
        panic!("unexpected error {err:?}");
    };
    assert!(mesh.max.y > domain.max.y);
}

#[test]
fn debug_renderer_does_not_change_the_result() {
    let model = InputModel::new(cube(4).translated(&Vector3::repeat(-0.5)));
    let config = MeshGenerationConfigBuilder::default()
        .grid_resolution(0.3)
        .contour_layers(1)
        .build()
        .unwrap();

    let quiet = generate_mesh(Some(&model), Some(&domain(3.0)), &config, &mut NullDebugRenderer).unwrap();
    let mut recorder = RecordingDebugRenderer::new();
    let loud = generate_mesh(Some(&model), Some(&domain(3.0)), &config, &mut recorder).unwrap();

    assert_eq!(quiet.report, loud.report);
    assert_eq!(quiet.surface, loud.surface);
    assert!(recorder.number_of_lines() > 0);
    assert!(recorder.number_of_points() > 0);
}

#[test]
fn optional_stages_run_when_enabled() {
    let model = InputModel::new(icosphere(1));
    let config = MeshGenerationConfigBuilder::default()
        .grid_resolution(1.5)
        .contour_layers(1)
        .refine(true)
        .smooth(true)
        .quad_dominant(true)
        .build()
        .unwrap();
    let out = generate_mesh(Some(&model), Some(&domain(3.0)), &config, &mut NullDebugRenderer).unwrap();
    let refinement = out.report.refinement.unwrap();
    assert!(refinement.converged);
    assert!(out.report.smoothing.is_some());
    for c in out.mesh.cell_keys() {
        let [a, b, cc, d] = out.mesh.cell_points(c).unwrap();
        assert!(signed_volume(&a, &b, &cc, &d) > 0.0);
    }
    validate_delaunay(&out.mesh).unwrap();
    let quads = out.quad_surface.unwrap();
    assert_eq!(
        2 * quads.number_of_quads() + quads.number_of_triangles(),
        out.surface.number_of_triangles()
    );
}
