//! Integration tests for the surface remeshing stages.

use approx::assert_relative_eq;
use cfd_mesh::prelude::*;
use cfd_mesh::surface::walk::{DEFAULT_MAX_STEPS, walk_to};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// =============================================================================
// FEATURE CURVES
// =============================================================================

#[test]
fn cube_feature_curves_are_its_twelve_edges() {
    let mesh = cube(5);
    let curves = extract_feature_curves(&mesh, &FeatureEdgeParams::default());
    assert_eq!(curves.len(), 12);
    for curve in &curves {
        assert!(!curve.is_closed());
        assert_eq!(curve.edges.len(), 5);
        assert_relative_eq!(curve.polyline.length(), 1.0, epsilon = 1e-9);
        // Every point of a cube edge has two coordinates at 0 or 1.
        for p in curve.polyline.points() {
            let on_face = p.coords.iter().filter(|&&x| x.abs() < 1e-12 || (x - 1.0).abs() < 1e-12).count();
            assert!(on_face >= 2);
        }
    }
}

#[test]
fn smooth_sphere_has_no_features() {
    let mesh = icosphere(3);
    assert!(extract_feature_curves(&mesh, &FeatureEdgeParams::default()).is_empty());
}

// =============================================================================
// TRIANGLE WALK
// =============================================================================

#[test]
fn walk_reaches_random_targets_on_sphere() {
    let mesh = icosphere(3);
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..100 {
        let t = rng.random_range(0..mesh.number_of_triangles());
        let [a, b, c] = mesh.triangle_points(t);
        let (u, v) = (rng.random_range(0.05..0.45), rng.random_range(0.05..0.45));
        let target = a + (b - a) * u + (c - a) * v;
        let start = rng.random_range(0..mesh.number_of_triangles());
        let hit = walk_to(&mesh, start, &target, 1e-6, DEFAULT_MAX_STEPS).unwrap();
        assert_eq!(hit.triangle, t);
        assert_relative_eq!(hit.point, target, epsilon = 1e-9);
    }
}

// =============================================================================
// POINT PLACEMENT
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// Property: no two accepted points are closer than the threshold the
    /// later one was accepted with.
    #[test]
    fn prop_placement_respects_threshold(spacing in 0.15..0.4_f64) {
        let mut mesh = cube(3);
        let curves = extract_feature_curves(&mesh, &FeatureEdgeParams::default().with_min_curve_edges(2));
        let field = CrossField::propagate(&mesh, &curves, &SpacingParams::uniform(spacing));
        let params = PlacementParams::default().with_spacing(SpacingParams::uniform(spacing));
        let placement = place_points(&mut mesh, &field, &curves, &params).unwrap();
        prop_assert!(!placement.points.is_empty());

        for (j, later) in placement.points.iter().enumerate() {
            for earlier in &placement.points[..j] {
                let d = (later.position - earlier.position).norm();
                prop_assert!(d >= later.threshold - 1e-9, "{} < {}", d, later.threshold);
            }
        }
        prop_assert!(mesh.validate_twins().is_ok());
        prop_assert!(mesh.is_closed());
    }
}

/// Accepted points per unit area on a sphere of the given radius.
fn placed_density(config: &MeshGenerationConfig, radius: f64) -> f64 {
    let mut mesh = icosphere(2).scaled(radius);
    let curves = extract_feature_curves(&mesh, &config.feature_params());
    let field = CrossField::propagate(&mesh, &curves, &config.spacing_params());
    let placement = place_points(&mut mesh, &field, &curves, &config.placement_params()).unwrap();
    placement.points.len() as f64 / (4.0 * std::f64::consts::PI * radius * radius)
}

#[test]
fn curved_surfaces_receive_denser_points() {
    let adaptive = MeshGenerationConfigBuilder::default()
        .grid_resolution(0.4)
        .curvature_gain(4.0)
        .min_spacing_ratio(0.25)
        .build()
        .unwrap();
    let tight = placed_density(&adaptive, 0.5);
    let gentle = placed_density(&adaptive, 2.0);
    assert!(tight > 1.5 * gentle, "{tight} vs {gentle}");

    let uniform = MeshGenerationConfig {
        curvature_gain: 0.0,
        ..adaptive
    };
    assert!(placed_density(&uniform, 0.5) < tight);
}

// =============================================================================
// BOUNDARY RECOVERY
// =============================================================================

#[test]
fn convex_surface_faces_are_already_present() {
    let surface = icosphere(1);
    let bounds = Aabb::from_center_half_extent(Point3::origin(), Vector3::repeat(10.0));
    let mut dt = DelaunayMesh::new(bounds).unwrap();
    dt.add_vertices(bounds.corners().into_iter().map(|p| (p, VertexKind::Domain)), 0.0);
    let report = dt.add_vertices(surface.positions().iter().map(|&p| (p, VertexKind::Surface)), 0.0);
    assert!(report.is_complete());

    let faces: Vec<[VertexKey; 3]> = surface
        .triangles()
        .map(|t| t.map(|v| report.vertices[v].unwrap()))
        .collect();
    let bvh = SurfaceBvh::new(&surface);
    let recovery = dt
        .constrain_triangulation(&faces, &bvh, &RecoveryConfig::default())
        .unwrap();
    assert_eq!(recovery.already_present, faces.len());
    assert!(recovery.is_conforming());
    for face in &faces {
        assert!(dt.mesh().is_constrained(&FaceKey::new(*face)));
    }
    dt.complete().unwrap();
}

// =============================================================================
// CONFIGURATION
// =============================================================================

#[test]
fn config_round_trips_through_json() {
    let config = MeshGenerationConfigBuilder::default()
        .contour_layers(4)
        .recovery_policy(RecoveryPolicy::Abort)
        .refine(true)
        .build()
        .unwrap();
    let json = serde_json::to_string(&config).unwrap();
    let back: MeshGenerationConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}
