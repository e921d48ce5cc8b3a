//! Mesh generation settings.
//!
//! [`MeshGenerationConfig`] is plain data: it serializes with serde and can be
//! built field by field with [`MeshGenerationConfigBuilder`], whose `build`
//! rejects values the pipeline cannot use.
//!
//! # Examples
//!
//! ```
//! use cfd_mesh::generation::config::{MeshGenerationConfig, MeshGenerationConfigBuilder};
//!
//! let config = MeshGenerationConfigBuilder::default()
//!     .contour_layers(5)
//!     .layer_growth_factor(1.1)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.contour_layers, 5);
//! assert_eq!(config.initial_layer_height, MeshGenerationConfig::default().initial_layer_height);
//!
//! assert!(MeshGenerationConfigBuilder::default().grid_resolution(-1.0).build().is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::algorithms::boundary_recovery::{RecoveryConfig, RecoveryPolicy};
use crate::surface::cross_field::SpacingParams;
use crate::surface::feature_edges::FeatureEdgeParams;
use crate::surface::point_placement::PlacementParams;

/// A configuration value the pipeline cannot use.
#[derive(Clone, Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A length or factor that must be strictly positive is not.
    #[error("{field} must be positive and finite, got {value}")]
    NotPositive {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: f64,
    },
    /// A value outside its closed range.
    #[error("{field} must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn in_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value, min, max })
    }
}

/// Settings for [`generate_mesh`](crate::generation::driver::generate_mesh).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default, build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct MeshGenerationConfig {
    /// Thickness of the first boundary layer.
    pub initial_layer_height: f64,
    /// Ratio between consecutive layer thicknesses.
    pub layer_growth_factor: f64,
    /// Number of boundary layers.
    pub contour_layers: u32,
    /// Target surface spacing on flat regions, also the refinement size.
    pub grid_resolution: f64,
    /// How strongly surface curvature shrinks the spacing; zero is uniform.
    pub curvature_gain: f64,
    /// Smallest spacing on curved regions, as a fraction of `grid_resolution`.
    pub min_spacing_ratio: f64,
    /// Minimum dihedral angle of a feature edge, in degrees.
    pub feature_angle_deg: f64,
    pub min_feature_quality: f64,
    pub min_quad_quality: f64,
    /// Build a quad-dominant version of the remeshed surface.
    pub quad_dominant: bool,
    /// Refine the volume down to `grid_resolution`.
    pub refine: bool,
    /// Smooth refinement vertices.
    pub smooth: bool,
    /// Remove cells inside the input body.
    pub carve_interior: bool,
    pub recovery_policy: RecoveryPolicy,
    pub split_unrecovered: bool,
    /// Cap on surface points placed by the remesher.
    pub max_surface_points: usize,
}

impl Default for MeshGenerationConfig {
    fn default() -> Self {
        Self {
            initial_layer_height: 0.05,
            layer_growth_factor: 1.2,
            contour_layers: 3,
            grid_resolution: 0.5,
            curvature_gain: 1.0,
            min_spacing_ratio: 0.25,
            feature_angle_deg: 45.0,
            min_feature_quality: 0.5,
            min_quad_quality: 0.6,
            quad_dominant: false,
            refine: false,
            smooth: false,
            carve_interior: true,
            recovery_policy: RecoveryPolicy::Warn,
            split_unrecovered: true,
            max_surface_points: 200_000,
        }
    }
}

impl MeshGenerationConfig {
    /// Checks every numeric field.
    ///
    /// # Errors
    ///
    /// Returns the first offending field as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("initial_layer_height", self.initial_layer_height)?;
        positive("layer_growth_factor", self.layer_growth_factor)?;
        positive("grid_resolution", self.grid_resolution)?;
        in_range("curvature_gain", self.curvature_gain, 0.0, f64::MAX)?;
        positive("min_spacing_ratio", self.min_spacing_ratio)?;
        in_range("min_spacing_ratio", self.min_spacing_ratio, 0.0, 1.0)?;
        in_range("feature_angle_deg", self.feature_angle_deg, 0.0, 180.0)?;
        in_range("min_feature_quality", self.min_feature_quality, 0.0, 1.0)?;
        in_range("min_quad_quality", self.min_quad_quality, 0.0, 1.0)?;
        Ok(())
    }

    #[must_use]
    pub fn feature_params(&self) -> FeatureEdgeParams {
        FeatureEdgeParams::default()
            .with_feature_angle(self.feature_angle_deg)
            .with_min_quality(self.min_feature_quality)
    }

    /// Curvature-adapted spacing between `grid_resolution * min_spacing_ratio`
    /// and `grid_resolution`.
    #[must_use]
    pub fn spacing_params(&self) -> SpacingParams {
        SpacingParams::uniform(self.grid_resolution)
            .with_min(self.grid_resolution * self.min_spacing_ratio)
            .with_curvature_gain(self.curvature_gain)
    }

    #[must_use]
    pub fn placement_params(&self) -> PlacementParams {
        PlacementParams::default()
            .with_spacing(self.spacing_params())
            .with_max_points(self.max_surface_points)
    }

    #[must_use]
    pub fn recovery_config(&self) -> RecoveryConfig {
        RecoveryConfig::default()
            .with_policy(self.recovery_policy)
            .with_split_unrecovered(self.split_unrecovered)
    }
}

impl MeshGenerationConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        // Unset fields fall back to the defaults at build time.
        let defaults = MeshGenerationConfig::default();
        let merged = MeshGenerationConfig {
            initial_layer_height: self.initial_layer_height.unwrap_or(defaults.initial_layer_height),
            layer_growth_factor: self.layer_growth_factor.unwrap_or(defaults.layer_growth_factor),
            grid_resolution: self.grid_resolution.unwrap_or(defaults.grid_resolution),
            curvature_gain: self.curvature_gain.unwrap_or(defaults.curvature_gain),
            min_spacing_ratio: self.min_spacing_ratio.unwrap_or(defaults.min_spacing_ratio),
            feature_angle_deg: self.feature_angle_deg.unwrap_or(defaults.feature_angle_deg),
            min_feature_quality: self.min_feature_quality.unwrap_or(defaults.min_feature_quality),
            min_quad_quality: self.min_quad_quality.unwrap_or(defaults.min_quad_quality),
            ..defaults
        };
        merged.validate().map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MeshGenerationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.contour_layers, 3);
        assert!(config.carve_interior);
        assert!(!config.refine);
        assert_eq!(config.recovery_policy, RecoveryPolicy::Warn);
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        let err = MeshGenerationConfigBuilder::default()
            .initial_layer_height(0.0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("initial_layer_height"));

        let err = MeshGenerationConfigBuilder::default()
            .min_quad_quality(1.5)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("min_quad_quality"));

        let err = MeshGenerationConfigBuilder::default()
            .curvature_gain(-1.0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("curvature_gain"));

        let err = MeshGenerationConfigBuilder::default()
            .min_spacing_ratio(0.0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("min_spacing_ratio"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MeshGenerationConfig =
            serde_json::from_str(r#"{"contour_layers": 2, "recovery_policy": "Abort"}"#).unwrap();
        assert_eq!(config.contour_layers, 2);
        assert_eq!(config.recovery_policy, RecoveryPolicy::Abort);
        assert_eq!(config.grid_resolution, 0.5);
    }

    #[test]
    fn test_derived_params_follow_config() {
        let config = MeshGenerationConfigBuilder::default()
            .feature_angle_deg(30.0)
            .grid_resolution(0.2)
            .split_unrecovered(false)
            .build()
            .unwrap();
        assert_eq!(config.feature_params().feature_angle_deg, 30.0);
        assert_eq!(config.placement_params().spacing.base, 0.2);
        assert!(!config.recovery_config().split_unrecovered);
    }

    #[test]
    fn test_spacing_adapts_to_curvature() {
        let config = MeshGenerationConfigBuilder::default()
            .grid_resolution(0.4)
            .curvature_gain(2.0)
            .min_spacing_ratio(0.5)
            .build()
            .unwrap();
        let spacing = config.spacing_params();
        assert_eq!(spacing.spacing(0.0), 0.4);
        assert!(spacing.spacing(1.0) < 0.4);
        assert_eq!(spacing.spacing(1e6), 0.2);

        let uniform = MeshGenerationConfig {
            curvature_gain: 0.0,
            ..config
        };
        assert_eq!(uniform.spacing_params().spacing(1e6), 0.4);
    }
}
