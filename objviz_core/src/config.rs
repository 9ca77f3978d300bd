//! Engine configuration.
//!
//! Every field has a default, and JSON files may set any subset of them:
//!
//! ```json
//! { "namespace": "tracks", "show_covariance": false, "max_paths_per_object": 16 }
//! ```

use crate::error::ConfigError;
use crate::identity::EvictionPolicy;
use crate::marker_id::{MarkerIdAllocator, DEFAULT_MAX_PATHS, DEFAULT_PATH_STRIDE};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the [`crate::FrameAssembler`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Namespace stamped on every primitive (default: "tracks")
    pub namespace: String,

    // === Per-category switches ===
    pub show_shape: bool,
    pub show_label: bool,
    pub show_identity_tag: bool,
    pub show_covariance: bool,
    pub show_velocity_text: bool,
    pub show_velocity_vector: bool,
    pub show_predicted_paths: bool,
    pub show_path_confidence: bool,

    // === Style ===
    /// Line width for outlines, ellipses, arrows and paths (default: 0.03 m)
    pub line_width: f64,

    /// Text height (default: 0.5 m)
    pub text_height: f64,

    /// Hex characters of the UUID shown by the identity tag (default: 8)
    pub identity_tag_chars: usize,

    // === Text stacking (object-local axes) ===
    /// Identity tag offset from the object position (default: -0.5, 0, -0.5)
    pub identity_tag_offset: Vector3<f64>,

    /// Velocity text offset, applied on top of the identity tag offset
    /// (default: -0.5, 0, -0.5)
    pub velocity_text_offset: Vector3<f64>,

    // === Kinematics ===
    /// Sigma multiplier of the covariance ellipse (default: 2.0)
    pub covariance_sigma: f64,

    /// Minimum speed for a velocity arrow (default: 0.01 m/s)
    pub min_velocity: f64,

    /// Arrow length in seconds of travel at the current speed (default: 1.0)
    pub velocity_arrow_seconds: f64,

    // === Predicted paths ===
    /// Paths with lower confidence are not drawn (default: 0.0)
    pub path_confidence_threshold: f64,

    /// Upper bound on emitted paths per object and category (default: 64)
    pub max_paths_per_object: u32,

    /// Id distance between consecutive path ordinals (default: 8 << 32)
    pub path_stride: u64,

    // === Identity ===
    /// Handling of UUIDs that stop appearing (default: recycle)
    pub eviction: EvictionPolicy,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            namespace: "tracks".to_string(),
            show_shape: true,
            show_label: true,
            show_identity_tag: true,
            show_covariance: true,
            show_velocity_text: true,
            show_velocity_vector: true,
            show_predicted_paths: true,
            show_path_confidence: true,
            line_width: 0.03,
            text_height: 0.5,
            identity_tag_chars: 8,
            identity_tag_offset: Vector3::new(-0.5, 0.0, -0.5),
            velocity_text_offset: Vector3::new(-0.5, 0.0, -0.5),
            covariance_sigma: 2.0,
            min_velocity: 0.01,
            velocity_arrow_seconds: 1.0,
            path_confidence_threshold: 0.0,
            max_paths_per_object: DEFAULT_MAX_PATHS,
            path_stride: DEFAULT_PATH_STRIDE,
            eviction: EvictionPolicy::Recycle,
        }
    }
}

impl DisplayConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check value ranges and the id layout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::invalid("namespace", "must not be empty"));
        }
        for (field, value) in [
            ("line_width", self.line_width),
            ("text_height", self.text_height),
            ("covariance_sigma", self.covariance_sigma),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::invalid(field, format!("{} is not positive", value)));
            }
        }
        for (field, value) in [
            ("min_velocity", self.min_velocity),
            ("velocity_arrow_seconds", self.velocity_arrow_seconds),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::invalid(field, format!("{} is negative", value)));
            }
        }
        if !(0.0..=1.0).contains(&self.path_confidence_threshold) {
            return Err(ConfigError::invalid(
                "path_confidence_threshold",
                format!("{} outside [0, 1]", self.path_confidence_threshold),
            ));
        }
        for (field, offset) in [
            ("identity_tag_offset", &self.identity_tag_offset),
            ("velocity_text_offset", &self.velocity_text_offset),
        ] {
            if offset.iter().any(|v| !v.is_finite()) {
                return Err(ConfigError::invalid(field, "components must be finite"));
            }
        }
        if self.identity_tag_chars == 0 || self.identity_tag_chars > 32 {
            return Err(ConfigError::invalid("identity_tag_chars", "must be in 1..=32"));
        }
        self.allocator().map(|_| ())
    }

    /// Allocator for this configuration's id layout.
    pub fn allocator(&self) -> Result<MarkerIdAllocator, ConfigError> {
        MarkerIdAllocator::new(self.path_stride, self.max_paths_per_object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DisplayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.namespace, "tracks");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = DisplayConfig::from_json_str(
            r#"{ "show_covariance": false, "identity_tag_offset": [0.0, 0.0, 1.0], "eviction": "retain" }"#,
        )
        .unwrap();
        assert!(!config.show_covariance);
        assert!(config.show_shape);
        assert_eq!(config.identity_tag_offset, Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(config.eviction, EvictionPolicy::Retain);
        assert_eq!(config.max_paths_per_object, DEFAULT_MAX_PATHS);
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_stride = DisplayConfig {
            path_stride: 4,
            ..Default::default()
        };
        assert!(matches!(
            bad_stride.validate(),
            Err(ConfigError::StrideTooSmall { .. })
        ));

        let bad_threshold = DisplayConfig {
            path_confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            bad_threshold.validate(),
            Err(ConfigError::InvalidValue { field: "path_confidence_threshold", .. })
        ));

        let bad_width = DisplayConfig {
            line_width: f64::NAN,
            ..Default::default()
        };
        assert!(bad_width.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(
            DisplayConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
