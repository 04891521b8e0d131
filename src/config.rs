// config.rs - Tunable parameters for detectors and renderers.
//
// Defaults reproduce the documented constants (Canny 80/90, FAST threshold
// 12, 20×20 band dilation, 8192 square markers, 16384 line vertices).
// Every struct is `serde(default)`, so a TOML file only has to name the
// values it changes:
//
//   [edges]
//   low_threshold = 60.0
//
//   [markers]
//   max_square_points = 4096

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Edge-extraction parameters shared by the six image-style detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeParams {
    /// Canny hysteresis low threshold (L1 gradient magnitude).
    pub low_threshold: f32,
    /// Canny hysteresis high threshold.
    pub high_threshold: f32,
    /// Side of the square structuring element used to thicken edges for
    /// the single-channel colour detectors.
    pub color_dilation: usize,
    /// Side of the structuring element for the grayscale band detector.
    pub band_dilation: usize,
    /// Weight of the edge map in the 50/50 blends (background gets 1 - w).
    pub blend_weight: f32,
}

impl Default for EdgeParams {
    fn default() -> Self {
        EdgeParams {
            low_threshold: 80.0,
            high_threshold: 90.0,
            color_dilation: 3,
            band_dilation: 20,
            blend_weight: 0.5,
        }
    }
}

/// FAST keypoint parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeypointParams {
    /// Intensity difference threshold (library default is 10).
    pub threshold: u8,
    /// Contiguous arc length N in FAST-N, 9..=12.
    pub arc_length: usize,
    /// Keep only corners whose score beats all 8 neighbours.
    pub nonmax_suppression: bool,
}

impl Default for KeypointParams {
    fn default() -> Self {
        KeypointParams {
            threshold: 12,
            arc_length: 9,
            nonmax_suppression: true,
        }
    }
}

/// Upper bound for `max_square_points`. Renderers reserve their full cap on
/// activation, so this bounds the scratch at a few tens of megabytes.
pub const SQUARE_POINTS_LIMIT: usize = 1 << 20;

/// Upper bound for `max_line_vertices`.
pub const LINE_VERTICES_LIMIT: usize = 6 << 20;

/// Marker geometry and buffer caps for the two point renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerParams {
    /// Half side of each marker quad, in NDC units.
    pub half_extent: f32,
    /// Indexed squares: maximum number of points drawn per frame.
    pub max_square_points: usize,
    /// Triangle lines: maximum number of vertices drawn per frame.
    pub max_line_vertices: usize,
}

impl Default for MarkerParams {
    fn default() -> Self {
        MarkerParams {
            half_extent: 0.005,
            max_square_points: 8192,
            max_line_vertices: 16384,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub edges: EdgeParams,
    pub keypoints: KeypointParams,
    pub markers: MarkerParams,
}

impl PreviewConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let config: PreviewConfig = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&src)
    }

    /// Reject values the detectors or renderers cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.edges;
        if !(e.low_threshold >= 0.0 && e.high_threshold >= 0.0) {
            return Err(invalid("edge thresholds must be non-negative"));
        }
        if e.color_dilation == 0 || e.band_dilation == 0 {
            return Err(invalid("dilation sizes must be >= 1"));
        }
        if !(0.0..=1.0).contains(&e.blend_weight) {
            return Err(invalid("blend_weight must be in [0, 1]"));
        }

        let k = &self.keypoints;
        if !(9..=12).contains(&k.arc_length) {
            return Err(invalid(format!(
                "keypoints.arc_length must be 9..=12 (got {})",
                k.arc_length
            )));
        }

        let m = &self.markers;
        if !(m.half_extent > 0.0 && m.half_extent < 1.0) {
            return Err(invalid("markers.half_extent must be in (0, 1)"));
        }
        if m.max_square_points == 0 {
            return Err(invalid("markers.max_square_points must be > 0"));
        }
        // Also keeps every u32 vertex index (4 per square) in range.
        if m.max_square_points > SQUARE_POINTS_LIMIT {
            return Err(invalid(format!(
                "markers.max_square_points must be <= {SQUARE_POINTS_LIMIT} (got {})",
                m.max_square_points
            )));
        }
        if m.max_line_vertices < 6 {
            return Err(invalid("markers.max_line_vertices must hold at least one marker (6)"));
        }
        if m.max_line_vertices > LINE_VERTICES_LIMIT {
            return Err(invalid(format!(
                "markers.max_line_vertices must be <= {LINE_VERTICES_LIMIT} (got {})",
                m.max_line_vertices
            )));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_documented_constants() {
        let c = PreviewConfig::default();
        assert_eq!(c.edges.low_threshold, 80.0);
        assert_eq!(c.edges.high_threshold, 90.0);
        assert_eq!(c.edges.band_dilation, 20);
        assert_eq!(c.keypoints.threshold, 12);
        assert_eq!(c.markers.max_square_points, 8192);
        assert_eq!(c.markers.max_line_vertices, 16384);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let c = PreviewConfig::from_toml_str(
            r#"
            [edges]
            low_threshold = 40.0

            [markers]
            max_square_points = 16
            "#,
        )
        .unwrap();
        assert_eq!(c.edges.low_threshold, 40.0);
        assert_eq!(c.edges.high_threshold, 90.0);
        assert_eq!(c.markers.max_square_points, 16);
        assert_eq!(c.keypoints, KeypointParams::default());
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(PreviewConfig::from_toml_str("").unwrap(), PreviewConfig::default());
    }

    #[test]
    fn test_rejects_bad_arc_length() {
        let err = PreviewConfig::from_toml_str("[keypoints]\narc_length = 7\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("arc_length")));
    }

    #[test]
    fn test_rejects_tiny_line_cap() {
        let mut c = PreviewConfig::default();
        c.markers.max_line_vertices = 5;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_marker_caps_bounded() {
        let mut c = PreviewConfig::default();
        c.markers.max_square_points = SQUARE_POINTS_LIMIT;
        c.markers.max_line_vertices = LINE_VERTICES_LIMIT;
        assert!(c.validate().is_ok());

        let err = PreviewConfig::from_toml_str("[markers]\nmax_square_points = 500000000\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("max_square_points")));

        c.markers.max_line_vertices = LINE_VERTICES_LIMIT + 1;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_parse_error_surfaces() {
        let err = PreviewConfig::from_toml_str("[edges\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = PreviewConfig::load("/nonexistent/edge-preview.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
