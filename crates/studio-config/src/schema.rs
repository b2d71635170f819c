//! Configuration schema and validation

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Complete studio configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub model: ModelConfig,
    pub camera: CameraConfig,
    pub display: DisplayConfig,
    pub tracking: TrackingConfig,
    pub colors: ColorConfig,
    pub precision: PrecisionConfig,
}

/// Detection model selection and inference thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Primary model file
    pub path: String,
    /// Model tried when the primary one cannot be loaded
    pub fallback_path: String,
    /// Minimum score passed to the model
    pub confidence_threshold: f32,
    /// IoU threshold for non-maximum suppression
    pub iou_threshold: f32,
    /// Class names indexed by class id
    pub class_names: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "./trained_model/best.onnx".to_string(),
            fallback_path: "yolov8n-seg.onnx".to_string(),
            confidence_threshold: 0.15,
            iou_threshold: 0.5,
            class_names: vec!["stator".to_string()],
        }
    }
}

/// Camera device and image adjustment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub device_id: u32,
    pub resolution_width: u32,
    pub resolution_height: u32,
    /// Frame rate cap; zero means unthrottled
    pub fps_limit: f64,
    pub brightness: f32,
    pub contrast: f32,
    pub sharpness: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            resolution_width: 640,
            resolution_height: 480,
            fps_limit: 30.0,
            brightness: 0.0,
            contrast: 1.0,
            sharpness: 0.0,
        }
    }
}

/// What the annotator draws
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub show_masks: bool,
    pub show_boxes: bool,
    pub show_labels: bool,
    pub show_confidence: bool,
    pub show_fps: bool,
    pub window_title: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_masks: true,
            show_boxes: true,
            show_labels: true,
            show_confidence: true,
            show_fps: true,
            window_title: "YOLO Detection Studio".to_string(),
        }
    }
}

/// Object tracking options (persisted for the UI, not acted on by the pipeline)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub enabled: bool,
    pub show_trails: bool,
    pub trail_length: u32,
    pub tracker_type: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            show_trails: true,
            trail_length: 30,
            tracker_type: "bytetrack".to_string(),
        }
    }
}

/// Annotation colors (RGB)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub detection_color: [u8; 3],
    pub text_color: [u8; 3],
    pub background_color: [u8; 3],
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            detection_color: [0, 255, 0],
            text_color: [255, 255, 255],
            background_color: [0, 0, 0],
        }
    }
}

/// Post-inference validation filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecisionConfig {
    /// Lowest accepted confidence (inclusive)
    pub confidence_threshold_min: f32,
    /// Highest accepted confidence (inclusive)
    pub confidence_threshold_max: f32,
    pub confidence_smoothing: bool,
    /// Smallest accepted box area in pixels (inclusive)
    pub min_area_pixels: f32,
    /// Largest accepted box area in pixels (inclusive)
    pub max_area_pixels: f32,
    /// Apply the area bounds
    pub area_filter: bool,
    pub stability_check: bool,
    pub stability_frames: u32,
    pub nms_threshold: f32,
    pub duplicate_threshold: f32,
}

impl Default for PrecisionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold_min: 0.25,
            confidence_threshold_max: 0.8,
            confidence_smoothing: true,
            min_area_pixels: 500.0,
            max_area_pixels: 50000.0,
            area_filter: true,
            stability_check: true,
            stability_frames: 3,
            nms_threshold: 0.4,
            duplicate_threshold: 0.3,
        }
    }
}

impl PrecisionConfig {
    /// Accept everything the model reports
    pub fn permissive() -> Self {
        Self {
            confidence_threshold_min: 0.0,
            confidence_threshold_max: 1.0,
            area_filter: false,
            ..Default::default()
        }
    }
}

fn unit_interval(name: &str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

fn within(name: &str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::Invalid(format!(
            "{} must be within [{}, {}], got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

impl StudioConfig {
    /// Check every range and cross-field constraint
    pub fn validate(&self) -> Result<(), ConfigError> {
        let model = &self.model;
        if model.path.trim().is_empty() && model.fallback_path.trim().is_empty() {
            return Err(ConfigError::Invalid("model.path and model.fallback_path are both empty".into()));
        }
        unit_interval("model.confidence_threshold", model.confidence_threshold)?;
        unit_interval("model.iou_threshold", model.iou_threshold)?;

        let camera = &self.camera;
        if camera.resolution_width == 0 || camera.resolution_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "camera resolution must be non-zero, got {}x{}",
                camera.resolution_width, camera.resolution_height
            )));
        }
        if !camera.fps_limit.is_finite() {
            return Err(ConfigError::Invalid("camera.fps_limit must be finite".into()));
        }
        within("camera.brightness", camera.brightness, -255.0, 255.0)?;
        within("camera.contrast", camera.contrast, 0.01, 10.0)?;
        within("camera.sharpness", camera.sharpness, -10.0, 10.0)?;

        let precision = &self.precision;
        unit_interval("precision.confidence_threshold_min", precision.confidence_threshold_min)?;
        unit_interval("precision.confidence_threshold_max", precision.confidence_threshold_max)?;
        if precision.confidence_threshold_min > precision.confidence_threshold_max {
            return Err(ConfigError::Invalid(format!(
                "precision.confidence_threshold_min ({}) exceeds confidence_threshold_max ({})",
                precision.confidence_threshold_min, precision.confidence_threshold_max
            )));
        }
        within("precision.min_area_pixels", precision.min_area_pixels, 0.0, f32::MAX)?;
        within("precision.max_area_pixels", precision.max_area_pixels, 0.0, f32::MAX)?;
        if precision.min_area_pixels > precision.max_area_pixels {
            return Err(ConfigError::Invalid(format!(
                "precision.min_area_pixels ({}) exceeds max_area_pixels ({})",
                precision.min_area_pixels, precision.max_area_pixels
            )));
        }
        unit_interval("precision.nms_threshold", precision.nms_threshold)?;
        unit_interval("precision.duplicate_threshold", precision.duplicate_threshold)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(StudioConfig::default().validate().is_ok());
        let mut config = StudioConfig::default();
        config.precision = PrecisionConfig::permissive();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inverted_confidence_band_rejected() {
        let mut config = StudioConfig::default();
        config.precision.confidence_threshold_min = 0.9;
        config.precision.confidence_threshold_max = 0.2;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let mut config = StudioConfig::default();
        config.camera.resolution_height = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nan_contrast_rejected() {
        let mut config = StudioConfig::default();
        config.camera.contrast = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: StudioConfig =
            serde_json::from_str(r#"{"model": {"confidence_threshold": 0.3}}"#).unwrap();
        assert_eq!(config.model.confidence_threshold, 0.3);
        assert_eq!(config.model.fallback_path, "yolov8n-seg.onnx");
        assert_eq!(config.camera, CameraConfig::default());
    }
}
