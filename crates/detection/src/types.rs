//! Validated detections and the settings that shape them

use inference_engine::RawDetection;
use ndarray::Array2;
use studio_config::{ColorConfig, DisplayConfig, PrecisionConfig, StudioConfig};

/// Class id to display name table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassNames(Vec<String>);

impl ClassNames {
    pub fn new(names: Vec<String>) -> Self {
        Self(names)
    }

    /// Name for `class_id`, `class_{id}` when the table has no entry
    pub fn name(&self, class_id: u32) -> String {
        self.0
            .get(class_id as usize)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for ClassNames {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

/// A detection that passed the well-formedness check
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// `[x1, y1, x2, y2]` in frame pixels
    pub bbox: [f32; 4],
    pub confidence: f32,
    /// Box midpoint
    pub center: (f32, f32),
    /// Box area in square pixels
    pub area: f32,
    pub class_id: u32,
    pub class_name: String,
    /// Soft mask in [0, 1], any resolution
    pub mask: Option<Array2<f32>>,
}

impl Detection {
    /// Build from model output, `None` for malformed boxes
    pub fn from_raw(raw: RawDetection, names: &ClassNames) -> Option<Self> {
        if !raw.is_well_formed() {
            return None;
        }
        Some(Self {
            bbox: [raw.x1, raw.y1, raw.x2, raw.y2],
            confidence: raw.confidence,
            center: ((raw.x1 + raw.x2) / 2.0, (raw.y1 + raw.y2) / 2.0),
            area: raw.area(),
            class_id: raw.class_id,
            class_name: names.name(raw.class_id),
            mask: raw.mask,
        })
    }

    pub fn width(&self) -> f32 {
        self.bbox[2] - self.bbox[0]
    }

    pub fn height(&self) -> f32 {
        self.bbox[3] - self.bbox[1]
    }
}

/// Per-call detection settings, a view of the relevant configuration sections
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    /// Threshold handed to the model
    pub confidence_threshold: f32,
    /// NMS IoU threshold handed to the model
    pub iou_threshold: f32,
    pub precision: PrecisionConfig,
    pub display: DisplayConfig,
    pub colors: ColorConfig,
}

impl DetectionSettings {
    pub fn from_config(config: &StudioConfig) -> Self {
        Self {
            confidence_threshold: config.model.confidence_threshold,
            iou_threshold: config.model.iou_threshold,
            precision: config.precision.clone(),
            display: config.display.clone(),
            colors: config.colors.clone(),
        }
    }
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self::from_config(&StudioConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_name_fallback() {
        let names = ClassNames::new(vec!["stator".to_string()]);
        assert_eq!(names.name(0), "stator");
        assert_eq!(names.name(4), "class_4");
        assert_eq!(ClassNames::default().name(0), "class_0");
    }

    #[test]
    fn test_from_raw_derives_geometry() {
        let raw = RawDetection::new(10.0, 20.0, 50.0, 40.0, 0.6, 0);
        let det = Detection::from_raw(raw, &ClassNames::default()).unwrap();
        assert_eq!(det.center, (30.0, 30.0));
        assert_eq!(det.area, 800.0);
        assert_eq!(det.class_name, "class_0");
    }

    #[test]
    fn test_from_raw_rejects_malformed() {
        let raw = RawDetection::new(50.0, 20.0, 10.0, 40.0, 0.6, 0);
        assert!(Detection::from_raw(raw, &ClassNames::default()).is_none());
    }

    #[test]
    fn test_settings_follow_config() {
        let mut config = StudioConfig::default();
        config.model.iou_threshold = 0.7;
        config.display.show_masks = false;
        let settings = DetectionSettings::from_config(&config);
        assert_eq!(settings.iou_threshold, 0.7);
        assert!(!settings.display.show_masks);
    }
}
