//! Quality filters applied after inference

use studio_config::PrecisionConfig;

use crate::Detection;

/// Why a detection was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Confidence outside the configured band
    Confidence,
    /// Area outside the configured band
    Area,
}

/// Check a detection against the precision settings (bounds inclusive)
pub fn validate(detection: &Detection, precision: &PrecisionConfig) -> Result<(), Rejection> {
    let confidence = precision.confidence_threshold_min..=precision.confidence_threshold_max;
    if !confidence.contains(&detection.confidence) {
        return Err(Rejection::Confidence);
    }

    if precision.area_filter {
        let area = precision.min_area_pixels..=precision.max_area_pixels;
        if !area.contains(&detection.area) {
            return Err(Rejection::Area);
        }
    }

    Ok(())
}
