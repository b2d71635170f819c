//! Raw model output

use ndarray::Array2;

/// One detection as reported by a model, before validation
///
/// Coordinates are frame pixels. Nothing here is trusted: the detection
/// pipeline checks `is_well_formed` before using a box.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Score in [0, 1]
    pub confidence: f32,
    pub class_id: u32,
    /// Soft mask with values in [0, 1], at any resolution
    pub mask: Option<Array2<f32>>,
}

impl RawDetection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: u32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
            mask: None,
        }
    }

    /// Attach a segmentation mask
    pub fn with_mask(mut self, mask: Array2<f32>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Box area in square pixels
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Finite coordinates and confidence with `x1 < x2` and `y1 < y2`
    pub fn is_well_formed(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2, self.confidence]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 < self.x2
            && self.y1 < self.y2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry() {
        let det = RawDetection::new(10.0, 20.0, 40.0, 30.0, 0.9, 0);
        assert_eq!(det.width(), 30.0);
        assert_eq!(det.height(), 10.0);
        assert_eq!(det.area(), 300.0);
        assert!(det.is_well_formed());
    }

    #[test]
    fn test_malformed_boxes() {
        assert!(!RawDetection::new(5.0, 0.0, 5.0, 10.0, 0.5, 0).is_well_formed());
        assert!(!RawDetection::new(0.0, 9.0, 5.0, 3.0, 0.5, 0).is_well_formed());
        assert!(!RawDetection::new(0.0, 0.0, f32::NAN, 3.0, 0.5, 0).is_well_formed());
        assert!(!RawDetection::new(0.0, 0.0, 4.0, 3.0, f32::INFINITY, 0).is_well_formed());
    }
}
