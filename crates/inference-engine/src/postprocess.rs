//! YOLOv8 output decoding and non-maximum suppression
//!
//! Detection heads emit `[1, 4 + classes (+ mask coefficients), anchors]`
//! where each anchor column is `cx, cy, w, h` in model input pixels followed
//! by per-class scores. Segmentation models add a prototype tensor
//! `[1, coefficients, mh, mw]`; a mask is the sigmoid of the coefficient
//! weighted sum of prototypes, cropped to the box.

use ndarray::Array2;

use crate::{InferenceError, RawDetection};

/// Upper bound on detections returned per frame
pub const MAX_DETECTIONS: usize = 300;

/// Owned copy of a model output tensor
#[derive(Debug, Clone, PartialEq)]
pub struct RawTensor {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

impl RawTensor {
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        Self { data, shape }
    }

    fn is_consistent(&self) -> bool {
        self.shape.iter().product::<usize>() == self.data.len()
    }
}

/// Intersection over union of two boxes
pub fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);
    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }
    let union = a.area() + b.area() - inter;
    if union <= 0.0 {
        return 0.0;
    }
    inter / union
}

/// Greedy per-class NMS, returning indices of kept boxes by descending confidence
fn nms_indices(boxes: &[RawDetection], iou_threshold: f32, max_detections: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        boxes[b]
            .confidence
            .partial_cmp(&boxes[a].confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<usize> = Vec::new();
    let mut suppressed = vec![false; boxes.len()];

    for (pos, &i) in order.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        kept.push(i);
        if kept.len() == max_detections {
            break;
        }
        for &j in &order[pos + 1..] {
            // Only apply NMS within the same class
            if !suppressed[j] && boxes[i].class_id == boxes[j].class_id && iou(&boxes[i], &boxes[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    kept
}

/// Decoding parameters for one frame
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    /// Square model input size in pixels
    pub input_size: u32,
    /// Frame the boxes are mapped back onto
    pub frame_width: u32,
    pub frame_height: u32,
    pub confidence: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

struct Candidate {
    detection: RawDetection,
    coefficients: Vec<f32>,
}

impl Decoder {
    /// Decode a detection head (and optional prototypes) into frame-space detections
    pub fn decode(&self, output: &RawTensor, protos: Option<&RawTensor>) -> Result<Vec<RawDetection>, InferenceError> {
        let coefficients = match protos {
            Some(p) => {
                if p.shape.len() != 4 || p.shape[0] != 1 || !p.is_consistent() {
                    return Err(InferenceError::InvalidOutputShape {
                        expected: "[1, coefficients, mh, mw]".to_string(),
                        actual: format!("{:?}", p.shape),
                    });
                }
                p.shape[1]
            }
            None => 0,
        };

        let shape_error = || InferenceError::InvalidOutputShape {
            expected: if coefficients > 0 {
                format!("[1, 4 + classes + {}, anchors]", coefficients)
            } else {
                "[1, 4 + classes, anchors]".to_string()
            },
            actual: format!("{:?}", output.shape),
        };

        if output.shape.len() != 3 || output.shape[0] != 1 || !output.is_consistent() {
            return Err(shape_error());
        }

        // YOLOv8 exports are channel-major; some converters transpose to anchor-major
        let (channels, anchors, channel_major) = if output.shape[1] <= output.shape[2] {
            (output.shape[1], output.shape[2], true)
        } else {
            (output.shape[2], output.shape[1], false)
        };
        if channels <= 4 + coefficients {
            return Err(shape_error());
        }
        let classes = channels - 4 - coefficients;

        let at = |c: usize, i: usize| {
            if channel_major {
                output.data[c * anchors + i]
            } else {
                output.data[i * channels + c]
            }
        };

        let sx = self.frame_width as f32 / self.input_size as f32;
        let sy = self.frame_height as f32 / self.input_size as f32;
        let (fw, fh) = (self.frame_width as f32, self.frame_height as f32);

        let mut candidates = Vec::new();
        for i in 0..anchors {
            let (class_id, score) = (0..classes)
                .map(|c| (c, at(4 + c, i)))
                .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
            if !score.is_finite() || score < self.confidence {
                continue;
            }

            let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
            let detection = RawDetection::new(
                ((cx - w / 2.0) * sx).clamp(0.0, fw),
                ((cy - h / 2.0) * sy).clamp(0.0, fh),
                ((cx + w / 2.0) * sx).clamp(0.0, fw),
                ((cy + h / 2.0) * sy).clamp(0.0, fh),
                score,
                class_id as u32,
            );
            candidates.push(Candidate {
                detection,
                coefficients: (0..coefficients).map(|k| at(4 + classes + k, i)).collect(),
            });
        }

        let boxes: Vec<RawDetection> = candidates.iter().map(|c| c.detection.clone()).collect();
        let kept = nms_indices(&boxes, self.iou_threshold, self.max_detections);

        let mut slots: Vec<Option<Candidate>> = candidates.into_iter().map(Some).collect();
        let detections = kept
            .into_iter()
            .filter_map(|i| slots[i].take())
            .map(|candidate| match protos {
                Some(p) => {
                    let mask = self.mask(&candidate, p);
                    candidate.detection.with_mask(mask)
                }
                None => candidate.detection,
            })
            .collect();

        Ok(detections)
    }

    /// Prototype-resolution mask for one detection, zero outside its box
    fn mask(&self, candidate: &Candidate, protos: &RawTensor) -> Array2<f32> {
        let (mh, mw) = (protos.shape[2], protos.shape[3]);
        let plane = mh * mw;
        let det = &candidate.detection;

        let px1 = det.x1 / self.frame_width as f32 * mw as f32;
        let px2 = det.x2 / self.frame_width as f32 * mw as f32;
        let py1 = det.y1 / self.frame_height as f32 * mh as f32;
        let py2 = det.y2 / self.frame_height as f32 * mh as f32;

        Array2::from_shape_fn((mh, mw), |(y, x)| {
            let (fx, fy) = (x as f32 + 0.5, y as f32 + 0.5);
            if fx < px1 || fx >= px2 || fy < py1 || fy >= py2 {
                return 0.0;
            }
            let logit: f32 = candidate
                .coefficients
                .iter()
                .enumerate()
                .map(|(k, c)| c * protos.data[k * plane + y * mw + x])
                .sum();
            1.0 / (1.0 + (-logit).exp())
        })
    }
}
