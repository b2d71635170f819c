//! Inference capabilities consumed by the detection pipeline

use camera_capture::Frame;
use studio_config::ModelConfig;

use crate::{InferenceError, RawDetection};

/// A loaded model: frame in, raw detections out
pub trait InferenceAdapter: Send + Sync {
    /// Run the model, keeping detections scoring at least `confidence` and
    /// suppressing same-class overlaps above `iou`
    fn infer(&self, frame: &Frame, confidence: f32, iou: f32) -> Result<Vec<RawDetection>, InferenceError>;

    /// Human-readable model name, usually the file it was loaded from
    fn name(&self) -> &str;
}

/// Produces adapters from model configuration
pub trait ModelLoader: Send + Sync {
    fn load(&self, model: &ModelConfig) -> Result<Box<dyn InferenceAdapter>, InferenceError>;
}
