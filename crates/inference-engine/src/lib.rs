//! ONNX Inference Engine
//!
//! Turns a frame into raw detections. The detection pipeline only sees the
//! [`InferenceAdapter`] and [`ModelLoader`] traits; [`OnnxLoader`] provides a
//! tract-onnx backed YOLOv8 implementation.

mod adapter;
mod onnx;
pub mod postprocess;
mod types;

pub use adapter::{InferenceAdapter, ModelLoader};
pub use onnx::{OnnxLoader, OnnxSegmenter, INPUT_SIZE};
pub use postprocess::{iou, MAX_DETECTIONS};
pub use types::RawDetection;

use thiserror::Error;

/// Errors during model loading and inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoad(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid output shape: expected {expected}, got {actual}")]
    InvalidOutputShape { expected: String, actual: String },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
