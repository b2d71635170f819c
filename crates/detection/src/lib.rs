//! Detection Pipeline
//!
//! Runs the configured model on a frame, drops malformed and out-of-band
//! detections, renders boxes, labels and masks onto a copy of the frame, and
//! keeps rolling FPS and detection-count averages.

pub mod annotate;
mod font;
pub mod metrics;
mod pipeline;
mod types;
pub mod validate;

pub use metrics::MetricsWindow;
pub use pipeline::DetectionPipeline;
pub use types::{ClassNames, Detection, DetectionSettings};
pub use validate::Rejection;

use thiserror::Error;

/// Detection errors
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Mask of {mask_width}x{mask_height} cannot be fitted to {frame_width}x{frame_height} frame")]
    MaskDimensionMismatch {
        mask_width: usize,
        mask_height: usize,
        frame_width: u32,
        frame_height: u32,
    },
}
