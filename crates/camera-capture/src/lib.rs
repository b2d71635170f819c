//! Camera Capture Library for the Inspection Studio
//!
//! Owns the camera device on a dedicated worker thread and exposes the most
//! recent adjusted frame through a latest-wins slot.
//! Supports:
//! - V4L2 webcams through an `ffmpeg` rawvideo pipe
//! - A synthetic backend for tests and machines without a camera
//! - Live brightness, contrast and sharpness adjustment

pub mod adjust;
pub mod device;
pub mod ffmpeg;
pub mod frame;
pub mod service;
pub mod slot;

pub use adjust::{adjust, ImageAdjustment, SharedAdjustment};
pub use device::{CameraBackend, CameraDevice, CameraInfo, CameraRequest, SyntheticBackend};
pub use ffmpeg::FfmpegBackend;
pub use frame::Frame;
pub use service::{CaptureService, CaptureState};
pub use slot::FrameSlot;

use std::time::Duration;

use thiserror::Error;

/// Capture error types
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera {device_id} unavailable: {reason}")]
    DeviceUnavailable { device_id: u32, reason: String },

    #[error("Frame read failed: {0}")]
    FrameRead(String),

    #[error("Invalid {field} value: {value}")]
    InvalidValue { field: &'static str, value: f32 },

    #[error("Capture worker did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Streaming error: {0}")]
    Stream(String),
}
