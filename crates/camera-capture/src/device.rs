//! Camera device abstraction and the synthetic backend

use std::thread;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::frame::CHANNELS;
use crate::{CaptureError, Frame};

/// What the capture service asks a backend to open
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraRequest {
    /// Device index (0 = first camera)
    pub device_id: u32,
    /// Requested width
    pub width: u32,
    /// Requested height
    pub height: u32,
    /// Frame rate cap; zero or negative means unthrottled
    pub fps_limit: f64,
}

impl Default for CameraRequest {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: 640,
            height: 480,
            fps_limit: 30.0,
        }
    }
}

/// Properties the device actually negotiated
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub device_id: u32,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// An open camera, owned exclusively by the capture worker
pub trait CameraDevice: Send {
    /// Block until the next frame is available
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Negotiated properties
    fn info(&self) -> CameraInfo;
}

/// Opens camera devices
pub trait CameraBackend: Send + Sync {
    /// Open the device described by `request`
    fn open(&self, request: &CameraRequest) -> Result<Box<dyn CameraDevice>, CaptureError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Generated test pattern backend
///
/// Produces a horizontally scrolling gradient with a bright rectangle that
/// drifts across the frame, so detection and adjustment have structure to
/// work on without real hardware.
#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    devices: Vec<u32>,
    max_width: u32,
    max_height: u32,
    fail_every: Option<u64>,
    read_delay: Duration,
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self {
            devices: vec![0],
            max_width: 1920,
            max_height: 1080,
            fail_every: None,
            read_delay: Duration::from_millis(5),
        }
    }
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict which device indices can be opened
    pub fn with_devices(mut self, devices: Vec<u32>) -> Self {
        self.devices = devices;
        self
    }

    /// Largest resolution the fake sensor supports; larger requests are clamped
    pub fn with_max_resolution(mut self, width: u32, height: u32) -> Self {
        self.max_width = width.max(1);
        self.max_height = height.max(1);
        self
    }

    /// Fail every `n`th read with a `FrameRead` error
    pub fn failing_every(mut self, n: u64) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    /// Time each read blocks for, emulating sensor exposure
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }
}

impl CameraBackend for SyntheticBackend {
    fn open(&self, request: &CameraRequest) -> Result<Box<dyn CameraDevice>, CaptureError> {
        if !self.devices.contains(&request.device_id) {
            return Err(CaptureError::DeviceUnavailable {
                device_id: request.device_id,
                reason: "no such synthetic device".to_string(),
            });
        }

        let width = request.width.clamp(1, self.max_width);
        let height = request.height.clamp(1, self.max_height);
        let fps = if request.fps_limit.is_finite() && request.fps_limit > 0.0 {
            request.fps_limit
        } else {
            30.0
        };

        Ok(Box::new(SyntheticDevice {
            info: CameraInfo {
                device_id: request.device_id,
                width,
                height,
                fps,
            },
            fail_every: self.fail_every,
            read_delay: self.read_delay,
            reads: 0,
            sequence: 0,
        }))
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

struct SyntheticDevice {
    info: CameraInfo,
    fail_every: Option<u64>,
    read_delay: Duration,
    reads: u64,
    sequence: u64,
}

impl SyntheticDevice {
    fn render(&self) -> Vec<u8> {
        let (w, h) = (self.info.width as usize, self.info.height as usize);
        let shift = (self.sequence as usize * 4) % w.max(1);

        let rect_w = (w / 5).max(1);
        let rect_h = (h / 4).max(1);
        let rect_x = (self.sequence as usize * 3) % w.saturating_sub(rect_w).max(1);
        let rect_y = h / 2 - rect_h / 2;

        let mut data = vec![0u8; w * h * CHANNELS];
        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) * CHANNELS;
                let inside = x >= rect_x && x < rect_x + rect_w && y >= rect_y && y < rect_y + rect_h;
                let px = if inside {
                    [240, 240, 230]
                } else {
                    let g = (((x + shift) % w) * 160 / w.max(1)) as u8;
                    [g, g / 2 + 30, 90 - g / 4]
                };
                data[idx..idx + CHANNELS].copy_from_slice(&px);
            }
        }
        data
    }
}

impl CameraDevice for SyntheticDevice {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if !self.read_delay.is_zero() {
            thread::sleep(self.read_delay);
        }

        self.reads += 1;
        if let Some(n) = self.fail_every {
            if self.reads % n == 0 {
                return Err(CaptureError::FrameRead(format!(
                    "synthetic read {} dropped",
                    self.reads
                )));
            }
        }

        let frame = Frame::new(
            self.render(),
            self.info.width,
            self.info.height,
            Utc::now().timestamp_millis(),
            self.sequence,
        );
        self.sequence += 1;
        Ok(frame)
    }

    fn info(&self) -> CameraInfo {
        self.info
    }
}
