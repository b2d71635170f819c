//! Presentation capability and the headless implementation

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use camera_capture::Frame;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use ring_buffer::RingBuffer;
use serde::Serialize;
use tracing::info;

/// Messages kept by the headless presenter
pub const MESSAGE_LOG_CAPACITY: usize = 200;
/// How often the headless presenter logs a status line
pub const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Per-frame status pushed alongside each presented frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FrameStatus {
    /// Rolling rate of presented frames
    pub fps: f64,
    /// Rolling rate of frames through the detection pipeline, 0 when detection is off
    pub detection_fps: f64,
    /// Detections on this frame
    pub detection_count: usize,
    /// Mean detection count over the pipeline's recent frames
    pub avg_detection_count: f64,
    pub camera_connected: bool,
    pub detection_enabled: bool,
}

/// Where annotated frames, control state and user messages go
pub trait Presenter: Send + Sync {
    fn present(&self, frame: Frame, status: FrameStatus);

    fn update_controls(&self, camera_running: bool, detection_running: bool);

    fn log_message(&self, message: &str);
}

/// One user-facing message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Metadata of the last presented frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PresentedFrame {
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
    pub timestamp_ms: i64,
}

#[derive(Debug)]
struct HeadlessState {
    status: Option<FrameStatus>,
    frame: Option<PresentedFrame>,
    frames_presented: u64,
    controls: (bool, bool),
    messages: RingBuffer<LogEntry>,
    last_report: Option<Instant>,
}

/// Presenter without a display
///
/// Keeps the latest status and a bounded message log for the control API,
/// publishes gauges through the `metrics` facade and logs a periodic status line.
#[derive(Debug)]
pub struct HeadlessPresenter {
    state: Mutex<HeadlessState>,
    report_interval: Duration,
}

impl HeadlessPresenter {
    pub fn new() -> Self {
        Self::with_report_interval(STATUS_LOG_INTERVAL)
    }

    pub fn with_report_interval(report_interval: Duration) -> Self {
        Self {
            state: Mutex::new(HeadlessState {
                status: None,
                frame: None,
                frames_presented: 0,
                controls: (false, false),
                messages: RingBuffer::new(MESSAGE_LOG_CAPACITY),
                last_report: None,
            }),
            report_interval,
        }
    }

    /// Status of the last presented frame
    pub fn status(&self) -> Option<FrameStatus> {
        self.lock().status
    }

    pub fn last_frame(&self) -> Option<PresentedFrame> {
        self.lock().frame
    }

    pub fn frames_presented(&self) -> u64 {
        self.lock().frames_presented
    }

    /// `(camera_running, detection_running)` as last pushed
    pub fn controls(&self) -> (bool, bool) {
        self.lock().controls
    }

    /// Up to `limit` messages, newest first
    pub fn messages(&self, limit: usize) -> Vec<LogEntry> {
        self.lock().messages.read_last(limit)
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for HeadlessPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Presenter for HeadlessPresenter {
    fn present(&self, frame: Frame, status: FrameStatus) {
        gauge!("studio_fps").set(status.fps);
        gauge!("studio_detection_fps").set(status.detection_fps);
        gauge!("studio_detection_count").set(status.detection_count as f64);
        gauge!("studio_avg_detection_count").set(status.avg_detection_count);
        counter!("studio_frames_presented_total").increment(1);

        let mut state = self.lock();
        state.status = Some(status);
        state.frame = Some(PresentedFrame {
            width: frame.width,
            height: frame.height,
            sequence: frame.sequence,
            timestamp_ms: frame.timestamp_ms,
        });
        state.frames_presented += 1;

        let now = Instant::now();
        let due = state
            .last_report
            .map_or(true, |last| now.duration_since(last) >= self.report_interval);
        if due {
            state.last_report = Some(now);
            info!(
                "Frame {} {}x{}: {:.1} fps, {} detections",
                frame.sequence, frame.width, frame.height, status.fps, status.detection_count
            );
        }
    }

    fn update_controls(&self, camera_running: bool, detection_running: bool) {
        self.lock().controls = (camera_running, detection_running);
    }

    fn log_message(&self, message: &str) {
        self.lock().messages.push(LogEntry {
            timestamp: Utc::now(),
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_records_status() {
        let presenter = HeadlessPresenter::new();
        assert_eq!(presenter.status(), None);

        let mut frame = Frame::filled(8, 6, [0, 0, 0]);
        frame.sequence = 42;
        let status = FrameStatus {
            fps: 29.5,
            detection_fps: 0.0,
            detection_count: 2,
            avg_detection_count: 1.5,
            camera_connected: true,
            detection_enabled: true,
        };
        presenter.present(frame, status);

        assert_eq!(presenter.status(), Some(status));
        assert_eq!(presenter.frames_presented(), 1);
        let last = presenter.last_frame().unwrap();
        assert_eq!((last.width, last.height, last.sequence), (8, 6, 42));
    }

    #[test]
    fn test_messages_newest_first_and_bounded() {
        let presenter = HeadlessPresenter::new();
        for i in 0..(MESSAGE_LOG_CAPACITY + 5) {
            presenter.log_message(&format!("message {}", i));
        }
        let messages = presenter.messages(usize::MAX);
        assert_eq!(messages.len(), MESSAGE_LOG_CAPACITY);
        assert_eq!(messages[0].message, format!("message {}", MESSAGE_LOG_CAPACITY + 4));
        assert_eq!(presenter.messages(3).len(), 3);
    }

    #[test]
    fn test_controls() {
        let presenter = HeadlessPresenter::new();
        assert_eq!(presenter.controls(), (false, false));
        presenter.update_controls(true, false);
        assert_eq!(presenter.controls(), (true, false));
    }
}
