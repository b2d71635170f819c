//! Capture service: owns the camera on a worker thread and publishes adjusted frames

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use metrics::counter;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::device::{CameraBackend, CameraDevice, CameraInfo, CameraRequest};
use crate::{CaptureError, Frame, FrameSlot, ImageAdjustment, SharedAdjustment};

/// Default time `stop()` waits for the worker to release the device
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Longest single sleep while pacing, so stop requests are noticed quickly
const PACE_SLICE: Duration = Duration::from_millis(50);

/// Back-off after a failed read
const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Capture lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct CameraSession {
    info: CameraInfo,
    stop: Arc<AtomicBool>,
    done: mpsc::Receiver<()>,
    handle: JoinHandle<()>,
}

/// Owns one camera at a time and keeps the latest adjusted frame available
///
/// Only the worker thread touches the device. Readers get copies from the
/// frame slot and never block on a camera read.
pub struct CaptureService {
    backend: Arc<dyn CameraBackend>,
    settings: Mutex<CameraRequest>,
    adjustment: Arc<SharedAdjustment>,
    slot: Arc<FrameSlot>,
    session: Mutex<Option<CameraSession>>,
    state: Mutex<CaptureState>,
    stop_timeout: Duration,
}

impl CaptureService {
    /// Create a stopped service with initial settings and adjustment
    pub fn new(backend: Arc<dyn CameraBackend>, settings: CameraRequest, adjustment: ImageAdjustment) -> Self {
        Self {
            backend,
            settings: Mutex::new(settings),
            adjustment: Arc::new(SharedAdjustment::new(adjustment)),
            slot: Arc::new(FrameSlot::new()),
            session: Mutex::new(None),
            state: Mutex::new(CaptureState::Stopped),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Override how long `stop()` waits for the worker
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Open a camera and start the capture worker
    ///
    /// Starting while already running is a no-op.
    pub fn start(&self, device_id: u32, width: u32, height: u32, fps_limit: f64) -> Result<(), CaptureError> {
        let request = CameraRequest {
            device_id,
            width,
            height,
            fps_limit,
        };
        *lock(&self.settings) = request;
        self.start_session(request)
    }

    /// Start with the currently stored settings
    pub fn start_with_settings(&self) -> Result<(), CaptureError> {
        let request = self.settings();
        self.start_session(request)
    }

    fn start_session(&self, request: CameraRequest) -> Result<(), CaptureError> {
        let mut session = lock(&self.session);
        if session.is_some() {
            debug!("Capture already running, start ignored");
            return Ok(());
        }

        self.set_state(CaptureState::Starting);
        let device = match self.backend.open(&request) {
            Ok(device) => device,
            Err(e) => {
                self.set_state(CaptureState::Stopped);
                return Err(e);
            }
        };
        let info = device.info();

        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();
        let worker = Worker {
            stop: stop.clone(),
            slot: self.slot.clone(),
            adjustment: self.adjustment.clone(),
            frame_interval: frame_interval(request.fps_limit),
        };

        let handle = thread::Builder::new()
            .name(format!("capture-{}", info.device_id))
            .spawn(move || {
                worker.run(device);
                let _ = done_tx.send(());
            })
            .map_err(|e| {
                self.set_state(CaptureState::Stopped);
                CaptureError::Stream(format!("failed to spawn capture thread: {}", e))
            })?;

        *session = Some(CameraSession {
            info,
            stop,
            done: done_rx,
            handle,
        });
        self.set_state(CaptureState::Running);

        info!(
            "Camera {} started at {}x{} ({} backend, fps limit {})",
            info.device_id,
            info.width,
            info.height,
            self.backend.name(),
            request.fps_limit
        );
        Ok(())
    }

    /// Stop the worker, release the device and clear the frame slot
    ///
    /// Waits up to the stop timeout. On timeout the worker is detached: it
    /// releases the device once its pending read returns and discards that
    /// frame. The service is `Stopped` either way.
    pub fn stop(&self) -> Result<(), CaptureError> {
        let Some(session) = lock(&self.session).take() else {
            self.slot.clear();
            self.set_state(CaptureState::Stopped);
            return Ok(());
        };

        self.set_state(CaptureState::Stopping);
        session.stop.store(true, Ordering::Release);

        let result = match session.done.recv_timeout(self.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if session.handle.join().is_err() {
                    warn!("Capture worker for camera {} panicked", session.info.device_id);
                }
                info!("Camera {} stopped", session.info.device_id);
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Capture worker for camera {} did not stop within {:?}, detaching",
                    session.info.device_id, self.stop_timeout
                );
                Err(CaptureError::ShutdownTimeout(self.stop_timeout))
            }
        };

        self.slot.clear();
        self.set_state(CaptureState::Stopped);
        result
    }

    /// Copy of the latest adjusted frame
    pub fn get_frame(&self) -> Option<Frame> {
        self.slot.latest()
    }

    /// Switch to another camera, restarting if running
    pub fn change_device(&self, device_id: u32) -> Result<(), CaptureError> {
        lock(&self.settings).device_id = device_id;
        self.restart_if_running()
    }

    /// Change the capture resolution, restarting if running
    pub fn change_resolution(&self, width: u32, height: u32) -> Result<(), CaptureError> {
        if width == 0 {
            return Err(CaptureError::InvalidValue {
                field: "width",
                value: width as f32,
            });
        }
        if height == 0 {
            return Err(CaptureError::InvalidValue {
                field: "height",
                value: height as f32,
            });
        }
        {
            let mut settings = lock(&self.settings);
            settings.width = width;
            settings.height = height;
        }
        self.restart_if_running()
    }

    /// Change the frame rate cap, restarting if running
    pub fn set_fps_limit(&self, fps_limit: f64) -> Result<(), CaptureError> {
        if fps_limit.is_nan() {
            return Err(CaptureError::InvalidValue {
                field: "fps_limit",
                value: f32::NAN,
            });
        }
        lock(&self.settings).fps_limit = fps_limit;
        self.restart_if_running()
    }

    fn restart_if_running(&self) -> Result<(), CaptureError> {
        if !self.is_running() {
            return Ok(());
        }
        if let Err(e) = self.stop() {
            warn!("Restarting capture after unclean stop: {}", e);
        }
        self.start_with_settings()
    }

    /// Set brightness, returning the clamped value now in effect
    pub fn update_brightness(&self, value: f32) -> Result<f32, CaptureError> {
        self.adjustment.set_brightness(value)
    }

    /// Set contrast, returning the clamped value now in effect
    pub fn update_contrast(&self, value: f32) -> Result<f32, CaptureError> {
        self.adjustment.set_contrast(value)
    }

    /// Set sharpness, returning the clamped value now in effect
    pub fn update_sharpness(&self, value: f32) -> Result<f32, CaptureError> {
        self.adjustment.set_sharpness(value)
    }

    /// Restore neutral adjustment
    pub fn reset_adjustments(&self) {
        self.adjustment.reset();
    }

    /// Current adjustment values
    pub fn adjustment(&self) -> ImageAdjustment {
        self.adjustment.snapshot()
    }

    /// Negotiated properties of the open camera
    pub fn camera_info(&self) -> Option<CameraInfo> {
        lock(&self.session).as_ref().map(|s| s.info)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.session).is_some()
    }

    pub fn state(&self) -> CaptureState {
        *lock(&self.state)
    }

    /// Settings used by the next start
    pub fn settings(&self) -> CameraRequest {
        *lock(&self.settings)
    }

    /// Name of the backend devices are opened with
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn set_state(&self, state: CaptureState) {
        *lock(&self.state) = state;
    }
}

impl Drop for CaptureService {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Capture shutdown on drop: {}", e);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn frame_interval(fps_limit: f64) -> Option<Duration> {
    (fps_limit.is_finite() && fps_limit > 0.0).then(|| Duration::from_secs_f64(1.0 / fps_limit))
}

struct Worker {
    stop: Arc<AtomicBool>,
    slot: Arc<FrameSlot>,
    adjustment: Arc<SharedAdjustment>,
    frame_interval: Option<Duration>,
}

impl Worker {
    fn run(self, mut device: Box<dyn CameraDevice>) {
        let device_id = device.info().device_id;
        let mut consecutive_failures: u64 = 0;

        while !self.stop.load(Ordering::Acquire) {
            let started = Instant::now();

            match device.read_frame() {
                Ok(frame) => {
                    consecutive_failures = 0;
                    let adjustment = self.adjustment.snapshot();
                    let frame = if adjustment.is_identity() {
                        frame
                    } else {
                        adjustment.apply(&frame)
                    };
                    if !self.slot.publish_unless(frame, &self.stop) {
                        debug!("Discarding frame read after stop on camera {}", device_id);
                        break;
                    }
                    counter!("capture_frames_total").increment(1);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    counter!("capture_read_failures_total").increment(1);
                    if consecutive_failures == 1 {
                        warn!("Camera {} read error: {}", device_id, e);
                    } else {
                        debug!("Camera {} read error ({} in a row): {}", device_id, consecutive_failures, e);
                    }
                    self.sleep_until(started + READ_RETRY_DELAY);
                    continue;
                }
            }

            if let Some(interval) = self.frame_interval {
                self.sleep_until(started + interval);
            }
        }

        drop(device);
        debug!("Capture worker for camera {} exited", device_id);
    }

    fn sleep_until(&self, deadline: Instant) {
        loop {
            if self.stop.load(Ordering::Acquire) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(PACE_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyntheticBackend;

    fn service(backend: SyntheticBackend) -> CaptureService {
        CaptureService::new(
            Arc::new(backend.with_read_delay(Duration::from_millis(2))),
            CameraRequest::default(),
            ImageAdjustment::default(),
        )
    }

    fn wait_for_frame(service: &CaptureService) -> Option<Frame> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some(frame) = service.get_frame() {
                return Some(frame);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    struct StuckBackend;

    struct StuckDevice;

    impl CameraDevice for StuckDevice {
        fn read_frame(&mut self) -> Result<Frame, CaptureError> {
            thread::sleep(Duration::from_millis(400));
            Ok(Frame::filled(4, 4, [1, 2, 3]))
        }

        fn info(&self) -> CameraInfo {
            CameraInfo {
                device_id: 0,
                width: 4,
                height: 4,
                fps: 30.0,
            }
        }
    }

    impl CameraBackend for StuckBackend {
        fn open(&self, _request: &CameraRequest) -> Result<Box<dyn CameraDevice>, CaptureError> {
            Ok(Box::new(StuckDevice))
        }

        fn name(&self) -> &'static str {
            "stuck"
        }
    }

    #[test]
    fn test_start_produces_frames() {
        let service = service(SyntheticBackend::new());
        service.start(0, 640, 480, 30.0).unwrap();
        assert!(service.is_running());
        assert_eq!(service.state(), CaptureState::Running);

        let frame = wait_for_frame(&service).expect("no frame within 2s");
        assert_eq!(frame.dimensions(), (640, 480));
        service.stop().unwrap();
    }

    #[test]
    fn test_unknown_device_stays_stopped() {
        let service = service(SyntheticBackend::new());
        let err = service.start(7, 640, 480, 30.0).unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable { device_id: 7, .. }));
        assert!(!service.is_running());
        assert_eq!(service.state(), CaptureState::Stopped);
        assert!(service.get_frame().is_none());
    }

    #[test]
    fn test_start_twice_is_noop() {
        let service = service(SyntheticBackend::new());
        service.start(0, 320, 240, 0.0).unwrap();
        service.start(0, 320, 240, 0.0).unwrap();
        assert!(service.is_running());
        service.stop().unwrap();
    }

    #[test]
    fn test_stop_clears_frame() {
        let service = service(SyntheticBackend::new());
        service.start(0, 64, 48, 0.0).unwrap();
        assert!(wait_for_frame(&service).is_some());

        service.stop().unwrap();
        assert!(!service.is_running());
        assert!(service.get_frame().is_none());
        assert!(service.camera_info().is_none());
    }

    #[test]
    fn test_stop_when_stopped() {
        let service = service(SyntheticBackend::new());
        assert!(service.stop().is_ok());
        assert_eq!(service.state(), CaptureState::Stopped);
    }

    #[test]
    fn test_resolution_change_while_stopped_is_stored() {
        let service = service(SyntheticBackend::new());
        service.change_resolution(1280, 720).unwrap();
        assert!(!service.is_running());
        assert_eq!(service.settings().width, 1280);
        assert_eq!(service.settings().height, 720);
    }

    #[test]
    fn test_resolution_change_restarts() {
        let service = service(SyntheticBackend::new());
        service.start(0, 64, 48, 0.0).unwrap();
        assert!(wait_for_frame(&service).is_some());

        service.change_resolution(32, 24).unwrap();
        assert!(service.is_running());
        assert_eq!(service.camera_info().map(|i| (i.width, i.height)), Some((32, 24)));
        let frame = wait_for_frame(&service).unwrap();
        assert_eq!(frame.dimensions(), (32, 24));
        service.stop().unwrap();
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let service = service(SyntheticBackend::new());
        assert!(matches!(
            service.change_resolution(0, 480),
            Err(CaptureError::InvalidValue { field: "width", .. })
        ));
    }

    #[test]
    fn test_change_to_missing_device_fails() {
        let service = service(SyntheticBackend::new());
        service.start(0, 64, 48, 0.0).unwrap();
        assert!(service.change_device(5).is_err());
        assert!(!service.is_running());
        assert_eq!(service.settings().device_id, 5);
    }

    #[test]
    fn test_read_failures_do_not_stop_capture() {
        let service = service(SyntheticBackend::new().failing_every(2));
        service.start(0, 32, 32, 0.0).unwrap();
        assert!(wait_for_frame(&service).is_some());
        assert!(service.is_running());
        service.stop().unwrap();
    }

    #[test]
    fn test_adjustment_applied_to_published_frames() {
        let service = service(SyntheticBackend::new());
        service.update_brightness(255.0).unwrap();
        service.start(0, 16, 16, 0.0).unwrap();

        let frame = wait_for_frame(&service).unwrap();
        assert!(frame.data.iter().all(|&v| v == 255));
        service.stop().unwrap();
    }

    #[test]
    fn test_adjustment_setters() {
        let service = service(SyntheticBackend::new());
        assert_eq!(service.update_contrast(0.0).unwrap(), 0.01);
        assert!(service.update_sharpness(f32::INFINITY).is_err());
        service.reset_adjustments();
        assert_eq!(service.adjustment(), ImageAdjustment::default());
    }

    #[test]
    fn test_stop_timeout_detaches_worker() {
        let service = CaptureService::new(
            Arc::new(StuckBackend),
            CameraRequest::default(),
            ImageAdjustment::default(),
        )
        .with_stop_timeout(Duration::from_millis(50));

        service.start(0, 4, 4, 0.0).unwrap();
        thread::sleep(Duration::from_millis(20));

        let err = service.stop().unwrap_err();
        assert!(matches!(err, CaptureError::ShutdownTimeout(_)));
        assert_eq!(service.state(), CaptureState::Stopped);

        // the detached worker's pending frame must not reach the slot
        thread::sleep(Duration::from_millis(500));
        assert!(service.get_frame().is_none());
    }

    #[test]
    fn test_frame_interval() {
        assert_eq!(frame_interval(0.0), None);
        assert_eq!(frame_interval(-5.0), None);
        assert_eq!(frame_interval(f64::INFINITY), None);
        assert_eq!(frame_interval(10.0), Some(Duration::from_millis(100)));
    }
}
