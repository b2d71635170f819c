//! User commands: camera, detection, adjustment, thresholds and configuration
//!
//! Every command reports its outcome through the presenter's message log and
//! mirrors the resulting settings into the configuration store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use camera_capture::{CameraBackend, CameraInfo, CameraRequest, CaptureError, CaptureService, CaptureState, ImageAdjustment};
use detection::{DetectionPipeline, DetectionSettings};
use inference_engine::ModelLoader;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use studio_config::{ConfigStore, DisplayConfig};
use tracing::{info, warn};

use crate::presenter::Presenter;
use crate::StudioError;

/// Partial update of the display flags; absent fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayOptions {
    pub show_masks: Option<bool>,
    pub show_boxes: Option<bool>,
    pub show_labels: Option<bool>,
    pub show_confidence: Option<bool>,
    pub show_fps: Option<bool>,
}

impl DisplayOptions {
    fn apply(&self, display: &mut DisplayConfig) {
        let fields = [
            (self.show_masks, &mut display.show_masks),
            (self.show_boxes, &mut display.show_boxes),
            (self.show_labels, &mut display.show_labels),
            (self.show_confidence, &mut display.show_confidence),
            (self.show_fps, &mut display.show_fps),
        ];
        for (value, target) in fields {
            if let Some(value) = value {
                *target = value;
            }
        }
    }
}

/// Camera-side view for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraStatus {
    pub state: CaptureState,
    pub running: bool,
    pub backend: &'static str,
    pub settings: CameraRequest,
    pub info: Option<CameraInfo>,
    pub adjustment: ImageAdjustment,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handles user commands against the capture service, pipeline and configuration
pub struct Controller {
    capture: Arc<CaptureService>,
    pipeline: Arc<Mutex<DetectionPipeline>>,
    config: Arc<ConfigStore>,
    presenter: Arc<dyn Presenter>,
    detection_enabled: AtomicBool,
    model_name: RwLock<Option<String>>,
}

impl Controller {
    pub fn new(
        capture: Arc<CaptureService>,
        pipeline: DetectionPipeline,
        config: Arc<ConfigStore>,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        let model_name = pipeline.model_name().map(str::to_string);
        Self {
            capture,
            pipeline: Arc::new(Mutex::new(pipeline)),
            config,
            presenter,
            detection_enabled: AtomicBool::new(false),
            model_name: RwLock::new(model_name),
        }
    }

    /// Build the capture service and pipeline from the stored configuration
    ///
    /// Loads the model, so call from a blocking context.
    pub fn from_config(
        backend: Arc<dyn CameraBackend>,
        loader: Arc<dyn ModelLoader>,
        config: Arc<ConfigStore>,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        let snapshot = config.snapshot();
        let camera = &snapshot.camera;
        let request = CameraRequest {
            device_id: camera.device_id,
            width: camera.resolution_width,
            height: camera.resolution_height,
            fps_limit: camera.fps_limit,
        };
        let adjustment = ImageAdjustment {
            brightness: camera.brightness,
            contrast: camera.contrast,
            sharpness: camera.sharpness,
        };
        let capture = Arc::new(CaptureService::new(backend, request, adjustment));
        let pipeline = DetectionPipeline::load(loader, &snapshot.model);
        Self::new(capture, pipeline, config, presenter)
    }

    pub fn capture(&self) -> &Arc<CaptureService> {
        &self.capture
    }

    pub fn pipeline(&self) -> Arc<Mutex<DetectionPipeline>> {
        self.pipeline.clone()
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn presenter(&self) -> &Arc<dyn Presenter> {
        &self.presenter
    }

    pub fn camera_running(&self) -> bool {
        self.capture.is_running()
    }

    pub fn detection_running(&self) -> bool {
        self.detection_enabled.load(Ordering::Acquire)
    }

    pub fn model_name(&self) -> Option<String> {
        self.model_name.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Settings for the next detection call, taken from the current configuration
    pub fn detection_settings(&self) -> DetectionSettings {
        self.config.read(DetectionSettings::from_config)
    }

    pub fn camera_status(&self) -> CameraStatus {
        CameraStatus {
            state: self.capture.state(),
            running: self.capture.is_running(),
            backend: self.capture.backend_name(),
            settings: self.capture.settings(),
            info: self.capture.camera_info(),
            adjustment: self.capture.adjustment(),
        }
    }

    fn report(&self, message: &str) {
        info!("{}", message);
        self.presenter.log_message(message);
    }

    fn report_failure(&self, message: &str) {
        warn!("{}", message);
        self.presenter.log_message(message);
    }

    /// Detection cannot outlive the camera
    fn sync_detection_with_camera(&self) {
        if !self.capture.is_running() && self.detection_enabled.swap(false, Ordering::AcqRel) {
            self.report("Detection stopped: camera is not running");
        }
    }

    /// Start the camera with the configured settings, or stop it
    ///
    /// Stopping also turns detection off. Returns the new camera state.
    pub fn toggle_camera(&self) -> Result<bool, StudioError> {
        if self.capture.is_running() {
            self.stop_camera();
            return Ok(false);
        }

        let camera = self.config.read(|c| c.camera.clone());
        match self.capture.start(
            camera.device_id,
            camera.resolution_width,
            camera.resolution_height,
            camera.fps_limit,
        ) {
            Ok(()) => {
                self.report("Camera started");
                Ok(true)
            }
            Err(e) => {
                self.report_failure(&format!("Failed to start camera: {}", e));
                Err(e.into())
            }
        }
    }

    fn stop_camera(&self) {
        self.detection_enabled.store(false, Ordering::Release);
        if let Err(e) = self.capture.stop() {
            warn!("Camera stop was not clean: {}", e);
        }
        self.report("Camera stopped");
    }

    /// Enable or disable detection; enabling requires a running camera
    ///
    /// Returns the new detection state.
    pub fn toggle_detection(&self) -> Result<bool, StudioError> {
        if self.detection_enabled.load(Ordering::Acquire) {
            self.detection_enabled.store(false, Ordering::Release);
            self.report("Detection stopped");
            return Ok(false);
        }

        if !self.capture.is_running() {
            let message = "Start the camera before enabling detection";
            self.report_failure(message);
            return Err(StudioError::Rejected(message.to_string()));
        }

        self.detection_enabled.store(true, Ordering::Release);
        self.report("Detection started");
        Ok(true)
    }

    /// Switch cameras, restarting capture if it is running
    pub fn change_device(&self, device_id: u32) -> Result<(), StudioError> {
        let result = self.capture.change_device(device_id);
        self.sync_detection_with_camera();
        match result {
            Ok(()) => {
                self.config.update(|c| c.camera.device_id = device_id)?;
                self.report(&format!("Camera switched to device {}", device_id));
                Ok(())
            }
            Err(e) => {
                self.report_failure(&format!("Failed to switch to camera {}: {}", device_id, e));
                Err(e.into())
            }
        }
    }

    /// Change the capture resolution, restarting capture if it is running
    pub fn change_resolution(&self, width: u32, height: u32) -> Result<(), StudioError> {
        let result = self.capture.change_resolution(width, height);
        if let Err(e @ CaptureError::InvalidValue { .. }) = &result {
            self.report_failure(&format!("Rejected resolution {}x{}: {}", width, height, e));
            return result.map_err(StudioError::from);
        }

        self.config.update(|c| {
            c.camera.resolution_width = width;
            c.camera.resolution_height = height;
        })?;
        self.sync_detection_with_camera();

        match result {
            Ok(()) => {
                self.report(&format!("Resolution set to {}x{}", width, height));
                Ok(())
            }
            Err(e) => {
                self.report_failure(&format!("Failed to apply resolution {}x{}: {}", width, height, e));
                Err(e.into())
            }
        }
    }

    /// Set the model confidence threshold
    pub fn update_confidence(&self, value: f32) -> Result<(), StudioError> {
        self.config.update(|c| c.model.confidence_threshold = value)?;
        self.report(&format!("Confidence threshold set to {:.2}", value));
        Ok(())
    }

    /// Set the NMS IoU threshold
    pub fn update_iou(&self, value: f32) -> Result<(), StudioError> {
        self.config.update(|c| c.model.iou_threshold = value)?;
        self.report(&format!("IoU threshold set to {:.2}", value));
        Ok(())
    }

    pub fn update_display_options(&self, options: &DisplayOptions) -> Result<DisplayConfig, StudioError> {
        self.config.update(|c| options.apply(&mut c.display))?;
        self.report("Display options updated");
        Ok(self.config.read(|c| c.display.clone()))
    }

    /// Set brightness, returning the clamped value in effect
    pub fn update_brightness(&self, value: f32) -> Result<f32, StudioError> {
        let applied = self.capture.update_brightness(value)?;
        self.config.update(|c| c.camera.brightness = applied)?;
        self.report(&format!("Brightness set to {:.0}", applied));
        Ok(applied)
    }

    /// Set contrast, returning the clamped value in effect
    pub fn update_contrast(&self, value: f32) -> Result<f32, StudioError> {
        let applied = self.capture.update_contrast(value)?;
        self.config.update(|c| c.camera.contrast = applied)?;
        self.report(&format!("Contrast set to {:.2}", applied));
        Ok(applied)
    }

    /// Set sharpness, returning the clamped value in effect
    pub fn update_sharpness(&self, value: f32) -> Result<f32, StudioError> {
        let applied = self.capture.update_sharpness(value)?;
        self.config.update(|c| c.camera.sharpness = applied)?;
        self.report(&format!("Sharpness set to {:.1}", applied));
        Ok(applied)
    }

    /// Restore neutral brightness, contrast and sharpness
    pub fn reset_image_settings(&self) -> Result<ImageAdjustment, StudioError> {
        self.capture.reset_adjustments();
        let neutral = self.capture.adjustment();
        self.config.update(|c| {
            c.camera.brightness = neutral.brightness;
            c.camera.contrast = neutral.contrast;
            c.camera.sharpness = neutral.sharpness;
        })?;
        self.report("Image settings reset");
        Ok(neutral)
    }

    /// Reload the model from the configured paths
    ///
    /// Waits for any in-flight detection; call from a blocking context.
    pub fn reload_model(&self) -> Result<String, StudioError> {
        let model = self.config.read(|c| c.model.clone());
        let mut pipeline = lock(&self.pipeline);
        let result = pipeline.reload_model(&model);
        let name = pipeline.model_name().map(str::to_string);
        drop(pipeline);

        *self.model_name.write().unwrap_or_else(PoisonError::into_inner) = name.clone();
        match (result, name) {
            (Ok(()), Some(name)) => {
                self.report(&format!("Model reloaded: {}", name));
                Ok(name)
            }
            (Ok(()), None) => Err(StudioError::Task("model reported ready but none is loaded".to_string())),
            (Err(e), _) => {
                self.report_failure(&format!("Failed to reload model: {}", e));
                Err(e.into())
            }
        }
    }

    /// Write one configuration value by dotted path
    ///
    /// Camera adjustment keys take effect immediately; other camera keys apply
    /// on the next start. Returns the stored value.
    pub fn set_config_value(&self, key_path: &str, value: Value) -> Result<Value, StudioError> {
        self.config.set(key_path, value)?;
        if key_path.starts_with("camera.") {
            self.apply_adjustment_from_config()?;
        }
        self.report(&format!("Configuration value {} updated", key_path));
        Ok(self.config.get(key_path).unwrap_or(Value::Null))
    }

    fn apply_adjustment_from_config(&self) -> Result<(), StudioError> {
        let camera = self.config.read(|c| c.camera.clone());
        self.capture.update_brightness(camera.brightness)?;
        self.capture.update_contrast(camera.contrast)?;
        self.capture.update_sharpness(camera.sharpness)?;
        Ok(())
    }

    pub fn save_config(&self) -> Result<(), StudioError> {
        match self.config.save() {
            Ok(()) => {
                self.report("Configuration saved");
                Ok(())
            }
            Err(e) => {
                self.report_failure(&format!("Failed to save configuration: {}", e));
                Err(e.into())
            }
        }
    }

    /// Restore and persist the default configuration
    ///
    /// Adjustment takes effect immediately; camera settings apply on the next start.
    pub fn reset_config(&self) -> Result<(), StudioError> {
        if let Err(e) = self.config.reset_to_default() {
            self.report_failure(&format!("Failed to restore default configuration: {}", e));
            return Err(e.into());
        }
        self.capture.reset_adjustments();
        self.report("Configuration restored to defaults");
        Ok(())
    }

    /// Stop the camera and persist configuration
    ///
    /// Best-effort: a capture worker that misses the stop timeout is detached.
    pub fn shutdown(&self) {
        self.detection_enabled.store(false, Ordering::Release);
        if let Err(e) = self.capture.stop() {
            warn!("Capture did not stop cleanly: {}", e);
        }
        if let Err(e) = self.config.save() {
            warn!("Configuration not persisted on shutdown: {}", e);
        }
        info!("Studio resources released");
    }
}
