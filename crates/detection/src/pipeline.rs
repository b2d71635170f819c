//! Detection pipeline: infer, validate, annotate, measure

use std::sync::Arc;
use std::time::Instant;

use camera_capture::Frame;
use inference_engine::{InferenceAdapter, InferenceError, ModelLoader};
use studio_config::ModelConfig;
use tracing::{debug, error, info, warn};

use crate::annotate::annotate;
use crate::metrics::MetricsWindow;
use crate::validate::validate;
use crate::{ClassNames, Detection, DetectionSettings};

/// Owns the loaded model and the rolling metrics
pub struct DetectionPipeline {
    loader: Arc<dyn ModelLoader>,
    model: Option<Box<dyn InferenceAdapter>>,
    class_names: ClassNames,
    metrics: MetricsWindow,
}

impl DetectionPipeline {
    /// Pipeline without a model; `detect` passes frames through until one is loaded
    pub fn new(loader: Arc<dyn ModelLoader>, class_names: ClassNames) -> Self {
        Self {
            loader,
            model: None,
            class_names,
            metrics: MetricsWindow::new(),
        }
    }

    /// Build and try to load the configured model
    ///
    /// A load failure is logged and leaves the pipeline without a model.
    pub fn load(loader: Arc<dyn ModelLoader>, model: &ModelConfig) -> Self {
        let mut pipeline = Self::new(loader, ClassNames::new(model.class_names.clone()));
        if let Err(e) = pipeline.reload_model(model) {
            error!("Detection model unavailable: {}", e);
        }
        pipeline
    }

    /// Install an already-loaded model
    pub fn with_model(mut self, model: Box<dyn InferenceAdapter>) -> Self {
        self.model = Some(model);
        self
    }

    /// Replace the model from configuration
    ///
    /// On failure the previous model is dropped and the pipeline keeps
    /// running without one.
    pub fn reload_model(&mut self, model: &ModelConfig) -> Result<(), InferenceError> {
        self.class_names = ClassNames::new(model.class_names.clone());
        self.model = None;

        let adapter = self.loader.load(model)?;
        info!("Detection model ready: {}", adapter.name());
        self.model = Some(adapter);
        self.metrics.reset();
        Ok(())
    }

    /// Run detection on `frame`, returning an annotated copy and the survivors
    pub fn detect(&mut self, frame: &Frame, settings: &DetectionSettings) -> (Frame, Vec<Detection>) {
        self.detect_at(frame, settings, Instant::now())
    }

    /// `detect` with an explicit clock reading for the FPS window
    pub fn detect_at(&mut self, frame: &Frame, settings: &DetectionSettings, now: Instant) -> (Frame, Vec<Detection>) {
        let Some(model) = self.model.as_ref() else {
            return (frame.clone(), Vec::new());
        };

        let raw = match model.infer(frame, settings.confidence_threshold, settings.iou_threshold) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Inference failed on frame {}: {}", frame.sequence, e);
                return (frame.clone(), Vec::new());
            }
        };

        let mut detections = Vec::with_capacity(raw.len());
        for candidate in raw {
            let Some(detection) = Detection::from_raw(candidate, &self.class_names) else {
                debug!("Dropping malformed detection on frame {}", frame.sequence);
                continue;
            };
            match validate(&detection, &settings.precision) {
                Ok(()) => detections.push(detection),
                Err(reason) => debug!(
                    "Dropping {} at {:.2} ({:?})",
                    detection.class_name, detection.confidence, reason
                ),
            }
        }

        let annotated = self.render(frame, &detections, settings);
        self.metrics.record(now, detections.len());
        (annotated, detections)
    }

    fn render(&self, frame: &Frame, detections: &[Detection], settings: &DetectionSettings) -> Frame {
        if detections.is_empty() {
            return frame.clone();
        }
        let Some(mut image) = frame.to_image() else {
            warn!(
                "Frame {} buffer does not match {}x{}, skipping overlays",
                frame.sequence, frame.width, frame.height
            );
            return frame.clone();
        };

        for detection in detections {
            if let Err(e) = annotate(&mut image, detection, &settings.display, &settings.colors) {
                warn!("Skipping mask for {}: {}", detection.class_name, e);
            }
        }

        Frame::from_image(image, frame.timestamp_ms, frame.sequence)
    }

    /// Rolling FPS of processed frames
    pub fn fps(&self) -> f64 {
        self.metrics.fps()
    }

    pub fn average_detection_count(&self) -> f64 {
        self.metrics.average_detection_count()
    }

    pub fn metrics(&self) -> &MetricsWindow {
        &self.metrics
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref().map(|m| m.name())
    }

    pub fn class_names(&self) -> &ClassNames {
        &self.class_names
    }

    pub fn reset_metrics(&mut self) {
        self.metrics.reset();
    }
}
