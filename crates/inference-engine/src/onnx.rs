//! tract-onnx backed YOLOv8 detector / segmenter

use std::path::Path;
use std::time::Instant;

use camera_capture::Frame;
use image::imageops::{self, FilterType};
use studio_config::ModelConfig;
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

use crate::postprocess::{Decoder, RawTensor, MAX_DETECTIONS};
use crate::{InferenceAdapter, InferenceError, ModelLoader, RawDetection};

/// Square model input size in pixels
pub const INPUT_SIZE: u32 = 640;

type Plan = TypedRunnableModel<TypedModel>;

/// A loaded YOLOv8 ONNX model
pub struct OnnxSegmenter {
    plan: Plan,
    name: String,
}

impl OnnxSegmenter {
    /// Load and optimize an ONNX model with a fixed `[1, 3, 640, 640]` input
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let start = Instant::now();
        let load_error = |e: TractError| InferenceError::ModelLoad(format!("{}: {}", path.display(), e));

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(load_error)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize)),
            )
            .map_err(load_error)?
            .into_optimized()
            .map_err(load_error)?
            .into_runnable()
            .map_err(load_error)?;

        info!("Model {} loaded in {}ms", path.display(), start.elapsed().as_millis());

        Ok(Self {
            plan,
            name: path.display().to_string(),
        })
    }

    /// Stretch the frame to the model input and convert to normalized NCHW
    fn preprocess(&self, frame: &Frame) -> Result<Tensor, InferenceError> {
        let image = frame.to_image().ok_or_else(|| {
            InferenceError::InvalidInput(format!(
                "frame buffer of {} bytes does not match {}x{}",
                frame.data.len(),
                frame.width,
                frame.height
            ))
        })?;
        let resized = imageops::resize(&image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

        let size = INPUT_SIZE as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into())
    }
}

fn to_raw(value: &TValue) -> Result<RawTensor, InferenceError> {
    let view = value
        .to_array_view::<f32>()
        .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;
    Ok(RawTensor::new(view.iter().copied().collect(), view.shape().to_vec()))
}

impl InferenceAdapter for OnnxSegmenter {
    fn infer(&self, frame: &Frame, confidence: f32, iou: f32) -> Result<Vec<RawDetection>, InferenceError> {
        if frame.is_empty() {
            return Err(InferenceError::InvalidInput("empty frame".to_string()));
        }

        let start = Instant::now();
        let input = self.preprocess(frame)?;
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let head = outputs
            .first()
            .ok_or_else(|| InferenceError::InferenceFailed("model produced no outputs".to_string()))
            .and_then(to_raw)?;
        let protos = outputs.get(1).map(to_raw).transpose()?;

        let decoder = Decoder {
            input_size: INPUT_SIZE,
            frame_width: frame.width,
            frame_height: frame.height,
            confidence,
            iou_threshold: iou,
            max_detections: MAX_DETECTIONS,
        };
        let detections = decoder.decode(&head, protos.as_ref())?;

        debug!(
            "Inference produced {} detections in {}ms",
            detections.len(),
            start.elapsed().as_millis()
        );
        Ok(detections)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Loads the configured model, falling back to the secondary path
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxLoader;

impl ModelLoader for OnnxLoader {
    fn load(&self, model: &ModelConfig) -> Result<Box<dyn InferenceAdapter>, InferenceError> {
        let mut failures = Vec::new();

        for path in [&model.path, &model.fallback_path] {
            if path.trim().is_empty() {
                continue;
            }
            let path = Path::new(path);
            if !path.exists() {
                failures.push(format!("{}: not found", path.display()));
                continue;
            }
            match OnnxSegmenter::load(path) {
                Ok(segmenter) => return Ok(Box::new(segmenter)),
                Err(e) => {
                    warn!("{}", e);
                    failures.push(e.to_string());
                }
            }
        }

        Err(InferenceError::ModelLoad(failures.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_reports_both_paths() {
        let model = ModelConfig {
            path: "/nonexistent/best.onnx".to_string(),
            fallback_path: "/nonexistent/yolov8n-seg.onnx".to_string(),
            ..ModelConfig::default()
        };
        match OnnxLoader.load(&model) {
            Err(InferenceError::ModelLoad(msg)) => {
                assert!(msg.contains("best.onnx"));
                assert!(msg.contains("yolov8n-seg.onnx"));
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("loading a missing model succeeded"),
        }
    }

    #[test]
    fn test_loader_rejects_garbage_file() {
        let path = std::env::temp_dir().join(format!("studio-garbage-{}.onnx", std::process::id()));
        std::fs::write(&path, b"not a model").unwrap();
        let model = ModelConfig {
            path: path.display().to_string(),
            fallback_path: String::new(),
            ..ModelConfig::default()
        };
        assert!(matches!(OnnxLoader.load(&model), Err(InferenceError::ModelLoad(_))));
        let _ = std::fs::remove_file(&path);
    }
}
