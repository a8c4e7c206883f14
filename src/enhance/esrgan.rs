// Real-ESRGAN super-resolution backed by an ONNX Runtime session.

use super::tensor::{self, Normalization};
use super::{EnhanceError, Upscaler};
use image::DynamicImage;
use ort::session::{Session, builder::GraphOptimizationLevel};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Real-ESRGAN x2plus upscaler. The session is created once at startup and
/// shared for the process lifetime; inference runs single-flight behind a
/// mutex because concurrent safety of a session is not guaranteed.
pub struct RealEsrganUpscaler {
    session: Mutex<Session>,
    input_name: String,
}

impl RealEsrganUpscaler {
    /// Loads the model weights from disk and prepares the inference session.
    pub fn load(weights: &Path, scale: u32) -> Result<Self, EnhanceError> {
        if !weights.exists() {
            return Err(EnhanceError::WeightsNotFound(weights.to_path_buf()));
        }

        let session = Session::builder()
            .map_err(|e| EnhanceError::Inference(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| EnhanceError::Inference(e.to_string()))?
            .commit_from_file(weights)
            .map_err(|e| EnhanceError::Inference(e.to_string()))?;

        // Real-ESRGAN exports typically name the sole input 'input'.
        let input_name = session
            .inputs
            .first()
            .map_or_else(|| "input".to_string(), |i| i.name.clone());

        info!(
            "Real-ESRGAN x{} session ready (weights: {})",
            scale,
            weights.display()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
        })
    }
}

impl Upscaler for RealEsrganUpscaler {
    fn upscale(&self, image: &DynamicImage) -> Result<DynamicImage, EnhanceError> {
        let input_tensor = tensor::image_to_nchw(image, Normalization::ZeroToOne);
        let input_tensor = input_tensor.as_standard_layout().into_owned();

        let mut session = self
            .session
            .lock()
            .map_err(|_| EnhanceError::Inference("model session lock poisoned".to_string()))?;

        let input_ref = ort::value::TensorRef::from_array_view(&input_tensor)
            .map_err(|e| EnhanceError::Inference(e.to_string()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_ref])
            .map_err(|e| EnhanceError::Inference(e.to_string()))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| EnhanceError::Postprocessing("no output tensor".to_string()))?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| EnhanceError::Postprocessing(e.to_string()))?;

        tensor::nchw_to_image(&shape, data, Normalization::ZeroToOne)
    }
}
