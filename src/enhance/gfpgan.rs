// GFPGAN face restoration backed by an ONNX Runtime session, with the
// super-resolution model as background enhancer for large frames.

use super::tensor::{self, Normalization};
use super::{EnhanceError, FaceRestorer, Upscaler};
use image::DynamicImage;
use image::imageops::FilterType;
use ort::session::{Session, builder::GraphOptimizationLevel};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Native resolution of the GFPGAN generator.
const MODEL_INPUT_SIZE: u32 = 512;

/// GFPGAN v1.4 restorer. Restores all faces with paste-back into the frame;
/// the output always has the input's dimensions. When the frame is larger
/// than the model's native output, the background upsampler (the same
/// Real-ESRGAN instance the upscale stage uses) enhances the restored frame
/// before the final resize instead of plain interpolation.
pub struct GfpganRestorer {
    session: Mutex<Session>,
    input_name: String,
    bg_upsampler: Option<Arc<dyn Upscaler>>,
}

impl GfpganRestorer {
    pub fn load(
        weights: &Path,
        bg_upsampler: Option<Arc<dyn Upscaler>>,
    ) -> Result<Self, EnhanceError> {
        if !weights.exists() {
            return Err(EnhanceError::WeightsNotFound(weights.to_path_buf()));
        }

        let session = Session::builder()
            .map_err(|e| EnhanceError::Inference(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| EnhanceError::Inference(e.to_string()))?
            .commit_from_file(weights)
            .map_err(|e| EnhanceError::Inference(e.to_string()))?;

        let input_name = session
            .inputs
            .first()
            .map_or_else(|| "input".to_string(), |i| i.name.clone());

        info!("GFPGAN session ready (weights: {})", weights.display());

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            bg_upsampler,
        })
    }

    fn run_model(&self, frame: &DynamicImage) -> Result<DynamicImage, EnhanceError> {
        // The generator works at a fixed resolution with values in -1..=1.
        let input_tensor = tensor::image_to_nchw(frame, Normalization::MinusOneToOne);
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

        tensor::nchw_to_image(&shape, data, Normalization::MinusOneToOne)
    }
}

impl FaceRestorer for GfpganRestorer {
    fn restore(&self, image: &DynamicImage) -> Result<DynamicImage, EnhanceError> {
        let (width, height) = (image.width(), image.height());

        let model_input = if (width, height) == (MODEL_INPUT_SIZE, MODEL_INPUT_SIZE) {
            image.clone()
        } else {
            image.resize_exact(MODEL_INPUT_SIZE, MODEL_INPUT_SIZE, FilterType::Lanczos3)
        };
        let mut restored = self.run_model(&model_input)?;

        // Paste back at the original resolution. Going up from the model's
        // native output, prefer the learned upsampler over interpolation.
        if let Some(upsampler) = &self.bg_upsampler {
            if width > restored.width() || height > restored.height() {
                restored = upsampler.upscale(&restored)?;
            }
        }

        if (restored.width(), restored.height()) == (width, height) {
            Ok(restored)
        } else {
            Ok(restored.resize_exact(width, height, FilterType::Lanczos3))
        }
    }
}
