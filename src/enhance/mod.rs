// Image enhancement pipeline: optional denoise, upscale and face-restore
// stages applied in a fixed order to a decoded image.

pub mod denoise;
pub mod esrgan;
pub mod gfpgan;
pub mod limits;
mod tensor;

use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors raised while preparing or running the enhancement stages.
#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("Image exceeds 5 MB limit")]
    UploadTooLarge { bytes: usize },
    #[error("Image exceeds 1280x1280 limit")]
    ResolutionTooLarge { width: u32, height: u32 },
    #[error("Upscale must be 1 or 2")]
    InvalidScale(u32),
    #[error("model weights not found at {}", .0.display())]
    WeightsNotFound(PathBuf),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("model output postprocessing failed: {0}")]
    Postprocessing(String),
}

/// Per-request stage toggles, parsed once from the form fields and never
/// mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnhanceOptions {
    pub upscale: u32,
    pub denoise: bool,
    pub face_restore: bool,
}

impl Default for EnhanceOptions {
    fn default() -> Self {
        Self {
            upscale: 2,
            denoise: false,
            face_restore: false,
        }
    }
}

/// A single enhancement stage. Stages take ownership of the image and return
/// the (possibly replaced) buffer.
pub trait ImageTransform: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, EnhanceError>;
}

/// Super-resolution model. Output dimensions are the input dimensions
/// multiplied by the model's native factor (the model determines the exact
/// output size).
pub trait Upscaler: Send + Sync {
    fn upscale(&self, image: &DynamicImage) -> Result<DynamicImage, EnhanceError>;
}

/// Face restoration model. Restores all detected faces and pastes them back
/// into the frame; output dimensions equal input dimensions.
pub trait FaceRestorer: Send + Sync {
    fn restore(&self, image: &DynamicImage) -> Result<DynamicImage, EnhanceError>;
}

struct UpscaleStage {
    upscaler: Arc<dyn Upscaler>,
}

impl ImageTransform for UpscaleStage {
    fn name(&self) -> &'static str {
        "upscale"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, EnhanceError> {
        self.upscaler.upscale(&image)
    }
}

struct FaceRestoreStage {
    restorer: Arc<dyn FaceRestorer>,
}

impl ImageTransform for FaceRestoreStage {
    fn name(&self) -> &'static str {
        "face_restore"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, EnhanceError> {
        self.restorer.restore(&image)
    }
}

/// Builds the ordered stage list for one request. Disabled stages contribute
/// nothing; an upscale factor of 1 is the identity and adds no stage. Any
/// other factor besides 2 is rejected here, before any model runs.
pub fn build_pipeline(
    options: &EnhanceOptions,
    upscaler: Arc<dyn Upscaler>,
    face_restorer: Arc<dyn FaceRestorer>,
) -> Result<Vec<Box<dyn ImageTransform>>, EnhanceError> {
    let mut stages: Vec<Box<dyn ImageTransform>> = Vec::new();

    // Denoise runs first so later stages do not amplify noise; face
    // restoration runs last so it sees the highest-resolution base.
    if options.denoise {
        stages.push(Box::new(denoise::DenoiseStage::default()));
    }

    match options.upscale {
        1 => {}
        2 => stages.push(Box::new(UpscaleStage { upscaler })),
        other => return Err(EnhanceError::InvalidScale(other)),
    }

    if options.face_restore {
        stages.push(Box::new(FaceRestoreStage {
            restorer: face_restorer,
        }));
    }

    Ok(stages)
}

/// Applies the stages in order. An empty stage list returns the image
/// unchanged.
pub fn run_pipeline(
    stages: &[Box<dyn ImageTransform>],
    mut image: DynamicImage,
) -> Result<DynamicImage, EnhanceError> {
    for stage in stages {
        let (in_width, in_height) = (image.width(), image.height());
        image = stage.apply(image)?;
        debug!(
            "Stage '{}' completed: {}x{} -> {}x{}",
            stage.name(),
            in_width,
            in_height,
            image.width(),
            image.height()
        );
    }
    Ok(image)
}
