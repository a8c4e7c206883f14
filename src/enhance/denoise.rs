// Classical color denoiser. Placeholder: replace with NAFNet/DnCNN inference
// for production quality.

use super::{EnhanceError, ImageTransform};
use image::DynamicImage;

/// Window radius for the median filter, in pixels per axis.
const MEDIAN_RADIUS: u32 = 2;

/// Dimension-preserving noise reduction over the RGB buffer.
#[derive(Debug, Default)]
pub struct DenoiseStage;

impl ImageTransform for DenoiseStage {
    fn name(&self) -> &'static str {
        "denoise"
    }

    fn apply(&self, image: DynamicImage) -> Result<DynamicImage, EnhanceError> {
        let rgb = image.into_rgb8();
        let filtered = imageproc::filter::median_filter(&rgb, MEDIAN_RADIUS, MEDIAN_RADIUS);
        Ok(DynamicImage::ImageRgb8(filtered))
    }
}
