// Conversion between image buffers and the NCHW f32 tensors the ONNX models
// consume and produce.

use super::EnhanceError;
use image::{DynamicImage, RgbImage};
use ndarray::Array4;

/// Value range expected by a model's input and produced by its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Normalization {
    /// Values in 0..=1 (Real-ESRGAN).
    ZeroToOne,
    /// Values in -1..=1 (GFPGAN).
    MinusOneToOne,
}

impl Normalization {
    fn encode(self, value: u8) -> f32 {
        let v = f32::from(value) / 255.0;
        match self {
            Self::ZeroToOne => v,
            Self::MinusOneToOne => v * 2.0 - 1.0,
        }
    }

    fn decode(self, value: f32) -> u8 {
        let v = match self {
            Self::ZeroToOne => value,
            Self::MinusOneToOne => (value + 1.0) / 2.0,
        };
        (v * 255.0).clamp(0.0, 255.0).round() as u8
    }
}

/// Converts an image to an NCHW tensor (batch=1, channels=3, height, width),
/// RGB channel order.
pub(crate) fn image_to_nchw(image: &DynamicImage, norm: Normalization) -> Array4<f32> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for (channel, &value) in pixel.0.iter().enumerate() {
            tensor[[0, channel, y as usize, x as usize]] = norm.encode(value);
        }
    }
    tensor
}

/// Converts a model's NCHW output tensor back into an RGB image.
pub(crate) fn nchw_to_image(
    shape: &[i64],
    data: &[f32],
    norm: Normalization,
) -> Result<DynamicImage, EnhanceError> {
    if shape.len() != 4 {
        return Err(EnhanceError::Postprocessing(format!(
            "expected 4D output tensor, got {}D",
            shape.len()
        )));
    }

    let height = usize::try_from(shape[2])
        .map_err(|_| EnhanceError::Postprocessing("invalid tensor height".to_string()))?;
    let width = usize::try_from(shape[3])
        .map_err(|_| EnhanceError::Postprocessing("invalid tensor width".to_string()))?;
    let channel_size = height * width;

    if data.len() < 3 * channel_size {
        return Err(EnhanceError::Postprocessing(format!(
            "output tensor has {} values, expected at least {}",
            data.len(),
            3 * channel_size
        )));
    }

    let mut pixels = Vec::with_capacity(channel_size * 3);
    for idx in 0..channel_size {
        pixels.push(norm.decode(data[idx]));
        pixels.push(norm.decode(data[channel_size + idx]));
        pixels.push(norm.decode(data[2 * channel_size + idx]));
    }

    let width = u32::try_from(width)
        .map_err(|_| EnhanceError::Postprocessing("output image width too large".to_string()))?;
    let height = u32::try_from(height)
        .map_err(|_| EnhanceError::Postprocessing("output image height too large".to_string()))?;

    let rgb = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
        EnhanceError::Postprocessing("failed to assemble output image".to_string())
    })?;
    Ok(DynamicImage::ImageRgb8(rgb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn tensor_has_nchw_shape() {
        let image = DynamicImage::new_rgb8(100, 80);
        let tensor = image_to_nchw(&image, Normalization::ZeroToOne);
        assert_eq!(tensor.shape(), &[1, 3, 80, 100]);
    }

    #[test]
    fn zero_to_one_normalizes_channels() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 128, 0])));
        let tensor = image_to_nchw(&image, Normalization::ZeroToOne);

        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 0.01);
        assert!((tensor[[0, 1, 0, 0]] - 0.502).abs() < 0.01);
        assert!(tensor[[0, 2, 0, 0]].abs() < 0.01);
    }

    #[test]
    fn minus_one_to_one_centers_midtones() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([0, 128, 255])));
        let tensor = image_to_nchw(&image, Normalization::MinusOneToOne);

        assert!((tensor[[0, 0, 0, 0]] + 1.0).abs() < 0.01);
        assert!(tensor[[0, 1, 0, 0]].abs() < 0.01);
        assert!((tensor[[0, 2, 0, 0]] - 1.0).abs() < 0.01);
    }

    #[test]
    fn round_trip_preserves_pixels() {
        let mut rgb = RgbImage::new(3, 2);
        rgb.put_pixel(0, 0, Rgb([10, 20, 30]));
        rgb.put_pixel(2, 1, Rgb([250, 5, 127]));
        let image = DynamicImage::ImageRgb8(rgb);

        for norm in [Normalization::ZeroToOne, Normalization::MinusOneToOne] {
            let tensor = image_to_nchw(&image, norm);
            let data: Vec<f32> = tensor.iter().copied().collect();
            let restored = nchw_to_image(&[1, 3, 2, 3], &data, norm).unwrap();
            assert_eq!(restored.as_bytes(), image.as_bytes());
        }
    }

    #[test]
    fn rejects_wrong_rank() {
        let result = nchw_to_image(&[3, 2, 3], &[0.0; 18], Normalization::ZeroToOne);
        assert!(matches!(result, Err(EnhanceError::Postprocessing(_))));
    }

    #[test]
    fn rejects_short_data() {
        let result = nchw_to_image(&[1, 3, 2, 3], &[0.0; 5], Normalization::ZeroToOne);
        assert!(matches!(result, Err(EnhanceError::Postprocessing(_))));
    }

    #[test]
    fn decode_clamps_out_of_range_values() {
        assert_eq!(Normalization::ZeroToOne.decode(1.7), 255);
        assert_eq!(Normalization::ZeroToOne.decode(-0.3), 0);
        assert_eq!(Normalization::MinusOneToOne.decode(3.0), 255);
    }
}
