use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use super::error::ApiError;

// Helper function to decode the uploaded bytes into a three-channel buffer
pub fn decode_input_image(
    file_data: &[u8],
    content_type_str: Option<&str>,
) -> Result<DynamicImage, ApiError> {
    let media_type = content_type_str.map(|s| s[0..s.find(';').unwrap_or(s.len())].trim());

    let img_format_hint = match media_type {
        Some("image/jpeg") => Some(ImageFormat::Jpeg),
        Some("image/png") => Some(ImageFormat::Png),
        Some("image/webp") => Some(ImageFormat::WebP),
        _ => None,
    };

    // A wrong declared content type falls back to sniffing the bytes.
    let dyn_img = if let Some(format) = img_format_hint {
        image::load_from_memory_with_format(file_data, format)
            .or_else(|_| image::load_from_memory(file_data))
    } else {
        image::load_from_memory(file_data)
    }
    .map_err(|e| ApiError::ImageProcessingError(format!("Unable to decode image: {}", e)))?;

    // The pipeline operates on three-channel color throughout.
    Ok(DynamicImage::ImageRgb8(dyn_img.to_rgb8()))
}

// Helper function to encode the final buffer as PNG
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ApiError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).map_err(|e| {
        ApiError::InternalServerError(format!("Failed to encode output image: {}", e))
    })?;

    let bytes = buffer.into_inner();
    if bytes.is_empty() {
        return Err(ApiError::InternalServerError(
            "Failed to encode output image".to_string(),
        ));
    }
    Ok(bytes)
}
