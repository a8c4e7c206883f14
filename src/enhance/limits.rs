// Upload limit enforcement. Both checks gate on the same failure kind; size
// is checked before dimensions.

use super::EnhanceError;

/// Maximum accepted upload size for the image file field.
pub const MAX_UPLOAD_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// Maximum accepted width or height of the decoded image, in pixels.
pub const MAX_RESOLUTION: u32 = 1280;

/// Rejects uploads over the byte ceiling or decoded images over the
/// resolution ceiling. No-op otherwise.
pub fn ensure_limits(byte_len: usize, width: u32, height: u32) -> Result<(), EnhanceError> {
    if byte_len > MAX_UPLOAD_SIZE_BYTES {
        return Err(EnhanceError::UploadTooLarge { bytes: byte_len });
    }
    if width > MAX_RESOLUTION || height > MAX_RESOLUTION {
        return Err(EnhanceError::ResolutionTooLarge { width, height });
    }
    Ok(())
}
