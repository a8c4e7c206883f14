use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::http::StatusCode;
use tracing::{debug, warn};

use super::error::ApiError;
use crate::enhance::EnhanceOptions;

/// One parsed `POST /enhance` request body.
pub struct EnhanceRequest {
    pub image_data: Vec<u8>,
    pub content_type: Option<String>,
    pub options: EnhanceOptions,
}

/// Reads the multipart form: the required `image` file field plus the
/// optional `upscale`, `denoise` and `face_restore` fields. Unknown fields
/// are ignored. The upscale value is parsed here but range-checked later by
/// the pipeline builder.
pub async fn extract_enhance_request(mut multipart: Multipart) -> Result<EnhanceRequest, ApiError> {
    let mut image_data_opt: Option<Vec<u8>> = None;
    let mut content_type_opt: Option<String> = None;
    let mut options = EnhanceOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| map_multipart_error("process multipart field", e))?
    {
        match field.name() {
            Some("image") => {
                if image_data_opt.is_some() {
                    warn!("Multiple 'image' fields found in multipart request, using the last one");
                }

                let content_type_str = field.content_type().map(str::to_string);
                debug!("Received image with content type: {:?}", content_type_str);

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| map_multipart_error("read image data", e))?
                    .to_vec();

                if data.is_empty() {
                    return Err(ApiError::BadRequest(
                        "Uploaded 'image' field is empty.".to_string(),
                    ));
                }

                image_data_opt = Some(data);
                content_type_opt = content_type_str;
            }
            Some("upscale") => {
                let value = read_text_field(field, "upscale").await?;
                options.upscale = value.trim().parse::<u32>().map_err(|_| {
                    ApiError::BadRequest(format!("Invalid 'upscale' value: {:?}", value))
                })?;
            }
            Some("denoise") => {
                let value = read_text_field(field, "denoise").await?;
                options.denoise = parse_bool_field("denoise", &value)?;
            }
            Some("face_restore") => {
                let value = read_text_field(field, "face_restore").await?;
                options.face_restore = parse_bool_field("face_restore", &value)?;
            }
            other => {
                debug!("Ignoring multipart field: {}", other.unwrap_or("unnamed"));
            }
        }
    }

    match image_data_opt {
        Some(image_data) => Ok(EnhanceRequest {
            image_data,
            content_type: content_type_opt,
            options,
        }),
        None => Err(ApiError::BadRequest(
            "Missing 'image' field in multipart request.".to_string(),
        )),
    }
}

async fn read_text_field(field: Field<'_>, name: &str) -> Result<String, ApiError> {
    let context = format!("read '{}' field", name);
    field
        .text()
        .await
        .map_err(|e| map_multipart_error(&context, e))
}

/// Body-limit overruns surface as multipart read failures; keep their 413
/// status instead of collapsing everything into a generic 400.
fn map_multipart_error(context: &str, error: MultipartError) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Image exceeds 5 MB limit".to_string())
    } else {
        ApiError::BadRequest(format!("Failed to {}: {}", context, error))
    }
}

fn parse_bool_field(name: &str, value: &str) -> Result<bool, ApiError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ApiError::BadRequest(format!(
            "Invalid '{}' value: {:?}",
            name, other
        ))),
    }
}
