// API handlers for the web server

use super::{
    AppState,
    error::ApiError,
    extract_request_data::{EnhanceRequest, extract_enhance_request},
    image_codec::{decode_input_image, encode_png},
};
use crate::enhance::{
    self, EnhanceOptions, FaceRestorer, Upscaler, limits::ensure_limits,
};
use axum::{
    Json,
    extract::{Multipart, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

// --- GET /health ---
// Trivial liveness probe
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// --- POST /enhance ---
// Applies the enabled enhancement stages to the uploaded image and returns
// the result as PNG
pub async fn enhance_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    authorize(state.auth_token.as_deref(), headers.get(header::AUTHORIZATION))?;

    let request_id = Uuid::new_v4();
    let started = Instant::now();

    let EnhanceRequest {
        image_data,
        content_type,
        options,
    } = extract_enhance_request(multipart).await?;

    info!(
        "Enhance request: request_id={}, bytes={}, upscale={}, denoise={}, face_restore={}",
        request_id,
        image_data.len(),
        options.upscale,
        options.denoise,
        options.face_restore
    );

    // Decoding and inference are CPU-bound; keep them off the I/O threads.
    let upscaler = state.upscaler.clone();
    let face_restorer = state.face_restorer.clone();
    let png = tokio::task::spawn_blocking(move || {
        process_image(
            &image_data,
            content_type.as_deref(),
            &options,
            upscaler,
            face_restorer,
        )
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("Image processing task failed: {}", e)))??;

    // Post-hoc budget check: the work already ran to completion, but a late
    // result is discarded rather than returned.
    let elapsed = started.elapsed();
    if elapsed > state.timeout {
        warn!(
            "Enhance request {} finished after {:?}, over the {:?} budget; discarding result",
            request_id, elapsed, state.timeout
        );
        return Err(ApiError::GatewayTimeout(
            "Processing exceeded timeout".to_string(),
        ));
    }

    debug!(
        "Enhance request {} completed in {:?} ({} bytes out)",
        request_id,
        elapsed,
        png.len()
    );

    Ok(([(header::CONTENT_TYPE, mime::IMAGE_PNG.as_ref())], png).into_response())
}

/// Decode, enforce limits, run the stage pipeline, encode. Runs on a
/// blocking task.
fn process_image(
    image_data: &[u8],
    content_type: Option<&str>,
    options: &EnhanceOptions,
    upscaler: Arc<dyn Upscaler>,
    face_restorer: Arc<dyn FaceRestorer>,
) -> Result<Vec<u8>, ApiError> {
    let image = decode_input_image(image_data, content_type)?;
    ensure_limits(image_data.len(), image.width(), image.height())?;

    let stages = enhance::build_pipeline(options, upscaler, face_restorer)?;
    let image = enhance::run_pipeline(&stages, image)?;

    encode_png(&image)
}

/// Bearer-token check against the raw Authorization header. A configured
/// secret requires the header to equal `Bearer <secret>`, compared
/// case-insensitively over the whole value; malformed or non-Bearer values
/// count as absent. Without a configured secret the endpoint is open and the
/// header is never inspected.
fn authorize(expected: Option<&str>, authorization: Option<&HeaderValue>) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let authorized = authorization
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case(&format!("Bearer {expected}")));

    if authorized {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("Unauthorized".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enhance::EnhanceError;
    use crate::web::create_app;
    use axum::body::{Body, Bytes};
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use image::DynamicImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    #[derive(Default)]
    struct NearestNeighborUpscaler {
        calls: AtomicUsize,
    }

    impl Upscaler for NearestNeighborUpscaler {
        fn upscale(&self, image: &DynamicImage) -> Result<DynamicImage, EnhanceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(image.resize_exact(
                image.width() * 2,
                image.height() * 2,
                image::imageops::FilterType::Nearest,
            ))
        }
    }

    #[derive(Default)]
    struct PassthroughRestorer {
        calls: AtomicUsize,
    }

    impl FaceRestorer for PassthroughRestorer {
        fn restore(&self, image: &DynamicImage) -> Result<DynamicImage, EnhanceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(image.clone())
        }
    }

    fn test_state(
        auth_token: Option<&str>,
    ) -> (AppState, Arc<NearestNeighborUpscaler>, Arc<PassthroughRestorer>) {
        let upscaler = Arc::new(NearestNeighborUpscaler::default());
        let restorer = Arc::new(PassthroughRestorer::default());
        let state = AppState {
            upscaler: upscaler.clone(),
            face_restorer: restorer.clone(),
            auth_token: auth_token.map(str::to_string),
            timeout: crate::web::AI_TIMEOUT,
        };
        (state, upscaler, restorer)
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb([90, 120, 180]),
        ));
        encode_png(&image).unwrap()
    }

    const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

    fn multipart_body(image: Option<&[u8]>, fields: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some(data) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
                     filename=\"input.png\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; \
                     name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn enhance_request(body: Vec<u8>, authorization: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/enhance")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Option<String>, Bytes) {
        let response = create_app(state).oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, body)
    }

    #[tokio::test]
    async fn upscale_2_doubles_dimensions() {
        let (state, _, _) = test_state(None);
        let body = multipart_body(Some(&png_bytes(100, 100)), &[("upscale", "2")]);

        let (status, content_type, body) = send(state, enhance_request(body, None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("image/png"));
        let output = image::load_from_memory(&body).unwrap();
        assert_eq!((output.width(), output.height()), (200, 200));
    }

    #[tokio::test]
    async fn upscale_defaults_to_2() {
        let (state, upscaler, _) = test_state(None);
        let body = multipart_body(Some(&png_bytes(60, 40)), &[]);

        let (status, _, body) = send(state, enhance_request(body, None)).await;

        assert_eq!(status, StatusCode::OK);
        let output = image::load_from_memory(&body).unwrap();
        assert_eq!((output.width(), output.height()), (120, 80));
        assert_eq!(upscaler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_stages_off_is_a_codec_pass_through() {
        let (state, _, _) = test_state(None);
        let input = png_bytes(50, 50);
        let body = multipart_body(
            Some(&input),
            &[("upscale", "1"), ("denoise", "false"), ("face_restore", "false")],
        );

        let (status, _, body) = send(state, enhance_request(body, None)).await;

        assert_eq!(status, StatusCode::OK);
        let expected =
            encode_png(&decode_input_image(&input, Some("image/png")).unwrap()).unwrap();
        assert_eq!(body.as_ref(), expected.as_slice());
    }

    #[tokio::test]
    async fn oversized_resolution_is_rejected_regardless_of_options() {
        let (state, upscaler, restorer) = test_state(None);
        let body = multipart_body(
            Some(&png_bytes(2000, 2000)),
            &[("upscale", "2"), ("denoise", "true"), ("face_restore", "true")],
        );

        let (status, _, _) = send(state, enhance_request(body, None)).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(upscaler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(restorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_upscale_value_is_rejected_without_invoking_models() {
        let (state, upscaler, restorer) = test_state(None);
        let body = multipart_body(Some(&png_bytes(100, 100)), &[("upscale", "3")]);

        let (status, _, body) = send(state, enhance_request(body, None)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let message = String::from_utf8_lossy(&body).to_string();
        assert!(message.contains("Upscale must be 1 or 2"), "{message}");
        assert_eq!(upscaler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(restorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn undecodable_image_is_rejected() {
        let (state, _, _) = test_state(None);
        let body = multipart_body(Some(b"not an image at all"), &[("upscale", "1")]);

        let (status, _, _) = send(state, enhance_request(body, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_image_field_is_rejected() {
        let (state, _, _) = test_state(None);
        let body = multipart_body(None, &[("upscale", "2")]);

        let (status, _, _) = send(state, enhance_request(body, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn denoise_preserves_dimensions() {
        let (state, _, _) = test_state(None);
        let body = multipart_body(
            Some(&png_bytes(64, 48)),
            &[("upscale", "1"), ("denoise", "true")],
        );

        let (status, _, body) = send(state, enhance_request(body, None)).await;

        assert_eq!(status, StatusCode::OK);
        let output = image::load_from_memory(&body).unwrap();
        assert_eq!((output.width(), output.height()), (64, 48));
    }

    #[tokio::test]
    async fn face_restore_invokes_the_model() {
        let (state, _, restorer) = test_state(None);
        let body = multipart_body(
            Some(&png_bytes(48, 48)),
            &[("upscale", "1"), ("face_restore", "true")],
        );

        let (status, _, _) = send(state, enhance_request(body, None)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(restorer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_token_is_rejected_when_secret_is_configured() {
        let (state, _, _) = test_state(Some("hunter2"));
        let body = multipart_body(Some(&png_bytes(10, 10)), &[("upscale", "1")]);

        let (status, _, _) = send(state, enhance_request(body, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_token_is_rejected_when_secret_is_configured() {
        let (state, _, _) = test_state(Some("hunter2"));
        let body = multipart_body(Some(&png_bytes(10, 10)), &[("upscale", "1")]);

        let (status, _, _) =
            send(state, enhance_request(body, Some("Bearer wrong-token"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn correct_token_is_accepted() {
        let (state, _, _) = test_state(Some("hunter2"));
        let body = multipart_body(Some(&png_bytes(10, 10)), &[("upscale", "1")]);

        let (status, _, _) = send(state, enhance_request(body, Some("Bearer hunter2"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn token_comparison_is_case_insensitive() {
        let (state, _, _) = test_state(Some("hunter2"));
        let body = multipart_body(Some(&png_bytes(10, 10)), &[("upscale", "1")]);

        let (status, _, _) = send(state, enhance_request(body, Some("BEARER HUNTER2"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn without_secret_any_authorization_header_is_ignored() {
        let (state, _, _) = test_state(None);
        let body = multipart_body(Some(&png_bytes(10, 10)), &[("upscale", "1")]);

        let (status, _, _) =
            send(state, enhance_request(body, Some("Bearer whatever"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn without_secret_a_non_bearer_header_is_ignored() {
        let (state, _, _) = test_state(None);
        let body = multipart_body(Some(&png_bytes(10, 10)), &[("upscale", "1")]);

        let (status, _, _) =
            send(state, enhance_request(body, Some("Token not-a-bearer-value"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn non_bearer_header_is_unauthorized_when_secret_is_configured() {
        let (state, _, _) = test_state(Some("hunter2"));
        let body = multipart_body(Some(&png_bytes(10, 10)), &[("upscale", "1")]);

        let (status, _, _) = send(state, enhance_request(body, Some("Token hunter2"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_with_payload_too_large() {
        let (state, _, _) = test_state(None);
        let oversized = vec![0u8; 6 * 1024 * 1024];
        let body = multipart_body(Some(&oversized), &[("upscale", "1")]);

        let (status, _, _) = send(state, enhance_request(body, None)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn late_result_is_discarded_as_timeout() {
        struct SlowUpscaler;

        impl Upscaler for SlowUpscaler {
            fn upscale(&self, image: &DynamicImage) -> Result<DynamicImage, EnhanceError> {
                std::thread::sleep(std::time::Duration::from_millis(25));
                Ok(image.clone())
            }
        }

        let (mut state, _, _) = test_state(None);
        state.upscaler = Arc::new(SlowUpscaler);
        state.timeout = std::time::Duration::from_millis(1);
        let body = multipart_body(Some(&png_bytes(20, 20)), &[("upscale", "2")]);

        let (status, _, body) = send(state, enhance_request(body, None)).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        let message = String::from_utf8_lossy(&body).to_string();
        assert!(message.contains("Processing exceeded timeout"), "{message}");
    }

    #[tokio::test]
    async fn health_endpoint_responds() {
        let (state, _, _) = test_state(None);
        let request = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let (status, _, body) = send(state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8_lossy(&body).contains("ok"));
    }
}
