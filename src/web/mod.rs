// Web server module: the HTTP surface of the enhancement pipeline.

mod app;
mod error;
mod extract_request_data;
mod handlers;
mod image_codec;
mod listeners;

pub use app::create_app;
pub use listeners::create_listener;

use crate::enhance::limits::MAX_UPLOAD_SIZE_BYTES;
use crate::enhance::{FaceRestorer, Upscaler};
use std::sync::Arc;
use std::time::Duration;

/// Wall-clock budget for one request; checked after processing completes.
pub const AI_TIMEOUT: Duration = Duration::from_secs(12);

/// Request body ceiling: a maximum-size upload plus multipart framing and the
/// small form fields.
pub const MAX_REQUEST_BODY_BYTES: usize = MAX_UPLOAD_SIZE_BYTES + 64 * 1024;

/// Shared per-process state. The model instances are constructed once at
/// startup and injected here; handlers treat them as read-only.
#[derive(Clone)]
pub struct AppState {
    pub upscaler: Arc<dyn Upscaler>,
    pub face_restorer: Arc<dyn FaceRestorer>,
    /// Bearer-token secret. `None` disables authorization entirely.
    pub auth_token: Option<String>,
    /// Wall-clock budget for one request, normally [`AI_TIMEOUT`]; results
    /// arriving after it are discarded.
    pub timeout: Duration,
}
