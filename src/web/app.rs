use super::{AppState, MAX_REQUEST_BODY_BYTES, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::Level;

pub fn create_app(state: AppState) -> Router {
    // Configure the router with all API endpoints
    Router::new()
        // The single processing endpoint
        .route("/enhance", post(handlers::enhance_image))
        // Liveness probe
        .route("/health", get(handlers::health_check))
        // Apply a layer to limit the maximum size of request bodies
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        // Add CORS layer for broader client compatibility
        .layer(CorsLayer::permissive())
        // Add tracing for HTTP requests and responses
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO)))
        // Provide the shared state
        .with_state(state)
}
