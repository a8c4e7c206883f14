// Main entry point for the enhance-server application.
// Sets up the Tokio runtime, loads the inference models once, configures the
// Axum router, and starts the HTTP server.

mod enhance;
mod shutdown_signal;
mod web;

use clap::Parser;
use enhance::{Upscaler, esrgan::RealEsrganUpscaler, gfpgan::GfpganRestorer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use web::AppState;

/// Command line arguments for enhance-server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct AppConfig {
    /// Hostname/IP to bind the server to.
    /// If this option is specified without value, it will default to "*", meaning the server will listen on all interfaces.
    #[arg(long, env = "ENHANCE_SERVER_HOST", default_value = "*", num_args = 0..=1, default_missing_value = "*")]
    host: String,

    /// Port number to listen on.
    #[arg(short, long, env = "ENHANCE_SERVER_PORT", default_value_t = 8000)]
    port: u16,

    /// Path to the Real-ESRGAN x2 ONNX weights.
    #[arg(
        long,
        env = "REAL_ESRGAN_WEIGHTS",
        default_value = "/workspace/weights/RealESRGAN_x2plus.onnx"
    )]
    esrgan_weights: PathBuf,

    /// Path to the GFPGAN ONNX weights.
    #[arg(
        long,
        env = "GFPGAN_WEIGHTS",
        default_value = "/workspace/weights/GFPGANv1.4.onnx"
    )]
    gfpgan_weights: PathBuf,

    /// Shared secret for bearer-token authorization. When unset, the
    /// /enhance endpoint accepts unauthenticated requests.
    #[arg(long, env = "AI_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,
}

#[tokio::main]
async fn main() {
    // Parse command line args and environment variables
    let config = AppConfig::parse();

    // Initialize tracing subscriber for structured logging.
    // Logs will go to stdout. Adjust level and format as needed.
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Starting enhance-server...");

    // --- Load inference models ---
    // Both sessions are constructed exactly once and live for the process
    // lifetime; requests only ever borrow them.
    let upscaler: Arc<dyn Upscaler> = match RealEsrganUpscaler::load(&config.esrgan_weights, 2) {
        Ok(upscaler) => Arc::new(upscaler),
        Err(err) => {
            tracing::error!(
                "FATAL: Failed to load Real-ESRGAN weights from {}: {}",
                config.esrgan_weights.display(),
                err
            );
            eprintln!("FATAL: Upscaler initialization failed. See logs for details. Exiting.");
            std::process::exit(1);
        }
    };

    let face_restorer = match GfpganRestorer::load(&config.gfpgan_weights, Some(upscaler.clone())) {
        Ok(restorer) => Arc::new(restorer),
        Err(err) => {
            tracing::error!(
                "FATAL: Failed to load GFPGAN weights from {}: {}",
                config.gfpgan_weights.display(),
                err
            );
            eprintln!("FATAL: Face restorer initialization failed. See logs for details. Exiting.");
            std::process::exit(1);
        }
    };

    if config.auth_token.is_some() {
        tracing::info!("Bearer-token authorization enabled");
    } else {
        tracing::warn!("No auth token configured - the /enhance endpoint accepts any caller");
    }

    let state = AppState {
        upscaler,
        face_restorer,
        auth_token: config.auth_token,
        timeout: web::AI_TIMEOUT,
    };

    let app = web::create_app(state);
    tracing::info!("Axum router configured.");

    // --- Start HTTP Server ---
    let listener = match web::create_listener(&config.host, config.port).await {
        Ok((addr, listener)) => {
            tracing::info!("Server successfully bound. Listening on {}", addr);
            listener
        }
        Err(e) => {
            tracing::error!("FATAL: Failed to bind server: {}", e);
            eprintln!("FATAL: Could not bind server. Error: {}. Exiting.", e);
            std::process::exit(1);
        }
    };

    // Run the server.
    if let Err(e) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal::shutdown_signal())
        .await
    {
        tracing::error!("Server run error: {}", e);
        eprintln!("ERROR: Server shut down unexpectedly. Error: {}", e);
    }

    tracing::info!("enhance-server has shut down.");
}
