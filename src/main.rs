//! # Xposter
//!
//! A Rust web service that posts, reposts and quotes on X (Twitter) using
//! OAuth 1.0a signed requests.
//!
//! See the library documentation for the environment variables and endpoints.

use axum::Router;
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use xposter::{create_router, AppConfig, AppState, PostOperations};

/// Main entry point for the xposter web service.
///
/// This function loads the optional `.env` file, initializes the logging
/// system, reads the configuration, builds the X API client stack and serves
/// HTTP requests until Ctrl+C is received.
///
/// # Middleware
///
/// Request tracing and a permissive CORS policy.
///
/// # Logging
///
/// The application uses the `env_logger` crate for structured logging. Log levels
/// can be controlled via the `RUST_LOG` environment variable.
///
/// # Example Usage
///
/// ```bash
/// # Run with configuration from .env
/// cargo run
///
/// # Run on custom port with debug logging
/// PORT=3000 RUST_LOG=debug cargo run
/// ```
///
/// # Exit Codes
///
/// Exits with status 1 if the configuration is incomplete, the port cannot be
/// bound or the server fails.
#[tokio::main]
async fn main() {
    // A missing .env file is fine; the environment may already be set
    dotenvy::dotenv().ok();

    // Initialize the logging system
    env_logger::init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let ops = match PostOperations::from_config(&config) {
        Ok(ops) => ops,
        Err(e) => {
            error!("Failed to initialize X API client: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState::new(
        Arc::new(ops),
        config.request_deadline,
        config.media_temp_dir.clone(),
    )
    .with_max_upload_bytes(config.max_upload_bytes);

    // Build the HTTP application with all routes and middleware
    let app: Router = create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!("Starting xposter server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("HTTP server error: {}", e);
        std::process::exit(1);
    }

    info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
