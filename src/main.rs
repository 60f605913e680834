//! Taleweaver - illustrated interactive storytelling
//!
//! Each turn produces a scene image and three choices for the player. Image
//! continuity comes from an image-to-image history; choices come from a
//! separate text narrative seeded by a one-time description of the opening
//! scene.

mod api;
mod config;
mod error;
mod history;
mod orchestrator;
mod prompts;
mod services;
mod transport;

#[cfg(test)]
mod testing;

use api::{create_router, AppState, SharedTransport};
use config::AppConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{HttpTransport, RetryingTransport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taleweaver=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env();

    let api_key = config.api_key.clone().unwrap_or_else(|| {
        tracing::warn!("No Gemini API key configured. Set GEMINI_API_KEY or GOOGLE_API_KEY.");
        String::new()
    });
    let http = HttpTransport::new(api_key, config.request_timeout)?;
    let retrying = RetryingTransport::new(http, config.retry_policy());
    tracing::info!(
        image_model = %config.image_model,
        text_model = %config.text_model,
        vision_model = %config.vision_model,
        max_retries = retrying.policy().max_retries,
        base_delay_ms = %retrying.policy().base_delay.as_millis(),
        timeout_secs = config.request_timeout.as_secs(),
        "Gemini transport initialized"
    );
    let transport: SharedTransport = Arc::new(retrying);

    std::fs::create_dir_all(&config.scene_dir)?;
    tracing::info!(path = %config.scene_dir.display(), "Scene directory ready");

    let state = AppState::new(&config, transport);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Taleweaver server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
