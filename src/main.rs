use std::sync::Arc;

mod config;
mod error;
mod extract;
mod gateway;
mod image_cache;
mod images;
mod models;
mod normalize;
mod prompt;
mod routes;

use config::Config;
use gateway::GeminiGateway;
use image_cache::ImageCache;
use images::ImageResolver;
use normalize::Normalizer;
use routes::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env().map_err(|e| {
        tracing::error!(error = %e, "invalid configuration");
        e
    })?;

    let state = AppState {
        cache: Arc::new(ImageCache::new()),
        images: Arc::new(ImageResolver::new(config.image_fetch_timeout)?),
        gateway: Arc::new(GeminiGateway::from_config(&config)?),
        normalizer: Normalizer::new(config.fence_policy, config.strict_findings),
        invalid_json_status: config.invalid_json_status,
    };
    let app = routes::router(state, config.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(
        model = %config.model,
        "listening on {}",
        listener.local_addr()?
    );
    axum::serve(listener, app).await?;
    Ok(())
}
