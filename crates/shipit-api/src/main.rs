//! Shipit API server.

use shipit_api::services::github::GitHubSourceControl;
use shipit_api::{AppState, routes};
use shipit_config::{SystemConfig, load_system_config};
use shipit_core::scm::{NullSourceControl, SourceControl};
use shipit_store::Stores;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::var("SHIPIT_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading configuration");
            load_system_config(&path)?
        }
        Err(_) => SystemConfig::default(),
    };
    let bind = std::env::var("SHIPIT_BIND").unwrap_or_else(|_| config.server.bind.clone());

    let scm: Arc<dyn SourceControl> = match GitHubSourceControl::from_env() {
        Some(github) => {
            info!("Using GitHub for commit lookups");
            Arc::new(github)
        }
        None => {
            info!("No GITHUB_TOKEN set, commit lookups disabled");
            Arc::new(NullSourceControl)
        }
    };

    let state = AppState::new(Stores::in_memory(), config, scm);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    info!("Starting server on {}", bind);
    let listener = TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
