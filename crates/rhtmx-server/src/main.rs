mod app;
mod config;
mod controllers;
mod models;

use anyhow::{Context, Result};
use app::{build_router, AppState};
use config::Config;
use rhtmx_session::Manager;
use std::net::SocketAddr;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rhtmx_session=debug,tower_http=info")),
        )
        .init();

    info!("rhtmx-server starting...");

    let config = Config::load_default().unwrap_or_else(|e| {
        warn!("Failed to load config: {:#}, using defaults", e);
        Config::default()
    });

    let manager = Manager::new(config.session.clone())
        .await
        .context("Failed to initialize session manager")?;
    info!(
        "Sessions: provider={}, cookie={}, gc every {:?}",
        manager.provider().name(),
        manager.config().cookie_name,
        manager.config().gc_interval()
    );

    let _gc = manager.spawn_gc();

    let app = build_router(AppState::new(manager));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server running at http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}
