use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use khalifa_backend::core::config::{AppPaths, ConfigService, Settings, SweepMode};
use khalifa_backend::server;
use khalifa_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::new());
    khalifa_backend::core::logging::init(&paths);

    let config_service = ConfigService::new(paths.clone());
    let config = config_service
        .load_config()
        .context("Failed to load configuration")?;
    tracing::debug!(
        "Effective configuration: {}",
        config_service.redact_sensitive_values(&config)
    );
    let settings = Settings::from_config(&config, &paths);

    let state = AppState::initialize(settings, &paths).await?;

    let session_settings = &state.settings.session;
    if session_settings.sweep == SweepMode::Interval {
        tracing::info!(
            period_secs = session_settings.sweep_interval.as_secs(),
            "Starting background session sweeper"
        );
        state.sessions().spawn_sweeper(session_settings.sweep_interval);
    }

    server::rate_limit::spawn_pruner(state.limiter.clone(), session_settings.sweep_interval);

    let bind_addr = format!("{}:{}", state.settings.server.host, state.settings.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    tracing::info!(
        "{} is listening on {}",
        state.settings.persona.name,
        addr
    );

    let app: Router = server::router::router(state.clone());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
