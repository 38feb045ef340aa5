use std::sync::Arc;

use courier_relay::api;
use courier_relay::config::{Config, LogFormat};
use courier_relay::error::AppError;
use courier_relay::registry::SessionRegistry;
use courier_relay::state::AppState;
use courier_relay::store::ephemeral::run_expiry_sweeper;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }

    let shared_state = Arc::new(AppState::new(&config));

    tokio::spawn(run_expiry_sweeper(
        shared_state.positions.clone(),
        shared_state.metrics.clone(),
        config.expiry_sweep_interval,
    ));

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        position_ttl_secs = config.position_ttl.as_secs(),
        "courier relay started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shared_state.registry.clone()))
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal(registry: Arc<SessionRegistry>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }

    // Closing the session queues ends every websocket writer.
    registry.shutdown();
}
