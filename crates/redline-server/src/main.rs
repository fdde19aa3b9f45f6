use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use redline_core::config::Config;
use redline_server::{app, logging::BroadcastLayer, AppState};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (log_tx, _log_rx) = broadcast::channel::<String>(256);
    let log_ring = Arc::new(Mutex::new(VecDeque::new()));

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "redline_server=info,redline_core=info,redline_agent=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(BroadcastLayer {
            tx: log_tx.clone(),
            ring: Arc::clone(&log_ring),
        })
        .init();

    let config = Config::from_env()?;
    std::fs::create_dir_all(&config.data_dir)?;

    let addr = format!("{}:{}", config.web_bind, config.web_port);
    let default_provider = config.provider;
    let state = Arc::new(AppState::new(config, log_tx, log_ring)?);

    match state.remembered() {
        Some(saved) => info!(provider = %saved.provider, "loaded saved provider settings"),
        None => info!(provider = %default_provider, "no saved provider settings"),
    }

    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
