#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use pulsed::backend::HttpBackend;
use pulsed::config::{Args, HubConfig};
use pulsed::metrics::{start_metrics_server, HealthState};
use pulsed::{run, HubState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config: HubConfig = args.clone().into();

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        anyhow::bail!("configuration error: {}", e);
    }

    if args.backend_token.is_empty() {
        warn!("no backend service token configured; backend calls will be unauthenticated");
    }
    let backend = Arc::new(HttpBackend::new(
        args.backend_url.clone(),
        args.backend_token.clone(),
    ));
    info!("using account backend at {}", args.backend_url);

    let state = Arc::new(HubState::new(config.clone(), backend));

    let listener = TcpListener::bind(config.listen).await?;
    info!("bound to {}", config.listen);

    let health_state = HealthState::new();

    tokio::spawn({
        let health_state = health_state.clone();
        async move {
            if let Err(e) = start_metrics_server(config.metrics_addr, health_state).await {
                warn!("metrics server error: {}", e);
            }
        }
    });

    tokio::select! {
        result = run(listener, state) => {
            if let Err(e) = result {
                tracing::error!("hub error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    Ok(())
}
