use anyhow::Context;
use event_bus::{EventBus, InMemoryBus, NatsBus};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use tickets_rs::{
    clients::HttpClients,
    config::{BusType, Config},
    db, Collaborators, Service,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting tickets service...");

    let config = Config::from_env()
        .map_err(anyhow::Error::msg)
        .context("loading configuration")?;

    tracing::info!(
        host = %config.host,
        port = config.port,
        bus_type = ?config.bus_type,
        "Configuration loaded"
    );

    tracing::info!("Connecting to database...");
    let pool = db::init_pool(&config.database_url)
        .await
        .context("connecting to database")?;

    tracing::info!("Running migrations...");
    db::migrate(&pool).await.context("running migrations")?;

    let bus: Arc<dyn EventBus> = match config.bus_type {
        BusType::InMemory => {
            tracing::info!("Using InMemory event bus");
            Arc::new(InMemoryBus::new())
        }
        BusType::Nats => {
            tracing::info!(nats_url = %config.nats_url, "Connecting to NATS");
            let client = async_nats::connect(&config.nats_url)
                .await
                .context("connecting to NATS")?;
            Arc::new(NatsBus::new(client))
        }
    };

    let clients = HttpClients::new(config.gateway_url.clone()).context("building HTTP clients")?;
    let service = Service::new(config, pool, bus, Collaborators::http(clients))
        .context("registering handlers")?;

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    service.run(token).await
}

async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    token.cancel();
}
