//! CLV binary: consumes captured closing lines and records bet performance.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use fairline::api::{health_router, HealthState};
use fairline::clv::ClvCalculator;
use fairline::config::AppConfig;
use fairline::storage::Store;
use fairline::streambus::StreamBus;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    let cfg = AppConfig::load("config.toml").unwrap_or_else(|_| AppConfig::from_env());
    fairline::init_logging(cfg.log_json);
    info!("CLV calculator starting up");

    let bus = Arc::new(StreamBus::connect_with_retry(&cfg.store.redis_url, 10).await?);
    let store = Arc::new(Store::connect_with_retry(&cfg.store.database_url, 10).await?);
    store.migrate().await?;

    let health_state = Arc::new(HealthState::new("fairline-clv"));
    let calculator = ClvCalculator::new(bus, store, "clv-1".to_string(), health_state.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let clv_task = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move {
            if let Err(e) = calculator.run(shutdown).await {
                tracing::error!(error = %e, "CLV calculator exited with error");
            }
        }
    });

    let health_server = tokio::spawn({
        let health_state = health_state.clone();
        let port = cfg.health_port;
        async move {
            let app = health_router(health_state);
            let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await.unwrap();
            axum::serve(listener, app).await.unwrap();
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    health_server.abort();

    let _ = clv_task.await;
    Ok(())
}
