//! Settlement binary: polls pending bets and grades finished events.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use fairline::api::{health_router, HealthState};
use fairline::config::AppConfig;
use fairline::settlement::score_client::ScoreClient;
use fairline::settlement::Settlement;
use fairline::storage::Store;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    let cfg = AppConfig::load("config.toml").unwrap_or_else(|_| AppConfig::from_env());
    fairline::init_logging(cfg.log_json);
    info!(poll_interval = ?cfg.settlement.poll_interval, "settlement starting up");

    let store = Arc::new(Store::connect_with_retry(&cfg.store.database_url, 10).await?);
    store.migrate().await?;
    let scores = ScoreClient::new(cfg.external.score_api_url.clone(), cfg.external.score_api_key.clone())?;
    let health_state = Arc::new(HealthState::new("fairline-settlement"));
    let settlement = Settlement::new(store, scores, health_state.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let settlement_task = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        let poll_interval = cfg.settlement.poll_interval;
        async move {
            if let Err(e) = settlement.run(poll_interval, shutdown).await {
                tracing::error!(error = %e, "settlement loop exited with error");
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

    let _ = settlement_task.await;
    Ok(())
}
