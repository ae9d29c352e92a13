//! Alert binary: one pipeline consuming the combined opportunities stream,
//! plus the token-bucket refiller running alongside it from boot.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use fairline::alerts::AlertPipeline;
use fairline::api::{health_router, HealthState};
use fairline::config::AppConfig;
use fairline::streambus::StreamBus;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    let cfg = AppConfig::load("config.toml").unwrap_or_else(|_| AppConfig::from_env());
    fairline::init_logging(cfg.log_json);
    info!("alert pipeline starting up");

    let bus = Arc::new(StreamBus::connect_with_retry(&cfg.store.redis_url, 10).await?);
    let health_state = Arc::new(HealthState::new("fairline-alerts"));
    let pipeline = Arc::new(AlertPipeline::new(bus, cfg.alerts.clone(), "alerts-1".to_string(), health_state.clone())?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let rate_limiter = pipeline.rate_limiter();
    let refiller = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { rate_limiter.run_refiller(shutdown).await }
    });

    let pipeline_task = tokio::spawn({
        let pipeline = pipeline.clone();
        let shutdown = shutdown_rx.clone();
        async move {
            if let Err(e) = pipeline.run(shutdown).await {
                tracing::error!(error = %e, "alert pipeline exited with error");
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

    let _ = pipeline_task.await;
    let _ = refiller.await;
    Ok(())
}
