//! Executor binary: serves the Kelly sizer and bet-placement HTTP surface.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use fairline::api::{build_router, ExecutorApiState, HealthState};
use fairline::config::AppConfig;
use fairline::executor::bot_client::BotManagerClient;
use fairline::executor::Executor;
use fairline::storage::Store;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    let cfg = AppConfig::load("config.toml").unwrap_or_else(|_| AppConfig::from_env());
    fairline::init_logging(cfg.log_json);
    info!(port = cfg.health_port, "executor starting up");

    let store = Arc::new(Store::connect_with_retry(&cfg.store.database_url, 10).await?);
    store.migrate().await?;
    let bot = BotManagerClient::new(cfg.external.bot_manager_url.clone())?;
    let executor = Arc::new(Executor::new(store, bot, cfg.retry.clone()));

    let state = Arc::new(ExecutorApiState { executor, kelly_config: cfg.kelly.clone() });
    let health_state = Arc::new(HealthState::new("fairline-executor"));
    let app = build_router(state, health_state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.health_port)).await?;
    info!(port = cfg.health_port, "executor listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
