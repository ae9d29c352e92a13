//! Normalizer binary: one task per configured sport, all sharing a market
//! cache, sharp-book provider and stream bus connection.

use std::sync::Arc;

use anyhow::Result;
use chrono::Duration as ChronoDuration;
use tokio::sync::watch;
use tracing::info;

use fairline::api::{health_router, HealthState};
use fairline::config::AppConfig;
use fairline::market_cache::MarketCache;
use fairline::normalizer::Normalizer;
use fairline::sharpbooks::SharpBookProvider;
use fairline::storage::Store;
use fairline::streambus::StreamBus;

const CACHE_TTL_MINUTES: i64 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    let cfg = AppConfig::load("config.toml").unwrap_or_else(|_| AppConfig::from_env());
    fairline::init_logging(cfg.log_json);
    info!(sports = ?cfg.sports, "normalizer starting up");

    let bus = Arc::new(StreamBus::connect_with_retry(&cfg.store.redis_url, 10).await?);
    let store = Arc::new(Store::connect_with_retry(&cfg.store.database_url, 10).await?);
    store.migrate().await?;

    let cache = Arc::new(MarketCache::new(ChronoDuration::minutes(CACHE_TTL_MINUTES)));
    let sharp = Arc::new(SharpBookProvider::new(store.clone(), cfg.detection.sharp_books.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let health_state = Arc::new(HealthState::new("fairline-normalizer"));

    let mut tasks = Vec::new();
    for sport_key in cfg.sports.clone() {
        let normalizer = Normalizer::new(
            bus.clone(),
            cache.clone(),
            sharp.clone(),
            format!("normalizer-{sport_key}"),
            health_state.clone(),
        );
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = normalizer.run(&sport_key, shutdown).await {
                tracing::error!(sport_key, error = %e, "normalizer task exited with error");
            }
        }));
    }

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

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}
