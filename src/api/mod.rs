//! HTTP surface for the executor binary: the Kelly sizer and bet-placement
//! endpoints share one axum router, plus the ambient `/health` every binary in
//! this pipeline exposes.

pub mod executor_routes;
pub mod kelly_routes;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::KellyConfig;
use crate::executor::Executor;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub struct ExecutorApiState {
    pub executor: Arc<Executor>,
    pub kelly_config: KellyConfig,
}

/// Tracked by whichever long-running loop this binary runs, so `/health` can report
/// whether the process is actually making progress rather than just alive.
pub struct HealthState {
    pub process_name: &'static str,
    pub started_at: Instant,
    pub last_successful_iteration: RwLock<Option<DateTime<Utc>>>,
}

impl HealthState {
    pub fn new(process_name: &'static str) -> Self {
        Self {
            process_name,
            started_at: Instant::now(),
            last_successful_iteration: RwLock::new(None),
        }
    }

    pub async fn record_iteration(&self) {
        *self.last_successful_iteration.write().await = Some(Utc::now());
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    process: &'static str,
    uptime_secs: u64,
    last_successful_iteration: Option<DateTime<Utc>>,
}

async fn health(State(state): State<Arc<HealthState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        process: state.process_name,
        uptime_secs: state.started_at.elapsed().as_secs(),
        last_successful_iteration: *state.last_successful_iteration.read().await,
    })
}

/// The ambient `/health` route, usable standalone by every non-HTTP binary.
pub fn health_router(state: Arc<HealthState>) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// The executor binary's full router: Kelly sizer + bet placement + health.
pub fn build_router(state: Arc<ExecutorApiState>, health_state: Arc<HealthState>) -> Router {
    let api = Router::new()
        .route("/api/v1/calculate-from-opportunity", post(kelly_routes::calculate_from_opportunity))
        .route("/api/v1/place-bet", post(executor_routes::place_bet))
        .with_state(state);

    Router::new().merge(api).merge(health_router(health_state))
}
