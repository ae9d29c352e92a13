use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{ErrorBody, ExecutorApiState};
use crate::strategy::kelly::{size_opportunity, KellyError, KellyResponse};
use crate::types::Opportunity;

#[derive(Debug, Deserialize)]
pub struct KellyRequest {
    pub opportunity: Opportunity,
    pub bankroll: Option<Decimal>,
    pub kelly_fraction: Option<Decimal>,
}

pub async fn calculate_from_opportunity(
    State(state): State<Arc<ExecutorApiState>>,
    Json(payload): Json<KellyRequest>,
) -> Result<Json<KellyResponse>, (StatusCode, Json<ErrorBody>)> {
    let Some(stake_input) = payload.bankroll else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody { error: "bankroll (total stake, for scalp) is required".into() }),
        ));
    };
    let kelly_fraction = payload.kelly_fraction.unwrap_or(state.kelly_config.default_fraction);

    size_opportunity(&payload.opportunity, stake_input, kelly_fraction, &state.kelly_config)
        .map(Json)
        .map_err(kelly_error_response)
}

fn kelly_error_response(e: KellyError) -> (StatusCode, Json<ErrorBody>) {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error: e.to_string() }))
}
