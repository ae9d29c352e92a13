use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use super::{ErrorBody, ExecutorApiState};
use crate::executor::{ExecutorError, PlaceBetRequest, PlaceBetResponse};

pub async fn place_bet(
    State(state): State<Arc<ExecutorApiState>>,
    Json(payload): Json<PlaceBetRequest>,
) -> Result<Json<PlaceBetResponse>, (StatusCode, Json<ErrorBody>)> {
    state.executor.place_bet(payload).await.map(Json).map_err(executor_error_response)
}

fn executor_error_response(e: ExecutorError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &e {
        ExecutorError::UserSettingsMissing(_) => StatusCode::NOT_FOUND,
        ExecutorError::BotUnavailable { .. } => StatusCode::BAD_GATEWAY,
        ExecutorError::TransformFailed(_) | ExecutorError::InsufficientBankroll(_) => StatusCode::BAD_REQUEST,
        ExecutorError::PlacementFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody { error: e.to_string() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_unavailable_maps_to_bad_gateway() {
        let (status, _) = executor_error_response(ExecutorError::BotUnavailable { book_key: "draftkings".into() });
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn user_settings_missing_maps_to_not_found() {
        let (status, _) = executor_error_response(ExecutorError::UserSettingsMissing("user-1".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn placement_failed_maps_to_internal_error() {
        let (status, _) = executor_error_response(ExecutorError::PlacementFailed { attempts: 3, source: "timeout".into() });
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
