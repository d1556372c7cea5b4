use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::LaunchRequest,
    routes::AppState,
};

/// Handler for POST /api/v1/launches
///
/// Accepted immediately; the launch is written in the background.
pub async fn record_launch(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<LaunchRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let game_id = request.game_id.trim();
    if game_id.is_empty() {
        return Err(AppError::InvalidInput("game_id must not be empty".to_string()));
    }

    tracing::info!(request_id = %request_id, game_id = %game_id, "Launch reported");
    state.engine.record_launch(game_id);

    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))))
}
