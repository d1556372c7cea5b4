use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::{
    error::AppResult,
    middleware::RequestId,
    models::{SessionEnd, SessionId, SessionUpdateOutcome},
    routes::AppState,
};

/// Handler for POST /api/v1/sessions
pub async fn session_ended(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(session): Json<SessionEnd>,
) -> AppResult<Json<SessionUpdateOutcome>> {
    tracing::info!(
        request_id = %request_id,
        game_id = %session.game_id,
        duration_seconds = session.duration_seconds,
        "Session ended"
    );

    let outcome = state.engine.update_from_session(session).await?;
    Ok(Json(outcome))
}

/// Handler for POST /api/v1/sessions/:id/reward
pub async fn reward_session(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<SessionId>,
) -> AppResult<Json<SessionUpdateOutcome>> {
    tracing::info!(request_id = %request_id, session_id = id, "Rewarding recorded session");

    let outcome = state.engine.update_from_session_id(id).await?;
    Ok(Json(outcome))
}
