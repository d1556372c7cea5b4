use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Extension, Json,
};

use crate::{
    error::AppResult,
    middleware::RequestId,
    models::{RecommendationQuery, RecommendationResponse},
    routes::AppState,
};

/// Handler for GET /api/v1/recommendations
pub async fn recommend(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<RecommendationQuery>,
) -> AppResult<Json<RecommendationResponse>> {
    let settings = state.engine.settings();
    let count = query.count.unwrap_or(settings.default_count);
    let alpha = query.alpha.unwrap_or(settings.exploration_alpha);
    let diversity = query.diversity.unwrap_or(settings.diversity_factor);

    tracing::info!(
        request_id = %request_id,
        count,
        alpha,
        diversity,
        "Processing recommendation request"
    );

    let recommendations = state.engine.recommend(count, alpha, diversity).await?;

    Ok(Json(RecommendationResponse { recommendations }))
}
