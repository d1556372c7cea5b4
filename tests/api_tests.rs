use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use playnext_api::{
    error::{AppError, AppResult},
    models::{InstalledGame, SessionRecord},
    routes::{create_router, AppState},
    services::{
        providers::{
            memory::{InMemoryCatalog, InMemoryLaunchLog, InMemorySessions, InMemoryStore},
            CatalogProvider,
        },
        EngineSettings, RecommendationEngine,
    },
};

struct BrokenCatalog;

#[async_trait::async_trait]
impl CatalogProvider for BrokenCatalog {
    async fn list_installed_games(&self) -> AppResult<Vec<InstalledGame>> {
        Err(AppError::Internal("launcher database offline".to_string()))
    }
}

fn games() -> Vec<InstalledGame> {
    vec![
        InstalledGame::new("celeste").with_genres(["Platformer"]),
        InstalledGame::new("hades").with_genres(["Roguelike"]),
        InstalledGame::new("factorio").with_genres(["Automation"]),
    ]
}

fn history() -> Vec<SessionRecord> {
    vec![SessionRecord {
        id: 7,
        game_id: "hades".to_string(),
        started_at: Utc.with_ymd_and_hms(2024, 4, 6, 20, 0, 0).unwrap(),
        duration_seconds: Some(2 * 60 * 60),
    }]
}

fn create_test_app_with(catalog: Arc<dyn CatalogProvider>) -> Router {
    let engine = RecommendationEngine::new(
        catalog,
        Arc::new(InMemorySessions::new(history())),
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryLaunchLog::new()),
        EngineSettings::default(),
    );
    create_router(Arc::new(AppState::new(Arc::new(engine))))
}

fn create_test_app() -> Router {
    create_test_app_with(Arc::new(InMemoryCatalog::new(games())))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let response = create_test_app().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_recommendations_return_breakdown() {
    let response = create_test_app()
        .oneshot(get("/api/v1/recommendations?count=2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = body_json(response).await;
    let recommendations = body["recommendations"].as_array().unwrap();
    assert_eq!(recommendations.len(), 2);
    for rec in recommendations {
        assert!(rec["game_id"].is_string());
        assert!(rec["score"].is_number());
        assert!(rec["ucb_score"].is_number());
        assert!(rec["uncertainty"].is_number());
        assert_eq!(rec["cold_start"], true);
        assert_eq!(rec["numerical_fallback"], false);
    }
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "launcher-abc")
        .body(Body::empty())
        .unwrap();
    let response = create_test_app().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "launcher-abc");
}

#[tokio::test]
async fn test_invalid_query_parameters_are_rejected() {
    for uri in [
        "/api/v1/recommendations?count=0",
        "/api/v1/recommendations?count=500",
        "/api/v1/recommendations?diversity=1.5",
        "/api/v1/recommendations?alpha=-2",
    ] {
        let response = create_test_app().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn test_catalog_failure_is_service_unavailable() {
    let response = create_test_app_with(Arc::new(BrokenCatalog))
        .oneshot(get("/api/v1/recommendations"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn test_launch_is_accepted() {
    let response = create_test_app()
        .oneshot(post_json("/api/v1/launches", json!({ "game_id": "celeste" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = create_test_app()
        .oneshot(post_json("/api/v1/launches", json!({ "game_id": "  " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_session_end_updates_arm() {
    let app = create_test_app();
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/sessions",
            json!({
                "game_id": "factorio",
                "started_at": "2024-04-07T10:00:00Z",
                "duration_seconds": 4 * 60 * 60
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["game_id"], "factorio");
    assert_eq!(body["reward"], 1.0);

    let response = app
        .oneshot(get("/api/v1/recommendations?count=3&alpha=0"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["recommendations"][0]["game_id"], "factorio");
    assert_eq!(body["recommendations"][0]["cold_start"], false);
}

#[tokio::test]
async fn test_session_for_unknown_game_is_not_found() {
    let response = create_test_app()
        .oneshot(post_json(
            "/api/v1/sessions",
            json!({
                "game_id": "uninstalled",
                "started_at": "2024-04-07T10:00:00Z",
                "duration_seconds": 900
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reward_recorded_session() {
    let app = create_test_app();
    let response = app
        .clone()
        .oneshot(post_json("/api/v1/sessions/7/reward", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["game_id"], "hades");

    let response = app
        .oneshot(post_json("/api/v1/sessions/99/reward", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
