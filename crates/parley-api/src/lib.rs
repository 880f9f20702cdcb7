use axum::{routing::get, routing::post, Json, Router};
use parley_core::AppState;
use serde_json::json;

pub mod error;
pub mod middleware;
pub mod routes;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/interviews",
            post(routes::interviews::create_interview).get(routes::interviews::list_interviews),
        )
        .route(
            "/api/v1/interviews/{interview_id}/scores",
            get(routes::interviews::get_interview_scores),
        )
        .route(
            "/api/v1/interviews/{interview_id}/evaluation",
            get(routes::evaluation::get_interview_evaluation),
        )
        .route(
            "/api/v1/evaluation/overview",
            get(routes::evaluation::get_user_overview),
        )
        .route(
            "/api/v1/coding-problems",
            get(routes::problems::list_problems),
        )
        .route(
            "/api/v1/coding-problems/{problem_id}",
            get(routes::problems::get_problem),
        )
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
