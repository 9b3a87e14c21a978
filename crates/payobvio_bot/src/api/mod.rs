pub mod escrow;
pub mod webhook;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::{models::Outcome, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(hello))
        .route("/health", get(health))
        .route("/webhook", post(webhook::github_webhook))
        .route(
            "/escrow",
            post(escrow::escrow_set).fallback(not_found),
        )
        .route(
            "/escrow-released",
            post(escrow::escrow_released).fallback(not_found),
        )
}

async fn hello() -> Json<serde_json::Value> {
    Json(json!({ "message": "Hello World" }))
}

async fn health() -> &'static str {
    "health!"
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" }))).into_response()
}

/// 400 with `{error}` for failed actions, 200 with `{message}` otherwise.
pub(crate) fn respond(outcome: Outcome) -> Response {
    if outcome.error {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": outcome.message }))).into_response()
    } else {
        (StatusCode::OK, Json(json!({ "message": outcome.message }))).into_response()
    }
}
