//! GitHub webhook ingress

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use log::{info, warn};
use serde_json::json;

use crate::{
    events::{self, WebhookEvent},
    signature, AppState,
};

pub async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &state.webhook_secret {
        let provided = header(&headers, "X-Hub-Signature-256").unwrap_or_default();
        if !signature::verify_signature(secret, &body, provided) {
            warn!("Rejected webhook with invalid signature");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid signature" })),
            )
                .into_response();
        }
    }

    let Some(event_name) = header(&headers, "X-GitHub-Event") else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing X-GitHub-Event header" })),
        )
            .into_response();
    };

    let event = match WebhookEvent::parse(event_name, &body) {
        Ok(event) => event,
        Err(e) => {
            warn!("{event_name}: {e:#}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("{e:#}") })),
            )
                .into_response();
        },
    };
    info!("github hook called: {event_name}");

    // deliveries are acknowledged either way, github has no use for our outcome
    let message = match events::handle_event(&state.coordinator, event).await {
        Some(outcome) => outcome.message,
        None => "Ignored".to_owned(),
    };
    (StatusCode::OK, Json(json!({ "message": message }))).into_response()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
