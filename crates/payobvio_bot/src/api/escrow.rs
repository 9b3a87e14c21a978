//! Callbacks from the escrow backend.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::{debug, warn};
use serde_json::json;

use super::respond;
use crate::{
    models::{EscrowAction, EscrowCommand, ReleaseDetail},
    AppState,
};

fn malformed(rejection: JsonRejection) -> Response {
    warn!("Malformed escrow request: {rejection}");
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": rejection.body_text() })),
    )
        .into_response()
}

/// Escrow handling depending on the action (approved/rejected)
pub async fn escrow_set(
    State(state): State<AppState>,
    payload: Result<Json<EscrowCommand>, JsonRejection>,
) -> Response {
    let command = match payload {
        Ok(Json(command)) => command,
        Err(rejection) => return malformed(rejection),
    };
    debug!("Escrow Request Body: {command:?}");

    let outcome = match command.action {
        EscrowAction::Approved => state.coordinator.approve_escrow(&command.detail).await,
        EscrowAction::Rejected => state.coordinator.reject_escrow(&command.detail).await,
    };
    respond(outcome)
}

pub async fn escrow_released(
    State(state): State<AppState>,
    payload: Result<Json<ReleaseDetail>, JsonRejection>,
) -> Response {
    let detail = match payload {
        Ok(Json(detail)) => detail,
        Err(rejection) => return malformed(rejection),
    };

    respond(state.coordinator.finalize_release(&detail).await)
}
