use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::AppState;
use crate::error::AppError;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once the database answers a round trip.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state
        .health
        .ping(&state.context())
        .await
        .map_err(|e| AppError::Unavailable(format!("database not ready: {}", e)))?;
    Ok(Json(serde_json::json!({"status": "ready"})))
}

pub async fn heartbeat() -> StatusCode {
    StatusCode::NO_CONTENT
}
