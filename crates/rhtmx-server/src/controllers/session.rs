// File: src/controllers/session.rs
// Purpose: Handlers exercising the session subsystem

use super::error_response;
use crate::app::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use rhtmx_session::Session;
use serde_json::json;
use tracing::error;

/// Count visits in the current session
pub async fn visits(State(state): State<AppState>, session: Session) -> Response {
    let count = session.get::<u64>("visits").await.unwrap_or(0) + 1;
    if let Err(e) = session.set("visits", count).await {
        error!("Failed to store visit count: {}", e);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "could not update session");
    }

    let mut body = json!({ "visits": count });
    // With client-side storage the id is the sealed cookie itself
    if !state.manager.provider().manages_cookie() {
        body["session_id"] = json!(session.id());
    }

    Json(body).into_response()
}

/// Move the session to a fresh id once the request finishes
pub async fn regenerate(session: Session) -> Json<serde_json::Value> {
    session.regenerate_id();
    Json(json!({ "result": "regenerated" }))
}

/// Drop the session and expire its cookie
pub async fn destroy(session: Session) -> Json<serde_json::Value> {
    session.invalidate();
    Json(json!({ "result": "destroyed" }))
}

pub async fn active(State(state): State<AppState>) -> Response {
    match state.manager.active_sessions().await {
        Ok(count) => Json(json!({ "active": count, "provider": state.manager.provider().name() }))
            .into_response(),
        Err(e) => {
            error!("Failed to count sessions: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "could not count sessions")
        }
    }
}
