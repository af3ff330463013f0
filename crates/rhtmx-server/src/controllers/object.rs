// File: src/controllers/object.rs
// Purpose: REST controller over the object store
//
//  URL                HTTP Verb   Functionality
//  /object            POST        Creating objects
//  /object/:id        GET         Retrieving objects
//  /object/:id        PUT         Updating objects
//  /object            GET         Queries
//  /object/:id        DELETE      Deleting objects

use crate::app::AppState;
use crate::models::Object;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::debug;

pub async fn create(State(state): State<AppState>, Json(object): Json<Object>) -> Response {
    let id = state.objects.add(object).await;
    debug!("Created object {}", id);
    (StatusCode::CREATED, Json(json!({ "object_id": id }))).into_response()
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<Object>> {
    Json(state.objects.all().await)
}

pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.objects.get(&id).await {
        Some(object) => Json(object).into_response(),
        None => not_found(&id),
    }
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(object): Json<Object>,
) -> Response {
    if state.objects.update(&id, object.score, object.player_name).await {
        Json(json!({ "result": "update success!" })).into_response()
    } else {
        not_found(&id)
    }
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if state.objects.delete(&id).await {
        Json(json!({ "result": "delete success!" })).into_response()
    } else {
        not_found(&id)
    }
}

fn not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("object {} does not exist", id) })),
    )
        .into_response()
}
