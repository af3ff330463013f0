// File: src/app.rs
// Purpose: Application state and router

use crate::controllers::{chat, object, session};
use crate::models::ObjectStore;
use axum::routing::{get, post};
use axum::{middleware, Router};
use rhtmx_session::{session_layer, Manager};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Manager,
    pub objects: ObjectStore,
}

impl AppState {
    pub fn new(manager: Manager) -> Self {
        Self {
            manager,
            objects: ObjectStore::new(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(chat::index))
        .route("/object", get(object::list).post(object::create))
        .route(
            "/object/:id",
            get(object::show).put(object::update).delete(object::delete),
        )
        .route("/session", get(session::visits))
        .route("/session/regenerate", post(session::regenerate))
        .route("/session/destroy", post(session::destroy))
        .route("/session/active", get(session::active))
        .layer(middleware::from_fn_with_state(
            state.manager.clone(),
            session_layer,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
