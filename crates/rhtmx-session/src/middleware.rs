//! Axum integration: session middleware and `Session` extractor
//!
//! ```rust,no_run
//! use axum::{middleware, routing::get, Router};
//! use rhtmx_session::{session_layer, Manager, ManagerConfig, Session};
//!
//! async fn visits(session: Session) -> String {
//!     let count = session.get::<u64>("visits").await.unwrap_or(0) + 1;
//!     session.set("visits", count).await.ok();
//!     format!("visit #{}", count)
//! }
//!
//! # async fn build() -> Router {
//! let manager = Manager::new(ManagerConfig::default()).await.unwrap();
//! Router::new()
//!     .route("/", get(visits))
//!     .layer(middleware::from_fn_with_state(manager, session_layer))
//! # }
//! ```

use crate::manager::Manager;
use crate::session::{Lifecycle, Session};
use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use tracing::error;

/// Start a session before the handler runs and finish it afterwards.
///
/// The session is available to handlers through the `Session` extractor.
/// After the handler returns, the session is released, moved to a new id or
/// destroyed depending on what the handler asked for.
pub async fn session_layer(State(manager): State<Manager>, mut request: Request, next: Next) -> Response {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let mut cookies = HeaderMap::new();
    let session = match manager
        .session_start(request.headers(), remote_addr, &mut cookies)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to start session: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    request.extensions_mut().insert(session.clone());
    let mut response = next.run(request).await;

    let finished = match session.lifecycle() {
        Lifecycle::Active => manager.session_release(&session, &mut cookies).await,
        Lifecycle::Regenerate => {
            cookies.remove(SET_COOKIE);
            manager
                .regenerate_session(&session, remote_addr, &mut cookies)
                .await
                .map(|_| ())
        }
        Lifecycle::Destroyed => {
            cookies.remove(SET_COOKIE);
            manager.destroy_session(&session, &mut cookies).await
        }
    };

    if let Err(e) = finished {
        error!("Failed to finish session: {}", e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let headers = response.headers_mut();
    for value in cookies.get_all(SET_COOKIE) {
        headers.append(SET_COOKIE, value.clone());
    }

    response
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "session middleware is not installed",
        ))
    }
}
