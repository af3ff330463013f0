// File: src/controllers/mod.rs
// Purpose: Request handlers for the reference server

pub mod chat;
pub mod object;
pub mod session;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

/// HTML error page
pub fn error_response(status: StatusCode, message: &str) -> Response {
    let title = status.canonical_reason().unwrap_or("Error");
    let markup = maud::html! {
        (maud::DOCTYPE)
        html {
            head { title { (title) } }
            body {
                h1 { (status.as_u16()) " " (title) }
                p { (message) }
                a href="/" { "Go Home" }
            }
        }
    };
    (status, Html(markup.into_string())).into_response()
}
