// File: src/controllers/chat.rs
// Purpose: Landing page showing the host the request was addressed to

use axum::http::header::HOST;
use axum::http::HeaderMap;
use axum::response::Html;
use maud::{html, Markup, DOCTYPE};

pub async fn index(headers: HeaderMap) -> Html<String> {
    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");

    Html(render_index(host).into_string())
}

fn render_index(host: &str) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                title { "RHTMX Chat" }
            }
            body {
                h1 { "Welcome to RHTMX Chat" }
                p { "Serving " strong { (host) } }
                ul {
                    li { a href="/session" { "Session visit counter" } }
                    li { a href="/session/active" { "Active sessions" } }
                    li { a href="/object" { "Objects" } }
                }
            }
        }
    }
}
