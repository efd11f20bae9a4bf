//! # HTTP Routes
//!
//! Every route is mounted under the configured base path:
//!
//! - `POST /heartbeat`, `GET /heartbeats`, `DELETE /heartbeats/{name}`
//! - `GET /events`: Server-Sent Events carrying the rendered device table
//! - `GET /web`, `/web/devices`, `/web/configured-notifications`, `/web/{*path}`
//! - `GET /up`, and `/` redirecting to `/web`

use std::convert::Infallible;
use std::path::{Component, Path as FsPath};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use super::error::{ApiError, INVALID_NAME};
use super::render;
use super::state::AppState;

/// Comment frames sent on idle SSE streams. A viewer that went away is
/// noticed on a failed write, so this bounds how long it stays registered.
pub const SSE_KEEP_ALIVE: Duration = Duration::from_secs(2);

pub fn router(state: AppState) -> Router {
    let base = state.base_path();

    let mut app = Router::new()
        .route(&format!("{base}/events"), get(events))
        .route(&format!("{base}/heartbeat"), post(heartbeat))
        .route(&format!("{base}/heartbeats"), get(list_heartbeats))
        .route(&format!("{base}/heartbeats/"), delete(delete_without_name))
        .route(&format!("{base}/heartbeats/{{name}}"), delete(delete_heartbeat))
        .route(&format!("{base}/web"), get(index))
        .route(&format!("{base}/web/devices"), get(devices_placeholder))
        .route(&format!("{base}/web/configured-notifications"), get(configured_notifications))
        .route(&format!("{base}/web/{{*path}}"), get(static_file))
        .route(&format!("{base}/up"), get(up))
        .route(&format!("{base}/"), get(to_web));
    if !base.is_empty() {
        app = app.route(&base, get(to_web));
    }

    app.fallback(not_found).with_state(state)
}

#[derive(Deserialize)]
struct HeartbeatRequest {
    #[serde(default)]
    name: String,
}

async fn heartbeat(State(state): State<AppState>, body: Bytes) -> Result<&'static str, ApiError> {
    let request: HeartbeatRequest =
        serde_json::from_slice(&body).map_err(|_| ApiError::BadRequest(INVALID_NAME))?;
    info!(client = %request.name, "Received heartbeat");
    state.monitor.record_heartbeat(&request.name).await?;
    Ok("OK")
}

async fn list_heartbeats(State(state): State<AppState>) -> Result<Response, ApiError> {
    let clients = state.monitor.clients().await?;
    Ok(Json(clients).into_response())
}

async fn delete_heartbeat(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<&'static str, ApiError> {
    if name.is_empty() {
        return Err(ApiError::BadRequest("Missing device name"));
    }
    state.monitor.delete_client(&name).await?;
    Ok("OK")
}

async fn delete_without_name() -> ApiError {
    ApiError::BadRequest("Missing device name")
}

/// # Live Events
///
/// The first event is the current table; every publish after that produces
/// another. The stream ends when the viewer disconnects (dropping the
/// subscription) or the server shuts down.
async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.monitor.subscribe().await;
    debug!(subscriber = subscription.id(), "SSE stream opened");

    let updates = stream::unfold(subscription, |mut subscription| async move {
        let snapshot = subscription.recv().await?;
        let event = Event::default().data(render::device_table(&snapshot));
        Some((Ok(event), subscription))
    });

    Sse::new(updates.take_until(state.shutdown.clone().cancelled_owned()))
        .keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE))
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let path = state.config.web_dir.join("index.html");
    let page = tokio::fs::read_to_string(&path)
        .await
        .map_err(|_| ApiError::Internal("index.html not found".to_string()))?;
    let tag = format!("<body data-base-path='{}'>", render::escape_html(&state.base_path()));
    Ok(Html(page.replacen("<body>", &tag, 1)))
}

async fn devices_placeholder() -> Html<&'static str> {
    Html("<div id='device-table'></div>")
}

async fn configured_notifications(State(state): State<AppState>) -> Html<String> {
    Html(render::configured_notifications(&state.config.notification_channels))
}

async fn static_file(State(state): State<AppState>, Path(path): Path<String>) -> Result<Response, ApiError> {
    let relative = safe_relative(&path).ok_or(ApiError::NotFound)?;
    let full = state.config.web_dir.join(relative);
    let bytes = tokio::fs::read(&full).await.map_err(|_| ApiError::NotFound)?;
    Ok(([(header::CONTENT_TYPE, content_type(&full))], bytes).into_response())
}

/// Accepts only plain relative paths: no root and no `..`.
fn safe_relative(path: &str) -> Option<&FsPath> {
    let relative = FsPath::new(path);
    let plain = relative.components().all(|c| matches!(c, Component::Normal(_)));
    (plain && !path.is_empty()).then_some(relative)
}

fn content_type(path: &FsPath) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or_default() {
        "html" | "htm" => "text/html; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "ico" => "image/x-icon",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

async fn up() -> &'static str {
    "ok"
}

async fn to_web(State(state): State<AppState>) -> Response {
    let location = format!("{}/web", state.base_path());
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_is_rejected() {
        assert!(safe_relative("htmx.js").is_some());
        assert!(safe_relative("css/site.css").is_some());
        assert!(safe_relative("../Cargo.toml").is_none());
        assert!(safe_relative("css/../../secret").is_none());
        assert!(safe_relative("/etc/passwd").is_none());
        assert!(safe_relative("").is_none());
    }

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type(FsPath::new("htmx.js")), "text/javascript; charset=utf-8");
        assert_eq!(content_type(FsPath::new("a/b/style.css")), "text/css; charset=utf-8");
        assert_eq!(content_type(FsPath::new("blob")), "application/octet-stream");
    }
}
