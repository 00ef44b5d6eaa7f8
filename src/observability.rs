//! Minimal HTTP observability surface: health, statistics, status, and
//! a per-stream inhibit control, nested alongside the subscriber routes
//! on the same listener.
//!
//! The spec treats a full metrics/auth surface as an external
//! collaborator; this wires exactly the handful of read/control
//! operations the core already exposes (`GetGlobalStatistics`,
//! `GetStreamStatistics`, `IsConnected`, `SetInhibit`) onto `axum`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::app::App;
use crate::subscriber;

/// Build the full HTTP router: subscriber fan-out routes for every
/// configured stream, plus the observability/control endpoints.
#[must_use]
pub fn router(app: Arc<App>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/statistics", get(global_statistics))
        .route("/statistics/:path", get(stream_statistics))
        .route("/status/:path", get(stream_status))
        .route("/control/:path/inhibit", post(set_inhibit));

    for path in app.streams.keys() {
        router = router.route(path, get(serve_subscriber));
    }

    router.with_state(app)
}

#[derive(Serialize)]
struct Health {
    ok: bool,
}

async fn health() -> Json<Health> {
    Json(Health { ok: true })
}

async fn global_statistics(State(app): State<Arc<App>>) -> Json<crate::stats::GlobalStatistics> {
    Json(app.stats.global_statistics(app.admission.is_full()))
}

async fn stream_statistics(State(app): State<Arc<App>>, Path(path): Path<String>) -> Response {
    match app.stats.stream_statistics(&leading_slash(&path)) {
        Some(stats) => Json(stats).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Serialize)]
struct StatusBody {
    connected: bool,
}

async fn stream_status(State(app): State<Arc<App>>, Path(path): Path<String>) -> Response {
    match app.stats.is_connected(&leading_slash(&path)) {
        Some(connected) => Json(StatusBody { connected }).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Deserialize)]
struct InhibitBody {
    inhibit: bool,
}

async fn set_inhibit(State(app): State<Arc<App>>, Path(path): Path<String>, Json(body): Json<InhibitBody>) -> StatusCode {
    let Some(handle) = app.streams.get(&leading_slash(&path)) else {
        return StatusCode::NOT_FOUND;
    };
    if body.inhibit {
        handle.broker.inhibit().await;
    } else {
        handle.broker.allow().await;
    }
    StatusCode::NO_CONTENT
}

async fn serve_subscriber(
    State(app): State<Arc<App>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Query(params): Query<HashMap<String, String>>,
    request: axum::extract::Request,
) -> Response {
    let path = request.uri().path();
    let Some(handle) = app.streams.get(path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let credential = params.get("credential").map(String::as_str);
    if !handle.check_credential(credential) {
        return StatusCode::FORBIDDEN.into_response();
    }

    subscriber::serve(remote, handle.broker.clone(), handle.config.output_buffer, Arc::clone(&handle.stats)).await
}

/// Stream paths are stored and looked up with their leading `/`
/// (`"/live"`); axum's `:path` segment extractor strips it, so route
/// handlers that key into `app.streams` by the captured segment must
/// restore it.
fn leading_slash(path: &str) -> String {
    format!("/{path}")
}
