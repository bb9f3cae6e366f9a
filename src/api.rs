//! HTTP API — mounts the videos plugin the way the dashboard host does.
//!
//! Endpoints:
//!   GET  /data/plugins_listing                                  → plugin listing (JSON)
//!   GET  /data/plugin/videos/tags                               → run → tag → info (JSON)
//!   GET  /data/plugin/videos/videos?run=&tag=&sample=&batch_size=  → per-step entries (JSON)
//!   GET  /data/plugin/videos/individualVideo?blob_key=&track_number=  → video/mp4
//!   GET  /data/plugin/videos/index.js                           → frontend bundle

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::error::PluginError;
use crate::metadata::PLUGIN_NAME;
use crate::plugin::{TbPlugin, VideosPlugin, VIDEO_MIMETYPE};

/// Experiment served by the standalone server.
pub const DEFAULT_EXPERIMENT: &str = "";

static INDEX_JS: &str = include_str!("../static/index.js");

// ──────────────── request types ───────────────────────────────────────────

// Parameters stay strings so malformed values get the plain-text 400 below
// instead of axum's rejection.
#[derive(Deserialize)]
pub struct VideosParams {
    run: Option<String>,
    tag: Option<String>,
    sample: Option<String>,
    batch_size: Option<String>,
}

#[derive(Deserialize)]
pub struct IndividualVideoParams {
    blob_key: Option<String>,
    track_number: Option<String>,
}

// ──────────────── router ──────────────────────────────────────────────────

/// The plugin's own routes, relative to its mount point.
pub fn plugin_router(plugin: Arc<VideosPlugin>) -> Router {
    Router::new()
        .route("/index.js", get(handle_index_js))
        .route("/videos", get(handle_videos))
        .route("/individualVideo", get(handle_individual_video))
        .route("/tags", get(handle_tags))
        .with_state(plugin)
}

/// Build the full router with the plugin mounted under `/data/plugin/videos`.
pub fn build_router(plugin: Arc<VideosPlugin>) -> Router {
    let mount = format!("/data/plugin/{PLUGIN_NAME}");
    Router::new()
        .route("/data/plugins_listing", get(handle_plugins_listing))
        .with_state(plugin.clone())
        .nest(&mount, plugin_router(plugin))
        .layer(CorsLayer::permissive())
}

/// Start the HTTP server.
pub async fn start_server(plugin: Arc<VideosPlugin>, port: u16) {
    let app = build_router(plugin);
    let addr = format!("0.0.0.0:{}", port);
    info!(port, "HTTP API listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, "Failed to bind HTTP server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "HTTP server error");
    }
}

// ──────────────── handlers ────────────────────────────────────────────────

async fn handle_plugins_listing(State(plugin): State<Arc<VideosPlugin>>) -> impl IntoResponse {
    let mut listing = serde_json::Map::new();
    listing.insert(
        plugin.plugin_name().to_string(),
        serde_json::json!({
            "enabled": plugin.is_active(),
            "es_module_path": plugin.frontend_metadata().es_module_path,
        }),
    );
    axum::Json(serde_json::Value::Object(listing))
}

async fn handle_index_js() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "text/javascript")], INDEX_JS)
}

async fn handle_tags(State(plugin): State<Arc<VideosPlugin>>) -> Response {
    match plugin.index_impl(DEFAULT_EXPERIMENT) {
        Ok(index) => (StatusCode::OK, axum::Json(index)).into_response(),
        Err(e) => server_error(e),
    }
}

async fn handle_videos(
    State(plugin): State<Arc<VideosPlugin>>,
    Query(params): Query<VideosParams>,
) -> Response {
    const INVALID: &str = "Invalid run or tag";

    let (Some(run), Some(tag)) = (params.run, params.tag) else {
        return bad_request(INVALID);
    };
    let Ok(sample) = parse_optional(params.sample.as_deref()).map(|s| s.unwrap_or(0)) else {
        return bad_request(INVALID);
    };
    let Ok(batch_size) = parse_optional(params.batch_size.as_deref()) else {
        return bad_request(INVALID);
    };

    match plugin.video_response_for_run(DEFAULT_EXPERIMENT, &run, &tag, sample, batch_size) {
        Ok(entries) => (StatusCode::OK, axum::Json(entries)).into_response(),
        Err(e) if e.is_client_error() => {
            info!(run, tag, error = %e, "Rejected video metadata request");
            bad_request(INVALID)
        }
        Err(e) => server_error(e),
    }
}

async fn handle_individual_video(
    State(plugin): State<Arc<VideosPlugin>>,
    Query(params): Query<IndividualVideoParams>,
) -> Response {
    const INVALID: &str = "Invalid run, tag, index, or sample";

    let Some(blob_key) = params.blob_key else {
        return bad_request(INVALID);
    };
    let Ok(track_number) = parse_optional(params.track_number.as_deref()) else {
        return bad_request(INVALID);
    };

    match plugin.individual_video(&blob_key, track_number).await {
        Ok(data) => (
            StatusCode::OK,
            [("content-type", VIDEO_MIMETYPE)],
            data,
        ).into_response(),
        Err(e) if e.is_client_error() => {
            info!(blob_key, error = %e, "Rejected video request");
            bad_request(INVALID)
        }
        Err(e) => server_error(e),
    }
}

// ──────────────── helpers ─────────────────────────────────────────────────

fn parse_optional(raw: Option<&str>) -> Result<Option<usize>, std::num::ParseIntError> {
    raw.map(str::parse).transpose()
}

fn bad_request(message: &'static str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        [("content-type", "text/plain")],
        message,
    ).into_response()
}

fn server_error(e: PluginError) -> Response {
    error!(error = %e, "Request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [("content-type", "text/plain")],
        e.to_string(),
    ).into_response()
}
