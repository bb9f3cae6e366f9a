//! HTTP surface tests, driving the router in-process.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use video_plugin::api::build_router;
use video_plugin::demux::Demuxer;
use video_plugin::metadata::create_summary_metadata;
use video_plugin::plugin::{PluginContext, VideosPlugin};
use video_plugin::provider::TimeSeriesSink;
use video_plugin::storage::LocalStore;

fn app() -> (TempDir, Router) {
    let dir = tempfile::tempdir().expect("create tempdir");
    let store = Arc::new(LocalStore::open(dir.path()).expect("open store"));
    let md = create_summary_metadata("rollouts", "", false);
    for step in 0..3 {
        let values = vec![
            b"32".to_vec(),
            b"24".to_vec(),
            b"4".to_vec(),
            format!("clip-{step}").into_bytes(),
        ];
        store
            .write_blob_sequence("train", "rollouts", step, step as f64, &md, &values)
            .expect("write");
    }
    let plugin = VideosPlugin::new(PluginContext {
        sampling_hints: HashMap::new(),
        data_provider: store,
    })
    .with_demuxer(Demuxer::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe"));
    (dir, build_router(Arc::new(plugin)))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, String, Vec<u8>) {
    let resp = app
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .expect("response");
    let status = resp.status();
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec();
    (status, content_type, body)
}

async fn first_query(app: &Router) -> String {
    let (_, _, body) = get(app, "/data/plugin/videos/videos?run=train&tag=rollouts").await;
    let entries: serde_json::Value = serde_json::from_slice(&body).expect("json");
    entries[0]["query"].as_str().expect("query").to_string()
}

#[tokio::test]
async fn test_tags() {
    let (_dir, app) = app();
    let (status, content_type, body) = get(&app, "/data/plugin/videos/tags").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("application/json"));
    let tags: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(tags["train"]["rollouts"]["displayName"], "rollouts");
    assert_eq!(tags["train"]["rollouts"]["samples"], 1);
}

#[tokio::test]
async fn test_videos() {
    let (_dir, app) = app();
    let (status, _, body) = get(&app, "/data/plugin/videos/videos?run=train&tag=rollouts&sample=0").await;
    assert_eq!(status, StatusCode::OK);
    let entries: serde_json::Value = serde_json::from_slice(&body).expect("json");
    let entries = entries.as_array().expect("array");
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2]["step"], 2);
    assert!(entries[2]["query"].as_str().unwrap().starts_with("blob_key="));
    assert!(entries[2].get("batch_size").is_none());

    let (status, _, body) =
        get(&app, "/data/plugin/videos/videos?run=train&tag=rollouts&batch_size=0").await;
    assert_eq!(status, StatusCode::OK);
    let entries: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(entries[0]["batch_size"], 32);
}

#[tokio::test]
async fn test_videos_bad_requests() {
    let (_dir, app) = app();
    for uri in [
        "/data/plugin/videos/videos?run=train",
        "/data/plugin/videos/videos?run=train&tag=missing",
        "/data/plugin/videos/videos?run=missing&tag=rollouts",
        "/data/plugin/videos/videos?run=train&tag=rollouts&sample=x",
        "/data/plugin/videos/videos?run=train&tag=rollouts&sample=-1",
        "/data/plugin/videos/videos?run=train&tag=rollouts&sample=18446744073709551615",
        "/data/plugin/videos/videos?run=train&tag=rollouts&sample=18446744073709551616",
    ] {
        let (status, content_type, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(content_type, "text/plain");
        assert_eq!(body, b"Invalid run or tag");
    }
}

#[tokio::test]
async fn test_individual_video() {
    let (_dir, app) = app();
    let query = first_query(&app).await;

    let (status, content_type, body) =
        get(&app, &format!("/data/plugin/videos/individualVideo?{query}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "video/mp4");
    assert_eq!(body, b"clip-0");

    // Splitting cannot run here, so the whole blob comes back.
    let (status, _, body) = get(
        &app,
        &format!("/data/plugin/videos/individualVideo?{query}&track_number=3"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"clip-0");
}

#[tokio::test]
async fn test_individual_video_bad_requests() {
    let (_dir, app) = app();
    let query = first_query(&app).await;
    for uri in [
        "/data/plugin/videos/individualVideo".to_string(),
        "/data/plugin/videos/individualVideo?blob_key=1.2".to_string(),
        "/data/plugin/videos/individualVideo?blob_key=garbage".to_string(),
        format!("/data/plugin/videos/individualVideo?{query}&track_number=-1"),
        format!("/data/plugin/videos/individualVideo?{query}&track_number=one"),
    ] {
        let (status, content_type, body) = get(&app, &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(content_type, "text/plain");
        assert_eq!(body, b"Invalid run, tag, index, or sample");
    }
}

#[tokio::test]
async fn test_index_js_and_listing() {
    let (_dir, app) = app();
    let (status, content_type, body) = get(&app, "/data/plugin/videos/index.js").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "text/javascript");
    assert!(String::from_utf8(body).unwrap().contains("export async function render"));

    let (status, _, body) = get(&app, "/data/plugins_listing").await;
    assert_eq!(status, StatusCode::OK);
    let listing: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(listing["videos"]["enabled"], true);
    assert_eq!(listing["videos"]["es_module_path"], "/index.js");
}
