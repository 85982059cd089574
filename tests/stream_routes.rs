use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Serializes the tests that toggle the mock-capture env var.
static ENV_LOCK: Mutex<()> = Mutex::new(());

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use pagecast_lib::{
    AppState, BrowserSessionManager, CapturePipeline, Config, SessionOptions, WsCaptureAgent,
};

async fn test_router() -> axum::Router {
    let config = Config::default();
    let manager = Arc::new(BrowserSessionManager::new(SessionOptions::from_config(
        &config,
    )));
    let agent = Arc::new(
        WsCaptureAgent::bind(Duration::from_secs(2))
            .await
            .expect("bridge binds on loopback"),
    );
    let pipeline = CapturePipeline::new(manager, agent, config.clone());
    pagecast_lib::router(Arc::new(AppState { pipeline, config }))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn unknown_destination_is_not_found() {
    let app = test_router().await;
    let response = app.oneshot(get("/stream/mystery-channel")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&body);
    assert!(
        text.contains("mystery-channel"),
        "error should name the alias, got: {text}"
    );
}

#[tokio::test]
async fn generic_stream_requires_url_parameter() {
    let app = test_router().await;
    let response = app.oneshot(get("/stream")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn generic_stream_rejects_non_http_url() {
    let app = test_router().await;
    let response = app
        .oneshot(get("/stream?url=file:///etc/passwd"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn index_lists_catalog_destinations() {
    let app = test_router().await;
    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8_lossy(&body);
    assert!(html.contains("/stream/weatherscan"));
    assert!(html.contains("/stream/nbc"));
}

#[tokio::test]
async fn playlist_enumerates_stream_urls() {
    let app = test_router().await;
    let response = app.oneshot(get("/playlist.m3u")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("audio/x-mpegurl")
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let m3u = String::from_utf8_lossy(&body);
    assert!(m3u.starts_with("#EXTM3U"));
    assert!(m3u.contains("/stream/weatherscan"));
    assert!(m3u.contains("#EXTINF:-1,Frndly TV"));
}

#[tokio::test]
async fn debug_click_without_session_is_not_found() {
    let app = test_router().await;
    let response = app.oneshot(get("/debug/click?x=10&y=20")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn debug_keys_without_session_is_not_found() {
    let app = test_router().await;
    let response = app.oneshot(get("/debug/keys?keys=Tab,Enter")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mock_capture_streams_finite_body() {
    let _guard = ENV_LOCK.lock().unwrap();
    // Route-level capture stub: serves canned chunks without a browser.
    std::env::set_var("PAGECAST_MOCK_CAPTURE", "3");

    let app = test_router().await;
    let response = app
        .oneshot(get("/stream?url=https://example.com/live"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("video/webm")
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.len(), 3 * 4096);

    std::env::remove_var("PAGECAST_MOCK_CAPTURE");
}

#[tokio::test]
async fn mock_capture_still_validates_parameters() {
    let _guard = ENV_LOCK.lock().unwrap();
    std::env::set_var("PAGECAST_MOCK_CAPTURE", "3");

    let app = test_router().await;
    let response = app.oneshot(get("/stream/mystery")).await.unwrap();
    assert_eq!(
        response.status(),
        StatusCode::NOT_FOUND,
        "alias resolution runs before the mock seam"
    );

    std::env::remove_var("PAGECAST_MOCK_CAPTURE");
}
