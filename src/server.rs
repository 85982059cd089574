//! HTTP surface: the stream endpoints, a help page, an M3U playlist of the
//! destination catalog and the debug input endpoints.
//!
//! Failures before any bytes flow come back as plain-text error responses;
//! once a body is streaming the client has no channel for structured errors
//! and problems are logged server-side only.

use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use serde::Deserialize;
use tracing::{info, warn};

use crate::capture::pipeline::CapturePipeline;
use crate::capture::request::{CaptureRequest, StreamOverrides};
use crate::config::Config;
use crate::destinations;
use crate::error::PagecastError;
use crate::recipes::steps;
use crate::sink::{body_channel, HttpSink, OutputSink, TranscodeSink};

pub struct AppState {
    pub pipeline: CapturePipeline,
    pub config: Config,
}

/// Buffered chunks between capture and a slow HTTP consumer.
const BODY_CHANNEL_CAPACITY: usize = 64;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/playlist.m3u", get(playlist))
        .route("/stream", get(stream_generic))
        .route("/stream/{name}", get(stream_named))
        .route("/debug/click", get(debug_click))
        .route("/debug/keys", get(debug_keys))
        .with_state(state)
}

async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let mut rows = String::new();
    for dest in destinations::all() {
        rows.push_str(&format!(
            "<li><a href=\"/stream/{alias}\">{title}</a> (<code>/stream/{alias}</code>)</li>\n",
            alias = dest.alias,
            title = dest.title,
        ));
    }
    Html(format!(
        "<html><head><title>pagecast</title></head><body>\
         <h1>pagecast</h1>\
         <p>Relays browser-rendered video as HTTP streams on port {port}.</p>\
         <ul>{rows}</ul>\
         <p>Generic form: <code>/stream?url=https://...</code>. \
         Overrides: <code>width</code>, <code>height</code>, <code>videoBitrate</code>, \
         <code>audioBitrate</code>, <code>frameRate</code>, <code>waitForMedia</code>, \
         <code>channel</code>.</p>\
         <p>Playlist: <a href=\"/playlist.m3u\">/playlist.m3u</a></p>\
         </body></html>",
        port = state.config.port,
    ))
}

async fn playlist(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|h| h.to_string())
        .unwrap_or_else(|| format!("localhost:{}", state.config.port));

    let mut m3u = String::from("#EXTM3U\n");
    for dest in destinations::all() {
        m3u.push_str(&format!(
            "#EXTINF:-1,{title}\nhttp://{host}/stream/{alias}\n",
            title = dest.title,
            alias = dest.alias,
        ));
    }

    (
        [(header::CONTENT_TYPE, "audio/x-mpegurl")],
        m3u,
    )
        .into_response()
}

async fn stream_named(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(overrides): Query<StreamOverrides>,
) -> Response {
    open_stream(state, Some(name), overrides).await
}

async fn stream_generic(
    State(state): State<Arc<AppState>>,
    Query(overrides): Query<StreamOverrides>,
) -> Response {
    open_stream(state, None, overrides).await
}

async fn open_stream(
    state: Arc<AppState>,
    alias: Option<String>,
    overrides: StreamOverrides,
) -> Response {
    let request = match CaptureRequest::resolve(&state.config, alias.as_deref(), &overrides) {
        Ok(request) => request,
        Err(e @ PagecastError::UnknownDestination(_)) => {
            return (StatusCode::NOT_FOUND, e.to_string()).into_response();
        }
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    // Stub seam for route tests and dry runs without a browser install.
    if let Some(chunks) = mock_capture_chunks() {
        info!(target = %request.target, chunks, "serving mock capture stream");
        return mock_stream_response(&state.config, chunks);
    }

    let (sink, body): (Box<dyn OutputSink>, _) = if state.config.transcode.enabled {
        let (tx, body) = body_channel(BODY_CHANNEL_CAPACITY);
        match TranscodeSink::spawn(&state.config.transcode, tx) {
            Ok(sink) => (Box::new(sink), Body::from_stream(body)),
            Err(e) => {
                warn!(error = %e, "transcoder spawn failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
            }
        }
    } else {
        let (sink, body) = HttpSink::channel(BODY_CHANNEL_CAPACITY);
        (Box::new(sink), Body::from_stream(body))
    };

    match state.pipeline.open(request, sink).await {
        Ok(_session) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, stream_content_type(&state.config))
            .body(body)
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => {
            warn!(error = %e, "capture session failed before streaming");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

fn stream_content_type(config: &Config) -> String {
    if config.transcode.enabled {
        config.transcode.content_type.clone()
    } else {
        // Container type without the codec parameters.
        config
            .stream
            .mime_type
            .split(';')
            .next()
            .unwrap_or("video/webm")
            .to_string()
    }
}

fn mock_capture_chunks() -> Option<usize> {
    std::env::var("PAGECAST_MOCK_CAPTURE")
        .ok()
        .map(|v| v.parse().unwrap_or(16))
}

fn mock_stream_response(config: &Config, chunks: usize) -> Response {
    let payload = Bytes::from(vec![0xA5u8; 4096]);
    let body = futures::stream::iter(
        (0..chunks).map(move |_| Ok::<_, io::Error>(payload.clone())),
    );
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, stream_content_type(config))
        .body(Body::from_stream(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[derive(Debug, Deserialize)]
struct ClickParams {
    x: f64,
    y: f64,
}

/// Forward a click into the most recently opened capture context. Weak
/// contract by design: with several live sessions this targets whichever
/// was created last.
async fn debug_click(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ClickParams>,
) -> Response {
    let Some(session) = state.pipeline.active_session() else {
        return (StatusCode::NOT_FOUND, "no active capture session").into_response();
    };
    match steps::click_at(session.page(), params.x, params.y).await {
        Ok(()) => (StatusCode::OK, format!("clicked {},{}", params.x, params.y)).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct KeysParams {
    /// Comma-separated key names, e.g. `Tab,Tab,Enter`.
    keys: String,
}

async fn debug_keys(
    State(state): State<Arc<AppState>>,
    Query(params): Query<KeysParams>,
) -> Response {
    let Some(session) = state.pipeline.active_session() else {
        return (StatusCode::NOT_FOUND, "no active capture session").into_response();
    };
    for key in params.keys.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        if let Err(e) = steps::press_key(session.page(), key).await {
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    }
    (StatusCode::OK, format!("sent {}", params.keys)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_strips_codec_parameters() {
        let config = Config::default();
        assert_eq!(stream_content_type(&config), "video/webm");
    }

    #[test]
    fn content_type_uses_transcode_container_when_enabled() {
        let mut config = Config::default();
        config.transcode.enabled = true;
        assert_eq!(stream_content_type(&config), "video/x-matroska");
    }
}
