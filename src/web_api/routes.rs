//! API Routes

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::camera::CameraFeed;
use crate::error::Error;
use crate::media::{self, MediaKind};
use crate::models::ApiResponse;
use crate::realtime_hub::{CameraFrameMessage, ClientMessage, HubMessage, MediaStatusMessage};
use crate::state::AppState;

/// Maximum read chunk for range requests without an explicit end (1 MiB)
const MAX_CHUNK_SIZE: u64 = 1024 * 1024;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(super::device_status))
        // Cameras
        .route("/api/cameras", get(list_cameras))
        .route("/api/cameras/:id/snapshot.jpg", get(camera_snapshot))
        .route("/api/cameras/:id/stream", get(camera_stream))
        // Media
        .route("/api/media/files", get(list_media_files))
        .route("/api/media/scan", post(scan_media))
        .route("/api/media/stats", get(media_stats))
        .route("/media/stream/*path", get(stream_media))
        // System
        .route("/api/system/stats", get(system_stats))
        // WebSocket
        .route("/api/ws", get(websocket_handler))
        .with_state(state)
}

// ========================================
// Camera Handlers
// ========================================

async fn list_cameras(State(state): State<AppState>) -> Response {
    match &state.cameras {
        Some(cameras) => Json(ApiResponse::success(cameras.list())).into_response(),
        None => facade_disabled("camera"),
    }
}

/// Serve the most recent frame as a single JPEG
async fn camera_snapshot(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Response {
    let Some(feed) = camera_feed(&state, id) else {
        return Error::NotFound(format!("camera {}", id)).into_response();
    };

    match feed.jpeg().await {
        Some(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            ],
            bytes,
        )
            .into_response(),
        None => Error::NotFound(format!("no frame captured yet for camera {}", id))
            .into_response(),
    }
}

/// Stream the feed as multipart MJPEG.
///
/// Each part carries one JPEG; a frame is only emitted when the slot
/// timestamp changes. The stream ends when the feed stops.
async fn camera_stream(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Response {
    let Some(feed) = camera_feed(&state, id) else {
        return Error::NotFound(format!("camera {}", id)).into_response();
    };

    let interval = feed.frame_interval();
    let stream = futures::stream::unfold(
        (feed, None::<chrono::DateTime<chrono::Utc>>),
        move |(feed, last_sent)| async move {
            loop {
                tokio::time::sleep(interval).await;
                if !feed.is_running() {
                    return None;
                }
                let Some(frame) = feed.frame().await else {
                    continue;
                };
                if last_sent == Some(frame.captured_at) {
                    continue;
                }

                let mut part = format!(
                    "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                    frame.data.len()
                )
                .into_bytes();
                part.extend_from_slice(&frame.data);
                part.extend_from_slice(b"\r\n");

                let captured_at = frame.captured_at;
                return Some((Ok::<_, Infallible>(part), (feed, Some(captured_at))));
            }
        },
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn camera_feed(state: &AppState, id: u32) -> Option<std::sync::Arc<CameraFeed>> {
    state.cameras.as_ref().and_then(|c| c.get(id))
}

// ========================================
// Media Handlers
// ========================================

#[derive(Debug, Deserialize)]
struct MediaFilesQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
}

async fn list_media_files(
    State(state): State<AppState>,
    Query(query): Query<MediaFilesQuery>,
) -> Response {
    let Some(library) = &state.media else {
        return facade_disabled("media");
    };

    let kind = match query.kind.as_deref() {
        Some(raw) => match raw.parse::<MediaKind>() {
            Ok(kind) => Some(kind),
            Err(e) => return e.into_response(),
        },
        None => None,
    };

    Json(ApiResponse::success(library.files(kind).await)).into_response()
}

async fn scan_media(State(state): State<AppState>) -> Response {
    let Some(library) = &state.media else {
        return facade_disabled("media");
    };

    let files = library.scan().await;
    Json(ApiResponse::success(serde_json::json!({
        "count": files.len(),
        "files": files,
    })))
    .into_response()
}

async fn media_stats(State(state): State<AppState>) -> Response {
    match &state.media {
        Some(library) => Json(ApiResponse::success(library.stats().await)).into_response(),
        None => facade_disabled("media"),
    }
}

/// Stream a library file with HTTP Range support
async fn stream_media(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(library) = &state.media else {
        return facade_disabled("media");
    };

    let file_path = match library.resolve(&path) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    if !file_path.is_file() {
        return Error::NotFound(path).into_response();
    }

    let metadata = match tokio::fs::metadata(&file_path).await {
        Ok(m) => m,
        Err(e) => return Error::from(e).into_response(),
    };
    let file_size = metadata.len();
    let ext = file_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let content_type = media::content_type_for_extension(ext);

    // Range request: serve the requested slice
    if let Some(range_value) = headers.get(header::RANGE) {
        let range = range_value.to_str().ok().and_then(parse_range_header);
        if let Some((start, end)) = range {
            // Reject before computing the end so a huge start cannot overflow
            if start >= file_size {
                return Response::builder()
                    .status(StatusCode::RANGE_NOT_SATISFIABLE)
                    .header(header::CONTENT_RANGE, format!("bytes */{file_size}"))
                    .body(Body::empty())
                    .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
            }

            let end = end
                .map(|e| e.min(file_size - 1))
                .unwrap_or_else(|| start.saturating_add(MAX_CHUNK_SIZE - 1).min(file_size - 1));

            if start > end {
                return Response::builder()
                    .status(StatusCode::RANGE_NOT_SATISFIABLE)
                    .header(header::CONTENT_RANGE, format!("bytes */{file_size}"))
                    .body(Body::empty())
                    .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
            }

            let length = end - start + 1;

            let mut file = match tokio::fs::File::open(&file_path).await {
                Ok(f) => f,
                Err(e) => return Error::from(e).into_response(),
            };
            if let Err(e) = file.seek(std::io::SeekFrom::Start(start)).await {
                return Error::from(e).into_response();
            }

            let stream = ReaderStream::new(file.take(length));

            return Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, length.to_string())
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{end}/{file_size}"),
                )
                .header(header::ACCEPT_RANGES, "bytes")
                .body(Body::from_stream(stream))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }
    }

    // No Range header: serve the whole file
    let file = match tokio::fs::File::open(&file_path).await {
        Ok(f) => f,
        Err(e) => return Error::from(e).into_response(),
    };
    let stream = ReaderStream::new(file);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, file_size.to_string())
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Parse a `Range: bytes=START-END` header value as `(start, optional_end)`
fn parse_range_header(range: &str) -> Option<(u64, Option<u64>)> {
    let range = range.strip_prefix("bytes=")?;
    let (start, end) = range.split_once('-')?;
    let start = start.parse::<u64>().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse::<u64>().ok()?)
    };
    Some((start, end))
}

// ========================================
// System Handlers
// ========================================

async fn system_stats(State(state): State<AppState>) -> Response {
    match &state.system {
        Some(monitor) => Json(ApiResponse::success(monitor.snapshot().await)).into_response(),
        None => facade_disabled("system"),
    }
}

fn facade_disabled(name: &str) -> Response {
    Error::NotFound(format!("{} facade disabled", name)).into_response()
}

// ========================================
// WebSocket Handler
// ========================================

/// WebSocket upgrade handler
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Register with RealtimeHub
    let (conn_id, mut rx) = state.realtime.register().await;

    // Forward hub messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // Dispatch incoming client messages
    let recv_state = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => handle_client_message(&recv_state, &conn_id, msg).await,
                    Err(e) => {
                        tracing::warn!(connection_id = %conn_id, error = %e, "Unparseable client message");
                    }
                },
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
        conn_id
    });

    let conn_id = tokio::select! {
        _ = send_task => conn_id,
        result = recv_task => result.unwrap_or(conn_id),
    };

    state.realtime.unregister(&conn_id).await;
}

/// Dispatch one push-channel command
async fn handle_client_message(state: &AppState, conn_id: &Uuid, msg: ClientMessage) {
    match msg {
        ClientMessage::CameraFrameRequest { camera_id } => {
            let Some(feed) = camera_feed(state, camera_id) else {
                tracing::debug!(camera_id, "Frame requested for unknown camera");
                return;
            };
            let Some(frame) = feed.frame().await else {
                // Nothing captured yet; no reply
                return;
            };
            let encoded = feed.base64_frame().await.unwrap_or_default();
            state
                .realtime
                .send_to(
                    conn_id,
                    HubMessage::CameraFrame(CameraFrameMessage {
                        camera_id,
                        frame: encoded,
                        captured_at: frame.captured_at.to_rfc3339(),
                    }),
                )
                .await;
        }
        ClientMessage::MediaPlay { path } => {
            let Some(library) = &state.media else {
                return;
            };
            match library.find(&path).await {
                Some(file) => {
                    library.play(file).await;
                    broadcast_playback(state).await;
                }
                None => {
                    tracing::warn!(path = %path, "Play requested for unknown media file");
                }
            }
        }
        ClientMessage::MediaPause => {
            let Some(library) = &state.media else {
                return;
            };
            library.pause().await;
            broadcast_playback(state).await;
        }
        ClientMessage::MediaStop => {
            let Some(library) = &state.media else {
                return;
            };
            library.stop().await;
            broadcast_playback(state).await;
        }
        ClientMessage::SystemStatsStart => {
            if let Some(monitor) = &state.system {
                let interval = Duration::from_secs(state.config.system.update_interval_secs.max(1));
                monitor
                    .start_monitoring(state.realtime.clone(), interval)
                    .await;
            }
        }
        ClientMessage::SystemStatsStop => {
            if let Some(monitor) = &state.system {
                monitor.stop_monitoring().await;
            }
        }
        ClientMessage::GetStats => {
            if let Some(monitor) = &state.system {
                let stats = monitor.snapshot().await;
                state
                    .realtime
                    .send_to(conn_id, HubMessage::SystemStats(stats))
                    .await;
            }
        }
    }
}

/// Broadcast the library's current playback state to every connection
async fn broadcast_playback(state: &AppState) {
    let Some(library) = &state.media else {
        return;
    };
    let (status, media) = library.playback().await;
    state
        .realtime
        .broadcast(HubMessage::MediaStatus(MediaStatusMessage {
            status: status.as_str().to_string(),
            media,
        }))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DashboardConfig;
    use crate::state::AppState;
    use axum::http::Request;
    use tower::util::ServiceExt;

    #[test]
    fn test_parse_range_header() {
        assert_eq!(parse_range_header("bytes=0-499"), Some((0, Some(499))));
        assert_eq!(parse_range_header("bytes=500-"), Some((500, None)));
        assert_eq!(parse_range_header("bytes=-500"), None);
        assert_eq!(parse_range_header("items=0-1"), None);
        assert_eq!(parse_range_header("bytes=abc-"), None);
    }

    /// State with only the media facade, rooted at `dir` and pre-scanned
    async fn media_state(dir: &std::path::Path) -> AppState {
        let mut config = DashboardConfig::default();
        config.camera.enabled = false;
        config.system.enabled = false;
        config.media.library_path = dir.to_string_lossy().to_string();

        let state = AppState::from_config(config);
        state.media.as_ref().unwrap().scan().await;
        state
    }

    async fn media_router(dir: &std::path::Path) -> Router {
        create_router(media_state(dir).await)
    }

    #[tokio::test]
    async fn test_range_start_past_eof_is_unsatisfiable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"0123456789").unwrap();
        let app = media_router(dir.path()).await;

        // Open-ended range with the largest possible start must not panic
        let request = Request::builder()
            .uri("/media/stream/clip.mp4")
            .header(header::RANGE, format!("bytes={}-", u64::MAX))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok()),
            Some("bytes */10")
        );
    }

    #[tokio::test]
    async fn test_open_ended_range_serves_tail() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"0123456789").unwrap();
        let app = media_router(dir.path()).await;

        let request = Request::builder()
            .uri("/media/stream/clip.mp4")
            .header(header::RANGE, "bytes=4-")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok()),
            Some("bytes 4-9/10")
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"456789");
    }

    #[tokio::test]
    async fn test_full_file_without_range() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"0123456789").unwrap();
        let app = media_router(dir.path()).await;

        let request = Request::builder()
            .uri("/media/stream/clip.mp4")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"0123456789");
    }

    #[tokio::test]
    async fn test_media_commands_broadcast_playback_state() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"0123456789").unwrap();
        let state = media_state(dir.path()).await;

        let (conn_id, mut rx) = state.realtime.register().await;

        handle_client_message(
            &state,
            &conn_id,
            ClientMessage::MediaPlay {
                path: "clip.mp4".to_string(),
            },
        )
        .await;
        let msg: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(msg["data"]["status"], "playing");
        assert_eq!(msg["data"]["media"]["filename"], "clip.mp4");

        handle_client_message(&state, &conn_id, ClientMessage::MediaPause).await;
        let msg: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(msg["data"]["status"], "paused");
        assert_eq!(msg["data"]["media"]["filename"], "clip.mp4");

        handle_client_message(&state, &conn_id, ClientMessage::MediaStop).await;
        let msg: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(msg["data"]["status"], "stopped");
        assert!(msg["data"]["media"].is_null());

        // Unknown path leaves the slot and the channel untouched
        handle_client_message(
            &state,
            &conn_id,
            ClientMessage::MediaPlay {
                path: "missing.mp4".to_string(),
            },
        )
        .await;
        assert!(rx.try_recv().is_err());

        state.realtime.unregister(&conn_id).await;
    }
}
