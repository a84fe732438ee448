//! RealtimeHub - WebSocket distribution
//!
//! ## Responsibilities
//!
//! - WebSocket connection management
//! - Broadcasting system stats ticks and media status changes
//! - Direct replies (camera frames requested by a single client)
//!
//! Note: the MJPEG live view goes over HTTP (`/api/cameras/:id/stream`);
//! the hub only carries single base64 frames requested on demand.

use crate::media::MediaFile;
use crate::system::SystemSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Hub message types (server -> client)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    /// Periodic system stats tick (and `get_stats` replies)
    SystemStats(SystemSnapshot),
    /// Single camera frame, base64 JPEG
    CameraFrame(CameraFrameMessage),
    /// Media playback status change
    MediaStatus(MediaStatusMessage),
}

/// Camera frame message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraFrameMessage {
    pub camera_id: u32,
    /// Base64-encoded JPEG
    pub frame: String,
    pub captured_at: String,
}

/// Media status message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaStatusMessage {
    /// "playing" | "paused" | "stopped"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaFile>,
}

/// Client message types (client -> server)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request a single frame from a camera
    CameraFrameRequest { camera_id: u32 },
    /// Start playback of a library file (by relative path)
    MediaPlay { path: String },
    MediaPause,
    MediaStop,
    /// Start the periodic stats loop
    SystemStatsStart,
    /// Stop the periodic stats loop
    SystemStatsStop,
    /// One-shot stats request
    GetStats,
}

/// Client connection
struct ClientConnection {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    connections: RwLock<HashMap<Uuid, ClientConnection>>,
    connection_count: AtomicU64,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
        }
    }

    /// Register a new client
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, ClientConnection { id, tx });
        }

        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(connection_id = %id, "Client connected");

        (id, rx)
    }

    /// Unregister a client
    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(connection_id = %id, "Client disconnected");
        }
    }

    /// Broadcast message to all clients
    pub async fn broadcast(&self, message: HubMessage) {
        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        let connections = self.connections.read().await;
        tracing::debug!(client_count = connections.len(), "Broadcasting to clients");

        for conn in connections.values() {
            if let Err(e) = conn.tx.send(json.clone()) {
                tracing::warn!(connection_id = %conn.id, error = %e, "Failed to send message");
            }
        }
    }

    /// Send message to a single connection
    pub async fn send_to(&self, id: &Uuid, message: HubMessage) {
        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        let connections = self.connections.read().await;
        if let Some(conn) = connections.get(id) {
            if let Err(e) = conn.tx.send(json) {
                tracing::warn!(connection_id = %id, error = %e, "Failed to send message");
            }
        }
    }

    /// Get connection count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_message() -> HubMessage {
        HubMessage::CameraFrame(CameraFrameMessage {
            camera_id: 0,
            frame: "AAAA".to_string(),
            captured_at: "2026-01-01T00:00:00Z".to_string(),
        })
    }

    #[tokio::test]
    async fn test_register_broadcast_unregister() {
        let hub = RealtimeHub::new();
        let (id, mut rx) = hub.register().await;
        assert_eq!(hub.connection_count(), 1);

        hub.broadcast(frame_message()).await;
        let raw = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["type"], "camera_frame");
        assert_eq!(value["data"]["camera_id"], 0);

        hub.unregister(&id).await;
        assert_eq!(hub.connection_count(), 0);

        // No further deliveries after unregister
        hub.broadcast(frame_message()).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_targets_single_connection() {
        let hub = RealtimeHub::new();
        let (id_a, mut rx_a) = hub.register().await;
        let (_id_b, mut rx_b) = hub.register().await;

        hub.send_to(&id_a, frame_message()).await;
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_client_message_parsing() {
        let raw = r#"{"type":"camera_frame_request","data":{"camera_id":2}}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMessage::CameraFrameRequest { camera_id } => assert_eq!(camera_id, 2),
            other => panic!("unexpected message: {:?}", other),
        }

        let raw = r#"{"type":"media_stop"}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(msg, ClientMessage::MediaStop));
    }
}
