//! Camera facade - Frame Capture
//!
//! ## Responsibilities
//!
//! - One capture loop per feed, overwriting a single locked frame slot
//! - Local V4L2 devices read as a long-lived ffmpeg MJPEG pipe
//! - IP cameras polled via their HTTP snapshot URL
//! - JPEG / base64 access to the most recent frame
//!
//! A capture error ends the loop; there is no retry. A feed whose device
//! is absent simply never produces a frame.

mod mjpeg;

pub use mjpeg::MjpegAssembler;

use crate::config::CameraDeviceConfig;
use crate::error::{Error, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// Most recent decoded frame; overwritten in place, no history
#[derive(Debug, Clone)]
pub struct Frame {
    /// JPEG bytes
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

/// Feed descriptor for the API listing
#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    pub id: u32,
    pub name: String,
    pub device: String,
    pub running: bool,
}

/// A single camera feed
pub struct CameraFeed {
    config: CameraDeviceConfig,
    slot: RwLock<Option<Frame>>,
    running: AtomicBool,
    capture_task: Mutex<Option<JoinHandle<()>>>,
}

impl CameraFeed {
    /// Create a feed; no capture starts until `start`
    pub fn new(config: CameraDeviceConfig) -> Self {
        Self {
            config,
            slot: RwLock::new(None),
            running: AtomicBool::new(false),
            capture_task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u32 {
        self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Nominal delay between frames at the configured rate
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1_000 / u64::from(self.config.fps.max(1)))
    }

    pub fn info(&self) -> FeedInfo {
        FeedInfo {
            id: self.config.id,
            name: self.config.name.clone(),
            device: self
                .config
                .snapshot_url
                .clone()
                .unwrap_or_else(|| self.config.device.clone()),
            running: self.is_running(),
        }
    }

    /// Start the capture loop. At most one loop runs per feed.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if self.config.snapshot_url.is_none()
            && !std::path::Path::new(&self.config.device).exists()
        {
            self.running.store(false, Ordering::SeqCst);
            return Err(Error::CameraUnavailable(format!(
                "device {} not found",
                self.config.device
            )));
        }

        let feed = self.clone();
        let handle = tokio::spawn(async move {
            let result = match feed.config.snapshot_url.clone() {
                Some(url) => feed.snapshot_loop(url).await,
                None => feed.device_loop().await,
            };
            if let Err(e) = result {
                tracing::error!(camera_id = feed.config.id, error = %e, "Capture loop ended");
            }
            feed.running.store(false, Ordering::SeqCst);
        });

        let mut task = self.capture_task.lock().await;
        *task = Some(handle);

        tracing::info!(
            camera_id = self.config.id,
            name = %self.config.name,
            "Started camera feed"
        );
        Ok(())
    }

    /// Long-lived ffmpeg MJPEG pipe from the V4L2 device.
    ///
    /// Frames arrive as fast as the device delivers them; each complete
    /// JPEG overwrites the slot.
    async fn device_loop(&self) -> Result<()> {
        let mut child = Command::new("ffmpeg")
            .args(["-loglevel", "error"])
            .args(["-f", "v4l2"])
            .args(["-framerate", &self.config.fps.to_string()])
            .args([
                "-video_size",
                &format!("{}x{}", self.config.width, self.config.height),
            ])
            .args(["-i", &self.config.device])
            .args(["-c:v", "mjpeg"])
            .args(["-q:v", &self.config.jpeg_quality.to_string()])
            .args(["-f", "mjpeg", "pipe:1"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::CameraUnavailable(format!("ffmpeg spawn failed: {}", e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("ffmpeg stdout not piped".to_string()))?;

        let mut assembler = MjpegAssembler::new();
        let mut buf = vec![0u8; 64 * 1024];

        while self.running.load(Ordering::SeqCst) {
            let n = stdout.read(&mut buf).await?;
            if n == 0 {
                // ffmpeg exited (device unplugged or capture error)
                return Err(Error::CameraUnavailable(format!(
                    "ffmpeg stream for {} ended",
                    self.config.device
                )));
            }
            for frame in assembler.push(&buf[..n]) {
                self.store(frame).await;
            }
        }

        let _ = child.kill().await;
        Ok(())
    }

    /// Poll an IP camera's HTTP snapshot URL once per frame interval
    async fn snapshot_loop(&self, url: String) -> Result<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        let interval = Duration::from_millis(1_000 / u64::from(self.config.fps.max(1)));
        let mut ticker = tokio::time::interval(interval);

        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;

            let response = client.get(&url).send().await?.error_for_status()?;
            let data = response.bytes().await?;
            self.store(data.to_vec()).await;
        }
        Ok(())
    }

    async fn store(&self, data: Vec<u8>) {
        let mut slot = self.slot.write().await;
        *slot = Some(Frame {
            data,
            captured_at: Utc::now(),
        });
    }

    /// Stop capturing; bounded wait for the loop to end
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        let handle = {
            let mut task = self.capture_task.lock().await;
            task.take()
        };
        if let Some(handle) = handle {
            handle.abort();
            let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
        }
        tracing::info!(camera_id = self.config.id, name = %self.config.name, "Stopped camera feed");
    }

    /// Most recent frame; None before the first capture
    pub async fn frame(&self) -> Option<Frame> {
        let slot = self.slot.read().await;
        slot.clone()
    }

    /// Most recent frame as JPEG bytes
    pub async fn jpeg(&self) -> Option<Vec<u8>> {
        self.frame().await.map(|f| f.data)
    }

    /// Most recent frame base64-encoded for the push channel
    pub async fn base64_frame(&self) -> Option<String> {
        self.jpeg()
            .await
            .map(|data| base64::engine::general_purpose::STANDARD.encode(data))
    }
}

/// Registry of configured feeds
pub struct CameraService {
    feeds: HashMap<u32, Arc<CameraFeed>>,
}

impl CameraService {
    /// Build feeds from config; none is started yet
    pub fn new(devices: &[CameraDeviceConfig]) -> Self {
        let feeds = devices
            .iter()
            .map(|d| (d.id, Arc::new(CameraFeed::new(d.clone()))))
            .collect();
        Self { feeds }
    }

    /// Start every feed. Unavailable devices are logged and left stopped;
    /// their endpoints serve 404 until a frame exists.
    pub async fn start_all(&self) {
        for feed in self.feeds.values() {
            if let Err(e) = feed.start().await {
                tracing::warn!(camera_id = feed.id(), error = %e, "Camera feed not started");
            }
        }
    }

    /// Stop every feed
    pub async fn stop_all(&self) {
        for feed in self.feeds.values() {
            feed.stop().await;
        }
    }

    pub fn get(&self, id: u32) -> Option<Arc<CameraFeed>> {
        self.feeds.get(&id).cloned()
    }

    /// Feed descriptors sorted by id
    pub fn list(&self) -> Vec<FeedInfo> {
        let mut infos: Vec<FeedInfo> = self.feeds.values().map(|f| f.info()).collect();
        infos.sort_by_key(|i| i.id);
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(id: u32) -> CameraDeviceConfig {
        CameraDeviceConfig {
            id,
            name: format!("cam-{}", id),
            device: "/dev/null-video".to_string(),
            ..CameraDeviceConfig::default()
        }
    }

    #[tokio::test]
    async fn test_frame_before_capture_is_none() {
        let feed = CameraFeed::new(test_config(0));
        assert!(feed.frame().await.is_none());
        assert!(feed.jpeg().await.is_none());
        assert!(feed.base64_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_store_overwrites_slot() {
        let feed = CameraFeed::new(test_config(0));
        feed.store(vec![1, 2, 3]).await;
        feed.store(vec![4, 5]).await;

        let frame = feed.frame().await.unwrap();
        assert_eq!(frame.data, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_base64_frame_roundtrip() {
        let feed = CameraFeed::new(test_config(0));
        feed.store(vec![0xFF, 0xD8, 0xFF, 0xD9]).await;

        let encoded = feed.base64_frame().await.unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(decoded, vec![0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[tokio::test]
    async fn test_start_with_missing_device_errors() {
        let feed = Arc::new(CameraFeed::new(test_config(0)));
        let err = feed.start().await;
        assert!(matches!(err, Err(Error::CameraUnavailable(_))));
        assert!(!feed.is_running());
    }

    #[tokio::test]
    async fn test_service_list_and_lookup() {
        let service = CameraService::new(&[test_config(1), test_config(0)]);
        let infos = service.list();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].id, 0);
        assert_eq!(infos[1].id, 1);
        assert!(!infos[0].running);

        assert!(service.get(1).is_some());
        assert!(service.get(9).is_none());
    }

    #[tokio::test]
    async fn test_stop_never_started_feed_is_harmless() {
        let feed = CameraFeed::new(test_config(0));
        feed.stop().await;
        assert!(!feed.is_running());
    }
}
