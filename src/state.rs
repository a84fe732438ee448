//! Application state
//!
//! Holds the shared facades; each is optional and independently initialized.

use crate::camera::CameraService;
use crate::config::DashboardConfig;
use crate::media::MediaLibrary;
use crate::realtime_hub::RealtimeHub;
use crate::system::SystemMonitor;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: DashboardConfig,
    /// Process start, for health uptime
    pub started_at: Instant,
    /// Camera facade (None when disabled)
    pub cameras: Option<Arc<CameraService>>,
    /// Media facade (None when disabled)
    pub media: Option<Arc<MediaLibrary>>,
    /// System facade (None when disabled)
    pub system: Option<Arc<SystemMonitor>>,
    /// RealtimeHub (WebSocket push channel)
    pub realtime: Arc<RealtimeHub>,
}

impl AppState {
    /// Build state from config, constructing only the enabled facades
    pub fn from_config(config: DashboardConfig) -> Self {
        let cameras = config
            .camera
            .enabled
            .then(|| Arc::new(CameraService::new(&config.camera.devices)));
        let media = config
            .media
            .enabled
            .then(|| Arc::new(MediaLibrary::new(config.media.library_root())));
        let system = config.system.enabled.then(|| Arc::new(SystemMonitor::new()));

        Self {
            config,
            started_at: Instant::now(),
            cameras,
            media,
            system,
            realtime: Arc::new(RealtimeHub::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_facades_are_absent() {
        let mut config = DashboardConfig::default();
        config.camera.enabled = false;
        config.media.enabled = false;
        config.system.enabled = false;

        let state = AppState::from_config(config);
        assert!(state.cameras.is_none());
        assert!(state.media.is_none());
        assert!(state.system.is_none());
    }

    #[test]
    fn test_default_config_enables_all() {
        let state = AppState::from_config(DashboardConfig::default());
        assert!(state.cameras.is_some());
        assert!(state.media.is_some());
        assert!(state.system.is_some());
    }
}
