//! Configuration loading
//!
//! ## Responsibilities
//!
//! - JSON config file parsing (facade toggles + parameters)
//! - Default search locations when no path is given
//! - Built-in defaults when no file exists

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level dashboard configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub server: ServerConfig,
    pub camera: CameraConfig,
    pub media: MediaConfig,
    pub system: SystemConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory with the HTML panels, served as fallback
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            static_dir: PathBuf::from("static"),
        }
    }
}

/// Camera facade settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub enabled: bool,
    pub devices: Vec<CameraDeviceConfig>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            devices: vec![CameraDeviceConfig::default()],
        }
    }
}

/// A single capture source: either a local V4L2 device node or an
/// HTTP snapshot URL (IP camera)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraDeviceConfig {
    pub id: u32,
    pub name: String,
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// ffmpeg MJPEG quality scale (2 = best, 31 = worst)
    pub jpeg_quality: u32,
    /// When set, frames are polled from this URL instead of the device node
    pub snapshot_url: Option<String>,
}

impl Default for CameraDeviceConfig {
    fn default() -> Self {
        Self {
            id: 0,
            name: "Camera".to_string(),
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            fps: 30,
            jpeg_quality: 5,
            snapshot_url: None,
        }
    }
}

/// Media facade settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub enabled: bool,
    pub library_path: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            library_path: "~/media".to_string(),
        }
    }
}

impl MediaConfig {
    /// Library path with a leading `~` expanded to the home directory
    pub fn library_root(&self) -> PathBuf {
        expand_tilde(&self.library_path)
    }
}

/// System facade settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub enabled: bool,
    pub update_interval_secs: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            update_interval_secs: 2,
        }
    }
}

impl DashboardConfig {
    /// Load configuration.
    ///
    /// An explicitly given path must exist and parse. Without one, the
    /// default locations are searched in order; if none exists the
    /// built-in defaults are used with a warning.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            tracing::info!(path = %path.display(), "Loading config");
            return Self::from_file(path);
        }

        for candidate in Self::default_locations() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::from_file(&candidate);
            }
        }

        tracing::warn!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/pi-dashboard/config.json")];
        if let Some(home) = std::env::var_os("HOME") {
            paths.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("pi-dashboard")
                    .join("config.json"),
            );
        }
        paths.push(PathBuf::from("config/config.json"));
        paths.push(PathBuf::from("config/default.json"));
        paths
    }
}

/// Expand a leading `~` to `$HOME`
fn expand_tilde(path: &str) -> PathBuf {
    expand_tilde_in(path, std::env::var_os("HOME"))
}

fn expand_tilde_in(path: &str, home: Option<std::ffi::OsString>) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DashboardConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.camera.enabled);
        assert_eq!(config.camera.devices.len(), 1);
        assert_eq!(config.camera.devices[0].device, "/dev/video0");
        assert_eq!(config.system.update_interval_secs, 2);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let raw = r#"{
            "server": { "port": 9000 },
            "media": { "enabled": false, "library_path": "/srv/media" }
        }"#;
        let config: DashboardConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(!config.media.enabled);
        assert_eq!(config.media.library_root(), PathBuf::from("/srv/media"));
        assert!(config.system.enabled);
    }

    #[test]
    fn test_load_missing_explicit_path_errors() {
        let err = DashboardConfig::load(Some(Path::new("/nonexistent/config.json")));
        assert!(err.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "system": { "update_interval_secs": 5 } }"#).unwrap();

        let config = DashboardConfig::load(Some(&path)).unwrap();
        assert_eq!(config.system.update_interval_secs, 5);
    }

    #[test]
    fn test_expand_tilde() {
        let home = Some(std::ffi::OsString::from("/home/pi"));
        assert_eq!(
            expand_tilde_in("~/media", home.clone()),
            PathBuf::from("/home/pi/media")
        );
        assert_eq!(
            expand_tilde_in("/srv/media", home),
            PathBuf::from("/srv/media")
        );
        assert_eq!(expand_tilde_in("~/media", None), PathBuf::from("~/media"));
    }
}
