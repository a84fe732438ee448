//! MediaLibrary - Media File Scanning and Playback State
//!
//! ## Responsibilities
//!
//! - One-shot recursive scan of the library directory
//! - Flat listing (video/audio derived from extension), sorted by name
//! - Safe relative-path resolution for the streaming endpoint
//! - Current playback state for push-channel notifications

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;
use walkdir::WalkDir;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "m4v", "webm"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav", "flac", "ogg"];

/// Media kind derived from file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// Classify an extension (without dot, any case); unsupported -> None
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "video" => Ok(MediaKind::Video),
            "audio" => Ok(MediaKind::Audio),
            other => Err(Error::Validation(format!("unknown media type: {}", other))),
        }
    }
}

/// A single library entry, immutable once produced by a scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    /// File stem (display name)
    pub name: String,
    pub filename: String,
    pub path: String,
    /// Path relative to the library root, used by the streaming endpoint
    pub relative_path: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub extension: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Library statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryStats {
    pub total_files: usize,
    pub video_files: usize,
    pub audio_files: usize,
    pub library_path: String,
}

/// Playback status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Stopped => "stopped",
        }
    }
}

/// MediaLibrary instance
pub struct MediaLibrary {
    root: PathBuf,
    files: RwLock<Vec<MediaFile>>,
    /// Playback slot: status plus the current item (None when stopped)
    playback: RwLock<(PlaybackStatus, Option<MediaFile>)>,
}

impl MediaLibrary {
    /// Create a library rooted at `root`; no scan is performed yet
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            files: RwLock::new(Vec::new()),
            playback: RwLock::new((PlaybackStatus::Stopped, None)),
        }
    }

    /// Library root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rescan the library, replacing the listing wholesale.
    ///
    /// A missing root logs a warning and yields an empty listing.
    pub async fn scan(&self) -> Vec<MediaFile> {
        let root = self.root.clone();
        let scanned = tokio::task::spawn_blocking(move || scan_dir(&root))
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Media scan task failed");
                Vec::new()
            });

        tracing::info!(count = scanned.len(), root = %self.root.display(), "Media library scanned");

        let mut files = self.files.write().await;
        *files = scanned.clone();
        scanned
    }

    /// Current listing, optionally filtered by kind
    pub async fn files(&self, kind: Option<MediaKind>) -> Vec<MediaFile> {
        let files = self.files.read().await;
        match kind {
            Some(kind) => files.iter().filter(|f| f.kind == kind).cloned().collect(),
            None => files.clone(),
        }
    }

    /// Look up a file by its relative path
    pub async fn find(&self, relative_path: &str) -> Option<MediaFile> {
        let files = self.files.read().await;
        files.iter().find(|f| f.relative_path == relative_path).cloned()
    }

    /// Library statistics
    pub async fn stats(&self) -> LibraryStats {
        let files = self.files.read().await;
        let video_files = files.iter().filter(|f| f.kind == MediaKind::Video).count();
        let audio_files = files.iter().filter(|f| f.kind == MediaKind::Audio).count();
        LibraryStats {
            total_files: files.len(),
            video_files,
            audio_files,
            library_path: self.root.display().to_string(),
        }
    }

    /// Resolve a client-supplied relative path under the library root.
    ///
    /// Rejects absolute paths and any `..` component.
    pub fn resolve(&self, relative_path: &str) -> Result<PathBuf> {
        let rel = Path::new(relative_path);
        if rel.is_absolute() {
            return Err(Error::Validation("absolute paths not allowed".to_string()));
        }
        for component in rel.components() {
            match component {
                Component::Normal(_) => {}
                _ => {
                    return Err(Error::Validation(format!(
                        "invalid path component in: {}",
                        relative_path
                    )))
                }
            }
        }
        Ok(self.root.join(rel))
    }

    /// Start playing an item
    pub async fn play(&self, file: MediaFile) {
        let mut playback = self.playback.write().await;
        tracing::info!(name = %file.name, "Playing");
        *playback = (PlaybackStatus::Playing, Some(file));
    }

    /// Pause playback, keeping the current item
    pub async fn pause(&self) {
        let mut playback = self.playback.write().await;
        playback.0 = PlaybackStatus::Paused;
    }

    /// Stop playback and clear the current item
    pub async fn stop(&self) {
        let mut playback = self.playback.write().await;
        *playback = (PlaybackStatus::Stopped, None);
    }

    /// Current playback status and item
    pub async fn playback(&self) -> (PlaybackStatus, Option<MediaFile>) {
        self.playback.read().await.clone()
    }
}

/// One-shot recursive scan, sorted case-insensitively by name.
///
/// Unreadable entries and files without a supported extension are skipped.
fn scan_dir(root: &Path) -> Vec<MediaFile> {
    if !root.exists() {
        tracing::warn!(root = %root.display(), "Media library path does not exist");
        return Vec::new();
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();

        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => continue,
        };
        let kind = match MediaKind::from_extension(&ext) {
            Some(kind) => kind,
            None => continue,
        };

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                continue;
            }
        };

        let relative_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();

        files.push(MediaFile {
            name: path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
            filename: path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
            path: path.to_string_lossy().to_string(),
            relative_path,
            kind,
            extension: ext,
            size: metadata.len(),
            modified: metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
        });
    }

    files.sort_by_key(|f| f.name.to_lowercase());
    files
}

/// Content-Type for a library file extension
pub fn content_type_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}
