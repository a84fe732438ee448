//! Pi Dashboard Library
//!
//! Local web dashboard for single-board computers.
//!
//! ## Architecture
//!
//! 1. Camera facade - capture device -> locked frame slot -> MJPEG/JPEG/base64
//! 2. Media facade - library scan -> listing + HTTP file streaming
//! 3. System facade - host telemetry -> JSON snapshot + periodic push
//! 4. RealtimeHub - WebSocket distribution
//! 5. WebAPI - HTTP endpoints and the push channel
//!
//! Facades are config-toggled and never depend on each other.

pub mod camera;
pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod realtime_hub;
pub mod state;
pub mod system;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
