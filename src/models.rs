//! Shared models and types
//!
//! Types shared across multiple modules to avoid circular dependencies.

use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub camera_enabled: bool,
    pub media_enabled: bool,
    pub system_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_success_shape() {
        let resp = ApiResponse::success(42);
        assert!(resp.ok);
        assert_eq!(resp.data, Some(42));
        assert!(resp.error.is_none());

        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_api_response_error_shape() {
        let resp: ApiResponse<()> = ApiResponse::error("boom");
        assert!(!resp.ok);
        assert_eq!(resp.error.as_deref(), Some("boom"));
    }
}
