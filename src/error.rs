// Error response body shared by every error type exposed over HTTP

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Consistent error response structure
///
/// Machine-readable `error_code` plus a human-readable `message` that is safe
/// to show to clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "INVALID_ARGUMENT", "NOT_FOUND")
    pub error_code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (e.g., field-level validation errors)
    /// Omitted from JSON when None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// RFC 3339 timestamp of when the error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_code: &str, message: String) -> Self {
        Self {
            error_code: error_code.to_string(),
            message,
            details: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_omitted_when_absent() {
        let body = serde_json::to_value(ErrorResponse::new("NOT_FOUND", "missing".into())).unwrap();
        assert_eq!(body["error_code"], "NOT_FOUND");
        assert!(body.get("details").is_none());
        assert!(body["timestamp"].is_string());
    }
}
