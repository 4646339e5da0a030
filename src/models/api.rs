use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request body for `POST /weather/publish`.
///
/// Parsing is lenient to match the queue message model: a missing location
/// falls back to `"Unknown"` and the remaining fields default.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishMessageRequest {
    /// Free-text location
    #[serde(default = "default_location")]
    pub location: String,
    /// Temperature in Celsius
    #[serde(default)]
    pub temperature_c: i32,
    /// Free-text weather description
    #[serde(default)]
    pub summary: String,
}

fn default_location() -> String {
    "Unknown".to_string()
}

/// Response body for the publish endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePublishResponse {
    /// Whether the message was placed on the queue
    pub success: bool,
    /// Identifier of the published message (empty on failure)
    #[serde(default)]
    pub message_id: String,
    /// Human-readable outcome description
    pub message: String,
    /// Response timestamp
    pub timestamp: DateTime<Utc>,
    /// Sanitized failure detail, present only on errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl MessagePublishResponse {
    /// Build a failure response with the given status message.
    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            message_id: String::new(),
            message: message.clone(),
            timestamp: Utc::now(),
            error_details: Some(message),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
    /// Service version
    pub version: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_request_deserialization() {
        let json = r#"{"location":"London","temperatureC":25,"summary":"Warm"}"#;
        let request: PublishMessageRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.location, "London");
        assert_eq!(request.temperature_c, 25);
        assert_eq!(request.summary, "Warm");
    }

    #[test]
    fn test_publish_request_defaults() {
        let request: PublishMessageRequest = serde_json::from_str("{}").unwrap();

        assert_eq!(request.location, "Unknown");
        assert_eq!(request.temperature_c, 0);
        assert!(request.summary.is_empty());
    }

    #[test]
    fn test_publish_response_serialization_is_camel_case() {
        let response = MessagePublishResponse {
            success: true,
            message_id: "abc-123".to_string(),
            message: "Weather update for London published".to_string(),
            timestamp: Utc::now(),
            error_details: None,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"messageId\":\"abc-123\""));
        assert!(!json.contains("errorDetails"));
    }

    #[test]
    fn test_failure_response_carries_details() {
        let response = MessagePublishResponse::failure("Request body is empty");

        assert!(!response.success);
        assert!(response.message_id.is_empty());
        assert_eq!(
            response.error_details.as_deref(),
            Some("Request body is empty")
        );

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"errorDetails\""));
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "Healthy".to_string(),
            timestamp: Utc::now(),
            version: "0.1.0".to_string(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"Healthy\""));
        assert!(json.contains("\"version\""));
    }
}
