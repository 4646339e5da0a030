//! Wire envelope for queue messages.
//!
//! The envelope carries the broker-level metadata alongside the serialized
//! domain body: message id, content type, subject, routing properties, and -
//! on dead-letter copies - the reason and description. The whole envelope is
//! serialized as the payload of a broker message.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content type attached to every published envelope.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Subject for updates built from an HTTP request payload.
pub const SUBJECT_WEATHER_UPDATE: &str = "WeatherUpdate";

/// Subject for updates built from server-generated random values.
pub const SUBJECT_RANDOM_WEATHER_UPDATE: &str = "RandomWeatherUpdate";

/// Why a message was moved to the dead-letter queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    /// The body deserialized to no usable message
    InvalidMessageFormat,
    /// The body was not valid JSON
    JsonParsingError,
    /// Processing kept failing until the delivery-count ceiling
    MaxDeliveryCountExceeded,
}

impl DeadLetterReason {
    /// The reason string recorded on the dead-letter envelope.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterReason::InvalidMessageFormat => "InvalidMessageFormat",
            DeadLetterReason::JsonParsingError => "JsonParsingError",
            DeadLetterReason::MaxDeliveryCountExceeded => "MaxDeliveryCountExceeded",
        }
    }
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broker message envelope as it travels on the wire.
///
/// Parsing is lenient about the optional fields so older payloads (or hand
/// published ones) still deserialize; `message_id`, `subject`, and `body` are
/// required to distinguish an envelope from arbitrary JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEnvelope {
    /// Broker message identifier, mirrors the domain message id
    pub message_id: String,
    /// MIME type of `body`
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Message subject used for routing/filtering
    pub subject: String,
    /// Custom routing properties (`Location`, `Temperature`, `Source`)
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Serialized domain message
    pub body: String,
    /// When the producer placed the message on the queue
    #[serde(default = "Utc::now")]
    pub enqueued_at: DateTime<Utc>,
    /// Dead-letter reason, set only on dead-letter copies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_letter_reason: Option<String>,
    /// Human-readable dead-letter detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_letter_description: Option<String>,
}

fn default_content_type() -> String {
    CONTENT_TYPE_JSON.to_string()
}

impl QueueEnvelope {
    /// Create an envelope for the given body.
    pub fn new(
        message_id: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            content_type: CONTENT_TYPE_JSON.to_string(),
            subject: subject.into(),
            properties: BTreeMap::new(),
            body: body.into(),
            enqueued_at: Utc::now(),
            dead_letter_reason: None,
            dead_letter_description: None,
        }
    }

    /// Wrap a payload that did not parse as an envelope.
    ///
    /// Messages placed on the queue by other producers arrive as bare bodies;
    /// the consumer still classifies them, so they get a synthetic envelope
    /// with an unknown message id.
    pub fn from_bare_body(body: impl Into<String>) -> Self {
        Self {
            message_id: "unknown".to_string(),
            content_type: CONTENT_TYPE_JSON.to_string(),
            subject: String::new(),
            properties: BTreeMap::new(),
            body: body.into(),
            enqueued_at: Utc::now(),
            dead_letter_reason: None,
            dead_letter_description: None,
        }
    }

    /// Attach a routing property.
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Produce the dead-letter copy of this envelope.
    pub fn into_dead_letter(
        mut self,
        reason: DeadLetterReason,
        description: impl Into<String>,
    ) -> Self {
        self.dead_letter_reason = Some(reason.as_str().to_string());
        self.dead_letter_description = Some(description.into());
        self
    }

    /// Serialize for the broker payload.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a broker payload into an envelope, falling back to a synthetic
    /// envelope around the raw payload when it is not envelope-shaped.
    pub fn from_payload(payload: &str) -> Self {
        serde_json::from_str(payload).unwrap_or_else(|_| Self::from_bare_body(payload))
    }
}

/// A single delivery handed to the consumer by the queue worker.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The delivered envelope
    pub envelope: QueueEnvelope,
    /// Offset of the message within the queue partition
    pub offset: u64,
    /// How many times this message has been delivered (1 = first delivery)
    pub delivery_count: u32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dead_letter_reason_strings() {
        assert_eq!(
            DeadLetterReason::InvalidMessageFormat.as_str(),
            "InvalidMessageFormat"
        );
        assert_eq!(DeadLetterReason::JsonParsingError.as_str(), "JsonParsingError");
        assert_eq!(
            DeadLetterReason::MaxDeliveryCountExceeded.to_string(),
            "MaxDeliveryCountExceeded"
        );
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = QueueEnvelope::new("msg-1", SUBJECT_WEATHER_UPDATE, r#"{"a":1}"#)
            .with_property("Location", json!("London"))
            .with_property("Temperature", json!(25))
            .with_property("Source", json!("http-publisher"));

        let json = envelope.to_json().unwrap();
        assert!(json.contains("\"messageId\":\"msg-1\""));
        assert!(json.contains("\"contentType\":\"application/json\""));
        assert!(!json.contains("deadLetterReason"));

        let parsed = QueueEnvelope::from_payload(&json);
        assert_eq!(parsed, envelope);
        assert_eq!(parsed.properties.get("Temperature"), Some(&json!(25)));
    }

    #[test]
    fn test_dead_letter_copy_carries_reason() {
        let envelope = QueueEnvelope::new("msg-2", SUBJECT_WEATHER_UPDATE, "not json")
            .into_dead_letter(DeadLetterReason::JsonParsingError, "expected value at line 1");

        assert_eq!(envelope.dead_letter_reason.as_deref(), Some("JsonParsingError"));
        assert_eq!(
            envelope.dead_letter_description.as_deref(),
            Some("expected value at line 1")
        );

        let json = envelope.to_json().unwrap();
        assert!(json.contains("\"deadLetterReason\":\"JsonParsingError\""));
    }

    #[test]
    fn test_non_envelope_payload_becomes_bare_body() {
        let parsed = QueueEnvelope::from_payload("{garbage");

        assert_eq!(parsed.message_id, "unknown");
        assert_eq!(parsed.body, "{garbage");
    }

    #[test]
    fn test_bare_domain_json_becomes_bare_body() {
        // A weather update published without an envelope lacks the required
        // envelope fields, so the whole payload is treated as the body
        let payload = r#"{"location":"Tokyo","temperatureC":30}"#;
        let parsed = QueueEnvelope::from_payload(payload);

        assert_eq!(parsed.body, payload);
    }
}
