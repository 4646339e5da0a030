//! Unit tests for the domain models and wire contract.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Utc;
use uuid::Uuid;

use weatherbus::models::{
    HTTP_PUBLISHER_SOURCE, LOCATIONS, MessagePublishResponse, PublishMessageRequest,
    RANDOM_PUBLISHER_SOURCE, SUMMARIES, WeatherUpdateMessage, fahrenheit_of,
};

mod fahrenheit {
    use super::*;

    /// The conversion deliberately uses the legacy `32 + c / 0.5556` formula
    /// with truncation, not the exact 9/5 conversion. These cases pin the
    /// behavior, including the points where the two formulas diverge.
    #[test]
    fn test_known_values() {
        let cases = [
            (0, 32),    // agrees with the exact conversion
            (10, 49),   // exact conversion: 50
            (20, 67),   // exact conversion: 68
            (25, 76),   // exact conversion: 77
            (30, 85),   // exact conversion: 86
            (55, 130),  // exact conversion: 131
            (100, 211), // exact conversion: 212
            (-20, -3),  // exact conversion: -4
        ];

        for (celsius, expected) in cases {
            assert_eq!(
                fahrenheit_of(celsius),
                expected,
                "fahrenheit_of({celsius})"
            );
        }
    }

    #[test]
    fn test_derivation_diverges_from_exact_conversion() {
        // The whole point of pinning the formula: 20°C must NOT map to the
        // physically correct 68°F
        assert_ne!(fahrenheit_of(20), 68);
    }
}

mod weather_update {
    use super::*;

    #[test]
    fn test_new_message_has_valid_id_and_recent_timestamp() {
        let update = WeatherUpdateMessage::new("London", 25, "Warm", HTTP_PUBLISHER_SOURCE);

        assert!(Uuid::parse_str(&update.id).is_ok());
        let age = (Utc::now() - update.timestamp).num_seconds().abs();
        assert!(age < 60, "timestamp should be close to now");
    }

    #[test]
    fn test_distinct_messages_get_distinct_ids() {
        let a = WeatherUpdateMessage::new("London", 25, "Warm", HTTP_PUBLISHER_SOURCE);
        let b = WeatherUpdateMessage::new("London", 25, "Warm", HTTP_PUBLISHER_SOURCE);

        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        for (location, celsius, summary, source) in [
            ("New York", 25, "Warm", HTTP_PUBLISHER_SOURCE),
            ("Oslo", -18, "Freezing", RANDOM_PUBLISHER_SOURCE),
            ("", 0, "", HTTP_PUBLISHER_SOURCE),
        ] {
            let update = WeatherUpdateMessage::new(location, celsius, summary, source);
            let json = update.to_json().unwrap();
            let parsed = WeatherUpdateMessage::from_json(&json)
                .unwrap()
                .expect("serialized update should parse");

            assert_eq!(parsed, update);
        }
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let update = WeatherUpdateMessage::new("Tokyo", 31, "Hot", HTTP_PUBLISHER_SOURCE);
        let json = update.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        for field in [
            "id",
            "location",
            "temperatureC",
            "temperatureF",
            "summary",
            "timestamp",
            "source",
        ] {
            assert!(value.get(field).is_some(), "missing wire field {field}");
        }
    }

    #[test]
    fn test_null_body_parses_to_none() {
        assert!(WeatherUpdateMessage::from_json("null").unwrap().is_none());
    }

    #[test]
    fn test_malformed_bodies_error() {
        for body in ["{truncated", "[1,2,3]", "\"just a string\"", "tru"] {
            assert!(
                WeatherUpdateMessage::from_json(body).is_err(),
                "body {body:?} should fail to parse"
            );
        }
    }

    #[test]
    fn test_value_pools_have_expected_sizes() {
        assert_eq!(LOCATIONS.len(), 8);
        assert_eq!(SUMMARIES.len(), 10);
    }
}

mod api_contract {
    use super::*;

    #[test]
    fn test_publish_request_accepts_full_payload() {
        let request: PublishMessageRequest = serde_json::from_str(
            r#"{"location":"Mumbai","temperatureC":41,"summary":"Scorching"}"#,
        )
        .unwrap();

        assert_eq!(request.location, "Mumbai");
        assert_eq!(request.temperature_c, 41);
    }

    #[test]
    fn test_publish_request_defaults_missing_location() {
        let request: PublishMessageRequest =
            serde_json::from_str(r#"{"temperatureC":5}"#).unwrap();

        assert_eq!(request.location, "Unknown");
        assert_eq!(request.temperature_c, 5);
    }

    #[test]
    fn test_publish_response_success_shape() {
        let response = MessagePublishResponse {
            success: true,
            message_id: Uuid::new_v4().to_string(),
            message: "Weather update for Mumbai published successfully".to_string(),
            timestamp: Utc::now(),
            error_details: None,
        };

        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&response).unwrap()).unwrap();

        assert_eq!(value["success"], true);
        assert!(value.get("messageId").is_some());
        assert!(value.get("errorDetails").is_none());
    }

    #[test]
    fn test_publish_response_failure_shape() {
        let response = MessagePublishResponse::failure("Request body is empty");
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&response).unwrap()).unwrap();

        assert_eq!(value["success"], false);
        assert_eq!(value["errorDetails"], "Request body is empty");
    }
}
