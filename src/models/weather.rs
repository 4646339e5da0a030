//! Weather update domain model shared by the publisher and the queue consumer.
//!
//! # Wire Format
//!
//! Messages travel as camelCase JSON. Parsing is deliberately lenient: every
//! field has a default so that partial payloads still deserialize, matching
//! the tolerance expected of queue consumers that must accept anything the
//! producer (or an older producer version) emitted.
//!
//! # Fahrenheit Derivation
//!
//! `temperatureF` is derived as `32 + (temperatureC / 0.5556)` with truncation
//! toward zero. This divisor is not the exact 9/5 conversion factor; it is
//! preserved for wire compatibility with existing consumers. Do not "fix" it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Source tag for messages created from an HTTP request payload.
pub const HTTP_PUBLISHER_SOURCE: &str = "http-publisher";

/// Source tag for messages created with server-generated random values.
pub const RANDOM_PUBLISHER_SOURCE: &str = "random-publisher";

/// Locations used by the random publisher.
pub const LOCATIONS: [&str; 8] = [
    "New York", "London", "Tokyo", "Sydney", "Paris", "Berlin", "Mumbai", "Toronto",
];

/// Summaries used by the random publisher and the forecast endpoint.
pub const SUMMARIES: [&str; 10] = [
    "Freezing",
    "Bracing",
    "Chilly",
    "Cool",
    "Mild",
    "Warm",
    "Balmy",
    "Hot",
    "Sweltering",
    "Scorching",
];

/// Lower bound (inclusive) of generated Celsius temperatures.
pub const MIN_RANDOM_TEMPERATURE_C: i32 = -20;

/// Upper bound (exclusive) of generated Celsius temperatures.
pub const MAX_RANDOM_TEMPERATURE_C: i32 = 55;

/// Derive Fahrenheit from Celsius using the legacy divisor.
///
/// Truncates toward zero, so e.g. 20°C maps to 67°F where the exact
/// conversion would give 68°F.
pub fn fahrenheit_of(temperature_c: i32) -> i32 {
    32 + (f64::from(temperature_c) / 0.5556) as i32
}

/// A weather update as it travels through the queue.
///
/// Constructed by the publisher, serialized to JSON for the queue body, and
/// never mutated after creation. `temperature_f` is always re-derived from
/// `temperature_c` when parsing, so a mismatched value on the wire is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherUpdateMessage {
    /// Unique message identifier, generated when absent from the payload
    #[serde(default = "new_message_id")]
    pub id: String,
    /// Free-text location
    #[serde(default)]
    pub location: String,
    /// Temperature in Celsius
    #[serde(default)]
    pub temperature_c: i32,
    /// Derived Fahrenheit reading (see module docs for the exact formula)
    #[serde(default, skip_deserializing)]
    pub temperature_f: i32,
    /// Free-text weather description
    #[serde(default)]
    pub summary: String,
    /// Creation instant, UTC
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Which producer path created the message
    #[serde(default = "default_source")]
    pub source: String,
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_source() -> String {
    "weather-api".to_string()
}

impl WeatherUpdateMessage {
    /// Create a new update with a fresh id and the current timestamp.
    pub fn new(
        location: impl Into<String>,
        temperature_c: i32,
        summary: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: new_message_id(),
            location: location.into(),
            temperature_c,
            temperature_f: fahrenheit_of(temperature_c),
            summary: summary.into(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }

    /// Serialize to the camelCase JSON wire format.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a queue body.
    ///
    /// Returns `Ok(None)` when the body is JSON `null` (a payload with no
    /// usable message) and `Err` when the body is not valid JSON for this
    /// shape. The Fahrenheit reading is re-derived after parsing.
    pub fn from_json(body: &str) -> serde_json::Result<Option<Self>> {
        let parsed: Option<Self> = serde_json::from_str(body)?;
        Ok(parsed.map(|mut update| {
            update.temperature_f = fahrenheit_of(update.temperature_c);
            update
        }))
    }
}

/// A single forecast record for the sample API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherForecast {
    /// Forecast date
    pub date: NaiveDate,
    /// Temperature in Celsius
    pub temperature_c: i32,
    /// Free-text summary
    pub summary: String,
    /// Derived Fahrenheit reading (same formula as queue messages)
    pub temperature_f: i32,
}

impl WeatherForecast {
    /// Build a forecast record, deriving the Fahrenheit value.
    pub fn new(date: NaiveDate, temperature_c: i32, summary: impl Into<String>) -> Self {
        Self {
            date,
            temperature_c,
            temperature_f: fahrenheit_of(temperature_c),
            summary: summary.into(),
        }
    }
}
