//! Prometheus metrics for application observability.
//!
//! Metrics are exposed via a dedicated HTTP listener (default port: 9090).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `weatherbus_messages_published_total` - Messages published (label: subject)
//! - `weatherbus_messages_processed_total` - Deliveries processed successfully
//! - `weatherbus_messages_dead_lettered_total` - Dead-lettered messages (label: reason)
//! - `weatherbus_redeliveries_total` - Deliveries left uncompleted for retry
//! - `weatherbus_dead_letters_handled_total` - Messages drained from the dead-letter queue
//! - `weatherbus_temperature_alerts_total` - Temperature alerts (label: kind)
//!
//! ## Histograms
//! - `weatherbus_publish_duration_seconds` - Queue publish duration
//! - `weatherbus_processing_lag_seconds` - Time from enqueue to processed
//! - `weatherbus_temperature_celsius` / `weatherbus_temperature_fahrenheit` - Observed readings
//!
//! ## Gauges
//! - `weatherbus_broker_connection_status` - 1 = connected, 0 = disconnected

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const MESSAGES_PUBLISHED_TOTAL: &str = "weatherbus_messages_published_total";
    pub const MESSAGES_PROCESSED_TOTAL: &str = "weatherbus_messages_processed_total";
    pub const MESSAGES_DEAD_LETTERED_TOTAL: &str = "weatherbus_messages_dead_lettered_total";
    pub const REDELIVERIES_TOTAL: &str = "weatherbus_redeliveries_total";
    pub const DEAD_LETTERS_HANDLED_TOTAL: &str = "weatherbus_dead_letters_handled_total";
    pub const TEMPERATURE_ALERTS_TOTAL: &str = "weatherbus_temperature_alerts_total";
    pub const PUBLISH_DURATION_SECONDS: &str = "weatherbus_publish_duration_seconds";
    pub const PROCESSING_LAG_SECONDS: &str = "weatherbus_processing_lag_seconds";
    pub const TEMPERATURE_CELSIUS: &str = "weatherbus_temperature_celsius";
    pub const TEMPERATURE_FAHRENHEIT: &str = "weatherbus_temperature_fahrenheit";
    pub const BROKER_CONNECTION_STATUS: &str = "weatherbus_broker_connection_status";
}

/// Initialize the Prometheus metrics exporter.
///
/// Sets up metric descriptions and starts the Prometheus HTTP listener on
/// the given address.
///
/// # Errors
///
/// Returns an error message when the exporter cannot be installed.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::MESSAGES_PUBLISHED_TOTAL,
        "Total number of weather updates published to the queue"
    );
    describe_counter!(
        names::MESSAGES_PROCESSED_TOTAL,
        "Total number of queue deliveries processed successfully"
    );
    describe_counter!(
        names::MESSAGES_DEAD_LETTERED_TOTAL,
        "Total number of messages moved to the dead-letter queue"
    );
    describe_counter!(
        names::REDELIVERIES_TOTAL,
        "Total number of deliveries left uncompleted for redelivery"
    );
    describe_counter!(
        names::DEAD_LETTERS_HANDLED_TOTAL,
        "Total number of messages drained from the dead-letter queue"
    );
    describe_counter!(
        names::TEMPERATURE_ALERTS_TOTAL,
        "Total number of high/freezing temperature alerts"
    );

    describe_histogram!(
        names::PUBLISH_DURATION_SECONDS,
        "Queue publish operation duration in seconds"
    );
    describe_histogram!(
        names::PROCESSING_LAG_SECONDS,
        "Seconds between message enqueue and processing completion"
    );
    describe_histogram!(names::TEMPERATURE_CELSIUS, "Observed temperatures in Celsius");
    describe_histogram!(
        names::TEMPERATURE_FAHRENHEIT,
        "Observed temperatures in Fahrenheit"
    );

    describe_gauge!(
        names::BROKER_CONNECTION_STATUS,
        "Broker connection status (1 = connected, 0 = disconnected)"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record a published message.
pub fn record_message_published(subject: &str) {
    counter!(names::MESSAGES_PUBLISHED_TOTAL, "subject" => subject.to_string()).increment(1);
}

/// Record a successfully processed delivery.
pub fn record_message_processed() {
    counter!(names::MESSAGES_PROCESSED_TOTAL).increment(1);
}

/// Record a dead-lettered message with its reason.
pub fn record_message_dead_lettered(reason: &str) {
    counter!(names::MESSAGES_DEAD_LETTERED_TOTAL, "reason" => reason.to_string()).increment(1);
}

/// Record a delivery left for redelivery.
pub fn record_redelivery() {
    counter!(names::REDELIVERIES_TOTAL).increment(1);
}

/// Record a message drained from the dead-letter queue.
pub fn record_dead_letter_handled() {
    counter!(names::DEAD_LETTERS_HANDLED_TOTAL).increment(1);
}

/// Record a temperature alert ("high" or "freezing").
pub fn record_temperature_alert(kind: &str) {
    counter!(names::TEMPERATURE_ALERTS_TOTAL, "kind" => kind.to_string()).increment(1);
}

/// Record queue publish duration.
pub fn record_publish_duration(duration_secs: f64) {
    histogram!(names::PUBLISH_DURATION_SECONDS).record(duration_secs);
}

/// Record the enqueue-to-processed lag of a delivery.
pub fn record_processing_lag(lag_secs: f64) {
    histogram!(names::PROCESSING_LAG_SECONDS).record(lag_secs);
}

/// Record the temperature readings of a processed update.
pub fn record_temperatures(celsius: i32, fahrenheit: i32) {
    histogram!(names::TEMPERATURE_CELSIUS).record(f64::from(celsius));
    histogram!(names::TEMPERATURE_FAHRENHEIT).record(f64::from(fahrenheit));
}

/// Update the broker connection status gauge.
pub fn set_connection_status(connected: bool) {
    gauge!(names::BROKER_CONNECTION_STATUS).set(if connected { 1.0 } else { 0.0 });
}
