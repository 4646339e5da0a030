//! Consumer service: classifies queue deliveries and runs the processing step.
//!
//! The service never completes, dead-letters, or redelivers anything itself;
//! it returns a [`DeliveryOutcome`] and the queue worker acts on it. This
//! keeps the terminal-versus-retryable decision explicit instead of hiding it
//! in error propagation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::metrics;
use crate::models::WeatherUpdateMessage;
use crate::queue::{Delivery, DeliveryOutcome};

/// Celsius threshold above which a high-temperature alert is logged.
const HIGH_TEMPERATURE_ALERT_C: i32 = 30;

/// Fixed delay when handling a dead-lettered message, standing in for
/// future investigation I/O.
const DEAD_LETTER_HANDLING_DELAY: Duration = Duration::from_millis(50);

/// Service for consuming weather updates from the queue.
///
/// Thread-safe and clonable for use across async tasks. Counters use
/// `Ordering::Relaxed`; they feed metrics only.
#[derive(Clone)]
pub struct ConsumerService {
    config: Arc<Config>,
    /// Total deliveries processed successfully.
    messages_processed: Arc<AtomicU64>,
    /// Total dead-lettered messages handled from the sub-queue.
    dead_letters_handled: Arc<AtomicU64>,
}

impl ConsumerService {
    /// Create a new consumer service.
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            messages_processed: Arc::new(AtomicU64::new(0)),
            dead_letters_handled: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Classify one queue delivery and run the processing step on success.
    #[instrument(skip(self, delivery), fields(message_id = %delivery.envelope.message_id, delivery_count = delivery.delivery_count))]
    pub async fn handle_delivery(&self, delivery: &Delivery) -> DeliveryOutcome {
        info!(
            subject = %delivery.envelope.subject,
            content_type = %delivery.envelope.content_type,
            enqueued_at = %delivery.envelope.enqueued_at,
            "Processing queue delivery"
        );

        let update = match WeatherUpdateMessage::from_json(&delivery.envelope.body) {
            Ok(Some(update)) => update,
            Ok(None) => {
                warn!(body = %delivery.envelope.body, "Message body deserialized to no result");
                return DeliveryOutcome::InvalidFormat;
            }
            Err(e) => {
                warn!(error = %e, "Message body is not valid JSON");
                return DeliveryOutcome::ParseError(e.to_string());
            }
        };

        info!(
            location = %update.location,
            temperature_c = update.temperature_c,
            temperature_f = update.temperature_f,
            summary = %update.summary,
            source = %update.source,
            timestamp = %update.timestamp,
            "Weather update received"
        );

        if !delivery.envelope.properties.is_empty() {
            let properties = delivery
                .envelope
                .properties
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            info!(properties = %properties, "Message properties");
        }

        match self.process(&update).await {
            Ok(()) => {
                self.messages_processed.fetch_add(1, Ordering::Relaxed);
                metrics::record_message_processed();
                DeliveryOutcome::Success
            }
            Err(e) => {
                warn!(error = %e, "Weather data processing failed");
                DeliveryOutcome::ProcessingError(e.to_string())
            }
        }
    }

    /// The downstream processing step.
    ///
    /// Currently a placeholder for real work (persistence, notifications,
    /// cache updates): it waits for the configured delay, raises temperature
    /// alerts, and records telemetry.
    async fn process(&self, update: &WeatherUpdateMessage) -> AppResult<()> {
        sleep(self.config.processing_delay).await;

        if update.temperature_c > HIGH_TEMPERATURE_ALERT_C {
            warn!(
                location = %update.location,
                temperature_c = update.temperature_c,
                "High temperature alert"
            );
            metrics::record_temperature_alert("high");
        } else if update.temperature_c < 0 {
            warn!(
                location = %update.location,
                temperature_c = update.temperature_c,
                "Freezing temperature alert"
            );
            metrics::record_temperature_alert("freezing");
        }

        let queue_lag_seconds = (Utc::now() - update.timestamp)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .as_secs_f64();
        metrics::record_temperatures(update.temperature_c, update.temperature_f);
        metrics::record_processing_lag(queue_lag_seconds);

        info!(
            location = %update.location,
            source = %update.source,
            queue_lag_seconds,
            "Weather data processing completed"
        );

        Ok(())
    }

    /// Handle a message from the dead-letter sub-queue.
    ///
    /// Logs the dead-letter reason, description, and body for investigation.
    /// Returning an error leaves the message in the sub-queue.
    #[instrument(skip(self, delivery), fields(message_id = %delivery.envelope.message_id))]
    pub async fn handle_dead_letter(&self, delivery: &Delivery) -> AppResult<()> {
        warn!(
            reason = delivery.envelope.dead_letter_reason.as_deref().unwrap_or("unknown"),
            description = delivery
                .envelope
                .dead_letter_description
                .as_deref()
                .unwrap_or(""),
            "Processing dead-lettered message"
        );

        info!(body = %delivery.envelope.body, "Dead-letter message body recorded for investigation");

        sleep(DEAD_LETTER_HANDLING_DELAY).await;

        self.dead_letters_handled.fetch_add(1, Ordering::Relaxed);
        metrics::record_dead_letter_handled();

        info!("Dead-letter message logged for investigation");

        Ok(())
    }

    /// Get the total number of deliveries processed successfully.
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    /// Get the total number of dead-lettered messages handled.
    pub fn dead_letters_handled(&self) -> u64 {
        self.dead_letters_handled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::HTTP_PUBLISHER_SOURCE;
    use crate::queue::{QueueEnvelope, SUBJECT_WEATHER_UPDATE};

    fn service() -> ConsumerService {
        let config = Config {
            processing_delay: Duration::from_millis(1),
            ..Config::default()
        };
        ConsumerService::new(Arc::new(config))
    }

    fn delivery_with_body(body: &str) -> Delivery {
        Delivery {
            envelope: QueueEnvelope::new("msg-1", SUBJECT_WEATHER_UPDATE, body),
            offset: 0,
            delivery_count: 1,
        }
    }

    #[tokio::test]
    async fn test_valid_body_processes_successfully() {
        let update = WeatherUpdateMessage::new("London", 25, "Warm", HTTP_PUBLISHER_SOURCE);
        let body = update.to_json().unwrap();

        let service = service();
        let outcome = service.handle_delivery(&delivery_with_body(&body)).await;

        assert_eq!(outcome, DeliveryOutcome::Success);
        assert_eq!(service.messages_processed(), 1);
    }

    #[tokio::test]
    async fn test_null_body_is_invalid_format() {
        let service = service();
        let outcome = service.handle_delivery(&delivery_with_body("null")).await;

        assert_eq!(outcome, DeliveryOutcome::InvalidFormat);
        assert_eq!(service.messages_processed(), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let service = service();
        let outcome = service
            .handle_delivery(&delivery_with_body("{not valid json"))
            .await;

        match outcome {
            DeliveryOutcome::ParseError(detail) => assert!(!detail.is_empty()),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_extreme_temperatures_still_succeed() {
        let service = service();

        for temperature_c in [-15, 40] {
            let update =
                WeatherUpdateMessage::new("Oslo", temperature_c, "Extreme", HTTP_PUBLISHER_SOURCE);
            let body = update.to_json().unwrap();
            let outcome = service.handle_delivery(&delivery_with_body(&body)).await;

            assert_eq!(outcome, DeliveryOutcome::Success);
        }
    }

    #[tokio::test]
    async fn test_dead_letter_handling_counts() {
        let service = service();
        let delivery = Delivery {
            envelope: QueueEnvelope::new("msg-2", SUBJECT_WEATHER_UPDATE, "junk").into_dead_letter(
                crate::queue::DeadLetterReason::JsonParsingError,
                "expected value",
            ),
            offset: 0,
            delivery_count: 1,
        };

        service.handle_dead_letter(&delivery).await.unwrap();
        assert_eq!(service.dead_letters_handled(), 1);
    }
}
