//! Publisher service: builds weather updates and places them on the queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::Utc;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde_json::json;
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{
    HTTP_PUBLISHER_SOURCE, LOCATIONS, MAX_RANDOM_TEMPERATURE_C, MIN_RANDOM_TEMPERATURE_C,
    MessagePublishResponse, PublishMessageRequest, RANDOM_PUBLISHER_SOURCE, SUMMARIES,
    WeatherUpdateMessage,
};
use crate::queue::{
    QueueClient, QueueEnvelope, SUBJECT_RANDOM_WEATHER_UPDATE, SUBJECT_WEATHER_UPDATE,
};

/// Service for publishing weather updates to the queue.
///
/// # Counter Memory Ordering
///
/// The `messages_published` counter uses `Ordering::Relaxed`: it is a
/// monotonically increasing metric counter and nothing depends on its value
/// for correctness.
#[derive(Clone)]
pub struct PublisherService {
    client: QueueClient,
    config: Arc<Config>,
    /// Total messages published (monotonic counter, eventually consistent).
    messages_published: Arc<AtomicU64>,
}

impl PublisherService {
    /// Create a new publisher service.
    pub fn new(client: QueueClient, config: Arc<Config>) -> Self {
        Self {
            client,
            config,
            messages_published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish an update built from an HTTP request payload.
    #[instrument(skip(self, request), fields(location = %request.location))]
    pub async fn publish(
        &self,
        request: PublishMessageRequest,
    ) -> AppResult<MessagePublishResponse> {
        let update = WeatherUpdateMessage::new(
            request.location,
            request.temperature_c,
            request.summary,
            HTTP_PUBLISHER_SOURCE,
        );

        self.publish_update(update, SUBJECT_WEATHER_UPDATE).await
    }

    /// Publish an update with server-generated random values.
    #[instrument(skip(self))]
    pub async fn publish_random(&self) -> AppResult<MessagePublishResponse> {
        // ThreadRng is not Send, so it must not live across the publish await
        let (location, temperature_c, summary) = {
            let mut rng = rand::rng();
            (
                LOCATIONS.choose(&mut rng).copied().unwrap_or("Unknown"),
                rng.random_range(MIN_RANDOM_TEMPERATURE_C..MAX_RANDOM_TEMPERATURE_C),
                SUMMARIES.choose(&mut rng).copied().unwrap_or("Mild"),
            )
        };

        let update =
            WeatherUpdateMessage::new(location, temperature_c, summary, RANDOM_PUBLISHER_SOURCE);

        self.publish_update(update, SUBJECT_RANDOM_WEATHER_UPDATE)
            .await
    }

    /// Serialize, wrap in an envelope with routing properties, and publish.
    async fn publish_update(
        &self,
        update: WeatherUpdateMessage,
        subject: &str,
    ) -> AppResult<MessagePublishResponse> {
        // The queue name is validated at startup; guard anyway so a broken
        // deployment fails before any publish is attempted
        if self.config.queue_name.is_empty() {
            return Err(AppError::ConfigError("Queue name not configured".to_string()));
        }

        let body = update.to_json()?;
        let envelope = QueueEnvelope::new(&update.id, subject, body)
            .with_property("Location", json!(update.location))
            .with_property("Temperature", json!(update.temperature_c))
            .with_property("Source", json!(update.source));

        let started = Instant::now();
        self.client.publish(&self.config.queue_name, &envelope).await?;

        self.messages_published.fetch_add(1, Ordering::Relaxed);
        metrics::record_message_published(subject);
        metrics::record_publish_duration(started.elapsed().as_secs_f64());

        info!(
            message_id = %update.id,
            location = %update.location,
            temperature_c = update.temperature_c,
            summary = %update.summary,
            "Weather update published"
        );

        Ok(MessagePublishResponse {
            success: true,
            message_id: update.id,
            message: format!("Weather update for {} published successfully", update.location),
            timestamp: Utc::now(),
            error_details: None,
        })
    }

    /// Get the total number of messages published.
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }
}
