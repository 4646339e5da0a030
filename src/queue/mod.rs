//! Queue layer over the Iggy broker.
//!
//! This module maps queue semantics onto Iggy topics:
//!
//! - A queue is a single-partition topic consumed in order.
//! - Completing a delivery stores the consumer offset past the message.
//! - Dead-lettering publishes the envelope (with reason and description) to
//!   the companion `<queue>.dead-letter` topic.
//! - Leaving a delivery uncompleted redelivers it on the next poll of the
//!   same offset; the worker enforces the delivery-count ceiling.
//!
//! # Module Structure
//!
//! - `connection` - Connection state tracking for reconnection coordination
//! - `envelope` - Wire envelope, dead-letter reasons, delivery types
//! - `worker` - Queue and dead-letter worker loops plus the outcome state machine
//! - `scopeguard` - RAII guard for cleanup on drop
//!
//! # Connection Resilience
//!
//! `QueueClient` reconnects automatically with exponential backoff and
//! jitter, bounded by a maximum delay and an optional attempt limit. Every
//! operation is bounded by a configurable timeout.

mod connection;
mod envelope;
mod scopeguard;
mod worker;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use iggy::prelude::*;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};

// Re-exports for public API
pub use connection::ConnectionState;
pub use envelope::{
    CONTENT_TYPE_JSON, DeadLetterReason, Delivery, QueueEnvelope, SUBJECT_RANDOM_WEATHER_UPDATE,
    SUBJECT_WEATHER_UPDATE,
};
pub use worker::{DeliveryAction, DeliveryOutcome, QueueWorker, resolve_action};

// =============================================================================
// Constants
// =============================================================================

/// Queues are single-lane: every queue topic uses this partition.
const QUEUE_PARTITION_ID: u32 = 0;

/// Jitter percentage for exponential backoff (±20%).
///
/// Randomized retry delays keep a fleet of clients from reconnecting in
/// lock-step after a broker restart.
const BACKOFF_JITTER_PERCENT: f64 = 0.2;

/// Minimum delay between reconnection attempts in milliseconds.
const MIN_RECONNECT_DELAY_MS: u64 = 100;

/// A message polled from a queue topic, before the worker attaches its
/// delivery count.
#[derive(Debug, Clone)]
pub struct PolledEnvelope {
    /// The parsed (or synthetic) envelope
    pub envelope: QueueEnvelope,
    /// Offset of the message within the queue partition
    pub offset: u64,
}

// =============================================================================
// QueueClient
// =============================================================================

/// Resilient broker client exposing queue operations.
///
/// Thread-safe and clonable; the underlying Iggy client sits behind an
/// `RwLock` so reconnection can swap it while readers are blocked only for
/// the swap itself.
#[derive(Clone)]
pub struct QueueClient {
    /// The underlying Iggy client (behind RwLock for reconnection)
    client: Arc<RwLock<IggyClient>>,
    /// Application configuration
    config: Config,
    /// Connection state tracking
    state: Arc<ConnectionState>,
}

impl QueueClient {
    /// Create a new queue client from configuration.
    ///
    /// Establishes the initial connection to the broker. If connection fails,
    /// returns an error immediately (no automatic retry on initial connection).
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConnectionFailed` if the connection string is
    /// invalid, the broker is unreachable, or authentication fails.
    #[instrument(skip(config))]
    pub async fn new(config: Config) -> AppResult<Self> {
        info!("Initializing broker client");

        let client = IggyClient::from_connection_string(&config.broker_connection_string)
            .map_err(|e| AppError::ConnectionFailed(e.to_string()))?;

        let wrapper = Self {
            client: Arc::new(RwLock::new(client)),
            config,
            state: Arc::new(ConnectionState::new()),
        };

        wrapper.connect().await?;

        Ok(wrapper)
    }

    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Connect to the broker.
    ///
    /// Called automatically during construction and reconnection.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> AppResult<()> {
        let client = self.client.read().await;

        client
            .connect()
            .await
            .map_err(|e| AppError::ConnectionFailed(e.to_string()))?;

        self.state.set_connected(true);
        info!("Successfully connected to broker");

        Ok(())
    }

    /// Check if the client is currently connected.
    ///
    /// Reflects the last known state, not a live probe.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Attempt to reconnect to the broker with exponential backoff.
    ///
    /// If multiple tasks call reconnect simultaneously, only one performs the
    /// reconnection; the others wait on the shared connection state.
    #[instrument(skip(self))]
    async fn reconnect(&self) -> AppResult<()> {
        if !self.state.start_reconnecting() {
            debug!("Reconnection already in progress, waiting for completion...");
            self.state.wait_for_reconnection().await;

            return if self.state.is_connected() {
                Ok(())
            } else {
                Err(AppError::ConnectionFailed(
                    "Reconnection failed (attempted by another task)".to_string(),
                ))
            };
        }

        // Guard so the reconnecting flag is cleared on every exit path
        let _guard = scopeguard::guard((), |_| {
            self.state.stop_reconnecting();
        });

        self.state.set_connected(false);
        let max_attempts = self.config.max_reconnect_attempts;

        loop {
            let attempt = self.state.increment_attempts();

            if max_attempts > 0 && attempt > max_attempts {
                error!(
                    attempts = attempt - 1,
                    max_attempts, "Maximum reconnection attempts exceeded"
                );
                return Err(AppError::ConnectionFailed(format!(
                    "Failed to reconnect after {max_attempts} attempts"
                )));
            }

            // Exponential backoff with jitter, capped at the configured max
            let base_delay = self.config.reconnect_base_delay.as_millis() as u64;
            let delay_ms = (base_delay * 2u64.saturating_pow(attempt.saturating_sub(1)))
                .min(self.config.reconnect_max_delay.as_millis() as u64);
            let jitter =
                (delay_ms as f64 * BACKOFF_JITTER_PERCENT * (rand_jitter() * 2.0 - 1.0)) as i64;
            let final_delay = (delay_ms as i64 + jitter).max(MIN_RECONNECT_DELAY_MS as i64) as u64;

            warn!(
                attempt,
                delay_ms = final_delay,
                "Attempting to reconnect to broker"
            );

            sleep(Duration::from_millis(final_delay)).await;

            match IggyClient::from_connection_string(&self.config.broker_connection_string) {
                Ok(new_client) => {
                    if let Err(e) = new_client.connect().await {
                        warn!(attempt, error = %e, "Reconnection attempt failed");
                        continue;
                    }

                    let mut client_guard = self.client.write().await;
                    *client_guard = new_client;
                    drop(client_guard);

                    self.state.set_connected(true);
                    info!(attempt, "Successfully reconnected to broker");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Failed to create new client");
                    continue;
                }
            }
        }
    }

    /// Execute an operation with a timeout and one reconnect-then-retry on
    /// connection failure.
    ///
    /// A timeout alone does not trigger reconnection: a slow operation is not
    /// evidence of a broken connection unless the state already says so.
    async fn with_reconnect<F, Fut, T>(&self, operation: F) -> AppResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = AppResult<T>>,
    {
        let timeout_duration = self.config.operation_timeout;

        match tokio::time::timeout(timeout_duration, operation()).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) if e.is_connection_error() => {
                warn!(error = %e, "Operation failed due to connection error, attempting reconnect");
                self.reconnect().await?;

                match tokio::time::timeout(timeout_duration, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(AppError::OperationTimeout(format!(
                        "Operation timed out after {timeout_duration:?} on retry"
                    ))),
                }
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                if !self.state.is_connected() {
                    warn!(
                        timeout = ?timeout_duration,
                        "Operation timed out while disconnected, attempting reconnect"
                    );
                    self.reconnect().await?;

                    match tokio::time::timeout(timeout_duration, operation()).await {
                        Ok(result) => result,
                        Err(_) => Err(AppError::OperationTimeout(format!(
                            "Operation timed out after {timeout_duration:?} on retry"
                        ))),
                    }
                } else {
                    Err(AppError::OperationTimeout(format!(
                        "Operation timed out after {timeout_duration:?}"
                    )))
                }
            }
        }
    }

    // =========================================================================
    // Queue Initialization
    // =========================================================================

    /// Ensure the stream exists, creating it if necessary. Idempotent.
    #[instrument(skip(self))]
    async fn ensure_stream(&self, name: &str) -> AppResult<()> {
        self.with_reconnect(|| async {
            let client = self.client.read().await;
            let stream_id = to_identifier(name, "stream")?;

            match client.get_stream(&stream_id).await {
                Ok(Some(_)) => {
                    debug!(stream = name, "Stream already exists");
                    Ok(())
                }
                Ok(None) | Err(_) => {
                    info!(stream = name, "Creating stream");
                    client
                        .create_stream(name)
                        .await
                        .map_err(|e| AppError::QueueError(e.to_string()))?;
                    Ok(())
                }
            }
        })
        .await
    }

    /// Ensure a queue topic exists within the stream. Idempotent.
    #[instrument(skip(self))]
    async fn ensure_topic(&self, topic: &str) -> AppResult<()> {
        self.with_reconnect(|| async {
            let client = self.client.read().await;
            let stream_id = to_identifier(&self.config.queue_stream, "stream")?;
            let topic_id = to_identifier(topic, "queue")?;

            match client.get_topic(&stream_id, &topic_id).await {
                Ok(Some(_)) => {
                    debug!(queue = topic, "Queue topic already exists");
                    Ok(())
                }
                Ok(None) | Err(_) => {
                    info!(queue = topic, "Creating queue topic");
                    client
                        .create_topic(
                            &stream_id,
                            topic,
                            self.config.queue_partitions,
                            Default::default(),
                            None,
                            IggyExpiry::NeverExpire,
                            MaxTopicSize::Unlimited,
                        )
                        .await
                        .map_err(|e| AppError::QueueError(e.to_string()))?;
                    Ok(())
                }
            }
        })
        .await
    }

    /// Create the stream, the queue topic, and its dead-letter companion.
    ///
    /// Call this once after construction, before publishing or consuming.
    #[instrument(skip(self))]
    pub async fn ensure_queue(&self) -> AppResult<()> {
        self.ensure_stream(&self.config.queue_stream).await?;
        self.ensure_topic(&self.config.queue_name).await?;
        self.ensure_topic(&self.config.dead_letter_queue_name())
            .await?;
        Ok(())
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// Publish an envelope to the given queue topic.
    #[instrument(skip(self, envelope), fields(message_id = %envelope.message_id, subject = %envelope.subject))]
    pub async fn publish(&self, queue: &str, envelope: &QueueEnvelope) -> AppResult<()> {
        self.with_reconnect(|| async {
            let client = self.client.read().await;

            let payload = envelope.to_json()?;
            let message = IggyMessage::from_str(&payload)
                .map_err(|e| AppError::PublishError(e.to_string()))?;

            let stream_id = to_identifier(&self.config.queue_stream, "stream")?;
            let topic_id = to_identifier(queue, "queue")?;

            let mut messages = vec![message];
            client
                .send_messages(
                    &stream_id,
                    &topic_id,
                    &Partitioning::balanced(),
                    &mut messages,
                )
                .await
                .map_err(|e| AppError::PublishError(e.to_string()))?;

            debug!(message_id = %envelope.message_id, queue, "Envelope published");
            Ok(())
        })
        .await
    }

    /// Publish the dead-letter copy of an envelope to the dead-letter queue.
    pub async fn dead_letter(
        &self,
        envelope: QueueEnvelope,
        reason: DeadLetterReason,
        description: impl Into<String>,
    ) -> AppResult<()> {
        let copy = envelope.into_dead_letter(reason, description);
        self.publish(&self.config.dead_letter_queue_name(), &copy)
            .await
    }

    // =========================================================================
    // Receiving
    // =========================================================================

    /// Receive the message at `offset` from a queue topic, if one exists yet.
    ///
    /// Never commits; completion is explicit via [`QueueClient::commit`].
    #[instrument(skip(self))]
    pub async fn receive_one(
        &self,
        queue: &str,
        consumer_id: u32,
        offset: u64,
    ) -> AppResult<Option<PolledEnvelope>> {
        self.with_reconnect(|| async {
            let client = self.client.read().await;

            let stream_id = to_identifier(&self.config.queue_stream, "stream")?;
            let topic_id = to_identifier(queue, "queue")?;
            let consumer = numeric_consumer(consumer_id)?;

            let polled = client
                .poll_messages(
                    &stream_id,
                    &topic_id,
                    Some(QUEUE_PARTITION_ID),
                    &consumer,
                    &PollingStrategy::offset(offset),
                    1,
                    false,
                )
                .await
                .map_err(|e| AppError::ReceiveError(e.to_string()))?;

            Ok(polled.messages.first().map(|msg| {
                let payload = String::from_utf8_lossy(&msg.payload);
                PolledEnvelope {
                    envelope: QueueEnvelope::from_payload(&payload),
                    offset: msg.header.offset,
                }
            }))
        })
        .await
    }

    /// Complete a delivery by storing the consumer offset.
    #[instrument(skip(self))]
    pub async fn commit(&self, queue: &str, consumer_id: u32, offset: u64) -> AppResult<()> {
        self.with_reconnect(|| async {
            let client = self.client.read().await;

            let stream_id = to_identifier(&self.config.queue_stream, "stream")?;
            let topic_id = to_identifier(queue, "queue")?;
            let consumer = numeric_consumer(consumer_id)?;

            client
                .store_consumer_offset(
                    &consumer,
                    &stream_id,
                    &topic_id,
                    Some(QUEUE_PARTITION_ID),
                    offset,
                )
                .await
                .map_err(|e| AppError::ReceiveError(e.to_string()))?;

            debug!(queue, consumer_id, offset, "Delivery completed");
            Ok(())
        })
        .await
    }

    /// Fetch the last committed offset for a consumer, if any.
    #[instrument(skip(self))]
    pub async fn committed_offset(&self, queue: &str, consumer_id: u32) -> AppResult<Option<u64>> {
        self.with_reconnect(|| async {
            let client = self.client.read().await;

            let stream_id = to_identifier(&self.config.queue_stream, "stream")?;
            let topic_id = to_identifier(queue, "queue")?;
            let consumer = numeric_consumer(consumer_id)?;

            let info = client
                .get_consumer_offset(
                    &consumer,
                    &stream_id,
                    &topic_id,
                    Some(QUEUE_PARTITION_ID),
                )
                .await
                .map_err(|e| AppError::ReceiveError(e.to_string()))?;

            Ok(info.map(|i| i.stored_offset))
        })
        .await
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get a reference to the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Convert a name to an Iggy identifier with a descriptive error.
fn to_identifier(name: &str, resource_type: &str) -> AppResult<Identifier> {
    name.try_into().map_err(|e: IggyError| {
        debug!(resource_type, name, original_error = %e, "Identifier conversion failed");
        AppError::QueueError(format!(
            "Invalid {resource_type} name '{name}': must be 1-255 characters, alphanumeric \
             with dots, underscores, or hyphens"
        ))
    })
}

/// Build a numeric consumer identity for offset tracking.
fn numeric_consumer(consumer_id: u32) -> AppResult<Consumer> {
    Ok(Consumer::new(Identifier::numeric(consumer_id).map_err(
        |_| AppError::ReceiveError(format!("Invalid consumer ID: {consumer_id}")),
    )?))
}

/// Random jitter in [0.0, 1.0) for backoff randomization.
fn rand_jitter() -> f64 {
    use rand::Rng;
    rand::rng().random::<f64>()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_to_identifier_valid_names() {
        assert!(to_identifier("weather-updates", "queue").is_ok());
        assert!(to_identifier("weather-updates.dead-letter", "queue").is_ok());
        assert!(to_identifier("weather", "stream").is_ok());
    }

    #[test]
    fn test_to_identifier_rejects_empty_name() {
        let result = to_identifier("", "queue");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid queue name"));
    }

    #[test]
    fn test_numeric_consumer_accepts_positive_ids() {
        assert!(numeric_consumer(1).is_ok());
        assert!(numeric_consumer(u32::MAX).is_ok());
    }

    #[test]
    fn test_rand_jitter_stays_in_range() {
        for _ in 0..100 {
            let jitter = rand_jitter();
            assert!((0.0..1.0).contains(&jitter));
        }
    }
}
