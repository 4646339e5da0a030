//! Queue and dead-letter worker loops.
//!
//! The worker owns the delivery state machine the broker contract describes:
//!
//! ```text
//! Delivered ──Success──────────────▶ Completed (offset stored)
//!     │
//!     ├──InvalidFormat/ParseError──▶ DeadLettered (terminal, never retried)
//!     │
//!     └──ProcessingError───────────▶ Redelivered (offset not stored)
//!                                        │ delivery_count < ceiling: loop
//!                                        └ delivery_count = ceiling: DeadLettered
//! ```
//!
//! The consumer service only classifies each delivery; mapping the outcome to
//! an action is the pure function [`resolve_action`], so the state machine is
//! testable without a broker.

use std::sync::Arc;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::metrics;
use crate::services::ConsumerService;

use super::envelope::{DeadLetterReason, Delivery};
use super::QueueClient;

/// Classification of a single delivery, produced by the consumer service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Processing finished; the delivery should be completed
    Success,
    /// The body deserialized to no usable message; terminal
    InvalidFormat,
    /// The body was not valid JSON; terminal, carries the parse error text
    ParseError(String),
    /// Downstream processing failed; eligible for redelivery
    ProcessingError(String),
}

/// What the worker does with a delivery after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryAction {
    /// Store the offset past the message
    Complete,
    /// Publish a dead-letter copy, then store the offset
    DeadLetter {
        reason: DeadLetterReason,
        description: String,
    },
    /// Leave the offset unstored so the message is delivered again
    Redeliver,
}

/// Map a delivery outcome to the action the worker takes.
///
/// Terminal outcomes dead-letter immediately regardless of delivery count.
/// Processing failures redeliver until `delivery_count` reaches
/// `max_delivery_count`, then dead-letter with `MaxDeliveryCountExceeded`.
pub fn resolve_action(
    outcome: &DeliveryOutcome,
    delivery_count: u32,
    max_delivery_count: u32,
) -> DeliveryAction {
    match outcome {
        DeliveryOutcome::Success => DeliveryAction::Complete,
        DeliveryOutcome::InvalidFormat => DeliveryAction::DeadLetter {
            reason: DeadLetterReason::InvalidMessageFormat,
            description: "Unable to deserialize message body".to_string(),
        },
        DeliveryOutcome::ParseError(detail) => DeliveryAction::DeadLetter {
            reason: DeadLetterReason::JsonParsingError,
            description: detail.clone(),
        },
        DeliveryOutcome::ProcessingError(detail) => {
            if delivery_count >= max_delivery_count {
                DeliveryAction::DeadLetter {
                    reason: DeadLetterReason::MaxDeliveryCountExceeded,
                    description: format!(
                        "Processing failed on all {max_delivery_count} deliveries, last error: {detail}"
                    ),
                }
            } else {
                DeliveryAction::Redeliver
            }
        }
    }
}

/// Background worker that drives queue deliveries through the consumer.
pub struct QueueWorker {
    client: QueueClient,
    consumer: ConsumerService,
    config: Arc<Config>,
}

impl QueueWorker {
    pub fn new(client: QueueClient, consumer: ConsumerService, config: Arc<Config>) -> Self {
        Self {
            client,
            consumer,
            config,
        }
    }

    /// Run the primary queue loop until cancelled.
    ///
    /// Deliveries are consumed strictly in order, one at a time. The offset
    /// is only stored when the delivery completes or dead-letters, so a crash
    /// redelivers the in-flight message (at-least-once).
    pub async fn run(self, cancel: CancellationToken) {
        let queue = self.config.queue_name.clone();
        let consumer_id = self.config.consumer_id;

        let mut next_offset = self.starting_offset(&queue, consumer_id).await;
        let mut inflight: Option<u64> = None;
        let mut delivery_count: u32 = 0;

        info!(queue = %queue, next_offset, "Queue worker started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(queue = %queue, "Queue worker received cancellation signal");
                    break;
                }
                polled = self.client.receive_one(&queue, consumer_id, next_offset) => {
                    match polled {
                        Ok(Some(polled)) => {
                            let offset = polled.offset;

                            // Reset the count when a new message arrives
                            if inflight != Some(offset) {
                                inflight = Some(offset);
                                delivery_count = 0;
                            }
                            delivery_count += 1;

                            let delivery = Delivery {
                                envelope: polled.envelope,
                                offset,
                                delivery_count,
                            };

                            if self.dispatch(&queue, consumer_id, delivery).await {
                                next_offset = offset + 1;
                                inflight = None;
                                delivery_count = 0;
                            } else {
                                sleep(self.config.redelivery_delay).await;
                            }
                        }
                        Ok(None) => {
                            sleep(self.config.receive_poll_interval).await;
                        }
                        Err(e) => {
                            warn!(queue = %queue, error = %e, "Receive failed, backing off");
                            sleep(self.config.receive_poll_interval).await;
                        }
                    }
                }
            }
        }

        info!(queue = %queue, "Queue worker stopped");
    }

    /// Classify and act on one delivery. Returns true when the offset moved
    /// forward (completed or dead-lettered), false when the message should be
    /// delivered again.
    async fn dispatch(&self, queue: &str, consumer_id: u32, delivery: Delivery) -> bool {
        let offset = delivery.offset;
        let message_id = delivery.envelope.message_id.clone();
        let envelope = delivery.envelope.clone();

        let outcome = self.consumer.handle_delivery(&delivery).await;
        let action = resolve_action(&outcome, delivery.delivery_count, self.config.max_delivery_count);

        match action {
            DeliveryAction::Complete => self.complete(queue, consumer_id, offset).await,
            DeliveryAction::DeadLetter {
                reason,
                description,
            } => {
                warn!(
                    message_id = %message_id,
                    reason = %reason,
                    description = %description,
                    "Dead-lettering message"
                );

                match self.client.dead_letter(envelope, reason, description).await {
                    Ok(()) => {
                        metrics::record_message_dead_lettered(reason.as_str());
                        self.complete(queue, consumer_id, offset).await
                    }
                    Err(e) => {
                        warn!(message_id = %message_id, error = %e, "Dead-letter publish failed");
                        false
                    }
                }
            }
            DeliveryAction::Redeliver => {
                warn!(
                    message_id = %message_id,
                    delivery_count = delivery.delivery_count,
                    max_delivery_count = self.config.max_delivery_count,
                    "Leaving delivery uncompleted for redelivery"
                );
                metrics::record_redelivery();
                false
            }
        }
    }

    /// Store the offset for a finished delivery. Returns false on failure so
    /// the message is processed again (at-least-once).
    async fn complete(&self, queue: &str, consumer_id: u32, offset: u64) -> bool {
        match self.client.commit(queue, consumer_id, offset).await {
            Ok(()) => true,
            Err(e) => {
                warn!(queue, offset, error = %e, "Offset store failed, delivery will repeat");
                false
            }
        }
    }

    /// Run the dead-letter queue loop until cancelled.
    ///
    /// Each dead-lettered message is logged for investigation and completed.
    /// When handling fails the offset is not stored, keeping the message in
    /// the sub-queue.
    pub async fn run_dead_letter(self, cancel: CancellationToken) {
        let queue = self.config.dead_letter_queue_name();
        let consumer_id = self.config.dead_letter_consumer_id;

        let mut next_offset = self.starting_offset(&queue, consumer_id).await;

        info!(queue = %queue, next_offset, "Dead-letter worker started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(queue = %queue, "Dead-letter worker received cancellation signal");
                    break;
                }
                polled = self.client.receive_one(&queue, consumer_id, next_offset) => {
                    match polled {
                        Ok(Some(polled)) => {
                            let delivery = Delivery {
                                envelope: polled.envelope,
                                offset: polled.offset,
                                delivery_count: 1,
                            };

                            match self.consumer.handle_dead_letter(&delivery).await {
                                Ok(()) => {
                                    if self.complete(&queue, consumer_id, polled.offset).await {
                                        next_offset = polled.offset + 1;
                                    } else {
                                        sleep(self.config.redelivery_delay).await;
                                    }
                                }
                                Err(e) => {
                                    // Keep the message in place for investigation
                                    warn!(queue = %queue, error = %e, "Dead-letter handling failed, leaving message");
                                    sleep(self.config.redelivery_delay).await;
                                }
                            }
                        }
                        Ok(None) => {
                            sleep(self.config.receive_poll_interval).await;
                        }
                        Err(e) => {
                            warn!(queue = %queue, error = %e, "Dead-letter receive failed, backing off");
                            sleep(self.config.receive_poll_interval).await;
                        }
                    }
                }
            }
        }

        info!(queue = %queue, "Dead-letter worker stopped");
    }

    /// Resolve the first offset to poll from the stored consumer offset.
    async fn starting_offset(&self, queue: &str, consumer_id: u32) -> u64 {
        match self.client.committed_offset(queue, consumer_id).await {
            Ok(Some(stored)) => stored + 1,
            Ok(None) => 0,
            Err(e) => {
                warn!(queue = %queue, error = %e, "Could not fetch stored offset, starting from 0");
                0
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_success_completes() {
        assert_eq!(
            resolve_action(&DeliveryOutcome::Success, 1, 10),
            DeliveryAction::Complete
        );
    }

    #[test]
    fn test_invalid_format_dead_letters_on_first_delivery() {
        let action = resolve_action(&DeliveryOutcome::InvalidFormat, 1, 10);

        assert_eq!(
            action,
            DeliveryAction::DeadLetter {
                reason: DeadLetterReason::InvalidMessageFormat,
                description: "Unable to deserialize message body".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_error_dead_letters_with_error_text() {
        let outcome = DeliveryOutcome::ParseError("expected value at line 1".to_string());
        let action = resolve_action(&outcome, 1, 10);

        match action {
            DeliveryAction::DeadLetter {
                reason,
                description,
            } => {
                assert_eq!(reason, DeadLetterReason::JsonParsingError);
                assert_eq!(description, "expected value at line 1");
            }
            other => panic!("expected dead-letter, got {other:?}"),
        }
    }

    #[test]
    fn test_terminal_outcomes_ignore_delivery_count() {
        // A terminal classification dead-letters even past the ceiling
        let action = resolve_action(&DeliveryOutcome::InvalidFormat, 99, 10);
        assert!(matches!(action, DeliveryAction::DeadLetter { .. }));
    }

    #[test]
    fn test_processing_error_redelivers_below_ceiling() {
        let outcome = DeliveryOutcome::ProcessingError("downstream unavailable".to_string());

        for count in 1..10 {
            assert_eq!(
                resolve_action(&outcome, count, 10),
                DeliveryAction::Redeliver,
                "delivery {count} should redeliver"
            );
        }
    }

    #[test]
    fn test_processing_error_dead_letters_at_ceiling() {
        let outcome = DeliveryOutcome::ProcessingError("downstream unavailable".to_string());
        let action = resolve_action(&outcome, 10, 10);

        match action {
            DeliveryAction::DeadLetter {
                reason,
                description,
            } => {
                assert_eq!(reason, DeadLetterReason::MaxDeliveryCountExceeded);
                assert!(description.contains("downstream unavailable"));
            }
            other => panic!("expected dead-letter, got {other:?}"),
        }
    }
}
