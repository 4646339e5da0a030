//! Tests for the delivery classification and dead-letter contract.
//!
//! These drive the consumer service and the outcome state machine through
//! the public API without a broker: the queue worker's offset handling is
//! exercised against a live broker in manual testing, while everything it
//! decides with is covered here.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use weatherbus::Config;
use weatherbus::models::{HTTP_PUBLISHER_SOURCE, WeatherUpdateMessage};
use weatherbus::queue::{
    DeadLetterReason, Delivery, DeliveryAction, DeliveryOutcome, QueueEnvelope,
    SUBJECT_WEATHER_UPDATE, resolve_action,
};
use weatherbus::services::ConsumerService;

fn consumer() -> ConsumerService {
    let config = Config {
        processing_delay: Duration::from_millis(1),
        ..Config::default()
    };
    ConsumerService::new(Arc::new(config))
}

fn delivery(body: &str, delivery_count: u32) -> Delivery {
    Delivery {
        envelope: QueueEnvelope::new("test-message", SUBJECT_WEATHER_UPDATE, body),
        offset: 7,
        delivery_count,
    }
}

#[tokio::test]
async fn valid_message_completes_implicitly() {
    let update = WeatherUpdateMessage::new("Sydney", 22, "Mild", HTTP_PUBLISHER_SOURCE);
    let body = update.to_json().unwrap();

    let outcome = consumer().handle_delivery(&delivery(&body, 1)).await;
    assert_eq!(outcome, DeliveryOutcome::Success);

    // Success maps to completion, never to dead-letter or redelivery
    assert_eq!(resolve_action(&outcome, 1, 10), DeliveryAction::Complete);
}

#[tokio::test]
async fn null_body_is_dead_lettered_without_retry() {
    let outcome = consumer().handle_delivery(&delivery("null", 1)).await;
    assert_eq!(outcome, DeliveryOutcome::InvalidFormat);

    // Dead-lettered on the very first delivery - no redelivery attempt
    match resolve_action(&outcome, 1, 10) {
        DeliveryAction::DeadLetter {
            reason,
            description,
        } => {
            assert_eq!(reason, DeadLetterReason::InvalidMessageFormat);
            assert_eq!(description, "Unable to deserialize message body");
        }
        other => panic!("expected dead-letter, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_json_is_dead_lettered_with_parse_detail() {
    let outcome = consumer()
        .handle_delivery(&delivery("this is not json", 1))
        .await;

    let detail = match &outcome {
        DeliveryOutcome::ParseError(detail) => detail.clone(),
        other => panic!("expected parse error, got {other:?}"),
    };

    match resolve_action(&outcome, 1, 10) {
        DeliveryAction::DeadLetter {
            reason,
            description,
        } => {
            assert_eq!(reason, DeadLetterReason::JsonParsingError);
            assert_eq!(description, detail);
        }
        other => panic!("expected dead-letter, got {other:?}"),
    }
}

#[tokio::test]
async fn bare_weather_json_without_envelope_still_processes() {
    // A payload published straight to the topic, without the envelope
    let update = WeatherUpdateMessage::new("Berlin", -2, "Chilly", HTTP_PUBLISHER_SOURCE);
    let payload = update.to_json().unwrap();

    let envelope = QueueEnvelope::from_payload(&payload);
    let outcome = consumer()
        .handle_delivery(&Delivery {
            envelope,
            offset: 0,
            delivery_count: 1,
        })
        .await;

    assert_eq!(outcome, DeliveryOutcome::Success);
}

#[test]
fn processing_failures_redeliver_then_dead_letter_at_ceiling() {
    let outcome = DeliveryOutcome::ProcessingError("simulated downstream failure".to_string());
    let max_delivery_count = 10;

    // The broker-side state machine: Delivered -> Redelivered loops back
    // until the delivery-count ceiling forces DeadLettered
    for count in 1..max_delivery_count {
        assert_eq!(
            resolve_action(&outcome, count, max_delivery_count),
            DeliveryAction::Redeliver
        );
    }

    match resolve_action(&outcome, max_delivery_count, max_delivery_count) {
        DeliveryAction::DeadLetter {
            reason,
            description,
        } => {
            assert_eq!(reason, DeadLetterReason::MaxDeliveryCountExceeded);
            assert!(description.contains("simulated downstream failure"));
        }
        other => panic!("expected dead-letter at ceiling, got {other:?}"),
    }
}

#[tokio::test]
async fn dead_letter_handler_completes_and_counts() {
    let consumer = consumer();

    let dead_lettered = Delivery {
        envelope: QueueEnvelope::new("dl-message", SUBJECT_WEATHER_UPDATE, "{broken")
            .into_dead_letter(DeadLetterReason::JsonParsingError, "key must be a string"),
        offset: 0,
        delivery_count: 1,
    };

    consumer.handle_dead_letter(&dead_lettered).await.unwrap();
    consumer.handle_dead_letter(&dead_lettered).await.unwrap();

    assert_eq!(consumer.dead_letters_handled(), 2);
}

#[test]
fn dead_letter_envelope_round_trips_reason_and_body() {
    let envelope = QueueEnvelope::new("dl-1", SUBJECT_WEATHER_UPDATE, "{oops")
        .into_dead_letter(DeadLetterReason::InvalidMessageFormat, "no usable message");

    let wire = envelope.to_json().unwrap();
    let parsed = QueueEnvelope::from_payload(&wire);

    assert_eq!(
        parsed.dead_letter_reason.as_deref(),
        Some("InvalidMessageFormat")
    );
    assert_eq!(
        parsed.dead_letter_description.as_deref(),
        Some("no usable message")
    );
    assert_eq!(parsed.body, "{oops");
}
