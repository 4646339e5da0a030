//! Publish endpoints for weather updates.
//!
//! # Endpoints
//!
//! - `POST /weather/publish` - Publish an update from the request payload
//! - `POST /weather/publish-random` - Publish an update with random values
//!
//! Both endpoints answer with a `MessagePublishResponse` body on every path,
//! including failures: 400 for client input problems, 500 otherwise. The raw
//! request body is read as a string so that an empty body and malformed JSON
//! can be reported distinctly.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::{error, instrument};

use crate::error::{AppError, sanitize_serde_error};
use crate::models::{MessagePublishResponse, PublishMessageRequest};
use crate::state::AppState;
use crate::validation::validate_publish_request;

type PublishReply = (StatusCode, Json<MessagePublishResponse>);

/// Publish a weather update built from the request payload.
#[instrument(skip(state, body))]
pub async fn publish_weather(State(state): State<AppState>, body: String) -> PublishReply {
    if body.trim().is_empty() {
        return bad_request("Request body is empty".to_string());
    }

    let request = match serde_json::from_str::<Option<PublishMessageRequest>>(&body) {
        Ok(Some(request)) => request,
        Ok(None) => return bad_request("Invalid request format".to_string()),
        Err(e) => return bad_request(sanitize_serde_error(&e)),
    };

    if let Err(e) = validate_publish_request(&request) {
        let (_, message) = e.public_parts();
        return bad_request(message);
    }

    match state.publisher.publish(request).await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => server_error(e),
    }
}

/// Publish a weather update with server-generated random values.
#[instrument(skip(state))]
pub async fn publish_random_weather(State(state): State<AppState>) -> PublishReply {
    match state.publisher.publish_random().await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => server_error(e),
    }
}

fn bad_request(message: String) -> PublishReply {
    (
        StatusCode::BAD_REQUEST,
        Json(MessagePublishResponse::failure(message)),
    )
}

fn server_error(e: AppError) -> PublishReply {
    // Full detail stays in the server log; the response carries the
    // sanitized description only
    error!(error = %e, "Publish request failed");
    let (_, message) = e.public_parts();
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(MessagePublishResponse::failure(message)),
    )
}
