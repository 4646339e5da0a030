//! Sample weather API and health endpoints.
//!
//! # Endpoints
//!
//! - `GET /weatherforecast` - Five random forecast records
//! - `GET /health` - Health check (always Healthy, includes version)
//! - `GET /ready` - Readiness probe keyed on the broker connection
//!
//! The forecast endpoint has no interaction with the queue path; it exists
//! as a standalone sample surface.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{Days, Utc};
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::instrument;

use crate::models::{
    HealthResponse, MAX_RANDOM_TEMPERATURE_C, MIN_RANDOM_TEMPERATURE_C, SUMMARIES, WeatherForecast,
};
use crate::state::AppState;

/// Number of forecast records returned by `GET /weatherforecast`.
const FORECAST_DAYS: u64 = 5;

/// Generate a five-day random forecast.
#[instrument]
pub async fn weather_forecast() -> Json<Vec<WeatherForecast>> {
    let mut rng = rand::rng();
    let today = Utc::now().date_naive();

    let forecast = (1..=FORECAST_DAYS)
        .map(|day| {
            let date = today + Days::new(day);
            let temperature_c =
                rng.random_range(MIN_RANDOM_TEMPERATURE_C..MAX_RANDOM_TEMPERATURE_C);
            let summary = SUMMARIES.choose(&mut rng).copied().unwrap_or("Mild");
            WeatherForecast::new(date, temperature_c, summary)
        })
        .collect();

    Json(forecast)
}

/// Health check endpoint.
///
/// Always reports Healthy with the service version; broker state is exposed
/// separately through `/ready`.
#[instrument]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check endpoint for orchestrator probes.
///
/// Returns 200 OK when the broker connection is up, 503 otherwise.
#[instrument(skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    if state.queue_client.is_connected() {
        Ok(StatusCode::OK)
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
