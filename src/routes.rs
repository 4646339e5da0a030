//! Application routing configuration with middleware stack.
//!
//! # Route Groups
//!
//! - `/health`, `/ready` - Health & readiness (auth bypassed)
//! - `/weather/publish`, `/weather/publish-random` - Producer endpoints
//! - `/weatherforecast` - Sample API (auth bypassed)
//!
//! # Middleware Stack (applied in order)
//!
//! ```text
//! Request → Function Key Auth → Request ID → Tracing → CORS → Handler
//! ```

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::{FunctionKeyAuth, RequestIdLayer};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// Authentication is enabled only when a function key is configured; the
/// bypass paths come from the configuration.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let cors = build_cors_layer(&config.cors_allowed_origins);

    let mut router = Router::new()
        // Health and status endpoints (always accessible)
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        // Producer endpoints
        .route("/weather/publish", post(handlers::publish_weather))
        .route(
            "/weather/publish-random",
            post(handlers::publish_random_weather),
        )
        // Sample API
        .route("/weatherforecast", get(handlers::weather_forecast));

    // Middleware stack (applied bottom to top)

    // 1. Request body size limit (prevents DoS via large payloads)
    router = router.layer(DefaultBodyLimit::max(config.max_request_body_size));

    // 2. CORS
    router = router.layer(cors);

    // 3. Tracing
    router = router.layer(TraceLayer::new_for_http());

    // 4. Request ID
    router = router.layer(RequestIdLayer::new());

    // 5. Authentication (if enabled)
    let auth_layer = FunctionKeyAuth::new(
        config.function_key.clone(),
        config.auth_bypass_paths.clone(),
    );
    if auth_layer.is_enabled() {
        info!("Function key authentication enabled");
        router = router.layer(auth_layer);
    } else {
        info!("Function key authentication disabled (no FUNCTION_KEY set)");
    }

    router.with_state(state)
}

/// Build CORS layer from configuration.
///
/// `*` allows any origin, which is convenient for development; production
/// deployments should list explicit origins.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_cors_layer_any() {
        let origins = vec!["*".to_string()];
        let _layer = build_cors_layer(&origins);
    }

    #[test]
    fn test_build_cors_layer_specific() {
        let origins = vec![
            "https://example.com".to_string(),
            "https://app.example.com".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }
}
