//! # Weatherbus
//!
//! An HTTP-triggered weather update publisher paired with a queue-triggered
//! consumer over Apache Iggy, plus a small sample weather API:
//!
//! - **Producer**: validates a JSON payload (or generates a random one),
//!   wraps it in a routed envelope, and publishes it to the queue
//! - **Consumer**: classifies each delivery as success, malformed (terminal,
//!   dead-lettered), or transient failure (redelivered up to a delivery-count
//!   ceiling, then dead-lettered)
//! - **Dead-letter worker**: drains the dead-letter sub-queue and logs each
//!   message for investigation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Function Key Auth → Request ID → Trace)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (publish, publish-random, forecast, health)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PublisherService          ConsumerService ◀── QueueWorkers │
//! ├─────────────────────────────────────────────────────────────┤
//! │  QueueClient (with auto-reconnect, offsets, dead-letter)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Apache Iggy Server                                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use weatherbus::{AppState, Config, QueueClient, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), weatherbus::AppError> {
//!     let config = Config::from_env()?;
//!     let queue_client = QueueClient::new(config.clone()).await?;
//!     queue_client.ensure_queue().await?;
//!
//!     let state = AppState::new(queue_client, config);
//!     let app = build_router(state);
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Security Configuration
//!
//! Protect the publish endpoints with a function key:
//! ```bash
//! FUNCTION_KEY=your-secret-key cargo run
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod queue;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use queue::QueueClient;
pub use routes::build_router;
pub use state::AppState;
