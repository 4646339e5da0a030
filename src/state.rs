//! Shared application state for Axum handlers and background workers.
//!
//! Cloned per request; all internals are `Arc`-wrapped or atomic. Creating
//! the state also spawns the background workers:
//!
//! - the primary queue worker,
//! - the dead-letter queue worker,
//! - a broker connection watch.
//!
//! Tasks are tracked with `tokio_util::task::TaskTracker` and stopped through
//! a shared `CancellationToken`; call [`AppState::shutdown`] before exiting.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::metrics;
use crate::queue::{QueueClient, QueueWorker};
use crate::services::{ConsumerService, PublisherService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Broker client for queue operations
    pub queue_client: QueueClient,
    /// Publisher service for the HTTP endpoints
    pub publisher: PublisherService,
    /// Consumer service driven by the queue workers
    pub consumer: ConsumerService,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Application configuration
    pub config: Arc<Config>,
    /// Tracks spawned background tasks for graceful shutdown
    task_tracker: TaskTracker,
    /// Cancellation token for signaling background tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create application state and spawn the background workers.
    pub fn new(queue_client: QueueClient, config: Config) -> Self {
        let config = Arc::new(config);
        let publisher = PublisherService::new(queue_client.clone(), config.clone());
        let consumer = ConsumerService::new(config.clone());
        let task_tracker = TaskTracker::new();
        let cancellation_token = CancellationToken::new();

        let state = Self {
            queue_client,
            publisher,
            consumer,
            started_at: Instant::now(),
            config,
            task_tracker,
            cancellation_token,
        };

        state.spawn_queue_workers();
        state.spawn_connection_watch();

        state
    }

    /// Spawn the primary and dead-letter queue workers.
    fn spawn_queue_workers(&self) {
        let primary = QueueWorker::new(
            self.queue_client.clone(),
            self.consumer.clone(),
            self.config.clone(),
        );
        let cancel = self.cancellation_token.clone();
        self.task_tracker.spawn(async move {
            primary.run(cancel).await;
        });

        let dead_letter = QueueWorker::new(
            self.queue_client.clone(),
            self.consumer.clone(),
            self.config.clone(),
        );
        let cancel = self.cancellation_token.clone();
        self.task_tracker.spawn(async move {
            dead_letter.run_dead_letter(cancel).await;
        });
    }

    /// Spawn a background broker connection watch.
    ///
    /// Logs a warning when the connection drops and keeps the connection
    /// gauge current, so outages surface before user requests fail.
    fn spawn_connection_watch(&self) {
        let queue_client = self.queue_client.clone();
        let interval_duration = self.config.health_check_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(interval_duration);
            ticker.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Connection watch received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let connected = queue_client.is_connected();
                        metrics::set_connection_status(connected);
                        if connected {
                            trace!("Connection watch: broker connection OK");
                        } else {
                            warn!("Connection watch: broker connection is down");
                        }
                    }
                }
            }

            debug!("Connection watch shutting down");
        });
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// Signals the workers to stop, closes the tracker, and waits for all
    /// tasks to finish.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
