//! Broker connection state tracking for reconnection coordination.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::Notify;

/// Shared connection state for the broker client.
///
/// All atomics use `SeqCst`: connection state affects control flow and must
/// be immediately visible across tasks. Waiters are woken through
/// `tokio::sync::Notify` rather than polling.
pub struct ConnectionState {
    /// Whether the client is currently connected
    connected: AtomicBool,
    /// Number of consecutive failed reconnection attempts
    reconnect_attempts: AtomicU32,
    /// Whether a reconnection is currently in progress
    reconnecting: AtomicBool,
    /// Notification for when reconnection completes (success or failure)
    reconnect_complete: Notify,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
            reconnecting: AtomicBool::new(false),
            reconnect_complete: Notify::new(),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        if connected {
            self.reconnect_attempts.store(0, Ordering::SeqCst);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn increment_attempts(&self) -> u32 {
        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Try to become the task that performs the reconnection.
    ///
    /// Returns false when another task is already reconnecting.
    pub fn start_reconnecting(&self) -> bool {
        !self.reconnecting.swap(true, Ordering::SeqCst)
    }

    pub fn stop_reconnecting(&self) {
        self.reconnecting.store(false, Ordering::SeqCst);
        self.reconnect_complete.notify_waiters();
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::SeqCst)
    }

    /// Wait for an ongoing reconnection to complete.
    ///
    /// Registers for notification BEFORE checking `is_reconnecting()`:
    /// checking first would race with a reconnection finishing in between,
    /// leaving the waiter stuck.
    pub async fn wait_for_reconnection(&self) {
        let notified = self.reconnect_complete.notified();
        if self.is_reconnecting() {
            notified.await;
        }
    }

    /// Get the current reconnect attempts count (for testing).
    #[cfg(test)]
    pub fn attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}
