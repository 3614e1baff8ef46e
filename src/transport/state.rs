//! Connection state and its change notifications.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;

/// Buffered state changes per subscriber before it starts lagging.
const STATE_CHANNEL_CAPACITY: usize = 32;

/// Where a [`FrameTransport`](super::FrameTransport) currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    /// `connect` in progress.
    Connecting,
    /// Socket open; `send` writes envelopes.
    Connected,
    /// Closed by `disconnect` or by a write failure.
    Disconnected,
    /// Bad port, connect timeout or refusal.
    Error,
}

impl ConnectionState {
    /// Lowercase name, as used in logs and status events.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state plus an ordered, deduplicated change feed.
#[derive(Debug)]
pub(crate) struct StateCell {
    current: Mutex<ConnectionState>,
    tx: broadcast::Sender<ConnectionState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            current: Mutex::new(ConnectionState::Idle),
            tx,
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next`. Returns `false` (and publishes nothing) if unchanged.
    pub(crate) fn set(&self, next: ConnectionState) -> bool {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if *current == next {
            return false;
        }

        tracing::info!("State change: {} -> {}", *current, next);
        *current = next;
        // Published under the lock so subscribers see changes in order.
        let _ = self.tx.send(next);
        true
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        assert_eq!(StateCell::new().get(), ConnectionState::Idle);
    }

    #[test]
    fn test_duplicate_states_not_published() {
        let cell = StateCell::new();
        let mut rx = cell.subscribe();

        assert!(cell.set(ConnectionState::Connecting));
        assert!(!cell.set(ConnectionState::Connecting));
        assert!(cell.set(ConnectionState::Connected));
        assert!(cell.set(ConnectionState::Disconnected));
        assert!(!cell.set(ConnectionState::Disconnected));

        assert_eq!(rx.try_recv().unwrap(), ConnectionState::Connecting);
        assert_eq!(rx.try_recv().unwrap(), ConnectionState::Connected);
        assert_eq!(rx.try_recv().unwrap(), ConnectionState::Disconnected);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_serializes_lowercase() {
        let json = serde_json::to_string(&ConnectionState::Connected).unwrap();
        assert_eq!(json, "\"connected\"");
        assert_eq!(ConnectionState::Error.to_string(), "error");
    }
}
