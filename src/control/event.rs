//! Control plane messages.

use serde::Serialize;

use crate::transport::ConnectionState;

/// One line of control plane output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ControlEvent {
    /// Connection state changed.
    Status {
        /// New state.
        state: ConnectionState,
    },
    /// Final counters, written once on exit.
    Stats {
        /// Envelopes written to the relay.
        sent: u64,
        /// Frames evicted by the queue.
        dropped: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line_format() {
        let event = ControlEvent::Status {
            state: ConnectionState::Connected,
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"event":"status","state":"connected"}"#
        );
    }

    #[test]
    fn test_stats_line_format() {
        let event = ControlEvent::Stats { sent: 10, dropped: 2 };
        let value: serde_json::Value = serde_json::to_value(event).unwrap();
        assert_eq!(value["event"], "stats");
        assert_eq!(value["sent"], 10);
        assert_eq!(value["dropped"], 2);
    }
}
