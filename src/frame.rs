//! Captured camera frame.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

/// A single JPEG-encoded camera frame on its way to the relay.
///
/// Immutable once built. `Bytes` makes moving it between the queue slot and
/// the in-flight send a pointer copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// JPEG bytes.
    pub payload: Bytes,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Capture time, milliseconds since the Unix epoch.
    pub captured_at_millis: i64,
}

impl Frame {
    /// Create a frame with an explicit capture timestamp.
    pub fn new(payload: impl Into<Bytes>, width: u32, height: u32, captured_at_millis: i64) -> Self {
        Self {
            payload: payload.into(),
            width,
            height,
            captured_at_millis,
        }
    }

    /// Create a frame stamped with the current wall clock.
    pub fn captured_now(payload: impl Into<Bytes>, width: u32, height: u32) -> Self {
        Self::new(payload, width, height, now_millis())
    }

    /// Payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captured_now_has_recent_timestamp() {
        let frame = Frame::captured_now(vec![0xFF, 0xD8], 640, 480);
        assert!(frame.captured_at_millis > 1_600_000_000_000);
        assert_eq!(frame.len(), 2);
        assert_eq!((frame.width, frame.height), (640, 480));
    }

    #[test]
    fn test_clone_shares_payload() {
        let frame = Frame::new(Bytes::from_static(b"jpeg"), 1, 1, 0);
        let copy = frame.clone();
        assert_eq!(copy.payload.as_ptr(), frame.payload.as_ptr());
    }
}
