//! Envelope struct and builders.
//!
//! Represents a complete envelope with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use camwire::protocol::{build_envelope, Envelope, EnvelopeHeader};
//! use bytes::Bytes;
//!
//! let envelope = Envelope::new(EnvelopeHeader::new(3), Bytes::from_static(b"abc"));
//! assert_eq!(envelope.payload(), b"abc");
//!
//! let wire = build_envelope(b"abc");
//! assert_eq!(wire, [0xFE, 0xED, 0, 0, 0, 3, b'a', b'b', b'c']);
//! ```

use bytes::Bytes;

use super::wire_format::{EnvelopeHeader, HEADER_SIZE};

/// A complete envelope as extracted from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Decoded header.
    pub header: EnvelopeHeader,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Envelope {
    /// Create a new envelope from header and payload.
    pub fn new(header: EnvelopeHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the envelope, keeping only the payload.
    #[inline]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Build a complete envelope as a single byte vector.
///
/// Use `build_envelope_parts` for scatter/gather I/O (writev).
///
/// # Panics
///
/// Panics if the payload is longer than `u32::MAX` bytes.
pub fn build_envelope(payload: &[u8]) -> Vec<u8> {
    let (header, payload) = build_envelope_parts(payload);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(payload);
    buf
}

/// Build envelope parts for scatter/gather I/O.
///
/// Returns the encoded header and a reference to the payload.
///
/// # Panics
///
/// Panics if the payload is longer than `u32::MAX` bytes.
pub fn build_envelope_parts(payload: &[u8]) -> ([u8; HEADER_SIZE], &[u8]) {
    let header = EnvelopeHeader::for_payload(payload).expect("payload length fits in u32");
    (header.encode(), payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MAGIC;

    #[test]
    fn test_envelope_accessors() {
        let envelope = Envelope::new(EnvelopeHeader::new(5), Bytes::from_static(b"hello"));
        assert_eq!(envelope.header.magic, MAGIC);
        assert_eq!(envelope.header.length, 5);
        assert_eq!(envelope.payload_len(), 5);
        assert_eq!(envelope.into_payload(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_build_envelope_abc() {
        let bytes = build_envelope(b"abc");
        assert_eq!(bytes, vec![0xFE, 0xED, 0x00, 0x00, 0x00, 0x03, b'a', b'b', b'c']);
    }

    #[test]
    fn test_build_envelope_empty_payload() {
        let bytes = build_envelope(b"");
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(EnvelopeHeader::decode(&bytes).unwrap().length, 0);
    }

    #[test]
    fn test_build_envelope_parts() {
        let (header, payload) = build_envelope_parts(b"jpeg");
        assert_eq!(EnvelopeHeader::decode(&header).unwrap(), EnvelopeHeader::new(4));
        assert_eq!(payload, b"jpeg");
    }
}
