//! Wire format encoding and decoding.
//!
//! Implements the 6-byte envelope header:
//! ```text
//! ┌──────────┬──────────┬─────────────────┐
//! │ Magic    │ Length   │ Payload (JPEG)  │
//! │ 2 bytes  │ 4 bytes  │ Length bytes    │
//! │ uint16 BE│ uint32 BE│                 │
//! └──────────┴──────────┴─────────────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. There is no checksum and no
//! version field; the magic value is the only alignment check.

use crate::error::{CamwireError, Result};

/// Sentinel that starts every envelope.
pub const MAGIC: u16 = 0xFEED;

/// Header size in bytes (magic + length).
pub const HEADER_SIZE: usize = 6;

/// Default maximum payload the relay accepts (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Decoded envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Alignment sentinel, [`MAGIC`] on a healthy stream.
    pub magic: u16,
    /// Payload length in bytes.
    pub length: u32,
}

impl EnvelopeHeader {
    /// Header for a payload of `length` bytes with the standard magic.
    pub fn new(length: u32) -> Self {
        Self {
            magic: MAGIC,
            length,
        }
    }

    /// Header for a payload slice.
    ///
    /// Returns `None` if the payload does not fit in a `u32` length field.
    pub fn for_payload(payload: &[u8]) -> Option<Self> {
        u32::try_from(payload.len()).ok().map(Self::new)
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use camwire::protocol::EnvelopeHeader;
    ///
    /// let bytes = EnvelopeHeader::new(3).encode();
    /// assert_eq!(bytes, [0xFE, 0xED, 0, 0, 0, 3]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (6 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.magic.to_be_bytes());
        buf[2..6].copy_from_slice(&self.length.to_be_bytes());
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short. The magic is not checked here,
    /// see [`EnvelopeHeader::validate`].
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic: u16::from_be_bytes([buf[0], buf[1]]),
            length: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
        })
    }

    /// Check the magic and the declared length against `max_payload_size`.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.magic != MAGIC {
            return Err(CamwireError::BadMagic(self.magic));
        }

        if self.length > max_payload_size {
            return Err(CamwireError::PayloadTooLarge {
                length: self.length,
                max: max_payload_size,
            });
        }

        Ok(())
    }

    /// Total envelope size on the wire.
    #[inline]
    pub fn envelope_len(&self) -> usize {
        HEADER_SIZE + self.length as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = EnvelopeHeader {
            magic: 0x0102,
            length: 0x03040506,
        };
        assert_eq!(header.encode(), [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn test_new_uses_feed_magic() {
        let bytes = EnvelopeHeader::new(0).encode();
        assert_eq!(&bytes[..2], &[0xFE, 0xED]);
        assert_eq!(&bytes[2..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(EnvelopeHeader::decode(&[0xFE, 0xED, 0, 0, 0]).is_none());
    }

    #[test]
    fn test_decode_reads_length() {
        let header = EnvelopeHeader::decode(&[0xFE, 0xED, 0, 1, 0, 0, 0xAA]).unwrap();
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.length, 65536);
        assert_eq!(header.envelope_len(), HEADER_SIZE + 65536);
    }

    #[test]
    fn test_validate_bad_magic() {
        let header = EnvelopeHeader {
            magic: 0xBEEF,
            length: 3,
        };
        let err = header.validate(DEFAULT_MAX_PAYLOAD_SIZE).unwrap_err();
        assert!(matches!(err, CamwireError::BadMagic(0xBEEF)));
        assert!(err.to_string().contains("0xBEEF"));
    }

    #[test]
    fn test_validate_payload_too_large() {
        let header = EnvelopeHeader::new(1_000);
        let err = header.validate(100).unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_validate_max_length_accepted() {
        assert!(EnvelopeHeader::new(u32::MAX).validate(u32::MAX).is_ok());
    }

    #[test]
    fn test_for_payload() {
        let header = EnvelopeHeader::for_payload(b"abc").unwrap();
        assert_eq!(header, EnvelopeHeader::new(3));
    }
}
