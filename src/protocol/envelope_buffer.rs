//! Envelope buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented envelopes:
//! - `WaitingForHeader`: Need at least 6 bytes
//! - `WaitingForPayload`: Header parsed and validated, need N payload bytes
//!
//! # Example
//!
//! ```
//! use camwire::protocol::{build_envelope, EnvelopeBuffer};
//!
//! let mut buffer = EnvelopeBuffer::new();
//! let wire = build_envelope(b"abc");
//!
//! // Data arrives in chunks from the socket
//! assert!(buffer.push(&wire[..4]).unwrap().is_empty());
//! let envelopes = buffer.push(&wire[4..]).unwrap();
//! assert_eq!(envelopes[0].payload(), b"abc");
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{EnvelopeHeader, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use super::Envelope;
use crate::error::Result;

/// State machine for envelope parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header (need 6 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for payload bytes.
    WaitingForPayload { header: EnvelopeHeader },
}

/// Buffer for accumulating incoming bytes and extracting complete envelopes.
///
/// All data is stored in a single `BytesMut` buffer; extracted payloads are
/// frozen slices of it, so no payload is copied after the socket read.
#[derive(Debug)]
pub struct EnvelopeBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed payload size.
    max_payload_size: u32,
}

impl EnvelopeBuffer {
    /// Create a new envelope buffer with default settings.
    ///
    /// Default capacity: 64KB, max payload: 64MB.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new envelope buffer with custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete envelopes.
    ///
    /// Partial data is kept for the next push. On a protocol violation the
    /// envelopes already extracted in this call are discarded along with the
    /// error; callers that must forward everything before the violation use
    /// [`extend`](Self::extend) + [`next_envelope`](Self::next_envelope).
    ///
    /// # Errors
    ///
    /// Returns error on a bad magic value or an oversized payload.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Envelope>> {
        self.extend(data);

        let mut envelopes = Vec::new();
        while let Some(envelope) = self.next_envelope()? {
            envelopes.push(envelope);
        }

        Ok(envelopes)
    }

    /// Append data to the buffer without extracting envelopes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract a single envelope from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(envelope))` if a complete envelope was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a protocol violation (bad magic, payload too large)
    pub fn next_envelope(&mut self) -> Result<Option<Envelope>> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    let Some(header) = EnvelopeHeader::decode(&self.buffer) else {
                        return Ok(None);
                    };

                    // Reject before consuming so the offending bytes stay visible.
                    header.validate(self.max_payload_size)?;

                    let _ = self.buffer.split_to(HEADER_SIZE);
                    self.state = State::WaitingForPayload { header };
                }

                State::WaitingForPayload { header } => {
                    let length = header.length as usize;
                    if self.buffer.len() < length {
                        return Ok(None);
                    }

                    let payload = if length == 0 {
                        Bytes::new()
                    } else {
                        self.buffer.split_to(length).freeze()
                    };
                    self.state = State::WaitingForHeader;

                    return Ok(Some(Envelope::new(header, payload)));
                }
            }
        }
    }

    /// Get the number of buffered bytes not yet consumed.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

impl Default for EnvelopeBuffer {
    fn default() -> Self {
        Self::new()
    }
}
