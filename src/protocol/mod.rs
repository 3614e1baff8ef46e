//! Protocol module - wire format, envelopes and stream demultiplexing.
//!
//! This module implements the binary protocol shared by producer and relay:
//! - 6-byte header encoding/decoding (`0xFEED` magic + u32 length)
//! - Envelope buffer for accumulating partial reads
//! - Envelope struct and builders

mod envelope;
mod envelope_buffer;
mod wire_format;

pub use envelope::{build_envelope, build_envelope_parts, Envelope};
pub use envelope_buffer::EnvelopeBuffer;
pub use wire_format::{EnvelopeHeader, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE, MAGIC};
