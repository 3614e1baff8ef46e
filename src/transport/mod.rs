//! Transport module - producer-side TCP connection to the relay.
//!
//! Provides:
//! - [`FrameTransport`]: connect / send / disconnect over one serialized socket
//! - [`ConnectionState`]: observable connection status

mod state;
mod tcp;

pub use state::ConnectionState;
pub use tcp::{FrameTransport, SendOutcome};
