//! Control plane module - JSON-lines status reporting on stdout.
//!
//! A wrapping UI launches `camwire-send` and reads one JSON object per line
//! from its stdout. Logs always go to stderr so the two never mix.
//!
//! # Example
//!
//! ```ignore
//! use camwire::control::{write_stdout_json, ControlEvent};
//! use camwire::transport::ConnectionState;
//!
//! write_stdout_json(&ControlEvent::Status { state: ConnectionState::Connected })?;
//! // {"event":"status","state":"connected"}
//! ```

mod event;
mod stdio;

pub use event::ControlEvent;
pub use stdio::{write_json_line, write_stdout_json, write_stdout_line};
