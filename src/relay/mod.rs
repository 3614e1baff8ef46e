//! Relay module - host-side listener, session and subprocess supervision.
//!
//! Provides:
//! - [`FrameServer`]: accept loop with one active session at a time
//! - [`Session`]: one connection demultiplexed into one subprocess
//! - [`ProcessSupervisor`]: spawn / feed / terminate of the encoder process

mod server;
mod session;
mod supervisor;

pub use server::{FrameServer, FrameServerBuilder, RelayEvent};
pub use session::{EndReason, Session, SessionId};
pub use supervisor::{ExitState, ProcessSupervisor};
