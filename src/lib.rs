//! # camwire
//!
//! Streams a phone camera into a virtual webcam on a host machine.
//!
//! ## Architecture
//!
//! - **Producer** (phone side): capture callback -> drop-oldest [`FrameQueue`]
//!   -> single consumer task -> [`FrameTransport`] over a loopback tunnel
//! - **Relay** (host side): [`FrameServer`] demultiplexes envelopes from one
//!   connection at a time into an `ffmpeg` subprocess writing a v4l2 device
//!
//! ## Wire format
//!
//! ```text
//! +--------------+----------------+------------------+
//! | magic (u16)  | length (u32)   | payload (JPEG)   |
//! | 0xFEED, BE   | BE             | `length` bytes   |
//! +--------------+----------------+------------------+
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use camwire::Producer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let producer = Producer::builder().start();
//!     producer.connect(5000).await?;
//!     producer.on_frame_captured(jpeg, 1280, 720);
//!     producer.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod frame;
pub mod producer;
pub mod protocol;
pub mod queue;
pub mod relay;
pub mod transport;
pub mod writer;

pub use config::{ProducerConfig, RelayConfig, SubprocessConfig};
pub use error::{CamwireError, Result};
pub use frame::Frame;
pub use producer::{CaptureOutcome, Producer, ProducerBuilder};
pub use queue::{EnqueueOutcome, FrameQueue};
pub use relay::{FrameServer, RelayEvent};
pub use transport::{ConnectionState, FrameTransport, SendOutcome};
