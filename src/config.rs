//! Configuration for the producer and relay sides.
//!
//! Plain structs with `Default` impls; the builders on
//! [`Producer`](crate::Producer) and [`FrameServer`](crate::relay::FrameServer)
//! fill them in.

use std::ffi::OsString;
use std::net::{IpAddr, Ipv4Addr};
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::error::{CamwireError, Result};
use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::queue::DEFAULT_QUEUE_CAPACITY;

/// Default TCP port shared by producer and relay.
pub const DEFAULT_PORT: u16 = 5000;

/// Ports the producer accepts.
pub const VALID_PORTS: RangeInclusive<u16> = 1024..=65535;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default kernel send buffer size (64 KiB).
pub const DEFAULT_SEND_BUFFER_SIZE: u32 = 64 * 1024;

/// Frames between two "sent frame" trace lines.
pub const DEFAULT_LOG_EVERY: u64 = 100;

/// Pause after tearing down a session before the next subprocess starts.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// How long a subprocess gets to exit after its stdin closes.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(1000);

/// Default v4l2 loopback device.
pub const DEFAULT_VIDEO_DEVICE: &str = "/dev/video20";

/// Default encoder program.
pub const DEFAULT_PROGRAM: &str = "ffmpeg";

/// MJPEG on stdin to raw yuv420p on a v4l2 device; the output device is appended.
#[rustfmt::skip]
const FFMPEG_LOW_LATENCY_ARGS: &[&str] = &[
    // input
    "-f", "image2pipe",
    "-vcodec", "mjpeg",
    "-probesize", "32768",
    "-analyzeduration", "0",
    "-fflags", "nobuffer",
    "-flags", "low_delay",
    "-i", "-",
    // output
    "-map", "0",
    "-vcodec", "rawvideo",
    "-pix_fmt", "yuv420p",
    "-threads", "0",
    "-f", "v4l2",
];

/// Reject ports outside [`VALID_PORTS`].
pub fn validate_port(port: u16) -> Result<u16> {
    if VALID_PORTS.contains(&port) {
        Ok(port)
    } else {
        Err(CamwireError::InvalidPort(port))
    }
}

/// Outbound connection settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Address dialed by `connect`; the tunnel exposes the relay on loopback.
    pub host: IpAddr,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// `SO_SNDBUF` for the socket.
    pub send_buffer_size: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            send_buffer_size: DEFAULT_SEND_BUFFER_SIZE,
        }
    }
}

/// Producer-side settings.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// Socket settings.
    pub transport: TransportConfig,
    /// Pending frames kept before dropping the oldest.
    pub queue_capacity: usize,
    /// Emit a trace line every this many sent frames (0 disables).
    pub log_every: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            log_every: DEFAULT_LOG_EVERY,
        }
    }
}

/// Encoder subprocess command line and shutdown timing.
#[derive(Debug, Clone)]
pub struct SubprocessConfig {
    /// Program to execute.
    pub program: OsString,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Grace period between closing stdin and force-killing.
    pub grace_period: Duration,
}

impl SubprocessConfig {
    /// Arbitrary command; mostly useful for tests and custom encoders.
    pub fn new<P, I, A>(program: P, args: I) -> Self
    where
        P: Into<OsString>,
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    /// `ffmpeg` reading an MJPEG stream from stdin and writing raw yuv420p
    /// video to a v4l2 device, tuned for latency over robustness.
    pub fn ffmpeg(device: impl Into<OsString>) -> Self {
        let mut args: Vec<OsString> = FFMPEG_LOW_LATENCY_ARGS
            .iter()
            .map(|arg| OsString::from(*arg))
            .collect();
        args.push(device.into());

        Self::new(DEFAULT_PROGRAM, args)
    }

    /// Override the grace period.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

impl Default for SubprocessConfig {
    fn default() -> Self {
        Self::ffmpeg(DEFAULT_VIDEO_DEVICE)
    }
}

/// Relay-side settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listen address (all interfaces by default).
    pub bind_addr: IpAddr,
    /// Listen port (0 picks an ephemeral port).
    pub port: u16,
    /// Pause after preempting a session.
    pub settle_delay: Duration,
    /// Largest envelope payload accepted before the connection is dropped.
    pub max_payload_size: u32,
    /// Encoder subprocess spawned per session.
    pub subprocess: SubprocessConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            subprocess: SubprocessConfig::default(),
        }
    }
}
