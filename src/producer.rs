//! Producer side: capture entry point, consumer loop and connection control.
//!
//! The [`ProducerBuilder`] configures queue and socket settings. The
//! [`Producer`] wires the pieces together:
//! 1. The capture callback calls [`Producer::on_frame_captured`], which
//!    enqueues without blocking
//! 2. One consumer task drains the [`FrameQueue`] in order
//! 3. Each frame goes out through [`FrameTransport::send`]
//!
//! # Example
//!
//! ```ignore
//! use camwire::Producer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let producer = Producer::builder().queue_capacity(2).start();
//!     producer.connect(5000).await?;
//!
//!     // From the camera callback, on any thread:
//!     producer.on_frame_captured(jpeg_bytes, 1280, 720);
//!
//!     producer.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::ProducerConfig;
use crate::error::Result;
use crate::frame::Frame;
use crate::queue::{EnqueueOutcome, FrameQueue};
use crate::transport::{ConnectionState, FrameTransport, SendOutcome};

/// Poll period of [`Producer::flush`].
const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// What happened to a frame handed to [`Producer::on_frame_captured`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Not connected; the frame was dropped before queueing.
    Skipped,
    /// Handed to the queue.
    Enqueued(EnqueueOutcome),
}

/// Builder for configuring and starting a [`Producer`].
#[derive(Debug, Clone, Default)]
pub struct ProducerBuilder {
    config: ProducerConfig,
}

impl ProducerBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending frames kept before the oldest is dropped.
    ///
    /// Default: 2
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Connect timeout.
    ///
    /// Default: 3 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.connect_timeout = timeout;
        self
    }

    /// Socket send buffer size.
    ///
    /// Default: 64 KiB
    pub fn send_buffer_size(mut self, size: u32) -> Self {
        self.config.transport.send_buffer_size = size;
        self
    }

    /// Emit a trace line every `n` frames sent (0 disables).
    ///
    /// Default: 100
    pub fn log_every(mut self, n: u64) -> Self {
        self.config.log_every = n;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ProducerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the producer and start its consumer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Producer {
        Producer::start(self.config)
    }
}

/// Running producer pipeline.
#[derive(Debug)]
pub struct Producer {
    queue: Arc<FrameQueue>,
    transport: Arc<FrameTransport>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    /// Frames stored in the queue.
    accepted: AtomicU64,
    /// Frames the consumer has finished with, whatever the send outcome.
    settled: Arc<AtomicU64>,
}

impl Producer {
    /// Create a new producer builder.
    pub fn builder() -> ProducerBuilder {
        ProducerBuilder::new()
    }

    fn start(config: ProducerConfig) -> Self {
        let queue = Arc::new(FrameQueue::with_capacity(config.queue_capacity));
        let transport = Arc::new(FrameTransport::with_config(config.transport));
        let settled = Arc::new(AtomicU64::new(0));
        let consumer = spawn_consumer(
            queue.clone(),
            transport.clone(),
            settled.clone(),
            config.log_every,
        );

        Self {
            queue,
            transport,
            consumer: Mutex::new(Some(consumer)),
            accepted: AtomicU64::new(0),
            settled,
        }
    }

    /// Capture callback entry point. Never blocks and never fails.
    ///
    /// Frames captured while not connected are dropped immediately.
    pub fn on_frame_captured(
        &self,
        jpeg: impl Into<Bytes>,
        width: u32,
        height: u32,
    ) -> CaptureOutcome {
        if !self.transport.is_connected() {
            return CaptureOutcome::Skipped;
        }
        CaptureOutcome::Enqueued(self.enqueue(Frame::captured_now(jpeg, width, height)))
    }

    /// Queue an already built frame regardless of connection state.
    pub fn enqueue(&self, frame: Frame) -> EnqueueOutcome {
        let outcome = self.queue.enqueue(frame);
        if outcome != EnqueueOutcome::Closed {
            self.accepted.fetch_add(1, Ordering::AcqRel);
        }
        outcome
    }

    /// Connect the transport to `127.0.0.1:port`.
    pub async fn connect(&self, port: u16) -> Result<()> {
        self.transport.connect(port).await
    }

    /// Disconnect the transport. Frames still queued are dropped by `send`.
    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
    }

    /// Connect if not connected, disconnect otherwise.
    ///
    /// Returns the resulting state; a failed connect shows up as `Error`.
    pub async fn toggle_connection(&self, port: u16) -> ConnectionState {
        if self.transport.is_connected() {
            self.disconnect().await;
        } else if let Err(e) = self.connect(port).await {
            tracing::debug!("Toggle connect failed: {}", e);
        }
        self.transport.state()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.transport.subscribe()
    }

    /// Envelopes written since start.
    pub fn frames_sent(&self) -> u64 {
        self.transport.frames_sent()
    }

    /// Frames waiting in the queue.
    pub fn pending_frames(&self) -> usize {
        self.queue.len()
    }

    /// Frames evicted by the drop-oldest policy since start.
    pub fn frames_dropped(&self) -> u64 {
        self.queue.dropped_count()
    }

    /// Wait until every frame queued so far has been written, evicted or
    /// given up on by the consumer.
    ///
    /// Covers the frame the consumer has already dequeued but not yet
    /// written. Returns `false` if `timeout` elapses first.
    pub async fn flush(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let done = self.settled.load(Ordering::Acquire) + self.queue.dropped_count();
            if done >= self.accepted.load(Ordering::Acquire) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(FLUSH_POLL_INTERVAL).await;
        }
    }

    /// Disconnect, close the queue and wait for the consumer task to end.
    ///
    /// Idempotent.
    pub async fn shutdown(&self) {
        self.transport.disconnect().await;
        self.queue.close();

        let consumer = self
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = consumer {
            if let Err(e) = handle.await {
                tracing::error!("Consumer task failed: {}", e);
            }
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        // Ends the consumer loop if `shutdown` was never awaited.
        self.queue.close();
    }
}

/// Spawn the single consumer: dequeue, send, repeat until the queue closes.
fn spawn_consumer(
    queue: Arc<FrameQueue>,
    transport: Arc<FrameTransport>,
    settled: Arc<AtomicU64>,
    log_every: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sent: u64 = 0;

        while let Some(frame) = queue.dequeue().await {
            match transport.send(&frame.payload).await {
                SendOutcome::Sent => {
                    sent += 1;
                    if log_every > 0 && sent % log_every == 0 {
                        tracing::trace!(
                            "Sent frame #{} ({}x{}, {} bytes, {} dropped so far)",
                            sent,
                            frame.width,
                            frame.height,
                            frame.len(),
                            queue.dropped_count()
                        );
                    }
                }
                SendOutcome::Skipped => {}
                SendOutcome::Failed => {
                    tracing::warn!("Frame send failed; waiting for reconnect");
                }
            }
            settled.fetch_add(1, Ordering::AcqRel);
        }

        tracing::debug!("Consumer loop finished after {} frames", sent);
    })
}
