//! Relay listener enforcing one active session at a time.
//!
//! The accept loop is the only place a session is created. Each accepted
//! connection preempts the previous session (cancel, then await its full
//! teardown including subprocess exit) before the next subprocess is
//! spawned. A session that ends on its own removes itself from the slot only
//! if the slot still holds its id, so a stale teardown can never clobber a
//! newer session.
//!
//! # Example
//!
//! ```ignore
//! use camwire::relay::FrameServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = FrameServer::builder()
//!         .port(5000)
//!         .device("/dev/video20")
//!         .bind()
//!         .await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use std::ffi::OsString;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use super::session::{EndReason, Session, SessionId};
use super::supervisor::{ExitState, ProcessSupervisor};
use crate::config::{RelayConfig, SubprocessConfig};
use crate::error::Result;

/// Buffered relay events per subscriber.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Session lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A connection was accepted and its subprocess started.
    SessionStarted {
        /// Session id.
        id: SessionId,
        /// Remote address.
        peer: SocketAddr,
    },
    /// A session finished tearing down; its subprocess has exited.
    SessionEnded {
        /// Session id.
        id: SessionId,
        /// Why it ended.
        reason: EndReason,
        /// Final subprocess state.
        exit: ExitState,
    },
}

/// The session currently feeding the device.
#[derive(Debug)]
struct ActiveSession {
    id: SessionId,
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Exclusive owner of the active session reference.
#[derive(Debug, Default)]
struct SessionSlot {
    inner: Mutex<Option<ActiveSession>>,
}

impl SessionSlot {
    fn lock(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self) -> Option<ActiveSession> {
        self.lock().take()
    }

    /// Clear the slot if it still belongs to `id`, then publish `event`.
    ///
    /// Both happen under the lock, so the accept loop either preempts a
    /// session that has not finished yet or observes its end event first.
    fn release(
        &self,
        id: SessionId,
        events: &broadcast::Sender<RelayEvent>,
        event: RelayEvent,
    ) -> bool {
        let mut slot = self.lock();
        let owned = slot.as_ref().map(|active| active.id) == Some(id);
        if owned {
            *slot = None;
        }
        let _ = events.send(event);
        owned
    }

    fn active_id(&self) -> Option<SessionId> {
        self.lock().as_ref().map(|active| active.id)
    }
}

/// Builder for configuring and binding a [`FrameServer`].
#[derive(Debug, Clone, Default)]
pub struct FrameServerBuilder {
    config: RelayConfig,
}

impl FrameServerBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen port (0 picks an ephemeral one).
    ///
    /// Default: 5000
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Listen address.
    ///
    /// Default: 0.0.0.0
    pub fn bind_addr(mut self, addr: IpAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Use `ffmpeg` writing to this v4l2 device, keeping the grace period.
    ///
    /// Default: /dev/video20
    pub fn device(mut self, device: impl Into<OsString>) -> Self {
        let grace_period = self.config.subprocess.grace_period;
        self.config.subprocess = SubprocessConfig::ffmpeg(device).with_grace_period(grace_period);
        self
    }

    /// Replace the subprocess command line entirely.
    pub fn subprocess(mut self, subprocess: SubprocessConfig) -> Self {
        self.config.subprocess = subprocess;
        self
    }

    /// Time a subprocess gets to exit after its stdin closes.
    ///
    /// Default: 1 second
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.config.subprocess.grace_period = grace_period;
        self
    }

    /// Pause after preempting a session.
    ///
    /// Default: 200 ms
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    /// Largest envelope payload accepted.
    ///
    /// Default: 64 MiB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Bind the listener.
    pub async fn bind(self) -> Result<FrameServer> {
        FrameServer::bind(self.config).await
    }
}

/// TCP relay feeding one encoder subprocess per producer connection.
#[derive(Debug)]
pub struct FrameServer {
    listener: TcpListener,
    config: RelayConfig,
    slot: Arc<SessionSlot>,
    events: broadcast::Sender<RelayEvent>,
    next_id: AtomicU64,
}

impl FrameServer {
    /// Create a new server builder.
    pub fn builder() -> FrameServerBuilder {
        FrameServerBuilder::new()
    }

    /// Bind `bind_addr:port`.
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        let listener = TcpListener::bind((config.bind_addr, config.port)).await?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            listener,
            config,
            slot: Arc::new(SessionSlot::default()),
            events,
            next_id: AtomicU64::new(1),
        })
    }

    /// Bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    /// Id of the session currently feeding the device, if any.
    pub fn active_session(&self) -> Option<SessionId> {
        self.slot.active_id()
    }

    /// Accept connections forever.
    ///
    /// Per-connection failures (protocol violations, socket errors, crashed
    /// or unspawnable subprocesses) are logged and never end the loop.
    pub async fn run(&self) -> Result<()> {
        tracing::info!(
            "Relay listening on {}, target {:?}",
            self.local_addr()?,
            self.config.subprocess.args.last()
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => self.handle_connection(stream, peer).await,
                Err(e) => tracing::error!("Accept failed: {}", e),
            }
        }
    }

    /// Preempt whatever is active, then start a session for `stream`.
    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        tracing::info!("Producer connected: {}", peer);
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("set_nodelay failed for {}: {}", peer, e);
        }

        if let Some(previous) = self.slot.take() {
            tracing::info!("Cleaning up previous session {}", previous.id);
            preempt(previous).await;
            // Lets the OS release the capture device.
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let supervisor = match ProcessSupervisor::spawn(&self.config.subprocess) {
            Ok(supervisor) => supervisor,
            Err(e) => {
                tracing::error!("Dropping connection from {}: {}", peer, e);
                return;
            }
        };

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Session::new(id, peer, stream, supervisor, self.config.max_payload_size);
        let (cancel, cancel_rx) = oneshot::channel();

        let slot = self.slot.clone();
        let events = self.events.clone();
        let _ = self.events.send(RelayEvent::SessionStarted { id, peer });

        {
            // Spawned under the lock so the task cannot clear the slot before it is installed.
            let mut guard = self.slot.lock();
            let task = tokio::spawn(async move {
                let (reason, exit) = session.run(cancel_rx).await;
                slot.release(id, &events, RelayEvent::SessionEnded { id, reason, exit });
            });
            *guard = Some(ActiveSession { id, cancel, task });
        }
    }

    /// Preempt the active session, if any, and wait for its teardown.
    pub async fn shutdown(&self) {
        if let Some(active) = self.slot.take() {
            preempt(active).await;
        }
    }
}

/// Signal a session to stop and wait until its subprocess has exited.
async fn preempt(active: ActiveSession) {
    // The session may already be tearing down on its own; the send then fails harmlessly.
    let _ = active.cancel.send(());
    if let Err(e) = active.task.await {
        tracing::error!("Session {} task failed: {}", active.id, e);
    }
}
