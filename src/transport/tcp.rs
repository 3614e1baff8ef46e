//! Outbound TCP transport.
//!
//! One [`FrameTransport`] owns at most one socket to the relay. Every socket
//! operation (`connect`, `send`, `disconnect`) runs inside the same
//! `tokio::sync::Mutex`, so a send racing a disconnect either completes
//! before it or finds no socket; an envelope is never half written by one
//! caller while another closes the stream.
//!
//! Failures never escape as errors to the capture path; they show up as
//! [`ConnectionState`] changes. `connect` also returns the error to its
//! direct caller.
//!
//! # Example
//!
//! ```ignore
//! use camwire::transport::{FrameTransport, SendOutcome};
//!
//! let transport = FrameTransport::new();
//! transport.connect(5000).await?;
//! assert_eq!(transport.send(&jpeg).await, SendOutcome::Sent);
//! transport.disconnect().await;
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::{broadcast, Mutex};

use super::state::{ConnectionState, StateCell};
use crate::config::{validate_port, TransportConfig};
use crate::error::{CamwireError, Result};
use crate::writer::write_envelope;

/// Result of a [`FrameTransport::send`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Envelope written and flushed.
    Sent,
    /// No live connection (or an unsendable payload); nothing was written.
    Skipped,
    /// Write failed; the socket was closed and the state is `Disconnected`.
    Failed,
}

/// A live connection to the relay.
#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
}

/// Write-only TCP connection to the relay.
#[derive(Debug)]
pub struct FrameTransport {
    connection: Mutex<Option<Connection>>,
    state: StateCell,
    config: TransportConfig,
    frames_sent: AtomicU64,
}

impl FrameTransport {
    /// Create a transport with default settings, in state `Idle`.
    pub fn new() -> Self {
        Self::with_config(TransportConfig::default())
    }

    /// Create a transport with custom settings, in state `Idle`.
    pub fn with_config(config: TransportConfig) -> Self {
        Self {
            connection: Mutex::new(None),
            state: StateCell::new(),
            config,
            frames_sent: AtomicU64::new(0),
        }
    }

    /// Open a connection to `host:port`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// - `InvalidPort` if the port is outside `1024..=65535` (no socket is created)
    /// - `ConnectTimeout` if the handshake takes longer than the connect timeout
    /// - `Io` on refusal or socket setup failure
    ///
    /// In every error case the state ends up `Error` with no live socket.
    pub async fn connect(&self, port: u16) -> Result<()> {
        if let Err(e) = validate_port(port) {
            tracing::error!("{}", e);
            self.state.set(ConnectionState::Error);
            return Err(e);
        }

        self.state.set(ConnectionState::Connecting);

        let mut guard = self.connection.lock().await;
        Self::close_connection(&mut guard).await;

        let addr = SocketAddr::new(self.config.host, port);
        tracing::debug!("Connecting to {}", addr);

        match self.open(addr).await {
            Ok(stream) => {
                *guard = Some(Connection { stream, peer: addr });
                tracing::info!("TCP connection established to {}", addr);
                self.state.set(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Connection to {} failed: {}", addr, e);
                self.state.set(ConnectionState::Error);
                Err(e)
            }
        }
    }

    /// Dial with the configured socket options.
    async fn open(&self, addr: SocketAddr) -> Result<TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_send_buffer_size(self.config.send_buffer_size)?;

        let timeout = self.config.connect_timeout;
        let stream = tokio::time::timeout(timeout, socket.connect(addr))
            .await
            .map_err(|_| CamwireError::ConnectTimeout(timeout))??;

        // Frames are latency bound; never wait to coalesce small writes.
        // No read timeout either: this side never reads.
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Write one envelope carrying `payload`.
    ///
    /// A no-op unless the state is `Connected`. On write failure the socket
    /// is closed and the state moves to `Disconnected`; later sends are
    /// no-ops until the next successful `connect`.
    pub async fn send(&self, payload: &[u8]) -> SendOutcome {
        if u32::try_from(payload.len()).is_err() {
            tracing::warn!("Dropping {} byte payload: too large for one envelope", payload.len());
            return SendOutcome::Skipped;
        }

        let mut guard = self.connection.lock().await;
        if self.state.get() != ConnectionState::Connected {
            return SendOutcome::Skipped;
        }
        let Some(connection) = guard.as_mut() else {
            return SendOutcome::Skipped;
        };

        match write_envelope(&mut connection.stream, payload).await {
            Ok(()) => {
                self.frames_sent.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Sent
            }
            Err(e) => {
                tracing::error!("Write error to {}, closing socket: {}", connection.peer, e);
                Self::close_connection(&mut guard).await;
                self.state.set(ConnectionState::Disconnected);
                SendOutcome::Failed
            }
        }
    }

    /// Close the connection (if any) and move to `Disconnected`.
    pub async fn disconnect(&self) {
        let mut guard = self.connection.lock().await;
        Self::close_connection(&mut guard).await;
        self.state.set(ConnectionState::Disconnected);
    }

    /// Close and forget the socket. Must be called with the lock held.
    async fn close_connection(slot: &mut Option<Connection>) {
        if let Some(mut connection) = slot.take() {
            if let Err(e) = connection.stream.shutdown().await {
                tracing::debug!("Error during socket close: {}", e);
            }
            tracing::debug!("Connection to {} closed", connection.peer);
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Whether the state is `Connected`.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to state changes (ordered, no repeats).
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Envelopes written successfully over the transport's lifetime.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }
}

impl Default for FrameTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EnvelopeBuffer;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn local_listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_starts_idle() {
        let transport = FrameTransport::new();
        assert_eq!(transport.state(), ConnectionState::Idle);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_invalid_port_sets_error_without_connecting() {
        let transport = FrameTransport::new();
        let mut rx = transport.subscribe();

        let err = transport.connect(80).await.unwrap_err();

        assert!(matches!(err, CamwireError::InvalidPort(80)));
        assert_eq!(transport.state(), ConnectionState::Error);
        // Straight to Error: no Connecting, no dial.
        assert_eq!(rx.try_recv().unwrap(), ConnectionState::Error);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_while_idle_is_noop() {
        let transport = FrameTransport::new();
        assert_eq!(transport.send(b"abc").await, SendOutcome::Skipped);
        assert_eq!(transport.state(), ConnectionState::Idle);
        assert_eq!(transport.frames_sent(), 0);
    }

    #[tokio::test]
    async fn test_connect_send_disconnect() {
        let (listener, port) = local_listener().await;
        let transport = FrameTransport::new();
        let mut rx = transport.subscribe();

        transport.connect(port).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), ConnectionState::Connecting);
        assert_eq!(rx.recv().await.unwrap(), ConnectionState::Connected);

        assert_eq!(transport.send(b"abc").await, SendOutcome::Sent);
        assert_eq!(transport.send(b"defg").await, SendOutcome::Sent);
        transport.disconnect().await;
        assert_eq!(rx.recv().await.unwrap(), ConnectionState::Disconnected);

        let mut wire = Vec::new();
        server.read_to_end(&mut wire).await.unwrap();
        let envelopes = EnvelopeBuffer::new().push(&wire).unwrap();
        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[0].payload(), b"abc");
        assert_eq!(envelopes[1].payload(), b"defg");

        assert_eq!(transport.send(b"late").await, SendOutcome::Skipped);
        assert_eq!(transport.frames_sent(), 2);
    }

    #[tokio::test]
    async fn test_refused_connection_sets_error() {
        let (listener, port) = local_listener().await;
        drop(listener);

        let transport = FrameTransport::new();
        assert!(transport.connect(port).await.is_err());
        assert_eq!(transport.state(), ConnectionState::Error);
        assert_eq!(transport.send(b"abc").await, SendOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_write_failure_moves_to_disconnected() {
        let (listener, port) = local_listener().await;
        let transport = FrameTransport::new();
        transport.connect(port).await.unwrap();

        let (server, _) = listener.accept().await.unwrap();
        drop(server);
        drop(listener);

        let payload = vec![0u8; 64 * 1024];
        let mut outcome = SendOutcome::Sent;
        for _ in 0..100 {
            outcome = transport.send(&payload).await;
            if outcome != SendOutcome::Sent {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(outcome, SendOutcome::Failed);
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(transport.send(b"abc").await, SendOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_previous_socket() {
        let (listener, port) = local_listener().await;
        let transport = FrameTransport::new();

        transport.connect(port).await.unwrap();
        let (mut first, _) = listener.accept().await.unwrap();
        transport.connect(port).await.unwrap();
        let (mut second, _) = listener.accept().await.unwrap();

        // The first socket was shut down by the second connect.
        let mut rest = Vec::new();
        first.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        assert_eq!(transport.send(b"x").await, SendOutcome::Sent);
        transport.disconnect().await;
        let mut wire = Vec::new();
        second.read_to_end(&mut wire).await.unwrap();
        assert_eq!(EnvelopeBuffer::new().push(&wire).unwrap().len(), 1);
    }
}
