//! One producer connection and the subprocess serving it.

use std::fmt;
use std::net::SocketAddr;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use super::supervisor::{ExitState, ProcessSupervisor};
use crate::error::CamwireError;
use crate::protocol::EnvelopeBuffer;

/// Socket read size.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Monotonically increasing session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Peer closed the connection.
    Closed,
    /// Socket read failed.
    SocketError,
    /// Bad magic or oversized envelope.
    ProtocolViolation,
    /// The subprocess exited while the connection was still open.
    SubprocessExited,
    /// A newer connection took over.
    Preempted,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndReason::Closed => "connection closed",
            EndReason::SocketError => "socket error",
            EndReason::ProtocolViolation => "protocol violation",
            EndReason::SubprocessExited => "subprocess exited",
            EndReason::Preempted => "preempted",
        };
        f.write_str(s)
    }
}

/// Accepted connection paired with its dedicated subprocess.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    stream: TcpStream,
    supervisor: ProcessSupervisor,
    buffer: EnvelopeBuffer,
}

impl Session {
    /// Pair `stream` with a freshly spawned `supervisor`.
    pub fn new(
        id: SessionId,
        peer: SocketAddr,
        stream: TcpStream,
        supervisor: ProcessSupervisor,
        max_payload_size: u32,
    ) -> Self {
        Self {
            id,
            peer,
            stream,
            supervisor,
            buffer: EnvelopeBuffer::with_max_payload(max_payload_size),
        }
    }

    /// Session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Pump envelopes into the subprocess until the connection ends, the
    /// subprocess exits or `cancel` fires, then terminate the subprocess and
    /// wait for it.
    ///
    /// A dropped `cancel` sender counts as preemption.
    pub async fn run(mut self, cancel: oneshot::Receiver<()>) -> (EndReason, ExitState) {
        let reason = tokio::select! {
            reason = self.pump() => reason,
            _ = cancel => EndReason::Preempted,
        };

        tracing::info!("Session {} from {} ending: {}", self.id, self.peer, reason);
        // Dropped before the subprocess is awaited so the peer sees the close at once.
        drop(self.stream);
        let mut supervisor = self.supervisor;
        let exit = supervisor.terminate().await;
        (reason, exit)
    }

    /// Read loop: forward every complete envelope payload, in order.
    async fn pump(&mut self) -> EndReason {
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let read = tokio::select! {
                read = self.stream.read(&mut chunk) => read,
                exit = self.supervisor.exited() => {
                    tracing::warn!("Subprocess for session {} {}, closing connection", self.id, exit);
                    return EndReason::SubprocessExited;
                }
            };
            let n = match read {
                Ok(0) => return EndReason::Closed,
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("Socket error from {}: {}", self.peer, e);
                    return EndReason::SocketError;
                }
            };

            self.buffer.extend(&chunk[..n]);
            loop {
                match self.buffer.next_envelope() {
                    Ok(Some(envelope)) => self.forward(envelope.payload()).await,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("Protocol mismatch from {}: {}", self.peer, e);
                        return EndReason::ProtocolViolation;
                    }
                }
            }
        }
    }

    async fn forward(&mut self, payload: &[u8]) {
        match self.supervisor.feed(payload).await {
            Ok(()) => {}
            Err(CamwireError::NotRunning) => {
                tracing::trace!("Dropping {} byte frame: subprocess gone", payload.len());
            }
            Err(e) => tracing::debug!("Feed failed: {}", e),
        }
    }
}
