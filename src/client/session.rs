use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::codec::{decode_one_frame, send_masked_text};
use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::{Frame, RawHttpResponse};

/// A session shared between its owning task and a driver's registry.
pub type SharedSession = Arc<Mutex<ClientSession>>;

/// What the harness has observed on a session so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionOutcome {
    /// Nothing exchanged yet.
    #[default]
    Pending,
    /// Server answered with `101 Switching Protocols`.
    HandshakeOk,
    /// Server answered with something else, partially, or not at all.
    HandshakeFailed,
    /// Last frame exchange succeeded.
    FrameOk,
    /// Last frame exchange failed.
    FrameFailed,
    /// The harness closed the socket.
    Closed,
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionOutcome::Pending => write!(f, "pending"),
            SessionOutcome::HandshakeOk => write!(f, "handshake-ok"),
            SessionOutcome::HandshakeFailed => write!(f, "handshake-failed"),
            SessionOutcome::FrameOk => write!(f, "frame-ok"),
            SessionOutcome::FrameFailed => write!(f, "frame-failed"),
            SessionOutcome::Closed => write!(f, "closed"),
        }
    }
}

/// One client connection after the handshake attempt.
///
/// Owns the socket. Closing is idempotent: once closed, sends and reads fail
/// with `Error::ConnectionClosed` and further closes are no-ops.
#[derive(Debug)]
pub struct ClientSession {
    index: usize,
    stream: Option<TcpStream>,
    response: RawHttpResponse,
    // Bytes the server sent right after the header block.
    leftover: Bytes,
    created_at: Instant,
    last_activity: Instant,
    outcome: SessionOutcome,
    limits: Limits,
}

impl ClientSession {
    pub(crate) fn new(
        index: usize,
        stream: TcpStream,
        response: RawHttpResponse,
        leftover: Bytes,
        created_at: Instant,
        limits: Limits,
    ) -> Self {
        let outcome = if response.is_upgrade() {
            SessionOutcome::HandshakeOk
        } else {
            SessionOutcome::HandshakeFailed
        };
        Self {
            index,
            stream: Some(stream),
            response,
            leftover,
            created_at,
            last_activity: Instant::now(),
            outcome,
            limits,
        }
    }

    /// Stable client index assigned by the creator.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Raw handshake response.
    #[must_use]
    pub fn response(&self) -> &RawHttpResponse {
        &self.response
    }

    /// Latest observed outcome.
    #[must_use]
    pub fn outcome(&self) -> SessionOutcome {
        self.outcome
    }

    /// When the TCP connect started.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Last successful send or receive.
    #[must_use]
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Whether the server switched protocols.
    #[must_use]
    pub fn is_upgraded(&self) -> bool {
        self.response.is_upgrade()
    }

    /// Whether the socket has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Send one masked text frame.
    ///
    /// # Errors
    ///
    /// `Error::ConnectionClosed` after [`close`](Self::close), `Error::Timeout`
    /// if the write does not complete within `limit`, otherwise the I/O error.
    pub async fn send_text(&mut self, payload: &[u8], limit: Duration) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::ConnectionClosed)?;
        let sent = tokio::time::timeout(limit, send_masked_text(stream, payload))
            .await
            .map_err(|_| Error::Timeout {
                operation: "frame write",
                elapsed: limit,
            })
            .and_then(|r| r);

        match sent {
            Ok(n) => {
                debug!(client = self.index, bytes = n, "sent masked text frame");
                self.last_activity = Instant::now();
                Ok(())
            }
            Err(e) => {
                self.outcome = SessionOutcome::FrameFailed;
                Err(e)
            }
        }
    }

    /// Read one frame, bounded by `limit`.
    ///
    /// # Errors
    ///
    /// `Error::Timeout` if no complete frame arrives in time, otherwise the
    /// decode error.
    pub async fn read_frame(&mut self, limit: Duration) -> Result<Frame> {
        let stream = self.stream.as_mut().ok_or(Error::ConnectionClosed)?;
        let leftover = std::mem::take(&mut self.leftover);
        let mut reader = (&leftover[..]).chain(stream);

        let decoded = tokio::time::timeout(limit, decode_one_frame(&mut reader, &self.limits))
            .await
            .map_err(|_| Error::Timeout {
                operation: "frame read",
                elapsed: limit,
            })
            .and_then(|r| r);

        let (rest, _) = reader.into_inner();
        self.leftover = Bytes::copy_from_slice(rest);

        match decoded {
            Ok(frame) => {
                debug!(
                    client = self.index,
                    opcode = %frame.opcode,
                    len = frame.payload().len(),
                    "received frame"
                );
                self.last_activity = Instant::now();
                self.outcome = SessionOutcome::FrameOk;
                Ok(frame)
            }
            Err(e) => {
                self.outcome = SessionOutcome::FrameFailed;
                Err(e)
            }
        }
    }

    /// Close the socket. Safe to call repeatedly or on an errored socket.
    ///
    /// Returns `true` if this call closed it.
    pub async fn close(&mut self) -> bool {
        match self.stream.take() {
            Some(mut stream) => {
                // The peer may already be gone; shutdown errors are irrelevant here.
                let _ = stream.shutdown().await;
                self.outcome = SessionOutcome::Closed;
                true
            }
            None => false,
        }
    }

    /// Wrap for sharing with a background task.
    #[must_use]
    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }
}
