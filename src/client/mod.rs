//! Raw-socket handshake client.
//!
//! Opens a TCP connection, sends the fixed Upgrade request and collects the
//! response up to the blank line. A slow, partial or silent server is not an
//! error here: the caller gets whatever arrived and decides what it means.
//!
//! ```rust,ignore
//! use wsprobe::client::HandshakeClient;
//! use wsprobe::config::{Target, Timeouts};
//!
//! let client = HandshakeClient::new(Target::default(), Timeouts::default());
//! let mut session = client.connect_and_handshake(0).await?;
//! assert!(session.is_upgraded());
//! session.close().await;
//! ```

mod session;

pub use session::{ClientSession, SessionOutcome, SharedSession};

use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::config::{Limits, Target, Timeouts};
use crate::error::{Error, Result};
use crate::protocol::handshake::find_header_end;
use crate::protocol::{RawHttpResponse, upgrade_request};

const READ_CHUNK: usize = 1024;

/// Performs Upgrade handshakes against one target.
#[derive(Debug, Clone)]
pub struct HandshakeClient {
    target: Target,
    timeouts: Timeouts,
    limits: Limits,
}

impl HandshakeClient {
    /// Create a client with default limits.
    #[must_use]
    pub fn new(target: Target, timeouts: Timeouts) -> Self {
        Self {
            target,
            timeouts,
            limits: Limits::default(),
        }
    }

    /// Set size limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// The server this client talks to.
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Configured timeouts.
    #[must_use]
    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Open a TCP connection within the connect timeout.
    ///
    /// # Errors
    ///
    /// `Error::Timeout` if the connect does not finish in time, `Error::Io` if
    /// it is refused.
    pub async fn connect(&self) -> Result<TcpStream> {
        let limit = self.timeouts.connect;
        let stream = tokio::time::timeout(limit, TcpStream::connect(self.target.authority()))
            .await
            .map_err(|_| Error::Timeout {
                operation: "connect",
                elapsed: limit,
            })??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Connect, send the Upgrade request and read the response headers.
    ///
    /// Reading stops at the first `\r\n\r\n`, when the read timeout (a total
    /// deadline) expires, or when the peer closes. The returned session holds
    /// the open socket either way; check
    /// [`is_upgraded`](ClientSession::is_upgraded) for the verdict.
    ///
    /// # Errors
    ///
    /// `Error::Timeout` / `Error::Io` if the connection cannot be opened or
    /// the request cannot be written. Headers beyond the configured size limit
    /// are cut off and returned as an incomplete response.
    pub async fn connect_and_handshake(&self, index: usize) -> Result<ClientSession> {
        let created_at = Instant::now();
        let mut stream = self.connect().await?;
        stream
            .write_all(upgrade_request(&self.target).as_bytes())
            .await?;

        let (response, leftover) = self.read_response(&mut stream).await;
        info!(
            client = index,
            len = response.len(),
            complete = response.complete,
            status = response.status_line().as_deref().unwrap_or("-"),
            "got reply"
        );

        Ok(ClientSession::new(
            index,
            stream,
            response,
            leftover,
            created_at,
            self.limits.clone(),
        ))
    }

    /// Connect, send the Upgrade request and perform exactly one read bounded by
    /// the short-read timeout. Models a client that gives up early.
    ///
    /// # Errors
    ///
    /// `Error::Timeout` / `Error::Io` if the connection cannot be opened or the
    /// request cannot be written. A read timeout yields an empty response.
    pub async fn single_read(&self) -> Result<RawHttpResponse> {
        let mut stream = self.connect().await?;
        stream
            .write_all(upgrade_request(&self.target).as_bytes())
            .await?;

        let mut buf = vec![0u8; 4096];
        let response = match tokio::time::timeout(self.timeouts.short_read, stream.read(&mut buf))
            .await
        {
            Ok(Ok(n)) => {
                buf.truncate(n);
                RawHttpResponse::new(buf)
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                debug!("short read timed out");
                RawHttpResponse::default()
            }
        };
        let _ = stream.shutdown().await;
        Ok(response)
    }

    async fn read_response(&self, stream: &mut TcpStream) -> (RawHttpResponse, Bytes) {
        let deadline = tokio::time::Instant::now() + self.timeouts.read;
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(end) = find_header_end(&buf) {
                let leftover = buf.split_off(end).freeze();
                return (RawHttpResponse::new(buf.freeze()), leftover);
            }
            if let Err(e) = self.limits.check_handshake_size(buf.len()) {
                debug!(error = %e, "handshake response over limit");
                buf.truncate(self.limits.max_handshake_size);
                break;
            }

            match tokio::time::timeout_at(deadline, stream.read(&mut chunk)).await {
                Ok(Ok(0)) => {
                    debug!(len = buf.len(), "peer closed during handshake");
                    break;
                }
                Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => {
                    debug!(error = %e, "read error during handshake");
                    break;
                }
                Err(_) => {
                    debug!(len = buf.len(), "handshake read timed out");
                    break;
                }
            }
        }

        (RawHttpResponse::new(buf.freeze()), Bytes::new())
    }
}
