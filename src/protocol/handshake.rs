//! HTTP Upgrade handshake (RFC 6455 section 4).
//!
//! The harness always sends the same request for a given [`Target`]. The
//! response is kept as raw bytes: a partial or malformed answer is itself an
//! observation, so nothing here fails just because the server misbehaved.

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use sha1::{Digest, Sha1};

use crate::config::Target;
use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// End of the HTTP header block.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// ```
/// use wsprobe::protocol::compute_accept_key;
///
/// assert_eq!(
///     compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// The Upgrade request sent to `target`.
#[must_use]
pub fn upgrade_request(target: &Target) -> String {
    format!(
        "GET {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n",
        target.path, target.host_header, target.key
    )
}

/// Position just past the header terminator, if present.
#[must_use]
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .map(|at| at + HEADER_TERMINATOR.len())
}

/// Parse header lines into a map keyed by lowercase name.
fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }
    headers
}

/// Whatever the server sent back, up to the header terminator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawHttpResponse {
    /// Accumulated bytes. May be empty or partial.
    pub bytes: Bytes,
    /// Whether the header terminator was seen.
    pub complete: bool,
}

impl RawHttpResponse {
    /// Wrap accumulated bytes, marking the response complete if the
    /// terminator is present.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let complete = find_header_end(&bytes).is_some();
        Self { bytes, complete }
    }

    /// Number of bytes received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing was received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lossy text view for logs and diagnostics.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// First line of the response, without the line ending.
    #[must_use]
    pub fn status_line(&self) -> Option<String> {
        let text = self.text();
        let line = text.lines().next()?.trim_end().to_string();
        if line.is_empty() { None } else { Some(line) }
    }

    /// Numeric status code from the status line.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        let line = self.status_line()?;
        let mut parts = line.split_whitespace();
        let version = parts.next()?;
        if !version.starts_with("HTTP/") {
            return None;
        }
        parts.next()?.parse().ok()
    }

    /// Complete response switching protocols (status 101).
    #[must_use]
    pub fn is_upgrade(&self) -> bool {
        self.complete && self.status_code() == Some(101)
    }

    /// Parse the status line and headers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the response is incomplete or the
    /// status line is not HTTP.
    pub fn parse(&self) -> Result<HandshakeResponse> {
        if !self.complete {
            return Err(Error::InvalidHandshake(format!(
                "Incomplete response ({} bytes)",
                self.len()
            )));
        }
        let status = self.status_code().ok_or_else(|| {
            Error::InvalidHandshake(format!(
                "Malformed status line: {:?}",
                self.status_line().unwrap_or_default()
            ))
        })?;
        let text = self.text();
        let headers = parse_headers(text.lines().skip(1));
        Ok(HandshakeResponse { status, headers })
    }

    /// Check that this is a valid upgrade answering `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the status is not 101, the
    /// `Upgrade` header is not `websocket`, or `Sec-WebSocket-Accept` does not
    /// match `key`.
    pub fn verify_accept(&self, key: &str) -> Result<()> {
        let response = self.parse()?;
        if response.status != 101 {
            return Err(Error::InvalidHandshake(format!(
                "Expected 101 status, got {}",
                response.status
            )));
        }

        let upgrade = response
            .header("upgrade")
            .ok_or_else(|| Error::InvalidHandshake("Missing Upgrade header in response".into()))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {}",
                upgrade
            )));
        }

        let accept = response
            .header("sec-websocket-accept")
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Accept header".into()))?;
        let expected = compute_accept_key(key);
        if accept != expected {
            return Err(Error::InvalidHandshake(format!(
                "Sec-WebSocket-Accept mismatch: got {accept}, expected {expected}"
            )));
        }
        Ok(())
    }
}

/// Parsed status and headers of a handshake response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// HTTP status code.
    pub status: u16,
    headers: HashMap<String, String>,
}

impl HandshakeResponse {
    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}
