//! Error types for the harness.
//!
//! Every fault the harness can observe is one of these variants. Scenario code
//! converts them into failed [`ScenarioResult`](crate::scenario::ScenarioResult)s
//! at the component boundary; only [`Error::is_fatal`] errors stop a run.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a server under test.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// A bounded operation ran out of time.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        /// What was being waited on.
        operation: &'static str,
        /// How long the harness waited.
        elapsed: Duration,
    },

    /// Peer closed the connection before the expected data arrived.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Peer closed mid-frame.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Announced frame size.
        size: u64,
        /// Maximum allowed size.
        max: usize,
    },

    /// Handshake response was not what the harness expected.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake response grew past the configured limit.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes accumulated so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Delivering a signal to a process failed.
    #[error("Failed to signal pid {pid}: {reason}")]
    Signal {
        /// Target process id.
        pid: u32,
        /// OS error description.
        reason: String,
    },

    /// Spawning or controlling the server process failed.
    #[error("Process error: {0}")]
    Process(String),

    /// The server log file could not be opened.
    #[error("Cannot open log file {path}: {reason}")]
    LogFile {
        /// Path that was attempted.
        path: String,
        /// OS error description.
        reason: String,
    },

    /// Scenario name not recognised by the runner.
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),
}

impl Error {
    /// Whether this error must abort the remaining scenarios.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Error::LogFile { .. })
    }

    /// Whether this error came from the network rather than from the peer's
    /// protocol behaviour.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::Timeout { .. }
                | Error::ConnectionClosed
                | Error::IncompleteFrame { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
            _ => Error::Io(err.to_string()),
        }
    }
}
