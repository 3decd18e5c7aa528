//! Named scenarios and their results.

mod basic;
mod runner;

pub use basic::{
    CommandEcho, PROBE_COMMAND, command_round_trip, handshake_raw, handshake_timeout, ws_client,
};
pub use runner::{RunReport, ScenarioRunner};

use std::str::FromStr;

use crate::error::Error;

/// Outcome of one scenario (or one stress client). Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioResult {
    name: String,
    success: bool,
    diagnostic: Option<String>,
}

impl ScenarioResult {
    /// Successful result.
    #[must_use]
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            diagnostic: None,
        }
    }

    /// Failed result with an explanation.
    #[must_use]
    pub fn fail(name: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// Result decided by `success`.
    #[must_use]
    pub fn from_check(name: impl Into<String>, success: bool, diagnostic: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success,
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// Attach or replace the diagnostic.
    #[must_use]
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    /// Scenario or client name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether it passed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.success
    }

    /// Free-form detail.
    #[must_use]
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }
}

impl std::fmt::Display for ScenarioResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verdict = if self.success { "OK" } else { "FAIL" };
        write!(f, "- {}: {}", self.name, verdict)?;
        if let Some(diagnostic) = &self.diagnostic {
            write!(f, " ({diagnostic})")?;
        }
        Ok(())
    }
}

/// The scenarios the runner knows about, in `all` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// Plain handshake, response printed and checked for 101.
    HandshakeRaw,
    /// Handshake followed by a single short read.
    HandshakeTimeout,
    /// Handshake, masked `ls\n`, one frame back.
    WsClient,
    /// Many concurrent clients with keepalives.
    Stress,
    /// Saturate worker slots, release, probe.
    Reclaim,
    /// Spawn the server, SIGTERM it, inspect the process table.
    Graceful,
}

impl Scenario {
    /// Every scenario, in execution order for `all`.
    pub const ALL: [Scenario; 6] = [
        Scenario::HandshakeRaw,
        Scenario::HandshakeTimeout,
        Scenario::WsClient,
        Scenario::Stress,
        Scenario::Reclaim,
        Scenario::Graceful,
    ];

    /// Command-line name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Scenario::HandshakeRaw => "handshake_raw",
            Scenario::HandshakeTimeout => "handshake_timeout",
            Scenario::WsClient => "ws_client",
            Scenario::Stress => "stress",
            Scenario::Reclaim => "reclaim",
            Scenario::Graceful => "graceful",
        }
    }
}

impl FromStr for Scenario {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.name() == s)
            .ok_or_else(|| Error::UnknownScenario(s.to_string()))
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
