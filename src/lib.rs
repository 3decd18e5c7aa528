//! # wsprobe - integration-test harness for WebSocket terminal servers
//!
//! `wsprobe` drives a WebSocket terminal-proxy server from the outside, the way
//! a misbehaving crowd of browsers would, and reports pass/fail per scenario.
//!
//! ## Scenarios
//!
//! - **handshake_raw** / **handshake_timeout**: the HTTP Upgrade exchange,
//!   read fully or with a single short read
//! - **ws_client**: a masked `ls\n` text frame and the first frame back
//! - **stress**: many concurrent clients with keepalive frames
//! - **reclaim**: saturate the worker slots, release them, probe again
//! - **graceful**: launch the server, `SIGTERM` it mid-session, check that
//!   nothing is left running
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wsprobe::{HarnessConfig, ScenarioRunner};
//!
//! let runner = ScenarioRunner::new(HarnessConfig::default());
//! let report = runner.run_named(&["handshake_raw", "ws_client"]).await;
//! print!("{}", report.summary());
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod process;
pub mod protocol;
pub mod reclaim;
pub mod scenario;
pub mod shutdown;
pub mod stress;

pub use client::{ClientSession, HandshakeClient, SessionOutcome};
pub use config::{
    HarnessConfig, Limits, ReclaimConfig, ShutdownConfig, StressConfig, Target, Timeouts,
};
pub use error::{Error, Result};
pub use protocol::{Frame, OpCode, RawHttpResponse, WS_GUID, compute_accept_key};
pub use reclaim::{ReclaimReport, ReclamationProbe};
pub use scenario::{RunReport, Scenario, ScenarioResult, ScenarioRunner};
pub use shutdown::{ShutdownOrchestrator, ShutdownReport};
pub use stress::{SocketRegistry, StressDriver, StressReport};
