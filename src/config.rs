//! Configuration and limits for harness runs.
//!
//! Defaults reproduce the reference scenario set: a server on
//! `127.0.0.1:8000` serving `/term` with 15 worker slots.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Fixed, test-only `Sec-WebSocket-Key` (the RFC 6455 sample nonce).
pub const DEFAULT_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

/// Address and resource of the server under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Host to connect to.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Resource path requested in the Upgrade request.
    pub path: String,
    /// Value sent in the `Host` header.
    pub host_header: String,
    /// `Sec-WebSocket-Key` sent with every handshake.
    pub key: String,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            path: "/term".to_string(),
            host_header: "localhost".to_string(),
            key: DEFAULT_KEY.to_string(),
        }
    }
}

impl Target {
    /// Create a target for `host:port` with the default path and key.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Target an already-resolved socket address.
    #[must_use]
    pub fn from_addr(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }

    /// Set the resource path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// `host:port` string suitable for `TcpStream::connect`.
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Timeouts applied to every blocking socket operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// TCP connect timeout.
    ///
    /// Default: 5 seconds
    pub connect: Duration,

    /// Total time allowed to collect the handshake response headers.
    ///
    /// Default: 2 seconds
    pub read: Duration,

    /// Time allowed to receive one frame after sending a command.
    ///
    /// Default: 2 seconds
    pub frame: Duration,

    /// Single-read window used by the short-read handshake scenario.
    ///
    /// Default: 800 milliseconds
    pub short_read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            read: Duration::from_secs(2),
            frame: Duration::from_secs(2),
            short_read: Duration::from_millis(800),
        }
    }
}

impl Timeouts {
    /// Create new timeouts with custom values.
    #[must_use]
    pub const fn new(
        connect: Duration,
        read: Duration,
        frame: Duration,
        short_read: Duration,
    ) -> Self {
        Self {
            connect,
            read,
            frame,
            short_read,
        }
    }
}

/// Size limits protecting the harness from a misbehaving server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Largest frame payload the decoder will allocate for.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Largest handshake response accumulated before giving up.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024, // 16 MB
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Validate an announced frame length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: u64) -> Result<usize> {
        if size > self.max_frame_size as u64 {
            Err(Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(size as usize)
        }
    }

    /// Validate the size of an accumulating handshake response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<()> {
        if size > self.max_handshake_size {
            Err(Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// Parameters of the concurrent stress scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressConfig {
    /// Number of simulated clients.
    ///
    /// Default: 16
    pub client_count: usize,
    /// Keepalive frames sent by each upgraded client.
    ///
    /// Default: 10
    pub keepalive_rounds: usize,
    /// Spacing between keepalive frames.
    ///
    /// Default: 500 milliseconds
    pub keepalive_interval: Duration,
    /// Delay between spawning consecutive clients.
    ///
    /// Default: 50 milliseconds
    pub stagger_interval: Duration,
    /// How long upgraded sockets stay open after all clients handshook.
    ///
    /// Default: 8 seconds
    pub observation_window: Duration,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            client_count: 16,
            keepalive_rounds: 10,
            keepalive_interval: Duration::from_millis(500),
            stagger_interval: Duration::from_millis(50),
            observation_window: Duration::from_secs(8),
        }
    }
}

impl StressConfig {
    /// Set the number of clients.
    #[must_use]
    pub const fn with_clients(mut self, count: usize) -> Self {
        self.client_count = count;
        self
    }

    /// Set keepalive rounds and spacing.
    #[must_use]
    pub const fn with_keepalive(mut self, rounds: usize, interval: Duration) -> Self {
        self.keepalive_rounds = rounds;
        self.keepalive_interval = interval;
        self
    }

    /// Set the spawn stagger.
    #[must_use]
    pub const fn with_stagger(mut self, interval: Duration) -> Self {
        self.stagger_interval = interval;
        self
    }

    /// Set the observation window.
    #[must_use]
    pub const fn with_observation_window(mut self, window: Duration) -> Self {
        self.observation_window = window;
        self
    }
}

/// Parameters of the worker-reclamation scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimConfig {
    /// Sessions opened sequentially to fill the server's worker slots.
    ///
    /// Default: 15
    pub saturating_count: usize,
    /// Wait between closing the sessions and the final probe.
    ///
    /// Default: 1 second
    pub grace_period: Duration,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            saturating_count: 15,
            grace_period: Duration::from_secs(1),
        }
    }
}

impl ReclaimConfig {
    /// Create a reclamation config.
    #[must_use]
    pub const fn new(saturating_count: usize, grace_period: Duration) -> Self {
        Self {
            saturating_count,
            grace_period,
        }
    }
}

/// Parameters of the graceful-shutdown scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownConfig {
    /// Server executable to launch.
    pub server_binary: PathBuf,
    /// Working directory of the launched server.
    pub working_dir: PathBuf,
    /// File receiving the server's stdout and stderr.
    pub log_path: PathBuf,
    /// Wait after spawning before resolving the listener.
    ///
    /// Default: 500 milliseconds
    pub startup_delay: Duration,
    /// Wait after starting the held-open client before signaling.
    ///
    /// Default: 500 milliseconds
    pub hold_delay: Duration,
    /// Wait after SIGTERM before inspecting the process table.
    ///
    /// Default: 1 second
    pub post_signal_delay: Duration,
    /// Bytes captured by each log snapshot.
    ///
    /// Default: 4096
    pub snapshot_bytes: usize,
    /// Extra process-table patterns reported (never enforced).
    ///
    /// Default: `["/bin/sh"]`
    pub also_report: Vec<String>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            server_binary: PathBuf::from("target/x86_64-unknown-linux-gnu/release/xterm-backend"),
            working_dir: PathBuf::from("."),
            log_path: PathBuf::from("./server.log"),
            startup_delay: Duration::from_millis(500),
            hold_delay: Duration::from_millis(500),
            post_signal_delay: Duration::from_secs(1),
            snapshot_bytes: 4096,
            also_report: vec!["/bin/sh".to_string()],
        }
    }
}

impl ShutdownConfig {
    /// Create a config launching `server_binary` from `working_dir`.
    ///
    /// The log file lands in `working_dir/server.log`.
    #[must_use]
    pub fn new(server_binary: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            server_binary: server_binary.into(),
            log_path: working_dir.join("server.log"),
            working_dir,
            ..Self::default()
        }
    }

    /// Set the log file path.
    #[must_use]
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    /// Set startup and post-signal delays.
    #[must_use]
    pub const fn with_delays(mut self, startup: Duration, post_signal: Duration) -> Self {
        self.startup_delay = startup;
        self.post_signal_delay = post_signal;
        self
    }

    /// File name used to recognise the server in the process table.
    #[must_use]
    pub fn binary_name(&self) -> String {
        self.server_binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.server_binary.to_string_lossy().into_owned())
    }
}

/// Complete harness configuration.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Server address and resource.
    pub target: Target,
    /// Socket timeouts.
    pub timeouts: Timeouts,
    /// Size limits.
    pub limits: Limits,
    /// Stress scenario parameters.
    pub stress: StressConfig,
    /// Reclamation scenario parameters.
    pub reclaim: ReclaimConfig,
    /// Shutdown scenario parameters.
    pub shutdown: ShutdownConfig,
    /// Require `Sec-WebSocket-Accept` to match the key.
    ///
    /// Default: true
    pub verify_accept: bool,
    /// Pause inserted between scenarios.
    ///
    /// Default: 150 milliseconds
    pub scenario_pause: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            target: Target::default(),
            timeouts: Timeouts::default(),
            limits: Limits::default(),
            stress: StressConfig::default(),
            reclaim: ReclaimConfig::default(),
            shutdown: ShutdownConfig::default(),
            verify_accept: true,
            scenario_pause: Duration::from_millis(150),
        }
    }
}

impl HarnessConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target.
    #[must_use]
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Set timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set stress parameters.
    #[must_use]
    pub fn with_stress(mut self, stress: StressConfig) -> Self {
        self.stress = stress;
        self
    }

    /// Set reclamation parameters.
    #[must_use]
    pub fn with_reclaim(mut self, reclaim: ReclaimConfig) -> Self {
        self.reclaim = reclaim;
        self
    }

    /// Set shutdown parameters.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownConfig) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Toggle strict `Sec-WebSocket-Accept` verification.
    #[must_use]
    pub const fn with_verify_accept(mut self, verify: bool) -> Self {
        self.verify_accept = verify;
        self
    }

    /// Set the inter-scenario pause.
    #[must_use]
    pub const fn with_scenario_pause(mut self, pause: Duration) -> Self {
        self.scenario_pause = pause;
        self
    }
}
