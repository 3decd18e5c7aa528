//! wsprobe: run integration scenarios against a WebSocket terminal server.
//!
//! ```bash
//! wsprobe                      # every scenario
//! wsprobe handshake_raw stress --clients 32
//! wsprobe graceful --server-bin ./target/release/xterm-backend
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser};
use wsprobe::{HarnessConfig, ScenarioRunner, ShutdownConfig, Target};

#[derive(Parser, Debug)]
#[command(
    name = "wsprobe",
    version,
    about = "Integration-test harness for WebSocket terminal servers",
    long_about = "Runs handshake, framing, stress, worker-reclamation and graceful-shutdown\n\
        scenarios against a WebSocket terminal server and prints a summary.\n\n\
        Scenarios: handshake_raw, handshake_timeout, ws_client, stress, reclaim,\n\
        graceful, all (default)."
)]
struct Cli {
    /// Scenarios to run, in order
    scenarios: Vec<String>,

    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// WebSocket resource path
    #[arg(long, default_value = "/term")]
    path: String,

    /// TCP connect timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    connect_timeout_ms: u64,

    /// Handshake and frame read timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    read_timeout_ms: u64,

    /// Concurrent clients in the stress scenario
    #[arg(long, default_value_t = 16)]
    clients: usize,

    /// Sessions opened to saturate the server in the reclaim scenario
    #[arg(long, default_value_t = 15)]
    saturate: usize,

    /// Wait before the reclaim probe, in milliseconds
    #[arg(long, default_value_t = 1000)]
    grace_ms: u64,

    /// Server binary launched by the graceful scenario
    #[arg(long)]
    server_bin: Option<PathBuf>,

    /// Working directory for the launched server
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// Log file for the launched server (default: <workdir>/server.log)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Accept any 101 response without checking Sec-WebSocket-Accept
    #[arg(long, action = ArgAction::SetTrue)]
    loose_accept: bool,
}

impl Cli {
    fn into_config(self) -> (HarnessConfig, Vec<String>) {
        let defaults = HarnessConfig::default();

        let target = Target::new(self.host, self.port).with_path(self.path);

        let mut timeouts = defaults.timeouts.clone();
        timeouts.connect = Duration::from_millis(self.connect_timeout_ms);
        timeouts.read = Duration::from_millis(self.read_timeout_ms);
        timeouts.frame = Duration::from_millis(self.read_timeout_ms);

        let stress = defaults.stress.clone().with_clients(self.clients);

        let mut reclaim = defaults.reclaim.clone();
        reclaim.saturating_count = self.saturate;
        reclaim.grace_period = Duration::from_millis(self.grace_ms);

        let server_bin = self
            .server_bin
            .unwrap_or_else(|| defaults.shutdown.server_binary.clone());
        let mut shutdown = ShutdownConfig::new(server_bin, self.workdir);
        if let Some(log_file) = self.log_file {
            shutdown = shutdown.with_log_path(log_file);
        }

        let config = defaults
            .with_target(target)
            .with_timeouts(timeouts)
            .with_stress(stress)
            .with_reclaim(reclaim)
            .with_shutdown(shutdown)
            .with_verify_accept(!self.loose_accept);
        (config, self.scenarios)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wsprobe=info".into()),
        )
        .init();

    let (config, scenarios) = Cli::parse().into_config();
    tracing::info!(
        target = %config.target.authority(),
        path = %config.target.path,
        strict_accept = config.verify_accept,
        "starting run"
    );

    let report = ScenarioRunner::new(config).run_named(&scenarios).await;
    print!("\n{}", report.summary());
    ExitCode::from(report.exit_code())
}
