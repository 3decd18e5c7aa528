//! Graceful-shutdown orchestration.
//!
//! Launches the server binary, holds one live session open, sends `SIGTERM`
//! and checks the process table afterwards. The spawned child is always
//! cleaned up, including on early returns and panics.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::HandshakeClient;
use crate::config::ShutdownConfig;
use crate::error::{Error, Result};
use crate::process::{
    PidResolver, ProcessEntry, Signal, create_log_file, instances_of, is_alive, list_processes,
    matching, read_head, read_tail, resolve_listening_pid, send_signal,
};
use crate::scenario::{PROBE_COMMAND, Scenario, ScenarioResult, command_round_trip};

/// A launched server. Killed on drop if still running.
#[derive(Debug)]
pub struct ServerProcess {
    child: Option<Child>,
    pid: Option<u32>,
    log_path: PathBuf,
    started_at: Instant,
}

impl ServerProcess {
    /// Launch `config.server_binary` in `config.working_dir` with stdout and
    /// stderr sent to `config.log_path`.
    ///
    /// # Errors
    ///
    /// - `Error::LogFile` if the log cannot be created (fatal for the run)
    /// - `Error::Process` if the binary cannot be started
    pub fn spawn(config: &ShutdownConfig) -> Result<Self> {
        let stdout = create_log_file(&config.log_path)?;
        let stderr = stdout.try_clone().map_err(|e| Error::LogFile {
            path: config.log_path.display().to_string(),
            reason: e.to_string(),
        })?;

        let binary = resolve_binary(config);
        let child = Command::new(&binary)
            .current_dir(&config.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Process(format!("cannot start {}: {e}", binary.display())))?;

        let pid = child.id();
        info!(pid, binary = %binary.display(), "server started");
        Ok(Self {
            child: Some(child),
            pid,
            log_path: config.log_path.clone(),
            started_at: Instant::now(),
        })
    }

    /// Pid of the spawned process.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// File receiving the server's output.
    #[must_use]
    pub fn log_path(&self) -> &PathBuf {
        &self.log_path
    }

    /// When the process was launched.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Collect the exit status if the process has exited, so it does not
    /// linger as a zombie.
    pub fn try_reap(&mut self) -> Option<String> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                self.child = None;
                Some(status.to_string())
            }
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "try_wait failed");
                None
            }
        }
    }

    /// Kill the spawned process directly.
    ///
    /// # Errors
    ///
    /// `Error::Process` if the kill could not be issued.
    pub fn start_kill(&mut self) -> Result<()> {
        match self.child.as_mut() {
            Some(child) => child
                .start_kill()
                .map_err(|e| Error::Process(format!("kill failed: {e}"))),
            None => Ok(()),
        }
    }

    /// Kill the process if it is still running and wait for it.
    pub async fn cleanup(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        if let Err(e) = child.start_kill() {
            debug!(error = %e, "kill during cleanup failed");
        }
        match tokio::time::timeout(std::time::Duration::from_secs(2), child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "server reaped during cleanup"),
            Ok(Err(e)) => warn!(error = %e, "waiting for server failed"),
            Err(_) => warn!(pid = ?self.pid, "server did not exit after kill"),
        }
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

fn resolve_binary(config: &ShutdownConfig) -> PathBuf {
    if config.server_binary.is_absolute() {
        config.server_binary.clone()
    } else {
        config.working_dir.join(&config.server_binary)
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Everything the shutdown scenario observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Pid that received `SIGTERM`.
    pub listening_pid: Option<u32>,
    /// Whether `SIGTERM` was delivered (as opposed to the direct kill fallback).
    pub signaled: bool,
    /// Exit status of the spawned process, if it exited in time.
    pub exit_status: Option<String>,
    /// Whether the signaled pid still existed when the table was read.
    pub listener_alive: bool,
    /// Start of the server log before the signal.
    pub log_head: String,
    /// End of the server log after the signal.
    pub log_tail: String,
    /// Processes still matching the server binary name.
    pub leftovers: Vec<ProcessEntry>,
    /// Processes matching the report-only patterns.
    pub also_reported: Vec<ProcessEntry>,
}

impl ShutdownReport {
    /// Success iff nothing matching the binary name is left.
    #[must_use]
    pub fn into_result(self, binary_name: &str) -> ScenarioResult {
        let mut diagnostic = if self.leftovers.is_empty() {
            format!("no {binary_name} processes left")
        } else {
            let pids: Vec<String> = self.leftovers.iter().map(|e| e.pid.to_string()).collect();
            format!("{binary_name} still running: pid {}", pids.join(", "))
        };
        if let Some(status) = &self.exit_status {
            diagnostic.push_str(&format!("; server {status}"));
        }
        if let Some(pid) = self.listening_pid.filter(|_| self.listener_alive) {
            if !self.leftovers.iter().any(|e| e.pid == pid) {
                diagnostic.push_str(&format!("; pid {pid} still alive"));
            }
        }
        if !self.signaled {
            diagnostic.push_str("; SIGTERM not delivered, killed directly");
        }
        if !self.also_reported.is_empty() {
            diagnostic.push_str(&format!("; {} other matches", self.also_reported.len()));
        }
        ScenarioResult::from_check(
            Scenario::Graceful.name(),
            self.leftovers.is_empty(),
            diagnostic,
        )
    }
}

/// Runs the graceful-shutdown scenario.
#[derive(Debug)]
pub struct ShutdownOrchestrator {
    client: HandshakeClient,
    config: ShutdownConfig,
    verify_accept: bool,
    resolvers: Vec<PidResolver>,
}

impl ShutdownOrchestrator {
    /// Create an orchestrator. The server port is the client's target port.
    #[must_use]
    pub fn new(client: HandshakeClient, config: ShutdownConfig) -> Self {
        Self {
            client,
            config,
            verify_accept: true,
            resolvers: PidResolver::default_chain(None),
        }
    }

    /// Toggle strict accept-key checking for the held session.
    #[must_use]
    pub fn with_verify_accept(mut self, verify: bool) -> Self {
        self.verify_accept = verify;
        self
    }

    /// Replace the lookup strategies tried before the spawned-pid fallback.
    #[must_use]
    pub fn with_resolvers(mut self, resolvers: Vec<PidResolver>) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// Run the scenario and reduce it to a verdict.
    ///
    /// # Errors
    ///
    /// See [`observe`](Self::observe).
    pub async fn run(&self) -> Result<ScenarioResult> {
        let report = self.observe().await?;
        Ok(report.into_result(&self.config.binary_name()))
    }

    /// Run the scenario and return the raw observations.
    ///
    /// # Errors
    ///
    /// - `Error::LogFile` if the log cannot be created
    /// - `Error::Process` if the server cannot be started or `ps` fails
    pub async fn observe(&self) -> Result<ShutdownReport> {
        let mut server = ServerProcess::spawn(&self.config)?;
        let report = self.drive(&mut server).await;
        server.cleanup().await;
        report
    }

    async fn drive(&self, server: &mut ServerProcess) -> Result<ShutdownReport> {
        tokio::time::sleep(self.config.startup_delay).await;

        let port = self.client.target().port;
        let mut chain = self.resolvers.clone();
        chain.extend(server.pid().map(PidResolver::Spawned));
        let listening_pid = resolve_listening_pid(&chain, port).await;
        match listening_pid {
            Some(pid) if Some(pid) == server.pid() => info!(pid, "using spawned pid"),
            Some(pid) => info!(pid, "server pid (listening)"),
            None => warn!(port, "no server pid found"),
        }

        let held = AbortOnDrop(tokio::spawn(hold_session(
            self.client.clone(),
            self.verify_accept,
        )));
        tokio::time::sleep(self.config.hold_delay).await;

        let log_head = snapshot(read_head(server.log_path(), self.config.snapshot_bytes).await);
        debug!("--- server log (head) ---\n{log_head}");

        let signaled = match listening_pid {
            Some(pid) => match send_signal(pid, Signal::Term) {
                Ok(()) => {
                    info!(pid, "sent SIGTERM");
                    true
                }
                Err(e) => {
                    warn!(error = %e, "SIGTERM failed, killing spawned process");
                    false
                }
            },
            None => false,
        };
        if !signaled {
            if let Err(e) = server.start_kill() {
                warn!(error = %e, "direct kill failed");
            }
        }

        tokio::time::sleep(self.config.post_signal_delay).await;

        let mut exit_status = server.try_reap();

        let log_tail = snapshot(read_tail(server.log_path(), self.config.snapshot_bytes).await);
        debug!("--- server log (tail) ---\n{log_tail}");

        let entries = list_processes().await?;
        // The child may have exited between the first reap and the listing.
        if exit_status.is_none() {
            exit_status = server.try_reap();
        }
        let uptime_ms =
            u64::try_from(server.started_at().elapsed().as_millis()).unwrap_or(u64::MAX);
        match &exit_status {
            Some(status) => info!(%status, uptime_ms, "server exited"),
            None => warn!(uptime_ms, "server still running after signal"),
        }
        let listener_alive = listening_pid.is_some_and(is_alive);

        let own_pid = std::process::id();
        let spawned = server.pid();
        let binary_name = self.config.binary_name();
        let leftovers: Vec<ProcessEntry> = instances_of(&entries, &binary_name, own_pid)
            .filter(|e| !(e.is_zombie() && Some(e.pid) == spawned))
            .cloned()
            .collect();
        let mut also_reported = Vec::new();
        for pattern in &self.config.also_report {
            also_reported.extend(matching(&entries, pattern, own_pid).cloned());
        }
        for entry in leftovers.iter().chain(&also_reported) {
            info!("after SIGTERM: {entry}");
        }

        drop(held);
        Ok(ShutdownReport {
            listening_pid,
            signaled,
            exit_status,
            listener_alive,
            log_head,
            log_tail,
            leftovers,
            also_reported,
        })
    }
}

fn snapshot(read: Result<String>) -> String {
    read.unwrap_or_else(|e| {
        warn!(error = %e, "log snapshot failed");
        String::new()
    })
}

async fn hold_session(client: HandshakeClient, verify_accept: bool) {
    match command_round_trip(&client, 0, PROBE_COMMAND, verify_accept).await {
        Ok(echo) => info!(
            opcode = %echo.frame.opcode,
            len = echo.frame.payload().len(),
            "held session received frame"
        ),
        Err(e) => warn!(error = %e, "held session failed"),
    }
}
