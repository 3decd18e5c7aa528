//! Finding the pid that owns a listening port.

use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

/// How long an introspection tool may run.
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of one lookup strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The strategy found a pid.
    Resolved(u32),
    /// No answer: tool missing, failed, or nothing listening.
    Unresolved,
}

impl Resolution {
    /// The pid, if resolved.
    #[must_use]
    pub const fn pid(self) -> Option<u32> {
        match self {
            Resolution::Resolved(pid) => Some(pid),
            Resolution::Unresolved => None,
        }
    }
}

impl From<Option<u32>> for Resolution {
    fn from(pid: Option<u32>) -> Self {
        pid.map_or(Resolution::Unresolved, Resolution::Resolved)
    }
}

/// One strategy for mapping a port to a pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidResolver {
    /// `ss -ltnp`.
    SocketTable,
    /// `lsof -tiTCP:<port> -sTCP:LISTEN`.
    OpenFiles,
    /// The pid the harness spawned.
    Spawned(u32),
}

impl PidResolver {
    /// `ss`, then `lsof`, then the spawned pid if known.
    #[must_use]
    pub fn default_chain(spawned: Option<u32>) -> Vec<PidResolver> {
        let mut chain = vec![PidResolver::SocketTable, PidResolver::OpenFiles];
        chain.extend(spawned.map(PidResolver::Spawned));
        chain
    }

    /// Apply this strategy to `port`.
    pub async fn resolve(self, port: u16) -> Resolution {
        match self {
            PidResolver::SocketTable => run_tool("ss", &["-ltnp".to_string()])
                .await
                .and_then(|out| parse_ss_output(&out, port))
                .into(),
            PidResolver::OpenFiles => run_tool(
                "lsof",
                &[format!("-tiTCP:{port}"), "-sTCP:LISTEN".to_string()],
            )
            .await
            .and_then(|out| parse_lsof_output(&out))
            .into(),
            PidResolver::Spawned(pid) => Resolution::Resolved(pid),
        }
    }
}

/// Try each strategy in order and return the first pid found.
pub async fn resolve_listening_pid(chain: &[PidResolver], port: u16) -> Option<u32> {
    for resolver in chain {
        if let Resolution::Resolved(pid) = resolver.resolve(port).await {
            debug!(?resolver, pid, port, "resolved listening pid");
            return Some(pid);
        }
        debug!(?resolver, port, "resolver found nothing");
    }
    None
}

/// Extract `pid=N,` from the `ss -ltnp` line whose local address ends in
/// `:<port>`.
#[must_use]
pub fn parse_ss_output(output: &str, port: u16) -> Option<u32> {
    let suffix = format!(":{port}");
    output
        .lines()
        .filter(|line| line.split_whitespace().any(|field| field.ends_with(&suffix)))
        .find_map(|line| {
            let start = line.find("pid=")? + "pid=".len();
            let rest = &line[start..];
            let end = rest.find(',')?;
            rest[..end].parse().ok()
        })
}

/// First pid printed by `lsof -t`.
#[must_use]
pub fn parse_lsof_output(output: &str) -> Option<u32> {
    output.lines().find_map(|line| line.trim().parse().ok())
}

// Missing tools, failures and timeouts all read as "no answer".
async fn run_tool(program: &str, args: &[String]) -> Option<String> {
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output();
    match tokio::time::timeout(TOOL_TIMEOUT, output).await {
        Ok(Ok(output)) => Some(String::from_utf8_lossy(&output.stdout).into_owned()),
        Ok(Err(e)) => {
            debug!(program, error = %e, "tool unavailable");
            None
        }
        Err(_) => {
            debug!(program, "tool timed out");
            None
        }
    }
}
