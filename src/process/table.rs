//! Process table snapshots via `ps`.

use std::path::Path;

use tokio::process::Command;

use crate::error::{Error, Result};

// Linux keeps at most 15 bytes of the executable name in `comm`.
const COMM_LEN: usize = 15;

/// One row of `ps -eo pid=,stat=,comm=,args=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    /// Process id.
    pub pid: u32,
    /// State code, e.g. `S`, `R`, `Z+`.
    pub stat: String,
    /// Executable name as the kernel records it (possibly truncated).
    pub name: String,
    /// Full command line.
    pub command: String,
}

impl ProcessEntry {
    /// Exited but not yet reaped.
    #[must_use]
    pub fn is_zombie(&self) -> bool {
        self.stat.starts_with('Z')
    }

    /// Whether this process is an instance of the executable `binary`.
    ///
    /// Compares the kernel's process name and the basename of `argv[0]`;
    /// mentions of `binary` further along the command line do not count.
    #[must_use]
    pub fn runs(&self, binary: &str) -> bool {
        if binary.is_empty() {
            return false;
        }
        let truncated = binary
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take_while(|&end| end <= COMM_LEN)
            .last()
            .map_or("", |end| &binary[..end]);
        if self.name == binary || (binary.len() > COMM_LEN && self.name == truncated) {
            return true;
        }
        self.command
            .split_whitespace()
            .next()
            .and_then(|argv0| Path::new(argv0).file_name())
            .is_some_and(|base| base == binary)
    }
}

impl std::fmt::Display for ProcessEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.pid, self.stat, self.command)
    }
}

/// Parse `ps -eo pid=,stat=,comm=,args=` output. Malformed lines are skipped.
///
/// A process name containing spaces shifts its remainder into `command`.
#[must_use]
pub fn parse_ps_output(output: &str) -> Vec<ProcessEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid = fields.next()?.parse().ok()?;
            let stat = fields.next()?.to_string();
            let name = fields.next()?.to_string();
            let command = fields.collect::<Vec<_>>().join(" ");
            Some(ProcessEntry {
                pid,
                stat,
                name,
                command,
            })
        })
        .collect()
}

/// Snapshot every process on the host.
///
/// # Errors
///
/// `Error::Process` if `ps` cannot be run or exits unsuccessfully.
pub async fn list_processes() -> Result<Vec<ProcessEntry>> {
    let output = Command::new("ps")
        .args(["-eo", "pid=,stat=,comm=,args="])
        .output()
        .await
        .map_err(|e| Error::Process(format!("ps: {e}")))?;
    if !output.status.success() {
        return Err(Error::Process(format!("ps exited with {}", output.status)));
    }
    Ok(parse_ps_output(&String::from_utf8_lossy(&output.stdout)))
}

/// Entries whose command line contains `pattern`, excluding `exclude_pid`.
pub fn matching<'a>(
    entries: &'a [ProcessEntry],
    pattern: &'a str,
    exclude_pid: u32,
) -> impl Iterator<Item = &'a ProcessEntry> + 'a {
    entries
        .iter()
        .filter(move |e| e.pid != exclude_pid && e.command.contains(pattern))
}

/// Entries running the executable `binary`, excluding `exclude_pid`.
pub fn instances_of<'a>(
    entries: &'a [ProcessEntry],
    binary: &'a str,
    exclude_pid: u32,
) -> impl Iterator<Item = &'a ProcessEntry> + 'a {
    entries
        .iter()
        .filter(move |e| e.pid != exclude_pid && e.runs(binary))
}
