//! Delivering signals by pid.

use crate::error::{Error, Result};

/// Signals the harness sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// `SIGTERM`: ask for a graceful exit.
    Term,
}

impl Signal {
    const fn as_raw(self) -> libc::c_int {
        match self {
            Signal::Term => libc::SIGTERM,
        }
    }
}

fn to_pid(pid: u32) -> Result<libc::pid_t> {
    match libc::pid_t::try_from(pid) {
        // 0 and negatives address process groups.
        Ok(raw) if raw > 0 => Ok(raw),
        _ => Err(Error::Signal {
            pid,
            reason: "not a single-process pid".to_string(),
        }),
    }
}

/// Send `signal` to `pid`.
///
/// # Errors
///
/// `Error::Signal` if the pid is invalid or the kernel rejects the signal.
pub fn send_signal(pid: u32, signal: Signal) -> Result<()> {
    let raw = to_pid(pid)?;
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    let rc = unsafe { libc::kill(raw, signal.as_raw()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(Error::Signal {
            pid,
            reason: std::io::Error::last_os_error().to_string(),
        })
    }
}

/// Whether a process with `pid` exists (zombies included).
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    let Ok(raw) = to_pid(pid) else {
        return false;
    };
    // SAFETY: signal 0 only performs the existence and permission check.
    let rc = unsafe { libc::kill(raw, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_group_pids() {
        assert!(matches!(send_signal(0, Signal::Term), Err(Error::Signal { pid: 0, .. })));
        assert!(matches!(
            send_signal(u32::MAX, Signal::Term),
            Err(Error::Signal { .. })
        ));
    }

    #[test]
    fn test_self_is_alive() {
        assert!(is_alive(std::process::id()));
        assert!(!is_alive(0));
    }

    #[test]
    fn test_signal_to_exited_child_fails() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        // Reaped: the pid no longer names a process (barring immediate reuse).
        assert!(send_signal(pid, Signal::Term).is_err());
    }
}
