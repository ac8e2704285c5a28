//! Signal delivery to the agent process.

/// Signals the client can send to a live agent process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSignal {
    /// SIGINT
    Int,
    /// SIGTERM, the cooperative request
    Term,
    /// SIGKILL, the escalation
    Kill,
}

impl KillSignal {
    #[cfg(unix)]
    fn as_libc_signal(self) -> libc::c_int {
        match self {
            Self::Int => libc::SIGINT,
            Self::Term => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Int => "SIGINT",
            Self::Term => "SIGTERM",
            Self::Kill => "SIGKILL",
        }
    }
}

/// Send `signal` to `pid`. Returns false if the process no longer exists.
#[cfg(unix)]
pub fn send_signal(pid: u32, signal: KillSignal) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }

    // SAFETY: plain kill(2) on a pid we spawned; no memory is shared.
    let ret = unsafe { libc::kill(pid, signal.as_libc_signal()) };
    if ret == -1 {
        log::debug!(
            "{} to pid {} failed: {}",
            signal.name(),
            pid,
            std::io::Error::last_os_error()
        );
        return false;
    }
    true
}

#[cfg(not(unix))]
pub fn send_signal(_pid: u32, _signal: KillSignal) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_signal_names() {
        assert_eq!(KillSignal::Term.name(), "SIGTERM");
        assert_eq!(KillSignal::Kill.name(), "SIGKILL");
        assert_eq!(KillSignal::Int.name(), "SIGINT");
    }

    #[test]
    fn test_send_signal_rejects_invalid_pid() {
        assert!(!send_signal(0, KillSignal::Term));
        assert!(!send_signal(u32::MAX, KillSignal::Term));
    }

    #[test]
    fn test_send_signal_terminates_child() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        assert!(send_signal(child.id(), KillSignal::Kill));
        let status = child.wait().unwrap();
        assert!(!status.success());
    }
}
