//! OS process liveness and identity checks.
//!
//! [`ProcessProbe`] is the seam tests use to substitute a fake process
//! table. [`OsProcessProbe`] is the real implementation backed by
//! `kill(pid, 0)`, `/proc/<pid>/stat` and `/proc/<pid>/cmdline`.

use std::fs;

/// What the process table says about a PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Absent,
    /// Exited but not yet reaped by its parent
    Zombie,
    Alive,
}

pub trait ProcessProbe: Send + Sync {
    /// Never fails: a process that cannot be found is `Absent`.
    fn probe(&self, pid: u32) -> Liveness;

    /// True only if the process's argv names the mission process.
    fn identity_matches(&self, pid: u32) -> bool;

    /// Best-effort reap of a terminated child of this process.
    fn reap(&self, _pid: u32) {}

    /// A PID is our running mission iff it is alive and identity matches.
    fn is_our_mission(&self, pid: u32) -> bool {
        self.probe(pid) == Liveness::Alive && self.identity_matches(pid)
    }
}

/// Probe backed by the host OS.
#[derive(Debug, Clone)]
pub struct OsProcessProbe {
    signature: String,
}

impl OsProcessProbe {
    /// `signature` must appear in the argv of a mission process.
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
        }
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }
}

impl ProcessProbe for OsProcessProbe {
    fn probe(&self, pid: u32) -> Liveness {
        let Some(pid_t) = to_pid_t(pid) else {
            return Liveness::Absent;
        };

        // SAFETY: signal 0 performs only the existence/permission check.
        let rc = unsafe { libc::kill(pid_t, 0) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            // EPERM: exists but owned by someone else
            if err.raw_os_error() != Some(libc::EPERM) {
                return Liveness::Absent;
            }
        }

        match proc_state(pid) {
            Some('Z') | Some('X') => Liveness::Zombie,
            _ => Liveness::Alive,
        }
    }

    fn identity_matches(&self, pid: u32) -> bool {
        match fs::read(format!("/proc/{pid}/cmdline")) {
            Ok(bytes) => cmdline_contains(&bytes, &self.signature),
            Err(_) => false,
        }
    }

    fn reap(&self, pid: u32) {
        let Some(pid_t) = to_pid_t(pid) else {
            return;
        };
        let mut status: libc::c_int = 0;
        loop {
            // SAFETY: valid pid and status pointer; WNOHANG never blocks.
            let rc = unsafe { libc::waitpid(pid_t, &mut status, libc::WNOHANG) };
            if rc == -1
                && std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted
            {
                continue;
            }
            break;
        }
    }
}

/// PIDs <= 0 address process groups, never a single process.
fn to_pid_t(pid: u32) -> Option<libc::pid_t> {
    libc::pid_t::try_from(pid).ok().filter(|p| *p > 0)
}

/// Scheduler state letter from `/proc/<pid>/stat`.
fn proc_state(pid: u32) -> Option<char> {
    let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_stat_state(&stat)
}

/// The command name is parenthesised and may itself contain spaces or
/// parens, so the state is read after the last `)`.
fn parse_stat_state(stat: &str) -> Option<char> {
    let end = stat.rfind(')')?;
    stat.get(end + 1..)?.split_whitespace().next()?.chars().next()
}

fn cmdline_contains(raw: &[u8], signature: &str) -> bool {
    let joined = raw
        .split(|b| *b == 0)
        .filter(|arg| !arg.is_empty())
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ");
    !signature.is_empty() && joined.contains(signature)
}
