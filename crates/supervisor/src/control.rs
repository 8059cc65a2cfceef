//! Signal delivery to the mission process.
//!
//! The mission process is launched as the leader of its own process
//! group so helpers it spawns (camera capture, GPS readers) receive the
//! same signal.

use crate::error::{Result, SupervisorError};

/// Request sent to a running mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionSignal {
    /// Graceful stop (SIGTERM). Ends with stop reason STOP.
    Stop,
    /// Abort (SIGUSR1). Ends with stop reason ABORT.
    Abort,
}

impl MissionSignal {
    pub fn as_raw(self) -> libc::c_int {
        match self {
            MissionSignal::Stop => libc::SIGTERM,
            MissionSignal::Abort => libc::SIGUSR1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MissionSignal::Stop => "stop",
            MissionSignal::Abort => "abort",
        }
    }
}

/// Signal the process group led by `pid`, falling back to the process
/// itself if no such group exists.
pub fn signal_group(pid: u32, signal: MissionSignal) -> Result<()> {
    let pid_t = libc::pid_t::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| SupervisorError::Signal {
            pid,
            source: std::io::Error::from_raw_os_error(libc::ESRCH),
        })?;
    let sig = signal.as_raw();

    // SAFETY: a negative pid addresses the process group; no memory is touched.
    if unsafe { libc::kill(-pid_t, sig) } == 0 {
        return Ok(());
    }
    let group_err = std::io::Error::last_os_error();
    if group_err.raw_os_error() != Some(libc::ESRCH) {
        return Err(SupervisorError::Signal {
            pid,
            source: group_err,
        });
    }

    // SAFETY: as above, for the single process.
    if unsafe { libc::kill(pid_t, sig) } == 0 {
        return Ok(());
    }
    Err(SupervisorError::Signal {
        pid,
        source: std::io::Error::last_os_error(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::{CommandExt, ExitStatusExt};
    use std::process::Command;

    #[test]
    fn test_signal_mapping() {
        assert_eq!(MissionSignal::Stop.as_raw(), libc::SIGTERM);
        assert_eq!(MissionSignal::Abort.as_raw(), libc::SIGUSR1);
    }

    #[test]
    fn test_stop_terminates_group_leader() {
        let mut child = Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();

        signal_group(child.id(), MissionSignal::Stop).unwrap();
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }

    #[test]
    fn test_falls_back_to_plain_pid_without_group() {
        // Shares the test runner's group, so -pid has no matching group.
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();

        signal_group(child.id(), MissionSignal::Abort).unwrap();
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGUSR1));
    }

    #[test]
    fn test_invalid_pid_is_signal_error() {
        let err = signal_group(0, MissionSignal::Stop).unwrap_err();
        assert!(matches!(err, SupervisorError::Signal { pid: 0, .. }));
    }
}
