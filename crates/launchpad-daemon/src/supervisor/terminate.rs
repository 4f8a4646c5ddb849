//! Process-group signalling and port-based cleanup.
//!
//! Spawned shells lead their own process group, so signalling the negated
//! pid reaches every descendant that did not start a new session.

use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

/// Interval between liveness checks while waiting for a group to empty.
const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Send `signal` to the process group led by `pid`.
#[cfg(unix)]
pub fn signal_group(pid: u32, signal: libc::c_int) -> std::io::Result<()> {
    let pgid = i32::try_from(pid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the process group we created for this child.
    #[allow(unsafe_code)]
    let ret = unsafe { libc::kill(-pgid, signal) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Whether any process is left in the group led by `pid`.
///
/// Only a missing group (`ESRCH`) counts as gone.
#[cfg(unix)]
pub fn group_alive(pid: u32) -> bool {
    match signal_group(pid, 0) {
        Ok(()) => true,
        Err(e) => e.raw_os_error() != Some(libc::ESRCH),
    }
}

/// Wait until the group led by `pid` is empty. Returns `false` on timeout.
#[cfg(unix)]
pub async fn wait_group_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if !group_alive(pid) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(GROUP_POLL_INTERVAL).await;
    }
}

/// Send `signal` to a single process.
#[cfg(unix)]
pub fn signal_pid(pid: u32, signal: libc::c_int) -> std::io::Result<()> {
    let pid = i32::try_from(pid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    #[allow(unsafe_code)]
    let ret = unsafe { libc::kill(pid, signal) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Pids of processes listening on TCP `port`, via `lsof`.
pub async fn listening_pids(port: u16) -> std::io::Result<Vec<u32>> {
    let output = Command::new("lsof")
        .arg("-t")
        .arg(format!("-iTCP:{port}"))
        .arg("-sTCP:LISTEN")
        .kill_on_drop(true)
        .output()
        .await?;

    // lsof exits non-zero when nothing matches.
    Ok(parse_pids(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse one pid per line, ignoring blanks and garbage.
pub fn parse_pids(stdout: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = stdout
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// Forcefully kill whatever listens on `port`.
///
/// Best effort: lookup and signal failures are logged, never returned. The
/// current process is never targeted.
pub async fn kill_port_listeners(port: u16) {
    let pids = match listening_pids(port).await {
        Ok(pids) => pids,
        Err(e) => {
            debug!(port, error = %e, "Port owner lookup unavailable");
            return;
        }
    };

    let own_pid = std::process::id();
    for pid in pids.into_iter().filter(|&pid| pid != own_pid) {
        kill_listener(port, pid);
    }
}

#[cfg(unix)]
fn kill_listener(port: u16, pid: u32) {
    match signal_pid(pid, libc::SIGKILL) {
        Ok(()) => info!(port, pid, "Killed process listening on port"),
        Err(e) => warn!(port, pid, error = %e, "Failed to kill process listening on port"),
    }
}

#[cfg(not(unix))]
fn kill_listener(port: u16, pid: u32) {
    warn!(port, pid, "Killing port listeners is not supported on this platform");
}
