use std::os::fd::RawFd;
use std::time::Duration;

use tracing::debug;

use crate::sys::setsockopt_int;

/// TCP keepalive tuning for an accepted connection.
///
/// Keepalive is a best-effort detector for peers that vanished without closing
/// the connection (for example a dropped WiFi link). A zero-byte read remains
/// the authoritative disconnect signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Idle time before the first probe is sent.
    pub idle: Duration,
    /// Time between unanswered probes.
    pub interval: Duration,
    /// Number of unanswered probes before the kernel drops the connection.
    pub retries: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(1),
            interval: Duration::from_secs(1),
            retries: 5,
        }
    }
}

impl KeepaliveConfig {
    /// Total time a silent peer survives before the transport reports it dead.
    pub fn detection_window(&self) -> Duration {
        self.idle + self.interval * self.retries
    }

    pub(crate) fn apply(&self, fd: RawFd) -> std::io::Result<()> {
        setsockopt_int(fd, libc::SOL_SOCKET, libc::SO_KEEPALIVE, 1)?;

        let idle = whole_seconds(self.idle);
        let interval = whole_seconds(self.interval);
        let retries = libc::c_int::try_from(self.retries.max(1)).unwrap_or(libc::c_int::MAX);

        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            setsockopt_int(fd, libc::IPPROTO_TCP, libc::TCP_KEEPIDLE, idle)?;
            setsockopt_int(fd, libc::IPPROTO_TCP, libc::TCP_KEEPINTVL, interval)?;
            setsockopt_int(fd, libc::IPPROTO_TCP, libc::TCP_KEEPCNT, retries)?;
        }

        #[cfg(any(target_os = "macos", target_os = "ios"))]
        {
            // TCP_KEEPALIVE is the Darwin spelling of TCP_KEEPIDLE.
            setsockopt_int(fd, libc::IPPROTO_TCP, libc::TCP_KEEPALIVE, idle)?;
            setsockopt_int(fd, libc::IPPROTO_TCP, libc::TCP_KEEPINTVL, interval)?;
            setsockopt_int(fd, libc::IPPROTO_TCP, libc::TCP_KEEPCNT, retries)?;
        }

        #[cfg(not(any(
            target_os = "linux",
            target_os = "android",
            target_os = "macos",
            target_os = "ios"
        )))]
        {
            let _ = (idle, interval, retries);
            debug!("keepalive timing not tunable on this platform; using system defaults");
        }

        debug!(
            idle_secs = idle,
            interval_secs = interval,
            retries = retries,
            "keepalive armed"
        );
        Ok(())
    }
}

fn whole_seconds(duration: Duration) -> libc::c_int {
    libc::c_int::try_from(duration.as_secs().max(1)).unwrap_or(libc::c_int::MAX)
}
