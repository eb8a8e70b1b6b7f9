use std::io;

use bdw_core::Watchdog;

/// Treats the host as alive while its process exists.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HostProcessWatchdog {
    pid: i32,
}

impl HostProcessWatchdog {
    pub(crate) fn new(pid: i32) -> Self {
        Self { pid }
    }
}

impl Watchdog for HostProcessWatchdog {
    fn is_alive(&self) -> bool {
        if self.pid <= 0 {
            return false;
        }
        // Signal 0 only checks existence; EPERM means the process exists under another user.
        let rc = unsafe { libc::kill(self.pid, 0) };
        rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
}
