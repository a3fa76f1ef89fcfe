// SPDX-License-Identifier: GPL-3.0-only
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::time::Duration;

/// A hidraw node appearing or disappearing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HidrawChange {
    Added(PathBuf),
    Removed(PathBuf),
}

/// Monitors udev for hidraw hotplug events
///
/// udev's MonitorSocket is not Send, so this is created and used on the
/// session's watch thread. It uses libc::poll() with a timeout so the thread
/// can notice a stop request between events.
pub struct UdevMonitor {
    socket: udev::MonitorSocket,
}

impl UdevMonitor {
    /// Create a new udev monitor for hidraw events
    pub fn new() -> Result<Self, std::io::Error> {
        let socket = udev::MonitorBuilder::new()?
            .match_subsystem("hidraw")?
            .listen()?;

        Ok(Self { socket })
    }

    /// Wait up to `timeout` for the next hidraw add/remove
    ///
    /// Returns `Ok(None)` on timeout, on signals and for events that are
    /// neither an add nor a remove.
    pub fn next_change(&self, timeout: Duration) -> Result<Option<HidrawChange>, std::io::Error> {
        let mut poll_fd = libc::pollfd {
            fd: self.socket.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };

        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        let poll_result = unsafe { libc::poll(&mut poll_fd, 1, timeout_ms) };

        if poll_result < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(None);
            }
            error!("Poll error: {}", err);
            return Err(err);
        }

        if poll_result == 0 {
            return Ok(None);
        }

        let Some(event) = self.socket.iter().next() else {
            debug!("Poll indicated ready but no event available");
            return Ok(None);
        };

        debug!(
            "udev event: type={:?}, devnode={:?}, syspath={:?}",
            event.event_type(),
            event.devnode(),
            event.syspath()
        );

        let Some(devnode) = event.devnode().map(|p| p.to_path_buf()) else {
            return Ok(None);
        };

        Ok(match event.event_type() {
            udev::EventType::Add => Some(HidrawChange::Added(devnode)),
            udev::EventType::Remove => Some(HidrawChange::Removed(devnode)),
            _ => None,
        })
    }
}
