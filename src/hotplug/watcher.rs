// SPDX-License-Identifier: GPL-3.0-only
use std::time::Duration;

use hidapi::HidApi;

use super::udev_monitor::{HidrawChange, UdevMonitor};
use crate::error::{AppError, Result};
use crate::keyboard::DeviceIdentity;
use crate::protocols::BacklightDevice;
use crate::protocols::qmk_raw_hid::HidKeyboard;

/// Attach or detach of the watched keyboard
#[derive(Debug)]
pub enum HotplugEvent {
    /// A matching keyboard was opened
    Attached(Box<dyn BacklightDevice>),
    /// The device node at this path went away
    Detached(String),
}

/// Source of hotplug events for one identity
///
/// Created on, and only used from, the session's watch thread.
pub trait DeviceWatcher {
    /// Matching devices already present when watching starts
    fn initial_scan(&mut self) -> Vec<HotplugEvent>;

    /// Wait up to `timeout` for the next event
    fn next_event(&mut self, timeout: Duration) -> Result<Option<HotplugEvent>>;
}

/// Creates watchers inside the session thread
pub trait WatcherFactory: Send + Sync {
    fn create(&self, identity: &DeviceIdentity) -> Result<Box<dyn DeviceWatcher>>;
}

/// udev + hidapi watcher used outside of tests
pub struct UdevHidWatcherFactory;

impl WatcherFactory for UdevHidWatcherFactory {
    fn create(&self, identity: &DeviceIdentity) -> Result<Box<dyn DeviceWatcher>> {
        Ok(Box::new(UdevHidWatcher::new(*identity)?))
    }
}

struct UdevHidWatcher {
    identity: DeviceIdentity,
    monitor: UdevMonitor,
    api: HidApi,
}

impl UdevHidWatcher {
    fn new(identity: DeviceIdentity) -> Result<Self> {
        let monitor = UdevMonitor::new()?;
        let api = HidApi::new().map_err(|e| AppError::Hid {
            path: "hidapi".into(),
            reason: e.to_string(),
        })?;

        info!("Keyboard hotplug monitoring started for {}", identity);

        Ok(Self {
            identity,
            monitor,
            api,
        })
    }

    /// Open the matching interface behind a freshly added hidraw node
    fn open_added(&mut self, devnode: &str) -> Option<HotplugEvent> {
        if let Err(e) = self.api.refresh_devices() {
            warn!("Failed to refresh HID device list: {}", e);
            return None;
        }

        let info = HidKeyboard::matching(&self.api, &self.identity)
            .find(|info| info.path().to_str() == Ok(devnode))?;

        match HidKeyboard::open(&self.api, info) {
            Ok(keyboard) => Some(HotplugEvent::Attached(Box::new(keyboard))),
            Err(e) => {
                warn!("Failed to open keyboard {}: {}", self.identity, e);
                None
            }
        }
    }
}

impl DeviceWatcher for UdevHidWatcher {
    fn initial_scan(&mut self) -> Vec<HotplugEvent> {
        HidKeyboard::open_first(&self.api, &self.identity)
            .map(|keyboard| HotplugEvent::Attached(Box::new(keyboard)))
            .into_iter()
            .collect()
    }

    fn next_event(&mut self, timeout: Duration) -> Result<Option<HotplugEvent>> {
        Ok(match self.monitor.next_change(timeout)? {
            Some(HidrawChange::Added(devnode)) => {
                let devnode = devnode.to_string_lossy().into_owned();
                self.open_added(&devnode)
            }
            Some(HidrawChange::Removed(devnode)) => Some(HotplugEvent::Detached(
                devnode.to_string_lossy().into_owned(),
            )),
            None => None,
        })
    }
}
