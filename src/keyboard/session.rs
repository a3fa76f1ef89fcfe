// SPDX-License-Identifier: GPL-3.0-only
//! Keyboard session
//!
//! A session owns one background watch thread bound to a keyboard identity
//! and holds the brightness currently requested for that keyboard.
//!
//! # Thread Safety
//!
//! The requested level and the attached device handle live behind one mutex.
//! Only the watch thread installs or clears the handle; `set_requested_level`
//! writes through it while holding the lock. A write therefore never targets
//! a handle that a detach has just invalidated, and whichever of "attach" and
//! "set level" happens last decides what the keyboard ends up showing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use super::DeviceIdentity;
use crate::hotplug::{HotplugEvent, WatcherFactory};
use crate::protocols::BacklightDevice;
use crate::protocols::qmk_raw_hid::BacklightReportEncoder;

/// How long the watch thread blocks before re-checking for a stop request
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Watching,
    DeviceAttached,
    DeviceDetached,
    Stopped,
}

struct DeviceState {
    requested_level: u8,
    device: Option<Box<dyn BacklightDevice>>,
    state: SessionState,
}

struct Shared {
    inner: Mutex<DeviceState>,
    stop: AtomicBool,
    encoder: BacklightReportEncoder,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        // State is replaced whole, so a poisoned lock still holds a valid value
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self, device: &mut dyn BacklightDevice, level: u8) {
        if let Err(e) = self.encoder.write(device, level) {
            warn!("Failed to set backlight on {}: {}", device.path(), e);
        }
    }

    fn handle_event(&self, event: HotplugEvent) {
        let mut guard = self.lock();
        if self.stop.load(Ordering::Acquire) {
            return;
        }
        let state = &mut *guard;

        match event {
            HotplugEvent::Attached(mut device) => {
                info!("Keyboard {} attached at {}", device.name(), device.path());
                self.write(device.as_mut(), state.requested_level);
                state.device = Some(device);
                state.state = SessionState::DeviceAttached;
            }
            HotplugEvent::Detached(path) => {
                if state.device.as_ref().is_some_and(|d| d.path() == path) {
                    state.device = None;
                    state.state = SessionState::DeviceDetached;
                    info!("Keyboard at {} removed", path);
                } else {
                    debug!("Ignoring removal of unrelated device {}", path);
                }
            }
        }
    }
}

/// Watches for one keyboard and keeps its backlight at the requested level
pub struct DeviceSession {
    identity: DeviceIdentity,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeviceSession({}, {:?})", self.identity, self.state())
    }
}

impl DeviceSession {
    /// Create an idle session
    ///
    /// # Arguments
    /// * `identity` - Keyboard to bind to
    /// * `encoder` - Report encoder used for every write
    /// * `initial_level` - Level applied to the first keyboard that attaches
    pub fn new(identity: DeviceIdentity, encoder: BacklightReportEncoder, initial_level: u8) -> Self {
        Self {
            identity,
            shared: Arc::new(Shared {
                inner: Mutex::new(DeviceState {
                    requested_level: initial_level,
                    device: None,
                    state: SessionState::Idle,
                }),
                stop: AtomicBool::new(false),
                encoder,
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    #[cfg(test)]
    pub fn requested_level(&self) -> u8 {
        self.shared.lock().requested_level
    }

    #[cfg(test)]
    pub fn is_device_attached(&self) -> bool {
        self.shared.lock().device.is_some()
    }

    /// Start the watch thread
    ///
    /// Returns immediately; the watcher is created and pumped on its own
    /// thread. Calling this on a session that is not idle does nothing.
    pub fn start(&self, factory: Arc<dyn WatcherFactory>) {
        {
            let mut guard = self.shared.lock();
            if guard.state != SessionState::Idle {
                warn!("Session for {} already started", self.identity);
                return;
            }
            guard.state = SessionState::Watching;
        }

        let shared = self.shared.clone();
        let identity = self.identity;
        let spawned = std::thread::Builder::new()
            .name("keyboard-watch".into())
            .spawn(move || watch_loop(shared, identity, factory));

        match spawned {
            Ok(handle) => {
                *self.worker.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
            }
            Err(e) => {
                error!("Failed to spawn keyboard watch thread: {}", e);
                self.shared.lock().state = SessionState::Stopped;
            }
        }
    }

    /// Stop watching and release the keyboard
    ///
    /// Once this returns no further writes happen. Safe to call repeatedly.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);

        let worker = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = worker {
            if handle.join().is_err() {
                error!("Keyboard watch thread for {} panicked", self.identity);
            }
        }

        let mut guard = self.shared.lock();
        if guard.state != SessionState::Stopped {
            guard.device = None;
            guard.state = SessionState::Stopped;
            info!("Stopped keyboard session for {}", self.identity);
        }
    }

    /// Request a new backlight level
    ///
    /// Written right away when a keyboard is attached, otherwise applied to
    /// the next one that attaches.
    pub fn set_requested_level(&self, level: u8) {
        let mut guard = self.shared.lock();
        if guard.state == SessionState::Stopped {
            return;
        }
        guard.requested_level = level;

        match guard.device.as_deref_mut() {
            Some(device) => self.shared.write(device, level),
            None => debug!("No keyboard attached, remembering level {}", level),
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_loop(shared: Arc<Shared>, identity: DeviceIdentity, factory: Arc<dyn WatcherFactory>) {
    let mut watcher = match factory.create(&identity) {
        Ok(watcher) => watcher,
        Err(e) => {
            error!("Failed to initialize keyboard hotplug monitoring: {}", e);
            return;
        }
    };

    for event in watcher.initial_scan() {
        shared.handle_event(event);
    }

    while !shared.stop.load(Ordering::Acquire) {
        match watcher.next_event(POLL_INTERVAL) {
            Ok(Some(event)) => shared.handle_event(event),
            Ok(None) => {}
            Err(e) => {
                error!("Keyboard hotplug monitoring stopped: {}", e);
                break;
            }
        }
    }

    debug!("Keyboard watch loop for {} exited", identity);
}
