// SPDX-License-Identifier: GPL-3.0-only
//! Simulated keyboards and hotplug events for tests

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{DeviceWatcher, HotplugEvent, WatcherFactory};
use crate::error::{AppError, Result};
use crate::keyboard::DeviceIdentity;
use crate::protocols::BacklightDevice;

/// Keyboard that records every report written to it
#[derive(Debug, Clone)]
pub struct FakeKeyboard {
    path: String,
    max_len: usize,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    fail_writes: bool,
}

impl FakeKeyboard {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            max_len: 32,
            writes: Arc::default(),
            fail_writes: false,
        }
    }

    pub fn failing(path: &str) -> Self {
        Self {
            fail_writes: true,
            ..Self::new(path)
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    /// Brightness byte of every report, in write order
    pub fn levels(&self) -> Vec<u8> {
        self.writes.lock().unwrap().iter().map(|r| r[3]).collect()
    }

    pub fn last_level(&self) -> Option<u8> {
        self.levels().last().copied()
    }

    pub fn reports(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }
}

impl BacklightDevice for FakeKeyboard {
    fn path(&self) -> &str {
        &self.path
    }

    fn name(&self) -> String {
        format!("Fake Keyboard {}", self.path)
    }

    fn max_output_report_len(&self) -> usize {
        self.max_len
    }

    fn write_output_report(&mut self, report: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(AppError::Hid {
                path: self.path.clone(),
                reason: "simulated failure".into(),
            });
        }
        self.writes.lock().unwrap().push(report.to_vec());
        Ok(())
    }
}

struct ChannelWatcher {
    initial: Vec<FakeKeyboard>,
    rx: Receiver<HotplugEvent>,
}

impl DeviceWatcher for ChannelWatcher {
    fn initial_scan(&mut self) -> Vec<HotplugEvent> {
        self.initial
            .drain(..)
            .map(|kb| HotplugEvent::Attached(Box::new(kb)))
            .collect()
    }

    fn next_event(&mut self, timeout: Duration) -> Result<Option<HotplugEvent>> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

/// Factory whose watchers are fed by the test
#[derive(Default)]
pub struct FakeHotplug {
    initial: Mutex<Vec<FakeKeyboard>>,
    watchers: Mutex<Vec<(DeviceIdentity, Sender<HotplugEvent>)>>,
    fail_create: bool,
}

impl FakeHotplug {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every watcher created reports `keyboard` as already present
    pub fn with_present(keyboard: FakeKeyboard) -> Arc<Self> {
        Arc::new(Self {
            initial: Mutex::new(vec![keyboard]),
            ..Self::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_create: true,
            ..Self::default()
        })
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().unwrap().len()
    }

    pub fn identities(&self) -> Vec<DeviceIdentity> {
        self.watchers.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }

    /// Simulate plugging `keyboard` in, seen by the most recent watcher
    pub fn attach(&self, keyboard: &FakeKeyboard) {
        self.send(HotplugEvent::Attached(Box::new(keyboard.clone())));
    }

    /// Simulate unplugging `keyboard`, seen by the most recent watcher
    pub fn detach(&self, keyboard: &FakeKeyboard) {
        self.send(HotplugEvent::Detached(keyboard.path.clone()));
    }

    fn send(&self, event: HotplugEvent) {
        let watchers = self.watchers.lock().unwrap();
        let (_, tx) = watchers.last().expect("no watcher created yet");
        tx.send(event).expect("watcher gone");
    }
}

impl WatcherFactory for FakeHotplug {
    fn create(&self, identity: &DeviceIdentity) -> Result<Box<dyn DeviceWatcher>> {
        if self.fail_create {
            return Err(AppError::Io(std::io::Error::other("no udev in test")));
        }

        let (tx, rx) = mpsc::channel();
        self.watchers.lock().unwrap().push((*identity, tx));
        let initial = self.initial.lock().unwrap().clone();
        Ok(Box::new(ChannelWatcher { initial, rx }))
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
