// SPDX-License-Identifier: GPL-3.0-only
//! Keyboard hotplug detection
//!
//! Watches udev for hidraw nodes appearing and disappearing and turns them
//! into attach/detach events for the one keyboard identity a session cares
//! about.

mod udev_monitor;
mod watcher;

#[cfg(test)]
pub mod testing;

pub use watcher::{DeviceWatcher, HotplugEvent, UdevHidWatcherFactory, WatcherFactory};
