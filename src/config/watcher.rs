// SPDX-License-Identifier: GPL-3.0-only
//! Configuration file change detection
//!
//! Watches the directory holding the config file (editors usually replace the
//! file rather than writing it in place) and reloads the store once a burst of
//! events has settled.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::ConfigStore;
use crate::error::Result;

/// Quiet period after the last file event before reloading
const SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Keeps the file watch alive; dropping it stops reloading
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching the store's file
    pub fn spawn(store: Arc<ConfigStore>) -> Result<Self> {
        let path = store.path().to_path_buf();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| std::path::PathBuf::from("."));

        std::fs::create_dir_all(&dir)?;

        let (tx, rx) = std::sync::mpsc::channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(tx, NotifyConfig::default())
            .map_err(|e| crate::error::AppError::Config(format!("file watcher: {e}")))?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| crate::error::AppError::Config(format!("watching {}: {e}", dir.display())))?;

        info!("Watching {} for configuration changes", path.display());

        std::thread::Builder::new()
            .name("config-watch".into())
            .spawn(move || watch_loop(store, rx))?;

        Ok(Self { _watcher: watcher })
    }
}

fn concerns_config(event: &Event, store: &ConfigStore) -> bool {
    let file_name = store.path().file_name();
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event.paths.iter().any(|p| p.file_name() == file_name)
}

fn watch_loop(store: Arc<ConfigStore>, rx: Receiver<notify::Result<Event>>) {
    while let Ok(event) = rx.recv() {
        match event {
            Ok(event) if concerns_config(&event, &store) => {}
            Ok(_) => continue,
            Err(e) => {
                error!("Config watcher error: {e}");
                continue;
            }
        }

        // Debounce: wait until the burst of events is over
        let mut drained_count = 0;
        loop {
            match rx.recv_timeout(SETTLE_DELAY) {
                Ok(_) => drained_count += 1,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
        if drained_count > 0 {
            debug!("Drained {} additional config file events", drained_count);
        }

        match store.reload() {
            Ok(true) => {}
            Ok(false) => debug!("Config file touched without changes"),
            Err(e) => error!("Keeping previous configuration, reload failed: {}", e),
        }
    }

    debug!("Config watcher channel closed");
}
