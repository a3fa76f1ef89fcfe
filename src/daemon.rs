// SPDX-License-Identifier: GPL-3.0-only
//! Ambient backlight control loop
//!
//! Ties the sampler, the configuration snapshots and the keyboard session
//! together:
//! - sensor change: evaluate and forward the level to the session
//! - adjustment change: re-evaluate the last reading immediately
//! - keyboard identity or report layout change: stop the old session, then
//!   start a new one
//! - resume from suspend: once the settle delay has passed, force a fresh
//!   reading; the loop keeps serving everything else meanwhile
//!
//! Only one session exists at a time. Levels are forwarded on the blocking
//! pool and awaited in order, so the keyboard never sees an older level after
//! a newer one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::brightness::BacklightLevelEvaluator;
use crate::config::{Config, ConfigSnapshot};
use crate::hotplug::WatcherFactory;
use crate::keyboard::DeviceSession;
use crate::protocols::qmk_raw_hid::BacklightReportEncoder;
use crate::sensor::AmbientLightSampler;

pub struct ControlLoop {
    config: watch::Receiver<Arc<ConfigSnapshot>>,
    sampler: Arc<AmbientLightSampler>,
    factory: Arc<dyn WatcherFactory>,
    wake: Option<mpsc::Receiver<()>>,
    active: Option<Arc<ConfigSnapshot>>,
    session: Option<Arc<DeviceSession>>,
}

impl ControlLoop {
    pub fn new(
        config: watch::Receiver<Arc<ConfigSnapshot>>,
        sampler: Arc<AmbientLightSampler>,
        factory: Arc<dyn WatcherFactory>,
    ) -> Self {
        Self {
            config,
            sampler,
            factory,
            wake: None,
            active: None,
            session: None,
        }
    }

    /// Refresh the reading whenever `wake` yields
    pub fn with_wake(mut self, wake: Option<mpsc::Receiver<()>>) -> Self {
        self.wake = wake;
        self
    }

    /// Run until `shutdown` completes
    ///
    /// Returns right away if there is no usable light sensor.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        if !self.sampler.is_ready() {
            warn!("No ambient light sensor available, backlight control disabled");
            return Ok(());
        }

        info!("Starting ambient backlight control");

        let mut readings = self.sampler.subscribe();
        self.sampler.activate();

        let snapshot = self.config.borrow_and_update().clone();
        self.apply_config(snapshot).await;

        // Armed by a resume event, fires once the settle delay is over
        let settle = tokio::time::sleep(Duration::ZERO);
        let mut settling = false;
        tokio::pin!(shutdown, settle);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down ambient backlight control");
                    break;
                }
                Ok(()) = readings.changed() => {
                    self.reevaluate().await;
                }
                Ok(()) = self.config.changed() => {
                    let snapshot = self.config.borrow_and_update().clone();
                    self.apply_config(snapshot).await;
                }
                Some(()) = next_wake(&mut self.wake) => {
                    let delay = self.wake_settle_delay();
                    debug!("Waiting {:?} after resume before sampling", delay);
                    settle.as_mut().reset(Instant::now() + delay);
                    settling = true;
                }
                () = &mut settle, if settling => {
                    settling = false;
                    self.refresh_after_wake().await;
                }
            }
        }

        self.sampler.deactivate();
        self.stop_session().await;
        Ok(())
    }

    async fn apply_config(&mut self, snapshot: Arc<ConfigSnapshot>) {
        let previous = self.active.replace(snapshot.clone());
        let config = &snapshot.config;

        let rebind = previous.as_ref().is_none_or(|previous| {
            previous.config.keyboard != config.keyboard || previous.config.report != config.report
        });

        debug!("Applying configuration version {}", snapshot.version);

        let sensor_changed = previous.as_ref().is_some_and(|previous| {
            previous.config.sensor.frequency != config.sensor.frequency
                || previous.config.sensor.device != config.sensor.device
        });
        if sensor_changed {
            warn!("Sensor device and frequency changes take effect after a restart");
        }

        if rebind {
            self.replace_session(config).await;
        }
        self.reevaluate().await;
    }

    /// Stop the current session fully, then bind a new one
    async fn replace_session(&mut self, config: &Config) {
        self.stop_session().await;

        let identity = match config.keyboard.identity() {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Keyboard backlight disabled: {}", e);
                return;
            }
        };

        let level = self
            .evaluate(config)
            .unwrap_or(config.adjustments.minimum_level);
        let encoder = BacklightReportEncoder::new(config.report.clone());
        let session = Arc::new(DeviceSession::new(identity, encoder, level));
        session.start(self.factory.clone());

        info!("Watching for keyboard {}", identity);
        self.session = Some(session);
    }

    async fn stop_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if let Err(e) = tokio::task::spawn_blocking(move || session.stop()).await {
            error!("Failed to stop keyboard session: {}", e);
        }
    }

    fn evaluate(&self, config: &Config) -> Option<u8> {
        let lux = self.sampler.current_value()?;
        let evaluator = BacklightLevelEvaluator::with_darkness_floor(config.sensor.darkness_floor_lux);
        Some(evaluator.evaluate(lux, &config.adjustments))
    }

    async fn reevaluate(&self) {
        let Some(snapshot) = self.active.as_ref() else {
            return;
        };
        let Some(level) = self.evaluate(&snapshot.config) else {
            debug!("No ambient light reading yet");
            return;
        };
        let Some(session) = self.session.clone() else {
            return;
        };

        debug!("Requesting backlight level {}", level);

        if let Err(e) = tokio::task::spawn_blocking(move || session.set_requested_level(level)).await {
            error!("Failed to forward backlight level: {}", e);
        }
    }

    fn wake_settle_delay(&self) -> Duration {
        self.active
            .as_ref()
            .map(|snapshot| snapshot.config.wake_settle_delay())
            .unwrap_or_default()
    }

    async fn refresh_after_wake(&self) {
        match self.sampler.force_refresh() {
            Some(lux) => info!("Ambient light after resume: {} lux", lux),
            None => warn!("Could not read ambient light after resume"),
        }
        self.reevaluate().await;
    }
}

/// Next resume event, or never when resume notifications are unavailable
async fn next_wake(wake: &mut Option<mpsc::Receiver<()>>) -> Option<()> {
    match wake {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
