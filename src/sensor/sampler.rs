// SPDX-License-Identifier: GPL-3.0-only
//! Periodic ambient light sampling
//!
//! Readings are published through a `watch` channel. Subscribers are only
//! woken when a reading differs from the previous one, so a room with steady
//! light produces no traffic at all.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{LightSensor, UpdateFrequency};

struct Inner {
    sensor: Mutex<Option<Box<dyn LightSensor>>>,
    tx: watch::Sender<Option<f64>>,
}

impl Inner {
    /// Take one reading and publish it if it changed
    fn sample(&self) -> Option<f64> {
        let lux = {
            let mut sensor = self.sensor.lock().unwrap_or_else(|p| p.into_inner());
            let sensor = sensor.as_mut()?;
            match sensor.read_lux() {
                Ok(lux) => lux,
                Err(e) => {
                    warn!("Failed to read ambient light: {}", e);
                    return None;
                }
            }
        };

        let changed = self.tx.send_if_modified(|current| {
            if *current == Some(lux) {
                false
            } else {
                *current = Some(lux);
                true
            }
        });
        if changed {
            debug!("Ambient light changed to {} lux", lux);
        }

        Some(lux)
    }
}

/// Polls a light sensor at a fixed cadence
pub struct AmbientLightSampler {
    frequency: UpdateFrequency,
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AmbientLightSampler {
    /// Create an inactive sampler
    ///
    /// `None` stands for a host without a usable sensor; such a sampler is
    /// never ready and never publishes.
    pub fn new(sensor: Option<Box<dyn LightSensor>>, frequency: UpdateFrequency) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            frequency,
            inner: Arc::new(Inner {
                sensor: Mutex::new(sensor),
                tx,
            }),
            task: Mutex::new(None),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner
            .sensor
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|sensor| sensor.is_present())
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Begin sampling; must be called from within a tokio runtime
    pub fn activate(&self) {
        if !self.is_ready() {
            warn!("Ambient light sensor not ready, not sampling");
            return;
        }

        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let inner = self.inner.clone();
        let period = self.frequency.interval();
        info!("Sampling ambient light every {:?}", period);

        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                inner.sample();
            }
        }));
    }

    /// Stop sampling; the last reading stays available
    pub fn deactivate(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            task.abort();
            debug!("Ambient light sampling stopped");
        }
    }

    /// Last published reading
    pub fn current_value(&self) -> Option<f64> {
        *self.inner.tx.borrow()
    }

    /// Receiver woken on every change of the reading
    pub fn subscribe(&self) -> watch::Receiver<Option<f64>> {
        self.inner.tx.subscribe()
    }

    /// Read the sensor right now, publishing the value if it changed
    pub fn force_refresh(&self) -> Option<f64> {
        self.inner.sample()
    }
}

impl Drop for AmbientLightSampler {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::sensor::testing::FakeSensor;

    fn sampler(sensor: &FakeSensor) -> AmbientLightSampler {
        AmbientLightSampler::new(Some(Box::new(sensor.clone())), UpdateFrequency::Realtime)
    }

    #[test]
    fn test_force_refresh_publishes_changes_only() {
        let sensor = FakeSensor::new(10.0);
        let sampler = sampler(&sensor);
        let mut rx = sampler.subscribe();

        assert_eq!(sampler.current_value(), None);
        assert_eq!(sampler.force_refresh(), Some(10.0));
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();

        assert_eq!(sampler.force_refresh(), Some(10.0));
        assert!(!rx.has_changed().unwrap());

        sensor.set(11.0);
        assert_eq!(sampler.force_refresh(), Some(11.0));
        assert!(rx.has_changed().unwrap());
        assert_eq!(sampler.current_value(), Some(11.0));
    }

    #[test]
    fn test_failed_read_keeps_last_value() {
        let sensor = FakeSensor::new(3.0);
        let sampler = sampler(&sensor);
        sampler.force_refresh();

        sensor.fail();
        assert_eq!(sampler.force_refresh(), None);
        assert_eq!(sampler.current_value(), Some(3.0));
    }

    #[test]
    fn test_missing_sensor_is_never_ready() {
        let sampler = AmbientLightSampler::new(None, UpdateFrequency::Fast);
        assert!(!sampler.is_ready());
        assert_eq!(sampler.force_refresh(), None);

        let absent = AmbientLightSampler::new(Some(Box::new(FakeSensor::absent())), UpdateFrequency::Fast);
        assert!(!absent.is_ready());
    }

    #[tokio::test]
    async fn test_activate_samples_periodically() {
        let sensor = FakeSensor::new(100.0);
        let sampler = sampler(&sensor);
        let mut rx = sampler.subscribe();

        sampler.activate();
        sampler.activate();
        assert!(sampler.is_active());

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(100.0));

        sensor.set(250.0);
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(250.0));

        sampler.deactivate();
        assert!(!sampler.is_active());
        // Safe when already inactive
        sampler.deactivate();
    }

    #[tokio::test]
    async fn test_activate_without_sensor_does_nothing() {
        let sampler = AmbientLightSampler::new(None, UpdateFrequency::Realtime);
        sampler.activate();
        assert!(!sampler.is_active());
    }

    #[tokio::test]
    async fn test_deactivated_sampler_stops_reading() {
        let sensor = FakeSensor::new(1.0);
        let sampler = sampler(&sensor);
        sampler.activate();
        tokio::time::sleep(Duration::from_millis(250)).await;
        sampler.deactivate();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let reads = sensor.read_count();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sensor.read_count(), reads);
    }
}
