// SPDX-License-Identifier: GPL-3.0-only
//! Ambient light sensing
//!
//! A `LightSensor` produces single lux readings; the `AmbientLightSampler`
//! polls one at a fixed cadence and publishes changes.

mod iio;
mod sampler;
#[cfg(test)]
pub mod testing;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::SensorConfig;
use crate::error::Result;

pub use iio::{IIO_DEVICES_ROOT, IioLightSensor};
pub use sampler::AmbientLightSampler;

/// Sampling cadence
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateFrequency {
    Realtime,
    #[default]
    Fast,
    Slow,
}

impl UpdateFrequency {
    pub fn interval(self) -> Duration {
        match self {
            UpdateFrequency::Realtime => Duration::from_millis(100),
            UpdateFrequency::Fast => Duration::from_secs(5),
            UpdateFrequency::Slow => Duration::from_secs(10),
        }
    }
}

/// Source of ambient light readings
pub trait LightSensor: Send {
    /// Human readable location, for logs
    fn describe(&self) -> String;

    /// Whether the sensor can currently be read
    fn is_present(&self) -> bool;

    /// Take one reading in lux
    fn read_lux(&mut self) -> Result<f64>;
}

/// Open the sensor named in the configuration, or the first one found
pub fn open_sensor(config: &SensorConfig) -> Option<Box<dyn LightSensor>> {
    let sensor = match &config.device {
        Some(dir) => match IioLightSensor::open(dir) {
            Ok(sensor) => sensor,
            Err(e) => {
                warn!("Configured light sensor unavailable: {}", e);
                return None;
            }
        },
        None => IioLightSensor::discover(Path::new(IIO_DEVICES_ROOT))?,
    };

    info!("Using ambient light sensor {}", sensor.describe());
    Some(Box::new(sensor))
}
