// SPDX-License-Identifier: GPL-3.0-only
//! Industrial I/O illuminance sensors
//!
//! The kernel exposes ambient light sensors under `/sys/bus/iio/devices`.
//! Most drivers provide a processed `in_illuminance_input` in lux; some only
//! provide `in_illuminance_raw` plus optional `_scale` and `_offset`, where
//! `lux = (raw + offset) * scale`.

use std::fs;
use std::path::{Path, PathBuf};

use super::LightSensor;
use crate::error::{AppError, Result};

pub const IIO_DEVICES_ROOT: &str = "/sys/bus/iio/devices";

const INPUT: &str = "in_illuminance_input";
const RAW: &str = "in_illuminance_raw";
const SCALE: &str = "in_illuminance_scale";
const OFFSET: &str = "in_illuminance_offset";

#[derive(Debug, Clone, PartialEq)]
enum Channel {
    Processed,
    Raw { scale: f64, offset: f64 },
}

/// Illuminance channel of one IIO device
#[derive(Debug)]
pub struct IioLightSensor {
    dir: PathBuf,
    channel: Channel,
}

impl IioLightSensor {
    /// Open the IIO device directory `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        let channel = if dir.join(INPUT).exists() {
            Channel::Processed
        } else if dir.join(RAW).exists() {
            Channel::Raw {
                scale: read_optional(&dir.join(SCALE))?.unwrap_or(1.0),
                offset: read_optional(&dir.join(OFFSET))?.unwrap_or(0.0),
            }
        } else {
            return Err(AppError::Sensor(format!(
                "{} has no illuminance channel",
                dir.display()
            )));
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            channel,
        })
    }

    /// First device under `root` with an illuminance channel
    pub fn discover(root: &Path) -> Option<Self> {
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot list {}: {}", root.display(), e);
                return None;
            }
        };

        let mut dirs: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        dirs.sort();

        let sensor = dirs.iter().find_map(|dir| Self::open(dir).ok());
        if sensor.is_none() {
            info!("No ambient light sensor found under {}", root.display());
        }
        sensor
    }

    #[cfg(test)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl LightSensor for IioLightSensor {
    fn describe(&self) -> String {
        let name = fs::read_to_string(self.dir.join("name")).unwrap_or_default();
        match name.trim() {
            "" => self.dir.display().to_string(),
            name => format!("{} ({})", name, self.dir.display()),
        }
    }

    fn is_present(&self) -> bool {
        match self.channel {
            Channel::Processed => self.dir.join(INPUT).exists(),
            Channel::Raw { .. } => self.dir.join(RAW).exists(),
        }
    }

    fn read_lux(&mut self) -> Result<f64> {
        match self.channel {
            Channel::Processed => read_value(&self.dir.join(INPUT)),
            Channel::Raw { scale, offset } => {
                let raw = read_value(&self.dir.join(RAW))?;
                Ok((raw + offset) * scale)
            }
        }
    }
}

fn read_value(path: &Path) -> Result<f64> {
    let text = fs::read_to_string(path)?;
    text.trim()
        .parse::<f64>()
        .map_err(|e| AppError::Sensor(format!("{}: {:?} is not a number ({})", path.display(), text.trim(), e)))
}

fn read_optional(path: &Path) -> Result<Option<f64>> {
    if path.exists() {
        read_value(path).map(Some)
    } else {
        Ok(None)
    }
}
