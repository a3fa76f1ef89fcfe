// SPDX-License-Identifier: GPL-3.0-only
//! Daemon configuration
//!
//! The configuration lives in a TOML file and is published to the rest of the
//! daemon as one immutable, versioned snapshot. A reader never sees the new
//! vendor id paired with the old product id: fields change together or not
//! at all.

mod watcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{AppError, Result};
use crate::keyboard::DeviceIdentity;
use crate::protocols::qmk_raw_hid::{DEFAULT_USAGE, DEFAULT_USAGE_PAGE, ReportLayout};
use crate::sensor::UpdateFrequency;

pub use watcher::ConfigWatcher;

pub const APP_NAME: &str = "qmk-ambient-backlight";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Default vendor and product of the keyboard the daemon was written for
pub const DEFAULT_VENDOR_ID: &str = "4b42";
pub const DEFAULT_PRODUCT_ID: &str = "6061";

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    /// Delay between a resume from suspend and the forced sensor refresh
    pub wake_settle_delay_ms: u64,
    pub keyboard: KeyboardConfig,
    pub adjustments: KeyboardAdjustments,
    pub sensor: SensorConfig,
    pub report: ReportLayout,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wake_settle_delay_ms: 2000,
            keyboard: KeyboardConfig::default(),
            adjustments: KeyboardAdjustments::default(),
            sensor: SensorConfig::default(),
            report: ReportLayout::default(),
        }
    }
}

/// Which keyboard to drive
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// USB vendor id as a hex string ("4b42" or "0x4B42")
    pub vendor_id: String,
    /// USB product id as a hex string
    pub product_id: String,
    pub usage_page: u16,
    pub usage: u8,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID.to_string(),
            product_id: DEFAULT_PRODUCT_ID.to_string(),
            usage_page: DEFAULT_USAGE_PAGE,
            usage: DEFAULT_USAGE,
        }
    }
}

impl KeyboardConfig {
    /// Parse the configured identity
    pub fn identity(&self) -> Result<DeviceIdentity> {
        DeviceIdentity::parse(&self.vendor_id, &self.product_id, self.usage_page, self.usage)
    }
}

/// User-tunable bounds for the ambient light mapping
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct KeyboardAdjustments {
    pub minimum_level: u8,
    pub maximum_level: u8,
    /// Readings at or above this many lux give `maximum_level`
    pub lux_value_considered_maximum: u32,
}

impl Default for KeyboardAdjustments {
    fn default() -> Self {
        Self {
            minimum_level: 20,
            maximum_level: u8::MAX,
            lux_value_considered_maximum: 500,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct SensorConfig {
    pub frequency: UpdateFrequency,
    /// IIO device directory; the first illuminance sensor is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<PathBuf>,
    /// Readings below this are treated as this value
    pub darkness_floor_lux: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            frequency: UpdateFrequency::Fast,
            device: None,
            darkness_floor_lux: crate::brightness::DEFAULT_DARKNESS_FLOOR,
        }
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/qmk-ambient-backlight/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Load the configuration file, using defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the brightness mapping cannot honor
    pub fn validate(&self) -> Result<()> {
        let adjustments = &self.adjustments;
        if adjustments.minimum_level > adjustments.maximum_level {
            return Err(AppError::Config(format!(
                "adjustments.minimum_level ({}) is above adjustments.maximum_level ({})",
                adjustments.minimum_level, adjustments.maximum_level
            )));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))
    }

    pub fn wake_settle_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.wake_settle_delay_ms)
    }
}

/// One published configuration state
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    /// Incremented on every change
    pub version: u64,
    pub config: Config,
}

/// Owner of the configuration file and publisher of its snapshots
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    tx: watch::Sender<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    /// Load `path` into a new store
    ///
    /// A malformed file is logged and replaced by defaults so the daemon
    /// still runs; the next valid edit is picked up by the watcher.
    pub fn open(path: PathBuf) -> Self {
        let config = match Config::load(&path) {
            Ok(config) => config,
            Err(err) => {
                error!("errors loading config {}: {}", path.display(), err);
                Config::default()
            }
        };
        Self::with_config(path, config)
    }

    pub fn with_config(path: PathBuf, config: Config) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(ConfigSnapshot { version: 1, config }));
        Self { path, tx }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ConfigSnapshot>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.tx.borrow().clone()
    }

    /// Replace the configuration, notifying subscribers if anything changed
    pub fn publish(&self, config: Config) -> bool {
        self.tx.send_if_modified(|current| {
            if current.config == config {
                return false;
            }
            let version = current.version + 1;
            *current = Arc::new(ConfigSnapshot { version, config });
            info!("Configuration updated (version {})", version);
            true
        })
    }

    /// Re-read the file; on error the current snapshot is kept
    pub fn reload(&self) -> Result<bool> {
        let config = Config::load(&self.path)?;
        Ok(self.publish(config))
    }
}
