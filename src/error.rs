// SPDX-License-Identifier: GPL-3.0-only
//! Error types for the daemon
//!
//! Every failure in the control path degrades to "no visible backlight
//! change"; these types only carry enough context for a useful log line.

use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Vendor or product id in the configuration is not a 16-bit hex number
    #[error("Invalid {field} {value:?}: expected a 16-bit hex number")]
    InvalidIdentity { field: &'static str, value: String },

    /// Assembled output report does not fit the device's declared report size
    #[error("Output report too large for device ({len} bytes, device accepts {max})")]
    ReportTooLarge { len: usize, max: usize },

    /// HID communication error
    #[error("HID error on {path}: {reason}")]
    Hid { path: String, reason: String },

    /// Report starts with an id the device does not use for output
    #[error("Report id {id:#04x} does not match output report {expected:#04x} of {path}")]
    ReportIdMismatch { path: String, id: u8, expected: u8 },

    /// Device accepted fewer bytes than the report it was given
    #[error("Short write on {path}: wrote {written} of {expected} bytes")]
    ShortWrite {
        path: String,
        written: usize,
        expected: usize,
    },

    /// Ambient light sensor error
    #[error("Ambient light sensor error: {0}")]
    Sensor(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// D-Bus error (for resume notifications)
    #[cfg(feature = "resume-refresh")]
    #[error("D-Bus error: {0}")]
    DBus(#[from] zbus::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Result type alias for AppError
pub type Result<T> = std::result::Result<T, AppError>;
