// SPDX-License-Identifier: GPL-3.0-only
//! Keyboard backlight control protocols
//!
//! A protocol implementation turns a brightness byte into whatever the
//! keyboard firmware expects on the wire. The device side is abstracted so
//! sessions can be driven by simulated hardware in tests.

pub mod qmk_raw_hid;

use crate::error::Result;

/// An open, report-writable keyboard interface
pub trait BacklightDevice: std::fmt::Debug + Send {
    /// Device node this handle was opened from (e.g. `/dev/hidraw3`)
    fn path(&self) -> &str;

    /// Human-readable name of the keyboard
    fn name(&self) -> String;

    /// Length of a complete output report, including the report id byte
    /// when the device numbers its reports
    fn max_output_report_len(&self) -> usize;

    /// Send one output report of exactly `max_output_report_len` bytes
    fn write_output_report(&mut self, report: &[u8]) -> Result<()>;
}
