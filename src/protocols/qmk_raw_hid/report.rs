// SPDX-License-Identifier: GPL-3.0-only
//! Backlight output report encoding

use serde::{Deserialize, Serialize};

use super::{ID_CUSTOM_SET_VALUE, ID_QMK_BACKLIGHT_BRIGHTNESS, ID_QMK_BACKLIGHT_CHANNEL};
use crate::error::{AppError, Result};
use crate::protocols::BacklightDevice;

/// Byte layout of the backlight command
///
/// The report is `[report_id, header.., level, trailer..]`, zero padded to
/// the device's declared output report length. On devices that number their
/// reports `report_id` must be the id of the output report; on others it is
/// simply the first payload byte.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct ReportLayout {
    pub report_id: u8,
    pub header: Vec<u8>,
    pub trailer: Vec<u8>,
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self::via_backlight()
    }
}

impl ReportLayout {
    /// VIA custom set value for the QMK backlight brightness
    pub fn via_backlight() -> Self {
        Self {
            report_id: ID_CUSTOM_SET_VALUE,
            header: vec![ID_QMK_BACKLIGHT_CHANNEL, ID_QMK_BACKLIGHT_BRIGHTNESS],
            trailer: vec![0x00],
        }
    }

    /// Number of meaningful bytes before padding
    pub fn command_len(&self) -> usize {
        1 + self.header.len() + 1 + self.trailer.len()
    }
}

/// Serializes brightness levels into output reports and sends them
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BacklightReportEncoder {
    layout: ReportLayout,
}

impl BacklightReportEncoder {
    pub fn new(layout: ReportLayout) -> Self {
        Self { layout }
    }

    /// Build the report for `level`, exactly `max_len` bytes long
    ///
    /// Refuses layouts that do not fit; such a report is never sent.
    pub fn encode(&self, level: u8, max_len: usize) -> Result<Vec<u8>> {
        let len = self.layout.command_len();
        if len > max_len {
            return Err(AppError::ReportTooLarge { len, max: max_len });
        }

        let mut report = Vec::with_capacity(max_len);
        report.push(self.layout.report_id);
        report.extend_from_slice(&self.layout.header);
        report.push(level);
        report.extend_from_slice(&self.layout.trailer);
        report.resize(max_len, 0);

        Ok(report)
    }

    /// Encode `level` for `device` and write it
    pub fn write(&self, device: &mut dyn BacklightDevice, level: u8) -> Result<()> {
        let report = self.encode(level, device.max_output_report_len())?;
        device.write_output_report(&report)?;

        debug!("Set {} backlight to {}", device.name(), level);
        Ok(())
    }
}
