// SPDX-License-Identifier: GPL-3.0-only
//! QMK raw HID backlight protocol
//!
//! QMK keyboards expose a vendor-defined raw HID interface (usage page
//! 0xFF60, usage 0x61). Keymaps that implement VIA's "custom set value"
//! command for the QMK backlight channel accept a brightness byte on it.

mod descriptor;
mod device;
mod report;

pub use descriptor::OutputReportInfo;
pub use device::HidKeyboard;
pub use report::{BacklightReportEncoder, ReportLayout};

/// Raw HID usage page used by QMK
pub const DEFAULT_USAGE_PAGE: u16 = 0xFF60;

/// Raw HID usage used by QMK
pub const DEFAULT_USAGE: u8 = 0x61;

/// QMK `RAW_EPSIZE`, used when the report descriptor cannot be read
pub const RAW_EPSIZE: usize = 32;

/// `via_command_id.id_custom_set_value`
pub const ID_CUSTOM_SET_VALUE: u8 = 0x07;

/// `via_channel_id.id_qmk_backlight_channel`
pub const ID_QMK_BACKLIGHT_CHANNEL: u8 = 0x01;

/// `via_qmk_backlight_value.id_qmk_backlight_brightness`
pub const ID_QMK_BACKLIGHT_BRIGHTNESS: u8 = 0x01;
