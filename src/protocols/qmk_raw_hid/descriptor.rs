// SPDX-License-Identifier: GPL-3.0-only
//! Minimal HID report descriptor parsing
//!
//! Only what is needed to size output reports: Report Size, Report Count and
//! Report ID globals (with Push/Pop), and Output main items.

use std::cmp::Reverse;
use std::collections::HashMap;

/// Output report sizing derived from a report descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputReportInfo {
    /// Largest output report in bytes, excluding the report id byte
    pub max_len: usize,
    /// Id of that report, `None` when the device does not number its reports
    pub report_id: Option<u8>,
}

const TYPE_MAIN: u8 = 0;
const TYPE_GLOBAL: u8 = 1;

const MAIN_OUTPUT: u8 = 0x9;

const GLOBAL_REPORT_SIZE: u8 = 0x7;
const GLOBAL_REPORT_ID: u8 = 0x8;
const GLOBAL_REPORT_COUNT: u8 = 0x9;
const GLOBAL_PUSH: u8 = 0xA;
const GLOBAL_POP: u8 = 0xB;

const LONG_ITEM_PREFIX: u8 = 0xFE;

#[derive(Debug, Clone, Copy, Default)]
struct Globals {
    report_size: u32,
    report_count: u32,
    report_id: u8,
}

impl OutputReportInfo {
    /// Parse a raw report descriptor
    ///
    /// Returns `None` when the descriptor declares no output report.
    pub fn parse(descriptor: &[u8]) -> Option<Self> {
        let mut globals = Globals::default();
        let mut stack: Vec<Globals> = Vec::new();
        let mut numbered = false;
        // report id -> accumulated output bits
        let mut output_bits: HashMap<u8, u64> = HashMap::new();

        let mut i = 0;
        while i < descriptor.len() {
            let prefix = descriptor[i];
            i += 1;

            if prefix == LONG_ITEM_PREFIX {
                let data_len = *descriptor.get(i)? as usize;
                // bDataSize, bLongItemTag, data
                i += 2 + data_len;
                continue;
            }

            let size = match prefix & 0x03 {
                3 => 4,
                n => n as usize,
            };
            let item_type = (prefix >> 2) & 0x03;
            let tag = prefix >> 4;

            let data = descriptor.get(i..i + size)?;
            i += size;
            let value = data
                .iter()
                .rev()
                .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));

            match (item_type, tag) {
                (TYPE_GLOBAL, GLOBAL_REPORT_SIZE) => globals.report_size = value,
                (TYPE_GLOBAL, GLOBAL_REPORT_COUNT) => globals.report_count = value,
                (TYPE_GLOBAL, GLOBAL_REPORT_ID) => {
                    globals.report_id = value as u8;
                    numbered = true;
                }
                (TYPE_GLOBAL, GLOBAL_PUSH) => stack.push(globals),
                (TYPE_GLOBAL, GLOBAL_POP) => {
                    globals = stack.pop().unwrap_or_default();
                }
                (TYPE_MAIN, MAIN_OUTPUT) => {
                    let bits = u64::from(globals.report_size) * u64::from(globals.report_count);
                    *output_bits.entry(globals.report_id).or_default() += bits;
                }
                _ => {}
            }
        }

        // Lowest id wins a tie so the result does not depend on map order
        let (id, max_bits) = output_bits
            .into_iter()
            .max_by_key(|&(id, bits)| (bits, Reverse(id)))?;
        Some(Self {
            max_len: max_bits.div_ceil(8) as usize,
            report_id: numbered.then_some(id),
        })
    }

    /// Unnumbered report of `max_len` bytes
    pub fn unnumbered(max_len: usize) -> Self {
        Self {
            max_len,
            report_id: None,
        }
    }

    /// Bytes in a complete report, counting the id byte of numbered reports
    pub fn report_len(&self) -> usize {
        self.max_len + usize::from(self.report_id.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Raw HID descriptor from QMK's usb_descriptor.c
    const QMK_RAW_HID: &[u8] = &[
        0x06, 0x60, 0xFF, // Usage Page (Vendor Defined 0xFF60)
        0x09, 0x61, // Usage (0x61)
        0xA1, 0x01, // Collection (Application)
        0x09, 0x62, // Usage (0x62)
        0x15, 0x00, // Logical Minimum (0)
        0x26, 0xFF, 0x00, // Logical Maximum (255)
        0x95, 0x20, // Report Count (32)
        0x75, 0x08, // Report Size (8)
        0x81, 0x02, // Input (Data, Variable, Absolute)
        0x09, 0x63, // Usage (0x63)
        0x15, 0x00, // Logical Minimum (0)
        0x26, 0xFF, 0x00, // Logical Maximum (255)
        0x95, 0x20, // Report Count (32)
        0x75, 0x08, // Report Size (8)
        0x91, 0x02, // Output (Data, Variable, Absolute)
        0xC0, // End Collection
    ];

    #[test]
    fn test_qmk_raw_hid_descriptor() {
        let info = OutputReportInfo::parse(QMK_RAW_HID).unwrap();
        assert_eq!(info, OutputReportInfo::unnumbered(32));
        assert_eq!(info.report_len(), 32);
    }

    #[test]
    fn test_numbered_reports_take_largest() {
        let descriptor = [
            0x85, 0x01, // Report ID (1)
            0x75, 0x08, // Report Size (8)
            0x95, 0x04, // Report Count (4)
            0x91, 0x02, // Output
            0x85, 0x02, // Report ID (2)
            0x95, 0x10, // Report Count (16)
            0x91, 0x02, // Output
            0x75, 0x01, // Report Size (1)
            0x95, 0x03, // Report Count (3)
            0x91, 0x02, // Output (3 more bits on report 2)
        ];
        let info = OutputReportInfo::parse(&descriptor).unwrap();
        assert_eq!(info.max_len, 17);
        assert_eq!(info.report_id, Some(2));
        assert_eq!(info.report_len(), 18);
    }

    #[test]
    fn test_equal_numbered_reports_pick_lowest_id() {
        let descriptor = [
            0x75, 0x08, // Report Size (8)
            0x95, 0x08, // Report Count (8)
            0x85, 0x09, // Report ID (9)
            0x91, 0x02, // Output
            0x85, 0x03, // Report ID (3)
            0x91, 0x02, // Output
        ];
        let info = OutputReportInfo::parse(&descriptor).unwrap();
        assert_eq!(info.report_id, Some(3));
        assert_eq!(info.max_len, 8);
    }

    #[test]
    fn test_push_pop_restores_globals() {
        let descriptor = [
            0x75, 0x08, // Report Size (8)
            0x95, 0x02, // Report Count (2)
            0xA4, // Push
            0x95, 0x40, // Report Count (64)
            0xB4, // Pop
            0x91, 0x02, // Output
        ];
        let info = OutputReportInfo::parse(&descriptor).unwrap();
        assert_eq!(info.max_len, 2);
    }

    #[test]
    fn test_input_only_descriptor_has_no_output() {
        let descriptor = [0x75, 0x08, 0x95, 0x20, 0x81, 0x02];
        assert!(OutputReportInfo::parse(&descriptor).is_none());
    }

    #[test]
    fn test_truncated_descriptor() {
        assert!(OutputReportInfo::parse(&[0x75, 0x08, 0x95]).is_none());
        assert!(OutputReportInfo::parse(&[]).is_none());
    }
}
