// SPDX-License-Identifier: GPL-3.0-only
//! hidapi-backed keyboard handle

use hidapi::{DeviceInfo, HidApi, HidDevice};

use super::{OutputReportInfo, RAW_EPSIZE};
use crate::error::{AppError, Result};
use crate::keyboard::DeviceIdentity;
use crate::protocols::BacklightDevice;

/// Open raw HID interface of a QMK keyboard
pub struct HidKeyboard {
    device: HidDevice,
    path: String,
    manufacturer: String,
    product: String,
    report: OutputReportInfo,
}

impl std::fmt::Debug for HidKeyboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HidKeyboard(path: {}, name: {}, report: {:?})",
            self.path,
            self.name(),
            self.report
        )
    }
}

impl HidKeyboard {
    /// Open the interface described by `info`
    pub fn open(api: &HidApi, info: &DeviceInfo) -> Result<Self> {
        let path = info.path().to_string_lossy().into_owned();

        let device = info.open_device(api).map_err(|e| AppError::Hid {
            path: path.clone(),
            reason: format!(
                "{e}. This may be a permissions issue. On Linux, ensure udev rules grant access to hidraw"
            ),
        })?;

        let report = read_output_report_info(&device).unwrap_or_else(|| {
            tracing::debug!(
                "Could not size output reports of {} from its descriptor, assuming {} bytes",
                path,
                RAW_EPSIZE
            );
            OutputReportInfo::unnumbered(RAW_EPSIZE)
        });

        let manufacturer = info.manufacturer_string().unwrap_or("Unknown").to_string();
        let product = info.product_string().unwrap_or("Keyboard").to_string();

        tracing::info!(
            "Opened {} {} at {} (output report: {} bytes)",
            manufacturer,
            product,
            path,
            report.max_len
        );

        Ok(Self {
            device,
            path,
            manufacturer,
            product,
            report,
        })
    }

    /// All currently enumerated interfaces matching `identity`
    pub fn matching<'a>(
        api: &'a HidApi,
        identity: &'a DeviceIdentity,
    ) -> impl Iterator<Item = &'a DeviceInfo> + 'a {
        api.device_list().filter(move |info| identity.matches(info))
    }

    /// Open the first matching interface that can be opened
    pub fn open_first(api: &HidApi, identity: &DeviceIdentity) -> Option<Self> {
        for info in Self::matching(api, identity) {
            match Self::open(api, info) {
                Ok(keyboard) => return Some(keyboard),
                Err(e) => tracing::warn!("Failed to open keyboard {}: {}", identity, e),
            }
        }
        None
    }
}

fn read_output_report_info(device: &HidDevice) -> Option<OutputReportInfo> {
    let mut buf = [0u8; hidapi::MAX_REPORT_DESCRIPTOR_SIZE];
    let len = device.get_report_descriptor(&mut buf).ok()?;
    OutputReportInfo::parse(&buf[..len])
}

impl BacklightDevice for HidKeyboard {
    fn path(&self) -> &str {
        &self.path
    }

    fn name(&self) -> String {
        format!("{} {}", self.manufacturer, self.product)
    }

    fn max_output_report_len(&self) -> usize {
        self.report.report_len()
    }

    fn write_output_report(&mut self, report: &[u8]) -> Result<()> {
        let buf = frame_report(&self.path, &self.report, report)?;

        let written = self.device.write(&buf).map_err(|e| AppError::Hid {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        if written < buf.len() {
            return Err(AppError::ShortWrite {
                path: self.path.clone(),
                written,
                expected: buf.len(),
            });
        }

        Ok(())
    }
}

/// Prepare `report` for hidraw, which wants the report number first
///
/// Unnumbered reports get a 0 prefix. Numbered reports already carry their
/// id and must use the one the descriptor declares.
fn frame_report(path: &str, info: &OutputReportInfo, report: &[u8]) -> Result<Vec<u8>> {
    match info.report_id {
        None => {
            let mut buf = Vec::with_capacity(report.len() + 1);
            buf.push(0);
            buf.extend_from_slice(report);
            Ok(buf)
        }
        Some(expected) => match report.first() {
            Some(&id) if id == expected => Ok(report.to_vec()),
            id => Err(AppError::ReportIdMismatch {
                path: path.to_string(),
                id: id.copied().unwrap_or_default(),
                expected,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::qmk_raw_hid::{BacklightReportEncoder, ReportLayout};

    #[test]
    fn test_unnumbered_report_gets_zero_prefix() {
        let info = OutputReportInfo::unnumbered(32);
        let report = BacklightReportEncoder::default()
            .encode(40, info.report_len())
            .unwrap();

        let buf = frame_report("/dev/hidraw0", &info, &report).unwrap();
        assert_eq!(buf.len(), 33);
        assert_eq!(&buf[..5], &[0x00, 0x07, 0x01, 0x01, 40]);
    }

    #[test]
    fn test_numbered_report_keeps_full_payload() {
        let info = OutputReportInfo {
            max_len: 32,
            report_id: Some(0x07),
        };
        let report = BacklightReportEncoder::default()
            .encode(40, info.report_len())
            .unwrap();

        let buf = frame_report("/dev/hidraw0", &info, &report).unwrap();
        // Id byte plus the 32 bytes the descriptor declares
        assert_eq!(buf.len(), 33);
        assert_eq!(buf[0], 0x07);
        assert_eq!(buf, report);
    }

    #[test]
    fn test_numbered_report_with_wrong_id_is_refused() {
        let info = OutputReportInfo {
            max_len: 32,
            report_id: Some(0x02),
        };
        let report = BacklightReportEncoder::new(ReportLayout {
            report_id: 0x05,
            header: vec![],
            trailer: vec![],
        })
        .encode(9, info.report_len())
        .unwrap();

        let err = frame_report("/dev/hidraw0", &info, &report).unwrap_err();
        assert!(matches!(
            err,
            AppError::ReportIdMismatch {
                id: 0x05,
                expected: 0x02,
                ..
            }
        ));
    }
}
