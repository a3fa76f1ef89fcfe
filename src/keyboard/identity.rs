// SPDX-License-Identifier: GPL-3.0-only
//! Identity filter for the keyboard a session binds to

use std::fmt;

use crate::error::{AppError, Result};

/// (vendor, product, usage page, usage) of the raw HID interface to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub usage_page: u16,
    pub usage: u8,
}

impl DeviceIdentity {
    /// Build an identity from the hex strings stored in the configuration
    pub fn parse(vendor_id: &str, product_id: &str, usage_page: u16, usage: u8) -> Result<Self> {
        Ok(Self {
            vendor_id: parse_hex_u16("vendor id", vendor_id)?,
            product_id: parse_hex_u16("product id", product_id)?,
            usage_page,
            usage,
        })
    }

    /// Check if a hidapi DeviceInfo matches this identity
    pub fn matches(&self, info: &hidapi::DeviceInfo) -> bool {
        self.matches_ids(info.vendor_id(), info.product_id(), info.usage_page(), info.usage())
    }

    pub fn matches_ids(&self, vendor_id: u16, product_id: u16, usage_page: u16, usage: u16) -> bool {
        vendor_id == self.vendor_id
            && product_id == self.product_id
            && usage_page == self.usage_page
            && usage == u16::from(self.usage)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:04x} (usage page {:#06x}, usage {:#04x})",
            self.vendor_id, self.product_id, self.usage_page, self.usage
        )
    }
}

fn parse_hex_u16(field: &'static str, value: &str) -> Result<u16> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    // from_str_radix accepts a leading '+', hex ids never have one
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::InvalidIdentity {
            field,
            value: value.to_string(),
        });
    }

    u16::from_str_radix(digits, 16).map_err(|_| AppError::InvalidIdentity {
        field,
        value: value.to_string(),
    })
}
