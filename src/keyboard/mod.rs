// SPDX-License-Identifier: GPL-3.0-only
//! Keyboard identity and per-keyboard session

mod identity;
mod session;

pub use identity::DeviceIdentity;
pub use session::{DeviceSession, SessionState};
