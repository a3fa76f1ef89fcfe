// SPDX-License-Identifier: GPL-3.0-only
//! Light sensor with a reading set by the test

use std::sync::{Arc, Mutex};

use super::LightSensor;
use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct FakeSensor {
    lux: Arc<Mutex<Option<f64>>>,
    reads: Arc<Mutex<usize>>,
    present: bool,
}

impl FakeSensor {
    pub fn new(lux: f64) -> Self {
        Self {
            lux: Arc::new(Mutex::new(Some(lux))),
            reads: Arc::default(),
            present: true,
        }
    }

    pub fn absent() -> Self {
        Self {
            present: false,
            ..Self::new(0.0)
        }
    }

    pub fn set(&self, lux: f64) {
        *self.lux.lock().unwrap() = Some(lux);
    }

    /// Make subsequent reads fail
    pub fn fail(&self) {
        *self.lux.lock().unwrap() = None;
    }

    pub fn read_count(&self) -> usize {
        *self.reads.lock().unwrap()
    }
}

impl LightSensor for FakeSensor {
    fn describe(&self) -> String {
        "fake sensor".to_string()
    }

    fn is_present(&self) -> bool {
        self.present
    }

    fn read_lux(&mut self) -> Result<f64> {
        *self.reads.lock().unwrap() += 1;
        self.lux
            .lock()
            .unwrap()
            .ok_or_else(|| AppError::Sensor("simulated failure".into()))
    }
}
