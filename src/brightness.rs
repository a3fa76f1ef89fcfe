// SPDX-License-Identifier: GPL-3.0-only
//! Brightness calculation logic
//!
//! Maps an ambient light reading and the user's keyboard adjustments onto a
//! single backlight byte. Kept free of I/O so the control loop, the CLI and
//! the tests all get the same answer for the same inputs.

use crate::config::KeyboardAdjustments;

/// Lux readings below this are treated as this value
pub const DEFAULT_DARKNESS_FLOOR: f64 = 1.0;

/// Evaluates ambient light readings into backlight levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacklightLevelEvaluator {
    darkness_floor: f64,
}

impl Default for BacklightLevelEvaluator {
    fn default() -> Self {
        Self {
            darkness_floor: DEFAULT_DARKNESS_FLOOR,
        }
    }
}

impl BacklightLevelEvaluator {
    /// Create an evaluator that floors readings at `darkness_floor` lux
    ///
    /// Negative or non-finite floors fall back to 0.
    pub fn with_darkness_floor(darkness_floor: f64) -> Self {
        let darkness_floor = if darkness_floor.is_finite() && darkness_floor > 0.0 {
            darkness_floor
        } else {
            0.0
        };
        Self { darkness_floor }
    }

    #[cfg(test)]
    pub fn darkness_floor(&self) -> f64 {
        self.darkness_floor
    }

    /// Compute the backlight level for a lux reading
    ///
    /// # Arguments
    ///
    /// * `lux` - Ambient light reading; NaN and negative values count as darkness
    /// * `adjustments` - Level bounds and the lux value that saturates the output
    ///
    /// # Returns
    ///
    /// Level in `[adjustments.minimum_level, 255]`
    pub fn evaluate(&self, lux: f64, adjustments: &KeyboardAdjustments) -> u8 {
        let max_lux = f64::from(adjustments.lux_value_considered_maximum.max(1));
        let floor = self.darkness_floor.min(max_lux);

        let lux = if lux.is_nan() { floor } else { lux };
        let clamped = lux.clamp(floor, max_lux);

        let ratio = ((clamped / max_lux) * f64::from(adjustments.maximum_level)).round();
        let level = ratio.min(f64::from(u8::MAX)) as u8;

        if level < adjustments.minimum_level {
            tracing::trace!(
                lux = %clamped,
                calculated = %level,
                min = %adjustments.minimum_level,
                "Clamping backlight to minimum"
            );
            adjustments.minimum_level
        } else {
            level
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluate(lux: f64, adjustments: &KeyboardAdjustments) -> u8 {
        BacklightLevelEvaluator::default().evaluate(lux, adjustments)
    }

    fn adjustments(min: u8, max: u8, lux_max: u32) -> KeyboardAdjustments {
        KeyboardAdjustments {
            minimum_level: min,
            maximum_level: max,
            lux_value_considered_maximum: lux_max,
        }
    }

    #[test]
    fn test_floor_applies_in_darkness() {
        assert_eq!(evaluate(0.0, &adjustments(20, 255, 500)), 20);
    }

    #[test]
    fn test_saturates_at_maximum_lux() {
        assert_eq!(evaluate(500.0, &adjustments(20, 255, 500)), 255);
        assert_eq!(evaluate(20_000.0, &adjustments(20, 255, 500)), 255);
    }

    #[test]
    fn test_ratio_rounds_half_up() {
        // 0.5 * 255 = 127.5
        assert_eq!(evaluate(250.0, &adjustments(0, 255, 500)), 128);
    }

    #[test]
    fn test_maximum_level_scales_output() {
        assert_eq!(evaluate(500.0, &adjustments(0, 100, 500)), 100);
        assert_eq!(evaluate(250.0, &adjustments(0, 100, 500)), 50);
    }

    #[test]
    fn test_zero_lux_maximum_does_not_divide_by_zero() {
        assert_eq!(evaluate(0.0, &adjustments(0, 255, 0)), 255);
        assert_eq!(evaluate(10.0, &adjustments(5, 200, 0)), 200);
    }

    #[test]
    fn test_nan_and_negative_readings_count_as_darkness() {
        let adj = adjustments(7, 255, 500);
        assert_eq!(evaluate(f64::NAN, &adj), 7);
        assert_eq!(evaluate(-40.0, &adj), 7);
    }

    #[test]
    fn test_zero_floor_reaches_zero() {
        let evaluator = BacklightLevelEvaluator::with_darkness_floor(0.0);
        assert_eq!(evaluator.evaluate(0.0, &adjustments(0, 255, 500)), 0);
        // The default floor of 1 lux still rounds 0.51 up to 1
        assert_eq!(evaluate(0.0, &adjustments(0, 255, 500)), 1);
    }

    #[test]
    fn test_invalid_floor_is_ignored() {
        assert_eq!(BacklightLevelEvaluator::with_darkness_floor(-3.0).darkness_floor(), 0.0);
        assert_eq!(
            BacklightLevelEvaluator::with_darkness_floor(f64::INFINITY).darkness_floor(),
            0.0
        );
    }

    #[test]
    fn test_minimum_above_maximum_still_floors() {
        // Callers are supposed to keep min <= max; the floor still wins
        assert_eq!(evaluate(500.0, &adjustments(200, 100, 500)), 200);
    }

    #[test]
    fn test_output_within_bounds() {
        for min in [0u8, 20, 128, 255] {
            for max in [0u8, 64, 255] {
                for lux_max in [1u32, 300, 500, 2000] {
                    let adj = adjustments(min, max, lux_max);
                    for lux in [0.0, 0.5, 1.0, 99.9, 300.0, 499.0, 500.0, 1e6] {
                        let level = evaluate(lux, &adj);
                        assert!(level >= min, "{lux} {adj:?} -> {level}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_monotonic_in_lux() {
        let adj = adjustments(20, 255, 500);
        let mut previous = 0;
        for step in 0..=1200 {
            let level = evaluate(f64::from(step) * 0.5, &adj);
            assert!(level >= previous, "level dropped at {} lux", f64::from(step) * 0.5);
            previous = level;
        }
    }
}
