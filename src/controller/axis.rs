//! Axis normalization pipeline
//!
//! Turns one raw [`AxisSample`] into a [`ControlSignal`]:
//!
//! ```text
//! raw i16 ──► / 32767 ──► hard deadzone ──► throttle = -left_y
//!                                       └─► steering = right_x if nonzero else left_x
//! ```
//!
//! The latest signal is published through a lock-free [`ControlSignalCell`].

use std::sync::atomic::{AtomicU64, Ordering};

/// Largest positive raw axis magnitude
pub const AXIS_MAX: f32 = 32767.0;

/// Default hard deadzone on the normalized scale
pub const DEFAULT_DEADZONE: f32 = 0.1;

/// Raw stick readings in device-native units, read fresh each tick.
///
/// Vertical axes follow the hardware convention: pushing a stick forward
/// yields a negative value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisSample {
    pub left_x: i16,
    pub left_y: i16,
    pub right_x: i16,
}

/// Normalized drive command, both components in [-1.0, 1.0]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlSignal {
    pub throttle: f32,
    pub steering: f32,
}

/// Scales a raw value onto [-1.0, 1.0]. `i16::MIN` is clamped to -1.0.
pub fn normalize_raw(raw: i16) -> f32 {
    (f32::from(raw) / AXIS_MAX).clamp(-1.0, 1.0)
}

/// Hard cutoff: magnitudes below `threshold` become exactly 0.0, everything
/// else passes through unscaled.
pub fn apply_deadzone(value: f32, threshold: f32) -> f32 {
    if value.abs() < threshold {
        0.0
    } else {
        value
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AxisNormalizer {
    deadzone: f32,
}

impl Default for AxisNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_DEADZONE)
    }
}

impl AxisNormalizer {
    pub fn new(deadzone: f32) -> Self {
        Self { deadzone }
    }

    pub fn deadzone(&self) -> f32 {
        self.deadzone
    }

    /// Normalized and deadzoned value of one raw axis
    pub fn normalize(&self, raw: i16) -> f32 {
        apply_deadzone(normalize_raw(raw), self.deadzone)
    }

    pub fn control_signal(&self, sample: &AxisSample) -> ControlSignal {
        let left_y = self.normalize(sample.left_y);
        let right_x = self.normalize(sample.right_x);
        let left_x = self.normalize(sample.left_x);

        // Forward is negative on the wire, positive on the output
        let throttle = if left_y == 0.0 { 0.0 } else { -left_y };

        // Right stick wins whenever it carries any signal
        let steering = if right_x.abs() > 0.0 { right_x } else { left_x };

        ControlSignal { throttle, steering }
    }
}

/// Single-writer, many-reader snapshot of the latest [`ControlSignal`].
///
/// Both components are packed into one `AtomicU64`, so a reader never sees a
/// torn pair and never blocks the writer.
#[derive(Debug, Default)]
pub struct ControlSignalCell {
    bits: AtomicU64,
}

impl ControlSignalCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, signal: ControlSignal) {
        let packed =
            (u64::from(signal.throttle.to_bits()) << 32) | u64::from(signal.steering.to_bits());
        self.bits.store(packed, Ordering::Release);
    }

    pub fn load(&self) -> ControlSignal {
        let packed = self.bits.load(Ordering::Acquire);
        ControlSignal {
            throttle: f32::from_bits((packed >> 32) as u32),
            steering: f32::from_bits(packed as u32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-6;

    fn sample(left_x: i16, left_y: i16, right_x: i16) -> AxisSample {
        AxisSample {
            left_x,
            left_y,
            right_x,
        }
    }

    #[test]
    fn values_inside_deadzone_are_exactly_zero() {
        let normalizer = AxisNormalizer::default();
        // 3276 / 32767 is just below 0.1
        for raw in [0, 1, -1, 1000, -1000, 3276, -3276] {
            assert_eq!(normalizer.normalize(raw), 0.0, "raw {raw}");
        }
    }

    #[test]
    fn values_outside_deadzone_are_unscaled() {
        let normalizer = AxisNormalizer::default();
        for raw in [3277i16, -3277, 16000, -16000, 32767] {
            let expected = f32::from(raw) / AXIS_MAX;
            assert!((normalizer.normalize(raw) - expected).abs() < EPS, "raw {raw}");
        }
        assert_eq!(normalizer.normalize(i16::MIN), -1.0);
    }

    #[test]
    fn throttle_is_positive_forward() {
        let normalizer = AxisNormalizer::default();
        assert!(normalizer.control_signal(&sample(0, 16000, 0)).throttle < 0.0);
        assert!(normalizer.control_signal(&sample(0, -16000, 0)).throttle > 0.0);
        assert_eq!(normalizer.control_signal(&sample(0, 100, 0)).throttle, 0.0);
    }

    #[test]
    fn steering_falls_back_to_left_stick() {
        let normalizer = AxisNormalizer::default();
        let half = (AXIS_MAX * 0.5) as i16;

        let signal = normalizer.control_signal(&sample(half, 0, 0));
        assert!((signal.steering - 0.5).abs() < 1e-4);

        // Right-stick noise below the deadzone does not count as signal
        let signal = normalizer.control_signal(&sample(half, 0, 2000));
        assert!((signal.steering - 0.5).abs() < 1e-4);
    }

    #[test]
    fn right_stick_wins_when_active() {
        let normalizer = AxisNormalizer::default();
        let half = (AXIS_MAX * 0.5) as i16;
        let third = (AXIS_MAX * 0.3) as i16;

        let signal = normalizer.control_signal(&sample(half, 0, third));
        assert!((signal.steering - 0.3).abs() < 1e-4);

        let signal = normalizer.control_signal(&sample(half, 0, -third));
        assert!((signal.steering + 0.3).abs() < 1e-4);
    }

    #[test]
    fn custom_deadzone_is_respected() {
        let normalizer = AxisNormalizer::new(0.5);
        assert_eq!(normalizer.normalize(16000), 0.0);
        assert!(normalizer.normalize(20000) > 0.5);
    }

    #[test]
    fn cell_round_trips_latest_signal() {
        let cell = ControlSignalCell::new();
        assert_eq!(cell.load(), ControlSignal::default());

        let signal = ControlSignal {
            throttle: -0.75,
            steering: 0.25,
        };
        cell.store(signal);
        assert_eq!(cell.load(), signal);
    }
}
