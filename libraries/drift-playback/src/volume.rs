//! Volume filter
//!
//! `Gain` is the single gain cell shared between the control surface and
//! the device callback. Stored as atomic f32 bits so the audio callback
//! reads it without locking. Applied at the sample-multiplication stage,
//! never at decode.

use std::sync::atomic::{AtomicU32, Ordering};

/// Lock-free linear gain cell
///
/// Two write paths with different contracts: [`Gain::set`] is the public
/// volume control and clamps to `[0, 1]`; [`Gain::set_faded`] is the fade
/// driver's entry and stores the value as-is, so elastic curves keep their
/// overshoot all the way to the samples.
#[derive(Debug)]
pub struct Gain {
    bits: AtomicU32,
}

impl Gain {
    /// Create a gain cell, clamping the initial value to `[0, 1]`
    pub fn new(initial: f32) -> Self {
        Self {
            bits: AtomicU32::new(initial.clamp(0.0, 1.0).to_bits()),
        }
    }

    /// Current gain
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Set the gain, clamped to `[0, 1]`; takes effect on the next
    /// processed sample
    pub fn set(&self, gain: f32) {
        let clamped = if gain.is_finite() {
            gain.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.bits.store(clamped.to_bits(), Ordering::Release);
    }

    /// Set the gain without clamping (fade-driver path)
    ///
    /// Non-finite values are refused so a broken curve cannot poison the
    /// output with NaN samples.
    pub fn set_faded(&self, gain: f32) {
        if gain.is_finite() {
            self.bits.store(gain.to_bits(), Ordering::Release);
        }
    }

    /// Multiply every sample in `samples` by the current gain
    pub fn apply(&self, samples: &mut [f32]) {
        let gain = self.get();
        if (gain - 1.0).abs() < f32::EPSILON {
            return;
        }
        for sample in samples {
            *sample *= gain;
        }
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new(1.0)
    }
}
