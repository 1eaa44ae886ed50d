//! DSP building blocks shared by the instrument processors and the mixer.

pub mod bus;
pub mod envelope;
pub mod filter;
pub mod insert;
pub mod noise;
pub mod oscillator;

pub use bus::FxBuses;
pub use envelope::{AdEnvelope, Adsr, Stage};
pub use filter::{cutoff_to_hz, Ladder, OnePole, Svf};
pub use insert::InsertChain;
pub use noise::Rng;
pub use oscillator::Waveform;

/// Equal-power pan gains for pan in -1..1.
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * core::f32::consts::FRAC_PI_4;
    (libm::cosf(angle), libm::sinf(angle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pan_centre_is_equal_power() {
        let (l, r) = pan_gains(0.0);
        assert!((l - r).abs() < 1e-6);
        assert!((l * l + r * r - 1.0).abs() < 1e-5);
        let (l, r) = pan_gains(-1.0);
        assert!((l - 1.0).abs() < 1e-6 && r.abs() < 1e-6);
    }
}
