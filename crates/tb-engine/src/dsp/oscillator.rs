//! Band-limited oscillator primitives. Phases are in cycles (0..1).

use core::f32::consts::TAU;

/// PolyBLEP residual for a discontinuity at phase 0.
#[inline]
pub fn poly_blep(phase: f32, inc: f32) -> f32 {
    if inc <= 0.0 {
        return 0.0;
    }
    if phase < inc {
        let t = phase / inc;
        t + t - t * t - 1.0
    } else if phase > 1.0 - inc {
        let t = (phase - 1.0) / inc;
        t * t + t + t + 1.0
    } else {
        0.0
    }
}

#[inline]
pub fn sine(phase: f32) -> f32 {
    libm::sinf(TAU * phase)
}

#[inline]
pub fn saw(phase: f32, inc: f32) -> f32 {
    2.0 * phase - 1.0 - poly_blep(phase, inc)
}

/// Pulse with variable width (0.5 = square).
#[inline]
pub fn pulse(phase: f32, inc: f32, width: f32) -> f32 {
    let w = width.clamp(0.05, 0.95);
    let mut v = if phase < w { 1.0 } else { -1.0 };
    v += poly_blep(phase, inc);
    let mut shifted = phase - w;
    if shifted < 0.0 {
        shifted += 1.0;
    }
    v - poly_blep(shifted, inc)
}

#[inline]
pub fn triangle(phase: f32) -> f32 {
    if phase < 0.5 {
        4.0 * phase - 1.0
    } else {
        3.0 - 4.0 * phase
    }
}

/// Wrap a phase into 0..1.
#[inline]
pub fn wrap(phase: f32) -> f32 {
    phase - libm::floorf(phase)
}

/// Basic waveform selector shared by the analog engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Waveform {
    #[default]
    Saw,
    Square,
    Triangle,
    Sine,
}

impl Waveform {
    pub fn from_index(i: usize) -> Self {
        match i {
            1 => Waveform::Square,
            2 => Waveform::Triangle,
            3 => Waveform::Sine,
            _ => Waveform::Saw,
        }
    }

    #[inline]
    pub fn sample(self, phase: f32, inc: f32) -> f32 {
        match self {
            Waveform::Saw => saw(phase, inc),
            Waveform::Square => pulse(phase, inc, 0.5),
            Waveform::Triangle => triangle(phase),
            Waveform::Sine => sine(phase),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_stay_bounded() {
        let inc = 0.01;
        let mut phase = 0.0;
        for _ in 0..1000 {
            for w in [Waveform::Saw, Waveform::Square, Waveform::Triangle, Waveform::Sine] {
                let v = w.sample(phase, inc);
                assert!(v.abs() <= 1.1, "{w:?} {v}");
            }
            phase = wrap(phase + inc);
        }
    }

    #[test]
    fn wrap_handles_negative() {
        assert!((wrap(-0.25) - 0.75).abs() < 1e-6);
        assert!((wrap(3.5) - 0.5).abs() < 1e-6);
    }
}
