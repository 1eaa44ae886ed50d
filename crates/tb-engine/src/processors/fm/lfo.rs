//! The patch LFO, shared by every voice of an FM instrument.

use core::f32::consts::TAU;

use tb_ir::FmLfo;

use crate::dsp::noise::Rng;
use crate::dsp::oscillator::triangle;

/// Pitch depth in semitones per pitch-mod sensitivity step.
pub const PITCH_SENS: [f32; 8] = [0.0, 0.16, 0.32, 0.5, 1.0, 2.0, 4.0, 12.0];
/// Fraction of full amplitude modulation per amp-mod sensitivity step.
pub const AMP_SENS: [f32; 4] = [0.0, 0.3, 0.6, 1.0];

/// LFO rate in Hz for a speed setting (0-99).
#[inline]
pub fn speed_to_hz(speed: u8) -> f32 {
    0.0625 * libm::exp2f(speed as f32 / 10.1)
}

#[derive(Clone, Debug)]
pub struct Lfo {
    phase: f32,
    held: f32,
    /// Seconds since the last reset, for the delay fade-in
    age: f32,
    rng: Rng,
}

impl Default for Lfo {
    fn default() -> Self {
        Self { phase: 0.0, held: 0.0, age: 0.0, rng: Rng::new(0x00DF_0A5E) }
    }
}

/// One LFO sample scaled for the voices.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LfoOut {
    /// -1..1 after delay fade-in, times pitch depth
    pub pitch: f32,
    /// 0..1 after delay fade-in, times amp depth
    pub amp: f32,
}

impl Lfo {
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.age = 0.0;
        self.held = self.rng.next_bipolar();
    }

    fn wave(&self, wave: u8) -> f32 {
        let p = self.phase;
        match wave {
            1 => 1.0 - 2.0 * p,
            2 => 2.0 * p - 1.0,
            3 => {
                if p < 0.5 { 1.0 } else { -1.0 }
            }
            4 => libm::sinf(TAU * p),
            5 => self.held,
            _ => triangle(p),
        }
    }

    /// Current output, then advance one sample.
    #[inline]
    pub fn next(&mut self, lfo: &FmLfo, sample_rate: f32) -> LfoOut {
        let delay_s = lfo.delay as f32 / 99.0 * 4.0;
        let fade = if delay_s <= 0.0 { 1.0 } else { (self.age / delay_s).min(1.0) };
        let w = self.wave(lfo.wave) * fade;
        let out = LfoOut {
            pitch: w * lfo.pitch_mod_depth as f32 / 99.0,
            amp: (w * 0.5 + 0.5) * lfo.amp_mod_depth as f32 / 99.0,
        };

        let dt = 1.0 / sample_rate.max(1.0);
        self.age = (self.age + dt).min(8.0);
        self.phase += speed_to_hz(lfo.speed) * dt;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
            self.held = self.rng.next_bipolar();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 1000.0;

    fn settings(wave: u8, delay: u8) -> FmLfo {
        FmLfo { speed: 50, delay, pitch_mod_depth: 99, amp_mod_depth: 99, key_sync: 0, wave, pitch_mod_sens: 3 }
    }

    #[test]
    fn speed_range() {
        assert!(speed_to_hz(0) < 0.1);
        assert!(speed_to_hz(99) > 40.0);
        assert!(speed_to_hz(50) > speed_to_hz(49));
    }

    #[test]
    fn delay_fades_in() {
        let mut lfo = Lfo::default();
        lfo.reset();
        let s = settings(3, 99);
        let early = lfo.next(&s, SR).pitch.abs();
        for _ in 0..4000 {
            lfo.next(&s, SR);
        }
        let late = lfo.next(&s, SR).pitch.abs();
        assert!(early < 0.01);
        assert!((late - 1.0).abs() < 1e-3);
    }

    #[test]
    fn amp_output_is_unipolar() {
        for wave in 0..6 {
            let mut lfo = Lfo::default();
            let s = settings(wave, 0);
            for _ in 0..2000 {
                let o = lfo.next(&s, SR);
                assert!((0.0..=1.0).contains(&o.amp), "wave {wave}");
                assert!((-1.0..=1.0).contains(&o.pitch), "wave {wave}");
            }
        }
    }
}
