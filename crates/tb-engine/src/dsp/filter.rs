//! Filters: TPT state-variable, 4-pole ladder, one-pole.

use core::f32::consts::PI;

/// Map a normalised 0..1 control to 20 Hz ..= 20 kHz, exponentially.
#[inline]
pub fn cutoff_to_hz(x: f32) -> f32 {
    20.0 * libm::powf(1000.0, x.clamp(0.0, 1.0))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SvfOutputs {
    pub lowpass: f32,
    pub bandpass: f32,
    pub highpass: f32,
}

/// Topology-preserving-transform state-variable filter.
#[derive(Clone, Debug)]
pub struct Svf {
    ic1eq: f32,
    ic2eq: f32,
    g: f32,
    k: f32,
}

impl Default for Svf {
    fn default() -> Self {
        Self::new()
    }
}

impl Svf {
    pub fn new() -> Self {
        Self { ic1eq: 0.0, ic2eq: 0.0, g: 0.5, k: 2.0 }
    }

    /// Resonance 0..1 (1 = near self-oscillation).
    pub fn set(&mut self, cutoff_hz: f32, resonance: f32, sample_rate: f32) {
        let fc = cutoff_hz.clamp(10.0, sample_rate * 0.49);
        self.g = libm::tanf(PI * fc / sample_rate);
        self.k = 2.0 - 1.96 * resonance.clamp(0.0, 1.0);
    }

    pub fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> SvfOutputs {
        let h = 1.0 / (1.0 + self.g * (self.g + self.k));
        let v3 = x - self.ic2eq;
        let v1 = h * (self.ic1eq + self.g * v3);
        let v2 = self.ic2eq + self.g * v1;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;
        SvfOutputs {
            lowpass: v2,
            bandpass: v1,
            highpass: x - self.k * v1 - v2,
        }
    }
}

/// Four cascaded one-poles with saturated global feedback.
#[derive(Clone, Debug, Default)]
pub struct Ladder {
    stages: [f32; 4],
    g: f32,
    feedback: f32,
}

impl Ladder {
    pub fn set(&mut self, cutoff_hz: f32, resonance: f32, sample_rate: f32) {
        let fc = cutoff_hz.clamp(10.0, sample_rate * 0.45);
        self.g = 1.0 - libm::expf(-2.0 * PI * fc / sample_rate);
        self.feedback = resonance.clamp(0.0, 1.0) * 3.9;
    }

    pub fn reset(&mut self) {
        self.stages = [0.0; 4];
    }

    #[inline]
    pub fn process(&mut self, x: f32, drive: f32) -> f32 {
        let input = libm::tanhf(x * (1.0 + drive * 4.0) - self.feedback * self.stages[3]);
        let s = &mut self.stages;
        s[0] += self.g * (input - s[0]);
        s[1] += self.g * (s[0] - s[1]);
        s[2] += self.g * (s[1] - s[2]);
        s[3] += self.g * (s[2] - s[3]);
        // resonance pulls the passband down; compensate
        s[3] * (1.0 + self.feedback * 0.5)
    }
}

/// One-pole lowpass, used for smoothing and band splits.
#[derive(Clone, Debug, Default)]
pub struct OnePole {
    z: f32,
    a: f32,
}

impl OnePole {
    pub fn set(&mut self, cutoff_hz: f32, sample_rate: f32) {
        self.a = 1.0 - libm::expf(-2.0 * PI * cutoff_hz.max(1.0) / sample_rate);
    }

    pub fn reset(&mut self) {
        self.z = 0.0;
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        self.z += self.a * (x - self.z);
        self.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    fn sine_rms(f: impl FnMut(f32) -> f32, hz: f32) -> f32 {
        let mut f = f;
        let n = 4800;
        let mut acc = 0.0;
        for i in 0..n {
            let x = (2.0 * PI * hz * i as f32 / SR).sin();
            let y = f(x);
            if i >= n / 2 {
                acc += y * y;
            }
        }
        (acc / (n / 2) as f32).sqrt()
    }

    #[test]
    fn svf_lowpass_attenuates_highs() {
        let mut svf = Svf::new();
        svf.set(500.0, 0.0, SR);
        let low = sine_rms(|x| svf.process(x).lowpass, 100.0);
        svf.reset();
        let high = sine_rms(|x| svf.process(x).lowpass, 8000.0);
        assert!(low > 0.6);
        assert!(high < 0.05);
    }

    #[test]
    fn svf_highpass_attenuates_lows() {
        let mut svf = Svf::new();
        svf.set(2000.0, 0.0, SR);
        let low = sine_rms(|x| svf.process(x).highpass, 50.0);
        assert!(low < 0.05);
    }

    #[test]
    fn ladder_is_stable_at_full_resonance() {
        let mut ladder = Ladder::default();
        ladder.set(1000.0, 1.0, SR);
        let mut peak = 0.0f32;
        for i in 0..48_000 {
            let x = if i % 100 == 0 { 1.0 } else { 0.0 };
            peak = peak.max(ladder.process(x, 1.0).abs());
        }
        assert!(peak.is_finite());
        assert!(peak < 10.0);
    }

    #[test]
    fn one_pole_converges() {
        let mut lp = OnePole::default();
        lp.set(100.0, SR);
        let mut y = 0.0;
        for _ in 0..48_000 {
            y = lp.process(1.0);
        }
        assert!((y - 1.0).abs() < 1e-3);
    }

    #[test]
    fn cutoff_mapping_endpoints() {
        assert!((cutoff_to_hz(0.0) - 20.0).abs() < 1e-3);
        assert!((cutoff_to_hz(1.0) - 20_000.0).abs() < 1.0);
    }
}
