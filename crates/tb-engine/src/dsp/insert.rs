//! Per-instrument insert chain: filter → 3-band EQ → drive → compressor.

use tb_ir::{FilterMode, InsertParams};

use super::filter::{cutoff_to_hz, OnePole, Svf};

const LOW_SPLIT_HZ: f32 = 250.0;
const HIGH_SPLIT_HZ: f32 = 4000.0;
const COMP_ATTACK_MS: f32 = 5.0;
const COMP_RELEASE_MS: f32 = 120.0;

#[inline]
fn db_to_gain(db: f32) -> f32 {
    libm::powf(10.0, db / 20.0)
}

#[inline]
fn gain_to_db(g: f32) -> f32 {
    20.0 * libm::log10f(g.max(1.0e-6))
}

#[derive(Clone, Debug, Default)]
struct Band {
    low: OnePole,
    high: OnePole,
}

/// Runtime state of one instrument's insert chain.
#[derive(Clone, Debug)]
pub struct InsertChain {
    params: InsertParams,
    sample_rate: f32,
    filter: [Svf; 2],
    bands: [Band; 2],
    eq_gains: [f32; 3],
    drive_k: f32,
    drive_norm: f32,
    comp_env: f32,
    comp_attack: f32,
    comp_release: f32,
}

impl InsertChain {
    pub fn new(sample_rate: f32) -> Self {
        let mut chain = Self {
            params: InsertParams::default(),
            sample_rate,
            filter: [Svf::new(), Svf::new()],
            bands: [Band::default(), Band::default()],
            eq_gains: [1.0; 3],
            drive_k: 1.0,
            drive_norm: 1.0,
            comp_env: 0.0,
            comp_attack: 0.0,
            comp_release: 0.0,
        };
        chain.configure(&InsertParams::default());
        chain
    }

    /// Recompute coefficients when the parameters changed.
    pub fn configure(&mut self, params: &InsertParams) {
        let sr = self.sample_rate;
        self.params = *params;
        for f in &mut self.filter {
            f.set(cutoff_to_hz(params.filter_cutoff), params.filter_resonance, sr);
        }
        for b in &mut self.bands {
            b.low.set(LOW_SPLIT_HZ, sr);
            b.high.set(HIGH_SPLIT_HZ, sr);
        }
        self.eq_gains = [
            db_to_gain(params.eq_low),
            db_to_gain(params.eq_mid),
            db_to_gain(params.eq_high),
        ];
        self.drive_k = 1.0 + params.drive * 9.0;
        self.drive_norm = 1.0 / libm::tanhf(self.drive_k);
        self.comp_attack = libm::expf(-1.0 / (COMP_ATTACK_MS * 0.001 * sr));
        self.comp_release = libm::expf(-1.0 / (COMP_RELEASE_MS * 0.001 * sr));
    }

    pub fn params(&self) -> &InsertParams {
        &self.params
    }

    pub fn reset(&mut self) {
        for f in &mut self.filter {
            f.reset();
        }
        for b in &mut self.bands {
            b.low.reset();
            b.high.reset();
        }
        self.comp_env = 0.0;
    }

    /// Process a stereo segment in place.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        if self.params.is_bypassed() {
            return;
        }
        let mode = self.params.filter();
        let eq_active = self.eq_gains.iter().any(|&g| g != 1.0);
        let drive = self.params.drive > 0.0;
        let comp = self.params.comp_ratio > 1.0;
        let threshold = self.params.comp_threshold;
        let ratio = self.params.comp_ratio;

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let mut s = [*l, *r];
            for (ch, x) in s.iter_mut().enumerate() {
                if mode != FilterMode::Off {
                    let o = self.filter[ch].process(*x);
                    *x = match mode {
                        FilterMode::LowPass => o.lowpass,
                        FilterMode::HighPass => o.highpass,
                        FilterMode::BandPass => o.bandpass,
                        FilterMode::Off => *x,
                    };
                }
                if eq_active {
                    let band = &mut self.bands[ch];
                    let low = band.low.process(*x);
                    let high = *x - band.high.process(*x);
                    let mid = *x - low - high;
                    *x = low * self.eq_gains[0] + mid * self.eq_gains[1] + high * self.eq_gains[2];
                }
                if drive {
                    *x = libm::tanhf(*x * self.drive_k) * self.drive_norm;
                }
            }
            if comp {
                // stereo-linked peak follower
                let peak = libm::fabsf(s[0]).max(libm::fabsf(s[1]));
                let coef = if peak > self.comp_env { self.comp_attack } else { self.comp_release };
                self.comp_env = peak + (self.comp_env - peak) * coef;
                let over = gain_to_db(self.comp_env) - threshold;
                if over > 0.0 {
                    let g = db_to_gain(-over * (1.0 - 1.0 / ratio));
                    s[0] *= g;
                    s[1] *= g;
                }
            }
            *l = s[0];
            *r = s[1];
        }
    }
}
