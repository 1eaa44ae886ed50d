//! Amplitude/filter envelopes.

/// Level below which a releasing envelope counts as finished.
const SILENCE: f32 = 1.0e-4;

/// Natural log of 1000: a -60 dB exponential decay in `t` seconds has
/// per-sample coefficient exp(-LN_1000 / (t * sr)).
const LN_1000: f32 = 6.907_755;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

fn decay_coef(ms: f32, sample_rate: f32) -> f32 {
    let samples = (ms * 0.001 * sample_rate).max(1.0);
    libm::expf(-LN_1000 / samples)
}

/// Linear-attack, exponential decay/release ADSR, per sample.
#[derive(Clone, Debug)]
pub struct Adsr {
    stage: Stage,
    level: f32,
    attack_inc: f32,
    decay_coef: f32,
    sustain: f32,
    release_coef: f32,
    sample_rate: f32,
}

impl Adsr {
    pub fn new(sample_rate: f32) -> Self {
        let mut env = Self {
            stage: Stage::Idle,
            level: 0.0,
            attack_inc: 1.0,
            decay_coef: 0.0,
            sustain: 1.0,
            release_coef: 0.0,
            sample_rate,
        };
        env.set_params(1.0, 100.0, 1.0, 50.0);
        env
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    /// Times in milliseconds, sustain 0..1.
    pub fn set_params(&mut self, attack_ms: f32, decay_ms: f32, sustain: f32, release_ms: f32) {
        let attack_samples = attack_ms * 0.001 * self.sample_rate;
        self.attack_inc = if attack_samples < 1.0 { 1.0 } else { 1.0 / attack_samples };
        self.decay_coef = decay_coef(decay_ms, self.sample_rate);
        self.sustain = sustain.clamp(0.0, 1.0);
        self.release_coef = decay_coef(release_ms, self.sample_rate);
    }

    /// Start (or restart from the current level).
    pub fn gate_on(&mut self) {
        self.stage = Stage::Attack;
    }

    pub fn gate_off(&mut self) {
        if self.stage != Stage::Idle {
            self.stage = Stage::Release;
        }
    }

    /// Drop to silence immediately.
    pub fn kill(&mut self) {
        self.stage = Stage::Idle;
        self.level = 0.0;
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        match self.stage {
            Stage::Idle => {}
            Stage::Attack => {
                self.level += self.attack_inc;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                self.level = self.sustain + (self.level - self.sustain) * self.decay_coef;
                if self.level - self.sustain < SILENCE {
                    self.level = self.sustain;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {
                self.level = self.sustain;
                if self.sustain <= 0.0 {
                    self.stage = Stage::Idle;
                }
            }
            Stage::Release => {
                self.level *= self.release_coef;
                if self.level < SILENCE {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }
}

/// Attack/decay envelope evaluated at block rate (modulation source).
#[derive(Clone, Debug, Default)]
pub struct AdEnvelope {
    /// Elapsed ms since trigger; `None` when idle
    elapsed_ms: Option<f32>,
    value: f32,
}

impl AdEnvelope {
    pub fn trigger(&mut self) {
        self.elapsed_ms = Some(0.0);
    }

    pub fn reset(&mut self) {
        self.elapsed_ms = None;
        self.value = 0.0;
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn is_active(&self) -> bool {
        self.elapsed_ms.is_some()
    }

    /// Advance by `dt_ms` and return the new value (0..1).
    pub fn advance(&mut self, dt_ms: f32, attack_ms: f32, decay_ms: f32) -> f32 {
        let Some(t) = self.elapsed_ms else {
            self.value = 0.0;
            return 0.0;
        };
        self.value = if t < attack_ms {
            t / attack_ms
        } else {
            let d = (t - attack_ms) / decay_ms.max(1.0);
            if d >= 1.0 {
                self.elapsed_ms = None;
                0.0
            } else {
                1.0 - d
            }
        };
        if let Some(e) = self.elapsed_ms.as_mut() {
            *e += dt_ms;
        }
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    #[test]
    fn adsr_reaches_sustain_and_finishes() {
        let mut env = Adsr::new(SR);
        env.set_params(1.0, 10.0, 0.5, 10.0);
        env.gate_on();
        for _ in 0..50 {
            env.next();
        }
        assert_eq!(env.stage(), Stage::Decay);
        for _ in 0..4800 {
            env.next();
        }
        assert_eq!(env.stage(), Stage::Sustain);
        assert_eq!(env.level(), 0.5);

        env.gate_off();
        for _ in 0..4800 {
            env.next();
        }
        assert!(env.is_idle());
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn zero_attack_jumps_to_peak() {
        let mut env = Adsr::new(SR);
        env.set_params(0.0, 100.0, 1.0, 10.0);
        env.gate_on();
        assert_eq!(env.next(), 1.0);
    }

    #[test]
    fn gate_off_on_idle_stays_idle() {
        let mut env = Adsr::new(SR);
        env.gate_off();
        assert!(env.is_idle());
    }

    #[test]
    fn zero_sustain_ends_after_decay() {
        let mut env = Adsr::new(SR);
        env.set_params(0.0, 5.0, 0.0, 5.0);
        env.gate_on();
        for _ in 0..2000 {
            env.next();
        }
        assert!(env.is_idle());
    }

    #[test]
    fn ad_envelope_shape() {
        let mut env = AdEnvelope::default();
        assert_eq!(env.advance(1.0, 10.0, 10.0), 0.0);
        env.trigger();
        assert_eq!(env.advance(5.0, 10.0, 10.0), 0.0);
        assert_eq!(env.advance(5.0, 10.0, 10.0), 0.5);
        assert_eq!(env.advance(5.0, 10.0, 10.0), 1.0);
        assert_eq!(env.advance(5.0, 10.0, 10.0), 0.5);
        assert_eq!(env.advance(5.0, 10.0, 10.0), 0.0);
        assert!(!env.is_active());
    }
}
