//! Four-rate, four-level operator envelope.
//!
//! Levels are in patch units (0-99). The envelope rises or falls toward
//! L1, L2 and L3 in turn, holds L3 while the key is down, then moves to L4
//! on release. One level step is 0.75 dB.

/// Level speed in units per second at rate 0; doubles every 8 rate steps.
const BASE_SPEED: f32 = 2.5;

/// Amplitude of a total level in patch units (99 = full scale).
#[inline]
pub fn level_to_amp(level: f32) -> f32 {
    if level <= 0.0 {
        0.0
    } else {
        libm::exp2f((level.min(127.0) - 99.0) / 8.0)
    }
}

/// Units per second for a rate (0-99 plus rate scaling).
#[inline]
pub fn rate_to_speed(rate: f32) -> f32 {
    BASE_SPEED * libm::exp2f(rate / 8.0)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Idle,
    /// Moving toward level index 0..=2; index 2 holds
    Attack(u8),
    Release,
}

#[derive(Clone, Debug, Default)]
pub struct FmEnvelope {
    /// Units per sample
    steps: [f32; 4],
    levels: [f32; 4],
    phase: Phase,
    level: f32,
}

impl FmEnvelope {
    /// `rate_boost` is added to every rate (keyboard rate scaling).
    pub fn configure(&mut self, rates: [u8; 4], levels: [u8; 4], rate_boost: f32, sample_rate: f32) {
        for i in 0..4 {
            self.steps[i] = rate_to_speed(rates[i] as f32 + rate_boost) / sample_rate.max(1.0);
            self.levels[i] = levels[i] as f32;
        }
    }

    /// Key down. A fresh envelope starts from L4; a sounding one continues
    /// from its current level.
    pub fn trigger(&mut self) {
        if self.phase == Phase::Idle {
            self.level = self.levels[3];
        }
        self.phase = Phase::Attack(0);
    }

    pub fn release(&mut self) {
        if self.phase != Phase::Idle {
            self.phase = Phase::Release;
        }
    }

    pub fn kill(&mut self) {
        self.phase = Phase::Idle;
        self.level = 0.0;
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Idle
    }

    fn approach(&mut self, target: f32, step: f32) -> bool {
        if self.level < target {
            self.level = (self.level + step).min(target);
        } else {
            self.level = (self.level - step).max(target);
        }
        self.level == target
    }

    /// Advance one sample; returns the level.
    #[inline]
    pub fn next(&mut self) -> f32 {
        match self.phase {
            Phase::Idle => {}
            Phase::Attack(i) => {
                let i = i as usize;
                if self.approach(self.levels[i], self.steps[i]) && i < 2 {
                    self.phase = Phase::Attack(i as u8 + 1);
                }
            }
            Phase::Release => {
                if self.approach(self.levels[3], self.steps[3]) {
                    self.phase = Phase::Idle;
                }
            }
        }
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SR: f32 = 1000.0;

    #[test]
    fn amplitude_scale() {
        assert_relative_eq!(level_to_amp(99.0), 1.0);
        assert_relative_eq!(level_to_amp(91.0), 0.5);
        assert_eq!(level_to_amp(0.0), 0.0);
    }

    #[test]
    fn walks_levels_then_holds() {
        let mut env = FmEnvelope::default();
        env.configure([99, 99, 99, 99], [99, 50, 70, 0], 0.0, SR);
        env.trigger();
        let mut last = 0.0;
        for _ in 0..200 {
            last = env.next();
        }
        assert_eq!(last, 70.0);
        assert!(!env.is_finished());
        env.release();
        for _ in 0..200 {
            env.next();
        }
        assert!(env.is_finished());
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn slow_rate_takes_longer() {
        let time_to_peak = |rate: u8| {
            let mut env = FmEnvelope::default();
            env.configure([rate, 99, 99, 99], [99, 99, 99, 0], 0.0, SR);
            env.trigger();
            (1..100_000).find(|_| env.next() >= 99.0).unwrap_or(100_000)
        };
        assert!(time_to_peak(40) > time_to_peak(80) * 20);
    }

    #[test]
    fn retrigger_continues_from_current_level() {
        let mut env = FmEnvelope::default();
        env.configure([50, 99, 99, 10], [99, 99, 99, 0], 0.0, SR);
        env.trigger();
        for _ in 0..100 {
            env.next();
        }
        let before = env.level();
        env.trigger();
        assert!(env.next() >= before);
    }
}
