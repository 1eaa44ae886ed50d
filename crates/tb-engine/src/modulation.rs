//! Block-rate modulation matrix: two tempo-synced LFOs and two AD envelopes.

use tb_ir::{
    as_index, LfoShape, ModDestination, ModParams, ModSource, LFO_DIVISIONS, MOD_DESTINATIONS,
    MOD_SOURCES,
};

use crate::dsp::envelope::AdEnvelope;
use crate::dsp::noise::Rng;
use crate::dsp::oscillator::triangle;

/// Readable matrix state: per-destination sums and raw source outputs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModOutputs {
    pub values: [f32; MOD_DESTINATIONS],
    pub raw: [f32; MOD_SOURCES],
}

impl Default for ModOutputs {
    fn default() -> Self {
        Self { values: [0.0; MOD_DESTINATIONS], raw: [0.0; MOD_SOURCES] }
    }
}

impl ModOutputs {
    #[inline]
    pub fn value(&self, dest: ModDestination) -> f32 {
        self.values[dest as usize]
    }

    /// `base` moved by the modulation on `dest`, clamped to the destination range.
    #[inline]
    pub fn modulated_value(&self, dest: ModDestination, base: f32) -> f32 {
        if dest == ModDestination::None {
            return base;
        }
        let (min, max, scale) = dest.range();
        (base + self.value(dest) * scale).clamp(min, max)
    }
}

#[derive(Clone, Debug)]
pub struct ModMatrix {
    lfo_phase: [f64; 2],
    lfo_held: [f32; 2],
    rng: Rng,
    envs: [AdEnvelope; 2],
    was_active: bool,
    outputs: ModOutputs,
}

impl Default for ModMatrix {
    fn default() -> Self {
        Self::new()
    }
}

fn lfo_rate_dest(i: usize) -> ModDestination {
    if i == 0 { ModDestination::Lfo1Rate } else { ModDestination::Lfo2Rate }
}

fn amount_dest(source: ModSource) -> ModDestination {
    match source {
        ModSource::Lfo1 => ModDestination::Lfo1Amount,
        ModSource::Lfo2 => ModDestination::Lfo2Amount,
        ModSource::Env1 => ModDestination::Env1Amount,
        ModSource::Env2 => ModDestination::Env2Amount,
    }
}

impl ModMatrix {
    pub fn new() -> Self {
        Self {
            lfo_phase: [0.0; 2],
            lfo_held: [0.0; 2],
            rng: Rng::new(0x1F0A_57C3),
            envs: [AdEnvelope::default(), AdEnvelope::default()],
            was_active: false,
            outputs: ModOutputs::default(),
        }
    }

    /// Restart LFO phases and envelopes (transport start).
    pub fn reset(&mut self) {
        self.lfo_phase = [0.0; 2];
        self.lfo_held = [0.0; 2];
        for env in &mut self.envs {
            env.reset();
        }
        self.was_active = false;
        self.outputs = ModOutputs::default();
    }

    pub fn outputs(&self) -> &ModOutputs {
        &self.outputs
    }

    #[inline]
    pub fn value(&self, dest: ModDestination) -> f32 {
        self.outputs.value(dest)
    }

    #[inline]
    pub fn modulated_value(&self, dest: ModDestination, base: f32) -> f32 {
        self.outputs.modulated_value(dest, base)
    }

    fn lfo_output(&self, i: usize, shape: LfoShape) -> f32 {
        let p = self.lfo_phase[i] as f32;
        match shape {
            LfoShape::Triangle => triangle(p),
            LfoShape::Saw => 2.0 * p - 1.0,
            LfoShape::Square => {
                if p < 0.5 { 1.0 } else { -1.0 }
            }
            LfoShape::SampleAndHold => self.lfo_held[i],
        }
    }

    /// Compute this block's outputs, then advance the sources by `frames`.
    pub fn update(
        &mut self,
        params: &ModParams,
        active_voices: usize,
        frames: usize,
        samples_per_beat: f64,
        sample_rate: f32,
    ) {
        let active = active_voices > 0;
        if active && !self.was_active {
            for env in &mut self.envs {
                env.trigger();
            }
        }
        self.was_active = active;

        let dt_ms = frames as f32 * 1000.0 / sample_rate.max(1.0);
        let shapes = [
            LfoShape::from_index(as_index(params.lfo1_shape)),
            LfoShape::from_index(as_index(params.lfo2_shape)),
        ];
        let mut raw = [0.0f32; MOD_SOURCES];
        raw[0] = self.lfo_output(0, shapes[0]);
        raw[1] = self.lfo_output(1, shapes[1]);
        raw[2] = self.envs[0].advance(dt_ms, params.env1_attack, params.env1_decay);
        raw[3] = self.envs[1].advance(dt_ms, params.env2_attack, params.env2_decay);

        // one level of cross-modulation from raw outputs
        let mut values = [0.0f32; MOD_DESTINATIONS];
        for source in ModSource::ALL {
            let (dest, depth) = params.route(source);
            if dest.is_cross_mod() {
                values[dest as usize] += raw[source as usize] * depth;
            }
        }
        for v in values.iter_mut() {
            *v = v.clamp(-1.0, 1.0);
        }
        let cross = ModOutputs { values, raw };

        for source in ModSource::ALL {
            let (dest, depth) = params.route(source);
            if dest == ModDestination::None || dest.is_cross_mod() {
                continue;
            }
            let amount = cross.modulated_value(amount_dest(source), 1.0);
            values[dest as usize] += raw[source as usize] * depth * amount;
        }
        for (i, v) in values.iter_mut().enumerate() {
            if !ModDestination::from_index(i).is_cross_mod() {
                *v = v.clamp(-1.0, 1.0);
            }
        }
        self.outputs = ModOutputs { values, raw };

        let rates = [params.lfo1_rate, params.lfo2_rate];
        for i in 0..2 {
            let beats = LFO_DIVISIONS
                .get(as_index(rates[i]))
                .map_or(1.0, |d| d.1);
            let octaves = cross.modulated_value(lfo_rate_dest(i), 0.0);
            let period = beats * samples_per_beat.max(1.0);
            let inc = frames as f64 / period * libm::exp2(octaves as f64);
            let next = self.lfo_phase[i] + inc;
            if next >= 1.0 {
                self.lfo_held[i] = self.rng.next_bipolar();
            }
            self.lfo_phase[i] = next - libm::floor(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SR: f32 = 48_000.0;
    const SPB: f64 = 24_000.0;

    #[test]
    fn idle_matrix_outputs_nothing() {
        let mut m = ModMatrix::new();
        m.update(&ModParams::default(), 0, 256, SPB, SR);
        assert!(m.outputs().values.iter().all(|&v| v == 0.0));
        assert_eq!(m.modulated_value(ModDestination::Cutoff, 0.3), 0.3);
    }

    #[test]
    fn envelope_triggers_on_first_voice() {
        let mut p = ModParams::default();
        p.set_route(ModSource::Env1, ModDestination::Cutoff, 1.0);
        p.env1_attack = 0.0;
        let mut m = ModMatrix::new();
        m.update(&p, 0, 256, SPB, SR);
        assert_eq!(m.value(ModDestination::Cutoff), 0.0);
        m.update(&p, 1, 256, SPB, SR);
        assert!(m.value(ModDestination::Cutoff) > 0.9);
        assert!(m.outputs().raw[ModSource::Env1 as usize] > 0.9);
    }

    #[test]
    fn square_lfo_flips_after_half_period() {
        let mut p = ModParams::default();
        // "1/4": one beat per cycle
        p.lfo1_rate = 6.0;
        p.lfo1_shape = 2.0;
        p.set_route(ModSource::Lfo1, ModDestination::Pan, 0.5);
        let mut m = ModMatrix::new();
        m.update(&p, 0, 12_000, SPB, SR);
        assert_eq!(m.value(ModDestination::Pan), 0.5);
        m.update(&p, 0, 12_000, SPB, SR);
        assert_eq!(m.value(ModDestination::Pan), -0.5);
    }

    #[test]
    fn amount_cross_mod_scales_depth() {
        let mut p = ModParams::default();
        p.lfo1_shape = 2.0;
        p.set_route(ModSource::Lfo1, ModDestination::Timbre, 0.5);
        p.env1_attack = 0.0;
        p.set_route(ModSource::Env1, ModDestination::Lfo1Amount, -1.0);
        let mut m = ModMatrix::new();
        m.update(&p, 1, 64, SPB, SR);
        // env at 1.0 pulls the LFO amount to zero
        assert_eq!(m.value(ModDestination::Timbre), 0.0);
    }

    #[test]
    fn reset_restarts_sources() {
        let mut p = ModParams::default();
        p.set_route(ModSource::Env2, ModDestination::Morph, 1.0);
        let mut m = ModMatrix::new();
        m.update(&p, 1, 4800, SPB, SR);
        m.reset();
        assert_eq!(m.outputs(), &ModOutputs::default());
    }

    proptest! {
        #[test]
        fn modulated_value_stays_in_range(
            dests in prop::collection::vec(0usize..16, 4),
            depths in prop::collection::vec(-1.0f32..=1.0, 4),
            shapes in prop::collection::vec(0usize..4, 2),
            voices in prop::collection::vec(0usize..4, 1..16),
            base in -100.0f32..100.0,
        ) {
            let mut p = ModParams::default();
            for (i, s) in ModSource::ALL.into_iter().enumerate() {
                p.set_route(s, ModDestination::from_index(dests[i]), depths[i]);
            }
            p.lfo1_shape = shapes[0] as f32;
            p.lfo2_shape = shapes[1] as f32;
            p.env1_attack = 0.0;
            let mut m = ModMatrix::new();
            for n in voices {
                m.update(&p, n, 512, SPB, SR);
                for d in ModDestination::ALL {
                    let v = m.modulated_value(d, base);
                    if d != ModDestination::None {
                        let (min, max, _) = d.range();
                        prop_assert!(v >= min && v <= max);
                    }
                }
                prop_assert!(m.outputs().values.iter().all(|v| v.abs() <= 1.0));
            }
        }
    }
}
