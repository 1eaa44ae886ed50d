//! One six-operator voice.

use tb_ir::fm_patch::OPERATORS;
use tb_ir::{FmOperator, FmPatch};

use super::algorithms::Algorithm;
use super::envelope::{level_to_amp, FmEnvelope};
use super::lfo::{LfoOut, AMP_SENS, PITCH_SENS};
use crate::dsp::oscillator::{sine, wrap};
use crate::dsp::pan_gains;
use crate::frequency::{cents_to_ratio, note_to_hz};
use crate::tracker_fx::{FxEvent, TrackerFx};
use crate::voice_pool::PoolVoice;

/// Phase offset in cycles for a full-scale modulator.
const MOD_DEPTH: f32 = 2.0;
/// Note of keyboard break point 0 (A-1).
const BREAKPOINT_BASE: f32 = 21.0;

/// Level offset from keyboard level scaling, in patch units.
pub fn keyboard_scaling(op: &FmOperator, note: f32) -> f32 {
    let d = note - (op.kbd_breakpoint as f32 + BREAKPOINT_BASE);
    let (depth, curve) = if d < 0.0 {
        (op.kbd_left_depth, op.kbd_left_curve)
    } else {
        (op.kbd_right_depth, op.kbd_right_curve)
    };
    let x = (d.abs() / 48.0).min(2.0);
    let shape = match curve {
        1 | 2 => (libm::expf(x * 3.0) - 1.0) / (libm::expf(3.0) - 1.0),
        _ => x,
    };
    let amount = depth as f32 * shape;
    if curve >= 2 { amount } else { -amount }
}

/// Frequency ratio, or the fixed frequency in Hz when `fixed`.
pub fn operator_frequency(op: &FmOperator) -> (f32, bool) {
    let detune = cents_to_ratio(op.detune as f32 - 7.0);
    if op.osc_mode == 1 {
        let hz = libm::powf(10.0, (op.freq_coarse & 3) as f32 + op.freq_fine as f32 / 100.0);
        (hz * detune, true)
    } else {
        let coarse = if op.freq_coarse == 0 { 0.5 } else { op.freq_coarse as f32 };
        (coarse * (1.0 + op.freq_fine as f32 / 100.0) * detune, false)
    }
}

#[derive(Clone, Debug, Default)]
struct Operator {
    phase: f32,
    env: FmEnvelope,
    /// Output level plus keyboard scaling, patch units
    level: f32,
    velocity_gain: f32,
    amp_sens: f32,
    freq: f32,
    fixed: bool,
    out: f32,
}

#[derive(Clone, Debug)]
pub struct FmVoice {
    pub fx: TrackerFx,
    pub velocity: f32,
    ops: [Operator; OPERATORS],
    pitch_eg: FmEnvelope,
    algorithm: Algorithm,
    enabled: u8,
    feedback_scale: f32,
    history: [f32; 2],
    transpose: f32,
    pitch_sens: f32,
    gains: (f32, f32),
}

impl FmVoice {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            fx: TrackerFx::plain(60.0, 1.0, sample_rate),
            velocity: 0.0,
            ops: Default::default(),
            pitch_eg: FmEnvelope::default(),
            algorithm: *Algorithm::get(0),
            enabled: 0,
            feedback_scale: 0.0,
            history: [0.0; 2],
            transpose: 0.0,
            pitch_sens: 0.0,
            gains: (0.0, 0.0),
        }
    }

    /// Load the patch for the note being started.
    fn start(&mut self, patch: &FmPatch, sample_rate: f32) {
        self.algorithm = *Algorithm::get(patch.algorithm);
        self.enabled = patch.op_enable;
        self.feedback_scale = if patch.feedback == 0 {
            0.0
        } else {
            libm::exp2f(patch.feedback as f32 - 7.0)
        };
        self.transpose = patch.transpose as f32 - 24.0;
        self.pitch_sens = PITCH_SENS[(patch.lfo.pitch_mod_sens as usize).min(7)];
        self.gains = pan_gains(self.fx.pan().unwrap_or(0.0));

        let key = self.fx.base_pitch() + self.transpose;
        let sync = patch.osc_key_sync != 0;
        for (op, setup) in self.ops.iter_mut().zip(patch.operators.iter()) {
            let rate_boost = setup.rate_scaling as f32 * (key - BREAKPOINT_BASE).max(0.0) / 24.0;
            op.env.configure(setup.eg_rates, setup.eg_levels, rate_boost, sample_rate);
            op.env.trigger();
            op.level = if setup.output_level == 0 {
                0.0
            } else {
                (setup.output_level as f32 + keyboard_scaling(setup, key)).clamp(0.0, 127.0)
            };
            op.velocity_gain = 1.0 - setup.velocity_sens as f32 / 7.0 * (1.0 - self.velocity);
            op.amp_sens = AMP_SENS[(setup.amp_mod_sens as usize).min(3)];
            (op.freq, op.fixed) = operator_frequency(setup);
            if sync {
                op.phase = 0.0;
                op.out = 0.0;
            }
        }
        if sync {
            self.history = [0.0; 2];
        }
        self.pitch_eg.configure(patch.pitch_eg_rates, patch.pitch_eg_levels, 0.0, sample_rate);
        self.pitch_eg.trigger();
    }

    fn release_envelopes(&mut self) {
        for op in &mut self.ops {
            op.env.release();
        }
        self.pitch_eg.release();
    }

    fn carriers_done(&self) -> bool {
        self.ops
            .iter()
            .enumerate()
            .filter(|(i, _)| self.algorithm.is_carrier(*i) && self.enabled & (1 << i) != 0)
            .all(|(_, op)| op.env.is_finished())
    }

    /// One stereo sample.
    #[inline]
    pub fn next(&mut self, patch: &FmPatch, lfo: LfoOut, sample_rate: f32) -> (f32, f32) {
        match self.fx.advance() {
            FxEvent::NoteOn => self.start(patch, sample_rate),
            FxEvent::NoteOff => self.release_envelopes(),
            FxEvent::Cut => PoolVoice::kill(self),
            FxEvent::None => {}
        }
        if self.carriers_done() {
            return (0.0, 0.0);
        }

        let pitch_eg = (self.pitch_eg.next() - 50.0) * 48.0 / 50.0;
        let pitch = self.fx.pitch() + self.transpose + pitch_eg + lfo.pitch * self.pitch_sens;
        let base_hz = note_to_hz(pitch);
        let inv_sr = 1.0 / sample_rate;
        let fb_op = self.algorithm.feedback as usize - 1;

        let mut mix = 0.0;
        for i in (0..OPERATORS).rev() {
            let level = self.ops[i].env.next();
            if self.enabled & (1 << i) == 0 {
                self.ops[i].out = 0.0;
                continue;
            }
            let mask = self.algorithm.modulators[i];
            let mut modulation = 0.0;
            for j in (i + 1)..OPERATORS {
                if mask & (1 << j) != 0 {
                    modulation += self.ops[j].out;
                }
            }
            if i == fb_op {
                modulation += (self.history[0] + self.history[1]) * 0.5 * self.feedback_scale * 0.5;
            }

            let op = &mut self.ops[i];
            let amp = level_to_amp(level + op.level - 99.0) * op.velocity_gain * (1.0 - op.amp_sens * lfo.amp);
            let out = sine(wrap(op.phase + modulation * MOD_DEPTH)) * amp;
            let hz = if op.fixed { op.freq } else { base_hz * op.freq };
            op.phase = wrap(op.phase + hz * inv_sr);
            op.out = out;
            if i == fb_op {
                self.history = [self.history[1], out];
            }
            if self.algorithm.is_carrier(i) {
                mix += out;
            }
        }

        let scale = self.velocity * self.fx.gain() / libm::sqrtf(self.algorithm.carrier_count() as f32);
        let s = mix * scale;
        (s * self.gains.0, s * self.gains.1)
    }
}

impl PoolVoice for FmVoice {
    fn release(&mut self) {
        self.fx.release();
        self.release_envelopes();
    }

    fn kill(&mut self) {
        self.fx.release();
        for op in &mut self.ops {
            op.env.kill();
        }
        self.pitch_eg.kill();
    }

    fn is_finished(&self) -> bool {
        !self.fx.is_pending() && self.carriers_done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_and_fixed_frequencies() {
        let mut op = FmOperator { freq_coarse: 0, detune: 7, ..FmOperator::default() };
        assert_eq!(operator_frequency(&op), (0.5, false));
        op.freq_coarse = 2;
        op.freq_fine = 50;
        assert_eq!(operator_frequency(&op), (3.0, false));
        op.osc_mode = 1;
        op.freq_coarse = 2;
        op.freq_fine = 0;
        let (hz, fixed) = operator_frequency(&op);
        assert!(fixed);
        assert!((hz - 100.0).abs() < 1e-2);
    }

    #[test]
    fn keyboard_scaling_curves() {
        let mut op = FmOperator { kbd_breakpoint: 39, kbd_left_depth: 40, kbd_right_depth: 40, ..FmOperator::default() };
        // breakpoint is C-3 (note 60)
        assert_eq!(keyboard_scaling(&op, 60.0), 0.0);
        op.kbd_right_curve = 0;
        assert!((keyboard_scaling(&op, 108.0) + 40.0).abs() < 1e-4);
        op.kbd_right_curve = 3;
        assert!((keyboard_scaling(&op, 108.0) - 40.0).abs() < 1e-4);
        op.kbd_left_curve = 1;
        let exp = keyboard_scaling(&op, 36.0);
        assert!(exp < 0.0 && exp > -20.0 * 0.5);
    }
}
