//! Macro oscillator: sixteen synthesis models behind three macro controls.

pub mod algorithms;

use tb_ir::{as_index, EffectCommand, EngineParams, InstrumentKind, MacroOscParams, ModDestination, ModParams, MAX_EFFECTS};

use crate::dsp::envelope::Adsr;
use crate::dsp::filter::{cutoff_to_hz, Svf};
use crate::dsp::pan_gains;
use crate::frequency::{note_to_hz, note_to_increment};
use crate::modulation::{ModMatrix, ModOutputs};
use crate::processors::{apply_fx_event, Processor, MAX_VOICES};
use crate::tracker_fx::TrackerFx;
use crate::voice_pool::{PoolVoice, VoiceHandle, VoicePool};

pub use algorithms::{AlgoState, Shape, ALGORITHM_NAMES};

/// Block-constant values shared by every voice.
#[derive(Clone, Copy, Debug)]
struct BlockParams {
    algorithm: usize,
    shape: Shape,
    pitch_offset: f32,
    cutoff: f32,
    resonance: f32,
    filter_open: bool,
    gain: f32,
    pan: f32,
}

#[derive(Clone, Debug)]
struct MacroVoice {
    fx: TrackerFx,
    amp: Adsr,
    velocity: f32,
    algo: AlgoState,
    filter: Svf,
    sample_rate: f32,
}

impl MacroVoice {
    fn new(sample_rate: f32, seed: u32) -> Self {
        Self {
            fx: TrackerFx::plain(60.0, 1.0, sample_rate),
            amp: Adsr::new(sample_rate),
            velocity: 0.0,
            algo: AlgoState::new(sample_rate, seed),
            filter: Svf::new(),
            sample_rate,
        }
    }

    fn render(&mut self, block: &BlockParams, out_l: &mut [f32], out_r: &mut [f32]) {
        let hz = note_to_hz(self.fx.pitch() + block.pitch_offset);
        self.algo.prepare(block.algorithm, &block.shape, hz);
        if !block.filter_open {
            self.filter.set(block.cutoff, block.resonance, self.sample_rate);
        }
        let (gl, gr) = pan_gains(self.fx.pan().unwrap_or(0.0) + block.pan);

        for (l, r) in out_l.iter_mut().zip(out_r.iter_mut()) {
            if apply_fx_event(self.fx.advance(), &mut self.amp) {
                self.algo.trigger(block.algorithm, &block.shape);
                self.filter.reset();
            }
            if self.amp.is_idle() {
                continue;
            }
            let inc = note_to_increment(self.fx.pitch() + block.pitch_offset, self.sample_rate);
            let mut s = self.algo.next(block.algorithm, &block.shape, inc);
            if !block.filter_open {
                s = self.filter.process(s).lowpass;
            }
            let a = self.amp.next() * self.velocity * self.fx.gain() * block.gain;
            *l += s * a * gl;
            *r += s * a * gr;
        }

        if self.algo.is_silent(block.algorithm) {
            self.amp.kill();
        }
    }
}

impl PoolVoice for MacroVoice {
    fn release(&mut self) {
        self.fx.release();
        self.amp.gate_off();
    }

    fn kill(&mut self) {
        self.fx.release();
        self.amp.kill();
    }

    fn is_finished(&self) -> bool {
        !self.fx.is_pending() && self.amp.is_idle()
    }
}

#[derive(Debug)]
pub struct MacroOsc {
    params: MacroOscParams,
    modulation: ModParams,
    matrix: ModMatrix,
    pool: VoicePool<MacroVoice>,
    sample_rate: f32,
    samples_per_tick: f64,
}

impl MacroOsc {
    pub fn new(sample_rate: f32) -> Self {
        let mut seed = 0x5EED_0001u32;
        let mut osc = Self {
            params: MacroOscParams::default(),
            modulation: ModParams::default(),
            matrix: ModMatrix::new(),
            pool: VoicePool::new(MAX_VOICES, || {
                seed = seed.wrapping_mul(747_796_405).wrapping_add(1);
                MacroVoice::new(sample_rate, seed)
            }),
            sample_rate,
            samples_per_tick: sample_rate as f64 / 8.0,
        };
        osc.configure_voices();
        osc
    }

    pub fn params(&self) -> &MacroOscParams {
        &self.params
    }

    fn configure_voices(&mut self) {
        let p = self.params;
        self.pool.set_polyphony(as_index(p.polyphony));
        for v in self.pool.voices_mut() {
            v.amp.set_params(p.attack, p.decay, p.sustain, p.release);
        }
    }

    fn block_params(&self) -> BlockParams {
        let m = self.matrix.outputs();
        let p = &self.params;
        let cutoff = m.modulated_value(ModDestination::Cutoff, p.cutoff);
        BlockParams {
            algorithm: as_index(p.algorithm).min(ALGORITHM_NAMES.len() - 1),
            shape: Shape {
                harmonics: m.modulated_value(ModDestination::Harmonics, p.harmonics),
                timbre: m.modulated_value(ModDestination::Timbre, p.timbre),
                morph: m.modulated_value(ModDestination::Morph, p.morph),
            },
            pitch_offset: m.modulated_value(ModDestination::Pitch, 0.0),
            cutoff: cutoff_to_hz(cutoff),
            resonance: m.modulated_value(ModDestination::Resonance, p.resonance),
            filter_open: cutoff >= 1.0 && m.value(ModDestination::Resonance) == 0.0 && p.resonance == 0.0,
            gain: m.modulated_value(ModDestination::Volume, 1.0) * 0.5,
            pan: m.modulated_value(ModDestination::Pan, 0.0),
        }
    }
}

impl Processor for MacroOsc {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::MacroOsc
    }

    fn init(&mut self, sample_rate: f32) {
        if sample_rate != self.sample_rate {
            let params = self.engine_params();
            *self = Self::new(sample_rate);
            self.apply_params(&params);
        } else {
            self.kill_all();
            self.matrix.reset();
        }
    }

    fn note_on_with_fx(
        &mut self,
        note: u8,
        velocity: f32,
        effects: &[EffectCommand; MAX_EFFECTS],
        previous: Option<f32>,
    ) -> Option<VoiceHandle> {
        let fx = TrackerFx::new(note as f32, previous, effects, self.samples_per_tick, self.sample_rate);
        let (handle, voice) = self.pool.allocate();
        voice.fx = fx;
        voice.velocity = velocity.clamp(0.0, 1.0);
        Some(handle)
    }

    fn note_off(&mut self, voice: VoiceHandle) {
        self.pool.release(voice);
    }

    fn all_notes_off(&mut self) {
        self.pool.release_all();
    }

    fn kill_all(&mut self) {
        self.pool.kill_all();
    }

    fn render(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        self.pool.reap();
        let frames = out_l.len().min(out_r.len());
        self.matrix.update(
            &self.modulation,
            self.pool.active_count(),
            frames,
            self.samples_per_tick * 24.0,
            self.sample_rate,
        );
        let block = self.block_params();
        for voice in self.pool.iter_active_mut() {
            voice.render(&block, &mut out_l[..frames], &mut out_r[..frames]);
        }
    }

    fn active_voices(&self) -> usize {
        self.pool.active_count()
    }

    fn set_samples_per_tick(&mut self, samples_per_tick: f64) {
        self.samples_per_tick = samples_per_tick.max(1.0);
        for v in self.pool.voices_mut() {
            v.fx.set_samples_per_tick(self.samples_per_tick);
        }
    }

    fn engine_params(&self) -> EngineParams {
        EngineParams::MacroOsc { params: self.params, modulation: self.modulation }
    }

    fn apply_params(&mut self, params: &EngineParams) {
        if let EngineParams::MacroOsc { params, modulation } = params {
            self.params = *params;
            self.modulation = *modulation;
            self.configure_voices();
        }
    }

    fn modulation(&self) -> Option<&ModOutputs> {
        Some(self.matrix.outputs())
    }

    fn reset_modulation(&mut self) {
        self.matrix.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_ir::ModSource;

    const SR: f32 = 48_000.0;

    fn run(osc: &mut MacroOsc, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut l = vec![0.0; frames];
        let mut r = vec![0.0; frames];
        for (cl, cr) in l.chunks_mut(256).zip(r.chunks_mut(256)) {
            osc.render(cl, cr);
        }
        (l, r)
    }

    // === Voices ===

    #[test]
    fn polyphony_limit_steals_oldest() {
        let mut osc = MacroOsc::new(SR);
        osc.set_parameter(10, 2.0);
        let a = osc.note_on(60, 1.0).unwrap();
        osc.note_on(64, 1.0).unwrap();
        osc.note_on(67, 1.0).unwrap();
        assert_eq!(osc.active_voices(), 2);
        // the stolen handle is stale now
        osc.note_off(a);
        assert_eq!(osc.active_voices(), 2);
    }

    #[test]
    fn released_voice_finishes_after_tail() {
        let mut osc = MacroOsc::new(SR);
        osc.set_parameter(7, 5.0);
        let v = osc.note_on(48, 0.8).unwrap();
        run(&mut osc, 2048);
        osc.note_off(v);
        let (l, _) = run(&mut osc, SR as usize / 2);
        assert!(l[..256].iter().any(|s| s.abs() > 1.0e-4));
        run(&mut osc, 256);
        assert_eq!(osc.active_voices(), 0);
    }

    #[test]
    fn drum_algorithm_frees_its_voice() {
        let mut osc = MacroOsc::new(SR);
        osc.set_parameter(0, 13.0);
        osc.set_parameter(3, 0.0);
        osc.note_on(36, 1.0);
        run(&mut osc, SR as usize);
        run(&mut osc, 256);
        assert_eq!(osc.active_voices(), 0);
    }

    // === Modulation ===

    #[test]
    fn pan_modulation_moves_the_image() {
        let mut osc = MacroOsc::new(SR);
        if let EngineParams::MacroOsc { params, mut modulation } = osc.engine_params() {
            modulation.set_route(ModSource::Env1, ModDestination::Pan, 1.0);
            modulation.env1_attack = 0.0;
            modulation.env1_decay = 10_000.0;
            osc.apply_params(&EngineParams::MacroOsc { params, modulation });
        }
        osc.note_on(60, 1.0);
        let (l, r) = run(&mut osc, 4096);
        let energy = |x: &[f32]| x[2048..].iter().map(|s| s * s).sum::<f32>();
        assert!(energy(&r) > energy(&l) * 10.0);
        assert!(osc.modulation().unwrap().value(ModDestination::Pan) > 0.9);
    }

    #[test]
    fn closed_filter_darkens_output() {
        let bright = {
            let mut osc = MacroOsc::new(SR);
            osc.note_on(72, 1.0);
            run(&mut osc, 4096).0
        };
        let dark = {
            let mut osc = MacroOsc::new(SR);
            osc.set_parameter(8, 0.1);
            osc.note_on(72, 1.0);
            run(&mut osc, 4096).0
        };
        let peak = |x: &[f32]| x[1024..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak(&dark) < peak(&bright) * 0.5);
    }
}
