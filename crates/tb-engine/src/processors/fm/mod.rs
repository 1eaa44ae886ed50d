//! Six-operator FM synth driven by a patch in the classic 156-byte layout.
//!
//! Parameters are the raw patch bytes; the decoded [`FmPatch`] is refreshed
//! whenever they change. The LFO is shared by every voice.

pub mod algorithms;
pub mod envelope;
pub mod lfo;
pub mod voice;

use tb_ir::{EffectCommand, EngineParams, FmParams, FmPatch, InstrumentKind, PatchError, MAX_EFFECTS};

use self::lfo::Lfo;
use self::voice::FmVoice;
use crate::processors::Processor;
use crate::tracker_fx::TrackerFx;
use crate::voice_pool::{VoiceHandle, VoicePool};

/// Voices per FM instrument.
pub const FM_VOICES: usize = 16;

#[derive(Debug)]
pub struct FmSynth {
    params: FmParams,
    patch: FmPatch,
    lfo: Lfo,
    pool: VoicePool<FmVoice>,
    sample_rate: f32,
    samples_per_tick: f64,
}

impl FmSynth {
    pub fn new(sample_rate: f32) -> Self {
        let params = FmParams::default();
        Self {
            patch: params.patch(),
            params,
            lfo: Lfo::default(),
            pool: VoicePool::new(FM_VOICES, || FmVoice::new(sample_rate)),
            sample_rate,
            samples_per_tick: sample_rate as f64 / 8.0,
        }
    }

    /// Replace the patch from a 155/156-byte unpacked or 128-byte packed
    /// buffer. On error the current patch is kept.
    pub fn import_patch(&mut self, bytes: &[u8]) -> Result<(), PatchError> {
        self.params.import(bytes)?;
        self.patch = self.params.patch();
        Ok(())
    }

    pub fn patch(&self) -> &FmPatch {
        &self.patch
    }
}

impl Processor for FmSynth {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Fm
    }

    fn init(&mut self, sample_rate: f32) {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.pool = VoicePool::new(FM_VOICES, || FmVoice::new(sample_rate));
        }
        self.kill_all();
        self.lfo.reset();
    }

    fn note_on_with_fx(
        &mut self,
        note: u8,
        velocity: f32,
        effects: &[EffectCommand; MAX_EFFECTS],
        previous: Option<f32>,
    ) -> Option<VoiceHandle> {
        if self.pool.active_count() == 0 || self.patch.lfo.key_sync != 0 {
            self.lfo.reset();
        }
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
        if self.pool.active_count() == 0 {
            return;
        }
        let sr = self.sample_rate;
        for (l, r) in out_l.iter_mut().zip(out_r.iter_mut()) {
            let lfo = self.lfo.next(&self.patch.lfo, sr);
            for voice in self.pool.iter_active_mut() {
                let (vl, vr) = voice.next(&self.patch, lfo, sr);
                *l += vl;
                *r += vr;
            }
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
        EngineParams::Fm { params: self.params }
    }

    fn apply_params(&mut self, params: &EngineParams) {
        if let EngineParams::Fm { params } = params {
            if *params != self.params {
                self.params = *params;
                self.patch = self.params.patch();
            }
        }
    }
}
