//! Virtual-analog synth: three oscillators and noise into a shared ladder.
//!
//! The ladder and its envelope are shared by all voices (paraphonic). The
//! filter envelope opens on every note-on and closes once no voice is held.
//! Mono mode glides between overlapping notes without retriggering.

use tb_ir::{as_index, AnalogParams, EffectCommand, EngineParams, InstrumentKind, ModDestination, ModParams, MAX_EFFECTS};

use crate::dsp::envelope::{Adsr, Stage};
use crate::dsp::filter::{cutoff_to_hz, Ladder};
use crate::dsp::noise::Rng;
use crate::dsp::oscillator::Waveform;
use crate::dsp::pan_gains;
use crate::frequency::note_to_increment;
use crate::modulation::{ModMatrix, ModOutputs};
use crate::processors::{Processor, MAX_VOICES};
use crate::tracker_fx::{FxEvent, TrackerFx};
use crate::voice_pool::{PoolVoice, VoiceHandle, VoicePool};

/// Keeps the summed oscillators near unity before the filter.
const MIX_SCALE: f32 = 0.35;

#[derive(Clone, Copy, Debug)]
struct Osc {
    wave: Waveform,
    /// Semitones from octave and detune
    offset: f32,
    level: f32,
}

#[derive(Clone, Copy, Debug)]
struct Block {
    oscs: [Osc; 3],
    noise: f32,
    pitch_offset: f32,
}

#[derive(Clone, Debug)]
struct AnalogVoice {
    fx: TrackerFx,
    amp: Adsr,
    velocity: f32,
    phases: [f32; 3],
    /// Remaining glide in semitones
    glide: f32,
    glide_step: f32,
    /// Next note-on continues the sounding note
    legato: bool,
}

impl AnalogVoice {
    fn new(sample_rate: f32) -> Self {
        Self {
            fx: TrackerFx::plain(60.0, 1.0, sample_rate),
            amp: Adsr::new(sample_rate),
            velocity: 0.0,
            phases: [0.0; 3],
            glide: 0.0,
            glide_step: 0.0,
            legato: false,
        }
    }

    fn is_held(&self) -> bool {
        matches!(self.amp.stage(), Stage::Attack | Stage::Decay | Stage::Sustain)
    }

    /// One mono sample. Returns the fx event so the caller can gate the
    /// shared filter envelope.
    #[inline]
    fn next(&mut self, block: &Block, rng: &mut Rng, sample_rate: f32) -> (f32, FxEvent) {
        let event = self.fx.advance();
        match event {
            FxEvent::NoteOn if self.legato => self.legato = false,
            FxEvent::NoteOn => {
                self.amp.gate_on();
                self.phases = [0.0; 3];
            }
            FxEvent::NoteOff => self.amp.gate_off(),
            FxEvent::Cut => self.amp.kill(),
            FxEvent::None => {}
        }
        if self.amp.is_idle() {
            return (0.0, event);
        }
        if self.glide != 0.0 {
            self.glide = if self.glide > 0.0 {
                (self.glide - self.glide_step).max(0.0)
            } else {
                (self.glide + self.glide_step).min(0.0)
            };
        }

        let pitch = self.fx.pitch() + self.glide + block.pitch_offset;
        let mut sum = 0.0;
        for (osc, phase) in block.oscs.iter().zip(self.phases.iter_mut()) {
            if osc.level <= 0.0 {
                continue;
            }
            let inc = note_to_increment(pitch + osc.offset, sample_rate);
            sum += osc.wave.sample(*phase, inc) * osc.level;
            *phase += inc;
            if *phase >= 1.0 {
                *phase -= 1.0;
            }
        }
        if block.noise > 0.0 {
            sum += rng.next_bipolar() * block.noise;
        }
        let a = self.amp.next() * self.velocity * self.fx.gain();
        (sum * a * MIX_SCALE, event)
    }
}

impl PoolVoice for AnalogVoice {
    fn release(&mut self) {
        self.fx.release();
        self.amp.gate_off();
    }

    fn kill(&mut self) {
        self.fx.release();
        self.amp.kill();
        self.legato = false;
        self.glide = 0.0;
    }

    fn is_finished(&self) -> bool {
        !self.fx.is_pending() && self.amp.is_idle()
    }
}

#[derive(Debug)]
pub struct Analog {
    params: AnalogParams,
    modulation: ModParams,
    matrix: ModMatrix,
    pool: VoicePool<AnalogVoice>,
    ladder: Ladder,
    filter_env: Adsr,
    rng: Rng,
    /// The single voice in mono mode
    mono: Option<VoiceHandle>,
    sample_rate: f32,
    samples_per_tick: f64,
}

impl Analog {
    pub fn new(sample_rate: f32) -> Self {
        let mut a = Self {
            params: AnalogParams::default(),
            modulation: ModParams::default(),
            matrix: ModMatrix::new(),
            pool: VoicePool::new(MAX_VOICES, || AnalogVoice::new(sample_rate)),
            ladder: Ladder::default(),
            filter_env: Adsr::new(sample_rate),
            rng: Rng::new(0xA11A_0C5E),
            mono: None,
            sample_rate,
            samples_per_tick: sample_rate as f64 / 8.0,
        };
        a.configure();
        a
    }

    pub fn is_mono(&self) -> bool {
        as_index(self.params.mode) == 1
    }

    fn configure(&mut self) {
        let p = self.params;
        let polyphony = if self.is_mono() { 1 } else { as_index(p.polyphony) };
        self.pool.set_polyphony(polyphony);
        for v in self.pool.voices_mut() {
            v.amp.set_params(p.attack, p.decay, p.sustain, p.release);
        }
        self.filter_env.set_params(p.filter_attack, p.filter_decay, p.filter_sustain, p.filter_release);
    }

    fn block(&self) -> Block {
        let p = &self.params;
        let osc = |wave: f32, octave: f32, detune: f32, level: f32| Osc {
            wave: Waveform::from_index(as_index(wave)),
            offset: octave * 12.0 + detune / 100.0,
            level,
        };
        Block {
            oscs: [
                osc(p.osc1_wave, p.osc1_octave, p.osc1_detune, p.osc1_level),
                osc(p.osc2_wave, p.osc2_octave, p.osc2_detune, p.osc2_level),
                osc(p.osc3_wave, p.osc3_octave, p.osc3_detune, p.osc3_level),
            ],
            noise: p.noise,
            pitch_offset: self.matrix.modulated_value(ModDestination::Pitch, 0.0),
        }
    }

    /// Continue the held mono voice at a new pitch. Returns its handle.
    fn legato_note(
        &mut self,
        note: u8,
        velocity: f32,
        effects: &[EffectCommand; MAX_EFFECTS],
        previous: Option<f32>,
    ) -> Option<VoiceHandle> {
        let handle = self.mono?;
        let glide_samples = self.params.glide * 0.001 * self.sample_rate;
        let (spt, sr) = (self.samples_per_tick, self.sample_rate);
        let voice = self.pool.get_mut(handle)?;
        if !voice.is_held() {
            return None;
        }
        let current = voice.fx.pitch() + voice.glide;
        voice.fx = TrackerFx::new(note as f32, previous, effects, spt, sr);
        voice.velocity = velocity.clamp(0.0, 1.0);
        voice.legato = true;
        voice.glide = current - note as f32;
        voice.glide_step = if glide_samples < 1.0 { f32::MAX } else { voice.glide.abs() / glide_samples };
        Some(handle)
    }
}

impl Processor for Analog {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Analog
    }

    fn init(&mut self, sample_rate: f32) {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.pool = VoicePool::new(MAX_VOICES, || AnalogVoice::new(sample_rate));
            self.filter_env = Adsr::new(sample_rate);
            self.configure();
        }
        self.kill_all();
        self.matrix.reset();
    }

    fn note_on_with_fx(
        &mut self,
        note: u8,
        velocity: f32,
        effects: &[EffectCommand; MAX_EFFECTS],
        previous: Option<f32>,
    ) -> Option<VoiceHandle> {
        if self.is_mono() {
            if let Some(h) = self.legato_note(note, velocity, effects, previous) {
                return Some(h);
            }
        }
        let fx = TrackerFx::new(note as f32, previous, effects, self.samples_per_tick, self.sample_rate);
        let (handle, voice) = self.pool.allocate();
        voice.fx = fx;
        voice.velocity = velocity.clamp(0.0, 1.0);
        voice.glide = 0.0;
        voice.legato = false;
        if self.is_mono() {
            self.mono = Some(handle);
        }
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
        self.filter_env.kill();
        self.ladder.reset();
        self.mono = None;
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
        if self.pool.active_count() == 0 {
            return;
        }

        let block = self.block();
        let m = *self.matrix.outputs();
        let p = self.params;
        let cutoff = m.modulated_value(ModDestination::Cutoff, p.cutoff);
        let resonance = m.modulated_value(ModDestination::Resonance, p.resonance);
        let drive = m.modulated_value(ModDestination::Drive, p.drive);
        let gain = m.modulated_value(ModDestination::Volume, 1.0);
        let (gl, gr) = pan_gains(m.modulated_value(ModDestination::Pan, 0.0));
        let sr = self.sample_rate;

        for (l, r) in out_l[..frames].iter_mut().zip(out_r[..frames].iter_mut()) {
            let mut sum = 0.0;
            let mut started = false;
            let mut held = false;
            for voice in self.pool.iter_active_mut() {
                let (s, event) = voice.next(&block, &mut self.rng, sr);
                sum += s;
                started |= event == FxEvent::NoteOn;
                held |= voice.is_held();
            }
            if started {
                self.filter_env.gate_on();
            } else if !held && self.filter_env.stage() != Stage::Release {
                self.filter_env.gate_off();
            }
            let fenv = self.filter_env.next();
            self.ladder.set(cutoff_to_hz(cutoff + fenv * p.env_amount), resonance, sr);
            let y = self.ladder.process(sum, drive) * gain;
            *l += y * gl;
            *r += y * gr;
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
        EngineParams::Analog { params: self.params, modulation: self.modulation }
    }

    fn apply_params(&mut self, params: &EngineParams) {
        if let EngineParams::Analog { params, modulation } = params {
            let was_mono = self.is_mono();
            self.params = *params;
            self.modulation = *modulation;
            if was_mono != self.is_mono() {
                self.mono = None;
            }
            self.configure();
        }
    }

    fn modulation(&self) -> Option<&ModOutputs> {
        Some(self.matrix.outputs())
    }

    fn reset_modulation(&mut self) {
        self.matrix.reset();
    }
}
