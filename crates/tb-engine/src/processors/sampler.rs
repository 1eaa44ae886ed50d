//! Pitched sample playback with loop modes, amp and filter envelopes.
//!
//! A loaded sample is analysed once: YIN finds its pitch, and the root
//! note becomes the nearest C. Playback is corrected so the root note
//! reproduces that C exactly.

use alloc::sync::Arc;

use tb_ir::{as_index, EffectCommand, EngineParams, InstrumentKind, ModDestination, ModParams, SamplerParams, MAX_EFFECTS};

use crate::analysis::detect_pitch;
use crate::dsp::envelope::Adsr;
use crate::dsp::filter::{cutoff_to_hz, Svf};
use crate::dsp::pan_gains;
use crate::frequency::{hz_to_note, nearest_c, semitones_to_ratio};
use crate::modulation::{ModMatrix, ModOutputs};
use crate::processors::{apply_fx_event, Processor, MAX_VOICES};
use crate::sample::SampleBuffer;
use crate::tracker_fx::{FxEvent, TrackerFx};
use crate::voice_pool::{PoolVoice, VoiceHandle, VoicePool};

/// Root note used when no pitch is detected.
pub const DEFAULT_ROOT: u8 = 60;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopMode {
    #[default]
    Off,
    Forward,
    PingPong,
}

impl LoopMode {
    pub fn from_index(i: usize) -> Self {
        match i {
            1 => LoopMode::Forward,
            2 => LoopMode::PingPong,
            _ => LoopMode::Off,
        }
    }
}

/// Pitch analysis of the loaded sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RootInfo {
    /// Detected pitch as a fractional note, if voiced
    pub detected: Option<f32>,
    pub root: u8,
    /// Rate correction mapping the detected pitch onto the root
    pub repitch: f64,
}

impl Default for RootInfo {
    fn default() -> Self {
        Self { detected: None, root: DEFAULT_ROOT, repitch: 1.0 }
    }
}

impl RootInfo {
    pub fn analyse(sample: &SampleBuffer) -> Self {
        match detect_pitch(&sample.to_mono(), sample.sample_rate()) {
            Some(hz) => {
                let detected = hz_to_note(hz);
                let root = nearest_c(detected);
                let repitch = libm::exp2((root as f64 - detected as f64) / 12.0);
                Self { detected: Some(detected), root, repitch }
            }
            None => Self::default(),
        }
    }
}

/// Block-constant region and modulation values.
#[derive(Clone, Copy, Debug)]
struct Region {
    start: f64,
    end: f64,
    loop_start: f64,
    loop_mode: LoopMode,
    /// Playback rate at the root note, before effects
    base_rate: f64,
    root: f32,
    cutoff: f32,
    resonance: f32,
    filter_env: f32,
    filter_active: bool,
    gain: f32,
    pan: f32,
    pitch_offset: f32,
}

#[derive(Clone, Debug)]
struct SamplerVoice {
    fx: TrackerFx,
    amp: Adsr,
    filter_env: Adsr,
    filter: Svf,
    velocity: f32,
    pos: f64,
    forward: bool,
    sample_rate: f32,
}

impl SamplerVoice {
    fn new(sample_rate: f32) -> Self {
        Self {
            fx: TrackerFx::plain(60.0, 1.0, sample_rate),
            amp: Adsr::new(sample_rate),
            filter_env: Adsr::new(sample_rate),
            filter: Svf::new(),
            velocity: 0.0,
            pos: 0.0,
            forward: true,
            sample_rate,
        }
    }

    fn render(&mut self, sample: &SampleBuffer, region: &Region, out_l: &mut [f32], out_r: &mut [f32]) {
        let (gl, gr) = pan_gains(self.fx.pan().unwrap_or(0.0) + region.pan);
        let sr = self.sample_rate;
        for (l, r) in out_l.iter_mut().zip(out_r.iter_mut()) {
            let event = self.fx.advance();
            match event {
                FxEvent::NoteOn => self.filter_env.gate_on(),
                FxEvent::NoteOff => self.filter_env.gate_off(),
                FxEvent::Cut => self.filter_env.kill(),
                FxEvent::None => {}
            }
            if apply_fx_event(event, &mut self.amp) {
                self.pos = region.start;
                self.forward = true;
                self.filter.reset();
            }
            if self.amp.is_idle() {
                continue;
            }

            let (mut sl, mut sr_) = sample.read(self.pos);
            let fenv = self.filter_env.next();
            if region.filter_active {
                let cutoff = cutoff_to_hz(region.cutoff + fenv * region.filter_env);
                self.filter.set(cutoff, region.resonance, sr);
                // mono filter keeps voices cheap; stereo samples are summed
                let mid = self.filter.process((sl + sr_) * 0.5).lowpass;
                sl = mid;
                sr_ = mid;
            }
            let a = self.amp.next() * self.velocity * self.fx.gain() * region.gain;
            *l += sl * a * gl;
            *r += sr_ * a * gr;

            let semis = self.fx.pitch() + region.pitch_offset - region.root;
            let step = region.base_rate * libm::exp2(semis as f64 / 12.0);
            self.advance(step, region);
            if self.pos < 0.0 {
                self.amp.kill();
            }
        }
    }

    fn advance(&mut self, step: f64, region: &Region) {
        if self.forward {
            self.pos += step;
        } else {
            self.pos -= step;
        }
        match region.loop_mode {
            LoopMode::Off => {
                if self.pos >= region.end {
                    self.pos = -1.0;
                }
            }
            LoopMode::Forward => {
                let len = region.end - region.loop_start;
                if len <= 0.0 {
                    self.pos = -1.0;
                } else if self.pos >= region.end {
                    self.pos = region.loop_start + (self.pos - region.end) % len;
                }
            }
            LoopMode::PingPong => {
                if region.end - region.loop_start <= 1.0 {
                    self.pos = -1.0;
                } else if self.forward && self.pos >= region.end {
                    self.pos = region.end - (self.pos - region.end);
                    self.forward = false;
                } else if !self.forward && self.pos <= region.loop_start {
                    self.pos = region.loop_start + (region.loop_start - self.pos);
                    self.forward = true;
                }
            }
        }
    }
}

impl PoolVoice for SamplerVoice {
    fn release(&mut self) {
        self.fx.release();
        self.amp.gate_off();
        self.filter_env.gate_off();
    }

    fn kill(&mut self) {
        self.fx.release();
        self.amp.kill();
        self.filter_env.kill();
    }

    fn is_finished(&self) -> bool {
        !self.fx.is_pending() && self.amp.is_idle()
    }
}

#[derive(Debug)]
pub struct Sampler {
    params: SamplerParams,
    modulation: ModParams,
    matrix: ModMatrix,
    pool: VoicePool<SamplerVoice>,
    sample: Option<Arc<SampleBuffer>>,
    root: RootInfo,
    sample_rate: f32,
    samples_per_tick: f64,
}

impl Sampler {
    pub fn new(sample_rate: f32) -> Self {
        let mut s = Self {
            params: SamplerParams::default(),
            modulation: ModParams::default(),
            matrix: ModMatrix::new(),
            pool: VoicePool::new(MAX_VOICES, || SamplerVoice::new(sample_rate)),
            sample: None,
            root: RootInfo::default(),
            sample_rate,
            samples_per_tick: sample_rate as f64 / 8.0,
        };
        s.configure_voices();
        s
    }

    pub fn root(&self) -> RootInfo {
        self.root
    }

    fn configure_voices(&mut self) {
        let p = self.params;
        self.pool.set_polyphony(as_index(p.polyphony));
        for v in self.pool.voices_mut() {
            v.amp.set_params(p.attack, p.decay, p.sustain, p.release);
            v.filter_env.set_params(p.filter_attack, p.filter_decay, p.filter_sustain, p.filter_release);
        }
    }

    fn region(&self, sample: &SampleBuffer) -> Region {
        let p = &self.params;
        let m = self.matrix.outputs();
        let frames = sample.frames() as f64;
        let start = p.start as f64 * frames;
        let end = (p.end as f64 * frames).max(start);
        let loop_start = (p.loop_start as f64 * frames).clamp(start, end);
        let native = sample.sample_rate() as f64 / self.sample_rate.max(1.0) as f64;
        let tune = semitones_to_ratio(p.tune + p.fine / 100.0) as f64;
        let cutoff = m.modulated_value(ModDestination::Cutoff, p.cutoff);
        Region {
            start,
            end,
            loop_start,
            loop_mode: LoopMode::from_index(as_index(p.loop_mode)),
            base_rate: self.root.repitch * tune * native,
            root: self.root.root as f32,
            cutoff,
            resonance: m.modulated_value(ModDestination::Resonance, p.resonance),
            filter_env: p.filter_env,
            filter_active: cutoff < 1.0 || p.filter_env != 0.0 || p.resonance > 0.0,
            gain: m.modulated_value(ModDestination::Volume, 1.0),
            pan: m.modulated_value(ModDestination::Pan, 0.0),
            pitch_offset: m.modulated_value(ModDestination::Pitch, 0.0),
        }
    }
}

impl Processor for Sampler {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Sampler
    }

    fn init(&mut self, sample_rate: f32) {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.pool = VoicePool::new(MAX_VOICES, || SamplerVoice::new(sample_rate));
            self.configure_voices();
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
        self.sample.as_ref()?;
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
        let Some(sample) = self.sample.as_ref() else {
            return;
        };
        let region = self.region(sample);
        for voice in self.pool.iter_active_mut() {
            voice.render(sample, &region, &mut out_l[..frames], &mut out_r[..frames]);
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
        EngineParams::Sampler { params: self.params, modulation: self.modulation }
    }

    fn apply_params(&mut self, params: &EngineParams) {
        if let EngineParams::Sampler { params, modulation } = params {
            self.params = *params;
            self.modulation = *modulation;
            self.configure_voices();
        }
    }

    /// Analyses pitch, so call outside the render path.
    fn set_sample(&mut self, sample: Option<Arc<SampleBuffer>>) {
        self.kill_all();
        self.root = sample.as_deref().map(RootInfo::analyse).unwrap_or_default();
        self.sample = sample;
    }

    fn sample(&self) -> Option<&Arc<SampleBuffer>> {
        self.sample.as_ref()
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
    use approx::assert_relative_eq;

    const SR: f32 = 48_000.0;

    fn sine_sample(hz: f32, frames: usize) -> Arc<SampleBuffer> {
        let data: Vec<f32> = (0..frames)
            .map(|i| libm::sinf(core::f32::consts::TAU * hz * i as f32 / SR))
            .collect();
        Arc::new(SampleBuffer::from_interleaved(&data, SR as u32, 1).unwrap())
    }

    fn ramp_sample(frames: usize) -> Arc<SampleBuffer> {
        let data: Vec<f32> = (0..frames).map(|i| i as f32 / frames as f32).collect();
        Arc::new(SampleBuffer::from_interleaved(&data, SR as u32, 1).unwrap())
    }

    fn zero_crossings(x: &[f32]) -> usize {
        x.windows(2).filter(|w| (w[0] < 0.0) != (w[1] < 0.0)).count()
    }

    fn render(s: &mut Sampler, frames: usize) -> Vec<f32> {
        let mut l = vec![0.0; frames];
        let mut r = vec![0.0; frames];
        s.render(&mut l, &mut r);
        l
    }

    // === Root detection ===

    #[test]
    fn root_snaps_to_nearest_c() {
        let info = RootInfo::analyse(&sine_sample(261.63, 24_000));
        assert_eq!(info.root, 60);
        assert_relative_eq!(info.repitch, 1.0, epsilon = 0.01);

        let info = RootInfo::analyse(&sine_sample(440.0, 24_000));
        assert_eq!(info.root, 72);
        assert!(info.repitch > 1.18 && info.repitch < 1.2);
    }

    #[test]
    fn octave_above_root_doubles_rate() {
        let mut s = Sampler::new(SR);
        s.set_sample(Some(sine_sample(261.63, 48_000)));
        s.note_on(60, 1.0);
        let root = render(&mut s, 12_000);
        s.kill_all();
        s.note_on(72, 1.0);
        let octave = render(&mut s, 12_000);
        let (a, b) = (zero_crossings(&root[1000..]), zero_crossings(&octave[1000..]));
        let ratio = b as f32 / a as f32;
        assert!((ratio - 2.0).abs() < 0.05, "ratio {ratio}");
    }

    #[test]
    fn silent_without_sample() {
        let mut s = Sampler::new(SR);
        assert!(s.note_on(60, 1.0).is_none());
        assert!(render(&mut s, 256).iter().all(|v| *v == 0.0));
    }

    // === Playback region ===

    #[test]
    fn one_shot_stops_at_end() {
        let mut s = Sampler::new(SR);
        s.set_sample(Some(ramp_sample(1000)));
        s.set_parameter(1, 0.5);
        s.note_on(DEFAULT_ROOT, 1.0);
        let out = render(&mut s, 2000);
        assert!(out[400] > 0.2);
        assert_eq!(out[600], 0.0);
        render(&mut s, 16);
        assert_eq!(s.active_voices(), 0);
    }

    #[test]
    fn forward_loop_keeps_playing() {
        let mut s = Sampler::new(SR);
        s.set_sample(Some(ramp_sample(1000)));
        s.set_parameter(2, 1.0);
        s.set_parameter(3, 0.5);
        s.note_on(DEFAULT_ROOT, 1.0);
        let out = render(&mut s, 5000);
        // after the first pass values stay inside the loop region
        assert!(out[2000..].iter().all(|v| *v > 0.3));
        assert_eq!(s.active_voices(), 1);
    }

    #[test]
    fn pingpong_reverses_direction() {
        let mut s = Sampler::new(SR);
        s.set_sample(Some(ramp_sample(1000)));
        s.set_parameter(2, 2.0);
        s.note_on(DEFAULT_ROOT, 1.0);
        let out = render(&mut s, 1900);
        assert!(out[1500] < out[1100]);
        assert!(out[1500] > 0.3);
    }
}
