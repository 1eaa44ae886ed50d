//! Beat slicer: cuts a sample into slices and maps notes onto them.
//!
//! Notes from C-2 (36) upward select slices in order, wrapping past the
//! last. Speed changes playback time without changing pitch using a
//! two-grain overlap-add; pitch shifts without changing time.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::f64::consts::PI;

use arrayvec::ArrayVec;
use tb_ir::{as_index, EffectCommand, EngineParams, InstrumentKind, SlicePoints, SlicerParams, MAX_EFFECTS, MAX_SLICES};

use crate::analysis::{detect_onsets, Onset};
use crate::dsp::envelope::Adsr;
use crate::dsp::pan_gains;
use crate::processors::{apply_fx_event, Processor, MAX_VOICES};
use crate::sample::SampleBuffer;
use crate::tracker_fx::TrackerFx;
use crate::voice_pool::{PoolVoice, VoiceHandle, VoicePool};

/// Note that plays slice 0.
pub const SLICE_BASE_NOTE: u8 = 36;

/// Output samples per grain.
const GRAIN_LEN: u32 = 2048;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SliceMode {
    #[default]
    Equal,
    Transient,
    Manual,
}

impl SliceMode {
    pub fn from_index(i: usize) -> Self {
        match i {
            1 => SliceMode::Transient,
            2 => SliceMode::Manual,
            _ => SliceMode::Equal,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Grain {
    /// Source frame read at age 0
    start: f64,
    age: u32,
}

#[derive(Clone, Copy, Debug)]
struct Playback {
    speed: f64,
    /// Semitones from the pitch parameter
    pitch: f32,
    native: f64,
}

#[derive(Clone, Debug)]
struct SliceVoice {
    fx: TrackerFx,
    amp: Adsr,
    velocity: f32,
    start: f64,
    end: f64,
    head: f64,
    stretch: bool,
    grains: [Grain; 2],
}

impl SliceVoice {
    fn new(sample_rate: f32) -> Self {
        Self {
            fx: TrackerFx::plain(60.0, 1.0, sample_rate),
            amp: Adsr::new(sample_rate),
            velocity: 0.0,
            start: 0.0,
            end: 0.0,
            head: 0.0,
            stretch: false,
            grains: [Grain::default(); 2],
        }
    }

    fn restart(&mut self, pitch_rate: f64) {
        self.head = self.start;
        // offset by half a grain so the two windows always sum to one
        let half = GRAIN_LEN / 2;
        self.grains = [
            Grain { start: self.start - half as f64 * pitch_rate, age: half },
            Grain { start: self.start, age: 0 },
        ];
    }

    fn position(&self) -> u32 {
        self.head.max(0.0) as u32
    }

    #[inline]
    fn read_grains(&mut self, sample: &SampleBuffer, pitch_rate: f64) -> (f32, f32) {
        let (mut l, mut r) = (0.0, 0.0);
        for g in &mut self.grains {
            let phase = g.age as f64 / GRAIN_LEN as f64;
            let window = libm::sin(PI * phase);
            let window = (window * window) as f32;
            let src = g.start + g.age as f64 * pitch_rate;
            if src >= self.start && src < self.end {
                let (sl, sr) = sample.read(src);
                l += sl * window;
                r += sr * window;
            }
            g.age += 1;
            if g.age >= GRAIN_LEN {
                *g = Grain { start: self.head, age: 0 };
            }
        }
        (l, r)
    }

    fn render(&mut self, sample: &SampleBuffer, play: &Playback, out_l: &mut [f32], out_r: &mut [f32]) {
        let (gl, gr) = pan_gains(self.fx.pan().unwrap_or(0.0));
        for (l, r) in out_l.iter_mut().zip(out_r.iter_mut()) {
            let semis = play.pitch + self.fx.pitch() - self.fx.base_pitch();
            let pitch_rate = play.native * libm::exp2(semis as f64 / 12.0);
            if apply_fx_event(self.fx.advance(), &mut self.amp) {
                self.restart(pitch_rate);
            }
            if self.amp.is_idle() {
                continue;
            }

            let (sl, sr) = if self.stretch {
                let out = self.read_grains(sample, pitch_rate);
                self.head += play.speed * play.native;
                out
            } else {
                let out = if self.head < self.end { sample.read(self.head) } else { (0.0, 0.0) };
                self.head += pitch_rate;
                out
            };
            let a = self.amp.next() * self.velocity * self.fx.gain();
            *l += sl * a * gl;
            *r += sr * a * gr;

            if self.head >= self.end && !self.fx.is_released() {
                self.fx.release();
                self.amp.gate_off();
            }
        }
    }
}

impl PoolVoice for SliceVoice {
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
pub struct Slicer {
    params: SlicerParams,
    points: SlicePoints,
    pool: VoicePool<SliceVoice>,
    preview: SliceVoice,
    preview_active: bool,
    sample: Option<Arc<SampleBuffer>>,
    onsets: Vec<Onset>,
    starts: ArrayVec<u32, MAX_SLICES>,
    sample_rate: f32,
    samples_per_tick: f64,
}

impl Slicer {
    pub fn new(sample_rate: f32) -> Self {
        let mut s = Self {
            params: SlicerParams::default(),
            points: SlicePoints::new(),
            pool: VoicePool::new(MAX_VOICES, || SliceVoice::new(sample_rate)),
            preview: SliceVoice::new(sample_rate),
            preview_active: false,
            sample: None,
            onsets: Vec::new(),
            starts: ArrayVec::new(),
            sample_rate,
            samples_per_tick: sample_rate as f64 / 8.0,
        };
        s.configure();
        s
    }

    pub fn mode(&self) -> SliceMode {
        SliceMode::from_index(as_index(self.params.mode))
    }

    /// Start frame of every slice, ascending.
    pub fn slice_starts(&self) -> &[u32] {
        &self.starts
    }

    pub fn slice_count(&self) -> usize {
        self.starts.len()
    }

    /// Frame range of a slice.
    pub fn slice_range(&self, index: usize) -> Option<(u32, u32)> {
        let frames = self.sample.as_ref()?.frames() as u32;
        let start = *self.starts.get(index)?;
        let end = self.starts.get(index + 1).copied().unwrap_or(frames);
        Some((start, end))
    }

    pub fn onsets(&self) -> &[Onset] {
        &self.onsets
    }

    fn configure(&mut self) {
        let p = self.params;
        self.pool.set_polyphony(as_index(p.polyphony));
        for v in self.pool.voices_mut() {
            v.amp.set_params(p.attack, 1.0, 1.0, p.release);
        }
        self.preview.amp.set_params(1.0, 1.0, 1.0, 10.0);
        self.rebuild_slices();
    }

    fn rebuild_slices(&mut self) {
        self.starts.clear();
        let Some(sample) = self.sample.as_ref() else {
            return;
        };
        let frames = sample.frames() as u32;
        match self.mode() {
            SliceMode::Equal => {
                let n = as_index(self.params.divisions).clamp(1, MAX_SLICES) as u64;
                for i in 0..n {
                    let start = (frames as u64 * i / n) as u32;
                    if self.starts.last() != Some(&start) {
                        self.starts.push(start);
                    }
                }
            }
            SliceMode::Transient => {
                let threshold = 1.0 - self.params.sensitivity;
                self.starts.push(0);
                for onset in &self.onsets {
                    if onset.strength >= threshold && onset.frame > 0 && onset.frame < frames {
                        if self.starts.try_push(onset.frame).is_err() {
                            break;
                        }
                    }
                }
            }
            SliceMode::Manual => {
                let mut points = self.points.clone();
                points.sort_unstable();
                for p in points {
                    if p < frames && self.starts.last() != Some(&p) {
                        self.starts.push(p);
                    }
                }
                if self.starts.is_empty() {
                    self.starts.push(0);
                }
            }
        }
    }

    fn playback(&self, sample: &SampleBuffer) -> Playback {
        Playback {
            speed: self.params.speed as f64,
            pitch: self.params.pitch,
            native: sample.sample_rate() as f64 / self.sample_rate.max(1.0) as f64,
        }
    }

    /// Play the whole sample once at its native speed.
    pub fn start_preview(&mut self, velocity: f32) {
        let Some(sample) = self.sample.as_ref() else {
            return;
        };
        let end = sample.frames() as f64;
        let v = &mut self.preview;
        v.fx = TrackerFx::plain(60.0, self.samples_per_tick, self.sample_rate);
        v.velocity = velocity.clamp(0.0, 1.0);
        v.start = 0.0;
        v.end = end;
        v.stretch = false;
        v.amp.kill();
        self.preview_active = true;
    }

    pub fn stop_preview(&mut self) {
        self.preview.release();
    }

    /// Playhead of the preview voice while it sounds.
    pub fn preview_position(&self) -> Option<u32> {
        self.preview_active.then(|| self.preview.position())
    }
}

impl Processor for Slicer {
    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Slicer
    }

    fn init(&mut self, sample_rate: f32) {
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.pool = VoicePool::new(MAX_VOICES, || SliceVoice::new(sample_rate));
            self.preview = SliceVoice::new(sample_rate);
            self.configure();
        }
        self.kill_all();
    }

    fn note_on_with_fx(
        &mut self,
        note: u8,
        velocity: f32,
        effects: &[EffectCommand; MAX_EFFECTS],
        previous: Option<f32>,
    ) -> Option<VoiceHandle> {
        let index = note.checked_sub(SLICE_BASE_NOTE)? as usize;
        if self.starts.is_empty() {
            return None;
        }
        let (start, end) = self.slice_range(index % self.starts.len())?;
        let stretch = self.params.speed != 1.0 || self.params.pitch != 0.0;
        let fx = TrackerFx::new(note as f32, previous, effects, self.samples_per_tick, self.sample_rate);
        let (handle, voice) = self.pool.allocate();
        voice.fx = fx;
        voice.velocity = velocity.clamp(0.0, 1.0);
        voice.start = start as f64;
        voice.end = end as f64;
        voice.head = start as f64;
        voice.stretch = stretch;
        Some(handle)
    }

    fn note_off(&mut self, voice: VoiceHandle) {
        self.pool.release(voice);
    }

    fn all_notes_off(&mut self) {
        self.pool.release_all();
        self.preview.release();
    }

    fn kill_all(&mut self) {
        self.pool.kill_all();
        self.preview.kill();
        self.preview_active = false;
    }

    fn render(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        self.pool.reap();
        if self.preview_active && self.preview.is_finished() {
            self.preview_active = false;
        }
        let Some(sample) = self.sample.as_ref() else {
            return;
        };
        let frames = out_l.len().min(out_r.len());
        let play = self.playback(sample);
        for voice in self.pool.iter_active_mut() {
            voice.render(sample, &play, &mut out_l[..frames], &mut out_r[..frames]);
        }
        if self.preview_active {
            let native = Playback { speed: 1.0, pitch: 0.0, native: play.native };
            self.preview.render(sample, &native, &mut out_l[..frames], &mut out_r[..frames]);
        }
    }

    fn active_voices(&self) -> usize {
        self.pool.active_count() + usize::from(self.preview_active)
    }

    fn set_samples_per_tick(&mut self, samples_per_tick: f64) {
        self.samples_per_tick = samples_per_tick.max(1.0);
        for v in self.pool.voices_mut() {
            v.fx.set_samples_per_tick(self.samples_per_tick);
        }
    }

    fn engine_params(&self) -> EngineParams {
        EngineParams::Slicer { params: self.params, slices: self.points.clone() }
    }

    fn apply_params(&mut self, params: &EngineParams) {
        if let EngineParams::Slicer { params, slices } = params {
            self.params = *params;
            self.points = slices.clone();
            self.configure();
        }
    }

    /// Runs onset detection, so call outside the render path.
    fn set_sample(&mut self, sample: Option<Arc<SampleBuffer>>) {
        self.kill_all();
        self.onsets = sample
            .as_deref()
            .map(|s| detect_onsets(&s.to_mono(), s.sample_rate()))
            .unwrap_or_default();
        self.sample = sample;
        self.rebuild_slices();
    }

    fn sample(&self) -> Option<&Arc<SampleBuffer>> {
        self.sample.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    /// Ramp from 0 to 1 so the output value reveals the read position.
    fn ramp(frames: usize) -> Arc<SampleBuffer> {
        let data: Vec<f32> = (0..frames).map(|i| i as f32 / frames as f32).collect();
        Arc::new(SampleBuffer::from_interleaved(&data, SR as u32, 1).unwrap())
    }

    /// Silence with two loud bursts.
    fn bursts() -> Arc<SampleBuffer> {
        let mut data = vec![0.0f32; 48_000];
        for (start, amp) in [(12_288usize, 0.9f32), (30_720, 0.3)] {
            for (i, s) in data[start..start + 2048].iter_mut().enumerate() {
                *s = libm::sinf(i as f32 * 0.2) * amp;
            }
        }
        Arc::new(SampleBuffer::from_interleaved(&data, SR as u32, 1).unwrap())
    }

    fn render(s: &mut Slicer, frames: usize) -> Vec<f32> {
        let mut l = vec![0.0; frames];
        let mut r = vec![0.0; frames];
        s.render(&mut l, &mut r);
        l
    }

    // === Slice layout ===

    #[test]
    fn equal_slices_cover_the_sample() {
        let mut s = Slicer::new(SR);
        s.set_sample(Some(ramp(8000)));
        assert_eq!(s.slice_starts(), &[0, 1000, 2000, 3000, 4000, 5000, 6000, 7000]);
        assert_eq!(s.slice_range(7), Some((7000, 8000)));
        s.set_parameter(1, 4.0);
        assert_eq!(s.slice_count(), 4);
    }

    #[test]
    fn transient_slices_follow_sensitivity() {
        let mut s = Slicer::new(SR);
        s.set_parameter(0, 1.0);
        s.set_sample(Some(bursts()));
        assert!(s.onsets().len() >= 2);
        // only the strong burst passes at low sensitivity
        s.set_parameter(2, 0.2);
        assert_eq!(s.slice_starts(), &[0, 12_288]);
        s.set_parameter(2, 1.0);
        assert_eq!(s.slice_starts()[0], 0);
        assert!(s.slice_starts().contains(&30_720));
    }

    #[test]
    fn manual_points_are_sorted_and_bounded() {
        let mut s = Slicer::new(SR);
        s.set_sample(Some(ramp(8000)));
        let mut slices = SlicePoints::new();
        slices.extend([0, 500, 400, 3000, 9000]);
        let mut params = SlicerParams::default();
        params.mode = 2.0;
        s.apply_params(&EngineParams::Slicer { params, slices });
        assert_eq!(s.slice_starts(), &[0, 400, 500, 3000]);
    }

    // === Playback ===

    #[test]
    fn notes_map_to_slices_and_wrap() {
        let mut s = Slicer::new(SR);
        s.set_sample(Some(ramp(8000)));
        s.set_parameter(5, 0.0);
        assert!(s.note_on(35, 1.0).is_none());
        s.note_on(SLICE_BASE_NOTE + 2, 1.0);
        let out = render(&mut s, 64);
        let expected = 2010.0 / 8000.0 * core::f32::consts::FRAC_1_SQRT_2;
        assert!((out[10] - expected).abs() < 0.01, "{}", out[10]);

        s.kill_all();
        s.note_on(SLICE_BASE_NOTE + 9, 1.0);
        let out = render(&mut s, 64);
        let expected = 1010.0 / 8000.0 * core::f32::consts::FRAC_1_SQRT_2;
        assert!((out[10] - expected).abs() < 0.01, "{}", out[10]);
    }

    #[test]
    fn slice_end_releases_voice() {
        let mut s = Slicer::new(SR);
        s.set_sample(Some(ramp(8000)));
        s.note_on(SLICE_BASE_NOTE, 1.0);
        render(&mut s, 1000);
        render(&mut s, 4800);
        render(&mut s, 16);
        assert_eq!(s.active_voices(), 0);
    }

    #[test]
    fn half_speed_doubles_duration() {
        let mut s = Slicer::new(SR);
        s.set_sample(Some(ramp(48_000)));
        s.set_parameter(3, 0.5);
        s.set_parameter(6, 1.0);
        s.note_on(SLICE_BASE_NOTE, 1.0);
        // an eighth of a second-long slice now lasts a quarter second
        render(&mut s, 9000);
        assert_eq!(s.active_voices(), 1);
        render(&mut s, 4000);
        render(&mut s, 16);
        assert_eq!(s.active_voices(), 0);
    }

    #[test]
    fn preview_reports_position() {
        let mut s = Slicer::new(SR);
        assert_eq!(s.preview_position(), None);
        s.set_sample(Some(ramp(8000)));
        s.start_preview(1.0);
        render(&mut s, 1000);
        let pos = s.preview_position().unwrap();
        assert!((999..=1000).contains(&pos), "{pos}");
        s.stop_preview();
        render(&mut s, 2400);
        render(&mut s, 16);
        assert_eq!(s.preview_position(), None);
    }
}
