//! Per-voice tracker effect state.
//!
//! Built when a step triggers, from the step's effect commands. Advanced once
//! per output sample; ticks fall on fractional sample positions so the grid
//! stays exact at any tempo.

use core::f32::consts::TAU;

use heapless::Vec as HVec;
use tb_ir::{EffectCommand, EffectKind, MAX_EFFECTS};

/// Ticks between arpeggio steps.
const ARP_TICKS: u32 = 2;

/// What a voice must do at this sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FxEvent {
    None,
    NoteOn,
    NoteOff,
    Cut,
}

#[derive(Clone, Debug)]
pub struct TrackerFx {
    base_pitch: f32,
    sample_rate: f32,
    samples_per_tick: f64,
    /// Samples advanced since the trigger
    elapsed: f64,
    /// Sample position of the next tick
    next_tick_at: f64,
    /// Ticks processed so far
    tick: u32,
    triggered: bool,
    released: bool,

    arpeggio: HVec<i8, 3>,
    arp_offset: f32,
    /// Semitones per tick; 0 = no glide
    glide_speed: f32,
    glide_offset: f32,
    vibrato_hz: f32,
    vibrato_depth: f32,
    vibrato_phase: f32,
    slide_per_tick: f32,
    gain: f32,
    pan: Option<f32>,
    delay: u32,
    retrigger: u32,
    cut: Option<u32>,
    off: Option<u32>,
}

impl TrackerFx {
    /// Effect state for a voice at `pitch`. `previous` is the pitch the
    /// track played last, used as the portamento origin.
    pub fn new(
        pitch: f32,
        previous: Option<f32>,
        effects: &[EffectCommand; MAX_EFFECTS],
        samples_per_tick: f64,
        sample_rate: f32,
    ) -> Self {
        let mut fx = Self::plain(pitch, samples_per_tick, sample_rate);
        for cmd in effects.iter().filter(|c| !c.is_none()) {
            let v = cmd.value;
            match cmd.kind {
                EffectKind::None => {}
                EffectKind::Arpeggio => {
                    fx.arpeggio.clear();
                    if v != 0 {
                        let _ = fx.arpeggio.push(0);
                        let _ = fx.arpeggio.push(cmd.x() as i8);
                        if cmd.y() != 0 {
                            let _ = fx.arpeggio.push(cmd.y() as i8);
                        }
                    }
                }
                EffectKind::Portamento => {
                    if let Some(prev) = previous {
                        if v > 0 {
                            fx.glide_speed = v as f32 / 16.0;
                            fx.glide_offset = prev - pitch;
                        }
                    }
                }
                EffectKind::Vibrato => {
                    fx.vibrato_hz = cmd.x() as f32 * 0.5;
                    fx.vibrato_depth = cmd.y() as f32 / 16.0;
                }
                EffectKind::VolumeSlide => {
                    fx.slide_per_tick = (cmd.x() as f32 - cmd.y() as f32) / 64.0;
                }
                EffectKind::Pan => {
                    fx.pan = Some(((v as f32 - 128.0) / 128.0).clamp(-1.0, 1.0));
                }
                EffectKind::Delay => fx.delay = v as u32,
                EffectKind::Retrigger => fx.retrigger = v as u32,
                EffectKind::Cut => fx.cut = Some(v as u32),
                EffectKind::Off => fx.off = Some(v as u32),
            }
        }
        fx
    }

    /// No effects: note-on at the first sample.
    pub fn plain(pitch: f32, samples_per_tick: f64, sample_rate: f32) -> Self {
        Self {
            base_pitch: pitch,
            sample_rate: sample_rate.max(1.0),
            samples_per_tick: samples_per_tick.max(1.0),
            elapsed: 0.0,
            next_tick_at: 0.0,
            tick: 0,
            triggered: false,
            released: false,
            arpeggio: HVec::new(),
            arp_offset: 0.0,
            glide_speed: 0.0,
            glide_offset: 0.0,
            vibrato_hz: 0.0,
            vibrato_depth: 0.0,
            vibrato_phase: 0.0,
            slide_per_tick: 0.0,
            gain: 1.0,
            pan: None,
            delay: 0,
            retrigger: 0,
            cut: None,
            off: None,
        }
    }

    /// Retime after a tempo change. Ticks already elapsed keep their count.
    pub fn set_samples_per_tick(&mut self, samples_per_tick: f64) {
        let spt = samples_per_tick.max(1.0);
        let remaining = (self.next_tick_at - self.elapsed).max(0.0);
        self.next_tick_at = self.elapsed + remaining * spt / self.samples_per_tick;
        self.samples_per_tick = spt;
    }

    /// Advance by one sample.
    #[inline]
    pub fn advance(&mut self) -> FxEvent {
        let mut event = FxEvent::None;
        if self.elapsed + 1e-9 >= self.next_tick_at {
            event = self.on_tick(self.tick);
            self.tick = self.tick.saturating_add(1);
            self.next_tick_at += self.samples_per_tick;
        }
        self.elapsed += 1.0;

        if self.glide_offset != 0.0 {
            let step = self.glide_speed / self.samples_per_tick as f32;
            if self.glide_offset > 0.0 {
                self.glide_offset = (self.glide_offset - step).max(0.0);
            } else {
                self.glide_offset = (self.glide_offset + step).min(0.0);
            }
        }
        if self.vibrato_depth > 0.0 {
            self.vibrato_phase += self.vibrato_hz / self.sample_rate;
            if self.vibrato_phase >= 1.0 {
                self.vibrato_phase -= 1.0;
            }
        }
        event
    }

    fn on_tick(&mut self, tick: u32) -> FxEvent {
        if !self.arpeggio.is_empty() {
            let i = (tick / ARP_TICKS) as usize % self.arpeggio.len();
            self.arp_offset = self.arpeggio[i] as f32;
        }
        if tick > 0 && self.slide_per_tick != 0.0 {
            self.gain = (self.gain + self.slide_per_tick).clamp(0.0, 1.0);
        }
        if self.released {
            return FxEvent::None;
        }
        if self.cut == Some(tick) {
            self.released = true;
            return FxEvent::Cut;
        }
        if self.off == Some(tick) {
            self.released = true;
            return FxEvent::NoteOff;
        }
        if !self.triggered {
            if tick >= self.delay {
                self.triggered = true;
                return FxEvent::NoteOn;
            }
            return FxEvent::None;
        }
        if self.retrigger > 0 && (tick - self.delay) % self.retrigger == 0 {
            return FxEvent::NoteOn;
        }
        FxEvent::None
    }

    /// Mark the voice released (note-off from the sequencer). Stops further
    /// events; pitch modulation keeps running for the tail.
    pub fn release(&mut self) {
        self.released = true;
    }

    /// Current pitch in fractional MIDI notes.
    #[inline]
    pub fn pitch(&self) -> f32 {
        let mut p = self.base_pitch + self.arp_offset + self.glide_offset;
        if self.vibrato_depth > 0.0 {
            p += libm::sinf(TAU * self.vibrato_phase) * self.vibrato_depth;
        }
        p
    }

    pub fn base_pitch(&self) -> f32 {
        self.base_pitch
    }

    /// Volume-slide gain, 0..1.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Pan override from a pan command.
    pub fn pan(&self) -> Option<f32> {
        self.pan
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Note-on still withheld by a delay.
    pub fn is_pending(&self) -> bool {
        !self.triggered && !self.released
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_ir::GridTiming;

    fn fx(effects: &[(EffectKind, u8)]) -> TrackerFx {
        let mut cmds = [EffectCommand::NONE; MAX_EFFECTS];
        for (slot, &(kind, value)) in cmds.iter_mut().zip(effects) {
            *slot = EffectCommand::new(kind, value);
        }
        let timing = GridTiming::new(48_000, 120.0);
        TrackerFx::new(60.0, Some(48.0), &cmds, timing.samples_per_tick, 48_000.0)
    }

    /// Sample indices where `event` fires during one row.
    fn events(fx: &mut TrackerFx, event: FxEvent) -> Vec<usize> {
        (0..6000).filter_map(|i| (fx.advance() == event).then_some(i)).collect()
    }

    // === Triggering ===

    #[test]
    fn plain_note_fires_at_first_sample() {
        let mut f = fx(&[]);
        assert_eq!(f.advance(), FxEvent::NoteOn);
        assert_eq!(f.advance(), FxEvent::None);
    }

    #[test]
    fn retrigger_every_two_ticks() {
        let mut f = fx(&[(EffectKind::Retrigger, 2)]);
        assert_eq!(events(&mut f, FxEvent::NoteOn), vec![0, 2000, 4000]);
    }

    #[test]
    fn delay_withholds_note_on() {
        let mut f = fx(&[(EffectKind::Delay, 3)]);
        assert!(f.is_pending());
        assert_eq!(events(&mut f, FxEvent::NoteOn), vec![3000]);
        assert!(!f.is_pending());
    }

    #[test]
    fn cut_and_off_end_events() {
        let mut f = fx(&[(EffectKind::Cut, 2), (EffectKind::Retrigger, 1)]);
        let mut seen = Vec::new();
        for i in 0..6000 {
            match f.advance() {
                FxEvent::None => {}
                e => seen.push((i, e)),
            }
        }
        assert_eq!(seen, vec![(0, FxEvent::NoteOn), (1000, FxEvent::NoteOn), (2000, FxEvent::Cut)]);

        let mut f = fx(&[(EffectKind::Off, 1)]);
        assert_eq!(events(&mut f, FxEvent::NoteOff), vec![1000]);
        assert!(f.is_released());
    }

    // === Pitch ===

    #[test]
    fn arpeggio_steps_every_two_ticks() {
        let mut f = fx(&[(EffectKind::Arpeggio, 0x47)]);
        let mut pitches = Vec::new();
        for i in 0..6000 {
            f.advance();
            if i % 2000 == 0 {
                pitches.push(f.pitch());
            }
        }
        assert_eq!(pitches, vec![60.0, 64.0, 67.0]);
    }

    #[test]
    fn portamento_glides_from_previous_pitch() {
        // 0x20 / 16 = 2 semitones per tick: 12 semitones take 6 ticks
        let mut f = fx(&[(EffectKind::Portamento, 0x20)]);
        f.advance();
        assert!(f.pitch() < 49.0);
        for _ in 0..2999 {
            f.advance();
        }
        assert!((f.pitch() - 54.0).abs() < 0.01);
        for _ in 0..4000 {
            f.advance();
        }
        assert_eq!(f.pitch(), 60.0);
    }

    #[test]
    fn portamento_without_previous_is_static() {
        let cmds = [EffectCommand::new(EffectKind::Portamento, 0x20), EffectCommand::NONE, EffectCommand::NONE];
        let mut f = TrackerFx::new(60.0, None, &cmds, 1000.0, 48_000.0);
        f.advance();
        assert_eq!(f.pitch(), 60.0);
    }

    #[test]
    fn vibrato_stays_within_depth_and_continues_after_release() {
        // rate 8 * 0.5 = 4 Hz, depth 8/16 = half a semitone
        let mut f = fx(&[(EffectKind::Vibrato, 0x88)]);
        let mut max = 0.0f32;
        for _ in 0..12_000 {
            f.advance();
            max = max.max((f.pitch() - 60.0).abs());
        }
        assert!(max <= 0.5 + 1e-4 && max > 0.45);
        f.release();
        let before = f.pitch();
        for _ in 0..100 {
            assert_eq!(f.advance(), FxEvent::None);
        }
        assert_ne!(f.pitch(), before);
    }

    // === Levels ===

    #[test]
    fn volume_slide_and_pan() {
        let mut f = fx(&[(EffectKind::VolumeSlide, 0x08), (EffectKind::Pan, 0)]);
        for _ in 0..6000 {
            f.advance();
        }
        // five non-zero ticks of -8/64
        assert!((f.gain() - (1.0 - 5.0 * 8.0 / 64.0)).abs() < 1e-6);
        assert_eq!(f.pan(), Some(-1.0));
    }

    #[test]
    fn retime_keeps_tick_count() {
        let mut f = fx(&[(EffectKind::Retrigger, 1)]);
        for _ in 0..500 {
            f.advance();
        }
        f.set_samples_per_tick(500.0);
        // half of the 1000-sample tick remained; it now takes 250 samples
        let next = (0..1000).position(|_| f.advance() == FxEvent::NoteOn);
        assert_eq!(next, Some(250));
    }
}
