//! Project mixer: master level, per-track gates, FX-bus settings.

use crate::pattern::MAX_TRACKS;

/// Delay-bus times as (label, length in beats).
pub const DELAY_DIVISIONS: [(&str, f64); 6] = [
    ("1/16", 0.25),
    ("1/8", 0.5),
    ("3/16", 0.75),
    ("1/4", 1.0),
    ("3/8", 1.5),
    ("1/2", 2.0),
];

#[derive(Clone, Debug, PartialEq)]
pub struct Mixer {
    /// 0.0..=2.0
    pub master_volume: f32,
    pub track_volume: [f32; MAX_TRACKS],
    pub track_mute: [bool; MAX_TRACKS],
    pub track_solo: [bool; MAX_TRACKS],
    /// Index into `DELAY_DIVISIONS`
    pub delay_division: u8,
    pub delay_feedback: f32,
    pub delay_return: f32,
    pub reverb_size: f32,
    pub reverb_damping: f32,
    pub reverb_return: f32,
}

impl Default for Mixer {
    fn default() -> Self {
        Self {
            master_volume: 0.8,
            track_volume: [1.0; MAX_TRACKS],
            track_mute: [false; MAX_TRACKS],
            track_solo: [false; MAX_TRACKS],
            delay_division: 2,
            delay_feedback: 0.35,
            delay_return: 0.5,
            reverb_size: 0.5,
            reverb_damping: 0.4,
            reverb_return: 0.4,
        }
    }
}

fn unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

impl Mixer {
    pub fn set_master_volume(&mut self, v: f32) {
        self.master_volume = if v.is_nan() { 0.0 } else { v.clamp(0.0, 2.0) };
    }

    pub fn set_track_volume(&mut self, track: usize, v: f32) {
        if let Some(t) = self.track_volume.get_mut(track) {
            *t = unit(v);
        }
    }

    pub fn set_delay(&mut self, division: u8, feedback: f32, ret: f32) {
        self.delay_division = division.min(DELAY_DIVISIONS.len() as u8 - 1);
        self.delay_feedback = feedback.clamp(0.0, 0.95);
        self.delay_return = unit(ret);
    }

    pub fn set_reverb(&mut self, size: f32, damping: f32, ret: f32) {
        self.reverb_size = unit(size);
        self.reverb_damping = unit(damping);
        self.reverb_return = unit(ret);
    }

    /// Delay time in beats.
    pub fn delay_beats(&self) -> f64 {
        DELAY_DIVISIONS
            .get(self.delay_division as usize)
            .map_or(0.75, |d| d.1)
    }

    /// Whether a track may trigger notes given mute and solo.
    pub fn track_audible(&self, track: usize) -> bool {
        if track >= MAX_TRACKS || self.track_mute[track] {
            return false;
        }
        !self.track_solo.iter().any(|&s| s) || self.track_solo[track]
    }
}
