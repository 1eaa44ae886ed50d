//! Grid resolution and tempo conversions.

/// Rows per beat (fixed).
pub const ROWS_PER_BEAT: u32 = 4;

/// Effect ticks per row (fixed).
pub const TICKS_PER_ROW: u32 = 6;

pub const MIN_BPM: f32 = 20.0;
pub const MAX_BPM: f32 = 999.0;
pub const DEFAULT_BPM: f32 = 120.0;

/// Clamp a tempo into the supported range.
pub fn clamp_bpm(bpm: f32) -> f32 {
    if bpm.is_nan() {
        DEFAULT_BPM
    } else {
        bpm.clamp(MIN_BPM, MAX_BPM)
    }
}

/// Fractional sample durations of the musical grid at one tempo and rate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridTiming {
    pub samples_per_beat: f64,
    pub samples_per_row: f64,
    pub samples_per_tick: f64,
}

impl GridTiming {
    pub fn new(sample_rate: u32, bpm: f32) -> Self {
        let samples_per_beat = sample_rate as f64 * 60.0 / clamp_bpm(bpm) as f64;
        let samples_per_row = samples_per_beat / ROWS_PER_BEAT as f64;
        Self {
            samples_per_beat,
            samples_per_row,
            samples_per_tick: samples_per_row / TICKS_PER_ROW as f64,
        }
    }
}
