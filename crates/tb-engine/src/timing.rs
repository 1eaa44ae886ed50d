//! Sample-accurate row clock.
//!
//! Row boundaries are computed from an anchor (the start of the row that was
//! current at the last tempo change) plus whole multiples of the fractional
//! row length, so rounding never accumulates across rows.

use tb_ir::GridTiming;

/// Boundaries closer than this are treated as reached.
const EPSILON: f64 = 1e-9;

#[derive(Clone, Debug)]
pub struct RowClock {
    timing: GridTiming,
    sample_rate: u32,
    bpm: f32,
    /// Sample position where row counting restarts
    anchor: f64,
    /// Rows completed since the anchor
    rows: u64,
    /// Samples consumed since reset
    elapsed: f64,
}

impl RowClock {
    pub fn new(sample_rate: u32, bpm: f32) -> Self {
        Self {
            timing: GridTiming::new(sample_rate, bpm),
            sample_rate,
            bpm,
            anchor: 0.0,
            rows: 0,
            elapsed: 0.0,
        }
    }

    pub fn timing(&self) -> &GridTiming {
        &self.timing
    }

    pub fn samples_per_row(&self) -> f64 {
        self.timing.samples_per_row
    }

    pub fn samples_per_tick(&self) -> f64 {
        self.timing.samples_per_tick
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    /// Restart at a row boundary.
    pub fn reset(&mut self) {
        self.anchor = 0.0;
        self.rows = 0;
        self.elapsed = 0.0;
    }

    /// Change tempo. The current row keeps its start and takes the new length.
    /// Returns true if the timing changed.
    pub fn set_tempo(&mut self, sample_rate: u32, bpm: f32) -> bool {
        if sample_rate == self.sample_rate && bpm == self.bpm {
            return false;
        }
        self.anchor += self.rows as f64 * self.timing.samples_per_row;
        self.rows = 0;
        self.timing = GridTiming::new(sample_rate, bpm);
        self.sample_rate = sample_rate;
        self.bpm = bpm;
        true
    }

    /// Fractional samples until the next row boundary (≤ 0 when due).
    pub fn samples_until_row(&self) -> f64 {
        self.anchor + (self.rows + 1) as f64 * self.timing.samples_per_row - self.elapsed
    }

    pub fn row_due(&self) -> bool {
        self.samples_until_row() <= EPSILON
    }

    /// Whole samples to render before the next boundary, at most `max`.
    pub fn chunk(&self, max: usize) -> usize {
        let until = self.samples_until_row() - EPSILON;
        if until <= 0.0 {
            return 0;
        }
        let whole = libm::ceil(until);
        if whole >= max as f64 {
            max
        } else {
            whole as usize
        }
    }

    pub fn consume(&mut self, samples: usize) {
        self.elapsed += samples as f64;
    }

    /// Mark the current boundary as passed.
    pub fn advance_row(&mut self) {
        self.rows += 1;
    }
}
