//! Patterns: 16 fixed tracks of steps.

use alloc::vec::Vec;

use crate::step::Step;

/// Number of tracks in every pattern (and columns in the song).
pub const MAX_TRACKS: usize = 16;

/// Maximum rows per pattern.
pub const MAX_ROWS: u16 = 128;

/// Default pattern length.
pub const DEFAULT_ROWS: u16 = 64;

/// A pattern of steps, 16 tracks wide.
#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    rows: u16,
    /// Pattern data, stored row-major: data[row * MAX_TRACKS + track]
    data: Vec<Step>,
}

impl Default for Pattern {
    fn default() -> Self {
        Self::new(DEFAULT_ROWS)
    }
}

impl Pattern {
    /// Create a new pattern with empty steps. Row count is clamped to 1..=128.
    pub fn new(rows: u16) -> Self {
        let rows = rows.clamp(1, MAX_ROWS);
        Self {
            rows,
            data: alloc::vec![Step::empty(); rows as usize * MAX_TRACKS],
        }
    }

    /// Number of rows.
    pub fn rows(&self) -> u16 {
        self.rows
    }

    /// Change the length, keeping the existing rows.
    pub fn resize(&mut self, rows: u16) {
        let rows = rows.clamp(1, MAX_ROWS);
        self.data.resize(rows as usize * MAX_TRACKS, Step::empty());
        self.rows = rows;
    }

    /// Get a step. Out-of-range positions yield `None`.
    pub fn step(&self, row: u16, track: usize) -> Option<&Step> {
        if row >= self.rows || track >= MAX_TRACKS {
            return None;
        }
        self.data.get(row as usize * MAX_TRACKS + track)
    }

    /// Get a mutable step. Out-of-range positions yield `None`.
    pub fn step_mut(&mut self, row: u16, track: usize) -> Option<&mut Step> {
        if row >= self.rows || track >= MAX_TRACKS {
            return None;
        }
        self.data.get_mut(row as usize * MAX_TRACKS + track)
    }

    /// Store a step, normalising it. Returns false for out-of-range positions.
    pub fn set_step(&mut self, row: u16, track: usize, step: Step) -> bool {
        match self.step_mut(row, track) {
            Some(s) => {
                *s = step.normalized();
                true
            }
            None => false,
        }
    }

    /// All steps of a row, one per track.
    pub fn row(&self, row: u16) -> &[Step] {
        if row >= self.rows {
            return &[];
        }
        let start = row as usize * MAX_TRACKS;
        &self.data[start..start + MAX_TRACKS]
    }

    /// Clear every step of one track.
    pub fn clear_track(&mut self, track: usize) {
        if track >= MAX_TRACKS {
            return;
        }
        for row in self.data.chunks_exact_mut(MAX_TRACKS) {
            row[track] = Step::empty();
        }
    }

    /// Returns true if no step holds any data.
    pub fn is_empty(&self) -> bool {
        self.data.iter().all(Step::is_empty)
    }
}
