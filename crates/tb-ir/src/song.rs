//! Song arrangement: 16 parallel columns of chain references.

use alloc::vec::Vec;

use crate::pattern::MAX_TRACKS;

/// Marker for an empty song cell.
pub const EMPTY_CELL: i16 = -1;

/// Top-level arrangement. Column `c` drives track `c`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Song {
    columns: [Vec<i16>; MAX_TRACKS],
}

impl Song {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain index at (column, row); missing or empty cells yield `None`.
    pub fn cell(&self, column: usize, row: usize) -> Option<u16> {
        let v = *self.columns.get(column)?.get(row)?;
        if v < 0 {
            None
        } else {
            Some(v as u16)
        }
    }

    /// Set a cell, growing the column with empty cells as needed.
    /// `None` clears the cell. Returns false for a bad column.
    pub fn set_cell(&mut self, column: usize, row: usize, chain: Option<u16>) -> bool {
        let Some(col) = self.columns.get_mut(column) else {
            return false;
        };
        if row >= col.len() {
            if chain.is_none() {
                return true;
            }
            col.resize(row + 1, EMPTY_CELL);
        }
        col[row] = chain.map_or(EMPTY_CELL, |c| c.min(i16::MAX as u16) as i16);
        while col.last() == Some(&EMPTY_CELL) {
            col.pop();
        }
        true
    }

    /// Raw column contents.
    pub fn column(&self, column: usize) -> &[i16] {
        self.columns.get(column).map_or(&[], Vec::as_slice)
    }

    /// Number of song rows: the longest column.
    pub fn len(&self) -> usize {
        self.columns.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
