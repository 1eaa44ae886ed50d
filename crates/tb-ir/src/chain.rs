//! Chains: ordered pattern references with per-entry transpose and optional
//! scale lock.
//!
//! Without a scale lock, an entry's transpose is a semitone shift clamped to
//! ±12. With a scale lock it counts scale degrees: a note is mapped onto the
//! scale (out-of-scale notes round down to the next lower degree), moved by
//! `transpose` degrees, and mapped back, wrapping octaves. Results are folded
//! by octaves into the MIDI range so they stay in the scale.

use arrayvec::ArrayVec;

use crate::step::MAX_NOTE;

/// Maximum entries per chain.
pub const MAX_CHAIN_ENTRIES: usize = 16;

/// Semitone transpose limit without scale lock.
pub const MAX_SEMITONE_TRANSPOSE: i8 = 12;

/// Musical scales available for scale lock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Scale {
    #[default]
    Chromatic,
    Major,
    Minor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
    HarmonicMinor,
    MelodicMinor,
    MajorPentatonic,
    MinorPentatonic,
    Blues,
    WholeTone,
}

impl Scale {
    pub const ALL: [Scale; 14] = [
        Scale::Chromatic,
        Scale::Major,
        Scale::Minor,
        Scale::Dorian,
        Scale::Phrygian,
        Scale::Lydian,
        Scale::Mixolydian,
        Scale::Locrian,
        Scale::HarmonicMinor,
        Scale::MelodicMinor,
        Scale::MajorPentatonic,
        Scale::MinorPentatonic,
        Scale::Blues,
        Scale::WholeTone,
    ];

    /// Semitone offsets of each degree from the root, ascending, starting at 0.
    pub const fn intervals(self) -> &'static [u8] {
        match self {
            Scale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Scale::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Scale::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            Scale::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            Scale::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Scale::Locrian => &[0, 1, 3, 5, 6, 8, 10],
            Scale::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            Scale::MelodicMinor => &[0, 2, 3, 5, 7, 9, 11],
            Scale::MajorPentatonic => &[0, 2, 4, 7, 9],
            Scale::MinorPentatonic => &[0, 3, 5, 7, 10],
            Scale::Blues => &[0, 3, 5, 6, 7, 10],
            Scale::WholeTone => &[0, 2, 4, 6, 8, 10],
        }
    }

    /// Number of degrees per octave.
    pub const fn degrees(self) -> usize {
        self.intervals().len()
    }

    pub fn from_index(i: usize) -> Self {
        Self::ALL.get(i).copied().unwrap_or_default()
    }

    pub fn name(self) -> &'static str {
        match self {
            Scale::Chromatic => "Chromatic",
            Scale::Major => "Major",
            Scale::Minor => "Minor",
            Scale::Dorian => "Dorian",
            Scale::Phrygian => "Phrygian",
            Scale::Lydian => "Lydian",
            Scale::Mixolydian => "Mixolydian",
            Scale::Locrian => "Locrian",
            Scale::HarmonicMinor => "Harm Minor",
            Scale::MelodicMinor => "Mel Minor",
            Scale::MajorPentatonic => "Maj Penta",
            Scale::MinorPentatonic => "Min Penta",
            Scale::Blues => "Blues",
            Scale::WholeTone => "Whole Tone",
        }
    }
}

/// Scale lock setting of a chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScaleLock {
    pub scale: Scale,
    /// Root pitch class, 0 = C
    pub root: u8,
}

impl ScaleLock {
    pub const fn new(scale: Scale, root: u8) -> Self {
        Self { scale, root: root % 12 }
    }

    /// Largest allowed degree shift: two octaves of the scale.
    pub const fn max_shift(&self) -> i8 {
        (self.scale.degrees() * 2) as i8
    }

    /// Whether `note` is a member of the scale.
    pub fn contains(&self, note: u8) -> bool {
        let pc = (note as i32 - self.root as i32).rem_euclid(12) as u8;
        self.scale.intervals().contains(&pc)
    }

    /// Shift `note` by `degrees` scale degrees.
    pub fn shift(&self, note: u8, degrees: i8) -> u8 {
        if degrees == 0 {
            return note;
        }
        let intervals = self.scale.intervals();
        let len = intervals.len() as i32;
        let rel = note as i32 - self.root as i32;
        let octave = rel.div_euclid(12);
        let pc = rel.rem_euclid(12) as u8;
        // Round out-of-scale pitch classes down to the next lower degree.
        let degree = intervals.iter().rposition(|&iv| iv <= pc).unwrap_or(0) as i32;

        let shifted = octave * len + degree + degrees.clamp(-self.max_shift(), self.max_shift()) as i32;
        let new_octave = shifted.div_euclid(len);
        let new_degree = shifted.rem_euclid(len) as usize;
        let mut result = self.root as i32 + new_octave * 12 + intervals[new_degree] as i32;
        while result > MAX_NOTE as i32 {
            result -= 12;
        }
        while result < 0 {
            result += 12;
        }
        result as u8
    }
}

/// Transpose a note by an entry's shift, honoring an optional scale lock.
pub fn transpose_note(note: u8, transpose: i8, lock: Option<&ScaleLock>) -> u8 {
    match lock {
        Some(lock) => lock.shift(note, transpose),
        None => {
            let t = transpose.clamp(-MAX_SEMITONE_TRANSPOSE, MAX_SEMITONE_TRANSPOSE) as i32;
            (note as i32 + t).clamp(0, MAX_NOTE as i32) as u8
        }
    }
}

/// One chain entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChainEntry {
    pub pattern: u16,
    /// Semitones, or scale degrees under scale lock
    pub transpose: i8,
}

impl ChainEntry {
    pub const fn new(pattern: u16, transpose: i8) -> Self {
        Self { pattern, transpose }
    }
}

/// An ordered sequence of patterns played back to back.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chain {
    entries: ArrayVec<ChainEntry, MAX_CHAIN_ENTRIES>,
    scale_lock: Option<ScaleLock>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chain from pattern indices, no transpose.
    pub fn from_patterns(patterns: &[u16]) -> Self {
        let mut chain = Self::new();
        for &p in patterns {
            chain.push(ChainEntry::new(p, 0));
        }
        chain
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn entry(&self, i: usize) -> Option<&ChainEntry> {
        self.entries.get(i)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn scale_lock(&self) -> Option<&ScaleLock> {
        self.scale_lock.as_ref()
    }

    /// Largest transpose magnitude accepted under the current lock setting.
    pub fn transpose_limit(&self) -> i8 {
        match &self.scale_lock {
            Some(lock) => lock.max_shift(),
            None => MAX_SEMITONE_TRANSPOSE,
        }
    }

    /// Append an entry, clamping its transpose. Returns false when full.
    pub fn push(&mut self, mut entry: ChainEntry) -> bool {
        let limit = self.transpose_limit();
        entry.transpose = entry.transpose.clamp(-limit, limit);
        self.entries.try_push(entry).is_ok()
    }

    /// Replace an entry, clamping its transpose. Returns false for a bad index.
    pub fn set_entry(&mut self, i: usize, mut entry: ChainEntry) -> bool {
        let limit = self.transpose_limit();
        entry.transpose = entry.transpose.clamp(-limit, limit);
        match self.entries.get_mut(i) {
            Some(e) => {
                *e = entry;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, i: usize) -> Option<ChainEntry> {
        if i < self.entries.len() {
            Some(self.entries.remove(i))
        } else {
            None
        }
    }

    /// Change the scale lock and re-clamp every entry's transpose.
    pub fn set_scale_lock(&mut self, lock: Option<ScaleLock>) {
        self.scale_lock = lock;
        let limit = self.transpose_limit();
        for e in &mut self.entries {
            e.transpose = e.transpose.clamp(-limit, limit);
        }
    }

    /// Apply entry `i`'s transpose to a note.
    pub fn transpose(&self, i: usize, note: u8) -> u8 {
        match self.entries.get(i) {
            Some(e) => transpose_note(note, e.transpose, self.scale_lock.as_ref()),
            None => note,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Semitone transpose ===

    #[test]
    fn semitone_transpose_clamped_to_octave() {
        assert_eq!(transpose_note(60, 5, None), 65);
        assert_eq!(transpose_note(60, 40, None), 72);
        assert_eq!(transpose_note(60, -40, None), 48);
        assert_eq!(transpose_note(126, 12, None), 127);
    }

    #[test]
    fn chain_push_clamps_transpose() {
        let mut chain = Chain::new();
        chain.push(ChainEntry::new(0, 30));
        assert_eq!(chain.entry(0).map(|e| e.transpose), Some(12));
    }

    #[test]
    fn chain_capacity() {
        let mut chain = Chain::new();
        for i in 0..MAX_CHAIN_ENTRIES {
            assert!(chain.push(ChainEntry::new(i as u16, 0)));
        }
        assert!(!chain.push(ChainEntry::new(99, 0)));
    }

    // === Scale lock ===

    #[test]
    fn c_major_degree_shift() {
        let lock = ScaleLock::new(Scale::Major, 0);
        // C4 up two degrees = E4
        assert_eq!(lock.shift(60, 2), 64);
        // B4 up one degree wraps to C5
        assert_eq!(lock.shift(71, 1), 72);
        // C4 down one degree = B3
        assert_eq!(lock.shift(60, -1), 59);
        // a full scale of degrees is an octave
        assert_eq!(lock.shift(62, 7), 74);
    }

    #[test]
    fn out_of_scale_rounds_down_then_shifts() {
        let lock = ScaleLock::new(Scale::Major, 0);
        // C#4 reads as C4, up one degree = D4
        assert_eq!(lock.shift(61, 1), 62);
        assert!(lock.contains(lock.shift(66, -3)));
    }

    #[test]
    fn zero_shift_is_identity() {
        let lock = ScaleLock::new(Scale::MinorPentatonic, 9);
        assert_eq!(lock.shift(61, 0), 61);
    }

    #[test]
    fn shifted_notes_stay_in_scale_and_range() {
        let lock = ScaleLock::new(Scale::Blues, 4);
        for note in 0..=MAX_NOTE {
            for t in -lock.max_shift()..=lock.max_shift() {
                if t == 0 {
                    continue;
                }
                let n = lock.shift(note, t);
                assert!(n <= MAX_NOTE);
                assert!(lock.contains(n), "note {note} shift {t} -> {n}");
            }
        }
    }

    #[test]
    fn scale_lock_widens_transpose_limit() {
        let mut chain = Chain::new();
        chain.set_scale_lock(Some(ScaleLock::new(Scale::Major, 0)));
        chain.push(ChainEntry::new(0, 14));
        assert_eq!(chain.entry(0).map(|e| e.transpose), Some(14));
        assert_eq!(chain.transpose(0, 60), 84);
        chain.set_scale_lock(None);
        assert_eq!(chain.entry(0).map(|e| e.transpose), Some(12));
    }
}
