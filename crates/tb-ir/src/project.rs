//! The project document.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::chain::Chain;
use crate::instrument::{Instrument, InstrumentKind};
use crate::mixer::Mixer;
use crate::pattern::Pattern;
use crate::song::Song;
use crate::timing::{clamp_bpm, DEFAULT_BPM};

/// Maximum instruments in a project.
pub const MAX_INSTRUMENTS: usize = 128;

/// Maximum patterns in a project.
pub const MAX_PATTERNS: usize = 256;

/// Maximum chains in a project.
pub const MAX_CHAINS: usize = 256;

/// A complete project: everything the engine reads.
#[derive(Clone, Debug, PartialEq)]
pub struct Project {
    pub title: ArrayString<32>,
    tempo: f32,
    pub patterns: Vec<Pattern>,
    pub chains: Vec<Chain>,
    pub song: Song,
    pub instruments: Vec<Instrument>,
    pub mixer: Mixer,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            title: ArrayString::new(),
            tempo: DEFAULT_BPM,
            patterns: alloc::vec![Pattern::default()],
            chains: Vec::new(),
            song: Song::new(),
            instruments: Vec::new(),
            mixer: Mixer::default(),
        }
    }
}

impl Project {
    /// Create an empty project with one pattern.
    pub fn new(title: &str) -> Self {
        let mut project = Self::default();
        let _ = project.title.try_push_str(title);
        project
    }

    /// Tempo in BPM.
    pub fn tempo(&self) -> f32 {
        self.tempo
    }

    /// Set the tempo, clamped to the supported range.
    pub fn set_tempo(&mut self, bpm: f32) {
        self.tempo = clamp_bpm(bpm);
    }

    pub fn instrument(&self, i: usize) -> Option<&Instrument> {
        self.instruments.get(i)
    }

    pub fn instrument_mut(&mut self, i: usize) -> Option<&mut Instrument> {
        self.instruments.get_mut(i)
    }

    pub fn pattern(&self, i: usize) -> Option<&Pattern> {
        self.patterns.get(i)
    }

    pub fn pattern_mut(&mut self, i: usize) -> Option<&mut Pattern> {
        self.patterns.get_mut(i)
    }

    pub fn chain(&self, i: usize) -> Option<&Chain> {
        self.chains.get(i)
    }

    pub fn chain_mut(&mut self, i: usize) -> Option<&mut Chain> {
        self.chains.get_mut(i)
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    /// Append a pattern; returns its index.
    pub fn add_pattern(&mut self, rows: u16) -> Option<usize> {
        if self.patterns.len() >= MAX_PATTERNS {
            return None;
        }
        self.patterns.push(Pattern::new(rows));
        Some(self.patterns.len() - 1)
    }

    /// Append a chain; returns its index.
    pub fn add_chain(&mut self, chain: Chain) -> Option<usize> {
        if self.chains.len() >= MAX_CHAINS {
            return None;
        }
        self.chains.push(chain);
        Some(self.chains.len() - 1)
    }

    /// Append an instrument; returns its index.
    pub fn add_instrument(&mut self, instrument: Instrument) -> Option<usize> {
        if self.instruments.len() >= MAX_INSTRUMENTS {
            return None;
        }
        self.instruments.push(instrument);
        Some(self.instruments.len() - 1)
    }

    /// Append a default instrument of `kind`.
    pub fn add_instrument_kind(&mut self, name: &str, kind: InstrumentKind) -> Option<usize> {
        self.add_instrument(Instrument::new(name, kind))
    }

    /// Whether any instrument is soloed.
    pub fn any_instrument_solo(&self) -> bool {
        self.instruments.iter().any(|i| i.solo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_project_has_one_pattern() {
        let p = Project::new("demo");
        assert_eq!(p.patterns.len(), 1);
        assert_eq!(p.tempo(), DEFAULT_BPM);
        assert_eq!(p.title.as_str(), "demo");
    }

    #[test]
    fn accessors_return_none_for_missing() {
        let p = Project::new("x");
        assert!(p.instrument(0).is_none());
        assert!(p.chain(3).is_none());
        assert!(p.pattern(1).is_none());
    }

    #[test]
    fn instrument_limit() {
        let mut p = Project::new("x");
        for _ in 0..MAX_INSTRUMENTS {
            assert!(p.add_instrument_kind("i", InstrumentKind::Analog).is_some());
        }
        assert!(p.add_instrument_kind("i", InstrumentKind::Analog).is_none());
    }
}
