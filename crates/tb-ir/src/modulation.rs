//! Modulation-matrix routing vocabulary and its per-instrument settings.

use crate::params::{param_set, ParamInfo};

/// Number of modulation sources: LFO1, LFO2, ENV1, ENV2.
pub const MOD_SOURCES: usize = 4;

/// A modulation source slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModSource {
    Lfo1 = 0,
    Lfo2 = 1,
    Env1 = 2,
    Env2 = 3,
}

impl ModSource {
    pub const ALL: [ModSource; MOD_SOURCES] =
        [ModSource::Lfo1, ModSource::Lfo2, ModSource::Env1, ModSource::Env2];

    pub fn name(self) -> &'static str {
        match self {
            ModSource::Lfo1 => "LFO1",
            ModSource::Lfo2 => "LFO2",
            ModSource::Env1 => "ENV1",
            ModSource::Env2 => "ENV2",
        }
    }
}

/// Where a modulation source is routed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ModDestination {
    #[default]
    None = 0,
    Pitch,
    Harmonics,
    Timbre,
    Morph,
    Cutoff,
    Resonance,
    Volume,
    Pan,
    Drive,
    Lfo1Rate,
    Lfo2Rate,
    Lfo1Amount,
    Lfo2Amount,
    Env1Amount,
    Env2Amount,
}

/// Number of destinations, including `None`.
pub const MOD_DESTINATIONS: usize = 16;

impl ModDestination {
    pub const ALL: [ModDestination; MOD_DESTINATIONS] = [
        ModDestination::None,
        ModDestination::Pitch,
        ModDestination::Harmonics,
        ModDestination::Timbre,
        ModDestination::Morph,
        ModDestination::Cutoff,
        ModDestination::Resonance,
        ModDestination::Volume,
        ModDestination::Pan,
        ModDestination::Drive,
        ModDestination::Lfo1Rate,
        ModDestination::Lfo2Rate,
        ModDestination::Lfo1Amount,
        ModDestination::Lfo2Amount,
        ModDestination::Env1Amount,
        ModDestination::Env2Amount,
    ];

    pub fn from_index(i: usize) -> Self {
        Self::ALL.get(i).copied().unwrap_or_default()
    }

    /// Valid range of the modulated value and how far full modulation moves it.
    ///
    /// Returns `(min, max, scale)`.
    pub fn range(self) -> (f32, f32, f32) {
        match self {
            // semitones
            ModDestination::Pitch => (-48.0, 48.0, 12.0),
            // gain multiplier
            ModDestination::Volume => (0.0, 2.0, 1.0),
            ModDestination::Pan => (-1.0, 1.0, 1.0),
            // octaves of rate change
            ModDestination::Lfo1Rate | ModDestination::Lfo2Rate => (-4.0, 4.0, 2.0),
            ModDestination::Lfo1Amount
            | ModDestination::Lfo2Amount
            | ModDestination::Env1Amount
            | ModDestination::Env2Amount => (0.0, 2.0, 1.0),
            _ => (0.0, 1.0, 1.0),
        }
    }

    /// Whether this destination targets another modulation source.
    pub fn is_cross_mod(self) -> bool {
        matches!(
            self,
            ModDestination::Lfo1Rate
                | ModDestination::Lfo2Rate
                | ModDestination::Lfo1Amount
                | ModDestination::Lfo2Amount
                | ModDestination::Env1Amount
                | ModDestination::Env2Amount
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ModDestination::None => "---",
            ModDestination::Pitch => "Pitch",
            ModDestination::Harmonics => "Harmonics",
            ModDestination::Timbre => "Timbre",
            ModDestination::Morph => "Morph",
            ModDestination::Cutoff => "Cutoff",
            ModDestination::Resonance => "Resonance",
            ModDestination::Volume => "Volume",
            ModDestination::Pan => "Pan",
            ModDestination::Drive => "Drive",
            ModDestination::Lfo1Rate => "LFO1 Rate",
            ModDestination::Lfo2Rate => "LFO2 Rate",
            ModDestination::Lfo1Amount => "LFO1 Amt",
            ModDestination::Lfo2Amount => "LFO2 Amt",
            ModDestination::Env1Amount => "ENV1 Amt",
            ModDestination::Env2Amount => "ENV2 Amt",
        }
    }
}

/// LFO waveform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LfoShape {
    #[default]
    Triangle,
    Saw,
    Square,
    SampleAndHold,
}

impl LfoShape {
    pub fn from_index(i: usize) -> Self {
        match i {
            1 => LfoShape::Saw,
            2 => LfoShape::Square,
            3 => LfoShape::SampleAndHold,
            _ => LfoShape::Triangle,
        }
    }
}

/// Tempo-synced LFO periods as (label, length in beats), slowest first.
pub const LFO_DIVISIONS: [(&str, f64); 15] = [
    ("8 bar", 32.0),
    ("4 bar", 16.0),
    ("2 bar", 8.0),
    ("1 bar", 4.0),
    ("1/2", 2.0),
    ("1/2T", 4.0 / 3.0),
    ("1/4", 1.0),
    ("1/4T", 2.0 / 3.0),
    ("1/8", 0.5),
    ("1/8T", 1.0 / 3.0),
    ("1/16", 0.25),
    ("1/16T", 1.0 / 6.0),
    ("1/32", 0.125),
    ("1/32T", 1.0 / 12.0),
    ("1/64", 0.0625),
];

param_set! {
    /// Routing of the two LFOs and two AD envelopes.
    pub struct ModParams {
        lfo1_rate: stepped("LFO1 Rate", 0.0, 14.0, 6.0),
        lfo1_shape: stepped("LFO1 Shape", 0.0, 3.0, 0.0),
        lfo1_dest: stepped("LFO1 Dest", 0.0, 15.0, 0.0),
        lfo1_depth: new("LFO1 Depth", -1.0, 1.0, 0.0),
        lfo2_rate: stepped("LFO2 Rate", 0.0, 14.0, 3.0),
        lfo2_shape: stepped("LFO2 Shape", 0.0, 3.0, 0.0),
        lfo2_dest: stepped("LFO2 Dest", 0.0, 15.0, 0.0),
        lfo2_depth: new("LFO2 Depth", -1.0, 1.0, 0.0),
        /// ms
        env1_attack: new("ENV1 Attack", 0.0, 5000.0, 5.0),
        env1_decay: new("ENV1 Decay", 1.0, 10000.0, 500.0),
        env1_dest: stepped("ENV1 Dest", 0.0, 15.0, 0.0),
        env1_depth: new("ENV1 Depth", -1.0, 1.0, 0.0),
        env2_attack: new("ENV2 Attack", 0.0, 5000.0, 5.0),
        env2_decay: new("ENV2 Decay", 1.0, 10000.0, 500.0),
        env2_dest: stepped("ENV2 Dest", 0.0, 15.0, 0.0),
        env2_depth: new("ENV2 Depth", -1.0, 1.0, 0.0),
    }
}

impl ModParams {
    /// Destination and depth of a source.
    pub fn route(&self, source: ModSource) -> (ModDestination, f32) {
        use crate::params::as_index;
        let (dest, depth) = match source {
            ModSource::Lfo1 => (self.lfo1_dest, self.lfo1_depth),
            ModSource::Lfo2 => (self.lfo2_dest, self.lfo2_depth),
            ModSource::Env1 => (self.env1_dest, self.env1_depth),
            ModSource::Env2 => (self.env2_dest, self.env2_depth),
        };
        (ModDestination::from_index(as_index(dest)), depth)
    }

    /// Point a source at a destination.
    pub fn set_route(&mut self, source: ModSource, dest: ModDestination, depth: f32) {
        let d = dest as usize as f32;
        let depth = depth.clamp(-1.0, 1.0);
        match source {
            ModSource::Lfo1 => (self.lfo1_dest, self.lfo1_depth) = (d, depth),
            ModSource::Lfo2 => (self.lfo2_dest, self.lfo2_depth) = (d, depth),
            ModSource::Env1 => (self.env1_dest, self.env1_depth) = (d, depth),
            ModSource::Env2 => (self.env2_dest, self.env2_depth) = (d, depth),
        }
    }
}
