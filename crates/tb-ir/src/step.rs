//! Step and effect-command types: the contents of one pattern cell.

/// Maximum number of effect commands carried by one step.
pub const MAX_EFFECTS: usize = 3;

/// Step volume meaning "use the instrument default".
pub const DEFAULT_VOLUME: u8 = 255;

/// Highest playable pitch.
pub const MAX_NOTE: u8 = 127;

/// A note value in a step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Note {
    /// No note
    #[default]
    None,
    /// Note on with MIDI note number (0-127, where 60 = C-4)
    On(u8),
    /// Note off / key release
    Off,
}

impl Note {
    /// Create a note from octave and semitone (0-11), clamped to the MIDI range.
    pub const fn from_octave_semitone(octave: u8, semitone: u8) -> Self {
        let n = octave as u16 * 12 + semitone as u16;
        Note::On(if n > MAX_NOTE as u16 { MAX_NOTE } else { n as u8 })
    }

    /// Get the pitch if this is a note on.
    pub const fn pitch(self) -> Option<u8> {
        match self {
            Note::On(n) => Some(n),
            _ => None,
        }
    }

    /// Get the octave if this is a note on.
    pub const fn octave(self) -> Option<u8> {
        match self {
            Note::On(n) => Some(n / 12),
            _ => None,
        }
    }

    /// Get the semitone (0-11) if this is a note on.
    pub const fn semitone(self) -> Option<u8> {
        match self {
            Note::On(n) => Some(n % 12),
            _ => None,
        }
    }
}

/// Kind of a per-step effect command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EffectKind {
    #[default]
    None = 0,
    /// Cycle {0, x, y} semitone offsets every 2 ticks (value = xy nibbles)
    Arpeggio = 1,
    /// Glide from the previous pitch on the track (value/16 semitones per tick)
    Portamento = 2,
    /// Sine pitch wobble (x = rate, y = depth)
    Vibrato = 3,
    /// Per-tick gain slide (x = up, y = down)
    VolumeSlide = 4,
    /// Voice pan, 128 = centre
    Pan = 5,
    /// Withhold the note-on for `value` ticks
    Delay = 6,
    /// Re-trigger the note every `value` ticks
    Retrigger = 7,
    /// Hard-stop the note at tick `value`
    Cut = 8,
    /// Release the note at tick `value`
    Off = 9,
}

impl EffectKind {
    /// All kinds in discriminant order.
    pub const ALL: [EffectKind; 10] = [
        EffectKind::None,
        EffectKind::Arpeggio,
        EffectKind::Portamento,
        EffectKind::Vibrato,
        EffectKind::VolumeSlide,
        EffectKind::Pan,
        EffectKind::Delay,
        EffectKind::Retrigger,
        EffectKind::Cut,
        EffectKind::Off,
    ];

    /// Decode from the stored byte; unknown values become `None`.
    pub fn from_u8(v: u8) -> Self {
        Self::ALL.get(v as usize).copied().unwrap_or(EffectKind::None)
    }

    /// Short display name for the effect.
    pub fn name(self) -> &'static str {
        match self {
            EffectKind::None => "",
            EffectKind::Arpeggio => "Arpeggio",
            EffectKind::Portamento => "Portamento",
            EffectKind::Vibrato => "Vibrato",
            EffectKind::VolumeSlide => "Vol Slide",
            EffectKind::Pan => "Pan",
            EffectKind::Delay => "Delay",
            EffectKind::Retrigger => "Retrigger",
            EffectKind::Cut => "Cut",
            EffectKind::Off => "Off",
        }
    }

    /// One-letter column mnemonic.
    pub fn letter(self) -> char {
        match self {
            EffectKind::None => '.',
            EffectKind::Arpeggio => 'A',
            EffectKind::Portamento => 'P',
            EffectKind::Vibrato => 'V',
            EffectKind::VolumeSlide => 'S',
            EffectKind::Pan => 'N',
            EffectKind::Delay => 'D',
            EffectKind::Retrigger => 'R',
            EffectKind::Cut => 'C',
            EffectKind::Off => 'O',
        }
    }
}

/// A tagged effect command with an 8-bit argument.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EffectCommand {
    pub kind: EffectKind,
    pub value: u8,
}

impl EffectCommand {
    pub const NONE: EffectCommand = EffectCommand { kind: EffectKind::None, value: 0 };

    pub const fn new(kind: EffectKind, value: u8) -> Self {
        Self { kind, value }
    }

    pub fn is_none(&self) -> bool {
        self.kind == EffectKind::None
    }

    /// High nibble of the value.
    pub const fn x(&self) -> u8 {
        self.value >> 4
    }

    /// Low nibble of the value.
    pub const fn y(&self) -> u8 {
        self.value & 0x0F
    }
}

/// One grid cell of a pattern track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step {
    pub note: Note,
    /// Instrument index, `None` when the step carries no instrument
    pub instrument: Option<u8>,
    /// 0-255, 255 = instrument default
    pub volume: u8,
    pub effects: [EffectCommand; MAX_EFFECTS],
}

impl Default for Step {
    fn default() -> Self {
        Self::empty()
    }
}

impl Step {
    /// Create an empty step.
    pub const fn empty() -> Self {
        Self {
            note: Note::None,
            instrument: None,
            volume: DEFAULT_VOLUME,
            effects: [EffectCommand::NONE; MAX_EFFECTS],
        }
    }

    /// A note-on step for `instrument`.
    pub const fn note(pitch: u8, instrument: u8) -> Self {
        let mut s = Self::empty();
        s.note = Note::On(if pitch > MAX_NOTE { MAX_NOTE } else { pitch });
        s.instrument = Some(instrument);
        s
    }

    /// A note-off step. Off steps never carry an instrument.
    pub const fn off() -> Self {
        let mut s = Self::empty();
        s.note = Note::Off;
        s
    }

    /// Builder: set an effect column.
    pub fn with_effect(mut self, column: usize, kind: EffectKind, value: u8) -> Self {
        if let Some(slot) = self.effects.get_mut(column) {
            *slot = EffectCommand::new(kind, value);
        }
        self
    }

    /// Builder: set the volume column.
    pub fn with_volume(mut self, volume: u8) -> Self {
        self.volume = volume;
        self
    }

    /// Normalise the step so that it respects the document invariants.
    pub fn normalized(mut self) -> Self {
        match self.note {
            Note::Off => self.instrument = None,
            Note::On(p) if p > MAX_NOTE => self.note = Note::On(MAX_NOTE),
            _ => {}
        }
        self
    }

    /// Returns true if the step is completely empty.
    pub fn is_empty(&self) -> bool {
        self.note == Note::None
            && self.instrument.is_none()
            && self.volume == DEFAULT_VOLUME
            && self.effects.iter().all(EffectCommand::is_none)
    }

    /// First effect of the given kind, if any.
    pub fn effect(&self, kind: EffectKind) -> Option<EffectCommand> {
        self.effects.iter().copied().find(|e| e.kind == kind)
    }

    /// Velocity in 0..=1 derived from the volume column.
    pub fn velocity(&self) -> f32 {
        if self.volume == DEFAULT_VOLUME {
            1.0
        } else {
            self.volume as f32 / 254.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_step_drops_instrument() {
        let mut s = Step::note(60, 3);
        s.note = Note::Off;
        assert_eq!(s.normalized().instrument, None);
    }

    #[test]
    fn note_clamped_to_midi_range() {
        assert_eq!(Note::from_octave_semitone(11, 11), Note::On(127));
        assert_eq!(Step::note(200, 0).note, Note::On(127));
    }

    #[test]
    fn effect_nibbles() {
        let e = EffectCommand::new(EffectKind::Arpeggio, 0x47);
        assert_eq!(e.x(), 4);
        assert_eq!(e.y(), 7);
    }

    #[test]
    fn effect_kind_decode_unknown_is_none() {
        assert_eq!(EffectKind::from_u8(7), EffectKind::Retrigger);
        assert_eq!(EffectKind::from_u8(42), EffectKind::None);
    }

    #[test]
    fn default_volume_is_full_velocity() {
        assert_eq!(Step::note(60, 0).velocity(), 1.0);
        assert_eq!(Step::note(60, 0).with_volume(127).velocity(), 0.5);
    }

    #[test]
    fn effect_lookup_finds_any_column() {
        let s = Step::note(60, 0).with_effect(2, EffectKind::Cut, 3);
        assert_eq!(s.effect(EffectKind::Cut).map(|e| e.value), Some(3));
        assert!(s.effect(EffectKind::Delay).is_none());
        assert!(!s.is_empty());
        assert!(Step::empty().is_empty());
    }
}
