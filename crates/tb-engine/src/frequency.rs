//! Pitch conversions for the synthesis engines.
//!
//! Pitches are fractional MIDI note numbers (60.0 = C-4, 69.0 = A-4 = 440 Hz).

/// Frequency of MIDI note 69.
pub const A4_HZ: f32 = 440.0;

/// Frequency ratio of a pitch offset in semitones.
#[inline]
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    libm::exp2f(semitones / 12.0)
}

/// Frequency ratio of a pitch offset in cents.
#[inline]
pub fn cents_to_ratio(cents: f32) -> f32 {
    libm::exp2f(cents / 1200.0)
}

/// Convert a fractional MIDI note to Hz.
#[inline]
pub fn note_to_hz(note: f32) -> f32 {
    A4_HZ * semitones_to_ratio(note.clamp(-24.0, 151.0) - 69.0)
}

/// Convert Hz to a fractional MIDI note.
pub fn hz_to_note(hz: f32) -> f32 {
    if hz <= 0.0 {
        return 0.0;
    }
    69.0 + 12.0 * libm::log2f(hz / A4_HZ)
}

/// Phase increment per sample (cycles) of a note at `sample_rate`.
#[inline]
pub fn note_to_increment(note: f32, sample_rate: f32) -> f32 {
    if sample_rate <= 0.0 {
        return 0.0;
    }
    (note_to_hz(note) / sample_rate).min(0.5)
}

/// Nearest C (multiple of 12) to a fractional note.
pub fn nearest_c(note: f32) -> u8 {
    let c = libm::roundf(note / 12.0) * 12.0;
    c.clamp(0.0, 120.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn a4_is_440() {
        assert_relative_eq!(note_to_hz(69.0), 440.0, epsilon = 1e-3);
        assert_relative_eq!(note_to_hz(81.0), 880.0, epsilon = 1e-2);
    }

    #[test]
    fn octave_doubles_ratio() {
        assert_relative_eq!(semitones_to_ratio(12.0), 2.0, epsilon = 1e-6);
        assert_relative_eq!(semitones_to_ratio(-12.0), 0.5, epsilon = 1e-6);
        assert_relative_eq!(cents_to_ratio(1200.0), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn hz_note_inverse() {
        assert_relative_eq!(hz_to_note(note_to_hz(57.3)), 57.3, epsilon = 1e-3);
        assert_eq!(hz_to_note(0.0), 0.0);
    }

    #[test]
    fn increment_is_capped_at_nyquist() {
        assert_eq!(note_to_increment(150.0, 8000.0), 0.5);
        assert_eq!(note_to_increment(60.0, 0.0), 0.0);
    }

    #[test]
    fn nearest_c_rounds_either_way() {
        assert_eq!(nearest_c(65.9), 60);
        assert_eq!(nearest_c(66.1), 72);
        assert_eq!(nearest_c(-3.0), 0);
    }
}
