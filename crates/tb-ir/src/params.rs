//! Parameter metadata and the per-engine parameter sets.
//!
//! Every set stores plain `f32` values addressed by index, with a static
//! table describing names, ranges and defaults. Setting a value clamps it
//! into range (rounding stepped parameters); unknown indices are ignored.

/// Metadata describing one parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamInfo {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    /// Integer-valued (selectors, counts)
    pub stepped: bool,
}

impl ParamInfo {
    pub const fn new(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self { name, min, max, default, stepped: false }
    }

    pub const fn stepped(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self { name, min, max, default, stepped: true }
    }

    /// Clamp (and round, for stepped parameters) a value into range.
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default;
        }
        let v = value.clamp(self.min, self.max);
        if self.stepped {
            libm::roundf(v)
        } else {
            v
        }
    }
}

/// Declares a parameter set: a struct of `f32` fields with a matching
/// `PARAMS` table, `Default`, and index-based accessors.
macro_rules! param_set {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $(#[$fmeta:meta])* $field:ident : $ctor:ident($label:literal, $min:expr, $max:expr, $def:expr), )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: f32, )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self { $( $field: $def, )* }
            }
        }

        impl $name {
            pub const PARAMS: &'static [ParamInfo] = &[ $( ParamInfo::$ctor($label, $min, $max, $def), )* ];

            pub fn param_count(&self) -> usize {
                Self::PARAMS.len()
            }

            pub fn get_parameter(&self, index: usize) -> Option<f32> {
                let values = [ $( self.$field, )* ];
                values.get(index).copied()
            }

            /// Clamped set; returns false for an unknown index.
            pub fn set_parameter(&mut self, index: usize, value: f32) -> bool {
                let Some(info) = Self::PARAMS.get(index) else {
                    return false;
                };
                let value = info.clamp(value);
                let fields = [ $( &mut self.$field, )* ];
                if let Some(f) = fields.into_iter().nth(index) {
                    *f = value;
                }
                true
            }
        }
    };
}

pub(crate) use param_set;

/// Read a stepped parameter as an index.
#[inline]
pub fn as_index(value: f32) -> usize {
    if value <= 0.0 {
        0
    } else {
        value as usize
    }
}

param_set! {
    /// Multi-engine oscillator parameters shared by all 16 algorithms.
    pub struct MacroOscParams {
        algorithm: stepped("Algorithm", 0.0, 15.0, 0.0),
        harmonics: new("Harmonics", 0.0, 1.0, 0.5),
        timbre: new("Timbre", 0.0, 1.0, 0.5),
        morph: new("Morph", 0.0, 1.0, 0.5),
        /// ms
        attack: new("Attack", 0.0, 2000.0, 2.0),
        /// ms
        decay: new("Decay", 5.0, 5000.0, 400.0),
        sustain: new("Sustain", 0.0, 1.0, 0.6),
        /// ms
        release: new("Release", 5.0, 5000.0, 200.0),
        cutoff: new("Cutoff", 0.0, 1.0, 1.0),
        resonance: new("Resonance", 0.0, 1.0, 0.0),
        polyphony: stepped("Polyphony", 1.0, 16.0, 8.0),
    }
}

param_set! {
    /// Sample playback parameters.
    pub struct SamplerParams {
        start: new("Start", 0.0, 1.0, 0.0),
        end: new("End", 0.0, 1.0, 1.0),
        /// 0 = off, 1 = forward, 2 = ping-pong
        loop_mode: stepped("Loop", 0.0, 2.0, 0.0),
        loop_start: new("Loop Start", 0.0, 1.0, 0.0),
        tune: stepped("Tune", -24.0, 24.0, 0.0),
        /// cents
        fine: new("Fine", -100.0, 100.0, 0.0),
        attack: new("Attack", 0.0, 5000.0, 1.0),
        decay: new("Decay", 1.0, 5000.0, 200.0),
        sustain: new("Sustain", 0.0, 1.0, 1.0),
        release: new("Release", 1.0, 5000.0, 50.0),
        cutoff: new("Cutoff", 0.0, 1.0, 1.0),
        resonance: new("Resonance", 0.0, 1.0, 0.0),
        filter_env: new("Filter Env", -1.0, 1.0, 0.0),
        filter_attack: new("F Attack", 0.0, 5000.0, 1.0),
        filter_decay: new("F Decay", 1.0, 5000.0, 300.0),
        filter_sustain: new("F Sustain", 0.0, 1.0, 0.0),
        filter_release: new("F Release", 1.0, 5000.0, 100.0),
        polyphony: stepped("Polyphony", 1.0, 16.0, 8.0),
    }
}

param_set! {
    /// Beat slicer parameters.
    pub struct SlicerParams {
        /// 0 = equal, 1 = transient, 2 = manual
        mode: stepped("Mode", 0.0, 2.0, 0.0),
        divisions: stepped("Divisions", 2.0, 64.0, 8.0),
        sensitivity: new("Sensitivity", 0.0, 1.0, 0.5),
        /// playback speed, independent of pitch
        speed: new("Speed", 0.25, 4.0, 1.0),
        /// semitones
        pitch: new("Pitch", -24.0, 24.0, 0.0),
        attack: new("Attack", 0.0, 1000.0, 1.0),
        release: new("Release", 1.0, 2000.0, 30.0),
        polyphony: stepped("Polyphony", 1.0, 16.0, 4.0),
    }
}

param_set! {
    /// Virtual-analog parameters.
    pub struct AnalogParams {
        /// 0 = saw, 1 = square, 2 = triangle, 3 = sine
        osc1_wave: stepped("Osc1 Wave", 0.0, 3.0, 0.0),
        osc1_octave: stepped("Osc1 Oct", -2.0, 2.0, 0.0),
        osc1_detune: new("Osc1 Detune", -50.0, 50.0, 0.0),
        osc1_level: new("Osc1 Level", 0.0, 1.0, 0.8),
        osc2_wave: stepped("Osc2 Wave", 0.0, 3.0, 0.0),
        osc2_octave: stepped("Osc2 Oct", -2.0, 2.0, 0.0),
        osc2_detune: new("Osc2 Detune", -50.0, 50.0, 7.0),
        osc2_level: new("Osc2 Level", 0.0, 1.0, 0.6),
        osc3_wave: stepped("Osc3 Wave", 0.0, 3.0, 1.0),
        osc3_octave: stepped("Osc3 Oct", -2.0, 2.0, -1.0),
        osc3_detune: new("Osc3 Detune", -50.0, 50.0, -5.0),
        osc3_level: new("Osc3 Level", 0.0, 1.0, 0.0),
        noise: new("Noise", 0.0, 1.0, 0.0),
        cutoff: new("Cutoff", 0.0, 1.0, 0.6),
        resonance: new("Resonance", 0.0, 1.0, 0.2),
        env_amount: new("Env Amount", -1.0, 1.0, 0.4),
        drive: new("Drive", 0.0, 1.0, 0.0),
        filter_attack: new("F Attack", 0.0, 5000.0, 2.0),
        filter_decay: new("F Decay", 1.0, 5000.0, 300.0),
        filter_sustain: new("F Sustain", 0.0, 1.0, 0.2),
        filter_release: new("F Release", 1.0, 5000.0, 200.0),
        attack: new("Attack", 0.0, 5000.0, 2.0),
        decay: new("Decay", 1.0, 5000.0, 300.0),
        sustain: new("Sustain", 0.0, 1.0, 0.7),
        release: new("Release", 1.0, 5000.0, 200.0),
        /// 0 = polyphonic, 1 = mono legato
        mode: stepped("Mode", 0.0, 1.0, 0.0),
        /// ms, mono legato only
        glide: new("Glide", 0.0, 2000.0, 60.0),
        polyphony: stepped("Polyphony", 1.0, 16.0, 8.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_table() {
        let p = MacroOscParams::default();
        for (i, info) in MacroOscParams::PARAMS.iter().enumerate() {
            assert_eq!(p.get_parameter(i), Some(info.default), "{}", info.name);
        }
        assert_eq!(p.param_count(), 11);
    }

    #[test]
    fn set_clamps_and_rounds() {
        let mut p = AnalogParams::default();
        assert!(p.set_parameter(0, 2.6));
        assert_eq!(p.osc1_wave, 3.0);
        assert!(p.set_parameter(13, 4.0));
        assert_eq!(p.cutoff, 1.0);
        assert!(p.set_parameter(15, f32::NAN));
        assert_eq!(p.env_amount, 0.4);
    }

    #[test]
    fn unknown_index_is_ignored() {
        let mut p = SlicerParams::default();
        let before = p;
        assert!(!p.set_parameter(99, 1.0));
        assert_eq!(p, before);
        assert_eq!(p.get_parameter(99), None);
    }

    #[test]
    fn field_order_matches_index() {
        let mut p = SamplerParams::default();
        p.set_parameter(4, 7.0);
        assert_eq!(p.tune, 7.0);
        p.set_parameter(17, 3.0);
        assert_eq!(p.polyphony, 3.0);
    }
}
