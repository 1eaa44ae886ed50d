//! Instrument definitions: shared mixer fields plus per-engine parameters.

use arrayvec::{ArrayString, ArrayVec};

use crate::fm_patch::FmParams;
use crate::modulation::ModParams;
use crate::params::{
    as_index, param_set, AnalogParams, MacroOscParams, ParamInfo, SamplerParams, SlicerParams,
};

/// Maximum slices held by a slicer instrument.
pub const MAX_SLICES: usize = 64;

/// Maximum length of an instrument name.
pub const NAME_LEN: usize = 16;

/// The synthesis engine behind an instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    MacroOsc,
    Fm,
    Sampler,
    Slicer,
    Analog,
}

impl InstrumentKind {
    pub const ALL: [InstrumentKind; 5] = [
        InstrumentKind::MacroOsc,
        InstrumentKind::Fm,
        InstrumentKind::Sampler,
        InstrumentKind::Slicer,
        InstrumentKind::Analog,
    ];

    pub fn name(self) -> &'static str {
        match self {
            InstrumentKind::MacroOsc => "Macro Osc",
            InstrumentKind::Fm => "FM",
            InstrumentKind::Sampler => "Sampler",
            InstrumentKind::Slicer => "Slicer",
            InstrumentKind::Analog => "Analog",
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }
}

/// Insert filter mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FilterMode {
    #[default]
    Off,
    LowPass,
    HighPass,
    BandPass,
}

impl FilterMode {
    pub fn from_index(i: usize) -> Self {
        match i {
            1 => FilterMode::LowPass,
            2 => FilterMode::HighPass,
            3 => FilterMode::BandPass,
            _ => FilterMode::Off,
        }
    }
}

param_set! {
    /// Per-instrument insert chain: filter, 3-band EQ, drive, compressor.
    pub struct InsertParams {
        filter_mode: stepped("Filter", 0.0, 3.0, 0.0),
        filter_cutoff: new("Flt Cutoff", 0.0, 1.0, 1.0),
        filter_resonance: new("Flt Reso", 0.0, 1.0, 0.0),
        /// dB
        eq_low: new("EQ Low", -12.0, 12.0, 0.0),
        eq_mid: new("EQ Mid", -12.0, 12.0, 0.0),
        eq_high: new("EQ High", -12.0, 12.0, 0.0),
        drive: new("Drive", 0.0, 1.0, 0.0),
        /// dBFS
        comp_threshold: new("Comp Thresh", -60.0, 0.0, 0.0),
        comp_ratio: new("Comp Ratio", 1.0, 20.0, 1.0),
    }
}

impl InsertParams {
    pub fn filter(&self) -> FilterMode {
        FilterMode::from_index(as_index(self.filter_mode))
    }

    /// True when every stage is neutral.
    pub fn is_bypassed(&self) -> bool {
        self.filter() == FilterMode::Off
            && self.eq_low == 0.0
            && self.eq_mid == 0.0
            && self.eq_high == 0.0
            && self.drive == 0.0
            && self.comp_ratio <= 1.0
    }
}

/// FX-bus send levels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sends {
    pub delay: f32,
    pub reverb: f32,
}

/// Manual slice points (sample frames), ascending.
pub type SlicePoints = ArrayVec<u32, MAX_SLICES>;

/// Per-engine parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineParams {
    MacroOsc { params: MacroOscParams, modulation: ModParams },
    Fm { params: FmParams },
    Sampler { params: SamplerParams, modulation: ModParams },
    Slicer { params: SlicerParams, slices: SlicePoints },
    Analog { params: AnalogParams, modulation: ModParams },
}

impl EngineParams {
    /// Default parameters for an engine kind.
    pub fn new(kind: InstrumentKind) -> Self {
        match kind {
            InstrumentKind::MacroOsc => EngineParams::MacroOsc {
                params: MacroOscParams::default(),
                modulation: ModParams::default(),
            },
            InstrumentKind::Fm => EngineParams::Fm { params: FmParams::default() },
            InstrumentKind::Sampler => EngineParams::Sampler {
                params: SamplerParams::default(),
                modulation: ModParams::default(),
            },
            InstrumentKind::Slicer => EngineParams::Slicer {
                params: SlicerParams::default(),
                slices: SlicePoints::new(),
            },
            InstrumentKind::Analog => EngineParams::Analog {
                params: AnalogParams::default(),
                modulation: ModParams::default(),
            },
        }
    }

    pub fn kind(&self) -> InstrumentKind {
        match self {
            EngineParams::MacroOsc { .. } => InstrumentKind::MacroOsc,
            EngineParams::Fm { .. } => InstrumentKind::Fm,
            EngineParams::Sampler { .. } => InstrumentKind::Sampler,
            EngineParams::Slicer { .. } => InstrumentKind::Slicer,
            EngineParams::Analog { .. } => InstrumentKind::Analog,
        }
    }

    /// Modulation routing, for engines that own a matrix.
    pub fn modulation(&self) -> Option<&ModParams> {
        match self {
            EngineParams::MacroOsc { modulation, .. }
            | EngineParams::Sampler { modulation, .. }
            | EngineParams::Analog { modulation, .. } => Some(modulation),
            _ => None,
        }
    }

    pub fn modulation_mut(&mut self) -> Option<&mut ModParams> {
        match self {
            EngineParams::MacroOsc { modulation, .. }
            | EngineParams::Sampler { modulation, .. }
            | EngineParams::Analog { modulation, .. } => Some(modulation),
            _ => None,
        }
    }

    fn engine_count(&self) -> usize {
        match self {
            EngineParams::MacroOsc { params, .. } => params.param_count(),
            EngineParams::Fm { params } => params.param_count(),
            EngineParams::Sampler { params, .. } => params.param_count(),
            EngineParams::Slicer { params, .. } => params.param_count(),
            EngineParams::Analog { params, .. } => params.param_count(),
        }
    }

    /// Engine parameters first, then modulation routing.
    pub fn param_count(&self) -> usize {
        self.engine_count() + self.modulation().map_or(0, ModParams::param_count)
    }

    pub fn get_parameter(&self, index: usize) -> Option<f32> {
        let n = self.engine_count();
        if index >= n {
            return self.modulation()?.get_parameter(index - n);
        }
        match self {
            EngineParams::MacroOsc { params, .. } => params.get_parameter(index),
            EngineParams::Fm { params } => params.get_parameter(index),
            EngineParams::Sampler { params, .. } => params.get_parameter(index),
            EngineParams::Slicer { params, .. } => params.get_parameter(index),
            EngineParams::Analog { params, .. } => params.get_parameter(index),
        }
    }

    /// Clamped set; returns false for an unknown index.
    pub fn set_parameter(&mut self, index: usize, value: f32) -> bool {
        let n = self.engine_count();
        if index >= n {
            return match self.modulation_mut() {
                Some(m) => m.set_parameter(index - n, value),
                None => false,
            };
        }
        match self {
            EngineParams::MacroOsc { params, .. } => params.set_parameter(index, value),
            EngineParams::Fm { params } => params.set_parameter(index, value),
            EngineParams::Sampler { params, .. } => params.set_parameter(index, value),
            EngineParams::Slicer { params, .. } => params.set_parameter(index, value),
            EngineParams::Analog { params, .. } => params.set_parameter(index, value),
        }
    }

    /// Metadata of a parameter. FM patch bytes report their byte range.
    pub fn param_info(&self, index: usize) -> Option<ParamInfo> {
        let n = self.engine_count();
        if index >= n {
            self.modulation()?;
            return ModParams::PARAMS.get(index - n).copied();
        }
        match self {
            EngineParams::MacroOsc { .. } => MacroOscParams::PARAMS.get(index).copied(),
            EngineParams::Fm { params } => Some(ParamInfo::stepped(
                "Patch Byte",
                0.0,
                crate::fm_patch::UNPACKED_MAX[index] as f32,
                params.voice[index] as f32,
            )),
            EngineParams::Sampler { .. } => SamplerParams::PARAMS.get(index).copied(),
            EngineParams::Slicer { .. } => SlicerParams::PARAMS.get(index).copied(),
            EngineParams::Analog { .. } => AnalogParams::PARAMS.get(index).copied(),
        }
    }
}

/// An instrument of the project palette.
#[derive(Clone, Debug, PartialEq)]
pub struct Instrument {
    pub name: ArrayString<NAME_LEN>,
    /// 0.0..=1.0
    pub volume: f32,
    /// -1.0 (left) ..= 1.0 (right)
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
    pub insert: InsertParams,
    pub sends: Sends,
    pub engine: EngineParams,
}

impl Instrument {
    /// Create an instrument with default settings for `kind`.
    pub fn new(name: &str, kind: InstrumentKind) -> Self {
        let mut n = ArrayString::new();
        for c in name.chars() {
            if n.try_push(c).is_err() {
                break;
            }
        }
        Self {
            name: n,
            volume: 0.8,
            pan: 0.0,
            mute: false,
            solo: false,
            insert: InsertParams::default(),
            sends: Sends::default(),
            engine: EngineParams::new(kind),
        }
    }

    pub fn kind(&self) -> InstrumentKind {
        self.engine.kind()
    }

    pub fn set_volume(&mut self, v: f32) {
        self.volume = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
    }

    pub fn set_pan(&mut self, p: f32) {
        self.pan = if p.is_nan() { 0.0 } else { p.clamp(-1.0, 1.0) };
    }

    /// Insert a manual slice point, keeping the list ascending. Returns
    /// false for a non-slicer, a duplicate or a full list.
    pub fn insert_slice(&mut self, frame: u32) -> bool {
        let EngineParams::Slicer { slices, .. } = &mut self.engine else {
            return false;
        };
        match slices.binary_search(&frame) {
            Ok(_) => false,
            Err(at) => slices.try_insert(at, frame).is_ok(),
        }
    }

    pub fn set_sends(&mut self, delay: f32, reverb: f32) {
        self.sends = Sends {
            delay: if delay.is_nan() { 0.0 } else { delay.clamp(0.0, 1.0) },
            reverb: if reverb.is_nan() { 0.0 } else { reverb.clamp(0.0, 1.0) },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulation::ModDestination;

    #[test]
    fn name_is_truncated() {
        let inst = Instrument::new("a very long instrument name", InstrumentKind::Fm);
        assert_eq!(inst.name.len(), NAME_LEN);
    }

    #[test]
    fn modulation_params_follow_engine_params() {
        let mut engine = EngineParams::new(InstrumentKind::Analog);
        let n = AnalogParams::PARAMS.len();
        assert_eq!(engine.param_count(), n + ModParams::PARAMS.len());
        assert!(engine.set_parameter(n + 2, ModDestination::Cutoff as usize as f32));
        assert_eq!(engine.modulation().map(|m| m.lfo1_dest), Some(5.0));
        assert_eq!(engine.param_info(n).map(|i| i.name), Some("LFO1 Rate"));
    }

    #[test]
    fn fm_and_slicer_have_no_matrix() {
        let fm = EngineParams::new(InstrumentKind::Fm);
        assert!(fm.modulation().is_none());
        assert_eq!(fm.param_count(), crate::fm_patch::UNPACKED_SIZE);
        let mut slicer = EngineParams::new(InstrumentKind::Slicer);
        assert!(!slicer.set_parameter(SlicerParams::PARAMS.len(), 1.0));
    }

    #[test]
    fn shared_fields_are_clamped() {
        let mut inst = Instrument::new("x", InstrumentKind::Sampler);
        inst.set_volume(3.0);
        inst.set_pan(-9.0);
        inst.set_sends(0.5, 2.0);
        assert_eq!((inst.volume, inst.pan), (1.0, -1.0));
        assert_eq!((inst.sends.delay, inst.sends.reverb), (0.5, 1.0));
    }

    #[test]
    fn kind_byte_round_trip() {
        for k in InstrumentKind::ALL {
            assert_eq!(InstrumentKind::from_u8(k.to_u8()), Some(k));
        }
        assert_eq!(InstrumentKind::from_u8(9), None);
    }
}
