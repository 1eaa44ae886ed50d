//! Instrument processors: the five synthesis engines behind one contract.

pub mod analog;
pub mod fm;
pub mod macro_osc;
pub mod sampler;
pub mod slicer;

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use tb_ir::{EffectCommand, EngineParams, Instrument, InstrumentKind, MAX_EFFECTS};
use tracing::{debug, warn};

use crate::dsp::envelope::Adsr;
use crate::modulation::ModOutputs;
use crate::sample::SampleBuffer;
use crate::state::{self, StateError};
use crate::tracker_fx::FxEvent;
use crate::voice_pool::VoiceHandle;

pub use analog::Analog;
pub use fm::FmSynth;
pub use macro_osc::MacroOsc;
pub use sampler::Sampler;
pub use slicer::Slicer;

/// Voice capacity of every pooled engine.
pub const MAX_VOICES: usize = 16;

/// A trigger with no effect commands.
pub const NO_EFFECTS: [EffectCommand; MAX_EFFECTS] = [EffectCommand::NONE; MAX_EFFECTS];

/// The contract shared by all instrument engines.
///
/// Everything except `get_state`/`set_state` is real-time safe.
pub trait Processor {
    fn kind(&self) -> InstrumentKind;

    /// Prepare for a sample rate. Clears all voices.
    fn init(&mut self, sample_rate: f32);

    fn note_on(&mut self, note: u8, velocity: f32) -> Option<VoiceHandle> {
        self.note_on_with_fx(note, velocity, &NO_EFFECTS, None)
    }

    /// Start a voice driven by tracker effects. `previous` is the pitch the
    /// triggering track played last (portamento origin). The audible note-on
    /// comes from the effect state, so a delay command holds it back.
    fn note_on_with_fx(
        &mut self,
        note: u8,
        velocity: f32,
        effects: &[EffectCommand; MAX_EFFECTS],
        previous: Option<f32>,
    ) -> Option<VoiceHandle>;

    /// Release one voice. Stale handles are ignored.
    fn note_off(&mut self, voice: VoiceHandle);

    /// Release every voice, letting tails ring.
    fn all_notes_off(&mut self);

    /// Silence every voice immediately.
    fn kill_all(&mut self);

    /// Add this block's output to `out_l`/`out_r`.
    fn render(&mut self, out_l: &mut [f32], out_r: &mut [f32]);

    fn active_voices(&self) -> usize;

    /// Tick length for effect timing; retimes sounding voices.
    fn set_samples_per_tick(&mut self, samples_per_tick: f64);

    /// Current parameters as document values.
    fn engine_params(&self) -> EngineParams;

    /// Take over parameters of the same engine kind.
    fn apply_params(&mut self, params: &EngineParams);

    /// Replace the loaded sample, for engines that play one.
    fn set_sample(&mut self, _sample: Option<Arc<SampleBuffer>>) {}

    fn sample(&self) -> Option<&Arc<SampleBuffer>> {
        None
    }

    fn modulation(&self) -> Option<&ModOutputs> {
        None
    }

    /// Restart modulation sources (transport start).
    fn reset_modulation(&mut self) {}

    fn param_count(&self) -> usize {
        self.engine_params().param_count()
    }

    fn get_parameter(&self, index: usize) -> Option<f32> {
        self.engine_params().get_parameter(index)
    }

    /// Clamped set; returns false for an unknown index.
    fn set_parameter(&mut self, index: usize, value: f32) -> bool {
        let mut params = self.engine_params();
        if !params.set_parameter(index, value) {
            return false;
        }
        self.apply_params(&params);
        true
    }

    /// Pick up document changes for this instrument.
    fn sync(&mut self, instrument: &Instrument) {
        if instrument.kind() == self.kind() && instrument.engine != self.engine_params() {
            self.apply_params(&instrument.engine);
        }
    }

    /// Snapshot parameters and sample. Allocates.
    fn get_state(&self) -> Vec<u8> {
        state::encode(&self.engine_params(), self.sample().map(|s| s.as_ref()))
    }

    /// Restore a snapshot. On error nothing changes. Allocates.
    fn set_state(&mut self, bytes: &[u8]) -> Result<(), StateError> {
        let decoded = state::decode(bytes)
            .inspect_err(|err| warn!(%err, len = bytes.len(), "bad instrument state"))?;
        if decoded.kind() != self.kind() {
            warn!(expected = ?self.kind(), found = ?decoded.kind(), "instrument state for another engine");
            return Err(StateError::KindMismatch { expected: self.kind(), found: decoded.kind() });
        }
        self.apply_params(&decoded.params);
        if let Some(s) = decoded.sample {
            self.set_sample(Some(Arc::new(s)));
        }
        Ok(())
    }
}

/// Drive an amplitude envelope from a tracker-FX event. Returns true when
/// the voice (re)starts and oscillators should reset.
#[inline]
pub(crate) fn apply_fx_event(event: FxEvent, amp: &mut Adsr) -> bool {
    match event {
        FxEvent::NoteOn => {
            amp.gate_on();
            true
        }
        FxEvent::NoteOff => {
            amp.gate_off();
            false
        }
        FxEvent::Cut => {
            amp.kill();
            false
        }
        FxEvent::None => false,
    }
}

/// Closed set of engines, dispatched without virtual calls.
#[derive(Debug)]
pub enum InstrumentProcessor {
    MacroOsc(Box<MacroOsc>),
    Fm(Box<FmSynth>),
    Sampler(Box<Sampler>),
    Slicer(Box<Slicer>),
    Analog(Box<Analog>),
}

macro_rules! dispatch {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            InstrumentProcessor::MacroOsc($p) => $body,
            InstrumentProcessor::Fm($p) => $body,
            InstrumentProcessor::Sampler($p) => $body,
            InstrumentProcessor::Slicer($p) => $body,
            InstrumentProcessor::Analog($p) => $body,
        }
    };
}

impl InstrumentProcessor {
    pub fn new(kind: InstrumentKind, sample_rate: f32) -> Self {
        match kind {
            InstrumentKind::MacroOsc => Self::MacroOsc(Box::new(MacroOsc::new(sample_rate))),
            InstrumentKind::Fm => Self::Fm(Box::new(FmSynth::new(sample_rate))),
            InstrumentKind::Sampler => Self::Sampler(Box::new(Sampler::new(sample_rate))),
            InstrumentKind::Slicer => Self::Slicer(Box::new(Slicer::new(sample_rate))),
            InstrumentKind::Analog => Self::Analog(Box::new(Analog::new(sample_rate))),
        }
    }

    /// A processor configured from a document instrument.
    pub fn for_instrument(instrument: &Instrument, sample_rate: f32) -> Self {
        let mut p = Self::new(instrument.kind(), sample_rate);
        p.apply_params(&instrument.engine);
        p
    }

    /// Decode and analyse sample data. Returns false (keeping the previous
    /// sample) when the data is unusable or the engine plays no samples.
    /// Allocates; call before installing the processor.
    pub fn load_sample(&mut self, data: &[f32], sample_rate: u32, channels: usize) -> bool {
        if !matches!(self, Self::Sampler(_) | Self::Slicer(_)) {
            warn!(kind = ?self.kind(), "engine plays no samples");
            return false;
        }
        match SampleBuffer::from_interleaved(data, sample_rate, channels) {
            Some(buffer) => {
                debug!(frames = buffer.frames(), sample_rate, channels, "sample loaded");
                self.set_sample(Some(Arc::new(buffer)));
                true
            }
            None => {
                warn!(len = data.len(), sample_rate, channels, "unusable sample data");
                false
            }
        }
    }

    /// Start the whole-sample preview voice (slicer only).
    pub fn start_preview(&mut self, velocity: f32) {
        if let Self::Slicer(s) = self {
            s.start_preview(velocity);
        }
    }

    pub fn stop_preview(&mut self) {
        if let Self::Slicer(s) = self {
            s.stop_preview();
        }
    }

    /// Frame position of the slicer preview voice while it plays.
    pub fn preview_position(&self) -> Option<u32> {
        match self {
            Self::Slicer(s) => s.preview_position(),
            _ => None,
        }
    }

    /// Replace the FM patch from a 156/128-byte buffer.
    pub fn import_patch(&mut self, bytes: &[u8]) -> Result<(), tb_ir::PatchError> {
        match self {
            Self::Fm(fm) => fm.import_patch(bytes),
            _ => Err(tb_ir::PatchError::BadSize(bytes.len())),
        }
    }
}

impl Processor for InstrumentProcessor {
    fn kind(&self) -> InstrumentKind {
        dispatch!(self, p => p.kind())
    }

    fn init(&mut self, sample_rate: f32) {
        dispatch!(self, p => p.init(sample_rate))
    }

    fn note_on_with_fx(
        &mut self,
        note: u8,
        velocity: f32,
        effects: &[EffectCommand; MAX_EFFECTS],
        previous: Option<f32>,
    ) -> Option<VoiceHandle> {
        dispatch!(self, p => p.note_on_with_fx(note, velocity, effects, previous))
    }

    fn note_off(&mut self, voice: VoiceHandle) {
        dispatch!(self, p => p.note_off(voice))
    }

    fn all_notes_off(&mut self) {
        dispatch!(self, p => p.all_notes_off())
    }

    fn kill_all(&mut self) {
        dispatch!(self, p => p.kill_all())
    }

    #[inline]
    fn render(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        dispatch!(self, p => p.render(out_l, out_r))
    }

    fn active_voices(&self) -> usize {
        dispatch!(self, p => p.active_voices())
    }

    fn set_samples_per_tick(&mut self, samples_per_tick: f64) {
        dispatch!(self, p => p.set_samples_per_tick(samples_per_tick))
    }

    fn engine_params(&self) -> EngineParams {
        dispatch!(self, p => p.engine_params())
    }

    fn apply_params(&mut self, params: &EngineParams) {
        dispatch!(self, p => p.apply_params(params))
    }

    fn set_sample(&mut self, sample: Option<Arc<SampleBuffer>>) {
        dispatch!(self, p => p.set_sample(sample))
    }

    fn sample(&self) -> Option<&Arc<SampleBuffer>> {
        dispatch!(self, p => p.sample())
    }

    fn modulation(&self) -> Option<&ModOutputs> {
        dispatch!(self, p => p.modulation())
    }

    fn reset_modulation(&mut self) {
        dispatch!(self, p => p.reset_modulation())
    }

    fn sync(&mut self, instrument: &Instrument) {
        dispatch!(self, p => p.sync(instrument))
    }
}
