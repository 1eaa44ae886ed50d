//! Edit commands issued by the editing context.

use crate::chain::{ChainEntry, ScaleLock};
use crate::instrument::{Instrument, InstrumentKind};
use crate::project::Project;
use crate::step::Step;

/// A structural edit of the project document.
#[derive(Clone, Debug, PartialEq)]
pub enum Edit {
    /// Set a single step in a pattern.
    SetStep { pattern: usize, row: u16, track: usize, step: Step },
    SetTempo(f32),
    AddPattern { rows: u16 },
    ResizePattern { pattern: usize, rows: u16 },
    AddInstrument(Instrument),
    /// Replace an instrument's engine with defaults for `kind`.
    SetInstrumentKind { instrument: usize, kind: InstrumentKind },
    SetInstrumentParam { instrument: usize, index: usize, value: f32 },
    SetInstrumentMix { instrument: usize, volume: f32, pan: f32, mute: bool, solo: bool },
    SetInstrumentSends { instrument: usize, delay: f32, reverb: f32 },
    SetInsertParam { instrument: usize, index: usize, value: f32 },
    /// Add a manual slice point (sample frame) to a slicer.
    InsertSlice { instrument: usize, frame: u32 },
    ClearSlices { instrument: usize },
    AddChain,
    SetChainEntry { chain: usize, entry: usize, value: ChainEntry },
    PushChainEntry { chain: usize, value: ChainEntry },
    SetScaleLock { chain: usize, lock: Option<ScaleLock> },
    SetSongCell { column: usize, row: usize, chain: Option<u16> },
    SetMasterVolume(f32),
    SetTrackMute { track: usize, mute: bool },
    SetTrackSolo { track: usize, solo: bool },
    SetTrackVolume { track: usize, volume: f32 },
}

impl Project {
    /// Apply an edit. Returns false when it referenced something missing or
    /// hit a capacity limit; the document is then unchanged.
    pub fn apply(&mut self, edit: Edit) -> bool {
        match edit {
            Edit::SetStep { pattern, row, track, step } => self
                .pattern_mut(pattern)
                .is_some_and(|p| p.set_step(row, track, step)),
            Edit::SetTempo(bpm) => {
                self.set_tempo(bpm);
                true
            }
            Edit::AddPattern { rows } => self.add_pattern(rows).is_some(),
            Edit::ResizePattern { pattern, rows } => match self.pattern_mut(pattern) {
                Some(p) => {
                    p.resize(rows);
                    true
                }
                None => false,
            },
            Edit::AddInstrument(inst) => self.add_instrument(inst).is_some(),
            Edit::SetInstrumentKind { instrument, kind } => match self.instrument_mut(instrument) {
                Some(inst) => {
                    inst.engine = crate::instrument::EngineParams::new(kind);
                    true
                }
                None => false,
            },
            Edit::SetInstrumentParam { instrument, index, value } => self
                .instrument_mut(instrument)
                .is_some_and(|i| i.engine.set_parameter(index, value)),
            Edit::SetInstrumentMix { instrument, volume, pan, mute, solo } => {
                match self.instrument_mut(instrument) {
                    Some(inst) => {
                        inst.set_volume(volume);
                        inst.set_pan(pan);
                        inst.mute = mute;
                        inst.solo = solo;
                        true
                    }
                    None => false,
                }
            }
            Edit::SetInstrumentSends { instrument, delay, reverb } => match self.instrument_mut(instrument) {
                Some(inst) => {
                    inst.set_sends(delay, reverb);
                    true
                }
                None => false,
            },
            Edit::SetInsertParam { instrument, index, value } => self
                .instrument_mut(instrument)
                .is_some_and(|i| i.insert.set_parameter(index, value)),
            Edit::InsertSlice { instrument, frame } => self
                .instrument_mut(instrument)
                .is_some_and(|i| i.insert_slice(frame)),
            Edit::ClearSlices { instrument } => match self.instrument_mut(instrument).map(|i| &mut i.engine) {
                Some(crate::instrument::EngineParams::Slicer { slices, .. }) => {
                    slices.clear();
                    true
                }
                _ => false,
            },
            Edit::AddChain => self.add_chain(crate::chain::Chain::new()).is_some(),
            Edit::SetChainEntry { chain, entry, value } => self
                .chain_mut(chain)
                .is_some_and(|c| c.set_entry(entry, value)),
            Edit::PushChainEntry { chain, value } => {
                self.chain_mut(chain).is_some_and(|c| c.push(value))
            }
            Edit::SetScaleLock { chain, lock } => match self.chain_mut(chain) {
                Some(c) => {
                    c.set_scale_lock(lock);
                    true
                }
                None => false,
            },
            Edit::SetSongCell { column, row, chain } => self.song.set_cell(column, row, chain),
            Edit::SetMasterVolume(v) => {
                self.mixer.set_master_volume(v);
                true
            }
            Edit::SetTrackMute { track, mute } => match self.mixer.track_mute.get_mut(track) {
                Some(m) => {
                    *m = mute;
                    true
                }
                None => false,
            },
            Edit::SetTrackSolo { track, solo } => match self.mixer.track_solo.get_mut(track) {
                Some(s) => {
                    *s = solo;
                    true
                }
                None => false,
            },
            Edit::SetTrackVolume { track, volume } => {
                if track >= self.mixer.track_volume.len() {
                    return false;
                }
                self.mixer.set_track_volume(track, volume);
                true
            }
        }
    }
}
