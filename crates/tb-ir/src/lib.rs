//! Project document model for the trackbox sequencer.
//!
//! This crate defines the data the editing side mutates and the playback
//! engine reads: steps, patterns, chains, the song arrangement, instruments
//! with their parameter sets, the mixer, and the FM patch encodings.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod chain;
mod edit;
pub mod fm_patch;
mod instrument;
mod mixer;
mod modulation;
mod params;
mod pattern;
mod project;
mod song;
mod step;
mod timing;

pub use chain::{transpose_note, Chain, ChainEntry, Scale, ScaleLock, MAX_CHAIN_ENTRIES, MAX_SEMITONE_TRANSPOSE};
pub use edit::Edit;
pub use fm_patch::{FmLfo, FmOperator, FmParams, FmPatch, PatchError};
pub use instrument::{
    EngineParams, FilterMode, InsertParams, Instrument, InstrumentKind, Sends, SlicePoints, MAX_SLICES, NAME_LEN,
};
pub use mixer::{Mixer, DELAY_DIVISIONS};
pub use modulation::{
    LfoShape, ModDestination, ModParams, ModSource, LFO_DIVISIONS, MOD_DESTINATIONS, MOD_SOURCES,
};
pub use params::{as_index, AnalogParams, MacroOscParams, ParamInfo, SamplerParams, SlicerParams};
pub use pattern::{Pattern, DEFAULT_ROWS, MAX_ROWS, MAX_TRACKS};
pub use project::{Project, MAX_CHAINS, MAX_INSTRUMENTS, MAX_PATTERNS};
pub use song::{Song, EMPTY_CELL};
pub use step::{EffectCommand, EffectKind, Note, Step, DEFAULT_VOLUME, MAX_EFFECTS, MAX_NOTE};
pub use timing::{clamp_bpm, GridTiming, DEFAULT_BPM, MAX_BPM, MIN_BPM, ROWS_PER_BEAT, TICKS_PER_ROW};
