//! Real-time sequencing and synthesis core for the trackbox sequencer.
//!
//! Reads an immutable project snapshot, fires rows on a sample-accurate
//! grid and renders five kinds of instrument processor into a stereo mix.
//! Everything reachable from [`Engine::render_block`] is allocation-free.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod analysis;
mod command;
pub mod dsp;
pub mod frequency;
pub mod modulation;
pub mod processors;
mod sample;
mod sequencer;
pub mod state;
mod timing;
pub mod tracker_fx;
pub mod voice_pool;

pub use command::{EngineCommand, PlayMode, Retired, TransportState};
pub use frequency::{note_to_hz, note_to_increment};
pub use modulation::{ModMatrix, ModOutputs};
pub use processors::fm::FM_VOICES;
pub use processors::{InstrumentProcessor, Processor, MAX_VOICES};
pub use sample::SampleBuffer;
pub use sequencer::{Engine, Playhead, DEFAULT_MAX_BLOCK};
pub use state::{InstrumentState, StateError};
pub use timing::RowClock;
pub use tracker_fx::{FxEvent, TrackerFx};
pub use voice_pool::{PoolVoice, VoiceHandle, VoicePool};
