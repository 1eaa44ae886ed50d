//! Headless controller for the trackbox sequencer.
//!
//! The [`Controller`] is the edit context: it owns the project, applies
//! edits and publishes immutable snapshots. The [`RenderContext`] is the
//! other half, run by the audio callback (or a test) to turn snapshots and
//! queued commands into sound. The two share nothing but the snapshot cell,
//! two single-producer queues and the playhead atomics.

mod config;
mod controller;
mod demo;
mod offline;
mod render;

use thiserror::Error;

pub use config::EngineConfig;
pub use controller::{Controller, SLICE_SNAP_RADIUS};
pub use demo::demo_project;
pub use offline::{arrangement_frames, arrangement_rows};
pub use render::{RenderContext, SharedPlayhead};

// Re-export common types so callers don't need tb-ir/tb-engine directly.
pub use tb_audio::AudioError;
pub use tb_engine::{PlayMode, Playhead, StateError, TransportState};
pub use tb_formats::{FormatError, SampleFormat};
pub use tb_ir::{Edit, InstrumentKind, PatchError, Project, Step};

/// Error type for controller operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("no instrument {0}")]
    NoInstrument(usize),
    #[error("instrument {instrument} is {found:?}, expected {expected:?}")]
    WrongKind { instrument: usize, expected: InstrumentKind, found: InstrumentKind },
    #[error("voice {voice} out of range, file holds {count}")]
    VoiceOutOfRange { voice: usize, count: usize },
    #[error("command queue full, dropped {0}")]
    QueueFull(&'static str),
    #[error("instrument {0} has no sample loaded")]
    NoSample(usize),
    #[error("instrument {0} is not previewing")]
    NoPreview(usize),
    #[error("render context was handed to another host")]
    RenderDetached,
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ControllerError>;
