//! Commands sent from the edit context to the render context.

use tb_ir::{InstrumentKind, Step};

use crate::processors::InstrumentProcessor;

/// Playback source for the row clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayMode {
    /// Loop the current pattern
    #[default]
    Pattern,
    /// Follow the song arrangement
    Song,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

/// One queued engine operation. Applying a command never allocates; an
/// installed processor is moved in, and the one it replaces is handed back.
#[derive(Debug)]
pub enum EngineCommand {
    Play,
    Stop,
    /// Silence every voice without release tails
    Panic,
    SetPlayMode(PlayMode),
    SetPattern(usize),
    TriggerNote { track: usize, note: u8, instrument: usize, velocity: f32 },
    /// Preview a full step, effects included
    TriggerStep { track: usize, step: Step },
    ReleaseNote { track: usize },
    InstallProcessor { index: usize, processor: InstrumentProcessor },
    RemoveProcessor { index: usize },
    StartPreview { instrument: usize, velocity: f32 },
    StopPreview { instrument: usize },
}

impl EngineCommand {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::Play => "play",
            EngineCommand::Stop => "stop",
            EngineCommand::Panic => "panic",
            EngineCommand::SetPlayMode(_) => "set-play-mode",
            EngineCommand::SetPattern(_) => "set-pattern",
            EngineCommand::TriggerNote { .. } => "trigger-note",
            EngineCommand::TriggerStep { .. } => "trigger-step",
            EngineCommand::ReleaseNote { .. } => "release-note",
            EngineCommand::InstallProcessor { .. } => "install-processor",
            EngineCommand::RemoveProcessor { .. } => "remove-processor",
            EngineCommand::StartPreview { .. } => "start-preview",
            EngineCommand::StopPreview { .. } => "stop-preview",
        }
    }
}

/// A processor removed from the render context, to be dropped by the
/// edit context.
#[derive(Debug)]
pub struct Retired {
    pub index: usize,
    pub kind: InstrumentKind,
    pub processor: InstrumentProcessor,
}
