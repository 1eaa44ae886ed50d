//! Audio output trait and error types.

use thiserror::Error;

/// Error type for audio operations.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("device init error: {0}")]
    DeviceInit(String),
    #[error("stream create error: {0}")]
    StreamCreate(String),
    #[error("playback error: {0}")]
    Playback(String),
    #[error("stream has not been built")]
    NoStream,
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// An output device driven by its own callback.
///
/// Backends pull audio: the callback asks a render function for split
/// left/right blocks, so nothing is buffered between the engine and the
/// device.
pub trait AudioOutput {
    fn sample_rate(&self) -> u32;

    /// Start (or resume) the device callback.
    fn start(&mut self) -> Result<()>;

    /// Pause the device callback. The stream stays built.
    fn stop(&mut self) -> Result<()>;

    fn is_running(&self) -> bool;
}
