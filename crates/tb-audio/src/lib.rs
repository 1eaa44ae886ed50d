//! Audio output backends for the trackbox sequencer.

mod cpal_backend;
mod traits;

pub use cpal_backend::{interleave, CpalOutput};
pub use traits::{AudioError, AudioOutput, Result};
