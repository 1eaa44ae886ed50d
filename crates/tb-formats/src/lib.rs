//! File formats for trackbox: WAV audio and FM patch sysex dumps.

mod syx;
mod wav;

use thiserror::Error;

pub use syx::{
    load_patches, parse_syx, write_bank_syx, write_voice_syx, BANK_SYX_SIZE, BANK_VOICES, VOICE_SYX_SIZE,
};
pub use wav::{read_wav, wav_bytes, write_wav, SampleFormat, WavData};

/// Error type for format parsing and writing.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("not a RIFF/WAVE file")]
    NotWav,
    #[error("missing {0} chunk")]
    MissingChunk(&'static str),
    #[error("unsupported sample format {format:#06x} at {bits} bits")]
    UnsupportedSampleFormat { format: u16, bits: u16 },
    #[error("invalid channel count {0}")]
    BadChannels(u16),
    #[error("invalid sysex: {0}")]
    InvalidSysex(&'static str),
    #[error("bank holds at most {max} voices, got {actual}")]
    TooManyVoices { max: usize, actual: usize },
    #[error(transparent)]
    Patch(#[from] tb_ir::PatchError),
    #[error("binary parse error: {0}")]
    Binary(#[from] binrw::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FormatError>;
