//! Binary instrument state snapshots.
//!
//! Layout (little endian):
//!
//! ```text
//! "TBIS" version:u8 kind:u8 count:u16 params:f32*count
//! has_sample:u8 [rate:u32 channels:u8 frames:u32 data:f32*(frames*channels)]
//! slicer only: slices:u8 points:u32*slices
//! ```

use alloc::vec::Vec;

use tb_ir::{EngineParams, InstrumentKind, SlicePoints, MAX_SLICES};

use crate::sample::SampleBuffer;

pub const STATE_MAGIC: [u8; 4] = *b"TBIS";
pub const STATE_VERSION: u8 = 1;

/// Errors decoding a state snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("state truncated at byte {0}")]
    Truncated(usize),
    #[error("not an instrument state")]
    BadMagic,
    #[error("unsupported state version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown instrument kind {0}")]
    UnknownKind(u8),
    #[error("state is for {found:?}, expected {expected:?}")]
    KindMismatch { expected: InstrumentKind, found: InstrumentKind },
    #[error("expected {expected} parameters, found {found}")]
    ParamCount { expected: usize, found: usize },
    #[error("invalid sample payload")]
    BadSample,
    #[error("{0} slice points exceed the limit")]
    TooManySlices(usize),
}

/// A decoded snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct InstrumentState {
    pub params: EngineParams,
    pub sample: Option<SampleBuffer>,
}

impl InstrumentState {
    pub fn kind(&self) -> InstrumentKind {
        self.params.kind()
    }
}

/// Serialize engine parameters and an optional sample.
pub fn encode(params: &EngineParams, sample: Option<&SampleBuffer>) -> Vec<u8> {
    let count = params.param_count();
    let mut out = Vec::with_capacity(9 + count * 4 + sample.map_or(0, |s| s.data().len() * 4 + 9));
    out.extend_from_slice(&STATE_MAGIC);
    out.push(STATE_VERSION);
    out.push(params.kind().to_u8());
    out.extend_from_slice(&(count as u16).to_le_bytes());
    for i in 0..count {
        let v = params.get_parameter(i).unwrap_or(0.0);
        out.extend_from_slice(&v.to_le_bytes());
    }
    match sample {
        Some(s) => {
            out.push(1);
            out.extend_from_slice(&s.sample_rate().to_le_bytes());
            out.push(s.channels() as u8);
            out.extend_from_slice(&(s.frames() as u32).to_le_bytes());
            for v in s.data() {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        None => out.push(0),
    }
    if let EngineParams::Slicer { slices, .. } = params {
        out.push(slices.len() as u8);
        for p in slices {
            out.extend_from_slice(&p.to_le_bytes());
        }
    }
    out
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], StateError> {
        let end = self.pos.checked_add(n).ok_or(StateError::Truncated(self.pos))?;
        let s = self.bytes.get(self.pos..end).ok_or(StateError::Truncated(self.pos))?;
        self.pos = end;
        Ok(s)
    }

    fn u8(&mut self) -> Result<u8, StateError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, StateError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, StateError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f32(&mut self) -> Result<f32, StateError> {
        Ok(f32::from_bits(self.u32()?))
    }
}

/// Parse a snapshot. Nothing is applied here, so a failure leaves any
/// processor untouched.
pub fn decode(bytes: &[u8]) -> Result<InstrumentState, StateError> {
    let mut r = Reader { bytes, pos: 0 };
    if r.take(4)? != STATE_MAGIC {
        return Err(StateError::BadMagic);
    }
    let version = r.u8()?;
    if version != STATE_VERSION {
        return Err(StateError::UnsupportedVersion(version));
    }
    let kind_byte = r.u8()?;
    let kind = InstrumentKind::from_u8(kind_byte).ok_or(StateError::UnknownKind(kind_byte))?;
    let mut params = EngineParams::new(kind);
    let count = r.u16()? as usize;
    if count != params.param_count() {
        return Err(StateError::ParamCount { expected: params.param_count(), found: count });
    }
    for i in 0..count {
        params.set_parameter(i, r.f32()?);
    }

    let sample = if r.u8()? != 0 {
        let rate = r.u32()?;
        let channels = r.u8()? as usize;
        let frames = r.u32()? as usize;
        let len = frames.checked_mul(channels).ok_or(StateError::BadSample)?;
        let raw = r.take(len.checked_mul(4).ok_or(StateError::BadSample)?)?;
        let data: Vec<f32> = raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Some(SampleBuffer::from_interleaved(&data, rate, channels).ok_or(StateError::BadSample)?)
    } else {
        None
    };

    if let EngineParams::Slicer { slices, .. } = &mut params {
        let n = r.u8()? as usize;
        if n > MAX_SLICES {
            return Err(StateError::TooManySlices(n));
        }
        let mut points = SlicePoints::new();
        for _ in 0..n {
            points.push(r.u32()?);
        }
        *slices = points;
    }
    Ok(InstrumentState { params, sample })
}
