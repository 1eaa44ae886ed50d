//! WAV encoding and decoding.
//!
//! Reading accepts integer PCM at 8, 16, 24 and 32 bits and IEEE float at
//! 32 and 64 bits, plain or `WAVE_FORMAT_EXTENSIBLE`, with any channel
//! count. Samples come back interleaved as `f32` in -1..1. Writing produces
//! stereo 16-bit PCM or 32-bit float from split left/right buffers.

use std::io::{Cursor, Seek, SeekFrom, Write};

use binrw::{binrw, BinRead, BinWrite};
use tracing::debug;

use crate::{FormatError, Result};

const FORMAT_PCM: u16 = 0x0001;
const FORMAT_FLOAT: u16 = 0x0003;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// `fmt ` body length that carries the extensible block.
const EXTENSIBLE_FMT_SIZE: u32 = 40;

#[binrw]
#[brw(little, magic = b"RIFF")]
struct RiffHeader {
    size: u32,
    form: [u8; 4],
}

#[binrw]
#[brw(little)]
struct ChunkHeader {
    id: [u8; 4],
    size: u32,
}

#[binrw]
#[brw(little)]
struct FmtChunk {
    format: u16,
    channels: u16,
    sample_rate: u32,
    byte_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
}

/// Tail of an extensible `fmt ` chunk; only the leading GUID word matters.
#[binrw]
#[brw(little)]
#[allow(dead_code)]
struct FmtExtension {
    cb_size: u16,
    valid_bits: u16,
    channel_mask: u32,
    sub_format: u16,
}

/// Decoded audio.
#[derive(Clone, Debug, PartialEq)]
pub struct WavData {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved, `channels` values per frame
    pub samples: Vec<f32>,
}

impl WavData {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

/// Output encoding for [`write_wav`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SampleFormat {
    #[default]
    Int16,
    Float32,
}

impl SampleFormat {
    fn tag(self) -> u16 {
        match self {
            SampleFormat::Int16 => FORMAT_PCM,
            SampleFormat::Float32 => FORMAT_FLOAT,
        }
    }

    fn bits(self) -> u16 {
        match self {
            SampleFormat::Int16 => 16,
            SampleFormat::Float32 => 32,
        }
    }
}

// --- Reading ---

/// Parse a WAV file from raw bytes.
pub fn read_wav(bytes: &[u8]) -> Result<WavData> {
    let mut cur = Cursor::new(bytes);
    let riff = RiffHeader::read(&mut cur).map_err(|_| FormatError::NotWav)?;
    if &riff.form != b"WAVE" {
        return Err(FormatError::NotWav);
    }

    let len = bytes.len() as u64;
    let mut fmt: Option<FmtChunk> = None;
    let mut data: Option<(usize, usize)> = None;

    while cur.position() + 8 <= len {
        let chunk = ChunkHeader::read(&mut cur)?;
        let body = cur.position();
        match &chunk.id {
            b"fmt " => {
                let mut f = FmtChunk::read(&mut cur)?;
                if f.format == FORMAT_EXTENSIBLE && chunk.size >= EXTENSIBLE_FMT_SIZE {
                    let ext = FmtExtension::read(&mut cur)?;
                    f.format = ext.sub_format;
                }
                fmt = Some(f);
            }
            b"data" => {
                let start = body as usize;
                let end = (body + chunk.size as u64).min(len) as usize;
                data = Some((start, end));
            }
            other => debug!(chunk = %String::from_utf8_lossy(other), size = chunk.size, "skipping chunk"),
        }
        // chunks are word aligned
        let next = body + chunk.size as u64 + (chunk.size & 1) as u64;
        cur.seek(SeekFrom::Start(next))?;
    }

    let fmt = fmt.ok_or(FormatError::MissingChunk("fmt "))?;
    let (start, end) = data.ok_or(FormatError::MissingChunk("data"))?;
    if fmt.channels == 0 {
        return Err(FormatError::BadChannels(0));
    }

    let frame_bytes = fmt.channels as usize * (fmt.bits_per_sample as usize).div_ceil(8);
    let raw = &bytes[start..end];
    let raw = &raw[..raw.len() - raw.len() % frame_bytes.max(1)];
    let samples = decode(raw, fmt.format, fmt.bits_per_sample)?;

    debug!(
        rate = fmt.sample_rate,
        channels = fmt.channels,
        bits = fmt.bits_per_sample,
        frames = samples.len() / fmt.channels as usize,
        "read wav"
    );
    Ok(WavData { sample_rate: fmt.sample_rate, channels: fmt.channels, samples })
}

fn decode(raw: &[u8], format: u16, bits: u16) -> Result<Vec<f32>> {
    let out = match (format, bits) {
        // 8-bit WAV is unsigned, centred on 128
        (FORMAT_PCM, 8) => raw.iter().map(|&b| (b as f32 - 128.0) / 128.0).collect(),
        (FORMAT_PCM, 16) => raw
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32_768.0)
            .collect(),
        (FORMAT_PCM, 24) => raw
            .chunks_exact(3)
            .map(|c| (i32::from_le_bytes([0, c[0], c[1], c[2]]) >> 8) as f32 / 8_388_608.0)
            .collect(),
        (FORMAT_PCM, 32) => raw
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32 / 2_147_483_648.0)
            .collect(),
        (FORMAT_FLOAT, 32) => raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        (FORMAT_FLOAT, 64) => raw
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
            .collect(),
        (format, bits) => return Err(FormatError::UnsupportedSampleFormat { format, bits }),
    };
    Ok(out)
}

// --- Writing ---

/// Write a stereo WAV. The shorter of the two channels sets the length.
pub fn write_wav<W: Write + Seek>(
    w: &mut W,
    left: &[f32],
    right: &[f32],
    sample_rate: u32,
    format: SampleFormat,
) -> Result<()> {
    let frames = left.len().min(right.len());
    let channels: u16 = 2;
    let block_align = channels * format.bits() / 8;
    let data_size = (frames * block_align as usize) as u32;

    RiffHeader { size: 36 + data_size, form: *b"WAVE" }.write(w)?;
    ChunkHeader { id: *b"fmt ", size: 16 }.write(w)?;
    FmtChunk {
        format: format.tag(),
        channels,
        sample_rate,
        byte_rate: sample_rate * block_align as u32,
        block_align,
        bits_per_sample: format.bits(),
    }
    .write(w)?;
    ChunkHeader { id: *b"data", size: data_size }.write(w)?;

    for (&l, &r) in left[..frames].iter().zip(&right[..frames]) {
        match format {
            SampleFormat::Int16 => {
                w.write_all(&to_i16(l).to_le_bytes())?;
                w.write_all(&to_i16(r).to_le_bytes())?;
            }
            SampleFormat::Float32 => {
                w.write_all(&l.to_le_bytes())?;
                w.write_all(&r.to_le_bytes())?;
            }
        }
    }
    debug!(frames, rate = sample_rate, ?format, "wrote wav");
    Ok(())
}

/// [`write_wav`] into a fresh buffer.
pub fn wav_bytes(left: &[f32], right: &[f32], sample_rate: u32, format: SampleFormat) -> Result<Vec<u8>> {
    let mut cur = Cursor::new(Vec::new());
    write_wav(&mut cur, left, right, sample_rate, format)?;
    Ok(cur.into_inner())
}

fn to_i16(s: f32) -> i16 {
    (s.clamp(-1.0, 1.0) * 32_767.0).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal WAV by hand, with an optional chunk before `fmt `.
    fn make_wav(format: u16, channels: u16, rate: u32, bits: u16, extra: &[u8], pcm: &[u8]) -> Vec<u8> {
        let block_align = channels * bits / 8;
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&format.to_le_bytes());
        fmt.extend_from_slice(&channels.to_le_bytes());
        fmt.extend_from_slice(&rate.to_le_bytes());
        fmt.extend_from_slice(&(rate * block_align as u32).to_le_bytes());
        fmt.extend_from_slice(&block_align.to_le_bytes());
        fmt.extend_from_slice(&bits.to_le_bytes());
        fmt.extend_from_slice(extra);

        let mut body = Vec::new();
        body.extend_from_slice(b"WAVE");
        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
        body.extend_from_slice(&fmt);
        body.extend_from_slice(b"data");
        body.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
        body.extend_from_slice(pcm);

        let mut buf = Vec::new();
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&body);
        buf
    }

    // === Reading ===

    #[test]
    fn reads_16bit_mono() {
        let pcm: Vec<u8> = [0i16, 16384, -32768].iter().flat_map(|s| s.to_le_bytes()).collect();
        let wav = read_wav(&make_wav(FORMAT_PCM, 1, 22_050, 16, &[], &pcm)).unwrap();
        assert_eq!(wav.sample_rate, 22_050);
        assert_eq!(wav.channels, 1);
        assert_eq!(wav.samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn reads_8bit_unsigned_stereo() {
        let wav = read_wav(&make_wav(FORMAT_PCM, 2, 8000, 8, &[], &[128, 0, 192, 128])).unwrap();
        assert_eq!(wav.frames(), 2);
        assert_eq!(wav.samples, vec![0.0, -1.0, 0.5, 0.0]);
    }

    #[test]
    fn reads_24bit_sign_extended() {
        // -4194304 = 0xC00000, +8388607 = 0x7FFFFF
        let pcm = [0x00, 0x00, 0xC0, 0xFF, 0xFF, 0x7F];
        let wav = read_wav(&make_wav(FORMAT_PCM, 1, 48_000, 24, &[], &pcm)).unwrap();
        assert_eq!(wav.samples[0], -0.5);
        assert!((wav.samples[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn reads_extensible_float() {
        let mut ext = Vec::new();
        ext.extend_from_slice(&22u16.to_le_bytes());
        ext.extend_from_slice(&32u16.to_le_bytes());
        ext.extend_from_slice(&3u32.to_le_bytes());
        ext.extend_from_slice(&FORMAT_FLOAT.to_le_bytes());
        ext.extend_from_slice(&[0u8; 14]);
        let pcm: Vec<u8> = [0.25f32, -0.75].iter().flat_map(|s| s.to_le_bytes()).collect();
        let wav = read_wav(&make_wav(FORMAT_EXTENSIBLE, 2, 44_100, 32, &ext, &pcm)).unwrap();
        assert_eq!(wav.samples, vec![0.25, -0.75]);
    }

    #[test]
    fn skips_unknown_odd_sized_chunk() {
        let pcm: Vec<u8> = [1000i16].iter().flat_map(|s| s.to_le_bytes()).collect();
        let plain = make_wav(FORMAT_PCM, 1, 48_000, 16, &[], &pcm);
        // splice a 3-byte LIST chunk (plus pad byte) in front of `fmt `
        let mut bytes = plain[..12].to_vec();
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 0]);
        bytes.extend_from_slice(&plain[12..]);
        let wav = read_wav(&bytes).unwrap();
        assert_eq!(wav.samples.len(), 1);
    }

    #[test]
    fn trailing_partial_frame_is_dropped() {
        let wav = read_wav(&make_wav(FORMAT_PCM, 2, 48_000, 16, &[], &[0, 0, 0, 0, 0, 0])).unwrap();
        assert_eq!(wav.frames(), 1);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(read_wav(b"not a wav file at all"), Err(FormatError::NotWav)));
        let mut aiff = make_wav(FORMAT_PCM, 1, 48_000, 16, &[], &[0, 0]);
        aiff[8..12].copy_from_slice(b"AIFF");
        assert!(matches!(read_wav(&aiff), Err(FormatError::NotWav)));
        assert!(matches!(
            read_wav(&make_wav(FORMAT_PCM, 1, 48_000, 12, &[], &[0, 0])),
            Err(FormatError::UnsupportedSampleFormat { format: FORMAT_PCM, bits: 12 })
        ));
        let no_data = &make_wav(FORMAT_PCM, 1, 48_000, 16, &[], &[])[..36];
        assert!(matches!(read_wav(no_data), Err(FormatError::MissingChunk("data"))));
    }

    // === Writing ===

    #[test]
    fn writes_16bit_header_and_clips() {
        let bytes = wav_bytes(&[0.5, 2.0], &[-0.5, -2.0], 48_000, SampleFormat::Int16).unwrap();
        assert_eq!(bytes.len(), 44 + 8);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 44);
        assert_eq!(&bytes[36..40], b"data");
        let s = |i: usize| i16::from_le_bytes([bytes[44 + i * 2], bytes[45 + i * 2]]);
        assert_eq!(s(0), 16384);
        assert_eq!(s(1), -16384);
        assert_eq!(s(2), 32767);
        assert_eq!(s(3), -32767);
    }

    #[test]
    fn float_output_reads_back_exactly() {
        let left = [0.1f32, -0.2, 0.3];
        let right = [0.9f32, 0.0, -1.5];
        let wav = read_wav(&wav_bytes(&left, &right, 96_000, SampleFormat::Float32).unwrap()).unwrap();
        assert_eq!(wav.sample_rate, 96_000);
        assert_eq!(wav.samples, vec![0.1, 0.9, -0.2, 0.0, 0.3, -1.5]);
    }

    #[test]
    fn mismatched_channels_use_shorter() {
        let bytes = wav_bytes(&[0.0; 10], &[0.0; 4], 48_000, SampleFormat::Int16).unwrap();
        assert_eq!(read_wav(&bytes).unwrap().frames(), 4);
    }
}
