//! DX7-style system-exclusive voice dumps.
//!
//! ```text
//! F0 43 0n ff mm ll <data> cs F7
//! ```
//!
//! `n` is the MIDI channel, `ff` the dump format (0 = one unpacked voice,
//! 9 = 32 packed voices), `mm ll` the 7-bit data length, `cs` the two's
//! complement checksum of the data.

use std::io::Cursor;

use binrw::{binrw, BinRead, BinWrite};
use tb_ir::fm_patch::{PACKED_SIZE, VOICE_DATA_SIZE};
use tb_ir::FmPatch;
use tracing::{debug, warn};

use crate::{FormatError, Result};

pub const BANK_VOICES: usize = 32;
const BANK_DATA_SIZE: usize = BANK_VOICES * PACKED_SIZE;

const HEADER_SIZE: usize = 6;
/// Header, data, checksum, end-of-exclusive.
pub const VOICE_SYX_SIZE: usize = HEADER_SIZE + VOICE_DATA_SIZE + 2;
pub const BANK_SYX_SIZE: usize = HEADER_SIZE + BANK_DATA_SIZE + 2;

const FORMAT_VOICE: u8 = 0;
const FORMAT_BANK: u8 = 9;
const EOX: u8 = 0xF7;

#[binrw]
#[brw(big, magic = b"\xF0\x43")]
struct SysexHeader {
    channel: u8,
    format: u8,
    count_msb: u8,
    count_lsb: u8,
}

impl SysexHeader {
    fn new(channel: u8, format: u8, count: usize) -> Self {
        Self {
            channel: channel & 0x0F,
            format,
            count_msb: ((count >> 7) & 0x7F) as u8,
            count_lsb: (count & 0x7F) as u8,
        }
    }

    fn byte_count(&self) -> usize {
        ((self.count_msb as usize) << 7) | self.count_lsb as usize
    }
}

fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    sum.wrapping_neg() & 0x7F
}

/// Decode a single-voice or 32-voice dump.
///
/// A checksum mismatch is logged and tolerated; many dumps in circulation
/// carry a stale one.
pub fn parse_syx(bytes: &[u8]) -> Result<Vec<FmPatch>> {
    let mut cur = Cursor::new(bytes);
    let header =
        SysexHeader::read(&mut cur).map_err(|_| FormatError::InvalidSysex("missing Yamaha sysex header"))?;
    if header.channel & 0xF0 != 0 {
        return Err(FormatError::InvalidSysex("not a voice dump"));
    }
    let expected = match header.format {
        FORMAT_VOICE => VOICE_DATA_SIZE,
        FORMAT_BANK => BANK_DATA_SIZE,
        _ => return Err(FormatError::InvalidSysex("unsupported dump format")),
    };
    if header.byte_count() != expected {
        return Err(FormatError::InvalidSysex("byte count does not match dump format"));
    }
    let end = HEADER_SIZE + expected;
    if bytes.len() < end + 2 {
        return Err(FormatError::InvalidSysex("truncated dump"));
    }
    if bytes[end + 1] != EOX {
        return Err(FormatError::InvalidSysex("missing end of exclusive"));
    }

    let data = &bytes[HEADER_SIZE..end];
    let stored = bytes[end];
    let computed = checksum(data);
    if stored != computed {
        warn!(stored, computed, "sysex checksum mismatch");
    }

    let patches = if header.format == FORMAT_VOICE {
        vec![FmPatch::from_unpacked(data)?]
    } else {
        data.chunks_exact(PACKED_SIZE)
            .map(FmPatch::from_packed)
            .collect::<std::result::Result<Vec<_>, _>>()?
    };
    debug!(voices = patches.len(), channel = header.channel, "parsed sysex dump");
    Ok(patches)
}

/// Decode any supported patch file: a sysex dump, or a bare 155/156-byte
/// unpacked or 128-byte packed voice.
pub fn load_patches(bytes: &[u8]) -> Result<Vec<FmPatch>> {
    if bytes.first() == Some(&0xF0) {
        parse_syx(bytes)
    } else {
        Ok(vec![FmPatch::from_bytes(bytes)?])
    }
}

/// Encode one voice as a single-voice dump.
pub fn write_voice_syx(patch: &FmPatch, channel: u8) -> Result<Vec<u8>> {
    let unpacked = patch.to_unpacked();
    write_dump(channel, FORMAT_VOICE, &unpacked[..VOICE_DATA_SIZE], VOICE_SYX_SIZE)
}

/// Encode up to 32 voices as a bank dump; missing slots are filled with the
/// initial voice.
pub fn write_bank_syx(patches: &[FmPatch], channel: u8) -> Result<Vec<u8>> {
    if patches.len() > BANK_VOICES {
        return Err(FormatError::TooManyVoices { max: BANK_VOICES, actual: patches.len() });
    }
    let init = FmPatch::init_voice();
    let mut data = Vec::with_capacity(BANK_DATA_SIZE);
    for i in 0..BANK_VOICES {
        data.extend_from_slice(&patches.get(i).unwrap_or(&init).to_packed());
    }
    write_dump(channel, FORMAT_BANK, &data, BANK_SYX_SIZE)
}

fn write_dump(channel: u8, format: u8, data: &[u8], size: usize) -> Result<Vec<u8>> {
    let mut cur = Cursor::new(Vec::with_capacity(size));
    SysexHeader::new(channel, format, data.len()).write(&mut cur)?;
    let mut out = cur.into_inner();
    out.extend_from_slice(data);
    out.push(checksum(data));
    out.push(EOX);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &[u8; 10], algorithm: u8) -> FmPatch {
        FmPatch { name: *name, algorithm, ..FmPatch::init_voice() }
    }

    // === Checksum ===

    #[test]
    fn checksum_makes_data_sum_zero() {
        let data = [0x10u8, 0x7F, 0x33, 0x01];
        let cs = checksum(&data);
        let total: u32 = data.iter().map(|&b| b as u32).sum::<u32>() + cs as u32;
        assert_eq!(total & 0x7F, 0);
        assert_eq!(checksum(&[]), 0);
    }

    // === Bank dumps ===

    #[test]
    fn bank_header_and_size() {
        let bytes = write_bank_syx(&[FmPatch::init_voice()], 3).unwrap();
        assert_eq!(bytes.len(), BANK_SYX_SIZE);
        assert_eq!(&bytes[..HEADER_SIZE], &[0xF0, 0x43, 0x03, 0x09, 0x20, 0x00]);
        assert_eq!(bytes[BANK_SYX_SIZE - 1], EOX);
    }

    #[test]
    fn bank_voices_keep_their_slots() {
        let patches = [named(b"BRASS   1 ", 21), named(b"E.PIANO 1 ", 4)];
        let parsed = parse_syx(&write_bank_syx(&patches, 0).unwrap()).unwrap();
        assert_eq!(parsed.len(), BANK_VOICES);
        assert_eq!(parsed[0].name, *b"BRASS   1 ");
        assert_eq!(parsed[0].algorithm, 21);
        assert_eq!(parsed[1].algorithm, 4);
        assert_eq!(parsed[31].name, *b"INIT VOICE");
    }

    #[test]
    fn too_many_voices_rejected() {
        let patches = vec![FmPatch::init_voice(); 33];
        assert!(matches!(
            write_bank_syx(&patches, 0),
            Err(FormatError::TooManyVoices { max: 32, actual: 33 })
        ));
    }

    // === Single voices ===

    #[test]
    fn single_voice_dump() {
        let patch = named(b"SYN-LEAD  ", 17);
        let bytes = write_voice_syx(&patch, 0).unwrap();
        assert_eq!(bytes.len(), VOICE_SYX_SIZE);
        assert_eq!(&bytes[2..HEADER_SIZE], &[0x00, 0x00, 0x01, 0x1B]);
        let parsed = parse_syx(&bytes).unwrap();
        assert_eq!(parsed, vec![patch]);
    }

    #[test]
    fn bare_patch_bytes_load_as_one_voice() {
        let patch = named(b"BARE      ", 9);
        assert_eq!(load_patches(&patch.to_packed()).unwrap(), vec![patch]);
        assert!(matches!(
            load_patches(&[0u8; 100]),
            Err(FormatError::Patch(tb_ir::PatchError::BadSize(100)))
        ));
    }

    // === Malformed dumps ===

    #[test]
    fn bad_checksum_is_tolerated() {
        let mut bytes = write_voice_syx(&FmPatch::init_voice(), 0).unwrap();
        bytes[VOICE_SYX_SIZE - 2] ^= 0x55;
        assert_eq!(parse_syx(&bytes).unwrap().len(), 1);
    }

    #[test]
    fn structural_errors() {
        let bank = write_bank_syx(&[], 0).unwrap();
        assert!(matches!(parse_syx(&bank[..1000]), Err(FormatError::InvalidSysex("truncated dump"))));

        let mut wrong_vendor = bank.clone();
        wrong_vendor[1] = 0x41;
        assert!(matches!(parse_syx(&wrong_vendor), Err(FormatError::InvalidSysex(_))));

        let mut wrong_count = bank.clone();
        wrong_count[4] = 0x10;
        assert!(matches!(parse_syx(&wrong_count), Err(FormatError::InvalidSysex(_))));

        let mut no_eox = bank;
        no_eox[BANK_SYX_SIZE - 1] = 0x00;
        assert!(matches!(
            parse_syx(&no_eox),
            Err(FormatError::InvalidSysex("missing end of exclusive"))
        ));
    }
}
