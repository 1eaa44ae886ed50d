//! Six-operator FM patch model and its two byte encodings.
//!
//! The unpacked form is 155 bytes of voice data (21 per operator, OP6 first,
//! then the global block) followed by one operator-enable mask byte. The
//! packed form squeezes the same fields into 128 bytes (17 per operator)
//! using the bit-field table below.
//!
//! | packed byte | bits                                   |
//! | ----------- | -------------------------------------- |
//! | op+0..=3    | EG rate 1-4                            |
//! | op+4..=7    | EG level 1-4                           |
//! | op+8        | keyboard level-scaling break point     |
//! | op+9, op+10 | left / right scaling depth             |
//! | op+11       | `0000 RRLL` right / left curve         |
//! | op+12       | `0DDD DSSS` detune / rate scaling      |
//! | op+13       | `000V VVAA` key velocity / amp-mod sens|
//! | op+14       | output level                           |
//! | op+15       | `00CC CCCM` coarse / oscillator mode   |
//! | op+16       | fine frequency                         |
//! | 102..=105   | pitch EG rate 1-4                      |
//! | 106..=109   | pitch EG level 1-4                     |
//! | 110         | algorithm                              |
//! | 111         | `0000 KFFF` osc key sync / feedback    |
//! | 112..=115   | LFO speed, delay, PMD, AMD             |
//! | 116         | `0PPP WWWS` pitch-mod sens / wave / sync |
//! | 117         | transpose                              |
//! | 118..=127   | name                                   |

use thiserror::Error;

pub const UNPACKED_SIZE: usize = 156;
pub const VOICE_DATA_SIZE: usize = 155;
pub const PACKED_SIZE: usize = 128;
pub const OPERATORS: usize = 6;
pub const ALGORITHMS: usize = 32;

const OP_UNPACKED: usize = 21;
const OP_PACKED: usize = 17;
const GLOBAL_UNPACKED: usize = OPERATORS * OP_UNPACKED;
const GLOBAL_PACKED: usize = OPERATORS * OP_PACKED;
const OP_ENABLE_OFFSET: usize = VOICE_DATA_SIZE;

/// Errors from patch import.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("patch buffer too short: expected {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("unsupported patch size {0} (expected 155, 156 or 128 bytes)")]
    BadSize(usize),
}

/// Maximum value of every unpacked byte.
pub const UNPACKED_MAX: [u8; UNPACKED_SIZE] = {
    const OP: [u8; OP_UNPACKED] = [99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 99, 3, 3, 7, 3, 7, 99, 1, 31, 99, 14];
    const GLOBAL: [u8; 19] = [99, 99, 99, 99, 99, 99, 99, 99, 31, 7, 1, 99, 99, 99, 99, 1, 5, 7, 48];
    let mut out = [0u8; UNPACKED_SIZE];
    let mut i = 0;
    while i < GLOBAL_UNPACKED {
        out[i] = OP[i % OP_UNPACKED];
        i += 1;
    }
    let mut g = 0;
    while g < GLOBAL.len() {
        out[GLOBAL_UNPACKED + g] = GLOBAL[g];
        g += 1;
    }
    let mut n = GLOBAL_UNPACKED + GLOBAL.len();
    while n < OP_ENABLE_OFFSET {
        out[n] = 127;
        n += 1;
    }
    out[OP_ENABLE_OFFSET] = 0x3F;
    out
};

/// One operator of a patch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FmOperator {
    pub eg_rates: [u8; 4],
    pub eg_levels: [u8; 4],
    /// 0-99, 39 = C3
    pub kbd_breakpoint: u8,
    pub kbd_left_depth: u8,
    pub kbd_right_depth: u8,
    /// 0 = -LIN, 1 = -EXP, 2 = +EXP, 3 = +LIN
    pub kbd_left_curve: u8,
    pub kbd_right_curve: u8,
    pub rate_scaling: u8,
    pub amp_mod_sens: u8,
    pub velocity_sens: u8,
    pub output_level: u8,
    /// 0 = ratio, 1 = fixed frequency
    pub osc_mode: u8,
    pub freq_coarse: u8,
    pub freq_fine: u8,
    /// 0-14, 7 = centre
    pub detune: u8,
}

impl FmOperator {
    fn read_unpacked(b: &[u8]) -> Self {
        let m = &UNPACKED_MAX;
        let c = |i: usize| b[i].min(m[i]);
        Self {
            eg_rates: [c(0), c(1), c(2), c(3)],
            eg_levels: [c(4), c(5), c(6), c(7)],
            kbd_breakpoint: c(8),
            kbd_left_depth: c(9),
            kbd_right_depth: c(10),
            kbd_left_curve: c(11),
            kbd_right_curve: c(12),
            rate_scaling: c(13),
            amp_mod_sens: c(14),
            velocity_sens: c(15),
            output_level: c(16),
            osc_mode: c(17),
            freq_coarse: c(18),
            freq_fine: c(19),
            detune: c(20),
        }
    }

    fn write_unpacked(&self, b: &mut [u8]) {
        b[0..4].copy_from_slice(&self.eg_rates);
        b[4..8].copy_from_slice(&self.eg_levels);
        b[8] = self.kbd_breakpoint;
        b[9] = self.kbd_left_depth;
        b[10] = self.kbd_right_depth;
        b[11] = self.kbd_left_curve;
        b[12] = self.kbd_right_curve;
        b[13] = self.rate_scaling;
        b[14] = self.amp_mod_sens;
        b[15] = self.velocity_sens;
        b[16] = self.output_level;
        b[17] = self.osc_mode;
        b[18] = self.freq_coarse;
        b[19] = self.freq_fine;
        b[20] = self.detune;
    }

    fn read_packed(b: &[u8]) -> Self {
        let lim = |v: u8, max: u8| v.min(max);
        Self {
            eg_rates: [lim(b[0], 99), lim(b[1], 99), lim(b[2], 99), lim(b[3], 99)],
            eg_levels: [lim(b[4], 99), lim(b[5], 99), lim(b[6], 99), lim(b[7], 99)],
            kbd_breakpoint: lim(b[8], 99),
            kbd_left_depth: lim(b[9], 99),
            kbd_right_depth: lim(b[10], 99),
            kbd_left_curve: b[11] & 0x03,
            kbd_right_curve: (b[11] >> 2) & 0x03,
            rate_scaling: b[12] & 0x07,
            detune: lim((b[12] >> 3) & 0x0F, 14),
            amp_mod_sens: b[13] & 0x03,
            velocity_sens: (b[13] >> 2) & 0x07,
            output_level: lim(b[14], 99),
            osc_mode: b[15] & 0x01,
            freq_coarse: (b[15] >> 1) & 0x1F,
            freq_fine: lim(b[16], 99),
        }
    }

    fn write_packed(&self, b: &mut [u8]) {
        b[0..4].copy_from_slice(&self.eg_rates);
        b[4..8].copy_from_slice(&self.eg_levels);
        b[8] = self.kbd_breakpoint;
        b[9] = self.kbd_left_depth;
        b[10] = self.kbd_right_depth;
        b[11] = (self.kbd_left_curve & 0x03) | ((self.kbd_right_curve & 0x03) << 2);
        b[12] = (self.rate_scaling & 0x07) | ((self.detune & 0x0F) << 3);
        b[13] = (self.amp_mod_sens & 0x03) | ((self.velocity_sens & 0x07) << 2);
        b[14] = self.output_level;
        b[15] = (self.osc_mode & 0x01) | ((self.freq_coarse & 0x1F) << 1);
        b[16] = self.freq_fine;
    }
}

/// Shared LFO settings of a patch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FmLfo {
    pub speed: u8,
    pub delay: u8,
    pub pitch_mod_depth: u8,
    pub amp_mod_depth: u8,
    pub key_sync: u8,
    /// 0 = triangle, 1 = saw down, 2 = saw up, 3 = square, 4 = sine, 5 = sample & hold
    pub wave: u8,
    pub pitch_mod_sens: u8,
}

/// A decoded six-operator patch. `operators[0]` is OP1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FmPatch {
    pub operators: [FmOperator; OPERATORS],
    pub pitch_eg_rates: [u8; 4],
    pub pitch_eg_levels: [u8; 4],
    /// 0-31
    pub algorithm: u8,
    /// 0-7
    pub feedback: u8,
    pub osc_key_sync: u8,
    pub lfo: FmLfo,
    /// 0-48, 24 = no transpose
    pub transpose: u8,
    pub name: [u8; 10],
    /// Bit n enables OP(n+1)
    pub op_enable: u8,
}

impl Default for FmPatch {
    fn default() -> Self {
        Self::init_voice()
    }
}

impl FmPatch {
    /// The classic initial voice: a single sine carrier.
    pub fn init_voice() -> Self {
        let mut op = FmOperator {
            eg_rates: [99, 99, 99, 99],
            eg_levels: [99, 99, 99, 0],
            kbd_breakpoint: 39,
            freq_coarse: 1,
            detune: 7,
            ..FmOperator::default()
        };
        let silent = op;
        op.output_level = 99;
        let mut operators = [silent; OPERATORS];
        operators[0] = op;
        let mut name = [b' '; 10];
        name.copy_from_slice(b"INIT VOICE");
        Self {
            operators,
            pitch_eg_rates: [99, 99, 99, 99],
            pitch_eg_levels: [50, 50, 50, 50],
            algorithm: 0,
            feedback: 0,
            osc_key_sync: 1,
            lfo: FmLfo {
                speed: 35,
                pitch_mod_sens: 3,
                key_sync: 1,
                ..FmLfo::default()
            },
            transpose: 24,
            name,
            op_enable: 0x3F,
        }
    }

    /// Decode any supported encoding, chosen by length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PatchError> {
        match bytes.len() {
            UNPACKED_SIZE | VOICE_DATA_SIZE => Self::from_unpacked(bytes),
            PACKED_SIZE => Self::from_packed(bytes),
            n => Err(PatchError::BadSize(n)),
        }
    }

    /// Decode the unpacked form. Out-of-range values are clamped. A
    /// 155-byte buffer gets all operators enabled.
    pub fn from_unpacked(b: &[u8]) -> Result<Self, PatchError> {
        if b.len() < VOICE_DATA_SIZE {
            return Err(PatchError::TooShort { expected: VOICE_DATA_SIZE, actual: b.len() });
        }
        let mut operators = [FmOperator::default(); OPERATORS];
        for (i, op) in operators.iter_mut().enumerate() {
            // stored OP6 first
            let base = (OPERATORS - 1 - i) * OP_UNPACKED;
            *op = FmOperator::read_unpacked(&b[base..base + OP_UNPACKED]);
        }
        let g = GLOBAL_UNPACKED;
        let c = |i: usize| b[i].min(UNPACKED_MAX[i]);
        let mut name = [0u8; 10];
        for (k, n) in name.iter_mut().enumerate() {
            *n = c(g + 19 + k);
        }
        Ok(Self {
            operators,
            pitch_eg_rates: [c(g), c(g + 1), c(g + 2), c(g + 3)],
            pitch_eg_levels: [c(g + 4), c(g + 5), c(g + 6), c(g + 7)],
            algorithm: c(g + 8),
            feedback: c(g + 9),
            osc_key_sync: c(g + 10),
            lfo: FmLfo {
                speed: c(g + 11),
                delay: c(g + 12),
                pitch_mod_depth: c(g + 13),
                amp_mod_depth: c(g + 14),
                key_sync: c(g + 15),
                wave: c(g + 16),
                pitch_mod_sens: c(g + 17),
            },
            transpose: c(g + 18),
            name,
            op_enable: b.get(OP_ENABLE_OFFSET).map_or(0x3F, |m| m & 0x3F),
        })
    }

    /// Decode the 128-byte packed form.
    pub fn from_packed(b: &[u8]) -> Result<Self, PatchError> {
        if b.len() < PACKED_SIZE {
            return Err(PatchError::TooShort { expected: PACKED_SIZE, actual: b.len() });
        }
        let mut operators = [FmOperator::default(); OPERATORS];
        for (i, op) in operators.iter_mut().enumerate() {
            let base = (OPERATORS - 1 - i) * OP_PACKED;
            *op = FmOperator::read_packed(&b[base..base + OP_PACKED]);
        }
        let g = GLOBAL_PACKED;
        let lim = |i: usize, max: u8| b[i].min(max);
        let mut name = [0u8; 10];
        for (k, n) in name.iter_mut().enumerate() {
            *n = b[g + 16 + k] & 0x7F;
        }
        Ok(Self {
            operators,
            pitch_eg_rates: [lim(g, 99), lim(g + 1, 99), lim(g + 2, 99), lim(g + 3, 99)],
            pitch_eg_levels: [lim(g + 4, 99), lim(g + 5, 99), lim(g + 6, 99), lim(g + 7, 99)],
            algorithm: b[g + 8] & 0x1F,
            feedback: b[g + 9] & 0x07,
            osc_key_sync: (b[g + 9] >> 3) & 0x01,
            lfo: FmLfo {
                speed: lim(g + 10, 99),
                delay: lim(g + 11, 99),
                pitch_mod_depth: lim(g + 12, 99),
                amp_mod_depth: lim(g + 13, 99),
                key_sync: b[g + 14] & 0x01,
                wave: ((b[g + 14] >> 1) & 0x07).min(5),
                pitch_mod_sens: (b[g + 14] >> 4) & 0x07,
            },
            transpose: lim(g + 15, 48),
            name,
            op_enable: 0x3F,
        })
    }

    /// Encode to the 156-byte unpacked form.
    pub fn to_unpacked(&self) -> [u8; UNPACKED_SIZE] {
        let mut b = [0u8; UNPACKED_SIZE];
        for (i, op) in self.operators.iter().enumerate() {
            let base = (OPERATORS - 1 - i) * OP_UNPACKED;
            op.write_unpacked(&mut b[base..base + OP_UNPACKED]);
        }
        let g = GLOBAL_UNPACKED;
        b[g..g + 4].copy_from_slice(&self.pitch_eg_rates);
        b[g + 4..g + 8].copy_from_slice(&self.pitch_eg_levels);
        b[g + 8] = self.algorithm;
        b[g + 9] = self.feedback;
        b[g + 10] = self.osc_key_sync;
        b[g + 11] = self.lfo.speed;
        b[g + 12] = self.lfo.delay;
        b[g + 13] = self.lfo.pitch_mod_depth;
        b[g + 14] = self.lfo.amp_mod_depth;
        b[g + 15] = self.lfo.key_sync;
        b[g + 16] = self.lfo.wave;
        b[g + 17] = self.lfo.pitch_mod_sens;
        b[g + 18] = self.transpose;
        b[g + 19..g + 29].copy_from_slice(&self.name);
        b[OP_ENABLE_OFFSET] = self.op_enable & 0x3F;
        b
    }

    /// Encode to the 128-byte packed form. The operator-enable mask is not
    /// part of this encoding.
    pub fn to_packed(&self) -> [u8; PACKED_SIZE] {
        let mut b = [0u8; PACKED_SIZE];
        for (i, op) in self.operators.iter().enumerate() {
            let base = (OPERATORS - 1 - i) * OP_PACKED;
            op.write_packed(&mut b[base..base + OP_PACKED]);
        }
        let g = GLOBAL_PACKED;
        b[g..g + 4].copy_from_slice(&self.pitch_eg_rates);
        b[g + 4..g + 8].copy_from_slice(&self.pitch_eg_levels);
        b[g + 8] = self.algorithm & 0x1F;
        b[g + 9] = (self.feedback & 0x07) | ((self.osc_key_sync & 0x01) << 3);
        b[g + 10] = self.lfo.speed;
        b[g + 11] = self.lfo.delay;
        b[g + 12] = self.lfo.pitch_mod_depth;
        b[g + 13] = self.lfo.amp_mod_depth;
        b[g + 14] = (self.lfo.key_sync & 0x01)
            | ((self.lfo.wave & 0x07) << 1)
            | ((self.lfo.pitch_mod_sens & 0x07) << 4);
        b[g + 15] = self.transpose;
        for (k, n) in self.name.iter().enumerate() {
            b[g + 16 + k] = n & 0x7F;
        }
        b
    }

    /// Patch name with trailing spaces trimmed; non-ASCII bytes read as '?'.
    pub fn name_str(&self, buf: &mut [u8; 10]) -> usize {
        let mut len = 0;
        for (i, &c) in self.name.iter().enumerate() {
            buf[i] = if c.is_ascii_graphic() || c == b' ' { c } else { b'?' };
            if c != b' ' {
                len = i + 1;
            }
        }
        len
    }
}

/// FM instrument parameters: the unpacked patch bytes, addressed by offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FmParams {
    pub voice: [u8; UNPACKED_SIZE],
}

impl Default for FmParams {
    fn default() -> Self {
        Self::from_patch(&FmPatch::init_voice())
    }
}

impl FmParams {
    pub fn from_patch(patch: &FmPatch) -> Self {
        Self { voice: patch.to_unpacked() }
    }

    pub fn patch(&self) -> FmPatch {
        // The buffer always has the full unpacked length.
        FmPatch::from_unpacked(&self.voice).unwrap_or_default()
    }

    pub fn param_count(&self) -> usize {
        UNPACKED_SIZE
    }

    pub fn get_parameter(&self, index: usize) -> Option<f32> {
        self.voice.get(index).map(|&v| v as f32)
    }

    /// Clamped set of one patch byte; returns false for an unknown index.
    pub fn set_parameter(&mut self, index: usize, value: f32) -> bool {
        let Some(&max) = UNPACKED_MAX.get(index) else {
            return false;
        };
        let v = if value.is_nan() { 0.0 } else { libm::roundf(value) };
        self.voice[index] = v.clamp(0.0, max as f32) as u8;
        true
    }

    /// Replace the patch from an imported buffer.
    pub fn import(&mut self, bytes: &[u8]) -> Result<(), PatchError> {
        let patch = FmPatch::from_bytes(bytes)?;
        self.voice = patch.to_unpacked();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_operator() -> impl Strategy<Value = FmOperator> {
        (
            (prop::array::uniform4(0u8..=99), prop::array::uniform4(0u8..=99)),
            (0u8..=99, 0u8..=99, 0u8..=99, 0u8..=3, 0u8..=3),
            (0u8..=7, 0u8..=3, 0u8..=7, 0u8..=99),
            (0u8..=1, 0u8..=31, 0u8..=99, 0u8..=14),
        )
            .prop_map(|((rates, levels), (bp, ld, rd, lc, rc), (rs, ams, kvs, ol), (mode, fc, ff, det))| {
                FmOperator {
                    eg_rates: rates,
                    eg_levels: levels,
                    kbd_breakpoint: bp,
                    kbd_left_depth: ld,
                    kbd_right_depth: rd,
                    kbd_left_curve: lc,
                    kbd_right_curve: rc,
                    rate_scaling: rs,
                    amp_mod_sens: ams,
                    velocity_sens: kvs,
                    output_level: ol,
                    osc_mode: mode,
                    freq_coarse: fc,
                    freq_fine: ff,
                    detune: det,
                }
            })
    }

    fn arb_patch() -> impl Strategy<Value = FmPatch> {
        (
            prop::array::uniform6(arb_operator()),
            (prop::array::uniform4(0u8..=99), prop::array::uniform4(0u8..=99)),
            (0u8..=31, 0u8..=7, 0u8..=1, 0u8..=48),
            (0u8..=99, 0u8..=99, 0u8..=99, 0u8..=99, 0u8..=1, 0u8..=5, 0u8..=7),
            prop::array::uniform10(0u8..=127),
        )
            .prop_map(|(operators, (pr, pl), (alg, fb, oks, tr), (s, d, pmd, amd, ks, w, pms), name)| FmPatch {
                operators,
                pitch_eg_rates: pr,
                pitch_eg_levels: pl,
                algorithm: alg,
                feedback: fb,
                osc_key_sync: oks,
                lfo: FmLfo {
                    speed: s,
                    delay: d,
                    pitch_mod_depth: pmd,
                    amp_mod_depth: amd,
                    key_sync: ks,
                    wave: w,
                    pitch_mod_sens: pms,
                },
                transpose: tr,
                name,
                op_enable: 0x3F,
            })
    }

    proptest! {
        #[test]
        fn packed_decode_reproduces_every_field(patch in arb_patch()) {
            let packed = patch.to_packed();
            let decoded = FmPatch::from_packed(&packed).unwrap();
            prop_assert_eq!(decoded, patch);
            prop_assert_eq!(decoded.to_packed(), packed);
        }

        #[test]
        fn unpacked_decode_reproduces_every_field(patch in arb_patch(), mask in 0u8..64) {
            let patch = FmPatch { op_enable: mask, ..patch };
            let decoded = FmPatch::from_unpacked(&patch.to_unpacked()).unwrap();
            prop_assert_eq!(decoded, patch);
        }
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert_eq!(
            FmPatch::from_packed(&[0u8; 100]),
            Err(PatchError::TooShort { expected: PACKED_SIZE, actual: 100 })
        );
        assert!(matches!(FmPatch::from_unpacked(&[0u8; 154]), Err(PatchError::TooShort { .. })));
        assert_eq!(FmPatch::from_bytes(&[0u8; 130]), Err(PatchError::BadSize(130)));
    }

    #[test]
    fn known_bitfields_in_packed_byte() {
        let mut patch = FmPatch::init_voice();
        patch.operators[5].detune = 14;
        patch.operators[5].rate_scaling = 5;
        patch.operators[5].freq_coarse = 31;
        patch.operators[5].osc_mode = 1;
        let packed = patch.to_packed();
        // OP6 is stored first
        assert_eq!(packed[12], 5 | (14 << 3));
        assert_eq!(packed[15], 1 | (31 << 1));
    }

    #[test]
    fn unpacked_out_of_range_values_are_clamped() {
        let mut bytes = FmPatch::init_voice().to_unpacked();
        bytes[GLOBAL_UNPACKED + 8] = 200;
        let patch = FmPatch::from_unpacked(&bytes).unwrap();
        assert_eq!(patch.algorithm, 31);
    }

    #[test]
    fn voice_data_without_mask_enables_all_operators() {
        let bytes = FmPatch::init_voice().to_unpacked();
        let patch = FmPatch::from_bytes(&bytes[..VOICE_DATA_SIZE]).unwrap();
        assert_eq!(patch.op_enable, 0x3F);
    }

    #[test]
    fn params_clamp_per_field() {
        let mut p = FmParams::default();
        assert!(p.set_parameter(GLOBAL_UNPACKED + 9, 12.0));
        assert_eq!(p.patch().feedback, 7);
        assert!(!p.set_parameter(UNPACKED_SIZE, 1.0));
    }

    #[test]
    fn init_voice_name() {
        let mut buf = [0u8; 10];
        let len = FmPatch::init_voice().name_str(&mut buf);
        assert_eq!(&buf[..len], b"INIT VOICE");
    }
}
