//! Decoded sample data shared between the edit context and processors.

use alloc::vec::Vec;

/// Immutable PCM data, interleaved, one or two channels.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    data: Vec<f32>,
    channels: usize,
    frames: usize,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Build from interleaved data. Channels beyond the first two are
    /// dropped. Returns `None` for empty data, zero channels or a zero rate.
    pub fn from_interleaved(data: &[f32], sample_rate: u32, channels: usize) -> Option<Self> {
        if channels == 0 || sample_rate == 0 {
            return None;
        }
        let frames = data.len() / channels;
        if frames == 0 {
            return None;
        }
        let kept = channels.min(2);
        let mut out = Vec::with_capacity(frames * kept);
        for frame in data.chunks_exact(channels) {
            out.extend_from_slice(&frame[..kept]);
        }
        Some(Self { data: out, channels: kept, frames, sample_rate })
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Raw interleaved data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Stereo frame; mono data is duplicated. Out of range reads silence.
    #[inline]
    pub fn frame(&self, i: usize) -> (f32, f32) {
        if i >= self.frames {
            return (0.0, 0.0);
        }
        if self.channels == 1 {
            let v = self.data[i];
            (v, v)
        } else {
            (self.data[i * 2], self.data[i * 2 + 1])
        }
    }

    /// Linearly interpolated frame at a fractional position.
    #[inline]
    pub fn read(&self, pos: f64) -> (f32, f32) {
        if pos < 0.0 {
            return (0.0, 0.0);
        }
        let i = pos as usize;
        let frac = (pos - i as f64) as f32;
        let (l0, r0) = self.frame(i);
        let (l1, r1) = self.frame(i + 1);
        (l0 + (l1 - l0) * frac, r0 + (r1 - r0) * frac)
    }

    /// Mono mixdown for analysis.
    pub fn to_mono(&self) -> Vec<f32> {
        (0..self.frames)
            .map(|i| {
                let (l, r) = self.frame(i);
                (l + r) * 0.5
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_input() {
        assert!(SampleBuffer::from_interleaved(&[], 48_000, 1).is_none());
        assert!(SampleBuffer::from_interleaved(&[0.1], 0, 1).is_none());
        assert!(SampleBuffer::from_interleaved(&[0.1], 48_000, 0).is_none());
        assert!(SampleBuffer::from_interleaved(&[0.1], 48_000, 2).is_none());
    }

    #[test]
    fn extra_channels_are_dropped() {
        let s = SampleBuffer::from_interleaved(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 44_100, 3).unwrap();
        assert_eq!(s.channels(), 2);
        assert_eq!(s.frames(), 2);
        assert_eq!(s.frame(1), (4.0, 5.0));
    }

    #[test]
    fn interpolated_read() {
        let s = SampleBuffer::from_interleaved(&[0.0, 1.0], 8000, 1).unwrap();
        assert_eq!(s.read(0.25), (0.25, 0.25));
        // past the end fades toward silence
        assert_eq!(s.read(1.5), (0.5, 0.5));
        assert_eq!(s.read(5.0), (0.0, 0.0));
    }
}
