//! Send-effect buses: tempo-synced ping-pong delay and a Schroeder reverb.
//!
//! All buffers are allocated at construction; processing never allocates.

use alloc::vec;
use alloc::vec::Vec;

use tb_ir::Mixer;

/// Longest delay line, in seconds.
const MAX_DELAY_SECONDS: f32 = 4.0;

const COMB_MS: [f32; 4] = [29.7, 37.1, 41.1, 43.7];
const ALLPASS_MS: [f32; 2] = [5.0, 1.7];
/// Right-channel line offset for stereo decorrelation.
const STEREO_SPREAD: usize = 23;

#[derive(Clone, Debug)]
pub struct StereoDelay {
    left: Vec<f32>,
    right: Vec<f32>,
    write: usize,
    delay: usize,
    feedback: f32,
}

impl StereoDelay {
    pub fn new(sample_rate: f32) -> Self {
        let len = (sample_rate * MAX_DELAY_SECONDS) as usize + 1;
        Self {
            left: vec![0.0; len],
            right: vec![0.0; len],
            write: 0,
            delay: len / 4,
            feedback: 0.3,
        }
    }

    pub fn set(&mut self, delay_samples: f64, feedback: f32) {
        let max = self.left.len() - 1;
        self.delay = (delay_samples as usize).clamp(1, max);
        self.feedback = feedback.clamp(0.0, 0.95);
    }

    pub fn reset(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
    }

    /// Ping-pong: input enters left, echoes alternate sides.
    #[inline]
    pub fn process(&mut self, in_l: f32, in_r: f32) -> (f32, f32) {
        let len = self.left.len();
        let read = (self.write + len - self.delay) % len;
        let out_l = self.left[read];
        let out_r = self.right[read];
        self.left[self.write] = in_l + in_r * 0.5 + out_r * self.feedback;
        self.right[self.write] = in_r * 0.5 + out_l * self.feedback;
        self.write = (self.write + 1) % len;
        (out_l, out_r)
    }
}

#[derive(Clone, Debug)]
struct Comb {
    buffer: Vec<f32>,
    pos: usize,
    feedback: f32,
    damp: f32,
    store: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self { buffer: vec![0.0; len.max(1)], pos: 0, feedback: 0.8, damp: 0.3, store: 0.0 }
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        let out = self.buffer[self.pos];
        self.store = out * (1.0 - self.damp) + self.store * self.damp;
        self.buffer[self.pos] = x + self.store * self.feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }
}

#[derive(Clone, Debug)]
struct Allpass {
    buffer: Vec<f32>,
    pos: usize,
}

impl Allpass {
    fn new(len: usize) -> Self {
        Self { buffer: vec![0.0; len.max(1)], pos: 0 }
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        const G: f32 = 0.5;
        let delayed = self.buffer[self.pos];
        let out = -G * x + delayed;
        self.buffer[self.pos] = x + G * out;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }
}

#[derive(Clone, Debug)]
struct ReverbChannel {
    combs: [Comb; 4],
    allpasses: [Allpass; 2],
}

impl ReverbChannel {
    fn new(sample_rate: f32, offset: usize) -> Self {
        let samples = |ms: f32| (ms * 0.001 * sample_rate) as usize + offset;
        Self {
            combs: COMB_MS.map(|ms| Comb::new(samples(ms))),
            allpasses: ALLPASS_MS.map(|ms| Allpass::new(samples(ms))),
        }
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        let mut out = 0.0;
        for c in &mut self.combs {
            out += c.process(x);
        }
        out *= 0.25;
        for a in &mut self.allpasses {
            out = a.process(out);
        }
        out
    }
}

#[derive(Clone, Debug)]
pub struct Reverb {
    channels: [ReverbChannel; 2],
}

impl Reverb {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            channels: [
                ReverbChannel::new(sample_rate, 0),
                ReverbChannel::new(sample_rate, STEREO_SPREAD),
            ],
        }
    }

    pub fn set(&mut self, size: f32, damping: f32) {
        let feedback = 0.7 + size.clamp(0.0, 1.0) * 0.28;
        for ch in &mut self.channels {
            for c in &mut ch.combs {
                c.feedback = feedback;
                c.damp = damping.clamp(0.0, 1.0);
            }
        }
    }

    pub fn reset(&mut self) {
        for ch in &mut self.channels {
            for c in &mut ch.combs {
                c.buffer.fill(0.0);
                c.store = 0.0;
            }
            for a in &mut ch.allpasses {
                a.buffer.fill(0.0);
            }
        }
    }

    #[inline]
    pub fn process(&mut self, in_l: f32, in_r: f32) -> (f32, f32) {
        let mono = (in_l + in_r) * 0.5;
        (self.channels[0].process(mono), self.channels[1].process(mono))
    }
}

/// Both send buses plus their accumulation buffers.
#[derive(Clone, Debug)]
pub struct FxBuses {
    pub delay: StereoDelay,
    pub reverb: Reverb,
    delay_return: f32,
    reverb_return: f32,
    /// Send accumulators, one per bus and channel
    pub delay_send: [Vec<f32>; 2],
    pub reverb_send: [Vec<f32>; 2],
}

impl FxBuses {
    pub fn new(sample_rate: f32, max_block: usize) -> Self {
        Self {
            delay: StereoDelay::new(sample_rate),
            reverb: Reverb::new(sample_rate),
            delay_return: 0.5,
            reverb_return: 0.4,
            delay_send: [vec![0.0; max_block], vec![0.0; max_block]],
            reverb_send: [vec![0.0; max_block], vec![0.0; max_block]],
        }
    }

    /// Pick up mixer settings; `samples_per_beat` sets the delay time.
    pub fn configure(&mut self, mixer: &Mixer, samples_per_beat: f64) {
        self.delay.set(mixer.delay_beats() * samples_per_beat, mixer.delay_feedback);
        self.reverb.set(mixer.reverb_size, mixer.reverb_damping);
        self.delay_return = mixer.delay_return;
        self.reverb_return = mixer.reverb_return;
    }

    pub fn clear_sends(&mut self, len: usize) {
        for buf in self.delay_send.iter_mut().chain(self.reverb_send.iter_mut()) {
            let n = len.min(buf.len());
            buf[..n].fill(0.0);
        }
    }

    pub fn reset(&mut self) {
        self.delay.reset();
        self.reverb.reset();
    }

    /// Run both buses over the accumulated sends and add their returns.
    pub fn process_into(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let n = out_l.len().min(out_r.len()).min(self.delay_send[0].len());
        for i in 0..n {
            let (dl, dr) = self.delay.process(self.delay_send[0][i], self.delay_send[1][i]);
            let (rl, rr) = self.reverb.process(self.reverb_send[0][i], self.reverb_send[1][i]);
            out_l[i] += dl * self.delay_return + rl * self.reverb_return;
            out_r[i] += dr * self.delay_return + rr * self.reverb_return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_echoes_after_delay_time() {
        let mut d = StereoDelay::new(1000.0);
        d.set(10.0, 0.0);
        let mut outs = [0.0f32; 20];
        for (i, o) in outs.iter_mut().enumerate() {
            let x = if i == 0 { 1.0 } else { 0.0 };
            *o = d.process(x, 0.0).0;
        }
        assert_eq!(outs[10], 1.0);
        assert!(outs[..10].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn reverb_tail_is_bounded() {
        let mut r = Reverb::new(48_000.0);
        r.set(1.0, 0.2);
        let mut peak = 0.0f32;
        for i in 0..96_000 {
            let x = if i < 100 { 1.0 } else { 0.0 };
            let (l, rr) = r.process(x, x);
            peak = peak.max(l.abs()).max(rr.abs());
        }
        assert!(peak > 0.0);
        assert!(peak < 4.0);
    }

    #[test]
    fn silent_sends_add_nothing() {
        let mut fx = FxBuses::new(48_000.0, 64);
        fx.configure(&Mixer::default(), 24_000.0);
        fx.clear_sends(64);
        let mut l = [0.25f32; 64];
        let mut r = [0.25f32; 64];
        fx.process_into(&mut l, &mut r);
        assert!(l.iter().all(|&v| v == 0.25));
    }
}
