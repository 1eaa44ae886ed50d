//! The sixteen macro-oscillator algorithms.
//!
//! Each reads the same three macro controls and reinterprets them:
//! harmonics, timbre and morph, all 0..1.

use alloc::vec;
use alloc::vec::Vec;
use core::f32::consts::{FRAC_PI_2, TAU};

use crate::dsp::filter::Svf;
use crate::dsp::noise::Rng;
use crate::dsp::oscillator::{pulse, saw, sine, triangle, wrap};

pub const ALGORITHM_NAMES: [&str; 16] = [
    "Virtual Analog",
    "Waveshaper",
    "FM",
    "Grain",
    "Additive",
    "Wavetable",
    "Chords",
    "Speech",
    "Swarm",
    "Noise",
    "Particle",
    "String",
    "Modal",
    "Bass Drum",
    "Snare Drum",
    "Hi-Hat",
];

const FM_RATIOS: [f32; 8] = [0.5, 1.0, 1.5, 2.0, 3.0, 4.0, 5.0, 7.0];

const CHORDS: [[f32; 4]; 8] = [
    [0.0, 4.0, 7.0, 12.0],
    [0.0, 3.0, 7.0, 12.0],
    [0.0, 4.0, 7.0, 11.0],
    [0.0, 3.0, 7.0, 10.0],
    [0.0, 4.0, 7.0, 10.0],
    [0.0, 5.0, 7.0, 12.0],
    [0.0, 7.0, 12.0, 19.0],
    [0.0, 3.0, 6.0, 10.0],
];

/// Formant frequencies (Hz) for a, e, i, o, u.
const VOWELS: [[f32; 3]; 5] = [
    [730.0, 1090.0, 2440.0],
    [530.0, 1840.0, 2480.0],
    [270.0, 2290.0, 3010.0],
    [570.0, 840.0, 2410.0],
    [300.0, 870.0, 2240.0],
];

const HARMONIC_MODES: [f32; 4] = [1.0, 2.0, 3.0, 4.0];
const BELL_MODES: [f32; 4] = [1.0, 2.756, 5.404, 8.933];
const HAT_RATIOS: [f32; 6] = [1.0, 1.3419, 1.2312, 1.6532, 1.9523, 2.1523];

const LOWEST_STRING_HZ: f32 = 20.0;

/// Macro controls after modulation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Shape {
    pub harmonics: f32,
    pub timbre: f32,
    pub morph: f32,
}

#[inline]
fn pick<const N: usize, T: Copy>(table: &[T; N], x: f32) -> T {
    table[((x.clamp(0.0, 1.0) * (N as f32 - 0.01)) as usize).min(N - 1)]
}

#[inline]
fn decay_coef(seconds: f32, sample_rate: f32) -> f32 {
    libm::expf(-1.0 / (seconds.max(0.001) * sample_rate))
}

/// Two-pole resonator normalised to unit impulse peak.
#[derive(Clone, Debug, Default)]
struct Resonator {
    a1: f32,
    a2: f32,
    gain: f32,
    y1: f32,
    y2: f32,
}

impl Resonator {
    fn set(&mut self, hz: f32, decay_s: f32, sample_rate: f32) {
        let w = TAU * hz.clamp(10.0, sample_rate * 0.45) / sample_rate;
        let r = decay_coef(decay_s, sample_rate);
        self.a1 = 2.0 * r * libm::cosf(w);
        self.a2 = -r * r;
        self.gain = libm::sinf(w);
    }

    fn reset(&mut self) {
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        let y = self.a1 * self.y1 + self.a2 * self.y2 + x * self.gain;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// Per-voice oscillator state covering every algorithm.
#[derive(Clone, Debug)]
pub struct AlgoState {
    sample_rate: f32,
    phases: [f32; 8],
    ratios: [f32; 8],
    rng: Rng,
    feedback: f32,
    formants: [Svf; 3],
    noise_filter: Svf,
    resonators: [Resonator; 4],
    string: Vec<f32>,
    string_pos: usize,
    string_last: f32,
    excite: f32,
    env: f32,
    env_coef: f32,
    pitch_env: f32,
}

impl AlgoState {
    pub fn new(sample_rate: f32, seed: u32) -> Self {
        let len = (sample_rate / LOWEST_STRING_HZ) as usize + 2;
        Self {
            sample_rate,
            phases: [0.0; 8],
            ratios: [1.0; 8],
            rng: Rng::new(seed),
            feedback: 0.0,
            formants: [Svf::new(), Svf::new(), Svf::new()],
            noise_filter: Svf::new(),
            resonators: Default::default(),
            string: vec![0.0; len],
            string_pos: 0,
            string_last: 0.0,
            excite: 0.0,
            env: 0.0,
            env_coef: 0.0,
            pitch_env: 0.0,
        }
    }

    /// Reset oscillators and excite the physical models.
    pub fn trigger(&mut self, algorithm: usize, shape: &Shape) {
        self.phases = [0.0; 8];
        self.feedback = 0.0;
        self.excite = 1.0;
        self.env = 1.0;
        self.pitch_env = 1.0;
        for r in &mut self.resonators {
            r.reset();
        }
        if algorithm == 11 {
            // noise burst, darker with low harmonics
            let mut lp = 0.0;
            let bright = 0.1 + shape.harmonics * 0.9;
            for s in self.string.iter_mut() {
                lp += (self.rng.next_bipolar() - lp) * bright;
                *s = lp;
            }
        }
    }

    /// Whether the algorithm's own envelope has died away.
    pub fn is_silent(&self, algorithm: usize) -> bool {
        algorithm >= 13 && self.env < 1.0e-4
    }

    /// Per-block setup of pitch-dependent filters.
    pub fn prepare(&mut self, algorithm: usize, shape: &Shape, hz: f32) {
        let sr = self.sample_rate;
        let Shape { harmonics: h, timbre: t, morph: m } = *shape;
        match algorithm {
            6 => {
                let chord = pick(&CHORDS, h);
                let inversion = (t * 4.0) as usize;
                for (j, semis) in chord.iter().enumerate() {
                    let up = if j < inversion { 12.0 } else { 0.0 };
                    self.ratios[j] = libm::exp2f((semis + up) / 12.0);
                }
            }
            7 => {
                let pos = t.clamp(0.0, 1.0) * 3.999;
                let (i, frac) = (pos as usize, pos - libm::floorf(pos));
                let shift = libm::exp2f(h - 0.5);
                for k in 0..3 {
                    let f = VOWELS[i][k] + (VOWELS[i + 1][k] - VOWELS[i][k]) * frac;
                    self.formants[k].set(f * shift, 0.85, sr);
                }
            }
            8 => {
                for j in 0..8 {
                    self.ratios[j] = 1.0 + (j as f32 - 3.5) / 3.5 * h * 0.05;
                }
            }
            9 => {
                let cutoff = hz * libm::exp2f(t * 6.0 - 2.0);
                self.noise_filter.set(cutoff, h * 0.95, sr);
            }
            10 => {
                self.env_coef = 0.1 + m * 2.0;
            }
            12 => {
                let decay = 0.05 + m * m * 4.0;
                for (j, r) in self.resonators.iter_mut().enumerate() {
                    let ratio = HARMONIC_MODES[j] + (BELL_MODES[j] - HARMONIC_MODES[j]) * h;
                    r.set(hz * ratio, decay / (1.0 + j as f32 * (1.0 - t)), sr);
                }
            }
            13..=15 => {
                let decay = match algorithm {
                    13 => 0.05 * libm::powf(20.0, m),
                    14 => 0.04 * libm::powf(12.0, m),
                    _ => 0.02 * libm::powf(25.0, m),
                };
                self.env_coef = decay_coef(decay, sr);
                if algorithm == 14 {
                    self.noise_filter.set(2000.0 + t * 6000.0, 0.3, sr);
                } else if algorithm == 15 {
                    self.noise_filter.set(6000.0 * libm::exp2f(t - 0.5), 0.2, sr);
                }
            }
            _ => {}
        }
    }

    #[inline]
    fn advance(&mut self, i: usize, inc: f32) -> f32 {
        let p = self.phases[i];
        self.phases[i] = wrap(p + inc);
        p
    }

    /// One output sample for `algorithm` at phase increment `inc` (cycles).
    #[inline]
    pub fn next(&mut self, algorithm: usize, shape: &Shape, inc: f32) -> f32 {
        let Shape { harmonics: h, timbre: t, morph: m } = *shape;
        match algorithm {
            0 => {
                let detune = 1.0 + h * 0.03;
                let a = saw(self.advance(0, inc), inc);
                let b = pulse(self.advance(1, inc * detune), inc * detune, 0.5 - 0.45 * t);
                a * (1.0 - m) + b * m
            }
            1 => {
                let tri = triangle(self.advance(0, inc));
                let x = tri * (1.0 + h * 7.0) + m * 0.5;
                libm::sinf(FRAC_PI_2 * x) * (1.0 - t * 0.5) + tri * t * 0.5
            }
            2 => {
                let ratio = pick(&FM_RATIOS, h);
                let pm = self.advance(1, inc * ratio);
                let modulator = sine(pm + self.feedback * m * 0.5);
                self.feedback = modulator;
                sine(self.advance(0, inc) + modulator * t * 2.0)
            }
            3 => {
                let p0 = self.phases[0];
                let next = p0 + inc;
                if next >= 1.0 {
                    self.phases[1] = 0.0;
                    self.phases[2] = 0.0;
                }
                self.phases[0] = wrap(next);
                let window = 1.0 - p0;
                let f1 = self.advance(1, inc * libm::exp2f(1.0 + t * 4.0));
                let f2 = self.advance(2, inc * libm::exp2f(2.0 + h * 4.0));
                (sine(f1) * (1.0 - m * 0.5) + sine(f2) * m * 0.5) * window * window
            }
            4 => {
                let p = self.advance(0, inc);
                let centre = 1.0 + h * 7.0;
                let width = 0.5 + t * 4.0;
                let (mut sum, mut norm) = (0.0, 0.0);
                for k in 1..=8 {
                    let kf = k as f32;
                    if kf * inc >= 0.5 {
                        break;
                    }
                    let d = (kf - centre) / width;
                    let mut a = libm::expf(-0.5 * d * d);
                    if k % 2 == 0 {
                        a *= 1.0 - m;
                    }
                    sum += a * sine(wrap(p * kf));
                    norm += a;
                }
                if norm > 0.0 { sum / norm } else { 0.0 }
            }
            5 => {
                let p = self.advance(0, inc);
                let pd = wrap(p + h * 0.25 * sine(p));
                let shapes = [sine(pd), triangle(pd), saw(pd, inc), pulse(pd, inc, 0.5)];
                let pos = t.clamp(0.0, 1.0) * 2.999;
                let i = pos as usize;
                let frac = pos - i as f32;
                let main = shapes[i] + (shapes[i + 1] - shapes[i]) * frac;
                let sub = sine(self.advance(1, inc * 0.5));
                main * (1.0 - m * 0.5) + sub * m * 0.5
            }
            6 => {
                let mut sum = 0.0;
                for j in 0..4 {
                    let jinc = inc * self.ratios[j];
                    let p = self.advance(j, jinc);
                    sum += saw(p, jinc) * (1.0 - m) + pulse(p, jinc, 0.5) * m;
                }
                sum * 0.3
            }
            7 => {
                let glottal = saw(self.advance(0, inc), inc);
                let x = glottal * (1.0 - m) + self.rng.next_bipolar() * m;
                let f = &mut self.formants;
                (f[0].process(x).bandpass + f[1].process(x).bandpass * 0.7 + f[2].process(x).bandpass * 0.4)
                    * 1.5
            }
            8 => {
                let count = 2 + (t * 6.0) as usize;
                let mut sum = 0.0;
                for j in 0..count.min(8) {
                    let octave = if j % 2 == 1 { 1.0 + m } else { 1.0 };
                    let jinc = inc * self.ratios[j] * octave;
                    sum += saw(self.advance(j, jinc), jinc);
                }
                sum / libm::sqrtf(count as f32)
            }
            9 => {
                let o = self.noise_filter.process(self.rng.next_bipolar());
                if m < 0.5 {
                    let x = m * 2.0;
                    o.lowpass * (1.0 - x) + o.bandpass * x
                } else {
                    let x = (m - 0.5) * 2.0;
                    o.bandpass * (1.0 - x) + o.highpass * x
                }
            }
            10 => {
                let density = t * t * 0.01 + 0.0002;
                let mut impulse = 0.0;
                if self.rng.next_unit() < density {
                    impulse = self.rng.next_bipolar();
                    let hz = inc * self.sample_rate;
                    let j = (self.rng.next_u32() % 4) as usize;
                    let spread = 1.0 + self.rng.next_unit() * h * 2.0;
                    self.resonators[j].set(hz * spread, self.env_coef, self.sample_rate);
                }
                self.resonators.iter_mut().map(|r| r.process(impulse)).sum::<f32>() * 0.5
            }
            11 => {
                let len = self.string.len();
                let delay = (1.0 / inc.max(LOWEST_STRING_HZ / self.sample_rate)).min(len as f32 - 2.0);
                let read = self.string_pos as f32 + len as f32 - delay;
                let i = read as usize;
                let frac = read - libm::floorf(read);
                let a = self.string[i % len];
                let b = self.string[(i + 1) % len];
                let out = a + (b - a) * frac;
                // damping lowpass; timbre keeps more highs, morph sustains
                let damp = 0.2 + t * 0.75;
                let filtered = self.string_last + (out - self.string_last) * damp;
                self.string_last = filtered;
                self.string[self.string_pos] = filtered * (0.990 + m * 0.0099);
                self.string_pos = (self.string_pos + 1) % len;
                out
            }
            12 => {
                let x = if self.excite > 0.0 {
                    let e = self.excite;
                    self.excite = 0.0;
                    e
                } else {
                    0.0
                };
                let mut sum = 0.0;
                for (j, r) in self.resonators.iter_mut().enumerate() {
                    let level = 1.0 / (1.0 + j as f32 * (1.0 - t) * 2.0);
                    sum += r.process(x) * level;
                }
                sum * 0.5
            }
            13 => {
                self.env *= self.env_coef;
                self.pitch_env *= 0.9985;
                let bend = 1.0 + self.pitch_env * (1.0 + t * 4.0);
                let body = sine(self.advance(0, inc * bend));
                let click = if self.excite > 0.0 {
                    self.excite *= 0.9;
                    self.rng.next_bipolar() * self.excite * t
                } else {
                    0.0
                };
                libm::tanhf((body + click) * (1.0 + h * 4.0)) * self.env
            }
            14 => {
                self.env *= self.env_coef;
                self.pitch_env *= 0.998;
                let bend = 1.0 + self.pitch_env * 0.5;
                let tone = sine(self.advance(0, inc * bend)) + sine(self.advance(1, inc * bend * 1.47)) * 0.6;
                let noise = self.noise_filter.process(self.rng.next_bipolar()).bandpass * 2.0;
                let mix = 0.3 + h * 0.6;
                (tone * (1.0 - mix) + noise * mix) * self.env
            }
            15 => {
                self.env *= self.env_coef;
                let mut metal = 0.0;
                for (j, ratio) in HAT_RATIOS.iter().enumerate() {
                    let p = self.advance(j, inc * 4.0 * ratio);
                    metal += if p < 0.5 { 1.0 } else { -1.0 };
                }
                let x = metal / 6.0 * (1.0 - h) + self.rng.next_bipolar() * h;
                self.noise_filter.process(x).highpass * self.env
            }
            _ => 0.0,
        }
    }
}
