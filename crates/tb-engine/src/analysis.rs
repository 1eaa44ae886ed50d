//! Offline sample analysis run at load time: YIN pitch detection,
//! energy-flux onsets and zero-crossing search.
//!
//! These allocate and must stay out of the render path.

use alloc::vec;
use alloc::vec::Vec;

/// YIN absolute threshold.
const YIN_THRESHOLD: f32 = 0.15;
const MIN_HZ: f32 = 40.0;
const MAX_HZ: f32 = 2000.0;
/// Samples in the YIN integration window.
const YIN_WINDOW: usize = 2048;

/// Onset analysis hop.
pub const ONSET_HOP: usize = 512;
/// Onsets closer than this are merged.
const ONSET_MIN_GAP_MS: f32 = 50.0;

/// Fundamental frequency of a mono signal in Hz, or `None` when unvoiced.
///
/// Analyses one window starting a tenth of the way in, past the attack.
pub fn detect_pitch(samples: &[f32], sample_rate: u32) -> Option<f32> {
    let sr = sample_rate as f32;
    let min_period = ((sr / MAX_HZ) as usize).max(2);
    let mut max_period = (sr / MIN_HZ) as usize;
    let window = YIN_WINDOW.min(samples.len() / 2);
    max_period = max_period.min(samples.len().saturating_sub(window));
    if window < min_period * 2 || max_period <= min_period + 1 {
        return None;
    }
    let start = (samples.len() / 10).min(samples.len() - window - max_period);
    let x = &samples[start..start + window + max_period];

    // difference function
    let mut diff = vec![0.0f32; max_period + 1];
    for (tau, d) in diff.iter_mut().enumerate().skip(1) {
        let mut acc = 0.0;
        for j in 0..window {
            let delta = x[j] - x[j + tau];
            acc += delta * delta;
        }
        *d = acc;
    }

    // cumulative mean normalized difference
    let mut cmnd = vec![1.0f32; max_period + 1];
    let mut running = 0.0;
    for tau in 1..=max_period {
        running += diff[tau];
        cmnd[tau] = if running > 0.0 { diff[tau] * tau as f32 / running } else { 1.0 };
    }

    // first dip under the threshold, then its local minimum
    let mut tau = min_period;
    let mut found = None;
    while tau < max_period {
        if cmnd[tau] < YIN_THRESHOLD {
            while tau + 1 < max_period && cmnd[tau + 1] < cmnd[tau] {
                tau += 1;
            }
            found = Some(tau);
            break;
        }
        tau += 1;
    }
    let tau = found?;

    // parabolic interpolation
    let refined = if tau > 0 && tau < max_period {
        let (a, b, c) = (cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
        let denom = a - 2.0 * b + c;
        if denom.abs() > f32::EPSILON {
            tau as f32 + 0.5 * (a - c) / denom
        } else {
            tau as f32
        }
    } else {
        tau as f32
    };
    Some(sr / refined)
}

/// A detected onset: frame position and normalized strength (0..1].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Onset {
    pub frame: u32,
    pub strength: f32,
}

/// Energy-flux onsets, strongest normalized to 1.0, ascending by frame.
pub fn detect_onsets(samples: &[f32], sample_rate: u32) -> Vec<Onset> {
    let hops = samples.len() / ONSET_HOP;
    if hops < 2 {
        return Vec::new();
    }
    let energy: Vec<f32> = samples
        .chunks_exact(ONSET_HOP)
        .map(|c| c.iter().map(|s| s * s).sum::<f32>() / ONSET_HOP as f32)
        .collect();
    let mut flux = vec![0.0f32; hops];
    for k in 1..hops {
        flux[k] = (energy[k] - energy[k - 1]).max(0.0);
    }
    let peak = flux.iter().copied().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return Vec::new();
    }

    let min_gap = (ONSET_MIN_GAP_MS * 0.001 * sample_rate as f32) as u32;
    let mut onsets: Vec<Onset> = Vec::new();
    for k in 1..hops {
        let f = flux[k];
        let next = flux.get(k + 1).copied().unwrap_or(0.0);
        if f <= 0.0 || f < flux[k - 1] || f < next {
            continue;
        }
        let onset = Onset { frame: (k * ONSET_HOP) as u32, strength: f / peak };
        match onsets.last_mut() {
            Some(last) if onset.frame - last.frame < min_gap => {
                if onset.strength > last.strength {
                    *last = onset;
                }
            }
            _ => onsets.push(onset),
        }
    }
    onsets
}

/// Nearest zero crossing to `pos` within `radius` frames, or `pos` itself.
pub fn nearest_zero_crossing(samples: &[f32], pos: usize, radius: usize) -> usize {
    if samples.is_empty() {
        return 0;
    }
    let pos = pos.min(samples.len() - 1);
    let crosses = |i: usize| {
        samples[i] == 0.0 || (i > 0 && (samples[i - 1] < 0.0) != (samples[i] < 0.0))
    };
    for d in 0..=radius {
        if pos >= d && crosses(pos - d) {
            return pos - d;
        }
        if pos + d < samples.len() && crosses(pos + d) {
            return pos + d;
        }
    }
    pos
}
