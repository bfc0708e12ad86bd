//! YIN fundamental frequency tracking.

use super::features::{frame_count, HOP, N_FFT};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

const DEFAULT_THRESHOLD: f32 = 0.1;
/// Frames whose best dip stays above this are treated as unvoiced.
const MAX_APERIODICITY: f32 = 0.5;
const SILENCE_RMS: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchFrame {
    /// Fundamental in Hz, `None` when the frame is unvoiced.
    pub frequency: Option<f32>,
    /// 1 minus the normalized difference at the chosen period.
    pub confidence: f32,
}

pub struct YinTracker {
    sample_rate: u32,
    min_period: usize,
    max_period: usize,
    threshold: f32,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl YinTracker {
    /// Tracks pitches between `fmin` and `fmax` Hz, one estimate per frame.
    pub fn new(sample_rate: u32, fmin: f32, fmax: f32) -> Self {
        let min_period = ((sample_rate as f32 / fmax).floor() as usize).max(2);
        // The integration window must keep at least half of the frame.
        let max_period = ((sample_rate as f32 / fmin).ceil() as usize)
            .min(N_FFT / 2)
            .max(min_period + 2);
        let mut planner = FftPlanner::new();
        Self {
            sample_rate,
            min_period,
            max_period,
            threshold: DEFAULT_THRESHOLD,
            forward: planner.plan_fft_forward(N_FFT),
            inverse: planner.plan_fft_inverse(N_FFT),
        }
    }

    /// Frame `i` starts at sample `i * HOP`; frames are aligned with the
    /// centered feature frames by padding half a window at the start.
    pub fn track(&self, samples: &[f32]) -> Vec<PitchFrame> {
        let half = N_FFT / 2;
        let mut padded = vec![0.0f32; samples.len() + N_FFT];
        padded[half..half + samples.len()].copy_from_slice(samples);

        let mut scratch = Scratch::new(self.max_period);
        (0..frame_count(samples.len()))
            .map(|i| {
                let start = i * HOP;
                self.detect(&padded[start..start + N_FFT], &mut scratch)
            })
            .collect()
    }

    fn detect(&self, frame: &[f32], scratch: &mut Scratch) -> PitchFrame {
        let unvoiced = PitchFrame {
            frequency: None,
            confidence: 0.0,
        };
        let window = N_FFT - self.max_period;

        let energy: f32 = frame[..window].iter().map(|x| x * x).sum();
        if (energy / window as f32).sqrt() < SILENCE_RMS {
            return unvoiced;
        }

        self.difference(frame, window, scratch);
        let cmnd = &mut scratch.cmnd;
        cmnd[0] = 1.0;
        let mut running = 0.0f32;
        for tau in 1..=self.max_period {
            running += scratch.difference[tau];
            cmnd[tau] = if running > 0.0 {
                scratch.difference[tau] * tau as f32 / running
            } else {
                1.0
            };
        }

        let Some(tau) = self.pick_period(cmnd) else {
            return unvoiced;
        };
        let best = cmnd[tau];
        if best > MAX_APERIODICITY {
            return unvoiced;
        }

        let refined = if tau > 1 && tau < self.max_period {
            let (a, b, c) = (cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
            let denom = a - 2.0 * b + c;
            if denom.abs() > f32::EPSILON {
                tau as f32 + (0.5 * (a - c) / denom).clamp(-1.0, 1.0)
            } else {
                tau as f32
            }
        } else {
            tau as f32
        };

        PitchFrame {
            frequency: Some(self.sample_rate as f32 / refined),
            confidence: (1.0 - best).clamp(0.0, 1.0),
        }
    }

    /// First dip below the threshold, followed down to its local minimum;
    /// otherwise the global minimum in range.
    fn pick_period(&self, cmnd: &[f32]) -> Option<usize> {
        let range = self.min_period..self.max_period;
        let mut tau = self.min_period;
        while tau < self.max_period {
            if cmnd[tau] < self.threshold {
                while tau + 1 < self.max_period && cmnd[tau + 1] < cmnd[tau] {
                    tau += 1;
                }
                return Some(tau);
            }
            tau += 1;
        }
        range.min_by(|a, b| cmnd[*a].total_cmp(&cmnd[*b]))
    }

    /// d(tau) = E[0..W] + E[tau..tau+W] - 2 r(tau), with the cross term from
    /// an FFT correlation.
    fn difference(&self, frame: &[f32], window: usize, scratch: &mut Scratch) {
        for (slot, x) in scratch.head.iter_mut().zip(frame) {
            *slot = Complex::new(*x, 0.0);
        }
        scratch.head[window..].iter_mut().for_each(|c| *c = Complex::new(0.0, 0.0));
        for (slot, x) in scratch.full.iter_mut().zip(frame) {
            *slot = Complex::new(*x, 0.0);
        }
        self.forward.process(&mut scratch.head);
        self.forward.process(&mut scratch.full);
        for (h, f) in scratch.head.iter_mut().zip(&scratch.full) {
            *h = h.conj() * f;
        }
        self.inverse.process(&mut scratch.head);

        scratch.prefix[0] = 0.0;
        for (i, x) in frame.iter().enumerate() {
            scratch.prefix[i + 1] = scratch.prefix[i] + x * x;
        }
        let head_energy = scratch.prefix[window];
        let scale = 1.0 / N_FFT as f32;
        for tau in 0..=self.max_period {
            let lagged = scratch.prefix[tau + window] - scratch.prefix[tau];
            let cross = scratch.head[tau].re * scale;
            scratch.difference[tau] = (head_energy + lagged - 2.0 * cross).max(0.0);
        }
    }
}

struct Scratch {
    head: Vec<Complex<f32>>,
    full: Vec<Complex<f32>>,
    prefix: Vec<f32>,
    difference: Vec<f32>,
    cmnd: Vec<f32>,
}

impl Scratch {
    fn new(max_period: usize) -> Self {
        Self {
            head: vec![Complex::new(0.0, 0.0); N_FFT],
            full: vec![Complex::new(0.0, 0.0); N_FFT],
            prefix: vec![0.0; N_FFT + 1],
            difference: vec![0.0; max_period + 1],
            cmnd: vec![0.0; max_period + 1],
        }
    }
}

/// Frequencies of the voiced frames.
pub fn voiced(frames: &[PitchFrame]) -> Vec<f32> {
    frames.iter().filter_map(|f| f.frequency).collect()
}

pub fn hz_to_cents(frequency: f32, reference: f32) -> f32 {
    1200.0 * (frequency / reference).log2()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{clicks, sine};

    const SR: u32 = 22050;

    fn median_pitch(frames: &[PitchFrame]) -> f32 {
        crate::analysis::features::median(&voiced(frames))
    }

    #[test]
    fn tracks_a_vocal_range_tone() {
        let tracker = YinTracker::new(SR, 50.0, 400.0);
        let frames = tracker.track(&sine(220.0, SR, 1.0, 0.5));
        let pitch = median_pitch(&frames);
        assert!((pitch - 220.0).abs() < 2.0, "pitch {}", pitch);
        let voiced_ratio = voiced(&frames).len() as f32 / frames.len() as f32;
        assert!(voiced_ratio > 0.8);
        assert!(frames[frames.len() / 2].confidence > 0.9);
    }

    #[test]
    fn tracks_low_and_high_bounds() {
        let bass = YinTracker::new(SR, 30.0, 300.0).track(&sine(55.0, SR, 1.0, 0.5));
        assert!((median_pitch(&bass) - 55.0).abs() < 1.0);

        let flute = YinTracker::new(SR, 260.0, 2500.0).track(&sine(880.0, SR, 1.0, 0.5));
        assert!((median_pitch(&flute) - 880.0).abs() < 10.0);
    }

    #[test]
    fn silence_is_unvoiced() {
        let frames = YinTracker::new(SR, 50.0, 400.0).track(&vec![0.0; 22050]);
        assert!(voiced(&frames).is_empty());
    }

    #[test]
    fn noise_is_mostly_unvoiced() {
        let frames = YinTracker::new(SR, 50.0, 400.0).track(&clicks(0.02, SR, 1.0));
        let voiced_ratio = voiced(&frames).len() as f32 / frames.len() as f32;
        assert!(voiced_ratio < 0.5, "voiced ratio {}", voiced_ratio);
    }

    #[test]
    fn cents_are_relative() {
        assert!((hz_to_cents(880.0, 440.0) - 1200.0).abs() < 1e-3);
    }
}
