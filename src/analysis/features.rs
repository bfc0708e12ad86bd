//! Frame-level spectral, harmonic and rhythmic features.
//!
//! All frame-based features share one framing: centered windows of
//! [`N_FFT`] samples every [`HOP`] samples, zero padded at both ends, so
//! frame `i` is centered on sample `i * HOP`.

use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

pub const N_FFT: usize = 2048;
pub const HOP: usize = 512;
pub const N_BINS: usize = N_FFT / 2 + 1;
pub const N_MELS: usize = 128;
pub const CONTRAST_BANDS: usize = 7;

pub const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

const AMIN: f32 = 1e-10;
const TOP_DB: f32 = 80.0;
const HPSS_KERNEL: usize = 31;

pub fn frame_count(len: usize) -> usize {
    1 + len / HOP
}

pub fn frame_to_time(frame: usize, sample_rate: u32) -> f32 {
    (frame * HOP) as f32 / sample_rate as f32
}

pub fn frame_times(n_frames: usize, sample_rate: u32) -> Vec<f32> {
    (0..n_frames).map(|i| frame_to_time(i, sample_rate)).collect()
}

fn frame_rate(sample_rate: u32) -> f32 {
    sample_rate as f32 / HOP as f32
}

fn for_each_frame(samples: &[f32], mut f: impl FnMut(&[f32])) {
    let half = N_FFT / 2;
    let mut padded = vec![0.0f32; samples.len() + N_FFT];
    padded[half..half + samples.len()].copy_from_slice(samples);
    for i in 0..frame_count(samples.len()) {
        let start = i * HOP;
        f(&padded[start..start + N_FFT]);
    }
}

pub fn rms(samples: &[f32]) -> Vec<f32> {
    let mut out = Vec::with_capacity(frame_count(samples.len()));
    for_each_frame(samples, |frame| {
        let energy: f32 = frame.iter().map(|x| x * x).sum();
        out.push((energy / N_FFT as f32).sqrt());
    });
    out
}

pub fn zero_crossing_rate(samples: &[f32]) -> Vec<f32> {
    let mut out = Vec::with_capacity(frame_count(samples.len()));
    for_each_frame(samples, |frame| {
        let crossings = frame
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count();
        out.push(crossings as f32 / N_FFT as f32);
    });
    out
}

pub fn zero_crossings(samples: &[f32]) -> usize {
    samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count()
}

fn hann(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * n as f32 / len as f32).cos())
        .collect()
}

/// Magnitude spectrogram, one `N_BINS` row per frame.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    frames: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl Spectrogram {
    pub fn compute(samples: &[f32], sample_rate: u32) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(N_FFT);
        let window = hann(N_FFT);
        let mut buffer = vec![Complex::new(0.0f32, 0.0); N_FFT];
        let mut frames = Vec::with_capacity(frame_count(samples.len()));

        for_each_frame(samples, |frame| {
            for ((slot, x), w) in buffer.iter_mut().zip(frame).zip(&window) {
                *slot = Complex::new(x * w, 0.0);
            }
            fft.process(&mut buffer);
            frames.push(buffer[..N_BINS].iter().map(|c| c.norm()).collect());
        });

        Self {
            frames,
            sample_rate,
        }
    }

    pub fn frames(&self) -> &[Vec<f32>] {
        &self.frames
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / N_FFT as f32
    }

    fn bins_between(&self, low_hz: f32, high_hz: f32) -> std::ops::Range<usize> {
        let to_bin = |hz: f32| ((hz * N_FFT as f32 / self.sample_rate as f32).ceil() as usize).min(N_BINS);
        to_bin(low_hz)..to_bin(high_hz)
    }
}

pub fn spectral_centroid(spec: &Spectrogram) -> Vec<f32> {
    spec.frames
        .iter()
        .map(|frame| {
            let total: f32 = frame.iter().sum();
            if total <= AMIN {
                return 0.0;
            }
            frame
                .iter()
                .enumerate()
                .map(|(k, m)| spec.bin_frequency(k) * m)
                .sum::<f32>()
                / total
        })
        .collect()
}

pub fn spectral_bandwidth(spec: &Spectrogram, centroid: &[f32]) -> Vec<f32> {
    spec.frames
        .iter()
        .zip(centroid)
        .map(|(frame, c)| {
            let total: f32 = frame.iter().sum();
            if total <= AMIN {
                return 0.0;
            }
            let spread: f32 = frame
                .iter()
                .enumerate()
                .map(|(k, m)| m * (spec.bin_frequency(k) - c).powi(2))
                .sum();
            (spread / total).sqrt()
        })
        .collect()
}

/// Frequency below which `fraction` of each frame's energy lies.
pub fn spectral_rolloff(spec: &Spectrogram, fraction: f32) -> Vec<f32> {
    spec.frames
        .iter()
        .map(|frame| {
            let total: f32 = frame.iter().sum();
            if total <= AMIN {
                return 0.0;
            }
            let threshold = total * fraction;
            let mut cumulative = 0.0;
            for (k, m) in frame.iter().enumerate() {
                cumulative += m;
                if cumulative >= threshold {
                    return spec.bin_frequency(k);
                }
            }
            spec.bin_frequency(N_BINS - 1)
        })
        .collect()
}

/// Geometric over arithmetic mean of the power spectrum; near 1 for noise.
pub fn spectral_flatness(spec: &Spectrogram) -> Vec<f32> {
    spec.frames
        .iter()
        .map(|frame| {
            let n = frame.len() as f32;
            let power = frame.iter().map(|m| (m * m).max(AMIN));
            let (log_sum, sum) = power.fold((0.0f32, 0.0f32), |(l, s), p| (l + p.ln(), s + p));
            let geometric = (log_sum / n).exp();
            geometric / (sum / n)
        })
        .collect()
}

/// Peak-to-valley ratio in dB for six octave bands from 200 Hz plus the top band.
pub fn spectral_contrast(spec: &Spectrogram) -> Vec<[f32; CONTRAST_BANDS]> {
    let nyquist = spec.sample_rate as f32 / 2.0;
    let mut edges = [0.0f32; CONTRAST_BANDS + 1];
    for (b, edge) in edges.iter_mut().enumerate().skip(1) {
        *edge = (200.0 * 2f32.powi(b as i32 - 1)).min(nyquist);
    }
    edges[CONTRAST_BANDS] = nyquist + 1.0;
    let ranges: Vec<_> = edges
        .windows(2)
        .map(|w| spec.bins_between(w[0], w[1]))
        .collect();

    let mut scratch = Vec::with_capacity(N_BINS);
    spec.frames
        .iter()
        .map(|frame| {
            let mut contrast = [0.0f32; CONTRAST_BANDS];
            for (b, range) in ranges.iter().enumerate() {
                if range.is_empty() {
                    continue;
                }
                scratch.clear();
                scratch.extend_from_slice(&frame[range.clone()]);
                scratch.sort_by(|a, b| a.total_cmp(b));
                let q = ((scratch.len() as f32 * 0.02).round() as usize).max(1);
                let valley = scratch[..q].iter().sum::<f32>() / q as f32;
                let peak = scratch[scratch.len() - q..].iter().sum::<f32>() / q as f32;
                contrast[b] = 10.0 * peak.max(AMIN).log10() - 10.0 * valley.max(AMIN).log10();
            }
            contrast
        })
        .collect()
}

/// Energy per pitch class, each frame scaled so its strongest class is 1.
pub fn chroma(spec: &Spectrogram) -> Vec<[f32; 12]> {
    let classes: Vec<Option<usize>> = (0..N_BINS)
        .map(|k| {
            let freq = spec.bin_frequency(k);
            if freq < 27.5 {
                return None;
            }
            let midi = 69.0 + 12.0 * (freq / 440.0).log2();
            Some((midi.round() as i64).rem_euclid(12) as usize)
        })
        .collect();

    spec.frames
        .iter()
        .map(|frame| {
            let mut energy = [0.0f32; 12];
            for (m, class) in frame.iter().zip(&classes) {
                if let Some(c) = class {
                    energy[*c] += m * m;
                }
            }
            let max = energy.iter().cloned().fold(0.0f32, f32::max);
            if max > AMIN {
                energy.iter_mut().for_each(|e| *e /= max);
            }
            energy
        })
        .collect()
}

pub fn chroma_mean(chroma: &[[f32; 12]]) -> [f32; 12] {
    let mut mean = [0.0f32; 12];
    if chroma.is_empty() {
        return mean;
    }
    for frame in chroma {
        for (m, v) in mean.iter_mut().zip(frame) {
            *m += v;
        }
    }
    mean.iter_mut().for_each(|m| *m /= chroma.len() as f32);
    mean
}

/// Strongest pitch class of a mean chroma profile and its share of the total.
pub fn estimate_key(profile: &[f32; 12]) -> (usize, f32) {
    let (index, value) = profile
        .iter()
        .enumerate()
        .fold((0, f32::MIN), |best, (i, v)| if *v > best.1 { (i, *v) } else { best });
    let total: f32 = profile.iter().sum();
    let confidence = if total > AMIN { value / total } else { 0.0 };
    (index, confidence)
}

const MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// "major" or "minor", comparing the profile rotated to `tonic` against
/// Krumhansl key profiles.
pub fn estimate_mode(profile: &[f32; 12], tonic: usize) -> &'static str {
    let rotated: Vec<f32> = (0..12).map(|i| profile[(tonic + i) % 12]).collect();
    if correlation(&rotated, &MINOR_PROFILE) > correlation(&rotated, &MAJOR_PROFILE) {
        "minor"
    } else {
        "major"
    }
}

fn correlation(a: &[f32], b: &[f32]) -> f32 {
    let (ma, mb) = (mean(a), mean(b));
    let (mut num, mut da, mut db) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        num += (x - ma) * (y - mb);
        da += (x - ma).powi(2);
        db += (y - mb).powi(2);
    }
    if da <= AMIN || db <= AMIN {
        0.0
    } else {
        num / (da * db).sqrt()
    }
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

#[derive(Debug, Clone)]
pub struct MelSpectrogram {
    /// Center frequency of each band.
    pub frequencies: Vec<f32>,
    /// Power in dB relative to the loudest cell, one row per frame.
    pub db: Vec<Vec<f32>>,
}

pub fn mel_spectrogram(spec: &Spectrogram, n_mels: usize) -> MelSpectrogram {
    let nyquist = spec.sample_rate as f32 / 2.0;
    let top = hz_to_mel(nyquist);
    let points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(top * i as f32 / (n_mels + 1) as f32))
        .collect();

    let filters: Vec<Vec<(usize, f32)>> = (0..n_mels)
        .map(|m| {
            let (lo, center, hi) = (points[m], points[m + 1], points[m + 2]);
            let norm = 2.0 / (hi - lo);
            spec.bins_between(lo, hi)
                .filter_map(|k| {
                    let f = spec.bin_frequency(k);
                    let weight = if f <= center {
                        (f - lo) / (center - lo)
                    } else {
                        (hi - f) / (hi - center)
                    };
                    (weight > 0.0).then_some((k, weight * norm))
                })
                .collect()
        })
        .collect();

    let power: Vec<Vec<f32>> = spec
        .frames
        .iter()
        .map(|frame| {
            filters
                .iter()
                .map(|filter| filter.iter().map(|(k, w)| frame[*k] * frame[*k] * w).sum())
                .collect()
        })
        .collect();

    MelSpectrogram {
        frequencies: points[1..=n_mels].to_vec(),
        db: power_to_db(&power),
    }
}

fn power_to_db(power: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let reference = power
        .iter()
        .flatten()
        .cloned()
        .fold(AMIN, f32::max);
    let reference_db = 10.0 * reference.log10();
    let floor = -TOP_DB;
    power
        .iter()
        .map(|row| {
            row.iter()
                .map(|p| (10.0 * p.max(AMIN).log10() - reference_db).max(floor))
                .collect()
        })
        .collect()
}

/// Mel-frequency cepstral coefficients (orthonormal DCT-II of the dB mel bands).
pub fn mfcc(mel: &MelSpectrogram, n_mfcc: usize) -> Vec<Vec<f32>> {
    mel.db
        .iter()
        .map(|frame| {
            let n = frame.len() as f32;
            (0..n_mfcc)
                .map(|k| {
                    let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
                    scale
                        * frame
                            .iter()
                            .enumerate()
                            .map(|(i, x)| {
                                x * (std::f32::consts::PI * k as f32 * (2 * i + 1) as f32
                                    / (2.0 * n))
                                    .cos()
                            })
                            .sum::<f32>()
                })
                .collect()
        })
        .collect()
}

/// Spectral flux of the dB mel spectrogram, averaged over bands.
pub fn onset_strength(mel: &MelSpectrogram) -> Vec<f32> {
    let mut envelope = Vec::with_capacity(mel.db.len());
    envelope.push(0.0);
    for pair in mel.db.windows(2) {
        let flux: f32 = pair[1]
            .iter()
            .zip(&pair[0])
            .map(|(now, before)| (now - before).max(0.0))
            .sum();
        envelope.push(flux / pair[1].len().max(1) as f32);
    }
    envelope.truncate(mel.db.len());
    envelope
}

/// Frames where the normalized onset envelope peaks above its local average.
pub fn detect_onsets(envelope: &[f32]) -> Vec<usize> {
    const PRE_MAX: usize = 1;
    const POST_MAX: usize = 1;
    const PRE_AVG: usize = 4;
    const POST_AVG: usize = 5;
    const DELTA: f32 = 0.07;
    const WAIT: usize = 1;

    let (min, max) = envelope
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if envelope.is_empty() || max - min <= AMIN {
        return Vec::new();
    }
    let norm: Vec<f32> = envelope.iter().map(|v| (v - min) / (max - min)).collect();

    let mut onsets = Vec::new();
    let mut last: Option<usize> = None;
    for t in 0..norm.len() {
        let window_max = norm[t.saturating_sub(PRE_MAX)..(t + POST_MAX + 1).min(norm.len())]
            .iter()
            .cloned()
            .fold(f32::MIN, f32::max);
        if norm[t] < window_max {
            continue;
        }
        let average = mean(&norm[t.saturating_sub(PRE_AVG)..(t + POST_AVG + 1).min(norm.len())]);
        if norm[t] < average + DELTA {
            continue;
        }
        if last.is_some_and(|l| t <= l + WAIT) {
            continue;
        }
        onsets.push(t);
        last = Some(t);
    }
    onsets
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoEstimate {
    pub bpm: f32,
    /// Autocorrelation at the chosen period relative to lag zero.
    pub confidence: f32,
}

/// Autocorrelation of the mean-removed envelope for lags `0..=max_lag`.
pub fn autocorrelation(envelope: &[f32], max_lag: usize) -> Vec<f32> {
    let m = mean(envelope);
    let centered: Vec<f32> = envelope.iter().map(|v| v - m).collect();
    (0..=max_lag.min(centered.len().saturating_sub(1)))
        .map(|lag| {
            centered
                .iter()
                .zip(&centered[lag..])
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect()
}

/// Tempo from the autocorrelation of the onset envelope between 60 and 200
/// BPM, weighted towards 120 BPM.
pub fn estimate_tempo(envelope: &[f32], sample_rate: u32) -> TempoEstimate {
    const MIN_BPM: f32 = 60.0;
    const MAX_BPM: f32 = 200.0;
    let none = TempoEstimate {
        bpm: 0.0,
        confidence: 0.0,
    };

    let fps = frame_rate(sample_rate);
    let min_lag = (60.0 * fps / MAX_BPM).floor().max(1.0) as usize;
    let max_lag = (60.0 * fps / MIN_BPM).ceil() as usize;
    let ac = autocorrelation(envelope, max_lag + 1);
    if ac.len() <= min_lag + 1 || ac[0] <= AMIN {
        return none;
    }

    let weight = |lag: f32| {
        let bpm = 60.0 * fps / lag;
        (-0.5 * (bpm / 120.0).log2().powi(2)).exp()
    };
    let scores: Vec<f32> = ac
        .iter()
        .enumerate()
        .map(|(lag, v)| if lag == 0 { 0.0 } else { v * weight(lag as f32) })
        .collect();

    let last = max_lag.min(ac.len() - 2);
    let Some(best) = (min_lag..=last).max_by(|a, b| scores[*a].total_cmp(&scores[*b])) else {
        return none;
    };
    if scores[best] <= 0.0 {
        return none;
    }

    let (left, mid, right) = (scores[best - 1], scores[best], scores[best + 1]);
    let denom = left - 2.0 * mid + right;
    let offset = if denom.abs() > AMIN {
        (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
    } else {
        0.0
    };
    TempoEstimate {
        bpm: 60.0 * fps / (best as f32 + offset),
        confidence: (ac[best] / ac[0]).clamp(0.0, 1.0),
    }
}

/// Dynamic-programming beat tracker: picks onset peaks spaced close to the
/// tempo period.
pub fn track_beats(envelope: &[f32], bpm: f32, sample_rate: u32) -> Vec<usize> {
    const TIGHTNESS: f32 = 100.0;
    if bpm <= 0.0 || envelope.is_empty() {
        return Vec::new();
    }
    let period = 60.0 * frame_rate(sample_rate) / bpm;
    let sd = std_dev(envelope);
    if sd <= AMIN {
        return Vec::new();
    }
    let local: Vec<f32> = envelope.iter().map(|v| v / sd).collect();

    let n = local.len();
    let mut score = vec![0.0f32; n];
    let mut backlink: Vec<Option<usize>> = vec![None; n];
    let near = (period / 2.0).round().max(1.0) as usize;
    let far = (period * 2.0).round() as usize;
    for t in 0..n {
        let mut best: Option<(usize, f32)> = None;
        for prev in t.saturating_sub(far)..=t.saturating_sub(near) {
            if t - prev < near {
                continue;
            }
            let penalty = TIGHTNESS * (((t - prev) as f32) / period).ln().powi(2);
            let candidate = score[prev] - penalty;
            if best.map_or(true, |(_, s)| candidate > s) {
                best = Some((prev, candidate));
            }
        }
        match best {
            Some((prev, s)) if s > 0.0 => {
                score[t] = local[t] + s;
                backlink[t] = Some(prev);
            }
            _ => score[t] = local[t],
        }
    }

    let tail = n.saturating_sub(period.round() as usize);
    let Some(mut beat) = (tail..n).max_by(|a, b| score[*a].total_cmp(&score[*b])) else {
        return Vec::new();
    };
    let mut beats = vec![beat];
    while let Some(prev) = backlink[beat] {
        beats.push(prev);
        beat = prev;
    }
    beats.reverse();
    beats
}

pub struct Hpss {
    pub harmonic: Spectrogram,
    pub percussive: Spectrogram,
}

fn median_filter(values: &[f32], kernel: usize, scratch: &mut Vec<f32>) -> Vec<f32> {
    let half = kernel / 2;
    (0..values.len())
        .map(|i| {
            scratch.clear();
            scratch.extend_from_slice(&values[i.saturating_sub(half)..(i + half + 1).min(values.len())]);
            let mid = scratch.len() / 2;
            *scratch.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1
        })
        .collect()
}

/// Harmonic/percussive split by median filtering across time (harmonic)
/// and frequency (percussive), with soft masks.
pub fn hpss(spec: &Spectrogram) -> Hpss {
    let n_frames = spec.n_frames();

    let harmonic_columns: Vec<Vec<f32>> = (0..N_BINS)
        .into_par_iter()
        .map_init(Vec::new, |scratch, k| {
            let column: Vec<f32> = spec.frames.iter().map(|f| f[k]).collect();
            median_filter(&column, HPSS_KERNEL, scratch)
        })
        .collect();
    let percussive_rows: Vec<Vec<f32>> = spec
        .frames
        .par_iter()
        .map_init(Vec::new, |scratch, frame| median_filter(frame, HPSS_KERNEL, scratch))
        .collect();

    let mut harmonic = Vec::with_capacity(n_frames);
    let mut percussive = Vec::with_capacity(n_frames);
    for (t, frame) in spec.frames.iter().enumerate() {
        let mut h_row = Vec::with_capacity(N_BINS);
        let mut p_row = Vec::with_capacity(N_BINS);
        for (k, m) in frame.iter().enumerate() {
            let h = harmonic_columns[k][t].powi(2);
            let p = percussive_rows[t][k].powi(2);
            let mask = if h + p > AMIN { h / (h + p) } else { 0.5 };
            h_row.push(m * mask);
            p_row.push(m * (1.0 - mask));
        }
        harmonic.push(h_row);
        percussive.push(p_row);
    }

    Hpss {
        harmonic: Spectrogram {
            frames: harmonic,
            sample_rate: spec.sample_rate,
        },
        percussive: Spectrogram {
            frames: percussive,
            sample_rate: spec.sample_rate,
        },
    }
}

/// Per-frame RMS of the windowed signal, recovered from its spectrum.
pub fn rms_from_spectrogram(spec: &Spectrogram) -> Vec<f32> {
    spec.frames
        .iter()
        .map(|frame| {
            let total: f32 = frame.iter().map(|m| m * m).sum();
            let edges = frame[0].powi(2) + frame[N_BINS - 1].powi(2);
            (2.0 * total - edges).max(0.0).sqrt() / N_FFT as f32
        })
        .collect()
}

/// Sum of magnitudes over a frequency range, all frames.
pub fn band_magnitude(spec: &Spectrogram, low_hz: f32, high_hz: f32) -> f64 {
    let range = spec.bins_between(low_hz, high_hz);
    spec.frames
        .iter()
        .map(|frame| frame[range.clone()].iter().map(|m| *m as f64).sum::<f64>())
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct BandEnergy {
    pub low_freq: f64,
    pub mid_freq: f64,
    pub high_freq: f64,
}

impl BandEnergy {
    pub fn total(&self) -> f64 {
        self.low_freq + self.mid_freq + self.high_freq
    }

    /// Each band as a share of the total.
    pub fn ratios(&self) -> BandEnergy {
        let total = self.total();
        if total <= 0.0 {
            return BandEnergy {
                low_freq: 0.0,
                mid_freq: 0.0,
                high_freq: 0.0,
            };
        }
        BandEnergy {
            low_freq: self.low_freq / total,
            mid_freq: self.mid_freq / total,
            high_freq: self.high_freq / total,
        }
    }
}

/// Magnitude sums over bins [0, 256), [256, 768) and [768, N_BINS).
pub fn band_energy(spec: &Spectrogram) -> BandEnergy {
    let mut energy = BandEnergy {
        low_freq: 0.0,
        mid_freq: 0.0,
        high_freq: 0.0,
    };
    for frame in &spec.frames {
        for (k, m) in frame.iter().enumerate() {
            let m = *m as f64;
            match k {
                0..=255 => energy.low_freq += m,
                256..=767 => energy.mid_freq += m,
                _ => energy.high_freq += m,
            }
        }
    }
    energy
}

/// Splits the frame sequence into at most `k` contiguous segments by
/// repeatedly merging the adjacent pair with the lowest Ward cost. Returns the
/// first frame of every segment.
pub fn agglomerative_segments<R: AsRef<[f32]>>(features: &[R], k: usize) -> Vec<usize> {
    struct Segment {
        start: usize,
        count: usize,
        sum: Vec<f32>,
    }

    fn ward(a: &Segment, b: &Segment) -> f32 {
        let (na, nb) = (a.count as f32, b.count as f32);
        let distance: f32 = a
            .sum
            .iter()
            .zip(&b.sum)
            .map(|(x, y)| (x / na - y / nb).powi(2))
            .sum();
        na * nb / (na + nb) * distance
    }

    if features.is_empty() {
        return Vec::new();
    }
    let mut segments: Vec<Segment> = features
        .iter()
        .enumerate()
        .map(|(i, f)| Segment {
            start: i,
            count: 1,
            sum: f.as_ref().to_vec(),
        })
        .collect();
    let mut costs: Vec<f32> = segments.windows(2).map(|w| ward(&w[0], &w[1])).collect();

    while segments.len() > k.max(1) {
        let Some(i) = (0..costs.len()).min_by(|a, b| costs[*a].total_cmp(&costs[*b])) else {
            break;
        };
        let absorbed = segments.remove(i + 1);
        let target = &mut segments[i];
        target.count += absorbed.count;
        target.sum.iter_mut().zip(&absorbed.sum).for_each(|(s, v)| *s += v);
        costs.remove(i);
        if i > 0 {
            costs[i - 1] = ward(&segments[i - 1], &segments[i]);
        }
        if i + 1 < segments.len() {
            costs[i] = ward(&segments[i], &segments[i + 1]);
        }
    }
    segments.iter().map(|s| s.start).collect()
}

pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

pub fn std_dev(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f32>() / values.len() as f32).sqrt()
}

pub fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub fn min_max(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    values
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)))
}

/// Column means of a frame-major matrix.
pub fn column_means<R: AsRef<[f32]>>(rows: &[R]) -> Vec<f32> {
    let Some(width) = rows.first().map(|r| r.as_ref().len()) else {
        return Vec::new();
    };
    let mut sums = vec![0.0f32; width];
    for row in rows {
        for (s, v) in sums.iter_mut().zip(row.as_ref()) {
            *s += v;
        }
    }
    sums.iter().map(|s| s / rows.len() as f32).collect()
}

pub fn note_name(frequency: f32) -> Option<String> {
    if !(frequency.is_finite() && frequency > 0.0) {
        return None;
    }
    let midi = (69.0 + 12.0 * (frequency / 440.0).log2()).round() as i32;
    let class = PITCH_CLASSES[midi.rem_euclid(12) as usize];
    Some(format!("{}{}", class, midi.div_euclid(12) - 1))
}
