//! Per-instrument analysis of separated stems.
//!
//! Every analyzer returns a typed report that is stored as a schema-free
//! JSON description. Failures become `{"error": ...}` documents so one bad
//! stem never affects the others.

use super::features::{self, BandEnergy, Spectrogram, N_MELS, PITCH_CLASSES};
use super::pitch::{self, PitchFrame, YinTracker};
use super::series::{downsample, downsample_times, finite_or_zero};
use super::{error_document, Signal};
use crate::separation::StemKind;
use serde::Serialize;
use std::ops::Range;
use std::path::Path;
use tracing::{debug, warn};

const ACTIVITY_THRESHOLD: f32 = 0.01;
const N_MFCC: usize = 13;
/// Onset gaps shorter than this count as picked notes.
const PICKING_INTERVAL_SECS: f32 = 0.25;
const LEGATO_RUN_SECS: f32 = 0.3;

type Series = Vec<Option<f64>>;

pub fn analyze_stem(kind: StemKind, path: &Path, points: usize) -> serde_json::Value {
    let signal = match Signal::load(path) {
        Ok(signal) => signal,
        Err(e) => {
            warn!("Skipping {} analysis: {}", kind, e);
            return error_document(&e);
        }
    };
    let stem = StemFeatures::compute(&signal, points);
    let report = match kind {
        StemKind::Vocals => serde_json::to_value(vocal_report(&stem)),
        StemKind::Bass => serde_json::to_value(bass_report(&stem)),
        StemKind::Drums => serde_json::to_value(drums_report(&stem)),
        StemKind::Piano => serde_json::to_value(piano_report(&stem)),
        StemKind::Other => serde_json::to_value(other_report(&stem)),
        StemKind::Guitar => serde_json::to_value(guitar_report(&stem)),
        StemKind::Violin => serde_json::to_value(violin_report(&stem)),
        StemKind::Flute => serde_json::to_value(flute_report(&stem)),
    };
    debug!("Analyzed {} stem from {:?}", kind, path);
    report.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }))
}

struct StemFeatures<'a> {
    signal: &'a Signal,
    points: usize,
    spec: Spectrogram,
    rms: Vec<f32>,
    centroid: Vec<f32>,
    envelope: Vec<f32>,
    onsets: Vec<usize>,
}

impl<'a> StemFeatures<'a> {
    fn compute(signal: &'a Signal, points: usize) -> Self {
        let spec = Spectrogram::compute(&signal.samples, signal.sample_rate);
        let mel = features::mel_spectrogram(&spec, N_MELS);
        let envelope = features::onset_strength(&mel);
        let onsets = features::detect_onsets(&envelope);
        Self {
            signal,
            points,
            rms: features::rms(&signal.samples),
            centroid: features::spectral_centroid(&spec),
            spec,
            envelope,
            onsets,
        }
    }

    fn sample_rate(&self) -> u32 {
        self.signal.sample_rate
    }

    fn frame_duration(&self) -> f32 {
        features::HOP as f32 / self.sample_rate() as f32
    }

    fn onset_intervals(&self) -> Vec<f32> {
        self.onsets
            .windows(2)
            .map(|w| (w[1] - w[0]) as f32 * self.frame_duration())
            .collect()
    }

    fn rms_mean(&self) -> f32 {
        features::mean(&self.rms)
    }

    fn activity(&self) -> Activity {
        let rms_mean = self.rms_mean();
        let (low, high) = features::min_max(&self.rms);
        let active = self.rms.iter().filter(|r| **r > ACTIVITY_THRESHOLD).count();
        let duration = self.signal.duration();
        Activity {
            confidence: (rms_mean as f64 * 50.0).min(1.0),
            rms_mean: finite_or_zero(rms_mean),
            rms_std: finite_or_zero(features::std_dev(&self.rms)),
            dynamic_range: finite_or_zero(high - low),
            activity_ratio: ratio(active, self.rms.len()),
            duration_sec: duration,
            onset_count: self.onsets.len(),
            onset_rate: if duration > 0.0 {
                self.onsets.len() as f64 / duration
            } else {
                0.0
            },
        }
    }

    fn timeline(&self) -> Timeline {
        Timeline {
            times: downsample_times(
                &features::frame_times(self.rms.len(), self.sample_rate()),
                self.points,
            ),
            rms: downsample(&self.rms, self.points),
            spectral_centroid: Some(downsample(&self.centroid, self.points)),
            pitch_hz: None,
            onset_strength: None,
        }
    }

    fn melodic_timeline(&self, pitches: &[PitchFrame]) -> Timeline {
        let contour: Vec<f32> = pitches
            .iter()
            .map(|p| p.frequency.unwrap_or(f32::NAN))
            .collect();
        Timeline {
            pitch_hz: Some(downsample(&contour, self.points)),
            ..self.timeline()
        }
    }

    fn track_pitch(&self, fmin: f32, fmax: f32) -> Vec<PitchFrame> {
        YinTracker::new(self.sample_rate(), fmin, fmax).track(&self.signal.samples)
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn to_f64(values: &[f32]) -> Vec<f64> {
    values.iter().map(|v| finite_or_zero(*v)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
enum Presence {
    High,
    Medium,
    Low,
    None,
}

impl Presence {
    fn from_rms(rms_mean: f32) -> Self {
        if rms_mean > 0.02 {
            Presence::High
        } else if rms_mean > 0.01 {
            Presence::Medium
        } else {
            Presence::Low
        }
    }
}

#[derive(Debug, Serialize)]
struct Activity {
    confidence: f64,
    rms_mean: f64,
    rms_std: f64,
    dynamic_range: f64,
    activity_ratio: f64,
    duration_sec: f64,
    onset_count: usize,
    onset_rate: f64,
}

#[derive(Debug, Serialize)]
struct Timeline {
    times: Vec<f64>,
    rms: Series,
    #[serde(skip_serializing_if = "Option::is_none")]
    spectral_centroid: Option<Series>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pitch_hz: Option<Series>,
    #[serde(skip_serializing_if = "Option::is_none")]
    onset_strength: Option<Series>,
}

#[derive(Debug, Serialize)]
struct PitchSummary {
    average_pitch_hz: f64,
    median_pitch_hz: f64,
    min_pitch_hz: f64,
    max_pitch_hz: f64,
    pitch_std_hz: f64,
    range_semitones: f64,
    voiced_ratio: f64,
    dominant_note: Option<String>,
}

impl PitchSummary {
    fn from_frames(frames: &[PitchFrame]) -> Self {
        let voiced = pitch::voiced(frames);
        let (low, high) = features::min_max(&voiced);
        let median = features::median(&voiced);
        let range_semitones = if low > 0.0 {
            pitch::hz_to_cents(high, low) / 100.0
        } else {
            0.0
        };
        PitchSummary {
            average_pitch_hz: finite_or_zero(features::mean(&voiced)),
            median_pitch_hz: finite_or_zero(median),
            min_pitch_hz: finite_or_zero(low),
            max_pitch_hz: finite_or_zero(high),
            pitch_std_hz: finite_or_zero(features::std_dev(&voiced)),
            range_semitones: finite_or_zero(range_semitones),
            voiced_ratio: ratio(voiced.len(), frames.len()),
            dominant_note: features::note_name(median),
        }
    }
}

fn voiced_runs(frames: &[PitchFrame]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, frame) in frames.iter().enumerate() {
        match (frame.frequency.is_some(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(s..frames.len());
    }
    runs
}

/// Cents away from a 7-frame moving average, within voiced runs of at least
/// five frames. Melodic movement cancels out; vibrato and wobble remain.
fn pitch_deviation_cents(frames: &[PitchFrame]) -> Vec<f32> {
    const SMOOTHING: usize = 7;
    let mut deviations = Vec::new();
    for run in voiced_runs(frames).into_iter().filter(|r| r.len() >= 5) {
        let contour: Vec<f32> = frames[run].iter().filter_map(|f| f.frequency).collect();
        let reference = features::median(&contour);
        let cents: Vec<f32> = contour
            .iter()
            .map(|f| pitch::hz_to_cents(*f, reference))
            .collect();
        for i in 0..cents.len() {
            let window = &cents[i.saturating_sub(SMOOTHING / 2)..(i + SMOOTHING / 2 + 1).min(cents.len())];
            deviations.push(cents[i] - features::mean(window));
        }
    }
    deviations
}

// Vocals

#[derive(Debug, Serialize)]
struct VocalReport {
    presence: Presence,
    gender: &'static str,
    gender_confidence: f64,
    pitch_details: VocalPitch,
    timbre: Timbre,
    activity: Activity,
    timeline: Timeline,
}

#[derive(Debug, Serialize)]
struct VocalPitch {
    #[serde(flatten)]
    summary: PitchSummary,
    vocal_range_hz: f64,
    vibrato_detected: bool,
}

#[derive(Debug, Serialize)]
struct Timbre {
    spectral_centroid_mean: f64,
    spectral_rolloff_mean: f64,
    spectral_bandwidth_mean: f64,
    mfcc_mean: Vec<f64>,
}

/// Gender guess from the median fundamental: 80 to 180 Hz male, above
/// female, with confidence growing away from 180 Hz.
fn classify_gender(median_f0: f32) -> (&'static str, f64) {
    if median_f0 > 80.0 && median_f0 < 180.0 {
        ("Male", ((180.0 - median_f0) / 100.0).min(1.0) as f64)
    } else if median_f0 >= 180.0 {
        ("Female", ((median_f0 - 180.0) / 100.0).min(1.0) as f64)
    } else {
        ("Unknown", 0.0)
    }
}

fn vocal_report(stem: &StemFeatures) -> VocalReport {
    let pitches = stem.track_pitch(50.0, 400.0);
    let summary = PitchSummary::from_frames(&pitches);
    let (gender, gender_confidence) = classify_gender(summary.median_pitch_hz as f32);

    let rms_mean = stem.rms_mean();
    let presence = if rms_mean > ACTIVITY_THRESHOLD {
        Presence::from_rms(rms_mean)
    } else {
        Presence::None
    };

    let centroid = features::mean(&stem.centroid);
    let bandwidth = features::spectral_bandwidth(&stem.spec, &stem.centroid);
    let rolloff = features::spectral_rolloff(&stem.spec, 0.85);
    let mel = features::mel_spectrogram(&stem.spec, N_MELS);
    let mfcc = features::mfcc(&mel, N_MFCC);

    VocalReport {
        presence,
        gender,
        gender_confidence,
        pitch_details: VocalPitch {
            vocal_range_hz: summary.max_pitch_hz - summary.min_pitch_hz,
            vibrato_detected: summary.pitch_std_hz > 10.0,
            summary,
        },
        timbre: Timbre {
            spectral_centroid_mean: finite_or_zero(centroid),
            spectral_rolloff_mean: finite_or_zero(features::mean(&rolloff)),
            spectral_bandwidth_mean: finite_or_zero(features::mean(&bandwidth)),
            mfcc_mean: to_f64(&features::column_means(&mfcc)),
        },
        activity: stem.activity(),
        timeline: stem.melodic_timeline(&pitches),
    }
}

// Bass

#[derive(Debug, Serialize)]
struct BassReport {
    presence: Presence,
    low_frequency_ratio: f64,
    pitch: PitchSummary,
    energy_distribution: BandEnergy,
    activity: Activity,
    timeline: Timeline,
}

fn bass_report(stem: &StemFeatures) -> BassReport {
    let pitches = stem.track_pitch(30.0, 300.0);
    let energy = features::band_energy(&stem.spec);
    let total = energy.total();
    BassReport {
        presence: Presence::from_rms(stem.rms_mean()),
        low_frequency_ratio: if total > 0.0 {
            energy.low_freq / (total + 1e-8)
        } else {
            0.0
        },
        pitch: PitchSummary::from_frames(&pitches),
        energy_distribution: energy.ratios(),
        activity: stem.activity(),
        timeline: stem.melodic_timeline(&pitches),
    }
}

// Drums

#[derive(Debug, Serialize)]
struct DrumsReport {
    presence: Presence,
    tempo_bpm: f64,
    tempo_confidence: f64,
    groove_consistency: f64,
    beat_interval_variance: f64,
    kick_snare_ratio: f64,
    dominant_element: &'static str,
    pattern_complexity: f64,
    energy_distribution: BandEnergy,
    activity: Activity,
    timeline: Timeline,
}

/// 1 for perfectly even intervals, falling with their coefficient of variation.
fn consistency(intervals: &[f32]) -> f64 {
    let mean = features::mean(intervals);
    if intervals.len() < 2 || mean <= 0.0 {
        return 0.0;
    }
    (1.0 - features::std_dev(intervals) / mean).clamp(0.0, 1.0) as f64
}

fn drums_report(stem: &StemFeatures) -> DrumsReport {
    let sr = stem.sample_rate();
    let tempo = features::estimate_tempo(&stem.envelope, sr);
    let beats = features::track_beats(&stem.envelope, tempo.bpm, sr);
    let intervals: Vec<f32> = beats
        .windows(2)
        .map(|w| (w[1] - w[0]) as f32 * stem.frame_duration())
        .collect();

    let kick = features::band_magnitude(&stem.spec, 20.0, 150.0);
    let snare = features::band_magnitude(&stem.spec, 150.0, 5000.0);
    let kick_snare_ratio = kick / (snare + 1e-8);

    // Up to four seconds of onset self-similarity.
    let max_lag = (4.0 / stem.frame_duration()) as usize;
    let ac = features::autocorrelation(&stem.envelope, max_lag);
    let normalized: Vec<f32> = match ac.first() {
        Some(zero) if *zero > 0.0 => ac[1..].iter().map(|v| v / zero).collect(),
        _ => Vec::new(),
    };

    let mut timeline = stem.timeline();
    timeline.onset_strength = Some(downsample(&stem.envelope, stem.points));

    DrumsReport {
        presence: Presence::from_rms(stem.rms_mean()),
        tempo_bpm: finite_or_zero(tempo.bpm),
        tempo_confidence: finite_or_zero(tempo.confidence),
        groove_consistency: consistency(&intervals),
        beat_interval_variance: finite_or_zero(features::std_dev(&intervals).powi(2)),
        kick_snare_ratio: if kick_snare_ratio.is_finite() {
            kick_snare_ratio
        } else {
            0.0
        },
        dominant_element: if kick_snare_ratio >= 1.0 { "kick" } else { "snare" },
        pattern_complexity: finite_or_zero(features::std_dev(&normalized)),
        energy_distribution: features::band_energy(&stem.spec).ratios(),
        activity: stem.activity(),
        timeline,
    }
}

// Piano

#[derive(Debug, Serialize)]
struct PianoReport {
    presence: Presence,
    key: &'static str,
    mode: &'static str,
    key_confidence: f64,
    chroma_profile: Vec<f64>,
    polyphony_estimate: f64,
    activity: Activity,
    timeline: Timeline,
}

fn piano_report(stem: &StemFeatures) -> PianoReport {
    let chroma = features::chroma(&stem.spec);
    let profile = features::chroma_mean(&chroma);
    let (tonic, key_confidence) = features::estimate_key(&profile);

    // Pitch classes at half the strongest class or more, in active frames.
    let voices: Vec<f32> = chroma
        .iter()
        .zip(&stem.rms)
        .filter(|(_, rms)| **rms > ACTIVITY_THRESHOLD)
        .map(|(frame, _)| frame.iter().filter(|v| **v >= 0.5).count() as f32)
        .collect();

    PianoReport {
        presence: Presence::from_rms(stem.rms_mean()),
        key: PITCH_CLASSES[tonic],
        mode: features::estimate_mode(&profile, tonic),
        key_confidence: finite_or_zero(key_confidence),
        chroma_profile: to_f64(&profile),
        polyphony_estimate: finite_or_zero(features::mean(&voices)),
        activity: stem.activity(),
        timeline: stem.timeline(),
    }
}

// Other

#[derive(Debug, Serialize)]
struct OtherReport {
    presence: Presence,
    spectral_profile: SpectralProfile,
    energy_distribution: BandEnergy,
    activity: Activity,
    timeline: Timeline,
}

#[derive(Debug, Serialize)]
struct SpectralProfile {
    spectral_centroid_mean: f64,
    spectral_centroid_std: f64,
    spectral_bandwidth_mean: f64,
    spectral_rolloff_mean: f64,
    spectral_flatness_mean: f64,
    spectral_contrast_mean: Vec<f64>,
    zero_crossing_rate_mean: f64,
    zero_crossings_total: usize,
}

fn other_report(stem: &StemFeatures) -> OtherReport {
    let bandwidth = features::spectral_bandwidth(&stem.spec, &stem.centroid);
    let rolloff = features::spectral_rolloff(&stem.spec, 0.85);
    let flatness = features::spectral_flatness(&stem.spec);
    let contrast = features::spectral_contrast(&stem.spec);
    let zcr = features::zero_crossing_rate(&stem.signal.samples);

    OtherReport {
        presence: Presence::from_rms(stem.rms_mean()),
        spectral_profile: SpectralProfile {
            spectral_centroid_mean: finite_or_zero(features::mean(&stem.centroid)),
            spectral_centroid_std: finite_or_zero(features::std_dev(&stem.centroid)),
            spectral_bandwidth_mean: finite_or_zero(features::mean(&bandwidth)),
            spectral_rolloff_mean: finite_or_zero(features::mean(&rolloff)),
            spectral_flatness_mean: finite_or_zero(features::mean(&flatness)),
            spectral_contrast_mean: to_f64(&features::column_means(&contrast)),
            zero_crossing_rate_mean: finite_or_zero(features::mean(&zcr)),
            zero_crossings_total: features::zero_crossings(&stem.signal.samples),
        },
        energy_distribution: features::band_energy(&stem.spec).ratios(),
        activity: stem.activity(),
        timeline: stem.timeline(),
    }
}

// Guitar

#[derive(Debug, Serialize)]
struct GuitarReport {
    presence: Presence,
    playing_style: &'static str,
    short_interval_ratio: f64,
    median_onset_interval: f64,
    interval_clusters: [f64; 2],
    pitch: PitchSummary,
    activity: Activity,
    timeline: Timeline,
}

/// One-dimensional 2-means; returns the two centers, lower first.
fn two_means(values: &[f32]) -> [f32; 2] {
    let (low, high) = features::min_max(values);
    let mut centers = [low, high];
    for _ in 0..20 {
        let mut sums = [0.0f32; 2];
        let mut counts = [0usize; 2];
        for v in values {
            let c = usize::from((v - centers[0]).abs() > (v - centers[1]).abs());
            sums[c] += v;
            counts[c] += 1;
        }
        for c in 0..2 {
            if counts[c] > 0 {
                centers[c] = sums[c] / counts[c] as f32;
            }
        }
    }
    centers
}

/// Dense, mostly short onset gaps read as picking; sparser, regular hits as
/// strumming.
fn playing_style(intervals: &[f32]) -> &'static str {
    if intervals.len() < 3 {
        return "undetermined";
    }
    let short = intervals.iter().filter(|i| **i < PICKING_INTERVAL_SECS).count();
    if short * 2 >= intervals.len() {
        "picking"
    } else {
        "strumming"
    }
}

fn guitar_report(stem: &StemFeatures) -> GuitarReport {
    let intervals = stem.onset_intervals();
    let short = intervals.iter().filter(|i| **i < PICKING_INTERVAL_SECS).count();
    let clusters = two_means(&intervals);
    let pitches = stem.track_pitch(80.0, 1200.0);

    GuitarReport {
        presence: Presence::from_rms(stem.rms_mean()),
        playing_style: playing_style(&intervals),
        short_interval_ratio: ratio(short, intervals.len()),
        median_onset_interval: finite_or_zero(features::median(&intervals)),
        interval_clusters: [finite_or_zero(clusters[0]), finite_or_zero(clusters[1])],
        pitch: PitchSummary::from_frames(&pitches),
        activity: stem.activity(),
        timeline: stem.melodic_timeline(&pitches),
    }
}

// Violin

#[derive(Debug, Serialize)]
struct ViolinReport {
    presence: Presence,
    pitch: PitchSummary,
    vibrato: Vibrato,
    articulation: &'static str,
    legato_ratio: f64,
    activity: Activity,
    timeline: Timeline,
}

#[derive(Debug, Serialize)]
struct Vibrato {
    detected: bool,
    extent_cents: f64,
    rate_hz: f64,
}

fn vibrato(frames: &[PitchFrame], frame_duration: f32) -> Vibrato {
    let deviations = pitch_deviation_cents(frames);
    let extent = features::std_dev(&deviations);
    let crossings = features::zero_crossings(&deviations);
    let seconds = deviations.len() as f32 * frame_duration;
    Vibrato {
        detected: extent > 15.0,
        extent_cents: finite_or_zero(extent),
        rate_hz: if seconds > 0.0 {
            finite_or_zero(crossings as f32 / (2.0 * seconds))
        } else {
            0.0
        },
    }
}

fn violin_report(stem: &StemFeatures) -> ViolinReport {
    let pitches = stem.track_pitch(190.0, 3500.0);
    let min_run = (LEGATO_RUN_SECS / stem.frame_duration()).ceil() as usize;
    let runs = voiced_runs(&pitches);
    let voiced: usize = runs.iter().map(|r| r.len()).sum();
    let sustained: usize = runs.iter().filter(|r| r.len() >= min_run).map(|r| r.len()).sum();
    let legato_ratio = ratio(sustained, voiced);

    ViolinReport {
        presence: Presence::from_rms(stem.rms_mean()),
        vibrato: vibrato(&pitches, stem.frame_duration()),
        pitch: PitchSummary::from_frames(&pitches),
        articulation: if voiced == 0 {
            "undetermined"
        } else if legato_ratio >= 0.5 {
            "legato"
        } else {
            "detached"
        },
        legato_ratio,
        activity: stem.activity(),
        timeline: stem.melodic_timeline(&pitches),
    }
}

// Flute

#[derive(Debug, Serialize)]
struct FluteReport {
    presence: Presence,
    pitch: PitchSummary,
    breathiness: f64,
    pitch_stability: f64,
    activity: Activity,
    timeline: Timeline,
}

fn flute_report(stem: &StemFeatures) -> FluteReport {
    let pitches = stem.track_pitch(260.0, 2500.0);
    let flatness = features::spectral_flatness(&stem.spec);
    let voiced_flatness: Vec<f32> = flatness
        .iter()
        .zip(&pitches)
        .filter(|(_, p)| p.frequency.is_some())
        .map(|(f, _)| *f)
        .collect();
    let breathiness = if voiced_flatness.is_empty() {
        features::mean(&flatness)
    } else {
        features::mean(&voiced_flatness)
    };
    let wobble = features::std_dev(&pitch_deviation_cents(&pitches));

    FluteReport {
        presence: Presence::from_rms(stem.rms_mean()),
        pitch: PitchSummary::from_frames(&pitches),
        breathiness: finite_or_zero(breathiness),
        pitch_stability: finite_or_zero(1.0 / (1.0 + wobble / 50.0)),
        activity: stem.activity(),
        timeline: stem.melodic_timeline(&pitches),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{clicks, sine, write_wav};
    use serde_json::Value;
    use std::f32::consts::PI;
    use tempfile::TempDir;

    const SR: u32 = 22050;

    fn analyze(kind: StemKind, samples: &[f32]) -> Value {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir.path().join("stem.wav"), SR, samples);
        analyze_stem(kind, &path, 150)
    }

    fn vibrato_tone(center: f32, depth: f32, rate: f32, secs: f32) -> Vec<f32> {
        let n = (SR as f32 * secs) as usize;
        let mut phase = 0.0f32;
        (0..n)
            .map(|i| {
                let t = i as f32 / SR as f32;
                let freq = center * (1.0 + depth * (2.0 * PI * rate * t).sin());
                phase += 2.0 * PI * freq / SR as f32;
                0.4 * phase.sin()
            })
            .collect()
    }

    #[test]
    fn missing_stem_is_error_only() {
        let doc = analyze_stem(StemKind::Vocals, Path::new("/nope/vocals.wav"), 150);
        let object = doc.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert_eq!(doc["error"], "Audio file not found at: /nope/vocals.wav");
    }

    #[test]
    fn vocal_pitch_and_gender() {
        let doc = analyze(StemKind::Vocals, &sine(220.0, SR, 3.0, 0.4));
        let average = doc["pitch_details"]["average_pitch_hz"].as_f64().unwrap();
        assert!((average - 220.0).abs() < 3.0, "average {}", average);
        assert_eq!(doc["gender"], "Female");
        assert_eq!(doc["presence"], "High");
        assert_eq!(doc["pitch_details"]["vibrato_detected"], false);
        assert_eq!(doc["timbre"]["mfcc_mean"].as_array().unwrap().len(), N_MFCC);
        assert!(doc["timeline"]["pitch_hz"].as_array().unwrap().len() <= 150);

        let low = analyze(StemKind::Vocals, &sine(120.0, SR, 2.0, 0.4));
        assert_eq!(low["gender"], "Male");
        let confidence = low["gender_confidence"].as_f64().unwrap();
        assert!((confidence - 0.6).abs() < 0.05);
    }

    #[test]
    fn quiet_vocals_are_absent() {
        let doc = analyze(StemKind::Vocals, &sine(220.0, SR, 1.0, 0.005));
        assert_eq!(doc["presence"], "None");
    }

    #[test]
    fn bass_energy_is_low() {
        let doc = analyze(StemKind::Bass, &sine(55.0, SR, 2.0, 0.5));
        assert!(doc["low_frequency_ratio"].as_f64().unwrap() > 0.9);
        assert_eq!(doc["pitch"]["dominant_note"], "A1");
    }

    #[test]
    fn steady_drums_are_consistent() {
        let doc = analyze(StemKind::Drums, &clicks(0.5, SR, 8.0));
        let bpm = doc["tempo_bpm"].as_f64().unwrap();
        assert!((bpm - 120.0).abs() < 5.0, "bpm {}", bpm);
        assert!(doc["groove_consistency"].as_f64().unwrap() > 0.8);
        assert_eq!(doc["dominant_element"], "snare");
        assert!(doc["timeline"]["onset_strength"].is_array());
    }

    #[test]
    fn piano_key_from_chord() {
        let chord: Vec<f32> = [(523.25f32, 0.25f32), (659.25, 0.2), (783.99, 0.2)]
            .iter()
            .map(|(f, amplitude)| sine(*f, SR, 2.0, *amplitude))
            .fold(vec![0.0; (SR * 2) as usize], |acc, tone| {
                acc.iter().zip(&tone).map(|(a, b)| a + b).collect()
            });
        let doc = analyze(StemKind::Piano, &chord);
        assert_eq!(doc["key"], "C");
        assert_eq!(doc["mode"], "major");
        assert!(doc["polyphony_estimate"].as_f64().unwrap() >= 2.0);
        assert_eq!(doc["chroma_profile"].as_array().unwrap().len(), 12);
    }

    #[test]
    fn other_has_spectral_profile() {
        let doc = analyze(StemKind::Other, &sine(1000.0, SR, 1.0, 0.3));
        let profile = &doc["spectral_profile"];
        assert!((profile["spectral_centroid_mean"].as_f64().unwrap() - 1000.0).abs() < 100.0);
        assert_eq!(profile["spectral_contrast_mean"].as_array().unwrap().len(), 7);
    }

    #[test]
    fn guitar_style_from_onset_gaps() {
        assert_eq!(playing_style(&[0.1, 0.12, 0.1, 0.5]), "picking");
        assert_eq!(playing_style(&[0.5, 0.5, 0.6, 0.1]), "strumming");
        assert_eq!(playing_style(&[0.5]), "undetermined");

        let doc = analyze(StemKind::Guitar, &clicks(0.5, SR, 6.0));
        assert_eq!(doc["playing_style"], "strumming");
        let centers = two_means(&[0.1, 0.12, 0.5, 0.52]);
        assert!((centers[0] - 0.11).abs() < 1e-3 && (centers[1] - 0.51).abs() < 1e-3);
    }

    #[test]
    fn violin_vibrato_is_detected() {
        let doc = analyze(StemKind::Violin, &vibrato_tone(440.0, 0.04, 6.0, 3.0));
        assert_eq!(doc["vibrato"]["detected"], true);
        assert_eq!(doc["articulation"], "legato");

        let steady = analyze(StemKind::Violin, &sine(440.0, SR, 3.0, 0.4));
        assert_eq!(steady["vibrato"]["detected"], false);
    }

    #[test]
    fn flute_tone_is_stable() {
        let doc = analyze(StemKind::Flute, &sine(660.0, SR, 2.0, 0.4));
        assert!(doc["pitch_stability"].as_f64().unwrap() > 0.8);
        assert!(doc["breathiness"].as_f64().unwrap() < 0.1);
    }

    #[test]
    fn gender_thresholds() {
        assert_eq!(classify_gender(0.0), ("Unknown", 0.0));
        assert_eq!(classify_gender(70.0).0, "Unknown");
        assert_eq!(classify_gender(180.0).0, "Female");
        assert_eq!(classify_gender(400.0), ("Female", 1.0));
    }
}
