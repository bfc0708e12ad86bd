use super::features::{self, Spectrogram, CONTRAST_BANDS, N_MELS, PITCH_CLASSES};
use super::series::{downsample, downsample_columns, downsample_times, finite_or_zero, round_to};
use super::{AnalysisError, Signal};
use serde::Serialize;
use std::path::Path;
use tracing::info;

const SECTION_COUNT: usize = 10;
const CLIPPING_LEVEL: f32 = 0.99;

type Series = Vec<Option<f64>>;

#[derive(Debug, Serialize)]
pub struct TrackAnalytics {
    pub summary: Summary,
    pub waveform: Waveform,
    pub spectrogram: SpectrogramBlock,
    pub chromagram: Chromagram,
    pub components: Components,
    pub texture: Texture,
    pub rhythm: Rhythm,
    pub audio_quality: AudioQuality,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub duration: f64,
    pub bpm: i64,
    pub key: String,
    pub key_confidence: f64,
}

#[derive(Debug, Serialize)]
pub struct Waveform {
    pub times: Vec<f64>,
    pub amplitude: Series,
}

#[derive(Debug, Serialize)]
pub struct SpectrogramBlock {
    pub times: Vec<f64>,
    pub frequencies: Vec<f64>,
    pub db_values: Vec<Series>,
}

#[derive(Debug, Serialize)]
pub struct Chromagram {
    pub times: Vec<f64>,
    pub notes: Vec<String>,
    pub values: Vec<Series>,
}

#[derive(Debug, Serialize)]
pub struct Components {
    pub times: Vec<f64>,
    pub harmonic_amplitude: Series,
    pub percussive_amplitude: Series,
}

#[derive(Debug, Serialize)]
pub struct Texture {
    pub times: Vec<f64>,
    pub frequency_bands: Vec<String>,
    pub values: Vec<Series>,
}

#[derive(Debug, Serialize)]
pub struct Rhythm {
    pub beat_times: Vec<f64>,
    pub section_boundaries: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct AudioQuality {
    pub peak_amplitude: f64,
    pub rms_level: f64,
    pub crest_factor: f64,
    pub snr_estimate: f64,
    pub clipping_ratio: f64,
}

/// Whole-track analytics: summary, graph series reduced to `points`, rhythm
/// and audio quality.
pub fn analyze_track(path: &Path, points: usize) -> Result<serde_json::Value, AnalysisError> {
    let signal = Signal::load(path)?;
    let analytics = compute(&signal, points);
    info!(
        "Analyzed track {:?}: {:.1}s, {} BPM, key {}",
        path, analytics.summary.duration, analytics.summary.bpm, analytics.summary.key
    );
    Ok(serde_json::to_value(&analytics).unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() })))
}

pub(crate) fn compute(signal: &Signal, points: usize) -> TrackAnalytics {
    let sr = signal.sample_rate;
    let spec = Spectrogram::compute(&signal.samples, sr);
    let n_frames = spec.n_frames();
    let times = downsample_times(&features::frame_times(n_frames, sr), points);

    let mel = features::mel_spectrogram(&spec, N_MELS);
    let envelope = features::onset_strength(&mel);
    let tempo = features::estimate_tempo(&envelope, sr);
    let beats = features::track_beats(&envelope, tempo.bpm, sr);

    let chroma = features::chroma(&spec);
    let profile = features::chroma_mean(&chroma);
    let (key_index, key_confidence) = features::estimate_key(&profile);

    let rms = features::rms(&signal.samples);
    let split = features::hpss(&spec);
    let contrast = features::spectral_contrast(&spec);
    let sections = features::agglomerative_segments(&chroma, SECTION_COUNT);

    let to_times = |frames: &[usize]| -> Vec<f64> {
        frames
            .iter()
            .map(|f| round_to(features::frame_to_time(*f, sr) as f64, 3))
            .collect()
    };

    TrackAnalytics {
        summary: Summary {
            duration: round_to(signal.duration(), 2),
            bpm: finite_or_zero(tempo.bpm).round() as i64,
            key: PITCH_CLASSES[key_index].to_string(),
            key_confidence: finite_or_zero(key_confidence),
        },
        waveform: Waveform {
            times: times.clone(),
            amplitude: downsample(&rms, points),
        },
        spectrogram: SpectrogramBlock {
            times: times.clone(),
            frequencies: mel.frequencies.iter().map(|f| *f as f64).collect(),
            db_values: downsample_columns(&mel.db, points),
        },
        chromagram: Chromagram {
            times: times.clone(),
            notes: PITCH_CLASSES.iter().map(|n| n.to_string()).collect(),
            values: downsample_columns(&chroma, points),
        },
        components: Components {
            times: times.clone(),
            harmonic_amplitude: downsample(&features::rms_from_spectrogram(&split.harmonic), points),
            percussive_amplitude: downsample(
                &features::rms_from_spectrogram(&split.percussive),
                points,
            ),
        },
        texture: Texture {
            times,
            frequency_bands: (1..=CONTRAST_BANDS).map(|i| format!("Band {}", i)).collect(),
            values: downsample_columns(&contrast, points),
        },
        rhythm: Rhythm {
            beat_times: to_times(&beats),
            section_boundaries: to_times(&sections),
        },
        audio_quality: audio_quality(&signal.samples, &rms),
    }
}

pub(crate) fn audio_quality(samples: &[f32], frame_rms: &[f32]) -> AudioQuality {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    let overall_rms = if samples.is_empty() {
        0.0
    } else {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    };
    let clipped = samples.iter().filter(|s| s.abs() > CLIPPING_LEVEL).count();
    let mean_rms = features::mean(frame_rms);
    let std_rms = features::std_dev(frame_rms);

    AudioQuality {
        peak_amplitude: finite_or_zero(peak),
        rms_level: finite_or_zero(overall_rms),
        crest_factor: finite_or_zero(peak / (overall_rms + 1e-8)),
        snr_estimate: finite_or_zero(20.0 * (mean_rms / (std_rms + 1e-8)).log10()),
        clipping_ratio: if samples.is_empty() {
            0.0
        } else {
            clipped as f64 / samples.len() as f64
        },
    }
}
