//! Signal analysis of whole tracks and separated stems.
//!
//! Everything here is CPU-bound and synchronous; callers run it on a
//! blocking pool.

pub mod decoder;
pub mod features;
pub mod pitch;
pub mod series;
mod stems;
mod track;

pub use stems::analyze_stem;
pub use track::analyze_track;

use std::path::PathBuf;
use thiserror::Error;

/// Inputs shorter than this are rejected.
pub const MIN_DURATION_SECS: f64 = 0.5;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Audio file not found at: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("Audio is too short to analyze ({0:.2}s)")]
    TooShort(f64),
}

/// Renders an analysis failure the way stem descriptions store it.
pub fn error_document(error: &AnalysisError) -> serde_json::Value {
    serde_json::json!({ "error": error.to_string() })
}

/// Decoded mono signal plus the figures every analysis needs.
pub(crate) struct Signal {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Signal {
    pub fn load(path: &std::path::Path) -> Result<Self, AnalysisError> {
        if !path.exists() {
            return Err(AnalysisError::NotFound(path.to_path_buf()));
        }
        let samples = decoder::decode(path)?;
        let signal = Signal {
            samples,
            sample_rate: decoder::TARGET_SAMPLE_RATE,
        };
        let duration = signal.duration();
        if duration < MIN_DURATION_SECS {
            return Err(AnalysisError::TooShort(duration));
        }
        Ok(signal)
    }

    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::f32::consts::PI;
    use std::path::{Path, PathBuf};

    pub fn write_wav(path: &Path, sample_rate: u32, samples: &[f32]) -> PathBuf {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();
        path.to_path_buf()
    }

    pub fn sine(freq: f32, sample_rate: u32, secs: f32, amplitude: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * secs) as usize;
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    /// Short decaying noise bursts every `interval` seconds.
    pub fn clicks(interval: f32, sample_rate: u32, secs: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * secs) as usize;
        let period = (interval * sample_rate as f32) as usize;
        let burst = sample_rate as usize / 50;
        let mut state: u32 = 12345;
        (0..n)
            .map(|i| {
                let offset = i % period;
                if offset < burst {
                    state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                    let noise = ((state >> 16) & 0x7fff) as f32 / 16384.0 - 1.0;
                    noise * 0.8 * (1.0 - offset as f32 / burst as f32)
                } else {
                    0.0
                }
            })
            .collect()
    }
}
