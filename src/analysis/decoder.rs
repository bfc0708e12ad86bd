//! Decodes audio files to mono f32 at the analysis sample rate.

use super::AnalysisError;
use rubato::{FftFixedInOut, Resampler};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, trace};

pub const TARGET_SAMPLE_RATE: u32 = 22050;

const RESAMPLE_CHUNK: usize = 1024;

pub fn decode(path: &Path) -> Result<Vec<f32>, AnalysisError> {
    let fail = |reason: String| AnalysisError::Decode {
        path: path.to_path_buf(),
        reason,
    };

    let file = std::fs::File::open(path).map_err(|e| fail(format!("open: {}", e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| fail(format!("probe: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| fail("no audio track".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_rate = codec_params.sample_rate.unwrap_or(44100);
    debug!(
        "Decoding {:?} @ {}Hz, {} channels",
        path,
        source_rate,
        codec_params.channels.map(|c| c.count()).unwrap_or(2)
    );

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| fail(format!("decoder: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(fail(format!("read packet: {}", e))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                trace!("Skipping corrupted frame: {}", e);
                continue;
            }
            Err(e) => return Err(fail(format!("decode: {}", e))),
        };

        let spec = *decoded.spec();
        let mut buffer = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend(to_mono(buffer.samples(), spec.channels.count()));
    }

    let samples = resample(&samples, source_rate, TARGET_SAMPLE_RATE);
    debug!(
        "Decoded {:?}: {} samples ({:.2}s)",
        path,
        samples.len(),
        samples.len() as f64 / TARGET_SAMPLE_RATE as f64
    );
    Ok(samples)
}

fn to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let mut resampler =
        match FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, RESAMPLE_CHUNK, 1) {
            Ok(r) => r,
            Err(e) => {
                debug!("Resampler init failed ({}), using linear fallback", e);
                return resample_linear(samples, from_rate, to_rate);
            }
        };

    let chunk_in = resampler.input_frames_next();
    let chunk_out = resampler.output_frames_next();
    let ratio = to_rate as f64 / from_rate as f64;
    let mut output = Vec::with_capacity((samples.len() as f64 * ratio).ceil() as usize);

    let mut pos = 0;
    while pos < samples.len() {
        let end = (pos + chunk_in).min(samples.len());
        let mut chunk = samples[pos..end].to_vec();
        chunk.resize(chunk_in, 0.0);

        let input = vec![chunk];
        match resampler.process(&input, None) {
            Ok(resampled) => {
                if let Some(channel) = resampled.first() {
                    let valid = if end - pos < chunk_in {
                        (((end - pos) as f64 * ratio).ceil() as usize).min(chunk_out)
                    } else {
                        chunk_out
                    };
                    output.extend_from_slice(&channel[..valid.min(channel.len())]);
                }
            }
            Err(e) => {
                debug!("Resampler failed ({}), using linear fallback for the rest", e);
                output.extend(resample_linear(&samples[pos..], from_rate, to_rate));
                break;
            }
        }
        pos += chunk_in;
    }
    output
}

fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let step = from_rate as f64 / to_rate as f64;
    let len = (samples.len() as f64 / step) as usize;
    (0..len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            match samples.get(idx + 1) {
                Some(next) => samples[idx] * (1.0 - frac) + next * frac,
                None => samples[idx.min(samples.len() - 1)],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{sine, write_wav};

    #[test]
    fn averages_channels() {
        let mono = to_mono(&[1.0, 0.0, 0.5, 0.5], 2);
        assert_eq!(mono, vec![0.5, 0.5]);
    }

    #[test]
    fn linear_fallback_halves_length() {
        let input: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        let out = resample_linear(&input, 44100, 22050);
        assert_eq!(out.len(), 500);
        assert!((out[10] - 20.0).abs() < 1e-3);
    }

    #[test]
    fn decodes_and_resamples_wav() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_wav(
            &dir.path().join("tone.wav"),
            44100,
            &sine(440.0, 44100, 1.0, 0.5),
        );
        let samples = decode(&path).unwrap();
        let expected = TARGET_SAMPLE_RATE as i64;
        assert!((samples.len() as i64 - expected).abs() < 1100);
        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.4 && peak < 0.6);
    }

    #[test]
    fn garbage_is_decode_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("junk.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(matches!(decode(&path), Err(AnalysisError::Decode { .. })));
    }
}
