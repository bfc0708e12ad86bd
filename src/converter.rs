//! Audio transcoding with ffmpeg/ffprobe.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Errors that can occur during audio conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("ffprobe failed: {0}")]
    ProbeFailed(String),

    #[error("ffmpeg failed: {0}")]
    ConversionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid output: {0}")]
    InvalidOutput(String),
}

#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait AudioConverter: Send + Sync {
    /// Transcodes to MP3 at the given bitrate.
    async fn to_mp3(
        &self,
        input: &Path,
        output: &Path,
        bitrate_kbps: u32,
    ) -> Result<(), ConversionError>;

    /// Transcodes to a small mono MP3 suited to speech recognition.
    async fn to_speech_mp3(&self, input: &Path, output: &Path) -> Result<(), ConversionError>;

    /// Duration in seconds.
    async fn probe_duration(&self, input: &Path) -> Result<f64, ConversionError>;
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

pub struct FfmpegConverter {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegConverter {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    async fn run_ffmpeg(
        &self,
        input: &Path,
        output: &Path,
        codec_args: &[&str],
    ) -> Result<(), ConversionError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(input)
            .args(codec_args)
            .args(["-vn", "-y"])
            .arg(output)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ConversionError::ConversionFailed(stderr.trim().to_string()));
        }
        debug!("Converted {:?} -> {:?}", input, output);
        Ok(())
    }
}

#[async_trait]
impl AudioConverter for FfmpegConverter {
    async fn to_mp3(
        &self,
        input: &Path,
        output: &Path,
        bitrate_kbps: u32,
    ) -> Result<(), ConversionError> {
        let bitrate = format!("{}k", bitrate_kbps);
        self.run_ffmpeg(input, output, &["-c:a", "libmp3lame", "-b:a", &bitrate])
            .await
    }

    async fn to_speech_mp3(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        self.run_ffmpeg(
            input,
            output,
            &["-ac", "1", "-ar", "16000", "-c:a", "libmp3lame", "-b:a", "32k"],
        )
        .await
    }

    async fn probe_duration(&self, input: &Path) -> Result<f64, ConversionError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(input)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConversionError::ProbeFailed(stderr.to_string()));
        }
        parse_probe_duration(&output.stdout)
    }
}

fn parse_probe_duration(stdout: &[u8]) -> Result<f64, ConversionError> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| ConversionError::InvalidOutput(format!("JSON parse error: {}", e)))?;
    probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| ConversionError::InvalidOutput("No duration reported".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ffprobe_duration() {
        let json = br#"{"format": {"format_name": "mp3", "duration": "183.040000"}}"#;
        let duration = parse_probe_duration(json).unwrap();
        assert!((duration - 183.04).abs() < 1e-9);
    }

    #[test]
    fn missing_duration_is_invalid_output() {
        let json = br#"{"format": {"format_name": "mp3"}}"#;
        assert!(matches!(
            parse_probe_duration(json),
            Err(ConversionError::InvalidOutput(_))
        ));
    }

    #[tokio::test]
    async fn missing_ffmpeg_binary_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let converter = FfmpegConverter::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        let result = converter
            .to_mp3(&dir.path().join("in.wav"), &dir.path().join("out.mp3"), 192)
            .await;
        assert!(matches!(result, Err(ConversionError::Io(_))));
    }
}
