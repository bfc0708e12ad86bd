//! Speech-to-text for the vocal stem and the LRC files built from it.

pub mod lrc;
mod retry_policy;

pub use retry_policy::RetryPolicy;

use crate::config::TranscriptionSettings;
use crate::converter::{AudioConverter, ConversionError};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Seconds a segment lasts when the service omits its end.
const DEFAULT_SEGMENT_SECS: f64 = 2.0;

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("Audio file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Transcription service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transcription request failed: {0}")]
    Transport(String),

    #[error("Invalid transcription response: {0}")]
    InvalidResponse(String),

    #[error("Audio conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscriptionError {
    /// Server errors, timeouts and dropped connections may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TranscriptionError::Status { status, .. } => *status >= 500,
            TranscriptionError::Transport(_) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TranscriptionError {
    fn from(e: reqwest::Error) -> Self {
        TranscriptionError::Transport(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// The stored lyrics document of a song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub language: Option<String>,
    pub duration: Option<f64>,
    pub segments: Vec<Segment>,
    pub lrc: String,
}

impl Transcript {
    pub fn to_document(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript, TranscriptionError>;
}

/// Whisper through an OpenAI-compatible `/audio/transcriptions` endpoint.
pub struct WhisperTranscriber {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    retry_policy: RetryPolicy,
    converter: Arc<dyn AudioConverter>,
}

impl WhisperTranscriber {
    pub fn new(
        settings: &TranscriptionSettings,
        converter: Arc<dyn AudioConverter>,
    ) -> Result<Self, TranscriptionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            retry_policy: RetryPolicy::new(settings),
            converter,
        })
    }

    /// WAV input is shrunk to a mono speech MP3 before upload.
    async fn prepare_upload(&self, audio: &Path) -> Result<PathBuf, TranscriptionError> {
        let is_wav = audio
            .extension()
            .map(|e| e.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        if !is_wav {
            return Ok(audio.to_path_buf());
        }
        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let output = audio.with_file_name(format!("{}_speech.mp3", stem));
        self.converter.to_speech_mp3(audio, &output).await?;
        Ok(output)
    }

    async fn send(&self, bytes: &[u8], file_name: &str) -> Result<Transcript, TranscriptionError> {
        let part = Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str("audio/mpeg")?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        let mut request = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let raw: VerboseTranscription = response
            .json()
            .await
            .map_err(|e| TranscriptionError::InvalidResponse(e.to_string()))?;
        Ok(raw.into_transcript())
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript, TranscriptionError> {
        if !tokio::fs::try_exists(audio).await.unwrap_or(false) {
            return Err(TranscriptionError::NotFound(audio.to_path_buf()));
        }
        let upload = self.prepare_upload(audio).await?;
        let bytes = tokio::fs::read(&upload).await?;
        let file_name = upload
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());
        debug!("Transcribing {:?} ({} bytes)", upload, bytes.len());

        let mut retry_count = 0;
        loop {
            match self.send(&bytes, &file_name).await {
                Ok(mut transcript) => {
                    if transcript.duration.is_none() {
                        match self.converter.probe_duration(&upload).await {
                            Ok(duration) => transcript.duration = Some(duration),
                            Err(e) => warn!("Could not probe duration of {:?}: {}", upload, e),
                        }
                    }
                    info!(
                        "Transcribed {:?}: {} segments, language {:?}",
                        audio,
                        transcript.segments.len(),
                        transcript.language
                    );
                    return Ok(transcript);
                }
                Err(e) if self.retry_policy.should_retry(&e, retry_count) => {
                    let wait = self.retry_policy.backoff(retry_count);
                    warn!(
                        "Transcription attempt {} failed ({}), retrying in {:?}",
                        retry_count + 1,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    language: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    segments: Vec<RawSegment>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    start: Option<f64>,
    end: Option<f64>,
    #[serde(default)]
    text: String,
}

impl VerboseTranscription {
    fn into_transcript(self) -> Transcript {
        let lrc = lrc::segments_to_lrc(self.segments.iter().map(|s| (s.start, s.text.as_str())));
        let segments = self
            .segments
            .into_iter()
            .map(|s| {
                let start = s.start.unwrap_or(0.0);
                let text = s.text.trim();
                Segment {
                    start,
                    end: s.end.unwrap_or(start + DEFAULT_SEGMENT_SECS),
                    text: if text.is_empty() {
                        ".".to_string()
                    } else {
                        text.to_string()
                    },
                }
            })
            .collect();
        Transcript {
            language: self.language,
            duration: self.duration,
            segments,
            lrc,
        }
    }
}
