//! Test fixtures: generated audio and stand-ins for the external tools
//!
//! Nothing here shells out or talks to a real third-party service. Audio is
//! synthesized with `hound`, and the LLM is a local axum server speaking the
//! chat completions format.

use super::constants::*;
use async_trait::async_trait;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use stemsplit_server::acquisition::{write_upload, FetchError, FetchedAudio, Source, SourceFetcher};
use stemsplit_server::converter::{AudioConverter, ConversionError};
use stemsplit_server::separation::{SeparatedStems, SeparationError, StemSeparator};
use stemsplit_server::storage::{ObjectStorage, StorageError};
use stemsplit_server::transcription::{Segment, Transcriber, Transcript, TranscriptionError};
use std::f32::consts::PI;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};

// ============================================================================
// Audio
// ============================================================================

pub fn sine(freq: f32, secs: f32) -> Vec<f32> {
    let n = (SAMPLE_RATE as f32 * secs) as usize;
    (0..n)
        .map(|i| 0.3 * (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

/// Short noise bursts twice a second.
pub fn clicks(secs: f32) -> Vec<f32> {
    let n = (SAMPLE_RATE as f32 * secs) as usize;
    let period = SAMPLE_RATE as usize / 2;
    let burst = SAMPLE_RATE as usize / 50;
    let mut state: u32 = 7;
    (0..n)
        .map(|i| {
            let offset = i % period;
            if offset < burst {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                ((state >> 16) & 0x7fff) as f32 / 16384.0 - 1.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Encodes mono samples as a 16-bit WAV file in memory.
pub fn wav_bytes(samples: &[f32]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
        for s in samples {
            writer
                .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .expect("wav sample");
        }
        writer.finalize().expect("wav finalize");
    }
    cursor.into_inner()
}

fn write_wav(path: &Path, samples: &[f32]) -> std::io::Result<()> {
    std::fs::write(path, wav_bytes(samples))
}

// ============================================================================
// Collaborators
// ============================================================================

/// Turns any supported link into a generated tone; uploads go through the
/// real upload validation.
pub struct SyntheticFetcher;

#[async_trait]
impl SourceFetcher for SyntheticFetcher {
    async fn fetch(&self, source: &Source, dir: &Path) -> Result<FetchedAudio, FetchError> {
        match source {
            Source::Url(url) if url.contains("youtube.com") || url.contains("youtu.be") => {
                let path = dir.join("youtube_audio.wav");
                write_wav(&path, &sine(220.0, CLIP_SECONDS))?;
                Ok(FetchedAudio {
                    path,
                    title: "youtube_audio".to_string(),
                })
            }
            Source::Url(url) => Err(FetchError::Unsupported(format!("Unsupported URL: {}", url))),
            Source::Upload { file_name, bytes } => write_upload(file_name, bytes, dir).await,
        }
    }
}

/// Records uploaded keys and returns fake public URLs.
#[derive(Default)]
pub struct RecordingStorage {
    pub keys: Mutex<Vec<String>>,
}

impl RecordingStorage {
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for RecordingStorage {
    async fn upload(&self, local_path: &Path, key: &str) -> Result<String, StorageError> {
        if !local_path.exists() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{:?} does not exist", local_path),
            )));
        }
        self.keys.lock().unwrap().push(key.to_string());
        Ok(format!("{}/{}", STORAGE_BASE_URL, key))
    }
}

/// Writes all five separated stems, or fails when asked to.
pub struct ToneSeparator {
    pub fail: bool,
}

#[async_trait]
impl StemSeparator for ToneSeparator {
    async fn separate(&self, input: &Path, out_dir: &Path) -> Result<SeparatedStems, SeparationError> {
        if self.fail {
            return Err(SeparationError::Failed("separation model crashed".to_string()));
        }
        let name = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let dir = out_dir.join(name);
        std::fs::create_dir_all(&dir)?;
        write_wav(&dir.join("vocals.wav"), &sine(330.0, CLIP_SECONDS))?;
        write_wav(&dir.join("bass.wav"), &sine(55.0, CLIP_SECONDS))?;
        write_wav(&dir.join("drums.wav"), &clicks(CLIP_SECONDS))?;
        write_wav(&dir.join("piano.wav"), &sine(261.6, CLIP_SECONDS))?;
        write_wav(&dir.join("other.wav"), &sine(440.0, CLIP_SECONDS))?;
        Ok(SeparatedStems { dir })
    }
}

/// Copies instead of transcoding.
pub struct CopyConverter;

#[async_trait]
impl AudioConverter for CopyConverter {
    async fn to_mp3(&self, input: &Path, output: &Path, _: u32) -> Result<(), ConversionError> {
        tokio::fs::copy(input, output).await?;
        Ok(())
    }

    async fn to_speech_mp3(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        tokio::fs::copy(input, output).await?;
        Ok(())
    }

    async fn probe_duration(&self, _: &Path) -> Result<f64, ConversionError> {
        Ok(CLIP_SECONDS as f64)
    }
}

/// Always hears the same two lines.
pub struct CannedTranscriber;

#[async_trait]
impl Transcriber for CannedTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript, TranscriptionError> {
        if !audio.exists() {
            return Err(TranscriptionError::NotFound(audio.to_path_buf()));
        }
        Ok(Transcript {
            language: Some(TRANSCRIPT_LANGUAGE.to_string()),
            duration: Some(CLIP_SECONDS as f64),
            segments: vec![
                Segment {
                    start: 0.5,
                    end: 1.2,
                    text: "hello world".to_string(),
                },
                Segment {
                    start: 1.2,
                    end: 2.0,
                    text: "second line".to_string(),
                },
            ],
            lrc: TRANSCRIPT_LRC.to_string(),
        })
    }
}

// ============================================================================
// LLM
// ============================================================================

/// Requests received by the mock LLM server.
pub type SeenRequests = Arc<Mutex<Vec<serde_json::Value>>>;

/// Serves `/chat/completions` with a fixed status and reply.
pub async fn spawn_mock_llm(
    status: StatusCode,
    reply: String,
) -> (String, SeenRequests, tokio::sync::oneshot::Sender<()>) {
    let seen: SeenRequests = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let app = Router::new().route(
        "/chat/completions",
        post(move |Json(body): Json<serde_json::Value>| {
            let recorder = recorder.clone();
            let reply = reply.clone();
            async move {
                recorder.lock().unwrap().push(body);
                let payload = serde_json::json!({
                    "choices": [{
                        "message": { "role": "assistant", "content": reply },
                        "finish_reason": "stop"
                    }],
                    "usage": { "prompt_tokens": 10, "completion_tokens": 10, "total_tokens": 20 }
                });
                (status, Json(payload))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock LLM");
    let addr = listener.local_addr().expect("mock LLM address");
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .expect("Mock LLM failed");
    });
    (format!("http://{}", addr), seen, shutdown_tx)
}
