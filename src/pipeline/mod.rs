//! Song processing: fetch, separate, analyze, transcribe and persist.
//!
//! 1. Fetch the source into a scratch directory owned by this run
//! 2. Concurrently upload the original, analyze the whole track, and
//!    separate stems then transcribe the vocals; any error aborts, except
//!    track analysis of unreadable audio, which becomes an error document
//! 3. Persist the Song in `processing` status
//! 4. Convert and upload the separated stems with bounded concurrency
//! 5. Analyze all eight stem categories on the blocking pool
//! 6. Persist the Split and mark the Song `complete` (or `failed`)

use crate::acquisition::{FetchError, Source, SourceFetcher};
use crate::analysis::{analyze_stem, analyze_track, error_document, AnalysisError};
use crate::config::PipelineSettings;
use crate::converter::{AudioConverter, ConversionError};
use crate::error::AppError;
use crate::library_store::{LibraryStore, NewSong, NewSplit, SongStatus};
use crate::separation::{SeparatedStems, SeparationError, StemKind, StemSeparator};
use crate::storage::{original_song_key, stem_key, ObjectStorage, StorageError};
use crate::transcription::{Transcriber, TranscriptionError};
use futures::{stream, StreamExt, TryStreamExt};
use rayon::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Upload failed: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Separation(#[from] SeparationError),

    #[error("Stem conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Track analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Transcription failed: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(e: tokio::task::JoinError) -> Self {
        PipelineError::Task(e.to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Fetch(FetchError::Unsupported(message)) => AppError::Validation(message),
            PipelineError::Fetch(FetchError::Missing(path)) => {
                AppError::not_found(format!("Downloaded file not found: {}", path.display()))
            }
            PipelineError::Analysis(AnalysisError::NotFound(path)) => {
                AppError::not_found(format!("Audio file not found at: {}", path.display()))
            }
            PipelineError::Fetch(e) => AppError::external(e.to_string(), false),
            PipelineError::Storage(e) => {
                let retryable = e.is_retryable();
                AppError::external(e.to_string(), retryable)
            }
            PipelineError::Separation(e) => AppError::external(e.to_string(), false),
            PipelineError::Transcription(e) => {
                let retryable = e.is_retryable();
                AppError::external(e.to_string(), retryable)
            }
            PipelineError::Store(e) => e.into(),
            other => {
                error!("Song processing failed: {}", other);
                AppError::Pipeline("Song processing failed.".to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessedSong {
    pub song_id: i64,
    pub split_id: i64,
}

pub struct SongPipeline {
    fetcher: Arc<dyn SourceFetcher>,
    storage: Arc<dyn ObjectStorage>,
    separator: Arc<dyn StemSeparator>,
    converter: Arc<dyn AudioConverter>,
    transcriber: Arc<dyn Transcriber>,
    store: Arc<dyn LibraryStore>,
    settings: PipelineSettings,
}

impl SongPipeline {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        storage: Arc<dyn ObjectStorage>,
        separator: Arc<dyn StemSeparator>,
        converter: Arc<dyn AudioConverter>,
        transcriber: Arc<dyn Transcriber>,
        store: Arc<dyn LibraryStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            fetcher,
            storage,
            separator,
            converter,
            transcriber,
            store,
            settings,
        }
    }

    pub async fn process(&self, source: &Source, owner_id: i64) -> Result<ProcessedSong, PipelineError> {
        let started = Instant::now();
        let scratch = tempfile::TempDir::new()?;

        let fetched = self.fetcher.fetch(source, scratch.path()).await?;
        if !tokio::fs::try_exists(&fetched.path).await.unwrap_or(false) {
            return Err(FetchError::Missing(fetched.path).into());
        }
        info!("Processing '{}' for user {}", fetched.title, owner_id);

        let stems_dir = scratch.path().join("stems");
        let (song_url, analytics, (stems, lyrics)) = tokio::try_join!(
            self.upload_original(&fetched.path),
            self.analyze_original(fetched.path.clone()),
            self.separate_and_transcribe(&fetched.path, &stems_dir),
        )?;

        let song_id = self.store.create_song(&NewSong {
            title: fetched.title.clone(),
            owner_id,
            song_url,
            lyrics,
            description: Some(analytics),
        })?;
        debug!("Created song {} in processing state", song_id);

        match self.finish_split(song_id, &stems).await {
            Ok(split_id) => {
                self.store.set_song_status(song_id, SongStatus::Complete)?;
                info!(
                    "Processed song {} (split {}) in {:.1}s",
                    song_id,
                    split_id,
                    started.elapsed().as_secs_f64()
                );
                Ok(ProcessedSong { song_id, split_id })
            }
            Err(e) => {
                error!("Processing of song {} failed: {}", song_id, e);
                if let Err(status_err) = self.store.set_song_status(song_id, SongStatus::Failed) {
                    warn!("Could not mark song {} as failed: {:#}", song_id, status_err);
                }
                Err(e)
            }
        }
    }

    async fn upload_original(&self, path: &Path) -> Result<String, PipelineError> {
        let url = self.storage.upload(path, &original_song_key(path)).await?;
        debug!("Uploaded original to {}", url);
        Ok(url)
    }

    /// Only a missing file aborts; audio that cannot be analyzed is recorded
    /// as an error document in the Song description.
    async fn analyze_original(&self, path: PathBuf) -> Result<Value, PipelineError> {
        let points = self.settings.series_points;
        match tokio::task::spawn_blocking(move || analyze_track(&path, points)).await? {
            Ok(analytics) => Ok(analytics),
            Err(e @ AnalysisError::NotFound(_)) => Err(e.into()),
            Err(e) => {
                warn!("Whole-track analysis failed: {}", e);
                Ok(error_document(&e))
            }
        }
    }

    async fn separate_and_transcribe(
        &self,
        input: &Path,
        out_dir: &Path,
    ) -> Result<(SeparatedStems, Value), PipelineError> {
        let stems = self.separator.separate(input, out_dir).await?;
        let transcript = self
            .transcriber
            .transcribe(&stems.path_for(StemKind::Vocals))
            .await?;
        Ok((stems, transcript.to_document()))
    }

    async fn finish_split(&self, song_id: i64, stems: &SeparatedStems) -> Result<i64, PipelineError> {
        let audio_urls = self.upload_stems(song_id, stems).await?;
        let descriptions = self.analyze_stems(stems).await?;
        let split_id = self.store.create_split(&NewSplit {
            song_id,
            audio_urls,
            descriptions,
        })?;
        Ok(split_id)
    }

    async fn upload_stems(
        &self,
        song_id: i64,
        stems: &SeparatedStems,
    ) -> Result<BTreeMap<StemKind, String>, PipelineError> {
        let uploaded: Vec<Option<(StemKind, String)>> = stream::iter(StemKind::SEPARATED)
            .map(|kind| self.upload_stem(song_id, kind, stems))
            .buffer_unordered(self.settings.stem_concurrency.max(1))
            .try_collect()
            .await?;
        Ok(uploaded.into_iter().flatten().collect())
    }

    /// Returns None when the separation produced no file for `kind`.
    async fn upload_stem(
        &self,
        song_id: i64,
        kind: StemKind,
        stems: &SeparatedStems,
    ) -> Result<Option<(StemKind, String)>, PipelineError> {
        let wav = stems.path_for(kind);
        if !tokio::fs::try_exists(&wav).await.unwrap_or(false) {
            warn!("No {} stem for song {}", kind, song_id);
            return Ok(None);
        }
        let mp3 = wav.with_extension("mp3");
        self.converter
            .to_mp3(&wav, &mp3, self.settings.mp3_bitrate_kbps)
            .await?;
        let url = self.storage.upload(&mp3, &stem_key(song_id, kind.name())).await?;
        debug!("Uploaded {} stem of song {} to {}", kind, song_id, url);
        Ok(Some((kind, url)))
    }

    /// One report per category; a failing stem yields an error document.
    async fn analyze_stems(
        &self,
        stems: &SeparatedStems,
    ) -> Result<BTreeMap<StemKind, Value>, PipelineError> {
        let stems = stems.clone();
        let points = self.settings.series_points;
        let reports = tokio::task::spawn_blocking(move || {
            StemKind::ALL[..]
                .par_iter()
                .map(|kind| (*kind, analyze_stem(*kind, &stems.path_for(*kind), points)))
                .collect::<BTreeMap<_, _>>()
        })
        .await?;
        Ok(reports)
    }
}
