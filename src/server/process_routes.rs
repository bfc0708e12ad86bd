//! Song processing and lyric routes.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::acquisition::Source;
use crate::error::AppError;
use crate::library_store::Song;
use crate::pipeline::ProcessedSong;
use crate::server::session::Session;
use crate::server::state::{GuardedLibraryStore, GuardedLyricsWriter, GuardedPipeline, ServerState};
use crate::transcription::lrc::{align_rewritten, lrc_segments, parse_lrc};

#[derive(Debug, Deserialize)]
pub struct ProcessUrlBody {
    pub url: String,
    /// Owner of the new song; defaults to the caller.
    #[serde(default)]
    pub id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RewriteBody {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub songs_id: i64,
    pub splits_id: i64,
}

impl From<ProcessedSong> for ProcessResponse {
    fn from(processed: ProcessedSong) -> Self {
        Self {
            songs_id: processed.song_id,
            splits_id: processed.split_id,
        }
    }
}

async fn process_url(
    session: Session,
    State(pipeline): State<GuardedPipeline>,
    Json(body): Json<ProcessUrlBody>,
) -> Result<Json<ProcessResponse>, AppError> {
    session.ensure_user(body.id)?;
    let url = body.url.trim();
    if url.is_empty() {
        return Err(AppError::validation("url must not be empty"));
    }
    info!("User {} requested processing of {}", session.user_id, url);
    let processed = pipeline
        .process(&Source::Url(url.to_string()), session.user_id)
        .await?;
    Ok(Json(processed.into()))
}

async fn process_audio_file(
    session: Session,
    State(pipeline): State<GuardedPipeline>,
    mut multipart: Multipart,
) -> Result<Json<ProcessResponse>, AppError> {
    let mut claimed_user: Option<i64> = None;
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("user_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::validation(format!("Invalid user_id: {}", e)))?;
                let id = text
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| AppError::validation("user_id must be an integer"))?;
                claimed_user = Some(id);
            }
            Some("audio_file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(format!("Could not read audio_file: {}", e)))?;
                upload = Some((file_name, bytes.to_vec()));
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    session.ensure_user(claimed_user)?;
    let (file_name, bytes) = upload.ok_or_else(|| AppError::validation("audio_file is required"))?;
    if bytes.is_empty() {
        return Err(AppError::validation("audio_file is empty"));
    }
    info!(
        "User {} uploaded {} ({} bytes)",
        session.user_id,
        file_name,
        bytes.len()
    );

    let processed = pipeline
        .process(&Source::Upload { file_name, bytes }, session.user_id)
        .await?;
    Ok(Json(processed.into()))
}

/// Loads a song the caller owns.
fn owned_song(store: &GuardedLibraryStore, session: &Session, song_id: i64) -> Result<Song, AppError> {
    let song = store
        .get_song(song_id)?
        .ok_or_else(|| AppError::not_found("Song not found"))?;
    if song.owner_id != session.user_id {
        return Err(AppError::Forbidden("Song belongs to another user".to_string()));
    }
    Ok(song)
}

fn song_lrc(song: &Song) -> Result<String, AppError> {
    song.lyrics
        .get("lrc")
        .and_then(Value::as_str)
        .filter(|lrc| !lrc.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::not_found("Lyrics not found for this song"))
}

async fn get_lyrics(
    session: Session,
    State(store): State<GuardedLibraryStore>,
    Path(song_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let song = owned_song(&store, &session, song_id)?;
    if song.lyrics.is_null() {
        return Err(AppError::not_found("Lyrics not found for this song"));
    }
    Ok(Json(song.lyrics))
}

async fn rewrite_lyrics(
    session: Session,
    State(state): State<ServerState>,
    Path(song_id): Path<i64>,
    Json(body): Json<RewriteBody>,
) -> Result<Json<Value>, AppError> {
    let prompt = body.prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::validation("prompt must not be empty"));
    }
    let song = owned_song(&state.store, &session, song_id)?;
    let lrc = song_lrc(&song)?;
    let language = song
        .lyrics
        .get("language")
        .and_then(Value::as_str)
        .unwrap_or("the original language");
    let duration = song
        .lyrics
        .get("duration")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    let rewritten = state
        .lyrics_writer
        .rewrite(&lrc, language, duration, prompt)
        .await?;
    let aligned = align_rewritten(&lrc, &rewritten);
    let segments = lrc_segments(&parse_lrc(&aligned));

    let mut lyrics = song.lyrics.clone();
    if let Some(doc) = lyrics.as_object_mut() {
        doc.insert("lrc".to_string(), Value::String(aligned.clone()));
        doc.insert("segments".to_string(), json!(segments));
    }
    state.store.update_song_lyrics(song_id, &lyrics)?;
    info!("Rewrote lyrics of song {}", song_id);

    Ok(Json(json!({
        "song_id": song_id,
        "lrc": aligned,
        "segments": segments,
    })))
}

async fn music_prompt(
    session: Session,
    State(store): State<GuardedLibraryStore>,
    State(writer): State<GuardedLyricsWriter>,
    Path(song_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let song = owned_song(&store, &session, song_id)?;
    let lrc = song_lrc(&song)?;
    let prompt = writer.music_prompt(&lrc).await;
    Ok(Json(json!({ "song_id": song_id, "prompt": prompt })))
}

pub fn process_routes(max_upload_bytes: usize) -> Router<ServerState> {
    Router::new()
        .route("/process_url", post(process_url))
        .route(
            "/process_audio_file",
            post(process_audio_file).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/get-lyrics/{song_id}", get(get_lyrics))
        .route("/rewrite-lyrics/{song_id}", post(rewrite_lyrics))
        .route("/music-prompt/{song_id}", post(music_prompt))
}
