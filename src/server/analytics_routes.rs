//! Read-only access to stored songs and stem results.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde_json::Value;

use crate::error::AppError;
use crate::library_store::Song;
use crate::separation::StemKind;
use crate::server::state::{GuardedLibraryStore, ServerState};

const SPLITS_NOT_FOUND: &str = "Splits for this song not found";

async fn get_song(
    State(store): State<GuardedLibraryStore>,
    Path(song_id): Path<i64>,
) -> Result<Json<Song>, AppError> {
    store
        .get_song(song_id)?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Song not found"))
}

async fn get_split(
    State(store): State<GuardedLibraryStore>,
    Path(song_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    store
        .get_split_by_song_id(song_id)?
        .map(|split| Json(split.to_json()))
        .ok_or_else(|| AppError::not_found(SPLITS_NOT_FOUND))
}

async fn get_stem(
    State(store): State<GuardedLibraryStore>,
    Path((instrument, song_id)): Path<(String, i64)>,
) -> Result<Json<Value>, AppError> {
    let kind = StemKind::parse(&instrument)
        .ok_or_else(|| AppError::validation(format!("Unknown instrument: {}", instrument)))?;
    store
        .get_stem_info(song_id, kind)?
        .map(|info| Json(info.to_json()))
        .ok_or_else(|| AppError::not_found(SPLITS_NOT_FOUND))
}

pub fn analytics_routes() -> Router<ServerState> {
    Router::new()
        .route("/songs/{song_id}", get(get_song))
        .route("/splits/{song_id}", get(get_split))
        .route("/splits/{instrument}/{song_id}", get(get_stem))
}
