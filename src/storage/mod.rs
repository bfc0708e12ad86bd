//! Durable blob storage for original songs and stems.

mod local;
mod s3;

pub use local::LocalStorage;
pub use s3::{S3Credentials, S3Storage};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage request failed: {0}")]
    Request(String),

    #[error("Storage rejected upload with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl StorageError {
    /// Server-side and transport failures may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Io(_) => false,
            StorageError::Request(_) => true,
            StorageError::Rejected { status, .. } => *status >= 500,
        }
    }
}

#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores the file under `key` and returns its public URL.
    async fn upload(&self, local_path: &Path, key: &str) -> Result<String, StorageError>;
}

/// Key of an original upload: `songs/original_song/<uuid><ext>`.
pub fn original_song_key(local_path: &Path) -> String {
    let extension = local_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    format!("songs/original_song/{}{}", uuid::Uuid::new_v4(), extension)
}

pub fn stem_key(song_id: i64, stem_name: &str) -> String {
    format!("songs/stems/{}/{}.mp3", song_id, stem_name)
}

pub(crate) fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("ogg") => "audio/ogg",
        Some("m4a") | Some("mp4") => "audio/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn original_keys_are_unique_and_keep_extension() {
        let a = original_song_key(Path::new("/tmp/x/My Song.mp3"));
        let b = original_song_key(Path::new("/tmp/x/My Song.mp3"));
        assert!(a.starts_with("songs/original_song/"));
        assert!(a.ends_with(".mp3"));
        assert_ne!(a, b);
        assert_eq!(a.len(), "songs/original_song/".len() + 36 + 4);
    }

    #[test]
    fn stem_keys_are_per_song() {
        assert_eq!(stem_key(7, "vocals"), "songs/stems/7/vocals.mp3");
    }

    #[test]
    fn retryability_follows_status() {
        assert!(StorageError::Rejected {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!StorageError::Rejected {
            status: 403,
            body: String::new()
        }
        .is_retryable());
    }
}
