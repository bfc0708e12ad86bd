//! Turning a song reference into a local audio file.

mod spotify;
mod ytdlp;

pub use spotify::{track_id_from_url, SpotifyClient};
pub use ytdlp::YtDlp;

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("yt-dlp download failed: {0}")]
    Tool(String),

    #[error("Could not resolve source: {0}")]
    Resolve(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("Downloaded file not found: {0:?}")]
    Missing(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    fn tool(stderr: &[u8]) -> Self {
        FetchError::Tool(String::from_utf8_lossy(stderr).trim().to_string())
    }
}

/// Where the audio of a processing request comes from.
#[derive(Debug, Clone)]
pub enum Source {
    Url(String),
    Upload { file_name: String, bytes: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlKind {
    /// A video-hosting page, downloaded directly.
    Video,
    /// A streaming-service track, resolved to a video search first.
    SpotifyTrack,
}

/// Classifies a link by host. Returns None for hosts we cannot fetch from.
pub fn classify_url(url: &str) -> Option<UrlKind> {
    let parsed = reqwest::Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    match host {
        "youtube.com" | "m.youtube.com" | "music.youtube.com" | "youtu.be" => Some(UrlKind::Video),
        "open.spotify.com" if parsed.path().starts_with("/track/") => Some(UrlKind::SpotifyTrack),
        _ => None,
    }
}

/// Removes characters that are not allowed in file names and trims.
pub fn sanitize_file_name(name: &str) -> String {
    static FORBIDDEN: OnceLock<Regex> = OnceLock::new();
    let forbidden = FORBIDDEN.get_or_init(|| Regex::new(r#"[\\/*?:"<>|]"#).expect("valid regex"));
    forbidden.replace_all(name, "").trim().to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedAudio {
    pub path: PathBuf,
    pub title: String,
}

#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Materializes `source` as an audio file inside `dir`.
    async fn fetch(&self, source: &Source, dir: &Path) -> Result<FetchedAudio, FetchError>;
}

/// Fetches links with yt-dlp (resolving Spotify tracks through the Web API)
/// and writes uploads to disk.
pub struct ToolFetcher {
    ytdlp: YtDlp,
    spotify: Option<SpotifyClient>,
}

impl ToolFetcher {
    pub fn new(ytdlp: YtDlp, spotify: Option<SpotifyClient>) -> Self {
        Self { ytdlp, spotify }
    }
}

#[async_trait]
impl SourceFetcher for ToolFetcher {
    async fn fetch(&self, source: &Source, dir: &Path) -> Result<FetchedAudio, FetchError> {
        match source {
            Source::Url(url) => match classify_url(url) {
                Some(UrlKind::Video) => self.ytdlp.fetch(url, "youtube_audio", dir).await,
                Some(UrlKind::SpotifyTrack) => {
                    let spotify = self.spotify.as_ref().ok_or_else(|| {
                        FetchError::Unsupported("Spotify links are not enabled".to_string())
                    })?;
                    let query = spotify.search_query(url).await?;
                    info!("Resolved Spotify link {} to '{}'", url, query);
                    self.ytdlp
                        .fetch(&format!("ytsearch1:{}", query), "spotify_audio", dir)
                        .await
                }
                None => Err(FetchError::Unsupported(format!("Unsupported URL: {}", url))),
            },
            Source::Upload { file_name, bytes } => write_upload(file_name, bytes, dir).await,
        }
    }
}

/// Writes an uploaded file into `dir` after checking its content is audio.
pub async fn write_upload(
    file_name: &str,
    bytes: &[u8],
    dir: &Path,
) -> Result<FetchedAudio, FetchError> {
    let kind = infer::get(bytes).ok_or_else(|| {
        FetchError::Unsupported("Uploaded file is not a recognized audio file".to_string())
    })?;
    if !matches!(
        kind.matcher_type(),
        infer::MatcherType::Audio | infer::MatcherType::Video
    ) {
        return Err(FetchError::Unsupported(format!(
            "Uploaded file is not audio ({})",
            kind.mime_type()
        )));
    }

    let sanitized = sanitize_file_name(file_name);
    let path_name = Path::new(&sanitized);
    let stem = path_name
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "upload".to_string());
    let extension = path_name
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| kind.extension().to_string());

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.{}", stem, extension));
    tokio::fs::write(&path, bytes).await?;
    info!("Stored upload {} ({} bytes)", path.display(), bytes.len());
    Ok(FetchedAudio { path, title: stem })
}
