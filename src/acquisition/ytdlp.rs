//! Thin wrapper around the `yt-dlp` CLI.

use super::{sanitize_file_name, FetchError, FetchedAudio};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct VideoInfo {
    title: Option<String>,
}

pub struct YtDlp {
    binary: String,
    cookies_file: Option<PathBuf>,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>, cookies_file: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cookies_file,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        if let Some(cookies) = &self.cookies_file {
            command.arg("--cookies").arg(cookies);
        }
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        command
    }

    /// Returns the sanitized title of the first entry `target` resolves to.
    pub async fn title(&self, target: &str, default_title: &str) -> Result<String, FetchError> {
        let output = self
            .command()
            .args(["--dump-single-json", target])
            .output()
            .await?;
        if !output.status.success() {
            return Err(FetchError::tool(&output.stderr));
        }

        let info: VideoInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| FetchError::Resolve(format!("Unreadable yt-dlp metadata: {}", e)))?;
        // Search targets wrap the match in a playlist; its title is the query.
        let title = info.title.unwrap_or_default();
        let sanitized = sanitize_file_name(&title);
        Ok(if sanitized.is_empty() {
            default_title.to_string()
        } else {
            sanitized
        })
    }

    /// Extracts the best audio of `target` as `<dir>/<title>.mp3`.
    pub async fn download_mp3(
        &self,
        target: &str,
        title: &str,
        dir: &Path,
    ) -> Result<FetchedAudio, FetchError> {
        tokio::fs::create_dir_all(dir).await?;
        let template = dir.join(format!("{}.%(ext)s", title));
        let final_path = dir.join(format!("{}.mp3", title));
        info!("Downloading {} as {:?}", target, final_path);

        let output = self
            .command()
            .args(["-x", "--audio-format", "mp3", "--audio-quality", "0", "-o"])
            .arg(&template)
            .arg(target)
            .output()
            .await?;
        if !output.status.success() {
            return Err(FetchError::tool(&output.stderr));
        }

        if !tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
            return Err(FetchError::Missing(final_path));
        }
        debug!("Download finished: {:?}", final_path);
        Ok(FetchedAudio {
            path: final_path,
            title: title.to_string(),
        })
    }

    pub async fn fetch(
        &self,
        target: &str,
        default_title: &str,
        dir: &Path,
    ) -> Result<FetchedAudio, FetchError> {
        let title = self.title(target, default_title).await?;
        self.download_mp3(target, &title, dir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_surfaces_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let ytdlp = YtDlp::new("/nonexistent/yt-dlp", None);
        let result = ytdlp
            .fetch("https://youtu.be/abc", "youtube_audio", dir.path())
            .await;
        assert!(matches!(result, Err(FetchError::Io(_))));
    }
}
