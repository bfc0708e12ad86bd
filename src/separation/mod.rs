//! Source separation through an external pretrained model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SeparationError {
    #[error("Stem separation failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The eight instrument categories tracked per song.
///
/// Only the first five come out of the separation model. Guitar, flute and
/// violin are derived analytically from the "other" stem and never carry an
/// audio file of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StemKind {
    Vocals,
    Bass,
    Drums,
    Piano,
    Other,
    Guitar,
    Violin,
    Flute,
}

impl StemKind {
    pub const ALL: [StemKind; 8] = [
        StemKind::Vocals,
        StemKind::Bass,
        StemKind::Drums,
        StemKind::Piano,
        StemKind::Other,
        StemKind::Guitar,
        StemKind::Violin,
        StemKind::Flute,
    ];

    /// Stems produced directly by the separation model.
    pub const SEPARATED: [StemKind; 5] = [
        StemKind::Vocals,
        StemKind::Bass,
        StemKind::Drums,
        StemKind::Piano,
        StemKind::Other,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StemKind::Vocals => "vocals",
            StemKind::Bass => "bass",
            StemKind::Drums => "drums",
            StemKind::Piano => "piano",
            StemKind::Other => "other",
            StemKind::Guitar => "guitar",
            StemKind::Violin => "violin",
            StemKind::Flute => "flute",
        }
    }

    /// Prefix of the `<prefix>_audio_url` / `<prefix>_description` columns.
    pub fn column_prefix(&self) -> &'static str {
        match self {
            StemKind::Drums => "drum",
            other => other.name(),
        }
    }

    /// The separated file this category is analyzed from.
    pub fn source_stem(&self) -> StemKind {
        match self {
            StemKind::Guitar | StemKind::Violin | StemKind::Flute => StemKind::Other,
            separated => *separated,
        }
    }

    pub fn source_file_name(&self) -> String {
        format!("{}.wav", self.source_stem().name())
    }

    pub fn has_audio(&self) -> bool {
        self.source_stem() == *self
    }

    /// Parses an instrument name as used in URLs. Accepts both "drums" and
    /// "drum", and "vocal" as an alias of "vocals".
    pub fn parse(value: &str) -> Option<StemKind> {
        match value.to_ascii_lowercase().as_str() {
            "vocals" | "vocal" => Some(StemKind::Vocals),
            "bass" => Some(StemKind::Bass),
            "drums" | "drum" => Some(StemKind::Drums),
            "piano" => Some(StemKind::Piano),
            "other" => Some(StemKind::Other),
            "guitar" => Some(StemKind::Guitar),
            "violin" => Some(StemKind::Violin),
            "flute" => Some(StemKind::Flute),
            _ => None,
        }
    }
}

impl std::fmt::Display for StemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Location of the separated stem files for one input.
#[derive(Debug, Clone)]
pub struct SeparatedStems {
    pub dir: PathBuf,
}

impl SeparatedStems {
    /// Path of the file a category is read from. The file may not exist when
    /// the model produced nothing for it.
    pub fn path_for(&self, kind: StemKind) -> PathBuf {
        self.dir.join(kind.source_file_name())
    }
}

#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait StemSeparator: Send + Sync {
    async fn separate(&self, input: &Path, out_dir: &Path)
        -> Result<SeparatedStems, SeparationError>;
}

/// Runs the `spleeter` CLI with a 5-stem model.
pub struct SpleeterSeparator {
    binary: String,
    model: String,
}

impl SpleeterSeparator {
    pub fn new(binary: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl StemSeparator for SpleeterSeparator {
    async fn separate(
        &self,
        input: &Path,
        out_dir: &Path,
    ) -> Result<SeparatedStems, SeparationError> {
        tokio::fs::create_dir_all(out_dir).await?;
        info!("Separating {:?} with {}", input, self.model);

        let output = Command::new(&self.binary)
            .args(["separate", "-p", &self.model, "-o"])
            .arg(out_dir)
            .arg(input)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SeparationError::Failed(stderr.trim().to_string()));
        }

        let input_stem = input
            .file_stem()
            .ok_or_else(|| SeparationError::Failed(format!("Invalid input path {:?}", input)))?;
        let dir = out_dir.join(input_stem);
        debug!("Stems written to {:?}", dir);
        Ok(SeparatedStems { dir })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_stems_read_from_other() {
        assert_eq!(StemKind::Guitar.source_file_name(), "other.wav");
        assert_eq!(StemKind::Flute.source_stem(), StemKind::Other);
        assert_eq!(StemKind::Drums.source_file_name(), "drums.wav");
        assert!(!StemKind::Violin.has_audio());
        assert!(StemKind::Vocals.has_audio());
        assert_eq!(
            StemKind::ALL.iter().filter(|k| k.has_audio()).count(),
            StemKind::SEPARATED.len()
        );
    }

    #[test]
    fn drum_columns_use_singular_prefix() {
        assert_eq!(StemKind::Drums.column_prefix(), "drum");
        assert_eq!(StemKind::Bass.column_prefix(), "bass");
    }

    #[test]
    fn parses_url_instrument_names() {
        assert_eq!(StemKind::parse("drum"), Some(StemKind::Drums));
        assert_eq!(StemKind::parse("Drums"), Some(StemKind::Drums));
        assert_eq!(StemKind::parse("vocal"), Some(StemKind::Vocals));
        assert_eq!(StemKind::parse("kazoo"), None);
    }

    #[test]
    fn separated_paths_live_under_input_stem() {
        let stems = SeparatedStems {
            dir: PathBuf::from("/tmp/out/my_song"),
        };
        assert_eq!(
            stems.path_for(StemKind::Guitar),
            PathBuf::from("/tmp/out/my_song/other.wav")
        );
    }

    #[tokio::test]
    async fn missing_binary_is_an_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let separator = SpleeterSeparator::new("/nonexistent/spleeter-bin", "spleeter:5stems");
        let result = separator
            .separate(&dir.path().join("in.mp3"), &dir.path().join("out"))
            .await;
        assert!(matches!(result, Err(SeparationError::Io(_))));
    }
}
