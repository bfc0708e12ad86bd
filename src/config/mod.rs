mod file_config;

pub use file_config::{
    AuthConfig, FileConfig, LlmConfig, PipelineConfig, SpotifyConfig, StorageConfig, ToolsConfig,
    TranscriptionConfig,
};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// CLI arguments that can be used for config resolution.
/// Secrets usually reach this struct through environment variables.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub media_dir: Option<PathBuf>,
    pub public_url: Option<String>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub groq_api_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub google_client_id: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub s3_bucket: Option<String>,
    pub aws_region: Option<String>,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,

    // Feature configs (with defaults)
    pub auth: AuthSettings,
    pub storage: StorageSettings,
    pub tools: ToolSettings,
    pub llm: LlmSettings,
    pub transcription: TranscriptionSettings,
    pub spotify: Option<SpotifySettings>,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// `None` means a random per-process secret is generated at startup.
    pub jwt_secret: Option<String>,
    pub token_lifetime_minutes: u64,
    pub google_client_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageSettings {
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>,
        access_key_id: String,
        secret_access_key: String,
    },
    Local {
        dir: PathBuf,
        public_base_url: String,
    },
}

#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub yt_dlp: String,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub spleeter: String,
    pub spleeter_model: String,
    pub cookies_file: Option<PathBuf>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            yt_dlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            spleeter: "spleeter".to_string(),
            spleeter_model: "spleeter:5stems".to_string(),
            cookies_file: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub lyrics_model: String,
    pub chat_timeout_secs: u64,
    pub lyrics_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: GROQ_BASE_URL.to_string(),
            api_key: None,
            chat_model: "llama3-8b-8192".to_string(),
            lyrics_model: "meta-llama/llama-4-scout-17b-16e-instruct".to_string(),
            chat_timeout_secs: 30,
            lyrics_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptionSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            base_url: GROQ_BASE_URL.to_string(),
            api_key: None,
            model: "whisper-large-v3-turbo".to_string(),
            timeout_secs: 120,
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 8000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Upper bound on concurrent stem conversions and uploads.
    pub stem_concurrency: usize,
    /// Number of points every analytics time series is reduced to.
    pub series_points: usize,
    pub mp3_bitrate_kbps: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            stem_concurrency: 5,
            series_points: 150,
            mp3_bitrate_kbps: 192,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let auth_file = file.auth.unwrap_or_default();
        let auth = AuthSettings {
            jwt_secret: auth_file.jwt_secret.or_else(|| cli.jwt_secret.clone()),
            token_lifetime_minutes: auth_file.token_lifetime_minutes.unwrap_or(60 * 24 * 7),
            google_client_id: auth_file
                .google_client_id
                .or_else(|| cli.google_client_id.clone()),
        };
        if auth.token_lifetime_minutes == 0 {
            bail!("auth.token_lifetime_minutes must be greater than zero");
        }

        let storage = resolve_storage(cli, file.storage.unwrap_or_default(), &db_dir, port)?;

        let tools_file = file.tools.unwrap_or_default();
        let tool_defaults = ToolSettings::default();
        let tools = ToolSettings {
            yt_dlp: tools_file.yt_dlp.unwrap_or(tool_defaults.yt_dlp),
            ffmpeg: tools_file.ffmpeg.unwrap_or(tool_defaults.ffmpeg),
            ffprobe: tools_file.ffprobe.unwrap_or(tool_defaults.ffprobe),
            spleeter: tools_file.spleeter.unwrap_or(tool_defaults.spleeter),
            spleeter_model: tools_file
                .spleeter_model
                .unwrap_or(tool_defaults.spleeter_model),
            cookies_file: tools_file.cookies_file.map(PathBuf::from),
        };
        if let Some(cookies) = &tools.cookies_file {
            if !cookies.exists() {
                bail!("Cookies file not found: {:?}", cookies);
            }
        }

        let llm_file = file.llm.unwrap_or_default();
        let llm_defaults = LlmSettings::default();
        let llm = LlmSettings {
            base_url: llm_file.base_url.unwrap_or(llm_defaults.base_url),
            api_key: llm_file.api_key.or_else(|| cli.groq_api_key.clone()),
            chat_model: llm_file.chat_model.unwrap_or(llm_defaults.chat_model),
            lyrics_model: llm_file.lyrics_model.unwrap_or(llm_defaults.lyrics_model),
            chat_timeout_secs: llm_file
                .chat_timeout_secs
                .unwrap_or(llm_defaults.chat_timeout_secs),
            lyrics_timeout_secs: llm_file
                .lyrics_timeout_secs
                .unwrap_or(llm_defaults.lyrics_timeout_secs),
        };
        if llm.base_url == GROQ_BASE_URL && llm.api_key.is_none() {
            bail!("A Groq API key is required: set GROQ_API_KEY or llm.api_key");
        }

        let tr_file = file.transcription.unwrap_or_default();
        let tr_defaults = TranscriptionSettings::default();
        let transcription = TranscriptionSettings {
            base_url: tr_file.base_url.unwrap_or(tr_defaults.base_url),
            api_key: tr_file.api_key.or_else(|| cli.groq_api_key.clone()),
            model: tr_file.model.unwrap_or(tr_defaults.model),
            timeout_secs: tr_file.timeout_secs.unwrap_or(tr_defaults.timeout_secs),
            max_retries: tr_file.max_retries.unwrap_or(tr_defaults.max_retries),
            initial_backoff_ms: tr_file
                .initial_backoff_ms
                .unwrap_or(tr_defaults.initial_backoff_ms),
            max_backoff_ms: tr_file.max_backoff_ms.unwrap_or(tr_defaults.max_backoff_ms),
            backoff_multiplier: tr_file
                .backoff_multiplier
                .unwrap_or(tr_defaults.backoff_multiplier),
        };
        if transcription.backoff_multiplier < 1.0 {
            bail!("transcription.backoff_multiplier must be at least 1.0");
        }
        if transcription.base_url == GROQ_BASE_URL && transcription.api_key.is_none() {
            bail!("A Groq API key is required: set GROQ_API_KEY or transcription.api_key");
        }

        let spotify_file = file.spotify.unwrap_or_default();
        let spotify = match (
            spotify_file
                .client_id
                .or_else(|| cli.spotify_client_id.clone()),
            spotify_file
                .client_secret
                .or_else(|| cli.spotify_client_secret.clone()),
        ) {
            (Some(client_id), Some(client_secret)) => Some(SpotifySettings {
                client_id,
                client_secret,
            }),
            (None, None) => None,
            _ => bail!("Both Spotify client id and client secret must be provided together"),
        };

        let pipeline_file = file.pipeline.unwrap_or_default();
        let pipeline_defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            stem_concurrency: pipeline_file
                .stem_concurrency
                .unwrap_or(pipeline_defaults.stem_concurrency),
            series_points: pipeline_file
                .series_points
                .unwrap_or(pipeline_defaults.series_points),
            mp3_bitrate_kbps: pipeline_file
                .mp3_bitrate_kbps
                .unwrap_or(pipeline_defaults.mp3_bitrate_kbps),
        };
        if !(1..=5).contains(&pipeline.stem_concurrency) {
            bail!(
                "pipeline.stem_concurrency must be between 1 and 5, got {}",
                pipeline.stem_concurrency
            );
        }
        if pipeline.series_points == 0 {
            bail!("pipeline.series_points must be greater than zero");
        }

        Ok(Self {
            db_dir,
            port,
            logging_level,
            auth,
            storage,
            tools,
            llm,
            transcription,
            spotify,
            pipeline,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_dir.join("stemsplit.db")
    }
}

fn resolve_storage(
    cli: &CliConfig,
    file: StorageConfig,
    db_dir: &std::path::Path,
    port: u16,
) -> Result<StorageSettings> {
    let bucket = file.bucket.or_else(|| cli.s3_bucket.clone());
    let backend = file
        .backend
        .unwrap_or_else(|| if bucket.is_some() { "s3" } else { "local" }.to_string());

    match backend.to_lowercase().as_str() {
        "s3" => {
            let Some(bucket) = bucket else {
                bail!("S3 storage requires a bucket name");
            };
            let region = file
                .region
                .or_else(|| cli.aws_region.clone())
                .ok_or_else(|| anyhow::anyhow!("S3 storage requires a region"))?;
            let access_key_id = file
                .access_key_id
                .or_else(|| cli.aws_access_key_id.clone())
                .ok_or_else(|| anyhow::anyhow!("S3 storage requires an access key id"))?;
            let secret_access_key = file
                .secret_access_key
                .or_else(|| cli.aws_secret_access_key.clone())
                .ok_or_else(|| anyhow::anyhow!("S3 storage requires a secret access key"))?;
            Ok(StorageSettings::S3 {
                bucket,
                region,
                endpoint: file.endpoint,
                access_key_id,
                secret_access_key,
            })
        }
        "local" => {
            let dir = file
                .local_dir
                .map(PathBuf::from)
                .or_else(|| cli.media_dir.clone())
                .unwrap_or_else(|| db_dir.join("media"));
            let public_base_url = file
                .public_base_url
                .or_else(|| cli.public_url.clone())
                .unwrap_or_else(|| format!("http://localhost:{}", port));
            Ok(StorageSettings::Local {
                dir,
                public_base_url: public_base_url.trim_end_matches('/').to_string(),
            })
        }
        other => bail!("Unknown storage backend: {}", other),
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
