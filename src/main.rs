use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use std::{fmt::Debug, path::PathBuf};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stemsplit_server::acquisition::{SourceFetcher, SpotifyClient, ToolFetcher, YtDlp};
use stemsplit_server::config::{AppConfig, CliConfig, FileConfig, StorageSettings};
use stemsplit_server::converter::{AudioConverter, FfmpegConverter};
use stemsplit_server::library_store::{LibraryStore, SqliteLibraryStore};
use stemsplit_server::llm::{ChatBot, LlmProvider, LyricsWriter, OpenAiCompatibleProvider};
use stemsplit_server::pipeline::SongPipeline;
use stemsplit_server::separation::SpleeterSeparator;
use stemsplit_server::server::{run_server, RequestsLoggingLevel, ServerConfig, ServerState};
use stemsplit_server::storage::{LocalStorage, ObjectStorage, S3Credentials, S3Storage};
use stemsplit_server::transcription::WhisperTranscriber;
use stemsplit_server::user::{OidcGoogleVerifier, TokenIssuer, UserManager};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the SQLite database.
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Directory for locally stored songs and stems, served under /media.
    #[clap(long, value_parser = parse_path)]
    pub media_dir: Option<PathBuf>,

    /// Public base URL of this server, used to build media URLs.
    #[clap(long)]
    pub public_url: Option<String>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8000)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    #[clap(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub groq_api_key: Option<String>,

    #[clap(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    #[clap(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    #[clap(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub aws_access_key_id: Option<String>,

    #[clap(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub aws_secret_access_key: Option<String>,

    #[clap(long, env = "S3_BUCKET_NAME")]
    pub s3_bucket: Option<String>,

    #[clap(long, env = "AWS_REGION")]
    pub aws_region: Option<String>,

    #[clap(long, env = "SPOTIFY_CLIENT_ID")]
    pub spotify_client_id: Option<String>,

    #[clap(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    pub spotify_client_secret: Option<String>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            media_dir: self.media_dir.clone(),
            public_url: self.public_url.clone(),
            port: self.port,
            logging_level: self.logging_level.clone(),
            groq_api_key: self.groq_api_key.clone(),
            jwt_secret: self.jwt_secret.clone(),
            google_client_id: self.google_client_id.clone(),
            aws_access_key_id: self.aws_access_key_id.clone(),
            aws_secret_access_key: self.aws_secret_access_key.clone(),
            s3_bucket: self.s3_bucket.clone(),
            aws_region: self.aws_region.clone(),
            spotify_client_id: self.spotify_client_id.clone(),
            spotify_client_secret: self.spotify_client_secret.clone(),
        }
    }
}

fn build_storage(config: &AppConfig) -> Result<(Arc<dyn ObjectStorage>, Option<PathBuf>)> {
    match &config.storage {
        StorageSettings::S3 {
            bucket,
            region,
            endpoint,
            access_key_id,
            secret_access_key,
        } => {
            info!("Storing media in S3 bucket {} ({})", bucket, region);
            let storage = S3Storage::new(
                bucket.clone(),
                region.clone(),
                endpoint.clone(),
                S3Credentials {
                    access_key_id: access_key_id.clone(),
                    secret_access_key: secret_access_key.clone(),
                },
            )?;
            Ok((Arc::new(storage), None))
        }
        StorageSettings::Local {
            dir,
            public_base_url,
        } => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Could not create media directory {:?}", dir))?;
            info!("Storing media locally in {:?}", dir);
            let storage = LocalStorage::new(dir.clone(), format!("{}/media", public_base_url));
            Ok((Arc::new(storage), Some(dir.clone())))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Could not initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Opening SQLite database at {:?}...", config.db_path());
    let store: Arc<dyn LibraryStore> = Arc::new(SqliteLibraryStore::new(config.db_path())?);

    let (storage, media_dir) = build_storage(&config)?;

    let converter: Arc<dyn AudioConverter> = Arc::new(FfmpegConverter::new(
        config.tools.ffmpeg.clone(),
        config.tools.ffprobe.clone(),
    ));

    let spotify = match &config.spotify {
        Some(settings) => {
            info!("Spotify links enabled");
            Some(SpotifyClient::new(
                settings.client_id.clone(),
                settings.client_secret.clone(),
            )?)
        }
        None => None,
    };
    let fetcher: Arc<dyn SourceFetcher> = Arc::new(ToolFetcher::new(
        YtDlp::new(config.tools.yt_dlp.clone(), config.tools.cookies_file.clone()),
        spotify,
    ));

    let separator = Arc::new(SpleeterSeparator::new(
        config.tools.spleeter.clone(),
        config.tools.spleeter_model.clone(),
    ));
    let transcriber = Arc::new(WhisperTranscriber::new(
        &config.transcription,
        converter.clone(),
    )?);

    let chat_provider: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatibleProvider::new(
        config.llm.base_url.clone(),
        config.llm.chat_model.clone(),
        config.llm.api_key.clone(),
    ));
    let lyrics_provider: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatibleProvider::new(
        config.llm.base_url.clone(),
        config.llm.lyrics_model.clone(),
        config.llm.api_key.clone(),
    ));
    if let Err(e) = chat_provider.health_check().await {
        warn!("LLM provider at {} is not reachable: {}", config.llm.base_url, e);
    }

    let jwt_secret = match &config.auth.jwt_secret {
        Some(secret) => secret.clone(),
        None => {
            warn!("No JWT secret configured, tokens will not survive a restart");
            TokenIssuer::generate_secret()
        }
    };
    let google = Arc::new(OidcGoogleVerifier::new(config.auth.google_client_id.clone())?);
    let user_manager = UserManager::new(
        store.clone(),
        TokenIssuer::new(&jwt_secret, config.auth.token_lifetime_minutes),
        google,
    );

    let pipeline = SongPipeline::new(
        fetcher,
        storage,
        separator,
        converter,
        transcriber,
        store.clone(),
        config.pipeline.clone(),
    );

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level.clone(),
        port: config.port,
        media_dir,
        ..Default::default()
    };
    let state = ServerState::new(
        server_config,
        store,
        Arc::new(user_manager),
        Arc::new(pipeline),
        Arc::new(LyricsWriter::new(
            lyrics_provider,
            Duration::from_secs(config.llm.lyrics_timeout_secs),
        )),
        Arc::new(ChatBot::new(
            chat_provider,
            Duration::from_secs(config.llm.chat_timeout_secs),
        )),
    );

    info!("Ready to serve at port {}!", config.port);
    run_server(state).await
}
