use super::RequestsLoggingLevel;
use std::path::PathBuf;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Served under `/media` when blobs are kept on local disk.
    pub media_dir: Option<PathBuf>,
    /// Body limit of the audio upload route.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 8000,
            media_dir: None,
            max_upload_bytes: 200 * 1024 * 1024,
        }
    }
}
