//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own database, storage
//! recorder and mock LLM.

use super::constants::*;
use super::fixtures::{
    spawn_mock_llm, CannedTranscriber, CopyConverter, RecordingStorage, SeenRequests,
    SyntheticFetcher, ToneSeparator,
};
use axum::http::StatusCode;
use stemsplit_server::config::PipelineSettings;
use stemsplit_server::library_store::{LibraryStore, SqliteLibraryStore};
use stemsplit_server::llm::{ChatBot, LlmProvider, LyricsWriter, OpenAiCompatibleProvider};
use stemsplit_server::pipeline::SongPipeline;
use stemsplit_server::server::{make_app, RequestsLoggingLevel, ServerConfig, ServerState};
use stemsplit_server::user::{OidcGoogleVerifier, TokenIssuer, UserManager};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Knobs for the collaborators behind a test server.
pub struct TestServerOptions {
    pub llm_status: StatusCode,
    pub llm_reply: String,
    pub separation_fails: bool,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            llm_status: StatusCode::OK,
            llm_reply: LLM_REPLY.to_string(),
            separation_fails: false,
        }
    }
}

/// Test server instance with isolated database and collaborators
///
/// When dropped, the server and mock LLM shut down and temp resources are
/// cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Store for direct database access in tests
    pub store: Arc<dyn LibraryStore>,

    /// Every key the pipeline uploaded
    pub storage: Arc<RecordingStorage>,

    /// Every request body the mock LLM received
    pub llm_requests: SeenRequests,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    _llm_shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port with default collaborators
    pub async fn spawn() -> Self {
        Self::spawn_with(TestServerOptions::default()).await
    }

    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if the database cannot be created, the port cannot be bound,
    /// or the server doesn't become ready within the timeout.
    pub async fn spawn_with(options: TestServerOptions) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store: Arc<dyn LibraryStore> = Arc::new(
            SqliteLibraryStore::new(temp_dir.path().join("stemsplit.db"))
                .expect("Failed to open library store"),
        );

        let (llm_url, llm_requests, llm_shutdown_tx) =
            spawn_mock_llm(options.llm_status, options.llm_reply).await;
        let chat_provider: Arc<dyn LlmProvider> =
            Arc::new(OpenAiCompatibleProvider::new(llm_url.clone(), "chat-model", None));
        let lyrics_provider: Arc<dyn LlmProvider> =
            Arc::new(OpenAiCompatibleProvider::new(llm_url, "lyrics-model", None));

        let storage = Arc::new(RecordingStorage::default());
        let pipeline = SongPipeline::new(
            Arc::new(SyntheticFetcher),
            storage.clone(),
            Arc::new(ToneSeparator {
                fail: options.separation_fails,
            }),
            Arc::new(CopyConverter),
            Arc::new(CannedTranscriber),
            store.clone(),
            PipelineSettings {
                series_points: 20,
                ..Default::default()
            },
        );

        let user_manager = UserManager::new(
            store.clone(),
            TokenIssuer::new("e2e-test-secret", 60),
            Arc::new(OidcGoogleVerifier::new(None).expect("Failed to build Google verifier")),
        );

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            ..Default::default()
        };
        let state = ServerState::new(
            config,
            store.clone(),
            Arc::new(user_manager),
            Arc::new(pipeline),
            Arc::new(LyricsWriter::new(lyrics_provider, Duration::from_secs(10))),
            Arc::new(ChatBot::new(chat_provider, Duration::from_secs(10))),
        );
        let app = make_app(state);

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            store,
            storage,
            llm_requests,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
            _llm_shutdown_tx: Some(llm_shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the root endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }

    /// Number of chat completion requests the mock LLM has served
    pub fn llm_request_count(&self) -> usize {
        self.llm_requests.lock().unwrap().len()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(tx) = self._llm_shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
