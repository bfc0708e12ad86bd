use axum::extract::FromRef;

use crate::library_store::LibraryStore;
use crate::llm::{ChatBot, LyricsWriter};
use crate::pipeline::SongPipeline;
use crate::user::UserManager;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedLibraryStore = Arc<dyn LibraryStore>;
pub type GuardedUserManager = Arc<UserManager>;
pub type GuardedPipeline = Arc<SongPipeline>;
pub type GuardedLyricsWriter = Arc<LyricsWriter>;
pub type GuardedChatBot = Arc<ChatBot>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub hash: String,
    pub store: GuardedLibraryStore,
    pub user_manager: GuardedUserManager,
    pub pipeline: GuardedPipeline,
    pub lyrics_writer: GuardedLyricsWriter,
    pub chat_bot: GuardedChatBot,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        store: GuardedLibraryStore,
        user_manager: GuardedUserManager,
        pipeline: GuardedPipeline,
        lyrics_writer: GuardedLyricsWriter,
        chat_bot: GuardedChatBot,
    ) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            hash: env!("GIT_HASH").to_string(),
            store,
            user_manager,
            pipeline,
            lyrics_writer,
            chat_bot,
        }
    }
}

impl FromRef<ServerState> for GuardedLibraryStore {
    fn from_ref(input: &ServerState) -> Self {
        input.store.clone()
    }
}

impl FromRef<ServerState> for GuardedUserManager {
    fn from_ref(input: &ServerState) -> Self {
        input.user_manager.clone()
    }
}

impl FromRef<ServerState> for GuardedPipeline {
    fn from_ref(input: &ServerState) -> Self {
        input.pipeline.clone()
    }
}

impl FromRef<ServerState> for GuardedLyricsWriter {
    fn from_ref(input: &ServerState) -> Self {
        input.lyrics_writer.clone()
    }
}

impl FromRef<ServerState> for GuardedChatBot {
    fn from_ref(input: &ServerState) -> Self {
        input.chat_bot.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
