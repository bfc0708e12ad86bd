//! Stemsplit Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod acquisition;
pub mod analysis;
pub mod config;
pub mod converter;
pub mod error;
pub mod library_store;
pub mod llm;
pub mod pipeline;
pub mod separation;
pub mod server;
pub mod sqlite_persistence;
pub mod storage;
pub mod transcription;
pub mod user;

// Re-export commonly used types for convenience
pub use error::AppError;
pub use library_store::{LibraryStore, SqliteLibraryStore};
pub use pipeline::SongPipeline;
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig, ServerState};
