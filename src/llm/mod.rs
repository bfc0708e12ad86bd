//! Text-generation backends and the features built on them.

mod chat;
mod lyrics;
mod openai;
mod provider;
mod types;

pub use chat::ChatBot;
pub use lyrics::LyricsWriter;
pub use openai::OpenAiCompatibleProvider;
pub use provider::{CompletionOptions, LlmError, LlmProvider};
pub use types::{CompletionResponse, FinishReason, Message, MessageRole, TokenUsage};

#[cfg(feature = "mock")]
pub use provider::MockLlmProvider;
