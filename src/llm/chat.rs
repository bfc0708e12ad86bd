//! Music question answering.

use super::provider::{CompletionOptions, LlmError, LlmProvider};
use super::types::Message;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const CHAT_TEMPERATURE: f32 = 0.7;

const SYSTEM_PROMPT: &str = "You are 'Maestro', an expert AI music analyst integrated into a music analysis application. \
Your purpose is to give users deep yet accessible insights into every aspect of music.

## Core Capabilities:
1. Deep Song Analysis: break down a song's structure (verse, chorus, bridge), instrumentation, production and emotional tone.
2. Music Theory Expert: explain and identify BPM, key, mode, time signature, notes, chord progressions, harmony, melody and rhythm.
3. Audio Feature Specialist: explain acousticness, danceability, energy, instrumentalness, liveness and valence.
4. Global Music Encyclopedia: discuss artists, bands and singers from all genres and eras.

## How to Respond:
- Define any musical term in simple words first.
- Describe what high or low values of a parameter mean for the listener.
- Use examples from well-known songs and artists across genres and periods.
- When analyzing, combine several parameters into one coherent explanation.
- Stay concise and on topic. Use bold for key terms.";

pub struct ChatBot {
    provider: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl ChatBot {
    pub fn new(provider: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub async fn ask(&self, question: &str) -> Result<String, LlmError> {
        debug!(model = %self.provider.model(), "Answering chat question");
        let messages = [Message::system(SYSTEM_PROMPT), Message::user(question)];
        let options = CompletionOptions {
            temperature: CHAT_TEMPERATURE,
            timeout: self.timeout,
            ..Default::default()
        };
        let response = self.provider.complete(&messages, &options).await?;
        Ok(response.message.content)
    }
}
