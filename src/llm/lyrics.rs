//! Lyric rewriting and music-prompt generation from LRC lyrics.

use super::provider::{CompletionOptions, LlmError, LlmProvider};
use super::types::{FinishReason, Message};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const REWRITE_MAX_TOKENS: u32 = 2048;
const MUSIC_PROMPT_MAX_TOKENS: u32 = 128;

const MUSIC_PROMPT_SYSTEM: &str = "You are a poetic music producer assistant.

You will be given a set of lyrics in LRC format (timestamped lines). Analyze the lyrical content and turn it into a vivid, emotional and descriptive prompt for an AI music generation model.

The music prompt should reflect:
- The genre or style implied by the lyrics (classical, hip hop, lo-fi, cinematic, electronic, folk...)
- The overall mood or emotion (melancholic, uplifting, suspenseful, romantic, triumphant...)
- Relevant instruments or sound palette (acoustic guitar, synth pads, strings, drums, piano...)
- Any setting or cultural vibe that can be inferred from the lyrics

Write a single paragraph, rich in descriptive language, keeping every important detail.

Generate only the music prompt.";

fn rewrite_system_prompt(language: &str, duration: f64, instruction: &str) -> String {
    format!(
        "You are a creative and poetic songwriting assistant. \
         Rewrite the following song lyrics in LRC format, based on the user's instruction. \
         Keep the timestamps and structure of the LRC file unchanged. \
         Rewrite the lyrics in the same language: {language}. \
         The total song duration is {duration} seconds. \
         Apply the following user instruction to the entire lyrics: {instruction} \
         Only return the new LRC content, do not add any explanation or extra text."
    )
}

pub struct LyricsWriter {
    provider: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl LyricsWriter {
    pub fn new(provider: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    fn options(&self, max_tokens: u32) -> CompletionOptions {
        CompletionOptions {
            temperature: 1.0,
            top_p: Some(1.0),
            max_tokens: Some(max_tokens),
            timeout: self.timeout,
        }
    }

    /// Returns the model's LRC text as-is; aligning it to the original
    /// timestamps is up to the caller.
    pub async fn rewrite(
        &self,
        lrc: &str,
        language: &str,
        duration: f64,
        instruction: &str,
    ) -> Result<String, LlmError> {
        let messages = [
            Message::system(rewrite_system_prompt(language, duration, instruction)),
            Message::user(lrc),
        ];
        let response = self
            .provider
            .complete(&messages, &self.options(REWRITE_MAX_TOKENS))
            .await?;
        if response.finish_reason == FinishReason::MaxTokens {
            warn!("Lyrics rewrite hit the token limit, output may be truncated");
        }
        info!(model = %self.provider.model(), "Rewrote lyrics");
        Ok(response.message.content.trim().to_string())
    }

    /// A single-paragraph description for music generation. Failures yield
    /// an empty string.
    pub async fn music_prompt(&self, lrc: &str) -> String {
        let messages = [Message::system(MUSIC_PROMPT_SYSTEM), Message::user(lrc)];
        match self
            .provider
            .complete(&messages, &self.options(MUSIC_PROMPT_MAX_TOKENS))
            .await
        {
            Ok(response) => response.message.content.trim().to_string(),
            Err(e) => {
                warn!("Failed to generate music prompt: {}", e);
                String::new()
            }
        }
    }
}
