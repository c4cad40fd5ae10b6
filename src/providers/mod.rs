//! External collaborators behind small enum-dispatched adapters: the text
//! model that classifies and answers intern commands, the TTS voice, blob
//! storage, the chunk task queue, and the SFX asset store. Each has an
//! offline variant so the pipeline runs end-to-end without network access.

mod anthropic;
mod openai_tts;
pub mod queue;
pub mod store;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::audio::AudioClip;

pub use queue::ChunkQueue;
pub use store::{AudioStore, SfxStore};

/// What a classified intern command should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentAction {
    GenerateAudio,
    AddToShownotes,
}

#[derive(Debug, Clone)]
pub enum AnswerProvider {
    Anthropic { api_key: String, model: String },
    /// Offline: every question gets the same answer, classification always
    /// picks the spoken insert.
    Fixed { answer: String },
}

impl AnswerProvider {
    pub fn anthropic_from_env() -> Option<Self> {
        env_api_key("ANTHROPIC_API_KEY").map(|api_key| AnswerProvider::Anthropic {
            api_key,
            model: "claude-sonnet-4-5-20250929".to_string(),
        })
    }

    /// Decide whether the captured context wants a spoken insert or a show
    /// note. Callers fall back to a default on error.
    pub async fn classify(&self, context: &str) -> Result<IntentAction> {
        match self {
            AnswerProvider::Anthropic { api_key, model } => {
                anthropic::classify(api_key, model, context).await
            }
            AnswerProvider::Fixed { .. } => Ok(IntentAction::GenerateAudio),
        }
    }

    /// Answer the captured context. Callers substitute a fixed fallback
    /// phrase on error; this method never needs to.
    pub async fn answer(&self, context: &str) -> Result<String> {
        match self {
            AnswerProvider::Anthropic { api_key, model } => {
                anthropic::answer(api_key, model, context).await
            }
            AnswerProvider::Fixed { answer } => Ok(answer.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TtsProvider {
    OpenAi { api_key: String, voice: String },
    /// Offline: renders a fixed-length silent placeholder per word.
    Silence { sample_rate: u32 },
}

impl TtsProvider {
    pub fn openai_from_env() -> Option<Self> {
        env_api_key("OPENAI_API_KEY").map(|api_key| TtsProvider::OpenAi {
            api_key,
            voice: "alloy".to_string(),
        })
    }

    pub async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        match self {
            TtsProvider::OpenAi { api_key, voice } => {
                openai_tts::synthesize(api_key, voice, text).await
            }
            TtsProvider::Silence { sample_rate } => {
                // Roughly 0.3 s per word keeps placeholder timing plausible.
                let words = text.split_whitespace().count().max(1);
                Ok(AudioClip::silence(words as f64 * 0.3, *sample_rate))
            }
        }
    }
}

/// Read an API key from the environment, tolerating quoted values.
fn env_api_key(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|k| k.trim().trim_matches('"').to_string())
        .filter(|k| !k.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_provider_answers_and_classifies() {
        let provider = AnswerProvider::Fixed { answer: "forty-two".into() };
        assert_eq!(provider.answer("anything").await.unwrap(), "forty-two");
        assert_eq!(provider.classify("anything").await.unwrap(), IntentAction::GenerateAudio);
    }

    #[tokio::test]
    async fn silence_tts_scales_with_word_count() {
        let tts = TtsProvider::Silence { sample_rate: 1000 };
        let clip = tts.synthesize("one two three").await.unwrap();
        assert_eq!(clip.samples.len(), 900);
    }
}
