//! OpenAI speech synthesis adapter.

use anyhow::{bail, Context, Result};

use crate::audio::AudioClip;

const API_URL: &str = "https://api.openai.com/v1/audio/speech";

pub async fn synthesize(api_key: &str, voice: &str, text: &str) -> Result<AudioClip> {
    let body = serde_json::json!({
        "model": "tts-1",
        "voice": voice,
        "input": text,
        "response_format": "wav"
    });

    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(30))
        .timeout(std::time::Duration::from_secs(120))
        .build()?;

    let response = client
        .post(API_URL)
        .header("Authorization", format!("Bearer {}", api_key))
        .json(&body)
        .send()
        .await
        .context("Failed to send request to OpenAI speech API")?;

    let status = response.status();
    if !status.is_success() {
        let error_body = response.text().await.unwrap_or_default();
        bail!("OpenAI speech API error ({}): {}", status, error_body);
    }

    let bytes = response
        .bytes()
        .await
        .context("Failed to read OpenAI speech response body")?;

    AudioClip::from_wav_bytes(&bytes).context("Failed to decode synthesized speech")
}
