//! Anthropic Messages API adapter for intent classification and answer
//! generation.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

use super::IntentAction;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Unknown,
}

async fn call(api_key: &str, model: &str, system: &str, user: &str, max_tokens: u32) -> Result<String> {
    let body = serde_json::json!({
        "model": model,
        "max_tokens": max_tokens,
        "system": system,
        "messages": [{"role": "user", "content": user}]
    });

    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(30))
        .timeout(std::time::Duration::from_secs(120))
        .build()?;

    let response = client
        .post(API_URL)
        .header("x-api-key", api_key)
        .header("anthropic-version", API_VERSION)
        .header("content-type", "application/json")
        .json(&body)
        .send()
        .await
        .context("Failed to send request to Anthropic API")?;

    let status = response.status();
    if !status.is_success() {
        let error_body = response.text().await.unwrap_or_default();
        bail!("Anthropic API error ({}): {}", status, error_body);
    }

    let parsed: MessagesResponse = response
        .json()
        .await
        .context("Failed to parse Anthropic API response")?;

    let text = parsed
        .content
        .iter()
        .find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.trim().to_string()),
            ContentBlock::Unknown => None,
        })
        .filter(|t| !t.is_empty())
        .context("Anthropic response contained no text")?;

    Ok(text)
}

pub async fn classify(api_key: &str, model: &str, context: &str) -> Result<IntentAction> {
    let system = "You route podcast host requests. Reply with exactly one word: \
                  AUDIO if the host wants a spoken answer inserted into the episode, \
                  SHOWNOTES if the host wants the item written into the show notes.";
    let reply = call(api_key, model, system, context, 16).await?;
    debug!("intent classification: {}", reply);

    let upper = reply.to_uppercase();
    if upper.contains("SHOWNOTE") {
        Ok(IntentAction::AddToShownotes)
    } else if upper.contains("AUDIO") {
        Ok(IntentAction::GenerateAudio)
    } else {
        bail!("Unrecognized intent reply: {}", reply)
    }
}

pub async fn answer(api_key: &str, model: &str, context: &str) -> Result<String> {
    let system = "You are a podcast co-host's research intern. The host just asked \
                  you a question on air. Answer it in one to three spoken sentences, \
                  suitable for reading aloud. Do not repeat the question.";
    call(api_key, model, system, context, 512).await
}
