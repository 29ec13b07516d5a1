//! Per-chunk summaries via an OpenAI-compatible chat endpoint.
//!
//! When the endpoint is unconfigured or a request fails, callers fall back
//! to a prefix summary so the pipeline never stalls on the summarizer.

use crate::config::CrawlConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Capability for generating one-sentence chunk summaries.
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String>;
}

/// Chat-completions backed provider.
pub struct ChatSummaryProvider {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl ChatSummaryProvider {
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        let api_key = config
            .summary_api_key
            .clone()
            .ok_or_else(|| Error::Config("SUMMARY_API_KEY is not set".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key,
            api_base: config.summary_api_base.clone(),
            model: config.summary_model.clone(),
        })
    }
}

#[async_trait]
impl SummaryProvider for ChatSummaryProvider {
    async fn summarize(&self, text: &str) -> Result<String> {
        // Cap the excerpt so huge chunks do not blow the prompt budget
        let excerpt: String = text.chars().take(1500).collect();
        let prompt = format!(
            "Summarize the following content in one concise sentence. \
             Focus on what it describes or does.\n\n{}\n\nSummary:",
            excerpt
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    {
                        "role": "system",
                        "content": "You are a documentation assistant. Provide concise, technical summaries.",
                    },
                    { "role": "user", "content": prompt },
                ],
                "max_tokens": 100,
                "temperature": 0.3,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Summary(format!("summary endpoint returned {}", status)));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| Error::Summary("empty completion".to_string()))?;

        Ok(content.to_string())
    }
}

/// Prefix fallback used whenever the provider is unavailable or errors.
pub fn fallback_summary(text: &str) -> String {
    let prefix: String = text.chars().take(100).collect();
    if text.chars().count() > 100 {
        format!("{}...", prefix)
    } else {
        prefix
    }
}
