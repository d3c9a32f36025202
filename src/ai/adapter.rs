//! Client for the text-generation adapter service (`POST /v1/chat`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::instrument;

use super::{AiError, ChatPrompt, ContextItem, LanguageModel};

#[derive(Clone)]
pub struct AdapterClient {
    client: reqwest::Client,
    base_url: String,
    max_new_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    system: &'a str,
    user: &'a str,
    context: &'a [ContextItem],
    max_new_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    answer: Option<String>,
}

impl AdapterClient {
    /// `timeout` bounds each request end to end.
    pub fn new(base_url: &str, timeout: Duration, max_new_tokens: u32) -> Result<Self, AiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string(), max_new_tokens })
    }
}

/// The service reports failures as a bare string or as `{error}` / `{detail}`.
fn error_detail(body: &str) -> String {
    let detail = match serde_json::from_str::<Value>(body) {
        Ok(Value::String(s)) => s,
        Ok(Value::Object(map)) => map
            .get("error")
            .or_else(|| map.get("detail"))
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .unwrap_or_default(),
        _ => body.trim().to_string(),
    };
    if detail.trim().is_empty() { "Unknown error from AI service".to_string() } else { detail }
}

#[async_trait]
impl LanguageModel for AdapterClient {
    #[instrument(skip(self, prompt), fields(user_len = prompt.user.len(), context = prompt.context.len()))]
    async fn chat(&self, prompt: &ChatPrompt) -> Result<String, AiError> {
        let request = ChatRequest {
            system: &prompt.system,
            user: &prompt.user,
            context: &prompt.context,
            max_new_tokens: self.max_new_tokens,
            temperature: 0.0,
            top_p: 1.0,
        };
        let response = self.client.post(format!("{}/v1/chat", self.base_url)).json(&request).send().await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Upstream(error_detail(&body)));
        }
        let body: ChatResponse = response.json().await?;
        Ok(body.answer.unwrap_or_default())
    }
}
