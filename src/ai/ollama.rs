//! Ollama client: `/api/embeddings` for vectors, `/api/chat` for answers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{AiError, ChatPrompt, Embedder, LanguageModel};

#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    chat_model: String,
    embed_model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, chat_model: &str, embed_model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_model: chat_model.to_string(),
            embed_model: embed_model.to_string(),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, AiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AiError::Upstream(format!("Ollama error ({status}): {body}")))
    }
}

/// System prompt first, then the context as a second system message.
fn messages(prompt: &ChatPrompt) -> Vec<Message> {
    let mut messages = Vec::new();
    if !prompt.system.is_empty() {
        messages.push(Message { role: "system", content: prompt.system.clone() });
    }
    if !prompt.context.is_empty() {
        let snippets: Vec<String> = prompt
            .context
            .iter()
            .enumerate()
            .map(|(i, c)| format!("#{} {}\n{}", i + 1, c.title, c.text))
            .collect();
        messages.push(Message {
            role: "system",
            content: format!(
                "You are a helpful e-commerce assistant. Use ONLY the context below to answer. If not found, say you don't know.\n\n{}",
                snippets.join("\n\n")
            ),
        });
    }
    messages.push(Message { role: "user", content: prompt.user.clone() });
    messages
}

#[async_trait]
impl Embedder for OllamaClient {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&EmbeddingRequest { model: &self.embed_model, prompt: text })
            .send()
            .await?;
        let body: EmbeddingResponse = Self::check(response).await?.json().await?;
        if body.embedding.is_empty() {
            return Err(AiError::InvalidResponse("empty embedding".into()));
        }
        Ok(body.embedding)
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    #[instrument(skip(self, prompt), fields(model = %self.chat_model))]
    async fn chat(&self, prompt: &ChatPrompt) -> Result<String, AiError> {
        let request = ChatRequest { model: &self.chat_model, messages: messages(prompt), stream: false };
        let response = self.client.post(format!("{}/api/chat", self.base_url)).json(&request).send().await?;
        let body: ChatResponse = Self::check(response).await?.json().await?;
        Ok(body.message.map(|m| m.content).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ContextItem;

    #[test]
    fn test_context_becomes_system_message() {
        let prompt = ChatPrompt {
            system: "Be brief.".into(),
            user: "Do you ship abroad?".into(),
            context: vec![ContextItem { title: "Shipping".into(), text: "Domestic only.".into() }],
        };
        let msgs = messages(&prompt);
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].content, "Be brief.");
        assert!(msgs[1].content.ends_with("#1 Shipping\nDomestic only."));
        assert_eq!(msgs[2].role, "user");

        let bare = messages(&ChatPrompt { user: "hi".into(), ..Default::default() });
        assert_eq!(bare, vec![Message { role: "user", content: "hi".into() }]);
    }
}
