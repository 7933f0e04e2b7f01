use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::provider::{LlmProvider, TokenStream};
use super::stream::{spawn_token_stream, StreamEvent};
use super::types::ChatRequest;
use crate::core::errors::RagError;
use crate::embedding::Embedder;

/// Client for a local Ollama daemon, used both for chat and embeddings.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: Client,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client: Client::new(),
        }
    }

    fn chat_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut options = Map::new();
        if let Some(t) = request.temperature {
            options.insert("temperature".to_string(), json!(t));
        }
        if let Some(n) = request.max_tokens {
            options.insert("num_predict".to_string(), json!(n));
        }
        if let Some(stop) = &request.stop {
            options.insert("stop".to_string(), json!(stop));
        }

        json!({
            "model": self.model,
            "messages": request.messages,
            "stream": stream,
            "options": options,
        })
    }

    async fn post_chat(&self, request: &ChatRequest, stream: bool) -> Result<reqwest::Response, RagError> {
        let url = format!("{}/api/chat", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&self.chat_body(request, stream))
            .send()
            .await
            .map_err(|e| RagError::Llm(format!("Ollama unreachable at {}: {}", self.base_url, e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Llm(format!("Ollama chat error ({}): {}", status, text)));
        }
        Ok(res)
    }
}

/// Decodes one NDJSON line of `/api/chat` output.
pub fn parse_chat_line(line: &str) -> Result<StreamEvent, RagError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| RagError::Llm(format!("malformed Ollama stream line: {}", e)))?;

    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(RagError::Llm(format!("Ollama: {}", error)));
    }

    let content = value["message"]["content"].as_str().unwrap_or_default();
    if !content.is_empty() {
        return Ok(StreamEvent::Token(content.to_string()));
    }
    if value["done"].as_bool().unwrap_or(false) {
        return Ok(StreamEvent::Done);
    }
    Ok(StreamEvent::Skip)
}

#[async_trait]
impl LlmProvider for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool, RagError> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, RagError> {
        let res = self.post_chat(&request, false).await?;
        let payload: Value = res.json().await.map_err(RagError::llm)?;

        Ok(payload["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream, RagError> {
        let res = self.post_chat(&request, true).await?;
        Ok(spawn_token_stream(res, parse_chat_line))
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    fn model_id(&self) -> String {
        format!("ollama:{}", self.model)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                RagError::EmbeddingServiceUnavailable(format!(
                    "Ollama unreachable at {}: {}",
                    self.base_url, e
                ))
            })?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingServiceUnavailable(format!(
                "Ollama embed error ({}): {}",
                status, text
            )));
        }

        let payload: OllamaEmbedResponse = res.json().await.map_err(RagError::embedding)?;
        Ok(payload.embeddings)
    }
}
