use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};

use super::provider::{LlmProvider, TokenStream};
use super::stream::{spawn_token_stream, sse_data, StreamEvent};
use super::types::ChatRequest;
use crate::core::errors::RagError;
use crate::embedding::Embedder;

/// Any server speaking the OpenAI `/v1` dialect: LM Studio, vLLM, a hosted
/// endpoint behind an API key.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: String, model: String, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client: Client::new(),
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn chat_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": stream,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
            if let Some(s) = &request.stop {
                obj.insert("stop".to_string(), json!(s));
            }
        }
        body
    }

    async fn post_chat(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, RagError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let res = self
            .authorized(self.client.post(&url))
            .json(&self.chat_body(request, stream))
            .send()
            .await
            .map_err(|e| RagError::Llm(format!("{} unreachable: {}", self.base_url, e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Llm(format!("chat error ({}): {}", status, text)));
        }
        Ok(res)
    }
}

/// Decodes one SSE line of a streamed chat completion.
pub fn parse_sse_line(line: &str) -> Result<StreamEvent, RagError> {
    let Some(data) = sse_data(line) else {
        return Ok(StreamEvent::Skip);
    };
    if data == "[DONE]" {
        return Ok(StreamEvent::Done);
    }

    let value: Value = serde_json::from_str(data)
        .map_err(|e| RagError::Llm(format!("malformed completion chunk: {}", e)))?;
    if let Some(message) = value["error"]["message"].as_str() {
        return Err(RagError::Llm(message.to_string()));
    }

    match value["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => Ok(StreamEvent::Token(content.to_string())),
        _ => Ok(StreamEvent::Skip),
    }
}

fn order_embeddings(mut items: Vec<EmbeddingItem>) -> Vec<Vec<f32>> {
    items.sort_by_key(|item| item.index);
    items.into_iter().map(|item| item.embedding).collect()
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        "openai_compatible"
    }

    async fn health_check(&self) -> Result<bool, RagError> {
        let url = format!("{}/v1/models", self.base_url);
        match self.authorized(self.client.get(&url)).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, RagError> {
        let res = self.post_chat(&request, false).await?;
        let payload: Value = res.json().await.map_err(RagError::llm)?;

        Ok(payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream, RagError> {
        let res = self.post_chat(&request, true).await?;
        Ok(spawn_token_stream(res, parse_sse_line))
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleClient {
    fn model_id(&self) -> String {
        format!("openai:{}", self.model)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let res = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                RagError::EmbeddingServiceUnavailable(format!(
                    "{} unreachable: {}",
                    self.base_url, e
                ))
            })?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingServiceUnavailable(format!(
                "embed error ({}): {}",
                status, text
            )));
        }

        let payload: EmbeddingsResponse = res.json().await.map_err(RagError::embedding)?;
        Ok(order_embeddings(payload.data))
    }
}
