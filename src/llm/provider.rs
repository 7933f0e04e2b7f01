use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::ChatRequest;
use crate::core::errors::RagError;

/// Tokens of one streamed answer, in order. The channel closes when the
/// model is done.
pub type TokenStream = mpsc::Receiver<Result<String, RagError>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "ollama", "openai_compatible", "llama_server")
    fn name(&self) -> &str;

    /// check if the provider is healthy/reachable
    async fn health_check(&self) -> Result<bool, RagError>;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest) -> Result<String, RagError>;

    /// chat completion (streaming)
    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream, RagError>;
}
