pub mod llama_server;
pub mod ollama;
pub mod openai_compat;
pub mod provider;
pub mod stream;
pub mod types;

use std::sync::Arc;

use crate::core::config::{AppPaths, LlmConfig, ProviderKind};
use crate::core::errors::RagError;

pub use llama_server::{LlamaServer, ServerRole};
pub use ollama::OllamaClient;
pub use openai_compat::OpenAiCompatibleClient;
pub use provider::{LlmProvider, TokenStream};
pub use types::{ChatMessage, ChatRequest};

pub fn create_llm(config: &LlmConfig, paths: &AppPaths) -> Result<Arc<dyn LlmProvider>, RagError> {
    let provider: Arc<dyn LlmProvider> = match config.provider {
        ProviderKind::Ollama => Arc::new(OllamaClient::new(
            config.base_url.clone(),
            config.model.clone(),
        )),
        ProviderKind::OpenaiCompatible => Arc::new(OpenAiCompatibleClient::new(
            config.base_url.clone(),
            config.model.clone(),
            config.api_key.clone(),
        )),
        ProviderKind::LlamaServer => Arc::new(LlamaServer::from_config(paths, config)?),
        ProviderKind::Hashing => {
            return Err(RagError::Config(
                "the hashing provider can embed but cannot answer questions".to_string(),
            ))
        }
    };

    tracing::info!("LLM provider: {}", provider.name());
    Ok(provider)
}

/// Asks `provider` whether it is up, logging why when it is not.
pub async fn check_health(provider: &dyn LlmProvider) -> bool {
    match provider.health_check().await {
        Ok(true) => true,
        Ok(false) => {
            tracing::warn!("LLM provider {} did not answer its health check", provider.name());
            false
        }
        Err(e) => {
            tracing::warn!("LLM provider {} health check failed: {}", provider.name(), e);
            false
        }
    }
}
