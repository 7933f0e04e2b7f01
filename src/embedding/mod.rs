//! Text embedding.
//!
//! `Embedder` is the seam between the index and whatever turns text into
//! vectors. The network-backed implementations live next to their chat
//! counterparts in `llm`; the offline hashing embedder lives here.

mod hashing;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::config::{AppPaths, EmbeddingConfig, ProviderKind};
use crate::core::errors::RagError;
use crate::llm::llama_server::{LlamaServer, ServerRole};
use crate::llm::ollama::OllamaClient;
use crate::llm::openai_compat::OpenAiCompatibleClient;

pub use hashing::HashingEmbedder;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifies the embedding space. Vectors from embedders with different
    /// ids must never be compared.
    fn model_id(&self) -> String;

    /// One vector per input, in input order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

/// Embeds `inputs` and checks the provider kept its side of the contract:
/// one non-empty vector per input, all of the same width, every component
/// finite.
pub async fn embed_checked(
    embedder: &dyn Embedder,
    inputs: &[String],
) -> Result<Vec<Vec<f32>>, RagError> {
    if inputs.is_empty() {
        return Ok(Vec::new());
    }

    let vectors = embedder.embed(inputs).await?;
    if vectors.len() != inputs.len() {
        return Err(RagError::EmbeddingServiceUnavailable(format!(
            "expected {} embeddings, got {}",
            inputs.len(),
            vectors.len()
        )));
    }

    let width = vectors[0].len();
    if width == 0 {
        return Err(RagError::EmbeddingServiceUnavailable(
            "embedding service returned an empty vector".to_string(),
        ));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != width) {
        return Err(RagError::EmbeddingServiceUnavailable(format!(
            "embedding widths differ within one batch: {} vs {}",
            width,
            bad.len()
        )));
    }
    if let Some(row) = vectors.iter().position(|v| v.iter().any(|x| !x.is_finite())) {
        return Err(RagError::EmbeddingServiceUnavailable(format!(
            "embedding {} contains a non-finite component",
            row
        )));
    }

    Ok(vectors)
}

pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, RagError> {
    let mut vectors = embed_checked(embedder, &[text.to_string()]).await?;
    vectors
        .pop()
        .ok_or_else(|| RagError::EmbeddingServiceUnavailable("no embedding returned".to_string()))
}

pub fn create_embedder(
    config: &EmbeddingConfig,
    paths: &AppPaths,
) -> Result<Arc<dyn Embedder>, RagError> {
    let embedder: Arc<dyn Embedder> = match config.provider {
        ProviderKind::Ollama => Arc::new(OllamaClient::new(
            config.base_url.clone(),
            config.model.clone(),
        )),
        ProviderKind::OpenaiCompatible => Arc::new(OpenAiCompatibleClient::new(
            config.base_url.clone(),
            config.model.clone(),
            config.api_key.clone(),
        )),
        ProviderKind::LlamaServer => Arc::new(LlamaServer::new(
            paths,
            paths.resolve_project(std::path::Path::new(&config.model)),
            ServerRole::Embedding,
        )?),
        ProviderKind::Hashing => Arc::new(HashingEmbedder::new(config.dimension)),
    };

    tracing::info!(
        "Embedding provider: {} ({})",
        config.provider,
        embedder.model_id()
    );
    Ok(embedder)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder(Vec<Vec<f32>>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_id(&self) -> String {
            "fixed".to_string()
        }

        async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(self.0.clone())
        }
    }

    fn inputs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {}", i)).collect()
    }

    #[tokio::test]
    async fn short_responses_are_rejected() {
        let embedder = FixedEmbedder(vec![vec![1.0, 0.0]]);
        let err = embed_checked(&embedder, &inputs(2)).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn ragged_widths_are_rejected() {
        let embedder = FixedEmbedder(vec![vec![1.0, 0.0], vec![1.0]]);
        assert!(embed_checked(&embedder, &inputs(2)).await.is_err());
    }

    #[tokio::test]
    async fn empty_vectors_are_rejected() {
        let embedder = FixedEmbedder(vec![vec![]]);
        assert!(embed_one(&embedder, "hello").await.is_err());
    }

    #[tokio::test]
    async fn non_finite_components_are_rejected() {
        let embedder = FixedEmbedder(vec![vec![1.0, 0.0], vec![f32::NAN, 1.0]]);
        let err = embed_checked(&embedder, &inputs(2)).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingServiceUnavailable(_)));

        let embedder = FixedEmbedder(vec![vec![f32::INFINITY, 0.0]]);
        assert!(embed_one(&embedder, "hello").await.is_err());
    }

    #[tokio::test]
    async fn empty_input_skips_the_provider() {
        let embedder = FixedEmbedder(vec![vec![1.0]]);
        assert!(embed_checked(&embedder, &[]).await.unwrap().is_empty());
    }

    #[test]
    fn hashing_provider_is_built_from_config() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = AppPaths::with_dirs(tmp.path().to_path_buf(), tmp.path().join("data"));
        let config = EmbeddingConfig {
            provider: ProviderKind::Hashing,
            dimension: 64,
            ..EmbeddingConfig::default()
        };

        let embedder = create_embedder(&config, &paths).unwrap();
        assert_eq!(embedder.model_id(), "hashing-64");
    }
}
