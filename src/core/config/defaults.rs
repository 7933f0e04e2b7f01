use std::path::PathBuf;

use super::types::{
    AppConfig, CorpusConfig, EmbeddingConfig, IndexConfig, LlmConfig, LoggingConfig,
    PromptConfig, ProviderKind, RetrievalConfig,
};

pub const DEFAULT_PROMPT_TEMPLATE: &str = "You are an expert in answering questions about a pizza restaurant.

Here are some relevant reviews (summarized if too long):
{reviews}

Here is the question to answer:
{question}
";

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            corpus: CorpusConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            prompt: PromptConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("realistic_restaurant_reviews.csv"),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            location: PathBuf::from("review_index"),
            collection: "restaurant_reviews".to_string(),
            batch_size: 32,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 2 }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            model: "mxbai-embed-large".to_string(),
            base_url: OLLAMA_BASE_URL.to_string(),
            api_key: None,
            dimension: 384,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            model: "llama3.2".to_string(),
            base_url: OLLAMA_BASE_URL.to_string(),
            api_key: None,
            model_path: PathBuf::from("models/Llama-3.2-3B-Instruct-Q4_K_M.gguf"),
            port: 0,
            n_ctx: 2048,
            n_threads: Some(8),
            n_gpu_layers: -1,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
        }
    }
}
