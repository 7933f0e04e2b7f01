pub mod defaults;
pub mod paths;
pub mod service;
pub mod types;
pub mod validation;

pub use defaults::DEFAULT_PROMPT_TEMPLATE;
pub use paths::AppPaths;
pub use service::ConfigService;
pub use types::{
    AppConfig, CorpusConfig, EmbeddingConfig, IndexConfig, LlmConfig, LoggingConfig,
    PromptConfig, ProviderKind, RetrievalConfig,
};
