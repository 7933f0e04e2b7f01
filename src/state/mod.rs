use std::path::PathBuf;
use std::sync::Arc;

use crate::core::config::{AppConfig, AppPaths, ConfigService};
use crate::embedding::{create_embedder, Embedder};
use crate::llm::{create_llm, LlmProvider};
use crate::rag::{ensure_index, IndexOptions, ReviewIndex};

pub mod error;

pub use error::InitializationError;

/// Everything later calls need, resolved once at startup and passed along
/// explicitly.
///
/// The index and the answering model are opened on demand: `config` needs
/// neither, `index` and `search` need no LLM.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config_service: ConfigService,
    pub config: AppConfig,
    pub embedder: Arc<dyn Embedder>,
}

impl AppState {
    pub fn initialize(
        config_service: ConfigService,
        config: AppConfig,
    ) -> Result<Self, InitializationError> {
        let paths = Arc::new(config_service.paths().clone());
        let embedder = create_embedder(&config.embedding, &paths)
            .map_err(|e| InitializationError::Embedding(e.into()))?;

        Ok(Self {
            paths,
            config_service,
            config,
            embedder,
        })
    }

    /// Loads the configuration and builds the state in one step.
    pub fn load(config_service: ConfigService) -> Result<Self, InitializationError> {
        let config = config_service
            .load_config()
            .map_err(|e| InitializationError::Config(e.into()))?;
        Self::initialize(config_service, config)
    }

    pub fn corpus_path(&self) -> PathBuf {
        self.paths.resolve_project(&self.config.corpus.path)
    }

    pub fn index_location(&self) -> PathBuf {
        self.paths.resolve_data(&self.config.index.location)
    }

    pub async fn open_index(&self) -> Result<ReviewIndex, InitializationError> {
        ensure_index(
            &self.index_location(),
            &self.corpus_path(),
            self.embedder.clone(),
            &IndexOptions::from(&self.config.index),
        )
        .await
        .map_err(|e| InitializationError::Index(e.into()))
    }

    pub fn llm(&self) -> Result<Arc<dyn LlmProvider>, InitializationError> {
        create_llm(&self.config.llm, &self.paths).map_err(|e| InitializationError::Llm(e.into()))
    }
}
