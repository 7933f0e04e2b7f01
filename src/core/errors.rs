use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("corpus unreadable at {}: {reason}", path.display())]
    CorpusUnreadable { path: PathBuf, reason: String },
    #[error("embedding service unavailable: {0}")]
    EmbeddingServiceUnavailable(String),
    #[error("index corrupt at {}: {reason}", path.display())]
    IndexCorrupt { path: PathBuf, reason: String },
    #[error("embedding mismatch: {0}")]
    EmbeddingMismatch(String),
    #[error("language model error: {0}")]
    Llm(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RagError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        RagError::Internal(err.to_string())
    }

    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        RagError::EmbeddingServiceUnavailable(err.to_string())
    }

    pub fn llm<E: std::fmt::Display>(err: E) -> Self {
        RagError::Llm(err.to_string())
    }

    pub fn corpus<E: std::fmt::Display>(path: &Path, err: E) -> Self {
        RagError::CorpusUnreadable {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }

    pub fn corrupt<E: std::fmt::Display>(path: &Path, err: E) -> Self {
        RagError::IndexCorrupt {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }
}
