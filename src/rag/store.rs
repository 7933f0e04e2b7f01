//! Storage interface behind the review index.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::document::{Document, ScoredDocument};
use crate::core::errors::RagError;

pub const SCHEMA_VERSION: u32 = 1;

/// Facts recorded about an index when it is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub schema_version: u32,
    pub collection: String,
    /// Identifier of the embedder that produced every stored vector.
    pub embedding_model: String,
    pub dimension: usize,
    pub document_count: usize,
    pub corpus_fingerprint: String,
    pub created_at: String,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert documents with their embeddings. Ids are unique; inserting an
    /// existing id replaces it rather than duplicating it.
    async fn insert_batch(&self, items: Vec<(Document, Vec<f32>)>) -> Result<(), RagError>;

    /// Exact nearest-neighbour search by cosine similarity, best first.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredDocument>, RagError>;

    async fn get(&self, id: &str) -> Result<Option<Document>, RagError>;

    async fn ids(&self) -> Result<Vec<String>, RagError>;

    async fn count(&self) -> Result<usize, RagError>;

    /// `None` until a build has completed.
    async fn read_meta(&self) -> Result<Option<IndexMeta>, RagError>;

    async fn write_meta(&self, meta: &IndexMeta) -> Result<(), RagError>;

    /// Flush and release the backing storage.
    async fn close(&self);
}
