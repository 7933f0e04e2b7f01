use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::document::{fingerprint, Document, ScoredDocument};
use super::store::{IndexMeta, VectorStore};
use crate::core::errors::RagError;
use crate::embedding::{embed_one, Embedder};

/// An opened review index together with the embedder its vectors came from.
pub struct ReviewIndex {
    store: Box<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    meta: IndexMeta,
    location: PathBuf,
}

impl ReviewIndex {
    pub(crate) fn new(
        store: Box<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        meta: IndexMeta,
        location: PathBuf,
    ) -> Self {
        Self {
            store,
            embedder,
            meta,
            location,
        }
    }

    /// The `k` reviews most similar to `query`, best first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Document>, RagError> {
        Ok(self
            .retrieve_scored(query, k)
            .await?
            .into_iter()
            .map(|hit| hit.document)
            .collect())
    }

    pub async fn retrieve_scored(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>, RagError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = embed_one(self.embedder.as_ref(), query).await?;
        if query_embedding.len() != self.meta.dimension {
            return Err(RagError::EmbeddingMismatch(format!(
                "query embedding has {} dimensions, index has {}",
                query_embedding.len(),
                self.meta.dimension
            )));
        }

        let hits = self.store.search(&query_embedding, k).await?;
        tracing::info!(
            "Retrieved {} reviews (k={}, query={})",
            hits.len(),
            k,
            fingerprint(query)
        );
        Ok(hits)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Document>, RagError> {
        self.store.get(id).await
    }

    /// Every stored identifier in ordinal order.
    pub async fn ids(&self) -> Result<Vec<String>, RagError> {
        self.store.ids().await
    }

    pub fn len(&self) -> usize {
        self.meta.document_count
    }

    pub fn is_empty(&self) -> bool {
        self.meta.document_count == 0
    }

    pub fn info(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub async fn close(self) {
        self.store.close().await;
    }
}

impl std::fmt::Debug for ReviewIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewIndex")
            .field("location", &self.location)
            .field("meta", &self.meta)
            .field("embedder", &self.embedder.model_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::rag::indexer::{ensure_index, IndexOptions};

    async fn index(dir: &Path, dimension: usize) -> ReviewIndex {
        let corpus = dir.join("reviews.csv");
        fs::write(
            &corpus,
            "Title,Review,Rating,Date\n\
             Great pizza,Loved the crust,5,2024-01-01\n\
             Loud room,Could not hear my friends over the music,2,2024-01-05\n",
        )
        .unwrap();
        ensure_index(
            &dir.join("review_index"),
            &corpus,
            Arc::new(HashingEmbedder::new(dimension)),
            &IndexOptions::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn zero_k_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let index = index(tmp.path(), 512).await;
        assert!(index.retrieve("anything", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scores_come_back_best_first() {
        let tmp = tempfile::tempdir().unwrap();
        let index = index(tmp.path(), 512).await;

        let hits = index.retrieve_scored("loud music", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.id, "1");
        assert!(hits[0].score >= hits[1].score);

        let doc = index.get("0").await.unwrap().unwrap();
        assert_eq!(doc.content, "Great pizza Loved the crust");
        assert!(index.get("7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_dimension_must_match_the_index() {
        struct Narrow;

        #[async_trait::async_trait]
        impl Embedder for Narrow {
            fn model_id(&self) -> String {
                "hashing-512".to_string()
            }

            async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
                Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let built = index(tmp.path(), 512).await;
        let index = ReviewIndex::new(
            built.store,
            Arc::new(Narrow),
            built.meta,
            built.location,
        );

        let err = index.retrieve("crust", 1).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingMismatch(_)));
    }
}
