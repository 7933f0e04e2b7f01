//! SQLite-backed vector store.
//!
//! Documents, their metadata and embeddings live in one SQLite file;
//! search is brute-force cosine similarity over every stored vector.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};

use super::document::{Document, ReviewMetadata, ScoredDocument};
use super::store::{IndexMeta, VectorStore};
use crate::core::errors::RagError;
use crate::vector_math::cosine_similarity;

const META_KEYS: [&str; 7] = [
    "schema_version",
    "collection",
    "embedding_model",
    "dimension",
    "document_count",
    "corpus_fingerprint",
    "created_at",
];

pub struct SqliteVectorStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteVectorStore {
    /// Creates (or reuses) the database file and its schema.
    pub async fn create(db_path: PathBuf) -> Result<Self, RagError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RagError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    /// Opens a database that must already exist with the expected tables.
    pub async fn open_existing(db_path: PathBuf) -> Result<Self, RagError> {
        if !db_path.is_file() {
            return Err(RagError::corrupt(&db_path, "index database file is missing"));
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(false)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| RagError::corrupt(&db_path, e))?;

        let store = Self { pool, db_path };
        store.verify_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS review_documents (
                doc_id TEXT PRIMARY KEY,
                ordinal INTEGER NOT NULL,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(())
    }

    async fn verify_schema(&self) -> Result<(), RagError> {
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('review_documents', 'index_meta')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| self.corrupt(e))?;

        if tables != 2 {
            return Err(self.corrupt("expected tables are missing"));
        }
        Ok(())
    }

    fn corrupt<E: std::fmt::Display>(&self, err: E) -> RagError {
        RagError::corrupt(&self.db_path, err)
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(&self, bytes: &[u8]) -> Result<Vec<f32>, RagError> {
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            return Err(self.corrupt(format!(
                "embedding blob of {} bytes is not a float vector",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }

    fn row_to_document(&self, row: &SqliteRow) -> Result<Document, RagError> {
        let metadata_str: String = row.try_get("metadata").map_err(|e| self.corrupt(e))?;
        let metadata = serde_json::from_str::<ReviewMetadata>(&metadata_str)
            .map_err(|e| self.corrupt(format!("bad document metadata: {}", e)))?;

        Ok(Document {
            id: row.try_get("doc_id").map_err(|e| self.corrupt(e))?,
            content: row.try_get("content").map_err(|e| self.corrupt(e))?,
            metadata,
        })
    }

    fn parse_meta_value<T: std::str::FromStr>(&self, key: &str, raw: &str) -> Result<T, RagError> {
        raw.parse()
            .map_err(|_| self.corrupt(format!("index meta `{}` has bad value `{}`", key, raw)))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert_batch(&self, items: Vec<(Document, Vec<f32>)>) -> Result<(), RagError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(RagError::internal)?;

        for (document, embedding) in &items {
            let blob = Self::serialize_embedding(embedding);
            let metadata_str =
                serde_json::to_string(&document.metadata).map_err(RagError::internal)?;
            let ordinal = document.ordinal().unwrap_or_default() as i64;

            sqlx::query(
                "INSERT OR REPLACE INTO review_documents
                    (doc_id, ordinal, content, content_hash, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&document.id)
            .bind(ordinal)
            .bind(&document.content)
            .bind(document.content_hash())
            .bind(&metadata_str)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(RagError::internal)?;
        }

        tx.commit().await.map_err(RagError::internal)?;
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredDocument>, RagError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT doc_id, ordinal, content, metadata, embedding
             FROM review_documents",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| self.corrupt(e))?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let embedding_bytes: Vec<u8> = row.try_get("embedding").map_err(|e| self.corrupt(e))?;
            let stored = self.deserialize_embedding(&embedding_bytes)?;
            let score = cosine_similarity(query_embedding, &stored)?;
            // a NaN score ranks last instead of breaking the sort
            let score = if score.is_nan() { f32::NEG_INFINITY } else { score };
            let ordinal: i64 = row.try_get("ordinal").map_err(|e| self.corrupt(e))?;
            scored.push((ordinal, ScoredDocument {
                document: self.row_to_document(row)?,
                score,
            }));
        }

        scored.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
        scored.truncate(limit);

        Ok(scored.into_iter().map(|(_, hit)| hit).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, RagError> {
        let row = sqlx::query(
            "SELECT doc_id, content, metadata
             FROM review_documents
             WHERE doc_id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| self.corrupt(e))?;

        row.as_ref().map(|r| self.row_to_document(r)).transpose()
    }

    async fn ids(&self) -> Result<Vec<String>, RagError> {
        sqlx::query_scalar("SELECT doc_id FROM review_documents ORDER BY ordinal")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.corrupt(e))
    }

    async fn count(&self) -> Result<usize, RagError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM review_documents")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.corrupt(e))?;

        Ok(count as usize)
    }

    async fn read_meta(&self) -> Result<Option<IndexMeta>, RagError> {
        let rows = sqlx::query("SELECT key, value FROM index_meta")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.corrupt(e))?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut values = std::collections::HashMap::new();
        for row in &rows {
            let key: String = row.try_get("key").map_err(|e| self.corrupt(e))?;
            let value: String = row.try_get("value").map_err(|e| self.corrupt(e))?;
            values.insert(key, value);
        }

        let field = |key: &str| {
            values
                .get(key)
                .cloned()
                .ok_or_else(|| self.corrupt(format!("index meta `{}` is missing", key)))
        };

        Ok(Some(IndexMeta {
            schema_version: self.parse_meta_value("schema_version", &field("schema_version")?)?,
            collection: field("collection")?,
            embedding_model: field("embedding_model")?,
            dimension: self.parse_meta_value("dimension", &field("dimension")?)?,
            document_count: self.parse_meta_value("document_count", &field("document_count")?)?,
            corpus_fingerprint: field("corpus_fingerprint")?,
            created_at: field("created_at")?,
        }))
    }

    async fn write_meta(&self, meta: &IndexMeta) -> Result<(), RagError> {
        let values = [
            meta.schema_version.to_string(),
            meta.collection.clone(),
            meta.embedding_model.clone(),
            meta.dimension.to_string(),
            meta.document_count.to_string(),
            meta.corpus_fingerprint.clone(),
            meta.created_at.clone(),
        ];

        let mut tx = self.pool.begin().await.map_err(RagError::internal)?;
        for (key, value) in META_KEYS.iter().zip(values.iter()) {
            sqlx::query(
                "INSERT OR REPLACE INTO index_meta (key, value, updated_at)
                 VALUES (?1, ?2, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
            )
            .bind(*key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(RagError::internal)?;
        }
        tx.commit().await.map_err(RagError::internal)?;

        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
