//! Building and reopening the persistent review index.
//!
//! A location is a directory holding `index.db`. It is either absent or
//! complete: builds happen in a sibling staging directory that is renamed
//! into place only after the completion marker (the meta rows) is written.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use uuid::Uuid;

use super::corpus::{fingerprint_file, load_corpus, Corpus};
use super::retriever::ReviewIndex;
use super::sqlite::SqliteVectorStore;
use super::store::{IndexMeta, VectorStore, SCHEMA_VERSION};
use crate::core::config::IndexConfig;
use crate::core::errors::RagError;
use crate::embedding::{embed_checked, Embedder};

pub const INDEX_DB_FILE: &str = "index.db";

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub collection: String,
    /// Documents per embedding request.
    pub batch_size: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            collection: "restaurant_reviews".to_string(),
            batch_size: 32,
        }
    }
}

impl From<&IndexConfig> for IndexOptions {
    fn from(config: &IndexConfig) -> Self {
        Self {
            collection: config.collection.clone(),
            batch_size: config.batch_size,
        }
    }
}

/// Returns a handle on the index at `location`, building it from `corpus`
/// first if nothing exists there yet.
pub async fn ensure_index(
    location: &Path,
    corpus: &Path,
    embedder: Arc<dyn Embedder>,
    options: &IndexOptions,
) -> Result<ReviewIndex, RagError> {
    if location.exists() {
        tracing::info!("Using existing index at {}", location.display());
        return open_index(location, corpus, embedder).await;
    }

    // Corpus problems must surface before anything is written.
    let reviews = load_corpus(corpus)?;

    let _lock = IndexLock::acquire(location).await?;
    if location.exists() {
        tracing::info!(
            "Index at {} was built by another process; reusing it",
            location.display()
        );
        return open_index(location, corpus, embedder).await;
    }

    tracing::info!(
        "No existing index found, generating embeddings for {} reviews...",
        reviews.len()
    );
    build_index(location, &reviews, embedder.as_ref(), options).await?;
    open_index(location, corpus, embedder).await
}

/// Opens a complete index. Never rebuilds: any inconsistency is reported.
pub async fn open_index(
    location: &Path,
    corpus: &Path,
    embedder: Arc<dyn Embedder>,
) -> Result<ReviewIndex, RagError> {
    let db_path = location.join(INDEX_DB_FILE);
    let store = SqliteVectorStore::open_existing(db_path.clone()).await?;

    let meta = match verify(&store, &db_path, embedder.as_ref()).await {
        Ok(meta) => meta,
        Err(err) => {
            store.close().await;
            return Err(err);
        }
    };

    if let Some(current) = fingerprint_file(corpus) {
        if current != meta.corpus_fingerprint {
            tracing::warn!(
                "Corpus {} changed since the index was built; entries still reflect the old rows. \
                 Delete {} to rebuild.",
                corpus.display(),
                location.display()
            );
        }
    }

    tracing::debug!(
        "Opened index {} ({} documents, model {}, dimension {})",
        meta.collection,
        meta.document_count,
        meta.embedding_model,
        meta.dimension
    );
    Ok(ReviewIndex::new(
        Box::new(store),
        embedder,
        meta,
        location.to_path_buf(),
    ))
}

async fn verify(
    store: &SqliteVectorStore,
    db_path: &Path,
    embedder: &dyn Embedder,
) -> Result<IndexMeta, RagError> {
    let meta = store
        .read_meta()
        .await?
        .ok_or_else(|| RagError::corrupt(db_path, "index build never completed"))?;

    if meta.schema_version != SCHEMA_VERSION {
        return Err(RagError::corrupt(
            db_path,
            format!(
                "schema version {} is not supported (expected {})",
                meta.schema_version, SCHEMA_VERSION
            ),
        ));
    }

    let count = store.count().await?;
    if count != meta.document_count {
        return Err(RagError::corrupt(
            db_path,
            format!(
                "holds {} documents but recorded {}",
                count, meta.document_count
            ),
        ));
    }

    let model_id = embedder.model_id();
    if model_id != meta.embedding_model {
        return Err(RagError::EmbeddingMismatch(format!(
            "index was built with `{}` but the configured embedder is `{}`",
            meta.embedding_model, model_id
        )));
    }

    Ok(meta)
}

async fn build_index(
    location: &Path,
    reviews: &Corpus,
    embedder: &dyn Embedder,
    options: &IndexOptions,
) -> Result<(), RagError> {
    let staging = staging_dir(location)?;
    fs::create_dir_all(&staging)?;

    let built = match populate(&staging, reviews, embedder, options).await {
        Ok(()) => fs::rename(&staging, location).map_err(RagError::from),
        Err(err) => Err(err),
    };

    if let Err(err) = built {
        if let Err(cleanup) = fs::remove_dir_all(&staging) {
            tracing::warn!(
                "Failed to remove staging dir {}: {}",
                staging.display(),
                cleanup
            );
        }
        return Err(err);
    }

    tracing::info!(
        "Indexed {} reviews into {}",
        reviews.len(),
        location.display()
    );
    Ok(())
}

async fn populate(
    staging: &Path,
    reviews: &Corpus,
    embedder: &dyn Embedder,
    options: &IndexOptions,
) -> Result<(), RagError> {
    let store = SqliteVectorStore::create(staging.join(INDEX_DB_FILE)).await?;
    let result = write_documents(&store, reviews, embedder, options).await;
    store.close().await;
    result
}

async fn write_documents(
    store: &SqliteVectorStore,
    reviews: &Corpus,
    embedder: &dyn Embedder,
    options: &IndexOptions,
) -> Result<(), RagError> {
    let batch_size = options.batch_size.max(1);
    let total_batches = reviews.len().div_ceil(batch_size);
    let mut dimension: Option<usize> = None;

    for (batch_no, batch) in reviews.documents.chunks(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|doc| doc.content.clone()).collect();
        let vectors = embed_checked(embedder, &texts).await?;

        let width = vectors[0].len();
        match dimension {
            Some(expected) if expected != width => {
                return Err(RagError::EmbeddingServiceUnavailable(format!(
                    "embedding width changed mid-build: {} vs {}",
                    expected, width
                )));
            }
            _ => dimension = Some(width),
        }

        store
            .insert_batch(batch.iter().cloned().zip(vectors).collect())
            .await?;
        tracing::debug!("Embedded batch {}/{}", batch_no + 1, total_batches);
    }

    let dimension = dimension
        .ok_or_else(|| RagError::internal("no documents were embedded"))?;
    let meta = IndexMeta {
        schema_version: SCHEMA_VERSION,
        collection: options.collection.clone(),
        embedding_model: embedder.model_id(),
        dimension,
        document_count: store.count().await?,
        corpus_fingerprint: reviews.fingerprint.clone(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    store.write_meta(&meta).await
}

fn split_location(location: &Path) -> Result<(PathBuf, String), RagError> {
    let name = location
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            RagError::Config(format!(
                "index location {} must name a directory",
                location.display()
            ))
        })?;
    let parent = match location.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((parent, name))
}

fn staging_dir(location: &Path) -> Result<PathBuf, RagError> {
    let (parent, name) = split_location(location)?;
    Ok(parent.join(format!(".{}.staging-{}", name, Uuid::new_v4())))
}

/// Advisory exclusive lock on `.<name>.lock` beside the index location.
/// Released when dropped; the lock file itself is left in place.
struct IndexLock {
    file: File,
}

impl IndexLock {
    async fn acquire(location: &Path) -> Result<Self, RagError> {
        let (parent, name) = split_location(location)?;
        fs::create_dir_all(&parent)?;
        let lock_path = parent.join(format!(".{}.lock", name));

        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(&lock_path)?;
            FileExt::lock_exclusive(&file)?;
            Ok(file)
        })
        .await
        .map_err(RagError::internal)??;

        Ok(Self { file })
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
