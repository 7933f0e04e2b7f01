use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use review_rag::embedding::{Embedder, HashingEmbedder};
use review_rag::rag::{ensure_index, IndexOptions, INDEX_DB_FILE};
use review_rag::RagError;

const REVIEWS: &str = "\
Title,Date,Rating,Review
Great pizza,2024-01-01,5,Loved the crust
Too salty,2024-01-04,2,The pepperoni was far too salty for me
Friendly staff,2024-01-09,4,Waiters were kind and quick with refills
Slow night,2024-01-12,2,Waited forty minutes for a margherita
Best tiramisu,2024-01-20,5,Dessert was the highlight of the evening
";

/// Counts how many texts pass through to the wrapped embedder.
struct CountingEmbedder {
    inner: HashingEmbedder,
    embedded: AtomicUsize,
}

impl CountingEmbedder {
    fn new() -> Self {
        Self {
            inner: HashingEmbedder::new(2048),
            embedded: AtomicUsize::new(0),
        }
    }

    fn embedded(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_id(&self) -> String {
        self.inner.model_id()
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        self.embedded.fetch_add(inputs.len(), Ordering::SeqCst);
        self.inner.embed(inputs).await
    }
}

fn write_corpus(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("realistic_restaurant_reviews.csv");
    fs::write(&path, contents).unwrap();
    path
}

fn hashing() -> Arc<dyn Embedder> {
    Arc::new(HashingEmbedder::new(2048))
}

#[tokio::test]
async fn repeated_ensure_leaves_one_entry_per_review() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = write_corpus(tmp.path(), REVIEWS);
    let location = tmp.path().join("review_index");
    let options = IndexOptions::default();

    let first = ensure_index(&location, &corpus, hashing(), &options).await.unwrap();
    first.close().await;
    let second = ensure_index(&location, &corpus, hashing(), &options).await.unwrap();

    let ids = second.ids().await.unwrap();
    assert_eq!(second.len(), 5);
    assert_eq!(ids.len(), 5);
    assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 5);
}

#[tokio::test]
async fn reuse_embeds_nothing_and_changes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = write_corpus(tmp.path(), REVIEWS);
    let location = tmp.path().join("review_index");
    let options = IndexOptions::default();

    let first = ensure_index(&location, &corpus, hashing(), &options).await.unwrap();
    let before = first.info().clone();
    let ids_before = first.ids().await.unwrap();
    first.close().await;

    let counting = Arc::new(CountingEmbedder::new());
    let reopened = ensure_index(&location, &corpus, counting.clone(), &options)
        .await
        .unwrap();
    assert_eq!(counting.embedded(), 0);
    assert_eq!(reopened.info(), &before);
    assert_eq!(reopened.ids().await.unwrap(), ids_before);
}

#[tokio::test]
async fn results_are_bounded_and_sorted() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = write_corpus(tmp.path(), REVIEWS);
    let index = ensure_index(
        &tmp.path().join("review_index"),
        &corpus,
        hashing(),
        &IndexOptions::default(),
    )
    .await
    .unwrap();

    for k in [1, 2, 3, 5, 50] {
        let hits = index.retrieve_scored("slow salty pizza", k).await.unwrap();
        assert!(hits.len() <= k);
        assert_eq!(hits.len(), k.min(5));
        assert!(hits.windows(2).all(|pair| pair[0].score >= pair[1].score));
    }
    assert!(index.retrieve("slow salty pizza", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn a_review_body_finds_itself_first() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = write_corpus(tmp.path(), REVIEWS);
    let index = ensure_index(
        &tmp.path().join("review_index"),
        &corpus,
        hashing(),
        &IndexOptions::default(),
    )
    .await
    .unwrap();

    let body = "Friendly staff Waiters were kind and quick with refills";
    let top = index.retrieve(body, 1).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].content, body);
    assert_eq!(top[0].id, "2");
    assert_eq!(top[0].metadata.rating, 4.0);
}

#[tokio::test]
async fn single_review_scenario() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = write_corpus(
        tmp.path(),
        "Title,Review,Rating,Date\nGreat pizza,Loved the crust,5,2024-01-01\n",
    );
    let index = ensure_index(
        &tmp.path().join("review_index"),
        &corpus,
        hashing(),
        &IndexOptions::default(),
    )
    .await
    .unwrap();

    let hits = index.retrieve("crust quality", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.contains("Great pizza Loved the crust"));
    assert!(index.retrieve("crust quality", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn unreadable_corpus_creates_no_index() {
    let tmp = tempfile::tempdir().unwrap();
    let location = tmp.path().join("review_index");

    let missing = tmp.path().join("nope.csv");
    let err = ensure_index(&location, &missing, hashing(), &IndexOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RagError::CorpusUnreadable { .. }));
    assert!(!location.exists());

    let no_review_column = write_corpus(tmp.path(), "Title,Rating,Date\nGreat,5,2024-01-01\n");
    let err = ensure_index(&location, &no_review_column, hashing(), &IndexOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RagError::CorpusUnreadable { .. }));
    assert!(!location.exists());
}

#[tokio::test]
async fn corrupt_index_is_reported_not_rebuilt() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = write_corpus(tmp.path(), REVIEWS);
    let location = tmp.path().join("review_index");
    fs::create_dir_all(&location).unwrap();
    fs::write(
        location.join(INDEX_DB_FILE),
        "definitely not a database ".repeat(64),
    )
    .unwrap();

    let counting = Arc::new(CountingEmbedder::new());
    let err = ensure_index(&location, &corpus, counting.clone(), &IndexOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RagError::IndexCorrupt { .. }));
    assert_eq!(counting.embedded(), 0);
}

#[tokio::test]
async fn a_different_embedder_is_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = write_corpus(tmp.path(), REVIEWS);
    let location = tmp.path().join("review_index");

    ensure_index(&location, &corpus, hashing(), &IndexOptions::default())
        .await
        .unwrap()
        .close()
        .await;

    let err = ensure_index(
        &location,
        &corpus,
        Arc::new(HashingEmbedder::new(64)),
        &IndexOptions::default(),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, RagError::EmbeddingMismatch(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_callers_build_once() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = write_corpus(tmp.path(), REVIEWS);
    let location = tmp.path().join("review_index");
    let counting = Arc::new(CountingEmbedder::new());
    let options = IndexOptions::default();

    let (a, b) = tokio::join!(
        ensure_index(&location, &corpus, counting.clone(), &options),
        ensure_index(&location, &corpus, counting.clone(), &options),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.len(), 5);
    assert_eq!(b.len(), 5);
    assert_eq!(counting.embedded(), 5);
}
