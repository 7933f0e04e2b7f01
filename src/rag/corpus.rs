//! CSV review corpus loading.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use super::document::Document;
use crate::core::errors::RagError;

const REQUIRED_COLUMNS: [&str; 4] = ["Title", "Review", "Rating", "Date"];

/// Every row of a corpus file, converted to documents.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub documents: Vec<Document>,
    /// SHA-256 of the raw file bytes.
    pub fingerprint: String,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Reads the whole corpus. Any unreadable, malformed or empty input fails;
/// there is no partial result.
pub fn load_corpus(path: &Path) -> Result<Corpus, RagError> {
    let bytes = fs::read(path).map_err(|e| RagError::corpus(path, e))?;
    let fingerprint = corpus_fingerprint(&bytes);
    let documents = parse_reviews(path, &bytes)?;

    if documents.is_empty() {
        return Err(RagError::corpus(path, "corpus contains no records"));
    }

    Ok(Corpus {
        documents,
        fingerprint,
    })
}

/// Fingerprint of the file at `path`, if it can be read.
pub fn fingerprint_file(path: &Path) -> Option<String> {
    fs::read(path).ok().map(|bytes| corpus_fingerprint(&bytes))
}

fn corpus_fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn parse_reviews(path: &Path, bytes: &[u8]) -> Result<Vec<Document>, RagError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| RagError::corpus(path, e))?
        .clone();

    let mut positions = [0usize; 4];
    for (slot, column) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| RagError::corpus(path, format!("missing column `{}`", column)))?;
    }
    let [title_idx, review_idx, rating_idx, date_idx] = positions;

    let mut documents = Vec::new();
    for (ordinal, record) in reader.records().enumerate() {
        let record = record.map_err(|e| RagError::corpus(path, e))?;
        let field = |idx: usize| record.get(idx).unwrap_or("");

        let rating_raw = field(rating_idx).trim();
        let rating: f64 = rating_raw.parse().map_err(|_| {
            RagError::corpus(
                path,
                format!("row {}: rating `{}` is not a number", ordinal, rating_raw),
            )
        })?;

        documents.push(Document::from_review(
            ordinal,
            field(title_idx),
            field(review_idx),
            rating,
            field(date_idx),
        ));
    }

    Ok(documents)
}
