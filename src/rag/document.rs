//! Review documents as stored in the index.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Metadata carried alongside each review body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewMetadata {
    pub rating: f64,
    pub date: String,
}

/// An indexed review. Built once at ingestion and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Row ordinal in the corpus, as a decimal string.
    pub id: String,
    /// `"{Title} {Review}"`.
    pub content: String,
    pub metadata: ReviewMetadata,
}

impl Document {
    pub fn from_review(ordinal: usize, title: &str, review: &str, rating: f64, date: &str) -> Self {
        Self {
            id: ordinal.to_string(),
            content: format!("{} {}", title, review),
            metadata: ReviewMetadata {
                rating,
                date: date.to_string(),
            },
        }
    }

    /// Row ordinal parsed back out of the id; used to break score ties.
    pub fn ordinal(&self) -> Option<usize> {
        self.id.parse().ok()
    }

    pub fn content_hash(&self) -> String {
        hex::encode(Sha256::digest(self.content.as_bytes()))
    }
}

/// A document together with its similarity to a query (higher = closer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// Short, log-safe fingerprint of free text.
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_joins_title_and_review() {
        let doc = Document::from_review(0, "Great pizza", "Loved the crust", 5.0, "2024-01-01");
        assert_eq!(doc.id, "0");
        assert_eq!(doc.content, "Great pizza Loved the crust");
        assert_eq!(doc.metadata.rating, 5.0);
        assert_eq!(doc.metadata.date, "2024-01-01");
        assert_eq!(doc.ordinal(), Some(0));
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        assert_eq!(fingerprint("crust quality"), fingerprint("crust quality"));
        assert_ne!(fingerprint("crust quality"), fingerprint("crust"));
        assert_eq!(fingerprint("anything").len(), 16);
    }
}
