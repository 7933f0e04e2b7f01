//! Review retrieval.
//!
//! - `corpus`: reads the CSV corpus into `Document`s
//! - `indexer`: builds or reopens the persistent index (`ensure_index`)
//! - `retriever`: `ReviewIndex::retrieve`, top-K by cosine similarity
//! - `prompt`: formats retrieved reviews into the answering prompt

pub mod corpus;
pub mod document;
pub mod indexer;
pub mod prompt;
pub mod retriever;
pub mod sqlite;
pub mod store;

pub use corpus::{load_corpus, Corpus};
pub use document::{Document, ReviewMetadata, ScoredDocument};
pub use indexer::{ensure_index, open_index, IndexOptions, INDEX_DB_FILE};
pub use prompt::PromptBuilder;
pub use retriever::ReviewIndex;
pub use store::{IndexMeta, VectorStore, SCHEMA_VERSION};
