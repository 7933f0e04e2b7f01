pub mod chat;
pub mod core;
pub mod embedding;
pub mod llm;
pub mod rag;
pub mod state;
pub mod vector_math;

pub use crate::core::errors::RagError;
pub use crate::rag::{ensure_index, Document, IndexOptions, ReviewIndex};
