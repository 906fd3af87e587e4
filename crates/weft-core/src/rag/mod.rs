//! Retrieval backends, weighted bindings and the fan-out orchestrator.

mod binding;
mod keyword;
mod orchestrator;
mod vector;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use weft_memory::{BoxFuture, EmbeddingError, Metadata, VectorStoreError};

pub use binding::RagBinding;
pub use keyword::KeywordRag;
pub use orchestrator::{
    DEFAULT_RAG_TIMEOUT, RagOrchestrator, RagOutcome, RetrievalFailure, RetrievalResult,
};
pub use vector::{DEFAULT_TOP_K, VectorRag};

/// Placeholder context returned when nothing matched.
pub const NO_MATCH_CONTEXT: &str = "No relevant documents found.";

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("retrieval timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),

    #[error("retrieval backend failed: {0}")]
    Backend(String),

    #[error("RAG system `{0}` is already registered")]
    DuplicateBinding(String),

    #[error("unknown RAG system `{0}`")]
    UnknownBinding(String),

    #[error("invalid weight {weight} for `{name}`: must be finite and non-negative")]
    InvalidWeight { name: String, weight: f32 },
}

/// A document handed to a backend for indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagDocument {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl RagDocument {
    #[must_use]
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }
}

/// What one backend retrieved for a question.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RagContext {
    pub context: String,
    pub metadata: Metadata,
}

/// A pluggable retrieval strategy.
pub trait RagBackend: Send + Sync {
    /// Retrieve context for `question`.
    fn query(&self, question: &str) -> BoxFuture<'_, Result<RagContext, RagError>>;

    fn add_documents(&self, documents: Vec<RagDocument>) -> BoxFuture<'_, Result<(), RagError>>;

    /// Rebuild any derived index after bulk changes.
    fn update_index(&self) -> BoxFuture<'_, Result<(), RagError>>;
}
