#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("document has no text after cleaning")]
    EmptyDocument,

    #[error("failed to extract {format} text: {reason}")]
    Extraction { format: &'static str, reason: String },

    #[error("invalid processing status: {0}")]
    InvalidStatus(String),

    #[error("illegal status transition {from} -> {to}")]
    IllegalTransition {
        from: super::ProcessingStatus,
        to: super::ProcessingStatus,
    },

    #[error(transparent)]
    Embedding(#[from] crate::error::EmbeddingError),

    #[error("vector indexing failed: {0}")]
    VectorStore(#[from] crate::vector_store::VectorStoreError),

    #[error("storage error: {0}")]
    Storage(#[from] crate::error::StoreError),
}
