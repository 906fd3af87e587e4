use weft_llm::LlmError;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("invalid chunk window: overlap {overlap} must be smaller than chunk size {chunk_size}")]
    InvalidWindow { chunk_size: usize, overlap: usize },

    #[error("vector dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("similarity is undefined for a zero vector")]
    ZeroVector,

    #[error("embedding backend returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding backend failed after {attempts} attempt(s): {source}")]
    ExternalService {
        attempts: u32,
        #[source]
        source: LlmError,
    },

    #[error("tokenizer error: {0}")]
    Tokenizer(String),
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("unknown conversation role: {0}")]
    UnknownRole(String),

    #[error("unknown turn status: {0}")]
    UnknownStatus(String),

    #[error("invalid timestamp {value}: {reason}")]
    InvalidTimestamp { value: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("integer conversion: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),

    #[error("store lock poisoned")]
    Poisoned,
}
