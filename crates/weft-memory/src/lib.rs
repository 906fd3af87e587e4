//! Chunking, embeddings, vector search, conversation history and document ingestion.

pub mod chunker;
pub mod document;
pub mod embedding;
pub mod error;
pub mod history;
pub mod in_memory_store;
pub mod qdrant;
pub mod semantic_chunker;
pub mod sqlite;
pub mod store;
pub mod tokenizer;
pub mod vector_store;

pub use chunker::{TokenChunk, chunk_text};
pub use document::{
    Chunk, ChunkStrategy, Document, DocumentError, DocumentIngestionPipeline, FileType,
    IngestionLimits, IngestionOutcome, ProcessingStatus,
};
pub use embedding::{EmbedBatchFn, EmbeddingService, RetryPolicy, calculate_similarity};
pub use error::{EmbeddingError, HistoryError, StoreError};
pub use history::{ConversationHistory, ConversationTurn, TurnStatus};
pub use in_memory_store::InMemoryVectorStore;
pub use qdrant::QdrantVectorStore;
pub use semantic_chunker::SemanticChunker;
pub use sqlite::SqliteStore;
pub use store::{ConversationStore, DocumentStore, InMemoryStore};
pub use tokenizer::{Token, Tokenizer, WordPieceTokenizer};
pub use vector_store::{
    BoxFuture, Distance, Metadata, SearchHit, VectorRecord, VectorStore, VectorStoreConfig,
    VectorStoreError, create_vector_store,
};
