use std::sync::Arc;

use serde_json::json;
use weft_memory::{BoxFuture, EmbeddingService, Metadata, VectorStore};

use super::{NO_MATCH_CONTEXT, RagBackend, RagContext, RagDocument, RagError};

pub const DEFAULT_TOP_K: usize = 4;

/// Embedding-similarity retrieval over a [`VectorStore`].
pub struct VectorRag {
    embeddings: EmbeddingService,
    store: Arc<dyn VectorStore>,
    top_k: usize,
    chunk_size: usize,
    overlap: usize,
}

impl std::fmt::Debug for VectorRag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorRag")
            .field("backend", &self.store.backend())
            .field("top_k", &self.top_k)
            .field("chunk_size", &self.chunk_size)
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

impl VectorRag {
    #[must_use]
    pub fn new(embeddings: EmbeddingService, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embeddings,
            store,
            top_k: DEFAULT_TOP_K,
            chunk_size: 500,
            overlap: 50,
        }
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Window used when chunking added documents.
    #[must_use]
    pub fn with_chunking(mut self, chunk_size: usize, overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.overlap = overlap;
        self
    }

    async fn index(&self, documents: Vec<RagDocument>) -> Result<(), RagError> {
        let mut texts = Vec::new();
        let mut metadata = Vec::new();
        for doc in documents {
            for chunk in self
                .embeddings
                .chunk_text(&doc.content, self.chunk_size, self.overlap)?
            {
                let mut meta = doc.metadata.clone();
                meta.insert("doc_id".into(), json!(doc.id));
                meta.insert("chunk_index".into(), json!(chunk.index));
                texts.push(chunk.text.trim_end().to_owned());
                metadata.push(meta);
            }
        }
        if texts.is_empty() {
            return Ok(());
        }
        let vectors = self.embeddings.get_embeddings(&texts).await?;
        let count = texts.len();
        self.store
            .add_embeddings(texts, vectors, Some(metadata))
            .await?;
        tracing::debug!(chunks = count, "indexed documents for vector retrieval");
        Ok(())
    }

    async fn retrieve(&self, question: String) -> Result<RagContext, RagError> {
        let query = self.embeddings.get_embedding(&question).await?;
        let hits = self.store.search(query, self.top_k).await?;

        let context = if hits.is_empty() {
            NO_MATCH_CONTEXT.to_owned()
        } else {
            hits.iter()
                .enumerate()
                .map(|(i, hit)| format!("[{}] {}", i + 1, hit.record.text))
                .collect::<Vec<_>>()
                .join("\n\n")
        };
        let distances: Vec<f32> = hits.iter().map(|h| h.distance).collect();
        let metadata = Metadata::from([
            ("source".to_owned(), json!("vector")),
            ("hits".to_owned(), json!(hits.len())),
            ("distances".to_owned(), json!(distances)),
        ]);
        Ok(RagContext { context, metadata })
    }
}

impl RagBackend for VectorRag {
    fn query(&self, question: &str) -> BoxFuture<'_, Result<RagContext, RagError>> {
        let question = question.to_owned();
        Box::pin(self.retrieve(question))
    }

    fn add_documents(&self, documents: Vec<RagDocument>) -> BoxFuture<'_, Result<(), RagError>> {
        Box::pin(self.index(documents))
    }

    fn update_index(&self) -> BoxFuture<'_, Result<(), RagError>> {
        // The store indexes on insert.
        Box::pin(async { Ok(()) })
    }
}
