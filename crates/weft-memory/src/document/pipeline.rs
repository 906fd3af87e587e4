use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use super::{
    Chunk, Document, DocumentError, FileType, IngestionLimits, ProcessingStatus, checksum,
    clean_text, load_file,
};
use crate::embedding::EmbeddingService;
use crate::error::EmbeddingError;
use crate::semantic_chunker::SemanticChunker;
use crate::store::DocumentStore;
use crate::vector_store::{Metadata, VectorStore};

/// How cleaned document text is cut into chunks before embedding.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ChunkStrategy {
    /// Fixed token windows with overlap.
    #[default]
    TokenWindow,
    /// Sentence groups split at embedding-distance breakpoints. Groups longer than the
    /// chunk size fall back to token windows.
    Semantic(SemanticChunker),
}

#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    pub document: Document,
    pub chunks: Vec<Chunk>,
    /// `true` when an identical completed document already existed and nothing was embedded.
    /// Its stored chunks are still indexed in the attached vector store.
    pub deduplicated: bool,
}

/// validate -> clean -> chunk -> embed -> persist, with the document status tracking progress.
pub struct DocumentIngestionPipeline {
    embeddings: EmbeddingService,
    store: Arc<dyn DocumentStore>,
    limits: IngestionLimits,
    strategy: ChunkStrategy,
    vector_store: Option<Arc<dyn VectorStore>>,
}

impl std::fmt::Debug for DocumentIngestionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIngestionPipeline")
            .field("limits", &self.limits)
            .field("strategy", &self.strategy)
            .field("indexes_vectors", &self.vector_store.is_some())
            .finish_non_exhaustive()
    }
}

impl DocumentIngestionPipeline {
    #[must_use]
    pub fn new(embeddings: EmbeddingService, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            embeddings,
            store,
            limits: IngestionLimits::default(),
            strategy: ChunkStrategy::default(),
            vector_store: None,
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: IngestionLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: ChunkStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Also insert chunk embeddings into `store`: before the document is committed, and again
    /// for documents found by checksum, so a fresh vector store is repopulated.
    #[must_use]
    pub fn with_vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Ingest already extracted `text` named `source`.
    ///
    /// Validation failures return before any document is created. Once the document is
    /// `processing`, any failure moves it to `failed` and no chunks are kept.
    ///
    /// # Errors
    ///
    /// Returns a validation error ([`DocumentError::UnsupportedFormat`],
    /// [`DocumentError::FileTooLarge`], [`DocumentError::EmptyDocument`],
    /// [`EmbeddingError::InvalidWindow`]), an embedding error, or a storage error.
    pub async fn process_document(
        &self,
        source: &str,
        text: &str,
        owner_id: &str,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<IngestionOutcome, DocumentError> {
        let file_type = self.limits.validate(source, text.len() as u64)?;
        self.ingest_text(source, file_type, text, owner_id, chunk_size, overlap)
            .await
    }

    /// Load a file from disk and ingest it.
    ///
    /// # Errors
    ///
    /// See [`DocumentIngestionPipeline::process_document`]; also fails on IO and extraction
    /// errors.
    pub async fn ingest_file(
        &self,
        path: &Path,
        owner_id: &str,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<IngestionOutcome, DocumentError> {
        let loaded = load_file(path, &self.limits).await?;
        self.ingest_text(
            &loaded.title,
            loaded.file_type,
            &loaded.text,
            owner_id,
            chunk_size,
            overlap,
        )
        .await
    }

    async fn ingest_text(
        &self,
        title: &str,
        file_type: FileType,
        text: &str,
        owner_id: &str,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<IngestionOutcome, DocumentError> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(EmbeddingError::InvalidWindow {
                chunk_size,
                overlap,
            }
            .into());
        }
        let content = clean_text(text);
        if content.is_empty() {
            return Err(DocumentError::EmptyDocument);
        }
        let digest = checksum(&content);

        if let Some(existing) = self
            .store
            .find_completed_by_checksum(owner_id, &digest)
            .await?
        {
            tracing::info!(document_id = %existing.id, title, "document already ingested");
            let chunks = self.store.list_chunks(&existing.id).await?;
            self.index_chunks(&existing, &chunks).await?;
            return Ok(IngestionOutcome {
                document: existing,
                chunks,
                deduplicated: true,
            });
        }

        let mut document = Document::new(title, content, digest, file_type, owner_id);
        self.store.create_document(&document).await?;
        tracing::info!(document_id = %document.id, title, status = %document.status, "document created");

        self.transition(&mut document, ProcessingStatus::Processing, None)
            .await?;

        match self.build_and_commit(&document, chunk_size, overlap).await {
            Ok(chunks) => {
                document.status = ProcessingStatus::Completed;
                tracing::info!(
                    document_id = %document.id,
                    chunks = chunks.len(),
                    status = %document.status,
                    "document ingested"
                );
                Ok(IngestionOutcome {
                    document,
                    chunks,
                    deduplicated: false,
                })
            }
            Err(e) => {
                let reason = e.to_string();
                if let Err(status_err) = self
                    .transition(&mut document, ProcessingStatus::Failed, Some(reason))
                    .await
                {
                    tracing::error!(document_id = %document.id, "failed to record failure: {status_err}");
                }
                Err(e)
            }
        }
    }

    async fn build_and_commit(
        &self,
        document: &Document,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Vec<Chunk>, DocumentError> {
        let pieces = self
            .split(&document.content, chunk_size, overlap)
            .await?;
        let texts: Vec<String> = pieces.iter().map(|(text, _)| text.clone()).collect();
        let vectors = self.embeddings.get_embeddings(&texts).await?;

        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, ((content, token_count), embedding))| Chunk {
                id: uuid::Uuid::new_v4().to_string(),
                document_id: document.id.clone(),
                index,
                token_count,
                char_count: content.chars().count(),
                checksum: checksum(&content),
                content,
                embedding,
            })
            .collect();

        self.index_chunks(document, &chunks).await?;
        self.store.commit_ingestion(document, &chunks).await?;
        Ok(chunks)
    }

    /// Insert chunk embeddings into the vector store, if one is attached.
    async fn index_chunks(&self, document: &Document, chunks: &[Chunk]) -> Result<(), DocumentError> {
        let Some(vector_store) = &self.vector_store else {
            return Ok(());
        };
        let metadata: Vec<Metadata> = chunks
            .iter()
            .map(|c| {
                Metadata::from([
                    ("document_id".to_owned(), json!(document.id)),
                    ("title".to_owned(), json!(document.title)),
                    ("chunk_index".to_owned(), json!(c.index)),
                ])
            })
            .collect();
        vector_store
            .add_embeddings(
                chunks.iter().map(|c| c.content.clone()).collect(),
                chunks.iter().map(|c| c.embedding.clone()).collect(),
                Some(metadata),
            )
            .await?;
        Ok(())
    }

    /// Chunk texts paired with their token counts, in document order.
    async fn split(
        &self,
        content: &str,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Vec<(String, usize)>, EmbeddingError> {
        let windows = |text: &str| -> Result<Vec<(String, usize)>, EmbeddingError> {
            Ok(self
                .embeddings
                .chunk_text(text, chunk_size, overlap)?
                .into_iter()
                .map(|c| (c.text.trim_end().to_owned(), c.token_count))
                .collect())
        };

        match self.strategy {
            ChunkStrategy::TokenWindow => windows(content),
            ChunkStrategy::Semantic(chunker) => {
                let mut pieces = Vec::new();
                for group in chunker.split(&self.embeddings, content).await? {
                    let tokens = self.embeddings.tokenizer().count(&group);
                    if tokens > chunk_size {
                        pieces.extend(windows(&group)?);
                    } else if tokens > 0 {
                        pieces.push((group, tokens));
                    }
                }
                Ok(pieces)
            }
        }
    }

    async fn transition(
        &self,
        document: &mut Document,
        next: ProcessingStatus,
        error: Option<String>,
    ) -> Result<(), DocumentError> {
        if !document.status.can_transition_to(next) {
            return Err(DocumentError::IllegalTransition {
                from: document.status,
                to: next,
            });
        }
        self.store
            .update_status(&document.id, next, error.clone())
            .await?;
        tracing::info!(document_id = %document.id, from = %document.status, to = %next, "document status changed");
        document.status = next;
        document.error = error;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use weft_llm::AnyProvider;
    use weft_llm::mock::MockProvider;

    use super::*;
    use crate::embedding::RetryPolicy;
    use crate::in_memory_store::InMemoryVectorStore;
    use crate::store::InMemoryStore;

    fn service(mock: MockProvider) -> EmbeddingService {
        EmbeddingService::from_provider(&AnyProvider::Mock(mock)).with_retry(RetryPolicy {
            max_attempts: 2,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(1),
        })
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[tokio::test]
    async fn ingests_text_into_ordered_chunks() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = DocumentIngestionPipeline::new(service(MockProvider::default()), store.clone());

        let outcome = pipeline
            .process_document("notes.txt", &words(1000), "u1", 300, 50)
            .await
            .unwrap();

        assert!(!outcome.deduplicated);
        assert_eq!(outcome.document.status, ProcessingStatus::Completed);
        let counts: Vec<usize> = outcome.chunks.iter().map(|c| c.token_count).collect();
        assert_eq!(counts, vec![300, 300, 300, 250]);
        assert!(outcome.chunks.iter().enumerate().all(|(i, c)| c.index == i));
        assert!(outcome.chunks.iter().all(|c| c.embedding.len() == 32));

        let stored = store.get_document(&outcome.document.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Completed);
        assert_eq!(store.list_chunks(&stored.id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn rejects_bad_input_before_creating_a_document() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = DocumentIngestionPipeline::new(service(MockProvider::default()), store.clone());

        let err = pipeline
            .process_document("data.csv", "a,b", "u1", 10, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedFormat(_)));

        let err = pipeline
            .process_document("blank.txt", "\u{feff}  \0 ", "u1", 10, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::EmptyDocument));

        let err = pipeline
            .process_document("a.txt", "hello", "u1", 10, 10)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DocumentError::Embedding(EmbeddingError::InvalidWindow { .. })
        ));

        assert!(store.list_documents(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversize_text_is_rejected() {
        let pipeline = DocumentIngestionPipeline::new(
            service(MockProvider::default()),
            Arc::new(InMemoryStore::new()),
        )
        .with_limits(IngestionLimits {
            max_file_size: 4,
            ..IngestionLimits::default()
        });
        let err = pipeline
            .process_document("a.md", "too long", "u1", 10, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::FileTooLarge { size: 8, limit: 4 }));
    }

    #[tokio::test]
    async fn embedding_failure_marks_document_failed_without_chunks() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = DocumentIngestionPipeline::new(
            service(MockProvider::default().with_embed_failures(5)),
            store.clone(),
        );

        let err = pipeline
            .process_document("a.txt", &words(40), "u1", 10, 2)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DocumentError::Embedding(EmbeddingError::ExternalService { attempts: 2, .. })
        ));

        let docs = store.list_documents(Some("u1")).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].status, ProcessingStatus::Failed);
        assert!(docs[0].error.is_some());
        assert!(store.list_chunks(&docs[0].id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn identical_content_is_not_embedded_twice() {
        let mock = MockProvider::default();
        let store = Arc::new(InMemoryStore::new());
        let pipeline = DocumentIngestionPipeline::new(service(mock.clone()), store.clone());

        let first = pipeline
            .process_document("a.txt", "same body text", "u1", 10, 2)
            .await
            .unwrap();
        let calls = mock.embed_calls();
        let second = pipeline
            .process_document("b.txt", "  same body text\n", "u1", 10, 2)
            .await
            .unwrap();

        assert!(second.deduplicated);
        assert_eq!(second.document.id, first.document.id);
        assert_eq!(second.chunks, first.chunks);
        assert_eq!(mock.embed_calls(), calls);

        let other_owner = pipeline
            .process_document("a.txt", "same body text", "u2", 10, 2)
            .await
            .unwrap();
        assert!(!other_owner.deduplicated);
    }

    #[tokio::test]
    async fn committed_chunks_are_indexed_in_vector_store() {
        let vectors = Arc::new(InMemoryVectorStore::default());
        let pipeline = DocumentIngestionPipeline::new(
            service(MockProvider::default()),
            Arc::new(InMemoryStore::new()),
        )
        .with_vector_store(vectors.clone());

        let outcome = pipeline
            .process_document("guide.md", &words(25), "u1", 10, 0)
            .await
            .unwrap();
        assert_eq!(vectors.len().await.unwrap(), 3);

        let hits = vectors
            .search(outcome.chunks[1].embedding.clone(), 1)
            .await
            .unwrap();
        assert_eq!(hits[0].record.metadata["title"], "guide.md");
        assert_eq!(hits[0].record.metadata["chunk_index"], 1);
        assert_eq!(hits[0].record.metadata["document_id"], json!(outcome.document.id));
    }

    #[tokio::test]
    async fn indexing_failure_leaves_no_committed_chunks() {
        let store = Arc::new(InMemoryStore::new());
        let vectors = Arc::new(InMemoryVectorStore::default());
        vectors
            .add_embeddings(vec!["seed".into()], vec![vec![0.0, 0.0, 1.0]], None)
            .await
            .unwrap();
        let pipeline = DocumentIngestionPipeline::new(service(MockProvider::default()), store.clone())
            .with_vector_store(vectors.clone());

        let err = pipeline
            .process_document("a.txt", "short body", "u1", 10, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::VectorStore(_)));

        let docs = store.list_documents(Some("u1")).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].status, ProcessingStatus::Failed);
        assert!(store.list_chunks(&docs[0].id).await.unwrap().is_empty());
        assert_eq!(vectors.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn known_document_repopulates_a_fresh_vector_store() {
        let mock = MockProvider::default();
        let store = Arc::new(InMemoryStore::new());
        let first = DocumentIngestionPipeline::new(service(mock.clone()), store.clone())
            .with_vector_store(Arc::new(InMemoryVectorStore::default()));
        let ingested = first
            .process_document("guide.md", &words(25), "u1", 10, 0)
            .await
            .unwrap();
        let calls = mock.embed_calls();

        let fresh = Arc::new(InMemoryVectorStore::default());
        let second = DocumentIngestionPipeline::new(service(mock.clone()), store.clone())
            .with_vector_store(fresh.clone());
        let outcome = second
            .process_document("guide.md", &words(25), "u1", 10, 0)
            .await
            .unwrap();

        assert!(outcome.deduplicated);
        assert_eq!(mock.embed_calls(), calls);
        assert_eq!(fresh.len().await.unwrap(), 3);
        let hits = fresh
            .search(ingested.chunks[2].embedding.clone(), 1)
            .await
            .unwrap();
        assert_eq!(hits[0].record.metadata["chunk_index"], 2);
        assert_eq!(hits[0].record.metadata["document_id"], json!(ingested.document.id));
    }

    #[tokio::test]
    async fn semantic_strategy_keeps_groups_within_chunk_size() {
        let pipeline = DocumentIngestionPipeline::new(
            service(MockProvider::default()),
            Arc::new(InMemoryStore::new()),
        )
        .with_strategy(ChunkStrategy::Semantic(SemanticChunker {
            breakpoint_percentile: 50.0,
            min_chunk_chars: 1,
        }));

        let text = "Rust compiles to native code. Cargo builds crates. \
                    Bread needs flour and water. Ovens bake bread slowly.";
        let outcome = pipeline
            .process_document("mixed.md", text, "u1", 8, 2)
            .await
            .unwrap();
        assert!(!outcome.chunks.is_empty());
        assert!(outcome.chunks.iter().all(|c| c.token_count <= 8));
        assert!(outcome.chunks.iter().enumerate().all(|(i, c)| c.index == i));
    }

    #[tokio::test]
    async fn ingests_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readme.md");
        std::fs::write(&path, "# Title\n\nSome body text here.").unwrap();

        let pipeline = DocumentIngestionPipeline::new(
            service(MockProvider::default()),
            Arc::new(InMemoryStore::new()),
        );
        let outcome = pipeline.ingest_file(&path, "u1", 50, 5).await.unwrap();
        assert_eq!(outcome.document.title, "readme.md");
        assert_eq!(outcome.document.file_type, FileType::Md);
        assert_eq!(outcome.chunks.len(), 1);
    }
}
