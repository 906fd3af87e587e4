//! Persistence contracts for documents, chunks and conversation turns.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use crate::document::{Chunk, Document, ProcessingStatus};
use crate::error::StoreError;
use crate::history::ConversationTurn;
use crate::vector_store::BoxFuture;

pub trait DocumentStore: Send + Sync {
    fn create_document(&self, document: &Document) -> BoxFuture<'_, Result<(), StoreError>>;

    fn get_document(&self, id: &str) -> BoxFuture<'_, Result<Option<Document>, StoreError>>;

    /// Documents oldest first, optionally restricted to one owner.
    fn list_documents(
        &self,
        owner_id: Option<&str>,
    ) -> BoxFuture<'_, Result<Vec<Document>, StoreError>>;

    /// Delete a document and its chunks. Returns whether it existed.
    fn delete_document(&self, id: &str) -> BoxFuture<'_, Result<bool, StoreError>>;

    fn update_status(
        &self,
        id: &str,
        status: ProcessingStatus,
        error: Option<String>,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Mark the document completed and store all of its chunks as one unit.
    fn commit_ingestion(
        &self,
        document: &Document,
        chunks: &[Chunk],
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    fn find_completed_by_checksum(
        &self,
        owner_id: &str,
        checksum: &str,
    ) -> BoxFuture<'_, Result<Option<Document>, StoreError>>;

    /// Chunks of one document ordered by index.
    fn list_chunks(&self, document_id: &str) -> BoxFuture<'_, Result<Vec<Chunk>, StoreError>>;
}

pub trait ConversationStore: Send + Sync {
    fn append_turns(
        &self,
        assistant: &str,
        turns: &[ConversationTurn],
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// All turns of one assistant, oldest first.
    fn load_turns(&self, assistant: &str)
    -> BoxFuture<'_, Result<Vec<ConversationTurn>, StoreError>>;

    /// Remove all turns of one assistant, returning how many were deleted.
    fn clear_turns(&self, assistant: &str) -> BoxFuture<'_, Result<u64, StoreError>>;
}

#[derive(Default)]
struct Inner {
    documents: Vec<Document>,
    chunks: HashMap<String, Vec<Chunk>>,
    turns: HashMap<String, Vec<ConversationTurn>>,
}

/// Process-local store for tests and single-run use.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish_non_exhaustive()
    }
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl DocumentStore for InMemoryStore {
    fn create_document(&self, document: &Document) -> BoxFuture<'_, Result<(), StoreError>> {
        let document = document.clone();
        Box::pin(async move {
            self.lock()?.documents.push(document);
            Ok(())
        })
    }

    fn get_document(&self, id: &str) -> BoxFuture<'_, Result<Option<Document>, StoreError>> {
        let id = id.to_owned();
        Box::pin(async move { Ok(self.lock()?.documents.iter().find(|d| d.id == id).cloned()) })
    }

    fn list_documents(
        &self,
        owner_id: Option<&str>,
    ) -> BoxFuture<'_, Result<Vec<Document>, StoreError>> {
        let owner_id = owner_id.map(str::to_owned);
        Box::pin(async move {
            Ok(self
                .lock()?
                .documents
                .iter()
                .filter(|d| owner_id.as_ref().is_none_or(|o| &d.owner_id == o))
                .cloned()
                .collect())
        })
    }

    fn delete_document(&self, id: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let id = id.to_owned();
        Box::pin(async move {
            let mut inner = self.lock()?;
            let before = inner.documents.len();
            inner.documents.retain(|d| d.id != id);
            inner.chunks.remove(&id);
            Ok(inner.documents.len() != before)
        })
    }

    fn update_status(
        &self,
        id: &str,
        status: ProcessingStatus,
        error: Option<String>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let id = id.to_owned();
        Box::pin(async move {
            let mut inner = self.lock()?;
            let doc = inner
                .documents
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or_else(|| StoreError::NotFound(format!("document {id}")))?;
            doc.status = status;
            doc.error = error;
            doc.updated_at = Utc::now();
            Ok(())
        })
    }

    fn commit_ingestion(
        &self,
        document: &Document,
        chunks: &[Chunk],
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let document = document.clone();
        let chunks = chunks.to_vec();
        Box::pin(async move {
            let mut inner = self.lock()?;
            let doc = inner
                .documents
                .iter_mut()
                .find(|d| d.id == document.id)
                .ok_or_else(|| StoreError::NotFound(format!("document {}", document.id)))?;
            doc.status = ProcessingStatus::Completed;
            doc.error = None;
            doc.updated_at = Utc::now();
            inner.chunks.insert(document.id, chunks);
            Ok(())
        })
    }

    fn find_completed_by_checksum(
        &self,
        owner_id: &str,
        checksum: &str,
    ) -> BoxFuture<'_, Result<Option<Document>, StoreError>> {
        let owner_id = owner_id.to_owned();
        let checksum = checksum.to_owned();
        Box::pin(async move {
            Ok(self
                .lock()?
                .documents
                .iter()
                .find(|d| {
                    d.owner_id == owner_id
                        && d.checksum == checksum
                        && d.status == ProcessingStatus::Completed
                })
                .cloned())
        })
    }

    fn list_chunks(&self, document_id: &str) -> BoxFuture<'_, Result<Vec<Chunk>, StoreError>> {
        let document_id = document_id.to_owned();
        Box::pin(async move {
            Ok(self
                .lock()?
                .chunks
                .get(&document_id)
                .cloned()
                .unwrap_or_default())
        })
    }
}

impl ConversationStore for InMemoryStore {
    fn append_turns(
        &self,
        assistant: &str,
        turns: &[ConversationTurn],
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let assistant = assistant.to_owned();
        let turns = turns.to_vec();
        Box::pin(async move {
            self.lock()?.turns.entry(assistant).or_default().extend(turns);
            Ok(())
        })
    }

    fn load_turns(
        &self,
        assistant: &str,
    ) -> BoxFuture<'_, Result<Vec<ConversationTurn>, StoreError>> {
        let assistant = assistant.to_owned();
        Box::pin(async move { Ok(self.lock()?.turns.get(&assistant).cloned().unwrap_or_default()) })
    }

    fn clear_turns(&self, assistant: &str) -> BoxFuture<'_, Result<u64, StoreError>> {
        let assistant = assistant.to_owned();
        Box::pin(async move {
            let removed = self.lock()?.turns.remove(&assistant).map_or(0, |t| t.len());
            Ok(u64::try_from(removed)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FileType;

    fn doc(owner: &str, checksum: &str) -> Document {
        Document::new("t.txt", "body", checksum, FileType::Txt, owner)
    }

    fn chunk(document_id: &str, index: usize) -> Chunk {
        Chunk {
            id: format!("c{index}"),
            document_id: document_id.to_owned(),
            index,
            content: format!("chunk {index}"),
            token_count: 2,
            char_count: 7,
            embedding: vec![0.5, 0.5],
            checksum: format!("sum{index}"),
        }
    }

    #[tokio::test]
    async fn commit_marks_completed_and_stores_chunks() {
        let store = InMemoryStore::new();
        let d = doc("u1", "abc");
        store.create_document(&d).await.unwrap();
        store
            .update_status(&d.id, ProcessingStatus::Processing, None)
            .await
            .unwrap();
        store
            .commit_ingestion(&d, &[chunk(&d.id, 0), chunk(&d.id, 1)])
            .await
            .unwrap();

        let loaded = store.get_document(&d.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ProcessingStatus::Completed);
        assert_eq!(store.list_chunks(&d.id).await.unwrap().len(), 2);
        let found = store.find_completed_by_checksum("u1", "abc").await.unwrap();
        assert_eq!(found.map(|f| f.id), Some(d.id.clone()));
        assert!(
            store
                .find_completed_by_checksum("u2", "abc")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn delete_removes_chunks_and_reports_existence() {
        let store = InMemoryStore::new();
        let d = doc("u1", "abc");
        store.create_document(&d).await.unwrap();
        store.commit_ingestion(&d, &[chunk(&d.id, 0)]).await.unwrap();
        assert!(store.delete_document(&d.id).await.unwrap());
        assert!(!store.delete_document(&d.id).await.unwrap());
        assert!(store.list_chunks(&d.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_filters_by_owner() {
        let store = InMemoryStore::new();
        store.create_document(&doc("a", "1")).await.unwrap();
        store.create_document(&doc("b", "2")).await.unwrap();
        assert_eq!(store.list_documents(None).await.unwrap().len(), 2);
        assert_eq!(store.list_documents(Some("a")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_unknown_document_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .update_status("missing", ProcessingStatus::Failed, Some("x".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn turns_are_scoped_per_assistant() {
        let store = InMemoryStore::new();
        store
            .append_turns(
                "helper",
                &[
                    ConversationTurn::user("hi"),
                    ConversationTurn::assistant("hello"),
                ],
            )
            .await
            .unwrap();
        store
            .append_turns("other", &[ConversationTurn::user("x")])
            .await
            .unwrap();
        let turns = store.load_turns("helper").await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].content, "hello");
        assert_eq!(store.clear_turns("helper").await.unwrap(), 2);
        assert!(store.load_turns("helper").await.unwrap().is_empty());
        assert_eq!(store.load_turns("other").await.unwrap().len(), 1);
    }
}
