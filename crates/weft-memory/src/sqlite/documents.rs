use super::{SqliteStore, decode_embedding, encode_embedding, parse_timestamp};
use crate::document::{Chunk, Document, FileType, ProcessingStatus};
use crate::error::StoreError;
use crate::store::DocumentStore;
use crate::vector_store::BoxFuture;

type DocumentRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    String,
);

type ChunkRow = (String, String, i64, String, i64, i64, Vec<u8>, String);

const DOCUMENT_COLUMNS: &str = "id, title, content, checksum, file_type, status, owner_id, error, \
                                created_at, updated_at";

fn document_from_row(row: DocumentRow) -> Result<Document, StoreError> {
    let (id, title, content, checksum, file_type, status, owner_id, error, created, updated) = row;
    let status = status
        .parse::<ProcessingStatus>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    Ok(Document {
        id,
        title,
        content,
        checksum,
        file_type: FileType::from_extension(&file_type),
        status,
        owner_id,
        error,
        created_at: parse_timestamp(&created)?,
        updated_at: parse_timestamp(&updated)?,
    })
}

fn chunk_from_row(row: ChunkRow) -> Result<Chunk, StoreError> {
    let (id, document_id, index, content, token_count, char_count, embedding, checksum) = row;
    Ok(Chunk {
        id,
        document_id,
        index: usize::try_from(index)?,
        content,
        token_count: usize::try_from(token_count)?,
        char_count: usize::try_from(char_count)?,
        embedding: decode_embedding(&embedding)?,
        checksum,
    })
}

impl DocumentStore for SqliteStore {
    fn create_document(&self, document: &Document) -> BoxFuture<'_, Result<(), StoreError>> {
        let d = document.clone();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO documents (id, title, content, checksum, file_type, status, owner_id, \
                 error, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&d.id)
            .bind(&d.title)
            .bind(&d.content)
            .bind(&d.checksum)
            .bind(d.file_type.as_str())
            .bind(d.status.as_str())
            .bind(&d.owner_id)
            .bind(&d.error)
            .bind(d.created_at.to_rfc3339())
            .bind(d.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn get_document(&self, id: &str) -> BoxFuture<'_, Result<Option<Document>, StoreError>> {
        let id = id.to_owned();
        Box::pin(async move {
            let row: Option<DocumentRow> = sqlx::query_as(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"
            ))
            .bind(&id)
            .fetch_optional(&self.pool)
            .await?;
            row.map(document_from_row).transpose()
        })
    }

    fn list_documents(
        &self,
        owner_id: Option<&str>,
    ) -> BoxFuture<'_, Result<Vec<Document>, StoreError>> {
        let owner_id = owner_id.map(str::to_owned);
        Box::pin(async move {
            let rows: Vec<DocumentRow> = match owner_id {
                Some(owner) => {
                    sqlx::query_as(&format!(
                        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner_id = ? \
                         ORDER BY created_at, rowid"
                    ))
                    .bind(owner)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as(&format!(
                        "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_at, rowid"
                    ))
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            rows.into_iter().map(document_from_row).collect()
        })
    }

    fn delete_document(&self, id: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let id = id.to_owned();
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM documents WHERE id = ?")
                .bind(&id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
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
            let result =
                sqlx::query("UPDATE documents SET status = ?, error = ?, updated_at = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(error)
                    .bind(chrono::Utc::now().to_rfc3339())
                    .bind(&id)
                    .execute(&self.pool)
                    .await?;
            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("document {id}")));
            }
            Ok(())
        })
    }

    fn commit_ingestion(
        &self,
        document: &Document,
        chunks: &[Chunk],
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let document_id = document.id.clone();
        let chunks = chunks.to_vec();
        Box::pin(async move {
            let mut tx = self.pool.begin().await?;
            for chunk in &chunks {
                sqlx::query(
                    "INSERT INTO chunks (id, document_id, chunk_index, content, token_count, \
                     char_count, embedding, checksum) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&chunk.id)
                .bind(&document_id)
                .bind(i64::try_from(chunk.index)?)
                .bind(&chunk.content)
                .bind(i64::try_from(chunk.token_count)?)
                .bind(i64::try_from(chunk.char_count)?)
                .bind(encode_embedding(&chunk.embedding))
                .bind(&chunk.checksum)
                .execute(&mut *tx)
                .await?;
            }
            let result = sqlx::query(
                "UPDATE documents SET status = 'completed', error = NULL, updated_at = ? \
                 WHERE id = ?",
            )
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(&document_id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                // Dropping the transaction rolls back the chunk inserts.
                return Err(StoreError::NotFound(format!("document {document_id}")));
            }
            tx.commit().await?;
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
            let row: Option<DocumentRow> = sqlx::query_as(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents \
                 WHERE owner_id = ? AND checksum = ? AND status = 'completed' \
                 ORDER BY created_at LIMIT 1"
            ))
            .bind(&owner_id)
            .bind(&checksum)
            .fetch_optional(&self.pool)
            .await?;
            row.map(document_from_row).transpose()
        })
    }

    fn list_chunks(&self, document_id: &str) -> BoxFuture<'_, Result<Vec<Chunk>, StoreError>> {
        let document_id = document_id.to_owned();
        Box::pin(async move {
            let rows: Vec<ChunkRow> = sqlx::query_as(
                "SELECT id, document_id, chunk_index, content, token_count, char_count, \
                 embedding, checksum FROM chunks WHERE document_id = ? ORDER BY chunk_index",
            )
            .bind(&document_id)
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter().map(chunk_from_row).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        SqliteStore::new(":memory:").await.unwrap()
    }

    fn chunk(document_id: &str, index: usize) -> Chunk {
        Chunk {
            id: format!("{document_id}-{index}"),
            document_id: document_id.to_owned(),
            index,
            content: format!("chunk {index}"),
            token_count: 2,
            char_count: 7,
            embedding: vec![0.1, 0.2, 0.3],
            checksum: crate::document::checksum(&format!("chunk {index}")),
        }
    }

    #[tokio::test]
    async fn create_get_and_list() {
        let store = test_store().await;
        let doc = Document::new("a.md", "alpha", "sum-a", FileType::Md, "u1");
        store.create_document(&doc).await.unwrap();
        store
            .create_document(&Document::new("b.txt", "beta", "sum-b", FileType::Txt, "u2"))
            .await
            .unwrap();

        let loaded = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "a.md");
        assert_eq!(loaded.file_type, FileType::Md);
        assert_eq!(loaded.status, ProcessingStatus::Pending);
        assert_eq!(store.list_documents(None).await.unwrap().len(), 2);
        assert_eq!(store.list_documents(Some("u2")).await.unwrap().len(), 1);
        assert!(store.get_document("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_ingestion_persists_chunks_in_order() {
        let store = test_store().await;
        let doc = Document::new("a.md", "alpha", "sum-a", FileType::Md, "u1");
        store.create_document(&doc).await.unwrap();
        store
            .update_status(&doc.id, ProcessingStatus::Processing, None)
            .await
            .unwrap();
        store
            .commit_ingestion(&doc, &[chunk(&doc.id, 1), chunk(&doc.id, 0)])
            .await
            .unwrap();

        let chunks = store.list_chunks(&doc.id).await.unwrap();
        assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(chunks[0].embedding, vec![0.1, 0.2, 0.3]);
        let found = store
            .find_completed_by_checksum("u1", "sum-a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, doc.id);
        assert_eq!(found.status, ProcessingStatus::Completed);
    }

    #[tokio::test]
    async fn failed_commit_leaves_no_chunks() {
        let store = test_store().await;
        let doc = Document::new("a.md", "alpha", "sum-a", FileType::Md, "u1");
        store.create_document(&doc).await.unwrap();
        // Duplicate index violates the unique constraint on the second insert.
        let result = store
            .commit_ingestion(&doc, &[chunk(&doc.id, 0), {
                let mut dup = chunk(&doc.id, 0);
                dup.id = "other".into();
                dup
            }])
            .await;
        assert!(result.is_err());
        assert!(store.list_chunks(&doc.id).await.unwrap().is_empty());
        let loaded = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ProcessingStatus::Pending);
    }

    #[tokio::test]
    async fn delete_cascades_to_chunks() {
        let store = test_store().await;
        let doc = Document::new("a.md", "alpha", "sum-a", FileType::Md, "u1");
        store.create_document(&doc).await.unwrap();
        store.commit_ingestion(&doc, &[chunk(&doc.id, 0)]).await.unwrap();
        assert!(store.delete_document(&doc.id).await.unwrap());
        assert!(store.list_chunks(&doc.id).await.unwrap().is_empty());
        assert!(!store.delete_document(&doc.id).await.unwrap());
    }

    #[tokio::test]
    async fn failed_status_records_error() {
        let store = test_store().await;
        let doc = Document::new("a.md", "alpha", "sum-a", FileType::Md, "u1");
        store.create_document(&doc).await.unwrap();
        store
            .update_status(&doc.id, ProcessingStatus::Failed, Some("boom".into()))
            .await
            .unwrap();
        let loaded = store.get_document(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ProcessingStatus::Failed);
        assert_eq!(loaded.error.as_deref(), Some("boom"));
        assert!(
            store
                .find_completed_by_checksum("u1", "sum-a")
                .await
                .unwrap()
                .is_none()
        );
    }
}
