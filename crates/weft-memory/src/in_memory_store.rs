use std::sync::RwLock;

use crate::vector_store::{
    BoxFuture, Distance, Metadata, SearchHit, VectorRecord, VectorStore, VectorStoreError,
    align_triples, check_dimensions,
};

struct StoredRecord {
    record: VectorRecord,
    vector: Vec<f32>,
}

#[derive(Default)]
struct Inner {
    records: Vec<StoredRecord>,
    dimension: Option<usize>,
}

/// Brute-force store keeping records in insertion order.
pub struct InMemoryVectorStore {
    inner: RwLock<Inner>,
    distance: Distance,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new(distance: Distance) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            distance,
        }
    }

    /// Dimension fixed by the first insert, if any.
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.inner.read().ok().and_then(|inner| inner.dimension)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().map_or(true, |inner| inner.records.is_empty())
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new(Distance::default())
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .field("distance", &self.distance)
            .finish_non_exhaustive()
    }
}

impl VectorStore for InMemoryVectorStore {
    fn add_embeddings(
        &self,
        texts: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadata: Option<Vec<Metadata>>,
    ) -> BoxFuture<'_, Result<Vec<String>, VectorStoreError>> {
        Box::pin(async move {
            let triples = align_triples(texts, embeddings, metadata)?;
            let mut inner = self
                .inner
                .write()
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            let vectors: Vec<Vec<f32>> = triples.iter().map(|(_, e, _)| e.clone()).collect();
            inner.dimension = check_dimensions(inner.dimension, &vectors)?;

            let mut ids = Vec::with_capacity(triples.len());
            for (text, vector, metadata) in triples {
                let id = uuid::Uuid::new_v4().to_string();
                ids.push(id.clone());
                inner.records.push(StoredRecord {
                    record: VectorRecord { id, text, metadata },
                    vector,
                });
            }
            Ok(ids)
        })
    }

    fn search(
        &self,
        query: Vec<f32>,
        k: usize,
    ) -> BoxFuture<'_, Result<Vec<SearchHit>, VectorStoreError>> {
        Box::pin(async move {
            let inner = self
                .inner
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            if let Some(expected) = inner.dimension
                && expected != query.len()
            {
                return Err(VectorStoreError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }

            let mut hits: Vec<SearchHit> = inner
                .records
                .iter()
                .map(|stored| SearchHit {
                    record: stored.record.clone(),
                    distance: self.distance.between(&query, &stored.vector),
                })
                .collect();
            // Stable: equal distances keep insertion order.
            hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            hits.truncate(k);
            Ok(hits)
        })
    }

    fn len(&self) -> BoxFuture<'_, Result<usize, VectorStoreError>> {
        Box::pin(async move {
            self.inner
                .read()
                .map(|inner| inner.records.len())
                .map_err(|e| VectorStoreError::Search(e.to_string()))
        })
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    #[tokio::test]
    async fn search_orders_by_ascending_distance() {
        let store = InMemoryVectorStore::new(Distance::L2);
        store
            .add_embeddings(
                texts(&["far", "near", "mid"]),
                vec![vec![0.9, 0.0], vec![0.1, 0.0], vec![0.4, 0.0]],
                None,
            )
            .await
            .unwrap();

        let hits = store.search(vec![0.0, 0.0], 2).await.unwrap();
        let names: Vec<&str> = hits.iter().map(|h| h.record.text.as_str()).collect();
        assert_eq!(names, vec!["near", "mid"]);
        assert!((hits[0].distance - 0.1).abs() < 1e-6);
        assert!((hits[1].distance - 0.4).abs() < 1e-6);
    }

    #[tokio::test]
    async fn k_larger_than_store_returns_everything() {
        let store = InMemoryVectorStore::default();
        store
            .add_embeddings(texts(&["a", "b"]), vec![vec![1.0], vec![2.0]], None)
            .await
            .unwrap();
        let hits = store.search(vec![0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let store = InMemoryVectorStore::default();
        store
            .add_embeddings(
                texts(&["first", "second", "third"]),
                vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]],
                None,
            )
            .await
            .unwrap();
        let hits = store.search(vec![0.0, 0.0], 3).await.unwrap();
        let names: Vec<&str> = hits.iter().map(|h| h.record.text.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn mismatched_dimension_is_rejected() {
        let store = InMemoryVectorStore::default();
        store
            .add_embeddings(texts(&["a"]), vec![vec![1.0, 2.0, 3.0]], None)
            .await
            .unwrap();
        let err = store
            .add_embeddings(texts(&["b"]), vec![vec![1.0, 2.0]], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(store.len().await.unwrap(), 1);
        assert!(store.search(vec![1.0], 1).await.is_err());
    }

    #[tokio::test]
    async fn metadata_is_returned_with_hits() {
        let store = InMemoryVectorStore::new(Distance::Cosine);
        let meta = Metadata::from([("doc".into(), serde_json::json!("guide.md"))]);
        store
            .add_embeddings(texts(&["a"]), vec![vec![1.0, 0.0]], Some(vec![meta]))
            .await
            .unwrap();
        let hits = store.search(vec![1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].record.metadata["doc"], "guide.md");
        assert!(hits[0].distance.abs() < 1e-6);
        assert_eq!(store.dimension(), Some(2));
        assert!(!store.is_empty());
    }
}
