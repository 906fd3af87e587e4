use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::in_memory_store::InMemoryVectorStore;
use crate::qdrant::QdrantVectorStore;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error(
        "length mismatch: {texts} texts, {embeddings} embeddings, {metadata} metadata entries"
    )]
    LengthMismatch {
        texts: usize,
        embeddings: usize,
        metadata: usize,
    },
    #[error("dimension mismatch: store holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("empty embedding vector")]
    EmptyVector,
    #[error("unknown vector store backend: {0}")]
    UnknownBackend(String),
    #[error("unknown distance metric: {0}")]
    UnknownDistance(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("collection error: {0}")]
    Collection(String),
    #[error("upsert error: {0}")]
    Upsert(String),
    #[error("search error: {0}")]
    Search(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Metadata = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record: VectorRecord,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Euclidean distance.
    #[default]
    L2,
    /// `1 - cosine similarity`.
    Cosine,
}

impl Distance {
    #[must_use]
    pub fn between(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            Self::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                1.0 - dot / (norm_a * norm_b)
            }
        }
    }
}

impl FromStr for Distance {
    type Err = VectorStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "l2" | "euclid" => Ok(Self::L2),
            "cosine" => Ok(Self::Cosine),
            other => Err(VectorStoreError::UnknownDistance(other.to_owned())),
        }
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Pluggable nearest-neighbour store. Every vector in one store has the same dimension.
pub trait VectorStore: Send + Sync {
    /// Insert aligned `(text, embedding, metadata)` triples and return the new record ids.
    ///
    /// `metadata` of `None` attaches an empty map to every record.
    fn add_embeddings(
        &self,
        texts: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadata: Option<Vec<Metadata>>,
    ) -> BoxFuture<'_, Result<Vec<String>, VectorStoreError>>;

    /// Up to `k` records ordered by ascending distance; ties keep insertion order.
    fn search(
        &self,
        query: Vec<f32>,
        k: usize,
    ) -> BoxFuture<'_, Result<Vec<SearchHit>, VectorStoreError>>;

    fn len(&self) -> BoxFuture<'_, Result<usize, VectorStoreError>>;

    fn backend(&self) -> &'static str;
}

/// Align the three insertion sequences, filling missing metadata with empty maps.
///
/// # Errors
///
/// Returns [`VectorStoreError::LengthMismatch`] if the lengths differ and
/// [`VectorStoreError::EmptyVector`] if any embedding is empty.
pub fn align_triples(
    texts: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    metadata: Option<Vec<Metadata>>,
) -> Result<Vec<(String, Vec<f32>, Metadata)>, VectorStoreError> {
    let metadata = metadata.unwrap_or_else(|| vec![Metadata::new(); texts.len()]);
    if texts.len() != embeddings.len() || texts.len() != metadata.len() {
        return Err(VectorStoreError::LengthMismatch {
            texts: texts.len(),
            embeddings: embeddings.len(),
            metadata: metadata.len(),
        });
    }
    if embeddings.iter().any(Vec::is_empty) {
        return Err(VectorStoreError::EmptyVector);
    }
    Ok(texts
        .into_iter()
        .zip(embeddings)
        .zip(metadata)
        .map(|((t, e), m)| (t, e, m))
        .collect())
}

/// Check every embedding against the store's dimension (or the first embedding's when unset).
///
/// # Errors
///
/// Returns [`VectorStoreError::DimensionMismatch`] on the first offending vector.
pub fn check_dimensions(
    known: Option<usize>,
    embeddings: &[Vec<f32>],
) -> Result<Option<usize>, VectorStoreError> {
    let expected = known.or_else(|| embeddings.first().map(Vec::len));
    if let Some(expected) = expected
        && let Some(bad) = embeddings.iter().find(|e| e.len() != expected)
    {
        return Err(VectorStoreError::DimensionMismatch {
            expected,
            actual: bad.len(),
        });
    }
    Ok(expected)
}

pub const SUPPORTED_BACKENDS: &[&str] = &["memory", "qdrant"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: String,
    pub qdrant_url: String,
    pub collection: String,
    pub distance: Distance,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".into(),
            qdrant_url: "http://localhost:6334".into(),
            collection: "weft_documents".into(),
            distance: Distance::L2,
        }
    }
}

impl VectorStoreConfig {
    /// # Errors
    ///
    /// Returns [`VectorStoreError::UnknownBackend`] for a backend outside [`SUPPORTED_BACKENDS`].
    pub fn validate(&self) -> Result<(), VectorStoreError> {
        if SUPPORTED_BACKENDS.contains(&self.backend.as_str()) {
            Ok(())
        } else {
            Err(VectorStoreError::UnknownBackend(self.backend.clone()))
        }
    }
}

/// Build the configured backend.
///
/// # Errors
///
/// Returns [`VectorStoreError::UnknownBackend`] for an unrecognised backend, or a connection
/// error if the Qdrant client cannot be created.
pub fn create_vector_store(
    config: &VectorStoreConfig,
) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    config.validate()?;
    let store: Arc<dyn VectorStore> = match config.backend.as_str() {
        "qdrant" => Arc::new(QdrantVectorStore::new(
            &config.qdrant_url,
            config.collection.clone(),
            config.distance,
        )?),
        _ => Arc::new(InMemoryVectorStore::new(config.distance)),
    };
    tracing::info!(backend = store.backend(), "vector store ready");
    Ok(store)
}
