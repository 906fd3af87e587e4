//! Qdrant-backed [`VectorStore`].

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    CollectionInfo, CountPointsBuilder, CreateCollectionBuilder, GetCollectionInfoRequest,
    PointStruct, ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder, Value,
    VectorParamsBuilder, value::Kind, vectors_config,
};
use serde_json::json;
use tokio::sync::Mutex;

use crate::vector_store::{
    BoxFuture, Distance, Metadata, SearchHit, VectorRecord, VectorStore, VectorStoreError,
    align_triples, check_dimensions,
};

#[derive(Debug, Default)]
struct CollectionState {
    dimension: Option<usize>,
    /// The existing collection (if any) has been inspected.
    synced: bool,
    next_seq: Option<u64>,
}

/// One Qdrant collection. Created lazily on first insert with the observed dimension; an
/// existing collection keeps its configured vector size.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    distance: Distance,
    state: Mutex<CollectionState>,
}

impl std::fmt::Debug for QdrantVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantVectorStore")
            .field("collection", &self.collection)
            .field("distance", &self.distance)
            .finish_non_exhaustive()
    }
}

impl QdrantVectorStore {
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be created.
    pub fn new(
        url: &str,
        collection: String,
        distance: Distance,
    ) -> Result<Self, VectorStoreError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            collection,
            distance,
            state: Mutex::new(CollectionState::default()),
        })
    }

    async fn ensure_collection(&self, vector_size: usize) -> Result<(), VectorStoreError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
        if exists {
            return Ok(());
        }
        let metric = match self.distance {
            Distance::L2 => qdrant_client::qdrant::Distance::Euclid,
            Distance::Cosine => qdrant_client::qdrant::Distance::Cosine,
        };
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(vector_size as u64, metric)),
            )
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
        tracing::info!(collection = %self.collection, vector_size, "created qdrant collection");
        Ok(())
    }

    /// Adopt the vector size of an already existing collection, once.
    async fn sync_dimension(&self, state: &mut CollectionState) -> Result<(), VectorStoreError> {
        if state.synced || state.dimension.is_some() {
            return Ok(());
        }
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
        if exists {
            let response = self
                .client
                .collection_info(GetCollectionInfoRequest {
                    collection_name: self.collection.clone(),
                })
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            state.dimension = response.result.as_ref().and_then(configured_dimension);
            tracing::debug!(collection = %self.collection, dimension = ?state.dimension, "attached to existing qdrant collection");
        }
        state.synced = true;
        Ok(())
    }

    async fn point_count(&self) -> Result<u64, VectorStoreError> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
        Ok(response.result.map_or(0, |r| r.count))
    }
}

impl VectorStore for QdrantVectorStore {
    fn add_embeddings(
        &self,
        texts: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadata: Option<Vec<Metadata>>,
    ) -> BoxFuture<'_, Result<Vec<String>, VectorStoreError>> {
        Box::pin(async move {
            let triples = align_triples(texts, embeddings, metadata)?;
            let vectors: Vec<Vec<f32>> = triples.iter().map(|(_, e, _)| e.clone()).collect();

            let mut state = self.state.lock().await;
            self.sync_dimension(&mut state).await?;
            let Some(dimension) = check_dimensions(state.dimension, &vectors)? else {
                return Ok(Vec::new());
            };
            if state.dimension.is_none() {
                self.ensure_collection(dimension).await?;
                state.dimension = Some(dimension);
            }
            let mut seq = match state.next_seq {
                Some(seq) => seq,
                None => self.point_count().await?,
            };

            let mut ids = Vec::with_capacity(triples.len());
            let mut points = Vec::with_capacity(triples.len());
            for (text, vector, metadata) in triples {
                let id = uuid::Uuid::new_v4().to_string();
                let payload: HashMap<String, Value> =
                    serde_json::from_value(json!({
                        "text": text,
                        "seq": seq,
                        "metadata": metadata,
                    }))
                    .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
                points.push(PointStruct::new(id.clone(), vector, payload));
                ids.push(id);
                seq += 1;
            }

            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
                .await
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            state.next_seq = Some(seq);
            Ok(ids)
        })
    }

    fn search(
        &self,
        query: Vec<f32>,
        k: usize,
    ) -> BoxFuture<'_, Result<Vec<SearchHit>, VectorStoreError>> {
        Box::pin(async move {
            let expected = {
                let mut state = self.state.lock().await;
                self.sync_dimension(&mut state).await?;
                state.dimension
            };
            if let Some(expected) = expected
                && expected != query.len()
            {
                return Err(VectorStoreError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
            if k == 0 {
                return Ok(Vec::new());
            }
            let response = self
                .client
                .search_points(
                    SearchPointsBuilder::new(&self.collection, query, k as u64).with_payload(true),
                )
                .await
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;

            let mut hits: Vec<(u64, SearchHit)> = response
                .result
                .into_iter()
                .map(|point| scored_point_to_hit(point, self.distance))
                .collect();
            hits.sort_by(|(seq_a, a), (seq_b, b)| {
                a.distance
                    .total_cmp(&b.distance)
                    .then_with(|| seq_a.cmp(seq_b))
            });
            Ok(hits.into_iter().map(|(_, hit)| hit).collect())
        })
    }

    fn len(&self) -> BoxFuture<'_, Result<usize, VectorStoreError>> {
        Box::pin(async move {
            let exists = self
                .client
                .collection_exists(&self.collection)
                .await
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            if !exists {
                return Ok(0);
            }
            let count = self.point_count().await?;
            usize::try_from(count).map_err(|e| VectorStoreError::Collection(e.to_string()))
        })
    }

    fn backend(&self) -> &'static str {
        "qdrant"
    }
}

fn configured_dimension(info: &CollectionInfo) -> Option<usize> {
    let vectors = info.config.as_ref()?.params.as_ref()?.vectors_config.as_ref()?;
    match vectors.config.as_ref()? {
        vectors_config::Config::Params(params) => usize::try_from(params.size).ok(),
        vectors_config::Config::ParamsMap(_) => None,
    }
}

fn score_to_distance(score: f32, distance: Distance) -> f32 {
    match distance {
        Distance::L2 => score,
        Distance::Cosine => 1.0 - score,
    }
}

fn scored_point_to_hit(point: ScoredPoint, distance: Distance) -> (u64, SearchHit) {
    let id = match point.id.and_then(|pid| pid.point_id_options) {
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    };
    let mut payload = point.payload;
    let text = payload
        .remove("text")
        .and_then(|v| match v.kind {
            Some(Kind::StringValue(s)) => Some(s),
            _ => None,
        })
        .unwrap_or_default();
    let seq = payload
        .remove("seq")
        .and_then(|v| match v.kind {
            Some(Kind::IntegerValue(i)) => u64::try_from(i).ok(),
            _ => None,
        })
        .unwrap_or(u64::MAX);
    let metadata = match payload.remove("metadata").map(value_to_json) {
        Some(serde_json::Value::Object(map)) => map.into_iter().collect(),
        _ => Metadata::new(),
    };
    (
        seq,
        SearchHit {
            record: VectorRecord { id, text, metadata },
            distance: score_to_distance(point.score, distance),
        },
    )
}

fn value_to_json(value: Value) -> serde_json::Value {
    match value.kind {
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::IntegerValue(i)) => serde_json::Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::StructValue(s)) => serde_json::Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, value_to_json(v)))
                .collect(),
        ),
        Some(Kind::ListValue(l)) => {
            serde_json::Value::Array(l.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_scores_become_distances() {
        assert!((score_to_distance(0.9, Distance::Cosine) - 0.1).abs() < 1e-6);
        assert!((score_to_distance(2.5, Distance::L2) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn payload_round_trips_nested_metadata() {
        let payload: HashMap<String, Value> = serde_json::from_value(json!({
            "text": "hello",
            "seq": 7,
            "metadata": {"doc": "a.md", "chunk": 2, "tags": ["x"]},
        }))
        .unwrap();
        let point = ScoredPoint {
            payload,
            score: 0.25,
            ..ScoredPoint::default()
        };
        let (seq, hit) = scored_point_to_hit(point, Distance::Cosine);
        assert_eq!(seq, 7);
        assert_eq!(hit.record.text, "hello");
        assert_eq!(hit.record.metadata["doc"], "a.md");
        assert_eq!(hit.record.metadata["chunk"], 2);
        assert_eq!(hit.record.metadata["tags"], json!(["x"]));
        assert!((hit.distance - 0.75).abs() < 1e-6);
    }

    #[test]
    fn dimension_is_read_from_collection_config() {
        use qdrant_client::qdrant::{CollectionConfig, CollectionParams, VectorParams, VectorsConfig};

        let info = CollectionInfo {
            config: Some(CollectionConfig {
                params: Some(CollectionParams {
                    vectors_config: Some(VectorsConfig {
                        config: Some(vectors_config::Config::Params(VectorParams {
                            size: 384,
                            ..VectorParams::default()
                        })),
                    }),
                    ..CollectionParams::default()
                }),
                ..CollectionConfig::default()
            }),
            ..CollectionInfo::default()
        };
        assert_eq!(configured_dimension(&info), Some(384));
        assert_eq!(configured_dimension(&CollectionInfo::default()), None);
    }

    #[test]
    fn construction_does_not_connect() {
        let store =
            QdrantVectorStore::new("http://127.0.0.1:1", "c".into(), Distance::L2).unwrap();
        assert_eq!(store.backend(), "qdrant");
        assert!(format!("{store:?}").contains("QdrantVectorStore"));
    }
}
