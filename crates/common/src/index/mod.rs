//! Vector index access
//!
//! Provides:
//! - Qdrant over its REST API (query, collection lifecycle, upsert)
//! - A brute-force in-memory cosine index for tests and offline runs

use crate::config::IndexConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Payload key holding passage text
pub const CONTENT_KEY: &str = "page_content";

/// Payload key holding passage metadata
pub const METADATA_KEY: &str = "metadata";

/// A stored passage with its embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexPoint {
    pub id: u64,
    pub vector: Vec<f32>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// One search result in index rank order
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub content: String,
    pub metadata: Option<Value>,
    /// Index similarity; not a relevance score
    pub similarity: f32,
}

/// Trait for nearest-neighbour passage stores
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `limit` passages nearest to `embedding`, best first
    async fn search(&self, embedding: &[f32], limit: usize) -> Result<Vec<IndexHit>>;

    /// Drop the collection if present and create it empty
    async fn recreate_collection(&self, dimension: usize) -> Result<()>;

    /// Insert or replace points
    async fn upsert(&self, points: Vec<IndexPoint>) -> Result<()>;

    /// Check connectivity
    async fn ping(&self) -> Result<()>;
}

/// Qdrant REST client bound to one collection
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
    timeout_ms: u64,
}

#[derive(Deserialize)]
struct QdrantEnvelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct QueryResult {
    points: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Map<String, Value>>,
}

#[derive(Deserialize)]
struct ExistsResult {
    exists: bool,
}

impl QdrantIndex {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            api_key: config.api_key.clone(),
            timeout_ms: config.timeout().as_millis() as u64,
        })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let request = match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout {
                    service: "vector index".to_string(),
                    timeout_ms: self.timeout_ms,
                }
            } else {
                AppError::Index {
                    message: format!("Request failed: {}", e),
                }
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Index {
                message: format!("Qdrant error {}: {}", status, body),
            });
        }

        Ok(response)
    }

    async fn parse<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let envelope: QdrantEnvelope<T> = response.json().await.map_err(|e| AppError::Index {
            message: format!("Malformed Qdrant response: {}", e),
        })?;
        Ok(envelope.result)
    }
}

/// Extract passage text and metadata from a point payload
fn hit_from_payload(
    payload: Option<serde_json::Map<String, Value>>,
    similarity: f32,
) -> Result<IndexHit> {
    let mut payload = payload.ok_or_else(|| AppError::Index {
        message: "Point returned without payload".to_string(),
    })?;

    let content = match payload.remove(CONTENT_KEY) {
        Some(Value::String(content)) => content,
        _ => {
            return Err(AppError::Index {
                message: format!("Point payload has no string '{}'", CONTENT_KEY),
            })
        }
    };

    let metadata = payload.remove(METADATA_KEY).filter(|m| !m.is_null());

    Ok(IndexHit { content, metadata, similarity })
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn search(&self, embedding: &[f32], limit: usize) -> Result<Vec<IndexHit>> {
        let body = json!({
            "query": embedding,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .send(self.client.post(self.collection_url("/points/query")).json(&body))
            .await?;
        let result: QueryResult = self.parse(response).await?;

        debug!(
            collection = %self.collection,
            hits = result.points.len(),
            "Vector search completed"
        );

        result
            .points
            .into_iter()
            .map(|p| hit_from_payload(p.payload, p.score))
            .collect()
    }

    async fn recreate_collection(&self, dimension: usize) -> Result<()> {
        let response = self
            .send(self.client.get(self.collection_url("/exists")))
            .await?;
        let exists: ExistsResult = self.parse(response).await?;

        if exists.exists {
            info!(collection = %self.collection, "Collection exists, deleting");
            self.send(self.client.delete(self.collection_url(""))).await?;
        }

        let body = json!({
            "vectors": { "size": dimension, "distance": "Cosine" }
        });
        self.send(self.client.put(self.collection_url("")).json(&body))
            .await?;

        info!(collection = %self.collection, dimension, "Collection created");
        Ok(())
    }

    async fn upsert(&self, points: Vec<IndexPoint>) -> Result<()> {
        let points: Vec<Value> = points
            .into_iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "vector": p.vector,
                    "payload": {
                        CONTENT_KEY: p.content,
                        METADATA_KEY: p.metadata,
                    },
                })
            })
            .collect();

        let body = json!({ "points": points });
        self.send(
            self.client
                .put(self.collection_url("/points"))
                .query(&[("wait", "true")])
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.send(self.client.get(format!("{}/healthz", self.base_url)))
            .await?;
        Ok(())
    }
}

/// Brute-force cosine index held in memory
#[derive(Default)]
pub struct MemoryIndex {
    points: RwLock<Vec<IndexPoint>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> AppError {
        AppError::Index {
            message: "In-memory index lock poisoned".to_string(),
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn search(&self, embedding: &[f32], limit: usize) -> Result<Vec<IndexHit>> {
        let points = self.points.read().map_err(|_| Self::poisoned())?;

        let mut hits: Vec<IndexHit> = points
            .iter()
            .map(|p| IndexHit {
                content: p.content.clone(),
                metadata: p.metadata.clone(),
                similarity: cosine(embedding, &p.vector),
            })
            .collect();

        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn recreate_collection(&self, _dimension: usize) -> Result<()> {
        self.points.write().map_err(|_| Self::poisoned())?.clear();
        Ok(())
    }

    async fn upsert(&self, new_points: Vec<IndexPoint>) -> Result<()> {
        let mut points = self.points.write().map_err(|_| Self::poisoned())?;
        for point in new_points {
            match points.iter_mut().find(|p| p.id == point.id) {
                Some(existing) => *existing = point,
                None => points.push(point),
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Create an index client based on configuration
pub fn create_index(config: &IndexConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.provider.as_str() {
        "qdrant" => Ok(Arc::new(QdrantIndex::new(config)?)),
        "memory" => Ok(Arc::new(MemoryIndex::new())),
        other => Err(AppError::Configuration {
            message: format!("Unknown index provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{Embedder, MockEmbedder};

    #[test]
    fn test_payload_extraction() {
        let payload = json!({
            "page_content": "Worry exposure",
            "metadata": { "chunk_id": 3, "source": "guide.txt" }
        });
        let hit = hit_from_payload(payload.as_object().cloned(), 0.8).unwrap();
        assert_eq!(hit.content, "Worry exposure");
        assert_eq!(hit.metadata.unwrap()["chunk_id"], 3);
    }

    #[test]
    fn test_malformed_payload_is_index_error() {
        let payload = json!({ "text": "wrong key" });
        let err = hit_from_payload(payload.as_object().cloned(), 0.8).unwrap_err();
        assert!(matches!(err, AppError::Index { .. }));

        assert!(hit_from_payload(None, 0.1).is_err());
    }

    #[tokio::test]
    async fn test_memory_index_round_trip() {
        let embedder = MockEmbedder::new(128);
        let index = MemoryIndex::new();
        let texts = [
            "Worry exposure helps with generalized anxiety",
            "Sleep hygiene improves rest",
            "Problem solving training steps",
        ];

        let mut points = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            points.push(IndexPoint {
                id: i as u64 + 1,
                vector: embedder.encode(text).await.unwrap(),
                content: text.to_string(),
                metadata: Some(json!({ "chunk_id": i + 1 })),
            });
        }
        index.upsert(points).await.unwrap();

        let query = embedder.encode("sleep hygiene").await.unwrap();
        let hits = index.search(&query, 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "Sleep hygiene improves rest");
        assert!(hits[0].similarity >= hits[1].similarity);
    }

    #[tokio::test]
    async fn test_memory_upsert_replaces_by_id() {
        let index = MemoryIndex::new();
        let point = |content: &str| IndexPoint {
            id: 7,
            vector: vec![1.0, 0.0],
            content: content.to_string(),
            metadata: None,
        };

        index.upsert(vec![point("old")]).await.unwrap();
        index.upsert(vec![point("new")]).await.unwrap();

        assert_eq!(index.len(), 1);
        let hits = index.search(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits[0].content, "new");

        index.recreate_collection(2).await.unwrap();
        assert!(index.is_empty());
    }
}
