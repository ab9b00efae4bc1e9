//! Sub-query Retriever - dense retrieval for one sub-query

use super::{BackendTimeouts, Candidate};
use crate::embeddings::Embedder;
use crate::errors::{with_timeout, Result};
use crate::index::VectorIndex;
use crate::metrics::record_backend_call;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Embeds a sub-query and fetches its nearest passages
pub struct SubQueryRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    timeouts: BackendTimeouts,
}

impl SubQueryRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
        timeouts: BackendTimeouts,
    ) -> Self {
        Self { embedder, index, top_k, timeouts }
    }

    /// Return up to `top_k` candidates in index rank order.
    ///
    /// Embedding or index failures are returned as errors, never as an empty list.
    pub async fn retrieve(&self, sub_query: &str) -> Result<Vec<Candidate>> {
        let start = Instant::now();
        let embedding = with_timeout(
            "embedding",
            self.timeouts.embedding,
            self.embedder.encode(sub_query),
        )
        .await;
        record_backend_call("embedding", start.elapsed().as_secs_f64(), embedding.is_ok());
        let embedding = embedding?;

        let start = Instant::now();
        let hits = with_timeout(
            "vector index",
            self.timeouts.index,
            self.index.search(&embedding, self.top_k),
        )
        .await;
        record_backend_call("index", start.elapsed().as_secs_f64(), hits.is_ok());
        let hits = hits?;

        debug!(sub_query, hits = hits.len(), "Retrieved candidates");
        Ok(hits.into_iter().map(Candidate::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::memory_index;
    use crate::embeddings::MockEmbedder;
    use crate::errors::AppError;
    use crate::index::IndexHit;
    use async_trait::async_trait;

    struct DownIndex;

    #[async_trait]
    impl VectorIndex for DownIndex {
        async fn search(&self, _: &[f32], _: usize) -> Result<Vec<IndexHit>> {
            Err(AppError::Index { message: "connection refused".into() })
        }
        async fn recreate_collection(&self, _: usize) -> Result<()> {
            Ok(())
        }
        async fn upsert(&self, _: Vec<crate::index::IndexPoint>) -> Result<()> {
            Ok(())
        }
        async fn ping(&self) -> Result<()> {
            Err(AppError::Index { message: "connection refused".into() })
        }
    }

    #[tokio::test]
    async fn test_retrieve_respects_top_k_and_rank() {
        let embedder = MockEmbedder::new(256);
        let index = memory_index(&embedder).await;
        let retriever =
            SubQueryRetriever::new(Arc::new(embedder), index, 3, BackendTimeouts::default());

        let candidates = retriever.retrieve("sleep hygiene bedtimes").await.unwrap();
        assert_eq!(candidates.len(), 3);
        assert!(candidates[0].content.starts_with("Sleep hygiene"));
        assert!(candidates[0].metadata.is_some());
    }

    #[tokio::test]
    async fn test_index_failure_is_an_error() {
        let retriever = SubQueryRetriever::new(
            Arc::new(MockEmbedder::new(16)),
            Arc::new(DownIndex),
            10,
            BackendTimeouts::default(),
        );

        let err = retriever.retrieve("anything").await.unwrap_err();
        assert!(matches!(err, AppError::Index { .. }));
    }
}
