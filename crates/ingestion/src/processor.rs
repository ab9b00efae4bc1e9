//! Ingestion processor
//!
//! Core logic for populating the vector index: batched embedding, collection
//! recreation and batched upserts.

use crate::chunker::TextChunk;
use crate::errors::IngestionError;
use hmrag_common::embeddings::Embedder;
use hmrag_common::index::{IndexPoint, VectorIndex};
use hmrag_common::metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Outcome of one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub chunks: usize,
    pub points_written: usize,
    pub failed_embedding_batches: usize,
    pub failed_upsert_batches: usize,
}

impl IngestionReport {
    pub fn failed_batches(&self) -> usize {
        self.failed_embedding_batches + self.failed_upsert_batches
    }
}

/// Ingestion processor
pub struct IngestionProcessor {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    embed_batch_size: usize,
    upsert_batch_size: usize,
}

impl IngestionProcessor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        embed_batch_size: usize,
        upsert_batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            embed_batch_size: embed_batch_size.max(1),
            upsert_batch_size: upsert_batch_size.max(1),
        }
    }

    /// Embed chunks batch by batch; failed batches are skipped and counted
    async fn embed_chunks(&self, chunks: &[TextChunk]) -> (Vec<IndexPoint>, usize) {
        let mut points = Vec::with_capacity(chunks.len());
        let mut failed = 0;

        for (batch_no, batch) in chunks.chunks(self.embed_batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();

            match self.embedder.encode_batch(&texts).await {
                Ok(vectors) if vectors.len() != batch.len() => {
                    error!(
                        batch = batch_no,
                        expected = batch.len(),
                        received = vectors.len(),
                        "Embedding batch returned the wrong number of vectors"
                    );
                    failed += 1;
                }
                Ok(vectors) => {
                    points.extend(batch.iter().zip(vectors).map(|(chunk, vector)| IndexPoint {
                        id: chunk.chunk_id,
                        vector,
                        content: chunk.content.clone(),
                        metadata: Some(chunk.metadata()),
                    }));
                }
                Err(e) => {
                    error!(batch = batch_no, size = batch.len(), error = %e, "Embedding batch failed");
                    failed += 1;
                }
            }
        }

        (points, failed)
    }

    /// Replace the collection contents with the given chunks
    #[instrument(skip(self, chunks), fields(chunks = chunks.len()))]
    pub async fn run(&self, chunks: Vec<TextChunk>) -> Result<IngestionReport, IngestionError> {
        let start = Instant::now();
        let mut report = IngestionReport {
            chunks: chunks.len(),
            ..IngestionReport::default()
        };

        info!(model = self.embedder.model_name(), "Embedding chunks...");
        let (points, failed_embedding_batches) = self.embed_chunks(&chunks).await;
        report.failed_embedding_batches = failed_embedding_batches;

        // Leave the existing collection untouched when nothing could be embedded
        if points.is_empty() && !chunks.is_empty() {
            return Err(IngestionError::NothingEmbedded {
                failed_batches: failed_embedding_batches,
            });
        }

        self.index.recreate_collection(self.embedder.dimension()).await?;

        info!(points = points.len(), "Inserting points into the index");
        for (batch_no, batch) in points.chunks(self.upsert_batch_size).enumerate() {
            match self.index.upsert(batch.to_vec()).await {
                Ok(()) => {
                    report.points_written += batch.len();
                    info!(batch = batch_no, points = batch.len(), "Batch inserted");
                }
                Err(e) => {
                    warn!(batch = batch_no, points = batch.len(), error = %e, "Upsert batch failed");
                    report.failed_upsert_batches += 1;
                }
            }
        }

        metrics::record_ingestion(report.points_written, report.failed_batches());
        info!(
            chunks = report.chunks,
            points_written = report.points_written,
            failed_batches = report.failed_batches(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Ingestion complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hmrag_common::embeddings::MockEmbedder;
    use hmrag_common::errors::{AppError, Result};
    use hmrag_common::index::{IndexHit, MemoryIndex};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunks(n: usize) -> Vec<TextChunk> {
        (1..=n as u64)
            .map(|id| TextChunk {
                chunk_id: id,
                content: format!("chunk number {} about worry", id),
                source: "guide.txt".to_string(),
            })
            .collect()
    }

    /// Memory index whose second upsert call fails
    struct FlakyIndex {
        inner: MemoryIndex,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VectorIndex for FlakyIndex {
        async fn search(&self, embedding: &[f32], limit: usize) -> Result<Vec<IndexHit>> {
            self.inner.search(embedding, limit).await
        }
        async fn recreate_collection(&self, dimension: usize) -> Result<()> {
            self.inner.recreate_collection(dimension).await
        }
        async fn upsert(&self, points: Vec<IndexPoint>) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
                return Err(AppError::Index { message: "timeout".into() });
            }
            self.inner.upsert(points).await
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn encode(&self, _: &str) -> Result<Vec<f32>> {
            Err(AppError::Embedding { message: "offline".into() })
        }
        async fn encode_batch(&self, _: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(AppError::Embedding { message: "offline".into() })
        }
        fn model_name(&self) -> &str {
            "down"
        }
        fn dimension(&self) -> usize {
            8
        }
    }

    /// Drops the last vector of every multi-text batch
    struct ShortEmbedder(MockEmbedder);

    #[async_trait]
    impl Embedder for ShortEmbedder {
        async fn encode(&self, text: &str) -> Result<Vec<f32>> {
            self.0.encode(text).await
        }
        async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut vectors = self.0.encode_batch(texts).await?;
            if texts.len() > 1 {
                vectors.pop();
            }
            Ok(vectors)
        }
        fn model_name(&self) -> &str {
            "short"
        }
        fn dimension(&self) -> usize {
            self.0.dimension()
        }
    }

    #[tokio::test]
    async fn test_run_populates_index() {
        let index = Arc::new(MemoryIndex::new());
        let processor =
            IngestionProcessor::new(Arc::new(MockEmbedder::new(64)), index.clone(), 4, 5);

        let report = processor.run(chunks(12)).await.unwrap();
        assert_eq!(report.points_written, 12);
        assert_eq!(report.failed_batches(), 0);
        assert_eq!(index.len(), 12);
    }

    #[tokio::test]
    async fn test_failed_upsert_batch_is_counted_and_skipped() {
        let index = Arc::new(FlakyIndex { inner: MemoryIndex::new(), calls: AtomicUsize::new(0) });
        let processor =
            IngestionProcessor::new(Arc::new(MockEmbedder::new(64)), index.clone(), 32, 5);

        let report = processor.run(chunks(12)).await.unwrap();
        assert_eq!(report.failed_upsert_batches, 1);
        assert_eq!(report.points_written, 7);
        assert_eq!(index.inner.len(), 7);
    }

    #[tokio::test]
    async fn test_vector_count_mismatch_fails_the_batch() {
        let index = Arc::new(MemoryIndex::new());
        let processor =
            IngestionProcessor::new(Arc::new(ShortEmbedder(MockEmbedder::new(64))), index.clone(), 4, 5);

        // Batches of 4, 4 and 1; only the single-chunk batch comes back whole
        let report = processor.run(chunks(9)).await.unwrap();
        assert_eq!(report.failed_embedding_batches, 2);
        assert_eq!(report.points_written, 1);
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_nothing_embedded_keeps_collection() {
        let index = Arc::new(MemoryIndex::new());
        index
            .upsert(vec![IndexPoint { id: 1, vector: vec![1.0; 8], content: "old".into(), metadata: None }])
            .await
            .unwrap();
        let processor = IngestionProcessor::new(Arc::new(DownEmbedder), index.clone(), 4, 5);

        let result = processor.run(chunks(6)).await;
        assert!(matches!(result, Err(IngestionError::NothingEmbedded { failed_batches: 2 })));
        assert_eq!(index.len(), 1);
    }
}
