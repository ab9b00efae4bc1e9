//! Context Engine Core Components
//!
//! The answer pipeline, leaves first:
//! - Intent decomposition into independent sub-queries
//! - Dense retrieval per sub-query
//! - Cross-encoder reranking per sub-query
//! - Evidence merging and orchestration
//! - Answer synthesis from evidence
//! - Hybrid routing between the fine-tuned model and retrieval

mod decomposer;
mod orchestrator;
mod reranker;
mod retriever;
mod router;
mod synthesizer;

pub use decomposer::{parse_intent_count, split_sub_queries, IntentDecomposer};
pub use orchestrator::{merge_evidence, RetrievalOrchestrator};
pub use reranker::PassageReranker;
pub use retriever::SubQueryRetriever;
pub use router::{needs_retrieval, HybridRouter};
pub use synthesizer::{build_summary_prompt, AnswerSynthesizer};

pub use crate::llm::{ConversationTurn, Role};

use crate::config::AppConfig;
use crate::embeddings::{create_embedder, Embedder};
use crate::errors::Result;
use crate::index::{create_index, IndexHit, VectorIndex};
use crate::llm::{create_generator, Generator};
use crate::rerank::{create_scorer, RelevanceScorer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Answer returned when no sub-query produced any evidence
pub const NO_EVIDENCE_ANSWER: &str = "⚠ No relevant documents found";

/// Answer returned when the synthesis backend fails
pub const SYNTHESIS_FAILED_ANSWER: &str = "⚠ Answer generation failed";

/// A retrieved passage before reranking
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub content: String,
    pub metadata: Option<serde_json::Value>,
}

impl From<IndexHit> for Candidate {
    fn from(hit: IndexHit) -> Self {
        Self {
            content: hit.content,
            metadata: hit.metadata,
        }
    }
}

/// A reranked unit of evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Passage text
    pub content: String,

    /// Source identifier and chunk index, when the index stores them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    /// Relevance score; comparable only within one reranker call
    pub score: f32,
}

/// Which path produced the final answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerPath {
    Direct,
    RetrievalAugmented,
}

impl AnswerPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerPath::Direct => "direct",
            AnswerPath::RetrievalAugmented => "retrieval_augmented",
        }
    }
}

/// Output of one orchestrator run
#[derive(Debug, Clone)]
pub struct Prediction {
    pub answer: String,
    pub evidence: Vec<Passage>,
    pub sub_queries: Vec<String>,
    /// Sub-queries skipped after a retrieval or reranking error
    pub failed_sub_queries: Vec<String>,
}

/// Final answer with provenance
#[derive(Debug, Clone)]
pub struct RoutedAnswer {
    pub answer: String,
    pub path: AnswerPath,
    /// Empty on the direct path
    pub evidence: Vec<Passage>,
    /// Candidate from the fine-tuned model, kept for diagnostics
    pub finetuned_response: String,
    pub sub_queries: Vec<String>,
    pub failed_sub_queries: Vec<String>,
}

impl RoutedAnswer {
    pub fn used_retrieval(&self) -> bool {
        self.path == AnswerPath::RetrievalAugmented
    }
}

/// Per-call deadlines for external backends
#[derive(Debug, Clone, Copy)]
pub struct BackendTimeouts {
    pub generation: Duration,
    pub finetuned: Duration,
    pub embedding: Duration,
    pub reranker: Duration,
    pub index: Duration,
}

impl BackendTimeouts {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            generation: config.generation.timeout(),
            finetuned: config.finetuned.timeout(),
            embedding: config.embedding.timeout(),
            reranker: config.reranker.timeout(),
            index: config.index.timeout(),
        }
    }
}

impl Default for BackendTimeouts {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Process-lifetime handles to every external collaborator
#[derive(Clone)]
pub struct Backends {
    /// General-purpose model for decomposition and synthesis
    pub general: Arc<dyn Generator>,
    /// Fine-tuned model for direct answers
    pub finetuned: Arc<dyn Generator>,
    pub embedder: Arc<dyn Embedder>,
    pub scorer: Arc<dyn RelevanceScorer>,
    pub index: Arc<dyn VectorIndex>,
    pub timeouts: BackendTimeouts,
}

impl Backends {
    /// Build every client once at startup
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;

        let backends = Self {
            general: create_generator(&config.generation)?,
            finetuned: create_generator(&config.finetuned)?,
            embedder: create_embedder(&config.embedding)?,
            scorer: create_scorer(&config.reranker)?,
            index: create_index(&config.index)?,
            timeouts: BackendTimeouts::from_config(config),
        };

        info!(
            general = backends.general.model_name(),
            finetuned = backends.finetuned.model_name(),
            embedding = backends.embedder.model_name(),
            reranker = backends.scorer.model_name(),
            index = %config.index.provider,
            "Backends initialized"
        );

        Ok(backends)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for context tests

    use super::*;
    use crate::embeddings::MockEmbedder;
    use crate::index::{IndexPoint, MemoryIndex};
    use crate::llm::MockGenerator;
    use crate::rerank::MockScorer;

    pub const CORPUS: &[&str] = &[
        "Worry exposure asks the patient to imagine the feared outcome in detail.",
        "Generalized anxiety disorder involves persistent and excessive worry.",
        "Sleep hygiene covers regular bedtimes and avoiding screens before sleep.",
        "Problem solving training breaks a difficulty into concrete steps.",
        "Relaxation training teaches progressive muscle relaxation.",
    ];

    pub async fn memory_index(embedder: &MockEmbedder) -> Arc<MemoryIndex> {
        let index = Arc::new(MemoryIndex::new());
        let mut points = Vec::new();
        for (i, text) in CORPUS.iter().enumerate() {
            points.push(IndexPoint {
                id: i as u64 + 1,
                vector: embedder.encode(text).await.unwrap(),
                content: text.to_string(),
                metadata: Some(serde_json::json!({ "chunk_id": i + 1, "source": "guide.txt" })),
            });
        }
        index.upsert(points).await.unwrap();
        index
    }

    /// Backends over the in-memory corpus with the given generators
    pub async fn backends(general: MockGenerator, finetuned: MockGenerator) -> Backends {
        let embedder = MockEmbedder::new(256);
        let index = memory_index(&embedder).await;
        Backends {
            general: Arc::new(general),
            finetuned: Arc::new(finetuned),
            embedder: Arc::new(embedder),
            scorer: Arc::new(MockScorer),
            index,
            timeouts: BackendTimeouts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backends_from_mock_config() {
        let mut config = AppConfig::default();
        config.generation.provider = "mock".into();
        config.finetuned.provider = "mock".into();
        config.embedding.provider = "mock".into();
        config.reranker.provider = "mock".into();
        config.index.provider = "memory".into();

        let backends = Backends::from_config(&config).unwrap();
        assert_eq!(backends.embedder.dimension(), 1024);
        assert_eq!(backends.timeouts.index, config.index.timeout());
    }

    #[test]
    fn test_unknown_provider_fails_construction() {
        let mut config = AppConfig::default();
        config.index.provider = "faiss".into();
        assert!(Backends::from_config(&config).is_err());
    }

    #[test]
    fn test_invalid_pipeline_fails_construction() {
        let mut config = AppConfig::default();
        config.index.provider = "memory".into();
        config.pipeline.evidence_limit = 0;

        let result = Backends::from_config(&config);
        assert!(matches!(result, Err(crate::errors::AppError::Configuration { .. })));
    }

    #[test]
    fn test_passage_serialization_skips_missing_metadata() {
        let passage = Passage { content: "text".into(), metadata: None, score: 0.5 };
        let json = serde_json::to_value(&passage).unwrap();
        assert!(json.get("metadata").is_none());
        assert_eq!(AnswerPath::RetrievalAugmented.as_str(), "retrieval_augmented");
    }
}
