//! Retrieval Orchestrator - drives decomposition, retrieval, reranking and synthesis
//!
//! Provides:
//! - Per-sub-query retrieval and reranking, optionally concurrent
//! - Skip-and-continue on per-sub-query failures
//! - Evidence merging under the configured policy
//! - The no-evidence terminal state

use super::{
    AnswerSynthesizer, Backends, IntentDecomposer, Passage, PassageReranker, Prediction,
    SubQueryRetriever, NO_EVIDENCE_ANSWER,
};
use crate::config::{MergePolicy, PipelineConfig};
use crate::errors::{AppError, Result};
use crate::metrics::{record_pipeline, record_sub_query_failure};
use futures::future::join_all;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Result of one sub-query: its reranked passages, or the failing stage and error
type SubQueryOutcome = std::result::Result<Vec<Passage>, (&'static str, AppError)>;

/// Fuse per-sub-query ranked lists into the evidence set.
///
/// `Concatenate` appends lists in sub-query order and keeps the first `limit`
/// entries, so a later sub-query's passages never displace an earlier one's.
/// `GlobalSort` stably re-sorts the whole accumulator by score first.
pub fn merge_evidence(
    ranked_lists: Vec<Vec<Passage>>,
    limit: usize,
    policy: MergePolicy,
) -> Vec<Passage> {
    let mut evidence: Vec<Passage> = ranked_lists.into_iter().flatten().collect();

    if policy == MergePolicy::GlobalSort {
        evidence.sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    evidence.truncate(limit);
    evidence
}

/// Multi-sub-query retrieval pipeline
pub struct RetrievalOrchestrator {
    decomposer: IntentDecomposer,
    retriever: SubQueryRetriever,
    reranker: PassageReranker,
    synthesizer: AnswerSynthesizer,
    evidence_limit: usize,
    merge_policy: MergePolicy,
    concurrent: bool,
}

impl RetrievalOrchestrator {
    pub fn new(
        decomposer: IntentDecomposer,
        retriever: SubQueryRetriever,
        reranker: PassageReranker,
        synthesizer: AnswerSynthesizer,
        pipeline: &PipelineConfig,
    ) -> Self {
        Self {
            decomposer,
            retriever,
            reranker,
            synthesizer,
            evidence_limit: pipeline.evidence_limit,
            merge_policy: pipeline.merge_policy,
            concurrent: pipeline.concurrent_sub_queries,
        }
    }

    /// Wire every stage from the shared backends
    pub fn from_backends(backends: &Backends, pipeline: &PipelineConfig) -> Self {
        let timeouts = backends.timeouts;
        Self::new(
            IntentDecomposer::new(
                backends.general.clone(),
                pipeline.sub_query_delimiter.clone(),
                timeouts.generation,
            ),
            SubQueryRetriever::new(
                backends.embedder.clone(),
                backends.index.clone(),
                pipeline.retrieve_top_k,
                timeouts,
            ),
            PassageReranker::new(backends.scorer.clone(), pipeline.rerank_top_k, timeouts.reranker),
            AnswerSynthesizer::new(backends.general.clone(), timeouts.generation),
            pipeline,
        )
    }

    async fn process(&self, sub_query: &str) -> SubQueryOutcome {
        let candidates = self
            .retriever
            .retrieve(sub_query)
            .await
            .map_err(|e| ("retrieval", e))?;

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        self.reranker
            .rerank(sub_query, candidates)
            .await
            .map_err(|e| ("reranking", e))
    }

    /// Answer a query from retrieved evidence.
    ///
    /// Failing sub-queries are skipped. Only when every sub-query failed is the
    /// last error returned, so an outage stays distinguishable from no evidence.
    #[instrument(skip(self), fields(policy = ?self.merge_policy))]
    pub async fn predict(&self, query: &str) -> Result<Prediction> {
        let start = Instant::now();
        let sub_queries = self.decomposer.decompose(query).await;

        // join_all yields outputs in input order
        let outcomes: Vec<SubQueryOutcome> = if self.concurrent {
            join_all(sub_queries.iter().map(|sq| self.process(sq))).await
        } else {
            let mut outcomes = Vec::with_capacity(sub_queries.len());
            for sq in &sub_queries {
                outcomes.push(self.process(sq).await);
            }
            outcomes
        };

        let mut ranked_lists = Vec::with_capacity(outcomes.len());
        let mut failed_sub_queries = Vec::new();
        let mut last_error = None;

        for (sub_query, outcome) in sub_queries.iter().zip(outcomes) {
            match outcome {
                Ok(passages) => ranked_lists.push(passages),
                Err((stage, e)) => {
                    warn!(sub_query = %sub_query, stage, error = %e, "Skipping sub-query");
                    record_sub_query_failure(stage);
                    failed_sub_queries.push(sub_query.clone());
                    last_error = Some(e);
                }
            }
        }

        if failed_sub_queries.len() == sub_queries.len() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let evidence = merge_evidence(ranked_lists, self.evidence_limit, self.merge_policy);

        let answer = if evidence.is_empty() {
            info!(sub_queries = sub_queries.len(), "No evidence found");
            NO_EVIDENCE_ANSWER.to_string()
        } else {
            self.synthesizer.summarize(query, &evidence).await
        };

        record_pipeline(start.elapsed().as_secs_f64(), sub_queries.len(), evidence.len());
        info!(
            sub_queries = sub_queries.len(),
            failed = failed_sub_queries.len(),
            evidence = evidence.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Retrieval pipeline completed"
        );

        Ok(Prediction {
            answer,
            evidence,
            sub_queries,
            failed_sub_queries,
        })
    }
}
