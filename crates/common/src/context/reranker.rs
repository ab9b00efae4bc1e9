//! Passage Reranker - cross-encoder rescoring of one sub-query's candidates

use super::{Candidate, Passage};
use crate::errors::{with_timeout, AppError, Result};
use crate::metrics::record_backend_call;
use crate::rerank::RelevanceScorer;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Scores (sub-query, passage) pairs and keeps the best `top_k`
pub struct PassageReranker {
    scorer: Arc<dyn RelevanceScorer>,
    top_k: usize,
    timeout: Duration,
}

impl PassageReranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>, top_k: usize, timeout: Duration) -> Self {
        Self { scorer, top_k, timeout }
    }

    /// Rank candidates by descending score.
    ///
    /// Output length is `min(top_k, candidates.len())`; equal scores keep arrival
    /// order. Scorer failures propagate.
    pub async fn rerank(&self, sub_query: &str, candidates: Vec<Candidate>) -> Result<Vec<Passage>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();

        let start = Instant::now();
        let scores = with_timeout(
            "reranker",
            self.timeout,
            self.scorer.score_batch(sub_query, &texts),
        )
        .await;
        record_backend_call("reranker", start.elapsed().as_secs_f64(), scores.is_ok());
        let scores = scores?;

        if scores.len() != candidates.len() {
            return Err(AppError::Reranking {
                message: format!(
                    "Expected {} scores, got {}",
                    candidates.len(),
                    scores.len()
                ),
            });
        }

        let mut ranked: Vec<Passage> = candidates
            .into_iter()
            .zip(scores)
            .map(|(candidate, score)| Passage {
                content: candidate.content,
                metadata: candidate.metadata,
                score,
            })
            .collect();

        // sort_by is stable
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(self.top_k);
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rerank::MockScorer;
    use async_trait::async_trait;

    /// Scores each passage by parsing it as a number
    struct NumericScorer;

    #[async_trait]
    impl RelevanceScorer for NumericScorer {
        async fn score(&self, _query: &str, passage: &str) -> Result<f32> {
            passage
                .split(':')
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| AppError::Reranking { message: "bad passage".into() })
        }

        fn model_name(&self) -> &str {
            "numeric"
        }
    }

    struct FailingScorer;

    #[async_trait]
    impl RelevanceScorer for FailingScorer {
        async fn score(&self, _: &str, _: &str) -> Result<f32> {
            Err(AppError::Reranking { message: "model crashed".into() })
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn candidates(texts: &[&str]) -> Vec<Candidate> {
        texts
            .iter()
            .map(|t| Candidate { content: t.to_string(), metadata: None })
            .collect()
    }

    fn reranker(scorer: impl RelevanceScorer + 'static, top_k: usize) -> PassageReranker {
        PassageReranker::new(Arc::new(scorer), top_k, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_length_is_min_of_top_k_and_input() {
        let input = candidates(&["0.1", "0.9", "0.5", "0.3", "0.7", "0.2", "0.8"]);
        let ranked = reranker(NumericScorer, 5).rerank("q", input).await.unwrap();
        assert_eq!(ranked.len(), 5);

        let input = candidates(&["0.1", "0.9"]);
        let ranked = reranker(NumericScorer, 5).rerank("q", input).await.unwrap();
        assert_eq!(ranked.len(), 2);
    }

    #[tokio::test]
    async fn test_sorted_descending() {
        let input = candidates(&["0.1", "0.9", "0.5", "-2.0", "3.5"]);
        let ranked = reranker(NumericScorer, 5).rerank("q", input).await.unwrap();
        let scores: Vec<f32> = ranked.iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![3.5, 0.9, 0.5, 0.1, -2.0]);
    }

    #[tokio::test]
    async fn test_ties_keep_arrival_order() {
        let input = candidates(&["0.5:first", "0.9:top", "0.5:second", "0.5:third"]);
        let ranked = reranker(NumericScorer, 3).rerank("q", input).await.unwrap();
        let contents: Vec<&str> = ranked.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["0.9:top", "0.5:first", "0.5:second"]);
    }

    #[tokio::test]
    async fn test_scorer_failure_propagates() {
        let result = reranker(FailingScorer, 5).rerank("q", candidates(&["a", "b"])).await;
        assert!(matches!(result, Err(AppError::Reranking { .. })));
    }

    #[tokio::test]
    async fn test_lexical_scorer_prefers_matching_passage() {
        let input = candidates(&["Sleep hygiene basics", "Worry exposure technique"]);
        let ranked = reranker(MockScorer, 5).rerank("worry exposure", input).await.unwrap();
        assert_eq!(ranked[0].content, "Worry exposure technique");
    }
}
