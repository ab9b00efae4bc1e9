//! Cross-encoder relevance scoring
//!
//! The scorer is opaque to the pipeline: a (query, passage) pair goes in, a float
//! comes out. Scores are only comparable within one call for one query.

use crate::config::RerankerConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Trait for (query, passage) relevance models
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Score a single pair
    async fn score(&self, query: &str, passage: &str) -> Result<f32>;

    /// Score every passage against the same query, in input order
    async fn score_batch(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(passages.len());
        for passage in passages {
            scores.push(self.score(query, passage).await?);
        }
        Ok(scores)
    }

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Client for a text-embeddings-inference style `/rerank` endpoint
pub struct HttpScorer {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout_ms: u64,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    raw_scores: bool,
    truncate: bool,
}

#[derive(Deserialize)]
struct RerankHit {
    index: usize,
    score: f32,
}

impl HttpScorer {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_ms: config.timeout().as_millis() as u64,
        })
    }
}

#[async_trait]
impl RelevanceScorer for HttpScorer {
    async fn score(&self, query: &str, passage: &str) -> Result<f32> {
        let scores = self.score_batch(query, &[passage.to_string()]).await?;
        scores.into_iter().next().ok_or_else(|| AppError::Reranking {
            message: "Empty response".to_string(),
        })
    }

    async fn score_batch(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/rerank", self.base_url);
        let request = RerankRequest {
            query,
            texts: passages,
            raw_scores: true,
            truncate: true,
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout {
                        service: "reranker".to_string(),
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    AppError::Reranking {
                        message: format!("Request failed: {}", e),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Reranking {
                message: format!("API error {}: {}", status, body),
            });
        }

        let hits: Vec<RerankHit> = response.json().await.map_err(|e| AppError::Reranking {
            message: format!("Failed to parse response: {}", e),
        })?;

        // The endpoint returns hits sorted by score; put them back in input order
        let mut scores: Vec<Option<f32>> = vec![None; passages.len()];
        for hit in hits {
            match scores.get_mut(hit.index) {
                Some(slot) => *slot = Some(hit.score),
                None => {
                    return Err(AppError::Reranking {
                        message: format!("Score index {} out of range", hit.index),
                    })
                }
            }
        }

        scores
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                s.ok_or_else(|| AppError::Reranking {
                    message: format!("Missing score for passage {}", i),
                })
            })
            .collect()
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Lexical-overlap scorer for tests and offline runs
pub struct MockScorer;

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_lowercase())
        .collect()
}

#[async_trait]
impl RelevanceScorer for MockScorer {
    async fn score(&self, query: &str, passage: &str) -> Result<f32> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(0.0);
        }
        let passage_terms = terms(passage);
        let shared = query_terms.intersection(&passage_terms).count();
        Ok(shared as f32 / query_terms.len() as f32)
    }

    fn model_name(&self) -> &str {
        "mock-reranker"
    }
}

/// Create a scorer based on configuration
pub fn create_scorer(config: &RerankerConfig) -> Result<Arc<dyn RelevanceScorer>> {
    match config.provider.as_str() {
        "tei" => Ok(Arc::new(HttpScorer::new(config)?)),
        "mock" => Ok(Arc::new(MockScorer)),
        other => Err(AppError::Configuration {
            message: format!("Unknown reranker provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_scorer_overlap() {
        let scorer = MockScorer;
        let high = scorer.score("worry exposure", "Worry exposure is a technique").await.unwrap();
        let low = scorer.score("worry exposure", "Sleep hygiene basics").await.unwrap();
        assert_eq!(high, 1.0);
        assert_eq!(low, 0.0);
    }

    #[tokio::test]
    async fn test_default_batch_keeps_order() {
        let scorer = MockScorer;
        let passages = vec!["nothing here".to_string(), "anxiety anxiety".to_string()];
        let scores = scorer.score_batch("anxiety", &passages).await.unwrap();
        assert_eq!(scores, vec![0.0, 1.0]);
    }
}
