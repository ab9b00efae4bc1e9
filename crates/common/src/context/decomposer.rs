//! Intent Decomposer - splits compound queries into independent sub-queries
//!
//! Two generative calls at most: one to count intents, one to split. Every
//! failure degrades to the single-element decomposition `[query]`.

use crate::errors::with_timeout;
use crate::llm::Generator;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Decomposes a query into one or more sub-queries
pub struct IntentDecomposer {
    generator: Arc<dyn Generator>,
    delimiter: String,
    timeout: Duration,
}

fn count_prompt(query: &str) -> String {
    format!(
        "Please calculate how many independent intents are contained in the following query. \
         Return only an integer:\n{}\nNumber of intents: ",
        query
    )
}

fn split_prompt(query: &str, delimiter: &str) -> String {
    format!(
        "Split the following query into multiple independent sub-queries, separated by '{}', \
         without additional explanations:\n{}\nList of sub-queries: ",
        delimiter, query
    )
}

/// Parse a model's intent count; anything but a bare integer counts as one intent
pub fn parse_intent_count(raw: &str) -> usize {
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 1 => n as usize,
        _ => 1,
    }
}

/// Split a model response on `delimiter`, trimming and dropping empty pieces.
///
/// A blank delimiter never splits; the whole response is one piece.
pub fn split_sub_queries(raw: &str, delimiter: &str) -> Vec<String> {
    if delimiter.trim().is_empty() {
        let whole = raw.trim();
        return if whole.is_empty() { Vec::new() } else { vec![whole.to_string()] };
    }

    raw.split(delimiter)
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

impl IntentDecomposer {
    pub fn new(generator: Arc<dyn Generator>, delimiter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            generator,
            delimiter: delimiter.into(),
            timeout,
        }
    }

    /// Estimate the number of independent intents; 1 on any failure
    pub async fn count_intents(&self, query: &str) -> usize {
        let prompt = count_prompt(query);
        match with_timeout("decomposer", self.timeout, self.generator.generate(&prompt)).await {
            Ok(raw) => {
                let count = parse_intent_count(&raw);
                debug!(raw = %raw.trim(), count, "Intent count estimated");
                count
            }
            Err(e) => {
                warn!(error = %e, "Intent counting failed, assuming a single intent");
                1
            }
        }
    }

    /// Decompose a query; never returns an empty sequence
    pub async fn decompose(&self, query: &str) -> Vec<String> {
        if self.count_intents(query).await <= 1 {
            return vec![query.to_string()];
        }

        let sub_queries = self.split(query).await;
        if sub_queries.is_empty() {
            warn!("Split produced no sub-queries, falling back to the original query");
            return vec![query.to_string()];
        }

        debug!(count = sub_queries.len(), "Query decomposed");
        sub_queries
    }

    async fn split(&self, query: &str) -> Vec<String> {
        let prompt = split_prompt(query, &self.delimiter);
        match with_timeout("decomposer", self.timeout, self.generator.generate(&prompt)).await {
            Ok(raw) => split_sub_queries(&raw, &self.delimiter),
            Err(e) => {
                warn!(error = %e, "Query split failed");
                Vec::new()
            }
        }
    }
}
