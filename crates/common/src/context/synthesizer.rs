//! Answer Synthesizer - generates the final answer from evidence
//!
//! One generative call per request. Backend failures never escape: the caller
//! gets [`SYNTHESIS_FAILED_ANSWER`] instead.

use super::{Passage, SYNTHESIS_FAILED_ANSWER};
use crate::errors::with_timeout;
use crate::llm::Generator;
use crate::metrics::record_backend_call;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Builds the summary prompt and calls the general model
pub struct AnswerSynthesizer {
    generator: Arc<dyn Generator>,
    timeout: Duration,
}

/// Bullet-join evidence followed by the question
pub fn build_summary_prompt(query: &str, evidence: &[Passage]) -> String {
    let context = evidence
        .iter()
        .map(|p| format!("- {}", p.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!("Context:\n{}\n\nQuestion: {}\nAnswer:", context, query)
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub async fn summarize(&self, query: &str, evidence: &[Passage]) -> String {
        let prompt = build_summary_prompt(query, evidence);

        let start = Instant::now();
        let result = with_timeout("synthesizer", self.timeout, self.generator.generate(&prompt)).await;
        record_backend_call("generation", start.elapsed().as_secs_f64(), result.is_ok());

        match result {
            Ok(answer) => {
                debug!(passages = evidence.len(), "Answer synthesized");
                answer.trim().to_string()
            }
            Err(e) => {
                error!(error = %e, "Answer synthesis failed");
                SYNTHESIS_FAILED_ANSWER.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockGenerator;

    fn passage(content: &str) -> Passage {
        Passage { content: content.to_string(), metadata: None, score: 1.0 }
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = build_summary_prompt("What is GAD?", &[passage("p1"), passage("p2")]);
        assert_eq!(prompt, "Context:\n- p1\n- p2\n\nQuestion: What is GAD?\nAnswer:");
    }

    #[tokio::test]
    async fn test_answer_is_trimmed() {
        let synthesizer = AnswerSynthesizer::new(
            Arc::new(MockGenerator::fixed("\n  GAD is persistent worry.  \n")),
            Duration::from_secs(5),
        );
        let answer = synthesizer.summarize("What is GAD?", &[passage("p1")]).await;
        assert_eq!(answer, "GAD is persistent worry.");
    }

    #[tokio::test]
    async fn test_failure_yields_sentinel() {
        let synthesizer = AnswerSynthesizer::new(
            Arc::new(MockGenerator::failing("ollama down")),
            Duration::from_secs(5),
        );
        let answer = synthesizer.summarize("What is GAD?", &[passage("p1")]).await;
        assert_eq!(answer, SYNTHESIS_FAILED_ANSWER);
    }
}
