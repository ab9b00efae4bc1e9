//! Chat handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Instant;
use validator::{Validate, ValidationError};

use crate::AppState;
use hmrag_common::{
    context::{ConversationTurn, Passage, RoutedAnswer},
    errors::{AppError, Result},
};

/// Maximum citation snippet length in characters
pub const SNIPPET_CHARS: usize = 300;

/// Chat request
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(custom(function = "non_blank"))]
    pub message: String,

    #[serde(default)]
    pub history: Option<Vec<ConversationTurn>>,

    /// Accepted for compatibility; not used by the pipeline
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
}

fn non_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Chat response
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    /// Null on the direct path
    pub citations: Option<Vec<Citation>>,
    pub debug: DebugInfo,
}

#[derive(Debug, Serialize)]
pub struct Citation {
    pub score: f32,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct DebugInfo {
    pub used_rag: bool,
    pub finetuned_response: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sub_queries: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_sub_queries: Vec<String>,
    pub latency_ms: u64,
}

impl From<Passage> for Citation {
    fn from(passage: Passage) -> Self {
        // Empty metadata objects are dropped
        let metadata = passage.metadata.filter(|m| match m {
            Value::Object(map) => !map.is_empty(),
            Value::Null => false,
            _ => true,
        });

        Self {
            score: passage.score,
            snippet: passage.content.chars().take(SNIPPET_CHARS).collect(),
            metadata,
        }
    }
}

impl ChatResponse {
    fn from_routed(routed: RoutedAnswer, latency_ms: u64) -> Self {
        let used_rag = routed.used_retrieval();
        let citations = used_rag
            .then(|| routed.evidence.into_iter().map(Citation::from).collect());

        Self {
            answer: routed.answer,
            citations,
            debug: DebugInfo {
                used_rag,
                finetuned_response: routed.finetuned_response,
                sub_queries: routed.sub_queries,
                failed_sub_queries: routed.failed_sub_queries,
                latency_ms,
            },
        }
    }
}

/// Answer one message, directly or from retrieved evidence
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("message".to_string()),
    })?;

    let limits = &state.config.server;
    let message_chars = request.message.chars().count();
    if message_chars > limits.max_message_chars {
        return Err(AppError::Validation {
            message: format!("Message exceeds {} characters", limits.max_message_chars),
            field: Some("message".to_string()),
        });
    }

    let history = request.history.unwrap_or_default();
    if history.len() > limits.max_history_turns {
        return Err(AppError::Validation {
            message: format!("History exceeds {} turns", limits.max_history_turns),
            field: Some("history".to_string()),
        });
    }

    if let Some(params) = &request.params {
        tracing::debug!(keys = ?params.keys().collect::<Vec<_>>(), "Ignoring request params");
    }

    let routed = state.router.handle(&request.message, &history).await?;
    let latency_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        path = routed.path.as_str(),
        history_turns = history.len(),
        citations = routed.evidence.len(),
        latency_ms,
        "Chat completed"
    );

    Ok(Json(ChatResponse::from_routed(routed, latency_ms)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_citation_snippet_is_char_bounded() {
        let passage = Passage {
            content: "é".repeat(400),
            metadata: Some(json!({})),
            score: 0.7,
        };
        let citation = Citation::from(passage);
        assert_eq!(citation.snippet.chars().count(), SNIPPET_CHARS);
        assert!(citation.metadata.is_none());
    }

    #[test]
    fn test_request_validation() {
        let request: ChatRequest = serde_json::from_value(json!({ "message": "   " })).unwrap();
        assert!(request.validate().is_err());

        let request: ChatRequest = serde_json::from_value(json!({
            "message": "What is GAD?",
            "history": [{ "role": "user", "content": "hi" }],
            "params": { "temperature": 0.1 }
        }))
        .unwrap();
        assert!(request.validate().is_ok());
    }
}
