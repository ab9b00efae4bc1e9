//! Generative model abstraction
//!
//! Two model instances are used by the service:
//! - a general-purpose small model for decomposition and synthesis
//! - a fine-tuned model for first-pass direct answers, fed conversation history
//!
//! Both sit behind the [`Generator`] trait so tests can swap in [`MockGenerator`].

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Trait for text generation backends
#[async_trait]
pub trait Generator: Send + Sync {
    /// Complete a single prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Answer the last turn of a conversation.
    ///
    /// Backends without a native chat endpoint get the turns rendered into one prompt.
    async fn chat(&self, turns: &[ConversationTurn]) -> Result<String> {
        self.generate(&render_conversation(turns)).await
    }

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Render turns as a plain role-tagged transcript ending with an open assistant turn
pub fn render_conversation(turns: &[ConversationTurn]) -> String {
    let mut prompt = String::new();
    for turn in turns {
        prompt.push_str(turn.role.as_str());
        prompt.push_str(": ");
        prompt.push_str(turn.content.trim());
        prompt.push('\n');
    }
    prompt.push_str("assistant:");
    prompt
}

/// Ollama generation client
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    timeout_ms: u64,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ConversationTurn],
    stream: bool,
    options: GenerateOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OllamaGenerator {
    /// Create a new client; the HTTP connection pool lives as long as the generator
    pub fn new(config: &LlmConfig) -> Result<Self> {
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
            temperature: config.temperature,
            timeout_ms: config.timeout().as_millis() as u64,
        })
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let url = format!("{}{}", self.base_url, path);

        let response = self.client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Generation {
                message: format!("Ollama error {}: {}", status, body),
            });
        }

        response.json().await.map_err(|e| AppError::Generation {
            message: format!("Failed to parse Ollama response: {}", e),
        })
    }

    fn request_error(&self, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            AppError::Timeout {
                service: format!("generator:{}", self.model),
                timeout_ms: self.timeout_ms,
            }
        } else {
            AppError::Generation {
                message: format!("Request failed: {}", err),
            }
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature: self.temperature },
        };

        let response: GenerateResponse = self.post("/api/generate", &request).await?;
        Ok(response.response)
    }

    async fn chat(&self, turns: &[ConversationTurn]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: turns,
            stream: false,
            options: GenerateOptions { temperature: self.temperature },
        };

        let response: ChatResponse = self.post("/api/chat", &request).await?;
        Ok(response.message.content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

type Responder = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Deterministic generator for tests and offline runs
pub struct MockGenerator {
    responder: Box<Responder>,
}

impl MockGenerator {
    /// Always answer with the same text
    pub fn fixed(response: impl Into<String>) -> Self {
        let response = response.into();
        Self::from_fn(move |_| Ok(response.clone()))
    }

    /// Answer by inspecting the prompt
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self { responder: Box::new(responder) }
    }

    /// Fail every call
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::from_fn(move |_| Err(AppError::Generation { message: message.clone() }))
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        (self.responder)(prompt)
    }

    fn model_name(&self) -> &str {
        "mock-generator"
    }
}

/// Create a generator based on configuration
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "mock" => Ok(Arc::new(MockGenerator::fixed(
            "This is a mock answer from the offline generator backend.",
        ))),
        other => Err(AppError::Configuration {
            message: format!("Unknown generation provider: {}", other),
        }),
    }
}
