//! Configuration management for HM-RAG services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// General-purpose generative model (decomposition, synthesis)
    #[serde(default)]
    pub generation: LlmConfig,

    /// Fine-tuned model used for first-pass direct answers
    #[serde(default = "LlmConfig::finetuned")]
    pub finetuned: LlmConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Cross-encoder reranking service configuration
    #[serde(default)]
    pub reranker: RerankerConfig,

    /// Vector index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Retrieval pipeline tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Document store preparation
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    /// Maximum accepted message length in characters
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    /// Maximum accepted conversation history turns
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider: ollama, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Backend base URL
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    /// Model to use
    #[serde(default = "default_general_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_general_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: ollama, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API base URL
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Batch size for bulk embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankerConfig {
    /// Reranker provider: tei, mock
    #[serde(default = "default_reranker_provider")]
    pub provider: String,

    /// API base URL
    #[serde(default = "default_reranker_url")]
    pub base_url: String,

    /// Cross-encoder model name
    #[serde(default = "default_reranker_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_reranker_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Index provider: qdrant, memory
    #[serde(default = "default_index_provider")]
    pub provider: String,

    /// Qdrant REST URL
    #[serde(default = "default_index_url")]
    pub url: String,

    /// Collection name
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Optional API key
    pub api_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_index_timeout")]
    pub timeout_secs: u64,

    /// Points per upsert request
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
}

/// How per-sub-query results are fused into the evidence set
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Append each sub-query's reranked list in sub-query order, then truncate
    #[default]
    Concatenate,
    /// Stable re-sort of the whole accumulator by score, then truncate
    GlobalSort,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Candidates fetched from the index per sub-query
    #[serde(default = "default_retrieve_top_k")]
    pub retrieve_top_k: usize,

    /// Passages kept per sub-query after reranking
    #[serde(default = "default_rerank_top_k")]
    pub rerank_top_k: usize,

    /// Maximum passages handed to synthesis
    #[serde(default = "default_evidence_limit")]
    pub evidence_limit: usize,

    /// Direct answers with fewer words than this trigger retrieval
    #[serde(default = "default_word_threshold")]
    pub direct_answer_min_words: usize,

    /// Delimiter the decomposition prompt asks the model to use
    #[serde(default = "default_sub_query_delimiter")]
    pub sub_query_delimiter: String,

    /// Process sub-queries concurrently
    #[serde(default = "default_enabled")]
    pub concurrent_sub_queries: bool,

    /// Evidence merge policy
    #[serde(default)]
    pub merge_policy: MergePolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Target chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Source name recorded in chunk metadata
    #[serde(default = "default_source_name")]
    pub source_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 8001 }
fn default_request_timeout() -> u64 { 180 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_concurrent() -> usize { 32 }
fn default_max_message_chars() -> usize { 4000 }
fn default_max_history_turns() -> usize { 50 }
fn default_llm_provider() -> String { "ollama".to_string() }
fn default_ollama_url() -> String { "http://127.0.0.1:11434".to_string() }
fn default_general_model() -> String { "gemma3:1b".to_string() }
fn default_general_temperature() -> f32 { 0.35 }
fn default_llm_timeout() -> u64 { 120 }
fn default_embedding_provider() -> String { "ollama".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_batch_size() -> usize { 32 }
fn default_reranker_provider() -> String { "tei".to_string() }
fn default_reranker_url() -> String { "http://127.0.0.1:8080".to_string() }
fn default_reranker_model() -> String { "BAAI/bge-reranker-base".to_string() }
fn default_reranker_timeout() -> u64 { 30 }
fn default_index_provider() -> String { "qdrant".to_string() }
fn default_index_url() -> String { "http://localhost:6333".to_string() }
fn default_collection() -> String { "psybot-embedding".to_string() }
fn default_index_timeout() -> u64 { 60 }
fn default_upsert_batch_size() -> usize { 500 }
fn default_retrieve_top_k() -> usize { 10 }
fn default_rerank_top_k() -> usize { 5 }
fn default_evidence_limit() -> usize { 5 }
fn default_word_threshold() -> usize { 10 }
fn default_sub_query_delimiter() -> String { "||".to_string() }
fn default_chunk_size() -> usize { 512 }
fn default_chunk_overlap() -> usize { 64 }
fn default_source_name() -> String { "texte_nettoye.txt".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "hmrag".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__PIPELINE__EVIDENCE_LIMIT=8
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        let app_config: Self = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let app_config: Self = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Reject settings that would silently change answer behaviour
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("server.max_concurrent_requests", self.server.max_concurrent_requests),
            ("pipeline.retrieve_top_k", self.pipeline.retrieve_top_k),
            ("pipeline.rerank_top_k", self.pipeline.rerank_top_k),
            ("pipeline.evidence_limit", self.pipeline.evidence_limit),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Message(format!("{} must be greater than 0", key)));
            }
        }

        if self.pipeline.sub_query_delimiter.trim().is_empty() {
            return Err(ConfigError::Message(
                "pipeline.sub_query_delimiter must not be blank".to_string(),
            ));
        }

        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl LlmConfig {
    /// Defaults for the fine-tuned direct-answer model
    pub fn finetuned() -> Self {
        Self {
            model: "qwen-finetuned-merged".to_string(),
            temperature: 0.2,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RerankerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl IndexConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            generation: LlmConfig::default(),
            finetuned: LlmConfig::finetuned(),
            embedding: EmbeddingConfig::default(),
            reranker: RerankerConfig::default(),
            index: IndexConfig::default(),
            pipeline: PipelineConfig::default(),
            ingestion: IngestionConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_concurrent_requests: default_max_concurrent(),
            max_message_chars: default_max_message_chars(),
            max_history_turns: default_max_history_turns(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            base_url: default_ollama_url(),
            model: default_general_model(),
            temperature: default_general_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            base_url: default_ollama_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: default_reranker_provider(),
            base_url: default_reranker_url(),
            model: default_reranker_model(),
            timeout_secs: default_reranker_timeout(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            url: default_index_url(),
            collection: default_collection(),
            api_key: None,
            timeout_secs: default_index_timeout(),
            upsert_batch_size: default_upsert_batch_size(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retrieve_top_k: default_retrieve_top_k(),
            rerank_top_k: default_rerank_top_k(),
            evidence_limit: default_evidence_limit(),
            direct_answer_min_words: default_word_threshold(),
            sub_query_delimiter: default_sub_query_delimiter(),
            concurrent_sub_queries: default_enabled(),
            merge_policy: MergePolicy::default(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            source_name: default_source_name(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}
