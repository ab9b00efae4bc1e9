//! HM-RAG Common Library
//!
//! Shared code for the HM-RAG services including:
//! - The context engine (intent decomposition, retrieval, reranking,
//!   synthesis and hybrid routing)
//! - Collaborator clients (generative models, embeddings, reranker, vector index)
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod context;
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod llm;
pub mod metrics;
pub mod rerank;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use context::{Backends, HybridRouter};
pub use embeddings::Embedder;
pub use index::VectorIndex;
pub use llm::Generator;
pub use rerank::RelevanceScorer;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "bge-m3";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1024;
