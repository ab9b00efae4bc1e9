//! Ingestion error types

use hmrag_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("No text left after cleaning")]
    EmptyInput,

    #[error("Invalid cleaning pattern: {0}")]
    Pattern(#[from] regex_lite::Error),

    #[error("Chunking error: {0}")]
    ChunkingError(String),

    #[error("No chunks could be embedded ({failed_batches} failed batches)")]
    NothingEmbedded { failed_batches: usize },

    #[error("Backend error: {0}")]
    Backend(#[from] AppError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
