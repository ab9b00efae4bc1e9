//! Text chunking module
//!
//! Splits cleaned text into overlapping character-bounded chunks for embedding.

use crate::errors::IngestionError;
use hmrag_common::config::IngestionConfig;
use serde_json::{json, Value};
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// A text chunk with its identity
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// 1-based position in the document
    pub chunk_id: u64,
    pub content: String,
    /// Name of the document the chunk came from
    pub source: String,
}

impl TextChunk {
    /// Metadata stored alongside the chunk in the index
    pub fn metadata(&self) -> Value {
        json!({
            "chunk_id": self.chunk_id,
            "source": self.source,
        })
    }
}

/// Split text into chunks of at most `chunk_size` characters with `chunk_overlap` overlap
pub fn chunk_text(
    text: &str,
    config: &IngestionConfig,
    source: &str,
) -> Result<Vec<TextChunk>, IngestionError> {
    let chunk_config = ChunkConfig::new(config.chunk_size)
        .with_overlap(config.chunk_overlap)
        .map_err(|e| IngestionError::ChunkingError(e.to_string()))?;
    let splitter = TextSplitter::new(chunk_config);

    let chunks: Vec<TextChunk> = splitter
        .chunks(text)
        .enumerate()
        .map(|(i, content)| TextChunk {
            chunk_id: i as u64 + 1,
            content: content.to_string(),
            source: source.to_string(),
        })
        .collect();

    debug!(
        input_chars = text.chars().count(),
        chunk_count = chunks.len(),
        chunk_size = config.chunk_size,
        "Text chunked"
    );

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, chunk_overlap: usize) -> IngestionConfig {
        IngestionConfig {
            chunk_size,
            chunk_overlap,
            ..IngestionConfig::default()
        }
    }

    #[test]
    fn test_basic_chunking() {
        let text = "Worry exposure is a core technique. ".repeat(60);
        let chunks = chunk_text(&text, &config(512, 64), "guide.txt").unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 512);
        }
    }

    #[test]
    fn test_ids_are_one_based_and_carry_source() {
        let text = "Sentence one. Sentence two. Sentence three. Sentence four.";
        let chunks = chunk_text(text, &config(20, 5), "guide.txt").unwrap();

        assert_eq!(chunks[0].chunk_id, 1);
        assert_eq!(chunks.last().unwrap().chunk_id, chunks.len() as u64);
        assert_eq!(chunks[0].metadata(), json!({ "chunk_id": 1, "source": "guide.txt" }));
    }

    #[test]
    fn test_overlap_not_smaller_than_size_is_rejected() {
        let result = chunk_text("text", &config(64, 64), "guide.txt");
        assert!(matches!(result, Err(IngestionError::ChunkingError(_))));
    }

    #[test]
    fn test_empty_text() {
        let chunks = chunk_text("", &IngestionConfig::default(), "guide.txt").unwrap();
        assert!(chunks.is_empty());
    }
}
