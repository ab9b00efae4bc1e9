//! HM-RAG Ingestion
//!
//! Prepares the document store from an extracted text file:
//! 1. Cleans extraction debris
//! 2. Splits the text into overlapping chunks
//! 3. Embeds chunks in batches
//! 4. Recreates the collection and upserts points in batches

mod chunker;
mod cleaner;
mod errors;
mod processor;

use clap::Parser;
use errors::IngestionError;
use hmrag_common::{config::AppConfig, embeddings::create_embedder, index::create_index, VERSION};
use processor::IngestionProcessor;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Populate the vector index from a cleaned text file
#[derive(Parser, Debug)]
#[command(name = "ingestion", version, about, long_about = None)]
struct Cli {
    /// Extracted text file to ingest
    input: PathBuf,

    /// Source name recorded in chunk metadata (defaults to configuration)
    #[arg(long)]
    source: Option<String>,

    /// Clean and chunk only; print statistics without touching backends
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }

    info!("Starting HM-RAG Ingestion v{}", VERSION);

    if !cli.input.exists() {
        return Err(IngestionError::FileNotFound(cli.input.display().to_string()).into());
    }

    let raw = tokio::fs::read_to_string(&cli.input).await.map_err(IngestionError::from)?;
    let cleaned = cleaner::TextCleaner::new()?.clean(&raw);
    if cleaned.is_empty() {
        return Err(IngestionError::EmptyInput.into());
    }

    let source = cli.source.unwrap_or_else(|| config.ingestion.source_name.clone());
    let chunks = chunker::chunk_text(&cleaned, &config.ingestion, &source)?;
    info!(
        raw_chars = raw.chars().count(),
        cleaned_chars = cleaned.chars().count(),
        chunks = chunks.len(),
        "Text prepared"
    );

    if cli.dry_run {
        let longest = chunks.iter().map(|c| c.content.chars().count()).max().unwrap_or(0);
        println!("source:        {}", source);
        println!("chunks:        {}", chunks.len());
        println!("longest chunk: {} chars", longest);
        return Ok(());
    }

    let embedder = create_embedder(&config.embedding)?;
    let index = create_index(&config.index)?;
    let processor = IngestionProcessor::new(
        embedder,
        index,
        config.embedding.batch_size,
        config.index.upsert_batch_size,
    );

    let report = processor.run(chunks).await?;
    println!(
        "{} chunks, {} points written to '{}', {} failed batches",
        report.chunks,
        report.points_written,
        config.index.collection,
        report.failed_batches()
    );

    Ok(())
}
