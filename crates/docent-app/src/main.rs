//! Docent application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Open the vector index, reloading persisted collections
//! 3. Build the embedder and retriever
//! 4. Run one command: index, search, status or threads

mod cli;
mod sources;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use docent_agent::{store_from_config, ConversationStore};
use docent_core::config::DocentConfig;
use docent_core::logging;
use docent_vector::{Chunker, DynEmbeddingService, HashEmbedding, IngestPipeline, Retriever, VectorIndex};

use cli::{CliArgs, Command};

/// Expand a leading `~/` to the home directory.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = DocentConfig::load_or_default(&config_file);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    logging::init(&config.general.log_level);
    tracing::info!(path = %config_file.display(), "Starting Docent v{}", env!("CARGO_PKG_VERSION"));
    config.validate()?;

    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    // Vector index.
    let mut index = VectorIndex::new().with_dimensions(config.index.dimensions);
    if config.index.persist {
        index = index.with_persist_dir(data_dir.join("vectors"));
        let loaded = index.load_all()?;
        tracing::info!(collections = loaded, "Vector index opened");
    }

    // Embedder and retriever.
    let embedder: Arc<dyn DynEmbeddingService> = Arc::new(HashEmbedding::new(config.index.dimensions)?);
    let retriever = Retriever::from_config(index, Arc::clone(&embedder), &config)?;

    match args.command {
        Command::Index { paths, append } => {
            let documents = sources::load_sources(&paths)?;
            if append {
                let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
                let pipeline = IngestPipeline::new(retriever.index().clone(), embedder, chunker)
                    .with_embed_timeout(Duration::from_secs(config.upstream.embed_timeout_secs));
                let report = pipeline.ingest(retriever.collection(), &documents).await?;
                println!(
                    "Added {} chunks from {} sources to '{}' ({} total, {} empty sources skipped)",
                    report.chunks,
                    report.sources,
                    retriever.collection(),
                    report.collection_total,
                    report.skipped
                );
            } else {
                let chunks = retriever.reindex(&documents).await?;
                println!(
                    "Indexed {} chunks from {} sources into '{}'",
                    chunks,
                    documents.len(),
                    retriever.collection()
                );
            }
        }
        Command::Search { query, k, json } => {
            let k = k.unwrap_or_else(|| retriever.k());
            let result = retriever.retrieve(&query, k).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if result.is_empty() {
                println!("No results in '{}'.", retriever.collection());
            } else {
                println!("{}", Retriever::format_results(&result));
            }
        }
        Command::Status { json } => {
            let status = retriever.status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("collection:      {}", status.collection);
                println!("source loaded:   {}", status.source_loaded);
                println!("vector db ready: {}", status.vector_db_ready);
                println!("total chunks:    {}", status.total_chunks);
                if let Some(path) = status.persist_path {
                    println!("persist path:    {}", path.display());
                }
            }
        }
        Command::Threads => {
            if !config.agent.persist_threads {
                println!("Thread persistence is off (agent.persist_threads = false).");
                return Ok(());
            }
            let store = store_from_config(&config.agent, &data_dir);
            let ids = store.thread_ids().await;
            if ids.is_empty() {
                println!("No stored threads.");
            }
            for id in ids {
                match store.snapshot(&id).await {
                    Ok(Some(thread)) => println!(
                        "{}  {} messages  updated {}",
                        id,
                        thread.len(),
                        thread.updated_at.to_rfc3339()
                    ),
                    Ok(None) => {}
                    Err(e) => tracing::warn!(thread_id = %id, error = %e, "Skipping unreadable thread"),
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_data_dir_plain_path() {
        assert_eq!(resolve_data_dir("/var/lib/docent"), PathBuf::from("/var/lib/docent"));
    }

    #[test]
    fn test_resolve_data_dir_expands_home() {
        let resolved = resolve_data_dir("~/.docent/data");
        assert!(resolved.ends_with(".docent/data"));
        assert!(!resolved.starts_with("~"));
    }
}
