//! Docent ingestion pipeline.
//!
//! Turns loaded source documents into embedded chunks and writes them into a
//! collection of the vector index:
//! 1. Skip sources with no text
//! 2. Chunk each source
//! 3. Embed every chunk (bounded by the embedding timeout)
//! 4. Insert into, or replace, the collection

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use docent_core::error::Result;
use docent_core::types::{Chunk, SourceDocument};

use crate::chunker::Chunker;
use crate::embedding::{embed_with_timeout, DynEmbeddingService};
use crate::index::VectorIndex;

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Sources that produced at least one chunk.
    pub sources: usize,
    /// Sources skipped because they had no text.
    pub skipped: usize,
    /// Chunks produced by this run.
    pub chunks: usize,
    /// Chunks in the collection afterwards.
    pub collection_total: usize,
}

/// Chunk, embed and index source documents.
#[derive(Clone)]
pub struct IngestPipeline {
    index: VectorIndex,
    embedder: Arc<dyn DynEmbeddingService>,
    chunker: Chunker,
    embed_timeout: Duration,
}

impl IngestPipeline {
    pub fn new(index: VectorIndex, embedder: Arc<dyn DynEmbeddingService>, chunker: Chunker) -> Self {
        Self {
            index,
            embedder,
            chunker,
            embed_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    /// Chunk and embed `sources` without touching the index.
    pub async fn prepare(&self, sources: &[SourceDocument]) -> Result<(Vec<Chunk>, IngestReport)> {
        let mut report = IngestReport::default();
        let mut prepared = Vec::new();

        for source in sources {
            if source.text.trim().is_empty() {
                debug!(source_id = %source.source_id, "Skipping source with empty text");
                report.skipped += 1;
                continue;
            }

            for chunk in self.chunker.split_document(source) {
                let embedding =
                    embed_with_timeout(self.embedder.as_ref(), &chunk.text, self.embed_timeout)
                        .await?;
                prepared.push(chunk.with_embedding(embedding));
            }
            report.sources += 1;
        }

        report.chunks = prepared.len();
        Ok((prepared, report))
    }

    /// Append the chunks of `sources` to `collection`.
    pub async fn ingest(&self, collection: &str, sources: &[SourceDocument]) -> Result<IngestReport> {
        let (chunks, mut report) = self.prepare(sources).await?;
        report.collection_total = if chunks.is_empty() {
            self.index.len(collection)
        } else {
            self.index.insert(collection, chunks)?
        };
        info!(
            collection,
            sources = report.sources,
            chunks = report.chunks,
            total = report.collection_total,
            "Ingested sources"
        );
        Ok(report)
    }

    /// Replace `collection` with the chunks of `sources`.
    ///
    /// Nothing is swapped unless every chunk was embedded successfully.
    pub async fn rebuild(&self, collection: &str, sources: &[SourceDocument]) -> Result<IngestReport> {
        let (chunks, mut report) = self.prepare(sources).await?;
        report.collection_total = self.index.replace_collection(collection, chunks)?;
        info!(
            collection,
            sources = report.sources,
            chunks = report.chunks,
            "Rebuilt collection"
        );
        Ok(report)
    }

    /// Get a reference to the underlying vector index.
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingService, HashEmbedding};
    use docent_core::error::DocentError;
    use docent_core::types::SearchMode;

    fn make_pipeline(index: VectorIndex) -> IngestPipeline {
        let embedder: Arc<dyn DynEmbeddingService> = Arc::new(HashEmbedding::new(64).unwrap());
        IngestPipeline::new(index, embedder, Chunker::new(120, 20).unwrap())
    }

    fn long_source(id: &str, topic: &str) -> SourceDocument {
        let text = (0..10)
            .map(|i| format!("Paragraph {} about {} and its common usage patterns.", i, topic))
            .collect::<Vec<_>>()
            .join("\n\n");
        SourceDocument::new(id, text).with_metadata("topic", topic)
    }

    #[tokio::test]
    async fn test_ingest_reports_counts() {
        let index = VectorIndex::new();
        let pipeline = make_pipeline(index.clone());
        let sources = vec![
            long_source("a.txt", "generators"),
            SourceDocument::new("empty.txt", "   "),
        ];

        let report = pipeline.ingest("docs", &sources).await.unwrap();
        assert_eq!(report.sources, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.chunks > 1);
        assert_eq!(report.collection_total, report.chunks);
        assert_eq!(index.len("docs"), report.chunks);
    }

    #[tokio::test]
    async fn test_ingest_appends_and_rebuild_replaces() {
        let index = VectorIndex::new();
        let pipeline = make_pipeline(index.clone());

        let first = pipeline
            .ingest("docs", &[long_source("a.txt", "generators")])
            .await
            .unwrap();
        let second = pipeline
            .ingest("docs", &[long_source("b.txt", "decorators")])
            .await
            .unwrap();
        assert_eq!(second.collection_total, first.chunks + second.chunks);

        let rebuilt = pipeline
            .rebuild("docs", &[long_source("b.txt", "decorators")])
            .await
            .unwrap();
        assert_eq!(rebuilt.collection_total, second.chunks);
        assert_eq!(index.len("docs"), second.chunks);
    }

    #[tokio::test]
    async fn test_rebuild_with_no_sources_clears_collection() {
        let index = VectorIndex::new();
        let pipeline = make_pipeline(index.clone());
        pipeline
            .ingest("docs", &[long_source("a.txt", "generators")])
            .await
            .unwrap();

        let report = pipeline.rebuild("docs", &[]).await.unwrap();
        assert_eq!(report.collection_total, 0);
        assert!(index.is_empty("docs"));
    }

    #[tokio::test]
    async fn test_ingested_chunks_are_searchable() {
        let index = VectorIndex::new();
        let pipeline = make_pipeline(index.clone());
        pipeline
            .ingest(
                "docs",
                &[long_source("a.txt", "generators"), long_source("b.txt", "decorators")],
            )
            .await
            .unwrap();

        let query = HashEmbedding::new(64)
            .unwrap()
            .embed("decorators usage")
            .await
            .unwrap();
        let result = index.search("docs", &query, 1, &SearchMode::Similarity).unwrap();
        assert_eq!(result.hits[0].chunk.source_id, "b.txt");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_aborts_rebuild() {
        let index = VectorIndex::new().with_dimensions(8);
        let pipeline = make_pipeline(index.clone());
        let err = pipeline
            .rebuild("docs", &[long_source("a.txt", "generators")])
            .await
            .unwrap_err();
        assert!(matches!(err, DocentError::DimensionMismatch { expected: 8, actual: 64 }));
        assert!(!index.contains("docs"));
    }
}
