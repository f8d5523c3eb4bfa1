//! Query contract over one collection of the vector index.
//!
//! The retriever embeds a query, searches its collection with the configured
//! mode, and renders the hits with their provenance for prompts and citations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use docent_core::config::DocentConfig;
use docent_core::error::Result;
use docent_core::types::{scalar_to_text, RetrievalResult, SearchMode, SourceDocument};

use crate::chunker::Chunker;
use crate::embedding::{embed_with_timeout, DynEmbeddingService, EmbeddingService};
use crate::index::VectorIndex;
use crate::pipeline::IngestPipeline;

/// Metadata keys added by the chunker; rendered first in provenance headers.
const POSITION_KEYS: [&str; 3] = ["chunk_index", "start_char", "end_char"];

/// Number of characters of chunk text shown in a citation.
const CITATION_PREVIEW_CHARS: usize = 80;

/// Readiness snapshot of the retriever's collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStatus {
    /// At least one source has been indexed into the collection.
    pub source_loaded: bool,
    /// The collection exists in the index.
    pub vector_db_ready: bool,
    pub total_chunks: usize,
    pub collection: String,
    pub persist_path: Option<PathBuf>,
}

/// Embeds queries and searches one collection.
#[derive(Clone)]
pub struct Retriever {
    index: VectorIndex,
    embedder: Arc<dyn DynEmbeddingService>,
    chunker: Chunker,
    collection: String,
    k: usize,
    mode: SearchMode,
    embed_timeout: Duration,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("collection", &self.collection)
            .field("k", &self.k)
            .field("mode", &self.mode)
            .field("chunker", &self.chunker)
            .field("embed_dimensions", &self.embedder.dimensions())
            .field("embed_timeout", &self.embed_timeout)
            .finish_non_exhaustive()
    }
}

impl Retriever {
    /// Create a retriever with similarity search, `k = 4` and the default
    /// chunking of 800/100 characters.
    pub fn new(
        index: VectorIndex,
        embedder: impl EmbeddingService + 'static,
        collection: impl Into<String>,
    ) -> Result<Self> {
        Self::new_dyn(index, Arc::new(embedder), collection)
    }

    /// Create a retriever from a shared dynamic embedding service.
    pub fn new_dyn(
        index: VectorIndex,
        embedder: Arc<dyn DynEmbeddingService>,
        collection: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            index,
            embedder,
            chunker: Chunker::new(800, 100)?,
            collection: collection.into(),
            k: 4,
            mode: SearchMode::Similarity,
            embed_timeout: Duration::from_secs(30),
        })
    }

    /// Build a retriever from validated configuration.
    pub fn from_config(
        index: VectorIndex,
        embedder: Arc<dyn DynEmbeddingService>,
        config: &DocentConfig,
    ) -> Result<Self> {
        config.validate()?;
        let retriever = Self::new_dyn(index, embedder, config.index.collection.clone())?
            .with_chunker(Chunker::new(
                config.chunking.chunk_size,
                config.chunking.chunk_overlap,
            )?)
            .with_k(config.retrieval.k)
            .with_mode(config.retrieval.search_mode()?)
            .with_embed_timeout(Duration::from_secs(config.upstream.embed_timeout_secs));
        Ok(retriever)
    }

    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Default number of results used by [`Retriever::query`].
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn mode(&self) -> &SearchMode {
        &self.mode
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Embed `query_text` and return up to `k` chunks.
    ///
    /// An empty collection short-circuits to an empty result without calling
    /// the embedding service.
    pub async fn retrieve(&self, query_text: &str, k: usize) -> Result<RetrievalResult> {
        if self.index.is_empty(&self.collection) {
            debug!(collection = %self.collection, "Retrieval against empty collection");
            return Ok(RetrievalResult::empty());
        }

        let query = embed_with_timeout(self.embedder.as_ref(), query_text, self.embed_timeout).await?;
        let result = self.index.search(&self.collection, &query, k, &self.mode)?;
        debug!(
            collection = %self.collection,
            k,
            hits = result.len(),
            "Retrieved chunks"
        );
        Ok(result)
    }

    /// [`Retriever::retrieve`] with the configured `k`.
    pub async fn query(&self, query_text: &str) -> Result<RetrievalResult> {
        self.retrieve(query_text, self.k).await
    }

    /// Chunk, embed and swap in `sources` as the new collection contents.
    ///
    /// Returns the number of chunks indexed. An empty slice clears the
    /// collection.
    pub async fn reindex(&self, sources: &[SourceDocument]) -> Result<usize> {
        let pipeline = IngestPipeline::new(self.index.clone(), Arc::clone(&self.embedder), self.chunker)
            .with_embed_timeout(self.embed_timeout);
        let report = pipeline.rebuild(&self.collection, sources).await?;
        info!(
            collection = %self.collection,
            sources = report.sources,
            chunks = report.chunks,
            "Reindexed collection"
        );
        Ok(report.chunks)
    }

    pub fn status(&self) -> IndexStatus {
        let total_chunks = self.index.len(&self.collection);
        IndexStatus {
            source_loaded: total_chunks > 0,
            vector_db_ready: self.index.contains(&self.collection),
            total_chunks,
            collection: self.collection.clone(),
            persist_path: self
                .index
                .persist_dir()
                .map(|dir| dir.join(format!("{}.json", self.collection))),
        }
    }

    /// Render hits as provenance blocks separated by `---` lines.
    ///
    /// Each block reads `Document {rank} (source: {id}, key=value ...):` followed
    /// by the chunk text. Position keys come first, then the remaining
    /// metadata in key order. An empty result renders as an empty string.
    pub fn format_results(result: &RetrievalResult) -> String {
        result
            .iter()
            .map(|hit| {
                let metadata = &hit.chunk.metadata;
                let mut header = format!("Document {} (source: {}", hit.rank, hit.chunk.source_id);
                let position = POSITION_KEYS
                    .iter()
                    .filter_map(|key| metadata.get_key_value(*key));
                let rest = metadata
                    .iter()
                    .filter(|(key, _)| !POSITION_KEYS.contains(&key.as_str()));
                for (key, value) in position.chain(rest) {
                    header.push_str(&format!(", {}={}", key, scalar_to_text(value)));
                }
                format!("{}):\n{}", header, hit.chunk.text)
            })
            .collect::<Vec<_>>()
            .join("\n---\n")
    }

    /// Short one-line citations, e.g. `guide.pdf, page 3: First words...`.
    pub fn citations(result: &RetrievalResult) -> Vec<String> {
        result
            .iter()
            .map(|hit| {
                let preview: String = hit
                    .chunk
                    .text
                    .trim()
                    .chars()
                    .take(CITATION_PREVIEW_CHARS)
                    .map(|c| if c == '\n' { ' ' } else { c })
                    .collect();
                match hit.chunk.metadata_text("page") {
                    Some(page) => format!("{}, page {}: {}...", hit.chunk.source_id, page, preview),
                    None => format!("{}: {}...", hit.chunk.source_id, preview),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;
    use docent_core::error::DocentError;
    use docent_core::types::{Chunk, Metadata};

    fn make_retriever(index: VectorIndex) -> Retriever {
        Retriever::new(index, HashEmbedding::new(128).unwrap(), "python_docs")
            .unwrap()
            .with_chunker(Chunker::new(200, 40).unwrap())
    }

    fn python_sources() -> Vec<SourceDocument> {
        vec![
            SourceDocument::new(
                "lists.md",
                "Lists are mutable sequences. Use append to add items and slicing to copy them.",
            )
            .with_metadata("topic", "lists")
            .with_metadata("page", 1),
            SourceDocument::new(
                "decorators.md",
                "Decorators wrap a function. The @ syntax applies a decorator at definition time.",
            )
            .with_metadata("topic", "decorators")
            .with_metadata("page", 7),
            SourceDocument::new(
                "generators.md",
                "Generators yield values lazily. A generator function uses the yield keyword.",
            )
            .with_metadata("topic", "generators")
            .with_metadata("page", 12),
        ]
    }

    #[tokio::test]
    async fn test_empty_collection_returns_empty_result() {
        let retriever = make_retriever(VectorIndex::new());
        let result = retriever.retrieve("anything", 3).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(Retriever::format_results(&result), "");
    }

    #[tokio::test]
    async fn test_reindex_and_retrieve() {
        let retriever = make_retriever(VectorIndex::new());
        let count = retriever.reindex(&python_sources()).await.unwrap();
        assert_eq!(count, 3);

        let result = retriever.retrieve("how does the yield keyword work", 1).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.hits[0].chunk.source_id, "generators.md");
    }

    #[tokio::test]
    async fn test_reindex_replaces_previous_sources() {
        let retriever = make_retriever(VectorIndex::new());
        retriever.reindex(&python_sources()).await.unwrap();
        retriever
            .reindex(&[SourceDocument::new("only.md", "A single replacement document.")])
            .await
            .unwrap();

        let result = retriever.retrieve("lists decorators generators", 10).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.hits[0].chunk.source_id, "only.md");
    }

    #[tokio::test]
    async fn test_status_reflects_chunk_count() {
        let dir = tempfile::tempdir().unwrap();
        let retriever = make_retriever(VectorIndex::new().with_persist_dir(dir.path()));

        let before = retriever.status();
        assert!(!before.source_loaded);
        assert!(!before.vector_db_ready);
        assert_eq!(before.total_chunks, 0);

        let count = retriever.reindex(&python_sources()).await.unwrap();
        let after = retriever.status();
        assert!(after.source_loaded);
        assert!(after.vector_db_ready);
        assert_eq!(after.total_chunks, count);
        assert_eq!(after.collection, "python_docs");
        assert_eq!(after.persist_path, Some(dir.path().join("python_docs.json")));
    }

    #[tokio::test]
    async fn test_from_config_uses_configured_mode() {
        let mut config = DocentConfig::default();
        config.index.dimensions = 32;
        config.retrieval.mode = "diversity".to_string();
        config.retrieval.k = 2;
        config.retrieval.fetch_k = 5;

        let embedder: Arc<dyn DynEmbeddingService> = Arc::new(HashEmbedding::new(32).unwrap());
        let retriever = Retriever::from_config(VectorIndex::new(), embedder, &config).unwrap();
        assert_eq!(retriever.k(), 2);
        assert_eq!(
            retriever.mode(),
            &SearchMode::Diversity {
                fetch_k: 5,
                lambda: 0.5
            }
        );
        assert_eq!(retriever.collection(), "documents");
    }

    #[tokio::test]
    async fn test_from_config_rejects_invalid_config() {
        let mut config = DocentConfig::default();
        config.chunking.chunk_overlap = 900;
        let embedder: Arc<dyn DynEmbeddingService> = Arc::new(HashEmbedding::default());
        let err = Retriever::from_config(VectorIndex::new(), embedder, &config).unwrap_err();
        assert!(matches!(err, DocentError::InvalidConfiguration(_)));
    }

    fn sample_result() -> RetrievalResult {
        let mut metadata = Metadata::new();
        metadata.insert("page".into(), 3.into());
        metadata.insert("topic".into(), "loops".into());
        metadata.insert("chunk_index".into(), 0.into());
        let first = Chunk::new("For loops iterate.", "guide.pdf", metadata);
        let second = Chunk::new("While loops repeat.\nUntil false.", "notes.txt", Metadata::new());
        RetrievalResult::from_ranked(vec![(first, 0.9), (second, 0.4)])
    }

    #[test]
    fn test_format_results() {
        let formatted = Retriever::format_results(&sample_result());
        assert_eq!(
            formatted,
            "Document 1 (source: guide.pdf, chunk_index=0, page=3, topic=loops):\nFor loops iterate.\n---\n\
             Document 2 (source: notes.txt):\nWhile loops repeat.\nUntil false."
        );
    }

    #[test]
    fn test_debug_names_collection_and_settings() {
        let rendered = format!("{:?}", make_retriever(VectorIndex::new()).with_k(3));
        assert!(rendered.starts_with("Retriever {"));
        assert!(rendered.contains("collection: \"python_docs\""));
        assert!(rendered.contains("k: 3"));
        assert!(rendered.contains("embed_dimensions: 128"));
    }

    #[test]
    fn test_format_results_shows_position_without_page() {
        let mut metadata = Metadata::new();
        metadata.insert("end_char".into(), 2200.into());
        metadata.insert("chunk_index".into(), 2.into());
        metadata.insert("start_char".into(), 1400.into());
        let chunk = Chunk::new("body", "notes.txt", metadata);
        let result = RetrievalResult::from_ranked(vec![(chunk, 0.7)]);
        assert_eq!(
            Retriever::format_results(&result),
            "Document 1 (source: notes.txt, chunk_index=2, start_char=1400, end_char=2200):\nbody"
        );
    }

    #[test]
    fn test_citations() {
        let citations = Retriever::citations(&sample_result());
        assert_eq!(
            citations,
            vec![
                "guide.pdf, page 3: For loops iterate....".to_string(),
                "notes.txt: While loops repeat. Until false....".to_string(),
            ]
        );
    }

    #[test]
    fn test_citation_preview_is_truncated() {
        let chunk = Chunk::new("y".repeat(200), "long.txt", Metadata::new());
        let result = RetrievalResult::from_ranked(vec![(chunk, 1.0)]);
        let citation = &Retriever::citations(&result)[0];
        assert_eq!(citation, &format!("long.txt: {}...", "y".repeat(80)));
    }
}
