//! Docent vector crate - chunking, embeddings, vector index, retrieval and ingestion.
//!
//! Provides a character-based chunker, an embedding service trait with a
//! deterministic feature-hashing implementation, an in-memory collection index
//! with cosine and MMR search, the retriever used by agents, and the pipeline
//! that ties them together.

pub mod chunker;
pub mod embedding;
pub mod index;
pub mod pipeline;
pub mod retriever;

pub use chunker::Chunker;
pub use embedding::{DynEmbeddingService, EmbeddingService, HashEmbedding};
pub use index::VectorIndex;
pub use pipeline::{IngestPipeline, IngestReport};
pub use retriever::{IndexStatus, Retriever};
