//! Embedding service trait and the built-in feature-hashing embedder.
//!
//! Real embedding providers live outside this crate and plug in through
//! [`EmbeddingService`]. `HashEmbedding` is deterministic and dependency-free:
//! it hashes lowercase word tokens into signed buckets, so texts that share
//! vocabulary land close together under cosine similarity.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use docent_core::error::{DocentError, Result};

/// Service for generating text embeddings.
///
/// Implementations convert text into fixed-dimensional vectors. Used for both
/// ingestion (indexing) and retrieval (query).
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// `EmbeddingService::embed` returns `impl Future` and is therefore not
/// object-safe; this trait boxes the future instead so that
/// `Arc<dyn DynEmbeddingService>` can be shared between the retriever and the
/// ingestion pipeline. Every `EmbeddingService` gets it through a blanket impl.
pub trait DynEmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text (boxed future).
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>>> + Send + 'a>>;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

/// Embed `text`, failing with `UpstreamTimeout` if the service is too slow.
pub async fn embed_with_timeout(
    embedder: &dyn DynEmbeddingService,
    text: &str,
    timeout: Duration,
) -> Result<Vec<f32>> {
    match tokio::time::timeout(timeout, embedder.embed_boxed(text)).await {
        Ok(result) => result,
        Err(_) => Err(DocentError::UpstreamTimeout {
            operation: "embed".to_string(),
            after_ms: timeout.as_millis() as u64,
        }),
    }
}

// ---------------------------------------------------------------------------
// HashEmbedding - deterministic feature hashing
// ---------------------------------------------------------------------------

/// Deterministic embedder based on the hashing trick.
///
/// Each lowercase alphanumeric token adds `±1` to one bucket; the result is
/// L2-normalised. Text without any token maps to the zero vector, which has
/// cosine similarity 0 with everything.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimensions: usize,
}

impl HashEmbedding {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(DocentError::InvalidConfiguration(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(Self { dimensions })
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut result = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dimensions as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            result[bucket] += sign;
        }

        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }

        result
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

impl EmbeddingService for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// 64-bit FNV-1a. Fixed across builds, so persisted vectors stay comparable
/// with fresh query embeddings.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}
