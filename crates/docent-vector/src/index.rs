//! In-memory vector index with brute-force cosine similarity search.
//!
//! Chunks live in named collections. Each collection is an immutable
//! snapshot behind an `Arc`: searches clone the `Arc` under a short read lock
//! and score without holding it, while writers build a complete replacement
//! and swap it in under the write lock. A search therefore sees either the
//! state before a write or after it, never a half-applied batch.
//!
//! When built with a persist directory, every mutation is written to
//! `<dir>/<collection>.json` before the new snapshot becomes visible.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use docent_core::error::{DocentError, Result};
use docent_core::types::{Chunk, RetrievalResult, SearchMode};

/// One named collection of embedded chunks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Collection {
    /// Established by the first insert unless the index has a fixed dimension.
    dimensions: Option<usize>,
    chunks: Vec<Chunk>,
}

/// Collection store with cosine similarity and diversity (MMR) search.
///
/// Cheap to clone: clones share the same collections.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    collections: Arc<RwLock<HashMap<String, Arc<Collection>>>>,
    fixed_dimensions: Option<usize>,
    persist_dir: Option<PathBuf>,
}

impl VectorIndex {
    /// Create a new empty, memory-only index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require every collection to use exactly `dimensions`.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.fixed_dimensions = Some(dimensions);
        self
    }

    /// Persist each collection as JSON under `dir`.
    pub fn with_persist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persist_dir = Some(dir.into());
        self
    }

    pub fn persist_dir(&self) -> Option<&Path> {
        self.persist_dir.as_deref()
    }

    /// Append embedded chunks to `collection`, creating it if needed.
    ///
    /// The batch is all-or-nothing: a chunk without an embedding or with the
    /// wrong dimension rejects the whole batch. Returns the new chunk count.
    pub fn insert(&self, collection: &str, chunks: Vec<Chunk>) -> Result<usize> {
        validate_name(collection)?;
        let mut collections = self.write_lock()?;

        let current = collections.get(collection).cloned().unwrap_or_default();
        let dimensions = current.dimensions.or(self.fixed_dimensions);
        let dimensions = check_batch(&chunks, dimensions)?;

        let mut next = Collection {
            dimensions,
            chunks: Vec::with_capacity(current.chunks.len() + chunks.len()),
        };
        next.chunks.extend(current.chunks.iter().cloned());
        next.chunks.extend(chunks);
        let total = next.chunks.len();

        self.persist(collection, &next)?;
        collections.insert(collection.to_string(), Arc::new(next));
        debug!(collection, total, "Inserted chunks");
        Ok(total)
    }

    /// Replace `collection` wholesale with `chunks`.
    ///
    /// The new collection is validated and built before the swap, so readers
    /// never observe a mix of old and new chunks. An empty batch leaves an
    /// empty collection behind.
    pub fn replace_collection(&self, collection: &str, chunks: Vec<Chunk>) -> Result<usize> {
        validate_name(collection)?;
        let dimensions = check_batch(&chunks, self.fixed_dimensions)?;
        let next = Collection { dimensions, chunks };
        let total = next.chunks.len();

        let mut collections = self.write_lock()?;
        self.persist(collection, &next)?;
        collections.insert(collection.to_string(), Arc::new(next));
        info!(collection, total, "Replaced collection");
        Ok(total)
    }

    /// Search `collection` for the `k` best chunks.
    ///
    /// Empty or unknown collections yield an empty result. Scores are cosine
    /// similarities to the query; ties keep insertion order.
    pub fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
        mode: &SearchMode,
    ) -> Result<RetrievalResult> {
        let snapshot = match self.snapshot(collection)? {
            Some(snapshot) if !snapshot.chunks.is_empty() => snapshot,
            _ => return Ok(RetrievalResult::empty()),
        };

        if let Some(expected) = snapshot.dimensions {
            if query.len() != expected {
                return Err(DocentError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }
        if k == 0 {
            return Ok(RetrievalResult::empty());
        }

        let mut scored: Vec<(usize, f64)> = snapshot
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (i, cosine_similarity(query, embedding_of(chunk))))
            .collect();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let selected = match *mode {
            SearchMode::Similarity => {
                scored.truncate(k);
                scored
            }
            SearchMode::Diversity { fetch_k, lambda } => {
                scored.truncate(fetch_k.max(k));
                mmr_select(&snapshot.chunks, &scored, k, lambda)
            }
        };

        let ranked = selected
            .into_iter()
            .map(|(i, score)| (snapshot.chunks[i].clone(), score))
            .collect();
        Ok(RetrievalResult::from_ranked(ranked))
    }

    /// Number of chunks in `collection` (0 if it does not exist).
    pub fn len(&self, collection: &str) -> usize {
        self.snapshot(collection)
            .ok()
            .flatten()
            .map(|c| c.chunks.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.snapshot(collection).ok().flatten().is_some()
    }

    /// Established dimension of `collection`, if any.
    pub fn dimensions(&self, collection: &str) -> Option<usize> {
        self.snapshot(collection)
            .ok()
            .flatten()
            .and_then(|c| c.dimensions)
            .or(self.fixed_dimensions)
    }

    /// Sorted names of all collections.
    pub fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .collections
            .read()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Remove `collection` and its persisted file. Returns whether it existed.
    pub fn drop_collection(&self, collection: &str) -> Result<bool> {
        validate_name(collection)?;
        let mut collections = self.write_lock()?;
        let existed = collections.remove(collection).is_some();
        if let Some(path) = self.collection_path(collection) {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        info!(collection, existed, "Dropped collection");
        Ok(existed)
    }

    /// Load `<persist_dir>/<collection>.json`, replacing any in-memory copy.
    ///
    /// Returns the number of chunks loaded, or 0 if no file exists.
    pub fn load_collection(&self, collection: &str) -> Result<usize> {
        validate_name(collection)?;
        let Some(path) = self.collection_path(collection) else {
            return Err(DocentError::Storage(
                "index has no persist directory".to_string(),
            ));
        };
        if !path.exists() {
            debug!(collection, path = %path.display(), "No persisted collection");
            return Ok(0);
        }

        let content = std::fs::read_to_string(&path)?;
        let loaded: Collection = serde_json::from_str(&content)?;
        let expected = loaded.dimensions.or(self.fixed_dimensions);
        let dimensions = check_batch(&loaded.chunks, expected)?;
        let next = Collection {
            dimensions,
            chunks: loaded.chunks,
        };
        let total = next.chunks.len();

        self.write_lock()?
            .insert(collection.to_string(), Arc::new(next));
        info!(collection, total, path = %path.display(), "Loaded collection");
        Ok(total)
    }

    /// Load every `*.json` collection found in the persist directory.
    pub fn load_all(&self) -> Result<usize> {
        let Some(dir) = self.persist_dir.as_ref() else {
            return Ok(0);
        };
        if !dir.exists() {
            return Ok(0);
        }

        let mut loaded = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_name(name).is_ok() {
                    self.load_collection(name)?;
                    loaded += 1;
                }
            }
        }
        Ok(loaded)
    }

    fn snapshot(&self, collection: &str) -> Result<Option<Arc<Collection>>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| DocentError::Storage(format!("Lock poisoned: {}", e)))?;
        Ok(collections.get(collection).cloned())
    }

    fn write_lock(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Collection>>>> {
        self.collections
            .write()
            .map_err(|e| DocentError::Storage(format!("Lock poisoned: {}", e)))
    }

    fn collection_path(&self, collection: &str) -> Option<PathBuf> {
        self.persist_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", collection)))
    }

    fn persist(&self, collection: &str, data: &Collection) -> Result<()> {
        let Some(path) = self.collection_path(collection) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write then rename so a crash never leaves a truncated file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(data)?)?;
        std::fs::rename(&tmp, &path)?;
        debug!(collection, path = %path.display(), "Persisted collection");
        Ok(())
    }
}

/// Collection names double as file names.
fn validate_name(collection: &str) -> Result<()> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(DocentError::InvalidConfiguration(format!(
            "invalid collection name '{}': use ASCII letters, digits, '_' or '-'",
            collection
        )))
    }
}

/// Check that every chunk carries an embedding of one consistent dimension.
///
/// Returns the dimension the collection ends up with.
fn check_batch(chunks: &[Chunk], expected: Option<usize>) -> Result<Option<usize>> {
    let mut dimensions = expected;
    for chunk in chunks {
        let Some(embedding) = chunk.embedding.as_ref() else {
            return Err(DocentError::InvalidConfiguration(format!(
                "chunk {:?} of '{}' has no embedding",
                chunk.chunk_index(),
                chunk.source_id
            )));
        };
        match dimensions {
            Some(expected) if embedding.len() != expected => {
                return Err(DocentError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
            Some(_) => {}
            None => dimensions = Some(embedding.len()),
        }
    }
    Ok(dimensions)
}

fn embedding_of(chunk: &Chunk) -> &[f32] {
    chunk.embedding.as_deref().unwrap_or(&[])
}

/// Greedy maximal marginal relevance over pre-ranked candidates.
///
/// Each step picks the candidate maximising
/// `lambda * sim(query, d) - (1 - lambda) * max sim(d, selected)`; ties go to
/// the better-ranked candidate. Scores stay the query similarity.
fn mmr_select(
    chunks: &[Chunk],
    candidates: &[(usize, f64)],
    k: usize,
    lambda: f64,
) -> Vec<(usize, f64)> {
    let mut remaining: Vec<(usize, f64)> = candidates.to_vec();
    let mut selected: Vec<(usize, f64)> = Vec::with_capacity(k.min(candidates.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_value = f64::NEG_INFINITY;

        for (pos, &(idx, query_sim)) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|&(sel, _)| {
                    cosine_similarity(embedding_of(&chunks[idx]), embedding_of(&chunks[sel]))
                })
                .fold(f64::NEG_INFINITY, f64::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };
            let value = lambda * query_sim - (1.0 - lambda) * redundancy;
            if value > best_value {
                best_value = value;
                best_pos = pos;
            }
        }

        selected.push(remaining.remove(best_pos));
    }

    selected
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
