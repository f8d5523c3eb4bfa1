use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DocentError, Result};
use crate::types::SearchMode;

/// Top-level configuration for Docent.
///
/// Loaded from `~/.docent/config.toml` by default. Every section falls back to
/// its defaults when omitted, so a partial file is always valid TOML input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocentConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

impl DocentConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed. The values are
    /// not validated here; call [`DocentConfig::validate`] before use.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DocentConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject parameter combinations the chunker, index or agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(invalid("chunking.chunk_size must be greater than zero"));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(invalid(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                chunking.chunk_overlap, chunking.chunk_size
            )));
        }

        if self.index.collection.trim().is_empty() {
            return Err(invalid("index.collection must not be empty"));
        }
        if self.index.dimensions == 0 {
            return Err(invalid("index.dimensions must be greater than zero"));
        }

        let retrieval = &self.retrieval;
        retrieval.search_mode()?;
        if retrieval.k == 0 {
            return Err(invalid("retrieval.k must be greater than zero"));
        }
        if retrieval.fetch_k < retrieval.k {
            return Err(invalid(format!(
                "retrieval.fetch_k ({}) must be at least retrieval.k ({})",
                retrieval.fetch_k, retrieval.k
            )));
        }
        if !(0.0..=1.0).contains(&retrieval.mmr_lambda) {
            return Err(invalid(format!(
                "retrieval.mmr_lambda ({}) must lie in [0, 1]",
                retrieval.mmr_lambda
            )));
        }

        if self.agent.max_tool_rounds == 0 {
            return Err(invalid("agent.max_tool_rounds must be greater than zero"));
        }

        if self.upstream.model_timeout_secs == 0 || self.upstream.embed_timeout_secs == 0 {
            return Err(invalid("upstream timeouts must be greater than zero"));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> DocentError {
    DocentError::InvalidConfiguration(message.into())
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for persisted collections and threads.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.docent/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Chunking parameters, measured in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
        }
    }
}

/// Vector index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Name of the collection the retriever reads from.
    pub collection: String,
    /// Embedding dimensionality.
    pub dimensions: usize,
    /// Write collections to `<data_dir>/vectors` after each mutation.
    pub persist: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            collection: "documents".to_string(),
            dimensions: 384,
            persist: true,
        }
    }
}

/// Retrieval contract used by the retriever and the retrieval tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks returned per query.
    pub k: usize,
    /// "similarity", or "diversity" (alias "mmr").
    pub mode: String,
    /// Candidate pool size for diversity search.
    pub fetch_k: usize,
    /// Relevance/diversity trade-off for diversity search.
    pub mmr_lambda: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 4,
            mode: "similarity".to_string(),
            fetch_k: 6,
            mmr_lambda: 0.5,
        }
    }
}

impl RetrievalConfig {
    /// Resolve the configured mode. Names are matched case-insensitively.
    pub fn search_mode(&self) -> Result<SearchMode> {
        match self.mode.to_ascii_lowercase().as_str() {
            "diversity" | "mmr" => Ok(SearchMode::Diversity {
                fetch_k: self.fetch_k,
                lambda: self.mmr_lambda,
            }),
            "similarity" => Ok(SearchMode::Similarity),
            other => Err(invalid(format!(
                "retrieval.mode '{}' is not one of similarity, diversity, mmr",
                other
            ))),
        }
    }
}

/// Agent orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum tool dispatch rounds per user turn.
    pub max_tool_rounds: usize,
    /// Dispatch the tool requests of one round concurrently.
    pub parallel_tool_calls: bool,
    /// Keep thread logs as JSON files under `<data_dir>/threads`.
    pub persist_threads: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 10,
            parallel_tool_calls: false,
            persist_threads: false,
        }
    }
}

/// Timeouts and retry policy for model and embedding calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub model_timeout_secs: u64,
    pub embed_timeout_secs: u64,
    /// Additional attempts after the first failed one.
    pub max_retries: u32,
    /// Base delay, doubled after every failed attempt.
    pub retry_backoff_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            model_timeout_secs: 60,
            embed_timeout_secs: 30,
            max_retries: 2,
            retry_backoff_ms: 250,
        }
    }
}
