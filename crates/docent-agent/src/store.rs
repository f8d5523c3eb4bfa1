//! Conversation storage.
//!
//! A store hands out one `tokio::sync::Mutex<ThreadState>` per thread id, so
//! turns on the same thread run one at a time while distinct threads never
//! share mutable state. Threads are created lazily on first reference and are
//! never deleted implicitly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use docent_core::config::AgentConfig;
use docent_core::error::DocentError;
use docent_core::types::ThreadState;

use crate::error::AgentError;

/// Shared handle to one thread's state.
pub type ThreadHandle = Arc<Mutex<ThreadState>>;

/// Per-thread message history, keyed by an opaque thread id.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Handle for `thread_id`, creating an empty thread if it is new.
    async fn open(&self, thread_id: &str) -> Result<ThreadHandle, AgentError>;

    /// Durably record `thread` after a committed turn.
    async fn persist(&self, thread: &ThreadState) -> Result<(), AgentError>;

    /// Ids of all threads known to the store, sorted.
    async fn thread_ids(&self) -> Vec<String>;

    /// Copy of the current state of `thread_id`, if it exists.
    async fn snapshot(&self, thread_id: &str) -> Result<Option<ThreadState>, AgentError>;
}

/// Store selected by `agent.persist_threads`: JSON files under
/// `<data_dir>/threads`, or process memory.
pub fn store_from_config(config: &AgentConfig, data_dir: &Path) -> Arc<dyn ConversationStore> {
    if config.persist_threads {
        Arc::new(FileConversationStore::new(data_dir.join("threads")))
    } else {
        Arc::new(InMemoryConversationStore::new())
    }
}

// =============================================================================
// InMemoryConversationStore
// =============================================================================

/// Process-local store. Threads live as long as the store.
#[derive(Default)]
pub struct InMemoryConversationStore {
    threads: Mutex<HashMap<String, ThreadHandle>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn open(&self, thread_id: &str) -> Result<ThreadHandle, AgentError> {
        let mut threads = self.threads.lock().await;
        let handle = threads
            .entry(thread_id.to_string())
            .or_insert_with(|| {
                debug!(thread_id, "Creating thread");
                Arc::new(Mutex::new(ThreadState::new(thread_id)))
            })
            .clone();
        Ok(handle)
    }

    async fn persist(&self, _thread: &ThreadState) -> Result<(), AgentError> {
        Ok(())
    }

    async fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.threads.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn snapshot(&self, thread_id: &str) -> Result<Option<ThreadState>, AgentError> {
        let handle = self.threads.lock().await.get(thread_id).cloned();
        match handle {
            Some(handle) => Ok(Some(handle.lock().await.clone())),
            None => Ok(None),
        }
    }
}

// =============================================================================
// FileConversationStore
// =============================================================================

/// Store that keeps each thread as `<dir>/<thread_id>.json`.
///
/// Threads are loaded on first reference and validated; a log that breaks the
/// tool-request pairing rule is rejected as corrupt.
pub struct FileConversationStore {
    dir: PathBuf,
    threads: Mutex<HashMap<String, ThreadHandle>>,
}

impl FileConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            threads: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn thread_path(&self, thread_id: &str) -> Result<PathBuf, AgentError> {
        let valid = !thread_id.is_empty()
            && thread_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !thread_id.starts_with('.');
        if !valid {
            return Err(DocentError::InvalidConfiguration(format!(
                "thread id '{}' cannot be stored as a file name",
                thread_id
            ))
            .into());
        }
        Ok(self.dir.join(format!("{}.json", thread_id)))
    }

    async fn load(&self, thread_id: &str) -> Result<ThreadState, AgentError> {
        let path = self.thread_path(thread_id)?;
        if !tokio::fs::try_exists(&path).await.map_err(DocentError::from)? {
            return Ok(ThreadState::new(thread_id));
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(DocentError::from)?;
        let thread: ThreadState = serde_json::from_str(&content).map_err(DocentError::from)?;
        if thread.thread_id != thread_id {
            return Err(DocentError::Storage(format!(
                "{} holds thread '{}'",
                path.display(),
                thread.thread_id
            ))
            .into());
        }
        thread.validate()?;
        info!(thread_id, messages = thread.len(), "Loaded thread");
        Ok(thread)
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn open(&self, thread_id: &str) -> Result<ThreadHandle, AgentError> {
        if let Some(handle) = self.threads.lock().await.get(thread_id) {
            return Ok(Arc::clone(handle));
        }

        // Disk reads happen without the map lock; the first loader to insert wins.
        let loaded = self.load(thread_id).await?;
        let mut threads = self.threads.lock().await;
        let handle = threads
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(loaded)))
            .clone();
        Ok(handle)
    }

    async fn persist(&self, thread: &ThreadState) -> Result<(), AgentError> {
        let path = self.thread_path(&thread.thread_id)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(DocentError::from)?;
        let body = serde_json::to_vec_pretty(thread).map_err(DocentError::from)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(DocentError::from)?;
        tokio::fs::rename(&tmp, &path).await.map_err(DocentError::from)?;
        debug!(thread_id = %thread.thread_id, path = %path.display(), "Persisted thread");
        Ok(())
    }

    async fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.threads.lock().await.keys().cloned().collect();
        if let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        ids.push(stem.to_string());
                    }
                }
            }
        }
        ids.sort();
        ids.dedup();
        ids
    }

    async fn snapshot(&self, thread_id: &str) -> Result<Option<ThreadState>, AgentError> {
        let cached = self.threads.lock().await.get(thread_id).cloned();
        if let Some(handle) = cached {
            return Ok(Some(handle.lock().await.clone()));
        }
        let path = self.thread_path(thread_id)?;
        if tokio::fs::try_exists(&path).await.map_err(DocentError::from)? {
            Ok(Some(self.load(thread_id).await?))
        } else {
            Ok(None)
        }
    }
}
