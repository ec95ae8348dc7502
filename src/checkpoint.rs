//! Checkpointing contract and the in-memory backend.
//!
//! The stepper saves a checkpoint after every merged step, keyed by an
//! opaque thread id. A checkpoint carries the full working state plus the
//! node to (re-)enter, so a suspended run can be resumed by a different
//! process against the same backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::state::GenerationState;
use crate::types::PhaseKind;

/// One saved step of a generation thread.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub thread_id: String,
    pub step: u64,
    pub state: GenerationState,
    /// The node the stepper enters when this checkpoint is loaded. A
    /// suspended step stores its own node, so resume re-enters it.
    pub next: PhaseKind,
    pub created_at: DateTime<Utc>,
}

/// Storage backend for checkpoints.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointerError>;

    /// Latest checkpoint for a thread, or `None` for an unknown thread.
    async fn load_latest(&self, thread_id: &str)
    -> Result<Option<Checkpoint>, CheckpointerError>;

    /// Remove every checkpoint for a thread. Unknown threads are a no-op.
    async fn delete_thread(&self, thread_id: &str) -> Result<(), CheckpointerError>;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointerError {
    #[error("checkpoint (de)serialization failed: {source}")]
    #[diagnostic(code(worldloom::checkpoint::serde))]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    #[cfg(feature = "sqlite")]
    #[error("sqlite checkpoint backend failed: {source}")]
    #[diagnostic(code(worldloom::checkpoint::sqlite))]
    Sqlite {
        #[source]
        source: sqlx::Error,
    },

    #[error("persisted checkpoint is corrupted: {0}")]
    #[diagnostic(
        code(worldloom::checkpoint::corrupt),
        help("The row predates the current encoding or was edited by hand.")
    )]
    Corrupt(String),
}

/// Which backend a runtime should construct.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CheckpointerType {
    #[default]
    InMemory,
    #[cfg(feature = "sqlite")]
    Sqlite,
}

/// Volatile backend for tests and single-process development.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointer {
    threads: Arc<RwLock<FxHashMap<String, Vec<Checkpoint>>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointerError> {
        let mut threads = self.threads.write().await;
        threads
            .entry(checkpoint.thread_id.clone())
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    async fn load_latest(
        &self,
        thread_id: &str,
    ) -> Result<Option<Checkpoint>, CheckpointerError> {
        let threads = self.threads.read().await;
        Ok(threads
            .get(thread_id)
            .and_then(|steps| steps.iter().max_by_key(|cp| cp.step))
            .cloned())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), CheckpointerError> {
        let mut threads = self.threads.write().await;
        threads.remove(thread_id);
        Ok(())
    }
}
