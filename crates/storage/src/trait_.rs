//! Storage trait abstraction.

use async_trait::async_trait;
use unblock_core::{
    BlockerId, BlockerRecord, EscalationEntry, GraphSnapshot, ResolutionPattern, TaskId,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Storage abstraction for Unblock data.
///
/// Implementations serialize their own writes, so a single handle can be
/// shared behind an `Arc` by the orchestrator and the ticker.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Blocker operations ===

    /// Save a blocker record (create or update).
    async fn save_blocker(&self, record: &BlockerRecord) -> Result<()>;

    /// Load a blocker record by ID.
    async fn load_blocker(&self, id: BlockerId) -> Result<Option<BlockerRecord>>;

    /// List all blocker records, oldest first.
    async fn list_blockers(&self) -> Result<Vec<BlockerRecord>>;

    /// List blockers reported against a task.
    async fn list_blockers_for_task(&self, task: &TaskId) -> Result<Vec<BlockerRecord>> {
        Ok(self
            .list_blockers()
            .await?
            .into_iter()
            .filter(|r| r.related_tasks().contains(task))
            .collect())
    }

    // === Graph operations ===

    /// Replace the stored graph snapshot.
    async fn save_graph(&self, snapshot: &GraphSnapshot) -> Result<()>;

    /// Load the graph snapshot, if one was saved.
    async fn load_graph(&self) -> Result<Option<GraphSnapshot>>;

    // === Pattern operations ===

    /// Save a pattern (create or update by key).
    async fn save_pattern(&self, pattern: &ResolutionPattern) -> Result<()>;

    /// List all patterns.
    async fn list_patterns(&self) -> Result<Vec<ResolutionPattern>>;

    // === Timeline operations ===

    /// Replace the stored escalation entries.
    async fn save_timeline(&self, entries: &[EscalationEntry]) -> Result<()>;

    /// Load escalation entries; empty if none were saved.
    async fn load_timeline(&self) -> Result<Vec<EscalationEntry>>;
}
