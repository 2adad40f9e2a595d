//! In-memory storage, for tests and `--dry-run` style use.

use std::collections::HashMap;
use tokio::sync::RwLock;
use unblock_core::{
    BlockerId, BlockerRecord, EscalationEntry, GraphSnapshot, ResolutionPattern,
};
use super::{Storage, Result};

#[derive(Default)]
struct Inner {
    blockers: HashMap<BlockerId, BlockerRecord>,
    graph: Option<GraphSnapshot>,
    patterns: HashMap<String, ResolutionPattern>,
    timeline: Vec<EscalationEntry>,
}

/// Storage that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn save_blocker(&self, record: &BlockerRecord) -> Result<()> {
        self.inner.write().await.blockers.insert(record.id, record.clone());
        Ok(())
    }

    async fn load_blocker(&self, id: BlockerId) -> Result<Option<BlockerRecord>> {
        Ok(self.inner.read().await.blockers.get(&id).cloned())
    }

    async fn list_blockers(&self) -> Result<Vec<BlockerRecord>> {
        let mut records: Vec<BlockerRecord> = self.inner.read().await.blockers.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn save_graph(&self, snapshot: &GraphSnapshot) -> Result<()> {
        self.inner.write().await.graph = Some(snapshot.clone());
        Ok(())
    }

    async fn load_graph(&self) -> Result<Option<GraphSnapshot>> {
        Ok(self.inner.read().await.graph.clone())
    }

    async fn save_pattern(&self, pattern: &ResolutionPattern) -> Result<()> {
        self.inner
            .write()
            .await
            .patterns
            .insert(pattern.key.slug(), pattern.clone());
        Ok(())
    }

    async fn list_patterns(&self) -> Result<Vec<ResolutionPattern>> {
        Ok(self.inner.read().await.patterns.values().cloned().collect())
    }

    async fn save_timeline(&self, entries: &[EscalationEntry]) -> Result<()> {
        self.inner.write().await.timeline = entries.to_vec();
        Ok(())
    }

    async fn load_timeline(&self) -> Result<Vec<EscalationEntry>> {
        Ok(self.inner.read().await.timeline.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use unblock_core::{BlockerSignal, SourceKind, TaskId};

    #[tokio::test]
    async fn test_default_task_lookup() {
        let storage = MemoryStorage::new();
        let now = Utc::now();
        let signal = BlockerSignal::new(SourceKind::Report, "bob", "no access", now)
            .with_tasks([TaskId::from("deploy")]);
        let record = BlockerRecord::new(BlockerId::new(), signal, now);
        storage.save_blocker(&record).await.unwrap();

        assert_eq!(storage.list_blockers_for_task(&TaskId::from("deploy")).await.unwrap().len(), 1);
        assert!(storage.list_blockers_for_task(&TaskId::from("other")).await.unwrap().is_empty());
    }
}
