//! JSON file storage implementation.
//!
//! Stores data as JSON files under a root directory (`.unblock` by default)
//! and keeps small per-object meta markers (version + updated_at).

use std::path::{Path, PathBuf};
use unblock_core::{
    BlockerId, BlockerRecord, EscalationEntry, GraphSnapshot, ResolutionPattern,
};
use super::{Storage, Result};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    /// Serializes writes so meta versions never race.
    write_lock: Mutex<()>,
}

impl JsonStorage {
    /// Create storage, creating the subdirectories for data and meta markers.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        // Ensure primary directories
        fs::create_dir_all(root.join("blockers")).await?;
        fs::create_dir_all(root.join("patterns")).await?;

        // Directories for meta/versioning (only meta markers are stored)
        fs::create_dir_all(root.join("meta").join("blockers")).await?;
        fs::create_dir_all(root.join("meta").join("patterns")).await?;
        fs::create_dir_all(root.join("meta").join("state")).await?;

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blocker_path(&self, id: BlockerId) -> PathBuf {
        self.root.join("blockers").join(format!("{}.json", id))
    }
    fn pattern_path(&self, slug: &str) -> PathBuf {
        self.root.join("patterns").join(format!("{}.json", slug))
    }
    fn graph_path(&self) -> PathBuf {
        self.root.join("graph.json")
    }
    fn timeline_path(&self) -> PathBuf {
        self.root.join("timeline.json")
    }

    fn meta_path(&self, kind: &str, id: &str) -> PathBuf {
        self.root.join("meta").join(kind).join(format!("{}.meta.json", id))
    }

    /// Write `value` to `path` and bump the object's meta version.
    async fn write_versioned<T: serde::Serialize + ?Sized>(
        &self,
        path: &Path,
        value: &T,
        kind: &str,
        id: &str,
    ) -> Result<u64> {
        let json = serde_json::to_string_pretty(value)?;
        let _guard = self.write_lock.lock().await;
        fs::write(path, json.as_bytes()).await?;
        let version = self.bump_version(kind, id).await?;
        debug!(kind, id, version, "Stored");
        Ok(version)
    }

    /// Read and increment per-object version, return new version.
    async fn bump_version(&self, kind: &str, id: &str) -> Result<u64> {
        let path = self.meta_path(kind, id);
        // Read existing
        let mut version = 0u64;
        if let Ok(s) = fs::read_to_string(&path).await {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&s) {
                if let Some(v) = json.get("version").and_then(|v| v.as_u64()) {
                    version = v;
                }
            }
        }
        version += 1;
        let meta = serde_json::json!({"version": version, "updated_at": chrono::Utc::now()});
        fs::write(&path, serde_json::to_string_pretty(&meta)?.as_bytes()).await?;
        Ok(version)
    }

    /// Current meta version of an object, 0 if never written.
    pub async fn version(&self, kind: &str, id: &str) -> Result<u64> {
        let meta: Option<serde_json::Value> = read_json(&self.meta_path(kind, id)).await?;
        Ok(meta
            .and_then(|m| m.get("version").and_then(|v| v.as_u64()))
            .unwrap_or(0))
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn save_blocker(&self, record: &BlockerRecord) -> Result<()> {
        let id_str = record.id.to_string();
        self.write_versioned(&self.blocker_path(record.id), record, "blockers", &id_str)
            .await?;
        Ok(())
    }

    async fn load_blocker(&self, id: BlockerId) -> Result<Option<BlockerRecord>> {
        read_json(&self.blocker_path(id)).await
    }

    async fn list_blockers(&self) -> Result<Vec<BlockerRecord>> {
        let mut records = list_dir(&self.root.join("blockers")).await?;
        records.sort_by(|a: &BlockerRecord, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn save_graph(&self, snapshot: &GraphSnapshot) -> Result<()> {
        self.write_versioned(&self.graph_path(), snapshot, "state", "graph").await?;
        Ok(())
    }

    async fn load_graph(&self) -> Result<Option<GraphSnapshot>> {
        read_json(&self.graph_path()).await
    }

    async fn save_pattern(&self, pattern: &ResolutionPattern) -> Result<()> {
        let slug = pattern.key.slug();
        self.write_versioned(&self.pattern_path(&slug), pattern, "patterns", &slug)
            .await?;
        Ok(())
    }

    async fn list_patterns(&self) -> Result<Vec<ResolutionPattern>> {
        list_dir(&self.root.join("patterns")).await
    }

    async fn save_timeline(&self, entries: &[EscalationEntry]) -> Result<()> {
        self.write_versioned(&self.timeline_path(), entries, "state", "timeline").await?;
        Ok(())
    }

    async fn load_timeline(&self) -> Result<Vec<EscalationEntry>> {
        Ok(read_json(&self.timeline_path()).await?.unwrap_or_default())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(&entry.path()).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => tracing::warn!(path = %entry.path().display(), error = %e, "Skipping unreadable file"),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use unblock_core::{
        BlockerSignal, BlockerType, DependencyEdge, EntryStatus, EscalationStage, PatternKey,
        ResolutionAction, Severity, SourceKind, Task, TaskId,
    };

    async fn storage() -> (tempfile::TempDir, JsonStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path().join(".unblock")).await.unwrap();
        (dir, storage)
    }

    fn record(task: &str) -> BlockerRecord {
        let now = Utc::now();
        let signal = BlockerSignal::new(SourceKind::Monitor, "ann", "CI is down", now)
            .with_tasks([TaskId::from(task)]);
        BlockerRecord::new(BlockerId::new(), signal, now)
    }

    #[tokio::test]
    async fn test_blocker_round_trip_bumps_version() {
        let (_dir, storage) = storage().await;
        let rec = record("t1");
        storage.save_blocker(&rec).await.unwrap();
        storage.save_blocker(&rec).await.unwrap();

        let loaded = storage.load_blocker(rec.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, rec.id);
        assert_eq!(storage.version("blockers", &rec.id.to_string()).await.unwrap(), 2);
        assert!(storage.load_blocker(BlockerId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_by_task() {
        let (_dir, storage) = storage().await;
        let a = record("t1");
        let b = record("t2");
        storage.save_blocker(&a).await.unwrap();
        storage.save_blocker(&b).await.unwrap();

        let found = storage.list_blockers_for_task(&TaskId::from("t2")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, b.id);
        assert_eq!(storage.list_blockers().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_graph_and_timeline_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");
        let now = Utc::now();
        let snapshot = GraphSnapshot {
            tasks: vec![Task::new("a"), Task::new("b")],
            edges: vec![DependencyEdge::new("b", "a", now)],
            ..Default::default()
        };
        let entry = EscalationEntry {
            blocker_id: BlockerId::new(),
            severity: Severity::High,
            stage: EscalationStage::FollowUp1,
            due_at: now,
            status: EntryStatus::Pending,
            fired_at: None,
        };

        {
            let storage = JsonStorage::new(&root).await.unwrap();
            assert!(storage.load_graph().await.unwrap().is_none());
            assert!(storage.load_timeline().await.unwrap().is_empty());
            storage.save_graph(&snapshot).await.unwrap();
            storage.save_timeline(std::slice::from_ref(&entry)).await.unwrap();
        }

        let reopened = JsonStorage::new(&root).await.unwrap();
        assert_eq!(reopened.load_graph().await.unwrap(), Some(snapshot));
        assert_eq!(reopened.load_timeline().await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn test_patterns_keyed_by_slug() {
        let (_dir, storage) = storage().await;
        let mut pattern = ResolutionPattern {
            key: PatternKey::new(BlockerType::Resource, ["team:infra"]),
            successful_strategy: ResolutionAction::Escalate,
            avg_resolution_hours: 4.0,
            recurrence_rate: 0.0,
            last_seen: Utc::now(),
            occurrences: 1,
        };
        storage.save_pattern(&pattern).await.unwrap();
        pattern.occurrences = 2;
        storage.save_pattern(&pattern).await.unwrap();

        let all = storage.list_patterns().await.unwrap();
        assert_eq!(all, vec![pattern]);
    }
}
