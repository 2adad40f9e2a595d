//! Pattern memory - exponentially smoothed resolution statistics.

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};
use unblock_core::{BlockerType, PatternKey, ResolutionAction, ResolutionPattern, Time};

/// Patterns recurring less often than this may steer routing.
pub const RELIABLE_RECURRENCE: f64 = 0.5;

/// The strategy a pattern recommends, if it has proven reliable.
pub fn reliable_strategy(pattern: &ResolutionPattern) -> Option<ResolutionAction> {
    (pattern.recurrence_rate < RELIABLE_RECURRENCE).then_some(pattern.successful_strategy)
}

/// Store of resolution patterns keyed by blocker type and tag set.
///
/// The only writer of [`ResolutionPattern`]; everything else reads.
#[derive(Debug)]
pub struct PatternMemory {
    patterns: RwLock<HashMap<PatternKey, ResolutionPattern>>,
    smoothing: f64,
}

impl PatternMemory {
    /// Create an empty memory with smoothing factor `smoothing` (alpha).
    pub fn new(smoothing: f64) -> Self {
        Self {
            patterns: RwLock::new(HashMap::new()),
            smoothing: smoothing.clamp(0.0, 1.0),
        }
    }

    /// Create a memory pre-loaded with stored patterns.
    pub fn with_patterns(smoothing: f64, patterns: impl IntoIterator<Item = ResolutionPattern>) -> Self {
        let map = patterns.into_iter().map(|p| (p.key.clone(), p)).collect();
        Self {
            patterns: RwLock::new(map),
            smoothing: smoothing.clamp(0.0, 1.0),
        }
    }

    /// Fold one completed cycle into the matching pattern.
    ///
    /// Returns the updated pattern so the caller can persist it.
    pub async fn record<I, S>(
        &self,
        blocker_type: BlockerType,
        tags: I,
        strategy: ResolutionAction,
        resolution_hours: f64,
        recurred: bool,
        at: Time,
    ) -> ResolutionPattern
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = PatternKey::new(blocker_type, tags);
        let observed_recurrence = if recurred { 1.0 } else { 0.0 };
        let alpha = self.smoothing;

        let mut patterns = self.patterns.write().await;
        let pattern = patterns
            .entry(key.clone())
            .and_modify(|p| {
                p.avg_resolution_hours = alpha * resolution_hours + (1.0 - alpha) * p.avg_resolution_hours;
                p.recurrence_rate = alpha * observed_recurrence + (1.0 - alpha) * p.recurrence_rate;
                if !recurred {
                    p.successful_strategy = strategy;
                }
                p.last_seen = at;
                p.occurrences += 1;
            })
            .or_insert_with(|| ResolutionPattern {
                key: key.clone(),
                successful_strategy: strategy,
                avg_resolution_hours: resolution_hours,
                recurrence_rate: observed_recurrence,
                last_seen: at,
                occurrences: 1,
            });

        info!(
            pattern = %key.slug(),
            occurrences = pattern.occurrences,
            avg_hours = pattern.avg_resolution_hours,
            recurrence = pattern.recurrence_rate,
            "Pattern recorded"
        );
        pattern.clone()
    }

    /// Exact-match lookup.
    pub async fn query<I, S>(&self, blocker_type: BlockerType, tags: I) -> Option<ResolutionPattern>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = PatternKey::new(blocker_type, tags);
        let found = self.patterns.read().await.get(&key).cloned();
        debug!(pattern = %key.slug(), hit = found.is_some(), "Pattern query");
        found
    }

    /// Every stored pattern, most frequent first.
    pub async fn all(&self) -> Vec<ResolutionPattern> {
        let mut all: Vec<ResolutionPattern> = self.patterns.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.occurrences.cmp(&a.occurrences).then_with(|| a.key.cmp(&b.key)));
        all
    }

    /// Number of stored patterns.
    pub async fn len(&self) -> usize {
        self.patterns.read().await.len()
    }

    /// Whether nothing has been learned yet.
    pub async fn is_empty(&self) -> bool {
        self.patterns.read().await.is_empty()
    }
}

impl Default for PatternMemory {
    fn default() -> Self {
        Self::new(0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const TAGS: [&str; 2] = ["source:monitor", "team:infra"];

    #[tokio::test]
    async fn test_first_record_creates_pattern() {
        let memory = PatternMemory::default();
        let p = memory
            .record(BlockerType::Resource, TAGS, ResolutionAction::Escalate, 6.0, false, Utc::now())
            .await;
        assert_eq!(p.occurrences, 1);
        assert_eq!(p.avg_resolution_hours, 6.0);
        assert_eq!(p.recurrence_rate, 0.0);
        assert_eq!(memory.len().await, 1);
    }

    #[tokio::test]
    async fn test_smoothing_moves_toward_new_value() {
        let memory = PatternMemory::new(0.2);
        let now = Utc::now();
        memory.record(BlockerType::Technical, TAGS, ResolutionAction::Notify, 10.0, false, now).await;
        let p = memory
            .record(BlockerType::Technical, TAGS, ResolutionAction::Notify, 20.0, true, now)
            .await;
        assert!((p.avg_resolution_hours - 12.0).abs() < 1e-9);
        assert!((p.recurrence_rate - 0.2).abs() < 1e-9);
        assert_eq!(p.occurrences, 2);
    }

    #[tokio::test]
    async fn test_recurrence_keeps_previous_strategy() {
        let memory = PatternMemory::default();
        let now = Utc::now();
        memory.record(BlockerType::Knowledge, TAGS, ResolutionAction::ProvideInfo, 2.0, false, now).await;
        let p = memory
            .record(BlockerType::Knowledge, TAGS, ResolutionAction::ScheduleMeeting, 4.0, true, now)
            .await;
        assert_eq!(p.successful_strategy, ResolutionAction::ProvideInfo);
        assert_eq!(reliable_strategy(&p), Some(ResolutionAction::ProvideInfo));
    }

    #[tokio::test]
    async fn test_query_is_exact_match() {
        let memory = PatternMemory::default();
        memory
            .record(BlockerType::Dependency, TAGS, ResolutionAction::Notify, 1.0, false, Utc::now())
            .await;

        let reordered = ["team:infra", "source:monitor"];
        assert!(memory.query(BlockerType::Dependency, reordered).await.is_some());
        assert!(memory.query(BlockerType::Dependency, ["team:infra"]).await.is_none());
        assert!(memory.query(BlockerType::Resource, TAGS).await.is_none());
    }

    #[tokio::test]
    async fn test_recurring_pattern_not_reliable() {
        let memory = PatternMemory::new(1.0);
        let p = memory
            .record(BlockerType::Resource, TAGS, ResolutionAction::Reassign, 3.0, true, Utc::now())
            .await;
        assert_eq!(p.recurrence_rate, 1.0);
        assert_eq!(reliable_strategy(&p), None);
    }

    #[tokio::test]
    async fn test_restore_from_patterns() {
        let source = PatternMemory::default();
        let p = source
            .record(BlockerType::Organizational, TAGS, ResolutionAction::Escalate, 5.0, false, Utc::now())
            .await;
        let restored = PatternMemory::with_patterns(0.2, [p.clone()]);
        assert_eq!(restored.all().await, vec![p]);
    }
}
