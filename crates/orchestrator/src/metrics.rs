//! Loop metrics, derived from blocker records.

use serde::Serialize;
use unblock_core::{BlockerRecord, EngagementKind, LoopState};

/// Counters over every blocker the orchestrator knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoopMetrics {
    /// Blockers submitted
    pub detected: usize,
    /// Loops that reached LEARN and stored a pattern
    pub resolved: usize,
    /// Blockers that needed a manager or director
    pub escalated: usize,
    /// Blockers deprioritized
    pub abandoned: usize,
    /// Verification rounds that failed
    pub verification_failures: usize,
    /// Blockers waiting for a human
    pub flagged: usize,
    /// Hours from detection to recorded resolution, summed over resolved loops
    pub total_resolution_hours: f64,
}

impl LoopMetrics {
    /// Fold one record in.
    pub fn observe(&mut self, record: &BlockerRecord) {
        self.detected += 1;
        self.resolved += record.loops_completed as usize;
        if record.engagements.iter().any(|e| e.kind == EngagementKind::Escalation) {
            self.escalated += 1;
        }
        if record.state == LoopState::Abandoned {
            self.abandoned += 1;
        }
        if record.is_flagged() {
            self.flagged += 1;
        }
        self.verification_failures += record
            .trail
            .steps()
            .iter()
            .filter(|s| s.action == "verification_failed")
            .count();
        if record.loops_completed > 0 {
            if let Some(resolution) = &record.resolution {
                let minutes = (resolution.resolved_at - record.created_at).num_minutes();
                self.total_resolution_hours += minutes.max(0) as f64 / 60.0;
            }
        }
    }

    /// Average hours to resolution, 0 when nothing resolved yet.
    pub fn avg_resolution_hours(&self) -> f64 {
        if self.resolved == 0 {
            0.0
        } else {
            self.total_resolution_hours / self.resolved as f64
        }
    }
}

impl<'a> FromIterator<&'a BlockerRecord> for LoopMetrics {
    fn from_iter<I: IntoIterator<Item = &'a BlockerRecord>>(iter: I) -> Self {
        let mut metrics = LoopMetrics::default();
        for record in iter {
            metrics.observe(record);
        }
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use unblock_core::{BlockerId, BlockerSignal, Resolution, SourceKind};

    #[test]
    fn test_average_over_resolved_loops() {
        let now = Utc::now();
        let signal = BlockerSignal::new(SourceKind::Report, "ann", "no access", now);
        let mut done = BlockerRecord::new(BlockerId::new(), signal.clone(), now);
        done.loops_completed = 1;
        done.resolution = Some(Resolution {
            by: "ops".into(),
            notes: "granted".into(),
            resolved_at: now + Duration::hours(6),
        });
        let mut dropped = BlockerRecord::new(BlockerId::new(), signal, now);
        dropped.state = LoopState::Abandoned;

        let metrics: LoopMetrics = [&done, &dropped].into_iter().collect();
        assert_eq!(metrics.detected, 2);
        assert_eq!(metrics.resolved, 1);
        assert_eq!(metrics.abandoned, 1);
        assert_eq!(metrics.avg_resolution_hours(), 6.0);
        assert_eq!(LoopMetrics::default().avg_resolution_hours(), 0.0);
    }
}
